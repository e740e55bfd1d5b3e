//! Two-level hash table: `N` independent single-level tables ("buckets"),
//! with the bucket for a key chosen from high-order bits of its hash.
//!
//! Compared to one large table this is usually a little slower per lookup,
//! but:
//! - two tables merge bucket by bucket, so the merge parallelizes trivially;
//! - resizes happen one small bucket at a time, spreading their latency;
//! - resizes stay cache-local over a wider range of sizes.

use std::fmt;
use std::hash::BuildHasher;

#[cfg(feature = "rayon")]
use rayon::prelude::*;
use tracing::{debug, warn};

use crate::cell::{Cell, MapCell, SavedHashMapCell, SetCell};
use crate::grower::TwoLevelHashTableGrower;
use crate::hash::DefaultHashBuilder;
use crate::table::{self, FlatTable, HashTable, KeyOf, MappedOf, ValueOf};

/// Width of the hash that bucket selection assumes.
///
/// Selection reads bits `[32 - BITS, 32)` of the hash even though hashes
/// are 64-bit. Past about `2^32` cells the buckets therefore stop being
/// evenly loaded; bulk operations log a warning when they cross that size.
pub const ROUTING_HASH_WIDTH: u32 = 32;

const WELL_DISTRIBUTED_CELLS: u64 = 1 << ROUTING_HASH_WIDTH;

/// Bucket index for `hash` among `1 << bits` buckets: the `bits` bits just
/// below bit `width`.
///
/// Equal hashes always give equal indices.
#[inline]
pub const fn bucket_index(hash: u64, bits: u32, width: u32) -> usize {
    assert!(bits >= 1 && bits <= width && width <= 64);
    ((hash >> (width - bits)) as usize) & ((1usize << bits) - 1)
}

/// Position of a cell inside a [`TwoLevelHashTable`]: a bucket index plus a
/// position inside that bucket.
///
/// Cursors are plain values. They stay valid only while the table is not
/// mutated; all tables share one `end()` cursor shape, the end of the last
/// bucket.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Cursor<P> {
    bucket: usize,
    inner: P,
}

impl<P: Copy> Cursor<P> {
    pub fn bucket(&self) -> usize {
        self.bucket
    }

    /// Position inside the bucket.
    pub fn inner(&self) -> P {
        self.inner
    }
}

/// Hash table partitioned into `N` buckets.
///
/// `N` must be a power of two; each bucket is an independent [`FlatTable`]
/// that grows on its own. Nothing is shared between buckets, so callers may
/// hand distinct buckets to distinct threads via
/// [`buckets_mut`](Self::buckets_mut).
pub struct TwoLevelHashTable<T: FlatTable, const N: usize = 256> {
    hasher: T::Hasher,
    impls: [T; N],
}

/// Bucket type of [`TwoLevelHashMap`].
pub type TwoLevelBucket<C, S = DefaultHashBuilder> = HashTable<C, S, TwoLevelHashTableGrower>;

pub type TwoLevelHashMap<K, V, S = DefaultHashBuilder> = TwoLevelHashTable<TwoLevelBucket<MapCell<K, V>, S>>;

/// Map whose cells cache their hash; resizes and imports never rehash keys.
pub type TwoLevelHashMapWithSavedHash<K, V, S = DefaultHashBuilder> =
    TwoLevelHashTable<TwoLevelBucket<SavedHashMapCell<K, V>, S>>;

pub type TwoLevelHashSet<K, S = DefaultHashBuilder> = TwoLevelHashTable<TwoLevelBucket<SetCell<K>, S>>;

/// Result of [`TwoLevelHashTable::emplace`].
pub enum Slot<'a, T: FlatTable> {
    Occupied(OccupiedSlot<'a, T>),
    Vacant(VacantSlot<'a, T>),
}

pub struct OccupiedSlot<'a, T: FlatTable> {
    bucket: usize,
    inner: table::OccupiedSlot<'a, T>,
}

impl<'a, T: FlatTable> OccupiedSlot<'a, T> {
    pub fn cursor(&self) -> Cursor<T::Pos> {
        Cursor {
            bucket: self.bucket,
            inner: self.inner.pos(),
        }
    }

    pub fn key(&self) -> &KeyOf<T> {
        self.inner.key()
    }

    pub fn get(&self) -> &MappedOf<T> {
        self.inner.get()
    }

    pub fn get_mut(&mut self) -> &mut MappedOf<T> {
        self.inner.get_mut()
    }

    pub fn into_mut(self) -> &'a mut MappedOf<T> {
        self.inner.into_mut()
    }
}

/// Reserved slot for a key that is not in the table yet.
///
/// The cell only comes into existence through [`finish`](Self::finish),
/// which takes the mapped value, so there is no window in which a cell with
/// an unset value is reachable.
pub struct VacantSlot<'a, T: FlatTable> {
    bucket: usize,
    inner: table::VacantSlot<'a, T>,
}

impl<'a, T: FlatTable> VacantSlot<'a, T> {
    pub fn bucket(&self) -> usize {
        self.bucket
    }

    pub fn key(&self) -> &KeyOf<T> {
        self.inner.key()
    }

    pub fn finish(self, mapped: MappedOf<T>) -> Cursor<T::Pos> {
        Cursor {
            bucket: self.bucket,
            inner: self.inner.finish(mapped),
        }
    }
}

impl<T: FlatTable, const N: usize> TwoLevelHashTable<T, N> {
    pub const NUM_BUCKETS: usize = N;
    pub const MAX_BUCKET: usize = N - 1;
    pub const BITS_FOR_BUCKET: u32 = {
        assert!(N.is_power_of_two() && N >= 2, "bucket count must be a power of two >= 2");
        assert!(N.trailing_zeros() <= ROUTING_HASH_WIDTH, "more buckets than routing hash bits");
        N.trailing_zeros()
    };

    pub fn new() -> Self
    where
        T::Hasher: Default,
    {
        Self::with_hasher(T::Hasher::default())
    }

    pub fn with_hasher(hasher: T::Hasher) -> Self {
        Self::with_capacity_and_hasher(0, hasher)
    }

    /// Creates a table expecting about `size_hint` cells, split evenly
    /// across the buckets.
    pub fn with_capacity(size_hint: usize) -> Self
    where
        T::Hasher: Default,
    {
        Self::with_capacity_and_hasher(size_hint, T::Hasher::default())
    }

    pub fn with_capacity_and_hasher(size_hint: usize, hasher: T::Hasher) -> Self {
        let per_bucket = size_hint.div_ceil(N);
        Self {
            impls: std::array::from_fn(|_| T::with_capacity_and_hasher(per_bucket, hasher.clone())),
            hasher,
        }
    }

    /// Redistributes the cells of a single-level table into buckets.
    ///
    /// The result hashes with `source`'s hasher. A zero-key cell, which the
    /// source yields first, goes through the regular insert path; every other
    /// cell is placed directly into its bucket without a duplicate check,
    /// since the keys of a table are already unique.
    pub fn from_flat<Src>(source: Src) -> Self
    where
        Src: FlatTable<Cell = T::Cell, Hasher = T::Hasher>,
    {
        let mut table = Self::with_hasher(source.hasher().clone());
        let mut cells = source.into_cells().peekable();

        if let Some(zero) = cells.next_if(|cell| cell.is_zero()) {
            table.insert(zero.into_value());
        }

        for cell in cells {
            let hash = cell.hash_of(&table.hasher);
            let bucket = Self::bucket_from_hash(hash);
            table.impls[bucket].insert_unique_non_zero(cell, hash);
        }

        let cells = table.len();
        debug!(cells, buckets = N, "converted flat table to two-level");
        warn_if_overloaded(cells);
        table
    }

    #[inline]
    pub fn hash(&self, key: &KeyOf<T>) -> u64 {
        self.hasher.hash_one(key)
    }

    #[inline]
    pub fn hasher(&self) -> &T::Hasher {
        &self.hasher
    }

    /// Bucket that owns cells with hash `hash`.
    #[inline]
    pub const fn bucket_from_hash(hash: u64) -> usize {
        bucket_index(hash, Self::BITS_FOR_BUCKET, ROUTING_HASH_WIDTH)
    }

    /// Inserts `value` unless its key is present.
    ///
    /// # Returns
    ///
    /// * `(Cursor, bool)` - Where the key's cell is, and whether it was
    ///                      created by this call. An existing cell keeps its
    ///                      mapped value.
    pub fn insert(&mut self, value: ValueOf<T>) -> (Cursor<T::Pos>, bool) {
        let (key, mapped) = <T::Cell as Cell>::split_value(value);
        let hash = self.hash(&key);
        match self.emplace_with_hash(key, hash) {
            Slot::Occupied(slot) => (slot.cursor(), false),
            Slot::Vacant(slot) => (slot.finish(mapped), true),
        }
    }

    pub fn emplace(&mut self, key: KeyOf<T>) -> Slot<'_, T> {
        let hash = self.hash(&key);
        self.emplace_with_hash(key, hash)
    }

    /// Same as [`emplace`](Self::emplace) with a precomputed hash, which
    /// must equal `self.hash(&key)`.
    pub fn emplace_with_hash(&mut self, key: KeyOf<T>, hash: u64) -> Slot<'_, T> {
        let bucket = Self::bucket_from_hash(hash);
        match self.impls[bucket].emplace(key, hash) {
            table::Slot::Occupied(inner) => Slot::Occupied(OccupiedSlot { bucket, inner }),
            table::Slot::Vacant(inner) => Slot::Vacant(VacantSlot { bucket, inner }),
        }
    }

    /// Cursor to the cell of `key`, or [`end`](Self::end).
    pub fn find(&self, key: &KeyOf<T>) -> Cursor<T::Pos> {
        self.find_with_hash(key, self.hash(key))
    }

    pub fn find_with_hash(&self, key: &KeyOf<T>, hash: u64) -> Cursor<T::Pos> {
        let bucket = Self::bucket_from_hash(hash);
        let found = self.impls[bucket].find(key, hash);
        if found != self.impls[bucket].end() {
            Cursor { bucket, inner: found }
        } else {
            self.end()
        }
    }

    pub fn get(&self, key: &KeyOf<T>) -> Option<&MappedOf<T>> {
        self.cell(self.find(key)).map(Cell::mapped)
    }

    pub fn get_mut(&mut self, key: &KeyOf<T>) -> Option<&mut MappedOf<T>> {
        let cursor = self.find(key);
        self.cell_mut(cursor).map(Cell::mapped_mut)
    }

    pub fn contains_key(&self, key: &KeyOf<T>) -> bool {
        self.find(key) != self.end()
    }

    pub fn cell(&self, cursor: Cursor<T::Pos>) -> Option<&T::Cell> {
        self.impls.get(cursor.bucket)?.cell(cursor.inner)
    }

    pub fn cell_mut(&mut self, cursor: Cursor<T::Pos>) -> Option<&mut T::Cell> {
        self.impls.get_mut(cursor.bucket)?.cell_mut(cursor.inner)
    }

    /// Total cell count; visits every bucket.
    pub fn len(&self) -> usize {
        self.impls.iter().map(T::len).sum()
    }

    /// Stops at the first non-empty bucket.
    pub fn is_empty(&self) -> bool {
        self.impls.iter().all(T::is_empty)
    }

    /// Bytes held by all buckets' slot arrays.
    pub fn memory_bytes(&self) -> usize {
        self.impls.iter().map(T::memory_bytes).sum()
    }

    pub fn clear(&mut self) {
        self.impls.iter_mut().for_each(T::clear);
    }

    fn begin_of_next_non_empty_bucket(&self, mut bucket: usize) -> Cursor<T::Pos> {
        while bucket != N && self.impls[bucket].is_empty() {
            bucket += 1;
        }
        if bucket != N {
            Cursor {
                bucket,
                inner: self.impls[bucket].begin(),
            }
        } else {
            self.end()
        }
    }

    /// Cursor to the first cell of the first non-empty bucket.
    pub fn begin(&self) -> Cursor<T::Pos> {
        self.begin_of_next_non_empty_bucket(0)
    }

    pub fn end(&self) -> Cursor<T::Pos> {
        Cursor {
            bucket: Self::MAX_BUCKET,
            inner: self.impls[Self::MAX_BUCKET].end(),
        }
    }

    /// Cursor following `cursor`, moving on to the next non-empty bucket
    /// when the current one is exhausted.
    pub fn advance(&self, cursor: Cursor<T::Pos>) -> Cursor<T::Pos> {
        let Some(current) = self.impls.get(cursor.bucket) else {
            return self.end();
        };
        let inner = current.advance(cursor.inner);
        if inner != current.end() {
            Cursor {
                bucket: cursor.bucket,
                inner,
            }
        } else if cursor.bucket + 1 < N {
            self.begin_of_next_non_empty_bucket(cursor.bucket + 1)
        } else {
            self.end()
        }
    }

    /// Cells in bucket order, each bucket in its own order.
    pub fn iter(&self) -> Iter<'_, T, N> {
        Iter::from_cursor(self, self.begin())
    }

    /// Mutable counterpart of [`iter`](Self::iter), visiting cells in the
    /// same order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut T::Cell> {
        self.impls.iter_mut().flat_map(|bucket| bucket.iter_mut())
    }

    pub fn buckets(&self) -> &[T; N] {
        &self.impls
    }

    /// Buckets by index. Mutating a bucket directly is allowed as long as
    /// every key stays in the bucket [`bucket_from_hash`](Self::bucket_from_hash)
    /// assigns it.
    pub fn buckets_mut(&mut self) -> &mut [T; N] {
        &mut self.impls
    }

    pub fn bucket(&self, index: usize) -> Option<&T> {
        self.impls.get(index)
    }

    pub fn bucket_mut(&mut self, index: usize) -> Option<&mut T> {
        self.impls.get_mut(index)
    }

    pub fn into_buckets(self) -> [T; N] {
        self.impls
    }

    /// Consumes the table, yielding cells in iteration order.
    pub fn into_cells(self) -> impl Iterator<Item = T::Cell> {
        self.impls.into_iter().flat_map(|bucket| bucket.into_cells())
    }

    /// Runs `f` on every bucket with its index; in parallel on the rayon
    /// pool when the `rayon` feature is enabled.
    pub fn for_each_bucket_mut<F>(&mut self, f: F)
    where
        T: Send,
        F: Fn(usize, &mut T) + Sync + Send,
    {
        #[cfg(feature = "rayon")]
        {
            self.impls
                .par_iter_mut()
                .enumerate()
                .for_each(|(index, bucket)| f(index, bucket));
        }

        #[cfg(not(feature = "rayon"))]
        {
            self.impls
                .iter_mut()
                .enumerate()
                .for_each(|(index, bucket)| f(index, bucket));
        }
    }

    /// Folds every cell of `other` into `self`, bucket `i` into bucket `i`.
    ///
    /// Keys missing from `self` are moved in as they are; for keys present
    /// in both, `combine` receives the existing mapped value and the
    /// incoming one. Both tables must use the same hash function. Buckets
    /// are merged in parallel when the `rayon` feature is enabled.
    pub fn merge<F>(&mut self, other: Self, combine: F)
    where
        T: Send,
        MappedOf<T>: Send,
        F: Fn(&mut MappedOf<T>, MappedOf<T>) + Sync + Send,
    {
        #[cfg(feature = "rayon")]
        {
            self.impls
                .par_iter_mut()
                .zip(other.impls)
                .for_each(|(dst, src)| merge_bucket(dst, src, &combine));
        }

        #[cfg(not(feature = "rayon"))]
        {
            self.impls
                .iter_mut()
                .zip(other.impls)
                .for_each(|(dst, src)| merge_bucket(dst, src, &combine));
        }

        let cells = self.len();
        debug!(cells, buckets = N, "merged two-level tables");
        warn_if_overloaded(cells);
    }
}

fn merge_bucket<T, F>(dst: &mut T, src: T, combine: &F)
where
    T: FlatTable,
    F: Fn(&mut MappedOf<T>, MappedOf<T>),
{
    for cell in src.into_cells() {
        let hash = cell.hash_of(dst.hasher());
        let (key, mapped) = cell.into_parts();
        match dst.emplace(key, hash) {
            table::Slot::Occupied(mut slot) => combine(slot.get_mut(), mapped),
            table::Slot::Vacant(slot) => {
                slot.finish(mapped);
            }
        }
    }
}

fn warn_if_overloaded(cells: usize) {
    if cells as u64 > WELL_DISTRIBUTED_CELLS {
        warn!(
            cells,
            routing_hash_width = ROUTING_HASH_WIDTH,
            "two-level table exceeds 2^32 cells; bucket distribution degrades"
        );
    }
}

impl<T, const N: usize> Default for TwoLevelHashTable<T, N>
where
    T: FlatTable,
    T::Hasher: Default,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T, const N: usize> Clone for TwoLevelHashTable<T, N>
where
    T: FlatTable + Clone,
{
    fn clone(&self) -> Self {
        Self {
            hasher: self.hasher.clone(),
            impls: self.impls.clone(),
        }
    }
}

impl<T: FlatTable, const N: usize> fmt::Debug for TwoLevelHashTable<T, N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let non_empty = self.impls.iter().filter(|b| !b.is_empty()).count();
        f.debug_struct("TwoLevelHashTable")
            .field("buckets", &N)
            .field("non_empty_buckets", &non_empty)
            .field("len", &self.len())
            .finish()
    }
}

impl<T: FlatTable, const N: usize> Extend<ValueOf<T>> for TwoLevelHashTable<T, N> {
    fn extend<I: IntoIterator<Item = ValueOf<T>>>(&mut self, iter: I) {
        for value in iter {
            self.insert(value);
        }
    }
}

impl<T, const N: usize> FromIterator<ValueOf<T>> for TwoLevelHashTable<T, N>
where
    T: FlatTable,
    T::Hasher: Default,
{
    fn from_iter<I: IntoIterator<Item = ValueOf<T>>>(iter: I) -> Self {
        let mut table = Self::new();
        table.extend(iter);
        table
    }
}

impl<'a, T: FlatTable, const N: usize> IntoIterator for &'a TwoLevelHashTable<T, N> {
    type Item = &'a T::Cell;
    type IntoIter = Iter<'a, T, N>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Read-only walk over a [`TwoLevelHashTable`], driven by a [`Cursor`].
pub struct Iter<'a, T: FlatTable, const N: usize> {
    table: &'a TwoLevelHashTable<T, N>,
    cursor: Cursor<T::Pos>,
}

impl<'a, T: FlatTable, const N: usize> Iter<'a, T, N> {
    /// Starts iterating at `cursor`, e.g. one returned by `find` or `insert`.
    pub fn from_cursor(table: &'a TwoLevelHashTable<T, N>, cursor: Cursor<T::Pos>) -> Self {
        Self { table, cursor }
    }

    /// Position of the next cell to be yielded.
    pub fn cursor(&self) -> Cursor<T::Pos> {
        self.cursor
    }
}

impl<'a, T: FlatTable, const N: usize> Clone for Iter<'a, T, N> {
    fn clone(&self) -> Self {
        Self {
            table: self.table,
            cursor: self.cursor,
        }
    }
}

impl<'a, T: FlatTable, const N: usize> PartialEq for Iter<'a, T, N> {
    fn eq(&self, other: &Self) -> bool {
        self.cursor == other.cursor
    }
}

impl<'a, T: FlatTable, const N: usize> Iterator for Iter<'a, T, N> {
    type Item = &'a T::Cell;

    fn next(&mut self) -> Option<Self::Item> {
        if self.cursor == self.table.end() {
            return None;
        }
        let cell = self.table.cell(self.cursor)?;
        self.cursor = self.table.advance(self.cursor);
        Some(cell)
    }
}

impl<'a, T: FlatTable, const N: usize> std::iter::FusedIterator for Iter<'a, T, N> {}
