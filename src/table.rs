//! Single-level open-addressing hash table.
//!
//! [`FlatTable`] is the contract a bucket of a
//! [`TwoLevelHashTable`](crate::TwoLevelHashTable) has to satisfy;
//! [`HashTable`] is the implementation used by default. It probes linearly,
//! keeps its slot array at most half full, and stores the cell with the zero
//! key outside the slot array so that iteration always visits it first.

use std::fmt;
use std::hash::BuildHasher;
use std::mem;

use tracing::trace;

use crate::cell::{Cell, MapCell, SetCell, TableKey};
use crate::grower::{Grower, HashTableGrower};
use crate::hash::DefaultHashBuilder;

pub type KeyOf<T> = <<T as FlatTable>::Cell as Cell>::Key;
pub type MappedOf<T> = <<T as FlatTable>::Cell as Cell>::Mapped;
pub type ValueOf<T> = <<T as FlatTable>::Cell as Cell>::Value;

/// Capabilities required from a single-level table.
///
/// Positions (`Pos`) are plain values: they stay meaningful only while the
/// table is not mutated, and every table has one `end()` position that no
/// cell occupies.
pub trait FlatTable: Sized {
    type Cell: Cell;
    type Hasher: BuildHasher + Clone;
    type Pos: Copy + Eq + fmt::Debug;

    fn with_hasher(hasher: Self::Hasher) -> Self;

    /// Creates a table sized so that `capacity` cells fit without growing.
    fn with_capacity_and_hasher(capacity: usize, hasher: Self::Hasher) -> Self;

    fn hasher(&self) -> &Self::Hasher;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bytes held by the slot array.
    fn memory_bytes(&self) -> usize;

    /// Drops every cell.
    fn clear(&mut self);

    /// Position of the first cell, or `end()` for an empty table.
    fn begin(&self) -> Self::Pos;

    fn end(&self) -> Self::Pos;

    /// Position of the cell following `pos`. Advancing `end()` stays at `end()`.
    fn advance(&self, pos: Self::Pos) -> Self::Pos;

    fn cell(&self, pos: Self::Pos) -> Option<&Self::Cell>;

    fn cell_mut(&mut self, pos: Self::Pos) -> Option<&mut Self::Cell>;

    /// Locates the slot for `key`, whose hash is `hash`. Nothing is written
    /// until the returned [`VacantSlot`] is finished.
    fn emplace(&mut self, key: KeyOf<Self>, hash: u64) -> Slot<'_, Self>;

    /// Writes a new cell at a vacant position previously returned by
    /// [`emplace`](Self::emplace) and returns where the cell ended up, which
    /// differs from `vacant` when the table had to grow.
    fn occupy(
        &mut self,
        vacant: Self::Pos,
        key: KeyOf<Self>,
        mapped: MappedOf<Self>,
        hash: u64,
    ) -> Self::Pos;

    /// Position of `key`, or `end()` if it is absent.
    fn find(&self, key: &KeyOf<Self>, hash: u64) -> Self::Pos;

    /// Places `cell` without looking for an existing equal key.
    ///
    /// The caller guarantees that the key is not the zero key and is not yet
    /// present, as when copying out of another table.
    fn insert_unique_non_zero(&mut self, cell: Self::Cell, hash: u64);

    fn iter(&self) -> impl Iterator<Item = &Self::Cell>;

    fn iter_mut(&mut self) -> impl Iterator<Item = &mut Self::Cell>;

    /// Consumes the table, yielding the zero-key cell (if any) first.
    fn into_cells(self) -> impl Iterator<Item = Self::Cell>;
}

/// Result of [`FlatTable::emplace`].
pub enum Slot<'a, T: FlatTable> {
    /// The key was already present.
    Occupied(OccupiedSlot<'a, T>),
    /// The key is absent; the slot is reserved for it until finished or dropped.
    Vacant(VacantSlot<'a, T>),
}

pub struct OccupiedSlot<'a, T: FlatTable> {
    cell: &'a mut T::Cell,
    pos: T::Pos,
}

impl<'a, T: FlatTable> OccupiedSlot<'a, T> {
    pub fn new(cell: &'a mut T::Cell, pos: T::Pos) -> Self {
        Self { cell, pos }
    }

    pub fn pos(&self) -> T::Pos {
        self.pos
    }

    pub fn cell(&self) -> &T::Cell {
        self.cell
    }

    pub fn key(&self) -> &KeyOf<T> {
        self.cell.key()
    }

    pub fn get(&self) -> &MappedOf<T> {
        self.cell.mapped()
    }

    pub fn get_mut(&mut self) -> &mut MappedOf<T> {
        self.cell.mapped_mut()
    }

    pub fn into_mut(self) -> &'a mut MappedOf<T> {
        self.cell.mapped_mut()
    }
}

/// A reserved, still empty slot.
///
/// [`finish`](Self::finish) is the only way to turn it into a cell: the
/// mapped value has to be supplied at that point, so a half-built cell is
/// never observable. Dropping the slot leaves the table unchanged.
pub struct VacantSlot<'a, T: FlatTable> {
    table: &'a mut T,
    pos: T::Pos,
    key: KeyOf<T>,
    hash: u64,
}

impl<'a, T: FlatTable> VacantSlot<'a, T> {
    pub fn new(table: &'a mut T, pos: T::Pos, key: KeyOf<T>, hash: u64) -> Self {
        Self {
            table,
            pos,
            key,
            hash,
        }
    }

    pub fn key(&self) -> &KeyOf<T> {
        &self.key
    }

    pub fn hash(&self) -> u64 {
        self.hash
    }

    /// Stores `mapped` under the reserved key and returns the cell's position.
    pub fn finish(self, mapped: MappedOf<T>) -> T::Pos {
        self.table.occupy(self.pos, self.key, mapped, self.hash)
    }
}

/// Position inside a [`HashTable`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Pos {
    /// The out-of-line zero-key cell.
    Zero,
    /// Index into the slot array.
    Slot(usize),
    End,
}

/// Open-addressing table with linear probing.
///
/// The slot array is allocated on the first non-zero insertion, so an empty
/// table costs no heap memory.
#[derive(Clone)]
pub struct HashTable<C, S = DefaultHashBuilder, G = HashTableGrower> {
    buf: Box<[Option<C>]>,
    zero: Option<C>,
    size: usize,
    grower: G,
    hasher: S,
}

/// Standalone map over [`HashTable`].
pub type FlatHashMap<K, V, S = DefaultHashBuilder> = HashTable<MapCell<K, V>, S, HashTableGrower>;

/// Standalone set over [`HashTable`].
pub type FlatHashSet<K, S = DefaultHashBuilder> = HashTable<SetCell<K>, S, HashTableGrower>;

fn new_slots<C>(len: usize) -> Box<[Option<C>]> {
    std::iter::repeat_with(|| None).take(len).collect()
}

impl<C, S, G> HashTable<C, S, G>
where
    C: Cell,
    S: BuildHasher + Clone,
    G: Grower,
{
    pub fn new() -> Self
    where
        S: Default,
    {
        Self::with_hasher(S::default())
    }

    /// Creates a table with room for `size_hint` cells.
    ///
    /// # Arguments
    ///
    /// * `size_hint` - Number of cells expected. The table still grows past
    ///                 it when needed.
    pub fn with_capacity(size_hint: usize) -> Self
    where
        S: Default,
    {
        Self::with_capacity_and_hasher(size_hint, S::default())
    }

    #[inline]
    pub fn hash(&self, key: &C::Key) -> u64 {
        self.hasher.hash_one(key)
    }

    /// Current size degree of the slot array.
    pub fn size_degree(&self) -> u8 {
        self.grower.size_degree()
    }

    /// Inserts a value unless its key is already present.
    ///
    /// # Returns
    ///
    /// * `bool` - `true` if a new cell was created. An existing cell keeps
    ///            its mapped value.
    pub fn insert(&mut self, value: C::Value) -> bool {
        let (key, mapped) = C::split_value(value);
        let hash = self.hash(&key);
        match self.emplace(key, hash) {
            Slot::Occupied(_) => false,
            Slot::Vacant(slot) => {
                slot.finish(mapped);
                true
            }
        }
    }

    pub fn get(&self, key: &C::Key) -> Option<&C::Mapped> {
        let pos = self.find(key, self.hash(key));
        self.cell(pos).map(Cell::mapped)
    }

    pub fn get_mut(&mut self, key: &C::Key) -> Option<&mut C::Mapped> {
        let pos = self.find(key, self.hash(key));
        self.cell_mut(pos).map(Cell::mapped_mut)
    }

    pub fn contains_key(&self, key: &C::Key) -> bool {
        self.find(key, self.hash(key)) != Pos::End
    }

    fn ensure_allocated(&mut self) {
        if self.buf.is_empty() {
            self.buf = new_slots(self.grower.buf_size());
        }
    }

    /// Slot holding `key`, or the empty slot where it would go.
    /// The slot array must be allocated.
    fn probe(&self, key: &C::Key, hash: u64) -> usize {
        let mut pos = self.grower.place(hash);
        while let Some(cell) = &self.buf[pos] {
            if cell.key() == key {
                break;
            }
            pos = self.grower.next(pos);
        }
        pos
    }

    fn find_empty(&self, hash: u64) -> usize {
        let mut pos = self.grower.place(hash);
        while self.buf[pos].is_some() {
            pos = self.grower.next(pos);
        }
        pos
    }

    fn first_occupied_from(&self, start: usize) -> Pos {
        match self.buf.get(start..) {
            Some(rest) => rest
                .iter()
                .position(Option::is_some)
                .map_or(Pos::End, |offset| Pos::Slot(start + offset)),
            None => Pos::End,
        }
    }

    fn resize(&mut self) {
        let old_degree = self.grower.size_degree();
        let mut grower = self.grower.clone();
        grower.increase_size();
        self.rehash(grower);
        trace!(
            from_degree = old_degree,
            to_degree = self.grower.size_degree(),
            cells = self.size,
            "resized hash table"
        );
    }

    fn rehash(&mut self, grower: G) {
        let old = mem::replace(&mut self.buf, new_slots(grower.buf_size()));
        self.grower = grower;
        for cell in old.into_vec().into_iter().flatten() {
            let hash = cell.hash_of(&self.hasher);
            let pos = self.find_empty(hash);
            self.buf[pos] = Some(cell);
        }
    }

    /// Makes sure one more cell fits, growing first if necessary.
    /// Returns whether the slot array was rebuilt.
    fn reserve_one(&mut self) -> bool {
        self.ensure_allocated();
        if self.grower.overflow(self.size + 1) {
            self.resize();
            true
        } else {
            false
        }
    }
}

impl<C, S, G> Default for HashTable<C, S, G>
where
    C: Cell,
    S: BuildHasher + Clone + Default,
    G: Grower,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<C, S, G> fmt::Debug for HashTable<C, S, G>
where
    G: Grower,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HashTable")
            .field("len", &self.size)
            .field("has_zero", &self.zero.is_some())
            .field("size_degree", &self.grower.size_degree())
            .field("allocated", &!self.buf.is_empty())
            .finish()
    }
}

impl<C, S, G> FlatTable for HashTable<C, S, G>
where
    C: Cell,
    S: BuildHasher + Clone,
    G: Grower,
{
    type Cell = C;
    type Hasher = S;
    type Pos = Pos;

    fn with_hasher(hasher: S) -> Self {
        Self {
            buf: Box::default(),
            zero: None,
            size: 0,
            grower: G::default(),
            hasher,
        }
    }

    fn with_capacity_and_hasher(capacity: usize, hasher: S) -> Self {
        let mut table = Self::with_hasher(hasher);
        table.grower.set(capacity);
        table
    }

    #[inline]
    fn hasher(&self) -> &S {
        &self.hasher
    }

    #[inline]
    fn len(&self) -> usize {
        self.size
    }

    fn memory_bytes(&self) -> usize {
        self.buf.len() * mem::size_of::<Option<C>>()
    }

    fn clear(&mut self) {
        self.zero = None;
        self.buf.iter_mut().for_each(|slot| *slot = None);
        self.size = 0;
    }

    fn begin(&self) -> Pos {
        if self.zero.is_some() {
            Pos::Zero
        } else {
            self.first_occupied_from(0)
        }
    }

    #[inline]
    fn end(&self) -> Pos {
        Pos::End
    }

    fn advance(&self, pos: Pos) -> Pos {
        match pos {
            Pos::Zero => self.first_occupied_from(0),
            Pos::Slot(i) => self.first_occupied_from(i + 1),
            Pos::End => Pos::End,
        }
    }

    fn cell(&self, pos: Pos) -> Option<&C> {
        match pos {
            Pos::Zero => self.zero.as_ref(),
            Pos::Slot(i) => self.buf.get(i).and_then(Option::as_ref),
            Pos::End => None,
        }
    }

    fn cell_mut(&mut self, pos: Pos) -> Option<&mut C> {
        match pos {
            Pos::Zero => self.zero.as_mut(),
            Pos::Slot(i) => self.buf.get_mut(i).and_then(Option::as_mut),
            Pos::End => None,
        }
    }

    fn emplace(&mut self, key: C::Key, hash: u64) -> Slot<'_, Self> {
        if key.is_zero() {
            return match self.zero {
                Some(ref mut cell) => Slot::Occupied(OccupiedSlot::new(cell, Pos::Zero)),
                None => Slot::Vacant(VacantSlot::new(self, Pos::Zero, key, hash)),
            };
        }

        self.ensure_allocated();
        let pos = self.probe(&key, hash);
        match self.buf[pos] {
            Some(ref mut cell) => Slot::Occupied(OccupiedSlot::new(cell, Pos::Slot(pos))),
            None => Slot::Vacant(VacantSlot::new(self, Pos::Slot(pos), key, hash)),
        }
    }

    fn occupy(&mut self, vacant: Pos, key: C::Key, mapped: C::Mapped, hash: u64) -> Pos {
        match vacant {
            Pos::Zero if self.zero.is_none() && key.is_zero() => {
                self.zero = Some(C::from_parts(key, mapped, hash));
                self.size += 1;
                Pos::Zero
            }
            Pos::Slot(mut pos) if matches!(self.buf.get(pos), Some(None)) && !key.is_zero() => {
                if self.reserve_one() {
                    pos = self.probe(&key, hash);
                }
                self.buf[pos] = Some(C::from_parts(key, mapped, hash));
                self.size += 1;
                Pos::Slot(pos)
            }
            // Not a vacancy handed out by `emplace`: take the regular path.
            _ => match self.emplace(key, hash) {
                Slot::Occupied(mut slot) => {
                    *slot.get_mut() = mapped;
                    slot.pos()
                }
                Slot::Vacant(slot) => slot.finish(mapped),
            },
        }
    }

    fn find(&self, key: &C::Key, hash: u64) -> Pos {
        if key.is_zero() {
            return if self.zero.is_some() {
                Pos::Zero
            } else {
                Pos::End
            };
        }
        if self.buf.is_empty() {
            return Pos::End;
        }
        let pos = self.probe(key, hash);
        if self.buf[pos].is_some() {
            Pos::Slot(pos)
        } else {
            Pos::End
        }
    }

    fn insert_unique_non_zero(&mut self, cell: C, hash: u64) {
        debug_assert!(!cell.is_zero(), "zero key passed to insert_unique_non_zero");
        self.reserve_one();
        let pos = self.find_empty(hash);
        self.buf[pos] = Some(cell);
        self.size += 1;
    }

    fn iter(&self) -> impl Iterator<Item = &C> {
        self.zero.iter().chain(self.buf.iter().flatten())
    }

    fn iter_mut(&mut self) -> impl Iterator<Item = &mut C> {
        self.zero.iter_mut().chain(self.buf.iter_mut().flatten())
    }

    fn into_cells(self) -> impl Iterator<Item = C> {
        self.zero
            .into_iter()
            .chain(self.buf.into_vec().into_iter().flatten())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grower::TwoLevelHashTableGrower;

    type SmallMap = HashTable<MapCell<u64, u64>, DefaultHashBuilder, HashTableGrower<2>>;

    #[test]
    fn test_zero_key_is_visited_first() {
        let mut t = FlatHashMap::<u64, &str>::new();
        t.insert((7, "seven"));
        t.insert((0, "zero"));
        t.insert((3, "three"));
        let first = t.cell(t.begin()).map(|c| *c.key());
        assert_eq!(first, Some(0));
        assert_eq!(t.iter().count(), 3);
        assert_eq!(t.len(), 3);
    }

    #[test]
    fn test_grows_and_keeps_cells() {
        let mut t = SmallMap::new();
        for i in 1..=100u64 {
            assert!(t.insert((i, i * 10)));
        }
        assert!(t.size_degree() > 2);
        for i in 1..=100u64 {
            assert_eq!(t.get(&i), Some(&(i * 10)));
        }
        assert!(t.memory_bytes() > 0);
    }

    #[test]
    fn test_emplace_finish_returns_position_after_resize() {
        let mut t = SmallMap::new();
        t.insert((1, 1));
        t.insert((2, 2));
        let hash = t.hash(&3);
        let pos = match t.emplace(3, hash) {
            Slot::Vacant(slot) => slot.finish(30),
            Slot::Occupied(_) => panic!("key 3 was not inserted yet"),
        };
        assert_eq!(t.cell(pos).map(|c| *c.mapped()), Some(30));
    }

    #[test]
    fn test_dropped_vacant_slot_inserts_nothing() {
        let mut t = FlatHashSet::<u32>::new();
        let hash = t.hash(&5);
        if let Slot::Vacant(slot) = t.emplace(5, hash) {
            assert_eq!(*slot.key(), 5);
        }
        assert!(t.is_empty());
        assert!(!t.contains_key(&5));
    }

    #[test]
    fn test_positional_traversal_matches_iter() {
        let mut t = HashTable::<SetCell<u32>, DefaultHashBuilder, TwoLevelHashTableGrower>::new();
        for k in [0u32, 5, 9, 1000, 77] {
            t.insert(k);
        }
        let mut walked = Vec::new();
        let mut pos = t.begin();
        while pos != t.end() {
            walked.extend(t.cell(pos).map(|c| *c.key()));
            pos = t.advance(pos);
        }
        let iterated: Vec<u32> = t.iter().map(|c| *c.key()).collect();
        assert_eq!(walked, iterated);
        assert_eq!(t.advance(t.end()), Pos::End);
    }

    #[test]
    fn test_clear_keeps_allocation() {
        let mut t = FlatHashMap::<u64, u64>::new();
        t.insert((0, 1));
        t.insert((4, 2));
        let bytes = t.memory_bytes();
        t.clear();
        assert!(t.is_empty());
        assert_eq!(t.begin(), Pos::End);
        assert_eq!(t.memory_bytes(), bytes);
    }
}
