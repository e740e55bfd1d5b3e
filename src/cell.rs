//! Keys and the cells a bucket stores.

use std::hash::{BuildHasher, Hash};

/// Key type of a table.
///
/// Every key type has one distinguished "zero" value. The table keeps a cell
/// with the zero key outside its slot array and visits it before all others.
pub trait TableKey: Hash + Eq {
    fn is_zero(&self) -> bool;
}

macro_rules! impl_int_key {
    ($($t:ty),*) => {
        $(
            impl TableKey for $t {
                #[inline]
                fn is_zero(&self) -> bool {
                    *self == 0
                }
            }
        )*
    };
}

impl_int_key!(u8, u16, u32, u64, u128, usize, i8, i16, i32, i64, i128, isize);

impl TableKey for String {
    #[inline]
    fn is_zero(&self) -> bool {
        self.is_empty()
    }
}

impl TableKey for Vec<u8> {
    #[inline]
    fn is_zero(&self) -> bool {
        self.is_empty()
    }
}

/// Unit stored in a table slot: a key, an optional mapped value, and either
/// a cached hash or the means to recompute it.
pub trait Cell: Sized {
    type Key: TableKey;
    /// Value carried next to the key; `()` for set-like tables.
    type Mapped;
    /// What `insert` accepts and what iteration conceptually yields.
    type Value;

    /// Builds a cell. `hash` is the hash of `key` under the owning table's
    /// hasher; cells that cache their hash keep it.
    fn from_parts(key: Self::Key, mapped: Self::Mapped, hash: u64) -> Self;

    fn into_parts(self) -> (Self::Key, Self::Mapped);

    fn key(&self) -> &Self::Key;

    fn mapped(&self) -> &Self::Mapped;

    fn mapped_mut(&mut self) -> &mut Self::Mapped;

    /// Splits an insertable value into key and mapped parts.
    fn split_value(value: Self::Value) -> (Self::Key, Self::Mapped);

    fn into_value(self) -> Self::Value;

    /// Hash of this cell's key under `hasher`.
    #[inline]
    fn hash_of<S: BuildHasher>(&self, hasher: &S) -> u64 {
        hasher.hash_one(self.key())
    }

    #[inline]
    fn is_zero(&self) -> bool {
        self.key().is_zero()
    }
}

/// Cell of a set: key only.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SetCell<K> {
    key: K,
    unit: (),
}

impl<K: TableKey> Cell for SetCell<K> {
    type Key = K;
    type Mapped = ();
    type Value = K;

    #[inline]
    fn from_parts(key: K, _mapped: (), _hash: u64) -> Self {
        Self { key, unit: () }
    }

    #[inline]
    fn into_parts(self) -> (K, ()) {
        (self.key, ())
    }

    #[inline]
    fn key(&self) -> &K {
        &self.key
    }

    #[inline]
    fn mapped(&self) -> &() {
        &self.unit
    }

    #[inline]
    fn mapped_mut(&mut self) -> &mut () {
        &mut self.unit
    }

    #[inline]
    fn split_value(value: K) -> (K, ()) {
        (value, ())
    }

    #[inline]
    fn into_value(self) -> K {
        self.key
    }
}

/// Cell of a map that recomputes its hash when the table resizes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MapCell<K, V> {
    key: K,
    value: V,
}

impl<K: TableKey, V> Cell for MapCell<K, V> {
    type Key = K;
    type Mapped = V;
    type Value = (K, V);

    #[inline]
    fn from_parts(key: K, value: V, _hash: u64) -> Self {
        Self { key, value }
    }

    #[inline]
    fn into_parts(self) -> (K, V) {
        (self.key, self.value)
    }

    #[inline]
    fn key(&self) -> &K {
        &self.key
    }

    #[inline]
    fn mapped(&self) -> &V {
        &self.value
    }

    #[inline]
    fn mapped_mut(&mut self) -> &mut V {
        &mut self.value
    }

    #[inline]
    fn split_value(value: (K, V)) -> (K, V) {
        value
    }

    #[inline]
    fn into_value(self) -> (K, V) {
        (self.key, self.value)
    }
}

/// Cell of a map that stores its hash, for keys that are expensive to hash
/// (strings). Resizes and bulk imports reuse the stored value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SavedHashMapCell<K, V> {
    key: K,
    value: V,
    hash: u64,
}

impl<K: TableKey, V> Cell for SavedHashMapCell<K, V> {
    type Key = K;
    type Mapped = V;
    type Value = (K, V);

    #[inline]
    fn from_parts(key: K, value: V, hash: u64) -> Self {
        Self { key, value, hash }
    }

    #[inline]
    fn into_parts(self) -> (K, V) {
        (self.key, self.value)
    }

    #[inline]
    fn key(&self) -> &K {
        &self.key
    }

    #[inline]
    fn mapped(&self) -> &V {
        &self.value
    }

    #[inline]
    fn mapped_mut(&mut self) -> &mut V {
        &mut self.value
    }

    #[inline]
    fn split_value(value: (K, V)) -> (K, V) {
        value
    }

    #[inline]
    fn into_value(self) -> (K, V) {
        (self.key, self.value)
    }

    #[inline]
    fn hash_of<S: BuildHasher>(&self, _hasher: &S) -> u64 {
        self.hash
    }
}
