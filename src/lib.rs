//! Two-level hash table: a fixed number of independent open-addressing
//! tables ("buckets"), the bucket for a key picked from high bits of its hash.
//! Built for aggregation states that are merged and resized bucket by bucket.
//!
//! ```
//! use twolevel_rs::{Cell, TwoLevelHashMap};
//!
//! let mut counts = TwoLevelHashMap::<u64, u64>::new();
//! for key in [3, 7, 3, 0] {
//!     match counts.emplace(key) {
//!         twolevel_rs::Slot::Occupied(mut slot) => *slot.get_mut() += 1,
//!         twolevel_rs::Slot::Vacant(slot) => {
//!             slot.finish(1);
//!         }
//!     }
//! }
//! assert_eq!(counts.len(), 3);
//! assert_eq!(counts.get(&3), Some(&2));
//! assert_eq!(counts.iter().map(|c| *c.mapped()).sum::<u64>(), 4);
//! ```

pub mod cell;
pub mod codec;
pub mod error;
pub mod grower;
mod hash;
pub mod table;
pub mod two_level;

pub use cell::{Cell, MapCell, SavedHashMapCell, SetCell, TableKey};
pub use codec::{BucketCodec, CellCodec, TextReader};
pub use error::{CodecError, CodecResult, Error, Result};
pub use grower::{Grower, HashTableGrower, TwoLevelHashTableGrower};
pub use hash::DefaultHashBuilder;
pub use table::{FlatHashMap, FlatHashSet, FlatTable, HashTable, Pos};
pub use two_level::{
    bucket_index, Cursor, Iter, OccupiedSlot, Slot, TwoLevelBucket, TwoLevelHashMap,
    TwoLevelHashMapWithSavedHash, TwoLevelHashSet, TwoLevelHashTable, VacantSlot,
    ROUTING_HASH_WIDTH,
};
