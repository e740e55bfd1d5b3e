use std::hash::BuildHasher;

use ahash::{AHasher, RandomState};

const SEEDS: [u64; 4] = [
    0x243f_6a88_85a3_08d3,
    0x1319_8a2e_0370_7344,
    0xa409_3822_299f_31d0,
    0x082e_fa98_ec4e_6c89,
];

/// `ahash` with fixed seeds.
///
/// Bucket membership is a function of the hash, so a table written by one
/// process must hash identically in the process that reads it back.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DefaultHashBuilder;

impl BuildHasher for DefaultHashBuilder {
    type Hasher = AHasher;

    #[inline]
    fn build_hasher(&self) -> AHasher {
        RandomState::with_seeds(SEEDS[0], SEEDS[1], SEEDS[2], SEEDS[3]).build_hasher()
    }
}
