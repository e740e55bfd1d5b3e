#![allow(dead_code)]

use std::hash::{BuildHasherDefault, Hasher};

use tracing_subscriber::EnvFilter;
use twolevel_rs::{MapCell, SetCell, TwoLevelBucket, TwoLevelHashTable};

/// Hashes a `u64` key to itself, so tests can pick bucket indices directly.
#[derive(Default, Clone, Copy)]
pub struct IdentityHasher(u64);

impl Hasher for IdentityHasher {
    fn finish(&self) -> u64 {
        self.0
    }

    fn write(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.0 = (self.0 << 8) | u64::from(b);
        }
    }

    fn write_u64(&mut self, n: u64) {
        self.0 = n;
    }
}

pub type IdentityState = BuildHasherDefault<IdentityHasher>;

pub type IdentityMap<V> = TwoLevelHashTable<TwoLevelBucket<MapCell<u64, V>, IdentityState>>;

pub type IdentitySet = TwoLevelHashTable<TwoLevelBucket<SetCell<u64>, IdentityState>>;

/// Key landing in `bucket` of a 256-bucket table, distinguished by `low`.
pub fn key_in_bucket(bucket: u64, low: u64) -> u64 {
    (bucket << 24) | (low & 0x00FF_FFFF)
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
