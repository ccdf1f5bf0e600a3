//! Hashing and checksum helpers
//!
//! - CRC32 (crc32fast) guards record payloads on disk.
//! - XXH3 derives namespaced keys and hashes index keys.

use std::hash::BuildHasher;

use xxhash_rust::xxh3::{xxh3_64, Xxh3};

/// Size of an encoded checksum in bytes
pub const CHECKSUM_SIZE: usize = 4;

/// CRC32 of `data`, little-endian.
#[inline]
pub fn compute_checksum(data: &[u8]) -> [u8; CHECKSUM_SIZE] {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(data);
    hasher.finalize().to_le_bytes()
}

/// Deterministic 64-bit XXH3 hash.
#[inline]
pub fn compute_hash(bytes: &[u8]) -> u64 {
    xxh3_64(bytes)
}

/// `BuildHasher` that feeds `HashMap` keys through XXH3.
///
/// Unlike `RandomState` the output is stable across runs.
#[derive(Debug, Clone, Copy, Default)]
pub struct Xxh3BuildHasher;

impl BuildHasher for Xxh3BuildHasher {
    type Hasher = Xxh3;

    fn build_hasher(&self) -> Self::Hasher {
        Xxh3::new()
    }
}
