//! Namespace hashing
//!
//! Isolates key spaces that share one store by deriving a fixed-size key
//! from `(namespace, key)`:
//!
//! ```text
//! ┌──────────────────────┬──────────────────────┐
//! │ xxh3(namespace) (8)  │ xxh3(key) (8)        │
//! └──────────────────────┴──────────────────────┘
//! ```
//!
//! The engine itself never sees namespaces; callers apply this transform
//! before every read and write.

use crate::digest::compute_hash;

/// Length of a namespaced key
pub const NAMESPACED_KEY_LEN: usize = 16;

/// Derives namespaced keys for one namespace
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NamespaceHasher {
    prefix: u64,
}

impl NamespaceHasher {
    /// Hash the namespace once up front
    pub fn new(namespace: &[u8]) -> Self {
        Self {
            prefix: compute_hash(namespace),
        }
    }

    /// 16-byte key for `key` inside this namespace
    pub fn namespace(&self, key: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(NAMESPACED_KEY_LEN);
        out.extend_from_slice(&self.prefix.to_le_bytes());
        out.extend_from_slice(&compute_hash(key).to_le_bytes());
        out
    }
}
