//! Key Index Module
//!
//! In-memory map from key to the offset of its latest record.
//!
//! ## Responsibilities
//! - O(1) lookup of the current record for a key
//! - Remember tombstones so deleted keys resolve to "absent"
//! - Track the live-key count incrementally
//!
//! ## Data Structure Choice
//! `HashMap` keyed by the exact key bytes, hashed with XXH3. The index lives
//! inside the engine's published view and is guarded by the same `RwLock`
//! as the memory map, so readers always see a consistent pair.

mod key_index;

pub use key_index::KeyIndex;

/// Where the latest record for a key lives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexSlot {
    /// File offset of the record's flags byte
    pub offset: u64,

    /// Whether the record is a tombstone
    pub tombstone: bool,
}
