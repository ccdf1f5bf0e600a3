//! KeyIndex implementation
//!
//! HashMap-based index with an incrementally maintained live count.

use std::collections::HashMap;

use crate::digest::Xxh3BuildHasher;

use super::IndexSlot;

/// Key → latest record slot
#[derive(Debug, Default)]
pub struct KeyIndex {
    slots: HashMap<Vec<u8>, IndexSlot, Xxh3BuildHasher>,
    live: usize,
}

impl KeyIndex {
    /// Create an empty index
    pub fn new() -> Self {
        Self::default()
    }

    /// Point `key` at a newer record.
    ///
    /// Slots are never removed; a tombstone slot simply stops counting as live.
    pub fn insert(&mut self, key: &[u8], slot: IndexSlot) {
        let was_live = match self.slots.get_mut(key) {
            Some(existing) => {
                let was_live = !existing.tombstone;
                *existing = slot;
                was_live
            }
            None => {
                self.slots.insert(key.to_vec(), slot);
                false
            }
        };

        match (was_live, slot.tombstone) {
            (false, false) => self.live += 1,
            (true, true) => self.live -= 1,
            _ => {}
        }
    }

    /// Latest slot for `key`, tombstones included
    pub fn get(&self, key: &[u8]) -> Option<IndexSlot> {
        self.slots.get(key).copied()
    }

    /// Offset of the live record for `key`, or `None` if absent or deleted
    pub fn live_offset(&self, key: &[u8]) -> Option<u64> {
        self.get(key).filter(|s| !s.tombstone).map(|s| s.offset)
    }

    /// Whether `key` currently resolves to a value
    pub fn is_live(&self, key: &[u8]) -> bool {
        self.live_offset(key).is_some()
    }

    /// Number of keys whose latest record is not a tombstone
    pub fn live_count(&self) -> usize {
        self.live
    }

    /// Number of keys ever written (tombstoned keys included)
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Offsets of every live record
    pub fn live_offsets(&self) -> Vec<u64> {
        self.slots
            .values()
            .filter(|s| !s.tombstone)
            .map(|s| s.offset)
            .collect()
    }
}
