//! Staging buffer
//!
//! Per-connection holding area for `STAGE_WRITE`. Nothing staged is visible
//! to readers until `STAGE_WRITE_FLUSH` applies it as one batch write.

use std::collections::HashMap;

use crate::engine::Engine;
use crate::error::Result;

/// Insertion-ordered pending writes; the last write per key wins but keeps
/// the key's original position.
#[derive(Debug, Default)]
pub struct StageBuffer {
    entries: Vec<(Vec<u8>, Vec<u8>)>,
    positions: HashMap<Vec<u8>, usize>,
    bytes: usize,
    soft_limit: Option<usize>,
}

impl StageBuffer {
    pub fn new(soft_limit: Option<usize>) -> Self {
        Self {
            soft_limit,
            ..Self::default()
        }
    }

    /// Stage a pair; returns whether the soft limit has been reached
    pub fn insert(&mut self, key: Vec<u8>, payload: Vec<u8>) -> bool {
        match self.positions.get(&key) {
            Some(&idx) => {
                let slot = &mut self.entries[idx].1;
                self.bytes = self.bytes - slot.len() + payload.len();
                *slot = payload;
            }
            None => {
                self.bytes += key.len() + payload.len();
                self.positions.insert(key.clone(), self.entries.len());
                self.entries.push((key, payload));
            }
        }
        self.needs_flush()
    }

    pub fn needs_flush(&self) -> bool {
        self.soft_limit.map_or(false, |limit| self.bytes >= limit)
    }

    /// Apply everything staged as one batch write, then clear
    ///
    /// On failure the buffer is left untouched so the flush can be retried.
    pub fn flush_into(&mut self, engine: &Engine) -> Result<usize> {
        if self.entries.is_empty() {
            return Ok(0);
        }

        let pairs: Vec<(&[u8], &[u8])> = self
            .entries
            .iter()
            .map(|(key, payload)| (key.as_slice(), payload.as_slice()))
            .collect();
        engine.batch_write(&pairs)?;

        let flushed = self.entries.len();
        self.clear();
        Ok(flushed)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.positions.clear();
        self.bytes = 0;
    }

    /// Number of distinct staged keys
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Key plus payload bytes currently staged
    pub fn staged_bytes(&self) -> usize {
        self.bytes
    }

    /// Staged pairs in insertion order
    pub fn entries(&self) -> &[(Vec<u8>, Vec<u8>)] {
        &self.entries
    }
}
