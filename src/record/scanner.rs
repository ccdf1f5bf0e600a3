//! Log scanner
//!
//! Rebuilds the key index with a single forward pass over the log.

use tracing::{debug, warn};

use crate::config::RecoveryMode;
use crate::error::{LedgerError, Result};
use crate::index::{IndexSlot, KeyIndex};

use super::{decode_at, Decoded, RecordLayout};

/// Rebuilds state from the raw log bytes
pub struct LogScanner;

/// Result of a scan
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanResult {
    /// Number of well-formed records seen
    pub records_scanned: u64,

    /// How many of them were tombstones
    pub tombstones: u64,

    /// Length of the valid prefix of the log
    pub valid_len: u64,

    /// Offset of the last well-formed record
    pub last_offset: Option<u64>,

    /// Whether a damaged tail was found and must be cut off
    pub was_truncated: bool,
}

impl LogScanner {
    /// Scan `bytes` from offset 0 and build the key index.
    ///
    /// In `Strict` mode the first framing or checksum failure is returned as
    /// `Corruption`. In `TruncateTail` mode the scan stops there and reports
    /// the valid prefix length; the caller is responsible for truncating.
    pub fn scan(bytes: &[u8], mode: RecoveryMode) -> Result<(KeyIndex, ScanResult)> {
        let mut index = KeyIndex::new();
        let mut result = ScanResult::default();
        let mut cursor = 0usize;

        while cursor < bytes.len() {
            match Self::next_record(bytes, cursor) {
                Ok(layout) => {
                    let key = &bytes[layout.key.clone()];
                    index.insert(
                        key,
                        IndexSlot {
                            offset: layout.offset,
                            tombstone: layout.tombstone,
                        },
                    );

                    result.records_scanned += 1;
                    if layout.tombstone {
                        result.tombstones += 1;
                    }
                    result.last_offset = Some(layout.offset);
                    cursor = layout.end() as usize;
                }
                Err(e) if mode == RecoveryMode::TruncateTail => {
                    warn!(
                        "Log damaged at offset {} of {}: {}; discarding tail",
                        cursor,
                        bytes.len(),
                        e
                    );
                    result.was_truncated = true;
                    break;
                }
                Err(e) => return Err(e),
            }
        }

        result.valid_len = cursor as u64;
        debug!(
            records = result.records_scanned,
            tombstones = result.tombstones,
            live = index.live_count(),
            valid_len = result.valid_len,
            "Log scan complete"
        );

        Ok((index, result))
    }

    /// Decode and checksum-verify the record at `cursor`
    fn next_record(bytes: &[u8], cursor: usize) -> Result<RecordLayout> {
        match decode_at(bytes, cursor)? {
            Decoded::Record(layout) => {
                layout.verify(bytes)?;
                Ok(layout)
            }
            Decoded::Incomplete => Err(LedgerError::corruption(
                cursor as u64,
                format!("truncated record ({} trailing bytes)", bytes.len() - cursor),
            )),
        }
    }
}
