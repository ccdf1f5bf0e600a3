//! Maintenance operations
//!
//! Moving data between keys and stores, and explicit compaction.
//! Nothing here runs on its own; callers decide when to invoke it.

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info};

use crate::config::{Config, RecoveryMode, SyncStrategy};
use crate::entry::Entry;
use crate::error::{LedgerError, Result};
use crate::record::{decode_at, Decoded};

use super::{Engine, PendingWrite};

impl Engine {
    /// Re-key an entry: the new record and the old key's tombstone are
    /// appended and published together.
    pub fn rename(&self, old_key: &[u8], new_key: &[u8]) -> Result<u64> {
        if old_key == new_key {
            return Err(LedgerError::InvalidInput(
                "cannot rename a key to itself".to_string(),
            ));
        }

        let mut writer = self.writer.lock();
        let entry = self.read_entry(old_key)?.ok_or(LedgerError::NotFound)?;

        self.append_records(
            &mut writer,
            &[
                PendingWrite::put(new_key, entry.as_slice()),
                PendingWrite::tombstone(old_key),
            ],
        )
    }

    /// Copy the entry for `key` into another store through the streaming path
    ///
    /// Returns the target's new tail offset.
    pub fn copy_entry(&self, key: &[u8], target: &Engine) -> Result<u64> {
        if same_file(&self.path, &target.path) {
            return Err(LedgerError::InvalidInput(format!(
                "cannot copy entry into the same store ({}); use rename instead",
                self.path.display()
            )));
        }

        let entry = self.read_entry(key)?.ok_or(LedgerError::NotFound)?;
        let mut stream = entry.into_stream(self.config.stream_chunk_size);
        target.write_stream(key, &mut stream)
    }

    /// Copy the entry to `target`, then delete it here
    pub fn move_entry(&self, key: &[u8], target: &Engine) -> Result<u64> {
        let offset = self.copy_entry(key, target)?;
        self.delete(key)?;
        Ok(offset)
    }

    /// Bytes that a compaction would reclaim right now
    ///
    /// Everything that is not the latest live record of some key: superseded
    /// records and tombstones.
    pub fn estimate_compaction_savings(&self) -> Result<u64> {
        let view = self.view.read();
        let mut live_bytes = 0u64;

        for offset in view.index.live_offsets() {
            match decode_at(&view.mmap, offset as usize)? {
                Decoded::Record(layout) => live_bytes += layout.len(),
                Decoded::Incomplete => {
                    return Err(LedgerError::corruption(
                        offset,
                        "indexed record extends past the mapped log",
                    ))
                }
            }
        }

        Ok(view.tail.saturating_sub(live_bytes))
    }

    /// Rewrite the log so it holds only the latest live record of each key
    ///
    /// Live records are copied oldest-first into `<log>.bk`, which is synced
    /// and renamed over the log. Requires exclusive access, so no entry can
    /// be alive while the file is swapped.
    pub fn compact(&mut self) -> Result<()> {
        let compacted_path = append_extension(&self.path, "bk");
        if compacted_path.exists() {
            fs::remove_file(&compacted_path)?;
        }
        debug!("Starting compaction. Writing to: {}", compacted_path.display());

        let before = self.tail_offset();
        {
            let target_config = Config {
                data_path: compacted_path.clone(),
                sync_strategy: SyncStrategy::Never,
                recovery_mode: RecoveryMode::Strict,
                ..self.config.clone()
            };
            let target = Engine::open(target_config)?;

            let (mmap, mut offsets, file_size) = {
                let view = self.view.read();
                (Arc::clone(&view.mmap), view.index.live_offsets(), view.tail)
            };
            offsets.sort_unstable();

            for offset in offsets {
                if let Some(entry) = Entry::locate(Arc::clone(&mmap), offset, file_size)? {
                    entry.verify()?;
                    target.write(entry.key(), entry.as_slice())?;
                }
            }

            target.close()?;
        }

        fs::rename(&compacted_path, &self.path)?;

        let (writer, view) = Self::load(&self.config)?;
        *self.writer.get_mut() = writer;
        *self.view.get_mut() = view;

        info!(before, after = self.tail_offset(), "Compaction successful");
        Ok(())
    }
}

/// `path` with `.ext` appended to its full file name
fn append_extension(path: &Path, ext: &str) -> PathBuf {
    let mut name: OsString = path.as_os_str().to_owned();
    name.push(".");
    name.push(ext);
    PathBuf::from(name)
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}
