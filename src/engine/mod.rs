//! Engine Module
//!
//! The core storage engine that coordinates all components.
//!
//! ## Responsibilities
//! - Own the log file, its memory map and the key index
//! - Serialize writers and publish their records atomically
//! - Serve zero-copy and copying reads concurrently
//! - Rebuild the index on startup

mod maintenance;
mod stream;

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use memmap2::Mmap;
use parking_lot::{Mutex, RwLock};
#[cfg(feature = "parallel")]
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::entry::{Entry, EntryMetadata};
use crate::error::Result;
use crate::index::{IndexSlot, KeyIndex};
use crate::record::{encode_record, encoded_len, LogScanner, LogWriter};

/// The main storage engine
///
/// ## Concurrency Model: Single-Writer / Multiple-Reader (SWMR)
///
/// - **Writes** (write/delete/batch_write/batch_delete/write_stream): Serialized by `writer`
///   - Only ONE append at a time
///   - Must acquire: writer → (append bytes) → view (write, briefly)
///
/// - **Reads** (read/read_entry/batch_read/exists/count): `view` read lock only
///   - Held just long enough to resolve a slot and clone the `Arc<Mmap>`
///   - Never blocked by an in-flight append, only by the short publish step
///
/// Publishing swaps the mapping and updates the index under one write guard,
/// so a reader sees either the old pair or the new pair.
pub struct Engine {
    /// Engine configuration
    config: Config,

    /// Path of the log file
    path: PathBuf,

    /// Appender (exclusive access needed)
    writer: Mutex<LogWriter>,

    /// What readers see
    view: RwLock<View>,
}

/// Published state: a mapping plus the index that describes it
struct View {
    mmap: Arc<Mmap>,
    index: KeyIndex,
    tail: u64,
    last_offset: Option<u64>,
}

/// A record waiting to be appended
#[derive(Clone, Copy)]
struct PendingWrite<'k> {
    key: &'k [u8],
    payload: &'k [u8],
    tombstone: bool,
}

impl<'k> PendingWrite<'k> {
    fn put(key: &'k [u8], payload: &'k [u8]) -> Self {
        Self {
            key,
            payload,
            tombstone: false,
        }
    }

    fn tombstone(key: &'k [u8]) -> Self {
        Self {
            key,
            payload: &[],
            tombstone: true,
        }
    }
}

impl Engine {
    /// Open or create an engine with the given config
    ///
    /// On startup:
    /// 1. Create parent directories
    /// 2. Open/create the log file and map it
    /// 3. Rebuild the key index with a forward scan
    /// 4. Ready to serve requests
    pub fn open(config: Config) -> Result<Self> {
        if let Some(parent) = config.data_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let (writer, view) = Self::load(&config)?;
        info!(
            path = %config.data_path.display(),
            live_keys = view.index.live_count(),
            tail = view.tail,
            "Engine opened"
        );

        Ok(Self {
            path: config.data_path.clone(),
            config,
            writer: Mutex::new(writer),
            view: RwLock::new(view),
        })
    }

    /// Open with a path (convenience method)
    ///
    /// Uses default config with the specified log file
    pub fn open_path(path: &Path) -> Result<Self> {
        let config = Config::builder().data_path(path).build();
        Self::open(config)
    }

    /// Open the file, scan it, and cut a damaged tail if the mode allows it
    fn load(config: &Config) -> Result<(LogWriter, View)> {
        let mut writer = LogWriter::open(&config.data_path, config.sync_strategy)?;
        let mmap = writer.map()?;

        let (index, scan) = LogScanner::scan(&mmap, config.recovery_mode)?;

        let mmap = if scan.was_truncated {
            warn!(
                "Truncating damaged log {} from {} to {} bytes",
                config.data_path.display(),
                writer.tail(),
                scan.valid_len
            );
            drop(mmap);
            writer.truncate(scan.valid_len)?;
            writer.map()?
        } else {
            mmap
        };

        debug!(
            records = scan.records_scanned,
            tombstones = scan.tombstones,
            "Index rebuilt"
        );

        let view = View {
            mmap: Arc::new(mmap),
            index,
            tail: writer.tail(),
            last_offset: scan.last_offset,
        };
        Ok((writer, view))
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Append one record for `key`
    ///
    /// Returns the new tail offset of the log.
    pub fn write(&self, key: &[u8], payload: &[u8]) -> Result<u64> {
        let mut writer = self.writer.lock();
        self.append_records(&mut writer, &[PendingWrite::put(key, payload)])
    }

    /// Append every pair in one write and publish them together
    ///
    /// Later duplicates of a key win, exactly as with sequential writes.
    pub fn batch_write(&self, entries: &[(&[u8], &[u8])]) -> Result<u64> {
        let pending: Vec<PendingWrite<'_>> = entries
            .iter()
            .map(|&(key, payload)| PendingWrite::put(key, payload))
            .collect();

        let mut writer = self.writer.lock();
        self.append_records(&mut writer, &pending)
    }

    /// Logically delete `key` by appending a tombstone
    ///
    /// Deleting an absent or already deleted key appends nothing.
    pub fn delete(&self, key: &[u8]) -> Result<()> {
        let mut writer = self.writer.lock();

        if !self.view.read().index.is_live(key) {
            return Ok(());
        }

        self.append_records(&mut writer, &[PendingWrite::tombstone(key)])?;
        Ok(())
    }

    /// Tombstone every listed key that currently holds a value, in one write
    ///
    /// Absent, already deleted and repeated keys append nothing. Returns the
    /// tail offset of the log.
    pub fn batch_delete(&self, keys: &[&[u8]]) -> Result<u64> {
        let mut writer = self.writer.lock();

        let pending: Vec<PendingWrite<'_>> = {
            let view = self.view.read();
            let mut seen = HashSet::with_capacity(keys.len());
            keys.iter()
                .copied()
                .filter(|key| view.index.is_live(key) && seen.insert(*key))
                .map(PendingWrite::tombstone)
                .collect()
        };

        self.append_records(&mut writer, &pending)
    }

    /// Encode, append and publish `records` (writer lock held by the caller)
    fn append_records(&self, writer: &mut LogWriter, records: &[PendingWrite<'_>]) -> Result<u64> {
        let base = writer.tail();
        if records.is_empty() {
            return Ok(base);
        }

        let capacity: usize = records
            .iter()
            .map(|r| encoded_len(r.key.len(), r.payload.len()))
            .sum();
        let mut buffer = Vec::with_capacity(capacity);
        let mut updates = Vec::with_capacity(records.len());

        for record in records {
            let layout = encode_record(&mut buffer, base, record.key, record.payload, record.tombstone)?;
            updates.push((
                record.key,
                IndexSlot {
                    offset: layout.offset,
                    tombstone: record.tombstone,
                },
            ));
        }

        let start = writer.append(&buffer)?;
        self.publish_or_rollback(writer, start, &updates)
    }

    /// Remap and publish; if that fails, cut the unpublished bytes off again
    fn publish_or_rollback(
        &self,
        writer: &mut LogWriter,
        start: u64,
        updates: &[(&[u8], IndexSlot)],
    ) -> Result<u64> {
        match self.publish(writer, updates) {
            Ok(()) => Ok(writer.tail()),
            Err(e) => {
                if let Err(truncate_err) = writer.truncate(start) {
                    warn!(
                        "Failed to discard unpublished records at offset {}: {}",
                        start, truncate_err
                    );
                }
                Err(e)
            }
        }
    }

    fn publish(&self, writer: &LogWriter, updates: &[(&[u8], IndexSlot)]) -> Result<()> {
        let mmap = Arc::new(writer.map()?);

        let mut view = self.view.write();
        for (key, slot) in updates {
            view.index.insert(key, *slot);
        }
        view.mmap = mmap;
        view.tail = writer.tail();
        view.last_offset = updates.last().map(|(_, slot)| slot.offset).or(view.last_offset);

        Ok(())
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Copy of the current payload for `key`
    ///
    /// Returns `Corruption` if the payload no longer matches its checksum
    /// (when `verify_checksums_on_read` is enabled).
    pub fn read(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        match self.read_entry(key)? {
            Some(entry) => self.copy_out(&entry).map(Some),
            None => Ok(None),
        }
    }

    /// Zero-copy handle to the current payload for `key`
    pub fn read_entry(&self, key: &[u8]) -> Result<Option<Entry<'_>>> {
        let (mmap, offset, file_size) = {
            let view = self.view.read();
            match view.index.live_offset(key) {
                Some(offset) => (Arc::clone(&view.mmap), offset, view.tail),
                None => return Ok(None),
            }
        };

        Entry::locate(mmap, offset, file_size)
    }

    /// Placement and checksum of the current record for `key`
    pub fn read_metadata(&self, key: &[u8]) -> Result<Option<EntryMetadata>> {
        Ok(self.read_entry(key)?.map(|entry| entry.metadata()))
    }

    /// Whether `key` currently holds a value
    pub fn exists(&self, key: &[u8]) -> bool {
        self.view.read().index.is_live(key)
    }

    /// Number of live keys
    pub fn count(&self) -> usize {
        self.view.read().index.live_count()
    }

    /// Look up many keys against a single snapshot
    ///
    /// `result[i]` answers `keys[i]`.
    pub fn batch_read_entries(&self, keys: &[&[u8]]) -> Result<Vec<Option<Entry<'_>>>> {
        let (mmap, offsets, file_size) = {
            let view = self.view.read();
            let offsets: Vec<Option<u64>> =
                keys.iter().map(|key| view.index.live_offset(key)).collect();
            (Arc::clone(&view.mmap), offsets, view.tail)
        };

        offsets
            .into_iter()
            .map(|offset| match offset {
                Some(offset) => Entry::locate(Arc::clone(&mmap), offset, file_size),
                None => Ok(None),
            })
            .collect()
    }

    /// Copying counterpart of [`batch_read_entries`](Self::batch_read_entries)
    pub fn batch_read(&self, keys: &[&[u8]]) -> Result<Vec<Option<Vec<u8>>>> {
        self.batch_read_entries(keys)?
            .into_iter()
            .map(|entry| entry.map(|e| self.copy_out(&e)).transpose())
            .collect()
    }

    /// The most recently appended record, unless it is a tombstone
    pub fn read_last_entry(&self) -> Result<Option<Entry<'_>>> {
        let (mmap, offset, file_size) = {
            let view = self.view.read();
            match view.last_offset {
                Some(offset) => (Arc::clone(&view.mmap), offset, view.tail),
                None => return Ok(None),
            }
        };

        Entry::locate(mmap, offset, file_size)
    }

    /// Every live entry, newest first
    pub fn iter_entries(&self) -> EntryIter<'_> {
        let view = self.view.read();
        let mut offsets = view.index.live_offsets();
        offsets.sort_unstable_by(|a, b| b.cmp(a));

        EntryIter {
            mmap: Arc::clone(&view.mmap),
            offsets: offsets.into_iter(),
            file_size: view.tail,
            _engine: std::marker::PhantomData,
        }
    }

    /// Every live entry, resolved on the rayon pool in no particular order
    #[cfg(feature = "parallel")]
    pub fn par_iter_entries(&self) -> impl ParallelIterator<Item = Result<Entry<'_>>> + '_ {
        let (mmap, offsets, file_size) = {
            let view = self.view.read();
            (Arc::clone(&view.mmap), view.index.live_offsets(), view.tail)
        };

        offsets.into_par_iter().filter_map(move |offset| {
            Entry::locate(Arc::clone(&mmap), offset, file_size).transpose()
        })
    }

    fn copy_out(&self, entry: &Entry<'_>) -> Result<Vec<u8>> {
        if self.config.verify_checksums_on_read {
            entry.verify()?;
        }
        Ok(entry.to_vec())
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Close the engine gracefully
    ///
    /// Syncs the log to disk. Outstanding entries borrow the engine, so none
    /// can survive this call.
    pub fn close(self) -> Result<()> {
        self.writer.lock().sync()?;
        debug!(path = %self.path.display(), "Engine closed");
        Ok(())
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    /// Get the log file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Length of the published log
    pub fn tail_offset(&self) -> u64 {
        self.view.read().tail
    }

    /// Size of the log file on disk
    pub fn storage_size(&self) -> Result<u64> {
        Ok(fs::metadata(&self.path)?.len())
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }
}

/// Iterator over live entries, see [`Engine::iter_entries`]
pub struct EntryIter<'a> {
    mmap: Arc<Mmap>,
    offsets: std::vec::IntoIter<u64>,
    file_size: u64,
    _engine: std::marker::PhantomData<&'a Engine>,
}

impl<'a> Iterator for EntryIter<'a> {
    type Item = Result<Entry<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let offset = self.offsets.next()?;
            match Entry::locate(Arc::clone(&self.mmap), offset, self.file_size) {
                Ok(Some(entry)) => return Some(Ok(entry)),
                Ok(None) => continue,
                Err(e) => return Some(Err(e)),
            }
        }
    }
}
