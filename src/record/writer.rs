//! Log Writer
//!
//! Handles appending encoded records to the backing file.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use memmap2::{Mmap, MmapOptions};
use tracing::{trace, warn};

use crate::config::SyncStrategy;
use crate::error::{LedgerError, Result};

/// Appends bytes to the log file.
///
/// Not thread-safe on its own: the engine keeps it behind the writer mutex.
pub struct LogWriter {
    file: File,

    /// Length of the published (fully written) log
    tail: u64,

    sync_strategy: SyncStrategy,

    /// Appends since the last fsync
    unsynced: usize,
}

impl LogWriter {
    /// Open or create the log file and position at its end
    pub fn open(path: &Path, sync_strategy: SyncStrategy) -> Result<Self> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)?;

        let tail = file.seek(SeekFrom::End(0))?;

        Ok(Self {
            file,
            tail,
            sync_strategy,
            unsynced: 0,
        })
    }

    /// Length of the fully written log
    pub fn tail(&self) -> u64 {
        self.tail
    }

    /// Cut the file back to `len` bytes (used to drop a damaged tail)
    pub fn truncate(&mut self, len: u64) -> Result<()> {
        self.file.set_len(len)?;
        self.file.seek(SeekFrom::Start(len))?;
        self.file.sync_all()?;
        self.tail = len;
        Ok(())
    }

    /// Append pre-encoded records. Returns the offset they start at.
    ///
    /// On failure the file is cut back so no partial record remains.
    pub fn append(&mut self, bytes: &[u8]) -> Result<u64> {
        let start = self.tail;

        if let Err(e) = self.file.write_all(bytes) {
            self.rollback(start);
            return Err(e.into());
        }

        self.finish_append(start, bytes.len() as u64)?;
        Ok(start)
    }

    /// Append one record whose payload comes from `body`.
    ///
    /// `body` must yield exactly `body_len` bytes; it is copied in chunks of
    /// `chunk_size` so the payload is never held in memory at once.
    pub fn append_streamed<R: Read>(
        &mut self,
        header: &[u8],
        body: &mut R,
        body_len: u64,
        checksum: &[u8],
        chunk_size: usize,
    ) -> Result<u64> {
        let start = self.tail;

        match self.copy_record(header, body, body_len, checksum, chunk_size) {
            Ok(written) => {
                self.finish_append(start, written)?;
                Ok(start)
            }
            Err(e) => {
                self.rollback(start);
                Err(e)
            }
        }
    }

    fn copy_record<R: Read>(
        &mut self,
        header: &[u8],
        body: &mut R,
        body_len: u64,
        checksum: &[u8],
        chunk_size: usize,
    ) -> Result<u64> {
        self.file.write_all(header)?;

        let mut buffer = vec![0u8; chunk_size.max(1)];
        let mut copied = 0u64;
        while copied < body_len {
            let want = (body_len - copied).min(buffer.len() as u64) as usize;
            let n = body.read(&mut buffer[..want])?;
            if n == 0 {
                return Err(LedgerError::Io(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    format!("payload source ended after {} of {} bytes", copied, body_len),
                )));
            }
            self.file.write_all(&buffer[..n])?;
            copied += n as u64;
        }

        self.file.write_all(checksum)?;
        Ok(header.len() as u64 + body_len + checksum.len() as u64)
    }

    fn finish_append(&mut self, start: u64, len: u64) -> Result<()> {
        self.unsynced += 1;

        let due = match self.sync_strategy {
            SyncStrategy::EveryWrite => true,
            SyncStrategy::EveryNWrites { count } => self.unsynced >= count,
            SyncStrategy::Never => false,
        };
        if due {
            if let Err(e) = self.sync() {
                self.rollback(start);
                return Err(e);
            }
        }

        self.tail = start + len;
        trace!(start, len, tail = self.tail, "Appended to log");
        Ok(())
    }

    fn rollback(&mut self, start: u64) {
        let restored = self
            .file
            .set_len(start)
            .and_then(|_| self.file.seek(SeekFrom::Start(start)).map(|_| ()));
        if let Err(e) = restored {
            warn!("Failed to roll back partial append at offset {}: {}", start, e);
        }
    }

    /// Force data to disk
    pub fn sync(&mut self) -> Result<()> {
        self.file.sync_data()?;
        self.unsynced = 0;
        Ok(())
    }

    /// Map the published part of the log
    pub fn map(&self) -> Result<Mmap> {
        // SAFETY: bytes below `tail` are never rewritten while mapped; the
        // file only grows, and a compaction swaps in a new file instead.
        let mmap = unsafe { MmapOptions::new().len(self.tail as usize).map(&self.file)? };
        Ok(mmap)
    }
}
