//! Streaming I/O
//!
//! Chunked writes and reads for payloads that should not be buffered whole.
//!
//! A streamed write is spooled to an anonymous temp file next to the log
//! while its CRC and length are computed. Only then is the writer lock taken
//! and the spool copied into the log, so a slow producer never blocks other
//! writers.

use std::fs::File;
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::Path;

use tracing::debug;

use crate::entry::EntryStream;
use crate::error::{LedgerError, Result};
use crate::index::IndexSlot;
use crate::record::encode_header;

use super::Engine;

impl Engine {
    /// Append one record whose payload is pulled from `reader`
    ///
    /// Returns the new tail offset of the log.
    pub fn write_stream<R: Read>(&self, key: &[u8], reader: &mut R) -> Result<u64> {
        let chunk_size = self.config.stream_chunk_size;
        let mut spool = self.spool_file()?;
        let mut hasher = crc32fast::Hasher::new();
        let mut buffer = vec![0u8; chunk_size];
        let mut total = 0u64;

        loop {
            let n = match reader.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            };
            hasher.update(&buffer[..n]);
            spool.write_all(&buffer[..n])?;
            total += n as u64;
        }

        let payload_len = usize::try_from(total).map_err(|_| {
            LedgerError::InvalidInput(format!("streamed payload of {} bytes is too large", total))
        })?;
        let header = encode_header(key, payload_len, false)?;
        let checksum = hasher.finalize().to_le_bytes();

        spool.flush()?;
        spool.seek(SeekFrom::Start(0))?;

        let mut writer = self.writer.lock();
        let start = writer.append_streamed(&header, &mut spool, total, &checksum, chunk_size)?;
        debug!(start, payload_len, "Streamed record appended");

        self.publish_or_rollback(
            &mut writer,
            start,
            &[(
                key,
                IndexSlot {
                    offset: start,
                    tombstone: false,
                },
            )],
        )
    }

    /// Stream the current payload for `key` in `stream_chunk_size` pieces
    pub fn read_stream(&self, key: &[u8]) -> Result<Option<EntryStream<'_>>> {
        let chunk_size = self.config.stream_chunk_size;
        Ok(self
            .read_entry(key)?
            .map(|entry| entry.into_stream(chunk_size)))
    }

    fn spool_file(&self) -> Result<File> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        Ok(tempfile::tempfile_in(dir)?)
    }
}
