//! Entry stream
//!
//! `Read` adapter over an [`Entry`] payload.

use std::io::{self, Read};

use super::Entry;

/// Streams a payload out of the mapping in bounded chunks
#[derive(Debug)]
pub struct EntryStream<'a> {
    entry: Entry<'a>,
    position: usize,
    chunk_size: usize,
}

impl<'a> EntryStream<'a> {
    pub fn new(entry: Entry<'a>, chunk_size: usize) -> Self {
        Self {
            entry,
            position: 0,
            chunk_size: chunk_size.max(1),
        }
    }

    /// Bytes not yet read
    pub fn remaining(&self) -> usize {
        self.entry.size() - self.position
    }

    /// The entry being streamed
    pub fn entry(&self) -> &Entry<'a> {
        &self.entry
    }
}

impl Read for EntryStream<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.remaining().min(buf.len()).min(self.chunk_size);
        if n == 0 {
            return Ok(0);
        }

        let start = self.position;
        buf[..n].copy_from_slice(&self.entry.as_slice()[start..start + n]);
        self.position += n;
        Ok(n)
    }
}
