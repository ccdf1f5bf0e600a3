//! Entry handle
//!
//! Payload view plus record metadata.

use std::fmt;
use std::marker::PhantomData;
use std::ops::{Deref, Range};
use std::sync::Arc;

use memmap2::Mmap;

use crate::digest::{compute_checksum, CHECKSUM_SIZE};
use crate::error::{LedgerError, Result};
use crate::record::{decode_at, Decoded, RecordLayout};

use super::EntryStream;

/// Where a live record sits in the log and what its payload should hash to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryMetadata {
    /// Offset of the record's flags byte
    pub record_offset: u64,
    /// Offset of the first payload byte
    pub payload_offset: u64,
    pub payload_len: u64,
    /// Stored CRC32 of the payload
    pub checksum: u32,
}

/// Zero-copy view of one live record
#[derive(Clone)]
pub struct Entry<'a> {
    mmap: Arc<Mmap>,
    layout: RecordLayout,
    file_size: u64,
    _engine: PhantomData<&'a ()>,
}

impl<'a> Entry<'a> {
    /// Resolve the record at `offset` inside `mmap`.
    ///
    /// Returns `None` for tombstones.
    pub(crate) fn locate(mmap: Arc<Mmap>, offset: u64, file_size: u64) -> Result<Option<Self>> {
        let layout = match decode_at(&mmap, offset as usize)? {
            Decoded::Record(layout) => layout,
            Decoded::Incomplete => {
                return Err(LedgerError::corruption(
                    offset,
                    "indexed record extends past the mapped log",
                ))
            }
        };

        if layout.tombstone {
            return Ok(None);
        }

        Ok(Some(Self {
            mmap,
            layout,
            file_size,
            _engine: PhantomData,
        }))
    }

    /// Payload bytes, borrowed straight from the mapping
    pub fn as_slice(&self) -> &[u8] {
        &self.mmap[self.layout.payload.clone()]
    }

    /// Key bytes, borrowed straight from the mapping
    pub fn key(&self) -> &[u8] {
        &self.mmap[self.layout.key.clone()]
    }

    /// Copy the payload out
    pub fn to_vec(&self) -> Vec<u8> {
        self.as_slice().to_vec()
    }

    /// Payload length
    pub fn size(&self) -> usize {
        self.layout.payload.len()
    }

    /// Size of the log when this entry was resolved
    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    /// File offset of the first payload byte
    pub fn start_offset(&self) -> u64 {
        self.layout.payload.start as u64
    }

    /// File offset one past the last payload byte
    pub fn end_offset(&self) -> u64 {
        self.layout.payload.end as u64
    }

    /// `start_offset()..end_offset()`
    pub fn offset_range(&self) -> Range<u64> {
        self.start_offset()..self.end_offset()
    }

    /// Virtual address range of the payload in this process.
    ///
    /// Only meaningful while this entry is alive.
    pub fn address_range(&self) -> Range<*const u8> {
        self.as_slice().as_ptr_range()
    }

    /// Offset of the record's first byte (its flags)
    pub fn record_offset(&self) -> u64 {
        self.layout.offset
    }

    /// Stored checksum as an integer
    pub fn checksum(&self) -> u32 {
        u32::from_le_bytes(self.layout.checksum)
    }

    /// Stored checksum as raw little-endian bytes
    pub fn raw_checksum(&self) -> [u8; CHECKSUM_SIZE] {
        self.layout.checksum
    }

    /// Recompute the checksum over the mapped payload and compare
    pub fn is_valid_checksum(&self) -> bool {
        compute_checksum(self.as_slice()) == self.layout.checksum
    }

    /// Like [`is_valid_checksum`](Self::is_valid_checksum) but as a `Corruption` error
    pub fn verify(&self) -> Result<()> {
        self.layout.verify(&self.mmap)
    }

    /// Placement and checksum of this record, detached from the mapping
    pub fn metadata(&self) -> EntryMetadata {
        EntryMetadata {
            record_offset: self.record_offset(),
            payload_offset: self.start_offset(),
            payload_len: self.size() as u64,
            checksum: self.checksum(),
        }
    }

    /// Read the payload incrementally, `chunk_size` bytes at most per call
    pub fn into_stream(self, chunk_size: usize) -> EntryStream<'a> {
        EntryStream::new(self, chunk_size)
    }
}

impl Deref for Entry<'_> {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.as_slice()
    }
}

impl AsRef<[u8]> for Entry<'_> {
    fn as_ref(&self) -> &[u8] {
        self.as_slice()
    }
}

impl PartialEq<[u8]> for Entry<'_> {
    fn eq(&self, other: &[u8]) -> bool {
        self.as_slice() == other
    }
}

impl PartialEq<&[u8]> for Entry<'_> {
    fn eq(&self, other: &&[u8]) -> bool {
        self.as_slice() == *other
    }
}

impl PartialEq<Vec<u8>> for Entry<'_> {
    fn eq(&self, other: &Vec<u8>) -> bool {
        self.as_slice() == other.as_slice()
    }
}

impl fmt::Debug for Entry<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entry")
            .field("key_len", &self.layout.key.len())
            .field("offset_range", &self.layout.payload)
            .field("checksum", &format_args!("{:08x}", self.checksum()))
            .field("file_size", &self.file_size)
            .finish()
    }
}
