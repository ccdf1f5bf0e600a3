//! Record codec
//!
//! Encoding and decoding of single log records.

use std::ops::Range;

use crate::digest::{compute_checksum, CHECKSUM_SIZE};
use crate::error::{LedgerError, Result};

/// Flag bit marking a logical delete
pub const FLAG_TOMBSTONE: u8 = 0x01;

/// Every flag bit this version understands
const KNOWN_FLAGS: u8 = FLAG_TOMBSTONE;

/// Size of a length field
pub const LEN_SIZE: usize = 4;

/// Flags byte + key length
pub const KEY_PREFIX_SIZE: usize = 1 + LEN_SIZE;

/// Location of one record inside the log.
///
/// All ranges are absolute file offsets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordLayout {
    /// Offset of the flags byte
    pub offset: u64,

    /// Key bytes
    pub key: Range<usize>,

    /// Payload bytes
    pub payload: Range<usize>,

    /// Stored CRC32 of the payload (little-endian)
    pub checksum: [u8; CHECKSUM_SIZE],

    /// Whether this record deletes its key
    pub tombstone: bool,
}

impl RecordLayout {
    /// Offset one past the trailing checksum
    pub fn end(&self) -> u64 {
        (self.payload.end + CHECKSUM_SIZE) as u64
    }

    /// Total encoded size of the record
    pub fn len(&self) -> u64 {
        self.end() - self.offset
    }

    /// Recompute the payload checksum against `bytes` (the whole log).
    pub fn verify(&self, bytes: &[u8]) -> Result<()> {
        let computed = compute_checksum(&bytes[self.payload.clone()]);
        if computed != self.checksum {
            return Err(LedgerError::corruption(
                self.offset,
                format!(
                    "checksum mismatch: stored {:08x}, computed {:08x}",
                    u32::from_le_bytes(self.checksum),
                    u32::from_le_bytes(computed)
                ),
            ));
        }
        Ok(())
    }
}

/// Outcome of decoding at an offset
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    /// A fully framed record
    Record(RecordLayout),

    /// The buffer ends before the record does
    Incomplete,
}

/// Encoded size of a record with the given key and payload lengths
pub fn encoded_len(key_len: usize, payload_len: usize) -> usize {
    KEY_PREFIX_SIZE + key_len + LEN_SIZE + payload_len + CHECKSUM_SIZE
}

fn checked_len(len: usize, what: &str) -> Result<u32> {
    u32::try_from(len).map_err(|_| {
        LedgerError::InvalidInput(format!(
            "{} of {} bytes exceeds the 4 GiB record limit",
            what, len
        ))
    })
}

/// Encode everything that precedes the payload: flags, key, payload length.
///
/// Used directly by streaming writes, which learn the checksum only after
/// the payload has been consumed.
pub fn encode_header(key: &[u8], payload_len: usize, tombstone: bool) -> Result<Vec<u8>> {
    let mut header = Vec::with_capacity(KEY_PREFIX_SIZE + key.len() + LEN_SIZE);
    write_header(&mut header, key, payload_len, tombstone)?;
    Ok(header)
}

fn write_header(buf: &mut Vec<u8>, key: &[u8], payload_len: usize, tombstone: bool) -> Result<()> {
    let key_len = checked_len(key.len(), "key")?;
    let payload_len = checked_len(payload_len, "payload")?;

    buf.push(if tombstone { FLAG_TOMBSTONE } else { 0 });
    buf.extend_from_slice(&key_len.to_le_bytes());
    buf.extend_from_slice(key);
    buf.extend_from_slice(&payload_len.to_le_bytes());
    Ok(())
}

/// Append a complete record to `buf`.
///
/// `base` is the file offset that `buf[0]` will land at; the returned layout
/// is expressed in file offsets.
pub fn encode_record(
    buf: &mut Vec<u8>,
    base: u64,
    key: &[u8],
    payload: &[u8],
    tombstone: bool,
) -> Result<RecordLayout> {
    if tombstone && !payload.is_empty() {
        return Err(LedgerError::InvalidInput(
            "tombstone records cannot carry a payload".to_string(),
        ));
    }

    let start = buf.len();
    buf.reserve(encoded_len(key.len(), payload.len()));
    write_header(buf, key, payload.len(), tombstone)?;

    let payload_start = buf.len();
    buf.extend_from_slice(payload);

    let checksum = compute_checksum(payload);
    buf.extend_from_slice(&checksum);

    let offset = base + start as u64;
    let key_start = offset as usize + KEY_PREFIX_SIZE;
    let payload_start = offset as usize + (payload_start - start);

    Ok(RecordLayout {
        offset,
        key: key_start..key_start + key.len(),
        payload: payload_start..payload_start + payload.len(),
        checksum,
        tombstone,
    })
}

#[inline]
fn read_u32_le(bytes: &[u8], at: usize) -> usize {
    u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]]) as usize
}

/// Decode the framing of the record starting at `offset`.
///
/// Only the framing is validated here; call [`RecordLayout::verify`] to check
/// the payload checksum.
pub fn decode_at(bytes: &[u8], offset: usize) -> Result<Decoded> {
    if bytes.len().saturating_sub(offset) < KEY_PREFIX_SIZE {
        return Ok(Decoded::Incomplete);
    }

    let flags = bytes[offset];
    if flags & !KNOWN_FLAGS != 0 {
        return Err(LedgerError::corruption(
            offset as u64,
            format!("unknown record flags 0x{:02x}", flags),
        ));
    }

    let key_start = offset + KEY_PREFIX_SIZE;
    let key_end = key_start + read_u32_le(bytes, offset + 1);
    if key_end + LEN_SIZE > bytes.len() {
        return Ok(Decoded::Incomplete);
    }

    let payload_start = key_end + LEN_SIZE;
    let payload_end = payload_start + read_u32_le(bytes, key_end);
    if payload_end + CHECKSUM_SIZE > bytes.len() {
        return Ok(Decoded::Incomplete);
    }

    let tombstone = flags & FLAG_TOMBSTONE != 0;
    if tombstone && payload_end != payload_start {
        return Err(LedgerError::corruption(
            offset as u64,
            "tombstone record carries a payload",
        ));
    }

    let c = payload_end;
    let checksum = [bytes[c], bytes[c + 1], bytes[c + 2], bytes[c + 3]];

    Ok(Decoded::Record(RecordLayout {
        offset: offset as u64,
        key: key_start..key_end,
        payload: payload_start..payload_end,
        checksum,
        tombstone,
    }))
}
