//! Log Record Module
//!
//! Binary framing for the append-only log.
//!
//! ## Responsibilities
//! - Encode one write (or tombstone) as a self-delimiting record
//! - CRC32 checksums over each payload
//! - Forward scan to rebuild the key index on open
//! - Append bytes to the backing file and roll back failed appends
//!
//! ## File Format
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │ Record 1                                                     │
//! │ ┌──────────┬───────────┬─────┬───────────┬─────────┬───────┐ │
//! │ │ Flags(1) │ KeyLen(4) │ Key │ PayLen(4) │ Payload │ CRC(4)│ │
//! │ └──────────┴───────────┴─────┴───────────┴─────────┴───────┘ │
//! ├──────────────────────────────────────────────────────────────┤
//! │ Record 2                                                     │
//! │ ┌──────────┬───────────┬─────┬───────────┬─────────┬───────┐ │
//! │ │ Flags(1) │ KeyLen(4) │ Key │ PayLen(4) │ Payload │ CRC(4)│ │
//! │ └──────────┴───────────┴─────┴───────────┴─────────┴───────┘ │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! All integers are little-endian. Flag `0x01` marks a tombstone, whose
//! payload is always empty.

mod codec;
mod scanner;
mod writer;

pub use codec::{
    decode_at, encode_header, encode_record, encoded_len, Decoded, RecordLayout,
    FLAG_TOMBSTONE, KEY_PREFIX_SIZE, LEN_SIZE,
};
pub use scanner::{LogScanner, ScanResult};
pub use writer::LogWriter;
