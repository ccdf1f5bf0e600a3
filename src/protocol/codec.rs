//! Protocol codec
//!
//! Encoding and decoding functions for the wire protocol.
//!
//! ## Wire Format
//!
//! ### Request (Command) Format
//! ```text
//! ┌──────────┬──────────┬─────────────────────────────┐
//! │ Cmd (1)  │ Len (4)  │         Body                │
//! └──────────┴──────────┴─────────────────────────────┘
//! ```
//!
//! ### Body by Command Type
//! - READ / DELETE / EXISTS:      bytes(key)
//! - WRITE / STAGE_WRITE:         bytes(key) + bytes(payload)
//! - PING / COUNT / STAGE_FLUSH:  empty
//! - BATCH_WRITE:                 count (4) + (bytes(key) + bytes(payload))*
//! - BATCH_READ:                  count (4) + bytes(key)*
//! - BATCH_READ_STRUCTURED:       bincode(Template)
//!
//! `bytes(x)` is a 4 byte length followed by `x`. Template and hydrated
//! bodies are bincode (little-endian, fixed-width integers) and are walked
//! once to enforce [`MAX_TEMPLATE_DEPTH`] before they are deserialized.
//!
//! ### Response Format
//! ```text
//! ┌──────────┬──────────┬─────────────────────────────┐
//! │Status(1) │ Len (4)  │         Body                │
//! └──────────┴──────────┴─────────────────────────────┘
//! ```
//!
//! All integers are big-endian.

use std::io::{Read, Write};

use bytes::{Buf, BufMut, BytesMut};

use super::{Command, CommandType, Response, Status};
use crate::batch::{Hydrated, Template, MAX_TEMPLATE_DEPTH};
use crate::error::{LedgerError, Result};

/// Header size: 1 byte command/status + 4 bytes length
pub const HEADER_SIZE: usize = 5;

/// Default maximum body size (64 MB)
pub const DEFAULT_MAX_FRAME_SIZE: u32 = 64 * 1024 * 1024;

// =============================================================================
// Command Encoding/Decoding
// =============================================================================

/// Encode a command to a complete frame
pub fn encode_command(command: &Command) -> Result<Vec<u8>> {
    let mut body = BytesMut::new();

    match command {
        Command::Read { key } | Command::Delete { key } | Command::Exists { key } => {
            put_bytes(&mut body, key)?;
        }
        Command::Write { key, payload } | Command::StageWrite { key, payload } => {
            put_bytes(&mut body, key)?;
            put_bytes(&mut body, payload)?;
        }
        Command::Ping | Command::Count | Command::StageWriteFlush => {}
        Command::BatchWrite { entries } => {
            put_count(&mut body, entries.len())?;
            for (key, payload) in entries {
                put_bytes(&mut body, key)?;
                put_bytes(&mut body, payload)?;
            }
        }
        Command::BatchRead { keys } => {
            put_count(&mut body, keys.len())?;
            for key in keys {
                put_bytes(&mut body, key)?;
            }
        }
        Command::BatchReadStructured { template } => {
            body.put_slice(&bincode::serialize(template)?);
        }
    }

    encode_frame(command.command_type() as u8, &body)
}

/// Decode a command from a complete frame
pub fn decode_command(bytes: &[u8]) -> Result<Command> {
    let (cmd_type, body) = split_frame(bytes, "command")?;
    decode_command_body(cmd_type, body)
}

/// Decode the body of a command whose type byte is `cmd_type`
pub fn decode_command_body(cmd_type: u8, body: &[u8]) -> Result<Command> {
    let cmd_type = CommandType::try_from(cmd_type)?;
    let mut buf = body;

    let command = match cmd_type {
        CommandType::Read => Command::Read {
            key: get_bytes(&mut buf, "READ key")?,
        },
        CommandType::Write => Command::Write {
            key: get_bytes(&mut buf, "WRITE key")?,
            payload: get_bytes(&mut buf, "WRITE payload")?,
        },
        CommandType::Delete => Command::Delete {
            key: get_bytes(&mut buf, "DELETE key")?,
        },
        CommandType::Ping => Command::Ping,
        CommandType::Exists => Command::Exists {
            key: get_bytes(&mut buf, "EXISTS key")?,
        },
        CommandType::Count => Command::Count,
        CommandType::BatchWrite => {
            let count = get_count(&mut buf, "BATCH_WRITE", 8)?;
            let mut entries = Vec::with_capacity(count);
            for _ in 0..count {
                let key = get_bytes(&mut buf, "BATCH_WRITE key")?;
                let payload = get_bytes(&mut buf, "BATCH_WRITE payload")?;
                entries.push((key, payload));
            }
            Command::BatchWrite { entries }
        }
        CommandType::BatchRead => {
            let count = get_count(&mut buf, "BATCH_READ", 4)?;
            let mut keys = Vec::with_capacity(count);
            for _ in 0..count {
                keys.push(get_bytes(&mut buf, "BATCH_READ key")?);
            }
            Command::BatchRead { keys }
        }
        CommandType::BatchReadStructured => {
            check_tree_depth(buf, TreeKind::Template, "BATCH_READ_STRUCTURED")?;
            let template: Template = bincode::deserialize(buf)
                .map_err(|e| LedgerError::Protocol(format!("BATCH_READ_STRUCTURED: {}", e)))?;
            buf = &[];
            Command::BatchReadStructured { template }
        }
        CommandType::StageWrite => Command::StageWrite {
            key: get_bytes(&mut buf, "STAGE_WRITE key")?,
            payload: get_bytes(&mut buf, "STAGE_WRITE payload")?,
        },
        CommandType::StageWriteFlush => Command::StageWriteFlush,
    };

    if buf.has_remaining() {
        return Err(LedgerError::Protocol(format!(
            "{:?} command: {} unexpected trailing bytes",
            cmd_type,
            buf.remaining()
        )));
    }

    Ok(command)
}

// =============================================================================
// Response Encoding/Decoding
// =============================================================================

/// Encode a response to a complete frame
pub fn encode_response(response: &Response) -> Result<Vec<u8>> {
    encode_frame(response.status as u8, &response.body)
}

/// Decode a response from a complete frame
pub fn decode_response(bytes: &[u8]) -> Result<Response> {
    let (status, body) = split_frame(bytes, "response")?;
    Ok(Response {
        status: Status::try_from(status)?,
        body: body.to_vec(),
    })
}

// =============================================================================
// Response Bodies
// =============================================================================

/// Body of an EXISTS or STAGE_WRITE answer
pub fn encode_flag(flag: bool) -> Vec<u8> {
    vec![u8::from(flag)]
}

pub fn decode_flag(body: &[u8]) -> Result<bool> {
    match body {
        [0] => Ok(false),
        [1] => Ok(true),
        _ => Err(LedgerError::Protocol(format!(
            "expected a one byte flag, got {} bytes",
            body.len()
        ))),
    }
}

/// Body of a COUNT answer
pub fn encode_count(count: u64) -> Vec<u8> {
    count.to_be_bytes().to_vec()
}

pub fn decode_count(body: &[u8]) -> Result<u64> {
    let bytes: [u8; 8] = body.try_into().map_err(|_| {
        LedgerError::Protocol(format!("COUNT answer: expected 8 bytes, got {}", body.len()))
    })?;
    Ok(u64::from_be_bytes(bytes))
}

/// Body of a BATCH_READ answer: count, then a tagged optional value per key
pub fn encode_optional_values(values: &[Option<Vec<u8>>]) -> Result<Vec<u8>> {
    let mut body = BytesMut::new();
    put_count(&mut body, values.len())?;
    for value in values {
        match value {
            Some(value) => {
                body.put_u8(1);
                put_bytes(&mut body, value)?;
            }
            None => body.put_u8(0),
        }
    }
    Ok(body.to_vec())
}

pub fn decode_optional_values(body: &[u8]) -> Result<Vec<Option<Vec<u8>>>> {
    let mut buf = body;
    let count = get_count(&mut buf, "BATCH_READ answer", 1)?;
    let mut values = Vec::with_capacity(count);

    for _ in 0..count {
        if !buf.has_remaining() {
            return Err(LedgerError::Protocol(
                "BATCH_READ answer: missing value tag".to_string(),
            ));
        }
        match buf.get_u8() {
            0 => values.push(None),
            1 => values.push(Some(get_bytes(&mut buf, "BATCH_READ value")?)),
            tag => {
                return Err(LedgerError::Protocol(format!(
                    "BATCH_READ answer: bad value tag 0x{:02x}",
                    tag
                )))
            }
        }
    }

    if buf.has_remaining() {
        return Err(LedgerError::Protocol(
            "BATCH_READ answer: unexpected trailing bytes".to_string(),
        ));
    }
    Ok(values)
}

/// Body of a BATCH_READ_STRUCTURED answer
pub fn encode_hydrated(hydrated: &Hydrated) -> Result<Vec<u8>> {
    Ok(bincode::serialize(hydrated)?)
}

pub fn decode_hydrated(body: &[u8]) -> Result<Hydrated> {
    check_tree_depth(body, TreeKind::Hydrated, "BATCH_READ_STRUCTURED answer")?;
    bincode::deserialize(body)
        .map_err(|e| LedgerError::Protocol(format!("BATCH_READ_STRUCTURED answer: {}", e)))
}

// =============================================================================
// Tree depth check
// =============================================================================

#[derive(Clone, Copy)]
enum TreeKind {
    Template,
    Hydrated,
}

// bincode variant indexes, shared by Template and Hydrated
const NODE_LEAF: u32 = 0;
const NODE_MAP: u32 = 1;
const NODE_LIST: u32 = 2;

/// Walk a bincode tree without building it, refusing nesting past the cap
///
/// Recursion stops at [`MAX_TEMPLATE_DEPTH`], so hostile bodies cannot
/// exhaust the stack here or in the deserializer that runs afterwards.
fn check_tree_depth(body: &[u8], kind: TreeKind, what: &str) -> Result<()> {
    let mut buf = body;
    skip_tree_node(&mut buf, kind, 1, what)?;

    if buf.has_remaining() {
        return Err(LedgerError::Protocol(format!(
            "{}: {} unexpected trailing bytes",
            what,
            buf.remaining()
        )));
    }
    Ok(())
}

fn skip_tree_node(buf: &mut &[u8], kind: TreeKind, depth: usize, what: &str) -> Result<()> {
    if depth > MAX_TEMPLATE_DEPTH {
        return Err(LedgerError::Protocol(format!(
            "{}: tree nested deeper than {} levels",
            what, MAX_TEMPLATE_DEPTH
        )));
    }

    ensure_remaining(buf, 4, what)?;
    match buf.get_u32_le() {
        NODE_LEAF => match kind {
            TreeKind::Template => skip_blob(buf, what),
            TreeKind::Hydrated => {
                ensure_remaining(buf, 1, what)?;
                match buf.get_u8() {
                    0 => Ok(()),
                    1 => skip_blob(buf, what),
                    tag => Err(LedgerError::Protocol(format!(
                        "{}: bad value tag 0x{:02x}",
                        what, tag
                    ))),
                }
            }
        },
        NODE_MAP => {
            ensure_remaining(buf, 8, what)?;
            for _ in 0..buf.get_u64_le() {
                skip_blob(buf, what)?;
                skip_tree_node(buf, kind, depth + 1, what)?;
            }
            Ok(())
        }
        NODE_LIST => {
            ensure_remaining(buf, 8, what)?;
            for _ in 0..buf.get_u64_le() {
                skip_tree_node(buf, kind, depth + 1, what)?;
            }
            Ok(())
        }
        variant => Err(LedgerError::Protocol(format!(
            "{}: unknown node variant {}",
            what, variant
        ))),
    }
}

/// Skip a bincode byte string or `String` (u64 length, then bytes)
fn skip_blob(buf: &mut &[u8], what: &str) -> Result<()> {
    ensure_remaining(buf, 8, what)?;
    let len = buf.get_u64_le();
    let len = usize::try_from(len)
        .ok()
        .filter(|&len| len <= buf.remaining())
        .ok_or_else(|| {
            LedgerError::Protocol(format!("{}: {} byte field overruns the body", what, len))
        })?;
    buf.advance(len);
    Ok(())
}

fn ensure_remaining(buf: &[u8], needed: usize, what: &str) -> Result<()> {
    if buf.len() < needed {
        return Err(LedgerError::Protocol(format!("{}: truncated tree", what)));
    }
    Ok(())
}

// =============================================================================
// Stream-based I/O helpers
// =============================================================================

/// Read a complete command from a stream
///
/// Blocks until a complete command is received or an error occurs.
/// Bodies larger than `max_frame_size` are rejected before they are read.
pub fn read_command<R: Read>(reader: &mut R, max_frame_size: u32) -> Result<Command> {
    let (cmd_type, body) = read_frame(reader, max_frame_size)?;
    decode_command_body(cmd_type, &body)
}

/// Write a command to a stream
pub fn write_command<W: Write>(writer: &mut W, command: &Command) -> Result<()> {
    let bytes = encode_command(command)?;
    writer.write_all(&bytes)?;
    writer.flush()?;
    Ok(())
}

/// Read a complete response from a stream
pub fn read_response<R: Read>(reader: &mut R, max_frame_size: u32) -> Result<Response> {
    let (status, body) = read_frame(reader, max_frame_size)?;
    Ok(Response {
        status: Status::try_from(status)?,
        body,
    })
}

/// Write a response to a stream
pub fn write_response<W: Write>(writer: &mut W, response: &Response) -> Result<()> {
    let bytes = encode_response(response)?;
    writer.write_all(&bytes)?;
    writer.flush()?;
    Ok(())
}

// =============================================================================
// Framing primitives
// =============================================================================

fn encode_frame(tag: u8, body: &[u8]) -> Result<Vec<u8>> {
    let len = u32::try_from(body.len()).map_err(|_| {
        LedgerError::InvalidInput(format!("frame body of {} bytes is too large", body.len()))
    })?;

    let mut frame = BytesMut::with_capacity(HEADER_SIZE + body.len());
    frame.put_u8(tag);
    frame.put_u32(len);
    frame.put_slice(body);
    Ok(frame.to_vec())
}

fn split_frame<'a>(bytes: &'a [u8], what: &str) -> Result<(u8, &'a [u8])> {
    if bytes.len() < HEADER_SIZE {
        return Err(LedgerError::Protocol(format!(
            "Incomplete {} header: expected {} bytes, got {}",
            what,
            HEADER_SIZE,
            bytes.len()
        )));
    }

    let mut header = &bytes[..HEADER_SIZE];
    let tag = header.get_u8();
    let body_len = header.get_u32() as usize;

    let total_len = HEADER_SIZE + body_len;
    if bytes.len() != total_len {
        return Err(LedgerError::Protocol(format!(
            "Malformed {} frame: expected {} bytes, got {}",
            what,
            total_len,
            bytes.len()
        )));
    }

    Ok((tag, &bytes[HEADER_SIZE..]))
}

fn read_frame<R: Read>(reader: &mut R, max_frame_size: u32) -> Result<(u8, Vec<u8>)> {
    let mut header = [0u8; HEADER_SIZE];
    reader.read_exact(&mut header)?;

    let mut buf = &header[..];
    let tag = buf.get_u8();
    let body_len = buf.get_u32();

    if body_len > max_frame_size {
        return Err(LedgerError::Protocol(format!(
            "Frame too large: {} bytes (max {})",
            body_len, max_frame_size
        )));
    }

    let mut body = vec![0u8; body_len as usize];
    if body_len > 0 {
        reader.read_exact(&mut body)?;
    }

    Ok((tag, body))
}

fn put_bytes(buf: &mut BytesMut, data: &[u8]) -> Result<()> {
    let len = u32::try_from(data.len()).map_err(|_| {
        LedgerError::InvalidInput(format!("{} bytes exceed the u32 length prefix", data.len()))
    })?;
    buf.put_u32(len);
    buf.put_slice(data);
    Ok(())
}

fn put_count(buf: &mut BytesMut, count: usize) -> Result<()> {
    let count = u32::try_from(count)
        .map_err(|_| LedgerError::InvalidInput(format!("{} items exceed a u32 count", count)))?;
    buf.put_u32(count);
    Ok(())
}

fn get_bytes(buf: &mut &[u8], what: &str) -> Result<Vec<u8>> {
    if buf.remaining() < 4 {
        return Err(LedgerError::Protocol(format!("{}: missing length", what)));
    }
    let len = buf.get_u32() as usize;

    if buf.remaining() < len {
        return Err(LedgerError::Protocol(format!(
            "{}: incomplete (expected {}, got {})",
            what,
            len,
            buf.remaining()
        )));
    }

    let data = buf.chunk()[..len].to_vec();
    buf.advance(len);
    Ok(data)
}

/// Read a sequence count, refusing counts the remaining body cannot hold
fn get_count(buf: &mut &[u8], what: &str, min_item_size: usize) -> Result<usize> {
    if buf.remaining() < 4 {
        return Err(LedgerError::Protocol(format!("{}: missing count", what)));
    }
    let count = buf.get_u32() as usize;

    if count.saturating_mul(min_item_size) > buf.remaining() {
        return Err(LedgerError::Protocol(format!(
            "{}: count {} does not fit in {} remaining bytes",
            what,
            count,
            buf.remaining()
        )));
    }
    Ok(count)
}
