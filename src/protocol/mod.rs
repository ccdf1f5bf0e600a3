//! Protocol Module
//!
//! Defines the wire protocol for client-server communication.
//!
//! ## Protocol Format (Binary, big-endian)
//!
//! ### Request Format
//! ```text
//! ┌──────────┬──────────┬─────────────────────────────┐
//! │ Cmd (1)  │ Len (4)  │         Body                │
//! └──────────┴──────────┴─────────────────────────────┘
//! ```
//!
//! ### Commands
//! - 0x01: READ                   - Body: key
//! - 0x02: WRITE                  - Body: key + payload
//! - 0x03: DELETE                 - Body: key
//! - 0x04: PING                   - Body: empty
//! - 0x05: EXISTS                 - Body: key
//! - 0x06: COUNT                  - Body: empty
//! - 0x07: BATCH_WRITE            - Body: pairs
//! - 0x08: BATCH_READ             - Body: keys
//! - 0x09: BATCH_READ_STRUCTURED  - Body: bincode template
//! - 0x0A: STAGE_WRITE            - Body: key + payload
//! - 0x0B: STAGE_WRITE_FLUSH      - Body: empty
//!
//! ### Response Format
//! ```text
//! ┌──────────┬──────────┬─────────────────────────────┐
//! │Status(1) │ Len (4)  │         Body                │
//! └──────────┴──────────┴─────────────────────────────┘
//! ```
//!
//! ### Status Codes
//! - 0x00: OK
//! - 0x01: NOT_FOUND
//! - 0x02: ERROR

mod codec;
mod command;
mod response;

pub use codec::{
    decode_command, decode_command_body, decode_count, decode_flag, decode_hydrated,
    decode_optional_values, decode_response, encode_command, encode_count, encode_flag,
    encode_hydrated, encode_optional_values, encode_response, read_command, read_response,
    write_command, write_response, DEFAULT_MAX_FRAME_SIZE, HEADER_SIZE,
};
pub use command::{Command, CommandType};
pub use response::{Response, Status};
