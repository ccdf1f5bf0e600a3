//! Command definitions
//!
//! Represents requests from clients.

use crate::batch::Template;
use crate::error::LedgerError;

/// Command types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CommandType {
    Read = 0x01,
    Write = 0x02,
    Delete = 0x03,
    Ping = 0x04,
    Exists = 0x05,
    Count = 0x06,
    BatchWrite = 0x07,
    BatchRead = 0x08,
    BatchReadStructured = 0x09,
    StageWrite = 0x0A,
    StageWriteFlush = 0x0B,
}

impl TryFrom<u8> for CommandType {
    type Error = LedgerError;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        Ok(match byte {
            0x01 => CommandType::Read,
            0x02 => CommandType::Write,
            0x03 => CommandType::Delete,
            0x04 => CommandType::Ping,
            0x05 => CommandType::Exists,
            0x06 => CommandType::Count,
            0x07 => CommandType::BatchWrite,
            0x08 => CommandType::BatchRead,
            0x09 => CommandType::BatchReadStructured,
            0x0A => CommandType::StageWrite,
            0x0B => CommandType::StageWriteFlush,
            _ => {
                return Err(LedgerError::Protocol(format!(
                    "Unknown command type: 0x{:02x}",
                    byte
                )))
            }
        })
    }
}

/// A parsed command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Read the value of a key
    Read { key: Vec<u8> },

    /// Write a key-value pair
    Write { key: Vec<u8>, payload: Vec<u8> },

    /// Delete a key
    Delete { key: Vec<u8> },

    /// Ping (health check)
    Ping,

    /// Whether a key holds a value
    Exists { key: Vec<u8> },

    /// Number of live keys
    Count,

    /// Write many pairs, published together
    BatchWrite { entries: Vec<(Vec<u8>, Vec<u8>)> },

    /// Read many keys against one snapshot
    BatchRead { keys: Vec<Vec<u8>> },

    /// Hydrate a template of keys
    BatchReadStructured { template: Template },

    /// Buffer a pair in this connection's staging area
    StageWrite { key: Vec<u8>, payload: Vec<u8> },

    /// Apply this connection's staging area as one batch write
    StageWriteFlush,
}

impl Command {
    /// Get the command type
    pub fn command_type(&self) -> CommandType {
        match self {
            Command::Read { .. } => CommandType::Read,
            Command::Write { .. } => CommandType::Write,
            Command::Delete { .. } => CommandType::Delete,
            Command::Ping => CommandType::Ping,
            Command::Exists { .. } => CommandType::Exists,
            Command::Count => CommandType::Count,
            Command::BatchWrite { .. } => CommandType::BatchWrite,
            Command::BatchRead { .. } => CommandType::BatchRead,
            Command::BatchReadStructured { .. } => CommandType::BatchReadStructured,
            Command::StageWrite { .. } => CommandType::StageWrite,
            Command::StageWriteFlush => CommandType::StageWriteFlush,
        }
    }

    /// Whether executing this command may append to the log
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            Command::Write { .. }
                | Command::Delete { .. }
                | Command::BatchWrite { .. }
                | Command::StageWriteFlush
        )
    }
}
