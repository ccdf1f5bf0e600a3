//! Response definitions
//!
//! Represents responses to clients.

use crate::error::LedgerError;

/// Response status codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Status {
    Ok = 0x00,
    NotFound = 0x01,
    Error = 0x02,
}

impl TryFrom<u8> for Status {
    type Error = LedgerError;

    fn try_from(byte: u8) -> Result<Self, LedgerError> {
        match byte {
            0x00 => Ok(Status::Ok),
            0x01 => Ok(Status::NotFound),
            0x02 => Ok(Status::Error),
            _ => Err(LedgerError::Protocol(format!(
                "Unknown response status: 0x{:02x}",
                byte
            ))),
        }
    }
}

/// A response to send to client
///
/// The body is always present on the wire, so an `Ok` carrying an empty
/// payload is distinct from `NotFound`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Status code
    pub status: Status,

    /// Value for READ, encoded result for the other verbs, message for ERROR
    pub body: Vec<u8>,
}

impl Response {
    /// Create an OK response carrying `body`
    pub fn ok(body: Vec<u8>) -> Self {
        Self {
            status: Status::Ok,
            body,
        }
    }

    /// Create an OK response with an empty body
    pub fn ok_empty() -> Self {
        Self::ok(Vec::new())
    }

    /// Create a NOT_FOUND response
    pub fn not_found() -> Self {
        Self {
            status: Status::NotFound,
            body: Vec::new(),
        }
    }

    /// Create an ERROR response
    pub fn error(message: &str) -> Self {
        Self {
            status: Status::Error,
            body: message.as_bytes().to_vec(),
        }
    }

    /// Error message carried by an ERROR response
    pub fn message(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}
