//! Error types for LedgerKV
//!
//! Provides a unified error type for all operations.

use thiserror::Error;

/// Result type alias using LedgerError
pub type Result<T> = std::result::Result<T, LedgerError>;

/// Unified error type for LedgerKV operations
#[derive(Debug, Error)]
pub enum LedgerError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Log Errors
    // -------------------------------------------------------------------------
    #[error("Corruption detected at offset {offset}: {reason}")]
    Corruption { offset: u64, reason: String },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Key not found")]
    NotFound,

    // -------------------------------------------------------------------------
    // Serialization Errors
    // -------------------------------------------------------------------------
    #[error("Serialization error: {0}")]
    Serialization(String),

    // -------------------------------------------------------------------------
    // Network Errors
    // -------------------------------------------------------------------------
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Remote error: {0}")]
    Remote(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl LedgerError {
    pub(crate) fn corruption(offset: u64, reason: impl Into<String>) -> Self {
        LedgerError::Corruption {
            offset,
            reason: reason.into(),
        }
    }
}

impl From<bincode::Error> for LedgerError {
    fn from(e: bincode::Error) -> Self {
        LedgerError::Serialization(e.to_string())
    }
}
