//! # LedgerKV
//!
//! A single-file, append-only key-value store with:
//! - CRC32-checked records in one log file
//! - Zero-copy reads through a memory map
//! - Single-writer/multi-reader concurrency model
//! - Streaming, batch and structured reads and writes
//! - TCP-based client protocol with per-connection staged writes
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │              TCP Server / Client (network)                   │
//! │         framing (protocol) + staging per connection          │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                      Engine                                  │
//! │            (Single Writer / Multi Reader)                    │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!          ┌────────────┴────────────┐
//!          │                         │
//!          ▼                         ▼
//!   ┌─────────────┐          ┌─────────────┐
//!   │  LogWriter  │          │  KeyIndex   │
//!   │  (Append)   │          │  (RwLock)   │
//!   └──────┬──────┘          └──────┬──────┘
//!          │                        │
//!          ▼                        ▼
//!   ┌─────────────┐          ┌─────────────┐
//!   │  Log file   │─────────▶│ Mmap/Entry  │
//!   │  (records)  │          │ (zero-copy) │
//!   └─────────────┘          └─────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod digest;
pub mod error;

pub mod batch;
pub mod engine;
pub mod entry;
pub mod index;
pub mod namespace;
pub mod network;
pub mod protocol;
pub mod record;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use batch::{Hydrated, Template};
pub use config::{Config, RecoveryMode, SyncStrategy};
pub use engine::{Engine, EntryIter};
pub use entry::{Entry, EntryMetadata, EntryStream};
pub use error::{LedgerError, Result};
pub use namespace::NamespaceHasher;
pub use network::{Client, ConnectionState, Server};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of LedgerKV
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
