//! Configuration for LedgerKV
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;

use crate::protocol::DEFAULT_MAX_FRAME_SIZE;

/// Main configuration for a LedgerKV instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Path of the single append-only log file.
    /// Parent directories are created on open.
    pub data_path: PathBuf,

    /// How often appended records are fsynced
    pub sync_strategy: SyncStrategy,

    /// What to do with a damaged tail when the index is rebuilt
    pub recovery_mode: RecoveryMode,

    /// Recompute the payload CRC on every copying read
    pub verify_checksums_on_read: bool,

    /// Chunk size used by streaming reads and writes (in bytes)
    pub stream_chunk_size: usize,

    // -------------------------------------------------------------------------
    // Network Configuration
    // -------------------------------------------------------------------------
    /// TCP listen address
    pub listen_addr: String,

    /// Max concurrent client connections
    pub max_connections: usize,

    /// Connection read timeout (milliseconds, 0 = none)
    pub read_timeout_ms: u64,

    /// Connection write timeout (milliseconds, 0 = none)
    pub write_timeout_ms: u64,

    /// Largest accepted frame body (in bytes)
    pub max_frame_size: u32,

    /// Staged bytes per connection after which `stage_write` reports
    /// that a flush is due. `None` disables the signal.
    pub stage_soft_limit_bytes: Option<usize>,
}

/// Log sync strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStrategy {
    /// fsync after every append (safest, slowest)
    EveryWrite,

    /// fsync after N appends (balanced durability/performance)
    EveryNWrites { count: usize },

    /// Leave syncing to the OS; `close` still fsyncs
    Never,
}

/// Policy for records that fail validation while the index is rebuilt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryMode {
    /// Refuse to open and report the first bad record
    Strict,

    /// Cut the file back to the last good record
    TruncateTail,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_path: PathBuf::from("./ledgerkv.log"),
            sync_strategy: SyncStrategy::EveryNWrites { count: 100 },
            recovery_mode: RecoveryMode::Strict,
            verify_checksums_on_read: true,
            stream_chunk_size: 64 * 1024, // 64 KB
            listen_addr: "127.0.0.1:7878".to_string(),
            max_connections: 1024,
            read_timeout_ms: 0,
            write_timeout_ms: 5000,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            stage_soft_limit_bytes: None,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the log file path
    pub fn data_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_path = path.into();
        self
    }

    /// Set the sync strategy
    pub fn sync_strategy(mut self, strategy: SyncStrategy) -> Self {
        self.config.sync_strategy = strategy;
        self
    }

    /// Set the recovery mode
    pub fn recovery_mode(mut self, mode: RecoveryMode) -> Self {
        self.config.recovery_mode = mode;
        self
    }

    /// Enable or disable checksum verification on reads
    pub fn verify_checksums_on_read(mut self, verify: bool) -> Self {
        self.config.verify_checksums_on_read = verify;
        self
    }

    /// Set the streaming chunk size (in bytes, at least 1)
    pub fn stream_chunk_size(mut self, size: usize) -> Self {
        self.config.stream_chunk_size = size.max(1);
        self
    }

    /// Set the TCP listen address
    pub fn listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.listen_addr = addr.into();
        self
    }

    /// Set the maximum number of concurrent connections
    pub fn max_connections(mut self, count: usize) -> Self {
        self.config.max_connections = count;
        self
    }

    /// Set the read timeout (in milliseconds)
    pub fn read_timeout_ms(mut self, ms: u64) -> Self {
        self.config.read_timeout_ms = ms;
        self
    }

    /// Set the write timeout (in milliseconds)
    pub fn write_timeout_ms(mut self, ms: u64) -> Self {
        self.config.write_timeout_ms = ms;
        self
    }

    /// Set the maximum frame body size (in bytes)
    pub fn max_frame_size(mut self, size: u32) -> Self {
        self.config.max_frame_size = size;
        self
    }

    /// Set the staging soft limit (in bytes)
    pub fn stage_soft_limit_bytes(mut self, limit: Option<usize>) -> Self {
        self.config.stage_soft_limit_bytes = limit;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
