//! LedgerKV Server Binary
//!
//! Starts the TCP server for LedgerKV.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use ledgerkv::network::Server;
use ledgerkv::{Config, Engine, RecoveryMode, SyncStrategy};
use tracing_subscriber::{fmt, EnvFilter};

/// LedgerKV Server
#[derive(Parser, Debug)]
#[command(name = "ledgerkv-server")]
#[command(about = "Append-only key-value store server")]
#[command(version)]
struct Args {
    /// Log file path
    #[arg(short, long, default_value = "./ledgerkv.log")]
    data_path: PathBuf,

    /// Listen address (host:port)
    #[arg(short, long, default_value = "127.0.0.1:7878")]
    listen: String,

    /// Maximum concurrent connections
    #[arg(short, long, default_value = "1024")]
    max_connections: usize,

    /// When appended records are fsynced
    #[arg(long, value_enum, default_value = "every-n")]
    sync: SyncArg,

    /// Appends between fsyncs with `--sync every-n`
    #[arg(long, default_value = "100")]
    sync_every: usize,

    /// Cut a damaged log tail on startup instead of refusing to start
    #[arg(long)]
    truncate_tail: bool,

    /// Staged bytes per connection after which clients are told to flush
    #[arg(long)]
    stage_soft_limit: Option<usize>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum SyncArg {
    EveryWrite,
    EveryN,
    Never,
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,ledgerkv=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();

    tracing::info!("LedgerKV Server v{}", ledgerkv::VERSION);
    tracing::info!("Log file: {}", args.data_path.display());
    tracing::info!("Listen address: {}", args.listen);

    let sync_strategy = match args.sync {
        SyncArg::EveryWrite => SyncStrategy::EveryWrite,
        SyncArg::EveryN => SyncStrategy::EveryNWrites {
            count: args.sync_every.max(1),
        },
        SyncArg::Never => SyncStrategy::Never,
    };
    let recovery_mode = if args.truncate_tail {
        RecoveryMode::TruncateTail
    } else {
        RecoveryMode::Strict
    };

    // Build config from args
    let config = Config::builder()
        .data_path(&args.data_path)
        .listen_addr(&args.listen)
        .max_connections(args.max_connections)
        .sync_strategy(sync_strategy)
        .recovery_mode(recovery_mode)
        .stage_soft_limit_bytes(args.stage_soft_limit)
        .build();

    // Open engine
    let engine = match Engine::open(config.clone()) {
        Ok(e) => Arc::new(e),
        Err(e) => {
            tracing::error!("Failed to open engine: {}", e);
            std::process::exit(1);
        }
    };

    tracing::info!(live_keys = engine.count(), "Engine initialized successfully");

    // Start server
    let server = match Server::bind(config, engine) {
        Ok(server) => server,
        Err(e) => {
            tracing::error!("Failed to start server: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = server.run() {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}
