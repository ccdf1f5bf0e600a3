//! LedgerKV CLI Client
//!
//! Command-line interface for interacting with a LedgerKV server.

use std::io::Write;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use ledgerkv::{Client, Result};

/// LedgerKV CLI
#[derive(Parser, Debug)]
#[command(name = "ledgerkv-cli")]
#[command(about = "CLI for the LedgerKV key-value store")]
#[command(version)]
struct Args {
    /// Server address
    #[arg(short, long, default_value = "127.0.0.1:7878")]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Get a value by key
    Get {
        /// The key to get
        key: String,
    },

    /// Set a key-value pair
    Set {
        /// The key to set
        key: String,

        /// The value to set
        value: String,
    },

    /// Delete a key
    Del {
        /// The key to delete
        key: String,
    },

    /// Check whether a key holds a value
    Exists {
        /// The key to check
        key: String,
    },

    /// Count live keys
    Count,

    /// Ping the server
    Ping,
}

fn main() -> ExitCode {
    let args = Args::parse();

    match run(args) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<ExitCode> {
    let client = Client::connect(args.server.as_str())?;

    match args.command {
        Commands::Get { key } => match client.read(key.as_bytes())? {
            Some(value) => {
                let mut stdout = std::io::stdout().lock();
                stdout.write_all(&value)?;
                stdout.write_all(b"\n")?;
            }
            None => {
                eprintln!("(nil)");
                return Ok(ExitCode::from(1));
            }
        },
        Commands::Set { key, value } => {
            client.write(key.as_bytes(), value.as_bytes())?;
            println!("OK");
        }
        Commands::Del { key } => {
            client.delete(key.as_bytes())?;
            println!("OK");
        }
        Commands::Exists { key } => {
            println!("{}", client.exists(key.as_bytes())?);
        }
        Commands::Count => {
            println!("{}", client.count()?);
        }
        Commands::Ping => {
            client.ping()?;
            println!("PONG");
        }
    }

    client.close();
    Ok(ExitCode::SUCCESS)
}
