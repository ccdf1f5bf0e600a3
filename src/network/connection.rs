//! Connection Handler
//!
//! Handles individual client connections.

use std::io::{BufReader, BufWriter, ErrorKind};
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, trace, warn};

use super::stage::StageBuffer;
use crate::config::Config;
use crate::engine::Engine;
use crate::error::{LedgerError, Result};
use crate::protocol::{
    encode_count, encode_flag, encode_hydrated, encode_optional_values, read_command,
    write_response, Command, Response,
};

/// Handles a single client connection
pub struct Connection {
    /// TCP stream reader (buffered for efficiency)
    reader: BufReader<TcpStream>,

    /// TCP stream writer (buffered for efficiency)
    writer: BufWriter<TcpStream>,

    /// Reference to the storage engine
    engine: Arc<Engine>,

    /// Writes staged by this client and not yet flushed
    stage: StageBuffer,

    /// Largest accepted request body
    max_frame_size: u32,

    /// Peer address for logging
    peer_addr: String,
}

impl Connection {
    /// Create a new connection handler
    ///
    /// Sets up buffered I/O and applies the configured timeouts
    pub fn new(stream: TcpStream, engine: Arc<Engine>, config: &Config) -> Result<Self> {
        // Get peer address for logging before we split the stream
        let peer_addr = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown".to_string());

        // Disable Nagle's algorithm for low latency
        stream.set_nodelay(true)?;

        let read_stream = stream.try_clone()?;
        let write_stream = stream;

        let mut connection = Self {
            reader: BufReader::new(read_stream),
            writer: BufWriter::new(write_stream),
            engine,
            stage: StageBuffer::new(config.stage_soft_limit_bytes),
            max_frame_size: config.max_frame_size,
            peer_addr,
        };
        connection.set_timeouts(config.read_timeout_ms, config.write_timeout_ms)?;
        Ok(connection)
    }

    /// Configure connection timeouts (0 = none)
    pub fn set_timeouts(&mut self, read_ms: u64, write_ms: u64) -> Result<()> {
        let to_timeout = |ms: u64| (ms > 0).then(|| Duration::from_millis(ms));
        self.reader.get_ref().set_read_timeout(to_timeout(read_ms))?;
        self.writer.get_ref().set_write_timeout(to_timeout(write_ms))?;
        Ok(())
    }

    /// Handle the connection (blocking until closed)
    ///
    /// Reads commands in a loop and sends responses. Whatever is still
    /// staged when the loop ends is discarded.
    pub fn handle(&mut self) -> Result<()> {
        debug!("Connection established from {}", self.peer_addr);
        let result = self.serve();

        if !self.stage.is_empty() {
            warn!(
                staged = self.stage.len(),
                bytes = self.stage.staged_bytes(),
                "Discarding unflushed staged writes from {}",
                self.peer_addr
            );
            self.stage.clear();
        }

        result
    }

    fn serve(&mut self) -> Result<()> {
        loop {
            let command = match read_command(&mut self.reader, self.max_frame_size) {
                Ok(cmd) => cmd,
                Err(LedgerError::Io(ref e)) if is_disconnect(e.kind()) => {
                    debug!("Client {} disconnected ({:?})", self.peer_addr, e.kind());
                    return Ok(());
                }
                Err(e) => {
                    warn!("Error reading from {}: {}", self.peer_addr, e);
                    // Send error response if possible
                    let _ = self.send_response(Response::error(&e.to_string()));
                    return Err(e);
                }
            };

            trace!("Received {:?} from {}", command.command_type(), self.peer_addr);

            let response = self.execute_command(command);

            if let Err(e) = self.send_response(response) {
                if let LedgerError::Io(ref io_err) = e {
                    if is_disconnect(io_err.kind()) || io_err.kind() == ErrorKind::BrokenPipe {
                        debug!(
                            "Client {} disconnected before response could be sent: {}",
                            self.peer_addr, e
                        );
                        return Ok(());
                    }
                }
                warn!("Error writing to {}: {}", self.peer_addr, e);
                return Err(e);
            }
        }
    }

    /// Execute a command and return a response
    fn execute_command(&mut self, command: Command) -> Response {
        let mutation = command.is_mutation();
        let command_type = command.command_type();

        match self.dispatch(command) {
            Ok(response) => {
                if mutation {
                    debug!("{:?} from {} published", command_type, self.peer_addr);
                }
                response
            }
            Err(LedgerError::NotFound) => Response::not_found(),
            Err(e) => {
                warn!("{:?} from {} failed: {}", command_type, self.peer_addr, e);
                Response::error(&e.to_string())
            }
        }
    }

    fn dispatch(&mut self, command: Command) -> Result<Response> {
        let engine = &self.engine;

        Ok(match command {
            Command::Read { key } => match engine.read(&key)? {
                Some(value) => Response::ok(value),
                None => Response::not_found(),
            },
            Command::Write { key, payload } => {
                engine.write(&key, &payload)?;
                Response::ok_empty()
            }
            Command::Delete { key } => {
                engine.delete(&key)?;
                Response::ok_empty()
            }
            Command::Ping => Response::ok_empty(),
            Command::Exists { key } => Response::ok(encode_flag(engine.exists(&key))),
            Command::Count => Response::ok(encode_count(engine.count() as u64)),
            Command::BatchWrite { entries } => {
                let pairs: Vec<(&[u8], &[u8])> = entries
                    .iter()
                    .map(|(key, payload)| (key.as_slice(), payload.as_slice()))
                    .collect();
                engine.batch_write(&pairs)?;
                Response::ok_empty()
            }
            Command::BatchRead { keys } => {
                let keys: Vec<&[u8]> = keys.iter().map(Vec::as_slice).collect();
                Response::ok(encode_optional_values(&engine.batch_read(&keys)?)?)
            }
            Command::BatchReadStructured { template } => {
                Response::ok(encode_hydrated(&engine.batch_read_structured(&template)?)?)
            }
            Command::StageWrite { key, payload } => {
                Response::ok(encode_flag(self.stage.insert(key, payload)))
            }
            Command::StageWriteFlush => {
                let flushed = self.stage.flush_into(engine)?;
                trace!("Flushed {} staged writes from {}", flushed, self.peer_addr);
                Response::ok_empty()
            }
        })
    }

    /// Send a response to the client
    fn send_response(&mut self, response: Response) -> Result<()> {
        write_response(&mut self.writer, &response)
    }

    /// Get the peer address string
    pub fn peer_addr(&self) -> &str {
        &self.peer_addr
    }
}

/// Errors that just mean the peer went away (or idled past the read timeout)
fn is_disconnect(kind: ErrorKind) -> bool {
    matches!(
        kind,
        ErrorKind::UnexpectedEof
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::WouldBlock
            | ErrorKind::TimedOut
    )
}
