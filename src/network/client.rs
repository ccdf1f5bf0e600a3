//! TCP Client
//!
//! Blocking client for a LedgerKV server. One request is in flight per
//! client at a time; share it behind an `Arc` or open one per thread.

use std::io::{BufReader, BufWriter, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};

use parking_lot::Mutex;
use tracing::debug;

use crate::batch::{Hydrated, Template};
use crate::error::{LedgerError, Result};
use crate::protocol::{
    decode_count, decode_flag, decode_hydrated, decode_optional_values, encode_command,
    read_response, Command, Response, Status, DEFAULT_MAX_FRAME_SIZE,
};

/// Connection lifecycle: only `Ready` issues operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Ready,
    Closed,
}

/// Client for the LedgerKV wire protocol
pub struct Client {
    addrs: Vec<SocketAddr>,
    max_frame_size: u32,
    inner: Mutex<Inner>,
}

struct Inner {
    state: ConnectionState,
    transport: Option<Transport>,
}

struct Transport {
    reader: BufReader<TcpStream>,
    writer: BufWriter<TcpStream>,
}

impl Transport {
    fn open(addrs: &[SocketAddr]) -> Result<Self> {
        let stream = TcpStream::connect(addrs)
            .map_err(|e| LedgerError::Connection(format!("connect to {:?}: {}", addrs, e)))?;
        stream.set_nodelay(true)?;

        Ok(Self {
            reader: BufReader::new(stream.try_clone()?),
            writer: BufWriter::new(stream),
        })
    }

    fn round_trip(&mut self, frame: &[u8], max_frame_size: u32) -> Result<Response> {
        self.writer.write_all(frame)?;
        self.writer.flush()?;
        read_response(&mut self.reader, max_frame_size)
    }
}

impl Inner {
    fn close(&mut self) {
        if let Some(transport) = self.transport.take() {
            let _ = transport.writer.get_ref().shutdown(std::net::Shutdown::Both);
        }
        self.state = ConnectionState::Closed;
    }
}

impl Client {
    /// Connect to a server at `addr` (`"host:port"`, `(host, port)`, ...)
    pub fn connect<A: ToSocketAddrs>(addr: A) -> Result<Self> {
        let addrs: Vec<SocketAddr> = addr
            .to_socket_addrs()
            .map_err(|e| LedgerError::Connection(format!("cannot resolve address: {}", e)))?
            .collect();
        if addrs.is_empty() {
            return Err(LedgerError::Connection(
                "address resolved to nothing".to_string(),
            ));
        }

        let client = Self {
            addrs,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            inner: Mutex::new(Inner {
                state: ConnectionState::Connecting,
                transport: None,
            }),
        };
        client.reconnect()?;
        Ok(client)
    }

    /// Set the largest response body this client accepts
    pub fn with_max_frame_size(mut self, max_frame_size: u32) -> Self {
        self.max_frame_size = max_frame_size;
        self
    }

    /// Drop the current socket (if any) and dial again
    pub fn reconnect(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.close();
        inner.state = ConnectionState::Connecting;

        match Transport::open(&self.addrs) {
            Ok(transport) => {
                inner.transport = Some(transport);
                inner.state = ConnectionState::Ready;
                debug!("Connected to {:?}", self.addrs);
                Ok(())
            }
            Err(e) => {
                inner.state = ConnectionState::Closed;
                Err(e)
            }
        }
    }

    /// Close the connection; later operations fail until `reconnect`
    pub fn close(&self) {
        self.inner.lock().close();
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.lock().state
    }

    // =========================================================================
    // Operations
    // =========================================================================

    /// Health check
    pub fn ping(&self) -> Result<()> {
        self.request(&Command::Ping).map(drop)
    }

    pub fn write(&self, key: &[u8], payload: &[u8]) -> Result<()> {
        self.request(&Command::Write {
            key: key.to_vec(),
            payload: payload.to_vec(),
        })
        .map(drop)
    }

    /// Current value of `key`, `None` if absent or deleted
    pub fn read(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let response = self.request(&Command::Read { key: key.to_vec() })?;
        match response.status {
            Status::NotFound => Ok(None),
            _ => Ok(Some(response.body)),
        }
    }

    pub fn delete(&self, key: &[u8]) -> Result<()> {
        self.request(&Command::Delete { key: key.to_vec() }).map(drop)
    }

    pub fn exists(&self, key: &[u8]) -> Result<bool> {
        let response = self.request(&Command::Exists { key: key.to_vec() })?;
        self.decode(decode_flag(&response.body))
    }

    /// Number of live keys on the server
    pub fn count(&self) -> Result<u64> {
        let response = self.request(&Command::Count)?;
        self.decode(decode_count(&response.body))
    }

    pub fn batch_write(&self, entries: &[(&[u8], &[u8])]) -> Result<()> {
        let entries = entries
            .iter()
            .map(|&(key, payload)| (key.to_vec(), payload.to_vec()))
            .collect();
        self.request(&Command::BatchWrite { entries }).map(drop)
    }

    /// `result[i]` answers `keys[i]`
    pub fn batch_read(&self, keys: &[&[u8]]) -> Result<Vec<Option<Vec<u8>>>> {
        let keys = keys.iter().map(|key| key.to_vec()).collect();
        let response = self.request(&Command::BatchRead { keys })?;
        self.decode(decode_optional_values(&response.body))
    }

    pub fn batch_read_structured(&self, template: &Template) -> Result<Hydrated> {
        let response = self.request(&Command::BatchReadStructured {
            template: template.clone(),
        })?;
        self.decode(decode_hydrated(&response.body))
    }

    /// Stage a write on the server; returns whether a flush is due
    pub fn stage_write(&self, key: &[u8], payload: &[u8]) -> Result<bool> {
        let response = self.request(&Command::StageWrite {
            key: key.to_vec(),
            payload: payload.to_vec(),
        })?;
        self.decode(decode_flag(&response.body))
    }

    /// Publish everything this connection has staged
    pub fn stage_write_flush(&self) -> Result<()> {
        self.request(&Command::StageWriteFlush).map(drop)
    }

    // =========================================================================
    // Plumbing
    // =========================================================================

    /// Send one command and wait for its answer
    ///
    /// Transport failures and malformed answers close the connection.
    /// An ERROR answer becomes `LedgerError::Remote`.
    fn request(&self, command: &Command) -> Result<Response> {
        let frame = encode_command(command)?;

        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        let transport = match (inner.state, inner.transport.as_mut()) {
            (ConnectionState::Ready, Some(transport)) => transport,
            (state, _) => {
                return Err(LedgerError::Connection(format!(
                    "client is not ready ({:?})",
                    state
                )))
            }
        };

        let response = match transport.round_trip(&frame, self.max_frame_size) {
            Ok(response) => response,
            Err(e) => {
                inner.close();
                return Err(match e {
                    LedgerError::Io(io) => LedgerError::Connection(io.to_string()),
                    other => other,
                });
            }
        };

        match response.status {
            Status::Error => Err(LedgerError::Remote(response.message())),
            _ => Ok(response),
        }
    }

    /// Malformed answer bodies also leave the stream in an unknown state
    fn decode<T>(&self, decoded: Result<T>) -> Result<T> {
        if decoded.is_err() {
            self.close();
        }
        decoded
    }
}
