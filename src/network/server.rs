//! TCP Server
//!
//! Accepts connections and runs each one on its own thread.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam::sync::WaitGroup;
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use super::connection::Connection;
use crate::config::Config;
use crate::engine::Engine;
use crate::error::{LedgerError, Result};
use crate::protocol::{write_response, Response};

/// How long the accept loop sleeps when no connection is pending
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// TCP server for LedgerKV
///
/// `run` blocks the calling thread; `shutdown` may be called from any other
/// thread holding a reference (typically through an `Arc<Server>`).
pub struct Server {
    config: Config,
    engine: Arc<Engine>,
    listener: TcpListener,
    local_addr: SocketAddr,
    shutdown: AtomicBool,
    active: Arc<AtomicUsize>,
    next_id: AtomicU64,
    /// Clones of every live client stream, so shutdown can unblock readers
    streams: Arc<Mutex<HashMap<u64, TcpStream>>>,
}

impl Server {
    /// Bind the listener described by `config.listen_addr`
    pub fn bind(config: Config, engine: Arc<Engine>) -> Result<Self> {
        let listener = TcpListener::bind(&config.listen_addr).map_err(|e| {
            LedgerError::Config(format!("cannot listen on {}: {}", config.listen_addr, e))
        })?;
        let local_addr = listener.local_addr()?;

        Ok(Self {
            config,
            engine,
            listener,
            local_addr,
            shutdown: AtomicBool::new(false),
            active: Arc::new(AtomicUsize::new(0)),
            next_id: AtomicU64::new(0),
            streams: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    /// Address actually bound (useful with port 0)
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Number of connections currently being served
    pub fn active_connections(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Start the server (blocking)
    ///
    /// Returns once `shutdown` has been requested and every connection
    /// thread has finished.
    pub fn run(&self) -> Result<()> {
        self.listener.set_nonblocking(true)?;
        info!(
            addr = %self.local_addr,
            max_connections = self.config.max_connections,
            "Server listening"
        );

        let wait_group = WaitGroup::new();

        while !self.shutdown.load(Ordering::SeqCst) {
            match self.listener.accept() {
                Ok((stream, peer)) => self.dispatch(stream, peer, wait_group.clone()),
                Err(e) if e.kind() == ErrorKind::WouldBlock => thread::sleep(ACCEPT_POLL_INTERVAL),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    warn!("Accept failed: {}", e);
                    thread::sleep(ACCEPT_POLL_INTERVAL);
                }
            }
        }

        let open: Vec<TcpStream> = self.streams.lock().drain().map(|(_, s)| s).collect();
        debug!("Closing {} open connections", open.len());
        for stream in open {
            let _ = stream.shutdown(Shutdown::Both);
        }

        wait_group.wait();
        info!(addr = %self.local_addr, "Server stopped");
        Ok(())
    }

    /// Signal the server to shutdown gracefully
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    fn dispatch(&self, stream: TcpStream, peer: SocketAddr, wait_group: WaitGroup) {
        if let Err(e) = stream.set_nonblocking(false) {
            warn!("Dropping connection from {}: {}", peer, e);
            return;
        }

        if self.active.load(Ordering::SeqCst) >= self.config.max_connections {
            warn!("Rejecting {}: connection limit reached", peer);
            let mut stream = stream;
            let _ = write_response(&mut stream, &Response::error("server busy"));
            return;
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        match stream.try_clone() {
            Ok(clone) => {
                self.streams.lock().insert(id, clone);
            }
            Err(e) => {
                warn!("Dropping connection from {}: {}", peer, e);
                return;
            }
        }

        self.active.fetch_add(1, Ordering::SeqCst);
        let engine = Arc::clone(&self.engine);
        let config = self.config.clone();
        let active = Arc::clone(&self.active);
        let streams = Arc::clone(&self.streams);

        let spawned = thread::Builder::new()
            .name(format!("ledgerkv-conn-{}", id))
            .spawn(move || {
                match Connection::new(stream, engine, &config) {
                    Ok(mut connection) => {
                        if let Err(e) = connection.handle() {
                            debug!("Connection {} closed with error: {}", connection.peer_addr(), e);
                        }
                    }
                    Err(e) => warn!("Failed to set up connection from {}: {}", peer, e),
                }
                streams.lock().remove(&id);
                active.fetch_sub(1, Ordering::SeqCst);
                drop(wait_group);
            });

        if let Err(e) = spawned {
            error!("Failed to spawn connection thread: {}", e);
            if let Some(stream) = self.streams.lock().remove(&id) {
                let _ = stream.shutdown(Shutdown::Both);
            }
            self.active.fetch_sub(1, Ordering::SeqCst);
        }
    }
}
