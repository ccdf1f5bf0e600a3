//! Network Module
//!
//! TCP server and client handling.
//!
//! ## Architecture
//! - Single acceptor thread
//! - One thread per connection, capped by `max_connections`
//! - Per-connection staging buffer for `stage_write`
//! - Commands routed through Engine

mod client;
mod connection;
mod server;
mod stage;

pub use client::{Client, ConnectionState};
pub use connection::Connection;
pub use server::Server;
pub use stage::StageBuffer;
