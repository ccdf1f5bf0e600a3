//! Client/Server Tests
//!
//! End-to-end tests over loopback TCP:
//! - Every verb through a real server
//! - Staged writes stay private to their connection until flushed
//! - Malformed requests only cost the sender its connection
//! - Connection lifecycle (close, reconnect, shutdown)
//! - Concurrent clients

use std::fs::OpenOptions;
use std::io::{Seek, SeekFrom, Write};
use std::net::{SocketAddr, TcpStream};
use std::path::Path;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use ledgerkv::batch::{Hydrated, Template};
use ledgerkv::config::{Config, SyncStrategy};
use ledgerkv::network::{Client, ConnectionState, Server};
use ledgerkv::protocol::{read_response, CommandType, Status, DEFAULT_MAX_FRAME_SIZE};
use ledgerkv::{Engine, LedgerError};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

struct TestServer {
    _temp_dir: TempDir,
    engine: Arc<Engine>,
    server: Arc<Server>,
    handle: Option<JoinHandle<ledgerkv::Result<()>>>,
}

impl TestServer {
    fn start() -> Self {
        Self::start_with(|builder| builder)
    }

    fn start_with(
        customize: impl FnOnce(ledgerkv::config::ConfigBuilder) -> ledgerkv::config::ConfigBuilder,
    ) -> Self {
        let temp_dir = TempDir::new().unwrap();
        let builder = Config::builder()
            .data_path(temp_dir.path().join("server.log"))
            .sync_strategy(SyncStrategy::EveryWrite)
            .listen_addr("127.0.0.1:0");
        let config = customize(builder).build();

        let engine = Arc::new(Engine::open(config.clone()).unwrap());
        let server = Arc::new(Server::bind(config, Arc::clone(&engine)).unwrap());

        let runner = Arc::clone(&server);
        let handle = thread::spawn(move || runner.run());

        Self {
            _temp_dir: temp_dir,
            engine,
            server,
            handle: Some(handle),
        }
    }

    fn addr(&self) -> SocketAddr {
        self.server.local_addr()
    }

    fn client(&self) -> Client {
        Client::connect(self.addr()).unwrap()
    }

    fn stop(&mut self) {
        self.server.shutdown();
        if let Some(handle) = self.handle.take() {
            handle.join().unwrap().unwrap();
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn corrupt_byte(path: &Path, offset: u64) {
    let mut file = OpenOptions::new().write(true).open(path).unwrap();
    file.seek(SeekFrom::Start(offset)).unwrap();
    file.write_all(b"!").unwrap();
    file.sync_all().unwrap();
}

fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(Instant::now() < deadline, "condition not met in time");
        thread::sleep(Duration::from_millis(10));
    }
}

// =============================================================================
// Basic Verb Tests
// =============================================================================

#[test]
fn test_ping() {
    let server = TestServer::start();
    let client = server.client();

    assert_eq!(client.state(), ConnectionState::Ready);
    client.ping().unwrap();
}

#[test]
fn test_hello_world() {
    let server = TestServer::start();
    let client = server.client();

    client.write(b"hello", b"world").unwrap();

    assert_eq!(client.read(b"hello").unwrap(), Some(b"world".to_vec()));
    assert_eq!(server.engine.read(b"hello").unwrap(), Some(b"world".to_vec()));
}

#[test]
fn test_read_missing_and_empty() {
    let server = TestServer::start();
    let client = server.client();

    client.write(b"empty", b"").unwrap();

    assert_eq!(client.read(b"missing").unwrap(), None);
    assert_eq!(client.read(b"empty").unwrap(), Some(Vec::new()));
}

#[test]
fn test_delete_exists_count() {
    let server = TestServer::start();
    let client = server.client();

    client.write(b"a", b"1").unwrap();
    client.write(b"b", b"2").unwrap();
    assert_eq!(client.count().unwrap(), 2);
    assert!(client.exists(b"a").unwrap());

    client.delete(b"a").unwrap();
    client.delete(b"a").unwrap();

    assert!(!client.exists(b"a").unwrap());
    assert_eq!(client.count().unwrap(), 1);
    assert_eq!(client.read(b"a").unwrap(), None);
}

#[test]
fn test_batch_write_and_read() {
    let server = TestServer::start();
    let client = server.client();

    client
        .batch_write(&[(b"k1".as_slice(), b"v1".as_slice()), (b"k2", b"v2")])
        .unwrap();

    let values = client.batch_read(&[b"k1".as_slice(), b"k2", b"k3"]).unwrap();
    assert_eq!(values, vec![Some(b"v1".to_vec()), Some(b"v2".to_vec()), None]);
}

#[test]
fn test_batch_read_structured() {
    let server = TestServer::start();
    let client = server.client();

    client.write(b"user:name", b"ada").unwrap();

    let template = Template::map([
        ("name", Template::key(b"user:name".to_vec())),
        ("email", Template::key(b"user:email".to_vec())),
    ]);
    let hydrated = client.batch_read_structured(&template).unwrap();

    assert_eq!(
        hydrated.get("name").and_then(Hydrated::as_value),
        Some(Some(b"ada".as_slice()))
    );
    assert_eq!(hydrated.get("email").and_then(Hydrated::as_value), Some(None));
}

#[test]
fn test_large_payload() {
    let server = TestServer::start();
    let client = server.client();

    let payload: Vec<u8> = (0..512 * 1024).map(|i| (i % 253) as u8).collect();
    client.write(b"big", &payload).unwrap();

    assert_eq!(client.read(b"big").unwrap(), Some(payload));
}

// =============================================================================
// Staged Write Tests
// =============================================================================

#[test]
fn test_staged_writes_invisible_until_flush() {
    let server = TestServer::start();
    let writer = server.client();
    let reader = server.client();

    assert!(!writer.stage_write(b"staged1", b"a").unwrap());
    assert!(!writer.stage_write(b"staged2", b"b").unwrap());

    assert_eq!(reader.read(b"staged1").unwrap(), None);
    assert_eq!(writer.read(b"staged1").unwrap(), None);
    assert_eq!(reader.count().unwrap(), 0);

    writer.stage_write_flush().unwrap();

    assert_eq!(reader.read(b"staged1").unwrap(), Some(b"a".to_vec()));
    assert_eq!(reader.read(b"staged2").unwrap(), Some(b"b".to_vec()));
    assert_eq!(reader.count().unwrap(), 2);
}

#[test]
fn test_staged_last_write_wins() {
    let server = TestServer::start();
    let client = server.client();

    client.stage_write(b"k", b"first").unwrap();
    client.stage_write(b"k", b"second").unwrap();
    client.stage_write_flush().unwrap();

    assert_eq!(client.read(b"k").unwrap(), Some(b"second".to_vec()));
    assert_eq!(client.count().unwrap(), 1);
}

#[test]
fn test_flush_only_affects_own_connection() {
    let server = TestServer::start();
    let first = server.client();
    let second = server.client();

    first.stage_write(b"mine", b"1").unwrap();
    second.stage_write(b"yours", b"2").unwrap();

    first.stage_write_flush().unwrap();

    assert_eq!(second.read(b"mine").unwrap(), Some(b"1".to_vec()));
    assert_eq!(first.read(b"yours").unwrap(), None);

    second.stage_write_flush().unwrap();
    assert_eq!(first.read(b"yours").unwrap(), Some(b"2".to_vec()));
}

#[test]
fn test_stage_soft_limit_signals_flush() {
    let server = TestServer::start_with(|b| b.stage_soft_limit_bytes(Some(16)));
    let client = server.client();

    assert!(!client.stage_write(b"k1", b"12345").unwrap());
    assert!(client.stage_write(b"k2", b"1234567890").unwrap());

    // Signal only; nothing is applied automatically
    assert_eq!(client.read(b"k1").unwrap(), None);

    client.stage_write_flush().unwrap();
    assert_eq!(client.count().unwrap(), 2);
}

#[test]
fn test_flush_with_nothing_staged() {
    let server = TestServer::start();
    let client = server.client();

    client.stage_write_flush().unwrap();
    assert_eq!(client.count().unwrap(), 0);
}

#[test]
fn test_failed_call_keeps_staged_writes() {
    let server = TestServer::start();
    let client = server.client();

    client.write(b"damaged", b"pristine").unwrap();
    let payload_offset = server
        .engine
        .read_entry(b"damaged")
        .unwrap()
        .unwrap()
        .start_offset();
    corrupt_byte(server.engine.path(), payload_offset);

    client.stage_write(b"staged1", b"a").unwrap();
    client.stage_write(b"staged2", b"b").unwrap();

    // Checksum failure comes back as an ERROR answer on the same connection
    assert!(matches!(
        client.read(b"damaged"),
        Err(LedgerError::Remote(_))
    ));
    assert_eq!(client.state(), ConnectionState::Ready);

    client.stage_write_flush().unwrap();
    assert_eq!(client.read(b"staged1").unwrap(), Some(b"a".to_vec()));
    assert_eq!(client.read(b"staged2").unwrap(), Some(b"b".to_vec()));
}

#[test]
fn test_unflushed_writes_discarded_on_disconnect() {
    let server = TestServer::start();

    {
        let client = server.client();
        client.stage_write(b"lost", b"never flushed").unwrap();
        client.close();
    }
    wait_until(|| server.server.active_connections() == 0);

    let client = server.client();
    client.stage_write_flush().unwrap();
    assert_eq!(client.read(b"lost").unwrap(), None);
}

// =============================================================================
// Connection Lifecycle Tests
// =============================================================================

#[test]
fn test_close_and_reconnect() {
    let server = TestServer::start();
    let client = server.client();

    client.write(b"k", b"v").unwrap();
    client.close();

    assert_eq!(client.state(), ConnectionState::Closed);
    assert!(matches!(client.ping(), Err(LedgerError::Connection(_))));

    client.reconnect().unwrap();
    assert_eq!(client.state(), ConnectionState::Ready);
    assert_eq!(client.read(b"k").unwrap(), Some(b"v".to_vec()));
}

#[test]
fn test_connect_to_closed_port_fails() {
    let addr = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap()
    };

    assert!(matches!(
        Client::connect(addr),
        Err(LedgerError::Connection(_))
    ));
}

#[test]
fn test_connect_with_host_port_tuple() {
    let server = TestServer::start();

    let client = Client::connect(("127.0.0.1", server.addr().port())).unwrap();
    client.ping().unwrap();
}

#[test]
fn test_oversized_frame_closes_connection() {
    let server = TestServer::start_with(|b| b.max_frame_size(1024));
    let client = server.client();

    assert!(client.write(b"k", &vec![0u8; 4096]).is_err());
    wait_until(|| server.server.active_connections() == 0);
    assert!(client.ping().is_err());

    client.reconnect().unwrap();
    client.ping().unwrap();
    assert_eq!(client.read(b"k").unwrap(), None);
}

#[test]
fn test_deeply_nested_template_rejected() {
    let server = TestServer::start();
    let bystander = server.client();
    bystander.write(b"k", b"v").unwrap();

    // 200k one-element lists around a single key, bincode layout
    let mut body = Vec::new();
    for _ in 0..200_000 {
        body.extend_from_slice(&2u32.to_le_bytes());
        body.extend_from_slice(&1u64.to_le_bytes());
    }
    body.extend_from_slice(&0u32.to_le_bytes());
    body.extend_from_slice(&1u64.to_le_bytes());
    body.push(b'k');

    let mut stream = TcpStream::connect(server.addr()).unwrap();
    stream.write_all(&[CommandType::BatchReadStructured as u8]).unwrap();
    stream.write_all(&(body.len() as u32).to_be_bytes()).unwrap();
    stream.write_all(&body).unwrap();

    let response = read_response(&mut stream, DEFAULT_MAX_FRAME_SIZE).unwrap();
    assert_eq!(response.status, Status::Error);
    assert!(response.message().contains("nested deeper"));

    // The server and its other connections carry on
    bystander.ping().unwrap();
    assert_eq!(bystander.read(b"k").unwrap(), Some(b"v".to_vec()));
    server.client().ping().unwrap();
}

#[test]
fn test_connection_limit() {
    let server = TestServer::start_with(|b| b.max_connections(1));
    let first = server.client();
    first.ping().unwrap();

    // Rejected with an ERROR answer (or a reset, if it races the close)
    let second = server.client();
    assert!(second.ping().is_err());

    drop(first);
    wait_until(|| server.server.active_connections() == 0);

    let third = server.client();
    third.ping().unwrap();
}

#[test]
fn test_shutdown_closes_clients() {
    let mut server = TestServer::start();
    let client = server.client();
    client.ping().unwrap();

    server.stop();

    assert!(client.ping().is_err());
    assert_eq!(client.state(), ConnectionState::Closed);
}

#[test]
fn test_writes_survive_server_restart() {
    let temp_dir = TempDir::new().unwrap();
    let config = Config::builder()
        .data_path(temp_dir.path().join("restart.log"))
        .listen_addr("127.0.0.1:0")
        .build();

    for round in 0..2u8 {
        let engine = Arc::new(Engine::open(config.clone()).unwrap());
        let server = Arc::new(Server::bind(config.clone(), Arc::clone(&engine)).unwrap());
        let runner = Arc::clone(&server);
        let handle = thread::spawn(move || runner.run());

        let client = Client::connect(server.local_addr()).unwrap();
        if round == 0 {
            client.write(b"durable", b"yes").unwrap();
        } else {
            assert_eq!(client.read(b"durable").unwrap(), Some(b"yes".to_vec()));
        }
        client.close();

        server.shutdown();
        handle.join().unwrap().unwrap();
        drop(server);
        Arc::try_unwrap(engine).ok().unwrap().close().unwrap();
    }
}

// =============================================================================
// Concurrency Tests
// =============================================================================

#[test]
fn test_concurrent_clients_distinct_keys() {
    let server = TestServer::start();
    let addr = server.addr();

    let handles: Vec<_> = (0..6)
        .map(|t| {
            thread::spawn(move || {
                let client = Client::connect(addr).unwrap();
                for i in 0..50 {
                    let key = format!("client{}_key{}", t, i);
                    let value = format!("client{}_value{}", t, i);
                    client.write(key.as_bytes(), value.as_bytes()).unwrap();
                    assert_eq!(
                        client.read(key.as_bytes()).unwrap(),
                        Some(value.into_bytes())
                    );
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(server.client().count().unwrap(), 300);
}

#[test]
fn test_shared_client_across_threads() {
    let server = TestServer::start();
    let client = Arc::new(server.client());

    let handles: Vec<_> = (0..4)
        .map(|t| {
            let client = Arc::clone(&client);
            thread::spawn(move || {
                for i in 0..25 {
                    client
                        .write(format!("shared{}_{}", t, i).as_bytes(), b"v")
                        .unwrap();
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(client.count().unwrap(), 100);
}
