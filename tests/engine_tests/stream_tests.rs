//! Tests for streaming reads and writes
//!
//! These tests verify:
//! - Multi-chunk payloads round through write_stream/read_stream intact
//! - Reads never hand out more than one chunk at a time
//! - A failing source leaves the log untouched

use std::io::{self, Cursor, Read};

use ledgerkv::config::{Config, SyncStrategy};
use ledgerkv::engine::Engine;
use tempfile::TempDir;

const CHUNK: usize = 1024;

fn setup_temp_engine() -> (TempDir, Engine) {
    let temp_dir = TempDir::new().unwrap();
    let config = Config::builder()
        .data_path(temp_dir.path().join("stream.log"))
        .sync_strategy(SyncStrategy::EveryWrite)
        .stream_chunk_size(CHUNK)
        .build();
    let engine = Engine::open(config).unwrap();
    (temp_dir, engine)
}

fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 31 % 256) as u8).collect()
}

/// Yields `good` bytes, then fails
struct FailingReader {
    good: usize,
}

impl Read for FailingReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.good == 0 {
            return Err(io::Error::new(io::ErrorKind::Other, "source went away"));
        }
        let n = self.good.min(buf.len());
        buf[..n].fill(0x5A);
        self.good -= n;
        Ok(n)
    }
}

// =============================================================================
// Write Tests
// =============================================================================

#[test]
fn test_write_stream_multi_chunk() {
    let (_temp, engine) = setup_temp_engine();

    let payload = pattern(10 * CHUNK + 17);
    engine
        .write_stream(b"streamed", &mut Cursor::new(&payload))
        .unwrap();

    assert_eq!(engine.read(b"streamed").unwrap(), Some(payload));
    let entry = engine.read_entry(b"streamed").unwrap().unwrap();
    assert!(entry.is_valid_checksum());
}

#[test]
fn test_write_stream_empty_source() {
    let (_temp, engine) = setup_temp_engine();

    engine
        .write_stream(b"empty", &mut io::empty())
        .unwrap();

    assert_eq!(engine.read(b"empty").unwrap(), Some(Vec::new()));
    assert_eq!(engine.count(), 1);
}

#[test]
fn test_write_stream_matches_plain_write() {
    let (_temp, engine) = setup_temp_engine();

    let payload = pattern(3 * CHUNK);
    engine.write(b"plain", &payload).unwrap();
    engine
        .write_stream(b"streamed", &mut Cursor::new(&payload))
        .unwrap();

    let plain = engine.read_entry(b"plain").unwrap().unwrap();
    let streamed = engine.read_entry(b"streamed").unwrap().unwrap();
    assert_eq!(plain.checksum(), streamed.checksum());
    assert_eq!(plain.size(), streamed.size());
}

#[test]
fn test_write_stream_failure_publishes_nothing() {
    let (_temp, engine) = setup_temp_engine();

    engine.write(b"before", b"kept").unwrap();
    let tail = engine.tail_offset();

    let result = engine.write_stream(b"broken", &mut FailingReader { good: 5 * CHUNK });

    assert!(result.is_err());
    assert_eq!(engine.tail_offset(), tail);
    assert_eq!(engine.storage_size().unwrap(), tail);
    assert!(!engine.exists(b"broken"));
    assert_eq!(engine.read(b"before").unwrap(), Some(b"kept".to_vec()));
}

#[test]
fn test_write_stream_persists_across_reopen() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("reopen.log");
    let payload = pattern(4 * CHUNK + 1);

    {
        let engine = Engine::open_path(&path).unwrap();
        engine
            .write_stream(b"key", &mut Cursor::new(&payload))
            .unwrap();
        engine.close().unwrap();
    }

    let engine = Engine::open_path(&path).unwrap();
    assert_eq!(engine.read(b"key").unwrap(), Some(payload));
}

// =============================================================================
// Read Tests
// =============================================================================

#[test]
fn test_read_stream_bounded_chunks() {
    let (_temp, engine) = setup_temp_engine();

    let payload = pattern(5 * CHUNK + 300);
    engine.write(b"key", &payload).unwrap();

    let mut stream = engine.read_stream(b"key").unwrap().unwrap();
    assert_eq!(stream.remaining(), payload.len());

    let mut buffer = vec![0u8; 4 * CHUNK];
    let mut collected = Vec::new();
    loop {
        let n = stream.read(&mut buffer).unwrap();
        if n == 0 {
            break;
        }
        assert!(n <= CHUNK);
        collected.extend_from_slice(&buffer[..n]);
    }

    assert_eq!(collected, payload);
    assert_eq!(stream.remaining(), 0);
}

#[test]
fn test_read_stream_missing_key() {
    let (_temp, engine) = setup_temp_engine();

    assert!(engine.read_stream(b"missing").unwrap().is_none());

    engine.write(b"deleted", b"x").unwrap();
    engine.delete(b"deleted").unwrap();
    assert!(engine.read_stream(b"deleted").unwrap().is_none());
}

#[test]
fn test_read_stream_read_to_end() {
    let (_temp, engine) = setup_temp_engine();

    let payload = pattern(2 * CHUNK + 5);
    engine.write(b"key", &payload).unwrap();

    let mut stream = engine.read_stream(b"key").unwrap().unwrap();
    let mut collected = Vec::new();
    stream.read_to_end(&mut collected).unwrap();

    assert_eq!(collected, payload);
    assert_eq!(stream.entry().key(), b"key");
}

#[test]
fn test_entry_into_stream_small_buffer() {
    let (_temp, engine) = setup_temp_engine();

    engine.write(b"key", b"abcdefghij").unwrap();
    let entry = engine.read_entry(b"key").unwrap().unwrap();
    let mut stream = entry.into_stream(4);

    let mut buf = [0u8; 3];
    assert_eq!(stream.read(&mut buf).unwrap(), 3);
    assert_eq!(&buf, b"abc");
    assert_eq!(stream.remaining(), 7);
}
