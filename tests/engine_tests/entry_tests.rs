//! Tests for zero-copy entries
//!
//! These tests verify:
//! - Entries compare equal to the written payload, including edge sizes
//! - Offsets and checksums describe the bytes on disk
//! - An entry stays valid while later writes remap the log

use std::fs;

use ledgerkv::config::{Config, SyncStrategy};
use ledgerkv::digest::compute_checksum;
use ledgerkv::engine::Engine;
use tempfile::TempDir;

fn setup_temp_engine() -> (TempDir, Engine) {
    let temp_dir = TempDir::new().unwrap();
    let config = Config::builder()
        .data_path(temp_dir.path().join("entries.log"))
        .sync_strategy(SyncStrategy::EveryWrite)
        .build();
    let engine = Engine::open(config).unwrap();
    (temp_dir, engine)
}

// =============================================================================
// Equality Tests
// =============================================================================

#[test]
fn test_entry_equals_payload() {
    let (_temp, engine) = setup_temp_engine();

    engine.write(b"key", b"some payload").unwrap();
    let entry = engine.read_entry(b"key").unwrap().unwrap();

    assert_eq!(entry, b"some payload".to_vec());
    assert_eq!(entry, &b"some payload"[..]);
    assert_eq!(&*entry, b"some payload");
    assert_eq!(entry.as_ref(), b"some payload");
    assert_eq!(entry.size(), 12);
    assert_eq!(entry.key(), b"key");
}

#[test]
fn test_entry_zero_length_payload() {
    let (_temp, engine) = setup_temp_engine();

    engine.write(b"empty", b"").unwrap();
    let entry = engine.read_entry(b"empty").unwrap().unwrap();

    assert_eq!(entry, Vec::<u8>::new());
    assert_eq!(entry.size(), 0);
    assert_eq!(entry.start_offset(), entry.end_offset());
    assert!(entry.is_valid_checksum());
}

#[test]
fn test_entry_large_payload() {
    let (_temp, engine) = setup_temp_engine();

    let payload: Vec<u8> = (0..300 * 1024).map(|i| (i % 251) as u8).collect();
    engine.write(b"large", &payload).unwrap();

    let entry = engine.read_entry(b"large").unwrap().unwrap();
    assert_eq!(entry, payload);
    assert_eq!(entry.size(), payload.len());

    let range = entry.address_range();
    assert_eq!(range.end as usize - range.start as usize, payload.len());
}

// =============================================================================
// Metadata Tests
// =============================================================================

#[test]
fn test_entry_offsets_match_file() {
    let (_temp, engine) = setup_temp_engine();

    engine.write(b"first", b"aaaa").unwrap();
    engine.write(b"second", b"bbbbbb").unwrap();

    let entry = engine.read_entry(b"second").unwrap().unwrap();
    let on_disk = fs::read(engine.path()).unwrap();

    let range = entry.offset_range();
    assert_eq!(&on_disk[range.start as usize..range.end as usize], b"bbbbbb");
    assert_eq!(entry.end_offset() - entry.start_offset(), 6);
    assert!(entry.record_offset() < entry.start_offset());
    assert!(entry.end_offset() <= entry.file_size());
    assert_eq!(entry.file_size(), on_disk.len() as u64);
}

#[test]
fn test_read_metadata() {
    let (_temp, engine) = setup_temp_engine();

    engine.write(b"meta", b"described").unwrap();
    let entry = engine.read_entry(b"meta").unwrap().unwrap();
    let metadata = engine.read_metadata(b"meta").unwrap().unwrap();

    assert_eq!(metadata, entry.metadata());
    assert_eq!(metadata.record_offset, entry.record_offset());
    assert_eq!(metadata.payload_offset, entry.start_offset());
    assert_eq!(metadata.payload_len, 9);
    assert_eq!(metadata.checksum, crc32fast::hash(b"described"));

    engine.delete(b"meta").unwrap();
    assert_eq!(engine.read_metadata(b"meta").unwrap(), None);
    assert_eq!(engine.read_metadata(b"never").unwrap(), None);
}

#[test]
fn test_entry_checksum() {
    let (_temp, engine) = setup_temp_engine();

    engine.write(b"key", b"checked").unwrap();
    let entry = engine.read_entry(b"key").unwrap().unwrap();

    assert_eq!(entry.raw_checksum(), compute_checksum(b"checked"));
    assert_eq!(entry.checksum(), crc32fast::hash(b"checked"));
    assert!(entry.is_valid_checksum());
    entry.verify().unwrap();
}

#[test]
fn test_entry_debug_does_not_dump_payload() {
    let (_temp, engine) = setup_temp_engine();

    engine.write(b"key", b"secret-payload").unwrap();
    let entry = engine.read_entry(b"key").unwrap().unwrap();

    let debug = format!("{:?}", entry);
    assert!(debug.starts_with("Entry"));
    assert!(!debug.contains("secret-payload"));
}

// =============================================================================
// Lifetime Tests
// =============================================================================

#[test]
fn test_entry_survives_later_writes() {
    let (_temp, engine) = setup_temp_engine();

    engine.write(b"pinned", b"original").unwrap();
    let entry = engine.read_entry(b"pinned").unwrap().unwrap();
    let file_size = entry.file_size();

    // Grow the log well past the original mapping
    for i in 0..500 {
        engine.write(format!("filler{}", i).as_bytes(), &[7u8; 512]).unwrap();
    }
    engine.write(b"pinned", b"replaced").unwrap();

    assert_eq!(entry, b"original".to_vec());
    assert_eq!(entry.file_size(), file_size);
    assert_eq!(engine.read(b"pinned").unwrap(), Some(b"replaced".to_vec()));
}

#[test]
fn test_entry_clone_is_independent_handle() {
    let (_temp, engine) = setup_temp_engine();

    engine.write(b"key", b"value").unwrap();
    let entry = engine.read_entry(b"key").unwrap().unwrap();
    let clone = entry.clone();
    drop(entry);

    assert_eq!(clone, b"value".to_vec());
}

#[test]
fn test_batch_read_entries_share_snapshot() {
    let (_temp, engine) = setup_temp_engine();

    engine.write(b"a", b"alpha").unwrap();
    engine.write(b"b", b"beta").unwrap();

    let entries = engine
        .batch_read_entries(&[b"a".as_slice(), b"missing".as_slice(), b"b".as_slice()])
        .unwrap();

    assert_eq!(entries.len(), 3);
    assert_eq!(entries[0].as_ref().unwrap(), &b"alpha".to_vec());
    assert!(entries[1].is_none());
    assert_eq!(entries[2].as_ref().unwrap(), &b"beta".to_vec());
    assert_eq!(
        entries[0].as_ref().unwrap().file_size(),
        entries[2].as_ref().unwrap().file_size()
    );
}
