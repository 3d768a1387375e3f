//! Tests for the ingest side
//!
//! These tests verify:
//! - AppendLog file layout (values.bin + keys.bin)
//! - KeyRecords point at the right payload bytes
//! - IngestQueue payload encoding for both packing policies
//! - Concurrent producers get unique, dense sequence numbers

use std::collections::HashSet;
use std::fs::{self, File};
use std::io::BufReader;
use std::path::Path;

use rawdb::compression::BlockCompressor;
use rawdb::format::{parse_internal_key, Block, ValueType};
use rawdb::ingest::{
    AppendLog, IngestQueue, KeyRecord, KeyRecordReader, KEYS_FILENAME, RECORD_HEADER_SIZE,
    VALUES_FILENAME,
};
use rawdb::{BlockPackingPolicy, Options};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn read_records(dir: &Path) -> Vec<KeyRecord> {
    let file = File::open(dir.join(KEYS_FILENAME)).unwrap();
    KeyRecordReader::new(BufReader::new(file))
        .collect::<Result<Vec<_>, _>>()
        .unwrap()
}

fn payload<'a>(values: &'a [u8], record: &KeyRecord) -> &'a [u8] {
    let start = record.value_offset as usize;
    &values[start..start + record.value_size as usize]
}

fn start_queue(dir: &Path, packing: BlockPackingPolicy) -> IngestQueue {
    let options = Options::builder()
        .concurrency(4)
        .block_packing(packing)
        .build();
    IngestQueue::start(AppendLog::create(dir).unwrap(), &options).unwrap()
}

// =============================================================================
// AppendLog Tests
// =============================================================================

#[test]
fn test_append_log_layout_on_disk() {
    let temp = TempDir::new().unwrap();
    let mut log = AppendLog::create(temp.path()).unwrap();
    log.append(b"alpha", b"AAAA", 1).unwrap();
    log.append(b"be", b"BB", 2).unwrap();
    log.append(b"alpha", b"CCCCCC", 3).unwrap();
    let summary = log.finish().unwrap();

    assert_eq!(summary.record_count, 3);
    assert_eq!(summary.value_bytes, 12);

    let values = fs::read(temp.path().join(VALUES_FILENAME)).unwrap();
    assert_eq!(values, b"AAAABBCCCCCC");

    let keys = fs::read(temp.path().join(KEYS_FILENAME)).unwrap();
    assert_eq!(keys.len(), 3 * RECORD_HEADER_SIZE + 5 + 2 + 5);
    assert_eq!(&keys[0..8], &0u64.to_le_bytes());
    assert_eq!(&keys[8..16], &4u64.to_le_bytes());
    assert_eq!(&keys[16..24], &5u64.to_le_bytes());
    assert_eq!(&keys[24..32], &1u64.to_le_bytes());
    assert_eq!(&keys[32..37], b"alpha");

    let records = read_records(temp.path());
    assert_eq!(records.len(), 3);
    assert_eq!(payload(&values, &records[1]), b"BB");
    assert_eq!(payload(&values, &records[2]), b"CCCCCC");
    assert_eq!(records[2].sequence, 3);
}

#[test]
fn test_create_truncates_previous_logs() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join(VALUES_FILENAME), b"stale").unwrap();
    fs::write(temp.path().join(KEYS_FILENAME), b"stale").unwrap();

    let log = AppendLog::create(temp.path()).unwrap();
    log.finish().unwrap();
    assert!(fs::read(temp.path().join(VALUES_FILENAME)).unwrap().is_empty());
    assert!(read_records(temp.path()).is_empty());
}

// =============================================================================
// IngestQueue Tests
// =============================================================================

#[test]
fn test_record_per_block_payload_is_a_compressed_block() {
    let temp = TempDir::new().unwrap();
    let queue = start_queue(temp.path(), BlockPackingPolicy::RecordPerBlock);
    queue.put(b"chunk", b"terrain bytes");
    queue.drain().unwrap();

    let values = fs::read(temp.path().join(VALUES_FILENAME)).unwrap();
    let records = read_records(temp.path());
    assert_eq!(records.len(), 1);

    let raw = BlockCompressor::decompress(payload(&values, &records[0])).unwrap();
    let block = Block::new(raw).unwrap();
    let entries: Vec<_> = block.iter().collect::<Result<_, _>>().unwrap();
    assert_eq!(entries.len(), 1);

    let key = parse_internal_key(&entries[0].0).unwrap();
    assert_eq!(key.user_key, b"chunk");
    assert_eq!(key.sequence, 1);
    assert_eq!(key.value_type, ValueType::Value);
    assert_eq!(entries[0].1, b"terrain bytes");
}

#[test]
fn test_batched_payload_is_the_compressed_value() {
    let temp = TempDir::new().unwrap();
    let queue = start_queue(temp.path(), BlockPackingPolicy::Batched);
    queue.put(b"chunk", &[9u8; 1000]);
    queue.drain().unwrap();

    let values = fs::read(temp.path().join(VALUES_FILENAME)).unwrap();
    let records = read_records(temp.path());
    assert!(records[0].value_size < 1000);
    let value = BlockCompressor::decompress(payload(&values, &records[0])).unwrap();
    assert_eq!(value, vec![9u8; 1000]);
}

#[test]
fn test_concurrent_producers_get_dense_sequences() {
    let temp = TempDir::new().unwrap();
    let queue = start_queue(temp.path(), BlockPackingPolicy::Batched);

    crossbeam::thread::scope(|s| {
        for producer in 0..8u32 {
            let queue = &queue;
            s.spawn(move |_| {
                for i in 0..200u32 {
                    let key = format!("p{}/{}", producer, i);
                    queue.put(key.as_bytes(), key.as_bytes());
                }
            });
        }
    })
    .unwrap();

    let summary = queue.drain().unwrap();
    assert_eq!(summary.record_count, 1600);

    let values = fs::read(temp.path().join(VALUES_FILENAME)).unwrap();
    let records = read_records(temp.path());
    let sequences: HashSet<u64> = records.iter().map(|r| r.sequence).collect();
    let expected: HashSet<u64> = (1..=1600).collect();
    assert_eq!(sequences, expected);

    // every record still points at its own value
    for record in &records {
        let value = BlockCompressor::decompress(payload(&values, record)).unwrap();
        assert_eq!(value, record.key);
    }
}

#[test]
fn test_put_after_drain_is_ignored() {
    let temp = TempDir::new().unwrap();
    let queue = start_queue(temp.path(), BlockPackingPolicy::RecordPerBlock);
    queue.put(b"a", b"1");
    queue.drain().unwrap();

    queue.put(b"b", b"2");
    assert_eq!(read_records(temp.path()).len(), 1);
}
