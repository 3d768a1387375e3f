//! Tests for the close-time build stages
//!
//! These tests verify:
//! - Sharding by first key byte, and the dropped selector byte
//! - Sorted shards concatenate into the global sort order
//! - Plans cover every record once and respect the size threshold
//! - Tables and manifest produced by the stages open as a database

use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File};
use std::io::BufReader;
use std::path::Path;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rawdb::build::{
    build_tables, shard_file_name, shard_keys, sort_shards, write_manifest, ShardLocator,
    ShardSet, TableBuilder, SHARD_COUNT,
};
use rawdb::format::{CURRENT_FILENAME, MANIFEST_FILENAME};
use rawdb::ingest::{AppendLog, IngestQueue, KeyRecord, KeyRecordReader, KEYS_FILENAME};
use rawdb::{BlockPackingPolicy, Database, Options};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn random_pairs(rng: &mut StdRng, count: usize) -> Vec<(Vec<u8>, Vec<u8>)> {
    (0..count)
        .map(|_| {
            let key_len = rng.gen_range(1..=24);
            let value_len = rng.gen_range(1..=512);
            let key: Vec<u8> = (0..key_len).map(|_| rng.gen()).collect();
            let value: Vec<u8> = (0..value_len).map(|_| rng.gen_range(0..4)).collect();
            (key, value)
        })
        .collect()
}

/// Ingest `pairs` in order and drain, leaving values.bin + keys.bin
fn ingest(dir: &Path, options: &Options, pairs: &[(Vec<u8>, Vec<u8>)]) -> u64 {
    let queue = IngestQueue::start(AppendLog::create(dir).unwrap(), options).unwrap();
    for (key, value) in pairs {
        queue.put(key, value);
    }
    queue.drain().unwrap().record_count
}

fn read_shard(dir: &Path, shard: u8) -> Vec<KeyRecord> {
    let file = File::open(dir.join(shard_file_name(shard))).unwrap();
    KeyRecordReader::new(BufReader::new(file))
        .collect::<Result<Vec<_>, _>>()
        .unwrap()
}

/// Walk every sorted shard, yielding `(full key, sequence, locator)`
fn sorted_stream(dir: &Path, shards: &ShardSet) -> Vec<(Vec<u8>, u64, ShardLocator)> {
    let mut stream = Vec::new();
    for shard in shards.non_empty() {
        let mut byte_offset = 0;
        for (index, record) in read_shard(dir, shard).into_iter().enumerate() {
            let mut key = vec![shard];
            key.extend_from_slice(&record.key);
            let locator = ShardLocator {
                shard,
                index_in_shard: index as u64,
                byte_offset,
            };
            byte_offset += record.encoded_len();
            stream.push((key, record.sequence, locator));
        }
    }
    stream
}

fn options(packing: BlockPackingPolicy, max_table_size: u64) -> Options {
    Options::builder()
        .concurrency(3)
        .block_packing(packing)
        .max_table_size(max_table_size)
        .build()
}

// =============================================================================
// Sharder Tests
// =============================================================================

#[test]
fn test_shards_by_first_byte() {
    let temp = TempDir::new().unwrap();
    let pairs = vec![
        (b"apple".to_vec(), b"1".to_vec()),
        (b"avocado".to_vec(), b"2".to_vec()),
        (b"banana".to_vec(), b"3".to_vec()),
        (vec![0xff, 0x00], b"4".to_vec()),
        (b"a".to_vec(), b"5".to_vec()),
    ];
    let opts = options(BlockPackingPolicy::Batched, 1 << 20);
    ingest(temp.path(), &opts, &pairs);

    let shards = shard_keys(temp.path()).unwrap();
    assert!(!temp.path().join(KEYS_FILENAME).exists());
    assert_eq!(shards.total(), 5);
    assert_eq!(shards.count(b'a'), 3);
    assert_eq!(shards.count(b'b'), 1);
    assert_eq!(shards.count(0xff), 1);
    assert_eq!(shards.non_empty().collect::<Vec<_>>(), vec![b'a', b'b', 0xff]);

    // only used shards get a file
    assert!(!temp.path().join(shard_file_name(b'c')).exists());
    assert_eq!(shard_file_name(7), "keys007.bin");

    let a: Vec<Vec<u8>> = read_shard(temp.path(), b'a').into_iter().map(|r| r.key).collect();
    assert_eq!(a, vec![b"pple".to_vec(), b"vocado".to_vec(), Vec::new()]);
    assert_eq!(read_shard(temp.path(), 0xff)[0].key, vec![0x00]);
}

// =============================================================================
// ShardSorter Tests
// =============================================================================

#[test]
fn test_sorted_shards_match_global_sort() {
    let mut rng = StdRng::seed_from_u64(0x5eed);
    for round in 0..5 {
        let temp = TempDir::new().unwrap();
        let mut pairs = random_pairs(&mut rng, 400);
        // force some repeated keys
        for i in 0..20 {
            let key = pairs[i].0.clone();
            pairs.push((key, vec![round as u8; 8]));
        }

        let opts = options(BlockPackingPolicy::Batched, 4096);
        ingest(temp.path(), &opts, &pairs);
        let shards = shard_keys(temp.path()).unwrap();
        sort_shards(&shards, opts.max_table_size).unwrap();

        // expected: key ascending, later puts (higher sequence) first
        let mut expected: Vec<(Vec<u8>, u64)> = pairs
            .iter()
            .enumerate()
            .map(|(i, (key, _))| (key.clone(), i as u64 + 1))
            .collect();
        expected.sort_by(|a, b| a.0.cmp(&b.0).then(b.1.cmp(&a.1)));

        let actual: Vec<(Vec<u8>, u64)> = sorted_stream(temp.path(), &shards)
            .into_iter()
            .map(|(key, seq, _)| (key, seq))
            .collect();
        assert_eq!(actual, expected, "round {}", round);
    }
}

#[test]
fn test_plans_cover_every_record_once() {
    let mut rng = StdRng::seed_from_u64(42);
    let temp = TempDir::new().unwrap();
    let pairs = random_pairs(&mut rng, 600);

    let max_table_size = 2048;
    let opts = options(BlockPackingPolicy::Batched, max_table_size);
    ingest(temp.path(), &opts, &pairs);
    let shards = shard_keys(temp.path()).unwrap();
    let plans = sort_shards(&shards, max_table_size).unwrap();
    assert!(plans.len() > 1);

    // value sizes as stored, keyed by locator
    let mut sizes = BTreeMap::new();
    for shard in shards.non_empty() {
        let mut byte_offset = 0;
        for (index, record) in read_shard(temp.path(), shard).into_iter().enumerate() {
            let locator = ShardLocator {
                shard,
                index_in_shard: index as u64,
                byte_offset,
            };
            byte_offset += record.encoded_len();
            sizes.insert(locator, record.value_size);
        }
    }

    let stream: Vec<ShardLocator> = sorted_stream(temp.path(), &shards)
        .into_iter()
        .map(|(_, _, locator)| locator)
        .collect();
    let mut cursor = 0;
    for (i, plan) in plans.iter().enumerate() {
        assert_eq!(plan.from, stream[cursor], "plan {} starts where the last ended", i);
        let start = cursor;
        while stream[cursor] != plan.to {
            cursor += 1;
        }
        let total: u64 = stream[start..=cursor].iter().map(|l| sizes[l]).sum();
        let without_last: u64 = total - sizes[&plan.to];
        if i + 1 < plans.len() {
            assert!(total >= max_table_size);
        }
        // cut as soon as the threshold is reached
        assert!(without_last < max_table_size);
        cursor += 1;
    }
    assert_eq!(cursor, stream.len());
}

#[test]
fn test_empty_input_yields_no_plans() {
    let temp = TempDir::new().unwrap();
    let opts = options(BlockPackingPolicy::RecordPerBlock, 1024);
    ingest(temp.path(), &opts, &[]);
    let shards = shard_keys(temp.path()).unwrap();
    assert_eq!(shards.total(), 0);
    assert_eq!(shards.non_empty().count(), 0);
    assert!(sort_shards(&shards, 1024).unwrap().is_empty());
    assert_eq!(SHARD_COUNT, 256);
}

// =============================================================================
// TableBuilder + Manifest Tests
// =============================================================================

fn build_database(packing: BlockPackingPolicy) {
    let mut rng = StdRng::seed_from_u64(9);
    let temp = TempDir::new().unwrap();
    let mut pairs = random_pairs(&mut rng, 300);
    let overwritten = pairs[0].0.clone();
    pairs.push((overwritten.clone(), b"newest".to_vec()));

    let opts = options(packing, 8 * 1024);
    let records = ingest(temp.path(), &opts, &pairs);
    let shards = shard_keys(temp.path()).unwrap();
    let plans = sort_shards(&shards, opts.max_table_size).unwrap();

    let builder = TableBuilder::new(temp.path(), &opts, &shards);
    let mut progress = Vec::new();
    let tables = build_tables(&plans, &builder, opts.concurrency, |done, total| {
        progress.push((done, total));
    })
    .unwrap();

    assert_eq!(tables.len(), plans.len());
    assert_eq!(progress.last(), Some(&(plans.len(), plans.len())));
    for (i, table) in tables.iter().enumerate() {
        assert_eq!(table.file_number, i as u64 + 1);
        assert_eq!(table.plan, plans[i]);
    }
    let entries: u64 = tables.iter().map(|t| t.entry_count).sum();
    assert_eq!(entries, records);

    let summary = write_manifest(temp.path(), &tables, records, plans.len()).unwrap();
    assert_eq!(summary.last_sequence, records + 1);
    assert_eq!(summary.next_file_number, plans.len() as u64 + 1);
    assert_eq!(
        fs::read_to_string(temp.path().join(CURRENT_FILENAME)).unwrap(),
        format!("{}\n", MANIFEST_FILENAME)
    );

    let db = Database::open(temp.path()).unwrap();
    assert_eq!(db.files().len(), plans.len());
    assert!(db.files().iter().all(|f| f.level == 1));
    assert_eq!(db.log_number(), 0);

    let report = db.verify().unwrap();
    assert_eq!(report.entries, records);

    let mut latest: HashMap<&[u8], &[u8]> = HashMap::new();
    for (key, value) in &pairs {
        latest.insert(key.as_slice(), value.as_slice());
    }
    assert_eq!(report.distinct_keys, latest.len() as u64);
    assert_eq!(db.get(&overwritten).unwrap().unwrap(), b"newest");
    for (key, value) in latest {
        assert_eq!(db.get(key).unwrap().as_deref(), Some(value));
    }
}

#[test]
fn test_record_per_block_tables_open_as_database() {
    build_database(BlockPackingPolicy::RecordPerBlock);
}

#[test]
fn test_batched_tables_open_as_database() {
    build_database(BlockPackingPolicy::Batched);
}

#[test]
fn test_manifest_rejects_missing_tables() {
    let temp = TempDir::new().unwrap();
    assert!(write_manifest(temp.path(), &[], 10, 1).is_err());
    assert!(!temp.path().join(CURRENT_FILENAME).exists());
}
