//! Tests for the LevelDB file formats
//!
//! These tests verify:
//! - MANIFEST log framing carries VersionEdits of any size
//! - Tables written by SstWriter read back through TableReader
//! - Block trailers pick the right compression tag
//! - Checksums catch flipped bytes
//! - A small database matches known LevelDB bytes exactly

use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use rand::{Rng, SeedableRng};
use rand::rngs::StdRng;
use rawdb::build::SstWriter;
use rawdb::compression::BlockCompressor;
use rawdb::format::{
    Block, BlockBuilder, BlockHandle, CompressionType, FileMetaData, Footer, InternalKey,
    LogReader, LogWriter, ValueType, VersionEdit, BYTEWISE_COMPARATOR, FOOTER_SIZE,
    LOG_BLOCK_SIZE, TABLE_MAGIC,
};
use rawdb::format::{block_trailer, table_file_name, CURRENT_FILENAME, MANIFEST_FILENAME};
use rawdb::reader::TableReader;
use rawdb::{BlockPackingPolicy, Options, RawDb, RawDbError};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn ikey(user: &[u8], seq: u64) -> Vec<u8> {
    InternalKey::new(user, seq, ValueType::Value).into_bytes()
}

fn setup_temp_table() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("000001.ldb");
    (temp_dir, path)
}

/// Write `entries` (already in internal-key order) as a batched table
fn write_batched(path: &Path, entries: &[(Vec<u8>, Vec<u8>)], block_size: usize) -> u64 {
    let file = BufWriter::new(File::create(path).unwrap());
    let mut sst = SstWriter::new(file, block_size, 16, BlockCompressor::default());
    for (key, value) in entries {
        sst.add(key, value).unwrap();
    }
    sst.finish().unwrap().file_size
}

/// Decode a fixture of hex digits, ignoring line breaks
fn unhex(text: &str) -> Vec<u8> {
    let digits: Vec<u8> = text.bytes().filter(|b| !b.is_ascii_whitespace()).collect();
    digits
        .chunks(2)
        .map(|pair| u8::from_str_radix(std::str::from_utf8(pair).unwrap(), 16).unwrap())
        .collect()
}

/// Compression tag of the first data block in a table image
fn first_block_tag(bytes: &[u8]) -> u8 {
    let footer = Footer::decode(&bytes[bytes.len() - FOOTER_SIZE..]).unwrap();
    let index = footer.index_handle;
    let content = bytes[index.offset as usize..(index.offset + index.size) as usize].to_vec();
    let index_block = Block::new(content).unwrap();
    let (_, mut handle) = index_block.iter().next().unwrap().unwrap();
    let first = BlockHandle::decode_from(&mut handle).unwrap();
    bytes[(first.offset + first.size) as usize]
}

// =============================================================================
// Manifest Log Tests
// =============================================================================

#[test]
fn test_manifest_carries_several_edits() {
    let mut first = VersionEdit {
        comparator: Some(BYTEWISE_COMPARATOR.to_string()),
        log_number: Some(0),
        next_file_number: Some(2),
        last_sequence: Some(10),
        ..Default::default()
    };
    first.add_file(
        1,
        FileMetaData {
            number: 1,
            file_size: 1234,
            smallest: ikey(b"a", 3),
            largest: ikey(b"m", 9),
        },
    );

    // enough files to spill across several 32 KB log blocks
    let mut big = VersionEdit::default();
    for n in 0..2000u64 {
        big.add_file(
            1,
            FileMetaData {
                number: n + 2,
                file_size: n * 100,
                smallest: ikey(format!("key{:06}", n).as_bytes(), n),
                largest: ikey(format!("key{:06}~", n).as_bytes(), n),
            },
        );
    }
    let edits = vec![first, big, VersionEdit { last_sequence: Some(99), ..Default::default() }];

    let mut writer = LogWriter::new(Vec::new());
    for edit in &edits {
        writer.add_record(&edit.encode()).unwrap();
    }
    let image = writer.into_inner();
    assert!(image.len() > 2 * LOG_BLOCK_SIZE);

    let mut reader = LogReader::new(&image);
    let mut decoded = Vec::new();
    while let Some(record) = reader.read_record().unwrap() {
        decoded.push(VersionEdit::decode(&record).unwrap());
    }
    assert_eq!(decoded, edits);
}

#[test]
fn test_manifest_with_flipped_byte_is_rejected() {
    let edit = VersionEdit {
        comparator: Some(BYTEWISE_COMPARATOR.to_string()),
        last_sequence: Some(1),
        ..Default::default()
    };
    let mut writer = LogWriter::new(Vec::new());
    writer.add_record(&edit.encode()).unwrap();
    let mut image = writer.into_inner();
    image[10] ^= 0x01;

    let mut reader = LogReader::new(&image);
    assert!(matches!(reader.read_record(), Err(RawDbError::Corruption(_))));
}

// =============================================================================
// Table Tests
// =============================================================================

#[test]
fn test_batched_table_reads_back() {
    let (_temp, path) = setup_temp_table();
    let entries: Vec<_> = (0..500u64)
        .map(|i| (ikey(format!("key{:05}", i).as_bytes(), i + 1), format!("value-{}", i).into_bytes()))
        .collect();
    let size = write_batched(&path, &entries, 1024);
    assert_eq!(fs::metadata(&path).unwrap().len(), size);

    let mut table = TableReader::open(&path).unwrap();
    assert!(table.block_count() > 1);

    for (key, value) in entries.iter().step_by(37) {
        let (found, found_value) = table.seek(key).unwrap().unwrap();
        assert_eq!(&found, key);
        assert_eq!(&found_value, value);
    }

    let mut count = 0;
    table
        .for_each_entry(|key, value| {
            assert_eq!(key, entries[count].0.as_slice());
            assert_eq!(value, entries[count].1.as_slice());
            count += 1;
            Ok(())
        })
        .unwrap();
    assert_eq!(count, entries.len());
}

#[test]
fn test_seek_past_block_end_moves_to_next_block() {
    let (_temp, path) = setup_temp_table();
    // one entry per block: "a" ends block 0, "c" starts block 1
    let entries = vec![
        (ikey(b"a", 1), b"1".to_vec()),
        (ikey(b"c", 2), b"2".to_vec()),
    ];
    write_batched(&path, &entries, 1);

    let mut table = TableReader::open(&path).unwrap();
    assert_eq!(table.block_count(), 2);

    // older than anything in block 0 but still under its separator
    let (found, value) = table.seek(&ikey(b"a", 0)).unwrap().unwrap();
    assert_eq!(found, ikey(b"c", 2));
    assert_eq!(value, b"2");

    let (found, value) = table.seek(&ikey(b"b", 100)).unwrap().unwrap();
    assert_eq!(found, ikey(b"c", 2));
    assert_eq!(value, b"2");
    assert!(table.seek(&ikey(b"d", 100)).unwrap().is_none());
}

#[test]
fn test_precompressed_blocks_copy_verbatim() {
    let (_temp, path) = setup_temp_table();
    let compressor = BlockCompressor::default();

    let file = BufWriter::new(File::create(&path).unwrap());
    let mut sst = SstWriter::new(file, 4096, 16, compressor);
    for i in 0..20u64 {
        let key = ikey(format!("record{:03}", i).as_bytes(), i + 1);
        let mut block = BlockBuilder::new(1);
        block.add(&key, &[i as u8; 300]);
        let compressed = compressor.compress(&block.finish()).unwrap();
        sst.add_compressed_block(&key, &compressed).unwrap();
    }
    let summary = sst.finish().unwrap();
    assert_eq!(summary.entry_count, 20);
    assert_eq!(summary.data_blocks, 20);
    assert_eq!(summary.smallest, ikey(b"record000", 1));
    assert_eq!(summary.largest, ikey(b"record019", 20));

    let bytes = fs::read(&path).unwrap();
    assert_eq!(first_block_tag(&bytes), CompressionType::ZlibRaw as u8);

    let mut table = TableReader::open(&path).unwrap();
    assert_eq!(table.block_count(), 20);
    let (_, value) = table.seek(&ikey(b"record007", 8)).unwrap().unwrap();
    assert_eq!(value, vec![7u8; 300]);
}

#[test]
fn test_incompressible_block_stored_raw() {
    let mut rng = StdRng::seed_from_u64(7);
    let (_temp, path) = setup_temp_table();
    let noise: Vec<u8> = (0..2000).map(|_| rng.gen()).collect();
    write_batched(&path, &[(ikey(b"noise", 1), noise.clone())], 4096);
    assert_eq!(first_block_tag(&fs::read(&path).unwrap()), CompressionType::None as u8);

    let (_temp2, path2) = setup_temp_table();
    write_batched(&path2, &[(ikey(b"zeros", 1), vec![0u8; 2000])], 4096);
    assert_eq!(first_block_tag(&fs::read(&path2).unwrap()), CompressionType::ZlibRaw as u8);

    let mut table = TableReader::open(&path).unwrap();
    let (_, value) = table.seek(&ikey(b"noise", 1)).unwrap().unwrap();
    assert_eq!(value, noise);
}

#[test]
fn test_flipped_data_byte_fails_checksum() {
    let (_temp, path) = setup_temp_table();
    let entries: Vec<_> = (0..10u64)
        .map(|i| (ikey(&[b'k', i as u8], i + 1), vec![b'v'; 100]))
        .collect();
    write_batched(&path, &entries, 4096);

    let mut bytes = fs::read(&path).unwrap();
    bytes[3] ^= 0x40;
    fs::write(&path, &bytes).unwrap();

    // the index is intact, so open succeeds; reading data does not
    let mut table = TableReader::open(&path).unwrap();
    assert!(matches!(table.seek(&entries[0].0), Err(RawDbError::Corruption(_))));
}

#[test]
fn test_empty_table_has_no_blocks() {
    let (_temp, path) = setup_temp_table();
    let size = write_batched(&path, &[], 4096);

    // empty metaindex + empty index, each 8 bytes plus trailer, then footer
    assert_eq!(size, (8 + 5) * 2 + FOOTER_SIZE as u64);
    let mut table = TableReader::open(&path).unwrap();
    assert_eq!(table.block_count(), 0);
    assert!(table.seek(&ikey(b"any", 1)).unwrap().is_none());
}

#[test]
fn test_truncated_table_is_rejected() {
    let (_temp, path) = setup_temp_table();
    fs::write(&path, b"not a table").unwrap();
    assert!(matches!(TableReader::open(&path), Err(RawDbError::Corruption(_))));
}

// =============================================================================
// Known-Bytes Tests
// =============================================================================

// Fixtures were produced by an independent LevelDB encoder for the input
// a=1, b=2, a=3 (sequences 1..=3), one uncompressed data block.
const TABLE_FIXTURE: &str = include_str!("fixtures/000001.ldb.hex");
const MANIFEST_FIXTURE: &str = include_str!("fixtures/MANIFEST-000001.hex");
const CURRENT_FIXTURE: &str = include_str!("fixtures/CURRENT");

#[test]
fn test_small_database_matches_leveldb_bytes() {
    let temp = TempDir::new().unwrap();
    // level 0 never shrinks a block, so it is stored with tag 0
    let options = Options::builder()
        .concurrency(1)
        .block_packing(BlockPackingPolicy::Batched)
        .compression_level(0)
        .build();
    let db = RawDb::open(temp.path(), options).unwrap();
    db.put(b"a", b"1");
    db.put(b"b", b"2");
    db.put(b"a", b"3");
    db.close().unwrap();

    let table = fs::read(temp.path().join(table_file_name(1))).unwrap();
    assert_eq!(table, unhex(TABLE_FIXTURE));
    let manifest = fs::read(temp.path().join(MANIFEST_FILENAME)).unwrap();
    assert_eq!(manifest, unhex(MANIFEST_FIXTURE));
    let current = fs::read_to_string(temp.path().join(CURRENT_FILENAME)).unwrap();
    assert_eq!(current, CURRENT_FIXTURE);
}

#[test]
fn test_fixture_layout() {
    let table = unhex(TABLE_FIXTURE);
    assert_eq!(table.len(), 138);
    assert_eq!(&table[table.len() - 8..], &TABLE_MAGIC.to_le_bytes());

    // data block: 45 bytes, then tag 0 and its masked crc
    let data = &table[..45];
    assert_eq!(&table[45..50], &block_trailer(data, CompressionType::None));
    assert_eq!(
        Footer::decode(&table[table.len() - FOOTER_SIZE..]).unwrap(),
        Footer {
            metaindex_handle: BlockHandle::new(50, 8),
            index_handle: BlockHandle::new(63, 22),
        }
    );

    let manifest = unhex(MANIFEST_FIXTURE);
    let mut reader = LogReader::new(&manifest);
    let edit = VersionEdit::decode(&reader.read_record().unwrap().unwrap()).unwrap();
    assert!(reader.read_record().unwrap().is_none());

    let mut expected = VersionEdit {
        comparator: Some(BYTEWISE_COMPARATOR.to_string()),
        log_number: Some(0),
        prev_log_number: Some(0),
        next_file_number: Some(2),
        last_sequence: Some(4),
        ..Default::default()
    };
    expected.add_file(
        1,
        FileMetaData {
            number: 1,
            file_size: 138,
            smallest: ikey(b"a", 3),
            largest: ikey(b"b", 2),
        },
    );
    assert_eq!(edit, expected);
    assert_eq!(expected.encode(), manifest[7..]);
}
