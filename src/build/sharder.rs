//! Sharder
//!
//! Splits `keys.bin` into 256 files by the first byte of each key. The
//! selector byte is dropped from the stored key; the file name carries it.

use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::ingest::{KeyRecord, KeyRecordReader, KEYS_FILENAME};

pub const SHARD_COUNT: usize = 256;

/// 7 → "keys007.bin"
pub fn shard_file_name(shard: u8) -> String {
    format!("keys{:03}.bin", shard)
}

/// Per-shard record counts after sharding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardSet {
    dir: PathBuf,
    counts: Vec<u64>,
}

impl ShardSet {
    pub fn new(dir: &Path, counts: Vec<u64>) -> Self {
        assert_eq!(counts.len(), SHARD_COUNT);
        Self {
            dir: dir.to_path_buf(),
            counts,
        }
    }

    pub fn count(&self, shard: u8) -> u64 {
        self.counts[shard as usize]
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }

    /// Shards holding at least one record, ascending
    pub fn non_empty(&self) -> impl Iterator<Item = u8> + '_ {
        (0..=u8::MAX).filter(move |&shard| self.count(shard) > 0)
    }

    pub fn path(&self, shard: u8) -> PathBuf {
        self.dir.join(shard_file_name(shard))
    }
}

/// Re-partition `<dir>/keys.bin` into shard files, then delete it
pub fn shard_keys(dir: &Path) -> Result<ShardSet> {
    let keys_path = dir.join(KEYS_FILENAME);
    let mut reader = KeyRecordReader::new(BufReader::new(File::open(&keys_path)?));

    let mut writers: Vec<Option<BufWriter<File>>> = (0..SHARD_COUNT).map(|_| None).collect();
    let mut counts = vec![0u64; SHARD_COUNT];
    let mut buf = Vec::new();

    while let Some(record) = reader.next_record()? {
        let Some((&shard, rest)) = record.key.split_first() else {
            // empty keys never reach the log; tolerate them anyway
            continue;
        };

        let writer = match &mut writers[shard as usize] {
            Some(writer) => writer,
            slot => {
                let file = OpenOptions::new()
                    .create(true)
                    .write(true)
                    .truncate(true)
                    .open(dir.join(shard_file_name(shard)))?;
                slot.insert(BufWriter::new(file))
            }
        };

        buf.clear();
        KeyRecord::encode_parts(&mut buf, record.value_offset, record.value_size, rest, record.sequence);
        writer.write_all(&buf)?;
        counts[shard as usize] += 1;
    }

    for writer in writers.iter_mut().flatten() {
        writer.flush()?;
    }
    drop(writers);
    fs::remove_file(&keys_path)?;

    let shards = ShardSet::new(dir, counts);
    tracing::info!(
        records = shards.total(),
        shards = shards.non_empty().count(),
        "sharded key index"
    );
    Ok(shards)
}
