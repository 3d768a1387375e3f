//! TableBuilder
//!
//! Turns one TableBuildPlan into one `.ldb` file. Each build opens its own
//! read-only handles, so builds for different plans run concurrently.

use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use crate::compression::BlockCompressor;
use crate::config::{BlockPackingPolicy, Options};
use crate::error::{RawDbError, Result};
use crate::format::{table_file_name, InternalKey, ValueType};
use crate::ingest::{KeyRecordReader, VALUES_FILENAME};

use super::sharder::ShardSet;
use super::sstable::SstWriter;
use super::{file_number_for_plan, TableBuildPlan, TableBuildResult};

pub struct TableBuilder<'a> {
    dir: PathBuf,
    options: &'a Options,
    shards: &'a ShardSet,
    compressor: BlockCompressor,
}

impl<'a> TableBuilder<'a> {
    pub fn new(dir: &Path, options: &'a Options, shards: &'a ShardSet) -> Self {
        Self {
            dir: dir.to_path_buf(),
            options,
            shards,
            compressor: BlockCompressor::new(options.compression_level),
        }
    }

    /// Build the table for `plans[plan_index]`
    pub fn build(&self, plan_index: usize, plan: &TableBuildPlan) -> Result<TableBuildResult> {
        let file_number = file_number_for_plan(plan_index);
        let path = self.dir.join(table_file_name(file_number));

        let mut values = File::open(self.dir.join(VALUES_FILENAME))?;
        let output = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&path)?;
        let mut sst = SstWriter::new(
            BufWriter::new(output),
            self.options.block_size,
            self.options.block_restart_interval,
            self.compressor,
        );

        let mut payload = Vec::new();
        let mut internal_key = Vec::new();
        for shard in plan.from.shard..=plan.to.shard {
            if self.shards.count(shard) == 0 {
                continue;
            }

            let mut file = File::open(self.shards.path(shard))?;
            let (mut index, start) = if shard == plan.from.shard {
                (plan.from.index_in_shard, plan.from.byte_offset)
            } else {
                (0, 0)
            };
            file.seek(SeekFrom::Start(start))?;
            let mut records = KeyRecordReader::starting_at(BufReader::new(file), start);

            let last = if shard == plan.to.shard {
                plan.to.index_in_shard
            } else {
                self.shards.count(shard) - 1
            };
            while index <= last {
                let record = records.next_record()?.ok_or_else(|| {
                    RawDbError::Corruption(format!("shard {} ended before record {}", shard, index))
                })?;

                payload.resize(record.value_size as usize, 0);
                values.seek(SeekFrom::Start(record.value_offset))?;
                values.read_exact(&mut payload)?;

                // the shard id is the key's first byte
                internal_key.clear();
                internal_key.push(shard);
                InternalKey::encode_into(&mut internal_key, &record.key, record.sequence, ValueType::Value);

                match self.options.block_packing {
                    BlockPackingPolicy::RecordPerBlock => {
                        sst.add_compressed_block(&internal_key, &payload)?
                    }
                    BlockPackingPolicy::Batched => {
                        let value = BlockCompressor::decompress(&payload)?;
                        sst.add(&internal_key, &value)?
                    }
                }
                index += 1;
            }
        }

        let summary = sst.finish()?;
        let file = summary
            .writer
            .into_inner()
            .map_err(|e| RawDbError::Io(e.into_error()))?;
        file.sync_all()?;

        tracing::debug!(
            file_number,
            entries = summary.entry_count,
            blocks = summary.data_blocks,
            bytes = summary.file_size,
            "built table"
        );

        Ok(TableBuildResult {
            plan: *plan,
            file_number,
            file_size: summary.file_size,
            smallest_key: summary.smallest,
            largest_key: summary.largest,
            entry_count: summary.entry_count,
        })
    }
}
