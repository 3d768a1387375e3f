//! ShardSorter
//!
//! Sorts each shard file in place and cuts the global sorted stream into
//! table plans.

use std::cmp::Ordering;
use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use crate::error::{RawDbError, Result};
use crate::ingest::{KeyRecord, KeyRecordReader};

use super::sharder::ShardSet;
use super::{ShardLocator, TableBuildPlan};

/// Key bytes ascending, then sequence descending.
///
/// Equal keys are kept, newest first, which is exactly internal-key order.
pub fn compare_records(a: &KeyRecord, b: &KeyRecord) -> Ordering {
    a.key.cmp(&b.key).then_with(|| b.sequence.cmp(&a.sequence))
}

/// Greedy table cutter: closes a plan once the accumulated value bytes
/// reach `max_table_size`
#[derive(Debug)]
pub struct PlanCutter {
    max_table_size: u64,
    from: Option<ShardLocator>,
    last: Option<ShardLocator>,
    accumulated: u64,
    plans: Vec<TableBuildPlan>,
}

impl PlanCutter {
    pub fn new(max_table_size: u64) -> Self {
        Self {
            max_table_size,
            from: None,
            last: None,
            accumulated: 0,
            plans: Vec::new(),
        }
    }

    /// Feed the next record in global sorted order
    pub fn push(&mut self, locator: ShardLocator, value_size: u64) {
        let from = *self.from.get_or_insert(locator);
        self.last = Some(locator);
        self.accumulated += value_size;
        if self.accumulated >= self.max_table_size {
            self.plans.push(TableBuildPlan { from, to: locator });
            self.from = None;
            self.last = None;
            self.accumulated = 0;
        }
    }

    /// Emit the trailing partial plan, if any
    pub fn finish(mut self) -> Vec<TableBuildPlan> {
        if let (Some(from), Some(to)) = (self.from, self.last) {
            self.plans.push(TableBuildPlan { from, to });
        }
        self.plans
    }
}

/// Plan over an already-sorted stream of `(locator, value_size)`
pub fn plan_tables<I>(records: I, max_table_size: u64) -> Vec<TableBuildPlan>
where
    I: IntoIterator<Item = (ShardLocator, u64)>,
{
    let mut cutter = PlanCutter::new(max_table_size);
    for (locator, value_size) in records {
        cutter.push(locator, value_size);
    }
    cutter.finish()
}

/// Sort every non-empty shard, ascending by shard id, and return the plans
pub fn sort_shards(shards: &ShardSet, max_table_size: u64) -> Result<Vec<TableBuildPlan>> {
    let mut cutter = PlanCutter::new(max_table_size);
    for shard in shards.non_empty() {
        sort_shard(&shards.path(shard), shard, shards.count(shard), &mut cutter)?;
    }
    let plans = cutter.finish();
    tracing::info!(records = shards.total(), tables = plans.len(), "sorted shards");
    Ok(plans)
}

fn sort_shard(path: &Path, shard: u8, expected: u64, cutter: &mut PlanCutter) -> Result<()> {
    let mut records = Vec::with_capacity(expected as usize);
    let reader = KeyRecordReader::new(BufReader::new(File::open(path)?));
    for record in reader {
        records.push(record?);
    }
    if records.len() as u64 != expected {
        return Err(RawDbError::Corruption(format!(
            "shard {} holds {} records, expected {}",
            shard,
            records.len(),
            expected
        )));
    }

    records.sort_by(compare_records);

    let file = OpenOptions::new()
        .write(true)
        .truncate(true)
        .open(path)?;
    let mut writer = BufWriter::new(file);
    let mut byte_offset = 0u64;
    for (index, record) in records.iter().enumerate() {
        record.write_to(&mut writer)?;
        cutter.push(
            ShardLocator {
                shard,
                index_in_shard: index as u64,
                byte_offset,
            },
            record.value_size,
        );
        byte_offset += record.encoded_len();
    }
    writer.flush()?;

    tracing::debug!(shard, records = records.len(), "sorted shard");
    Ok(())
}
