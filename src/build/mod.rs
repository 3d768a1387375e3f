//! Build Module
//!
//! Everything `close` runs after ingestion has drained.
//!
//! ## Pipeline
//! ```text
//! keys.bin ──Sharder──▶ keys000.bin … keys255.bin      (by first key byte)
//!          ──ShardSorter──▶ sorted shard files + Vec<TableBuildPlan>
//!          ──TableBuilder × concurrency──▶ NNNNNN.ldb
//!          ──ManifestWriter──▶ MANIFEST-000001 + CURRENT
//! ```
//!
//! Bytewise order makes the first key byte the most significant, so sorting
//! each shard and concatenating shards by id gives the global order while
//! holding only one shard in memory at a time.

mod manifest;
mod pool;
mod sharder;
mod sorter;
mod sstable;
mod table;

pub use manifest::{write_current, write_manifest, ManifestSummary};
pub use pool::build_tables;
pub use sharder::{shard_file_name, shard_keys, ShardSet, SHARD_COUNT};
pub use sorter::{compare_records, plan_tables, sort_shards, PlanCutter};
pub use sstable::{SstSummary, SstWriter};
pub use table::TableBuilder;

/// Cursor to one record in a shard's sorted key file
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ShardLocator {
    pub shard: u8,
    /// Position of the record within its shard
    pub index_in_shard: u64,
    /// Byte offset of the record within the shard file
    pub byte_offset: u64,
}

/// Inclusive span of sorted records that becomes one table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableBuildPlan {
    pub from: ShardLocator,
    pub to: ShardLocator,
}

/// A finished table, ready to be registered in the manifest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableBuildResult {
    pub plan: TableBuildPlan,
    pub file_number: u64,
    pub file_size: u64,
    /// Smallest internal key in the table
    pub smallest_key: Vec<u8>,
    /// Largest internal key in the table
    pub largest_key: Vec<u8>,
    pub entry_count: u64,
}

/// Tables are numbered from 1 in plan order
pub fn file_number_for_plan(plan_index: usize) -> u64 {
    plan_index as u64 + 1
}
