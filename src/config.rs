//! Configuration for rawdb
//!
//! Centralized configuration with sensible defaults.

use crate::error::{RawDbError, Result};

/// Main configuration for a bulk-load session
#[derive(Debug, Clone)]
pub struct Options {
    // -------------------------------------------------------------------------
    // Concurrency Configuration
    // -------------------------------------------------------------------------
    /// Number of producer threads expected to call `put`, and the size of the
    /// table-building pool used during `close`.
    /// The ingest backlog is bounded at `concurrency + 1` writes.
    pub concurrency: usize,

    // -------------------------------------------------------------------------
    // Table Configuration
    // -------------------------------------------------------------------------
    /// Target size of one `.ldb` file, measured in compressed value bytes.
    /// A table is cut once this many bytes have accumulated.
    pub max_table_size: u64,

    /// How records are packed into data blocks
    pub block_packing: BlockPackingPolicy,

    /// Target uncompressed size of one data block (Batched packing only)
    pub block_size: usize,

    /// Number of entries between restart points (Batched packing only)
    pub block_restart_interval: usize,

    // -------------------------------------------------------------------------
    // Compression Configuration
    // -------------------------------------------------------------------------
    /// Deflate level, 0..=9
    pub compression_level: u32,
}

/// Data block packing strategy
///
/// The on-disk format is identical either way; the strategies trade table
/// size against work done at build time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockPackingPolicy {
    /// Each `put` produces one compressed single-entry block up front.
    /// Tables are assembled by copying those blocks verbatim.
    RecordPerBlock,

    /// `put` compresses only the value. Tables decompress values and pack
    /// many entries per block, compressing each block once.
    Batched,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            concurrency: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            max_table_size: 64 * 1024, // 64 KB
            block_packing: BlockPackingPolicy::RecordPerBlock,
            block_size: 4 * 1024, // 4 KB
            block_restart_interval: 16,
            compression_level: 6,
        }
    }
}

impl Options {
    /// Create a new options builder
    pub fn builder() -> OptionsBuilder {
        OptionsBuilder::default()
    }

    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            return Err(RawDbError::Config("concurrency must be at least 1".into()));
        }
        if self.max_table_size == 0 {
            return Err(RawDbError::Config("max_table_size must be positive".into()));
        }
        if self.block_size == 0 {
            return Err(RawDbError::Config("block_size must be positive".into()));
        }
        if self.block_restart_interval == 0 {
            return Err(RawDbError::Config(
                "block_restart_interval must be at least 1".into(),
            ));
        }
        if self.compression_level > 9 {
            return Err(RawDbError::Config(format!(
                "compression_level {} out of range 0..=9",
                self.compression_level
            )));
        }
        Ok(())
    }

    /// Capacity of the bounded ingest and build queues
    pub fn backlog(&self) -> usize {
        self.concurrency + 1
    }
}

/// Builder for Options
#[derive(Default)]
pub struct OptionsBuilder {
    options: Options,
}

impl OptionsBuilder {
    /// Set the producer / build-pool concurrency
    pub fn concurrency(mut self, n: usize) -> Self {
        self.options.concurrency = n;
        self
    }

    /// Set the maximum table size (in compressed bytes)
    pub fn max_table_size(mut self, size: u64) -> Self {
        self.options.max_table_size = size;
        self
    }

    /// Set the block packing strategy
    pub fn block_packing(mut self, policy: BlockPackingPolicy) -> Self {
        self.options.block_packing = policy;
        self
    }

    /// Set the target data block size (in bytes)
    pub fn block_size(mut self, size: usize) -> Self {
        self.options.block_size = size;
        self
    }

    /// Set the restart interval for data blocks
    pub fn block_restart_interval(mut self, interval: usize) -> Self {
        self.options.block_restart_interval = interval;
        self
    }

    /// Set the Deflate compression level
    pub fn compression_level(mut self, level: u32) -> Self {
        self.options.compression_level = level;
        self
    }

    pub fn build(self) -> Options {
        self.options
    }
}
