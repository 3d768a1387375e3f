//! # rawdb
//!
//! A write-once bulk loader that produces LevelDB-format databases without
//! going through a LevelDB write path:
//! - Lock-free-for-callers ingestion from many producer threads
//! - Bounded backlog (backpressure) between producers and the disk
//! - External sort by sharding keys on their first byte
//! - Parallel table building, then a single manifest edit
//!
//! The output directory opens in any reader that speaks the LevelDB table
//! format with raw-Deflate blocks (compression type 4).
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 Producers (any number)                       │
//! │                  put(key, value)                             │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │ bounded channel (concurrency + 1)
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                IngestQueue → AppendLog                       │
//! │           values.bin + keys.bin (single writer)              │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │ close()
//!                       ▼
//!   ┌─────────┐   ┌─────────────┐   ┌──────────────┐   ┌────────────┐
//!   │ Sharder │──▶│ ShardSorter │──▶│ TableBuilder │──▶│  Manifest  │
//!   │ (×256)  │   │  (plans)    │   │ (× workers)  │   │  CURRENT   │
//!   └─────────┘   └─────────────┘   └──────────────┘   └────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod compression;
pub mod format;
pub mod ingest;
pub mod build;
pub mod lock;
pub mod store;
pub mod reader;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{RawDbError, Result};
pub use config::{BlockPackingPolicy, Options, OptionsBuilder};
pub use store::{RawDb, StoreState};
pub use reader::{Database, VerifyReport};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of rawdb
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
