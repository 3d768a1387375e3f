//! Ingest Module
//!
//! Turns concurrent `put` calls into two flat append-only files.
//!
//! ## Responsibilities
//! - Compress payloads on the producer's thread
//! - Issue one sequence number per accepted `put`
//! - Serialize writes through a single background writer
//! - Bound the backlog of in-flight writes (backpressure)
//!
//! ## Files
//! ```text
//! values.bin   compressed payloads, back to back, no framing
//! keys.bin     ┌──────────────┬────────────┬──────────┬──────────┬───────┐
//!              │value_off (8) │value_sz (8)│key_sz (8)│ seq (8)  │ key   │
//!              └──────────────┴────────────┴──────────┴──────────┴───────┘
//!              ... repeated, all integers little-endian ...
//! ```

pub(crate) mod append_log;
mod queue;
mod record;

pub use append_log::{AppendLog, AppendLogSummary};
pub use queue::IngestQueue;
pub use record::{KeyRecord, KeyRecordReader, RECORD_HEADER_SIZE};

/// Values log file name
pub const VALUES_FILENAME: &str = "values.bin";

/// Key-index log file name
pub const KEYS_FILENAME: &str = "keys.bin";
