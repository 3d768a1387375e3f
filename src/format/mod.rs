//! LevelDB On-Disk Format
//!
//! Everything a stock LevelDB reader expects to find in a database
//! directory. Nothing here knows about the bulk-load pipeline.
//!
//! ## Table File (`NNNNNN.ldb`)
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │ Data Block 1 | type (1) | masked crc32c (4)             │
//! │ Data Block 2 | type (1) | masked crc32c (4)             │
//! │ ...                                                     │
//! ├─────────────────────────────────────────────────────────┤
//! │ Metaindex Block | type | crc   (empty)                  │
//! ├─────────────────────────────────────────────────────────┤
//! │ Index Block | type | crc                                │
//! │   separator key → BlockHandle(offset, size) per block   │
//! ├─────────────────────────────────────────────────────────┤
//! │ Footer (48 bytes)                                       │
//! │   metaindex handle | index handle | padding | magic (8) │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! ## MANIFEST
//! A log file of 32 KB blocks; each physical record is
//! `masked crc32c (4) | length (2) | type (1) | payload`. The payload of the
//! single logical record we write is one encoded `VersionEdit`.

mod block;
mod coding;
mod crc;
mod key;
mod log;
mod table;
mod version_edit;

pub use block::{Block, BlockBuilder, BlockIter};
pub use coding::{
    get_length_prefixed, get_varint32, get_varint64, put_length_prefixed, put_varint32,
    put_varint64,
};
pub use crc::{block_checksum, mask_crc, record_checksum, unmask_crc};
pub use key::{
    compare_internal_keys, pack_sequence_and_type, parse_internal_key, short_successor,
    shortest_separator, InternalKey, ParsedInternalKey, ValueType, MAX_SEQUENCE_NUMBER,
};
pub use log::{LogReader, LogWriter, RecordType, LOG_BLOCK_SIZE, LOG_HEADER_SIZE};
pub use table::{
    block_trailer, BlockHandle, CompressionType, Footer, BLOCK_TRAILER_SIZE, FOOTER_SIZE,
    TABLE_MAGIC,
};
pub use version_edit::{FileMetaData, VersionEdit, BYTEWISE_COMPARATOR};

// =============================================================================
// File Naming
// =============================================================================

/// Name of the single manifest this crate writes
pub const MANIFEST_FILENAME: &str = "MANIFEST-000001";

/// Pointer file naming the live manifest
pub const CURRENT_FILENAME: &str = "CURRENT";

/// Directory lock file
pub const LOCK_FILENAME: &str = "LOCK";

/// "42" → "000042.ldb"
pub fn table_file_name(number: u64) -> String {
    format!("{:06}.ldb", number)
}

/// "000042.ldb" → Some(42); also accepts the legacy ".sst" suffix
pub fn parse_table_file_name(name: &str) -> Option<u64> {
    let stem = name
        .strip_suffix(".ldb")
        .or_else(|| name.strip_suffix(".sst"))?;
    if stem.is_empty() || !stem.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    stem.parse().ok()
}
