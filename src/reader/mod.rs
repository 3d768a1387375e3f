//! Reader Module
//!
//! A small read-only LevelDB-format reader, enough to check what the
//! build pipeline wrote.
//!
//! ## Lookup path
//! ```text
//! CURRENT ──▶ MANIFEST-NNNNNN ──▶ VersionEdits ──▶ live files
//!                                                   │
//!          get(user_key) ──▶ key range check ──▶ index block ──▶ data block
//! ```

mod db;
mod table;

pub use db::{Database, LiveFile, VerifyReport};
pub use table::TableReader;
