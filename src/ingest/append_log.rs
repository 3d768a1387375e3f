//! AppendLog
//!
//! Owns `values.bin` and `keys.bin`. Only the ingest writer thread touches
//! it, so nothing here is synchronized.

use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::error::{RawDbError, Result};

use super::record::KeyRecord;
use super::{KEYS_FILENAME, VALUES_FILENAME};

type Sink = Box<dyn Write + Send>;

/// What the log holds once ingestion has drained
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppendLogSummary {
    /// Total bytes in the values log
    pub value_bytes: u64,
    /// Number of key records written
    pub record_count: u64,
}

/// Pair of append-only files. Any write failure tears both sinks down and
/// the log stays invalid for the rest of its life.
pub struct AppendLog {
    values: Option<Sink>,
    keys: Option<Sink>,
    /// Offset where the next payload will land in the values log
    value_offset: u64,
    record_count: u64,
    /// Scratch buffer for encoding key records
    scratch: Vec<u8>,
}

impl AppendLog {
    /// Create (truncating) both log files in `dir`
    pub fn create(dir: &Path) -> Result<Self> {
        let open = |name: &str| {
            OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(dir.join(name))
        };
        let values = BufWriter::new(open(VALUES_FILENAME)?);
        let keys = BufWriter::new(open(KEYS_FILENAME)?);
        Ok(Self::from_sinks(Box::new(values), Box::new(keys)))
    }

    /// Build a log over arbitrary sinks
    pub fn from_sinks(values: Box<dyn Write + Send>, keys: Box<dyn Write + Send>) -> Self {
        Self {
            values: Some(values),
            keys: Some(keys),
            value_offset: 0,
            record_count: 0,
            scratch: Vec::new(),
        }
    }

    /// Append one payload and the key record pointing at it
    pub fn append(&mut self, key: &[u8], payload: &[u8], sequence: u64) -> Result<()> {
        let (Some(values), Some(keys)) = (self.values.as_mut(), self.keys.as_mut()) else {
            return Err(RawDbError::IngestFailed);
        };

        self.scratch.clear();
        KeyRecord::encode_parts(
            &mut self.scratch,
            self.value_offset,
            payload.len() as u64,
            key,
            sequence,
        );

        let written = values
            .write_all(payload)
            .and_then(|_| keys.write_all(&self.scratch));
        if let Err(e) = written {
            self.invalidate();
            return Err(e.into());
        }

        self.value_offset += payload.len() as u64;
        self.record_count += 1;
        Ok(())
    }

    pub fn is_valid(&self) -> bool {
        self.values.is_some() && self.keys.is_some()
    }

    /// Close both sinks; later appends fail
    pub fn invalidate(&mut self) {
        self.values = None;
        self.keys = None;
    }

    pub fn value_offset(&self) -> u64 {
        self.value_offset
    }

    pub fn record_count(&self) -> u64 {
        self.record_count
    }

    /// Flush and close both files
    pub fn finish(mut self) -> Result<AppendLogSummary> {
        let (Some(mut values), Some(mut keys)) = (self.values.take(), self.keys.take()) else {
            return Err(RawDbError::IngestFailed);
        };
        values.flush()?;
        keys.flush()?;
        Ok(AppendLogSummary {
            value_bytes: self.value_offset,
            record_count: self.record_count,
        })
    }
}
