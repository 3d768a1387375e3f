//! ManifestWriter
//!
//! Registers every built table in a single VersionEdit and points CURRENT
//! at it. These two files are what make the directory a database.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::error::{RawDbError, Result};
use crate::format::{
    FileMetaData, LogWriter, VersionEdit, BYTEWISE_COMPARATOR, CURRENT_FILENAME,
    MANIFEST_FILENAME,
};

use super::TableBuildResult;

/// Every table lands on this level; they never overlap
const TABLE_LEVEL: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestSummary {
    pub tables: usize,
    pub last_sequence: u64,
    pub next_file_number: u64,
}

/// Write `MANIFEST-000001` for `tables`, then `CURRENT`
pub fn write_manifest(
    dir: &Path,
    tables: &[TableBuildResult],
    total_records: u64,
    plan_count: usize,
) -> Result<ManifestSummary> {
    if tables.len() != plan_count {
        return Err(RawDbError::stage(
            "manifest",
            format!("{} tables for {} plans", tables.len(), plan_count),
        ));
    }

    let mut edit = VersionEdit {
        comparator: Some(BYTEWISE_COMPARATOR.to_string()),
        log_number: Some(0),
        prev_log_number: Some(0),
        next_file_number: Some(plan_count as u64 + 1),
        last_sequence: Some(total_records + 1),
        ..Default::default()
    };
    for table in tables {
        edit.add_file(
            TABLE_LEVEL,
            FileMetaData {
                number: table.file_number,
                file_size: table.file_size,
                smallest: table.smallest_key.clone(),
                largest: table.largest_key.clone(),
            },
        );
    }

    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(dir.join(MANIFEST_FILENAME))?;
    let mut log = LogWriter::new(BufWriter::new(file));
    log.add_record(&edit.encode())?;
    log.flush()?;
    let file = log
        .into_inner()
        .into_inner()
        .map_err(|e| RawDbError::Io(e.into_error()))?;
    file.sync_all()?;

    write_current(dir, MANIFEST_FILENAME)?;

    let summary = ManifestSummary {
        tables: tables.len(),
        last_sequence: total_records + 1,
        next_file_number: plan_count as u64 + 1,
    };
    tracing::info!(
        tables = summary.tables,
        last_sequence = summary.last_sequence,
        "wrote manifest"
    );
    Ok(summary)
}

/// Atomically point CURRENT at `manifest_name` via a temp file and rename
pub fn write_current(dir: &Path, manifest_name: &str) -> Result<()> {
    let number = manifest_name
        .strip_prefix("MANIFEST-")
        .ok_or_else(|| RawDbError::stage("manifest", format!("bad name {}", manifest_name)))?;
    let temp = dir.join(format!("{}.dbtmp", number));

    let mut file = File::create(&temp)?;
    file.write_all(manifest_name.as_bytes())?;
    file.write_all(b"\n")?;
    file.sync_all()?;
    drop(file);

    if let Err(e) = fs::rename(&temp, dir.join(CURRENT_FILENAME)) {
        let _ = fs::remove_file(&temp);
        return Err(e.into());
    }
    Ok(())
}
