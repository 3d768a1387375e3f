//! Database
//!
//! Read-only view of a finished directory: CURRENT → MANIFEST → tables.
//!
//! ## Responsibilities
//! - Replay every VersionEdit in the manifest into the live file set
//! - Refuse any comparator other than the bytewise one
//! - Answer `get` with the newest version of a user key
//! - Walk and check every entry for `verify`

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::error::{RawDbError, Result};
use crate::format::{
    compare_internal_keys, parse_internal_key, table_file_name, FileMetaData, InternalKey,
    LogReader, ValueType, VersionEdit, BYTEWISE_COMPARATOR, CURRENT_FILENAME,
    MAX_SEQUENCE_NUMBER,
};

use super::table::TableReader;

/// One live table and the level it was registered at
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveFile {
    pub level: u32,
    pub meta: FileMetaData,
}

/// Counts gathered by [`Database::verify`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VerifyReport {
    pub tables: usize,
    pub blocks: usize,
    pub entries: u64,
    pub distinct_keys: u64,
    pub bytes: u64,
}

/// Read-only LevelDB-format database
///
/// ## Concurrency:
/// - `tables` sits behind one Mutex because a lookup moves the file
///   cursor of the table it reads
pub struct Database {
    dir: PathBuf,
    manifest: String,
    /// Live files ordered by level, then smallest key
    files: Vec<LiveFile>,
    tables: Mutex<Vec<TableReader>>,
    last_sequence: u64,
    next_file_number: u64,
    log_number: u64,
}

impl Database {
    /// Open the database in `dir` named by its CURRENT file
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let current = fs::read_to_string(dir.join(CURRENT_FILENAME))?;
        let manifest = current
            .strip_suffix('\n')
            .filter(|name| !name.is_empty() && !name.contains('/'))
            .ok_or_else(|| RawDbError::Corruption(format!("malformed CURRENT: {:?}", current)))?
            .to_string();

        let data = fs::read(dir.join(&manifest))?;
        let mut reader = LogReader::new(&data);
        let mut live: BTreeMap<(u32, u64), FileMetaData> = BTreeMap::new();
        let mut last_sequence = None;
        let mut next_file_number = None;
        let mut log_number = 0;
        let mut edits = 0usize;

        while let Some(record) = reader.read_record()? {
            let edit = VersionEdit::decode(&record)?;
            if let Some(name) = &edit.comparator {
                if name != BYTEWISE_COMPARATOR {
                    return Err(RawDbError::Corruption(format!(
                        "unsupported comparator {}",
                        name
                    )));
                }
            }
            for (level, number) in &edit.deleted_files {
                live.remove(&(*level, *number));
            }
            for (level, file) in edit.new_files {
                live.insert((level, file.number), file);
            }
            last_sequence = edit.last_sequence.or(last_sequence);
            next_file_number = edit.next_file_number.or(next_file_number);
            log_number = edit.log_number.unwrap_or(log_number);
            edits += 1;
        }

        let (Some(last_sequence), Some(next_file_number)) = (last_sequence, next_file_number) else {
            return Err(RawDbError::Corruption(format!(
                "{} lacks last sequence or next file number",
                manifest
            )));
        };

        let mut files: Vec<LiveFile> = live
            .into_iter()
            .map(|((level, _), meta)| LiveFile { level, meta })
            .collect();
        files.sort_by(|a, b| {
            a.level
                .cmp(&b.level)
                .then_with(|| compare_internal_keys(&a.meta.smallest, &b.meta.smallest))
        });

        let mut tables = Vec::with_capacity(files.len());
        for file in &files {
            let table = TableReader::open(&dir.join(table_file_name(file.meta.number)))?;
            if table.file_size() != file.meta.file_size {
                return Err(RawDbError::Corruption(format!(
                    "{}: size {} but manifest says {}",
                    table.path().display(),
                    table.file_size(),
                    file.meta.file_size
                )));
            }
            tables.push(table);
        }

        tracing::debug!(
            dir = %dir.display(),
            edits,
            tables = files.len(),
            last_sequence,
            "opened database"
        );

        Ok(Self {
            dir: dir.to_path_buf(),
            manifest,
            files,
            tables: Mutex::new(tables),
            last_sequence,
            next_file_number,
            log_number,
        })
    }

    /// Newest value stored under `user_key`
    pub fn get(&self, user_key: &[u8]) -> Result<Option<Vec<u8>>> {
        let target = InternalKey::new(user_key, MAX_SEQUENCE_NUMBER, ValueType::Value);
        let mut tables = self.tables.lock();

        let mut newest: Option<(u64, ValueType, Vec<u8>)> = None;
        for (file, table) in self.files.iter().zip(tables.iter_mut()) {
            if !covers(&file.meta, user_key) {
                continue;
            }
            let Some((key, value)) = table.seek(target.as_bytes())? else {
                continue;
            };
            let parsed = parse_internal_key(&key)?;
            if parsed.user_key != user_key {
                continue;
            }
            if newest.as_ref().map_or(true, |(seq, _, _)| parsed.sequence > *seq) {
                newest = Some((parsed.sequence, parsed.value_type, value));
            }
        }

        Ok(match newest {
            Some((_, ValueType::Value, value)) => Some(value),
            _ => None,
        })
    }

    /// Visit every entry table by table; `f` gets the internal key
    pub fn for_each_entry<F>(&self, mut f: F) -> Result<()>
    where
        F: FnMut(&[u8], &[u8]) -> Result<()>,
    {
        let mut tables = self.tables.lock();
        for table in tables.iter_mut() {
            table.for_each_entry(&mut f)?;
        }
        Ok(())
    }

    /// Read every block of every table, checking checksums, key order
    /// within and across tables, and that each table's keys lie within
    /// the bounds the manifest recorded
    pub fn verify(&self) -> Result<VerifyReport> {
        let mut report = VerifyReport {
            tables: self.files.len(),
            ..Default::default()
        };
        let mut tables = self.tables.lock();
        let mut previous: Option<Vec<u8>> = None;

        for (file, table) in self.files.iter().zip(tables.iter_mut()) {
            report.blocks += table.block_count();
            report.bytes += table.file_size();
            let mut first = None;
            let mut last = Vec::new();

            table.for_each_entry(|key, _| {
                let parsed = parse_internal_key(key)?;
                if parsed.sequence > self.last_sequence {
                    return Err(RawDbError::Corruption(format!(
                        "sequence {} beyond last sequence {}",
                        parsed.sequence, self.last_sequence
                    )));
                }
                if let Some(prev) = &previous {
                    if compare_internal_keys(prev, key) != Ordering::Less {
                        return Err(RawDbError::Corruption("keys out of order".into()));
                    }
                    if parse_internal_key(prev)?.user_key != parsed.user_key {
                        report.distinct_keys += 1;
                    }
                } else {
                    report.distinct_keys += 1;
                }
                report.entries += 1;
                first.get_or_insert_with(|| key.to_vec());
                last.clear();
                last.extend_from_slice(key);
                previous = Some(key.to_vec());
                Ok(())
            })?;

            if let Some(first) = first {
                if first != file.meta.smallest || last != file.meta.largest {
                    return Err(RawDbError::Corruption(format!(
                        "table {} key range differs from manifest",
                        file.meta.number
                    )));
                }
            }
        }
        Ok(report)
    }

    pub fn files(&self) -> &[LiveFile] {
        &self.files
    }

    pub fn last_sequence(&self) -> u64 {
        self.last_sequence
    }

    pub fn next_file_number(&self) -> u64 {
        self.next_file_number
    }

    pub fn log_number(&self) -> u64 {
        self.log_number
    }

    /// Manifest file named by CURRENT
    pub fn manifest(&self) -> &str {
        &self.manifest
    }

    pub fn directory(&self) -> &Path {
        &self.dir
    }
}

/// Could `user_key` live in `file`?
fn covers(file: &FileMetaData, user_key: &[u8]) -> bool {
    match (parse_internal_key(&file.smallest), parse_internal_key(&file.largest)) {
        (Ok(smallest), Ok(largest)) => {
            user_key >= smallest.user_key && user_key <= largest.user_key
        }
        _ => false,
    }
}
