//! VersionEdit: the payload of a MANIFEST record
//!
//! Each field is a varint32 tag followed by a tag-specific body.

use crate::error::{RawDbError, Result};

use super::coding::{
    get_length_prefixed, get_varint32, get_varint64, put_length_prefixed, put_varint32,
    put_varint64,
};

/// Name LevelDB checks against its configured comparator on open
pub const BYTEWISE_COMPARATOR: &str = "leveldb.BytewiseComparator";

const TAG_COMPARATOR: u32 = 1;
const TAG_LOG_NUMBER: u32 = 2;
const TAG_NEXT_FILE_NUMBER: u32 = 3;
const TAG_LAST_SEQUENCE: u32 = 4;
const TAG_COMPACT_POINTER: u32 = 5;
const TAG_DELETED_FILE: u32 = 6;
const TAG_NEW_FILE: u32 = 7;
// 8 was used for large value refs
const TAG_PREV_LOG_NUMBER: u32 = 9;

/// One table file as registered in the manifest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMetaData {
    pub number: u64,
    pub file_size: u64,
    /// Smallest internal key in the table
    pub smallest: Vec<u8>,
    /// Largest internal key in the table
    pub largest: Vec<u8>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionEdit {
    pub comparator: Option<String>,
    pub log_number: Option<u64>,
    pub prev_log_number: Option<u64>,
    pub next_file_number: Option<u64>,
    pub last_sequence: Option<u64>,
    pub compact_pointers: Vec<(u32, Vec<u8>)>,
    pub deleted_files: Vec<(u32, u64)>,
    pub new_files: Vec<(u32, FileMetaData)>,
}

impl VersionEdit {
    pub fn add_file(&mut self, level: u32, file: FileMetaData) {
        self.new_files.push((level, file));
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut dst = Vec::new();
        if let Some(name) = &self.comparator {
            put_varint32(&mut dst, TAG_COMPARATOR);
            put_length_prefixed(&mut dst, name.as_bytes());
        }
        if let Some(n) = self.log_number {
            put_varint32(&mut dst, TAG_LOG_NUMBER);
            put_varint64(&mut dst, n);
        }
        if let Some(n) = self.prev_log_number {
            put_varint32(&mut dst, TAG_PREV_LOG_NUMBER);
            put_varint64(&mut dst, n);
        }
        if let Some(n) = self.next_file_number {
            put_varint32(&mut dst, TAG_NEXT_FILE_NUMBER);
            put_varint64(&mut dst, n);
        }
        if let Some(n) = self.last_sequence {
            put_varint32(&mut dst, TAG_LAST_SEQUENCE);
            put_varint64(&mut dst, n);
        }
        for (level, key) in &self.compact_pointers {
            put_varint32(&mut dst, TAG_COMPACT_POINTER);
            put_varint32(&mut dst, *level);
            put_length_prefixed(&mut dst, key);
        }
        for (level, number) in &self.deleted_files {
            put_varint32(&mut dst, TAG_DELETED_FILE);
            put_varint32(&mut dst, *level);
            put_varint64(&mut dst, *number);
        }
        for (level, file) in &self.new_files {
            put_varint32(&mut dst, TAG_NEW_FILE);
            put_varint32(&mut dst, *level);
            put_varint64(&mut dst, file.number);
            put_varint64(&mut dst, file.file_size);
            put_length_prefixed(&mut dst, &file.smallest);
            put_length_prefixed(&mut dst, &file.largest);
        }
        dst
    }

    pub fn decode(mut src: &[u8]) -> Result<Self> {
        let mut edit = VersionEdit::default();
        while !src.is_empty() {
            match get_varint32(&mut src)? {
                TAG_COMPARATOR => {
                    let name = get_length_prefixed(&mut src)?;
                    let name = String::from_utf8(name.to_vec()).map_err(|_| {
                        RawDbError::Corruption("comparator name is not utf-8".into())
                    })?;
                    edit.comparator = Some(name);
                }
                TAG_LOG_NUMBER => edit.log_number = Some(get_varint64(&mut src)?),
                TAG_PREV_LOG_NUMBER => edit.prev_log_number = Some(get_varint64(&mut src)?),
                TAG_NEXT_FILE_NUMBER => edit.next_file_number = Some(get_varint64(&mut src)?),
                TAG_LAST_SEQUENCE => edit.last_sequence = Some(get_varint64(&mut src)?),
                TAG_COMPACT_POINTER => {
                    let level = get_varint32(&mut src)?;
                    let key = get_length_prefixed(&mut src)?.to_vec();
                    edit.compact_pointers.push((level, key));
                }
                TAG_DELETED_FILE => {
                    let level = get_varint32(&mut src)?;
                    let number = get_varint64(&mut src)?;
                    edit.deleted_files.push((level, number));
                }
                TAG_NEW_FILE => {
                    let level = get_varint32(&mut src)?;
                    let number = get_varint64(&mut src)?;
                    let file_size = get_varint64(&mut src)?;
                    let smallest = get_length_prefixed(&mut src)?.to_vec();
                    let largest = get_length_prefixed(&mut src)?.to_vec();
                    edit.new_files.push((
                        level,
                        FileMetaData {
                            number,
                            file_size,
                            smallest,
                            largest,
                        },
                    ));
                }
                tag => {
                    return Err(RawDbError::Corruption(format!(
                        "unknown VersionEdit tag {}",
                        tag
                    )))
                }
            }
        }
        Ok(edit)
    }
}
