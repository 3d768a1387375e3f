//! Log record framing (used for the MANIFEST)
//!
//! The file is a sequence of 32 KB blocks. A logical record is split into
//! physical fragments that never straddle a block boundary:
//! ```text
//! ┌──────────────┬────────────┬──────────┬───────────────┐
//! │ masked crc(4)│ length (2) │ type (1) │ payload       │
//! └──────────────┴────────────┴──────────┴───────────────┘
//! ```
//! A block tail too short for a header is zero-filled.

use std::io::Write;

use bytes::{Buf, BufMut};

use crate::error::{RawDbError, Result};

use super::crc::record_checksum;

pub const LOG_BLOCK_SIZE: usize = 32 * 1024;

/// crc (4) + length (2) + type (1)
pub const LOG_HEADER_SIZE: usize = 7;

/// Position of a fragment within its logical record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RecordType {
    Full = 1,
    First = 2,
    Middle = 3,
    Last = 4,
}

impl RecordType {
    fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            1 => Some(RecordType::Full),
            2 => Some(RecordType::First),
            3 => Some(RecordType::Middle),
            4 => Some(RecordType::Last),
            _ => None,
        }
    }
}

/// Appends framed records to a log
pub struct LogWriter<W: Write> {
    dest: W,
    block_offset: usize,
}

impl<W: Write> LogWriter<W> {
    pub fn new(dest: W) -> Self {
        Self {
            dest,
            block_offset: 0,
        }
    }

    pub fn add_record(&mut self, data: &[u8]) -> Result<()> {
        let mut rest = data;
        let mut begin = true;
        loop {
            let leftover = LOG_BLOCK_SIZE - self.block_offset;
            if leftover < LOG_HEADER_SIZE {
                self.dest.write_all(&[0u8; LOG_HEADER_SIZE - 1][..leftover])?;
                self.block_offset = 0;
            }

            let available = LOG_BLOCK_SIZE - self.block_offset - LOG_HEADER_SIZE;
            let fragment_len = rest.len().min(available);
            let end = fragment_len == rest.len();
            let record_type = match (begin, end) {
                (true, true) => RecordType::Full,
                (true, false) => RecordType::First,
                (false, true) => RecordType::Last,
                (false, false) => RecordType::Middle,
            };

            let (fragment, tail) = rest.split_at(fragment_len);
            self.emit(record_type, fragment)?;
            rest = tail;
            begin = false;

            if end {
                return Ok(());
            }
        }
    }

    pub fn flush(&mut self) -> Result<()> {
        self.dest.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.dest
    }

    fn emit(&mut self, record_type: RecordType, fragment: &[u8]) -> Result<()> {
        let mut header = Vec::with_capacity(LOG_HEADER_SIZE);
        header.put_u32_le(record_checksum(record_type as u8, fragment));
        header.put_u16_le(fragment.len() as u16);
        header.put_u8(record_type as u8);

        self.dest.write_all(&header)?;
        self.dest.write_all(fragment)?;
        self.block_offset += LOG_HEADER_SIZE + fragment.len();
        Ok(())
    }
}

/// Reassembles logical records from an in-memory log image
pub struct LogReader<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> LogReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, offset: 0 }
    }

    /// Next logical record, or `None` at a clean end of log
    pub fn read_record(&mut self) -> Result<Option<Vec<u8>>> {
        let mut record: Option<Vec<u8>> = None;
        loop {
            let block_left = LOG_BLOCK_SIZE - self.offset % LOG_BLOCK_SIZE;
            if block_left < LOG_HEADER_SIZE {
                self.offset += block_left;
                continue;
            }
            if self.offset + LOG_HEADER_SIZE > self.data.len() {
                return match record {
                    None => Ok(None),
                    Some(_) => Err(RawDbError::Corruption("log ends mid-record".into())),
                };
            }

            let mut header = &self.data[self.offset..self.offset + LOG_HEADER_SIZE];
            let expected_crc = header.get_u32_le();
            let length = header.get_u16_le() as usize;
            let type_byte = header.get_u8();

            if type_byte == 0 && length == 0 {
                // zero padding up to the end of the block
                self.offset += block_left;
                continue;
            }

            let start = self.offset + LOG_HEADER_SIZE;
            if length > block_left - LOG_HEADER_SIZE || start + length > self.data.len() {
                return Err(RawDbError::Corruption(format!(
                    "log fragment at {} overruns its block",
                    self.offset
                )));
            }
            let payload = &self.data[start..start + length];
            if record_checksum(type_byte, payload) != expected_crc {
                return Err(RawDbError::Corruption(format!(
                    "log checksum mismatch at {}",
                    self.offset
                )));
            }
            let fragment_offset = self.offset;
            self.offset = start + length;

            let record_type = RecordType::from_u8(type_byte).ok_or_else(|| {
                RawDbError::Corruption(format!("unknown log record type {}", type_byte))
            })?;
            match (record_type, record.take()) {
                (RecordType::Full, None) => return Ok(Some(payload.to_vec())),
                (RecordType::First, None) => record = Some(payload.to_vec()),
                (RecordType::Middle, Some(mut buf)) => {
                    buf.extend_from_slice(payload);
                    record = Some(buf);
                }
                (RecordType::Last, Some(mut buf)) => {
                    buf.extend_from_slice(payload);
                    return Ok(Some(buf));
                }
                (record_type, _) => {
                    return Err(RawDbError::Corruption(format!(
                        "unexpected {:?} fragment at {}",
                        record_type, fragment_offset
                    )))
                }
            }
        }
    }
}
