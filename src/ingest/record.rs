//! KeyRecord codec
//!
//! Shared by the key-index log and the per-shard key files.

use std::io::{ErrorKind, Read, Write};

use bytes::{Buf, BufMut};

use crate::error::{RawDbError, Result};

/// value_offset (8) + value_size (8) + key_size (8) + sequence (8)
pub const RECORD_HEADER_SIZE: usize = 32;

/// Reference from a key to its payload in the values log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRecord {
    pub value_offset: u64,
    pub value_size: u64,
    pub key: Vec<u8>,
    pub sequence: u64,
}

impl KeyRecord {
    /// Bytes this record occupies on disk
    pub fn encoded_len(&self) -> u64 {
        (RECORD_HEADER_SIZE + self.key.len()) as u64
    }

    pub fn encode_to(&self, dst: &mut Vec<u8>) {
        Self::encode_parts(dst, self.value_offset, self.value_size, &self.key, self.sequence);
    }

    /// Encode without owning the key
    pub fn encode_parts(dst: &mut Vec<u8>, value_offset: u64, value_size: u64, key: &[u8], sequence: u64) {
        dst.reserve(RECORD_HEADER_SIZE + key.len());
        dst.put_u64_le(value_offset);
        dst.put_u64_le(value_size);
        dst.put_u64_le(key.len() as u64);
        dst.put_u64_le(sequence);
        dst.put_slice(key);
    }

    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        let mut buf = Vec::with_capacity(RECORD_HEADER_SIZE + self.key.len());
        self.encode_to(&mut buf);
        writer.write_all(&buf)?;
        Ok(())
    }
}

/// Sequential reader over a stream of encoded KeyRecords
pub struct KeyRecordReader<R: Read> {
    reader: R,
    /// Byte offset of the next record
    offset: u64,
}

impl<R: Read> KeyRecordReader<R> {
    pub fn new(reader: R) -> Self {
        Self::starting_at(reader, 0)
    }

    /// Reader whose underlying stream is already positioned at `offset`
    pub fn starting_at(reader: R, offset: u64) -> Self {
        Self { reader, offset }
    }

    /// Byte offset of the record the next call will return
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Next record, or `None` at a clean end of stream
    pub fn next_record(&mut self) -> Result<Option<KeyRecord>> {
        let mut header = [0u8; RECORD_HEADER_SIZE];
        if !self.fill_header(&mut header)? {
            return Ok(None);
        }

        let mut src = &header[..];
        let value_offset = src.get_u64_le();
        let value_size = src.get_u64_le();
        let key_size = src.get_u64_le();
        let sequence = src.get_u64_le();

        let mut key = vec![0u8; key_size as usize];
        self.reader.read_exact(&mut key).map_err(|e| match e.kind() {
            ErrorKind::UnexpectedEof => {
                RawDbError::Corruption(format!("key record at {} truncated", self.offset))
            }
            _ => RawDbError::Io(e),
        })?;

        self.offset += RECORD_HEADER_SIZE as u64 + key_size;
        Ok(Some(KeyRecord {
            value_offset,
            value_size,
            key,
            sequence,
        }))
    }

    /// Like `read_exact`, but a clean EOF before the first byte is `Ok(false)`
    fn fill_header(&mut self, header: &mut [u8]) -> Result<bool> {
        let mut filled = 0;
        while filled < header.len() {
            match self.reader.read(&mut header[filled..]) {
                Ok(0) if filled == 0 => return Ok(false),
                Ok(0) => {
                    return Err(RawDbError::Corruption(format!(
                        "key record header at {} truncated",
                        self.offset
                    )))
                }
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(true)
    }
}

impl<R: Read> Iterator for KeyRecordReader<R> {
    type Item = Result<KeyRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_record().transpose()
    }
}
