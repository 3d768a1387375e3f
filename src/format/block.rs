//! Data and index blocks
//!
//! Keys are prefix-compressed against the previous key, except at restart
//! points where the full key is stored:
//! ```text
//! entry:   shared (varint32) | non_shared (varint32) | value_len (varint32)
//!          | key[shared..] | value
//! trailer: restart offsets (u32 LE each) | num_restarts (u32 LE)
//! ```

use std::cmp::Ordering;

use bytes::{Buf, BufMut};

use crate::error::{RawDbError, Result};

use super::coding::{get_varint32, put_varint32};

/// Accumulates sorted entries into one encoded block
#[derive(Debug)]
pub struct BlockBuilder {
    buffer: Vec<u8>,
    restarts: Vec<u32>,
    restart_interval: usize,
    /// Entries since the last restart point
    counter: usize,
    last_key: Vec<u8>,
    entries: usize,
}

impl BlockBuilder {
    pub fn new(restart_interval: usize) -> Self {
        assert!(restart_interval >= 1, "restart interval must be at least 1");
        Self {
            buffer: Vec::new(),
            restarts: vec![0],
            restart_interval,
            counter: 0,
            last_key: Vec::new(),
            entries: 0,
        }
    }

    /// Append an entry. Keys must arrive in ascending order.
    pub fn add(&mut self, key: &[u8], value: &[u8]) {
        let shared = if self.counter < self.restart_interval {
            self.last_key
                .iter()
                .zip(key)
                .take_while(|(a, b)| a == b)
                .count()
        } else {
            self.restarts.push(self.buffer.len() as u32);
            self.counter = 0;
            0
        };
        let non_shared = key.len() - shared;

        put_varint32(&mut self.buffer, shared as u32);
        put_varint32(&mut self.buffer, non_shared as u32);
        put_varint32(&mut self.buffer, value.len() as u32);
        self.buffer.put_slice(&key[shared..]);
        self.buffer.put_slice(value);

        self.last_key.truncate(shared);
        self.last_key.extend_from_slice(&key[shared..]);
        self.counter += 1;
        self.entries += 1;
    }

    /// Size of the block if `finish` were called now
    pub fn size_estimate(&self) -> usize {
        self.buffer.len() + self.restarts.len() * 4 + 4
    }

    pub fn is_empty(&self) -> bool {
        self.entries == 0
    }

    pub fn len(&self) -> usize {
        self.entries
    }

    /// Emit the encoded block and reset the builder for reuse
    pub fn finish(&mut self) -> Vec<u8> {
        let mut block = std::mem::take(&mut self.buffer);
        for restart in &self.restarts {
            block.put_u32_le(*restart);
        }
        block.put_u32_le(self.restarts.len() as u32);

        self.restarts.clear();
        self.restarts.push(0);
        self.counter = 0;
        self.last_key.clear();
        self.entries = 0;
        block
    }
}

/// A decoded (uncompressed) block
#[derive(Debug, Clone)]
pub struct Block {
    data: Vec<u8>,
    restarts_offset: usize,
    num_restarts: usize,
}

impl Block {
    pub fn new(data: Vec<u8>) -> Result<Self> {
        if data.len() < 4 {
            return Err(RawDbError::Corruption("block shorter than restart count".into()));
        }
        let num_restarts = (&data[data.len() - 4..]).get_u32_le() as usize;
        let restarts_size = num_restarts
            .checked_mul(4)
            .and_then(|n| n.checked_add(4))
            .filter(|&n| n <= data.len())
            .ok_or_else(|| {
                RawDbError::Corruption(format!("bad restart count {}", num_restarts))
            })?;
        Ok(Self {
            restarts_offset: data.len() - restarts_size,
            num_restarts,
            data,
        })
    }

    pub fn iter(&self) -> BlockIter<'_> {
        BlockIter {
            block: self,
            offset: 0,
            key: Vec::new(),
        }
    }

    /// First entry whose key is `>= target` under `cmp`
    pub fn seek<F>(&self, target: &[u8], cmp: F) -> Result<Option<(Vec<u8>, Vec<u8>)>>
    where
        F: Fn(&[u8], &[u8]) -> Ordering,
    {
        // last restart point whose key is < target
        let mut left = 0;
        let mut right = self.num_restarts;
        while left + 1 < right {
            let mid = (left + right) / 2;
            let entry = self.decode_entry(self.restart_point(mid))?;
            if entry.shared != 0 {
                return Err(RawDbError::Corruption("restart entry shares a prefix".into()));
            }
            if cmp(entry.key_delta, target) == Ordering::Less {
                left = mid;
            } else {
                right = mid;
            }
        }

        let offset = if self.num_restarts == 0 {
            self.restarts_offset
        } else {
            self.restart_point(left)
        };
        let mut iter = BlockIter {
            block: self,
            offset,
            key: Vec::new(),
        };
        for item in &mut iter {
            let (key, value) = item?;
            if cmp(&key, target) != Ordering::Less {
                return Ok(Some((key, value.to_vec())));
            }
        }
        Ok(None)
    }

    fn restart_point(&self, index: usize) -> usize {
        let at = self.restarts_offset + index * 4;
        (&self.data[at..at + 4]).get_u32_le() as usize
    }

    fn decode_entry(&self, offset: usize) -> Result<Entry<'_>> {
        if offset > self.restarts_offset {
            return Err(RawDbError::Corruption(format!("entry offset {} past data", offset)));
        }
        let mut src = &self.data[offset..self.restarts_offset];
        let shared = get_varint32(&mut src)? as usize;
        let non_shared = get_varint32(&mut src)? as usize;
        let value_len = get_varint32(&mut src)? as usize;
        if src.len() < non_shared + value_len {
            return Err(RawDbError::Corruption(format!(
                "block entry at {} overruns block",
                offset
            )));
        }
        let header_len = self.restarts_offset - offset - src.len();
        Ok(Entry {
            shared,
            key_delta: &src[..non_shared],
            value: &src[non_shared..non_shared + value_len],
            next: offset + header_len + non_shared + value_len,
        })
    }
}

struct Entry<'a> {
    shared: usize,
    key_delta: &'a [u8],
    value: &'a [u8],
    next: usize,
}

/// Sequential iterator over a block's entries
pub struct BlockIter<'a> {
    block: &'a Block,
    offset: usize,
    key: Vec<u8>,
}

impl<'a> Iterator for BlockIter<'a> {
    type Item = Result<(Vec<u8>, &'a [u8])>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.offset >= self.block.restarts_offset {
            return None;
        }
        let entry = match self.block.decode_entry(self.offset) {
            Ok(entry) => entry,
            Err(e) => {
                self.offset = self.block.restarts_offset;
                return Some(Err(e));
            }
        };
        if entry.shared > self.key.len() {
            self.offset = self.block.restarts_offset;
            return Some(Err(RawDbError::Corruption(
                "entry shares more bytes than previous key".into(),
            )));
        }
        self.key.truncate(entry.shared);
        self.key.extend_from_slice(entry.key_delta);
        self.offset = entry.next;
        Some(Ok((self.key.clone(), entry.value)))
    }
}
