//! Table Reader
//!
//! Opens one `.ldb` file and answers point lookups by internal key. The
//! index block is decoded once at open; data blocks are read on demand and
//! checksummed every time.

use std::cmp::Ordering;
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use crate::compression::BlockCompressor;
use crate::error::{RawDbError, Result};
use crate::format::{
    block_checksum, compare_internal_keys, Block, BlockHandle, CompressionType, Footer,
    BLOCK_TRAILER_SIZE, FOOTER_SIZE,
};

pub struct TableReader {
    file: BufReader<File>,
    path: PathBuf,
    file_size: u64,
    /// Index entries: separator key → data block handle
    index: Vec<(Vec<u8>, BlockHandle)>,
}

impl TableReader {
    /// Open a table and load its index into memory
    pub fn open(path: &Path) -> Result<Self> {
        let mut file = File::open(path)?;
        let file_size = file.metadata()?.len();
        if file_size < FOOTER_SIZE as u64 {
            return Err(RawDbError::Corruption(format!(
                "{}: {} bytes is too short for a table",
                path.display(),
                file_size
            )));
        }

        file.seek(SeekFrom::End(-(FOOTER_SIZE as i64)))?;
        let mut footer = [0u8; FOOTER_SIZE];
        file.read_exact(&mut footer)?;
        let footer = Footer::decode(&footer)?;

        let mut file = BufReader::new(file);
        let index_block = Block::new(read_block(&mut file, footer.index_handle, file_size)?)?;
        let mut index = Vec::new();
        for entry in index_block.iter() {
            let (key, mut value) = entry?;
            index.push((key, BlockHandle::decode_from(&mut value)?));
        }

        Ok(Self {
            file,
            path: path.to_path_buf(),
            file_size,
            index,
        })
    }

    /// First entry whose internal key is `>= target`
    pub fn seek(&mut self, target: &[u8]) -> Result<Option<(Vec<u8>, Vec<u8>)>> {
        let start = self
            .index
            .partition_point(|(separator, _)| compare_internal_keys(separator, target) == Ordering::Less);

        // a target past the last key of its block lands on the next block
        for at in start..self.index.len() {
            let handle = self.index[at].1;
            let block = Block::new(read_block(&mut self.file, handle, self.file_size)?)?;
            if let Some(found) = block.seek(target, compare_internal_keys)? {
                return Ok(Some(found));
            }
        }
        Ok(None)
    }

    /// Visit every entry in order
    pub fn for_each_entry<F>(&mut self, mut f: F) -> Result<()>
    where
        F: FnMut(&[u8], &[u8]) -> Result<()>,
    {
        for at in 0..self.index.len() {
            let (separator, handle) = &self.index[at];
            let block = Block::new(read_block(&mut self.file, *handle, self.file_size)?)?;
            for entry in block.iter() {
                let (key, value) = entry?;
                if compare_internal_keys(&key, separator) == Ordering::Greater {
                    return Err(RawDbError::Corruption(format!(
                        "{}: key past its index separator",
                        self.path.display()
                    )));
                }
                f(&key, value)?;
            }
        }
        Ok(())
    }

    pub fn block_count(&self) -> usize {
        self.index.len()
    }

    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Read, checksum and decompress the block at `handle`
fn read_block(file: &mut BufReader<File>, handle: BlockHandle, file_size: u64) -> Result<Vec<u8>> {
    let end = handle
        .offset
        .checked_add(handle.size)
        .and_then(|n| n.checked_add(BLOCK_TRAILER_SIZE as u64))
        .filter(|&n| n <= file_size)
        .ok_or_else(|| RawDbError::Corruption(format!("block handle {:?} out of range", handle)))?;

    file.seek(SeekFrom::Start(handle.offset))?;
    let mut buf = vec![0u8; (end - handle.offset) as usize];
    file.read_exact(&mut buf)?;

    let trailer = buf.split_off(handle.size as usize);
    let tag = trailer[0];
    let stored = u32::from_le_bytes([trailer[1], trailer[2], trailer[3], trailer[4]]);
    if block_checksum(&buf, tag) != stored {
        return Err(RawDbError::Corruption(format!(
            "block checksum mismatch at offset {}",
            handle.offset
        )));
    }

    match CompressionType::from_u8(tag)? {
        CompressionType::None => Ok(buf),
        CompressionType::Zlib => BlockCompressor::decompress_zlib(&buf),
        CompressionType::ZlibRaw => BlockCompressor::decompress(&buf),
    }
}
