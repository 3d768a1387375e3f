//! SSTable Writer
//!
//! Writes sorted internal-key entries as a LevelDB table file.

use std::io::Write;

use crate::compression::BlockCompressor;
use crate::error::Result;
use crate::format::{
    block_trailer, short_successor, shortest_separator, BlockBuilder, BlockHandle,
    CompressionType, Footer, BLOCK_TRAILER_SIZE,
};

/// What a finished table looks like from the outside
#[derive(Debug)]
pub struct SstSummary<W> {
    pub writer: W,
    pub file_size: u64,
    pub entry_count: u64,
    pub data_blocks: u64,
    /// Smallest internal key written
    pub smallest: Vec<u8>,
    /// Largest internal key written
    pub largest: Vec<u8>,
}

/// Streams blocks into `W`; keys must arrive in internal-key order
pub struct SstWriter<W: Write> {
    writer: W,
    /// Current write position (for block handles)
    offset: u64,
    data_block: BlockBuilder,
    index_block: BlockBuilder,
    /// Handle of the last flushed data block, waiting for the next key so a
    /// short separator can be chosen
    pending_handle: Option<BlockHandle>,
    last_key: Vec<u8>,
    smallest: Option<Vec<u8>>,
    entry_count: u64,
    data_blocks: u64,
    block_size: usize,
    compressor: BlockCompressor,
}

impl<W: Write> SstWriter<W> {
    pub fn new(writer: W, block_size: usize, restart_interval: usize, compressor: BlockCompressor) -> Self {
        Self {
            writer,
            offset: 0,
            data_block: BlockBuilder::new(restart_interval),
            index_block: BlockBuilder::new(1),
            pending_handle: None,
            last_key: Vec::new(),
            smallest: None,
            entry_count: 0,
            data_blocks: 0,
            block_size,
            compressor,
        }
    }

    /// Add one entry to the current data block, flushing it once it
    /// reaches the target block size
    pub fn add(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        self.note_key(key);
        self.data_block.add(key, value);
        if self.data_block.size_estimate() >= self.block_size {
            self.flush_data_block()?;
        }
        Ok(())
    }

    /// Append a data block that was built and raw-Deflate compressed
    /// elsewhere. `last_key` is the block's last (here: only) key.
    pub fn add_compressed_block(&mut self, last_key: &[u8], compressed: &[u8]) -> Result<()> {
        if !self.data_block.is_empty() {
            self.flush_data_block()?;
        }
        self.note_key(last_key);
        let handle = self.write_block(compressed, CompressionType::ZlibRaw)?;
        self.pending_handle = Some(handle);
        self.data_blocks += 1;
        Ok(())
    }

    /// Flush the open data block, then write the metaindex block, index
    /// block, and footer
    pub fn finish(mut self) -> Result<SstSummary<W>> {
        if !self.data_block.is_empty() {
            self.flush_data_block()?;
        }
        if let Some(handle) = self.pending_handle.take() {
            let separator = short_successor(&self.last_key);
            self.index_block.add(&separator, &handle.encode());
        }

        let metaindex = BlockBuilder::new(1).finish();
        let metaindex_handle = self.write_block(&metaindex, CompressionType::None)?;

        let index = self.index_block.finish();
        let index_handle = self.write_block(&index, CompressionType::None)?;

        let footer = Footer {
            metaindex_handle,
            index_handle,
        }
        .encode();
        self.writer.write_all(&footer)?;
        self.offset += footer.len() as u64;
        self.writer.flush()?;

        Ok(SstSummary {
            writer: self.writer,
            file_size: self.offset,
            entry_count: self.entry_count,
            data_blocks: self.data_blocks,
            smallest: self.smallest.unwrap_or_default(),
            largest: self.last_key,
        })
    }

    /// Record `key` as the newest key; emit the index entry for the
    /// previous block if one is pending
    fn note_key(&mut self, key: &[u8]) {
        if let Some(handle) = self.pending_handle.take() {
            let separator = shortest_separator(&self.last_key, key);
            self.index_block.add(&separator, &handle.encode());
        }
        if self.smallest.is_none() {
            self.smallest = Some(key.to_vec());
        }
        self.last_key.clear();
        self.last_key.extend_from_slice(key);
        self.entry_count += 1;
    }

    fn flush_data_block(&mut self) -> Result<()> {
        let raw = self.data_block.finish();
        let compressed = self.compressor.compress(&raw)?;
        let handle = if compressed.len() < raw.len() {
            self.write_block(&compressed, CompressionType::ZlibRaw)?
        } else {
            self.write_block(&raw, CompressionType::None)?
        };
        self.pending_handle = Some(handle);
        self.data_blocks += 1;
        Ok(())
    }

    fn write_block(&mut self, content: &[u8], compression: CompressionType) -> Result<BlockHandle> {
        let handle = BlockHandle::new(self.offset, content.len() as u64);
        self.writer.write_all(content)?;
        self.writer.write_all(&block_trailer(content, compression))?;
        self.offset += (content.len() + BLOCK_TRAILER_SIZE) as u64;
        Ok(handle)
    }
}
