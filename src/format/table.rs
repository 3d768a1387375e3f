//! Block handles, trailers, and the table footer

use bytes::{Buf, BufMut};

use crate::error::{RawDbError, Result};

use super::coding::{get_varint64, put_varint64};
use super::crc::block_checksum;

/// Magic number at the end of every table file
pub const TABLE_MAGIC: u64 = 0xdb47_7524_8b80_fb57;

/// compression type (1) + masked crc32c (4)
pub const BLOCK_TRAILER_SIZE: usize = 5;

/// Two handles padded to their maximum encoded length, plus the magic
pub const FOOTER_SIZE: usize = 2 * BlockHandle::MAX_ENCODED_LENGTH + 8;

/// Compression tag stored in a block trailer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CompressionType {
    None = 0,
    Zlib = 2,
    ZlibRaw = 4,
}

impl CompressionType {
    pub fn from_u8(tag: u8) -> Result<Self> {
        match tag {
            0 => Ok(CompressionType::None),
            2 => Ok(CompressionType::Zlib),
            4 => Ok(CompressionType::ZlibRaw),
            other => Err(RawDbError::Corruption(format!(
                "unsupported block compression type {}",
                other
            ))),
        }
    }
}

/// Trailer written after a block's content
pub fn block_trailer(content: &[u8], compression: CompressionType) -> [u8; BLOCK_TRAILER_SIZE] {
    let tag = compression as u8;
    let mut trailer = [0u8; BLOCK_TRAILER_SIZE];
    trailer[0] = tag;
    trailer[1..].copy_from_slice(&block_checksum(content, tag).to_le_bytes());
    trailer
}

/// Location of a block within a table file; `size` excludes the trailer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BlockHandle {
    pub offset: u64,
    pub size: u64,
}

impl BlockHandle {
    pub const MAX_ENCODED_LENGTH: usize = 10 + 10;

    pub fn new(offset: u64, size: u64) -> Self {
        Self { offset, size }
    }

    pub fn encode_to(&self, dst: &mut Vec<u8>) {
        put_varint64(dst, self.offset);
        put_varint64(dst, self.size);
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(Self::MAX_ENCODED_LENGTH);
        self.encode_to(&mut buf);
        buf
    }

    pub fn decode_from(src: &mut &[u8]) -> Result<Self> {
        let offset = get_varint64(src)?;
        let size = get_varint64(src)?;
        Ok(Self { offset, size })
    }
}

/// Fixed-size tail of every table file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Footer {
    pub metaindex_handle: BlockHandle,
    pub index_handle: BlockHandle,
}

impl Footer {
    pub fn encode(&self) -> [u8; FOOTER_SIZE] {
        let mut buf = Vec::with_capacity(FOOTER_SIZE);
        self.metaindex_handle.encode_to(&mut buf);
        self.index_handle.encode_to(&mut buf);
        buf.resize(2 * BlockHandle::MAX_ENCODED_LENGTH, 0);
        buf.put_u64_le(TABLE_MAGIC);

        let mut footer = [0u8; FOOTER_SIZE];
        footer.copy_from_slice(&buf);
        footer
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() != FOOTER_SIZE {
            return Err(RawDbError::Corruption(format!(
                "footer must be {} bytes, got {}",
                FOOTER_SIZE,
                data.len()
            )));
        }
        let magic = (&data[FOOTER_SIZE - 8..]).get_u64_le();
        if magic != TABLE_MAGIC {
            return Err(RawDbError::Corruption(format!(
                "bad table magic {:#018x}",
                magic
            )));
        }
        let mut src = &data[..FOOTER_SIZE - 8];
        let metaindex_handle = BlockHandle::decode_from(&mut src)?;
        let index_handle = BlockHandle::decode_from(&mut src)?;
        Ok(Self {
            metaindex_handle,
            index_handle,
        })
    }
}
