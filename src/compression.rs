//! Block compression
//!
//! Raw Deflate (no zlib header), the codec Bedrock's LevelDB fork tags as
//! compression type 4. Plain zlib (type 2) is decoded for reading only.

use std::io::{Read, Write};

use flate2::read::{DeflateDecoder, ZlibDecoder};
use flate2::write::DeflateEncoder;
use flate2::Compression;

use crate::error::{RawDbError, Result};

/// Compresses and decompresses byte buffers with a fixed codec
#[derive(Debug, Clone, Copy)]
pub struct BlockCompressor {
    level: Compression,
}

impl BlockCompressor {
    /// Create a compressor at the given Deflate level (0..=9)
    pub fn new(level: u32) -> Self {
        Self {
            level: Compression::new(level),
        }
    }

    /// Compress `data` into a raw Deflate stream
    pub fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        let mut encoder = DeflateEncoder::new(Vec::with_capacity(data.len() / 2 + 16), self.level);
        encoder
            .write_all(data)
            .map_err(|e| RawDbError::Compression(e.to_string()))?;
        encoder
            .finish()
            .map_err(|e| RawDbError::Compression(e.to_string()))
    }

    /// Inflate a raw Deflate stream
    pub fn decompress(data: &[u8]) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(data.len() * 2);
        DeflateDecoder::new(data)
            .read_to_end(&mut out)
            .map_err(|e| RawDbError::Compression(e.to_string()))?;
        Ok(out)
    }

    /// Inflate a zlib-wrapped stream
    pub fn decompress_zlib(data: &[u8]) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(data.len() * 2);
        ZlibDecoder::new(data)
            .read_to_end(&mut out)
            .map_err(|e| RawDbError::Compression(e.to_string()))?;
        Ok(out)
    }
}

impl Default for BlockCompressor {
    fn default() -> Self {
        Self::new(6)
    }
}
