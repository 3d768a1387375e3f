//! Masked CRC32C
//!
//! LevelDB never stores a raw CRC: a CRC over data that itself embeds CRCs
//! is weak, so stored values are rotated and offset.

const MASK_DELTA: u32 = 0xa282_ead8;

pub fn mask_crc(crc: u32) -> u32 {
    crc.rotate_right(15).wrapping_add(MASK_DELTA)
}

pub fn unmask_crc(masked: u32) -> u32 {
    masked.wrapping_sub(MASK_DELTA).rotate_left(15)
}

/// Checksum stored in a block trailer: covers `content ++ [compression_type]`
pub fn block_checksum(content: &[u8], compression_type: u8) -> u32 {
    let crc = crc32c::crc32c_append(crc32c::crc32c(content), &[compression_type]);
    mask_crc(crc)
}

/// Checksum stored in a log record header: covers `[record_type] ++ payload`
pub fn record_checksum(record_type: u8, payload: &[u8]) -> u32 {
    let crc = crc32c::crc32c_append(crc32c::crc32c(&[record_type]), payload);
    mask_crc(crc)
}
