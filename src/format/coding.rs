//! Varint and length-prefixed coding

use bytes::{Buf, BufMut};

use crate::error::{RawDbError, Result};

pub fn put_varint32(dst: &mut Vec<u8>, value: u32) {
    put_varint64(dst, u64::from(value));
}

pub fn put_varint64(dst: &mut Vec<u8>, mut value: u64) {
    while value >= 0x80 {
        dst.put_u8((value as u8) | 0x80);
        value >>= 7;
    }
    dst.put_u8(value as u8);
}

/// Write `bytes` preceded by its varint32 length
pub fn put_length_prefixed(dst: &mut Vec<u8>, bytes: &[u8]) {
    put_varint32(dst, bytes.len() as u32);
    dst.put_slice(bytes);
}

/// Decode a varint64 and advance `src` past it
pub fn get_varint64(src: &mut &[u8]) -> Result<u64> {
    let mut result = 0u64;
    for shift in (0..64).step_by(7) {
        if !src.has_remaining() {
            return Err(RawDbError::Corruption("truncated varint".into()));
        }
        let byte = src.get_u8();
        result |= u64::from(byte & 0x7f) << shift;
        if byte & 0x80 == 0 {
            return Ok(result);
        }
    }
    Err(RawDbError::Corruption("varint64 overflow".into()))
}

/// Decode a varint32 and advance `src` past it
pub fn get_varint32(src: &mut &[u8]) -> Result<u32> {
    let mut result = 0u32;
    for shift in (0..32).step_by(7) {
        if !src.has_remaining() {
            return Err(RawDbError::Corruption("truncated varint".into()));
        }
        let byte = src.get_u8();
        result |= u32::from(byte & 0x7f) << shift;
        if byte & 0x80 == 0 {
            return Ok(result);
        }
    }
    Err(RawDbError::Corruption("varint32 overflow".into()))
}

/// Decode a varint32-prefixed byte string and advance `src` past it
pub fn get_length_prefixed<'a>(src: &mut &'a [u8]) -> Result<&'a [u8]> {
    let len = get_varint32(src)? as usize;
    if src.len() < len {
        return Err(RawDbError::Corruption(format!(
            "length prefix {} exceeds remaining {} bytes",
            len,
            src.len()
        )));
    }
    let (head, tail) = src.split_at(len);
    *src = tail;
    Ok(head)
}
