//! Internal keys and the bytewise comparator
//!
//! An internal key is the user key followed by an 8-byte little-endian
//! trailer `sequence << 8 | value_type`. Ordering is user key ascending,
//! then trailer descending, so newer writes of the same key sort first.

use std::cmp::Ordering;

use bytes::BufMut;

use crate::error::{RawDbError, Result};

/// Sequence numbers occupy the top 56 bits of the trailer
pub const MAX_SEQUENCE_NUMBER: u64 = (1 << 56) - 1;

const TRAILER_SIZE: usize = 8;

/// Kind of entry an internal key refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ValueType {
    Deletion = 0,
    Value = 1,
}

impl ValueType {
    pub fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(ValueType::Deletion),
            1 => Some(ValueType::Value),
            _ => None,
        }
    }
}

pub fn pack_sequence_and_type(sequence: u64, value_type: ValueType) -> u64 {
    debug_assert!(sequence <= MAX_SEQUENCE_NUMBER);
    (sequence << 8) | value_type as u64
}

/// Owned, encoded internal key
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct InternalKey(Vec<u8>);

impl InternalKey {
    pub fn new(user_key: &[u8], sequence: u64, value_type: ValueType) -> Self {
        let mut buf = Vec::with_capacity(user_key.len() + TRAILER_SIZE);
        Self::encode_into(&mut buf, user_key, sequence, value_type);
        Self(buf)
    }

    /// Append the encoded form of `(user_key, sequence, value_type)` to `dst`
    pub fn encode_into(dst: &mut Vec<u8>, user_key: &[u8], sequence: u64, value_type: ValueType) {
        dst.put_slice(user_key);
        dst.put_u64_le(pack_sequence_and_type(sequence, value_type));
    }

    /// Wrap bytes that are already an encoded internal key
    pub fn from_encoded(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    pub fn sequence(&self) -> u64 {
        split(&self.0).1 >> 8
    }
}

impl PartialOrd for InternalKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for InternalKey {
    fn cmp(&self, other: &Self) -> Ordering {
        compare_internal_keys(&self.0, &other.0)
    }
}

/// Borrowed view of a decoded internal key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedInternalKey<'a> {
    pub user_key: &'a [u8],
    pub sequence: u64,
    pub value_type: ValueType,
}

pub fn parse_internal_key(bytes: &[u8]) -> Result<ParsedInternalKey<'_>> {
    if bytes.len() < TRAILER_SIZE {
        return Err(RawDbError::Corruption(format!(
            "internal key too short: {} bytes",
            bytes.len()
        )));
    }
    let (user_key, tag) = split(bytes);
    let value_type = ValueType::from_u8((tag & 0xff) as u8).ok_or_else(|| {
        RawDbError::Corruption(format!("unknown value type {}", tag & 0xff))
    })?;
    Ok(ParsedInternalKey {
        user_key,
        sequence: tag >> 8,
        value_type,
    })
}

/// User key ascending, then sequence/type descending
pub fn compare_internal_keys(a: &[u8], b: &[u8]) -> Ordering {
    let (a_user, a_tag) = split(a);
    let (b_user, b_tag) = split(b);
    a_user.cmp(b_user).then_with(|| b_tag.cmp(&a_tag))
}

/// Shortest internal key `k` with `start <= k < limit`
pub fn shortest_separator(start: &[u8], limit: &[u8]) -> Vec<u8> {
    let user_start = split(start).0;
    let user_limit = split(limit).0;
    let mut tmp = user_start.to_vec();
    user_shortest_separator(&mut tmp, user_limit);
    if tmp.len() < user_start.len() && user_start < tmp.as_slice() {
        tmp.put_u64_le(pack_sequence_and_type(MAX_SEQUENCE_NUMBER, ValueType::Value));
        debug_assert_eq!(compare_internal_keys(start, &tmp), Ordering::Less);
        debug_assert_eq!(compare_internal_keys(&tmp, limit), Ordering::Less);
        return tmp;
    }
    start.to_vec()
}

/// Shortest internal key `k` with `key <= k`
pub fn short_successor(key: &[u8]) -> Vec<u8> {
    let user_key = split(key).0;
    let mut tmp = user_key.to_vec();
    user_short_successor(&mut tmp);
    if tmp.len() < user_key.len() && user_key < tmp.as_slice() {
        tmp.put_u64_le(pack_sequence_and_type(MAX_SEQUENCE_NUMBER, ValueType::Value));
        return tmp;
    }
    key.to_vec()
}

fn split(key: &[u8]) -> (&[u8], u64) {
    if key.len() < TRAILER_SIZE {
        return (key, 0);
    }
    let (user, trailer) = key.split_at(key.len() - TRAILER_SIZE);
    let mut tag = [0u8; TRAILER_SIZE];
    tag.copy_from_slice(trailer);
    (user, u64::from_le_bytes(tag))
}

fn user_shortest_separator(start: &mut Vec<u8>, limit: &[u8]) {
    let min_len = start.len().min(limit.len());
    let diff = start
        .iter()
        .zip(limit)
        .take_while(|(a, b)| a == b)
        .count();
    if diff >= min_len {
        // one is a prefix of the other
        return;
    }
    let byte = start[diff];
    if byte < 0xff && byte + 1 < limit[diff] {
        start[diff] += 1;
        start.truncate(diff + 1);
    }
}

fn user_short_successor(key: &mut Vec<u8>) {
    if let Some(pos) = key.iter().position(|&b| b != 0xff) {
        key[pos] += 1;
        key.truncate(pos + 1);
    }
}
