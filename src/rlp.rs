//! Length-prefixed recursive wire encoding equivalent to RLP.
//!
//! Blocks, headers, transactions and state objects are stored and hashed
//! through this encoding; the field order of every entity is fixed, so any two
//! nodes produce identical bytes for identical values.

use crate::errors::{ChainError, ChainResult};

const SINGLE_BYTE_MAX: u8 = 0x7f;
const SHORT_STRING_BASE: u8 = 0x80;
const LONG_STRING_BASE: u8 = 0xb7;
const SHORT_LIST_BASE: u8 = 0xc0;
const LONG_LIST_BASE: u8 = 0xf7;
const SHORT_LEN_MAX: usize = 55;

/// Encodes a byte string item.
pub fn encode_bytes(data: &[u8]) -> Vec<u8> {
    if data.len() == 1 && data[0] <= SINGLE_BYTE_MAX {
        vec![data[0]]
    } else if data.len() <= SHORT_LEN_MAX {
        let mut result = vec![SHORT_STRING_BASE + data.len() as u8];
        result.extend_from_slice(data);
        result
    } else {
        let len_bytes = encode_length(data.len());
        let mut result = vec![LONG_STRING_BASE + len_bytes.len() as u8];
        result.extend_from_slice(&len_bytes);
        result.extend_from_slice(data);
        result
    }
}

/// Encodes an unsigned integer as a minimal big-endian byte string.
pub fn encode_uint(value: u64) -> Vec<u8> {
    if value == 0 {
        return encode_bytes(&[]);
    }
    let bytes = value.to_be_bytes();
    let start = bytes.iter().position(|&b| b != 0).unwrap_or(bytes.len() - 1);
    encode_bytes(&bytes[start..])
}

/// Wraps already-encoded items into a list.
pub fn encode_list(payload: &[u8]) -> Vec<u8> {
    let mut result = Vec::with_capacity(payload.len() + 9);
    if payload.len() <= SHORT_LEN_MAX {
        result.push(SHORT_LIST_BASE + payload.len() as u8);
    } else {
        let len_bytes = encode_length(payload.len());
        result.push(LONG_LIST_BASE + len_bytes.len() as u8);
        result.extend_from_slice(&len_bytes);
    }
    result.extend_from_slice(payload);
    result
}

/// Encodes a length as minimal big-endian bytes.
fn encode_length(len: usize) -> Vec<u8> {
    let bytes = len.to_be_bytes();
    let start = bytes.iter().position(|&b| b != 0).unwrap_or(bytes.len() - 1);
    bytes[start..].to_vec()
}

/// Decoded item: either a byte string or a list of nested items.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Item<'a> {
    Bytes(&'a [u8]),
    List(Vec<Item<'a>>),
}

impl<'a> Item<'a> {
    pub fn bytes(&self) -> ChainResult<&'a [u8]> {
        match self {
            Item::Bytes(data) => Ok(data),
            Item::List(_) => Err(ChainError::Encoding("expected byte string, found list".into())),
        }
    }

    pub fn list(&self) -> ChainResult<&[Item<'a>]> {
        match self {
            Item::List(items) => Ok(items),
            Item::Bytes(_) => Err(ChainError::Encoding("expected list, found byte string".into())),
        }
    }

    /// Interprets the item as a minimally-encoded big-endian unsigned integer.
    pub fn uint(&self) -> ChainResult<u64> {
        let data = self.bytes()?;
        if data.len() > 8 {
            return Err(ChainError::Encoding("integer wider than 64 bits".into()));
        }
        if data.first() == Some(&0) {
            return Err(ChainError::Encoding("integer has leading zero bytes".into()));
        }
        let mut value: u64 = 0;
        for byte in data {
            value = (value << 8) | u64::from(*byte);
        }
        Ok(value)
    }
}

/// Decodes a single item, requiring the input to be fully consumed.
pub fn decode(data: &[u8]) -> ChainResult<Item<'_>> {
    let (item, rest) = decode_item(data)?;
    if !rest.is_empty() {
        return Err(ChainError::Encoding("trailing bytes after item".into()));
    }
    Ok(item)
}

fn decode_item(data: &[u8]) -> ChainResult<(Item<'_>, &[u8])> {
    let (&prefix, rest) = data
        .split_first()
        .ok_or_else(|| ChainError::Encoding("unexpected end of input".into()))?;
    match prefix {
        0x00..=0x7f => Ok((Item::Bytes(&data[..1]), rest)),
        0x80..=0xb7 => {
            let len = (prefix - SHORT_STRING_BASE) as usize;
            let (payload, rest) = split_checked(rest, len)?;
            if len == 1 && payload[0] <= SINGLE_BYTE_MAX {
                return Err(ChainError::Encoding("non-minimal single byte encoding".into()));
            }
            Ok((Item::Bytes(payload), rest))
        }
        0xb8..=0xbf => {
            let len_of_len = (prefix - LONG_STRING_BASE) as usize;
            let (len, rest) = decode_length(rest, len_of_len)?;
            let (payload, rest) = split_checked(rest, len)?;
            Ok((Item::Bytes(payload), rest))
        }
        0xc0..=0xf7 => {
            let len = (prefix - SHORT_LIST_BASE) as usize;
            let (payload, rest) = split_checked(rest, len)?;
            Ok((Item::List(decode_list_payload(payload)?), rest))
        }
        0xf8..=0xff => {
            let len_of_len = (prefix - LONG_LIST_BASE) as usize;
            let (len, rest) = decode_length(rest, len_of_len)?;
            let (payload, rest) = split_checked(rest, len)?;
            Ok((Item::List(decode_list_payload(payload)?), rest))
        }
    }
}

fn decode_list_payload(mut payload: &[u8]) -> ChainResult<Vec<Item<'_>>> {
    let mut items = Vec::new();
    while !payload.is_empty() {
        let (item, rest) = decode_item(payload)?;
        items.push(item);
        payload = rest;
    }
    Ok(items)
}

fn decode_length(data: &[u8], len_of_len: usize) -> ChainResult<(usize, &[u8])> {
    let (len_bytes, rest) = split_checked(data, len_of_len)?;
    if len_bytes.first() == Some(&0) {
        return Err(ChainError::Encoding("length has leading zero bytes".into()));
    }
    if len_bytes.len() > std::mem::size_of::<usize>() {
        return Err(ChainError::Encoding("length too large".into()));
    }
    let mut len: usize = 0;
    for byte in len_bytes {
        len = (len << 8) | *byte as usize;
    }
    if len <= SHORT_LEN_MAX {
        return Err(ChainError::Encoding("non-minimal length encoding".into()));
    }
    Ok((len, rest))
}

fn split_checked(data: &[u8], len: usize) -> ChainResult<(&[u8], &[u8])> {
    if data.len() < len {
        return Err(ChainError::Encoding("unexpected end of input".into()));
    }
    Ok(data.split_at(len))
}
