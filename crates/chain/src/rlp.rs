//! RLP encoding and decoding.
//!
//! Two-band length prefixing: a single byte below 0x80 is its own
//! encoding; short strings use `0x80 + len` and short lists `0xc0 + len`
//! for payloads up to 55 bytes; longer payloads encode a length-of-length
//! byte followed by the big-endian length. Integers are minimal
//! big-endian strings, with zero encoding as the empty string `0x80`.

use alloy::primitives::U256;

use crate::error::{Error, Result};

const SHORT_MAX: usize = 55;
const STRING_OFFSET: u8 = 0x80;
const LIST_OFFSET: u8 = 0xc0;

pub fn encode_bytes(data: &[u8]) -> Vec<u8> {
    if data.len() == 1 && data[0] < STRING_OFFSET {
        return vec![data[0]];
    }
    let mut out = length_prefix(data.len(), STRING_OFFSET);
    out.extend_from_slice(data);
    out
}

/// Minimal big-endian integer; zero is the empty string.
pub fn encode_uint(value: u128) -> Vec<u8> {
    if value == 0 {
        return vec![STRING_OFFSET];
    }
    let bytes = value.to_be_bytes();
    let first = bytes.iter().position(|b| *b != 0).unwrap();
    encode_bytes(&bytes[first..])
}

pub fn encode_u256(value: U256) -> Vec<u8> {
    if value.is_zero() {
        return vec![STRING_OFFSET];
    }
    let bytes = value.to_be_bytes::<32>();
    let first = bytes.iter().position(|b| *b != 0).unwrap();
    encode_bytes(&bytes[first..])
}

/// `items` are already-encoded members; the list prefixes their
/// concatenation.
pub fn encode_list(items: &[Vec<u8>]) -> Vec<u8> {
    let payload_len: usize = items.iter().map(Vec::len).sum();
    let mut out = length_prefix(payload_len, LIST_OFFSET);
    for item in items {
        out.extend_from_slice(item);
    }
    out
}

fn length_prefix(len: usize, offset: u8) -> Vec<u8> {
    if len <= SHORT_MAX {
        return vec![offset + len as u8];
    }
    let len_bytes = len.to_be_bytes();
    let first = len_bytes.iter().position(|b| *b != 0).unwrap();
    let mut out = Vec::with_capacity(1 + len_bytes.len() - first);
    out.push(offset + SHORT_MAX as u8 + (len_bytes.len() - first) as u8);
    out.extend_from_slice(&len_bytes[first..]);
    out
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Item {
    Bytes(Vec<u8>),
    List(Vec<Item>),
}

/// Decode exactly one item; trailing bytes are an error.
pub fn decode(data: &[u8]) -> Result<Item> {
    let (item, consumed) = decode_at(data, 0)?;
    if consumed != data.len() {
        return Err(Error::Decode(format!(
            "rlp: {} trailing bytes",
            data.len() - consumed
        )));
    }
    Ok(item)
}

/// Inverse of `encode_uint` for values that fit a u64.
pub fn decode_uint(data: &[u8]) -> Result<u64> {
    match decode(data)? {
        Item::Bytes(bytes) => {
            if bytes.len() > 1 && bytes[0] == 0 {
                return Err(Error::Decode("rlp: integer has leading zero".into()));
            }
            if bytes.len() > 8 {
                return Err(Error::Decode(format!(
                    "rlp: integer too wide ({} bytes)",
                    bytes.len()
                )));
            }
            Ok(bytes.iter().fold(0u64, |acc, b| acc << 8 | *b as u64))
        }
        Item::List(_) => Err(Error::Decode("rlp: expected integer, found list".into())),
    }
}

/// Inverse of `encode_bytes`.
pub fn decode_bytes(data: &[u8]) -> Result<Vec<u8>> {
    match decode(data)? {
        Item::Bytes(bytes) => Ok(bytes),
        Item::List(_) => Err(Error::Decode("rlp: expected string, found list".into())),
    }
}

fn decode_at(data: &[u8], pos: usize) -> Result<(Item, usize)> {
    let first = *data
        .get(pos)
        .ok_or_else(|| Error::Decode("rlp: truncated".into()))?;

    if first < STRING_OFFSET {
        return Ok((Item::Bytes(vec![first]), 1));
    }

    if first < LIST_OFFSET {
        let (payload_len, header_len) = decode_length(data, pos, STRING_OFFSET)?;
        let start = pos + header_len;
        let payload = data
            .get(start..start + payload_len)
            .ok_or_else(|| Error::Decode("rlp: string runs past end".into()))?;
        if payload.len() == 1 && payload[0] < STRING_OFFSET {
            return Err(Error::Decode("rlp: non-canonical single byte".into()));
        }
        return Ok((Item::Bytes(payload.to_vec()), header_len + payload_len));
    }

    let (payload_len, header_len) = decode_length(data, pos, LIST_OFFSET)?;
    let start = pos + header_len;
    if data.len() < start + payload_len {
        return Err(Error::Decode("rlp: list runs past end".into()));
    }
    let mut items = Vec::new();
    let mut inner = start;
    while inner < start + payload_len {
        let (item, consumed) = decode_at(data, inner)?;
        items.push(item);
        inner += consumed;
    }
    if inner != start + payload_len {
        return Err(Error::Decode("rlp: list member overruns payload".into()));
    }
    Ok((Item::List(items), header_len + payload_len))
}

/// Payload length and header length for a prefixed item at `pos`.
fn decode_length(data: &[u8], pos: usize, offset: u8) -> Result<(usize, usize)> {
    let first = data[pos];
    let band = (first - offset) as usize;
    if band <= SHORT_MAX {
        return Ok((band, 1));
    }
    let len_of_len = band - SHORT_MAX;
    let len_bytes = data
        .get(pos + 1..pos + 1 + len_of_len)
        .ok_or_else(|| Error::Decode("rlp: truncated length".into()))?;
    if len_bytes[0] == 0 {
        return Err(Error::Decode("rlp: length has leading zero".into()));
    }
    let payload_len = len_bytes
        .iter()
        .try_fold(0usize, |acc, b| {
            acc.checked_mul(256).and_then(|v| v.checked_add(*b as usize))
        })
        .ok_or_else(|| Error::Decode("rlp: length overflow".into()))?;
    if payload_len <= SHORT_MAX {
        return Err(Error::Decode("rlp: non-canonical long form".into()));
    }
    Ok((payload_len, 1 + len_of_len))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classic_vectors() {
        assert_eq!(encode_bytes(b"dog"), vec![0x83, b'd', b'o', b'g']);
        assert_eq!(encode_bytes(b""), vec![0x80]);
        assert_eq!(encode_bytes(&[0x0f]), vec![0x0f]);
        assert_eq!(encode_uint(0), vec![0x80]);
        assert_eq!(encode_uint(0x0f), vec![0x0f]);
        assert_eq!(encode_uint(1024), vec![0x82, 0x04, 0x00]);
        assert_eq!(
            encode_list(&[encode_bytes(b"cat"), encode_bytes(b"dog")]),
            vec![0xc8, 0x83, b'c', b'a', b't', 0x83, b'd', b'o', b'g']
        );
        assert_eq!(encode_list(&[]), vec![0xc0]);
    }

    #[test]
    fn uint_round_trip() {
        for value in [0u64, 1, 0x7f, 0x80, 0xff, 0x100, 1024, u32::MAX as u64, u64::MAX] {
            let encoded = encode_uint(value as u128);
            assert_eq!(decode_uint(&encoded).unwrap(), value, "value {value}");
        }
    }

    #[test]
    fn bytes_round_trip_across_both_bands() {
        for len in [0usize, 1, 2, 55, 56, 57, 300, 1000] {
            let data: Vec<u8> = (0..len).map(|i| (i % 251) as u8 | 0x80).collect();
            let encoded = encode_bytes(&data);
            assert_eq!(decode_bytes(&encoded).unwrap(), data, "length {len}");
        }
        // Single low byte stays the identity encoding.
        assert_eq!(decode_bytes(&encode_bytes(&[0x42])).unwrap(), vec![0x42]);
    }

    #[test]
    fn long_form_uses_length_of_length() {
        let data = vec![0xaa; 56];
        let encoded = encode_bytes(&data);
        assert_eq!(encoded[0], 0x80 + 55 + 1);
        assert_eq!(encoded[1], 56);
        assert_eq!(encoded.len(), 2 + 56);
    }

    #[test]
    fn u256_encodes_minimal_big_endian() {
        assert_eq!(encode_u256(U256::ZERO), vec![0x80]);
        assert_eq!(encode_u256(U256::from(0x7fu64)), vec![0x7f]);
        assert_eq!(
            encode_u256(U256::from(0xdeadu64)),
            vec![0x82, 0xde, 0xad]
        );
        let max = encode_u256(U256::MAX);
        assert_eq!(max[0], 0x80 + 32);
        assert_eq!(max.len(), 33);
    }

    #[test]
    fn nested_lists_round_trip() {
        let inner = encode_list(&[encode_uint(1), encode_uint(2)]);
        let outer = encode_list(&[encode_bytes(b"hi"), inner]);
        let decoded = decode(&outer).unwrap();
        assert_eq!(
            decoded,
            Item::List(vec![
                Item::Bytes(b"hi".to_vec()),
                Item::List(vec![Item::Bytes(vec![1]), Item::Bytes(vec![2])]),
            ])
        );
    }

    #[test]
    fn decoder_rejects_malformed_input() {
        assert!(decode(&[]).is_err());
        assert!(decode(&[0x83, b'd', b'o']).is_err()); // truncated string
        assert!(decode(&[0x81, 0x42]).is_err()); // non-canonical single byte
        assert!(decode(&[0x0f, 0x0f]).is_err()); // trailing bytes
        assert!(decode(&[0xb8, 0x01, 0xaa]).is_err()); // long form under 56
    }
}
