//! EVM ABI primitives.
//!
//! Word-level encoding built by hand: addresses left-pad to 32 bytes,
//! uint256 is big-endian left-padded, bool is 0/1 in a word, dynamic
//! bytes are length-prefixed and padded, dynamic arrays are
//! length-prefixed with explicit member offsets. Function selectors are
//! the first four bytes of the Keccak-256 of the canonical signature.
//! There is no reflection anywhere; every call shape in this repo writes
//! its head and tail offsets explicitly on top of these helpers.

use alloy::primitives::{Address, U256};

use crate::crypto::keccak::keccak256;

pub const WORD: usize = 32;

/// `keccak256(signature)[0..4]`.
pub fn selector(signature: &str) -> [u8; 4] {
    let digest = keccak256(signature.as_bytes());
    [digest[0], digest[1], digest[2], digest[3]]
}

pub fn padded_len(len: usize) -> usize {
    len.div_ceil(WORD) * WORD
}

pub fn append_u256(out: &mut Vec<u8>, value: U256) {
    out.extend_from_slice(&value.to_be_bytes::<32>());
}

pub fn append_usize(out: &mut Vec<u8>, value: usize) {
    append_u256(out, U256::from(value));
}

pub fn append_address(out: &mut Vec<u8>, value: Address) {
    out.extend_from_slice(&[0u8; 12]);
    out.extend_from_slice(value.as_slice());
}

pub fn append_bool(out: &mut Vec<u8>, value: bool) {
    let mut word = [0u8; WORD];
    word[WORD - 1] = value as u8;
    out.extend_from_slice(&word);
}

/// Dynamic `bytes`: length word, then the payload zero-padded to a word
/// boundary.
pub fn append_bytes(out: &mut Vec<u8>, data: &[u8]) {
    append_usize(out, data.len());
    out.extend_from_slice(data);
    out.resize(out.len() + padded_len(data.len()) - data.len(), 0);
}

/// `address[]`: length word, then one word per element.
pub fn encode_address_array(items: &[Address]) -> Vec<u8> {
    let mut out = Vec::with_capacity(WORD + items.len() * WORD);
    append_usize(&mut out, items.len());
    for item in items {
        append_address(&mut out, *item);
    }
    out
}

/// `uint256[]`: length word, then one word per element.
pub fn encode_u256_array(items: &[U256]) -> Vec<u8> {
    let mut out = Vec::with_capacity(WORD + items.len() * WORD);
    append_usize(&mut out, items.len());
    for item in items {
        append_u256(&mut out, *item);
    }
    out
}

// --- decoding ----------------------------------------------------------

/// Word at byte position `pos`.
pub fn read_word(data: &[u8], pos: usize) -> Option<U256> {
    data.get(pos..pos + WORD).map(U256::from_be_slice)
}

/// Word interpreted as an offset or length; rejects values that cannot
/// index the buffer.
pub fn read_usize(data: &[u8], pos: usize) -> Option<usize> {
    let word = read_word(data, pos)?;
    if word > U256::from(u32::MAX) {
        return None;
    }
    Some(word.to::<usize>())
}

/// Address in the rightmost 20 bytes of the word at `pos`.
pub fn read_address(data: &[u8], pos: usize) -> Option<Address> {
    data.get(pos + 12..pos + WORD).map(Address::from_slice)
}

/// Single-word `uint256` return.
pub fn decode_u256_return(data: &[u8]) -> Option<U256> {
    read_word(data, 0)
}

/// Single-word return of a small unsigned integer (uint8 style).
pub fn decode_u8_return(data: &[u8]) -> Option<u8> {
    let word = read_word(data, 0)?;
    (word <= U256::from(u8::MAX)).then(|| word.to::<u8>())
}

/// Single-word `address` return.
pub fn decode_address_return(data: &[u8]) -> Option<Address> {
    read_address(data, 0)
}

/// Dynamic `uint256[]` return: offset, length, elements.
pub fn decode_u256_array_return(data: &[u8]) -> Option<Vec<U256>> {
    let array_pos = read_usize(data, 0)?;
    let len = read_usize(data, array_pos)?;
    let mut out = Vec::with_capacity(len);
    for index in 0..len {
        out.push(read_word(data, array_pos + WORD + index * WORD)?);
    }
    Some(out)
}

/// Dynamic `(bool, bytes)[]` return (the aggregator's result shape):
/// offset to the array, length, per-element offsets relative to the
/// element area, then each element as a bool word, an inner offset, and
/// length-prefixed padded bytes.
pub fn decode_bool_bytes_array_return(data: &[u8]) -> Option<Vec<(bool, Vec<u8>)>> {
    let array_pos = read_usize(data, 0)?;
    let len = read_usize(data, array_pos)?;
    let elements_base = array_pos + WORD;

    let mut out = Vec::with_capacity(len);
    for index in 0..len {
        let element_pos = elements_base + read_usize(data, elements_base + index * WORD)?;
        let success = !read_word(data, element_pos)?.is_zero();
        let bytes_pos = element_pos + read_usize(data, element_pos + WORD)?;
        let bytes_len = read_usize(data, bytes_pos)?;
        let payload = data.get(bytes_pos + WORD..bytes_pos + WORD + bytes_len)?;
        out.push((success, payload.to_vec()));
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn words_pad_left() {
        let mut out = Vec::new();
        append_address(&mut out, Address::repeat_byte(0xaa));
        append_u256(&mut out, U256::from(0xbeefu64));
        append_bool(&mut out, true);
        append_bool(&mut out, false);

        assert_eq!(out.len(), 4 * WORD);
        assert_eq!(&out[..12], &[0u8; 12]);
        assert_eq!(out[12], 0xaa);
        assert_eq!(&out[WORD + 30..WORD + 32], &[0xbe, 0xef]);
        assert_eq!(out[2 * WORD + 31], 1);
        assert_eq!(out[3 * WORD + 31], 0);
    }

    #[test]
    fn dynamic_bytes_pad_to_word_boundary() {
        let mut out = Vec::new();
        append_bytes(&mut out, &[1, 2, 3, 4, 5]);
        assert_eq!(out.len(), WORD + WORD);
        assert_eq!(read_usize(&out, 0), Some(5));
        assert_eq!(&out[WORD..WORD + 5], &[1, 2, 3, 4, 5]);
        assert_eq!(&out[WORD + 5..], &[0u8; 27]);

        // Already aligned payloads gain no padding.
        let mut exact = Vec::new();
        append_bytes(&mut exact, &[7u8; 32]);
        assert_eq!(exact.len(), WORD + 32);
    }

    #[test]
    fn selector_comes_from_keccak() {
        assert_eq!(selector("transfer(address,uint256)"), [0xa9, 0x05, 0x9c, 0xbb]);
        assert_eq!(selector("decimals()"), [0x31, 0x3c, 0xe5, 0x67]);
    }

    #[test]
    fn u256_array_round_trips_through_the_return_shape() {
        let values = [U256::from(7u64), U256::from(1_994_006u64)];
        // Return encoding: offset word then the array.
        let mut data = Vec::new();
        append_usize(&mut data, WORD);
        data.extend_from_slice(&encode_u256_array(&values));

        assert_eq!(decode_u256_array_return(&data).unwrap(), values);
    }

    #[test]
    fn bool_bytes_array_decodes_the_aggregator_shape() {
        // Two elements: (true, 0xdead) and (false, empty).
        let mut element_a = Vec::new();
        append_bool(&mut element_a, true);
        append_usize(&mut element_a, 2 * WORD);
        append_bytes(&mut element_a, &[0xde, 0xad]);
        let mut element_b = Vec::new();
        append_bool(&mut element_b, false);
        append_usize(&mut element_b, 2 * WORD);
        append_bytes(&mut element_b, &[]);

        let mut data = Vec::new();
        append_usize(&mut data, WORD); // offset to array
        append_usize(&mut data, 2); // length
        append_usize(&mut data, 2 * WORD); // element offsets
        append_usize(&mut data, 2 * WORD + element_a.len());
        data.extend_from_slice(&element_a);
        data.extend_from_slice(&element_b);

        let decoded = decode_bool_bytes_array_return(&data).unwrap();
        assert_eq!(decoded.len(), 2);
        assert!(decoded[0].0);
        assert_eq!(decoded[0].1, vec![0xde, 0xad]);
        assert!(!decoded[1].0);
        assert!(decoded[1].1.is_empty());
    }

    #[test]
    fn truncated_buffers_decode_to_none() {
        assert!(decode_u256_return(&[0u8; 31]).is_none());
        assert!(decode_u256_array_return(&[0u8; 32]).is_none());
        assert!(decode_bool_bytes_array_return(&[]).is_none());
    }
}
