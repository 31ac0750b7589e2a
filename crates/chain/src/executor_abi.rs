//! Calldata assembly for the on-chain executor contract.
//!
//! The executor takes a single tuple argument in both entry points. The
//! deployed decoder reads a fixed 7-slot head directly after the selector,
//! with dynamic-member offsets measured from the start of that head, so the
//! layout is produced here with explicit offset arithmetic rather than a
//! generic encoder. Encoding is pure and byte-deterministic: identical
//! parameters always yield identical calldata.

use std::sync::OnceLock;

use alloy::primitives::{Address, Bytes, U256};

use crate::abi::{
    append_address, append_bytes, append_u256, append_usize, encode_address_array,
    encode_u256_array, padded_len, WORD,
};
use crate::crypto::keccak::keccak256;
use crate::error::{Error, Result};

pub const LIQUIDATE_AND_ARB_SIGNATURE: &str =
    "liquidateAndArb((address,address,uint256,address,(address,bytes)[],address,uint256))";
pub const LIQUIDATE_BATCH_SIGNATURE: &str =
    "liquidateBatchAndArb((address[],address,uint256[],address,(address,bytes)[],address,uint256))";

const HEAD_SLOTS: usize = 7;

/// One swap leg handed to the executor: the router to call and the fully
/// encoded router calldata. Zero-length calldata is never valid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Swap {
    pub router: Address,
    pub call_data: Bytes,
}

/// Parameters for `liquidateAndArb`.
#[derive(Debug, Clone)]
pub struct ExecutorParams {
    pub user: Address,
    pub debt_asset: Address,
    pub debt_to_cover: U256,
    pub collateral_asset: Address,
    pub swaps: Vec<Swap>,
    pub profit_receiver: Address,
    pub min_profit: U256,
}

/// Parameters for `liquidateBatchAndArb`: same pair, same debt asset,
/// several users.
#[derive(Debug, Clone)]
pub struct BatchParams {
    pub users: Vec<Address>,
    pub debt_asset: Address,
    pub debt_to_cover: Vec<U256>,
    pub collateral_asset: Address,
    pub swaps: Vec<Swap>,
    pub profit_receiver: Address,
    pub min_profit: U256,
}

#[derive(Debug, Clone, Copy)]
struct Selectors {
    single: [u8; 4],
    batch: [u8; 4],
}

static SELECTORS: OnceLock<Selectors> = OnceLock::new();

fn default_selectors() -> Selectors {
    Selectors {
        single: selector_of(LIQUIDATE_AND_ARB_SIGNATURE),
        batch: selector_of(LIQUIDATE_BATCH_SIGNATURE),
    }
}

/// First four bytes of `keccak256(signature)`.
pub fn selector_of(signature: &str) -> [u8; 4] {
    let digest = keccak256(signature.as_bytes());
    [digest[0], digest[1], digest[2], digest[3]]
}

/// Parse an override of the form `0xa1b2c3d4` (the `0x` is optional).
pub fn parse_selector(raw: &str) -> Result<[u8; 4]> {
    let digits = raw.trim().trim_start_matches("0x");
    if digits.len() != 8 {
        return Err(Error::Decode(format!("selector must be 4 bytes: {raw}")));
    }
    let mut out = [0u8; 4];
    for (i, chunk) in digits.as_bytes().chunks(2).enumerate() {
        let s = std::str::from_utf8(chunk).map_err(|_| Error::Decode("non-ascii selector".into()))?;
        out[i] =
            u8::from_str_radix(s, 16).map_err(|e| Error::Decode(format!("bad selector {raw}: {e}")))?;
    }
    Ok(out)
}

/// Install selectors once at startup. Overrides win; anything unset is
/// computed from the canonical signatures. Later calls are no-ops.
pub fn initialize_selectors(
    single_override: Option<&str>,
    batch_override: Option<&str>,
) -> Result<()> {
    let defaults = default_selectors();
    let selectors = Selectors {
        single: match single_override {
            Some(raw) => parse_selector(raw)?,
            None => defaults.single,
        },
        batch: match batch_override {
            Some(raw) => parse_selector(raw)?,
            None => defaults.batch,
        },
    };
    let _ = SELECTORS.set(selectors);
    Ok(())
}

/// Install the signature-derived selectors when no override was supplied.
pub fn initialize_default_selectors() {
    let _ = SELECTORS.set(default_selectors());
}

pub fn liquidate_and_arb_selector() -> [u8; 4] {
    SELECTORS.get_or_init(default_selectors).single
}

pub fn liquidate_batch_selector() -> [u8; 4] {
    SELECTORS.get_or_init(default_selectors).batch
}

/// Swaps array: length word, then per-element `(router, offset)` heads,
/// then per-element tails of `len || padded bytes`. Offsets are measured
/// from the array's length word; each tail starts at the running sum of
/// `32 + padded(len)` over all prior tails. (This is the executor's own
/// layout, not the standard dynamic-tuple-array form.)
fn encode_swaps(swaps: &[Swap]) -> Vec<u8> {
    let mut out = Vec::new();
    append_usize(&mut out, swaps.len());
    let mut tail_offset = WORD + swaps.len() * 2 * WORD;
    for swap in swaps {
        append_address(&mut out, swap.router);
        append_usize(&mut out, tail_offset);
        tail_offset += WORD + padded_len(swap.call_data.len());
    }
    for swap in swaps {
        append_bytes(&mut out, &swap.call_data);
    }
    out
}

/// Calldata for a single-user liquidation. A positive `debt_to_cover`
/// requires at least one swap leg.
pub fn encode_liquidate_and_arb(params: &ExecutorParams) -> Result<Bytes> {
    if !params.debt_to_cover.is_zero() && params.swaps.is_empty() {
        return Err(Error::Decode(
            "liquidateAndArb with debt to cover needs swap legs".into(),
        ));
    }
    let swaps = encode_swaps(&params.swaps);
    let mut out = Vec::with_capacity(4 + HEAD_SLOTS * WORD + swaps.len());
    out.extend_from_slice(&liquidate_and_arb_selector());
    append_address(&mut out, params.user);
    append_address(&mut out, params.debt_asset);
    append_u256(&mut out, params.debt_to_cover);
    append_address(&mut out, params.collateral_asset);
    append_usize(&mut out, HEAD_SLOTS * WORD);
    append_address(&mut out, params.profit_receiver);
    append_u256(&mut out, params.min_profit);
    out.extend_from_slice(&swaps);
    Ok(Bytes::from(out))
}

/// Calldata for the batch entry point. The three dynamic members (users,
/// debt-to-cover, swaps) land in the tail in that order, each offset
/// computed from the head start.
pub fn encode_liquidate_batch(params: &BatchParams) -> Result<Bytes> {
    if params.users.len() != params.debt_to_cover.len() {
        return Err(Error::Decode(
            "batch users and debtToCover lengths differ".into(),
        ));
    }
    if params.debt_to_cover.iter().any(|v| !v.is_zero()) && params.swaps.is_empty() {
        return Err(Error::Decode(
            "liquidateBatchAndArb with debt to cover needs swap legs".into(),
        ));
    }
    let users = encode_address_array(&params.users);
    let covers = encode_u256_array(&params.debt_to_cover);
    let swaps = encode_swaps(&params.swaps);

    let users_offset = HEAD_SLOTS * WORD;
    let covers_offset = users_offset + users.len();
    let swaps_offset = covers_offset + covers.len();

    let mut out =
        Vec::with_capacity(4 + HEAD_SLOTS * WORD + users.len() + covers.len() + swaps.len());
    out.extend_from_slice(&liquidate_batch_selector());
    append_usize(&mut out, users_offset);
    append_address(&mut out, params.debt_asset);
    append_usize(&mut out, covers_offset);
    append_address(&mut out, params.collateral_asset);
    append_usize(&mut out, swaps_offset);
    append_address(&mut out, params.profit_receiver);
    append_u256(&mut out, params.min_profit);
    out.extend_from_slice(&users);
    out.extend_from_slice(&covers);
    out.extend_from_slice(&swaps);
    Ok(Bytes::from(out))
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::address;

    fn word_at(data: &[u8], slot: usize) -> U256 {
        let start = 4 + slot * WORD;
        U256::from_be_slice(&data[start..start + WORD])
    }

    fn sample_params() -> ExecutorParams {
        ExecutorParams {
            user: address!("0x1111111111111111111111111111111111111111"),
            debt_asset: address!("0x2222222222222222222222222222222222222222"),
            debt_to_cover: U256::from(1_000_000u64),
            collateral_asset: address!("0x3333333333333333333333333333333333333333"),
            swaps: vec![Swap {
                router: address!("0x4444444444444444444444444444444444444444"),
                call_data: Bytes::from(vec![0xde, 0xad, 0xbe, 0xef, 0x01]),
            }],
            profit_receiver: address!("0x5555555555555555555555555555555555555555"),
            min_profit: U256::from(1u64),
        }
    }

    #[test]
    fn selector_is_stable_and_matches_signature_hash() {
        initialize_default_selectors();
        let computed = selector_of(LIQUIDATE_AND_ARB_SIGNATURE);
        assert_eq!(liquidate_and_arb_selector(), computed);
        assert_eq!(liquidate_and_arb_selector(), computed);
        assert_eq!(
            liquidate_batch_selector(),
            selector_of(LIQUIDATE_BATCH_SIGNATURE)
        );
    }

    #[test]
    fn parse_selector_accepts_both_prefixes() {
        assert_eq!(parse_selector("0xa1b2c3d4").unwrap(), [0xa1, 0xb2, 0xc3, 0xd4]);
        assert_eq!(parse_selector("a1b2c3d4").unwrap(), [0xa1, 0xb2, 0xc3, 0xd4]);
        assert!(parse_selector("0xa1b2").is_err());
        assert!(parse_selector("zzzzzzzz").is_err());
    }

    #[test]
    fn single_layout_has_seven_slot_head_and_inline_swaps() {
        let params = sample_params();
        let data = encode_liquidate_and_arb(&params).unwrap();

        assert_eq!(&data[..4], &liquidate_and_arb_selector());
        // Head slots 0..7: user, debt, debtToCover, collateral, swaps
        // offset, receiver, minProfit.
        assert_eq!(word_at(&data, 0), U256::from_be_slice(params.user.as_slice()));
        assert_eq!(word_at(&data, 2), params.debt_to_cover);
        assert_eq!(word_at(&data, 4), U256::from(7 * 32u64));
        assert_eq!(word_at(&data, 6), params.min_profit);

        // Swaps tail: length, element head (router, offset), element tail.
        assert_eq!(word_at(&data, 7), U256::from(1u64)); // array length
        assert_eq!(
            word_at(&data, 8),
            U256::from_be_slice(params.swaps[0].router.as_slice())
        );
        // First tail begins right after the length word and one 2-slot head.
        assert_eq!(word_at(&data, 9), U256::from(32 + 64u64));
        assert_eq!(word_at(&data, 10), U256::from(5u64)); // calldata length
        let payload_start = 4 + 11 * WORD;
        assert_eq!(&data[payload_start..payload_start + 5], &[0xde, 0xad, 0xbe, 0xef, 0x01]);
        // Padded to a full word.
        assert_eq!(data.len(), 4 + 12 * WORD);
    }

    #[test]
    fn swaps_tail_offsets_accumulate_padded_lengths() {
        let swaps = vec![
            Swap {
                router: Address::repeat_byte(0x0a),
                call_data: Bytes::from(vec![0u8; 33]), // pads to 64
            },
            Swap {
                router: Address::repeat_byte(0x0b),
                call_data: Bytes::from(vec![1u8; 4]),
            },
        ];
        let enc = encode_swaps(&swaps);

        let word = |slot: usize| U256::from_be_slice(&enc[slot * WORD..(slot + 1) * WORD]);
        assert_eq!(word(0), U256::from(2u64));
        // First tail: after length word + two 2-slot heads = 32 + 128.
        assert_eq!(word(2), U256::from(160u64));
        // Second tail: first tail consumed 32 + padded(33) = 96 bytes.
        assert_eq!(word(4), U256::from(160 + 96u64));
        assert_eq!(enc.len(), 160 + 96 + 32 + 32);
    }

    #[test]
    fn encoding_is_byte_deterministic() {
        let params = sample_params();
        assert_eq!(
            encode_liquidate_and_arb(&params).unwrap(),
            encode_liquidate_and_arb(&params).unwrap()
        );
    }

    #[test]
    fn positive_debt_without_swaps_is_rejected() {
        let mut params = sample_params();
        params.swaps.clear();
        assert!(encode_liquidate_and_arb(&params).is_err());

        params.debt_to_cover = U256::ZERO;
        assert!(encode_liquidate_and_arb(&params).is_ok());
    }

    #[test]
    fn batch_layout_recomputes_three_offsets() {
        let params = BatchParams {
            users: vec![Address::repeat_byte(0x01), Address::repeat_byte(0x02)],
            debt_asset: Address::repeat_byte(0x03),
            debt_to_cover: vec![U256::from(10u64), U256::from(20u64)],
            collateral_asset: Address::repeat_byte(0x04),
            swaps: vec![Swap {
                router: Address::repeat_byte(0x05),
                call_data: Bytes::from(vec![0xaa; 4]),
            }],
            profit_receiver: Address::repeat_byte(0x06),
            min_profit: U256::from(1u64),
        };
        let data = encode_liquidate_batch(&params).unwrap();

        assert_eq!(&data[..4], &liquidate_batch_selector());
        let head = 7 * 32u64;
        let users_len = 32 + 2 * 32;
        let covers_len = 32 + 2 * 32;
        assert_eq!(word_at(&data, 0), U256::from(head));
        assert_eq!(word_at(&data, 2), U256::from(head + users_len));
        assert_eq!(word_at(&data, 4), U256::from(head + users_len + covers_len));

        // Users tail begins with its length.
        assert_eq!(word_at(&data, 7), U256::from(2u64));
        // Covers tail follows the users tail.
        assert_eq!(word_at(&data, 10), U256::from(2u64));
        assert_eq!(word_at(&data, 11), U256::from(10u64));
        assert_eq!(word_at(&data, 12), U256::from(20u64));
    }

    #[test]
    fn batch_rejects_mismatched_lengths() {
        let params = BatchParams {
            users: vec![Address::repeat_byte(0x01)],
            debt_asset: Address::ZERO,
            debt_to_cover: vec![U256::from(1u64), U256::from(2u64)],
            collateral_asset: Address::ZERO,
            swaps: vec![Swap {
                router: Address::ZERO,
                call_data: Bytes::from(vec![0x00]),
            }],
            profit_receiver: Address::ZERO,
            min_profit: U256::ZERO,
        };
        assert!(encode_liquidate_batch(&params).is_err());
    }
}
