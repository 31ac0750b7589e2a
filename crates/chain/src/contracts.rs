//! Calldata builders and return decoders for every on-chain ABI the bot
//! consumes, written directly on the word-level codec in [`crate::abi`].
//! Selectors are computed from the canonical signatures once and cached.

use std::sync::OnceLock;

use alloy::primitives::{Address, Bytes, U256};

use crate::abi::{
    append_address, append_bool, append_bytes, append_u256, append_usize, decode_u256_return,
    encode_address_array, padded_len, read_word, selector, WORD,
};
use crate::error::Result;
use crate::rpc::RpcClient;

fn cached(cell: &'static OnceLock<[u8; 4]>, signature: &'static str) -> [u8; 4] {
    *cell.get_or_init(|| selector(signature))
}

fn with_selector(sel: [u8; 4], capacity: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(4 + capacity);
    out.extend_from_slice(&sel);
    out
}

// --- Aave v3 pool -------------------------------------------------------

/// `getUserAccountData(address)`.
pub fn user_account_data_call(user: Address) -> Bytes {
    static SEL: OnceLock<[u8; 4]> = OnceLock::new();
    let mut out = with_selector(cached(&SEL, "getUserAccountData(address)"), WORD);
    append_address(&mut out, user);
    Bytes::from(out)
}

// --- ERC-20 -------------------------------------------------------------

pub fn decimals_call() -> Bytes {
    static SEL: OnceLock<[u8; 4]> = OnceLock::new();
    Bytes::from(with_selector(cached(&SEL, "decimals()"), 0))
}

pub fn balance_of_call(owner: Address) -> Bytes {
    static SEL: OnceLock<[u8; 4]> = OnceLock::new();
    let mut out = with_selector(cached(&SEL, "balanceOf(address)"), WORD);
    append_address(&mut out, owner);
    Bytes::from(out)
}

pub fn allowance_call(owner: Address, spender: Address) -> Bytes {
    static SEL: OnceLock<[u8; 4]> = OnceLock::new();
    let mut out = with_selector(cached(&SEL, "allowance(address,address)"), 2 * WORD);
    append_address(&mut out, owner);
    append_address(&mut out, spender);
    Bytes::from(out)
}

// --- Uniswap V2 factory / pair ------------------------------------------

pub fn get_pair_call(token_a: Address, token_b: Address) -> Bytes {
    static SEL: OnceLock<[u8; 4]> = OnceLock::new();
    let mut out = with_selector(cached(&SEL, "getPair(address,address)"), 2 * WORD);
    append_address(&mut out, token_a);
    append_address(&mut out, token_b);
    Bytes::from(out)
}

pub fn get_reserves_call() -> Bytes {
    static SEL: OnceLock<[u8; 4]> = OnceLock::new();
    Bytes::from(with_selector(cached(&SEL, "getReserves()"), 0))
}

/// `(reserve0, reserve1, blockTimestampLast)`; the timestamp is dropped.
pub fn decode_reserves_return(data: &[u8]) -> Option<(U256, U256)> {
    let reserve0 = read_word(data, 0)?;
    let reserve1 = read_word(data, WORD)?;
    read_word(data, 2 * WORD)?;
    Some((reserve0, reserve1))
}

// --- Uniswap V2 router --------------------------------------------------

/// `getAmountsOut(uint256,address[])`: amount word, path offset `0x40`,
/// then the address array.
pub fn get_amounts_out_call(amount_in: U256, path: &[Address]) -> Bytes {
    static SEL: OnceLock<[u8; 4]> = OnceLock::new();
    let mut out = with_selector(
        cached(&SEL, "getAmountsOut(uint256,address[])"),
        3 * WORD + path.len() * WORD,
    );
    append_u256(&mut out, amount_in);
    append_usize(&mut out, 2 * WORD);
    out.extend_from_slice(&encode_address_array(path));
    Bytes::from(out)
}

/// `swapExactTokensForTokens(uint256,uint256,address[],address,uint256)`:
/// a five-slot head with the path offset at `0xa0`.
pub fn swap_exact_tokens_call(
    amount_in: U256,
    amount_out_min: U256,
    path: &[Address],
    to: Address,
    deadline: u64,
) -> Bytes {
    static SEL: OnceLock<[u8; 4]> = OnceLock::new();
    let mut out = with_selector(
        cached(
            &SEL,
            "swapExactTokensForTokens(uint256,uint256,address[],address,uint256)",
        ),
        6 * WORD + path.len() * WORD,
    );
    append_u256(&mut out, amount_in);
    append_u256(&mut out, amount_out_min);
    append_usize(&mut out, 5 * WORD);
    append_address(&mut out, to);
    append_u256(&mut out, U256::from(deadline));
    out.extend_from_slice(&encode_address_array(path));
    Bytes::from(out)
}

// --- Multicall3 ---------------------------------------------------------

/// `tryAggregate(bool,(address,bytes)[])`. The calls array carries one
/// offset word per element (measured from the element area after the
/// length), and each element is `target`, an inner offset of `0x40`, and
/// the length-prefixed padded calldata.
pub fn try_aggregate_call(require_success: bool, calls: &[(Address, Bytes)]) -> Bytes {
    static SEL: OnceLock<[u8; 4]> = OnceLock::new();
    let mut out = with_selector(cached(&SEL, "tryAggregate(bool,(address,bytes)[])"), 0);

    append_bool(&mut out, require_success);
    append_usize(&mut out, 2 * WORD); // offset to the calls array

    append_usize(&mut out, calls.len());
    let mut element_offset = calls.len() * WORD;
    for (_, data) in calls {
        append_usize(&mut out, element_offset);
        element_offset += 3 * WORD + padded_len(data.len());
    }
    for (target, data) in calls {
        append_address(&mut out, *target);
        append_usize(&mut out, 2 * WORD);
        append_bytes(&mut out, data);
    }
    Bytes::from(out)
}

// --- typed ERC-20 reads -------------------------------------------------

/// Token decimals, or `None` when the token does not answer sensibly.
pub async fn erc20_decimals(rpc: &RpcClient, token: Address) -> Result<Option<u8>> {
    let ret = rpc.call(token, &decimals_call(), None).await?;
    Ok(crate::abi::decode_u8_return(&ret))
}

pub async fn erc20_balance_of(rpc: &RpcClient, token: Address, owner: Address) -> Result<U256> {
    let ret = rpc.call(token, &balance_of_call(owner), None).await?;
    Ok(decode_u256_return(&ret).unwrap_or(U256::ZERO))
}

pub async fn erc20_allowance(
    rpc: &RpcClient,
    token: Address,
    owner: Address,
    spender: Address,
) -> Result<U256> {
    let ret = rpc.call(token, &allowance_call(owner, spender), None).await?;
    Ok(decode_u256_return(&ret).unwrap_or(U256::ZERO))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abi::{decode_bool_bytes_array_return, read_address};

    fn word_at(data: &[u8], slot: usize) -> U256 {
        read_word(data, 4 + slot * WORD).unwrap()
    }

    #[test]
    fn selectors_match_the_canonical_signatures() {
        assert_eq!(&decimals_call()[..], &[0x31, 0x3c, 0xe5, 0x67]);
        assert_eq!(&balance_of_call(Address::ZERO)[..4], &[0x70, 0xa0, 0x82, 0x31]);
        assert_eq!(
            &allowance_call(Address::ZERO, Address::ZERO)[..4],
            &[0xdd, 0x62, 0xed, 0x3e]
        );
        assert_eq!(
            &get_pair_call(Address::ZERO, Address::ZERO)[..4],
            &[0xe6, 0xa4, 0x39, 0x05]
        );
        assert_eq!(&get_reserves_call()[..], &[0x09, 0x02, 0xf1, 0xac]);
        assert_eq!(
            &get_amounts_out_call(U256::ZERO, &[])[..4],
            &[0xd0, 0x6c, 0xa6, 0x1f]
        );
        assert_eq!(
            &swap_exact_tokens_call(U256::ZERO, U256::ZERO, &[], Address::ZERO, 0)[..4],
            &[0x38, 0xed, 0x17, 0x39]
        );
        assert_eq!(
            &user_account_data_call(Address::ZERO)[..4],
            &[0xbf, 0x92, 0x85, 0x7c]
        );
        assert_eq!(
            &try_aggregate_call(false, &[])[..4],
            &[0xbc, 0xe3, 0x8b, 0xd7]
        );
    }

    #[test]
    fn amounts_out_head_points_past_two_slots() {
        let path = [Address::repeat_byte(0x01), Address::repeat_byte(0x02)];
        let data = get_amounts_out_call(U256::from(1_000_000u64), &path);

        assert_eq!(word_at(&data, 0), U256::from(1_000_000u64));
        assert_eq!(word_at(&data, 1), U256::from(0x40u64)); // path offset
        assert_eq!(word_at(&data, 2), U256::from(2u64)); // path length
        assert_eq!(
            read_address(&data, 4 + 3 * WORD).unwrap(),
            Address::repeat_byte(0x01)
        );
        assert_eq!(data.len(), 4 + 5 * WORD);
    }

    #[test]
    fn swap_head_is_five_slots_with_path_at_a0() {
        let path = [Address::repeat_byte(0x0a), Address::repeat_byte(0x0b)];
        let data = swap_exact_tokens_call(
            U256::from(5u64),
            U256::from(4u64),
            &path,
            Address::repeat_byte(0x0c),
            1234,
        );

        assert_eq!(word_at(&data, 0), U256::from(5u64));
        assert_eq!(word_at(&data, 1), U256::from(4u64));
        assert_eq!(word_at(&data, 2), U256::from(0xa0u64));
        assert_eq!(
            read_address(&data, 4 + 3 * WORD).unwrap(),
            Address::repeat_byte(0x0c)
        );
        assert_eq!(word_at(&data, 4), U256::from(1234u64));
        assert_eq!(word_at(&data, 5), U256::from(2u64)); // path length
        assert_eq!(data.len(), 4 + 8 * WORD);
    }

    #[test]
    fn try_aggregate_lays_out_element_offsets() {
        let calls = vec![
            (Address::repeat_byte(0x01), Bytes::from(vec![0xaa; 4])),
            (Address::repeat_byte(0x02), Bytes::from(vec![0xbb; 36])),
        ];
        let data = try_aggregate_call(false, &calls);

        assert_eq!(word_at(&data, 0), U256::ZERO); // requireSuccess = false
        assert_eq!(word_at(&data, 1), U256::from(0x40u64)); // calls offset
        assert_eq!(word_at(&data, 2), U256::from(2u64)); // length
        // Element offsets from the element area: two offset words first.
        assert_eq!(word_at(&data, 3), U256::from(2 * 32u64));
        // First element: 3 words + padded(4) = 128 bytes.
        assert_eq!(word_at(&data, 4), U256::from(64 + 128u64));
        // First element body.
        assert_eq!(
            read_address(&data, 4 + 5 * WORD).unwrap(),
            Address::repeat_byte(0x01)
        );
        assert_eq!(word_at(&data, 6), U256::from(0x40u64)); // inner offset
        assert_eq!(word_at(&data, 7), U256::from(4u64)); // calldata length
    }

    #[test]
    fn reserves_return_needs_all_three_words() {
        let mut data = Vec::new();
        append_u256(&mut data, U256::from(1000u64));
        append_u256(&mut data, U256::from(2000u64));
        append_u256(&mut data, U256::from(7u64));

        assert_eq!(
            decode_reserves_return(&data).unwrap(),
            (U256::from(1000u64), U256::from(2000u64))
        );
        assert!(decode_reserves_return(&data[..64]).is_none());
    }

    #[test]
    fn aggregate_call_and_return_shapes_agree() {
        // Encode a result the way the aggregator would and decode it with
        // the shared return decoder.
        let mut element = Vec::new();
        append_bool(&mut element, true);
        append_usize(&mut element, 2 * WORD);
        append_bytes(&mut element, &[0x11, 0x22]);

        let mut ret = Vec::new();
        append_usize(&mut ret, WORD);
        append_usize(&mut ret, 1);
        append_usize(&mut ret, WORD);
        ret.extend_from_slice(&element);

        let decoded = decode_bool_bytes_array_return(&ret).unwrap();
        assert_eq!(decoded, vec![(true, vec![0x11, 0x22])]);
    }
}
