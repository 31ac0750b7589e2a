//! Pair and reserve caches.
//!
//! Pair addresses are immutable, so `(factory, token0, token1)` entries
//! live for the process (negative results included). Reserves are valid
//! only at the block they were read; the cache key carries the block
//! number, so a lookup can never be answered with an older block's
//! snapshot, and entries behind the cursor are pruned each block.

use alloy::primitives::{Address, U256};
use dashmap::DashMap;
use liquidator_chain::abi::decode_address_return;
use liquidator_chain::contracts::{decode_reserves_return, get_pair_call, get_reserves_call};
use liquidator_chain::{Error, Result, RpcClient};

/// Reserves aligned to the caller's `(token_in, token_out)` direction,
/// valid only at `block_number`.
#[derive(Debug, Clone, Copy)]
pub struct PairReserves {
    pub pair: Address,
    pub reserve_in: U256,
    pub reserve_out: U256,
    pub block_number: u64,
}

/// Smaller 20-byte value is `token0`, matching the factory's ordering.
fn sort_tokens(a: Address, b: Address) -> (Address, Address) {
    if a < b {
        (a, b)
    } else {
        (b, a)
    }
}

#[derive(Default)]
pub struct ReserveStore {
    pairs: DashMap<(Address, Address, Address), Option<Address>>,
    reserves: DashMap<(Address, u64), (U256, U256)>,
}

impl ReserveStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve `getPair` once per `(factory, pair of tokens)`.
    pub async fn pair_address(
        &self,
        rpc: &RpcClient,
        factory: Address,
        token_a: Address,
        token_b: Address,
    ) -> Result<Option<Address>> {
        let (token0, token1) = sort_tokens(token_a, token_b);
        let key = (factory, token0, token1);
        if let Some(cached) = self.pairs.get(&key) {
            return Ok(*cached);
        }

        let ret = rpc
            .call(factory, &get_pair_call(token_a, token_b), None)
            .await?;
        let pair = decode_address_return(&ret)
            .ok_or_else(|| Error::Decode("getPair return too short".into()))?;
        let value = (pair != Address::ZERO).then_some(pair);
        self.pairs.insert(key, value);
        Ok(value)
    }

    /// Reserves for `(token_in, token_out)` at exactly `block`.
    pub async fn reserves(
        &self,
        rpc: &RpcClient,
        factory: Address,
        token_in: Address,
        token_out: Address,
        block: u64,
    ) -> Result<Option<PairReserves>> {
        let Some(pair) = self.pair_address(rpc, factory, token_in, token_out).await? else {
            return Ok(None);
        };

        let raw = match self.cached(pair, block) {
            Some(raw) => raw,
            None => {
                let ret = rpc.call(pair, &get_reserves_call(), Some(block)).await?;
                let raw = decode_reserves_return(&ret)
                    .ok_or_else(|| Error::Decode("getReserves return too short".into()))?;
                self.reserves.insert((pair, block), raw);
                raw
            }
        };

        let (token0, _) = sort_tokens(token_in, token_out);
        let (reserve_in, reserve_out) = if token_in == token0 {
            (raw.0, raw.1)
        } else {
            (raw.1, raw.0)
        };
        Ok(Some(PairReserves {
            pair,
            reserve_in,
            reserve_out,
            block_number: block,
        }))
    }

    fn cached(&self, pair: Address, block: u64) -> Option<(U256, U256)> {
        self.reserves.get(&(pair, block)).map(|entry| *entry)
    }

    /// Drop reserve snapshots taken before `block`.
    pub fn prune_before(&self, block: u64) {
        self.reserves.retain(|(_, entry_block), _| *entry_block >= block);
    }

    #[cfg(test)]
    pub(crate) fn insert_negative_pair(&self, factory: Address, token_a: Address, token_b: Address) {
        let (token0, token1) = sort_tokens(token_a, token_b);
        self.pairs.insert((factory, token0, token1), None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use liquidator_chain::http::mock::MockTransport;
    use serde_json::json;
    use std::sync::Arc;

    fn addr(byte: u8) -> Address {
        Address::repeat_byte(byte)
    }

    #[tokio::test]
    async fn pair_lookup_is_cached_including_negative_results() {
        let mock = Arc::new(MockTransport::new());
        mock.push_result(json!(format!("0x{:064x}", 0))); // zero address: no pair
        let rpc = RpcClient::new(mock.clone(), "http://rpc.test", None, None);
        let store = ReserveStore::new();

        let first = store
            .pair_address(&rpc, addr(0x0f), addr(0x01), addr(0x02))
            .await
            .unwrap();
        assert!(first.is_none());

        // Swapped token order hits the same entry, no second RPC.
        let second = store
            .pair_address(&rpc, addr(0x0f), addr(0x02), addr(0x01))
            .await
            .unwrap();
        assert!(second.is_none());
        assert_eq!(mock.requests().len(), 1);
    }

    #[tokio::test]
    async fn reserves_align_to_caller_direction() {
        let mock = Arc::new(MockTransport::new());
        let pair = addr(0xcc);
        mock.push_result(json!(format!(
            "0x000000000000000000000000{}",
            "cccccccccccccccccccccccccccccccccccccccc"
        )));
        // reserve0 = 1000, reserve1 = 2000, timestamp 7.
        mock.push_result(json!(format!(
            "0x{:064x}{:064x}{:064x}",
            1000u64, 2000u64, 7u64
        )));
        let rpc = RpcClient::new(mock, "http://rpc.test", None, None);
        let store = ReserveStore::new();

        // token_in 0x02 > token_out 0x01, so token0 is 0x01 and the
        // caller's reserve_in is reserve1.
        let aligned = store
            .reserves(&rpc, addr(0x0f), addr(0x02), addr(0x01), 50)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(aligned.pair, pair);
        assert_eq!(aligned.reserve_in, U256::from(2000u64));
        assert_eq!(aligned.reserve_out, U256::from(1000u64));
        assert_eq!(aligned.block_number, 50);
    }

    #[test]
    fn stale_block_snapshots_are_never_served() {
        let store = ReserveStore::new();
        let pair = addr(0xaa);

        store
            .reserves
            .insert((pair, 10), (U256::from(1u64), U256::from(2u64)));
        assert!(store.cached(pair, 10).is_some());
        // A lookup for block 11 misses even though block 10 is cached.
        assert!(store.cached(pair, 11).is_none());

        store.prune_before(11);
        assert!(store.cached(pair, 10).is_none());
    }
}
