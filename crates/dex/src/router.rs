//! Quoting and route planning across the two V2 venues.
//!
//! Local constant-product math over cached reserves is the fast path; the
//! router's `getAmountsOut` is the on-chain fallback, cached per
//! `(router, path, amount_in, block)`. Splits are searched over fixed
//! ratios and the best summed output wins.

use alloy::primitives::{Address, Bytes, U256};
use dashmap::DashMap;
use smallvec::SmallVec;
use std::sync::Arc;
use tracing::debug;

use liquidator_chain::abi::decode_u256_array_return;
use liquidator_chain::contracts::{get_amounts_out_call, swap_exact_tokens_call};
use liquidator_chain::RpcClient;

use crate::math::v2_amount_out;
use crate::reserves::{PairReserves, ReserveStore};

/// A constant-product venue: the factory for local quotes, the router for
/// fallback quotes and for the swap calldata the executor will call.
#[derive(Debug, Clone, Copy)]
pub struct Venue {
    pub name: &'static str,
    pub router: Address,
    pub factory: Address,
}

#[derive(Debug, Clone, Copy)]
pub struct RouteLeg {
    pub router: Address,
    pub token_in: Address,
    pub token_out: Address,
    /// Share of the input routed through this leg, in percent.
    pub portion_pct: u8,
}

#[derive(Debug, Clone, Default)]
pub struct RoutePlan {
    pub legs: SmallVec<[RouteLeg; 2]>,
}

/// Fixed split grid evaluated above the split threshold.
pub const SPLIT_RATIOS: [(u8, u8); 5] = [(100, 0), (75, 25), (50, 50), (25, 75), (0, 100)];

pub struct DexQuoter {
    rpc: Arc<RpcClient>,
    store: ReserveStore,
    venues: [Venue; 2],
    router_quotes: DashMap<(Address, Vec<Address>, U256, u64), U256>,
}

impl DexQuoter {
    pub fn new(rpc: Arc<RpcClient>, venues: [Venue; 2]) -> Self {
        Self {
            rpc,
            store: ReserveStore::new(),
            venues,
            router_quotes: DashMap::new(),
        }
    }

    pub fn venues(&self) -> &[Venue; 2] {
        &self.venues
    }

    /// Invalidate everything older than the new block.
    pub fn begin_block(&self, block: u64) {
        self.store.prune_before(block);
        self.router_quotes
            .retain(|(_, _, _, entry_block), _| *entry_block >= block);
    }

    /// Aligned reserves for a venue's pair, if it exists.
    pub async fn local_reserves(
        &self,
        venue: &Venue,
        token_in: Address,
        token_out: Address,
        block: u64,
    ) -> Option<PairReserves> {
        match self
            .store
            .reserves(&self.rpc, venue.factory, token_in, token_out, block)
            .await
        {
            Ok(reserves) => reserves,
            Err(err) => {
                debug!(venue = venue.name, error = %err, "reserve lookup failed");
                None
            }
        }
    }

    /// Local constant-product quote; zero when the pair or its reserves
    /// are unavailable.
    pub async fn quote_local(
        &self,
        venue: &Venue,
        token_in: Address,
        token_out: Address,
        amount_in: U256,
        block: u64,
    ) -> U256 {
        match self.local_reserves(venue, token_in, token_out, block).await {
            Some(reserves) => v2_amount_out(amount_in, reserves.reserve_in, reserves.reserve_out),
            None => U256::ZERO,
        }
    }

    /// `getAmountsOut` fallback, cached for the current block. RPC
    /// failures quote zero so the caller degrades instead of aborting.
    pub async fn quote_router(
        &self,
        router: Address,
        path: &[Address],
        amount_in: U256,
        block: u64,
    ) -> U256 {
        let key = (router, path.to_vec(), amount_in, block);
        if let Some(cached) = self.router_quotes.get(&key) {
            return *cached;
        }

        let data = get_amounts_out_call(amount_in, path);
        let quoted = match self.rpc.call(router, &data, Some(block)).await {
            Ok(ret) => decode_u256_array_return(&ret)
                .and_then(|amounts| amounts.last().copied())
                .unwrap_or(U256::ZERO),
            Err(err) => {
                debug!(router = %router, error = %err, "getAmountsOut failed");
                U256::ZERO
            }
        };
        self.router_quotes.insert(key, quoted);
        quoted
    }

    /// Local quote first, router fallback when the local path resolves to
    /// nothing.
    pub async fn best_quote(
        &self,
        venue: &Venue,
        token_in: Address,
        token_out: Address,
        amount_in: U256,
        block: u64,
    ) -> U256 {
        let local = self
            .quote_local(venue, token_in, token_out, amount_in, block)
            .await;
        if !local.is_zero() {
            return local;
        }
        self.quote_router(venue.router, &[token_in, token_out], amount_in, block)
            .await
    }

    /// Quote the same trade on both venues, in venue order.
    pub async fn quote_both(
        &self,
        token_in: Address,
        token_out: Address,
        amount_in: U256,
        block: u64,
    ) -> (U256, U256) {
        let first = self
            .best_quote(&self.venues[0], token_in, token_out, amount_in, block)
            .await;
        let second = self
            .best_quote(&self.venues[1], token_in, token_out, amount_in, block)
            .await;
        (first, second)
    }

    /// Evaluate the fixed split grid across the two venues and keep the
    /// ratio with the best summed output.
    pub async fn plan_best_split(
        &self,
        token_in: Address,
        token_out: Address,
        amount_in: U256,
        block: u64,
    ) -> RoutePlan {
        let mut best_out = U256::ZERO;
        let mut best_ratio = (100u8, 0u8);
        for (a, b) in SPLIT_RATIOS {
            let in_a = amount_in * U256::from(a) / U256::from(100u64);
            let in_b = amount_in - in_a;
            let mut total = U256::ZERO;
            if !in_a.is_zero() {
                total += self
                    .best_quote(&self.venues[0], token_in, token_out, in_a, block)
                    .await;
            }
            if !in_b.is_zero() {
                total += self
                    .best_quote(&self.venues[1], token_in, token_out, in_b, block)
                    .await;
            }
            if total > best_out {
                best_out = total;
                best_ratio = (a, b);
            }
        }

        let mut plan = RoutePlan::default();
        if best_ratio.0 > 0 {
            plan.legs.push(RouteLeg {
                router: self.venues[0].router,
                token_in,
                token_out,
                portion_pct: best_ratio.0,
            });
        }
        if best_ratio.1 > 0 {
            plan.legs.push(RouteLeg {
                router: self.venues[1].router,
                token_in,
                token_out,
                portion_pct: best_ratio.1,
            });
        }
        plan
    }
}

/// `swapExactTokensForTokens` calldata for one leg.
pub fn swap_calldata(
    amount_in: U256,
    amount_out_min: U256,
    path: Vec<Address>,
    to: Address,
    deadline: u64,
) -> Bytes {
    swap_exact_tokens_call(amount_in, amount_out_min, &path, to, deadline)
}
