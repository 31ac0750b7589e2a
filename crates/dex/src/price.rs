//! USD pricing: configured overrides first, then live DEX quotes of one
//! token unit against USDC (directly, then through the wrapped native
//! token). Unpriceable tokens floor at 1.0 so sizing math stays sane.

use alloy::primitives::{Address, U256};
use dashmap::DashMap;
use tracing::debug;

use crate::math::{pow10, u256_to_f64};
use crate::router::DexQuoter;

pub struct UsdPriceOracle {
    overrides: DashMap<Address, f64>,
    usdc: Address,
    usdc_decimals: u8,
    wrapped_native: Address,
}

impl UsdPriceOracle {
    pub fn new(usdc: Address, usdc_decimals: u8, wrapped_native: Address) -> Self {
        Self {
            overrides: DashMap::new(),
            usdc,
            usdc_decimals,
            wrapped_native,
        }
    }

    pub fn with_overrides(self, overrides: impl IntoIterator<Item = (Address, f64)>) -> Self {
        for (token, price) in overrides {
            self.overrides.insert(token, price);
        }
        self
    }

    pub fn set_override(&self, token: Address, price: f64) {
        self.overrides.insert(token, price);
    }

    /// USD price per whole token. Never fails; the final fallback is 1.0.
    pub async fn usd_price(
        &self,
        quoter: &DexQuoter,
        token: Address,
        decimals: u8,
        block: u64,
    ) -> f64 {
        if let Some(price) = self.overrides.get(&token) {
            return *price;
        }
        if token == self.usdc {
            return 1.0;
        }

        let one_unit = pow10(decimals);
        let usdc_unit = 10f64.powi(self.usdc_decimals as i32);

        let (direct_a, direct_b) = quoter.quote_both(token, self.usdc, one_unit, block).await;
        let direct = if direct_a.is_zero() { direct_b } else { direct_a };
        if !direct.is_zero() {
            return u256_to_f64(direct) / usdc_unit;
        }

        // Hop through the wrapped native token.
        let (hop_a, hop_b) = quoter
            .quote_both(token, self.wrapped_native, one_unit, block)
            .await;
        let to_native = if hop_a.is_zero() { hop_b } else { hop_a };
        if !to_native.is_zero() {
            let (out_a, out_b) = quoter
                .quote_both(self.wrapped_native, self.usdc, to_native, block)
                .await;
            let out = if out_a.is_zero() { out_b } else { out_a };
            if !out.is_zero() {
                return u256_to_f64(out) / usdc_unit;
            }
        }

        debug!(token = %token, "no usd price available, flooring at 1.0");
        1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::Venue;
    use liquidator_chain::http::mock::MockTransport;
    use liquidator_chain::RpcClient;
    use std::sync::Arc;

    fn addr(byte: u8) -> Address {
        Address::repeat_byte(byte)
    }

    fn quoter(mock: Arc<MockTransport>) -> DexQuoter {
        let rpc = Arc::new(RpcClient::new(mock, "http://rpc.test", None, None));
        DexQuoter::new(
            rpc,
            [
                Venue {
                    name: "Quickswap",
                    router: addr(0xa1),
                    factory: addr(0xa2),
                },
                Venue {
                    name: "Sushiswap",
                    router: addr(0xb1),
                    factory: addr(0xb2),
                },
            ],
        )
    }

    #[tokio::test]
    async fn override_wins_without_any_rpc() {
        let mock = Arc::new(MockTransport::new());
        let quoter = quoter(mock.clone());
        let oracle = UsdPriceOracle::new(addr(0xcc), 6, addr(0xdd))
            .with_overrides([(addr(0x01), 0.75f64)]);

        let price = oracle.usd_price(&quoter, addr(0x01), 18, 5).await;

        assert!((price - 0.75).abs() < 1e-9);
        assert!(mock.requests().is_empty());
    }

    #[tokio::test]
    async fn usdc_is_always_one() {
        let mock = Arc::new(MockTransport::new());
        let quoter = quoter(mock);
        let oracle = UsdPriceOracle::new(addr(0xcc), 6, addr(0xdd));
        assert_eq!(oracle.usd_price(&quoter, addr(0xcc), 6, 5).await, 1.0);
    }

    #[tokio::test]
    async fn unpriceable_token_floors_at_one() {
        let mock = Arc::new(MockTransport::new());
        let quoter = quoter(mock);
        let oracle = UsdPriceOracle::new(addr(0xcc), 6, addr(0xdd));
        // Every lookup fails on the empty queue, so all quotes are zero.
        assert_eq!(oracle.usd_price(&quoter, addr(0x09), 18, 5).await, 1.0);
    }
}
