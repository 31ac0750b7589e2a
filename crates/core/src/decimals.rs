//! Token decimals, probed once and cached for the process lifetime.

use alloy::primitives::Address;
use dashmap::DashMap;
use tracing::debug;

use liquidator_chain::contracts::erc20_decimals;
use liquidator_chain::RpcClient;

const FALLBACK_DECIMALS: u8 = 18;

#[derive(Default)]
pub struct DecimalsCache {
    inner: DashMap<Address, u8>,
}

impl DecimalsCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached decimals, probing the token on first use. Tokens that do
    /// not answer sensibly fall back to 18.
    pub async fn get(&self, rpc: &RpcClient, token: Address) -> u8 {
        if let Some(cached) = self.inner.get(&token) {
            return *cached;
        }
        let decimals = match erc20_decimals(rpc, token).await {
            Ok(Some(d)) if (1..=36).contains(&d) => d,
            other => {
                debug!(token = %token, ?other, "decimals probe failed, assuming 18");
                FALLBACK_DECIMALS
            }
        };
        self.inner.insert(token, decimals);
        decimals
    }

    pub fn put(&self, token: Address, decimals: u8) {
        self.inner.insert(token, decimals);
    }
}
