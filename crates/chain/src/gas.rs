//! EIP-1559 fee quoting.
//!
//! `max_fee = 2 * base_fee + priority`, where the priority fee comes from
//! `eth_maxPriorityFeePerGas` and the base fee from the latest block. Both
//! reads degrade to floor defaults so a flaky endpoint never blocks an
//! attempt.

use std::sync::Arc;

use crate::rpc::RpcClient;
use crate::telemetry::{MetricsEvent, MetricsLogger};

/// 30 gwei priority floor.
pub const DEFAULT_PRIORITY_FEE: u128 = 30_000_000_000;
/// 50 gwei base-fee floor.
pub const DEFAULT_BASE_FEE: u128 = 50_000_000_000;

#[derive(Debug, Clone, Copy)]
pub struct GasQuote {
    pub max_fee_per_gas: u128,
    pub max_priority_fee_per_gas: u128,
    pub base_fee: u128,
}

pub struct GasOracle {
    rpc: Arc<RpcClient>,
    metrics: MetricsLogger,
}

impl GasOracle {
    pub fn new(rpc: Arc<RpcClient>, metrics: MetricsLogger) -> Self {
        Self { rpc, metrics }
    }

    pub async fn quote(&self) -> GasQuote {
        let priority = match self.rpc.max_priority_fee_per_gas().await {
            Ok(fee) if fee > 0 => fee,
            _ => DEFAULT_PRIORITY_FEE,
        };
        let base = match self.rpc.latest_base_fee().await {
            Ok(Some(fee)) if fee > 0 => fee,
            _ => DEFAULT_BASE_FEE,
        };
        let quote = GasQuote {
            max_fee_per_gas: base * 2 + priority,
            max_priority_fee_per_gas: priority,
            base_fee: base,
        };
        self.metrics.emit(MetricsEvent::GasQuote {
            base_fee: quote.base_fee,
            priority_fee: quote.max_priority_fee_per_gas,
            max_fee: quote.max_fee_per_gas,
        });
        quote
    }
}
