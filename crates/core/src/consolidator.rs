//! Profit consolidation: sweep configured non-stable balances into USDC.
//!
//! Deliberately a function of its collaborators rather than a member of
//! the engine, so there is no back-pointer between the manager and the
//! consolidator. Called after a successful execution; returns the first
//! submitted swap hash, if any balance cleared the USD gate.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use alloy::primitives::{Address, B256, U256};
use tracing::{debug, info};

use liquidator_chain::contracts::erc20_balance_of;
use liquidator_chain::crypto::keccak::keccak256;
use liquidator_chain::{
    GasOracle, MetricsEvent, MetricsLogger, NonceManager, RpcClient, TxFields, Wallet,
};
use liquidator_dex::math::{min_out, u256_to_f64};
use liquidator_dex::{swap_calldata, DexQuoter, UsdPriceOracle};

use crate::decimals::DecimalsCache;
use crate::error::Result;

/// Plain single-hop router swap.
const CONSOLIDATION_GAS_LIMIT: u64 = 280_000;

#[derive(Debug, Clone)]
pub struct ConsolidatorConfig {
    pub tokens: Vec<Address>,
    pub min_swap_usd: f64,
    pub max_slippage_bps: u32,
    pub usdc: Address,
    pub chain_id: u64,
    pub submit_private: bool,
    pub dry_run: bool,
}

#[allow(clippy::too_many_arguments)]
pub async fn consolidate_to_usdc(
    rpc: &RpcClient,
    quoter: &DexQuoter,
    prices: &UsdPriceOracle,
    decimals: &DecimalsCache,
    wallet: &Wallet,
    nonces: &NonceManager,
    gas: &GasOracle,
    metrics: &MetricsLogger,
    config: &ConsolidatorConfig,
) -> Result<Option<B256>> {
    if config.tokens.is_empty() {
        return Ok(None);
    }
    let block = rpc.block_number().await?;
    let preferred = quoter.venues()[0];

    for token in &config.tokens {
        if *token == config.usdc {
            continue;
        }
        let token_decimals = decimals.get(rpc, *token).await;
        let balance = match erc20_balance_of(rpc, *token, wallet.address()).await {
            Ok(balance) if !balance.is_zero() => balance,
            _ => continue,
        };

        let price = prices.usd_price(quoter, *token, token_decimals, block).await;
        let usd_value = u256_to_f64(balance) / 10f64.powi(token_decimals as i32) * price;
        if usd_value < config.min_swap_usd {
            debug!(token = %token, usd_value, "below consolidation threshold");
            continue;
        }

        let path = vec![*token, config.usdc];
        let quoted = quoter
            .quote_router(preferred.router, &path, balance, block)
            .await;
        if quoted.is_zero() {
            continue;
        }
        let out_min = min_out(quoted, config.max_slippage_bps, config.max_slippage_bps);
        let deadline = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
            + 180;
        let calldata = swap_calldata(balance, out_min, path, wallet.address(), deadline);

        let quote = gas.quote().await;
        let fields = TxFields {
            chain_id: config.chain_id,
            nonce: nonces.next(),
            gas_limit: CONSOLIDATION_GAS_LIMIT,
            max_fee_per_gas: quote.max_fee_per_gas,
            max_priority_fee_per_gas: quote.max_priority_fee_per_gas,
            to: preferred.router,
            value: U256::ZERO,
            data: calldata,
        };
        let raw = wallet.sign_transaction(&fields)?;

        let (hash, submit_kind) = if config.dry_run {
            (B256::from(keccak256(&raw)), "dry_run")
        } else if config.submit_private {
            (rpc.send_raw_private(&raw).await?, "private")
        } else {
            (rpc.send_raw_public(&raw).await?, "public")
        };
        metrics.emit(MetricsEvent::TxSubmitted {
            tx_hash: format!("{hash}"),
            nonce: fields.nonce,
            submit_kind,
            rbf_index: 0,
            max_fee_per_gas: fields.max_fee_per_gas,
            max_priority_fee: fields.max_priority_fee_per_gas,
        });
        info!(token = %token, tx_hash = %hash, usd_value, "profit consolidation submitted");
        return Ok(Some(hash));
    }
    Ok(None)
}
