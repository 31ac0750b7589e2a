//! Opportunity evaluation: from a trigger to executor calldata.
//!
//! For each `(user, debt, collateral)` trigger the evaluator resolves
//! cached decimals and reserve parameters, sizes the repayment inside the
//! configured USD window, quotes the collateral swap across both venues,
//! assembles the swap legs (split above the USD threshold), and applies
//! the profitability guard before emitting calldata. Rejections are local:
//! they emit a `skip_reason` event and the worker moves on.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use alloy::primitives::{Address, Bytes, U256};
use dashmap::DashMap;
use tracing::debug;

use liquidator_chain::executor_abi::{encode_liquidate_and_arb, ExecutorParams, Swap};
use liquidator_chain::{GasOracle, GasQuote, MetricsEvent, MetricsLogger, RpcClient, VenueQuote};
use liquidator_dex::math::{min_out, price_impact_bps, units_from_f64};
use liquidator_dex::{swap_calldata, DexQuoter, UsdPriceOracle};

use crate::decimals::DecimalsCache;
use crate::error::{Error, Result, SkipReason};
use crate::reserve_params::ReserveParamsCache;

/// Swap deadline distance, matching the executor's expectations.
const SWAP_DEADLINE_SECS: u64 = 180;

#[derive(Debug, Clone, Copy)]
pub struct LiquidationTarget {
    pub user: Address,
    pub debt_asset: Address,
    pub collateral_asset: Address,
    pub estimated_usd_value: f64,
}

/// Everything the submitter needs for one attempt.
#[derive(Debug, Clone)]
pub struct PreparedLiquidation {
    pub params: ExecutorParams,
    pub calldata: Bytes,
    pub amount_out_min_total: U256,
    /// Observed impact of the primary leg, for the sandwich guard.
    pub price_impact_bps: u32,
    pub gas_quote: GasQuote,
}

#[derive(Debug, Clone)]
pub struct EvaluatorConfig {
    pub executor_address: Address,
    pub profit_receiver: Address,
    pub wrapped_native: Address,
    pub usdc: Address,
    pub min_liq_usd: f64,
    pub max_liq_usd: f64,
    pub split_trigger_usd: f64,
    pub max_slippage_bps: u32,
    pub flash_premium_bps: u32,
    pub liquidation_gas_limit: u64,
}

pub struct Evaluator {
    rpc: Arc<RpcClient>,
    quoter: Arc<DexQuoter>,
    decimals: Arc<DecimalsCache>,
    reserve_params: Arc<ReserveParamsCache>,
    prices: Arc<UsdPriceOracle>,
    gas: Arc<GasOracle>,
    metrics: MetricsLogger,
    config: EvaluatorConfig,
    /// Calldata precomputed at prestage time, keyed by the trigger tuple.
    precomputed: DashMap<(Address, Address, Address), Bytes>,
}

/// The acceptance condition of the profitability guard.
pub fn profit_guard_ok(
    amount_out_min_total: U256,
    debt_units: U256,
    premium_units: U256,
    gas_cost_in_debt_units: U256,
) -> bool {
    amount_out_min_total >= debt_units + premium_units + gas_cost_in_debt_units
}

impl Evaluator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        rpc: Arc<RpcClient>,
        quoter: Arc<DexQuoter>,
        decimals: Arc<DecimalsCache>,
        reserve_params: Arc<ReserveParamsCache>,
        prices: Arc<UsdPriceOracle>,
        gas: Arc<GasOracle>,
        metrics: MetricsLogger,
        config: EvaluatorConfig,
    ) -> Self {
        Self {
            rpc,
            quoter,
            decimals,
            reserve_params,
            prices,
            gas,
            metrics,
            config,
            precomputed: DashMap::new(),
        }
    }

    fn pair_label(&self, target: &LiquidationTarget) -> String {
        format!(
            "{:#x}/{:#x}",
            target.collateral_asset, target.debt_asset
        )
    }

    fn skip(&self, target: &LiquidationTarget, reason: SkipReason) -> Error {
        self.metrics.emit(MetricsEvent::SkipReason {
            pair: self.pair_label(target),
            user: format!("{:#x}", target.user),
            usd_value: target.estimated_usd_value,
            reason: reason.as_str(),
        });
        Error::Profitability(reason)
    }

    /// Pre-encode calldata for a watched tuple so a later trigger can
    /// skip straight to sizing. Stored with zero debt-to-cover; the
    /// execution path always re-encodes with live amounts.
    pub fn precompute_for(&self, user: Address, debt_asset: Address, collateral_asset: Address) {
        let key = (user, debt_asset, collateral_asset);
        if self.precomputed.contains_key(&key) {
            return;
        }
        let params = ExecutorParams {
            user,
            debt_asset,
            debt_to_cover: U256::ZERO,
            collateral_asset,
            swaps: Vec::new(),
            profit_receiver: self.config.profit_receiver,
            min_profit: U256::from(1u64),
        };
        if let Ok(calldata) = encode_liquidate_and_arb(&params) {
            self.precomputed.insert(key, calldata);
        }
    }

    pub fn precomputed_count(&self) -> usize {
        self.precomputed.len()
    }

    /// Evaluate a trigger at `block` and produce executor calldata, or a
    /// `Profitability` error naming the skip reason.
    pub async fn evaluate(
        &self,
        target: &LiquidationTarget,
        block: u64,
    ) -> Result<PreparedLiquidation> {
        let debt_decimals = self.decimals.get(&self.rpc, target.debt_asset).await;
        let collat_decimals = self.decimals.get(&self.rpc, target.collateral_asset).await;
        let reserve = self.reserve_params.get(target.debt_asset);

        // Size the repayment: close factor of the opportunity, clamped
        // into the configured USD window.
        let capped_repay_usd =
            reserve.close_factor_bps as f64 * target.estimated_usd_value / 10_000.0;
        if capped_repay_usd < self.config.min_liq_usd {
            return Err(self.skip(target, SkipReason::BelowMinimum));
        }
        let repay_usd = capped_repay_usd.min(self.config.max_liq_usd);

        let mut debt_price = self
            .prices
            .usd_price(&self.quoter, target.debt_asset, debt_decimals, block)
            .await;
        let mut collat_price = self
            .prices
            .usd_price(&self.quoter, target.collateral_asset, collat_decimals, block)
            .await;
        if debt_price <= 0.0 {
            debt_price = 1.0;
        }
        if collat_price <= 0.0 {
            collat_price = 1.0;
        }
        let debt_units = units_from_f64(repay_usd / debt_price, debt_decimals);
        let collat_units = units_from_f64(repay_usd / collat_price, collat_decimals);

        // Best single-venue quote for collateral -> debt.
        let venues = *self.quoter.venues();
        let (quote_a, quote_b) = self
            .quoter
            .quote_both(target.collateral_asset, target.debt_asset, collat_units, block)
            .await;
        let (quoted, selected) = if !quote_a.is_zero() {
            (quote_a, venues[0])
        } else {
            (quote_b, venues[1])
        };
        self.metrics.emit(MetricsEvent::RouteQuote {
            pair: self.pair_label(target),
            amount_in_units: collat_units.to_string(),
            quotes: vec![
                VenueQuote {
                    dex: venues[0].name,
                    out_units: quote_a.to_string(),
                },
                VenueQuote {
                    dex: venues[1].name,
                    out_units: quote_b.to_string(),
                },
            ],
            selected_dex: selected.name,
        });
        if quoted.is_zero() {
            return Err(self.skip(target, SkipReason::InsufficientLiquidity));
        }

        // Assemble swap legs: split across venues above the threshold,
        // single-hop otherwise.
        let deadline = unix_now() + SWAP_DEADLINE_SECS;
        let path = vec![target.collateral_asset, target.debt_asset];
        let slippage = self.config.max_slippage_bps;
        let mut swaps = Vec::new();
        let mut amount_out_min_total = U256::ZERO;

        if repay_usd >= self.config.split_trigger_usd {
            let plan = self
                .quoter
                .plan_best_split(target.collateral_asset, target.debt_asset, collat_units, block)
                .await;
            for leg in &plan.legs {
                let leg_in = collat_units * U256::from(leg.portion_pct) / U256::from(100u64);
                if leg_in.is_zero() {
                    continue;
                }
                let leg_quote = self
                    .quoter
                    .quote_router(leg.router, &path, leg_in, block)
                    .await;
                let leg_min = min_out(leg_quote, slippage, slippage);
                amount_out_min_total += leg_min;
                swaps.push(Swap {
                    router: leg.router,
                    call_data: swap_calldata(
                        leg_in,
                        leg_min,
                        path.clone(),
                        self.config.executor_address,
                        deadline,
                    ),
                });
            }
        }
        if swaps.is_empty() {
            let single_min = min_out(quoted, slippage, slippage);
            amount_out_min_total = single_min;
            swaps.push(Swap {
                router: selected.router,
                call_data: swap_calldata(
                    collat_units,
                    single_min,
                    path.clone(),
                    self.config.executor_address,
                    deadline,
                ),
            });
        }

        // Profitability guard: proceeds must cover the repaid debt, the
        // flash premium, and gas priced in debt units.
        let premium_units =
            debt_units * U256::from(self.config.flash_premium_bps) / U256::from(10_000u64);
        let gas_quote = self.gas.quote().await;
        let gas_cost = self
            .gas_cost_in_debt_units(target.debt_asset, &gas_quote, block)
            .await;
        if !profit_guard_ok(amount_out_min_total, debt_units, premium_units, gas_cost) {
            debug!(
                user = %target.user,
                out_min = %amount_out_min_total,
                debt = %debt_units,
                premium = %premium_units,
                gas = %gas_cost,
                "profit guard rejected"
            );
            return Err(self.skip(target, SkipReason::ProfitGuard));
        }

        let impact = match self
            .quoter
            .local_reserves(&selected, target.collateral_asset, target.debt_asset, block)
            .await
        {
            Some(reserves) => price_impact_bps(collat_units, reserves.reserve_in),
            None => 0,
        };

        let params = ExecutorParams {
            user: target.user,
            debt_asset: target.debt_asset,
            debt_to_cover: debt_units,
            collateral_asset: target.collateral_asset,
            swaps,
            profit_receiver: self.config.profit_receiver,
            min_profit: U256::from(1u64),
        };
        let calldata = encode_liquidate_and_arb(&params)?;
        self.metrics.emit(MetricsEvent::TxBuilt {
            tx_kind: "single",
            pair: self.pair_label(target),
            users_count: 1,
            debt_units_total: debt_units.to_string(),
            amount_out_min_units: amount_out_min_total.to_string(),
        });

        Ok(PreparedLiquidation {
            params,
            calldata,
            amount_out_min_total,
            price_impact_bps: impact,
            gas_quote,
        })
    }

    /// Gas for the attempt expressed in debt units, via a live
    /// `wrapped_native -> debt` quote with a stable hop as fallback. An
    /// unpriceable path contributes zero; the premium and min-out still
    /// bound the downside.
    async fn gas_cost_in_debt_units(
        &self,
        debt_asset: Address,
        gas_quote: &GasQuote,
        block: u64,
    ) -> U256 {
        let gas_wei = U256::from(self.config.liquidation_gas_limit)
            * U256::from(gas_quote.max_fee_per_gas);
        if debt_asset == self.config.wrapped_native {
            return gas_wei;
        }

        let (direct_a, direct_b) = self
            .quoter
            .quote_both(self.config.wrapped_native, debt_asset, gas_wei, block)
            .await;
        let direct = if direct_a.is_zero() { direct_b } else { direct_a };
        if !direct.is_zero() {
            return direct;
        }

        // Through the canonical stable.
        let (stable_a, stable_b) = self
            .quoter
            .quote_both(self.config.wrapped_native, self.config.usdc, gas_wei, block)
            .await;
        let to_stable = if stable_a.is_zero() { stable_b } else { stable_a };
        if to_stable.is_zero() {
            return U256::ZERO;
        }
        if debt_asset == self.config.usdc {
            return to_stable;
        }
        let (out_a, out_b) = self
            .quoter
            .quote_both(self.config.usdc, debt_asset, to_stable, block)
            .await;
        if out_a.is_zero() {
            out_b
        } else {
            out_a
        }
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
