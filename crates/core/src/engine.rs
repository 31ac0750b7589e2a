//! Block-driven orchestration.
//!
//! The block channel drives everything: on each new height the engine
//! refreshes health factors for the watched users, upserts the watchlist,
//! precomputes calldata for the prestage set, and fans trigger execution
//! out to a bounded worker pool so block intake is never held by I/O.

use std::sync::Arc;

use alloy::primitives::Address;
use parking_lot::RwLock;
use tokio::sync::{mpsc, Semaphore};
use tracing::{debug, error, info, warn};

use liquidator_chain::{
    submitter::sandwich_risk_exceeded, GasOracle, MetricsEvent, MetricsLogger, NonceManager,
    RpcClient, Submitter, TxFields, Wallet,
};
use liquidator_dex::{DexQuoter, UsdPriceOracle};

use crate::consolidator::{consolidate_to_usdc, ConsolidatorConfig};
use crate::decimals::DecimalsCache;
use crate::discovery::SubgraphClient;
use crate::error::{Error, Result, SkipReason};
use crate::evaluator::{Evaluator, LiquidationTarget};
use crate::scanner::HealthScanner;
use crate::watchlist::{WatchEntry, WatchKey, Watchlist};

/// Refresh the discovery-backed user set every this many blocks.
const DISCOVERY_INTERVAL_BLOCKS: u64 = 300;
const DISCOVERY_LIMIT: usize = 200;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub chain_id: u64,
    pub executor_address: Address,
    pub debt_assets: Vec<Address>,
    pub collateral_assets: Vec<Address>,
    pub monitor_users: Vec<Address>,
    pub min_liq_usd: f64,
    pub max_slippage_bps: u32,
    pub liquidation_gas_limit: u64,
    pub max_concurrency: usize,
}

pub struct Engine {
    rpc: Arc<RpcClient>,
    scanner: HealthScanner,
    watchlist: Watchlist,
    evaluator: Evaluator,
    submitter: Submitter,
    quoter: Arc<DexQuoter>,
    prices: Arc<UsdPriceOracle>,
    decimals: Arc<DecimalsCache>,
    gas: Arc<GasOracle>,
    wallet: Arc<Wallet>,
    nonces: Arc<NonceManager>,
    metrics: MetricsLogger,
    discovery: Option<SubgraphClient>,
    discovered_users: RwLock<Vec<Address>>,
    workers: Arc<Semaphore>,
    consolidator: ConsolidatorConfig,
    config: EngineConfig,
}

impl Engine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        rpc: Arc<RpcClient>,
        scanner: HealthScanner,
        watchlist: Watchlist,
        evaluator: Evaluator,
        submitter: Submitter,
        quoter: Arc<DexQuoter>,
        prices: Arc<UsdPriceOracle>,
        decimals: Arc<DecimalsCache>,
        gas: Arc<GasOracle>,
        wallet: Arc<Wallet>,
        nonces: Arc<NonceManager>,
        metrics: MetricsLogger,
        discovery: Option<SubgraphClient>,
        consolidator: ConsolidatorConfig,
        config: EngineConfig,
    ) -> Self {
        let workers = Arc::new(Semaphore::new(config.max_concurrency.max(1)));
        Self {
            rpc,
            scanner,
            watchlist,
            evaluator,
            submitter,
            quoter,
            prices,
            decimals,
            gas,
            wallet,
            nonces,
            metrics,
            discovery,
            discovered_users: RwLock::new(Vec::new()),
            workers,
            consolidator,
            config,
        }
    }

    /// Consume block heights until the channel closes.
    pub async fn run(self: Arc<Self>, mut blocks: mpsc::Receiver<u64>) -> Result<()> {
        info!(
            users = self.config.monitor_users.len(),
            debt_assets = self.config.debt_assets.len(),
            collateral_assets = self.config.collateral_assets.len(),
            "engine running"
        );
        while let Some(block) = blocks.recv().await {
            self.clone().on_block(block).await;
        }
        info!("block channel closed, engine stopping");
        Ok(())
    }

    async fn on_block(self: Arc<Self>, block: u64) {
        debug!(block, "new block");
        self.quoter.begin_block(block);

        if self.config.monitor_users.is_empty() {
            self.refresh_discovery(block).await;
        }
        let users = self.watch_users();
        if users.is_empty() {
            return;
        }

        let health = match self.scanner.fetch_health_factors(&users).await {
            Ok(health) => health,
            Err(err) => {
                warn!(block, error = %err, "health scan failed");
                return;
            }
        };

        // Expand per-user health into per-(user, debt, collateral) watch
        // entries. The scan has no position sizing; the estimate is the
        // configured floor scaled so the default close factor still
        // clears MIN_LIQ_USD, and evaluation re-sizes from there.
        let estimated_usd = self.config.min_liq_usd * 2.0;
        let mut scan = Vec::new();
        for entry in &health {
            for debt in &self.config.debt_assets {
                for collateral in &self.config.collateral_assets {
                    if debt == collateral {
                        continue;
                    }
                    scan.push(WatchEntry {
                        key: WatchKey {
                            user: entry.user,
                            debt_asset: *debt,
                            collateral_asset: *collateral,
                        },
                        usd_value: estimated_usd,
                        health_factor: entry.health_factor,
                        target_buffer: 0.0,
                    });
                }
            }
        }

        let prestage = self.watchlist.upsert_and_select_prestage(scan);
        for entry in &prestage {
            self.evaluator.precompute_for(
                entry.key.user,
                entry.key.debt_asset,
                entry.key.collateral_asset,
            );
        }
        self.watchlist.adapt_buffer(prestage.len());

        let triggers = self.watchlist.collect_triggers();
        if !triggers.is_empty() {
            info!(
                block,
                prestaged = prestage.len(),
                triggers = triggers.len(),
                "scan complete"
            );
        }

        for trigger in triggers {
            let Ok(permit) = self.workers.clone().acquire_owned().await else {
                return;
            };
            let engine = self.clone();
            tokio::spawn(async move {
                let _permit = permit;
                let target = LiquidationTarget {
                    user: trigger.key.user,
                    debt_asset: trigger.key.debt_asset,
                    collateral_asset: trigger.key.collateral_asset,
                    estimated_usd_value: trigger.usd_value,
                };
                match engine.execute(&target, block).await {
                    Ok(hash) => {
                        info!(user = %target.user, tx_hash = %hash, "liquidation attempt done");
                    }
                    Err(Error::Profitability(reason)) => {
                        debug!(user = %target.user, %reason, "opportunity skipped");
                    }
                    Err(err) => {
                        warn!(user = %target.user, error = %err, "liquidation attempt failed");
                    }
                }
            });
        }
    }

    async fn execute(&self, target: &LiquidationTarget, block: u64) -> Result<alloy::primitives::B256> {
        let prepared = self.evaluator.evaluate(target, block).await?;

        if sandwich_risk_exceeded(
            prepared.price_impact_bps as f64,
            self.config.max_slippage_bps as f64,
        ) {
            self.metrics.emit(MetricsEvent::SkipReason {
                pair: format!("{:#x}/{:#x}", target.collateral_asset, target.debt_asset),
                user: format!("{:#x}", target.user),
                usd_value: target.estimated_usd_value,
                reason: SkipReason::SandwichRisk.as_str(),
            });
            return Err(Error::Profitability(SkipReason::SandwichRisk));
        }

        let fields = TxFields {
            chain_id: self.config.chain_id,
            nonce: self.nonces.next(),
            gas_limit: self.config.liquidation_gas_limit,
            max_fee_per_gas: prepared.gas_quote.max_fee_per_gas,
            max_priority_fee_per_gas: prepared.gas_quote.max_priority_fee_per_gas,
            to: self.config.executor_address,
            value: alloy::primitives::U256::ZERO,
            data: prepared.calldata.clone(),
        };
        let hash = self.submitter.submit_with_rbf(fields).await?;

        if let Err(err) = consolidate_to_usdc(
            &self.rpc,
            &self.quoter,
            &self.prices,
            &self.decimals,
            &self.wallet,
            &self.nonces,
            &self.gas,
            &self.metrics,
            &self.consolidator,
        )
        .await
        {
            error!(error = %err, "profit consolidation failed");
        }
        Ok(hash)
    }

    fn watch_users(&self) -> Vec<Address> {
        if !self.config.monitor_users.is_empty() {
            return self.config.monitor_users.clone();
        }
        self.discovered_users.read().clone()
    }

    async fn refresh_discovery(&self, block: u64) {
        let Some(discovery) = &self.discovery else {
            return;
        };
        let due = {
            let known = self.discovered_users.read();
            known.is_empty() || block % DISCOVERY_INTERVAL_BLOCKS == 0
        };
        if !due {
            return;
        }
        match discovery.fetch_borrowers(DISCOVERY_LIMIT).await {
            Ok(users) if !users.is_empty() => {
                info!(count = users.len(), "discovery refreshed watch users");
                *self.discovered_users.write() = users;
            }
            Ok(_) => debug!("discovery returned no borrowers"),
            Err(err) => debug!(error = %err, "discovery refresh failed"),
        }
    }
}
