//! Liquidation bot entry point.
//!
//! Wires the chain, dex and core layers together from environment
//! configuration, then hands control to the block-driven engine. Any
//! initialization failure exits with status 1.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use liquidator_chain::{
    executor_abi, BlockWatcher, GasOracle, MetricsLogger, NonceManager, ReqwestTransport,
    RpcClient, SubmitConfig, Submitter, WatcherConfig, Wallet,
};
use liquidator_core::{
    ConsolidatorConfig, DecimalsCache, Engine, EngineConfig, Evaluator, EvaluatorConfig,
    HealthScanner, ReserveParamsCache, Settings, SubgraphClient, WatchConfig, Watchlist,
};
use liquidator_dex::{polygon, DexQuoter, UsdPriceOracle, Venue};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("info,liquidator_core=debug,liquidator_chain=debug")
        }))
        .init();

    if let Err(err) = run().await {
        tracing::error!(error = %err, "startup failed");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let settings = Settings::from_env().context("loading configuration")?;
    info!(
        dry_run = settings.dry_run,
        chain_id = settings.chain_id,
        rpc = %settings.rpc_url,
        executor = %settings.executor_address,
        "starting liquidation bot"
    );

    executor_abi::initialize_selectors(
        settings.liq_arb_selector.as_deref(),
        settings.liq_batch_selector.as_deref(),
    )
    .context("executor selectors")?;

    let metrics = MetricsLogger::to_file(&settings.metrics_path).context("metrics sink")?;
    let http = Arc::new(ReqwestTransport::new().context("http client")?);
    let rpc = Arc::new(RpcClient::new(
        http.clone(),
        settings.rpc_url.clone(),
        settings.auth_header.as_deref(),
        settings.private_tx_url.clone(),
    ));

    let wallet = {
        let wallet = Wallet::from_private_key(&settings.private_key).context("signer")?;
        match settings.wallet_address {
            Some(address) => Arc::new(wallet.with_address_override(address)),
            None => Arc::new(wallet),
        }
    };
    info!(address = %format!("{:#x}", wallet.address()), "signer ready");

    let nonces = Arc::new(
        NonceManager::from_pending(&rpc, wallet.address())
            .await
            .context("initial nonce")?,
    );
    info!(nonce = nonces.current(), "pending nonce resolved");

    let venues = [
        Venue {
            name: "Quickswap",
            router: polygon::QUICKSWAP_ROUTER,
            factory: polygon::QUICKSWAP_FACTORY,
        },
        Venue {
            name: "Sushiswap",
            router: polygon::SUSHISWAP_ROUTER,
            factory: polygon::SUSHISWAP_FACTORY,
        },
    ];
    let quoter = Arc::new(DexQuoter::new(rpc.clone(), venues));
    let prices = Arc::new(
        UsdPriceOracle::new(polygon::USDC, polygon::USDC_DECIMALS, polygon::WMATIC)
            .with_overrides(settings.price_overrides.clone()),
    );
    let decimals = Arc::new(DecimalsCache::new());
    let reserve_params = Arc::new(
        ReserveParamsCache::new().with_overrides(settings.reserve_param_overrides.clone()),
    );
    let gas = Arc::new(GasOracle::new(rpc.clone(), metrics.clone()));

    let evaluator = Evaluator::new(
        rpc.clone(),
        quoter.clone(),
        decimals.clone(),
        reserve_params,
        prices.clone(),
        gas.clone(),
        metrics.clone(),
        EvaluatorConfig {
            executor_address: settings.executor_address,
            profit_receiver: wallet.address(),
            wrapped_native: polygon::WMATIC,
            usdc: polygon::USDC,
            min_liq_usd: settings.min_liq_usd,
            max_liq_usd: settings.max_liq_usd,
            split_trigger_usd: settings.split_trigger_usd,
            max_slippage_bps: settings.max_slippage_bps,
            flash_premium_bps: settings.flash_premium_bps,
            liquidation_gas_limit: settings.liquidation_gas_limit,
        },
    );

    let submitter = Submitter::new(
        rpc.clone(),
        http.clone(),
        wallet.clone(),
        settings.relays.clone(),
        SubmitConfig {
            bump_factor: settings.rbf_bump_factor,
            bump_interval: settings.rbf_interval,
            max_bumps: settings.rbf_max_bumps,
            receipt_timeout: settings.receipt_timeout,
            submit_private: settings.submit_private,
            dry_run: settings.dry_run,
        },
        metrics.clone(),
    );

    let scanner = HealthScanner::new(rpc.clone(), settings.multicall_address, settings.aave_pool);
    let watchlist = Watchlist::new(WatchConfig {
        default_buffer: settings.watch_buffer,
        buffer_min: settings.watch_buffer_min,
        buffer_max: settings.watch_buffer_max,
        max_prestage: settings.watch_max_prestage,
    });
    let discovery = settings
        .subgraph_url
        .as_ref()
        .map(|url| SubgraphClient::new(http.clone(), url.clone()));

    let engine = Arc::new(Engine::new(
        rpc.clone(),
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
        ConsolidatorConfig {
            tokens: settings.profit_tokens.clone(),
            min_swap_usd: settings.profit_min_swap_usd,
            max_slippage_bps: settings.max_slippage_bps,
            usdc: polygon::USDC,
            chain_id: settings.chain_id,
            submit_private: settings.submit_private,
            dry_run: settings.dry_run,
        },
        EngineConfig {
            chain_id: settings.chain_id,
            executor_address: settings.executor_address,
            debt_assets: settings.debt_assets.clone(),
            collateral_assets: settings.collateral_assets.clone(),
            monitor_users: settings.monitor_users.clone(),
            min_liq_usd: settings.min_liq_usd,
            max_slippage_bps: settings.max_slippage_bps,
            liquidation_gas_limit: settings.liquidation_gas_limit,
            max_concurrency: settings.max_concurrency,
        },
    ));

    let watcher = BlockWatcher::new(
        rpc,
        WatcherConfig {
            ws_url: settings.ws_url.clone(),
            ..Default::default()
        },
    );
    let shutdown = watcher.shutdown_handle();
    let blocks = watcher.spawn(64);
    info!("block watcher started");

    tokio::select! {
        result = engine.run(blocks) => {
            result.context("engine loop")?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received");
            shutdown.store(false, std::sync::atomic::Ordering::Relaxed);
        }
    }
    Ok(())
}
