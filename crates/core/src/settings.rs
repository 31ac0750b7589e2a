//! Environment-driven configuration.
//!
//! `DRY_RUN=true` targets a local mainnet fork (the `FORK_*` keys) so the
//! whole pipeline can run end-to-end without broadcasting; mainnet mode
//! prefers `PUBLIC_RPC_URL` and otherwise uses the provider-specific
//! endpoint trio. Everything else has a default.

use std::time::Duration;

use alloy::primitives::Address;
use liquidator_chain::RelayEndpoint;
use liquidator_dex::polygon;

use crate::error::{Error, Result};
use crate::reserve_params::ReserveParams;

#[derive(Debug, Clone)]
pub struct Settings {
    pub dry_run: bool,
    pub chain_id: u64,
    pub rpc_url: String,
    pub ws_url: Option<String>,
    pub auth_header: Option<String>,
    pub private_tx_url: Option<String>,

    pub executor_address: Address,
    pub aave_pool: Address,
    pub multicall_address: Address,
    pub subgraph_url: Option<String>,

    pub private_key: String,
    pub wallet_address: Option<Address>,
    pub liq_arb_selector: Option<String>,
    pub liq_batch_selector: Option<String>,

    pub max_slippage_bps: u32,
    pub split_trigger_usd: f64,
    pub min_liq_usd: f64,
    pub max_liq_usd: f64,
    pub flash_premium_bps: u32,
    pub liquidation_gas_limit: u64,

    pub rbf_bump_factor: f64,
    pub rbf_interval: Duration,
    pub rbf_max_bumps: u32,
    pub receipt_timeout: Duration,
    pub submit_private: bool,
    pub relays: Vec<RelayEndpoint>,

    pub max_concurrency: usize,
    pub monitor_users: Vec<Address>,
    pub debt_assets: Vec<Address>,
    pub collateral_assets: Vec<Address>,

    pub watch_buffer: f64,
    pub watch_buffer_min: f64,
    pub watch_buffer_max: f64,
    pub watch_max_prestage: usize,

    pub price_overrides: Vec<(Address, f64)>,
    pub reserve_param_overrides: Vec<(Address, ReserveParams)>,

    pub profit_tokens: Vec<Address>,
    pub profit_min_swap_usd: f64,

    pub metrics_path: String,
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        let dry_run = bool_or("DRY_RUN", true);

        let (chain_id, rpc_url, auth_header, private_tx_url, executor_address) = if dry_run {
            // Fork mode mirrors mainnet by default.
            let rpc_url = required("FORK_RPC_URL")?;
            let executor = var("FORK_EXECUTOR_ADDRESS")
                .or_else(|| var("EXECUTOR_ADDRESS"))
                .ok_or_else(|| {
                    Error::Config("FORK_EXECUTOR_ADDRESS or EXECUTOR_ADDRESS required".into())
                })?;
            (
                u64_or("FORK_CHAIN_ID", polygon::CHAIN_ID),
                rpc_url,
                var("FORK_AUTH_HEADER"),
                None,
                parse_address("executor", &executor)?,
            )
        } else {
            let (rpc_url, auth, private) = match var("PUBLIC_RPC_URL") {
                Some(url) => (url, None, None),
                None => (
                    required("NODIES_RPC_URL")?,
                    var("NODIES_AUTH_HEADER"),
                    var("NODIES_PRIVATE_TX_URL"),
                ),
            };
            (
                polygon::CHAIN_ID,
                rpc_url,
                auth,
                private,
                parse_address("executor", &required("EXECUTOR_ADDRESS")?)?,
            )
        };

        let relays = parse_relays(
            &var("RELAY_URLS").unwrap_or_default(),
            &var("RELAY_AUTH_HEADERS").unwrap_or_default(),
        );

        Ok(Self {
            dry_run,
            chain_id,
            rpc_url,
            ws_url: var("WEBSOCKET_RPC_URL"),
            auth_header,
            private_tx_url,
            executor_address,
            aave_pool: address_or("AAVE_POOL", polygon::AAVE_V3_POOL)?,
            multicall_address: address_or("MULTICALL_ADDRESS", polygon::MULTICALL3)?,
            subgraph_url: var("AAVE_SUBGRAPH_URL").filter(|s| !s.is_empty()),
            private_key: required("PRIVATE_KEY")?,
            wallet_address: var("WALLET_ADDRESS")
                .map(|s| parse_address("WALLET_ADDRESS", &s))
                .transpose()?,
            liq_arb_selector: var("EXECUTOR_LIQ_ARB_SELECTOR"),
            liq_batch_selector: var("EXECUTOR_LIQ_BATCH_SELECTOR"),
            max_slippage_bps: u64_or("MAX_SLIPPAGE_BPS", 50) as u32,
            split_trigger_usd: f64_or("SPLIT_TRIGGER_USD", 15_000.0),
            min_liq_usd: f64_or("MIN_LIQ_USD", 100.0),
            max_liq_usd: f64_or("MAX_LIQ_USD", 51_000.0),
            flash_premium_bps: u64_or("FLASH_PREMIUM_BPS", 9) as u32,
            liquidation_gas_limit: u64_or("LIQUIDATION_GAS_LIMIT", 1_900_000),
            rbf_bump_factor: f64_or("RBF_BUMP_FACTOR", 1.2),
            rbf_interval: Duration::from_secs(u64_or("RBF_INTERVAL_SEC", 4)),
            rbf_max_bumps: u64_or("RBF_MAX_BUMPS", 3) as u32,
            receipt_timeout: Duration::from_millis(u64_or("RECEIPT_TIMEOUT_MS", 3_000)),
            submit_private: bool_or("SUBMIT_PRIVATE", false),
            relays,
            max_concurrency: u64_or("MAX_CONCURRENCY", 2).max(1) as usize,
            monitor_users: parse_address_list(&var("MONITOR_USERS").unwrap_or_default()),
            debt_assets: parse_address_list(&var("DEBT_ASSETS").unwrap_or_default()),
            collateral_assets: parse_address_list(&var("COLLATERAL_ASSETS").unwrap_or_default()),
            watch_buffer: f64_or("WATCH_BUFFER", 0.05),
            watch_buffer_min: f64_or("WATCH_BUFFER_MIN", 0.01),
            watch_buffer_max: f64_or("WATCH_BUFFER_MAX", 0.10),
            watch_max_prestage: u64_or("WATCH_MAX_PRESTAGE", 32) as usize,
            price_overrides: parse_price_overrides(&var("PRICE_USD_OVERRIDES").unwrap_or_default()),
            reserve_param_overrides: crate::reserve_params::parse_overrides(
                &var("RESERVE_PARAM_OVERRIDES").unwrap_or_default(),
            ),
            profit_tokens: parse_address_list(&var("PROFIT_TOKENS").unwrap_or_default()),
            profit_min_swap_usd: f64_or("PROFIT_MIN_SWAP_USD", 50.0),
            metrics_path: var("METRICS_PATH").unwrap_or_else(|| "metrics.jsonl".to_string()),
        })
    }
}

fn var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|s| !s.trim().is_empty())
}

fn required(key: &str) -> Result<String> {
    var(key).ok_or_else(|| Error::Config(format!("missing required env {key}")))
}

fn bool_or(key: &str, default: bool) -> bool {
    match var(key) {
        Some(raw) => matches!(raw.to_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        None => default,
    }
}

fn u64_or(key: &str, default: u64) -> u64 {
    var(key).and_then(|s| s.parse().ok()).unwrap_or(default)
}

fn f64_or(key: &str, default: f64) -> f64 {
    var(key).and_then(|s| s.parse().ok()).unwrap_or(default)
}

fn parse_address(what: &str, raw: &str) -> Result<Address> {
    raw.trim()
        .parse()
        .map_err(|e| Error::Config(format!("invalid {what} address {raw}: {e}")))
}

fn address_or(key: &str, default: Address) -> Result<Address> {
    match var(key) {
        Some(raw) => parse_address(key, &raw),
        None => Ok(default),
    }
}

/// Comma-separated addresses; malformed entries are dropped.
pub fn parse_address_list(raw: &str) -> Vec<Address> {
    raw.split(',')
        .filter_map(|item| item.trim().parse().ok())
        .collect()
}

/// `token:price,token:price` pairs.
pub fn parse_price_overrides(raw: &str) -> Vec<(Address, f64)> {
    raw.split(',')
        .filter_map(|item| {
            let (token, price) = item.trim().split_once(':')?;
            Some((token.trim().parse().ok()?, price.trim().parse().ok()?))
        })
        .collect()
}

/// Pair relay URLs with their auth headers: one header per relay, or a
/// single shared header, or none.
pub fn parse_relays(urls: &str, auth_headers: &str) -> Vec<RelayEndpoint> {
    let urls: Vec<&str> = urls
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();
    let auths: Vec<&str> = auth_headers
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();
    urls.iter()
        .enumerate()
        .map(|(index, url)| RelayEndpoint {
            url: url.to_string(),
            auth_header: match auths.len() {
                0 => None,
                n if n == urls.len() => Some(auths[index].to_string()),
                _ => Some(auths[0].to_string()),
            },
        })
        .collect()
}
