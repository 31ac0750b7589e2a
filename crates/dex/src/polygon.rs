//! Polygon mainnet deployment addresses.

use alloy::primitives::{address, Address};

pub const CHAIN_ID: u64 = 137;

/// Aave v3 pool proxy.
pub const AAVE_V3_POOL: Address = address!("0x794a61358d6845594f94dc1db02a252b5b4814ad");

pub const QUICKSWAP_ROUTER: Address = address!("0xa5e0829caced8ffdd4de3c43696c57f7d7a678ff");
pub const QUICKSWAP_FACTORY: Address = address!("0x5757371414417b8c6caad45baef941abc7d3ab32");
pub const SUSHISWAP_ROUTER: Address = address!("0x1b02da8cb0d097eb8d57a175b88c7d8b47997506");
pub const SUSHISWAP_FACTORY: Address = address!("0xc35dadb65012ec5796536bd9864ede8773abc74c");

pub const WMATIC: Address = address!("0x0d500b1d8e8ef31e21c99d1db9a6444d3adf1270");
pub const USDC: Address = address!("0x2791bca1f2de4661ed88a30c99a7a9449aa84174");
pub const USDC_DECIMALS: u8 = 6;

/// Universal Multicall3 deployment.
pub const MULTICALL3: Address = address!("0xca11bde05977b3631167028862be2a173976ca11");
