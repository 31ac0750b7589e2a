//! Core error taxonomy layered over the chain errors.

use serde::Serialize;
use thiserror::Error;

/// Why an opportunity was abandoned. These values land verbatim in the
/// `skip_reason` metrics events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    InsufficientLiquidity,
    ProfitGuard,
    BelowMinimum,
    SandwichRisk,
}

impl SkipReason {
    pub fn as_str(self) -> &'static str {
        match self {
            SkipReason::InsufficientLiquidity => "insufficient_liquidity",
            SkipReason::ProfitGuard => "profit_guard",
            SkipReason::BelowMinimum => "below_minimum",
            SkipReason::SandwichRisk => "sandwich_risk",
        }
    }
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum Error {
    /// Missing or malformed configuration; terminal at startup.
    #[error("config: {0}")]
    Config(String),

    /// The guard rejected this opportunity; the worker moves on.
    #[error("skipped: {0}")]
    Profitability(SkipReason),

    /// An invariant broke; the process must not continue.
    #[error("fatal: {0}")]
    Fatal(String),

    #[error(transparent)]
    Chain(#[from] liquidator_chain::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
