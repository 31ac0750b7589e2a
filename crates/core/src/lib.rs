//! Core pipeline: configuration, caches, watchlist, health scanning,
//! opportunity evaluation, consolidation, and the block-driven engine.

pub mod consolidator;
pub mod decimals;
pub mod discovery;
pub mod engine;
pub mod error;
pub mod evaluator;
pub mod reserve_params;
pub mod scanner;
pub mod settings;
pub mod watchlist;

pub use consolidator::{consolidate_to_usdc, ConsolidatorConfig};
pub use decimals::DecimalsCache;
pub use discovery::SubgraphClient;
pub use engine::{Engine, EngineConfig};
pub use error::{Error, Result, SkipReason};
pub use evaluator::{Evaluator, EvaluatorConfig, LiquidationTarget, PreparedLiquidation};
pub use reserve_params::{ReserveParams, ReserveParamsCache};
pub use scanner::{HealthScanner, UserHealth};
pub use settings::Settings;
pub use watchlist::{WatchConfig, WatchEntry, WatchKey, Watchlist};
