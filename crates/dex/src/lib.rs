//! V2 exchange layer: pair/reserve caches, constant-product quoting with
//! router fallback, split planning, and DEX-based USD pricing.

pub mod math;
pub mod polygon;
pub mod price;
pub mod reserves;
pub mod router;

pub use price::UsdPriceOracle;
pub use reserves::{PairReserves, ReserveStore};
pub use router::{swap_calldata, DexQuoter, RouteLeg, RoutePlan, Venue, SPLIT_RATIOS};
