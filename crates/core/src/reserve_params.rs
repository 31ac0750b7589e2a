//! Per-asset liquidation parameters.
//!
//! There is no on-chain fallback here: values come from configuration
//! overrides, and anything unconfigured uses protocol-typical defaults.
//! The first time a default is served for an asset a warning names it,
//! because running real liquidations on assumed parameters is an operator
//! decision, not a silent one.

use alloy::primitives::Address;
use dashmap::DashMap;
use tracing::warn;

/// `close_factor_bps` in (0, 10000]; `liquidation_bonus_bps` in
/// [10000, 20000].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReserveParams {
    pub close_factor_bps: u16,
    pub liquidation_bonus_bps: u16,
}

impl Default for ReserveParams {
    fn default() -> Self {
        Self {
            close_factor_bps: 5_000,
            liquidation_bonus_bps: 10_500,
        }
    }
}

impl ReserveParams {
    pub fn is_valid(&self) -> bool {
        (1..=10_000).contains(&self.close_factor_bps)
            && (10_000..=20_000).contains(&self.liquidation_bonus_bps)
    }
}

#[derive(Default)]
pub struct ReserveParamsCache {
    overrides: DashMap<Address, ReserveParams>,
    defaulted: DashMap<Address, ()>,
}

impl ReserveParamsCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_overrides(self, overrides: impl IntoIterator<Item = (Address, ReserveParams)>) -> Self {
        for (token, params) in overrides {
            self.overrides.insert(token, params);
        }
        self
    }

    pub fn set_override(&self, token: Address, params: ReserveParams) {
        self.overrides.insert(token, params);
    }

    pub fn get(&self, token: Address) -> ReserveParams {
        if let Some(params) = self.overrides.get(&token) {
            return *params;
        }
        if self.defaulted.insert(token, ()).is_none() {
            warn!(
                token = %token,
                "no reserve params configured, using close_factor=5000bps bonus=10500bps"
            );
        }
        ReserveParams::default()
    }
}

/// `token:bonus_bps:close_factor_bps` CSV. Entries that fail to parse or
/// violate the documented ranges are dropped with a warning.
pub fn parse_overrides(raw: &str) -> Vec<(Address, ReserveParams)> {
    raw.split(',')
        .filter_map(|entry| {
            let mut parts = entry.trim().split(':');
            let token: Address = parts.next()?.trim().parse().ok()?;
            let bonus: u16 = parts.next()?.trim().parse().ok()?;
            let close: u16 = parts.next()?.trim().parse().ok()?;
            let params = ReserveParams {
                close_factor_bps: close,
                liquidation_bonus_bps: bonus,
            };
            if !params.is_valid() {
                warn!(token = %token, ?params, "reserve param override out of range, dropped");
                return None;
            }
            Some((token, params))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const USDC: &str = "0x2791Bca1f2de4661ED88A30C99A7a9449Aa84174";

    #[test]
    fn override_beats_default() {
        let token: Address = USDC.parse().unwrap();
        let cache = ReserveParamsCache::new().with_overrides([(
            token,
            ReserveParams {
                close_factor_bps: 10_000,
                liquidation_bonus_bps: 11_000,
            },
        )]);

        assert_eq!(cache.get(token).close_factor_bps, 10_000);
        assert_eq!(cache.get(Address::repeat_byte(0x01)), ReserveParams::default());
    }

    #[test]
    fn out_of_range_overrides_are_dropped() {
        let parsed = parse_overrides(&format!("{USDC}:10500:5000"));
        assert_eq!(parsed.len(), 1);

        // Bonus below par and close factor of zero are both invalid.
        assert!(parse_overrides(&format!("{USDC}:9000:5000")).is_empty());
        assert!(parse_overrides(&format!("{USDC}:10500:0")).is_empty());
        assert!(parse_overrides("garbage").is_empty());
    }
}
