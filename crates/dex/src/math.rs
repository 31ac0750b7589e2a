//! Constant-product math and unit helpers.

use alloy::primitives::U256;

/// V2 fee: 30 bps taken on the way in.
pub const FEE_NUMERATOR: u64 = 997;
pub const FEE_DENOMINATOR: u64 = 1000;
pub const BPS_DENOMINATOR: u64 = 10_000;

/// `out = in * 997 * reserve_out / (reserve_in * 1000 + in * 997)`.
/// Zero input or empty reserves quote zero.
pub fn v2_amount_out(amount_in: U256, reserve_in: U256, reserve_out: U256) -> U256 {
    if amount_in.is_zero() || reserve_in.is_zero() || reserve_out.is_zero() {
        return U256::ZERO;
    }
    let amount_in_with_fee = amount_in * U256::from(FEE_NUMERATOR);
    let numerator = amount_in_with_fee * reserve_out;
    let denominator = reserve_in * U256::from(FEE_DENOMINATOR) + amount_in_with_fee;
    numerator / denominator
}

pub fn clamp_slippage_bps(requested_bps: u32, max_bps: u32) -> u32 {
    requested_bps.min(max_bps)
}

/// `floor(quoted * (10000 - clamped) / 10000)`.
pub fn min_out(quoted: U256, slippage_bps: u32, max_slippage_bps: u32) -> U256 {
    let clamped = clamp_slippage_bps(slippage_bps, max_slippage_bps) as u64;
    quoted * U256::from(BPS_DENOMINATOR - clamped) / U256::from(BPS_DENOMINATOR)
}

/// `amount_in * 10000 / reserve_in`, capped at 10000.
pub fn price_impact_bps(amount_in: U256, reserve_in: U256) -> u32 {
    if amount_in.is_zero() || reserve_in.is_zero() {
        return 0;
    }
    let impact = amount_in * U256::from(BPS_DENOMINATOR) / reserve_in;
    if impact > U256::from(BPS_DENOMINATOR) {
        BPS_DENOMINATOR as u32
    } else {
        impact.to::<u32>()
    }
}

pub fn pow10(exp: u8) -> U256 {
    U256::from(10u64).pow(U256::from(exp))
}

/// Lossy conversion for USD accounting and logging only.
pub fn u256_to_f64(value: U256) -> f64 {
    if value <= U256::from(u128::MAX) {
        value.to::<u128>() as f64
    } else {
        let limbs = value.as_limbs();
        let mut out = 0.0f64;
        for (i, limb) in limbs.iter().enumerate() {
            out += (*limb as f64) * 2f64.powi(64 * i as i32);
        }
        out
    }
}

/// Token units from a fractional amount, e.g. `1.5` at 6 decimals.
pub fn units_from_f64(amount: f64, decimals: u8) -> U256 {
    if !amount.is_finite() || amount <= 0.0 {
        return U256::ZERO;
    }
    U256::from((amount * 10f64.powi(decimals as i32)) as u128)
}
