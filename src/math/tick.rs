//! Tick ↔ price conversion and tick-spacing alignment.

use crate::errors::LayoutError;

/// Lowest tick the AMM supports. `1.0001^MIN_TICK` is the smallest
/// representable price ratio.
pub const MIN_TICK: i32 = -887272;
/// Highest tick the AMM supports.
pub const MAX_TICK: i32 = 887272;

/// Price ratio at a tick: `1.0001^tick`.
///
/// This is the raw-unit ratio (token1 per token0 before decimal scaling).
pub fn tick_to_price(tick: i32) -> f64 {
    1.0001_f64.powi(tick)
}

/// Inverse of [`tick_to_price`]: the tick whose price is closest below
/// `price`. Panics never; returns a clamped tick for degenerate input.
pub fn price_to_tick(price: f64) -> i32 {
    if !price.is_finite() || price <= 0.0 {
        return 0;
    }
    let t = price.ln() / 1.0001_f64.ln();
    (t.floor() as i32).clamp(MIN_TICK, MAX_TICK)
}

/// Tick spacing for a fee tier: 1 / 10 / 60 / 200 for 0.01% / 0.05% /
/// 0.3% / 1% pools.
pub fn fee_to_tick_spacing(fee: u32) -> Result<i32, LayoutError> {
    match fee {
        100 => Ok(1),
        500 => Ok(10),
        3000 => Ok(60),
        10000 => Ok(200),
        other => Err(LayoutError::UnknownFeeTier(other)),
    }
}

/// The aligned tick bounds usable at a given spacing: the innermost
/// multiples of `spacing` inside `[MIN_TICK, MAX_TICK]`.
pub fn usable_tick_bounds(spacing: i32) -> (i32, i32) {
    let max = (MAX_TICK / spacing) * spacing;
    (-max, max)
}

/// Round a tick to the nearest multiple of `spacing`, ties away from zero,
/// clamped into the usable range. Matches the AMM's `nearestUsableTick`
/// convention.
pub fn align_tick(tick: i32, spacing: i32) -> i32 {
    debug_assert!(spacing > 0);
    let spacing_i64 = spacing as i64;
    let tick_i64 = tick as i64;

    let quot = tick_i64 / spacing_i64;
    let rem = tick_i64 % spacing_i64;
    let rounded = if 2 * rem.abs() >= spacing_i64 {
        (quot + rem.signum()) * spacing_i64
    } else {
        quot * spacing_i64
    };

    let (lo, hi) = usable_tick_bounds(spacing);
    (rounded as i32).clamp(lo, hi)
}
