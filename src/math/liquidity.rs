//! Unit-liquidity amount formulas.
//!
//! Mirrors the AMM's `getAmount0Delta` / `getAmount1Delta` for `L = 1`,
//! in floating point. The planner only needs the token0:token1 *ratio* a
//! target range wants, so f64 precision is sufficient here; exact U256
//! arithmetic stays on-chain.

/// Token amounts one unit of liquidity locks in `[tick_lower, tick_upper)`
/// when the pool sits at `current_tick`.
///
/// Returns `(amount0, amount1)` in raw tick-space units:
/// - range entirely above price → all token0
/// - range entirely below price → all token1
/// - straddling → both, split at the current sqrt price
pub fn amounts_for_unit_liquidity(current_tick: i32, tick_lower: i32, tick_upper: i32) -> (f64, f64) {
    debug_assert!(tick_lower < tick_upper);

    let sqrt_p = 1.0001_f64.powf(current_tick as f64 / 2.0);
    let sqrt_a = 1.0001_f64.powf(tick_lower as f64 / 2.0);
    let sqrt_b = 1.0001_f64.powf(tick_upper as f64 / 2.0);

    if sqrt_p <= sqrt_a {
        // Price below the range: position is all token0.
        ((sqrt_b - sqrt_a) / (sqrt_a * sqrt_b), 0.0)
    } else if sqrt_p >= sqrt_b {
        // Price above the range: position is all token1.
        (0.0, sqrt_b - sqrt_a)
    } else {
        (
            (sqrt_b - sqrt_p) / (sqrt_p * sqrt_b),
            sqrt_p - sqrt_a,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_above_price_is_all_token0() {
        let (a0, a1) = amounts_for_unit_liquidity(0, 100, 200);
        assert!(a0 > 0.0);
        assert_eq!(a1, 0.0);
    }

    #[test]
    fn test_range_below_price_is_all_token1() {
        let (a0, a1) = amounts_for_unit_liquidity(300, 100, 200);
        assert_eq!(a0, 0.0);
        assert!(a1 > 0.0);
    }

    #[test]
    fn test_straddling_range_holds_both() {
        let (a0, a1) = amounts_for_unit_liquidity(150, 100, 200);
        assert!(a0 > 0.0);
        assert!(a1 > 0.0);
    }

    #[test]
    fn test_amounts_shrink_as_price_crosses() {
        // As the price climbs through the range, token0 drains into token1.
        let (a0_low, a1_low) = amounts_for_unit_liquidity(110, 100, 200);
        let (a0_high, a1_high) = amounts_for_unit_liquidity(190, 100, 200);
        assert!(a0_high < a0_low);
        assert!(a1_high > a1_low);
    }

    #[test]
    fn test_centered_range_splits_evenly_in_value() {
        // At tick 0 with a symmetric range, value in each token matches.
        let (a0, a1) = amounts_for_unit_liquidity(0, -100, 100);
        let value0 = a0 * 1.0; // price at tick 0 is 1
        assert!((value0 - a1).abs() / a1 < 0.01);
    }
}
