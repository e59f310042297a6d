//! Financial and operational safety gates.
//!
//! Each gate is a pure decision over observed numbers; the engine wires
//! the consequences (skip, stop, emergency withdraw).

use tracing::{debug, warn};

use crate::chain::gas::{estimate_rebalance_cost_usd, GasOracle, FALLBACK_ETH_PRICE_USD};
use crate::chain::GasInfo;
use crate::math::tick_to_price;

/// Fraction of the pre-rebalance value a single rebalance may burn before
/// the keeper stops.
pub const SINGLE_REBALANCE_MAX_LOSS: f64 = 0.02;

/// Failures in a row before the engine trips to its terminal error state.
pub const MAX_CONSECUTIVE_ERRORS: u32 = 3;

/// Depeg verdict with the numbers the alert message needs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DepegAlert {
    pub current_price: f64,
    pub expected_price: f64,
    pub deviation_pct: f64,
}

/// Check the pool price against the configured expected ratio.
///
/// Returns `Some` when the deviation exceeds the threshold. Pools without
/// an `expected_price_ratio` never depeg.
pub fn check_depeg(
    tick: i32,
    expected_price_ratio: Option<f64>,
    threshold_pct: f64,
) -> Option<DepegAlert> {
    let expected = expected_price_ratio?;
    if !expected.is_finite() || expected <= 0.0 {
        return None;
    }
    let current = tick_to_price(tick);
    let deviation_pct = (current - expected).abs() / expected * 100.0;
    if deviation_pct > threshold_pct {
        Some(DepegAlert {
            current_price: current,
            expected_price: expected,
            deviation_pct,
        })
    } else {
        None
    }
}

/// Whether one rebalance lost more than the fixed per-rebalance budget.
pub fn single_rebalance_loss_exceeded(pre_value: f64, post_value: f64) -> bool {
    pre_value > 0.0 && post_value < pre_value * (1.0 - SINGLE_REBALANCE_MAX_LOSS)
}

/// Whether the portfolio fell past the configured cumulative loss limit
/// relative to its value at first mint.
pub fn portfolio_loss_exceeded(post_value: f64, initial_value: f64, max_loss_pct: f64) -> bool {
    initial_value > 0.0 && post_value < initial_value * (1.0 - max_loss_pct / 100.0)
}

/// Consecutive-failure budget around chain-writing operations.
#[derive(Debug, Clone, Default)]
pub struct ErrorBudget {
    consecutive: u32,
}

impl ErrorBudget {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> u32 {
        self.consecutive
    }

    /// Record a failure. Returns `true` when the budget is exhausted and
    /// the engine must trip.
    pub fn record_failure(&mut self) -> bool {
        self.consecutive += 1;
        self.consecutive >= MAX_CONSECUTIVE_ERRORS
    }

    /// Any success resets the streak.
    pub fn reset(&mut self) {
        self.consecutive = 0;
    }
}

/// Gas gate outcome for one rebalance attempt.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GasGateOutcome {
    pub proceed: bool,
    pub cost_usd: f64,
    pub spike: bool,
}

/// Evaluate the gas gate and fold the reading into the EMA baseline.
///
/// A spike or an over-budget estimate skips the rebalance only while the
/// position is still in range; once the price has left the bands, waiting
/// for cheap gas means quoting a stale range, so the rebalance proceeds
/// regardless. Trigger-band entries are treated as out-of-range by the
/// caller.
pub fn evaluate_gas_gate(
    oracle: &mut GasOracle,
    info: GasInfo,
    eth_price_usd: Option<f64>,
    max_gas_cost_usd: f64,
    position_in_range: bool,
) -> GasGateOutcome {
    oracle.observe(&info);
    let spike = oracle.is_spike(info.gas_price_gwei);
    let eth_price = eth_price_usd.unwrap_or(FALLBACK_ETH_PRICE_USD);
    let cost_usd = estimate_rebalance_cost_usd(info.gas_price_gwei, eth_price);
    let over_budget = cost_usd > max_gas_cost_usd;

    if (spike || over_budget) && position_in_range {
        warn!(
            gwei = info.gas_price_gwei,
            cost_usd,
            max_gas_cost_usd,
            spike,
            "gas gate: skipping in-range rebalance"
        );
        return GasGateOutcome {
            proceed: false,
            cost_usd,
            spike,
        };
    }
    if spike || over_budget {
        warn!(
            gwei = info.gas_price_gwei,
            cost_usd, spike, "gas expensive but position out of range, proceeding"
        );
    } else {
        debug!(gwei = info.gas_price_gwei, cost_usd, "gas gate clear");
    }
    GasGateOutcome {
        proceed: true,
        cost_usd,
        spike,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_depeg_requires_configured_ratio() {
        assert_eq!(check_depeg(600, None, 5.0), None);
    }

    #[test]
    fn test_depeg_fires_past_threshold() {
        // tick 600 → price ≈ 1.0618, deviation ≈ 6.2% > 5%.
        let alert = check_depeg(600, Some(1.0), 5.0).unwrap();
        assert!((alert.current_price - 1.0618).abs() < 0.001);
        assert!(alert.deviation_pct > 5.0 && alert.deviation_pct < 7.0);
    }

    #[test]
    fn test_depeg_quiet_inside_threshold() {
        // tick 100 → price ≈ 1.01, deviation ≈ 1%.
        assert_eq!(check_depeg(100, Some(1.0), 5.0), None);
    }

    #[test]
    fn test_depeg_symmetric_below_peg() {
        let alert = check_depeg(-600, Some(1.0), 5.0).unwrap();
        assert!(alert.current_price < 1.0);
        assert!(alert.deviation_pct > 5.0);
    }

    #[test]
    fn test_single_rebalance_loss_boundary() {
        assert!(!single_rebalance_loss_exceeded(100.0, 98.5));
        assert!(!single_rebalance_loss_exceeded(100.0, 98.0));
        assert!(single_rebalance_loss_exceeded(100.0, 97.9));
        // Zero pre-value (bad oracle read) never fires.
        assert!(!single_rebalance_loss_exceeded(0.0, 0.0));
    }

    #[test]
    fn test_portfolio_loss_boundary() {
        assert!(!portfolio_loss_exceeded(91.0, 100.0, 10.0));
        assert!(portfolio_loss_exceeded(89.9, 100.0, 10.0));
        assert!(!portfolio_loss_exceeded(50.0, 0.0, 10.0));
    }

    #[test]
    fn test_error_budget_trips_at_three() {
        let mut budget = ErrorBudget::new();
        assert!(!budget.record_failure());
        assert!(!budget.record_failure());
        assert!(budget.record_failure());
        assert_eq!(budget.count(), 3);
    }

    #[test]
    fn test_error_budget_reset_on_success() {
        let mut budget = ErrorBudget::new();
        budget.record_failure();
        budget.record_failure();
        budget.reset();
        assert_eq!(budget.count(), 0);
        assert!(!budget.record_failure());
    }

    #[test]
    fn test_gas_gate_skips_only_in_range() {
        let mut oracle = GasOracle::default();
        let pricey = GasInfo {
            gas_price_gwei: 100_000.0,
            is_eip1559: true,
        };
        // Out of range: proceed despite absurd cost.
        let out = evaluate_gas_gate(&mut oracle, pricey, Some(4_000.0), 5.0, false);
        assert!(out.proceed);
        assert!(out.cost_usd > 5.0);

        // In range: same cost skips.
        let gated = evaluate_gas_gate(&mut oracle, pricey, Some(4_000.0), 5.0, true);
        assert!(!gated.proceed);
    }

    #[test]
    fn test_gas_gate_spike_detection_uses_baseline() {
        let mut oracle = GasOracle::default();
        let calm = GasInfo {
            gas_price_gwei: 20.0,
            is_eip1559: true,
        };
        evaluate_gas_gate(&mut oracle, calm, Some(4_000.0), 100.0, true);
        let spiky = GasInfo {
            gas_price_gwei: 500.0,
            is_eip1559: true,
        };
        let out = evaluate_gas_gate(&mut oracle, spiky, Some(4_000.0), 100_000.0, true);
        assert!(out.spike);
        assert!(!out.proceed, "spike alone skips in-range rebalances");
    }
}
