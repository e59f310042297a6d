//! Gas-price baseline tracking and rebalance cost estimation.

use tracing::debug;

use super::GasInfo;

/// Fixed gas budget for one full rebalance cycle (remove + swap + mint),
/// in gas units.
pub const GAS_BUDGET: u64 = 800_000;

/// Fallback ETH price when the config provides none. Deliberately
/// conservative — overestimating cost only makes the gate stricter.
pub const FALLBACK_ETH_PRICE_USD: f64 = 4_000.0;

/// EMA-baseline gas oracle.
///
/// Tracks a slow exponential moving average of observed gas prices
/// (weights 0.95 old / 0.05 new) and flags readings that jump past a
/// multiple of the baseline as spikes.
#[derive(Debug, Clone)]
pub struct GasOracle {
    baseline_gwei: Option<f64>,
    spike_multiplier: f64,
}

impl Default for GasOracle {
    fn default() -> Self {
        Self::new(10.0)
    }
}

impl GasOracle {
    pub fn new(spike_multiplier: f64) -> Self {
        Self {
            baseline_gwei: None,
            spike_multiplier,
        }
    }

    /// Fold a fresh reading into the baseline. The first observation seeds
    /// the baseline directly.
    pub fn observe(&mut self, info: &GasInfo) {
        let gwei = info.gas_price_gwei;
        if !gwei.is_finite() || gwei <= 0.0 {
            return;
        }
        let next = match self.baseline_gwei {
            Some(base) => base * 0.95 + gwei * 0.05,
            None => gwei,
        };
        debug!(
            gwei,
            baseline = next,
            eip1559 = info.is_eip1559,
            "gas observation"
        );
        self.baseline_gwei = Some(next);
    }

    /// Whether `gwei` is a spike relative to the baseline. Before the
    /// first observation nothing counts as a spike.
    pub fn is_spike(&self, gwei: f64) -> bool {
        match self.baseline_gwei {
            Some(base) => gwei > base * self.spike_multiplier,
            None => false,
        }
    }

    pub fn baseline_gwei(&self) -> Option<f64> {
        self.baseline_gwei
    }
}

/// USD cost estimate of one rebalance at the given gas price.
pub fn estimate_rebalance_cost_usd(gas_price_gwei: f64, eth_price_usd: f64) -> f64 {
    gas_price_gwei * 1e-9 * GAS_BUDGET as f64 * eth_price_usd
}
