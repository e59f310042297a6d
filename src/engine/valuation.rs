//! Portfolio valuation in token1 units.
//!
//! The keeper targets stable/stable pairs, so token1 doubles as the unit
//! of account: `value = balance0 · price + balance1`. Running against a
//! non-stable pair requires injecting an external USD oracle instead of
//! this shortcut.

use alloy::primitives::U256;

use crate::math::tick_to_price;

use super::planner::PairInfo;

/// Point-in-time wallet valuation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PortfolioSnapshot {
    pub balance0: U256,
    pub balance1: U256,
    /// Price (token1 per token0) at snapshot time.
    pub price: f64,
    /// Total value expressed in token1 units.
    pub value_token1: f64,
}

impl PortfolioSnapshot {
    /// Value the wallet at the price implied by `tick`.
    pub fn at_tick(balance0: U256, balance1: U256, tick: i32, pair: &PairInfo) -> Self {
        let price = tick_to_price(tick);
        let value_token1 = portfolio_value(
            to_human(balance0, pair.decimals0),
            to_human(balance1, pair.decimals1),
            price,
        );
        Self {
            balance0,
            balance1,
            price,
            value_token1,
        }
    }
}

fn to_human(raw: U256, decimals: u8) -> f64 {
    let v: f64 = raw.try_into().map(|x: u128| x as f64).unwrap_or(f64::MAX);
    v / 10f64.powi(decimals as i32)
}

/// `balance0 · price + balance1`, with degenerate prices mapped to zero.
///
/// A zero value makes every loss gate permissive, which is the intended
/// failure mode for a bad oracle read: never trip an alarm off garbage.
pub fn portfolio_value(balance0: f64, balance1: f64, price: f64) -> f64 {
    if !price.is_finite() || price <= 0.0 {
        return 0.0;
    }
    balance0 * price + balance1
}
