//! Swap planning: which token to sell, and how much, so the wallet can
//! fund a target band.
//!
//! Two planners live here. [`plan_swap_for_target`] is the general one: it
//! compares the wallet's token split against the split the target range
//! wants and swaps the excess side. [`plan_band_swap`] is the short-circuit
//! the rebalance path uses: dissolving the band opposite the drift yields
//! exactly the wrong-side token, so the whole balance of that token is
//! swapped.

use alloy::primitives::{Address, U256};

use crate::math::{amounts_for_unit_liquidity, TickRange};

use super::ledger::Direction;

/// Ignore imbalances smaller than this share of the portfolio.
const SHARE_DEAD_BAND: f64 = 0.01;

/// A concrete swap instruction for the router.
#[derive(Debug, Clone, PartialEq)]
pub struct SwapPlan {
    pub token_in: Address,
    pub token_out: Address,
    pub amount_in: U256,
}

/// Token metadata the planners need to reason about raw balances.
#[derive(Debug, Clone, Copy)]
pub struct PairInfo {
    pub token0: Address,
    pub token1: Address,
    pub decimals0: u8,
    pub decimals1: u8,
}

impl PairInfo {
    fn scale0(&self) -> f64 {
        10f64.powi(self.decimals0 as i32)
    }

    fn scale1(&self) -> f64 {
        10f64.powi(self.decimals1 as i32)
    }
}

fn u256_to_f64(v: U256) -> f64 {
    v.try_into().map(|x: u128| x as f64).unwrap_or(f64::MAX)
}

fn f64_to_u256(v: f64) -> U256 {
    if !v.is_finite() || v <= 0.0 {
        return U256::ZERO;
    }
    U256::from(v as u128)
}

/// Plan the swap that moves the wallet toward the token split a target
/// range wants at the current price.
///
/// Returns `None` when no swap is needed: the split is already within one
/// percentage point of ideal, or the computed amount rounds to zero.
pub fn plan_swap_for_target(
    current_tick: i32,
    target: TickRange,
    balance0: U256,
    balance1: U256,
    pair: &PairInfo,
) -> Option<SwapPlan> {
    // Range entirely above the price wants only token0; entirely below
    // wants only token1. Swap the full balance of the useless side.
    if current_tick < target.lower {
        if balance1.is_zero() {
            return None;
        }
        return Some(SwapPlan {
            token_in: pair.token1,
            token_out: pair.token0,
            amount_in: balance1,
        });
    }
    if current_tick >= target.upper {
        if balance0.is_zero() {
            return None;
        }
        return Some(SwapPlan {
            token_in: pair.token0,
            token_out: pair.token1,
            amount_in: balance0,
        });
    }

    // Straddling range: compare value shares. All arithmetic happens in
    // human units with token1 as the unit of account.
    let price = 1.0001_f64.powi(current_tick);
    let (unit0, unit1) = amounts_for_unit_liquidity(current_tick, target.lower, target.upper);

    let ideal_total = unit0 * price + unit1;
    if ideal_total <= 0.0 {
        return None;
    }
    let ideal_share0 = unit0 * price / ideal_total;

    let b0 = u256_to_f64(balance0) / pair.scale0();
    let b1 = u256_to_f64(balance1) / pair.scale1();
    let total = b0 * price + b1;
    if total <= 0.0 {
        return None;
    }
    let current_share0 = b0 * price / total;

    let drift = current_share0 - ideal_share0;
    if drift.abs() < SHARE_DEAD_BAND {
        return None;
    }

    let plan = if drift > 0.0 {
        // Too much token0: sell the excess value worth of token0.
        let excess0 = drift * total / price;
        let amount = f64_to_u256((excess0 * pair.scale0()).floor()).min(balance0);
        SwapPlan {
            token_in: pair.token0,
            token_out: pair.token1,
            amount_in: amount,
        }
    } else {
        let excess1 = -drift * total;
        let amount = f64_to_u256((excess1 * pair.scale1()).floor()).min(balance1);
        SwapPlan {
            token_in: pair.token1,
            token_out: pair.token0,
            amount_in: amount,
        }
    };

    if plan.amount_in.is_zero() {
        return None;
    }
    Some(plan)
}

/// Rebalance short-circuit: after dissolving the band opposite the drift,
/// the wallet holds the token the new band cannot use. Swap all of it.
///
/// Lower drift → the new band sits below the price and wants token1, so
/// the whole token0 balance is sold; upper drift is the mirror image.
pub fn plan_band_swap(
    direction: Direction,
    balance0: U256,
    balance1: U256,
    pair: &PairInfo,
) -> Option<SwapPlan> {
    match direction {
        Direction::Lower if !balance0.is_zero() => Some(SwapPlan {
            token_in: pair.token0,
            token_out: pair.token1,
            amount_in: balance0,
        }),
        Direction::Upper if !balance1.is_zero() => Some(SwapPlan {
            token_in: pair.token1,
            token_out: pair.token0,
            amount_in: balance1,
        }),
        _ => None,
    }
}
