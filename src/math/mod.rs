//! Pure tick and range math for concentrated-liquidity pools.
//!
//! Everything in this module is side-effect free: tick ↔ price conversion,
//! tick-spacing alignment, seven-band layout computation, and the
//! unit-liquidity amount formulas the swap planner consumes.

mod layout;
mod liquidity;
mod tick;

pub use layout::{compute_band_layout, BandLayout, TickRange, BAND_COUNT};
pub use liquidity::amounts_for_unit_liquidity;
pub use tick::{
    align_tick, fee_to_tick_spacing, price_to_tick, tick_to_price, usable_tick_bounds, MAX_TICK,
    MIN_TICK,
};
