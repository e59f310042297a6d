#![deny(unreachable_pub)]

//! RangeKeeper: an autonomous liquidity keeper for concentrated-liquidity
//! AMM pools.
//!
//! The keeper holds a fixed two-token inventory and maintains seven
//! contiguous tick-bounded positions ("bands") around the pool price. As
//! the price drifts out of the center bands it dissolves the band farthest
//! from the drift, swaps the freed token through the same pool, and mints
//! a new band ahead of the drift — one band per cycle, seven bands at
//! rest, the pool never empty. Durable checkpoints between the three
//! chain operations make the cycle crash-safe; a risk envelope (depeg
//! detection, loss limits, gas gating, a consecutive-error budget) halts
//! it when the numbers stop making sense.

pub mod chain;
pub mod config;
pub mod engine;
mod errors;
pub mod infra;
pub mod math;
pub mod monitor;
pub mod persist;
pub mod serde_utils;

pub use chain::{
    GasInfo, MintParams, MintReceipt, PoolChain, PositionInfo, PriceTick, RemoveReceipt,
    RemoveTxHashes, SwapParams, SwapReceipt, TxOutcome,
};
pub use config::{AppConfig, PoolConfig};
pub use engine::{
    Band, BandLedger, Direction, EngineState, PairInfo, RangeKeeper, SwapPlan, TickZone,
};
pub use errors::{ChainError, EngineError, LayoutError, LedgerError, Result, StoreError};
pub use infra::{HealthSurface, HistoryLog, Notifier};
pub use monitor::PriceMonitor;
pub use persist::{PersistedPoolState, RebalanceStage, StateStore};
