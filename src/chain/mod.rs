//! Chain-environment boundary between the keeper core and the RPC driver.
//!
//! One trait, [`PoolChain`], captures everything the core asks of the
//! outside world: the NFT-position-manager wrapper, the swap-router
//! wrapper, and the handful of RPC reads. Implementations own nonce
//! tracking, RPC failover, and transient-error retries — a [`ChainError`]
//! reaching the core is already final for the current operation.
//!
//! # Implementations
//!
//! - A live implementation wraps the deployed manager/router contracts
//!   (out of tree).
//! - [`VirtualPool`](virtual_pool::VirtualPool): in-process dry-run pool
//!   used by `--dry-run` mode and the scenario tests.

pub mod gas;
pub mod virtual_pool;

use alloy::primitives::{Address, U256};
use async_trait::async_trait;

use crate::errors::ChainError;

pub type ChainResult<T> = std::result::Result<T, ChainError>;

/// One pool-price observation. The core consumes `tick` and
/// `timestamp_ms`; the rest is carried for history entries and debugging.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceTick {
    pub tick: i32,
    pub sqrt_price_x96: U256,
    pub liquidity: u128,
    pub timestamp_ms: u64,
}

/// Raw gas-price reading from the RPC.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GasInfo {
    pub gas_price_gwei: f64,
    pub is_eip1559: bool,
}

/// Parameters for minting one band position.
#[derive(Debug, Clone)]
pub struct MintParams {
    pub token0: Address,
    pub token1: Address,
    pub fee: u32,
    pub tick_lower: i32,
    pub tick_upper: i32,
    pub amount0_desired: U256,
    pub amount1_desired: U256,
    pub slippage_pct: f64,
    pub recipient: Address,
}

/// Outcome of a successful mint. `token_id` is never zero.
#[derive(Debug, Clone)]
pub struct MintReceipt {
    pub token_id: U256,
    pub liquidity: u128,
    pub amount0: U256,
    pub amount1: U256,
    pub tx_hash: String,
}

/// Hashes of the three chained transactions a position removal issues.
/// On partial failure the driver reports the hashes that landed; the
/// remainder are empty strings.
#[derive(Debug, Clone, Default)]
pub struct RemoveTxHashes {
    pub decrease: String,
    pub collect: String,
    pub burn: String,
}

impl RemoveTxHashes {
    /// The non-empty hashes, in issue order.
    pub fn landed(&self) -> Vec<String> {
        [&self.decrease, &self.collect, &self.burn]
            .into_iter()
            .filter(|h| !h.is_empty())
            .cloned()
            .collect()
    }
}

/// Outcome of a full position removal (decrease → collect → burn).
#[derive(Debug, Clone)]
pub struct RemoveReceipt {
    pub amount0: U256,
    pub amount1: U256,
    pub fee0: U256,
    pub fee1: U256,
    pub tx_hashes: RemoveTxHashes,
}

/// Live position data read from the NFT manager.
#[derive(Debug, Clone)]
pub struct PositionInfo {
    pub token_id: U256,
    pub liquidity: u128,
    pub tick_lower: i32,
    pub tick_upper: i32,
    pub tokens_owed0: U256,
    pub tokens_owed1: U256,
}

/// Parameters for an exact-input swap through the pool.
#[derive(Debug, Clone)]
pub struct SwapParams {
    pub token_in: Address,
    pub token_out: Address,
    pub fee: u32,
    pub amount_in: U256,
    pub slippage_pct: f64,
}

/// Outcome of a successful swap. `amount_out` is never zero — the router
/// reverts below the slippage-adjusted minimum.
#[derive(Debug, Clone)]
pub struct SwapReceipt {
    pub amount_out: U256,
    pub tx_hash: String,
}

/// Receipt lookup result for a previously submitted transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxOutcome {
    Confirmed,
    Reverted,
    /// Unknown to the RPC — dropped, or still propagating.
    NotFound,
}

/// The boundary trait between the keeper core and chain execution.
///
/// Every method may block on network I/O. Mutating methods are atomic from
/// the caller's perspective: they either land (receipt decoded, expected
/// events present) or fail with a [`ChainError`].
#[async_trait]
pub trait PoolChain: Send + Sync + 'static {
    // === RPC reads ===

    /// Current pool price state (slot0 + liquidity).
    async fn pool_price(&self) -> ChainResult<PriceTick>;

    /// ERC-20 balance of `owner`.
    async fn token_balance(&self, token: Address, owner: Address) -> ChainResult<U256>;

    /// Current gas price reading.
    async fn gas_price(&self) -> ChainResult<GasInfo>;

    /// Look up the outcome of a submitted transaction. Never blocks on
    /// confirmation.
    async fn receipt_outcome(&self, tx_hash: &str) -> ChainResult<TxOutcome>;

    // === NFT position manager ===

    /// Mint one position. Any on-chain revert fails the whole call.
    async fn mint(&self, params: MintParams) -> ChainResult<MintReceipt>;

    /// Remove a position: decrease liquidity, collect, burn. Three chained
    /// transactions; partial success surfaces as a `Revert` carrying the
    /// hashes that landed.
    async fn remove_position(
        &self,
        token_id: U256,
        liquidity: u128,
        slippage_pct: f64,
    ) -> ChainResult<RemoveReceipt>;

    /// Read one position's live state.
    async fn position(&self, token_id: U256) -> ChainResult<PositionInfo>;

    /// All positions owned by `owner` matching the pool's token pair and
    /// fee tier.
    async fn positions_for(
        &self,
        owner: Address,
        token0: Address,
        token1: Address,
        fee: u32,
    ) -> ChainResult<Vec<PositionInfo>>;

    // === Swap router ===

    /// Exact-input swap. Reverts if the output would be zero or below the
    /// slippage-adjusted minimum.
    async fn execute_swap(&self, params: SwapParams) -> ChainResult<SwapReceipt>;

    /// Ensure both tokens are approved to the position manager and router.
    /// Idempotent.
    async fn approve_all(&self, token0: Address, token1: Address) -> ChainResult<()>;
}
