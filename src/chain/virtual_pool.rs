//! Virtual pool — in-process dry-run implementation of [`PoolChain`].
//!
//! Simulates a single concentrated-liquidity pool and the keeper's wallet
//! without touching an RPC. Used by the daemon's `--dry-run` mode and by
//! the engine scenario tests. Token ids come from the reserved
//! `900_000_000+` range so virtual positions can never be confused with
//! on-chain ones.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use alloy::primitives::{Address, U256};
use async_trait::async_trait;
use tracing::debug;

use crate::errors::ChainError;
use crate::math::amounts_for_unit_liquidity;

use super::{
    ChainResult, GasInfo, MintParams, MintReceipt, PoolChain, PositionInfo, PriceTick,
    RemoveReceipt, RemoveTxHashes, SwapParams, SwapReceipt, TxOutcome,
};

/// First token id handed out by a virtual pool.
pub const VIRTUAL_TOKEN_ID_BASE: u64 = 900_000_000;

/// Static parameters of a virtual pool.
#[derive(Debug, Clone)]
pub struct VirtualPoolConfig {
    pub token0: Address,
    pub token1: Address,
    pub decimals0: u8,
    pub decimals1: u8,
    pub fee: u32,
    pub initial_tick: i32,
    pub wallet: Address,
    pub balance0: U256,
    pub balance1: U256,
    pub gas_price_gwei: f64,
}

#[derive(Debug, Clone)]
struct VirtualPosition {
    tick_lower: i32,
    tick_upper: i32,
    liquidity: u128,
    amount0: U256,
    amount1: U256,
}

#[derive(Debug)]
struct VirtualState {
    tick: i32,
    balances: HashMap<Address, U256>,
    positions: BTreeMap<U256, VirtualPosition>,
    next_token_id: u64,
    tx_counter: u64,
    known_txs: HashSet<String>,
    approved: bool,
    mint_failures: u32,
    remove_failures: u32,
    swap_failures: u32,
}

/// In-process [`PoolChain`] implementation.
pub struct VirtualPool {
    config: VirtualPoolConfig,
    state: Mutex<VirtualState>,
}

impl VirtualPool {
    pub fn new(config: VirtualPoolConfig) -> Self {
        let mut balances = HashMap::new();
        balances.insert(config.token0, config.balance0);
        balances.insert(config.token1, config.balance1);
        let state = VirtualState {
            tick: config.initial_tick,
            balances,
            positions: BTreeMap::new(),
            next_token_id: VIRTUAL_TOKEN_ID_BASE,
            tx_counter: 0,
            known_txs: HashSet::new(),
            approved: false,
            mint_failures: 0,
            remove_failures: 0,
            swap_failures: 0,
        };
        Self {
            config,
            state: Mutex::new(state),
        }
    }

    /// Move the simulated pool price. Drives scenarios in dry-run and tests.
    pub fn set_tick(&self, tick: i32) {
        self.state.lock().unwrap().tick = tick;
    }

    /// Make the next `n` mints revert.
    pub fn fail_next_mints(&self, n: u32) {
        self.state.lock().unwrap().mint_failures = n;
    }

    /// Make the next `n` removals revert (after the decrease tx lands).
    pub fn fail_next_removes(&self, n: u32) {
        self.state.lock().unwrap().remove_failures = n;
    }

    /// Make the next `n` swaps revert.
    pub fn fail_next_swaps(&self, n: u32) {
        self.state.lock().unwrap().swap_failures = n;
    }

    /// Wallet balance of one token.
    pub fn balance_of(&self, token: Address) -> U256 {
        self.state
            .lock()
            .unwrap()
            .balances
            .get(&token)
            .copied()
            .unwrap_or(U256::ZERO)
    }

    /// Number of live virtual positions.
    pub fn position_count(&self) -> usize {
        self.state.lock().unwrap().positions.len()
    }

    /// Whether `approve_all` has been called.
    pub fn is_approved(&self) -> bool {
        self.state.lock().unwrap().approved
    }

    fn next_tx(state: &mut VirtualState) -> String {
        state.tx_counter += 1;
        let hash = format!("0x{:064x}", state.tx_counter);
        state.known_txs.insert(hash.clone());
        hash
    }

    fn now_ms() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64
    }

    fn u256_to_f64(v: U256) -> f64 {
        // Virtual amounts stay far below u128::MAX; saturate on overflow.
        v.try_into().map(|x: u128| x as f64).unwrap_or(f64::MAX)
    }

    fn f64_to_u256(v: f64) -> U256 {
        if !v.is_finite() || v <= 0.0 {
            return U256::ZERO;
        }
        U256::from(v as u128)
    }

    /// Natural-unit pool price at the current tick, adjusted for decimals
    /// so raw amounts convert directly.
    fn raw_price(&self, tick: i32) -> f64 {
        1.0001_f64.powi(tick)
            * 10f64.powi(self.config.decimals1 as i32 - self.config.decimals0 as i32)
    }
}

#[async_trait]
impl PoolChain for VirtualPool {
    async fn pool_price(&self) -> ChainResult<PriceTick> {
        let state = self.state.lock().unwrap();
        let sqrt_price = 1.0001_f64.powf(state.tick as f64 / 2.0) * 2f64.powi(96);
        let liquidity = state
            .positions
            .values()
            .filter(|p| p.tick_lower <= state.tick && state.tick < p.tick_upper)
            .map(|p| p.liquidity)
            .sum();
        Ok(PriceTick {
            tick: state.tick,
            sqrt_price_x96: Self::f64_to_u256(sqrt_price),
            liquidity,
            timestamp_ms: Self::now_ms(),
        })
    }

    async fn token_balance(&self, token: Address, _owner: Address) -> ChainResult<U256> {
        Ok(self.balance_of(token))
    }

    async fn gas_price(&self) -> ChainResult<GasInfo> {
        Ok(GasInfo {
            gas_price_gwei: self.config.gas_price_gwei,
            is_eip1559: true,
        })
    }

    async fn receipt_outcome(&self, tx_hash: &str) -> ChainResult<TxOutcome> {
        let state = self.state.lock().unwrap();
        if state.known_txs.contains(tx_hash) {
            Ok(TxOutcome::Confirmed)
        } else {
            Ok(TxOutcome::NotFound)
        }
    }

    async fn mint(&self, params: MintParams) -> ChainResult<MintReceipt> {
        let mut state = self.state.lock().unwrap();
        if state.mint_failures > 0 {
            state.mint_failures -= 1;
            return Err(ChainError::revert("virtual mint failure injected"));
        }
        if params.tick_lower >= params.tick_upper {
            return Err(ChainError::revert("invalid tick range"));
        }

        let tick = state.tick;
        let (unit0, unit1) =
            amounts_for_unit_liquidity(tick, params.tick_lower, params.tick_upper);
        let scale0 = 10f64.powi(self.config.decimals0 as i32);
        let scale1 = 10f64.powi(self.config.decimals1 as i32);

        let desired0 = Self::u256_to_f64(params.amount0_desired);
        let desired1 = Self::u256_to_f64(params.amount1_desired);

        // Liquidity is capped by whichever side runs out first.
        let l0 = if unit0 > 0.0 {
            desired0 / (unit0 * scale0)
        } else {
            f64::INFINITY
        };
        let l1 = if unit1 > 0.0 {
            desired1 / (unit1 * scale1)
        } else {
            f64::INFINITY
        };
        let liquidity = l0.min(l1);
        if !liquidity.is_finite() || liquidity <= 0.0 {
            return Err(ChainError::revert("mint would create zero liquidity"));
        }

        // Clamp to the offered amounts so float rounding can never accept
        // more than the caller put on the table.
        let accepted0 =
            Self::f64_to_u256(liquidity * unit0 * scale0).min(params.amount0_desired);
        let accepted1 =
            Self::f64_to_u256(liquidity * unit1 * scale1).min(params.amount1_desired);

        let bal0 = state
            .balances
            .get(&params.token0)
            .copied()
            .unwrap_or(U256::ZERO);
        let bal1 = state
            .balances
            .get(&params.token1)
            .copied()
            .unwrap_or(U256::ZERO);
        if accepted0 > bal0 || accepted1 > bal1 {
            return Err(ChainError::revert("insufficient wallet balance"));
        }
        state.balances.insert(params.token0, bal0 - accepted0);
        state.balances.insert(params.token1, bal1 - accepted1);

        let token_id = U256::from(state.next_token_id);
        state.next_token_id += 1;
        state.positions.insert(
            token_id,
            VirtualPosition {
                tick_lower: params.tick_lower,
                tick_upper: params.tick_upper,
                liquidity: liquidity as u128,
                amount0: accepted0,
                amount1: accepted1,
            },
        );
        let tx_hash = Self::next_tx(&mut state);
        debug!(
            token_id = %token_id,
            lower = params.tick_lower,
            upper = params.tick_upper,
            %accepted0,
            %accepted1,
            "virtual mint"
        );
        Ok(MintReceipt {
            token_id,
            liquidity: liquidity as u128,
            amount0: accepted0,
            amount1: accepted1,
            tx_hash,
        })
    }

    async fn remove_position(
        &self,
        token_id: U256,
        _liquidity: u128,
        _slippage_pct: f64,
    ) -> ChainResult<RemoveReceipt> {
        let mut state = self.state.lock().unwrap();
        if state.remove_failures > 0 {
            state.remove_failures -= 1;
            // The decrease tx lands, then the chain fails: partial hashes.
            let decrease = Self::next_tx(&mut state);
            return Err(ChainError::Revert {
                reason: "virtual remove failure injected".to_string(),
                tx_hashes: vec![decrease],
            });
        }
        let position = state
            .positions
            .remove(&token_id)
            .ok_or_else(|| ChainError::revert(format!("unknown token id {token_id}")))?;

        let bal0 = state
            .balances
            .get(&self.config.token0)
            .copied()
            .unwrap_or(U256::ZERO);
        let bal1 = state
            .balances
            .get(&self.config.token1)
            .copied()
            .unwrap_or(U256::ZERO);
        state
            .balances
            .insert(self.config.token0, bal0 + position.amount0);
        state
            .balances
            .insert(self.config.token1, bal1 + position.amount1);

        let tx_hashes = RemoveTxHashes {
            decrease: Self::next_tx(&mut state),
            collect: Self::next_tx(&mut state),
            burn: Self::next_tx(&mut state),
        };
        debug!(token_id = %token_id, "virtual remove");
        Ok(RemoveReceipt {
            amount0: position.amount0,
            amount1: position.amount1,
            fee0: U256::ZERO,
            fee1: U256::ZERO,
            tx_hashes,
        })
    }

    async fn position(&self, token_id: U256) -> ChainResult<PositionInfo> {
        let state = self.state.lock().unwrap();
        let p = state
            .positions
            .get(&token_id)
            .ok_or_else(|| ChainError::revert(format!("unknown token id {token_id}")))?;
        Ok(PositionInfo {
            token_id,
            liquidity: p.liquidity,
            tick_lower: p.tick_lower,
            tick_upper: p.tick_upper,
            tokens_owed0: U256::ZERO,
            tokens_owed1: U256::ZERO,
        })
    }

    async fn positions_for(
        &self,
        _owner: Address,
        token0: Address,
        token1: Address,
        fee: u32,
    ) -> ChainResult<Vec<PositionInfo>> {
        if token0 != self.config.token0 || token1 != self.config.token1 || fee != self.config.fee
        {
            return Ok(Vec::new());
        }
        let state = self.state.lock().unwrap();
        Ok(state
            .positions
            .iter()
            .map(|(id, p)| PositionInfo {
                token_id: *id,
                liquidity: p.liquidity,
                tick_lower: p.tick_lower,
                tick_upper: p.tick_upper,
                tokens_owed0: U256::ZERO,
                tokens_owed1: U256::ZERO,
            })
            .collect())
    }

    async fn execute_swap(&self, params: SwapParams) -> ChainResult<SwapReceipt> {
        let mut state = self.state.lock().unwrap();
        if state.swap_failures > 0 {
            state.swap_failures -= 1;
            return Err(ChainError::revert("virtual swap failure injected"));
        }
        if params.amount_in.is_zero() {
            return Err(ChainError::revert("zero amount in"));
        }
        let balance_in = state
            .balances
            .get(&params.token_in)
            .copied()
            .unwrap_or(U256::ZERO);
        if params.amount_in > balance_in {
            return Err(ChainError::revert("insufficient balance for swap"));
        }

        let fee_factor = 1.0 - params.fee as f64 / 1_000_000.0;
        let price = self.raw_price(state.tick);
        let amount_in = Self::u256_to_f64(params.amount_in);
        let amount_out = if params.token_in == self.config.token0 {
            amount_in * price * fee_factor
        } else {
            amount_in / price * fee_factor
        };
        let amount_out = Self::f64_to_u256(amount_out);
        if amount_out.is_zero() {
            return Err(ChainError::revert("swap output would be zero"));
        }

        state
            .balances
            .insert(params.token_in, balance_in - params.amount_in);
        let balance_out = state
            .balances
            .get(&params.token_out)
            .copied()
            .unwrap_or(U256::ZERO);
        state
            .balances
            .insert(params.token_out, balance_out + amount_out);

        let tx_hash = Self::next_tx(&mut state);
        debug!(
            amount_in = %params.amount_in,
            amount_out = %amount_out,
            "virtual swap"
        );
        Ok(SwapReceipt {
            amount_out,
            tx_hash,
        })
    }

    async fn approve_all(&self, _token0: Address, _token1: Address) -> ChainResult<()> {
        self.state.lock().unwrap().approved = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::address;

    fn pool_at(tick: i32) -> VirtualPool {
        VirtualPool::new(VirtualPoolConfig {
            token0: address!("0000000000000000000000000000000000000001"),
            token1: address!("0000000000000000000000000000000000000002"),
            decimals0: 6,
            decimals1: 18,
            fee: 100,
            initial_tick: tick,
            wallet: address!("00000000000000000000000000000000000000aa"),
            balance0: U256::from(1_000_000_000_000_u64), // 1M token0
            balance1: U256::from(10u128.pow(18) * 1_000_000), // 1M token1
            gas_price_gwei: 20.0,
        })
    }

    #[tokio::test]
    async fn test_mint_assigns_reserved_token_ids() {
        let pool = pool_at(0);
        let params = MintParams {
            token0: pool.config.token0,
            token1: pool.config.token1,
            fee: 100,
            tick_lower: -21,
            tick_upper: 21,
            amount0_desired: U256::from(1_000_000u64),
            amount1_desired: U256::from(10u128.pow(18)),
            slippage_pct: 0.5,
            recipient: pool.config.wallet,
        };
        let r1 = pool.mint(params.clone()).await.unwrap();
        let mut p2 = params;
        p2.tick_lower = 21;
        p2.tick_upper = 63;
        let r2 = pool.mint(p2).await.unwrap();
        assert_eq!(r1.token_id, U256::from(VIRTUAL_TOKEN_ID_BASE));
        assert_eq!(r2.token_id, U256::from(VIRTUAL_TOKEN_ID_BASE + 1));
    }

    #[tokio::test]
    async fn test_single_sided_mint_above_price() {
        let pool = pool_at(0);
        let r = pool
            .mint(MintParams {
                token0: pool.config.token0,
                token1: pool.config.token1,
                fee: 100,
                tick_lower: 100,
                tick_upper: 200,
                amount0_desired: U256::from(500_000u64),
                amount1_desired: U256::ZERO,
                slippage_pct: 0.5,
                recipient: pool.config.wallet,
            })
            .await
            .unwrap();
        assert_eq!(r.amount1, U256::ZERO);
        assert!(r.amount0 > U256::ZERO);
    }

    #[tokio::test]
    async fn test_remove_returns_funds_to_wallet() {
        let pool = pool_at(0);
        let before0 = pool.balance_of(pool.config.token0);
        let r = pool
            .mint(MintParams {
                token0: pool.config.token0,
                token1: pool.config.token1,
                fee: 100,
                tick_lower: 100,
                tick_upper: 200,
                amount0_desired: U256::from(500_000u64),
                amount1_desired: U256::ZERO,
                slippage_pct: 0.5,
                recipient: pool.config.wallet,
            })
            .await
            .unwrap();
        assert!(pool.balance_of(pool.config.token0) < before0);

        let removed = pool.remove_position(r.token_id, r.liquidity, 0.5).await.unwrap();
        assert_eq!(removed.amount0, r.amount0);
        assert_eq!(pool.balance_of(pool.config.token0), before0);
        assert!(!removed.tx_hashes.decrease.is_empty());
        assert!(!removed.tx_hashes.burn.is_empty());
    }

    #[tokio::test]
    async fn test_swap_moves_balances_both_ways() {
        let pool = pool_at(0);
        let in0 = U256::from(1_000_000u64); // 1 token0 at 6 decimals
        let r = pool
            .execute_swap(SwapParams {
                token_in: pool.config.token0,
                token_out: pool.config.token1,
                fee: 100,
                amount_in: in0,
                slippage_pct: 0.5,
            })
            .await
            .unwrap();
        // At tick 0 the natural price is 1: one token0 ≈ one token1 minus fee.
        let expected = 10u128.pow(18) as f64 * (1.0 - 0.0001);
        let got: u128 = r.amount_out.try_into().unwrap();
        assert!((got as f64 - expected).abs() / expected < 1e-6);
    }

    #[tokio::test]
    async fn test_swap_rejects_zero_and_overdraw() {
        let pool = pool_at(0);
        let err = pool
            .execute_swap(SwapParams {
                token_in: pool.config.token0,
                token_out: pool.config.token1,
                fee: 100,
                amount_in: U256::ZERO,
                slippage_pct: 0.5,
            })
            .await;
        assert!(err.is_err());

        let err = pool
            .execute_swap(SwapParams {
                token_in: pool.config.token0,
                token_out: pool.config.token1,
                fee: 100,
                amount_in: U256::MAX,
                slippage_pct: 0.5,
            })
            .await;
        assert!(err.is_err());
    }

    #[tokio::test]
    async fn test_receipt_lookup() {
        let pool = pool_at(0);
        let r = pool
            .mint(MintParams {
                token0: pool.config.token0,
                token1: pool.config.token1,
                fee: 100,
                tick_lower: 100,
                tick_upper: 200,
                amount0_desired: U256::from(500_000u64),
                amount1_desired: U256::ZERO,
                slippage_pct: 0.5,
                recipient: pool.config.wallet,
            })
            .await
            .unwrap();
        assert_eq!(
            pool.receipt_outcome(&r.tx_hash).await.unwrap(),
            TxOutcome::Confirmed
        );
        assert_eq!(
            pool.receipt_outcome("0xdeadbeef").await.unwrap(),
            TxOutcome::NotFound
        );
    }

    #[tokio::test]
    async fn test_approve_is_sticky() {
        let pool = pool_at(0);
        assert!(!pool.is_approved());
        pool.approve_all(pool.config.token0, pool.config.token1)
            .await
            .unwrap();
        assert!(pool.is_approved());
    }

    #[tokio::test]
    async fn test_injected_failures_decrement() {
        let pool = pool_at(0);
        pool.fail_next_mints(1);
        let params = MintParams {
            token0: pool.config.token0,
            token1: pool.config.token1,
            fee: 100,
            tick_lower: 100,
            tick_upper: 200,
            amount0_desired: U256::from(500_000u64),
            amount1_desired: U256::ZERO,
            slippage_pct: 0.5,
            recipient: pool.config.wallet,
        };
        assert!(pool.mint(params.clone()).await.is_err());
        assert!(pool.mint(params).await.is_ok());
    }
}
