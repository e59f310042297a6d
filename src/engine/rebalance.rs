//! The two capital-deploying paths: the initial seven-band mint and the
//! single-band rebalance cycle.

use alloy::primitives::U256;
use tracing::{debug, info};

use crate::chain::{MintParams, PoolChain, PriceTick, SwapParams};
use crate::errors::Result;
use crate::infra::{HistoryEntry, HistoryKind};
use crate::math::{compute_band_layout, BAND_COUNT};
use crate::persist::{RebalanceStage, StateStore};

use super::planner::plan_band_swap;
use super::risk::{evaluate_gas_gate, portfolio_loss_exceeded, single_rebalance_loss_exceeded};
use super::valuation::PortfolioSnapshot;
use super::{Band, Direction, Edge, EngineState, RangeKeeper};

impl<C: PoolChain, S: StateStore> RangeKeeper<C, S> {
    /// Mint the full seven-band set around the current tick.
    ///
    /// Bands are minted in ascending order; band `i` is offered
    /// `remaining / (7 - i)` of each token, so the last band receives
    /// whatever is left. The chain returns the amounts it actually
    /// accepted, which are deducted from the running balances.
    pub(super) async fn mint_initial_bands(&mut self, tick: &PriceTick) -> Result<()> {
        self.state = EngineState::Minting;
        self.update_health(Some(tick.tick));

        let layout =
            compute_band_layout(tick.tick, self.config.range_width_percent, self.config.fee)?;
        let mut remaining0 = self
            .chain
            .token_balance(self.config.token0, self.config.owner)
            .await?;
        let mut remaining1 = self
            .chain
            .token_balance(self.config.token1, self.config.owner)
            .await?;
        let entry = PortfolioSnapshot::at_tick(remaining0, remaining1, tick.tick, &self.pair);

        info!(
            pool = %self.config.pool_id,
            tick = tick.tick,
            width = layout.band_tick_width,
            value = entry.value_token1,
            "minting initial bands"
        );

        let mut bands = Vec::with_capacity(BAND_COUNT);
        let mut tx_hashes = Vec::with_capacity(BAND_COUNT);
        for (i, range) in layout.bands.iter().enumerate() {
            let share = U256::from((BAND_COUNT - i) as u64);
            let receipt = self
                .chain
                .mint(MintParams {
                    token0: self.config.token0,
                    token1: self.config.token1,
                    fee: self.config.fee,
                    tick_lower: range.lower,
                    tick_upper: range.upper,
                    amount0_desired: remaining0 / share,
                    amount1_desired: remaining1 / share,
                    slippage_pct: self.config.slippage_tolerance_percent,
                    recipient: self.config.owner,
                })
                .await?;
            remaining0 -= receipt.amount0.min(remaining0);
            remaining1 -= receipt.amount1.min(remaining1);
            debug!(
                pool = %self.config.pool_id,
                band = i,
                token_id = %receipt.token_id,
                lower = range.lower,
                upper = range.upper,
                "band minted"
            );
            bands.push(Band {
                token_id: receipt.token_id,
                tick_lower: range.lower,
                tick_upper: range.upper,
            });
            tx_hashes.push(receipt.tx_hash);
        }

        self.ledger.set_bands(bands, layout.band_tick_width)?;
        self.errors.reset();
        self.entry_snapshot = Some(entry);
        if self.initial_value.is_none() {
            self.initial_value = Some(entry.value_token1);
        }

        let persisted_bands = self.ledger.to_persisted();
        let width = self.ledger.band_tick_width();
        let initial_value = self.initial_value;
        self.store.update_pool(&self.config.pool_id, &mut |s| {
            s.bands = persisted_bands.clone();
            s.band_tick_width = Some(width);
            s.rebalance_stage = None;
            s.pending_tx_hashes.clear();
            if s.initial_value_usd.is_none() {
                s.initial_value_usd = initial_value;
            }
        });
        self.store.save();

        self.history.record(HistoryEntry {
            timestamp_ms: tick.timestamp_ms,
            pool_id: self.config.pool_id.clone(),
            kind: HistoryKind::Mint,
            direction: None,
            tx_hashes,
            bands: self.ledger.to_persisted(),
            note: None,
        });
        let (span_lower, span_upper) = (
            self.ledger.bands()[0].tick_lower,
            self.ledger.bands()[BAND_COUNT - 1].tick_upper,
        );
        self.notify(&format!(
            "Minted {BAND_COUNT} bands on pool {} covering ticks [{span_lower}, {span_upper}) around tick {}",
            self.config.pool_id, tick.tick,
        ));

        self.state = EngineState::Monitoring;
        self.update_health(Some(tick.tick));
        Ok(())
    }

    /// One rebalance cycle: dissolve the band opposite the drift, swap the
    /// freed token, mint a new band ahead of the drift.
    ///
    /// Checkpoints are written through the fail-fast store path after the
    /// withdraw and after the swap; if a checkpoint cannot be made durable
    /// the cycle aborts before the next chain call, leaving recovery a
    /// well-defined boundary.
    pub(super) async fn execute_band_rebalance(
        &mut self,
        tick: &PriceTick,
        direction: Direction,
    ) -> Result<()> {
        let now = tick.timestamp_ms;
        if self.emergency_stop {
            debug!(pool = %self.config.pool_id, "emergency stop set, skipping rebalance");
            return Ok(());
        }

        self.state = EngineState::Evaluating;
        self.update_health(Some(tick.tick));

        let since_last = now.saturating_sub(self.last_rebalance_ms);
        if since_last < self.config.min_rebalance_interval_ms() {
            debug!(
                pool = %self.config.pool_id,
                since_last_ms = since_last,
                "min rebalance interval not reached, skipping"
            );
            self.state = EngineState::Monitoring;
            return Ok(());
        }

        // A trigger-band entry means the price already left the range the
        // keeper wants it in, so the gate is evaluated as out-of-range:
        // expensive gas delays nothing, it only gets logged and folded
        // into the baseline.
        let gas_info = self.chain.gas_price().await?;
        let gate = evaluate_gas_gate(
            &mut self.gas_oracle,
            gas_info,
            self.config.eth_price_usd,
            self.config.max_gas_cost_usd,
            false,
        );
        if !gate.proceed {
            self.state = EngineState::Monitoring;
            return Ok(());
        }

        let pre0 = self
            .chain
            .token_balance(self.config.token0, self.config.owner)
            .await?;
        let pre1 = self
            .chain
            .token_balance(self.config.token1, self.config.owner)
            .await?;
        let pre = PortfolioSnapshot::at_tick(pre0, pre1, tick.tick, &self.pair);

        // === Withdraw ===
        self.state = EngineState::Withdrawing;
        self.update_health(Some(tick.tick));

        let Some(victim) = self.ledger.band_to_dissolve(direction).cloned() else {
            self.state = EngineState::Monitoring;
            return Ok(());
        };
        let mut withdraw_hashes = Vec::new();
        let position = self.chain.position(victim.token_id).await?;
        if position.liquidity > 0 {
            let receipt = self
                .chain
                .remove_position(
                    victim.token_id,
                    position.liquidity,
                    self.config.slippage_tolerance_percent,
                )
                .await?;
            withdraw_hashes = receipt.tx_hashes.landed();
        }
        self.ledger.remove(victim.token_id)?;

        let bands_after_withdraw = self.ledger.to_persisted();
        self.store.update_pool(&self.config.pool_id, &mut |s| {
            s.bands = bands_after_withdraw.clone();
            s.rebalance_stage = Some(RebalanceStage::Withdrawn);
            s.pending_tx_hashes = withdraw_hashes.clone();
        });
        self.store.save_or_throw()?;
        info!(
            pool = %self.config.pool_id,
            token_id = %victim.token_id,
            direction = direction.as_str(),
            "band dissolved, checkpoint Withdrawn"
        );

        // === Swap ===
        self.state = EngineState::Swapping;
        self.update_health(Some(tick.tick));

        let bal0 = self
            .chain
            .token_balance(self.config.token0, self.config.owner)
            .await?;
        let bal1 = self
            .chain
            .token_balance(self.config.token1, self.config.owner)
            .await?;
        let mut swap_hashes = Vec::new();
        match plan_band_swap(direction, bal0, bal1, &self.pair) {
            Some(plan) => {
                let receipt = self
                    .chain
                    .execute_swap(SwapParams {
                        token_in: plan.token_in,
                        token_out: plan.token_out,
                        fee: self.config.fee,
                        amount_in: plan.amount_in,
                        slippage_pct: self.config.slippage_tolerance_percent,
                    })
                    .await?;
                swap_hashes.push(receipt.tx_hash);
            }
            None => {
                debug!(
                    pool = %self.config.pool_id,
                    "freed balance is zero, swap skipped"
                );
            }
        }

        self.store.update_pool(&self.config.pool_id, &mut |s| {
            s.rebalance_stage = Some(RebalanceStage::Swapped);
            s.pending_tx_hashes = swap_hashes.clone();
        });
        self.store.save_or_throw()?;

        // === Mint ===
        self.state = EngineState::Minting;
        self.update_health(Some(tick.tick));

        let Some(new_range) = self.ledger.new_band_ticks(direction) else {
            self.state = EngineState::Monitoring;
            return Ok(());
        };
        let mint0 = self
            .chain
            .token_balance(self.config.token0, self.config.owner)
            .await?;
        let mint1 = self
            .chain
            .token_balance(self.config.token1, self.config.owner)
            .await?;
        let receipt = self
            .chain
            .mint(MintParams {
                token0: self.config.token0,
                token1: self.config.token1,
                fee: self.config.fee,
                tick_lower: new_range.lower,
                tick_upper: new_range.upper,
                amount0_desired: mint0,
                amount1_desired: mint1,
                slippage_pct: self.config.slippage_tolerance_percent,
                recipient: self.config.owner,
            })
            .await?;
        let mint_hash = receipt.tx_hash.clone();
        let edge = match direction {
            Direction::Lower => Edge::Start,
            Direction::Upper => Edge::End,
        };
        self.ledger.add(
            Band {
                token_id: receipt.token_id,
                tick_lower: new_range.lower,
                tick_upper: new_range.upper,
            },
            edge,
        )?;

        self.last_rebalance_ms = now;
        self.errors.reset();

        // Terminal persist clears the checkpoint. Lossy on purpose: a lost
        // write re-runs recovery next boot, which is safe.
        let bands_after_mint = self.ledger.to_persisted();
        self.store.update_pool(&self.config.pool_id, &mut |s| {
            s.bands = bands_after_mint.clone();
            s.rebalance_stage = None;
            s.pending_tx_hashes.clear();
            s.last_rebalance_time_ms = now;
        });
        self.store.save();

        let mut all_hashes = withdraw_hashes;
        all_hashes.extend(swap_hashes);
        all_hashes.push(mint_hash);
        self.history.record(HistoryEntry {
            timestamp_ms: now,
            pool_id: self.config.pool_id.clone(),
            kind: HistoryKind::Rebalance,
            direction: Some(direction.as_str().to_string()),
            tx_hashes: all_hashes,
            bands: self.ledger.to_persisted(),
            note: None,
        });

        // === Post-rebalance loss gates ===
        let post0 = self
            .chain
            .token_balance(self.config.token0, self.config.owner)
            .await?;
        let post1 = self
            .chain
            .token_balance(self.config.token1, self.config.owner)
            .await?;
        let post = PortfolioSnapshot::at_tick(post0, post1, tick.tick, &self.pair);

        if single_rebalance_loss_exceeded(pre.value_token1, post.value_token1) {
            self.notify(&format!(
                "ALERT: Rebalance loss too high on pool {}: value {:.4} -> {:.4}; keeper stopped",
                self.config.pool_id, pre.value_token1, post.value_token1,
            ));
            // Stop without withdrawing: the bands are intact, only the
            // economics are suspect. The operator decides what happens next.
            self.state = EngineState::Stopped;
            self.update_health(Some(tick.tick));
            return Ok(());
        }

        if let Some(initial) = self.initial_value {
            if portfolio_loss_exceeded(
                post.value_token1,
                initial,
                self.config.max_total_loss_percent,
            ) {
                self.notify(&format!(
                    "ALERT: Portfolio loss limit breached on pool {}: value {:.4} vs initial {:.4} (limit {:.1}%)",
                    self.config.pool_id,
                    post.value_token1,
                    initial,
                    self.config.max_total_loss_percent,
                ));
                self.emergency_withdraw_locked("portfolio loss limit").await;
                return Ok(());
            }
        }

        self.notify(&format!(
            "Rebalanced pool {} {}: dissolved band {}, minted band [{}, {}) at tick {}",
            self.config.pool_id,
            direction.as_str(),
            victim.token_id,
            new_range.lower,
            new_range.upper,
            tick.tick,
        ));

        self.state = EngineState::Monitoring;
        self.update_health(Some(tick.tick));
        Ok(())
    }
}
