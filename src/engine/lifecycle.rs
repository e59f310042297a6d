//! Engine startup, crash recovery, and the emergency withdraw path.

use tracing::{info, warn};

use crate::chain::PoolChain;
use crate::errors::{EngineError, Result};
use crate::infra::{HistoryEntry, HistoryKind};
use crate::persist::StateStore;

use super::{now_wall_ms, Band, EngineState, RangeKeeper};

impl<C: PoolChain, S: StateStore> RangeKeeper<C, S> {
    /// Bring the engine from `Idle` to `Monitoring`.
    ///
    /// Idempotent: re-running without an intervening state change repeats
    /// only reads and approvals. Restores the ledger from persistence,
    /// probes pending transactions, runs crash recovery if a rebalance was
    /// cut mid-flight, and adopts pre-existing on-chain positions when
    /// nothing was persisted.
    ///
    /// A halted engine (`Error` or `Stopped`) refuses to re-arm; restart
    /// the process to get a fresh engine for the pool.
    pub async fn initialize(&mut self) -> Result<()> {
        if self.state.is_terminal() {
            return Err(EngineError::Halted(self.state.as_str()));
        }
        let Some(_guard) = self.try_lock() else {
            return Ok(());
        };
        info!(pool = %self.config.pool_id, "initializing engine");

        let persisted = self.store.pool_state(&self.config.pool_id);
        let mut skip_adoption = false;

        if let Some(state) = &persisted {
            if !state.bands.is_empty() {
                let width = state
                    .band_tick_width
                    .or_else(|| state.bands.first().map(|b| b.tick_upper - b.tick_lower))
                    .unwrap_or(0);
                let bands: Vec<Band> = state.bands.iter().cloned().map(Band::from).collect();
                self.ledger.adopt_bands(bands, width)?;
                info!(
                    pool = %self.config.pool_id,
                    bands = self.ledger.len(),
                    width,
                    "restored band ledger from persistence"
                );
                skip_adoption = true;
            }
            self.last_rebalance_ms = state.last_rebalance_time_ms;
            self.initial_value = state.initial_value_usd;

            // Probe, never block: the outcome only informs the operator.
            for hash in &state.pending_tx_hashes {
                match self.chain.receipt_outcome(hash).await {
                    Ok(outcome) => info!(
                        pool = %self.config.pool_id,
                        tx = %hash,
                        ?outcome,
                        "probed pending transaction"
                    ),
                    Err(e) => warn!(
                        pool = %self.config.pool_id,
                        tx = %hash,
                        error = %e,
                        "pending transaction probe failed"
                    ),
                }
            }

            if let Some(stage) = state.rebalance_stage {
                // A rebalance died between chain calls. Rather than guess
                // which side of the checkpoint the chain actually landed
                // on, drop every band from memory and persistence and
                // re-mint a fresh set on the next tick. Costs a brief
                // no-liquidity window; can never double-spend.
                self.ledger.clear();
                self.store
                    .update_pool(&self.config.pool_id, &mut |s| s.clear_rebalance_artifacts());
                self.store.save_or_throw()?;
                self.notify(&format!(
                    "RECOVERY: pool {} recovering from stage {}: bands cleared, fresh mint on next tick",
                    self.config.pool_id,
                    stage.as_str(),
                ));
                skip_adoption = true;
            }
        }

        if self.ledger.is_empty() && !skip_adoption {
            self.adopt_existing_positions().await?;
        }

        self.chain
            .approve_all(self.config.token0, self.config.token1)
            .await?;

        self.state = EngineState::Monitoring;
        self.update_health(None);
        info!(
            pool = %self.config.pool_id,
            bands = self.ledger.len(),
            "engine monitoring"
        );
        Ok(())
    }

    /// Adopt live positions the wallet already holds for this pool.
    /// Any count is accepted; a partial set is monitored but never
    /// rebalanced, so capital drains out of it only via emergency paths
    /// or a later empty-ledger mint.
    async fn adopt_existing_positions(&mut self) -> Result<()> {
        let found = self
            .chain
            .positions_for(
                self.config.owner,
                self.config.token0,
                self.config.token1,
                self.config.fee,
            )
            .await?;
        let live: Vec<Band> = found
            .into_iter()
            .filter(|p| p.liquidity > 0)
            .map(|p| Band {
                token_id: p.token_id,
                tick_lower: p.tick_lower,
                tick_upper: p.tick_upper,
            })
            .collect();
        if live.is_empty() {
            return Ok(());
        }
        let width = live[0].tick_upper - live[0].tick_lower;
        let count = live.len();
        self.ledger.adopt_bands(live, width)?;
        info!(
            pool = %self.config.pool_id,
            adopted = count,
            "adopted existing on-chain positions"
        );
        Ok(())
    }

    /// Withdraw every band and stop. Public entry; acquires the lock.
    pub async fn emergency_withdraw(&mut self, reason: &str) {
        let Some(_guard) = self.try_lock() else {
            warn!(pool = %self.config.pool_id, "emergency withdraw blocked by rebalance lock");
            return;
        };
        self.emergency_withdraw_locked(reason).await;
    }

    /// Best-effort removal of all bands. Failures on individual bands are
    /// logged and skipped; the engine ends `Stopped` regardless so no
    /// further rebalances can run against a half-dismantled set.
    pub(super) async fn emergency_withdraw_locked(&mut self, reason: &str) {
        self.emergency_stop = true;
        let bands = self.ledger.bands().to_vec();
        let total = bands.len();
        let mut closed = 0usize;
        let mut failed = false;
        let mut tx_hashes = Vec::new();

        info!(pool = %self.config.pool_id, bands = total, reason, "emergency withdraw");

        for band in &bands {
            match self.chain.position(band.token_id).await {
                Ok(p) if p.liquidity > 0 => {
                    match self
                        .chain
                        .remove_position(
                            band.token_id,
                            p.liquidity,
                            self.config.slippage_tolerance_percent,
                        )
                        .await
                    {
                        Ok(receipt) => {
                            closed += 1;
                            tx_hashes.extend(receipt.tx_hashes.landed());
                        }
                        Err(e) => {
                            failed = true;
                            warn!(
                                pool = %self.config.pool_id,
                                token_id = %band.token_id,
                                error = %e,
                                "emergency removal failed, continuing"
                            );
                        }
                    }
                }
                Ok(_) => closed += 1,
                Err(e) => {
                    failed = true;
                    warn!(
                        pool = %self.config.pool_id,
                        token_id = %band.token_id,
                        error = %e,
                        "position read failed during emergency withdraw"
                    );
                }
            }
        }

        self.ledger.clear();
        self.store
            .update_pool(&self.config.pool_id, &mut |s| s.clear_rebalance_artifacts());
        self.store.save();

        self.history.record(HistoryEntry {
            timestamp_ms: now_wall_ms(),
            pool_id: self.config.pool_id.clone(),
            kind: HistoryKind::EmergencyStop,
            direction: None,
            tx_hashes,
            bands: Vec::new(),
            note: Some(reason.to_string()),
        });

        if failed {
            self.notify(&format!(
                "CRITICAL: Emergency withdraw FAILED on pool {}: {closed}/{total} bands closed, manual intervention required ({reason})",
                self.config.pool_id,
            ));
        } else {
            self.notify(&format!(
                "EMERGENCY: All {total} bands closed on pool {} ({reason})",
                self.config.pool_id,
            ));
        }

        self.state = EngineState::Stopped;
        self.update_health(None);
    }
}
