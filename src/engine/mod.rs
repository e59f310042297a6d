//! The rebalance engine: a per-pool state machine owning the seven-band
//! ledger.
//!
//! One engine instance manages one pool. All mutating entry points
//! (`initialize`, `on_price_tick`, `emergency_withdraw`, `stop`) run under
//! the per-engine rebalance lock; a price tick arriving while the lock is
//! held is dropped silently — the next tick reflects the latest state.
//!
//! Non-error transitions:
//!
//! ```text
//! Idle → Monitoring                 (initialize)
//! Monitoring → Evaluating           (trigger zone ∧ full ledger)
//! Monitoring → Minting              (empty ledger)
//! Evaluating → Monitoring           (min-interval or gas gate rejects)
//! Evaluating → Withdrawing          (gates pass)
//! Withdrawing → Swapping            (band dissolved; checkpoint Withdrawn)
//! Swapping → Minting                (swap done or skipped; checkpoint Swapped)
//! Minting → Monitoring              (band added; checkpoint cleared)
//! any → Error                       (three consecutive failures)
//! any → Stopped                     (emergency withdraw or stop)
//! ```

mod ledger;
mod lifecycle;
mod planner;
mod rebalance;
mod risk;
mod valuation;


pub use ledger::{Band, BandLedger, Direction, Edge, TickZone};
pub use planner::{plan_band_swap, plan_swap_for_target, PairInfo, SwapPlan};
pub use risk::{
    check_depeg, evaluate_gas_gate, portfolio_loss_exceeded, single_rebalance_loss_exceeded,
    DepegAlert, ErrorBudget, GasGateOutcome, MAX_CONSECUTIVE_ERRORS, SINGLE_REBALANCE_MAX_LOSS,
};
pub use valuation::{portfolio_value, PortfolioSnapshot};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::chain::{gas::GasOracle, PoolChain, PriceTick};
use crate::config::PoolConfig;
use crate::errors::EngineError;
use crate::infra::{HealthSurface, HistoryLog, Notifier};
use crate::persist::StateStore;

/// Engine lifecycle state. `Error` and `Stopped` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Idle,
    Monitoring,
    Evaluating,
    Withdrawing,
    Swapping,
    Minting,
    Error,
    Stopped,
}

impl EngineState {
    pub fn as_str(&self) -> &'static str {
        match self {
            EngineState::Idle => "Idle",
            EngineState::Monitoring => "Monitoring",
            EngineState::Evaluating => "Evaluating",
            EngineState::Withdrawing => "Withdrawing",
            EngineState::Swapping => "Swapping",
            EngineState::Minting => "Minting",
            EngineState::Error => "Error",
            EngineState::Stopped => "Stopped",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, EngineState::Error | EngineState::Stopped)
    }
}

impl std::fmt::Display for EngineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scoped hold on the rebalance lock; released on every exit path.
struct RebalanceGuard(Arc<AtomicBool>);

impl Drop for RebalanceGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Per-pool rebalance engine.
pub struct RangeKeeper<C: PoolChain, S: StateStore> {
    config: PoolConfig,
    pair: PairInfo,
    chain: Arc<C>,
    store: Arc<S>,
    notifier: Arc<dyn Notifier>,
    history: Arc<dyn HistoryLog>,
    health: Arc<HealthSurface>,

    ledger: BandLedger,
    state: EngineState,
    gas_oracle: GasOracle,
    errors: ErrorBudget,
    lock: Arc<AtomicBool>,
    last_rebalance_ms: u64,
    initial_value: Option<f64>,
    /// Balances and price at first mint, kept for impermanent-loss
    /// diagnostics.
    entry_snapshot: Option<PortfolioSnapshot>,
    emergency_stop: bool,
}

impl<C: PoolChain, S: StateStore> RangeKeeper<C, S> {
    pub fn new(
        config: PoolConfig,
        chain: Arc<C>,
        store: Arc<S>,
        notifier: Arc<dyn Notifier>,
        history: Arc<dyn HistoryLog>,
        health: Arc<HealthSurface>,
    ) -> Self {
        let pair = PairInfo {
            token0: config.token0,
            token1: config.token1,
            decimals0: config.decimals0,
            decimals1: config.decimals1,
        };
        Self {
            config,
            pair,
            chain,
            store,
            notifier,
            history,
            health,
            ledger: BandLedger::new(),
            state: EngineState::Idle,
            gas_oracle: GasOracle::default(),
            errors: ErrorBudget::new(),
            lock: Arc::new(AtomicBool::new(false)),
            last_rebalance_ms: 0,
            initial_value: None,
            entry_snapshot: None,
            emergency_stop: false,
        }
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn ledger(&self) -> &BandLedger {
        &self.ledger
    }

    pub fn last_rebalance_ms(&self) -> u64 {
        self.last_rebalance_ms
    }

    pub fn consecutive_errors(&self) -> u32 {
        self.errors.count()
    }

    /// Balances and price captured at first mint, for impermanent-loss
    /// diagnostics.
    pub fn entry_snapshot(&self) -> Option<&PortfolioSnapshot> {
        self.entry_snapshot.as_ref()
    }

    pub fn pool_id(&self) -> &str {
        &self.config.pool_id
    }

    /// Handle one price observation. The main event of the engine.
    ///
    /// Non-reentrant: a tick arriving while a rebalance holds the lock is
    /// dropped, as is any tick once the engine left `Idle`/`Monitoring`.
    pub async fn on_price_tick(&mut self, tick: &PriceTick) {
        if !matches!(self.state, EngineState::Idle | EngineState::Monitoring) {
            return;
        }
        let Some(_guard) = self.try_lock() else {
            debug!(
                pool = %self.config.pool_id,
                tick = tick.tick,
                "rebalance lock held, dropping tick"
            );
            return;
        };

        if let Some(alert) = check_depeg(
            tick.tick,
            self.config.expected_price_ratio,
            self.config.depeg_threshold_percent,
        ) {
            self.notify(&format!(
                "ALERT: DEPEG on pool {}: price {:.6} deviates {:.2}% from expected {:.4} (threshold {:.1}%)",
                self.config.pool_id,
                alert.current_price,
                alert.deviation_pct,
                alert.expected_price,
                self.config.depeg_threshold_percent,
            ));
            self.emergency_withdraw_locked("depeg").await;
            self.update_health(Some(tick.tick));
            return;
        }

        if self.ledger.is_empty() {
            if let Err(e) = self.mint_initial_bands(tick).await {
                self.handle_operation_failure("initial mint", e).await;
            }
            self.update_health(Some(tick.tick));
            return;
        }

        let direction = match self.ledger.classify(tick.tick) {
            TickZone::Safe | TickZone::NoAction => {
                self.update_health(Some(tick.tick));
                return;
            }
            TickZone::LowerTrigger => Direction::Lower,
            TickZone::UpperTrigger => Direction::Upper,
        };

        if !self.ledger.is_full() {
            // Adopted partial set: monitor only, never shift it.
            debug!(
                pool = %self.config.pool_id,
                bands = self.ledger.len(),
                "trigger on partial band set ignored"
            );
            self.update_health(Some(tick.tick));
            return;
        }

        if let Err(e) = self.execute_band_rebalance(tick, direction).await {
            self.handle_operation_failure("rebalance", e).await;
        }
        self.update_health(Some(tick.tick));
    }

    /// Explicit operator stop at the next reachable boundary.
    pub fn stop(&mut self) {
        if self.state.is_terminal() {
            return;
        }
        self.state = EngineState::Stopped;
        self.update_health(None);
        debug!(pool = %self.config.pool_id, "engine stopped");
    }

    // === Internal plumbing ===

    fn try_lock(&self) -> Option<RebalanceGuard> {
        self.lock
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RebalanceGuard(self.lock.clone()))
    }

    async fn handle_operation_failure(&mut self, operation: &str, error: EngineError) {
        warn!(
            pool = %self.config.pool_id,
            %operation,
            error = %error,
            "chain operation failed"
        );
        if self.errors.record_failure() {
            self.notify(&format!(
                "ALERT: pool {} stopped after {} errors, emergency stop engaged (last: {})",
                self.config.pool_id,
                self.errors.count(),
                error,
            ));
            self.emergency_withdraw_locked("consecutive errors").await;
            // Error, not Stopped: the terminal state records that the halt
            // came from the failure budget, not an operator action.
            self.state = EngineState::Error;
        } else {
            self.state = EngineState::Monitoring;
        }
    }

    fn notify(&self, message: &str) {
        // Fire-and-forget: sinks swallow their own failures.
        self.notifier.notify(message);
    }

    fn update_health(&self, last_tick: Option<i32>) {
        let state = self.state.as_str().to_string();
        let band_count = self.ledger.len();
        let consecutive_errors = self.errors.count();
        let last_rebalance_time_ms = self.last_rebalance_ms;
        let emergency_stopped = self.emergency_stop;
        self.health
            .update_pool_status(&self.config.pool_id, move |h| {
                h.state = state;
                h.band_count = band_count;
                h.consecutive_errors = consecutive_errors;
                h.last_rebalance_time_ms = last_rebalance_time_ms;
                h.emergency_stopped = emergency_stopped;
                if let Some(t) = last_tick {
                    h.last_tick = Some(t);
                }
                h.updated_ms = now_wall_ms();
            });
    }
}

pub(crate) fn now_wall_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
