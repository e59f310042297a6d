//! Pool price polling loop.
//!
//! Polls the chain every `check_interval` and publishes into a
//! `tokio::sync::watch` channel — latest-value semantics, so a consumer
//! that falls behind sees only the freshest tick. A dropped tick is not a
//! correctness problem: the next one reflects the latest state. RPC
//! failures are logged and skipped; out-of-order observations are
//! discarded.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, warn};

use crate::chain::{PoolChain, PriceTick};

/// Periodic price publisher for one pool.
pub struct PriceMonitor<C: PoolChain> {
    chain: Arc<C>,
    interval: Duration,
    sender: watch::Sender<Option<PriceTick>>,
}

impl<C: PoolChain> PriceMonitor<C> {
    /// Create a monitor and the receiver its engine consumes.
    pub fn new(chain: Arc<C>, interval: Duration) -> (Self, watch::Receiver<Option<PriceTick>>) {
        let (sender, receiver) = watch::channel(None);
        (
            Self {
                chain,
                interval,
                sender,
            },
            receiver,
        )
    }

    /// Poll until every receiver is gone.
    pub async fn run(self) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut last_timestamp_ms = 0u64;

        loop {
            ticker.tick().await;
            if self.sender.is_closed() {
                debug!("price monitor: all receivers dropped, exiting");
                return;
            }
            match self.chain.pool_price().await {
                Ok(tick) => {
                    if tick.timestamp_ms < last_timestamp_ms {
                        debug!(
                            tick = tick.tick,
                            timestamp_ms = tick.timestamp_ms,
                            "discarding out-of-order price observation"
                        );
                        continue;
                    }
                    last_timestamp_ms = tick.timestamp_ms;
                    // send_replace never fails while a receiver exists.
                    self.sender.send_replace(Some(tick));
                }
                Err(e) => {
                    warn!(error = %e, "price poll failed, skipping cycle");
                }
            }
        }
    }
}
