//! Best-effort operator notifications.
//!
//! The engine reports noteworthy transitions (mints, rebalances, alerts,
//! emergencies) through a [`Notifier`]. Delivery is fire-and-forget: a
//! sink that fails must never fail a state transition, so implementations
//! swallow their own errors and log them.

use std::sync::Mutex;

use tracing::{info, warn};

/// Notification sink. Implementations must not block for long and must
/// not propagate failures.
pub trait Notifier: Send + Sync {
    fn notify(&self, message: &str);
}

/// Default sink: routes notifications into the structured log.
/// `ALERT`/`EMERGENCY`/`CRITICAL` shapes go to warn, the rest to info.
#[derive(Debug, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, message: &str) {
        if message.starts_with("ALERT")
            || message.starts_with("EMERGENCY")
            || message.starts_with("CRITICAL")
        {
            warn!(target: "rangekeeper::notify", "{message}");
        } else {
            info!(target: "rangekeeper::notify", "{message}");
        }
    }
}

/// Capturing sink for tests: records every message in order.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    messages: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }

    /// Whether any recorded message contains `needle`.
    pub fn saw(&self, needle: &str) -> bool {
        self.messages
            .lock()
            .unwrap()
            .iter()
            .any(|m| m.contains(needle))
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, message: &str) {
        self.messages.lock().unwrap().push(message.to_string());
    }
}
