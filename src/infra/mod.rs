//! Ambient infrastructure: logging, notifications, history, health.

pub mod health;
pub mod history;
pub mod logging;
pub mod notify;

pub use health::{HealthSurface, PoolHealth};
pub use history::{HistoryEntry, HistoryKind, HistoryLog, JsonlHistory};
pub use logging::{init_logging, LogConfig};
pub use notify::{Notifier, TracingNotifier};
