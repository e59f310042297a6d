//! Structured logging setup.
//!
//! Console logging filtered by `RUST_LOG`, with an optional daily-rolling
//! file stream for unattended runs.
//!
//! Component targets for filtering:
//!
//! | Target | Description |
//! |--------|-------------|
//! | `range_keeper::engine` | State machine transitions and rebalances |
//! | `range_keeper::chain` | Chain calls and gas observations |
//! | `rangekeeper::notify` | Operator notifications |
//!
//! ```bash
//! RUST_LOG=info,range_keeper::engine=debug rangekeeperd --config pools.json
//! ```

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Directory for rolling log files; `None` disables the file stream.
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    /// Default filter when `RUST_LOG` is unset.
    #[serde(default = "default_filter")]
    pub default_filter: String,
}

fn default_filter() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            log_dir: None,
            default_filter: default_filter(),
        }
    }
}

/// Install the global subscriber. Returns the appender guard that must be
/// held for the process lifetime when file logging is enabled.
pub fn init_logging(config: &LogConfig) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.default_filter.clone()));

    let stdout_layer = fmt::layer().with_target(true);

    match &config.log_dir {
        Some(dir) => {
            let appender = rolling::daily(dir, "rangekeeper.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let file_layer = fmt::layer().with_ansi(false).with_writer(writer);
            tracing_subscriber::registry()
                .with(filter)
                .with(stdout_layer)
                .with(file_layer)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(stdout_layer)
                .init();
            None
        }
    }
}
