//! Daemon and per-pool configuration.
//!
//! Loaded from a JSON file; every knob with a sane default is optional.

use std::fs;
use std::path::{Path, PathBuf};

use alloy::primitives::Address;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::infra::LogConfig;

/// Immutable parameters of one keeper engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Stable identifier; also the key in the persisted state file.
    pub pool_id: String,
    pub token0: Address,
    pub token1: Address,
    pub decimals0: u8,
    pub decimals1: u8,
    /// Fee tier in hundredths of a bip (100 / 500 / 3000 / 10000).
    pub fee: u32,
    /// Wallet that owns the positions.
    pub owner: Address,

    /// Total price range the seven bands cover, in percent.
    pub range_width_percent: f64,
    #[serde(default = "default_min_rebalance_interval_minutes")]
    pub min_rebalance_interval_minutes: u64,
    #[serde(default = "default_max_gas_cost_usd")]
    pub max_gas_cost_usd: f64,
    #[serde(default = "default_slippage_tolerance_percent")]
    pub slippage_tolerance_percent: f64,
    /// Expected price ratio for the depeg check; `None` disables it.
    #[serde(default)]
    pub expected_price_ratio: Option<f64>,
    #[serde(default = "default_depeg_threshold_percent")]
    pub depeg_threshold_percent: f64,
    /// Poll cadence of the price monitor.
    #[serde(default = "default_check_interval_seconds")]
    pub check_interval_seconds: u64,
    /// Cumulative loss limit vs the value at first mint, in percent.
    #[serde(default = "default_max_total_loss_percent")]
    pub max_total_loss_percent: f64,
    /// ETH price for gas cost estimates; a conservative fallback constant
    /// applies when unset.
    #[serde(default)]
    pub eth_price_usd: Option<f64>,
}

fn default_min_rebalance_interval_minutes() -> u64 {
    10
}

fn default_max_gas_cost_usd() -> f64 {
    50.0
}

fn default_slippage_tolerance_percent() -> f64 {
    0.5
}

fn default_depeg_threshold_percent() -> f64 {
    5.0
}

fn default_check_interval_seconds() -> u64 {
    60
}

fn default_max_total_loss_percent() -> f64 {
    10.0
}

impl PoolConfig {
    pub fn min_rebalance_interval_ms(&self) -> u64 {
        self.min_rebalance_interval_minutes * 60_000
    }
}

/// Top-level daemon configuration: shared files plus one entry per pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_state_file")]
    pub state_file: PathBuf,
    #[serde(default = "default_history_file")]
    pub history_file: PathBuf,
    #[serde(default)]
    pub log: LogConfig,
    pub pools: Vec<PoolConfig>,
}

fn default_state_file() -> PathBuf {
    PathBuf::from("data/rangekeeper-state.json")
}

fn default_history_file() -> PathBuf {
    PathBuf::from("data/rangekeeper-history.jsonl")
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Config parse: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Config invalid: {0}")]
    Invalid(String),
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: AppConfig = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.pools.is_empty() {
            return Err(ConfigError::Invalid("no pools configured".into()));
        }
        let mut seen = std::collections::HashSet::new();
        for pool in &self.pools {
            if !seen.insert(&pool.pool_id) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate pool id {}",
                    pool.pool_id
                )));
            }
            if pool.range_width_percent <= 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "pool {}: range_width_percent must be positive",
                    pool.pool_id
                )));
            }
            if pool.token0 == pool.token1 {
                return Err(ConfigError::Invalid(format!(
                    "pool {}: token0 equals token1",
                    pool.pool_id
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_pool_json() -> &'static str {
        r#"{
            "pool_id": "usdc-dai-100",
            "token0": "0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48",
            "token1": "0x6b175474e89094c44da98b954eedeac495271d0f",
            "decimals0": 6,
            "decimals1": 18,
            "fee": 100,
            "owner": "0x000000000000000000000000000000000000dEaD",
            "range_width_percent": 3.0,
            "expected_price_ratio": 1.0
        }"#
    }

    #[test]
    fn test_pool_defaults_fill_in() {
        let pool: PoolConfig = serde_json::from_str(minimal_pool_json()).unwrap();
        assert_eq!(pool.min_rebalance_interval_minutes, 10);
        assert_eq!(pool.depeg_threshold_percent, 5.0);
        assert_eq!(pool.check_interval_seconds, 60);
        assert_eq!(pool.min_rebalance_interval_ms(), 600_000);
        assert_eq!(pool.eth_price_usd, None);
    }

    #[test]
    fn test_app_config_validation() {
        let pool: PoolConfig = serde_json::from_str(minimal_pool_json()).unwrap();
        let mut config = AppConfig {
            state_file: default_state_file(),
            history_file: default_history_file(),
            log: LogConfig::default(),
            pools: vec![pool.clone(), pool],
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        config.pools.truncate(1);
        assert!(config.validate().is_ok());

        config.pools.clear();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }
}
