//! Durable-state schema.
//!
//! One JSON file holds every pool's state under its pool id. Only the
//! minimum needed to survive a crash is persisted: the band set, the
//! rebalance checkpoint, pending transaction hashes, and the loss-gate
//! baseline. Everything else rebuilds from the chain on boot.

use std::collections::BTreeMap;

use alloy::primitives::U256;
use serde::{Deserialize, Serialize};

use crate::serde_utils::u256_dec;

/// Current schema version.
pub const STATE_SCHEMA_VERSION: u32 = 1;

/// One persisted band. `token_id` travels as a decimal string — ids
/// routinely exceed 53 bits and must never pass through a float.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedBand {
    #[serde(with = "u256_dec")]
    pub token_id: U256,
    pub tick_lower: i32,
    pub tick_upper: i32,
}

/// Checkpoint stage of a mid-flight rebalance.
///
/// Present in persistence iff a rebalance was cut by a crash between its
/// chain operations. `Withdrawn` means the dissolved band is already out
/// of the persisted band list; `Swapped` means the list is unchanged since
/// the withdraw write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RebalanceStage {
    Withdrawn,
    Swapped,
}

impl RebalanceStage {
    /// Uppercase form used in recovery notifications.
    pub fn as_str(&self) -> &'static str {
        match self {
            RebalanceStage::Withdrawn => "WITHDRAWN",
            RebalanceStage::Swapped => "SWAPPED",
        }
    }
}

/// Everything persisted for one pool.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersistedPoolState {
    /// Band set as of the last durable write. Empty when the keeper holds
    /// no positions.
    #[serde(default)]
    pub bands: Vec<PersistedBand>,
    /// Common band width in ticks; `None` before the first mint.
    #[serde(default)]
    pub band_tick_width: Option<i32>,
    /// Wall-clock ms of the last completed rebalance.
    #[serde(default)]
    pub last_rebalance_time_ms: u64,
    /// Last nonce the chain driver consumed, when it reports one.
    #[serde(default)]
    pub last_nonce: Option<u64>,
    /// Mid-flight rebalance checkpoint, if any.
    #[serde(default)]
    pub rebalance_stage: Option<RebalanceStage>,
    /// Hashes of the transactions issued by the checkpointed stage.
    #[serde(default)]
    pub pending_tx_hashes: Vec<String>,
    /// Portfolio value at first mint; baseline for the cumulative loss gate.
    #[serde(default)]
    pub initial_value_usd: Option<f64>,
}

impl PersistedPoolState {
    /// Drop every rebalance artifact: bands, width, stage, pending hashes.
    /// Used by crash recovery before the keeper re-mints from scratch.
    pub fn clear_rebalance_artifacts(&mut self) {
        self.bands.clear();
        self.band_tick_width = None;
        self.rebalance_stage = None;
        self.pending_tx_hashes.clear();
    }
}

/// On-disk document: a version, the daemon start stamp, and per-pool state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateFile {
    pub version: u32,
    /// ISO-8601 timestamp of the daemon start that created this file.
    pub started_at: String,
    #[serde(default)]
    pub pools: BTreeMap<String, PersistedPoolState>,
}

impl StateFile {
    pub fn new(started_at: String) -> Self {
        Self {
            version: STATE_SCHEMA_VERSION,
            started_at,
            pools: BTreeMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_state_roundtrip() {
        let state = PersistedPoolState {
            bands: vec![PersistedBand {
                token_id: U256::from(900_000_001_u64),
                tick_lower: -21,
                tick_upper: 21,
            }],
            band_tick_width: Some(42),
            last_rebalance_time_ms: 1_700_000_000_000,
            last_nonce: Some(7),
            rebalance_stage: Some(RebalanceStage::Withdrawn),
            pending_tx_hashes: vec!["0xabc".to_string()],
            initial_value_usd: Some(20_000.0),
        };
        let json = serde_json::to_string(&state).unwrap();
        assert!(json.contains("\"900000001\""), "token id must be a string");
        let back: PersistedPoolState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, state);
    }

    #[test]
    fn test_empty_object_deserializes_to_defaults() {
        let state: PersistedPoolState = serde_json::from_str("{}").unwrap();
        assert!(state.bands.is_empty());
        assert_eq!(state.rebalance_stage, None);
        assert_eq!(state.initial_value_usd, None);
    }

    #[test]
    fn test_clear_rebalance_artifacts_keeps_baseline() {
        let mut state = PersistedPoolState {
            band_tick_width: Some(42),
            rebalance_stage: Some(RebalanceStage::Swapped),
            pending_tx_hashes: vec!["0x1".to_string()],
            initial_value_usd: Some(1_000.0),
            last_rebalance_time_ms: 5,
            ..Default::default()
        };
        state.clear_rebalance_artifacts();
        assert_eq!(state.rebalance_stage, None);
        assert!(state.pending_tx_hashes.is_empty());
        assert_eq!(state.band_tick_width, None);
        // Loss baseline and rebalance clock survive recovery.
        assert_eq!(state.initial_value_usd, Some(1_000.0));
        assert_eq!(state.last_rebalance_time_ms, 5);
    }

    #[test]
    fn test_stage_labels() {
        assert_eq!(RebalanceStage::Withdrawn.as_str(), "WITHDRAWN");
        assert_eq!(RebalanceStage::Swapped.as_str(), "SWAPPED");
    }
}
