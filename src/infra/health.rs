//! Process-wide health surface.
//!
//! Engines push their observable status here; operators (or a future
//! status endpoint) read snapshots. The surface is write-only from the
//! engine's perspective — nothing in the core reads it back.

use std::collections::HashMap;
use std::sync::RwLock;

use serde::Serialize;

/// Observable status of one pool's engine.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PoolHealth {
    pub state: String,
    pub band_count: usize,
    pub last_tick: Option<i32>,
    pub consecutive_errors: u32,
    pub last_rebalance_time_ms: u64,
    pub emergency_stopped: bool,
    pub updated_ms: u64,
}

/// Shared observability sink, one entry per pool id.
#[derive(Debug, Default)]
pub struct HealthSurface {
    pools: RwLock<HashMap<String, PoolHealth>>,
}

impl HealthSurface {
    pub fn new() -> Self {
        Self::default()
    }

    /// Patch one pool's status. Creates the entry if missing.
    pub fn update_pool_status(&self, pool_id: &str, apply: impl FnOnce(&mut PoolHealth)) {
        let mut pools = self.pools.write().unwrap();
        let entry = pools.entry(pool_id.to_string()).or_default();
        apply(entry);
    }

    /// Snapshot of one pool's status.
    pub fn pool_status(&self, pool_id: &str) -> Option<PoolHealth> {
        self.pools.read().unwrap().get(pool_id).cloned()
    }

    /// Snapshot of every pool.
    pub fn snapshot(&self) -> HashMap<String, PoolHealth> {
        self.pools.read().unwrap().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_patch_creates_and_updates() {
        let surface = HealthSurface::new();
        surface.update_pool_status("p", |h| {
            h.state = "Monitoring".into();
            h.band_count = 7;
        });
        surface.update_pool_status("p", |h| h.consecutive_errors = 2);

        let status = surface.pool_status("p").unwrap();
        assert_eq!(status.state, "Monitoring");
        assert_eq!(status.band_count, 7);
        assert_eq!(status.consecutive_errors, 2);
        assert!(surface.pool_status("other").is_none());
    }
}
