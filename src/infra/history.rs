//! Append-only history of chain-mutating actions.
//!
//! Every mint, rebalance, and emergency stop is recorded with its
//! transaction hashes and the resulting band set. The log is advisory:
//! losing entries is tolerated, so writes are lossy and failures only
//! warn.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::persist::PersistedBand;

/// Event kind, serialized in the historical SCREAMING_SNAKE form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HistoryKind {
    Mint,
    Rebalance,
    EmergencyStop,
}

/// One history record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub timestamp_ms: u64,
    pub pool_id: String,
    pub kind: HistoryKind,
    /// `"Lower"` / `"Upper"` for rebalances, absent otherwise.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direction: Option<String>,
    #[serde(default)]
    pub tx_hashes: Vec<String>,
    /// Band set after the event.
    #[serde(default)]
    pub bands: Vec<PersistedBand>,
    /// Free-form detail (emergency reason, skip cause).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Append-only sink.
pub trait HistoryLog: Send + Sync {
    fn record(&self, entry: HistoryEntry);
}

/// JSONL-file-backed history, one record per line.
pub struct JsonlHistory {
    path: PathBuf,
    file: Mutex<Option<File>>,
}

impl JsonlHistory {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            path,
            file: Mutex::new(None),
        }
    }

    fn ensure_file(&self, slot: &mut Option<File>) -> std::io::Result<()> {
        if slot.is_none() {
            if let Some(parent) = self.path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
            *slot = Some(OpenOptions::new().create(true).append(true).open(&self.path)?);
        }
        Ok(())
    }
}

impl HistoryLog for JsonlHistory {
    fn record(&self, entry: HistoryEntry) {
        let mut slot = self.file.lock().unwrap();
        let result = self.ensure_file(&mut slot).and_then(|()| {
            let file = slot.as_mut().expect("file opened above");
            let line = serde_json::to_string(&entry)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
            writeln!(file, "{line}")
        });
        if let Err(e) = result {
            // Loss of history entries is tolerated by design of the log.
            warn!(path = %self.path.display(), error = %e, "history append failed");
            *slot = None;
        }
    }
}

/// Capturing sink for tests.
#[derive(Default)]
pub struct RecordingHistory {
    entries: Mutex<Vec<HistoryEntry>>,
}

impl RecordingHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<HistoryEntry> {
        self.entries.lock().unwrap().clone()
    }

    pub fn count_of(&self, kind: HistoryKind) -> usize {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.kind == kind)
            .count()
    }
}

impl HistoryLog for RecordingHistory {
    fn record(&self, entry: HistoryEntry) {
        self.entries.lock().unwrap().push(entry);
    }
}
