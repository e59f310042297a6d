//! Durable state store.
//!
//! All engines in a process share one state file; each writes only its own
//! pool key. The store serializes every mutation under an internal mutex
//! and writes atomically (tmp file + rename) so a crash can never leave a
//! torn document.
//!
//! Two write paths with different guarantees:
//! - [`StateStore::save`] — lossy. Failures are logged and swallowed; a
//!   lost write re-triggers recovery on the next boot, which is safe.
//! - [`StateStore::save_or_throw`] — fail-fast. Used for rebalance
//!   checkpoints: if the checkpoint cannot be made durable, the rebalance
//!   must stop before the next chain call.

mod types;

pub use types::{
    PersistedBand, PersistedPoolState, RebalanceStage, StateFile, STATE_SCHEMA_VERSION,
};

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::{info, warn};

use crate::errors::StoreError;

/// Contract the engine persists through.
pub trait StateStore: Send + Sync + 'static {
    /// Snapshot of one pool's persisted state, if any.
    fn pool_state(&self, pool_id: &str) -> Option<PersistedPoolState>;

    /// Mutate one pool's state in memory under the store lock. Creates the
    /// entry if missing. Does not touch disk — pair with a save call.
    fn update_pool(&self, pool_id: &str, apply: &mut dyn FnMut(&mut PersistedPoolState));

    /// Lossy durable write.
    fn save(&self);

    /// Fail-fast durable write.
    fn save_or_throw(&self) -> Result<(), StoreError>;
}

/// JSON-file-backed store.
pub struct FileStateStore {
    path: PathBuf,
    doc: Mutex<StateFile>,
}

impl FileStateStore {
    /// Open or create the state file at `path`.
    ///
    /// A present file is loaded as-is; a missing one starts a fresh
    /// document stamped with `started_at`.
    pub fn open(path: impl Into<PathBuf>, started_at: String) -> Result<Self, StoreError> {
        let path = path.into();
        let doc = if path.exists() {
            let raw = fs::read_to_string(&path)?;
            let doc: StateFile = serde_json::from_str(&raw)?;
            info!(
                path = %path.display(),
                pools = doc.pools.len(),
                version = doc.version,
                "loaded state file"
            );
            doc
        } else {
            StateFile::new(started_at)
        };
        Ok(Self {
            path,
            doc: Mutex::new(doc),
        })
    }

    fn write_locked(&self, doc: &StateFile) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(doc)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, &json)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StateStore for FileStateStore {
    fn pool_state(&self, pool_id: &str) -> Option<PersistedPoolState> {
        self.doc.lock().unwrap().pools.get(pool_id).cloned()
    }

    fn update_pool(&self, pool_id: &str, apply: &mut dyn FnMut(&mut PersistedPoolState)) {
        let mut doc = self.doc.lock().unwrap();
        let entry = doc.pools.entry(pool_id.to_string()).or_default();
        apply(entry);
    }

    fn save(&self) {
        let doc = self.doc.lock().unwrap();
        if let Err(e) = self.write_locked(&doc) {
            warn!(path = %self.path.display(), error = %e, "lossy state save failed");
        }
    }

    fn save_or_throw(&self) -> Result<(), StoreError> {
        let doc = self.doc.lock().unwrap();
        self.write_locked(&doc)
    }
}

/// In-memory store for tests and throwaway dry runs. Same semantics as
/// [`FileStateStore`] minus the disk.
#[derive(Default)]
pub struct MemoryStateStore {
    doc: Mutex<StateFile>,
    fail_saves: Mutex<u32>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self {
            doc: Mutex::new(StateFile::new(String::new())),
            fail_saves: Mutex::new(0),
        }
    }

    /// Make the next `n` fail-fast saves error out.
    pub fn fail_next_saves(&self, n: u32) {
        *self.fail_saves.lock().unwrap() = n;
    }

    /// Seed a pool's state directly (crash-recovery test setup).
    pub fn seed_pool(&self, pool_id: &str, state: PersistedPoolState) {
        self.doc
            .lock()
            .unwrap()
            .pools
            .insert(pool_id.to_string(), state);
    }
}

impl StateStore for MemoryStateStore {
    fn pool_state(&self, pool_id: &str) -> Option<PersistedPoolState> {
        self.doc.lock().unwrap().pools.get(pool_id).cloned()
    }

    fn update_pool(&self, pool_id: &str, apply: &mut dyn FnMut(&mut PersistedPoolState)) {
        let mut doc = self.doc.lock().unwrap();
        let entry = doc.pools.entry(pool_id.to_string()).or_default();
        apply(entry);
    }

    fn save(&self) {}

    fn save_or_throw(&self) -> Result<(), StoreError> {
        let mut failures = self.fail_saves.lock().unwrap();
        if *failures > 0 {
            *failures -= 1;
            return Err(StoreError::Io(std::io::Error::other(
                "injected save failure",
            )));
        }
        Ok(())
    }
}

impl Default for StateFile {
    fn default() -> Self {
        StateFile::new(String::new())
    }
}
