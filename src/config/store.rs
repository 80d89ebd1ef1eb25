//! Dynamic configuration store.
//!
//! Holds the key/value entries learned from every registered file. Reads
//! are synchronous point lookups; updates arrive from one background
//! [`WatchTask`] per file.
//!
//! # Design Decisions
//! - One `RwLock` guards both the entries and the set of watched paths
//! - Files are read before the lock is taken; a whole parse pass is
//!   merged under a single write acquisition
//! - Keys are never removed; a deleted file leaves its last values behind
//! - Across files the last completed merge wins, no ordering is promised

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::config::parse::{ConfigError, ParseMode};
use crate::config::watcher::WatchTask;
use crate::lifecycle::ShutdownSignal;

#[derive(Debug, Default)]
struct StoreState {
    entries: HashMap<String, String>,
    watched: HashSet<PathBuf>,
}

/// Filesystem-backed key/value store.
///
/// Cloning is cheap and every clone sees the same entries. The store lives
/// until its shutdown signal fires, at which point every watch task
/// releases its OS handle and exits.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    state: Arc<RwLock<StoreState>>,
    shutdown: ShutdownSignal,
}

impl ConfigStore {
    /// Create an empty store whose watch tasks end on `shutdown`.
    pub fn new(shutdown: ShutdownSignal) -> Self {
        Self {
            state: Arc::new(RwLock::new(StoreState::default())),
            shutdown,
        }
    }

    /// Register `path` and keep its entries current.
    ///
    /// Registering the same path twice is a silent no-op. A file that does
    /// not exist yet is not an error: its entries show up once it is
    /// created. Any other read failure is returned, and the path stays
    /// registered, so retrying will not create a second watch.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn register_file(&self, path: impl AsRef<Path>, mode: ParseMode) -> Result<(), ConfigError> {
        let path = absolute(path.as_ref());

        if !self.write().watched.insert(path.clone()) {
            tracing::debug!(path = %path.display(), "Config file already registered");
            return Ok(());
        }

        let mut task = WatchTask::new(path.clone(), mode, self.clone())?;
        let attached = task.attach()?;

        match task.reload() {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {
                tracing::debug!(path = %path.display(), "Config file missing, waiting for it to appear");
            }
            Err(e) => return Err(e),
        }

        tracing::info!(path = %path.display(), %mode, attached, "Watching config file");
        tokio::spawn(task.run(self.shutdown.clone()));
        Ok(())
    }

    /// Current value for `key`, or an empty string.
    pub fn get(&self, key: &str) -> String {
        self.read().entries.get(key).cloned().unwrap_or_default()
    }

    /// Copy of every entry currently known.
    pub fn snapshot(&self) -> HashMap<String, String> {
        self.read().entries.clone()
    }

    /// Whether `path` has been registered.
    pub fn is_registered(&self, path: impl AsRef<Path>) -> bool {
        self.read().watched.contains(&absolute(path.as_ref()))
    }

    /// Apply one parse pass atomically.
    pub(crate) fn merge(&self, entries: HashMap<String, String>) {
        if entries.is_empty() {
            return;
        }
        self.write().entries.extend(entries);
    }

    fn read(&self) -> RwLockReadGuard<'_, StoreState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, StoreState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

fn absolute(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}
