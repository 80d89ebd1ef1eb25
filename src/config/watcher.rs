//! Configuration file watcher for hot reload.
//!
//! One [`WatchTask`] per registered file. The task waits on file events and
//! the shutdown signal at the same time and re-parses the file into the
//! store whenever it changes.
//!
//! Tools that replace a file (delete + recreate, or rename over it) leave
//! the OS watch pointing at a dead inode, so removal and rename events
//! re-attach the watch to the same path. While the path does not exist the
//! task stays detached and retries on a timer.

use std::path::PathBuf;
use std::time::Duration;

use notify::event::ModifyKind;
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::time::{self, MissedTickBehavior};

use crate::config::parse::{is_missing_path, parse_file, ConfigError, ParseMode};
use crate::config::store::ConfigStore;
use crate::lifecycle::ShutdownSignal;

/// How often a detached task looks for its file again.
const REATTACH_INTERVAL: Duration = Duration::from_secs(1);

/// Only used when notify falls back to polling.
const POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Background task keeping one file's entries current.
pub(crate) struct WatchTask {
    path: PathBuf,
    mode: ParseMode,
    watcher: RecommendedWatcher,
    events: mpsc::UnboundedReceiver<notify::Result<Event>>,
    store: ConfigStore,
    attached: bool,
}

impl WatchTask {
    /// Create the OS watcher. Nothing is watched until [`attach`](Self::attach).
    pub(crate) fn new(path: PathBuf, mode: ParseMode, store: ConfigStore) -> Result<Self, ConfigError> {
        let (tx, events) = mpsc::unbounded_channel();

        let watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| {
                let _ = tx.send(res);
            },
            Config::default().with_poll_interval(POLL_INTERVAL),
        )
        .map_err(|source| ConfigError::Watch {
            path: path.clone(),
            source,
        })?;

        Ok(Self {
            path,
            mode,
            watcher,
            events,
            store,
            attached: false,
        })
    }

    /// Attach the OS watch to the path.
    ///
    /// Returns `Ok(false)` when the path does not exist yet.
    pub(crate) fn attach(&mut self) -> Result<bool, ConfigError> {
        match self.watcher.watch(&self.path, RecursiveMode::NonRecursive) {
            Ok(()) => {
                self.attached = true;
                Ok(true)
            }
            Err(e) if is_missing_path(&e) => {
                self.attached = false;
                Ok(false)
            }
            Err(source) => Err(ConfigError::Watch {
                path: self.path.clone(),
                source,
            }),
        }
    }

    /// Parse the file and merge its entries into the store.
    pub(crate) fn reload(&self) -> Result<(), ConfigError> {
        let entries = parse_file(&self.path, self.mode)?;
        tracing::debug!(path = %self.path.display(), keys = entries.len(), "Config file parsed");
        self.store.merge(entries);
        Ok(())
    }

    /// Event loop. Returns (dropping the OS watcher) on shutdown.
    pub(crate) async fn run(mut self, mut shutdown: ShutdownSignal) {
        let mut reattach = time::interval(REATTACH_INTERVAL);
        reattach.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    tracing::debug!(path = %self.path.display(), "Config watcher stopping");
                    break;
                }
                Some(res) = self.events.recv() => self.handle(res),
                _ = reattach.tick(), if !self.attached => self.reattach(),
            }
        }
    }

    fn handle(&mut self, res: notify::Result<Event>) {
        let event = match res {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Watch error");
                return;
            }
        };

        match event.kind {
            EventKind::Remove(_) | EventKind::Modify(ModifyKind::Name(_)) => {
                tracing::info!(path = %self.path.display(), "Config file replaced, re-attaching watch");
                let _ = self.watcher.unwatch(&self.path);
                self.attached = false;
                self.reattach();
            }
            EventKind::Access(_) | EventKind::Modify(ModifyKind::Metadata(_)) => {}
            _ => self.reload_logged(),
        }
    }

    fn reattach(&mut self) {
        match self.attach() {
            Ok(true) => {
                tracing::debug!(path = %self.path.display(), "Config watch attached");
                self.reload_logged();
            }
            Ok(false) => {
                tracing::trace!(path = %self.path.display(), "Config file still missing");
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to re-attach config watch");
            }
        }
    }

    fn reload_logged(&self) {
        if let Err(e) = self.reload() {
            tracing::warn!(error = %e, "Failed to reload config file. Keeping current values.");
        }
    }
}
