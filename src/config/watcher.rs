//! Route table file watcher.
//!
//! Editors and `notify` backends often report several events for one save, so
//! each reload is keyed on a digest of the file contents and repeats are dropped.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use xxhash_rust::xxh64::xxh64;

use crate::config::loader::{parse_config, ConfigError};
use crate::config::schema::RouterConfig;
use crate::observability::metrics;

/// Sends a freshly parsed and validated `RouterConfig` each time the file changes.
pub struct ConfigWatcher {
    path: PathBuf,
    update_tx: mpsc::UnboundedSender<RouterConfig>,
    poll_interval: Duration,
}

impl ConfigWatcher {
    /// Returns the watcher and the receiving end of its update channel.
    pub fn new(path: &Path) -> (Self, mpsc::UnboundedReceiver<RouterConfig>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();

        (
            Self {
                path: path.to_path_buf(),
                update_tx,
                poll_interval: Duration::from_secs(2),
            },
            update_rx,
        )
    }

    /// Only used by polling backends.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Start watching. Events stop when the returned watcher is dropped.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let tx = self.update_tx;
        let path = self.path.clone();
        // Seed with the current contents so the initial table is not re-sent.
        let mut last_digest = fs::read(&path).ok().map(|bytes| xxh64(&bytes, 0));

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) if event.kind.is_modify() || event.kind.is_create() => {
                    match reload(&path, &mut last_digest) {
                        Ok(Some(config)) => {
                            tracing::info!(path = ?path, "Route config changed");
                            let _ = tx.send(config);
                        }
                        Ok(None) => tracing::trace!(path = ?path, "Route config unchanged"),
                        Err(e) => {
                            metrics::record_table_reload(false);
                            tracing::warn!(
                                path = ?path,
                                error = %e,
                                "Failed to reload route config, keeping current table"
                            );
                        }
                    }
                }
                Ok(_) => {}
                Err(e) => tracing::error!(error = ?e, "Route config watch error"),
            },
            Config::default().with_poll_interval(self.poll_interval),
        )?;

        watcher.watch(&self.path, RecursiveMode::NonRecursive)?;

        tracing::info!(path = ?self.path, "Route config watcher started");
        Ok(watcher)
    }
}

/// Parse the file if its contents differ from the last accepted version.
fn reload(path: &Path, last_digest: &mut Option<u64>) -> Result<Option<RouterConfig>, ConfigError> {
    let content = fs::read_to_string(path)?;
    let digest = xxh64(content.as_bytes(), 0);
    if *last_digest == Some(digest) {
        return Ok(None);
    }

    let config = parse_config(&content)?;
    *last_digest = Some(digest);
    Ok(Some(config))
}
