//! Applies reloaded configurations to the published route table.

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};

use crate::config::loader::ConfigError;
use crate::config::schema::RouterConfig;
use crate::observability::metrics;
use crate::routing::{RouteTable, RouteTableHandle};
use crate::runtime::{InMemoryRuntime, Runtime};

/// Compiles configs into tables and publishes them.
///
/// A config that fails to compile is dropped and the current table stays live.
#[derive(Debug, Clone)]
pub struct TableReloader {
    handle: Arc<RouteTableHandle>,
    runtime: Arc<InMemoryRuntime>,
}

impl TableReloader {
    pub fn new(handle: Arc<RouteTableHandle>, runtime: Arc<InMemoryRuntime>) -> Self {
        Self { handle, runtime }
    }

    pub fn handle(&self) -> &Arc<RouteTableHandle> {
        &self.handle
    }

    /// Compile `config`, replace the runtime values with its own, and publish the table.
    pub fn apply(&self, config: &RouterConfig) -> Result<(), ConfigError> {
        let runtime: Arc<dyn Runtime> = self.runtime.clone();
        let table = RouteTable::from_config(config, runtime)?;

        self.runtime.replace_all(&config.runtime);
        self.handle.publish(table);
        metrics::record_table_reload(true);

        tracing::info!(
            virtual_hosts = config.virtual_hosts.len(),
            runtime_keys = config.runtime.len(),
            "Route table reloaded"
        );
        Ok(())
    }

    /// Apply updates until the channel closes or shutdown is signalled.
    pub async fn run(
        self,
        mut updates: mpsc::UnboundedReceiver<RouterConfig>,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        loop {
            tokio::select! {
                update = updates.recv() => match update {
                    Some(config) => {
                        if let Err(e) = self.apply(&config) {
                            metrics::record_table_reload(false);
                            tracing::warn!(error = %e, "Rejected reloaded config, keeping current table");
                        }
                    }
                    None => break,
                },
                _ = shutdown.recv() => {
                    tracing::info!("Table reloader shutting down");
                    break;
                }
            }
        }
    }
}
