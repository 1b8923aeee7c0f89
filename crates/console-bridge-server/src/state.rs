//! Shared application state.

use std::{path::PathBuf, sync::Arc, time::Duration};

use console_bridge_core::{LogStore, LogStoreConfig, TabRegistry};
use console_bridge_session::{SessionManager, storage::MemoryStorage};
use console_bridge_transport::{ConnectionConfig, ConnectionManager, RpcCorrelator};
use tokio::sync::broadcast;

use crate::config::Config;

/// State shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<LogStore>,
    pub manager: Arc<ConnectionManager>,
    pub rpc: RpcCorrelator,
    pub sessions: Arc<SessionManager<MemoryStorage>>,
    /// Directory used when a suggestion request names none.
    pub working_dir: PathBuf,
    /// Fires once on shutdown so long-lived streams can end.
    pub shutdown: broadcast::Sender<()>,
}

impl AppState {
    #[must_use]
    pub fn new(
        store: LogStoreConfig,
        connection: ConnectionConfig,
        command_timeout: Duration,
        working_dir: PathBuf,
    ) -> Self {
        let store = Arc::new(LogStore::new(store));
        let manager = Arc::new(ConnectionManager::new(
            store.clone(),
            Arc::new(TabRegistry::new()),
            connection,
        ));
        let (shutdown, _) = broadcast::channel(1);
        Self {
            rpc: RpcCorrelator::new(manager.clone(), command_timeout),
            store,
            manager,
            sessions: Arc::new(SessionManager::new(MemoryStorage::new())),
            working_dir,
            shutdown,
        }
    }

    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.log_store(),
            config.connection(),
            config.command_timeout(),
            config.working_dir(),
        )
    }
}
