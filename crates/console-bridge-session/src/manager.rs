//! Session manager for saving and restoring snapshots of log entries.

use std::collections::HashSet;

use console_bridge_core::{
    LogEntry,
    log_entry::now_millis,
    traits::{Session, SessionId, SessionStorage, SessionSummary, StorageError},
};
use uuid::Uuid;

/// Session manager error.
#[derive(Debug, thiserror::Error)]
pub enum ManagerError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("Session not found: {0}")]
    NotFound(String),
}

/// Saves and restores named snapshots of log entries.
pub struct SessionManager<S>
where
    S: SessionStorage,
{
    storage: S,
}

impl<S> SessionManager<S>
where
    S: SessionStorage,
{
    /// Create a new session manager.
    #[must_use]
    pub const fn new(storage: S) -> Self {
        Self { storage }
    }

    /// Save `logs` as a new session.
    ///
    /// # Errors
    /// Returns `NameTaken` if `name` is already in use.
    pub async fn save(
        &self,
        logs: Vec<LogEntry>,
        name: Option<String>,
        description: Option<String>,
    ) -> Result<SessionId, ManagerError> {
        let now = now_millis();
        let mut seen = HashSet::new();
        let tabs = logs
            .iter()
            .filter(|l| seen.insert(l.tab_id))
            .map(|l| l.tab_id)
            .collect();

        let session = Session {
            id: Uuid::new_v4(),
            name,
            description,
            start_time: logs.first().map_or(now, |l| l.timestamp),
            end_time: logs.last().map_or(now, |l| l.timestamp),
            log_count: logs.len(),
            tabs,
            logs,
            created: now,
        };

        let id = self.storage.insert(session).await?;
        tracing::info!(session_id = %id, "Saved log session");
        Ok(id)
    }

    /// Entries of a session, by id or name.
    ///
    /// # Errors
    /// Returns `NotFound` if no session matches.
    pub async fn load(&self, id_or_name: &str) -> Result<Vec<LogEntry>, ManagerError> {
        Ok(self.get(id_or_name).await?.logs)
    }

    /// Full session, by id or name.
    ///
    /// # Errors
    /// Returns `NotFound` if no session matches.
    pub async fn get(&self, id_or_name: &str) -> Result<Session, ManagerError> {
        self.storage
            .get(id_or_name)
            .await?
            .ok_or_else(|| ManagerError::NotFound(id_or_name.to_string()))
    }

    /// Summaries, newest first.
    ///
    /// # Errors
    /// Returns error if the backend fails.
    pub async fn list(&self) -> Result<Vec<SessionSummary>, ManagerError> {
        Ok(self.storage.list().await?)
    }

    /// Delete by id or name.
    ///
    /// # Errors
    /// Returns `NotFound` if no session matches.
    pub async fn delete(&self, id_or_name: &str) -> Result<(), ManagerError> {
        if self.storage.delete(id_or_name).await? {
            Ok(())
        } else {
            Err(ManagerError::NotFound(id_or_name.to_string()))
        }
    }

    /// Remove every session.
    ///
    /// # Errors
    /// Returns error if the backend fails.
    pub async fn clear(&self) -> Result<(), ManagerError> {
        Ok(self.storage.clear().await?)
    }

    /// Number of saved sessions.
    ///
    /// # Errors
    /// Returns error if the backend fails.
    pub async fn count(&self) -> Result<usize, ManagerError> {
        Ok(self.storage.count().await?)
    }
}
