//! Storage trait for saved log sessions.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::log_entry::{LogEntry, TabId};

/// Saved session identifier.
pub type SessionId = Uuid;

/// A named snapshot of log entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: SessionId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Timestamp of the first entry.
    pub start_time: i64,
    /// Timestamp of the last entry.
    pub end_time: i64,
    pub log_count: usize,
    /// Distinct tabs, in first-seen order.
    pub tabs: Vec<TabId>,
    pub logs: Vec<LogEntry>,
    /// Creation timestamp (Unix epoch milliseconds).
    pub created: i64,
}

/// Session metadata without its entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub id: SessionId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub start_time: i64,
    pub end_time: i64,
    pub log_count: usize,
    pub tabs: Vec<TabId>,
    pub created: i64,
}

impl From<&Session> for SessionSummary {
    fn from(session: &Session) -> Self {
        Self {
            id: session.id,
            name: session.name.clone(),
            description: session.description.clone(),
            start_time: session.start_time,
            end_time: session.end_time,
            log_count: session.log_count,
            tabs: session.tabs.clone(),
            created: session.created,
        }
    }
}

/// Storage error.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Session not found: {0}")]
    NotFound(String),
    #[error("Session with name \"{0}\" already exists")]
    NameTaken(String),
    #[error("Storage error: {0}")]
    Internal(String),
}

/// Trait for saved-session backends.
#[async_trait]
pub trait SessionStorage: Send + Sync {
    /// Insert a session. Fails if its name is already used.
    async fn insert(&self, session: Session) -> Result<SessionId, StorageError>;

    /// Look up by id, falling back to name.
    async fn get(&self, id_or_name: &str) -> Result<Option<Session>, StorageError>;

    /// Summaries of all sessions, newest first.
    async fn list(&self) -> Result<Vec<SessionSummary>, StorageError>;

    /// Delete by id or name. Returns whether anything was removed.
    async fn delete(&self, id_or_name: &str) -> Result<bool, StorageError>;

    /// Remove every session.
    async fn clear(&self) -> Result<(), StorageError>;

    /// Number of stored sessions.
    async fn count(&self) -> Result<usize, StorageError>;
}
