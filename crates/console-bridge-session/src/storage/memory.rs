//! In-memory session storage.

use std::{collections::HashMap, sync::RwLock};

use async_trait::async_trait;
use console_bridge_core::traits::{
    Session, SessionId, SessionStorage, SessionSummary, StorageError,
};

#[derive(Default)]
struct Inner {
    sessions: HashMap<SessionId, Session>,
    by_name: HashMap<String, SessionId>,
}

impl Inner {
    fn resolve(&self, id_or_name: &str) -> Option<SessionId> {
        id_or_name
            .parse::<SessionId>()
            .ok()
            .filter(|id| self.sessions.contains_key(id))
            .or_else(|| self.by_name.get(id_or_name).copied())
    }
}

/// In-memory storage implementation.
///
/// Data is lost on restart.
#[derive(Default)]
pub struct MemoryStorage {
    inner: RwLock<Inner>,
}

impl MemoryStorage {
    /// Create a new in-memory storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<T>(e: std::sync::PoisonError<T>) -> StorageError {
    StorageError::Internal(e.to_string())
}

#[async_trait]
impl SessionStorage for MemoryStorage {
    async fn insert(&self, session: Session) -> Result<SessionId, StorageError> {
        let mut inner = self.inner.write().map_err(poisoned)?;

        if let Some(ref name) = session.name {
            if inner.by_name.contains_key(name) {
                return Err(StorageError::NameTaken(name.clone()));
            }
            inner.by_name.insert(name.clone(), session.id);
        }

        let id = session.id;
        inner.sessions.insert(id, session);
        Ok(id)
    }

    async fn get(&self, id_or_name: &str) -> Result<Option<Session>, StorageError> {
        let inner = self.inner.read().map_err(poisoned)?;
        Ok(inner
            .resolve(id_or_name)
            .and_then(|id| inner.sessions.get(&id))
            .cloned())
    }

    async fn list(&self) -> Result<Vec<SessionSummary>, StorageError> {
        let inner = self.inner.read().map_err(poisoned)?;
        let mut result: Vec<SessionSummary> =
            inner.sessions.values().map(SessionSummary::from).collect();

        // Sort by created descending
        result.sort_by(|a, b| b.created.cmp(&a.created));
        Ok(result)
    }

    async fn delete(&self, id_or_name: &str) -> Result<bool, StorageError> {
        let mut inner = self.inner.write().map_err(poisoned)?;
        let Some(id) = inner.resolve(id_or_name) else {
            return Ok(false);
        };
        let Some(session) = inner.sessions.remove(&id) else {
            return Ok(false);
        };
        if let Some(name) = session.name {
            inner.by_name.remove(&name);
        }
        Ok(true)
    }

    async fn clear(&self) -> Result<(), StorageError> {
        let mut inner = self.inner.write().map_err(poisoned)?;
        inner.sessions.clear();
        inner.by_name.clear();
        Ok(())
    }

    async fn count(&self) -> Result<usize, StorageError> {
        Ok(self.inner.read().map_err(poisoned)?.sessions.len())
    }
}
