//! Authoritative map of connected browser tabs.

use std::{
    collections::HashMap,
    sync::{PoisonError, RwLock},
};

use crate::log_entry::{TabId, TabInfo};

/// Connected tabs keyed by id.
///
/// Every operation is total: unknown ids are simply absent.
#[derive(Debug, Default)]
pub struct TabRegistry {
    tabs: RwLock<HashMap<TabId, TabInfo>>,
}

impl TabRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a tab by id.
    pub fn upsert(&self, tab: TabInfo) {
        self.tabs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(tab.id, tab);
    }

    /// Refresh `last_seen` of a known tab. Unknown ids are ignored.
    pub fn touch(&self, id: TabId, timestamp: i64) {
        let mut tabs = self.tabs.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(tab) = tabs.get_mut(&id) {
            tab.last_seen = tab.last_seen.max(timestamp);
        }
    }

    /// Remove a tab, returning its last record.
    pub fn remove(&self, id: TabId) -> Option<TabInfo> {
        self.tabs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id)
    }

    #[must_use]
    pub fn get(&self, id: TabId) -> Option<TabInfo> {
        self.tabs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
    }

    /// Snapshot of all tabs, ordered by id.
    #[must_use]
    pub fn list(&self) -> Vec<TabInfo> {
        let mut tabs: Vec<TabInfo> = self
            .tabs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        tabs.sort_by_key(|t| t.id);
        tabs
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tabs.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
