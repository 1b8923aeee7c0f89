//! Bounded log store with filtered snapshots and live tailing.

use std::{
    collections::{BTreeMap, HashSet, VecDeque},
    sync::{PoisonError, RwLock},
};

use futures::StreamExt;
use serde::Serialize;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

use crate::{
    error::CoreError,
    filter::{FilterOptions, TimeBound},
    log_entry::{LogEntry, LogLevel, TabId, now_millis},
};

/// Default retention limit (entries).
pub const DEFAULT_CAPACITY: usize = 10_000;

/// Live listener buffer. Slow listeners skip entries rather than stall ingestion.
const LIVE_BUFFER: usize = 1024;

/// Log store configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogStoreConfig {
    /// Maximum number of retained entries.
    pub capacity: usize,
}

impl Default for LogStoreConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
        }
    }
}

/// Aggregate counts over the current contents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogStats {
    pub total: usize,
    pub tabs: usize,
    pub by_level: BTreeMap<LogLevel, usize>,
}

/// Append-only log store with oldest-first eviction.
///
/// All reads return owned snapshots; later `add`/`clear` calls never
/// affect a snapshot already handed out.
pub struct LogStore {
    entries: RwLock<VecDeque<LogEntry>>,
    capacity: usize,
    sender: broadcast::Sender<LogEntry>,
}

impl Default for LogStore {
    fn default() -> Self {
        Self::new(LogStoreConfig::default())
    }
}

impl LogStore {
    /// Create a new log store.
    #[must_use]
    pub fn new(config: LogStoreConfig) -> Self {
        let (sender, _) = broadcast::channel(LIVE_BUFFER);
        Self {
            entries: RwLock::new(VecDeque::with_capacity(config.capacity.min(1024))),
            capacity: config.capacity,
            sender,
        }
    }

    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append an entry, silently evicting the oldest ones past capacity.
    pub fn add(&self, entry: LogEntry) {
        let mut entries = self.write();
        entries.push_back(entry.clone());
        let mut evicted = 0usize;
        while entries.len() > self.capacity {
            entries.pop_front();
            evicted += 1;
        }
        if evicted > 0 {
            tracing::trace!(evicted, "Evicted oldest log entries");
        }
        // Sent under the lock so `follow` never sees a gap or a duplicate.
        let _ = self.sender.send(entry);
    }

    /// Snapshot of matching entries, oldest first.
    ///
    /// # Errors
    /// Returns an input error if the filter does not compile.
    pub fn get_all(&self, filter: &FilterOptions) -> Result<Vec<LogEntry>, CoreError> {
        let filter = filter.compile(now_millis())?;
        Ok(self
            .read()
            .iter()
            .filter(|e| filter.matches(e))
            .cloned()
            .collect())
    }

    /// Point lookup by entry id.
    ///
    /// # Errors
    /// Returns `LogNotFound` if no retained entry has this id.
    pub fn get(&self, id: &str) -> Result<LogEntry, CoreError> {
        self.read()
            .iter()
            .find(|e| e.id == id)
            .cloned()
            .ok_or_else(|| CoreError::LogNotFound(id.to_string()))
    }

    /// The most recent `lines` matching entries, oldest first.
    ///
    /// # Errors
    /// Returns an input error if the filter does not compile.
    pub fn tail(&self, lines: usize, filter: &FilterOptions) -> Result<Vec<LogEntry>, CoreError> {
        let mut matching = self.get_all(filter)?;
        let skip = matching.len().saturating_sub(lines);
        matching.drain(..skip);
        Ok(matching)
    }

    #[must_use]
    pub fn get_tab_count(&self, tab_id: TabId) -> usize {
        self.read().iter().filter(|e| e.tab_id == tab_id).count()
    }

    #[must_use]
    pub fn get_total_count(&self) -> usize {
        self.read().len()
    }

    /// Distinct tab ids present in the store, in first-seen order.
    #[must_use]
    pub fn get_all_tabs(&self) -> Vec<TabId> {
        let mut seen = HashSet::new();
        self.read()
            .iter()
            .filter(|e| seen.insert(e.tab_id))
            .map(|e| e.tab_id)
            .collect()
    }

    #[must_use]
    pub fn stats(&self) -> LogStats {
        let entries = self.read();
        let mut by_level = BTreeMap::new();
        let mut tabs = HashSet::new();
        for entry in entries.iter() {
            *by_level.entry(entry.level).or_insert(0) += 1;
            tabs.insert(entry.tab_id);
        }
        LogStats {
            total: entries.len(),
            tabs: tabs.len(),
            by_level,
        }
    }

    /// Remove entries for `tab_id` and/or older than `before`.
    ///
    /// With both arguments omitted everything is removed. Returns the
    /// number of entries removed.
    ///
    /// # Errors
    /// Returns an input error if `before` cannot be resolved.
    pub fn clear(
        &self,
        tab_id: Option<TabId>,
        before: Option<&TimeBound>,
    ) -> Result<usize, CoreError> {
        let before = before.map(|b| b.resolve(now_millis())).transpose()?;
        let mut entries = self.write();
        let initial = entries.len();
        entries.retain(|e| {
            let tab_hit = tab_id.is_none_or(|id| e.tab_id == id);
            let time_hit = before.is_none_or(|b| e.timestamp < b);
            !(tab_hit && time_hit)
        });
        let removed = initial - entries.len();
        tracing::debug!(removed, ?tab_id, ?before, "Cleared log entries");
        Ok(removed)
    }

    /// Receiver for entries added from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<LogEntry> {
        self.sender.subscribe()
    }

    /// Stream that yields the last `lines` matching entries, then every
    /// matching entry added afterwards.
    ///
    /// # Errors
    /// Returns an input error if the filter does not compile.
    pub fn follow(
        &self,
        filter: &FilterOptions,
        lines: usize,
    ) -> Result<futures::stream::BoxStream<'static, LogEntry>, CoreError> {
        let compiled = filter.compile(now_millis())?;
        let (history, rx) = {
            let entries = self.read();
            let matching: Vec<LogEntry> =
                entries.iter().filter(|e| compiled.matches(e)).cloned().collect();
            (matching, self.sender.subscribe())
        };
        let skip = history.len().saturating_sub(lines);

        let hist = futures::stream::iter(history.into_iter().skip(skip));
        let live = BroadcastStream::new(rx).filter_map(move |res| {
            let keep = res.ok().filter(|e| compiled.matches(e));
            async move { keep }
        });

        Ok(Box::pin(hist.chain(live)))
    }

    /// SSE stream (requires `sse` feature).
    ///
    /// # Errors
    /// Returns an input error if the filter does not compile.
    #[cfg(feature = "sse")]
    pub fn sse_stream(
        &self,
        filter: &FilterOptions,
        lines: usize,
    ) -> Result<
        futures::stream::BoxStream<'static, Result<axum::response::sse::Event, std::io::Error>>,
        CoreError,
    > {
        Ok(self
            .follow(filter, lines)?
            .map(|entry| {
                axum::response::sse::Event::default()
                    .event("log")
                    .json_data(&entry)
                    .map_err(std::io::Error::other)
            })
            .boxed())
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, VecDeque<LogEntry>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, VecDeque<LogEntry>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn entry(id: usize, level: LogLevel, tab_id: TabId, timestamp: i64) -> LogEntry {
        LogEntry {
            id: format!("log-{id}"),
            timestamp,
            level,
            message: format!("message {id}"),
            args: Vec::new(),
            stack: None,
            tab_id,
            url: "http://localhost:3000/".into(),
            session_id: None,
        }
    }

    fn store(capacity: usize) -> LogStore {
        LogStore::new(LogStoreConfig { capacity })
    }

    #[test]
    fn test_eviction_keeps_most_recent_in_order() {
        let store = store(5);
        for i in 0..12 {
            store.add(entry(i, LogLevel::Log, 1, i as i64));
            assert!(store.get_total_count() <= 5);
        }
        let ids: Vec<String> = store
            .get_all(&FilterOptions::default())
            .unwrap()
            .into_iter()
            .map(|e| e.id)
            .collect();
        assert_eq!(ids, ["log-7", "log-8", "log-9", "log-10", "log-11"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_adds_stay_bounded_and_ordered() {
        const PRODUCERS: usize = 8;
        const PER_PRODUCER: usize = 500;
        const CAPACITY: usize = 64;

        let store = Arc::new(store(CAPACITY));
        let mut handles = Vec::new();
        for producer in 0..PRODUCERS {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                for seq in 0..PER_PRODUCER {
                    let mut e = entry(seq, LogLevel::Log, producer as TabId, seq as i64);
                    e.id = format!("p{producer}-{seq}");
                    store.add(e);
                    if seq % 50 == 0 {
                        tokio::task::yield_now().await;
                    }
                }
            }));
        }
        let reader = {
            let store = store.clone();
            tokio::spawn(async move {
                for _ in 0..200 {
                    assert!(store.get_all(&FilterOptions::default()).unwrap().len() <= CAPACITY);
                    tokio::task::yield_now().await;
                }
            })
        };
        for handle in handles {
            handle.await.unwrap();
        }
        reader.await.unwrap();

        assert_eq!(store.get_total_count(), CAPACITY);
        let retained = store.get_all(&FilterOptions::default()).unwrap();
        let unique: HashSet<&str> = retained.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(unique.len(), retained.len());

        let mut last_seq: BTreeMap<TabId, i64> = BTreeMap::new();
        for e in &retained {
            if let Some(prev) = last_seq.insert(e.tab_id, e.timestamp) {
                assert!(prev < e.timestamp, "producer {} out of order", e.tab_id);
            }
        }
    }

    #[test]
    fn test_level_filter_scenario() {
        let store = LogStore::default();
        let t = 1_700_000_000_000;
        store.add(entry(1, LogLevel::Log, 1, t));
        store.add(entry(2, LogLevel::Error, 1, t + 1000));
        store.add(entry(3, LogLevel::Error, 1, t + 2000));

        let errors = store
            .get_all(&FilterOptions::for_levels([LogLevel::Error]))
            .unwrap();
        let ids: Vec<&str> = errors.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, ["log-2", "log-3"]);
    }

    #[test]
    fn test_get_all_is_idempotent() {
        let store = LogStore::default();
        for i in 0..4 {
            store.add(entry(i, LogLevel::Warn, (i % 2) as TabId, i as i64));
        }
        let filter = FilterOptions::for_tab(1);
        assert_eq!(store.get_all(&filter).unwrap(), store.get_all(&filter).unwrap());
        assert_eq!(store.get_total_count(), 4);
    }

    #[test]
    fn test_snapshot_unaffected_by_later_mutation() {
        let store = LogStore::default();
        store.add(entry(1, LogLevel::Log, 1, 1));
        let snapshot = store.get_all(&FilterOptions::default()).unwrap();
        store.add(entry(2, LogLevel::Log, 1, 2));
        store.clear(None, None).unwrap();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(store.get_total_count(), 0);
    }

    #[test]
    fn test_relative_after_filter() {
        let store = LogStore::default();
        let now = now_millis();
        store.add(entry(1, LogLevel::Log, 1, now - 10 * 60_000));
        store.add(entry(2, LogLevel::Log, 1, now - 60_000));
        let recent = store
            .get_all(&FilterOptions {
                after: Some(TimeBound::relative("5m")),
                ..FilterOptions::default()
            })
            .unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].id, "log-2");
    }

    #[test]
    fn test_counts_and_tabs() {
        let store = LogStore::default();
        store.add(entry(1, LogLevel::Log, 5, 1));
        store.add(entry(2, LogLevel::Error, 3, 2));
        store.add(entry(3, LogLevel::Error, 5, 3));
        assert_eq!(store.get_tab_count(5), 2);
        assert_eq!(store.get_tab_count(9), 0);
        assert_eq!(store.get_all_tabs(), vec![5, 3]);

        let stats = store.stats();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.tabs, 2);
        assert_eq!(stats.by_level.get(&LogLevel::Error), Some(&2));
    }

    #[test]
    fn test_get_by_id() {
        let store = LogStore::default();
        store.add(entry(1, LogLevel::Log, 1, 1));
        assert_eq!(store.get("log-1").unwrap().message, "message 1");
        assert!(matches!(store.get("nope"), Err(CoreError::LogNotFound(_))));
    }

    #[test]
    fn test_clear_variants() {
        let store = LogStore::default();
        for i in 0..6 {
            store.add(entry(i, LogLevel::Log, (i % 2) as TabId, i as i64 * 100));
        }
        assert_eq!(store.clear(Some(0), None).unwrap(), 3);
        assert_eq!(store.clear(None, Some(&TimeBound::Millis(250))).unwrap(), 1);
        let left: Vec<String> = store
            .get_all(&FilterOptions::default())
            .unwrap()
            .into_iter()
            .map(|e| e.id)
            .collect();
        assert_eq!(left, ["log-3", "log-5"]);
        assert_eq!(store.clear(None, None).unwrap(), 2);
        assert!(store.clear(None, Some(&TimeBound::relative("soon"))).is_err());
    }

    #[test]
    fn test_tail() {
        let store = LogStore::default();
        for i in 0..5 {
            store.add(entry(i, LogLevel::Log, 1, i as i64));
        }
        let last: Vec<String> = store
            .tail(2, &FilterOptions::default())
            .unwrap()
            .into_iter()
            .map(|e| e.id)
            .collect();
        assert_eq!(last, ["log-3", "log-4"]);
        assert_eq!(store.tail(50, &FilterOptions::default()).unwrap().len(), 5);
    }

    #[tokio::test]
    async fn test_follow_history_then_live() {
        let store = LogStore::default();
        store.add(entry(1, LogLevel::Log, 1, 1));
        store.add(entry(2, LogLevel::Error, 1, 2));
        store.add(entry(3, LogLevel::Error, 1, 3));

        let mut stream = store
            .follow(&FilterOptions::for_levels([LogLevel::Error]), 1)
            .unwrap();
        store.add(entry(4, LogLevel::Log, 1, 4));
        store.add(entry(5, LogLevel::Error, 1, 5));

        assert_eq!(stream.next().await.unwrap().id, "log-3");
        assert_eq!(stream.next().await.unwrap().id, "log-5");
    }
}
