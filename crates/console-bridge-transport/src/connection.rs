//! Live agent connections, inbound dispatch and liveness probing.

use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex, MutexGuard, PoisonError, Weak},
    time::Duration,
};

use console_bridge_core::{LogStore, TabId, TabInfo, TabRegistry, log_entry::now_millis};
use serde::Serialize;
use tokio::{
    sync::{mpsc, oneshot},
    task::JoinHandle,
    time::{Instant, MissedTickBehavior},
};
use uuid::Uuid;

use crate::{
    protocol::{AgentMessage, Ping, ServerMessage},
    rpc::PendingRequests,
};

/// Connection identifier.
pub type ConnectionId = Uuid;

/// Default liveness probe interval.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Connection manager configuration.
#[derive(Debug, Clone, Copy)]
pub struct ConnectionConfig {
    /// Interval between liveness probes.
    pub heartbeat_interval: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
        }
    }
}

/// Lifecycle state of a connection.
///
/// `Active` and `Idle` together form the open state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Connecting,
    /// Seen activity since the last probe.
    Active,
    /// Probed, awaiting activity.
    Idle,
    Closing,
    Closed,
}

impl ConnectionState {
    #[must_use]
    pub const fn is_open(self) -> bool {
        matches!(self, Self::Active | Self::Idle)
    }
}

/// Instruction for a connection's writer task.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    /// JSON frame.
    Frame(ServerMessage),
    /// Transport-level ping.
    Ping,
    /// Close the socket.
    Close,
}

struct Connection {
    tx: mpsc::UnboundedSender<Outbound>,
    state: ConnectionState,
    last_heartbeat: i64,
    tabs: HashSet<TabId>,
}

impl Connection {
    fn push(&self, out: Outbound) -> bool {
        self.tx.send(out).is_ok()
    }
}

/// Snapshot of one connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionInfo {
    pub id: ConnectionId,
    pub state: ConnectionState,
    pub last_heartbeat: i64,
    pub tabs: Vec<TabId>,
}

/// Outcome of one probe cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProbeReport {
    /// Connections that were pinged.
    pub pinged: usize,
    /// Connections removed for missing the previous probe.
    pub pruned: Vec<ConnectionId>,
    /// Abandoned RPC entries that were discarded.
    pub expired_requests: usize,
}

struct Prober {
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

/// Owns every live agent connection.
pub struct ConnectionManager {
    store: Arc<LogStore>,
    registry: Arc<TabRegistry>,
    pending: Arc<PendingRequests>,
    config: ConnectionConfig,
    connections: Mutex<HashMap<ConnectionId, Connection>>,
    prober: Mutex<Option<Prober>>,
}

impl ConnectionManager {
    #[must_use]
    pub fn new(store: Arc<LogStore>, registry: Arc<TabRegistry>, config: ConnectionConfig) -> Self {
        Self {
            store,
            registry,
            pending: Arc::new(PendingRequests::new()),
            config,
            connections: Mutex::new(HashMap::new()),
            prober: Mutex::new(None),
        }
    }

    #[must_use]
    pub const fn store(&self) -> &Arc<LogStore> {
        &self.store
    }

    #[must_use]
    pub const fn registry(&self) -> &Arc<TabRegistry> {
        &self.registry
    }

    #[must_use]
    pub const fn pending(&self) -> &Arc<PendingRequests> {
        &self.pending
    }

    #[must_use]
    pub const fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ConnectionId, Connection>> {
        self.connections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a new connection in `Connecting` state.
    ///
    /// The receiver yields everything that must be written to the socket.
    pub fn register(&self) -> (ConnectionId, mpsc::UnboundedReceiver<Outbound>) {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock().insert(
            id,
            Connection {
                tx,
                state: ConnectionState::Connecting,
                last_heartbeat: now_millis(),
                tabs: HashSet::new(),
            },
        );
        (id, rx)
    }

    /// Mark the handshake complete.
    pub fn open(&self, id: ConnectionId) {
        let mut connections = self.lock();
        let total = connections.len();
        match connections.get_mut(&id) {
            Some(conn) if conn.state == ConnectionState::Connecting => {
                conn.state = ConnectionState::Active;
                tracing::info!(connection = %id, total, "Agent connected");
            }
            _ => {}
        }
    }

    /// Remove a connection and the tabs it owned.
    ///
    /// Returns `false` if the connection was already gone.
    pub fn unregister(&self, id: ConnectionId) -> bool {
        let mut connections = self.lock();
        let Some(mut conn) = connections.remove(&id) else {
            return false;
        };
        conn.state = ConnectionState::Closed;
        for tab in &conn.tabs {
            self.registry.remove(*tab);
        }
        tracing::info!(
            connection = %id,
            tabs = conn.tabs.len(),
            total = connections.len(),
            "Agent disconnected"
        );
        true
    }

    /// Decode and dispatch one text frame. Malformed frames are dropped.
    pub fn handle_text(&self, id: ConnectionId, text: &str) {
        match serde_json::from_str::<AgentMessage>(text) {
            Ok(message) => self.dispatch(id, message),
            Err(e) => tracing::debug!(connection = %id, "Dropping malformed frame: {e}"),
        }
    }

    /// Apply a decoded frame.
    pub fn dispatch(&self, id: ConnectionId, message: AgentMessage) {
        let heartbeat = match &message {
            AgentMessage::Heartbeat(h) => Some(h.timestamp),
            _ => None,
        };
        if !self.mark_alive(id, heartbeat) {
            tracing::debug!(connection = %id, "Dropping frame from closed connection");
            return;
        }

        match message.into_response() {
            Ok(response) => {
                self.pending.resolve(response);
            }
            Err(AgentMessage::Log(entry)) => {
                let tab_id = entry.tab_id;
                self.registry.touch(tab_id, entry.timestamp);
                self.store.add(entry);
                self.claim_tab(id, tab_id);
            }
            Err(AgentMessage::TabOpened(mut tab)) => {
                if tab.last_seen == 0 {
                    tab.last_seen = now_millis();
                }
                let tab_id = tab.id;
                self.registry.upsert(tab);
                self.claim_tab(id, tab_id);
                tracing::debug!(connection = %id, tab = tab_id, "Tab opened");
            }
            Err(AgentMessage::TabClosed(closed)) => {
                self.registry.remove(closed.tab_id);
                if let Some(conn) = self.lock().get_mut(&id) {
                    conn.tabs.remove(&closed.tab_id);
                }
                tracing::debug!(connection = %id, tab = closed.tab_id, "Tab closed");
            }
            Err(_) => {}
        }
    }

    /// Record a transport-level pong.
    pub fn record_pong(&self, id: ConnectionId) {
        self.mark_alive(id, None);
    }

    fn mark_alive(&self, id: ConnectionId, heartbeat: Option<i64>) -> bool {
        let mut connections = self.lock();
        let Some(conn) = connections.get_mut(&id) else {
            return false;
        };
        if !conn.state.is_open() {
            return false;
        }
        conn.state = ConnectionState::Active;
        if let Some(ts) = heartbeat {
            conn.last_heartbeat = ts;
        }
        true
    }

    // A tab belongs to the connection that reported it last.
    fn claim_tab(&self, id: ConnectionId, tab_id: TabId) {
        let mut connections = self.lock();
        let owned = connections.get(&id).map(|c| c.tabs.contains(&tab_id));
        if owned != Some(false) {
            return;
        }
        for (other, conn) in connections.iter_mut() {
            if *other == id {
                conn.tabs.insert(tab_id);
            } else {
                conn.tabs.remove(&tab_id);
            }
        }
    }

    /// Queue a frame for one connection. No-op unless the connection is open.
    pub fn send(&self, id: ConnectionId, frame: ServerMessage) -> bool {
        self.lock()
            .get(&id)
            .is_some_and(|conn| conn.state.is_open() && conn.push(Outbound::Frame(frame)))
    }

    /// Queue a frame for every open connection. Returns how many accepted it.
    pub fn broadcast(&self, frame: &ServerMessage) -> usize {
        self.lock()
            .values()
            .filter(|conn| conn.state.is_open() && conn.push(Outbound::Frame(frame.clone())))
            .count()
    }

    /// Run one liveness cycle.
    ///
    /// Connections still idle from the previous cycle are closed and removed.
    /// The rest are pinged and marked idle until they show activity.
    pub fn probe(&self) -> ProbeReport {
        let mut report = ProbeReport::default();
        {
            let mut connections = self.lock();
            let now = now_millis();
            for (id, conn) in connections.iter_mut() {
                match conn.state {
                    ConnectionState::Active => {
                        conn.state = ConnectionState::Idle;
                        let delivered = conn
                            .push(Outbound::Frame(ServerMessage::Ping(Ping { timestamp: now })))
                            && conn.push(Outbound::Ping);
                        if delivered {
                            report.pinged += 1;
                        } else {
                            conn.state = ConnectionState::Closing;
                            report.pruned.push(*id);
                        }
                    }
                    ConnectionState::Idle => {
                        conn.state = ConnectionState::Closing;
                        conn.push(Outbound::Close);
                        report.pruned.push(*id);
                    }
                    ConnectionState::Connecting
                    | ConnectionState::Closing
                    | ConnectionState::Closed => {}
                }
            }
        }

        for id in &report.pruned {
            if self.unregister(*id) {
                tracing::warn!(connection = %id, "Pruned unresponsive agent");
            }
        }
        report.expired_requests = self.pending.sweep_expired(Instant::now());
        report
    }

    #[must_use]
    pub fn get_connection_count(&self) -> usize {
        self.lock()
            .values()
            .filter(|conn| conn.state.is_open())
            .count()
    }

    #[must_use]
    pub fn state(&self, id: ConnectionId) -> Option<ConnectionState> {
        self.lock().get(&id).map(|conn| conn.state)
    }

    #[must_use]
    pub fn connections(&self) -> Vec<ConnectionInfo> {
        let mut infos: Vec<ConnectionInfo> = self
            .lock()
            .iter()
            .map(|(id, conn)| {
                let mut tabs: Vec<TabId> = conn.tabs.iter().copied().collect();
                tabs.sort_unstable();
                ConnectionInfo {
                    id: *id,
                    state: conn.state,
                    last_heartbeat: conn.last_heartbeat,
                    tabs,
                }
            })
            .collect();
        infos.sort_by_key(|info| info.id);
        infos
    }

    /// Every known tab.
    #[must_use]
    pub fn get_tabs(&self) -> Vec<TabInfo> {
        self.registry.list()
    }

    #[must_use]
    pub fn get_tab(&self, tab_id: TabId) -> Option<TabInfo> {
        self.registry.get(tab_id)
    }

    /// The open connection that owns `tab_id`.
    #[must_use]
    pub fn owner_of(&self, tab_id: TabId) -> Option<ConnectionId> {
        self.lock()
            .iter()
            .find(|(_, conn)| conn.state.is_open() && conn.tabs.contains(&tab_id))
            .map(|(id, _)| *id)
    }

    /// The most recently seen tab with an open owner.
    #[must_use]
    pub fn default_target(&self) -> Option<(TabId, ConnectionId)> {
        let owners: HashMap<TabId, ConnectionId> = self
            .lock()
            .iter()
            .filter(|(_, conn)| conn.state.is_open())
            .flat_map(|(id, conn)| conn.tabs.iter().map(move |tab| (*tab, *id)))
            .collect();
        self.registry
            .list()
            .into_iter()
            .filter_map(|tab| owners.get(&tab.id).map(|conn| (tab, *conn)))
            .max_by(|(a, _), (b, _)| a.last_seen.cmp(&b.last_seen).then(b.id.cmp(&a.id)))
            .map(|(tab, conn)| (tab.id, conn))
    }

    /// Start the periodic prober. No-op if already running.
    pub fn start(self: &Arc<Self>) {
        let mut prober = self.prober.lock().unwrap_or_else(PoisonError::into_inner);
        if prober.is_some() {
            return;
        }

        let (shutdown, mut shutdown_rx) = oneshot::channel();
        let period = self.config.heartbeat_interval;
        let manager: Weak<Self> = Arc::downgrade(self);
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let Some(manager) = manager.upgrade() else {
                            break;
                        };
                        let report = manager.probe();
                        tracing::debug!(
                            pinged = report.pinged,
                            pruned = report.pruned.len(),
                            expired = report.expired_requests,
                            "Liveness probe"
                        );
                    }
                    _ = &mut shutdown_rx => break,
                }
            }
        });

        *prober = Some(Prober { shutdown, task });
        tracing::info!(interval_secs = period.as_secs(), "Liveness prober started");
    }

    /// Stop the prober and close every connection.
    pub async fn stop(&self) {
        let prober = self
            .prober
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(prober) = prober {
            let _ = prober.shutdown.send(());
            if let Err(e) = prober.task.await {
                tracing::error!("Liveness prober failed: {e}");
            }
            tracing::info!("Liveness prober stopped");
        }

        for conn in self.lock().values_mut() {
            if conn.state.is_open() {
                conn.state = ConnectionState::Closing;
                conn.push(Outbound::Close);
            }
        }
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.prober
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

#[cfg(test)]
mod tests {
    use console_bridge_core::{FilterOptions, LogEntry, LogLevel, LogStoreConfig};
    use serde_json::json;

    use super::*;
    use crate::protocol::{Command, CommandResponse, Heartbeat, TabClosed};

    fn manager() -> Arc<ConnectionManager> {
        Arc::new(ConnectionManager::new(
            Arc::new(LogStore::new(LogStoreConfig::default())),
            Arc::new(TabRegistry::new()),
            ConnectionConfig::default(),
        ))
    }

    fn connect(manager: &ConnectionManager) -> (ConnectionId, mpsc::UnboundedReceiver<Outbound>) {
        let (id, rx) = manager.register();
        manager.open(id);
        (id, rx)
    }

    fn tab(id: TabId, last_seen: i64) -> TabInfo {
        TabInfo {
            id,
            url: format!("http://localhost:3000/{id}"),
            title: format!("Tab {id}"),
            last_seen,
        }
    }

    fn log(tab_id: TabId, message: &str) -> LogEntry {
        LogEntry {
            id: format!("{tab_id}-{message}"),
            timestamp: 100,
            level: LogLevel::Info,
            message: message.into(),
            args: Vec::new(),
            stack: None,
            tab_id,
            url: String::new(),
            session_id: None,
        }
    }

    #[test]
    fn test_connecting_until_open() {
        let manager = manager();
        let (id, _rx) = manager.register();
        assert_eq!(manager.state(id), Some(ConnectionState::Connecting));
        assert_eq!(manager.get_connection_count(), 0);
        assert!(!manager.send(id, ServerMessage::Ping(Ping { timestamp: 0 })));

        manager.open(id);
        assert_eq!(manager.state(id), Some(ConnectionState::Active));
        assert_eq!(manager.get_connection_count(), 1);
    }

    #[test]
    fn test_dispatch_updates_stores() {
        let manager = manager();
        let (id, _rx) = connect(&manager);

        manager.dispatch(id, AgentMessage::TabOpened(tab(1, 10)));
        manager.dispatch(id, AgentMessage::Log(log(1, "hello")));
        assert_eq!(manager.get_tabs().len(), 1);
        assert_eq!(manager.get_tab(1).unwrap().last_seen, 100);
        assert_eq!(manager.store().get_total_count(), 1);
        assert_eq!(manager.owner_of(1), Some(id));

        manager.dispatch(id, AgentMessage::TabClosed(TabClosed { tab_id: 1 }));
        assert!(manager.get_tab(1).is_none());
        assert_eq!(manager.owner_of(1), None);
        assert_eq!(manager.store().get_total_count(), 1);
    }

    #[test]
    fn test_malformed_frames_dropped() {
        let manager = manager();
        let (id, _rx) = connect(&manager);
        manager.probe();
        assert_eq!(manager.state(id), Some(ConnectionState::Idle));

        manager.handle_text(id, r#"{"type": "log", "data": {"bogus": true}}"#);
        manager.handle_text(id, "garbage");
        assert_eq!(manager.store().get_total_count(), 0);
        assert_eq!(manager.state(id), Some(ConnectionState::Idle));

        manager.handle_text(id, r#"{"type": "heartbeat", "data": {"timestamp": 77}}"#);
        assert_eq!(manager.state(id), Some(ConnectionState::Active));
        assert_eq!(manager.connections()[0].last_heartbeat, 77);
    }

    #[test]
    fn test_unresponsive_connection_pruned_once() {
        let manager = manager();
        let (id, mut rx) = connect(&manager);
        manager.dispatch(id, AgentMessage::TabOpened(tab(5, 1)));

        let first = manager.probe();
        assert_eq!(first.pinged, 1);
        assert!(first.pruned.is_empty());
        assert!(matches!(rx.try_recv(), Ok(Outbound::Frame(ServerMessage::Ping(_)))));
        assert_eq!(rx.try_recv(), Ok(Outbound::Ping));

        let second = manager.probe();
        assert_eq!(second.pruned, vec![id]);
        assert_eq!(rx.try_recv(), Ok(Outbound::Close));
        assert_eq!(manager.get_connection_count(), 0);
        assert!(manager.get_tab(5).is_none());

        assert!(!manager.unregister(id));
        assert!(manager.probe().pruned.is_empty());
        assert_eq!(manager.get_connection_count(), 0);
    }

    #[test]
    fn test_activity_keeps_connection_alive() {
        let manager = manager();
        let (id, _rx) = connect(&manager);
        for _ in 0..3 {
            manager.probe();
            manager.dispatch(id, AgentMessage::Heartbeat(Heartbeat { timestamp: 1 }));
        }
        manager.probe();
        manager.record_pong(id);
        assert!(manager.probe().pruned.is_empty());
        assert_eq!(manager.get_connection_count(), 1);
    }

    #[test]
    fn test_dead_writer_pruned() {
        let manager = manager();
        let (id, rx) = connect(&manager);
        drop(rx);
        assert_eq!(manager.probe().pruned, vec![id]);
        assert_eq!(manager.get_connection_count(), 0);
    }

    #[test]
    fn test_send_and_broadcast() {
        let manager = manager();
        let (a, mut rx_a) = connect(&manager);
        let (_b, mut rx_b) = connect(&manager);
        let (pending, mut rx_pending) = manager.register();

        let frame = ServerMessage::Ping(Ping { timestamp: 3 });
        assert_eq!(manager.broadcast(&frame), 2);
        assert!(rx_a.try_recv().is_ok());
        assert!(rx_b.try_recv().is_ok());
        assert!(rx_pending.try_recv().is_err());

        assert!(manager.send(a, frame.clone()));
        assert!(!manager.send(pending, frame.clone()));
        assert!(!manager.send(Uuid::new_v4(), frame));
    }

    #[test]
    fn test_tab_ownership_moves() {
        let manager = manager();
        let (a, _rx_a) = connect(&manager);
        let (b, _rx_b) = connect(&manager);

        manager.dispatch(a, AgentMessage::TabOpened(tab(9, 1)));
        manager.dispatch(b, AgentMessage::Log(log(9, "moved")));
        assert_eq!(manager.owner_of(9), Some(b));

        manager.unregister(a);
        assert!(manager.get_tab(9).is_some());
        manager.unregister(b);
        assert!(manager.get_tab(9).is_none());
        assert_eq!(
            manager.store().get_all(&FilterOptions::for_tab(9)).unwrap().len(),
            1
        );
    }

    #[test]
    fn test_default_target_most_recent() {
        let manager = manager();
        assert!(manager.default_target().is_none());

        let (a, _rx_a) = connect(&manager);
        let (b, _rx_b) = connect(&manager);
        manager.dispatch(a, AgentMessage::TabOpened(tab(1, 50)));
        manager.dispatch(b, AgentMessage::TabOpened(tab(2, 80)));
        manager.registry().upsert(tab(3, 999));

        assert_eq!(manager.default_target(), Some((2, b)));
    }

    #[test]
    fn test_responses_routed_to_pending() {
        let manager = manager();
        let (id, mut rx) = connect(&manager);
        manager.dispatch(id, AgentMessage::TabOpened(tab(1, 1)));

        let mut slot = manager.pending().register("r1".into(), id, 1, Duration::from_secs(5));
        let frame = Command::ExecuteJs { code: "1".into() }.into_frame("r1".into(), 1);
        assert!(manager.send(id, frame));
        assert!(rx.try_recv().is_ok());

        manager.dispatch(
            id,
            AgentMessage::ExecuteJsResponse(CommandResponse {
                request_id: "r1".into(),
                success: true,
                result: Some(json!(1)),
                error: None,
            }),
        );
        assert_eq!(slot.try_recv().unwrap().result, Some(json!(1)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_prober_lifecycle() {
        let manager = manager();
        let (_id, _rx) = connect(&manager);

        manager.start();
        manager.start();
        assert!(manager.is_running());

        tokio::time::sleep(DEFAULT_HEARTBEAT_INTERVAL * 2 + Duration::from_secs(1)).await;
        assert_eq!(manager.get_connection_count(), 0);

        manager.stop().await;
        assert!(!manager.is_running());
    }

    #[tokio::test]
    async fn test_stop_closes_connections() {
        let manager = manager();
        let (id, mut rx) = connect(&manager);
        manager.start();
        manager.stop().await;
        assert_eq!(manager.state(id), Some(ConnectionState::Closing));
        assert_eq!(rx.recv().await, Some(Outbound::Close));
    }
}
