//! Request/response correlation for remote commands.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use console_bridge_core::TabId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::{sync::oneshot, time::Instant};
use uuid::Uuid;

use crate::{
    connection::{ConnectionId, ConnectionManager},
    protocol::{Command, CommandResponse},
};

/// Default wait for an agent reply.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(5);

/// Remote command error.
#[derive(Debug, Error)]
pub enum RpcError {
    #[error("Tab {0} is not connected")]
    TabNotFound(TabId),
    #[error("No connected tabs")]
    NoTabs,
    #[error("Request {request_id} timed out after {timeout:?}")]
    Timeout {
        request_id: String,
        timeout: Duration,
    },
    #[error("Connection closed before the request was sent")]
    ConnectionClosed,
    #[error("Remote error: {0}")]
    Remote(String),
    #[error("Unexpected response payload: {0}")]
    InvalidResponse(#[from] serde_json::Error),
}

impl RpcError {
    /// Unknown target tab or no tab at all.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::TabNotFound(_) | Self::NoTabs)
    }
}

struct PendingRequest {
    connection: ConnectionId,
    tab_id: TabId,
    slot: oneshot::Sender<CommandResponse>,
    deadline: Instant,
}

/// Correlation table of in-flight requests.
///
/// Each entry is resolved at most once: whoever removes it from the table
/// owns the outcome.
#[derive(Default)]
pub struct PendingRequests {
    inner: Mutex<HashMap<String, PendingRequest>>,
}

impl PendingRequests {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, PendingRequest>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a request and return its result slot.
    pub fn register(
        &self,
        request_id: String,
        connection: ConnectionId,
        tab_id: TabId,
        timeout: Duration,
    ) -> oneshot::Receiver<CommandResponse> {
        let (slot, rx) = oneshot::channel();
        self.lock().insert(
            request_id,
            PendingRequest {
                connection,
                tab_id,
                slot,
                deadline: Instant::now() + timeout,
            },
        );
        rx
    }

    /// Deliver a response. Unknown or late ids are dropped.
    pub fn resolve(&self, response: CommandResponse) -> bool {
        let Some(pending) = self.lock().remove(&response.request_id) else {
            tracing::debug!(request_id = %response.request_id, "Dropping unmatched response");
            return false;
        };
        tracing::debug!(
            request_id = %response.request_id,
            connection = %pending.connection,
            tab = pending.tab_id,
            "Response matched"
        );
        pending.slot.send(response).is_ok()
    }

    /// Drop an entry. Returns `false` if it was already resolved.
    pub fn discard(&self, request_id: &str) -> bool {
        self.lock().remove(request_id).is_some()
    }

    /// Drop every entry whose deadline has passed.
    pub fn sweep_expired(&self, now: Instant) -> usize {
        let mut pending = self.lock();
        let before = pending.len();
        pending.retain(|_, request| request.deadline > now);
        before - pending.len()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

/// Page metadata returned by `get_page_info`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageInfo {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html: Option<String>,
}

/// Turns the agent channel into awaitable calls.
#[derive(Clone)]
pub struct RpcCorrelator {
    manager: Arc<ConnectionManager>,
    timeout: Duration,
}

impl RpcCorrelator {
    #[must_use]
    pub const fn new(manager: Arc<ConnectionManager>, timeout: Duration) -> Self {
        Self { manager, timeout }
    }

    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Send `command` to a tab and wait for its reply.
    ///
    /// Without a tab id the most recently seen connected tab is used.
    ///
    /// # Errors
    /// `TabNotFound`/`NoTabs` before anything is sent, `Timeout` when no reply
    /// arrives in time, `Remote` when the agent reports failure.
    pub async fn call(
        &self,
        tab_id: Option<TabId>,
        command: Command,
        timeout: Option<Duration>,
    ) -> Result<Value, RpcError> {
        let (tab_id, connection) = match tab_id {
            Some(tab_id) => {
                let connection = self
                    .manager
                    .owner_of(tab_id)
                    .ok_or(RpcError::TabNotFound(tab_id))?;
                (tab_id, connection)
            }
            None => self.manager.default_target().ok_or(RpcError::NoTabs)?,
        };

        let timeout = timeout.unwrap_or(self.timeout);
        let request_id = Uuid::new_v4().to_string();
        let pending = self.manager.pending();
        let mut slot = pending.register(request_id.clone(), connection, tab_id, timeout);

        let name = command.name();
        if !self
            .manager
            .send(connection, command.into_frame(request_id.clone(), tab_id))
        {
            pending.discard(&request_id);
            return Err(RpcError::ConnectionClosed);
        }
        tracing::debug!(%request_id, tab = tab_id, command = name, "Command sent");

        let response = match tokio::time::timeout(timeout, &mut slot).await {
            Ok(Ok(response)) => response,
            Ok(Err(_)) => return Err(Self::timed_out(request_id, timeout)),
            Err(_) if pending.discard(&request_id) => {
                return Err(Self::timed_out(request_id, timeout));
            }
            // The reply claimed the entry right at the deadline.
            Err(_) => slot
                .try_recv()
                .map_err(|_| Self::timed_out(request_id, timeout))?,
        };

        if response.success {
            Ok(response.result.unwrap_or(Value::Null))
        } else {
            Err(RpcError::Remote(
                response
                    .error
                    .unwrap_or_else(|| "unknown error".to_string()),
            ))
        }
    }

    fn timed_out(request_id: String, timeout: Duration) -> RpcError {
        tracing::warn!(%request_id, ?timeout, "Command timed out");
        RpcError::Timeout {
            request_id,
            timeout,
        }
    }

    /// Evaluate JavaScript in a tab.
    ///
    /// # Errors
    /// See [`RpcCorrelator::call`].
    pub async fn execute_js(&self, code: &str, tab_id: Option<TabId>) -> Result<Value, RpcError> {
        self.call(
            tab_id,
            Command::ExecuteJs {
                code: code.to_string(),
            },
            None,
        )
        .await
    }

    /// Title, URL and optionally the HTML of a tab.
    ///
    /// # Errors
    /// See [`RpcCorrelator::call`]; `InvalidResponse` if the payload does not
    /// describe a page.
    pub async fn get_page_info(
        &self,
        tab_id: Option<TabId>,
        include_html: bool,
    ) -> Result<PageInfo, RpcError> {
        let value = self
            .call(tab_id, Command::GetPageInfo { include_html }, None)
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Elements matching a CSS selector.
    ///
    /// # Errors
    /// See [`RpcCorrelator::call`].
    pub async fn query_dom(
        &self,
        selector: &str,
        tab_id: Option<TabId>,
        properties: Vec<String>,
    ) -> Result<Vec<Value>, RpcError> {
        let value = self
            .call(
                tab_id,
                Command::QueryDom {
                    selector: selector.to_string(),
                    properties,
                },
                None,
            )
            .await?;
        Ok(match value {
            Value::Array(elements) => elements,
            Value::Object(mut object) => match object.remove("elements") {
                Some(Value::Array(elements)) => elements,
                Some(other) => serde_json::from_value(other)?,
                None => vec![Value::Object(object)],
            },
            Value::Null => Vec::new(),
            other => vec![other],
        })
    }
}
