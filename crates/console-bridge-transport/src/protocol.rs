//! Wire protocol between the bridge and browser agents.
//!
//! Every frame is a JSON object `{"type": ..., "data": ...}`.

use console_bridge_core::{LogEntry, TabId, TabInfo};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Frame from an agent to the bridge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum AgentMessage {
    /// Captured console call.
    Log(LogEntry),
    /// Tab opened or changed.
    TabOpened(TabInfo),
    /// Tab closed.
    TabClosed(TabClosed),
    /// Agent keepalive.
    Heartbeat(Heartbeat),
    /// Result of an `execute_js` request.
    ExecuteJsResponse(CommandResponse),
    /// Result of a `get_page_info` request.
    PageInfoResponse(CommandResponse),
    /// Result of a `query_dom` request.
    DomQueryResponse(CommandResponse),
}

impl AgentMessage {
    /// The command response carried by this frame, if any.
    ///
    /// # Errors
    /// Returns the frame unchanged when it is not a command response.
    pub fn into_response(self) -> Result<CommandResponse, Self> {
        match self {
            Self::ExecuteJsResponse(r) | Self::PageInfoResponse(r) | Self::DomQueryResponse(r) => {
                Ok(r)
            }
            other => Err(other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TabClosed {
    pub tab_id: TabId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Heartbeat {
    pub timestamp: i64,
}

/// Agent reply to a command request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandResponse {
    /// Correlation id copied from the request.
    pub request_id: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Frame from the bridge to an agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Application-level liveness probe.
    Ping(Ping),
    ExecuteJs(ExecuteJs),
    GetPageInfo(GetPageInfo),
    QueryDom(QueryDom),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ping {
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteJs {
    pub request_id: String,
    pub tab_id: TabId,
    pub code: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetPageInfo {
    pub request_id: String,
    pub tab_id: TabId,
    pub include_html: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryDom {
    pub request_id: String,
    pub tab_id: TabId,
    pub selector: String,
    pub properties: Vec<String>,
}

/// A remote command before it is addressed and tagged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    ExecuteJs { code: String },
    GetPageInfo { include_html: bool },
    QueryDom { selector: String, properties: Vec<String> },
}

impl Command {
    /// Build the outbound frame for `tab_id` tagged with `request_id`.
    #[must_use]
    pub fn into_frame(self, request_id: String, tab_id: TabId) -> ServerMessage {
        match self {
            Self::ExecuteJs { code } => ServerMessage::ExecuteJs(ExecuteJs {
                request_id,
                tab_id,
                code,
            }),
            Self::GetPageInfo { include_html } => ServerMessage::GetPageInfo(GetPageInfo {
                request_id,
                tab_id,
                include_html,
            }),
            Self::QueryDom {
                selector,
                properties,
            } => ServerMessage::QueryDom(QueryDom {
                request_id,
                tab_id,
                selector,
                properties,
            }),
        }
    }

    /// Short name for logs.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::ExecuteJs { .. } => "execute_js",
            Self::GetPageInfo { .. } => "get_page_info",
            Self::QueryDom { .. } => "query_dom",
        }
    }
}

#[cfg(test)]
mod tests {
    use console_bridge_core::LogLevel;
    use serde_json::json;

    use super::*;

    #[test]
    fn test_inbound_frames_decode() {
        let log: AgentMessage = serde_json::from_value(json!({
            "type": "log",
            "data": {"id": "1", "timestamp": 5, "level": "error", "message": "x", "tabId": 3}
        }))
        .unwrap();
        let AgentMessage::Log(entry) = log else {
            panic!("Wrong message type");
        };
        assert_eq!(entry.level, LogLevel::Error);

        let closed: AgentMessage =
            serde_json::from_value(json!({"type": "tab_closed", "data": {"tabId": 3}})).unwrap();
        assert_eq!(closed, AgentMessage::TabClosed(TabClosed { tab_id: 3 }));

        let heartbeat: AgentMessage =
            serde_json::from_value(json!({"type": "heartbeat", "data": {"timestamp": 9}})).unwrap();
        assert_eq!(heartbeat, AgentMessage::Heartbeat(Heartbeat { timestamp: 9 }));
    }

    #[test]
    fn test_response_frames() {
        let frame: AgentMessage = serde_json::from_value(json!({
            "type": "execute_js_response",
            "data": {"requestId": "r1", "success": true, "result": 42}
        }))
        .unwrap();
        let response = frame.into_response().unwrap();
        assert_eq!(response.request_id, "r1");
        assert_eq!(response.result, Some(json!(42)));

        let not_a_response = AgentMessage::Heartbeat(Heartbeat { timestamp: 1 });
        assert!(not_a_response.into_response().is_err());
    }

    #[test]
    fn test_malformed_frames_rejected() {
        for raw in [
            r#"{"type": "unknown", "data": {}}"#,
            r#"{"type": "log", "data": {"id": "1"}}"#,
            r#"{"data": {}}"#,
            "not json",
        ] {
            assert!(serde_json::from_str::<AgentMessage>(raw).is_err(), "{raw}");
        }
    }

    #[test]
    fn test_outbound_shape() {
        let frame = Command::QueryDom {
            selector: ".error".into(),
            properties: vec!["textContent".into()],
        }
        .into_frame("r2".into(), 7);
        assert_eq!(
            serde_json::to_value(&frame).unwrap(),
            json!({
                "type": "query_dom",
                "data": {"requestId": "r2", "tabId": 7, "selector": ".error", "properties": ["textContent"]}
            })
        );

        let ping = serde_json::to_value(ServerMessage::Ping(Ping { timestamp: 1 })).unwrap();
        assert_eq!(ping, json!({"type": "ping", "data": {"timestamp": 1}}));
    }
}
