//! Captured console entries and tab metadata.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Browser tab identifier as reported by the agent.
pub type TabId = i64;

/// Current wall-clock time in Unix epoch milliseconds.
#[must_use]
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Console method that produced an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Log,
    Info,
    Warn,
    Error,
    Debug,
}

impl LogLevel {
    /// All levels, in declaration order.
    pub const ALL: [Self; 5] = [Self::Log, Self::Info, Self::Warn, Self::Error, Self::Debug];

    /// Lowercase wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Log => "log",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
            Self::Debug => "debug",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single captured console call.
///
/// Entries are never mutated once they reach the store; shaping for
/// responses and exports always works on clones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    /// Agent-assigned unique id.
    pub id: String,
    /// Capture time (Unix epoch milliseconds).
    pub timestamp: i64,
    pub level: LogLevel,
    pub message: String,
    /// Raw console arguments. Can be large.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
    /// Tab that produced the entry. May refer to a tab that has since closed.
    pub tab_id: TabId,
    #[serde(default)]
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

impl LogEntry {
    /// Arguments rendered as a single JSON string, for text matching.
    #[must_use]
    pub fn args_text(&self) -> String {
        if self.args.is_empty() {
            return String::new();
        }
        serde_json::to_string(&self.args).unwrap_or_default()
    }

    /// Copy without `args` and/or `stack`, for compact responses.
    #[must_use]
    pub fn stripped(&self, include_args: bool, include_stack: bool) -> Self {
        Self {
            args: if include_args { self.args.clone() } else { Vec::new() },
            stack: if include_stack { self.stack.clone() } else { None },
            ..self.clone()
        }
    }
}

/// Metadata for a connected browser tab.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TabInfo {
    pub id: TabId,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub title: String,
    /// Last time this tab was reported (Unix epoch milliseconds).
    #[serde(default)]
    pub last_seen: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_wire_format() {
        let json = r#"{
            "id": "a1",
            "timestamp": 1700000000000,
            "level": "warn",
            "message": "slow request",
            "args": [{"ms": 1200}],
            "tabId": 7,
            "url": "http://localhost:3000/",
            "sessionId": "s-1"
        }"#;
        let entry: LogEntry = serde_json::from_str(json).unwrap();
        assert_eq!(entry.level, LogLevel::Warn);
        assert_eq!(entry.tab_id, 7);
        assert_eq!(entry.session_id.as_deref(), Some("s-1"));
        assert!(entry.stack.is_none());

        let out = serde_json::to_value(&entry).unwrap();
        assert_eq!(out["tabId"], 7);
        assert!(out.get("stack").is_none());
    }

    #[test]
    fn test_stripped_keeps_identity_fields() {
        let entry = LogEntry {
            id: "x".into(),
            timestamp: 1,
            level: LogLevel::Error,
            message: "boom".into(),
            args: vec![Value::from("detail")],
            stack: Some("at main.js:1".into()),
            tab_id: 3,
            url: "http://a".into(),
            session_id: None,
        };
        let minimal = entry.stripped(false, false);
        assert!(minimal.args.is_empty());
        assert!(minimal.stack.is_none());
        assert_eq!(minimal.message, "boom");

        let full = entry.stripped(true, true);
        assert_eq!(full, entry);
    }

    #[test]
    fn test_args_text() {
        let mut entry: LogEntry = serde_json::from_str(
            r#"{"id":"1","timestamp":0,"level":"log","message":"m","tabId":1}"#,
        )
        .unwrap();
        assert_eq!(entry.args_text(), "");
        entry.args = vec![Value::from("user"), Value::from(42)];
        assert_eq!(entry.args_text(), r#"["user",42]"#);
    }
}
