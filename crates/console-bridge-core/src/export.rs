//! JSON, CSV and plain-text rendering of log entries.

use chrono::{DateTime, SecondsFormat};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{error::ExportError, log_entry::LogEntry};

/// Output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Json,
    Csv,
    Txt,
}

/// Column selectable in JSON and CSV output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ExportField {
    Id,
    Timestamp,
    Level,
    Message,
    Args,
    Stack,
    TabId,
    Url,
    SessionId,
}

impl ExportField {
    /// Columns emitted when none are requested.
    pub const DEFAULT: [Self; 6] = [
        Self::Id,
        Self::Timestamp,
        Self::Level,
        Self::Message,
        Self::TabId,
        Self::Url,
    ];

    const fn name(self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::Timestamp => "timestamp",
            Self::Level => "level",
            Self::Message => "message",
            Self::Args => "args",
            Self::Stack => "stack",
            Self::TabId => "tabId",
            Self::Url => "url",
            Self::SessionId => "sessionId",
        }
    }

    fn json(self, entry: &LogEntry) -> Value {
        match self {
            Self::Id => entry.id.clone().into(),
            Self::Timestamp => entry.timestamp.into(),
            Self::Level => entry.level.as_str().into(),
            Self::Message => entry.message.clone().into(),
            Self::Args => entry.args.clone().into(),
            Self::Stack => entry.stack.clone().map_or(Value::Null, Value::from),
            Self::TabId => entry.tab_id.into(),
            Self::Url => entry.url.clone().into(),
            Self::SessionId => entry.session_id.clone().map_or(Value::Null, Value::from),
        }
    }

    fn text(self, entry: &LogEntry) -> String {
        match self {
            Self::Id => entry.id.clone(),
            Self::Timestamp => iso_time(entry.timestamp),
            Self::Level => entry.level.as_str().to_string(),
            Self::Message => entry.message.clone(),
            Self::Args => entry.args_text(),
            Self::Stack => entry.stack.clone().unwrap_or_default(),
            Self::TabId => entry.tab_id.to_string(),
            Self::Url => entry.url.clone(),
            Self::SessionId => entry.session_id.clone().unwrap_or_default(),
        }
    }
}

/// Export options.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportOptions {
    /// Columns for JSON/CSV. `None` or empty selects [`ExportField::DEFAULT`].
    #[serde(default)]
    pub fields: Option<Vec<ExportField>>,
    /// Indent JSON output.
    #[serde(default)]
    pub pretty_print: bool,
}

impl ExportOptions {
    fn fields(&self) -> &[ExportField] {
        match self.fields.as_deref() {
            Some(fields) if !fields.is_empty() => fields,
            _ => &ExportField::DEFAULT,
        }
    }
}

/// Render `entries` in the requested format.
///
/// # Errors
/// Returns an error if serialization fails.
pub fn export(
    entries: &[LogEntry],
    format: ExportFormat,
    options: &ExportOptions,
) -> Result<String, ExportError> {
    match format {
        ExportFormat::Json => export_json(entries, options),
        ExportFormat::Csv => export_csv(entries, options),
        ExportFormat::Txt => Ok(export_txt(entries)),
    }
}

fn export_json(entries: &[LogEntry], options: &ExportOptions) -> Result<String, ExportError> {
    let fields = options.fields();
    let rows: Vec<Value> = entries
        .iter()
        .map(|entry| {
            let row: Map<String, Value> = fields
                .iter()
                .map(|f| (f.name().to_string(), f.json(entry)))
                .collect();
            Value::Object(row)
        })
        .collect();
    Ok(if options.pretty_print {
        serde_json::to_string_pretty(&rows)?
    } else {
        serde_json::to_string(&rows)?
    })
}

fn export_csv(entries: &[LogEntry], options: &ExportOptions) -> Result<String, ExportError> {
    let fields = options.fields();
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(fields.iter().map(|f| f.name()))?;
    for entry in entries {
        writer.write_record(fields.iter().map(|f| f.text(entry)))?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| ExportError::Csv(e.into_error().into()))?;
    Ok(String::from_utf8(bytes)?)
}

fn export_txt(entries: &[LogEntry]) -> String {
    let mut out = String::new();
    for entry in entries {
        out.push_str(&format!(
            "[{}] [{}] {}",
            iso_time(entry.timestamp),
            entry.level.as_str().to_uppercase(),
            entry.message
        ));
        if !entry.url.is_empty() {
            out.push_str(&format!(" ({})", entry.url));
        }
        out.push('\n');
        if let Some(ref stack) = entry.stack {
            for line in stack.lines() {
                out.push_str("    ");
                out.push_str(line);
                out.push('\n');
            }
        }
    }
    out
}

fn iso_time(ms: i64) -> String {
    DateTime::from_timestamp_millis(ms)
        .map_or_else(|| ms.to_string(), |dt| dt.to_rfc3339_opts(SecondsFormat::Millis, true))
}
