//! Composable, conjunctive filters over stored entries.
//!
//! Time bounds accept either absolute epoch milliseconds or a string in
//! a closed grammar:
//! - relative duration `<n><unit>` with unit one of `ms`, `s`, `m`, `h`,
//!   `d`, `w` (e.g. `"5m"`), meaning "now minus that duration";
//! - an RFC 3339 timestamp (`"2024-05-01T12:00:00Z"`);
//! - a bare integer string, read as epoch milliseconds.
//!
//! Relative bounds resolve when the filter is compiled, which the store
//! does on every query, never when the options are built.

use std::{collections::HashSet, sync::OnceLock};

use chrono::DateTime;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{
    error::CoreError,
    log_entry::{LogEntry, LogLevel, TabId},
};

/// A lower or upper time bound.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TimeBound {
    /// Absolute Unix epoch milliseconds.
    Millis(i64),
    /// Relative duration, RFC 3339 timestamp or integer string.
    Expr(String),
}

impl TimeBound {
    /// Shorthand for a relative bound such as `"5m"`.
    #[must_use]
    pub fn relative(expr: impl Into<String>) -> Self {
        Self::Expr(expr.into())
    }

    /// Resolve to absolute epoch milliseconds.
    ///
    /// # Errors
    /// Returns `InvalidTimeBound` if the expression is outside the grammar.
    pub fn resolve(&self, now: i64) -> Result<i64, CoreError> {
        match self {
            Self::Millis(ms) => Ok(*ms),
            Self::Expr(expr) => parse_expr(expr, now),
        }
    }
}

fn relative_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\s*(\d+)\s*(ms|s|m|h|d|w)\s*$").expect("relative time regex is valid")
    })
}

fn parse_expr(expr: &str, now: i64) -> Result<i64, CoreError> {
    if let Some(caps) = relative_re().captures(expr) {
        let amount: i64 = caps[1]
            .parse()
            .map_err(|_| CoreError::InvalidTimeBound(expr.to_string()))?;
        let unit_ms: i64 = match &caps[2] {
            "ms" => 1,
            "s" => 1_000,
            "m" => 60_000,
            "h" => 3_600_000,
            "d" => 86_400_000,
            _ => 604_800_000,
        };
        let offset = amount
            .checked_mul(unit_ms)
            .ok_or_else(|| CoreError::InvalidTimeBound(expr.to_string()))?;
        return Ok(now.saturating_sub(offset));
    }

    let trimmed = expr.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(dt.timestamp_millis());
    }
    trimmed
        .parse::<i64>()
        .map_err(|_| CoreError::InvalidTimeBound(expr.to_string()))
}

/// Query description for [`LogStore::get_all`](crate::LogStore::get_all).
///
/// Every `None` field means "no constraint on that dimension".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterOptions {
    /// Accepted levels. An empty list is treated like `None`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub levels: Option<Vec<LogLevel>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tab_id: Option<TabId>,
    /// Regular expression tested against the entry URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url_pattern: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after: Option<TimeBound>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before: Option<TimeBound>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

impl FilterOptions {
    /// Filter on a single tab.
    #[must_use]
    pub fn for_tab(tab_id: TabId) -> Self {
        Self {
            tab_id: Some(tab_id),
            ..Self::default()
        }
    }

    /// Filter on a set of levels.
    #[must_use]
    pub fn for_levels(levels: impl IntoIterator<Item = LogLevel>) -> Self {
        Self {
            levels: Some(levels.into_iter().collect()),
            ..Self::default()
        }
    }

    /// Compile into a matcher, resolving relative bounds against `now`.
    ///
    /// # Errors
    /// Returns an input error for a bad URL pattern or time bound.
    pub fn compile(&self, now: i64) -> Result<CompiledFilter, CoreError> {
        let url = self
            .url_pattern
            .as_deref()
            .map(|p| Regex::new(p).map_err(|e| CoreError::invalid_pattern(p, e)))
            .transpose()?;

        Ok(CompiledFilter {
            levels: self
                .levels
                .as_ref()
                .filter(|l| !l.is_empty())
                .map(|l| l.iter().copied().collect()),
            tab_id: self.tab_id,
            url,
            session_id: self.session_id.clone(),
            after: self.after.as_ref().map(|b| b.resolve(now)).transpose()?,
            before: self.before.as_ref().map(|b| b.resolve(now)).transpose()?,
        })
    }
}

/// A filter ready to be tested against entries.
#[derive(Debug, Clone)]
pub struct CompiledFilter {
    levels: Option<HashSet<LogLevel>>,
    tab_id: Option<TabId>,
    url: Option<Regex>,
    session_id: Option<String>,
    after: Option<i64>,
    before: Option<i64>,
}

impl CompiledFilter {
    /// Whether the entry satisfies every active predicate.
    #[must_use]
    pub fn matches(&self, entry: &LogEntry) -> bool {
        if let Some(ref levels) = self.levels {
            if !levels.contains(&entry.level) {
                return false;
            }
        }
        if self.tab_id.is_some_and(|id| id != entry.tab_id) {
            return false;
        }
        if let Some(ref url) = self.url {
            if !url.is_match(&entry.url) {
                return false;
            }
        }
        if let Some(ref session_id) = self.session_id {
            if entry.session_id.as_ref() != Some(session_id) {
                return false;
            }
        }
        if self.after.is_some_and(|after| entry.timestamp < after) {
            return false;
        }
        if self.before.is_some_and(|before| entry.timestamp > before) {
            return false;
        }
        true
    }
}
