//! JSON query API over the log store, tabs, sessions and remote commands.

mod commands;
mod logs;
mod search;
mod sessions;
mod tabs;

use axum::{
    Router,
    routing::{get, post},
};
use console_bridge_core::{FilterOptions, LogEntry, LogLevel, TabId, TimeBound};
use serde::Deserialize;

use crate::{error::ApiError, state::AppState};

/// Build the `/api` router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/logs", get(logs::list))
        .route("/api/logs/tail", get(logs::tail))
        .route("/api/logs/follow", get(logs::follow))
        .route("/api/logs/clear", post(logs::clear))
        .route("/api/logs/{id}", get(logs::get_one))
        .route("/api/export", post(logs::export))
        .route("/api/stats", get(logs::stats))
        .route("/api/search", post(search::regex))
        .route("/api/search/keywords", post(search::keywords))
        .route("/api/tabs", get(tabs::list))
        .route("/api/tabs/suggest", post(tabs::suggest))
        .route("/api/context", get(tabs::context))
        .route("/api/sessions", get(sessions::list).post(sessions::save))
        .route(
            "/api/sessions/{id}",
            get(sessions::get_one).delete(sessions::delete),
        )
        .route("/api/execute", post(commands::execute))
        .route("/api/page-info", post(commands::page_info))
        .route("/api/query-dom", post(commands::query_dom))
        .with_state(state)
}

/// Filter expressed as query-string parameters.
///
/// `levels` is a comma-separated list.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterQuery {
    levels: Option<String>,
    tab_id: Option<TabId>,
    url_pattern: Option<String>,
    after: Option<String>,
    before: Option<String>,
    session_id: Option<String>,
}

impl FilterQuery {
    fn into_filter(self) -> Result<FilterOptions, ApiError> {
        let levels = self
            .levels
            .as_deref()
            .map(parse_levels)
            .transpose()?;
        Ok(FilterOptions {
            levels,
            tab_id: self.tab_id,
            url_pattern: self.url_pattern,
            after: self.after.map(TimeBound::relative),
            before: self.before.map(TimeBound::relative),
            session_id: self.session_id,
        })
    }
}

fn parse_levels(raw: &str) -> Result<Vec<LogLevel>, ApiError> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            LogLevel::ALL
                .into_iter()
                .find(|level| level.as_str().eq_ignore_ascii_case(s))
                .ok_or_else(|| ApiError::BadRequest(format!("Unknown log level: {s}")))
        })
        .collect()
}

/// Opt-in for the bulky entry fields.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Shape {
    #[serde(default)]
    include_args: bool,
    #[serde(default)]
    include_stack: bool,
}

impl Shape {
    fn apply(self, entry: LogEntry) -> LogEntry {
        if self.include_args && self.include_stack {
            entry
        } else {
            entry.stripped(self.include_args, self.include_stack)
        }
    }
}
