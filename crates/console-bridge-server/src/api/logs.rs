use std::collections::BTreeMap;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::header,
    response::{
        IntoResponse,
        sse::{KeepAlive, Sse},
    },
};
use console_bridge_core::{
    CoreError, FilterOptions, LogEntry, LogLevel, TabId, TimeBound,
    export::{ExportFormat, ExportOptions, export as render},
};
use futures::StreamExt;
use serde::{Deserialize, Serialize};

use super::{FilterQuery, Shape};
use crate::{error::ApiError, state::AppState};

const DEFAULT_PAGE: usize = 100;
const DEFAULT_TAIL: usize = 10;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageQuery {
    limit: Option<usize>,
    #[serde(default)]
    offset: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogPage {
    logs: Vec<LogEntry>,
    total: usize,
    offset: usize,
    limit: usize,
    has_more: bool,
}

pub async fn list(
    State(state): State<AppState>,
    Query(filter): Query<FilterQuery>,
    Query(page): Query<PageQuery>,
    Query(shape): Query<Shape>,
) -> Result<Json<LogPage>, ApiError> {
    let entries = state.store.get_all(&filter.into_filter()?)?;
    let total = entries.len();
    let limit = page.limit.unwrap_or(DEFAULT_PAGE);
    let logs = entries
        .into_iter()
        .skip(page.offset)
        .take(limit)
        .map(|e| shape.apply(e))
        .collect();

    Ok(Json(LogPage {
        logs,
        total,
        offset: page.offset,
        limit,
        has_more: page.offset.saturating_add(limit) < total,
    }))
}

pub async fn get_one(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<LogEntry>, ApiError> {
    Ok(Json(state.store.get(&id)?))
}

#[derive(Debug, Default, Deserialize)]
pub struct TailQuery {
    lines: Option<usize>,
}

pub async fn tail(
    State(state): State<AppState>,
    Query(filter): Query<FilterQuery>,
    Query(tail): Query<TailQuery>,
    Query(shape): Query<Shape>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let lines = tail.lines.unwrap_or(DEFAULT_TAIL);
    let logs: Vec<LogEntry> = state
        .store
        .tail(lines, &filter.into_filter()?)?
        .into_iter()
        .map(|e| shape.apply(e))
        .collect();
    Ok(Json(serde_json::json!({ "count": logs.len(), "logs": logs })))
}

/// Recent entries, then live ones as server-sent `log` events.
pub async fn follow(
    State(state): State<AppState>,
    Query(filter): Query<FilterQuery>,
    Query(tail): Query<TailQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let lines = tail.lines.unwrap_or(DEFAULT_TAIL);
    let stream = state.store.sse_stream(&filter.into_filter()?, lines)?;
    let mut shutdown = state.shutdown.subscribe();
    let stream = stream.take_until(async move {
        let _ = shutdown.recv().await;
    });
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClearRequest {
    tab_id: Option<TabId>,
    before: Option<TimeBound>,
}

pub async fn clear(
    State(state): State<AppState>,
    Json(req): Json<ClearRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let removed = state.store.clear(req.tab_id, req.before.as_ref())?;
    tracing::info!(removed, tab = ?req.tab_id, "Cleared logs");
    Ok(Json(serde_json::json!({ "removed": removed })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportRequest {
    format: ExportFormat,
    #[serde(default)]
    filter: FilterOptions,
    #[serde(flatten)]
    options: ExportOptions,
}

pub async fn export(
    State(state): State<AppState>,
    Json(req): Json<ExportRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let entries = state.store.get_all(&req.filter)?;
    let body = render(&entries, req.format, &req.options).map_err(CoreError::from)?;
    let content_type = match req.format {
        ExportFormat::Json => "application/json",
        ExportFormat::Csv => "text/csv; charset=utf-8",
        ExportFormat::Txt => "text/plain; charset=utf-8",
    };
    Ok(([(header::CONTENT_TYPE, content_type)], body))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TabStat {
    id: TabId,
    url: String,
    log_count: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    total_logs: usize,
    active_tabs: usize,
    connections: usize,
    sessions: usize,
    capacity: usize,
    by_level: BTreeMap<LogLevel, usize>,
    tabs: Vec<TabStat>,
}

pub async fn stats(State(state): State<AppState>) -> Result<Json<Stats>, ApiError> {
    let store_stats = state.store.stats();
    let tabs = state
        .manager
        .get_tabs()
        .into_iter()
        .map(|tab| TabStat {
            log_count: state.store.get_tab_count(tab.id),
            id: tab.id,
            url: tab.url,
        })
        .collect();

    Ok(Json(Stats {
        total_logs: store_stats.total,
        active_tabs: store_stats.tabs,
        connections: state.manager.get_connection_count(),
        sessions: state.sessions.count().await?,
        capacity: state.store.capacity(),
        by_level: store_stats.by_level,
        tabs,
    }))
}
