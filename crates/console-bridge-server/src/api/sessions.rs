use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use console_bridge_core::{
    FilterOptions,
    traits::{Session, SessionId, SessionSummary},
};
use serde::{Deserialize, Serialize};

use crate::{error::ApiError, state::AppState};

#[derive(Debug, Default, Deserialize)]
pub struct SaveRequest {
    #[serde(default)]
    filter: FilterOptions,
    name: Option<String>,
    description: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Saved {
    session_id: SessionId,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    log_count: usize,
}

pub async fn save(
    State(state): State<AppState>,
    Json(req): Json<SaveRequest>,
) -> Result<(StatusCode, Json<Saved>), ApiError> {
    let logs = state.store.get_all(&req.filter)?;
    let log_count = logs.len();
    let session_id = state
        .sessions
        .save(logs, req.name.clone(), req.description)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(Saved {
            session_id,
            name: req.name,
            log_count,
        }),
    ))
}

#[derive(Debug, Serialize)]
pub struct SessionList {
    sessions: Vec<SessionSummary>,
    total: usize,
}

pub async fn list(State(state): State<AppState>) -> Result<Json<SessionList>, ApiError> {
    let sessions = state.sessions.list().await?;
    Ok(Json(SessionList {
        total: sessions.len(),
        sessions,
    }))
}

pub async fn get_one(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Session>, ApiError> {
    Ok(Json(state.sessions.get(&id).await?))
}

pub async fn delete(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.sessions.delete(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}
