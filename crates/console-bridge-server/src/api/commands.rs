use std::time::Duration;

use axum::{Json, extract::State};
use console_bridge_core::TabId;
use console_bridge_transport::{Command, PageInfo};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{error::ApiError, state::AppState};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteRequest {
    code: String,
    tab_id: Option<TabId>,
    /// Overrides the configured command timeout.
    timeout_ms: Option<u64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Executed {
    result: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    tab_id: Option<TabId>,
}

pub async fn execute(
    State(state): State<AppState>,
    Json(req): Json<ExecuteRequest>,
) -> Result<Json<Executed>, ApiError> {
    if req.code.trim().is_empty() {
        return Err(ApiError::BadRequest("code must not be empty".into()));
    }
    let result = state
        .rpc
        .call(
            req.tab_id,
            Command::ExecuteJs { code: req.code },
            req.timeout_ms.map(Duration::from_millis),
        )
        .await?;
    Ok(Json(Executed {
        result,
        tab_id: req.tab_id,
    }))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfoRequest {
    tab_id: Option<TabId>,
    #[serde(default)]
    include_html: bool,
}

pub async fn page_info(
    State(state): State<AppState>,
    Json(req): Json<PageInfoRequest>,
) -> Result<Json<PageInfo>, ApiError> {
    Ok(Json(
        state.rpc.get_page_info(req.tab_id, req.include_html).await?,
    ))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryDomRequest {
    selector: String,
    tab_id: Option<TabId>,
    #[serde(default)]
    properties: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct QueryDomResponse {
    selector: String,
    count: usize,
    elements: Vec<Value>,
}

pub async fn query_dom(
    State(state): State<AppState>,
    Json(req): Json<QueryDomRequest>,
) -> Result<Json<QueryDomResponse>, ApiError> {
    let elements = state
        .rpc
        .query_dom(&req.selector, req.tab_id, req.properties)
        .await?;
    Ok(Json(QueryDomResponse {
        selector: req.selector,
        count: elements.len(),
        elements,
    }))
}
