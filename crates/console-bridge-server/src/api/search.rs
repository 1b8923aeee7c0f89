use axum::{Json, extract::State};
use console_bridge_core::{
    FilterOptions, KeywordParams, SearchParams, SearchResult,
    search::{search, search_keywords},
};
use serde::Deserialize;

use super::Shape;
use crate::{error::ApiError, state::AppState};

#[derive(Debug, Deserialize)]
pub struct SearchRequest<P> {
    #[serde(flatten)]
    params: P,
    #[serde(default)]
    filter: FilterOptions,
    #[serde(flatten)]
    shape: Shape,
}

fn shaped(result: SearchResult, shape: Shape) -> SearchResult {
    SearchResult {
        matches: result
            .matches
            .into_iter()
            .map(|m| m.map_entries(|e| shape.apply(e)))
            .collect(),
        ..result
    }
}

pub async fn regex(
    State(state): State<AppState>,
    Json(req): Json<SearchRequest<SearchParams>>,
) -> Result<Json<SearchResult>, ApiError> {
    let entries = state.store.get_all(&req.filter)?;
    let result = search(&entries, &req.params)?;
    Ok(Json(shaped(result, req.shape)))
}

pub async fn keywords(
    State(state): State<AppState>,
    Json(req): Json<SearchRequest<KeywordParams>>,
) -> Result<Json<SearchResult>, ApiError> {
    let entries = state.store.get_all(&req.filter)?;
    let result = search_keywords(&entries, &req.params)?;
    Ok(Json(shaped(result, req.shape)))
}
