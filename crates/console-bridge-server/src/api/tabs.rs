use std::path::PathBuf;

use axum::{Json, extract::State};
use console_bridge_core::{
    FilterOptions, SuggestionContext, TabInfo, TabSuggestion, context::project_name,
    detect_common_ports, suggest_tabs,
};
use serde::{Deserialize, Serialize};

use crate::{error::ApiError, state::AppState};

const DEFAULT_SUGGESTIONS: usize = 5;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TabWithCount {
    #[serde(flatten)]
    tab: TabInfo,
    log_count: usize,
}

#[derive(Debug, Serialize)]
pub struct TabList {
    tabs: Vec<TabWithCount>,
    total: usize,
}

pub async fn list(State(state): State<AppState>) -> Json<TabList> {
    let tabs: Vec<TabWithCount> = state
        .manager
        .get_tabs()
        .into_iter()
        .map(|tab| TabWithCount {
            log_count: state.store.get_tab_count(tab.id),
            tab,
        })
        .collect();
    Json(TabList {
        total: tabs.len(),
        tabs,
    })
}

#[derive(Debug, Deserialize)]
pub struct SuggestRequest {
    #[serde(flatten)]
    context: SuggestionContext,
    limit: Option<usize>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestResponse {
    suggestions: Vec<TabSuggestion>,
    total: usize,
    working_directory: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<&'static str>,
}

pub async fn suggest(
    State(state): State<AppState>,
    Json(req): Json<SuggestRequest>,
) -> Json<SuggestResponse> {
    let mut context = req.context;
    if context.working_directory.is_none() {
        context.working_directory = Some(state.working_dir.clone());
    }

    let tabs = state.manager.get_tabs();
    if tabs.is_empty() {
        return Json(SuggestResponse {
            suggestions: Vec::new(),
            total: 0,
            working_directory: context.working_directory,
            message: Some("No browser tabs are connected"),
        });
    }

    let store = &state.store;
    let mut suggestions = suggest_tabs(
        &tabs,
        |tab_id| {
            store
                .get_all(&FilterOptions::for_tab(tab_id))
                .unwrap_or_default()
        },
        &context,
    );
    let total = suggestions.len();
    suggestions.truncate(req.limit.unwrap_or(DEFAULT_SUGGESTIONS));

    Json(SuggestResponse {
        suggestions,
        total,
        working_directory: context.working_directory,
        message: None,
    })
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectContext {
    working_directory: PathBuf,
    project_name: Option<String>,
    suggested_ports: Vec<u16>,
}

pub async fn context(State(state): State<AppState>) -> Result<Json<ProjectContext>, ApiError> {
    let dir = state.working_dir.clone();
    let ports = {
        let dir = dir.clone();
        tokio::task::spawn_blocking(move || detect_common_ports(&dir))
            .await
            .map_err(|e| ApiError::Internal(e.to_string()))?
    };
    Ok(Json(ProjectContext {
        project_name: project_name(&dir),
        working_directory: dir,
        suggested_ports: ports,
    }))
}
