//! Mapping of library errors onto HTTP responses.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use console_bridge_core::{CoreError, traits::StorageError};
use console_bridge_session::ManagerError;
use console_bridge_transport::RpcError;
use serde_json::json;

/// Error returned by API handlers.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Core(#[from] CoreError),
    #[error(transparent)]
    Session(#[from] ManagerError),
    #[error(transparent)]
    Rpc(#[from] RpcError),
    #[error("{0}")]
    BadRequest(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Core(e) if e.is_input_error() => StatusCode::BAD_REQUEST,
            Self::Core(CoreError::LogNotFound(_))
            | Self::Session(
                ManagerError::NotFound(_) | ManagerError::Storage(StorageError::NotFound(_)),
            ) => StatusCode::NOT_FOUND,
            Self::Session(ManagerError::Storage(StorageError::NameTaken(_))) => {
                StatusCode::CONFLICT
            }
            Self::Rpc(e) if e.is_not_found() => StatusCode::NOT_FOUND,
            Self::Rpc(RpcError::Timeout { .. }) => StatusCode::GATEWAY_TIMEOUT,
            Self::Rpc(RpcError::ConnectionClosed) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Rpc(_) => StatusCode::BAD_GATEWAY,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Core(_) | Self::Session(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(%status, "Request failed: {self}");
        } else {
            tracing::debug!(%status, "Request rejected: {self}");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
