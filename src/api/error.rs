use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::config::ConfigError;

/// Errors returned by the control API as `{"message": ...}`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Body invalid")]
    InvalidBody,

    #[error("{0}")]
    InvalidQuery(String),

    #[error("path is not an absolute path")]
    RelativePath,

    #[error("{0}")]
    Config(#[from] ConfigError),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidBody | ApiError::InvalidQuery(_) | ApiError::RelativePath | ApiError::Config(_) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "Control API request failed");
        } else {
            tracing::debug!(status = %status, error = %self, "Control API request rejected");
        }
        (status, Json(json!({ "message": self.to_string() }))).into_response()
    }
}
