use std::path::PathBuf;

use axum::{
    body::Bytes,
    extract::{rejection::QueryRejection, Query, State},
    http::StatusCode,
    Json,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::api::error::ApiError;
use crate::api::ApiState;
use crate::config::load_config;
use crate::executor::{self, General, GeneralPatch};

#[derive(Serialize)]
pub struct Version {
    pub version: &'static str,
}

pub async fn get_version() -> Json<Version> {
    Json(Version {
        version: env!("CARGO_PKG_VERSION"),
    })
}

pub async fn get_configs(State(state): State<ApiState>) -> Json<General> {
    Json(executor::get_general(&state.runtime))
}

/// Bodies are JSON whatever the `Content-Type` says.
fn decode_body<T: DeserializeOwned>(body: &[u8]) -> Result<T, ApiError> {
    serde_json::from_slice(body).map_err(|e| {
        tracing::debug!(error = %e, "Rejected request body");
        ApiError::InvalidBody
    })
}

pub async fn patch_configs(State(state): State<ApiState>, body: Bytes) -> Result<StatusCode, ApiError> {
    let patch: GeneralPatch = decode_body(&body)?;

    let _writer = state.runtime.writer().lock().await;
    // Bind failures are logged by the dispatcher and not reported here.
    executor::patch_general(&state.runtime, patch).await;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct UpdateConfigRequest {
    #[serde(default)]
    pub path: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateConfigQuery {
    pub force: Option<String>,
}

pub async fn put_configs(
    State(state): State<ApiState>,
    query: Result<Query<UpdateConfigQuery>, QueryRejection>,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    let Query(query) = query.map_err(|e| ApiError::InvalidQuery(e.body_text()))?;
    let request: UpdateConfigRequest = decode_body(&body)?;

    let path = PathBuf::from(request.path);
    if !path.is_absolute() {
        return Err(ApiError::RelativePath);
    }
    let force = query.force.as_deref() == Some("true");

    let snapshot = tokio::task::spawn_blocking(move || load_config(&path))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))??;

    let _writer = state.runtime.writer().lock().await;
    executor::apply(&state.runtime, snapshot, force).await;
    Ok(StatusCode::NO_CONTENT)
}
