use axum::{
    body::Body,
    extract::State,
    http::{header, Request},
    middleware::Next,
    response::Response,
};

use crate::api::error::ApiError;
use crate::api::ApiState;

/// Require `Authorization: Bearer <secret>` when a secret is configured.
pub async fn require_secret(
    State(state): State<ApiState>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    if state.secret.is_empty() {
        return Ok(next.run(request).await);
    }

    let token = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    match token {
        Some(token) if token == &*state.secret => Ok(next.run(request).await),
        _ => Err(ApiError::Unauthorized),
    }
}
