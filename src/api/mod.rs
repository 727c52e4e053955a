//! Control API.
//!
//! # Routes
//! ```text
//! GET   /configs            → effective general settings
//! PATCH /configs            → partial update, listeners reconciled
//! PUT   /configs?force=bool → reload a file and apply it
//! GET   /version            → crate version
//! ```
//!
//! # Design Decisions
//! - Errors are `{"message": ...}`; bad input is 400, bad secret is 401
//! - Listener bind failures never turn a 204 into an error
//! - Applies hold the runtime writer lock so PATCH / PUT never interleave

pub mod auth;
pub mod error;
pub mod handlers;

use std::future::Future;
use std::sync::Arc;

use axum::{http::Request, middleware, routing::get, Router};
use tokio::net::TcpListener;
use tower_http::{
    request_id::{MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer},
    trace::TraceLayer,
};
use uuid::Uuid;

use crate::runtime::Runtime;

pub use error::ApiError;

#[derive(Clone)]
pub struct ApiState {
    pub runtime: Arc<Runtime>,
    pub secret: Arc<str>,
}

/// UUID v4 request IDs for `x-request-id`.
#[derive(Clone, Copy, Default)]
struct UuidRequestId;

impl MakeRequestId for UuidRequestId {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        Uuid::new_v4().to_string().parse().ok().map(RequestId::new)
    }
}

/// Build the control API router. An empty `secret` disables authentication.
pub fn router(runtime: Arc<Runtime>, secret: &str) -> Router {
    let state = ApiState {
        runtime,
        secret: Arc::from(secret),
    };

    Router::new()
        .route(
            "/configs",
            get(handlers::get_configs)
                .patch(handlers::patch_configs)
                .put(handlers::put_configs),
        )
        .route("/version", get(handlers::get_version))
        .layer(middleware::from_fn_with_state(state.clone(), auth::require_secret))
        .with_state(state)
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(UuidRequestId))
}

/// Serve the router until `shutdown` resolves.
pub async fn serve(
    listener: TcpListener,
    app: Router,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), std::io::Error> {
    let addr = listener.local_addr()?;
    tracing::info!(address = %addr, "Control API listening");

    axum::serve(listener, app).with_graceful_shutdown(shutdown).await?;

    tracing::info!("Control API stopped");
    Ok(())
}
