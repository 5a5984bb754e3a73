//! Liveness and readiness checks.

use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::state::AppState;

/// `GET /health`: the process is serving requests.
#[tracing::instrument(name = "liveness_check", skip_all)]
pub async fn liveness_check() -> Response {
    (StatusCode::OK, Json(json!({ "status": "alive", "version": env!("CARGO_PKG_VERSION") }))).into_response()
}

/// `GET /ready`: the secret store is reachable.
#[tracing::instrument(name = "readiness_check", skip_all)]
pub async fn readiness_check(State(state): State<AppState>) -> Response {
    match state.store.health_check().await {
        Ok(()) => (StatusCode::OK, Json(json!({ "status": "ready" }))).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "secret store health check failed");
            (StatusCode::SERVICE_UNAVAILABLE, Json(json!({ "status": "unavailable" }))).into_response()
        },
    }
}
