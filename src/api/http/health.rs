// src/api/http/health.rs
// Liveness and readiness probes for process supervisors / load balancers.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;
use std::sync::Arc;

use crate::state::AppState;

#[derive(Serialize)]
struct ReadyResponse {
    status: &'static str,
}

/// GET /healthz — always 200 once the process has bound its port.
pub async fn liveness_check() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({"status": "alive"})))
}

/// GET /readyz — 200 only after the MCP Service has completed its
/// startup pass over all configured servers, 503 otherwise.
pub async fn readiness_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    if state.is_ready() {
        (StatusCode::OK, Json(ReadyResponse { status: "ready" }))
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, Json(ReadyResponse { status: "starting" }))
    }
}
