// src/api/http/mod.rs

pub mod chat;
pub mod health;
pub mod server_status;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};

use crate::state::AppState;

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    Router::new()
        .route("/api/chat", post(chat::chat_handler))
        .route("/api/server-status", get(server_status::server_status_handler))
        .route("/healthz", get(health::liveness_check))
        .route("/readyz", get(health::readiness_check))
        .layer(cors)
        .with_state(Arc::new(state))
}
