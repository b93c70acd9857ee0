// src/api/http/server_status.rs
// GET /api/server-status — a snapshot of every configured MCP server and
// the tools it currently advertises.

use axum::extract::State;
use axum::Json;
use chrono::Utc;
use std::sync::Arc;

use crate::orchestrator::chat::{ServerStatusEntry, ServerStatusResponse};
use crate::state::AppState;

pub async fn server_status_handler(State(state): State<Arc<AppState>>) -> Json<ServerStatusResponse> {
    let servers = state
        .mcp
        .server_status()
        .await
        .into_iter()
        .map(|s| ServerStatusEntry { name: s.name, is_running: s.is_running, tools: s.tools })
        .collect();

    Json(ServerStatusResponse { servers, last_checked: Utc::now().to_rfc3339() })
}
