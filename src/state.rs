// src/state.rs
// Application state shared across HTTP handlers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::config::AppConfig;
use crate::llm::provider::LlmProvider;
use crate::mcp::McpService;

/// Shared across every handler via axum's `State` extractor. Cheap to
/// clone: every field is an `Arc` or a handle to one.
#[derive(Clone)]
pub struct AppState {
    pub mcp: Arc<McpService>,
    pub llm: Arc<dyn LlmProvider>,
    pub config: Arc<AppConfig>,
    ready: Arc<AtomicBool>,
}

impl AppState {
    pub fn new(mcp: Arc<McpService>, llm: Arc<dyn LlmProvider>, config: Arc<AppConfig>) -> Self {
        Self { mcp, llm, config, ready: Arc::new(AtomicBool::new(false)) }
    }

    /// Flipped once after the MCP Service's startup pass over its
    /// configured servers completes, regardless of per-server failures.
    /// `GET /readyz` reports 503 until this is set.
    pub fn mark_ready(&self) {
        self.ready.store(true, Ordering::SeqCst);
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }
}
