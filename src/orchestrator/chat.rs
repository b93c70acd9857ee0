// src/orchestrator/chat.rs
// Wire types for `POST /api/chat` (§6). Request shape mirrors the
// `WsClientMessage::Chat` variant's metadata fields in
// `examples/ConaryLabs-Mira/backend/src/api/ws/message.rs`, adapted from a
// WebSocket envelope to a one-shot chunked HTTP request/response pair.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::artifact::Artifact;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatHistoryItem {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelSettings {
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default, rename = "maxTokens")]
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub history: Vec<ChatHistoryItem>,
    #[serde(default, rename = "blockedServers")]
    pub blocked_servers: Vec<String>,
    #[serde(default, rename = "enabledTools")]
    pub enabled_tools: Option<std::collections::HashMap<String, Vec<String>>>,
    #[serde(default, rename = "pinnedArtifacts")]
    pub pinned_artifacts: Vec<Artifact>,
    #[serde(default, rename = "modelSettings")]
    pub model_settings: ModelSettings,
    /// Input flag selecting the artifact-emission policy used by "graph
    /// mode" conversations. The core loop itself does not branch on this;
    /// it is threaded straight through to `ArtifactAccumulator::new`, which
    /// seeds from a pinned knowledge graph only when this is set and moves
    /// the bibliography artifact to sit right after the knowledge graph
    /// instead of last (see `ArtifactAccumulator`, DESIGN.md).
    #[serde(default, rename = "graphMode")]
    pub graph_mode: bool,
}

/// The terminal `result` frame's payload (§6).
#[derive(Debug, Clone, Serialize)]
pub struct ResultPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking: Option<String>,
    pub conversation: String,
    pub artifacts: Vec<Artifact>,
}

/// One newline-terminated JSON frame of the chunked chat response (§3
/// StreamFrame, §4.5). Every variant carries the request's trace id.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamFrame {
    Status {
        message: String,
        #[serde(rename = "traceId")]
        trace_id: Uuid,
        timestamp: String,
    },
    Log {
        server: String,
        level: String,
        message: String,
        #[serde(rename = "traceId")]
        trace_id: Uuid,
        timestamp: String,
    },
    Result {
        payload: ResultPayload,
        #[serde(rename = "traceId")]
        trace_id: Uuid,
        timestamp: String,
    },
    Error {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        details: Option<serde_json::Value>,
        #[serde(rename = "traceId")]
        trace_id: Uuid,
        timestamp: String,
    },
}

impl StreamFrame {
    /// Serializes to one newline-terminated JSON line, the unit of framing
    /// the pipeline writes to the chunked HTTP body (§4.5 "Framing").
    pub fn to_line(&self) -> String {
        let mut line = serde_json::to_string(self).unwrap_or_else(|_| {
            r#"{"type":"error","message":"internal: frame serialization failed"}"#.to_string()
        });
        line.push('\n');
        line
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ServerStatusEntry {
    pub name: String,
    #[serde(rename = "isRunning")]
    pub is_running: bool,
    pub tools: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ServerStatusResponse {
    pub servers: Vec<ServerStatusEntry>,
    #[serde(rename = "lastChecked")]
    pub last_checked: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_frame_serializes_as_single_newline_terminated_line() {
        let frame = StreamFrame::Status {
            message: "Executing search…".to_string(),
            trace_id: Uuid::nil(),
            timestamp: "2026-07-28T00:00:00Z".to_string(),
        };
        let line = frame.to_line();
        assert!(line.ends_with('\n'));
        assert_eq!(line.matches('\n').count(), 1);
        assert!(line.contains("\"type\":\"status\""));
    }

    #[test]
    fn test_chat_request_defaults_are_permissive() {
        let request: ChatRequest = serde_json::from_str(r#"{"message":"hi"}"#).unwrap();
        assert!(request.history.is_empty());
        assert!(request.blocked_servers.is_empty());
        assert!(!request.graph_mode);
    }
}
