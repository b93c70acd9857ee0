// src/mcp/client.rs
// MCP Client (C2): one per MCP server, wraps a Transport, implements the
// handshake and the typed operation set the host consumes.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info};

use super::notifications::{NotificationCallback, NotificationSlot};
use super::protocol::{
    qualify_tool_name, GetPromptResult, InitializeResult, McpCapabilities, McpPrompt, McpResource,
    McpTool, ResourceReadResult, ServerInfo, ToolResult, MCP_PROTOCOL_VERSION,
};
use super::transport::{Transport, TransportError, DEFAULT_HANDSHAKE_TIMEOUT, DEFAULT_REQUEST_TIMEOUT};

#[derive(Debug, Error, Clone)]
pub enum ClientError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("protocol error: {0}")]
    Protocol(String),
}

pub struct McpClient {
    pub server_name: String,
    transport: Arc<dyn Transport>,
    pub server_info: tokio::sync::RwLock<Option<ServerInfo>>,
    pub capabilities: tokio::sync::RwLock<McpCapabilities>,
}

impl McpClient {
    pub fn new(server_name: impl Into<String>, transport: Arc<dyn Transport>) -> Self {
        Self {
            server_name: server_name.into(),
            transport,
            server_info: tokio::sync::RwLock::new(None),
            capabilities: tokio::sync::RwLock::new(McpCapabilities::default()),
        }
    }

    /// Performs the MCP handshake: `initialize` request, store the server's
    /// declared identity/capabilities, then send `notifications/initialized`.
    pub async fn handshake(&self) -> Result<(), ClientError> {
        let params = serde_json::json!({
            "protocolVersion": MCP_PROTOCOL_VERSION,
            "capabilities": { "logging": {} },
            "clientInfo": { "name": "moc-host", "version": env!("CARGO_PKG_VERSION") }
        });

        let result = self
            .transport
            .request("initialize", Some(params), DEFAULT_HANDSHAKE_TIMEOUT)
            .await?;

        let initialized: InitializeResult = serde_json::from_value(result)
            .map_err(|e| ClientError::Protocol(format!("malformed initialize result: {e}")))?;

        *self.server_info.write().await = Some(initialized.server_info);
        *self.capabilities.write().await = initialized.capabilities;

        self.transport.notify("notifications/initialized", None).await?;

        info!("[mcp:{}] handshake complete", self.server_name);
        Ok(())
    }

    /// Installs the notification routing this client needs: log messages
    /// and progress go to the caller-supplied sinks, list-changed
    /// notifications go to the caller-supplied refresh callback.
    pub async fn install_notification_routing(
        &self,
        log_sink: NotificationCallback,
        list_changed: NotificationCallback,
    ) {
        self.transport.on_notification(NotificationSlot::Message, log_sink).await;
        self.transport.on_notification(NotificationSlot::ToolsListChanged, list_changed.clone()).await;
        self.transport.on_notification(NotificationSlot::ResourcesListChanged, list_changed.clone()).await;
        self.transport.on_notification(NotificationSlot::PromptsListChanged, list_changed).await;
    }

    pub async fn list_tools(&self) -> Result<Vec<McpTool>, ClientError> {
        let result = self.transport.request("tools/list", None, DEFAULT_REQUEST_TIMEOUT).await?;
        let tools = result
            .get("tools")
            .cloned()
            .ok_or_else(|| ClientError::Protocol("tools/list result missing 'tools'".into()))?;
        serde_json::from_value(tools).map_err(|e| ClientError::Protocol(e.to_string()))
    }

    /// `timeout` is the caller's wall-clock cap for this one `tools/call`
    /// (§5 "Cancellation and timeouts" — default 60s, overridable via
    /// `LlmConfig::tool_call_timeout_secs`).
    pub async fn call_tool(&self, name: &str, arguments: Value, timeout: Duration) -> Result<ToolResult, ClientError> {
        let params = serde_json::json!({ "name": name, "arguments": arguments });
        let result = self.transport.request("tools/call", Some(params), timeout).await?;
        serde_json::from_value(result).map_err(|e| ClientError::Protocol(e.to_string()))
    }

    pub async fn list_resources(&self) -> Result<Vec<McpResource>, ClientError> {
        if !self.supports_resources().await {
            return Ok(Vec::new());
        }
        let result = self.transport.request("resources/list", None, DEFAULT_REQUEST_TIMEOUT).await?;
        let resources = result.get("resources").cloned().unwrap_or(Value::Array(vec![]));
        serde_json::from_value(resources).map_err(|e| ClientError::Protocol(e.to_string()))
    }

    pub async fn read_resource(&self, uri: &str) -> Result<ResourceReadResult, ClientError> {
        let params = serde_json::json!({ "uri": uri });
        let result = self.transport.request("resources/read", Some(params), DEFAULT_REQUEST_TIMEOUT).await?;
        serde_json::from_value(result).map_err(|e| ClientError::Protocol(e.to_string()))
    }

    pub async fn list_prompts(&self) -> Result<Vec<McpPrompt>, ClientError> {
        if !self.supports_prompts().await {
            return Ok(Vec::new());
        }
        let result = self.transport.request("prompts/list", None, DEFAULT_REQUEST_TIMEOUT).await?;
        let prompts = result.get("prompts").cloned().unwrap_or(Value::Array(vec![]));
        serde_json::from_value(prompts).map_err(|e| ClientError::Protocol(e.to_string()))
    }

    pub async fn get_prompt(&self, name: &str, arguments: HashMap<String, String>) -> Result<GetPromptResult, ClientError> {
        let params = serde_json::json!({ "name": name, "arguments": arguments });
        let result = self.transport.request("prompts/get", Some(params), DEFAULT_REQUEST_TIMEOUT).await?;
        serde_json::from_value(result).map_err(|e| ClientError::Protocol(e.to_string()))
    }

    pub async fn ping(&self) -> Result<(), ClientError> {
        self.transport.request("ping", None, Duration::from_secs(5)).await?;
        Ok(())
    }

    pub async fn set_log_level(&self, level: &str) -> Result<(), ClientError> {
        let params = serde_json::json!({ "level": level });
        self.transport.request("logging/setLevel", Some(params), DEFAULT_REQUEST_TIMEOUT).await?;
        Ok(())
    }

    pub async fn supports_resources(&self) -> bool {
        self.capabilities.read().await.resources.is_some()
    }

    pub async fn supports_prompts(&self) -> bool {
        self.capabilities.read().await.prompts.is_some()
    }

    pub async fn close(&self) {
        self.transport.close().await;
    }

    pub fn qualify(&self, tool_name: &str) -> String {
        qualify_tool_name(&self.server_name, tool_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qualify_uses_server_name() {
        let transport: Arc<dyn Transport> = Arc::new(super::super::transport::HttpTransport::new("http://x"));
        let client = McpClient::new("filesystem", transport);
        assert_eq!(client.qualify("read_file"), "mcp__filesystem__read_file");
    }
}
