// src/mcp/service.rs
// MCP Service (C3): registry of Clients keyed by server name. Owns
// subprocess lifecycle, aggregates discovered tools under qualified names,
// canonicalizes and caches their schemas, and routes log notifications to
// the log sink stack.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::client::{ClientError, McpClient};
use super::health::{HealthMonitor, TransportConfig};
use super::log_sink::{LogSink, LogSinkStack};
use super::notifications::McpNotification;
use super::protocol::{unqualify_tool_name, McpPrompt, McpResource, McpTool, ToolResult};
use super::schema::CompiledSchema;
use super::transport::{StdioTransport, Transport};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerDescriptor {
    pub name: String,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default)]
    pub blocked: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct McpConfigFile {
    #[serde(default)]
    pub servers: Vec<ServerDescriptor>,
}

#[derive(Debug, Error)]
pub enum McpServiceError {
    #[error("failed to read MCP config: {0}")]
    Config(String),
    #[error("unknown server: {0}")]
    UnknownServer(String),
    #[error("unknown qualified tool name: {0}")]
    UnknownTool(String),
}

/// A registered tool: the original, server-scoped advertisement plus the
/// canonicalized schema computed once at registration.
pub struct RegisteredTool {
    pub tool: McpTool,
    pub schema: CompiledSchema,
}

struct ServerState {
    descriptor: ServerDescriptor,
    client: Arc<McpClient>,
    tools: HashMap<String, RegisteredTool>,
    resources: Vec<McpResource>,
    prompts: Vec<McpPrompt>,
    connected: bool,
}

/// Default wall-clock cap for one `tools/call` (§5), used when the Service
/// is built via `new()` rather than `with_tool_call_timeout`.
pub const DEFAULT_TOOL_CALL_TIMEOUT: Duration = Duration::from_secs(60);

pub struct McpService {
    servers: RwLock<HashMap<String, ServerState>>,
    qualified_tools: RwLock<HashMap<String, (String, String)>>,
    log_sinks: Arc<LogSinkStack>,
    health: Arc<HealthMonitor>,
    tool_call_timeout: Duration,
}

impl McpService {
    pub fn new() -> Self {
        Self {
            servers: RwLock::new(HashMap::new()),
            qualified_tools: RwLock::new(HashMap::new()),
            log_sinks: Arc::new(LogSinkStack::new()),
            health: Arc::new(HealthMonitor::new(TransportConfig::default().health_check_interval_ms)),
            tool_call_timeout: DEFAULT_TOOL_CALL_TIMEOUT,
        }
    }

    /// Overrides the per-`tools/call` wall-clock cap, sourced from
    /// `LlmConfig::tool_call_timeout_secs` at startup.
    pub fn with_tool_call_timeout(mut self, timeout: Duration) -> Self {
        self.tool_call_timeout = timeout;
        self
    }

    pub async fn load_descriptors(path: &Path) -> Result<Vec<ServerDescriptor>, McpServiceError> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| McpServiceError::Config(e.to_string()))?;
        let parsed: McpConfigFile =
            serde_json::from_str(&content).map_err(|e| McpServiceError::Config(e.to_string()))?;
        Ok(parsed.servers)
    }

    /// Spawns and connects every non-blocked descriptor. Failure of any one
    /// server is logged and skipped — it never aborts startup for the rest
    /// of the fleet.
    pub async fn start(self: &Arc<Self>, descriptors: Vec<ServerDescriptor>) {
        for descriptor in descriptors {
            if descriptor.blocked {
                info!("[mcp] server '{}' is blocked, skipping", descriptor.name);
                continue;
            }
            if let Err(e) = self.connect_server(descriptor.clone()).await {
                warn!("[mcp] failed to connect to '{}': {}", descriptor.name, e);
            }
        }
    }

    async fn connect_server(self: &Arc<Self>, descriptor: ServerDescriptor) -> Result<(), ClientError> {
        let transport = StdioTransport::spawn(&descriptor.command, &descriptor.args, &descriptor.env).await?;
        let transport: Arc<dyn Transport> = Arc::new(transport);
        let client = Arc::new(McpClient::new(descriptor.name.clone(), transport));

        client.handshake().await?;

        let server_name = descriptor.name.clone();

        // Route inbound log notifications straight into the service's
        // stacked sink.
        let log_stack = self.log_sinks.clone();
        let log_server_name = server_name.clone();
        let log_cb: Arc<dyn Fn(McpNotification) + Send + Sync> = Arc::new(move |notification| {
            if let McpNotification::Message { params: Some(p) } = notification {
                let stack = log_stack.clone();
                let server_name = log_server_name.clone();
                tokio::spawn(async move {
                    stack.dispatch(&server_name, &p.level, p.logger.as_deref(), &p.data).await;
                });
            }
        });

        // list_changed notifications trigger a targeted re-discovery of this
        // server's catalog, run on a detached task since the callback is sync.
        let list_changed_server = server_name.clone();
        let service_for_refresh = self.clone();
        let list_changed_cb: Arc<dyn Fn(McpNotification) + Send + Sync> = Arc::new(move |_notification| {
            let service = service_for_refresh.clone();
            let server_name = list_changed_server.clone();
            tokio::spawn(async move {
                if let Err(e) = service.refresh_tools(&server_name).await {
                    warn!("[mcp:{}] catalog refresh failed: {}", server_name, e);
                }
            });
        });

        client.install_notification_routing(log_cb, list_changed_cb).await;

        let tools = client.list_tools().await?;
        let mut registered = HashMap::new();
        for tool in tools {
            let schema = tool
                .input_schema
                .clone()
                .unwrap_or_else(|| serde_json::json!({"type": "object", "properties": {}}));
            let compiled = CompiledSchema::compile(&schema)
                .unwrap_or_else(|_| CompiledSchema::compile(&serde_json::json!({})).expect("empty schema always compiles"));
            registered.insert(tool.name.clone(), RegisteredTool { tool, schema: compiled });
        }

        let resources = client.list_resources().await.unwrap_or_default();
        let prompts = client.list_prompts().await.unwrap_or_default();

        {
            let mut qualified = self.qualified_tools.write().await;
            for name in registered.keys() {
                qualified.insert(client.qualify(name), (server_name.clone(), name.clone()));
            }
        }

        self.health.register_server(&server_name).await;
        self.servers.write().await.insert(
            server_name,
            ServerState { descriptor, client, tools: registered, resources, prompts, connected: true },
        );
        Ok(())
    }

    /// Re-runs discovery for one server after a `list_changed` notification.
    pub async fn refresh_tools(&self, server_name: &str) -> Result<(), McpServiceError> {
        let client = {
            let servers = self.servers.read().await;
            servers
                .get(server_name)
                .map(|s| s.client.clone())
                .ok_or_else(|| McpServiceError::UnknownServer(server_name.to_string()))?
        };

        let tools = client
            .list_tools()
            .await
            .map_err(|e| McpServiceError::Config(e.to_string()))?;

        let mut registered = HashMap::new();
        for tool in tools {
            let schema = tool
                .input_schema
                .clone()
                .unwrap_or_else(|| serde_json::json!({"type": "object", "properties": {}}));
            let compiled = CompiledSchema::compile(&schema)
                .unwrap_or_else(|_| CompiledSchema::compile(&serde_json::json!({})).expect("empty schema always compiles"));
            registered.insert(tool.name.clone(), RegisteredTool { tool, schema: compiled });
        }

        let mut qualified = self.qualified_tools.write().await;
        qualified.retain(|_, (srv, _)| srv != server_name);
        for name in registered.keys() {
            qualified.insert(client.qualify(name), (server_name.to_string(), name.clone()));
        }
        drop(qualified);

        if let Some(state) = self.servers.write().await.get_mut(server_name) {
            state.tools = registered;
        }
        Ok(())
    }

    pub async fn list_available_tools(&self, blocked: &[String]) -> Vec<(String, Option<String>, Value)> {
        let servers = self.servers.read().await;
        let mut out = Vec::new();
        for (server_name, state) in servers.iter() {
            if blocked.iter().any(|b| b == server_name) || !state.connected {
                continue;
            }
            for registered in state.tools.values() {
                let qualified = state.client.qualify(&registered.tool.name);
                out.push((qualified, registered.tool.description.clone(), registered.schema.inlined.clone()));
            }
        }
        out
    }

    /// Resolves a qualified name, validates arguments against the cached
    /// schema, and delegates to the Client. Never throws across this
    /// boundary: transport-level failures become an `isError` ToolResult.
    pub async fn call_tool(&self, qualified_name: &str, arguments: Value) -> ToolResult {
        let Some((server_name, original_name)) = unqualify_tool_name(qualified_name).map(|(s, t)| (s.to_string(), t.to_string())) else {
            return ToolResult::error(format!("malformed qualified tool name: {qualified_name}"));
        };

        let (client, schema) = {
            let servers = self.servers.read().await;
            let Some(state) = servers.get(&server_name) else {
                return ToolResult::error(format!("unknown server: {server_name}"));
            };
            if !state.connected {
                return ToolResult::error(format!("server '{server_name}' is degraded, skipping call"));
            }
            let Some(registered) = state.tools.get(&original_name) else {
                return ToolResult::error(format!("unknown tool '{original_name}' on server '{server_name}'"));
            };
            (state.client.clone(), registered.schema.clone())
        };

        if let Err(errors) = schema.validate(&arguments) {
            return ToolResult::error(format!("argument validation failed: {}", errors.join("; ")));
        }

        match client.call_tool(&original_name, arguments, self.tool_call_timeout).await {
            Ok(result) => {
                self.health.record_success(&server_name).await;
                result
            }
            Err(e) => {
                self.health.record_failure(&server_name, &e.to_string()).await;
                self.mark_degraded(&server_name).await;
                ToolResult::error(format!("transport error calling '{original_name}' on '{server_name}': {e}"))
            }
        }
    }

    async fn mark_degraded(&self, server_name: &str) {
        if let Some(state) = self.servers.write().await.get_mut(server_name) {
            state.connected = false;
        }
    }

    /// Pushes a per-request log sink onto the stack. Must be paired with
    /// `unset_log_sink` for the same trace id.
    pub async fn set_log_sink(&self, trace_id: impl Into<String>, sink: Arc<dyn LogSink>) {
        self.log_sinks.push(trace_id, sink).await;
    }

    pub async fn unset_log_sink(&self, trace_id: &str) {
        self.log_sinks.pop(trace_id).await;
    }

    pub async fn list_resources(&self, server_name: &str) -> Result<Vec<McpResource>, McpServiceError> {
        let servers = self.servers.read().await;
        servers
            .get(server_name)
            .map(|s| s.resources.clone())
            .ok_or_else(|| McpServiceError::UnknownServer(server_name.to_string()))
    }

    pub async fn read_resource(
        &self,
        server_name: &str,
        uri: &str,
    ) -> Result<super::protocol::ResourceReadResult, McpServiceError> {
        let client = {
            let servers = self.servers.read().await;
            servers
                .get(server_name)
                .map(|s| s.client.clone())
                .ok_or_else(|| McpServiceError::UnknownServer(server_name.to_string()))?
        };
        client
            .read_resource(uri)
            .await
            .map_err(|e| McpServiceError::Config(e.to_string()))
    }

    pub async fn list_prompts(&self, server_name: &str) -> Result<Vec<McpPrompt>, McpServiceError> {
        let servers = self.servers.read().await;
        servers
            .get(server_name)
            .map(|s| s.prompts.clone())
            .ok_or_else(|| McpServiceError::UnknownServer(server_name.to_string()))
    }

    pub async fn server_status(&self) -> Vec<ServerStatus> {
        let servers = self.servers.read().await;
        servers
            .values()
            .map(|state| ServerStatus {
                name: state.descriptor.name.clone(),
                is_running: state.connected,
                tools: state.tools.keys().cloned().collect(),
            })
            .collect()
    }

    pub async fn server_count(&self) -> usize {
        self.servers.read().await.len()
    }

    /// Closes every Client in parallel with a bounded grace period, then
    /// kills any subprocess that didn't exit cleanly.
    pub async fn shutdown(&self) {
        let clients: Vec<Arc<McpClient>> = self.servers.read().await.values().map(|s| s.client.clone()).collect();
        let closes = clients.iter().map(|c| c.close());
        let _ = tokio::time::timeout(Duration::from_secs(5), futures::future::join_all(closes)).await;
    }
}

impl Default for McpService {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ServerStatus {
    pub name: String,
    #[serde(rename = "isRunning")]
    pub is_running: bool,
    pub tools: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_call_tool_with_malformed_qualified_name_is_error_not_panic() {
        let service = McpService::new();
        let result = service.call_tool("not_qualified", serde_json::json!({})).await;
        assert!(result.is_error);
        assert!(result.content[0].as_text().unwrap().contains("malformed"));
    }

    #[tokio::test]
    async fn test_call_tool_against_unknown_server_is_error() {
        let service = McpService::new();
        let result = service.call_tool("mcp__ghost__do_thing", serde_json::json!({})).await;
        assert!(result.is_error);
    }

    #[test]
    fn test_parse_config_file() {
        let json = r#"{"servers":[{"name":"fs","command":"npx","args":["-y","x"],"env":{},"blocked":false}]}"#;
        let config: McpConfigFile = serde_json::from_str(json).unwrap();
        assert_eq!(config.servers.len(), 1);
        assert_eq!(config.servers[0].name, "fs");
    }

    #[tokio::test]
    async fn test_load_descriptors_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("servers.json");
        tokio::fs::write(
            &path,
            r#"{"servers":[{"name":"fs","command":"npx","args":["-y","@modelcontextprotocol/server-filesystem"]},{"name":"blocked","command":"true","blocked":true}]}"#,
        )
        .await
        .unwrap();

        let descriptors = McpService::load_descriptors(&path).await.unwrap();
        assert_eq!(descriptors.len(), 2);
        assert_eq!(descriptors[0].name, "fs");
        assert!(descriptors[1].blocked);
    }

    #[tokio::test]
    async fn test_load_descriptors_missing_file_is_error_not_panic() {
        let result = McpService::load_descriptors(std::path::Path::new("/nonexistent/servers.json")).await;
        assert!(result.is_err());
    }
}
