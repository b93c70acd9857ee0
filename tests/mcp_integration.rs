// tests/mcp_integration.rs
// Drives the public Transport/Client/Service API against a real subprocess
// (tests/fixtures/fixture_mcp_server.rs), the way the host talks to a real
// MCP server over stdio.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use moc_host::mcp::protocol::qualify_tool_name;
use moc_host::mcp::{McpClient, McpService, ServerDescriptor, StdioTransport, Transport};

fn fixture_path() -> String {
    env!("CARGO_BIN_EXE_fixture-mcp-server").to_string()
}

#[tokio::test]
async fn transport_and_client_handshake_and_call_echo() {
    let transport = StdioTransport::spawn(&fixture_path(), &[], &HashMap::new())
        .await
        .expect("fixture server should spawn");
    let transport: Arc<dyn Transport> = Arc::new(transport);
    let client = McpClient::new("fixture", transport);

    client.handshake().await.expect("handshake should succeed");

    let tools = client.list_tools().await.expect("tools/list should succeed");
    assert_eq!(tools.len(), 1);
    assert_eq!(tools[0].name, "echo");

    let result = client
        .call_tool("echo", serde_json::json!({ "text": "hello" }), Duration::from_secs(5))
        .await
        .expect("tools/call should succeed");

    assert!(!result.is_error);
    assert_eq!(result.content.first().and_then(|c| c.as_text()), Some("hello"));

    client.close().await;
}

#[tokio::test]
async fn service_discovers_and_qualifies_fixture_tools() {
    let service = Arc::new(McpService::new());
    let descriptor = ServerDescriptor {
        name: "fixture".to_string(),
        command: fixture_path(),
        args: Vec::new(),
        env: HashMap::new(),
        blocked: false,
    };

    service.start(vec![descriptor]).await;
    assert_eq!(service.server_count().await, 1);

    let tools = service.list_available_tools(&[]).await;
    let qualified = qualify_tool_name("fixture", "echo");
    assert!(tools.iter().any(|(name, _, _)| name == &qualified));

    let result = service
        .call_tool(&qualified, serde_json::json!({ "text": "qualified call" }))
        .await;
    assert!(!result.is_error);
    assert_eq!(
        result.content.first().and_then(|c| c.as_text()),
        Some("qualified call")
    );

    let statuses = service.server_status().await;
    assert_eq!(statuses.len(), 1);

    service.shutdown().await;
}

#[tokio::test]
async fn service_reports_unknown_tool_as_error_result_not_panic() {
    let service = Arc::new(McpService::new());
    let descriptor = ServerDescriptor {
        name: "fixture".to_string(),
        command: fixture_path(),
        args: Vec::new(),
        env: HashMap::new(),
        blocked: false,
    };
    service.start(vec![descriptor]).await;

    let result = service
        .call_tool("mcp__fixture__does_not_exist", serde_json::json!({}))
        .await;
    assert!(result.is_error);

    service.shutdown().await;
}
