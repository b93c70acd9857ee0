// src/mcp/mod.rs
// Model Context Protocol (MCP) client stack.
//
// C1 Transport (transport.rs) <- C2 Client (client.rs) <- C3 Service
// (service.rs), with protocol types (protocol.rs), notification dispatch
// (notifications.rs), schema canonicalization (schema.rs), and the log
// sink stack (log_sink.rs) as shared infrastructure. health.rs is an
// ambient capability that sits alongside the Service rather than inside
// its request path.

pub mod client;
pub mod health;
pub mod log_sink;
pub mod notifications;
pub mod protocol;
pub mod schema;
pub mod service;
pub mod transport;

pub use client::{ClientError, McpClient};
pub use health::{HealthMonitor, ServerHealth, TransportConfig};
pub use log_sink::{LogSink, LogSinkStack};
pub use notifications::{McpNotification, NotificationCallback, NotificationRegistry, NotificationSlot};
pub use schema::{CompiledSchema, SchemaError};
pub use service::{McpConfigFile, McpService, McpServiceError, ServerDescriptor, ServerStatus};
pub use transport::{HttpTransport, StdioTransport, Transport, TransportError, TransportState};
