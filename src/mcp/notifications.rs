// src/mcp/notifications.rs
// Inbound MCP notification types and the enum-keyed dispatch registry that
// routes them off the Transport's read loop.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::RwLock;

/// MCP notification types, parsed from an inbound id-less JSON-RPC message.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "method")]
pub enum McpNotification {
    #[serde(rename = "notifications/initialized")]
    Initialized,

    #[serde(rename = "notifications/tools/list_changed")]
    ToolsListChanged,

    #[serde(rename = "notifications/resources/list_changed")]
    ResourcesListChanged,

    #[serde(rename = "notifications/resources/updated")]
    ResourceUpdated {
        #[serde(default)]
        params: Option<ResourceUpdatedParams>,
    },

    #[serde(rename = "notifications/prompts/list_changed")]
    PromptsListChanged,

    #[serde(rename = "notifications/progress")]
    Progress {
        #[serde(default)]
        params: Option<ProgressParams>,
    },

    #[serde(rename = "notifications/message")]
    Message {
        #[serde(default)]
        params: Option<MessageParams>,
    },

    #[serde(rename = "notifications/cancelled")]
    Cancelled {
        #[serde(default)]
        params: Option<CancelledParams>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceUpdatedParams {
    pub uri: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressParams {
    #[serde(rename = "progressToken")]
    pub progress_token: Value,
    pub progress: f64,
    #[serde(default)]
    pub total: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageParams {
    pub level: String,
    #[serde(default)]
    pub logger: Option<String>,
    pub data: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelledParams {
    #[serde(rename = "requestId")]
    pub request_id: Value,
    #[serde(default)]
    pub reason: Option<String>,
}

/// Parse a raw JSON-RPC line into a notification. Returns `None` if the
/// message carries an `id` (i.e. it's a request or response, not a
/// notification) or if `method` is absent/unrecognized.
pub fn parse_notification(line: &str) -> Option<McpNotification> {
    let value: Value = serde_json::from_str(line).ok()?;
    if value.get("id").is_some() {
        return None;
    }
    let method = value.get("method")?.as_str()?;
    let params = value.get("params").cloned();

    match method {
        "notifications/initialized" => Some(McpNotification::Initialized),
        "notifications/tools/list_changed" => Some(McpNotification::ToolsListChanged),
        "notifications/resources/list_changed" => Some(McpNotification::ResourcesListChanged),
        "notifications/resources/updated" => Some(McpNotification::ResourceUpdated {
            params: params.and_then(|p| serde_json::from_value(p).ok()),
        }),
        "notifications/prompts/list_changed" => Some(McpNotification::PromptsListChanged),
        "notifications/progress" => Some(McpNotification::Progress {
            params: params.and_then(|p| serde_json::from_value(p).ok()),
        }),
        "notifications/message" => Some(McpNotification::Message {
            params: params.and_then(|p| serde_json::from_value(p).ok()),
        }),
        "notifications/cancelled" => Some(McpNotification::Cancelled {
            params: params.and_then(|p| serde_json::from_value(p).ok()),
        }),
        _ => {
            tracing::debug!("unknown MCP notification method: {}", method);
            None
        }
    }
}

/// Which slot of the registry a notification belongs to. One slot per
/// method family keeps the read loop's dispatch branch-free: it computes
/// the slot once and invokes whatever callback is parked there, rather than
/// re-matching on `method` at every subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationSlot {
    Initialized,
    ToolsListChanged,
    ResourcesListChanged,
    ResourceUpdated,
    PromptsListChanged,
    Progress,
    Message,
    Cancelled,
}

impl NotificationSlot {
    const COUNT: usize = 8;

    fn index(self) -> usize {
        self as usize
    }

    fn for_notification(notification: &McpNotification) -> Self {
        match notification {
            McpNotification::Initialized => NotificationSlot::Initialized,
            McpNotification::ToolsListChanged => NotificationSlot::ToolsListChanged,
            McpNotification::ResourcesListChanged => NotificationSlot::ResourcesListChanged,
            McpNotification::ResourceUpdated { .. } => NotificationSlot::ResourceUpdated,
            McpNotification::PromptsListChanged => NotificationSlot::PromptsListChanged,
            McpNotification::Progress { .. } => NotificationSlot::Progress,
            McpNotification::Message { .. } => NotificationSlot::Message,
            McpNotification::Cancelled { .. } => NotificationSlot::Cancelled,
        }
    }
}

pub type NotificationCallback = Arc<dyn Fn(McpNotification) + Send + Sync>;

/// Per-Transport subscriber table: one optional callback per notification
/// slot. `dispatch` is O(1) — no scanning a subscriber list, no duck-typed
/// matching per handler.
pub struct NotificationRegistry {
    slots: [RwLock<Option<NotificationCallback>>; NotificationSlot::COUNT],
}

impl NotificationRegistry {
    pub fn new() -> Self {
        Self {
            slots: std::array::from_fn(|_| RwLock::new(None)),
        }
    }

    pub async fn set(&self, slot: NotificationSlot, callback: NotificationCallback) {
        *self.slots[slot.index()].write().await = Some(callback);
    }

    pub async fn clear(&self, slot: NotificationSlot) {
        *self.slots[slot.index()].write().await = None;
    }

    pub async fn dispatch(&self, notification: McpNotification) {
        let slot = NotificationSlot::for_notification(&notification);
        let callback = self.slots[slot.index()].read().await.clone();
        if let Some(callback) = callback {
            callback(notification);
        } else {
            tracing::debug!("no subscriber for notification slot {:?}", slot);
        }
    }
}

impl Default for NotificationRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_parse_tools_list_changed() {
        let json = r#"{"jsonrpc":"2.0","method":"notifications/tools/list_changed"}"#;
        assert!(matches!(parse_notification(json), Some(McpNotification::ToolsListChanged)));
    }

    #[test]
    fn test_parse_message() {
        let json = r#"{"jsonrpc":"2.0","method":"notifications/message","params":{"level":"info","logger":"test","data":"Hello"}}"#;
        assert!(matches!(parse_notification(json), Some(McpNotification::Message { .. })));
    }

    #[test]
    fn test_ignore_response() {
        let json = r#"{"jsonrpc":"2.0","id":1,"result":{"success":true}}"#;
        assert!(parse_notification(json).is_none());
    }

    #[test]
    fn test_ignore_request() {
        let json = r#"{"jsonrpc":"2.0","id":1,"method":"tools/call","params":{}}"#;
        assert!(parse_notification(json).is_none());
    }

    #[tokio::test]
    async fn test_registry_dispatches_to_matching_slot_only() {
        let registry = NotificationRegistry::new();
        let message_hits = Arc::new(AtomicUsize::new(0));
        let progress_hits = Arc::new(AtomicUsize::new(0));

        let m = message_hits.clone();
        registry
            .set(NotificationSlot::Message, Arc::new(move |_| { m.fetch_add(1, Ordering::SeqCst); }))
            .await;
        let p = progress_hits.clone();
        registry
            .set(NotificationSlot::Progress, Arc::new(move |_| { p.fetch_add(1, Ordering::SeqCst); }))
            .await;

        registry.dispatch(McpNotification::Message { params: None }).await;
        registry.dispatch(McpNotification::Message { params: None }).await;

        assert_eq!(message_hits.load(Ordering::SeqCst), 2);
        assert_eq!(progress_hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_dispatch_without_subscriber_does_not_panic() {
        let registry = NotificationRegistry::new();
        registry.dispatch(McpNotification::ToolsListChanged).await;
    }
}
