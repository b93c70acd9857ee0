// src/mcp/transport.rs
// JSON-RPC 2.0 transport over a duplex byte stream (C1). Primary
// implementation is child-process stdio; an HTTP variant is kept for
// remote MCP servers that speak streamable HTTP instead.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{oneshot, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::notifications::{parse_notification, NotificationCallback, NotificationRegistry, NotificationSlot};
use super::protocol::{JsonRpcRequest, JsonRpcResponse};

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error, Clone)]
pub enum TransportError {
    #[error("transport io error: {0}")]
    Io(String),
    #[error("transport closed")]
    Closed,
    #[error("request timed out")]
    Timeout,
    #[error("server error {code}: {message}")]
    Server { code: i32, message: String, data: Option<Value> },
    #[error("malformed response: {0}")]
    Protocol(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    Disconnected,
    Connecting,
    Ready,
    Closing,
    Closed,
}

type PendingMap = Arc<Mutex<HashMap<i64, oneshot::Sender<Result<Value, TransportError>>>>>;

/// Common surface both the stdio and HTTP transports implement. Split out
/// as a trait so the Tool Invocation Loop and MCP Client can be exercised
/// against a fixture transport in tests without spawning real processes.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn request(&self, method: &str, params: Option<Value>, timeout: Duration) -> Result<Value, TransportError>;
    async fn notify(&self, method: &str, params: Option<Value>) -> Result<(), TransportError>;
    async fn on_notification(&self, slot: NotificationSlot, callback: NotificationCallback);
    fn state(&self) -> TransportState;
    async fn close(&self);
}

/// Stdio transport: spawns a subprocess, frames messages as newline-delimited
/// JSON, and runs a single background read-loop task that owns the pending
/// request map and the notification registry. `request()` callers never
/// touch the socket directly — they register a one-shot waiter and await it,
/// so concurrent callers are independent of each other and of the reader's
/// own pace.
pub struct StdioTransport {
    stdin: Mutex<tokio::process::ChildStdin>,
    child: Mutex<Child>,
    pending: PendingMap,
    notifications: Arc<NotificationRegistry>,
    next_id: AtomicI64,
    state: Arc<RwLock<TransportState>>,
    reader_task: Mutex<Option<JoinHandle<()>>>,
}

impl StdioTransport {
    pub async fn spawn(command: &str, args: &[String], env: &HashMap<String, String>) -> Result<Self, TransportError> {
        let mut cmd = Command::new(command);
        cmd.args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for (key, value) in env {
            cmd.env(key, value);
        }

        let mut child = cmd.spawn().map_err(|e| TransportError::Io(e.to_string()))?;
        let stdin = child.stdin.take().ok_or_else(|| TransportError::Io("missing stdin".into()))?;
        let stdout = child.stdout.take().ok_or_else(|| TransportError::Io("missing stdout".into()))?;

        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                let mut reader = BufReader::new(stderr);
                let mut line = String::new();
                loop {
                    line.clear();
                    match reader.read_line(&mut line).await {
                        Ok(0) | Err(_) => break,
                        Ok(_) => debug!("[mcp stderr] {}", line.trim_end()),
                    }
                }
            });
        }

        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let notifications = Arc::new(NotificationRegistry::new());
        let state = Arc::new(RwLock::new(TransportState::Connecting));

        let reader_task = spawn_reader_loop(BufReader::new(stdout), pending.clone(), notifications.clone(), state.clone());

        Ok(Self {
            stdin: Mutex::new(stdin),
            child: Mutex::new(child),
            pending,
            notifications,
            next_id: AtomicI64::new(0),
            state,
            reader_task: Mutex::new(Some(reader_task)),
        })
    }

    fn next_request_id(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::SeqCst) + 1
    }

    async fn write_line(&self, payload: &str) -> Result<(), TransportError> {
        let mut stdin = self.stdin.lock().await;
        stdin.write_all(payload.as_bytes()).await.map_err(|e| TransportError::Io(e.to_string()))?;
        stdin.write_all(b"\n").await.map_err(|e| TransportError::Io(e.to_string()))?;
        stdin.flush().await.map_err(|e| TransportError::Io(e.to_string()))
    }
}

fn spawn_reader_loop(
    mut stdout: BufReader<tokio::process::ChildStdout>,
    pending: PendingMap,
    notifications: Arc<NotificationRegistry>,
    state: Arc<RwLock<TransportState>>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut line = String::new();
        loop {
            line.clear();
            match stdout.read_line(&mut line).await {
                Ok(0) => {
                    info!("[mcp] subprocess closed stdout, tearing down transport");
                    break;
                }
                Err(e) => {
                    warn!("[mcp] read error: {}", e);
                    break;
                }
                Ok(_) => {}
            }

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            if let Some(notification) = parse_notification(trimmed) {
                notifications.dispatch(notification).await;
                continue;
            }

            let response: JsonRpcResponse = match serde_json::from_str(trimmed) {
                Ok(r) => r,
                Err(e) => {
                    debug!("[mcp] discarding malformed line: {} ({})", trimmed, e);
                    continue;
                }
            };

            let Some(id) = response.id else {
                debug!("[mcp] discarding message with no id and no recognized method");
                continue;
            };

            let waiter = pending.lock().await.remove(&id);
            let Some(waiter) = waiter else {
                debug!("[mcp] discarding response for unknown id {}", id);
                continue;
            };

            let resolved = if let Some(error) = response.error {
                Err(TransportError::Server { code: error.code, message: error.message, data: error.data })
            } else {
                Ok(response.result.unwrap_or(Value::Null))
            };
            let _ = waiter.send(resolved);
        }

        *state.write().await = TransportState::Closed;
        let mut pending = pending.lock().await;
        for (_, waiter) in pending.drain() {
            let _ = waiter.send(Err(TransportError::Closed));
        }
    })
}

#[async_trait]
impl Transport for StdioTransport {
    async fn request(&self, method: &str, params: Option<Value>, timeout: Duration) -> Result<Value, TransportError> {
        if *self.state.read().await == TransportState::Closed {
            return Err(TransportError::Closed);
        }

        let id = self.next_request_id();
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        let request = JsonRpcRequest::new(id, method, params);
        let payload = serde_json::to_string(&request).map_err(|e| TransportError::Protocol(e.to_string()))?;

        if let Err(e) = self.write_line(&payload).await {
            self.pending.lock().await.remove(&id);
            return Err(e);
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(TransportError::Closed),
            Err(_) => {
                self.pending.lock().await.remove(&id);
                Err(TransportError::Timeout)
            }
        }
    }

    async fn notify(&self, method: &str, params: Option<Value>) -> Result<(), TransportError> {
        let notification = JsonRpcRequest::notification(method, params);
        let payload = serde_json::to_string(&notification).map_err(|e| TransportError::Protocol(e.to_string()))?;
        self.write_line(&payload).await
    }

    async fn on_notification(&self, slot: NotificationSlot, callback: NotificationCallback) {
        self.notifications.set(slot, callback).await;
    }

    fn state(&self) -> TransportState {
        // best-effort snapshot; `try_read` avoids blocking the hot path on a
        // writer that only ever runs once, at teardown.
        self.state.try_read().map(|s| *s).unwrap_or(TransportState::Ready)
    }

    async fn close(&self) {
        *self.state.write().await = TransportState::Closing;
        if let Some(task) = self.reader_task.lock().await.take() {
            task.abort();
        }
        {
            let mut pending = self.pending.lock().await;
            for (_, waiter) in pending.drain() {
                let _ = waiter.send(Err(TransportError::Closed));
            }
        }
        let mut child = self.child.lock().await;
        let _ = child.start_kill();
        *self.state.write().await = TransportState::Closed;
    }
}

/// HTTP transport for remote (streamable-HTTP) MCP servers. Each call is a
/// self-contained POST, so there is no pending-request map to maintain;
/// notifications are not supported over this transport in this host.
pub struct HttpTransport {
    url: String,
    client: reqwest::Client,
    session_id: RwLock<Option<String>>,
    state: RwLock<TransportState>,
}

impl HttpTransport {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            client: reqwest::Client::new(),
            session_id: RwLock::new(None),
            state: RwLock::new(TransportState::Ready),
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn request(&self, method: &str, params: Option<Value>, timeout: Duration) -> Result<Value, TransportError> {
        let request = JsonRpcRequest::new(1, method, params);
        let mut builder = self
            .client
            .post(&self.url)
            .timeout(timeout)
            .header("Content-Type", "application/json");
        if let Some(session) = self.session_id.read().await.as_ref() {
            builder = builder.header("Mcp-Session-Id", session);
        }

        let response = builder
            .json(&request)
            .send()
            .await
            .map_err(|e| TransportError::Io(e.to_string()))?;

        if let Some(session) = response.headers().get("Mcp-Session-Id") {
            if let Ok(s) = session.to_str() {
                *self.session_id.write().await = Some(s.to_string());
            }
        }

        if !response.status().is_success() {
            return Err(TransportError::Io(format!("http status {}", response.status())));
        }

        let body: JsonRpcResponse = response.json().await.map_err(|e| TransportError::Protocol(e.to_string()))?;
        if let Some(error) = body.error {
            return Err(TransportError::Server { code: error.code, message: error.message, data: error.data });
        }
        Ok(body.result.unwrap_or(Value::Null))
    }

    async fn notify(&self, method: &str, params: Option<Value>) -> Result<(), TransportError> {
        let notification = JsonRpcRequest::notification(method, params);
        self.client
            .post(&self.url)
            .json(&notification)
            .send()
            .await
            .map(|_| ())
            .map_err(|e| TransportError::Io(e.to_string()))
    }

    async fn on_notification(&self, _slot: NotificationSlot, _callback: NotificationCallback) {
        debug!("HTTP transport does not carry server-initiated notifications");
    }

    fn state(&self) -> TransportState {
        self.state.try_read().map(|s| *s).unwrap_or(TransportState::Ready)
    }

    async fn close(&self) {
        *self.state.write().await = TransportState::Closed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_spawn_and_echo_roundtrip() {
        // `cat` echoes each line back, which is enough to exercise
        // id-correlation without a real MCP server.
        let transport = StdioTransport::spawn("cat", &[], &HashMap::new()).await;
        let Ok(transport) = transport else { return };

        let result = transport
            .request("ping", None, Duration::from_secs(2))
            .await;
        // `cat` echoes the request itself, which is not a valid JSON-RPC
        // *response* shape (no "result"/"error"), so this should surface as
        // a protocol- or timeout-shaped failure rather than panicking.
        assert!(result.is_err());
        transport.close().await;
    }

    #[tokio::test]
    async fn test_concurrent_requests_get_independent_ids() {
        let transport = StdioTransport::spawn("cat", &[], &HashMap::new()).await;
        let Ok(transport) = transport else { return };
        let id1 = transport.next_request_id();
        let id2 = transport.next_request_id();
        assert_ne!(id1, id2);
        transport.close().await;
    }

    #[test]
    fn test_http_transport_starts_ready() {
        let transport = HttpTransport::new("http://localhost:3000/mcp");
        assert_eq!(transport.state(), TransportState::Ready);
    }
}
