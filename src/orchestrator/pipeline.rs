// src/orchestrator/pipeline.rs
// Streaming Response Pipeline (C5): one instance per in-flight chat
// request. Wraps the outbound chunked HTTP body as a bounded mpsc channel
// of newline-terminated JSON frames (§4.5).
//
// Grounded on the "send-then-flush" discipline in
// `examples/ConaryLabs-Mira/backend/src/api/ws/chat/connection.rs` (status/
// result frames are never dropped, matching that module's treatment of
// connection-critical writes) and on the `LogSink` trait in
// `src/mcp/log_sink.rs`, which this type implements directly so the MCP
// Service's per-request sink IS the pipeline.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use chrono::Utc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::warn;
use uuid::Uuid;

use crate::mcp::LogSink;

use super::chat::{ResultPayload, StreamFrame};

/// Bound on the outbound frame channel. Once full, `log()` drops the frame
/// (counted) rather than blocking the MCP read loop that produced it;
/// `status()`/`result()`/`error()` always use the blocking send, so a slow
/// client backpressures the Tool Invocation Loop itself rather than losing
/// a terminal frame (§4.5 "Backpressure").
const LOG_CHANNEL_HEADROOM: usize = 256;

pub struct StreamingPipeline {
    trace_id: Uuid,
    tx: mpsc::Sender<Bytes>,
    closed: AtomicBool,
    dropped_log_frames: AtomicU64,
    cancel: CancellationToken,
}

impl StreamingPipeline {
    pub fn new(tx: mpsc::Sender<Bytes>, cancel: CancellationToken) -> Arc<Self> {
        Arc::new(Self {
            trace_id: Uuid::new_v4(),
            tx,
            closed: AtomicBool::new(false),
            dropped_log_frames: AtomicU64::new(0),
            cancel,
        })
    }

    pub fn trace_id(&self) -> Uuid {
        self.trace_id
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    fn now() -> String {
        Utc::now().to_rfc3339()
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    async fn write(&self, frame: StreamFrame) {
        if self.is_closed() {
            return;
        }
        let line = frame.to_line();
        if self.tx.send(Bytes::from(line)).await.is_err() {
            // The receiving body stream is gone: the HTTP client disconnected.
            // This is the pipeline's only signal of that, so it doubles as
            // the trigger for cancelling the owning Tool Invocation Loop
            // (§4.4 "Cancellation", §8 invariant 9).
            self.closed.store(true, Ordering::SeqCst);
            self.cancel.cancel();
        }
    }

    pub async fn status(&self, message: impl Into<String>) {
        self.write(StreamFrame::Status {
            message: message.into(),
            trace_id: self.trace_id,
            timestamp: Self::now(),
        })
        .await;
    }

    /// Emits the terminal `result` frame. After this call the pipeline is
    /// closed; further writes are no-ops.
    pub async fn result(&self, payload: ResultPayload) {
        self.write(StreamFrame::Result { payload, trace_id: self.trace_id, timestamp: Self::now() }).await;
        self.closed.store(true, Ordering::SeqCst);
    }

    /// Emits the terminal `error` frame and closes.
    pub async fn error(&self, message: impl Into<String>, details: Option<serde_json::Value>) {
        self.write(StreamFrame::Error {
            message: message.into(),
            details,
            trace_id: self.trace_id,
            timestamp: Self::now(),
        })
        .await;
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn dropped_log_frames(&self) -> u64 {
        self.dropped_log_frames.load(Ordering::SeqCst)
    }
}

/// The pipeline doubles as the per-request log sink the MCP Service's
/// `LogSinkStack` dispatches to (§4.5 "Backpressure": log frames, unlike
/// status/result, may be dropped under a hard outbound-buffer bound). The
/// trait method is synchronous (it's invoked off a notification callback),
/// so it uses `try_send` rather than the blocking path `status`/`result`
/// use.
impl LogSink for StreamingPipeline {
    fn on_log(&self, server_name: &str, level: &str, _logger: Option<&str>, data: &serde_json::Value) {
        if self.is_closed() {
            return;
        }
        let trace_id = data
            .get("traceId")
            .or_else(|| data.get("trace_id"))
            .and_then(|v| v.as_str())
            .map(Uuid::parse_str)
            .and_then(Result::ok)
            .unwrap_or(self.trace_id);
        let message = data
            .get("message")
            .and_then(|v| v.as_str())
            .map(String::from)
            .unwrap_or_else(|| data.to_string());

        let frame = StreamFrame::Log {
            server: server_name.to_string(),
            level: level.to_string(),
            message,
            trace_id,
            timestamp: Self::now(),
        };
        let line = Bytes::from(frame.to_line());

        match self.tx.try_send(line) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                let dropped = self.dropped_log_frames.fetch_add(1, Ordering::SeqCst) + 1;
                if dropped % 50 == 1 {
                    warn!("[pipeline:{}] dropped {} log frames under backpressure", self.trace_id, dropped);
                }
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.closed.store(true, Ordering::SeqCst);
                self.cancel.cancel();
            }
        }
    }
}

/// Channel capacity for a pipeline's outbound frame stream. Status/result
/// writes are blocking sends regardless of this bound; it only governs how
/// much slack `log()`'s `try_send` gets before frames start dropping.
pub const CHANNEL_CAPACITY: usize = LOG_CHANNEL_HEADROOM;

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_result_frame_closes_pipeline() {
        let (tx, mut rx) = mpsc::channel(CHANNEL_CAPACITY);
        let pipeline = StreamingPipeline::new(tx, CancellationToken::new());
        pipeline.result(ResultPayload { thinking: None, conversation: "done".into(), artifacts: vec![] }).await;
        let line = rx.recv().await.unwrap();
        assert!(String::from_utf8(line.to_vec()).unwrap().contains("\"type\":\"result\""));
        // A write after close is a silent no-op, not a panic or a second frame.
        pipeline.status("late").await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_disconnected_receiver_triggers_cancellation() {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let cancel = CancellationToken::new();
        let pipeline = StreamingPipeline::new(tx, cancel.clone());
        drop(rx);
        pipeline.status("hello").await;
        assert!(cancel.is_cancelled());
    }

    #[tokio::test]
    async fn test_log_sink_drops_under_backpressure_without_blocking() {
        let (tx, _rx) = mpsc::channel(1);
        let pipeline = StreamingPipeline::new(tx, CancellationToken::new());
        for _ in 0..5 {
            pipeline.on_log("server1", "info", None, &serde_json::json!({"message": "x"}));
        }
        assert!(pipeline.dropped_log_frames() > 0);
    }
}
