// src/api/http/chat.rs
// POST /api/chat — drives one Tool Invocation Loop over a chunked,
// newline-delimited JSON response body (§4.5). One pipeline per request;
// the loop runs on a spawned task so frames can flush as they're written
// instead of buffering the whole response.

use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;

use crate::orchestrator::chat::ChatRequest;
use crate::orchestrator::pipeline::{StreamingPipeline, CHANNEL_CAPACITY};
use crate::orchestrator::tool_loop::ToolInvocationLoop;
use crate::state::AppState;

pub async fn chat_handler(State(state): State<Arc<AppState>>, Json(request): Json<ChatRequest>) -> Response {
    let (tx, rx) = tokio::sync::mpsc::channel(CHANNEL_CAPACITY);
    let pipeline = StreamingPipeline::new(tx, CancellationToken::new());

    let tool_loop = ToolInvocationLoop::new(state.mcp.clone(), state.llm.clone())
        .with_iteration_cap(state.config.llm.iteration_cap);

    tokio::spawn(async move {
        let _ = tool_loop.run(request, pipeline).await;
    });

    let stream = ReceiverStream::new(rx).map(Ok::<_, std::io::Error>);
    let body = Body::from_stream(stream);

    Response::builder()
        .header("content-type", "application/x-ndjson")
        .body(body)
        .unwrap_or_else(|_| "internal error".into_response())
}
