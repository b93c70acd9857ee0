// src/orchestrator/tool_loop.rs
// Tool Invocation Loop (C4): the multi-turn LLM-driven dialogue engine.
// Given a user message, repeatedly calls the LLM, executes any tools it
// requests via the MCP Service, re-injects results, and halts on a
// `response_formatter` call, the iteration cap, or a fatal error (§4.4).
//
// Grounded on the turn loop in
// `examples/ConaryLabs-Mira/backend/src/operations/engine/llm_orchestrator.rs`
// (`execute_with_tools`'s call-LLM / dispatch-tool-calls / append-results /
// repeat shape), rebuilt against `McpService::call_tool` instead of the
// teacher's in-process `ToolRouter`, with the response_formatter sentinel,
// explicit state machine, and cancellation added per the spec.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use thiserror::Error;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::llm::provider::{FunctionCall, LlmProvider, Message, ToolCallInfo, ToolResponse};
use crate::mcp::McpService;

use super::accumulator::ArtifactAccumulator;
use super::chat::{ChatHistoryItem, ChatRequest, ResultPayload};
use super::formatter::{self, FormatterArguments, RESPONSE_FORMATTER_NAME};
use super::pipeline::StreamingPipeline;

/// Default cap on non-formatter LLM turns (§4.4 "Termination guarantees").
pub const DEFAULT_ITERATION_CAP: usize = 15;

const SYSTEM_PROMPT: &str = "You are an orchestration host with access to a catalog of MCP tools. \
Use them as needed, then call response_formatter exactly once with your final answer.";

#[derive(Debug, Error)]
pub enum LoopError {
    #[error("LLM call failed after retries: {0}")]
    Llm(String),
    #[error("cancelled")]
    Cancelled,
}

pub enum LoopOutcome {
    Completed(ResultPayload),
}

pub struct ToolInvocationLoop {
    mcp: Arc<McpService>,
    llm: Arc<dyn LlmProvider>,
    iteration_cap: usize,
}

impl ToolInvocationLoop {
    pub fn new(mcp: Arc<McpService>, llm: Arc<dyn LlmProvider>) -> Self {
        Self { mcp, llm, iteration_cap: DEFAULT_ITERATION_CAP }
    }

    pub fn with_iteration_cap(mut self, cap: usize) -> Self {
        self.iteration_cap = cap;
        self
    }

    /// Drives one chat request end to end, writing `status`/`log` frames to
    /// `pipeline` as it goes and the terminal `result`/`error` frame at the
    /// end. Returning `Ok` means a terminal frame was already written;
    /// callers should not write another one.
    pub async fn run(&self, request: ChatRequest, pipeline: Arc<StreamingPipeline>) -> Result<(), LoopError> {
        let cancel = pipeline.cancellation_token();
        pipeline.status("Starting…").await;

        self.mcp.set_log_sink(pipeline.trace_id().to_string(), pipeline.clone()).await;
        let outcome = self.drive(&request, &pipeline, &cancel).await;
        self.mcp.unset_log_sink(&pipeline.trace_id().to_string()).await;

        match outcome {
            Ok(LoopOutcome::Completed(payload)) => {
                pipeline.result(payload).await;
                Ok(())
            }
            Err(LoopError::Cancelled) => {
                pipeline.error("request cancelled", None).await;
                Err(LoopError::Cancelled)
            }
            Err(LoopError::Llm(message)) => {
                pipeline.error(format!("LLM call failed: {message}"), None).await;
                Err(LoopError::Llm(message))
            }
        }
    }

    async fn drive(
        &self,
        request: &ChatRequest,
        pipeline: &StreamingPipeline,
        cancel: &tokio_util::sync::CancellationToken,
    ) -> Result<LoopOutcome, LoopError> {
        let mut conversation = build_initial_conversation(request);
        let mut accumulator = ArtifactAccumulator::new(&request.pinned_artifacts, request.graph_mode);
        let allow_list = request.enabled_tools.clone();

        let mut tools = self.available_tools(&request.blocked_servers, allow_list.as_ref()).await;
        tools.push(formatter::response_formatter_tool_entry());
        let tool_defs = to_tool_definitions(&tools);

        for turn in 0..self.iteration_cap {
            if cancel.is_cancelled() {
                return Err(LoopError::Cancelled);
            }

            let response = self.call_llm(&conversation, &tool_defs, cancel).await?;

            if let Some(formatter_call) = response.function_calls.iter().find(|c| c.name == RESPONSE_FORMATTER_NAME) {
                return Ok(self.finalize(formatter_call, accumulator)?);
            }

            if response.function_calls.is_empty() {
                // Plain-text response with no tool use and no formatter
                // call: treat the text itself as the final conversation
                // (§4.4 "Awaiting-LLM", third bullet).
                let (artifacts, conversation_text) = accumulator.finalize(response.text_output);
                return Ok(LoopOutcome::Completed(ResultPayload { thinking: None, conversation: conversation_text, artifacts }));
            }

            conversation.push(Message::assistant_with_tool_calls(
                response.text_output.clone(),
                response.function_calls.iter().map(to_tool_call_info).collect(),
            ));

            for call in &response.function_calls {
                if cancel.is_cancelled() {
                    return Err(LoopError::Cancelled);
                }
                pipeline.status(format!("Executing {}…", display_name(&call.name))).await;

                let result = self.mcp.call_tool(&call.name, call.arguments.clone()).await;
                let texts = accumulator.ingest(&call.name, &result.content);
                let tool_text = if texts.is_empty() {
                    if result.is_error { "tool call failed with no further detail".to_string() } else { String::new() }
                } else {
                    texts.join("\n")
                };
                conversation.push(Message::tool_result(call.id.clone(), tool_text));

                if result.is_error {
                    warn!("[tool-loop:{}] tool '{}' returned isError", pipeline.trace_id(), call.name);
                }
            }

            info!("[tool-loop:{}] completed turn {}/{}", pipeline.trace_id(), turn + 1, self.iteration_cap);
        }

        // Iteration cap reached: one final tools-disabled call for a
        // best-effort summary (§4.4 "Termination guarantees").
        pipeline.status("Summarizing after reaching the tool-call limit…").await;
        conversation.push(Message::user(
            "You have reached the tool-call limit for this turn. Produce a best-effort final answer using only what you already know; do not request any more tools.".to_string(),
        ));
        let response = self.call_llm(&conversation, &[], cancel).await?;
        let (artifacts, conversation_text) = accumulator.finalize(response.text_output);
        Ok(LoopOutcome::Completed(ResultPayload { thinking: None, conversation: conversation_text, artifacts }))
    }

    fn finalize(&self, call: &FunctionCall, mut accumulator: ArtifactAccumulator) -> Result<LoopOutcome, LoopError> {
        let args: FormatterArguments = serde_json::from_value(call.arguments.clone())
            .map_err(|e| LoopError::Llm(format!("malformed response_formatter arguments: {e}")))?;
        accumulator.ingest_declared(args.artifacts);
        let (artifacts, conversation) = accumulator.finalize(args.conversation);
        Ok(LoopOutcome::Completed(ResultPayload { thinking: args.thinking, conversation, artifacts }))
    }

    async fn available_tools(
        &self,
        blocked: &[String],
        allow_list: Option<&std::collections::HashMap<String, Vec<String>>>,
    ) -> Vec<(String, Option<String>, Value)> {
        let all = self.mcp.list_available_tools(blocked).await;
        let Some(allow_list) = allow_list else { return all };

        all.into_iter()
            .filter(|(qualified, _, _)| {
                let Some((server, tool)) = crate::mcp::protocol::unqualify_tool_name(qualified) else { return true };
                allow_list.get(server).map(|allowed| allowed.iter().any(|t| t == tool)).unwrap_or(false)
            })
            .collect()
    }

    /// Calls the LLM with up to 3 attempts, exponential backoff starting at
    /// 500ms capped at 4s (§4.4 "Failure semantics"). Honors cancellation
    /// between attempts.
    async fn call_llm(
        &self,
        conversation: &[Message],
        tools: &[Value],
        cancel: &tokio_util::sync::CancellationToken,
    ) -> Result<ToolResponse, LoopError> {
        let mut delay = Duration::from_millis(500);
        let mut last_error = String::new();

        for attempt in 0..3 {
            let call = self.llm.chat_with_tools(conversation.to_vec(), SYSTEM_PROMPT.to_string(), tools.to_vec(), None);
            tokio::select! {
                _ = cancel.cancelled() => return Err(LoopError::Cancelled),
                result = call => match result {
                    Ok(response) => return Ok(response),
                    Err(e) => {
                        last_error = e.to_string();
                        warn!("LLM call attempt {} failed: {}", attempt + 1, last_error);
                    }
                },
            }

            if attempt < 2 {
                tokio::select! {
                    _ = cancel.cancelled() => return Err(LoopError::Cancelled),
                    _ = sleep(delay) => {}
                }
                delay = (delay * 2).min(Duration::from_secs(4));
            }
        }

        Err(LoopError::Llm(last_error))
    }
}

fn build_initial_conversation(request: &ChatRequest) -> Vec<Message> {
    let mut conversation: Vec<Message> = request.history.iter().map(history_item_to_message).collect();
    conversation.push(Message::user(request.message.clone()));
    conversation
}

fn history_item_to_message(item: &ChatHistoryItem) -> Message {
    match item.role.as_str() {
        "assistant" => Message::assistant(item.content.clone()),
        _ => Message::user(item.content.clone()),
    }
}

fn to_tool_call_info(call: &FunctionCall) -> ToolCallInfo {
    ToolCallInfo { id: call.id.clone(), name: call.name.clone(), arguments: call.arguments.clone() }
}

fn to_tool_definitions(tools: &[(String, Option<String>, Value)]) -> Vec<Value> {
    tools
        .iter()
        .map(|(name, description, schema)| {
            json!({
                "type": "function",
                "function": {
                    "name": name,
                    "description": description.clone().unwrap_or_default(),
                    "parameters": schema,
                }
            })
        })
        .collect()
}

fn display_name(qualified: &str) -> String {
    crate::mcp::protocol::unqualify_tool_name(qualified).map(|(_, tool)| tool.to_string()).unwrap_or_else(|| qualified.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::any::Any;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::mpsc;

    struct StubProvider {
        calls: AtomicUsize,
        responses: std::sync::Mutex<Vec<ToolResponse>>,
    }

    #[async_trait]
    impl LlmProvider for StubProvider {
        fn name(&self) -> &'static str {
            "stub"
        }
        fn as_any(&self) -> &dyn Any {
            self
        }
        async fn chat(&self, _messages: Vec<Message>, _system: String) -> anyhow::Result<crate::llm::provider::Response> {
            unimplemented!()
        }
        async fn chat_with_tools(
            &self,
            _messages: Vec<Message>,
            _system: String,
            _tools: Vec<Value>,
            _context: Option<crate::llm::provider::ToolContext>,
        ) -> anyhow::Result<ToolResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                anyhow::bail!("no more stubbed responses");
            }
            Ok(responses.remove(0))
        }
    }

    fn formatter_response(conversation: &str) -> ToolResponse {
        ToolResponse {
            id: "resp-1".into(),
            text_output: String::new(),
            function_calls: vec![FunctionCall {
                id: "call-1".into(),
                name: RESPONSE_FORMATTER_NAME.into(),
                arguments: json!({ "conversation": conversation }),
            }],
            tokens: crate::llm::provider::TokenUsage { input: 0, output: 0, reasoning: 0, cached: 0 },
            latency_ms: 0,
            raw_response: Value::Null,
        }
    }

    #[tokio::test]
    async fn test_single_turn_formatter_only_produces_result() {
        let provider = Arc::new(StubProvider {
            calls: AtomicUsize::new(0),
            responses: std::sync::Mutex::new(vec![formatter_response("The answer is 5.")]),
        });
        let mcp = Arc::new(McpService::new());
        let loop_ = ToolInvocationLoop::new(mcp, provider.clone());

        let (tx, mut rx) = mpsc::channel(16);
        let pipeline = StreamingPipeline::new(tx, tokio_util::sync::CancellationToken::new());

        let request = ChatRequest {
            message: "what is 2+3?".into(),
            history: vec![],
            blocked_servers: vec![],
            enabled_tools: None,
            pinned_artifacts: vec![],
            model_settings: Default::default(),
            graph_mode: false,
        };

        loop_.run(request, pipeline).await.unwrap();

        let mut saw_result = false;
        while let Ok(line) = rx.try_recv() {
            let text = String::from_utf8(line.to_vec()).unwrap();
            if text.contains("\"type\":\"result\"") {
                saw_result = true;
                assert!(text.contains("The answer is 5."));
            }
        }
        assert!(saw_result);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_iteration_cap_bounds_llm_calls() {
        // Every stubbed response is a dummy tool call that never matches a
        // real MCP server, forcing a fresh turn each time until the cap
        // forces a final tools-disabled summary call.
        let cap = 3usize;
        let mut responses = Vec::new();
        for i in 0..cap {
            responses.push(ToolResponse {
                id: format!("r{i}"),
                text_output: String::new(),
                function_calls: vec![FunctionCall { id: format!("c{i}"), name: "mcp__ghost__noop".into(), arguments: json!({}) }],
                tokens: crate::llm::provider::TokenUsage { input: 0, output: 0, reasoning: 0, cached: 0 },
                latency_ms: 0,
                raw_response: Value::Null,
            });
        }
        responses.push(formatter_response("best effort summary"));

        let provider = Arc::new(StubProvider { calls: AtomicUsize::new(0), responses: std::sync::Mutex::new(responses) });
        let mcp = Arc::new(McpService::new());
        let loop_ = ToolInvocationLoop::new(mcp, provider.clone()).with_iteration_cap(cap);

        let (tx, _rx) = mpsc::channel(16);
        let pipeline = StreamingPipeline::new(tx, tokio_util::sync::CancellationToken::new());

        let request = ChatRequest {
            message: "go".into(),
            history: vec![],
            blocked_servers: vec![],
            enabled_tools: None,
            pinned_artifacts: vec![],
            model_settings: Default::default(),
            graph_mode: false,
        };

        loop_.run(request, pipeline).await.unwrap();
        // cap turns + 1 final tools-disabled call, never more (§8 invariant 3).
        assert_eq!(provider.calls.load(Ordering::SeqCst), cap + 1);
    }

    #[tokio::test]
    async fn test_cancellation_short_circuits_before_llm_call() {
        let provider = Arc::new(StubProvider { calls: AtomicUsize::new(0), responses: std::sync::Mutex::new(vec![]) });
        let mcp = Arc::new(McpService::new());
        let loop_ = ToolInvocationLoop::new(mcp, provider.clone());

        let (tx, _rx) = mpsc::channel(16);
        let cancel = tokio_util::sync::CancellationToken::new();
        cancel.cancel();
        let pipeline = StreamingPipeline::new(tx, cancel);

        let request = ChatRequest {
            message: "go".into(),
            history: vec![],
            blocked_servers: vec![],
            enabled_tools: None,
            pinned_artifacts: vec![],
            model_settings: Default::default(),
            graph_mode: false,
        };

        let result = loop_.run(request, pipeline).await;
        assert!(matches!(result, Err(LoopError::Cancelled)));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }
}
