// src/llm/provider/mod.rs
// Universal LLM provider trait plus the one concrete provider (OpenAI).

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::any::Any;

pub mod openai;

pub use openai::OpenAIProvider;

/// Tool call information for assistant messages
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallInfo {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

/// Simple message format for all providers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,

    /// For tool response messages - links response to specific tool call
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,

    /// For assistant messages that request tool calls
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCallInfo>>,
}

impl Message {
    pub fn user(content: String) -> Self {
        Self { role: "user".to_string(), content, tool_call_id: None, tool_calls: None }
    }

    pub fn assistant(content: String) -> Self {
        Self { role: "assistant".to_string(), content, tool_call_id: None, tool_calls: None }
    }

    pub fn system(content: String) -> Self {
        Self { role: "system".to_string(), content, tool_call_id: None, tool_calls: None }
    }

    pub fn tool_result(call_id: String, output: String) -> Self {
        Self { role: "tool".to_string(), content: output, tool_call_id: Some(call_id), tool_calls: None }
    }

    pub fn assistant_with_tool_calls(content: String, tool_calls: Vec<ToolCallInfo>) -> Self {
        Self { role: "assistant".to_string(), content, tool_call_id: None, tool_calls: Some(tool_calls) }
    }
}

/// Token usage tracking across all providers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input: i64,
    pub output: i64,
    pub reasoning: i64,
    pub cached: i64,
}

/// Basic chat response (no tools)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub content: String,
    pub model: String,
    pub tokens: TokenUsage,
    pub latency_ms: i64,
}

/// Function call from LLM
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionCall {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

/// Tool calling response with function calls
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResponse {
    pub id: String,
    pub text_output: String,
    pub function_calls: Vec<FunctionCall>,
    pub tokens: TokenUsage,
    pub latency_ms: i64,
    pub raw_response: Value,
}

/// Context for multi-turn conversations
#[derive(Debug, Clone)]
pub enum ToolContext {
    // Reserved for providers that need to thread extra state across turns.
}

/// Universal LLM provider interface
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Provider name for logging
    fn name(&self) -> &'static str;

    /// Downcast to concrete type (for accessing provider-specific methods)
    fn as_any(&self) -> &dyn Any;

    /// Basic chat (no tools)
    async fn chat(&self, messages: Vec<Message>, system: String) -> Result<Response>;

    /// Chat with tool calling
    async fn chat_with_tools(
        &self,
        messages: Vec<Message>,
        system: String,
        tools: Vec<Value>,
        context: Option<ToolContext>,
    ) -> Result<ToolResponse>;

    async fn stream(
        &self,
        _messages: Vec<Message>,
        _system: String,
    ) -> Result<Box<dyn futures::Stream<Item = Result<String>> + Send + Unpin>> {
        Err(anyhow::anyhow!("{} does not support streaming", self.name()))
    }
}
