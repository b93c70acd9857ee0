// src/orchestrator/formatter.rs
// The mandatory `response_formatter` sentinel tool (§4.4 "Awaiting-LLM").
// Every Tool Invocation Loop turn offers this alongside the MCP tool
// catalog; the LLM calling it is what moves the loop from Executing-Tools
// to Formatting and ends the turn.

use serde::Deserialize;
use serde_json::{json, Value};

pub const RESPONSE_FORMATTER_NAME: &str = "response_formatter";

/// JSON-schema for `response_formatter`'s arguments, built in the same
/// shape `CompiledSchema` expects for an MCP tool (so it can ride the same
/// tool-catalog list the loop hands the LLM provider).
pub fn response_formatter_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "thinking": {
                "type": "string",
                "description": "Private reasoning trace, not shown verbatim to the user."
            },
            "conversation": {
                "type": "string",
                "description": "The final reply text shown to the user."
            },
            "artifacts": {
                "type": "array",
                "description": "Artifacts the assistant is declaring as part of this answer (code, tables, etc).",
                "items": {
                    "type": "object",
                    "properties": {
                        "type": { "type": "string" },
                        "title": { "type": "string" },
                        "content": { "type": "string" },
                        "language": { "type": "string" }
                    },
                    "required": ["type", "title", "content"]
                }
            }
        },
        "required": ["conversation"]
    })
}

pub fn response_formatter_tool_entry() -> (String, Option<String>, Value) {
    (
        RESPONSE_FORMATTER_NAME.to_string(),
        Some("Call this exactly once to deliver the final answer to the user.".to_string()),
        response_formatter_schema(),
    )
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeclaredArtifact {
    #[serde(rename = "type")]
    pub kind: String,
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub language: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FormatterArguments {
    #[serde(default)]
    pub thinking: Option<String>,
    pub conversation: String,
    #[serde(default)]
    pub artifacts: Vec<DeclaredArtifact>,
}
