// src/orchestrator/mod.rs
// The MCP Orchestration Core: the chat-facing layer built on top of the
// mcp:: client stack (C1-C3). This module holds C4 (the Tool Invocation
// Loop), C5 (the Streaming Response Pipeline), and C6 (the Artifact
// Accumulator), plus the wire types the HTTP chat route exchanges with the
// browser client.

pub mod accumulator;
pub mod artifact;
pub mod chat;
pub mod formatter;
pub mod pipeline;
pub mod tool_loop;

pub use accumulator::ArtifactAccumulator;
pub use artifact::{Artifact, Bibliography, BibliographyEntry, Edge, KnowledgeGraph, Node};
pub use chat::{ChatHistoryItem, ChatRequest, ModelSettings, ResultPayload, StreamFrame};
pub use pipeline::StreamingPipeline;
pub use tool_loop::{LoopError, LoopOutcome, ToolInvocationLoop};
