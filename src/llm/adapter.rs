//! The `ProviderAdapter` capability-set trait (spec.md §9's redesign note):
//! one object per wire dialect owning request building, response-stream
//! parsing, tool-result formatting, capability reporting, and model listing,
//! replacing the teacher's per-provider inheritance chain
//! (`LLMProvider` impls `create`/`chat`/`chat_loop` each with its own
//! `reqwest::Client` field) with composition the engine drives uniformly.
//!
//! Streaming is expressed with `async-stream`, matching the teacher's own
//! dependency on it for exactly this shape: a `Stream` built from an `async`
//! block that `.await`s an inner stream and `yield`s as values become ready.

use crate::error::{EngineError, TransportError};
use crate::message::{Message, ResponseChunk, ToolCall, ToolResult, Usage};
use crate::tools::Dialect;
use crate::transport::HttpTransport;
use bytes::Bytes;
use futures::stream::BoxStream;
use std::collections::{HashMap, HashSet};

/// A capability a model/endpoint may or may not support (spec.md §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    Streaming,
    ToolCalling,
    Thinking,
    PromptCaching,
    Vision,
}

pub type Capabilities = HashSet<Capability>;

/// Everything an adapter needs to build one request. Assembled by the
/// engine from `History`, `FunctionTable`, and the active `EndpointConfig`.
pub struct RequestContext<'a> {
    pub model: &'a str,
    pub messages: &'a [Message],
    pub tools: &'a serde_json::Value,
    pub max_tokens: Option<u32>,
    pub context_size: Option<u32>,
    pub stream: bool,
    pub keep_alive: &'a str,
    pub extra_headers: &'a HashMap<String, String>,
}

/// Path, headers, and encoded body for one HTTP request.
pub struct PreparedRequest {
    pub path: String,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
    pub content_type: &'static str,
}

/// One wire dialect's translation between `crate::message` types and a
/// provider's HTTP API.
#[async_trait::async_trait]
pub trait ProviderAdapter: Send + Sync {
    fn dialect(&self) -> Dialect;

    /// Build the request for one turn.
    fn build_request(&self, ctx: &RequestContext) -> Result<PreparedRequest, EngineError>;

    /// Turn the raw response byte stream into decoded chunks, in order.
    /// Framing (NDJSON lines, SSE events) is internal to each adapter.
    fn parse_stream(
        &self,
        bytes: BoxStream<'static, Result<Bytes, TransportError>>,
    ) -> BoxStream<'static, Result<ResponseChunk, EngineError>>;

    /// Render a tool's result back into the history messages that should
    /// follow the assistant's tool-call message (spec.md §4.10). Anthropic
    /// wants a single `user` message with a `tool_result` content block;
    /// Ollama/OpenAI want a `role: tool` message carrying `tool_call_id`.
    fn format_tool_result(&self, call: &ToolCall, result: &ToolResult) -> Message;

    /// Best-effort static capability set for a given model name. None of
    /// the three dialects expose a reliable live probe for every capability
    /// (spec.md §9 Open Question), so this is a name-pattern heuristic, not
    /// a network round trip.
    fn capabilities(&self, model: &str) -> Capabilities;

    /// List model names the endpoint currently offers.
    async fn list_models(&self, transport: &dyn HttpTransport) -> Result<Vec<String>, EngineError>;
}

/// Render a tool's raw output into the human-readable string every dialect's
/// `format_tool_result` sends back to the model (spec.md §4.10), ported
/// from the teacher's `ClaudeClient::FormatToolResponse` /
/// `OllamaClient::FormatToolResponse` (`original_source/assistant/
/// claude_client.cpp`, `ollama_client.cpp`).
pub fn render_tool_result_text(call: &ToolCall, result: &ToolResult) -> String {
    if result.is_error {
        format!(
            "An error occurred while executing tool: '{}'. Reason: {}",
            call.name, result.text
        )
    } else {
        format!("Tool '{}' completed successfully. Output:\n{}", call.name, result.text)
    }
}

/// Accumulates an additive usage total across however many chunks a single
/// `Done` event reports it in (providers differ on whether usage trickles
/// in per-delta or arrives once at the end).
#[derive(Debug, Clone, Copy, Default)]
pub struct UsageAccumulator(Usage);

impl UsageAccumulator {
    pub fn add(&mut self, delta: &Usage) {
        self.0.add(delta);
    }

    pub fn total(&self) -> Usage {
        self.0
    }
}
