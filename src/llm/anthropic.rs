//! Anthropic `/v1/messages` adapter.
//!
//! Role→content-block mapping and wire shapes grounded in the teacher's own
//! `llm/anthropic.rs` (`build_request_body`, `AnthropicContentBlock`,
//! `parse_finish_reason`): a `system` message becomes the top-level `system`
//! string (first one wins), assistant messages carry `text` and `tool_use`
//! blocks, and a `tool` message becomes a `user` message wrapping a single
//! `tool_result` block (spec.md §4.10). SSE framing and decoding is
//! delegated entirely to `super::sse::AnthropicSseParser`, built from
//! `original_source/assistant/claude_response_parser.cpp`'s state machine;
//! this module only adapts `eventsource_stream::Eventsource` framing over
//! the transport's byte stream, same as the teacher's `chat_loop`.

use super::adapter::{Capabilities, Capability, PreparedRequest, ProviderAdapter, RequestContext};
use super::sse::AnthropicSseParser;
use crate::error::{EngineError, TransportError};
use crate::message::{Content, ContentBlock, Message, ResponseChunk, Role, ToolCall, ToolResult};
use crate::tools::Dialect;
use crate::transport::HttpTransport;
use async_stream::stream;
use bytes::Bytes;
use eventsource_stream::Eventsource;
use futures::stream::BoxStream;
use futures::StreamExt;
use serde_json::json;

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 4096;

pub struct AnthropicAdapter;

impl AnthropicAdapter {
    pub fn new() -> Self {
        Self
    }

    /// Split history into the leading system prompt (first `system` message,
    /// if any) and the Anthropic-dialect message array.
    fn convert_messages(messages: &[Message]) -> (Option<String>, Vec<serde_json::Value>) {
        let mut system = None;
        let mut out = Vec::new();

        for msg in messages {
            match msg.role {
                Role::System => {
                    if system.is_none() {
                        system = Some(msg.content.as_text());
                    }
                }
                Role::User => {
                    out.push(json!({
                        "role": "user",
                        "content": msg.content.as_text(),
                    }));
                }
                Role::Assistant => {
                    let mut blocks = Vec::new();
                    let text = msg.content.as_text();
                    if !text.is_empty() {
                        blocks.push(json!({ "type": "text", "text": text }));
                    }
                    for call in msg.tool_calls.iter().flatten() {
                        blocks.push(json!({
                            "type": "tool_use",
                            "id": call.id.clone().unwrap_or_default(),
                            "name": call.name,
                            "input": call.arguments,
                        }));
                    }
                    out.push(json!({ "role": "assistant", "content": blocks }));
                }
                Role::Tool => {
                    out.push(json!({
                        "role": "user",
                        "content": [{
                            "type": "tool_result",
                            "tool_use_id": msg.tool_call_id.clone().unwrap_or_default(),
                            "content": msg.content.as_text(),
                        }]
                    }));
                }
            }
        }

        (system, out)
    }
}

impl Default for AnthropicAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl ProviderAdapter for AnthropicAdapter {
    fn dialect(&self) -> Dialect {
        Dialect::Anthropic
    }

    fn build_request(&self, ctx: &RequestContext) -> Result<PreparedRequest, EngineError> {
        let (system, messages) = Self::convert_messages(ctx.messages);

        let mut body = json!({
            "model": ctx.model,
            "max_tokens": ctx.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            "messages": messages,
            "stream": ctx.stream,
        });
        if let Some(system) = system {
            body["system"] = json!(system);
        }
        if let Some(tools) = ctx.tools.as_array() {
            if !tools.is_empty() {
                body["tools"] = ctx.tools.clone();
            }
        }

        let mut headers = ctx.extra_headers.clone();
        headers.insert("anthropic-version".to_string(), ANTHROPIC_VERSION.to_string());

        Ok(PreparedRequest {
            path: "/v1/messages".to_string(),
            headers,
            body: serde_json::to_vec(&body).map_err(EngineError::Json)?,
            content_type: "application/json",
        })
    }

    fn parse_stream(
        &self,
        bytes: BoxStream<'static, Result<Bytes, TransportError>>,
    ) -> BoxStream<'static, Result<ResponseChunk, EngineError>> {
        Box::pin(stream! {
            let mut events = bytes.eventsource();
            let mut parser = AnthropicSseParser::new();

            while let Some(event) = events.next().await {
                let event = match event {
                    Ok(e) => e,
                    Err(e) => {
                        yield Err(EngineError::Parse(format!("sse framing error: {e}")));
                        return;
                    }
                };
                for chunk in parser.feed(&event) {
                    let is_done = matches!(chunk, ResponseChunk::Done { .. });
                    yield Ok(chunk);
                    if is_done {
                        return;
                    }
                }
            }
        })
    }

    fn format_tool_result(&self, call: &ToolCall, result: &ToolResult) -> Message {
        Message {
            role: Role::Tool,
            content: Content::Blocks(vec![ContentBlock::ToolResult {
                tool_use_id: call.id.clone().unwrap_or_default(),
                content: super::adapter::render_tool_result_text(call, result),
                is_error: result.is_error,
            }]),
            tool_calls: None,
            tool_call_id: call.id.clone(),
        }
    }

    fn capabilities(&self, model: &str) -> Capabilities {
        let mut caps = Capabilities::new();
        caps.insert(Capability::Streaming);
        caps.insert(Capability::ToolCalling);
        caps.insert(Capability::PromptCaching);
        caps.insert(Capability::Thinking);
        if model.contains("claude-3") || model.contains("claude-opus") || model.contains("claude-sonnet") {
            caps.insert(Capability::Vision);
        }
        caps
    }

    /// Anthropic has no public "list models for this key" endpoint the way
    /// Ollama/OpenAI do; fall back to the well-known model ids rather than
    /// a network round trip that would need a beta header to even work.
    async fn list_models(&self, _transport: &dyn HttpTransport) -> Result<Vec<String>, EngineError> {
        Ok(vec![
            "claude-opus-4-1".to_string(),
            "claude-sonnet-4-5".to_string(),
            "claude-3-5-haiku-latest".to_string(),
        ])
    }
}
