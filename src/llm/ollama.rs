//! Ollama native `/api/chat` adapter.
//!
//! Wire shapes grounded in `other_examples/...openclaw__cli-rust-src-llm-ollama.rs`:
//! NDJSON streaming (one complete JSON object per line, not SSE), and the
//! critical property that example calls out — tool calls land in
//! intermediate `done: false` chunks, never the final `done: true` one, so
//! every chunk's `message.tool_calls` must be drained, not just the last.
//! Unlike OpenAI's delta-by-delta function-call assembly, each Ollama
//! `tool_calls` entry already carries a complete name+arguments pair.

use super::adapter::{Capabilities, Capability, PreparedRequest, ProviderAdapter, RequestContext};
use super::chunked::LineBuffer;
use crate::error::{EngineError, TransportError};
use crate::message::{Content, Message, ResponseChunk, Role, ToolCall, ToolResult, Usage};
use crate::tools::Dialect;
use crate::transport::HttpTransport;
use async_stream::stream;
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::StreamExt;
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;

pub struct OllamaAdapter;

impl OllamaAdapter {
    pub fn new() -> Self {
        Self
    }

    fn convert_message(msg: &Message) -> serde_json::Value {
        match msg.role {
            Role::Tool => json!({
                "role": "tool",
                "content": msg.content.as_text(),
            }),
            Role::Assistant => {
                let mut m = json!({
                    "role": "assistant",
                    "content": msg.content.as_text(),
                });
                if let Some(calls) = &msg.tool_calls {
                    if !calls.is_empty() {
                        m["tool_calls"] = json!(calls
                            .iter()
                            .map(|c| json!({
                                "function": { "name": c.name, "arguments": c.arguments }
                            }))
                            .collect::<Vec<_>>());
                    }
                }
                m
            }
            Role::System => json!({ "role": "system", "content": msg.content.as_text() }),
            Role::User => json!({ "role": "user", "content": msg.content.as_text() }),
        }
    }
}

impl Default for OllamaAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl ProviderAdapter for OllamaAdapter {
    fn dialect(&self) -> Dialect {
        Dialect::Ollama
    }

    fn build_request(&self, ctx: &RequestContext) -> Result<PreparedRequest, EngineError> {
        let messages: Vec<serde_json::Value> =
            ctx.messages.iter().map(Self::convert_message).collect();

        let mut options = json!({ "num_ctx": ctx.context_size.unwrap_or(4096) });
        if let Some(max_tokens) = ctx.max_tokens {
            options["num_predict"] = json!(max_tokens);
        }

        let mut body = json!({
            "model": ctx.model,
            "messages": messages,
            "stream": ctx.stream,
            "keep_alive": ctx.keep_alive,
            "options": options,
        });
        if let Some(tools) = ctx.tools.as_array() {
            if !tools.is_empty() {
                body["tools"] = ctx.tools.clone();
            }
        }

        Ok(PreparedRequest {
            path: "/api/chat".to_string(),
            headers: ctx.extra_headers.clone(),
            body: serde_json::to_vec(&body).map_err(EngineError::Json)?,
            content_type: "application/json",
        })
    }

    fn parse_stream(
        &self,
        mut bytes: BoxStream<'static, Result<Bytes, TransportError>>,
    ) -> BoxStream<'static, Result<ResponseChunk, EngineError>> {
        Box::pin(stream! {
            let mut buf = LineBuffer::new();
            let mut scanner = ThinkTagScanner::default();
            let mut usage = Usage::default();

            while let Some(chunk) = bytes.next().await {
                let chunk = match chunk {
                    Ok(c) => c,
                    Err(e) => {
                        yield Err(EngineError::Transport(e));
                        return;
                    }
                };
                for line in buf.push(&chunk) {
                    let parsed: OllamaChatChunk = match serde_json::from_str(&line) {
                        Ok(v) => v,
                        Err(e) => {
                            yield Err(EngineError::Parse(format!("malformed ollama chunk: {e}")));
                            continue;
                        }
                    };

                    if !parsed.message.content.is_empty() {
                        for piece in scanner.feed(&parsed.message.content) {
                            yield Ok(piece);
                        }
                    }
                    for call in parsed.message.tool_calls.unwrap_or_default() {
                        yield Ok(ResponseChunk::ToolCall {
                            name: call.function.name,
                            id: None,
                            arguments: call.function.arguments,
                        });
                    }

                    usage.input_tokens = parsed.prompt_eval_count;
                    usage.output_tokens = parsed.eval_count;

                    if parsed.done {
                        yield Ok(ResponseChunk::Done {
                            stop_reason: Some(parsed.done_reason.unwrap_or_else(|| "stop".to_string())),
                            usage: Some(usage),
                        });
                        return;
                    }
                }
            }
        })
    }

    fn format_tool_result(&self, call: &ToolCall, result: &ToolResult) -> Message {
        Message {
            role: Role::Tool,
            content: Content::Text(super::adapter::render_tool_result_text(call, result)),
            tool_calls: None,
            tool_call_id: call.id.clone(),
        }
    }

    fn capabilities(&self, model: &str) -> Capabilities {
        let mut caps = Capabilities::new();
        caps.insert(Capability::Streaming);
        caps.insert(Capability::Thinking);
        let lower = model.to_lowercase();
        if lower.contains("llama3.1")
            || lower.contains("llama3.2")
            || lower.contains("mistral")
            || lower.contains("qwen2.5")
            || lower.contains("qwen3")
            || lower.contains("firefunction")
        {
            caps.insert(Capability::ToolCalling);
        }
        if lower.contains("llava") || lower.contains("vision") {
            caps.insert(Capability::Vision);
        }
        caps
    }

    async fn list_models(&self, transport: &dyn HttpTransport) -> Result<Vec<String>, EngineError> {
        let body = transport
            .get("/api/tags", &HashMap::new())
            .await
            .map_err(EngineError::Transport)?;
        let parsed: TagsResponse =
            serde_json::from_slice(&body).map_err(|e| EngineError::Parse(e.to_string()))?;
        Ok(parsed.models.into_iter().map(|m| m.name).collect())
    }
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagEntry>,
}

#[derive(Debug, Deserialize)]
struct TagEntry {
    name: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct OllamaChatChunk {
    message: OllamaMessage,
    done: bool,
    #[serde(default)]
    done_reason: Option<String>,
    prompt_eval_count: u64,
    eval_count: u64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct OllamaMessage {
    content: String,
    tool_calls: Option<Vec<OllamaToolCall>>,
}

#[derive(Debug, Deserialize)]
struct OllamaToolCall {
    function: OllamaToolCallFunction,
}

#[derive(Debug, Deserialize)]
struct OllamaToolCallFunction {
    name: String,
    arguments: serde_json::Value,
}

/// Splits Ollama's inline `<think>...</think>` text markers out of the
/// content stream so their text surfaces as `ResponseChunk::Thinking`
/// instead of `ResponseChunk::Text`, without needing the whole message
/// buffered up front — only enough of a trailing window to rule a partial
/// tag in or out.
#[derive(Default)]
struct ThinkTagScanner {
    in_thinking: bool,
    carry: String,
}

const OPEN_TAG: &str = "<think>";
const CLOSE_TAG: &str = "</think>";

impl ThinkTagScanner {
    fn feed(&mut self, text: &str) -> Vec<ResponseChunk> {
        self.carry.push_str(text);
        let mut out = Vec::new();
        loop {
            let tag = if self.in_thinking { CLOSE_TAG } else { OPEN_TAG };
            if let Some(pos) = self.carry.find(tag) {
                let before = self.carry[..pos].to_string();
                if !before.is_empty() {
                    out.push(self.wrap(before));
                }
                self.carry.drain(..pos + tag.len());
                self.in_thinking = !self.in_thinking;
                // The tag text itself is still reported, always tagged
                // `thinking=true`, so the caller can render the transition
                // (spec.md §4.8 step 2, scenario 2).
                out.push(ResponseChunk::Thinking { delta: tag.to_string() });
                continue;
            }
            let keep = longest_tag_prefix_suffix(&self.carry, tag);
            let emit_len = self.carry.len() - keep;
            if emit_len > 0 {
                let text_out = self.carry[..emit_len].to_string();
                self.carry.drain(..emit_len);
                out.push(self.wrap(text_out));
            }
            break;
        }
        out
    }

    fn wrap(&self, text: String) -> ResponseChunk {
        if self.in_thinking {
            ResponseChunk::Thinking { delta: text }
        } else {
            ResponseChunk::Text { delta: text }
        }
    }
}

/// Longest suffix of `s` that is also a prefix of `tag` (and shorter than
/// `tag` itself) — the portion that might still turn into a full tag match
/// once more bytes arrive.
fn longest_tag_prefix_suffix(s: &str, tag: &str) -> usize {
    let max_check = (tag.len() - 1).min(s.len());
    for len in (1..=max_check).rev() {
        let suffix = &s[s.len() - len..];
        if tag.starts_with(suffix) {
            return len;
        }
    }
    0
}
