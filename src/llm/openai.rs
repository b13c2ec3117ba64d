//! OpenAI `/v1/chat/completions` adapter.
//!
//! Request/response shapes grounded in the teacher's own `llm/openai.rs`
//! (`ChatCompletionRequest`, `ChatMessage` tagged by `role`, `ChatCompletionChunk`
//! / `Choice` / `Delta` / `ToolCallDelta`); the teacher's Responses-API
//! compaction path and `prune_tool_turns` auto-pruning are not carried
//! forward (history retention here is the explicit `History::shrink_to_fit`
//! operation, not an automatic per-provider pruning pass). Tool-call
//! arguments arrive as a JSON-encoded string assembled incrementally across
//! deltas keyed by index, the same accumulation shape as the teacher's
//! `ToolCallAssembler` in the old `llm/provider.rs`.

use super::adapter::{Capabilities, Capability, PreparedRequest, ProviderAdapter, RequestContext};
use super::chunked::{strip_sse_data_prefix, LineBuffer};
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

pub struct OpenAiAdapter;

impl OpenAiAdapter {
    pub fn new() -> Self {
        Self
    }

    fn convert_message(msg: &Message) -> serde_json::Value {
        match msg.role {
            Role::System => json!({ "role": "system", "content": msg.content.as_text() }),
            Role::User => json!({ "role": "user", "content": msg.content.as_text() }),
            Role::Tool => json!({
                "role": "tool",
                "content": msg.content.as_text(),
                "tool_call_id": msg.tool_call_id.clone().unwrap_or_default(),
            }),
            Role::Assistant => {
                let text = msg.content.as_text();
                let mut m = json!({
                    "role": "assistant",
                    "content": if text.is_empty() { serde_json::Value::Null } else { json!(text) },
                });
                if let Some(calls) = &msg.tool_calls {
                    if !calls.is_empty() {
                        m["tool_calls"] = json!(calls
                            .iter()
                            .enumerate()
                            .map(|(i, c)| json!({
                                "id": c.id.clone().unwrap_or_else(|| format!("call_{i}")),
                                "type": "function",
                                "function": {
                                    "name": c.name,
                                    "arguments": serde_json::to_string(&c.arguments).unwrap_or_default(),
                                }
                            }))
                            .collect::<Vec<_>>());
                    }
                }
                m
            }
        }
    }
}

impl Default for OpenAiAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl ProviderAdapter for OpenAiAdapter {
    fn dialect(&self) -> Dialect {
        Dialect::OpenAi
    }

    fn build_request(&self, ctx: &RequestContext) -> Result<PreparedRequest, EngineError> {
        let messages: Vec<serde_json::Value> =
            ctx.messages.iter().map(Self::convert_message).collect();

        let mut body = json!({
            "model": ctx.model,
            "messages": messages,
            "stream": ctx.stream,
        });
        if ctx.stream {
            body["stream_options"] = json!({ "include_usage": true });
        }
        if let Some(max_tokens) = ctx.max_tokens {
            body["max_completion_tokens"] = json!(max_tokens);
        }
        if let Some(tools) = ctx.tools.as_array() {
            if !tools.is_empty() {
                body["tools"] = ctx.tools.clone();
            }
        }

        Ok(PreparedRequest {
            path: "/v1/chat/completions".to_string(),
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
            let mut assembler: HashMap<usize, PendingToolCall> = HashMap::new();
            let mut order: Vec<usize> = Vec::new();
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
                    let Some(data) = strip_sse_data_prefix(&line) else { continue };
                    if data == "[DONE]" {
                        for idx in &order {
                            if let Some(call) = assembler.remove(idx) {
                                yield Ok(call.into_chunk());
                            }
                        }
                        yield Ok(ResponseChunk::Done { stop_reason: None, usage: Some(usage) });
                        return;
                    }

                    let parsed: ChatCompletionChunk = match serde_json::from_str(data) {
                        Ok(v) => v,
                        Err(e) => {
                            yield Err(EngineError::Parse(format!("malformed openai chunk: {e}")));
                            continue;
                        }
                    };

                    if let Some(u) = parsed.usage {
                        usage.input_tokens = u.prompt_tokens;
                        usage.output_tokens = u.completion_tokens;
                    }

                    let Some(choice) = parsed.choices.into_iter().next() else { continue };
                    if let Some(text) = choice.delta.content {
                        if !text.is_empty() {
                            yield Ok(ResponseChunk::Text { delta: text });
                        }
                    }
                    for delta in choice.delta.tool_calls.unwrap_or_default() {
                        let entry = assembler.entry(delta.index).or_insert_with(|| {
                            order.push(delta.index);
                            PendingToolCall::default()
                        });
                        if let Some(id) = delta.id {
                            entry.id = Some(id);
                        }
                        if let Some(function) = delta.function {
                            if let Some(name) = function.name {
                                entry.name = name;
                            }
                            if let Some(args) = function.arguments {
                                entry.arguments.push_str(&args);
                            }
                        }
                    }

                    if let Some(reason) = choice.finish_reason {
                        for idx in &order {
                            if let Some(call) = assembler.remove(idx) {
                                yield Ok(call.into_chunk());
                            }
                        }
                        yield Ok(ResponseChunk::Done { stop_reason: Some(reason), usage: Some(usage) });
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
        caps.insert(Capability::ToolCalling);
        let lower = model.to_lowercase();
        if lower.starts_with("gpt-4o") || lower.starts_with("gpt-5") || lower.starts_with("o1") {
            caps.insert(Capability::Vision);
        }
        if lower.starts_with("o1") || lower.starts_with("o3") || lower.starts_with("gpt-5") {
            caps.insert(Capability::Thinking);
        }
        caps
    }

    async fn list_models(&self, transport: &dyn HttpTransport) -> Result<Vec<String>, EngineError> {
        let body = transport
            .get("/v1/models", &HashMap::new())
            .await
            .map_err(EngineError::Transport)?;
        let parsed: ModelsResponse =
            serde_json::from_slice(&body).map_err(|e| EngineError::Parse(e.to_string()))?;
        Ok(parsed.data.into_iter().map(|m| m.id).collect())
    }
}

#[derive(Debug, Default)]
struct PendingToolCall {
    id: Option<String>,
    name: String,
    arguments: String,
}

impl PendingToolCall {
    fn into_chunk(self) -> ResponseChunk {
        let arguments = if self.arguments.trim().is_empty() {
            json!({})
        } else {
            serde_json::from_str(&self.arguments).unwrap_or(json!({}))
        };
        ResponseChunk::ToolCall {
            name: self.name,
            id: self.id,
            arguments,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ModelsResponse {
    #[serde(default)]
    data: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionChunk {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<ChunkUsage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    delta: Delta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Delta {
    content: Option<String>,
    tool_calls: Option<Vec<ToolCallDelta>>,
}

#[derive(Debug, Deserialize)]
struct ToolCallDelta {
    index: usize,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<FunctionDelta>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FunctionDelta {
    name: Option<String>,
    arguments: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Copy)]
struct ChunkUsage {
    prompt_tokens: u64,
    completion_tokens: u64,
}
