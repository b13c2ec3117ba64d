//! The chat engine: the piece spec.md §4.7/§4.8 describe as driving one
//! provider endpoint end-to-end — request assembly, streaming decode,
//! per-chunk callback dispatch, tool-call round-tripping, and usage/cost
//! accounting.
//!
//! Control flow (stream → dispatch on chunk kind → execute any requested
//! tools → loop or finish) is grounded in the teacher's
//! `llm::helpers::chat_loop_with_tools` and `AnthropicProvider::chat_loop`'s
//! background-task-plus-channel shape, generalized to drive any
//! `ProviderAdapter` rather than being written once per provider. The
//! teacher's `pick_tool`-specific lazy tool reloading inside that loop is
//! not carried forward — it has no counterpart in this crate's tool model.
//!
//! `tokio::sync::RwLock` guards the function table because reloading MCP
//! servers and invoking a tool both hold the lock across an `.await`
//! (spec.md §5); `History` and the pricing table stay on `std::sync::RwLock`
//! since neither is ever held across an await point, matching the teacher's
//! own split between the two lock flavors.

use super::adapter::{PreparedRequest, ProviderAdapter, RequestContext};
use super::anthropic::AnthropicAdapter;
use super::ollama::OllamaAdapter;
use super::openai::OpenAiAdapter;
use crate::config::{Config, EndpointConfig, EndpointKind};
use crate::error::EngineError;
use crate::history::History;
use crate::message::{ChatOptions, Message, Pricing, Reason, ResponseChunk, ToolCall, Usage};
use crate::tools::{Dialect, FunctionTable};
use crate::transport::{HttpTransport, ReqwestTransport};
use futures::StreamExt;
use std::sync::{Arc, RwLock};
use tokio::sync::{Mutex, RwLock as AsyncRwLock};

/// Consulted before each tool invocation (spec.md §4.9): returning `false`
/// declines the call without running it.
pub type ToolConfirmationHook = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// How many tool-call round trips a single `chat()` call will follow before
/// giving up and surfacing a fatal error, guarding against a model that
/// never stops requesting tools.
const DEFAULT_MAX_TOOL_ROUNDS: usize = 8;

fn dialect_for(kind: EndpointKind) -> Dialect {
    match kind {
        EndpointKind::Ollama => Dialect::Ollama,
        EndpointKind::Openai => Dialect::OpenAi,
        EndpointKind::Anthropic => Dialect::Anthropic,
    }
}

fn adapter_for(kind: EndpointKind) -> Arc<dyn ProviderAdapter> {
    match kind {
        EndpointKind::Ollama => Arc::new(OllamaAdapter::new()),
        EndpointKind::Openai => Arc::new(OpenAiAdapter::new()),
        EndpointKind::Anthropic => Arc::new(AnthropicAdapter::new()),
    }
}

/// Ties together configuration, history, the function table, and one
/// provider adapter to drive complete chat turns, including any tool-call
/// round trips the model requests.
pub struct ChatEngine {
    endpoint: EndpointConfig,
    keep_alive: String,
    stream: bool,
    transport: Arc<dyn HttpTransport>,
    adapter: Arc<dyn ProviderAdapter>,
    history: History,
    tools: AsyncRwLock<FunctionTable>,
    pricing: RwLock<Option<Pricing>>,
    last_cost: RwLock<f64>,
    total_cost: RwLock<f64>,
    tool_confirmation: RwLock<Option<ToolConfirmationHook>>,
    max_tool_rounds: usize,
    queue: Mutex<()>,
}

impl ChatEngine {
    /// Build an engine around `config`'s active endpoint.
    pub fn new(config: &Config, tools: FunctionTable) -> Result<Self, EngineError> {
        let endpoint = config
            .active_endpoint()
            .ok_or_else(|| EngineError::Config("no active endpoint configured".to_string()))?
            .clone();

        let transport = Arc::new(ReqwestTransport::with_verify_tls(
            endpoint.url.clone(),
            endpoint.verify_server_ssl,
        ));
        if let Some(ms) = config.server_timeout.connect_ms {
            transport.set_connect_timeout(std::time::Duration::from_millis(ms));
        }
        if let Some(ms) = config.server_timeout.read_ms {
            transport.set_read_timeout(std::time::Duration::from_millis(ms));
        }
        if let Some(ms) = config.server_timeout.write_ms {
            transport.set_write_timeout(std::time::Duration::from_millis(ms));
        }
        if !endpoint.headers.is_empty() {
            transport.set_headers(endpoint.headers.clone());
        }
        let adapter = adapter_for(endpoint.kind);

        Ok(Self {
            history: History::new(config.history_size),
            keep_alive: config.keep_alive.clone(),
            stream: config.stream,
            endpoint,
            transport,
            adapter,
            tools: AsyncRwLock::new(tools),
            pricing: RwLock::new(None),
            last_cost: RwLock::new(0.0),
            total_cost: RwLock::new(0.0),
            tool_confirmation: RwLock::new(None),
            max_tool_rounds: DEFAULT_MAX_TOOL_ROUNDS,
            queue: Mutex::new(()),
        })
    }

    /// Build an engine around `config`'s active endpoint with a caller-
    /// supplied transport, bypassing the real network client — how
    /// integration tests drive the engine against a scripted
    /// [`HttpTransport`] instead of a live server.
    pub fn with_transport(
        config: &Config,
        tools: FunctionTable,
        transport: Arc<dyn HttpTransport>,
    ) -> Result<Self, EngineError> {
        let endpoint = config
            .active_endpoint()
            .ok_or_else(|| EngineError::Config("no active endpoint configured".to_string()))?
            .clone();
        let adapter = adapter_for(endpoint.kind);

        Ok(Self {
            history: History::new(config.history_size),
            keep_alive: config.keep_alive.clone(),
            stream: config.stream,
            endpoint,
            transport,
            adapter,
            tools: AsyncRwLock::new(tools),
            pricing: RwLock::new(None),
            last_cost: RwLock::new(0.0),
            total_cost: RwLock::new(0.0),
            tool_confirmation: RwLock::new(None),
            max_tool_rounds: DEFAULT_MAX_TOOL_ROUNDS,
            queue: Mutex::new(()),
        })
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    /// Snapshot the current conversation (spec.md §6).
    pub fn get_history(&self) -> Vec<Message> {
        self.history.get()
    }

    /// Replace the conversation wholesale, e.g. to restore a snapshot taken
    /// with [`ChatEngine::get_history`] (spec.md §6).
    pub fn set_history(&self, messages: Vec<Message>) {
        self.history.set(messages);
    }

    pub fn set_pricing(&self, pricing: Pricing) {
        *self.pricing.write().unwrap() = Some(pricing);
    }

    /// Cost of the most recently completed request, in the pricing table's
    /// currency unit.
    pub fn last_request_cost(&self) -> f64 {
        *self.last_cost.read().unwrap()
    }

    /// Same value as [`ChatEngine::last_request_cost`]; kept for callers
    /// ported from the teacher's own naming.
    pub fn last_cost(&self) -> f64 {
        *self.last_cost.read().unwrap()
    }

    /// Sum of every completed request's cost across this engine's lifetime
    /// (spec.md §4.9).
    pub fn total_cost(&self) -> f64 {
        *self.total_cost.read().unwrap()
    }

    /// Install a callback consulted before each tool invocation; returning
    /// `false` declines the call (spec.md §4.9).
    pub fn set_tool_confirmation(&self, hook: impl Fn(&str) -> bool + Send + Sync + 'static) {
        *self.tool_confirmation.write().unwrap() = Some(Arc::new(hook));
    }

    /// Remove any previously installed tool-confirmation hook, so every tool
    /// call runs unconditionally again.
    pub fn clear_tool_confirmation(&self) {
        *self.tool_confirmation.write().unwrap() = None;
    }

    /// Ask any in-flight request to stop at its next chunk boundary.
    pub fn interrupt(&self) {
        self.transport.interrupt();
    }

    /// Direct access to the function table, e.g. to call
    /// `reload_mcp_servers` against a live `Config` or register an
    /// additional in-process tool after construction.
    pub fn tools(&self) -> &AsyncRwLock<FunctionTable> {
        &self.tools
    }

    /// Run one user turn to completion, including any tool-call round trips,
    /// reporting progress to `on_chunk` as chunks decode.
    ///
    /// `on_chunk(reason, chunk)` returning `false` cancels the turn: the
    /// transport is asked to interrupt and `EngineError::Cancelled` is
    /// returned once the in-flight chunk boundary is reached (spec.md §8,
    /// C1).
    pub async fn chat(
        &self,
        text: &str,
        mut on_chunk: impl FnMut(Reason, &ResponseChunk) -> bool + Send,
        options: ChatOptions,
    ) -> Result<Usage, EngineError> {
        let _serial = self.queue.lock().await;

        if !options.no_history {
            self.history.add(Message::user(text));
        }

        let mut total_usage = Usage::default();
        let mut round = 0usize;

        loop {
            let messages = if options.no_history {
                vec![Message::user(text)]
            } else {
                self.history.get()
            };

            let tools_json = if options.no_tools {
                serde_json::Value::Array(vec![])
            } else {
                self.tools.read().await.to_json(dialect_for(self.endpoint.kind))
            };

            let ctx = RequestContext {
                model: &self.endpoint.model,
                messages: &messages,
                tools: &tools_json,
                max_tokens: self.endpoint.max_tokens,
                context_size: self.endpoint.context_size,
                stream: self.stream,
                keep_alive: &self.keep_alive,
                extra_headers: &self.endpoint.headers,
            };

            let PreparedRequest {
                path,
                headers,
                body,
                content_type,
            } = self.adapter.build_request(&ctx)?;

            let byte_stream = self
                .transport
                .post(&path, &headers, body, content_type)
                .await
                .map_err(EngineError::Transport)?;

            let mut decoded = self.adapter.parse_stream(byte_stream);

            let mut response_text = String::new();
            let mut pending_tool_calls: Vec<ToolCall> = Vec::new();
            let mut turn_usage: Option<Usage> = None;
            let mut stop_reason = None;
            let mut cancelled = false;

            while let Some(item) = decoded.next().await {
                let chunk = match item {
                    Ok(c) => c,
                    Err(e) => {
                        let error_chunk = ResponseChunk::Error {
                            kind: "transport".to_string(),
                            message: e.to_string(),
                        };
                        on_chunk(Reason::FatalError, &error_chunk);
                        return Err(e);
                    }
                };

                match &chunk {
                    ResponseChunk::Text { delta } => {
                        response_text.push_str(delta);
                        if !on_chunk(Reason::Partial, &chunk) {
                            cancelled = true;
                        }
                    }
                    ResponseChunk::Thinking { .. } => {
                        if !on_chunk(Reason::Partial, &chunk) {
                            cancelled = true;
                        }
                    }
                    ResponseChunk::ToolCall { name, id, arguments } => {
                        pending_tool_calls.push(ToolCall {
                            id: id.clone(),
                            name: name.clone(),
                            arguments: arguments.clone(),
                        });
                        if !on_chunk(Reason::Partial, &chunk) {
                            cancelled = true;
                        }
                    }
                    ResponseChunk::Done { stop_reason: sr, usage } => {
                        // Anthropic's stream carries usage on `message_delta` and the
                        // terminal `message_stop` (usually data-less) separately; both
                        // surface as `Done` chunks here, so a later, emptier one must
                        // not erase an earlier chunk's stop_reason/usage.
                        if sr.is_some() {
                            stop_reason = sr.clone();
                        }
                        if let Some(u) = usage {
                            turn_usage = Some(*u);
                            if let Some(pricing) = *self.pricing.read().unwrap() {
                                let cost = pricing.cost(u);
                                *self.last_cost.write().unwrap() = cost;
                                *self.total_cost.write().unwrap() += cost;
                                on_chunk(Reason::RequestCost, &chunk);
                            }
                        }
                    }
                    ResponseChunk::Error { message, .. } => {
                        on_chunk(Reason::FatalError, &chunk);
                        return Err(EngineError::Server(message.clone()));
                    }
                }

                if cancelled {
                    self.transport.interrupt();
                    if !options.no_history && !response_text.is_empty() {
                        self.history.add(Message::assistant(response_text));
                    }
                    let cancel_chunk = ResponseChunk::Done {
                        stop_reason: Some("cancelled".to_string()),
                        usage: None,
                    };
                    on_chunk(Reason::Cancelled, &cancel_chunk);
                    return Err(EngineError::Cancelled);
                }
            }

            if let Some(usage) = turn_usage {
                total_usage.add(&usage);
            }

            if !pending_tool_calls.is_empty() && !options.no_tools {
                if !options.no_history {
                    self.history.add(Message {
                        role: crate::message::Role::Assistant,
                        content: response_text.into(),
                        tool_calls: Some(pending_tool_calls.clone()),
                        tool_call_id: None,
                    });
                }

                round += 1;
                if round > self.max_tool_rounds {
                    let error_chunk = ResponseChunk::Error {
                        kind: "tool_loop".to_string(),
                        message: format!("exceeded {} tool-call rounds", self.max_tool_rounds),
                    };
                    on_chunk(Reason::FatalError, &error_chunk);
                    return Err(EngineError::Server(format!(
                        "exceeded {} tool-call rounds",
                        self.max_tool_rounds
                    )));
                }

                let tools = self.tools.read().await;
                for call in &pending_tool_calls {
                    let confirmed = self
                        .tool_confirmation
                        .read()
                        .unwrap()
                        .as_ref()
                        .map(|hook| hook(&call.name))
                        .unwrap_or(true);

                    let result = if confirmed {
                        tools.call(call).await
                    } else {
                        crate::message::ToolResult {
                            is_error: true,
                            text: format!("Permission to run tool {} is declined", call.name),
                        }
                    };
                    on_chunk(
                        Reason::LogDebug,
                        &ResponseChunk::Text {
                            delta: format!("tool {} -> {}", call.name, result.text),
                        },
                    );
                    if !options.no_history {
                        let msg = self.adapter.format_tool_result(call, &result);
                        self.history.add(msg);
                    }
                }
                drop(tools);

                // Another round: rebuild messages from the (now-updated)
                // history and send the follow-up request.
                continue;
            }

            if !options.no_history {
                self.history.add(Message::assistant(response_text));
            }

            let done_chunk = ResponseChunk::Done {
                stop_reason,
                usage: turn_usage,
            };
            on_chunk(Reason::Done, &done_chunk);
            return Ok(total_usage);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EndpointKind;
    use crate::error::TransportError;
    use bytes::Bytes;
    use futures::stream::BoxStream;
    use std::collections::HashMap;

    /// A transport that replays a fixed sequence of byte chunks, ignoring
    /// whatever request was actually built — enough to drive the engine's
    /// dispatch loop without a live server.
    struct ScriptedTransport {
        chunks: Vec<Vec<u8>>,
    }

    #[async_trait::async_trait]
    impl HttpTransport for ScriptedTransport {
        async fn post(
            &self,
            _path: &str,
            _headers: &HashMap<String, String>,
            _body: Vec<u8>,
            _content_type: &str,
        ) -> Result<BoxStream<'static, Result<Bytes, TransportError>>, TransportError> {
            let items: Vec<Result<Bytes, TransportError>> = self
                .chunks
                .iter()
                .map(|c| Ok(Bytes::from(c.clone())))
                .collect();
            Ok(Box::pin(futures::stream::iter(items)))
        }

        async fn get(
            &self,
            _path: &str,
            _headers: &HashMap<String, String>,
        ) -> Result<Bytes, TransportError> {
            Ok(Bytes::new())
        }

        fn set_verify_tls(&self, _verify: bool) {}
        fn set_connect_timeout(&self, _timeout: std::time::Duration) {}
        fn set_read_timeout(&self, _timeout: std::time::Duration) {}
        fn set_write_timeout(&self, _timeout: std::time::Duration) {}
        fn set_headers(&self, _headers: HashMap<String, String>) {}
        fn interrupt(&self) {}
    }

    fn test_endpoint() -> EndpointConfig {
        EndpointConfig {
            url: "http://localhost:11434".to_string(),
            kind: EndpointKind::Ollama,
            model: "llama3.1".to_string(),
            active: true,
            max_tokens: None,
            context_size: None,
            verify_server_ssl: true,
            headers: HashMap::new(),
        }
    }

    /// Replays one scripted response per call to `post`, in order, so a
    /// test can script a tool-call round followed by a plain follow-up
    /// without looping back to the same response forever.
    struct MultiRoundTransport {
        rounds: std::sync::Mutex<std::collections::VecDeque<Vec<Vec<u8>>>>,
    }

    #[async_trait::async_trait]
    impl HttpTransport for MultiRoundTransport {
        async fn post(
            &self,
            _path: &str,
            _headers: &HashMap<String, String>,
            _body: Vec<u8>,
            _content_type: &str,
        ) -> Result<BoxStream<'static, Result<Bytes, TransportError>>, TransportError> {
            let round = self
                .rounds
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_default();
            let items: Vec<Result<Bytes, TransportError>> =
                round.into_iter().map(|c| Ok(Bytes::from(c))).collect();
            Ok(Box::pin(futures::stream::iter(items)))
        }

        async fn get(
            &self,
            _path: &str,
            _headers: &HashMap<String, String>,
        ) -> Result<Bytes, TransportError> {
            Ok(Bytes::new())
        }

        fn set_verify_tls(&self, _verify: bool) {}
        fn set_connect_timeout(&self, _timeout: std::time::Duration) {}
        fn set_read_timeout(&self, _timeout: std::time::Duration) {}
        fn set_write_timeout(&self, _timeout: std::time::Duration) {}
        fn set_headers(&self, _headers: HashMap<String, String>) {}
        fn interrupt(&self) {}
    }

    fn engine_with_rounds(rounds: Vec<Vec<Vec<u8>>>) -> ChatEngine {
        let endpoint = test_endpoint();
        ChatEngine {
            history: History::new(50),
            keep_alive: "5m".to_string(),
            stream: true,
            adapter: adapter_for(endpoint.kind),
            endpoint,
            transport: Arc::new(MultiRoundTransport { rounds: std::sync::Mutex::new(rounds.into()) }),
            tools: AsyncRwLock::new(FunctionTable::new()),
            pricing: RwLock::new(None),
            last_cost: RwLock::new(0.0),
            total_cost: RwLock::new(0.0),
            tool_confirmation: RwLock::new(None),
            max_tool_rounds: DEFAULT_MAX_TOOL_ROUNDS,
            queue: Mutex::new(()),
        }
    }

    fn engine_with_script(chunks: Vec<Vec<u8>>) -> ChatEngine {
        let endpoint = test_endpoint();
        ChatEngine {
            history: History::new(50),
            keep_alive: "5m".to_string(),
            stream: true,
            adapter: adapter_for(endpoint.kind),
            endpoint,
            transport: Arc::new(ScriptedTransport { chunks }),
            tools: AsyncRwLock::new(FunctionTable::new()),
            pricing: RwLock::new(None),
            last_cost: RwLock::new(0.0),
            total_cost: RwLock::new(0.0),
            tool_confirmation: RwLock::new(None),
            max_tool_rounds: DEFAULT_MAX_TOOL_ROUNDS,
            queue: Mutex::new(()),
        }
    }

    #[tokio::test]
    async fn echo_turn_emits_text_then_done() {
        let line = br#"{"message":{"content":"hi there"},"done":true,"prompt_eval_count":3,"eval_count":2}
"#;
        let engine = engine_with_script(vec![line.to_vec()]);

        let mut seen_text = String::new();
        let mut saw_done = false;
        let usage = engine
            .chat(
                "hello",
                |reason, chunk| {
                    match (reason, chunk) {
                        (Reason::Partial, ResponseChunk::Text { delta }) => seen_text.push_str(delta),
                        (Reason::Done, _) => saw_done = true,
                        _ => {}
                    }
                    true
                },
                ChatOptions::default(),
            )
            .await
            .unwrap();

        assert_eq!(seen_text, "hi there");
        assert!(saw_done);
        assert_eq!(usage.output_tokens, 2);
        assert_eq!(engine.history().get().len(), 2);
    }

    #[tokio::test]
    async fn cancelling_mid_stream_returns_cancelled_error() {
        let line1 = br#"{"message":{"content":"partial "},"done":false}
"#;
        let line2 = br#"{"message":{"content":"more"},"done":true,"prompt_eval_count":1,"eval_count":1}
"#;
        let engine = engine_with_script(vec![line1.to_vec(), line2.to_vec()]);

        let result = engine
            .chat("hello", |_reason, _chunk| false, ChatOptions::default())
            .await;

        assert!(matches!(result, Err(EngineError::Cancelled)));
        // C1: no chunks past the cancelling one are delivered, and the
        // partial response accumulated so far is retained in history
        // (spec.md §8 scenario 5).
        let history = engine.history().get();
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].content.as_text(), "partial ");
    }

    #[tokio::test]
    async fn declined_tool_call_is_not_executed_and_history_records_decline() {
        let call_line = br#"{"message":{"content":"","tool_calls":[{"function":{"name":"bash","arguments":{"command":"ls"}}}]},"done":true,"prompt_eval_count":1,"eval_count":1}
"#;
        let done_line = br#"{"message":{"content":"ok"},"done":true,"prompt_eval_count":1,"eval_count":1}
"#;
        let engine = engine_with_rounds(vec![vec![call_line.to_vec()], vec![done_line.to_vec()]]);
        engine.tools().write().await.add(Arc::new(crate::tools::BashTool::new()));
        engine.set_tool_confirmation(|_name| false);

        engine
            .chat("run ls", |_, _| true, ChatOptions::default())
            .await
            .unwrap();

        let history = engine.history().get();
        let tool_msg = history
            .iter()
            .find(|m| m.role == crate::message::Role::Tool)
            .expect("a tool-result message");
        assert!(tool_msg.content.as_text().contains("Permission to run tool bash is declined"));
    }

    #[tokio::test]
    async fn total_cost_accumulates_across_requests() {
        let line = br#"{"message":{"content":"hi"},"done":true,"prompt_eval_count":10,"eval_count":5}
"#;
        let engine = engine_with_script(vec![line.to_vec()]);
        engine.set_pricing(Pricing {
            input_rate: 1.0,
            cache_create_rate: 0.0,
            cache_read_rate: 0.0,
            output_rate: 1.0,
        });

        engine.chat("one", |_, _| true, ChatOptions::default()).await.unwrap();
        let after_first = engine.total_cost();
        assert!(after_first > 0.0);
        assert_eq!(engine.last_request_cost(), after_first);

        engine.chat("two", |_, _| true, ChatOptions::default()).await.unwrap();
        assert_eq!(engine.total_cost(), after_first * 2.0);
    }

    #[tokio::test]
    async fn anthropic_message_stop_does_not_erase_message_delta_usage() {
        // Real Anthropic streams emit usage on `message_delta` and then a
        // data-less `message_stop`; the engine must keep the earlier usage
        // rather than let the later, emptier `Done` chunk blank it out.
        let stream = concat!(
            "event: content_block_start\n",
            "data: {\"type\":\"content_block_start\",\"index\":0,\"content_block\":{\"type\":\"text\",\"text\":\"\"}}\n\n",
            "event: content_block_delta\n",
            "data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"hi\"}}\n\n",
            "event: content_block_stop\n",
            "data: {\"type\":\"content_block_stop\",\"index\":0}\n\n",
            "event: message_delta\n",
            "data: {\"type\":\"message_delta\",\"delta\":{\"stop_reason\":\"end_turn\"},\"usage\":{\"output_tokens\":7}}\n\n",
            "event: message_stop\n",
            "data: {}\n\n",
        );

        let mut endpoint = test_endpoint();
        endpoint.kind = EndpointKind::Anthropic;
        let engine = ChatEngine {
            history: History::new(50),
            keep_alive: "5m".to_string(),
            stream: true,
            adapter: adapter_for(endpoint.kind),
            endpoint,
            transport: Arc::new(ScriptedTransport { chunks: vec![stream.as_bytes().to_vec()] }),
            tools: AsyncRwLock::new(FunctionTable::new()),
            pricing: RwLock::new(None),
            last_cost: RwLock::new(0.0),
            total_cost: RwLock::new(0.0),
            tool_confirmation: RwLock::new(None),
            max_tool_rounds: DEFAULT_MAX_TOOL_ROUNDS,
            queue: Mutex::new(()),
        };

        let usage = engine
            .chat("hello", |_, _| true, ChatOptions::default())
            .await
            .unwrap();

        assert_eq!(usage.output_tokens, 7);
    }

    #[tokio::test]
    async fn no_history_option_does_not_touch_history() {
        let line = br#"{"message":{"content":"ok"},"done":true,"prompt_eval_count":1,"eval_count":1}
"#;
        let engine = engine_with_script(vec![line.to_vec()]);
        let options = ChatOptions {
            no_tools: false,
            no_history: true,
        };
        engine.chat("hello", |_, _| true, options).await.unwrap();
        assert!(engine.history().is_empty());
    }
}
