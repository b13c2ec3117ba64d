//! End-to-end scenarios driving `ChatEngine` against scripted transports,
//! one per provider dialect, exercising the chunk-dispatch, tool-call
//! round-trip, cancellation, and temp-history paths together rather than in
//! isolation.

use bytes::Bytes;
use chatcore::config::{Config, EndpointConfig, EndpointKind};
use chatcore::message::{ChatOptions, Reason, ResponseChunk, Role};
use chatcore::tools::FunctionTable;
use chatcore::transport::HttpTransport;
use chatcore::{ChatEngine, EngineError};
use futures::stream::BoxStream;
use std::collections::HashMap;
use std::sync::Arc;

/// Replays a fixed sequence of byte chunks regardless of the request that
/// was actually built, enough to drive the engine end-to-end without a
/// live server.
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
    ) -> Result<BoxStream<'static, Result<Bytes, chatcore::error::TransportError>>, chatcore::error::TransportError>
    {
        let items: Vec<Result<Bytes, chatcore::error::TransportError>> = self
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
    ) -> Result<Bytes, chatcore::error::TransportError> {
        Ok(Bytes::new())
    }

    fn set_verify_tls(&self, _verify: bool) {}
    fn set_connect_timeout(&self, _timeout: std::time::Duration) {}
    fn set_read_timeout(&self, _timeout: std::time::Duration) {}
    fn set_write_timeout(&self, _timeout: std::time::Duration) {}
    fn set_headers(&self, _headers: HashMap<String, String>) {}
    fn interrupt(&self) {}
}

fn config_for(kind: EndpointKind, url: &str) -> Config {
    Config {
        endpoints: vec![EndpointConfig {
            url: url.to_string(),
            kind,
            model: "test-model".to_string(),
            active: true,
            max_tokens: None,
            context_size: None,
            verify_server_ssl: true,
            headers: HashMap::new(),
        }],
        servers: HashMap::new(),
        history_size: 50,
        log_level: "info".to_string(),
        keep_alive: "5m".to_string(),
        stream: true,
        server_timeout: Default::default(),
    }
}

fn engine(kind: EndpointKind, chunks: Vec<Vec<u8>>) -> ChatEngine {
    let config = config_for(kind, "http://localhost");
    let transport = Arc::new(ScriptedTransport { chunks });
    ChatEngine::with_transport(&config, FunctionTable::new(), transport).unwrap()
}

/// Scenario 1 (spec.md §8): a plain echo turn with no tools produces one
/// text chunk followed by `Done`, and the exchange lands in history.
#[tokio::test]
async fn echo_turn_with_no_tools() {
    let line = br#"{"message":{"content":"hello there"},"done":true,"prompt_eval_count":4,"eval_count":2}
"#;
    let eng = engine(EndpointKind::Ollama, vec![line.to_vec()]);

    let mut text = String::new();
    let mut done = false;
    eng.chat(
        "hi",
        |reason, chunk| {
            match (reason, chunk) {
                (Reason::Partial, ResponseChunk::Text { delta }) => text.push_str(delta),
                (Reason::Done, _) => done = true,
                _ => {}
            }
            true
        },
        ChatOptions::default(),
    )
    .await
    .unwrap();

    assert_eq!(text, "hello there");
    assert!(done);
    let history = eng.get_history();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].role, Role::User);
    assert_eq!(history[1].role, Role::Assistant);
}

/// Scenario 2: a thinking-tagged stream reports `<think>`/text/`</think>`
/// as `Reason::Partial` thinking chunks, separate from ordinary text.
#[tokio::test]
async fn thinking_model_stream_separates_thinking_from_text() {
    let line = br#"{"message":{"content":"<think>carry the one</think>4"},"done":true,"prompt_eval_count":1,"eval_count":1}
"#;
    let eng = engine(EndpointKind::Ollama, vec![line.to_vec()]);

    let mut thinking = String::new();
    let mut text = String::new();
    eng.chat(
        "2+2?",
        |reason, chunk| {
            if reason == Reason::Partial {
                match chunk {
                    ResponseChunk::Thinking { delta } => thinking.push_str(delta),
                    ResponseChunk::Text { delta } => text.push_str(delta),
                    _ => {}
                }
            }
            true
        },
        ChatOptions::default(),
    )
    .await
    .unwrap();

    assert_eq!(thinking, "<think>carry the one</think>");
    assert_eq!(text, "4");
}

/// Scenario 3: an Anthropic tool call round-trips through the function
/// table and the follow-up request's tool-result message is recorded in
/// history with the teacher-grounded human-readable wrapper text.
#[tokio::test]
async fn anthropic_tool_call_round_trips_and_records_result() {
    let tool_call_events = concat!(
        "event: content_block_start\n",
        "data: {\"type\":\"content_block_start\",\"index\":0,\"content_block\":{\"type\":\"tool_use\",\"id\":\"tu_1\",\"name\":\"bash\"}}\n\n",
        "event: content_block_delta\n",
        "data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"input_json_delta\",\"partial_json\":\"{\\\"command\\\":\\\"echo hi\\\"}\"}}\n\n",
        "event: content_block_stop\n",
        "data: {\"type\":\"content_block_stop\",\"index\":0}\n\n",
        "event: message_delta\n",
        "data: {\"type\":\"message_delta\",\"delta\":{\"stop_reason\":\"tool_use\"},\"usage\":{\"output_tokens\":3}}\n\n",
    );
    let follow_up = concat!(
        "event: content_block_start\n",
        "data: {\"type\":\"content_block_start\",\"index\":0,\"content_block\":{\"type\":\"text\",\"text\":\"\"}}\n\n",
        "event: content_block_delta\n",
        "data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"done\"}}\n\n",
        "event: content_block_stop\n",
        "data: {\"type\":\"content_block_stop\",\"index\":0}\n\n",
        "event: message_delta\n",
        "data: {\"type\":\"message_delta\",\"delta\":{\"stop_reason\":\"end_turn\"},\"usage\":{\"output_tokens\":1}}\n\n",
    );

    let config = config_for(EndpointKind::Anthropic, "http://localhost");
    let transport = Arc::new(MultiCallTransport {
        responses: std::sync::Mutex::new(vec![follow_up.as_bytes().to_vec(), tool_call_events.as_bytes().to_vec()]),
    });
    let mut tools = FunctionTable::new();
    tools.add(Arc::new(chatcore::tools::BashTool::new()));
    let eng = ChatEngine::with_transport(&config, tools, transport).unwrap();

    eng.chat("run echo hi", |_, _| true, ChatOptions::default())
        .await
        .unwrap();

    let history = eng.get_history();
    let tool_msg = history.iter().find(|m| m.role == Role::Tool).expect("tool result recorded");
    assert!(tool_msg.content.as_text().contains("Tool 'bash' completed successfully"));
}

/// Pops responses off the back of `responses` on each `post` call, so the
/// first scripted response corresponds to the *last* request sent.
struct MultiCallTransport {
    responses: std::sync::Mutex<Vec<Vec<u8>>>,
}

#[async_trait::async_trait]
impl HttpTransport for MultiCallTransport {
    async fn post(
        &self,
        _path: &str,
        _headers: &HashMap<String, String>,
        _body: Vec<u8>,
        _content_type: &str,
    ) -> Result<BoxStream<'static, Result<Bytes, chatcore::error::TransportError>>, chatcore::error::TransportError>
    {
        let bytes = self.responses.lock().unwrap().pop().unwrap_or_default();
        Ok(Box::pin(futures::stream::iter(vec![Ok(Bytes::from(bytes))])))
    }

    async fn get(
        &self,
        _path: &str,
        _headers: &HashMap<String, String>,
    ) -> Result<Bytes, chatcore::error::TransportError> {
        Ok(Bytes::new())
    }

    fn set_verify_tls(&self, _verify: bool) {}
    fn set_connect_timeout(&self, _timeout: std::time::Duration) {}
    fn set_read_timeout(&self, _timeout: std::time::Duration) {}
    fn set_write_timeout(&self, _timeout: std::time::Duration) {}
    fn set_headers(&self, _headers: HashMap<String, String>) {}
    fn interrupt(&self) {}
}

/// Scenario 4: a non-2xx response from the server surfaces as a transport
/// error without touching history.
#[tokio::test]
async fn ollama_server_error_surfaces_as_transport_error() {
    struct FailingTransport;
    #[async_trait::async_trait]
    impl HttpTransport for FailingTransport {
        async fn post(
            &self,
            _path: &str,
            _headers: &HashMap<String, String>,
            _body: Vec<u8>,
            _content_type: &str,
        ) -> Result<BoxStream<'static, Result<Bytes, chatcore::error::TransportError>>, chatcore::error::TransportError>
        {
            Err(chatcore::error::TransportError::Status { status: 500, body: "boom".to_string() })
        }
        async fn get(
            &self,
            _path: &str,
            _headers: &HashMap<String, String>,
        ) -> Result<Bytes, chatcore::error::TransportError> {
            Ok(Bytes::new())
        }
        fn set_verify_tls(&self, _verify: bool) {}
        fn set_connect_timeout(&self, _timeout: std::time::Duration) {}
        fn set_read_timeout(&self, _timeout: std::time::Duration) {}
        fn set_write_timeout(&self, _timeout: std::time::Duration) {}
        fn set_headers(&self, _headers: HashMap<String, String>) {}
        fn interrupt(&self) {}
    }

    let config = config_for(EndpointKind::Ollama, "http://localhost");
    let eng = ChatEngine::with_transport(&config, FunctionTable::new(), Arc::new(FailingTransport)).unwrap();

    let result = eng.chat("hi", |_, _| true, ChatOptions::default()).await;
    assert!(matches!(result, Err(EngineError::Transport(_))));
    assert_eq!(eng.get_history().len(), 1, "only the user turn is recorded, no assistant reply");
}

/// Scenario 5: cancelling mid-stream stops delivery and persists the
/// partial response to history (C1).
#[tokio::test]
async fn mid_stream_cancellation_persists_partial_response() {
    let line1 = br#"{"message":{"content":"partial "},"done":false}
"#;
    let line2 = br#"{"message":{"content":"more"},"done":true,"prompt_eval_count":1,"eval_count":1}
"#;
    let eng = engine(EndpointKind::Ollama, vec![line1.to_vec(), line2.to_vec()]);

    let result = eng.chat("hi", |_, _| false, ChatOptions::default()).await;
    assert!(matches!(result, Err(EngineError::Cancelled)));

    let history = eng.get_history();
    assert_eq!(history.len(), 2);
    assert_eq!(history[1].content.as_text(), "partial ");
}

/// Scenario 6: work done inside a temp-history scope never reaches the
/// main conversation once the scope exits.
#[tokio::test]
async fn temp_history_scope_is_isolated_from_main_history() {
    let line = br#"{"message":{"content":"scratch answer"},"done":true,"prompt_eval_count":1,"eval_count":1}
"#;
    let eng = engine(EndpointKind::Ollama, vec![line.to_vec()]);

    eng.chat("main turn one", |_, _| true, ChatOptions::default()).await.unwrap();
    assert_eq!(eng.get_history().len(), 2);

    let eng2 = engine(EndpointKind::Ollama, vec![line.to_vec()]);
    eng2.history().enter_temp();
    eng2.chat("scratch turn", |_, _| true, ChatOptions::default()).await.unwrap();
    assert_eq!(eng2.get_history().len(), 2);
    eng2.history().exit_temp();
    assert_eq!(eng2.get_history().len(), 0);
}
