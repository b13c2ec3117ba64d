//! Anthropic SSE event state machine (spec.md §4.6).
//!
//! Ported from `original_source/assistant/claude_response_parser.cpp`'s
//! `ParserState` switch (`initial` / `collect_text` / `collect_thinking` /
//! `collect_tool_use_json`), generalized from a callback-per-event interface
//! into an explicit `feed` method so the state machine is testable without a
//! live connection (property P2). The teacher's own event matching in
//! `anthropic.rs` (`message_start`, `content_block_start`, ...) names the
//! event/delta JSON shapes this module deserializes.
//!
//! Framing (splitting a raw byte stream into `event:`/`data:` pairs) is left
//! to `eventsource_stream::Eventsource`, applied over the transport's byte
//! stream the same way the teacher's `chat_loop` does; this module only
//! consumes the already-framed `eventsource_stream::Event`.

use crate::message::{ResponseChunk, Usage};
use eventsource_stream::Event;
use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParserState {
    Initial,
    CollectText,
    CollectThinking,
    CollectToolUse,
}

#[derive(Debug, Default)]
struct PendingToolUse {
    id: String,
    name: String,
    json: String,
}

/// The Anthropic content-block/event state machine (spec.md §4.6).
///
/// Transport-agnostic: `feed` takes one already-framed SSE event and returns
/// zero or more typed chunks. A malformed event at a state that doesn't
/// expect it resets to `Initial` and yields an error chunk rather than
/// panicking, since a live stream should never take the engine down.
pub struct AnthropicSseParser {
    state: ParserState,
    tool_use: Option<PendingToolUse>,
}

impl AnthropicSseParser {
    pub fn new() -> Self {
        Self {
            state: ParserState::Initial,
            tool_use: None,
        }
    }

    fn reset(&mut self) {
        self.state = ParserState::Initial;
        self.tool_use = None;
    }

    /// Feed one SSE event, returning the chunks it produces.
    pub fn feed(&mut self, event: &Event) -> Vec<ResponseChunk> {
        match event.event.as_str() {
            "message_stop" => {
                self.tool_use = None;
                let chunk = ResponseChunk::Done {
                    stop_reason: parse_stop_reason(&event.data),
                    usage: parse_message_delta_usage(&event.data),
                };
                self.reset();
                vec![chunk]
            }
            "error" => {
                let (kind, message) = parse_error(&event.data);
                self.reset();
                vec![ResponseChunk::Error { kind, message }]
            }
            "ping" | "message_start" if self.state == ParserState::Initial => vec![],
            _ => self.feed_in_state(event),
        }
    }

    fn feed_in_state(&mut self, event: &Event) -> Vec<ResponseChunk> {
        match self.state {
            ParserState::Initial => self.feed_initial(event),
            ParserState::CollectText => self.feed_collect_text(event),
            ParserState::CollectThinking => self.feed_collect_thinking(event),
            ParserState::CollectToolUse => self.feed_collect_tool_use(event),
        }
    }

    fn feed_initial(&mut self, event: &Event) -> Vec<ResponseChunk> {
        match event.event.as_str() {
            "message_delta" => parse_message_delta_usage(&event.data)
                .map(|usage| {
                    vec![ResponseChunk::Done {
                        stop_reason: parse_stop_reason(&event.data),
                        usage: Some(usage),
                    }]
                })
                .unwrap_or_default(),
            "content_block_start" => {
                let Ok(start) = serde_json::from_str::<ContentBlockStart>(&event.data) else {
                    return vec![];
                };
                match start.content_block {
                    ContentBlockStartShape::Text { .. } => {
                        self.state = ParserState::CollectText;
                        vec![]
                    }
                    ContentBlockStartShape::Thinking { .. } => {
                        self.state = ParserState::CollectThinking;
                        vec![]
                    }
                    ContentBlockStartShape::ToolUse { id, name, .. } => {
                        self.tool_use = Some(PendingToolUse {
                            id,
                            name,
                            json: String::new(),
                        });
                        self.state = ParserState::CollectToolUse;
                        vec![]
                    }
                }
            }
            "ping" | "message_start" => vec![],
            other => {
                self.reset();
                vec![ResponseChunk::Error {
                    kind: "malformed_stream".to_string(),
                    message: format!("unexpected event '{other}' in initial state"),
                }]
            }
        }
    }

    fn feed_collect_text(&mut self, event: &Event) -> Vec<ResponseChunk> {
        match event.event.as_str() {
            "content_block_delta" => text_delta(&event.data)
                .map(|delta| vec![ResponseChunk::Text { delta }])
                .unwrap_or_default(),
            "content_block_stop" => {
                self.state = ParserState::Initial;
                vec![]
            }
            _ => vec![],
        }
    }

    fn feed_collect_thinking(&mut self, event: &Event) -> Vec<ResponseChunk> {
        match event.event.as_str() {
            "content_block_delta" => thinking_delta(&event.data)
                .map(|delta| vec![ResponseChunk::Thinking { delta }])
                .unwrap_or_default(),
            "content_block_stop" => {
                self.state = ParserState::Initial;
                vec![]
            }
            _ => vec![],
        }
    }

    fn feed_collect_tool_use(&mut self, event: &Event) -> Vec<ResponseChunk> {
        match event.event.as_str() {
            "content_block_delta" => {
                if let Some(partial) = input_json_delta(&event.data) {
                    if let Some(pending) = &mut self.tool_use {
                        pending.json.push_str(&partial);
                    }
                }
                vec![]
            }
            "content_block_stop" => {
                self.state = ParserState::Initial;
                let Some(pending) = self.tool_use.take() else {
                    return vec![];
                };
                let arguments = if pending.json.trim().is_empty() {
                    serde_json::json!({})
                } else {
                    serde_json::from_str(&pending.json).unwrap_or(serde_json::json!({}))
                };
                vec![ResponseChunk::ToolCall {
                    name: pending.name,
                    id: Some(pending.id),
                    arguments,
                }]
            }
            _ => vec![],
        }
    }
}

impl Default for AnthropicSseParser {
    fn default() -> Self {
        Self::new()
    }
}

// ===================== event payload shapes =====================

#[derive(Debug, Deserialize)]
struct ContentBlockStart {
    content_block: ContentBlockStartShape,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ContentBlockStartShape {
    #[serde(rename = "text")]
    Text {
        #[serde(default)]
        #[allow(dead_code)]
        text: String,
    },
    #[serde(rename = "thinking")]
    Thinking {
        #[serde(default)]
        #[allow(dead_code)]
        thinking: String,
    },
    #[serde(rename = "tool_use")]
    ToolUse {
        id: String,
        name: String,
        #[serde(default)]
        #[allow(dead_code)]
        input: serde_json::Value,
    },
}

#[derive(Debug, Deserialize)]
struct ContentBlockDelta {
    delta: Delta,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum Delta {
    #[serde(rename = "text_delta")]
    TextDelta { text: String },
    #[serde(rename = "thinking_delta")]
    ThinkingDelta { thinking: String },
    #[serde(rename = "input_json_delta")]
    InputJsonDelta { partial_json: String },
    // `signature_delta` contributes nothing (spec.md §4.6).
    #[serde(other)]
    Other,
}

fn text_delta(data: &str) -> Option<String> {
    match serde_json::from_str::<ContentBlockDelta>(data).ok()?.delta {
        Delta::TextDelta { text } => Some(text),
        _ => None,
    }
}

fn thinking_delta(data: &str) -> Option<String> {
    match serde_json::from_str::<ContentBlockDelta>(data).ok()?.delta {
        Delta::ThinkingDelta { thinking } => Some(thinking),
        _ => None,
    }
}

fn input_json_delta(data: &str) -> Option<String> {
    match serde_json::from_str::<ContentBlockDelta>(data).ok()?.delta {
        Delta::InputJsonDelta { partial_json } => Some(partial_json),
        _ => None,
    }
}

#[derive(Debug, Deserialize)]
struct MessageDelta {
    delta: MessageDeltaInner,
    #[serde(default)]
    usage: Option<UsageDelta>,
}

#[derive(Debug, Deserialize)]
struct MessageDeltaInner {
    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UsageDelta {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
    #[serde(default)]
    cache_creation_input_tokens: u64,
    #[serde(default)]
    cache_read_input_tokens: u64,
}

fn parse_stop_reason(data: &str) -> Option<String> {
    serde_json::from_str::<MessageDelta>(data)
        .ok()
        .and_then(|d| d.delta.stop_reason)
}

fn parse_message_delta_usage(data: &str) -> Option<Usage> {
    let delta = serde_json::from_str::<MessageDelta>(data).ok()?;
    let usage = delta.usage?;
    Some(Usage {
        input_tokens: usage.input_tokens,
        cache_create_tokens: usage.cache_creation_input_tokens,
        cache_read_tokens: usage.cache_read_input_tokens,
        output_tokens: usage.output_tokens,
    })
}

#[derive(Debug, Deserialize)]
struct ErrorPayload {
    error: ErrorInner,
}

#[derive(Debug, Deserialize)]
struct ErrorInner {
    #[serde(rename = "type")]
    kind: String,
    message: String,
}

fn parse_error(data: &str) -> (String, String) {
    match serde_json::from_str::<ErrorPayload>(data) {
        Ok(payload) => (payload.error.kind, payload.error.message),
        Err(_) => ("unknown_error".to_string(), data.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ev(name: &str, data: &str) -> Event {
        Event {
            event: name.to_string(),
            data: data.to_string(),
            id: String::new(),
            retry: None,
        }
    }

    #[test]
    fn p1_text_stream_concatenates_to_full_message() {
        let mut parser = AnthropicSseParser::new();
        let mut out = Vec::new();
        out.extend(parser.feed(&ev("message_start", r#"{"message":{"usage":{"input_tokens":1,"output_tokens":0}}}"#)));
        out.extend(parser.feed(&ev(
            "content_block_start",
            r#"{"index":0,"content_block":{"type":"text","text":""}}"#,
        )));
        out.extend(parser.feed(&ev(
            "content_block_delta",
            r#"{"index":0,"delta":{"type":"text_delta","text":"San "}}"#,
        )));
        out.extend(parser.feed(&ev(
            "content_block_delta",
            r#"{"index":0,"delta":{"type":"text_delta","text":"Francisco"}}"#,
        )));
        out.extend(parser.feed(&ev("content_block_stop", r#"{"index":0}"#)));
        out.extend(parser.feed(&ev(
            "message_delta",
            r#"{"delta":{"stop_reason":"end_turn"},"usage":{"output_tokens":5}}"#,
        )));
        out.extend(parser.feed(&ev("message_stop", "{}")));

        let text: String = out
            .iter()
            .filter_map(|c| match c {
                ResponseChunk::Text { delta } => Some(delta.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(text, "San Francisco");
        assert!(matches!(out.last(), Some(ResponseChunk::Done { .. })));
    }

    #[test]
    fn p1_tool_use_yields_exactly_one_tool_call_chunk() {
        let mut parser = AnthropicSseParser::new();
        let mut out = Vec::new();
        out.extend(parser.feed(&ev(
            "content_block_start",
            r#"{"index":0,"content_block":{"type":"tool_use","id":"tu_1","name":"add","input":{}}}"#,
        )));
        out.extend(parser.feed(&ev(
            "content_block_delta",
            r#"{"index":0,"delta":{"type":"input_json_delta","partial_json":"{\"a\":1,"}}"#,
        )));
        out.extend(parser.feed(&ev(
            "content_block_delta",
            r#"{"index":0,"delta":{"type":"input_json_delta","partial_json":"\"b\":2}"}}"#,
        )));
        out.extend(parser.feed(&ev("content_block_stop", r#"{"index":0}"#)));
        out.extend(parser.feed(&ev(
            "message_delta",
            r#"{"delta":{"stop_reason":"tool_use"},"usage":{"output_tokens":10}}"#,
        )));
        out.extend(parser.feed(&ev("message_stop", "{}")));

        let tool_calls: Vec<_> = out
            .iter()
            .filter(|c| matches!(c, ResponseChunk::ToolCall { .. }))
            .collect();
        assert_eq!(tool_calls.len(), 1);
        match &tool_calls[0] {
            ResponseChunk::ToolCall { name, id, arguments } => {
                assert_eq!(name, "add");
                assert_eq!(id.as_deref(), Some("tu_1"));
                assert_eq!(arguments, &serde_json::json!({"a": 1, "b": 2}));
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn error_event_resets_and_emits_error_chunk() {
        let mut parser = AnthropicSseParser::new();
        parser.feed(&ev(
            "content_block_start",
            r#"{"index":0,"content_block":{"type":"text","text":""}}"#,
        ));
        let out = parser.feed(&ev(
            "error",
            r#"{"error":{"type":"overloaded_error","message":"overloaded"}}"#,
        ));
        assert_eq!(out.len(), 1);
        match &out[0] {
            ResponseChunk::Error { kind, message } => {
                assert_eq!(kind, "overloaded_error");
                assert_eq!(message, "overloaded");
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn thinking_block_emits_thinking_chunks() {
        let mut parser = AnthropicSseParser::new();
        parser.feed(&ev(
            "content_block_start",
            r#"{"index":0,"content_block":{"type":"thinking","thinking":""}}"#,
        ));
        let out = parser.feed(&ev(
            "content_block_delta",
            r#"{"index":0,"delta":{"type":"thinking_delta","thinking":"pondering"}}"#,
        ));
        assert_eq!(out, vec![ResponseChunk::Thinking { delta: "pondering".to_string() }]);
    }
}
