//! Wire-agnostic data model shared by every provider adapter.
//!
//! These types mirror the teacher's `llm::provider` module (`Message`,
//! `Role`, `ToolCall`, `ToolResult`, `TokenUsage`) but generalize `content`
//! to the structured-block shape the Anthropic dialect needs alongside the
//! plain-string shape Ollama/OpenAI use.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Message role in a conversation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// A single content block inside a structured message (Anthropic dialect).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    Image {
        media_type: String,
        data: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
        #[serde(default)]
        is_error: bool,
    },
}

/// Message content: either a plain string (Ollama/OpenAI) or a list of
/// structured blocks (Anthropic).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Content {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

impl Content {
    /// Flatten to plain text, concatenating any `Text` blocks.
    pub fn as_text(&self) -> String {
        match self {
            Content::Text(s) => s.clone(),
            Content::Blocks(blocks) => blocks
                .iter()
                .filter_map(|b| match b {
                    ContentBlock::Text { text } => Some(text.as_str()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join(""),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Content::Text(s) => s.is_empty(),
            Content::Blocks(b) => b.is_empty(),
        }
    }
}

impl From<String> for Content {
    fn from(s: String) -> Self {
        Content::Text(s)
    }
}

impl From<&str> for Content {
    fn from(s: &str) -> Self {
        Content::Text(s.to_string())
    }
}

/// A tool call requested by the model (Ollama/OpenAI dialect uses the
/// `tool_calls` side-field; Anthropic carries the equivalent as a
/// `tool_use` content block).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    /// Present for Anthropic (pairs the eventual `tool_result` block).
    /// Absent for Ollama/OpenAI in the current wire dialect.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    pub arguments: serde_json::Value,
}

/// The result of invoking a tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub is_error: bool,
    pub text: String,
}

/// A message in the conversation history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub role: Role,
    pub content: Content,
    /// Parallel to `content` blocks: Ollama/OpenAI carry pending tool calls
    /// in this side-field rather than as structured content.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub tool_calls: Option<Vec<ToolCall>>,
    /// Set on `role = tool` messages in the Ollama/OpenAI dialect to pair
    /// the result with its originating call.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub tool_call_id: Option<String>,
}

impl Message {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: Content::Text(text.into()),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: Content::Text(text.into()),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: Content::Text(text.into()),
            tool_calls: None,
            tool_call_id: None,
        }
    }
}

/// Named parameter inside a tool's JSON-schema-shaped parameter list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolParameter {
    #[serde(rename = "type")]
    pub param_type: String,
    pub description: String,
    #[serde(default)]
    pub required: bool,
}

/// A tool's descriptor, provider-agnostic; each adapter renders this into
/// its own schema shape (spec.md §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub parameters: HashMap<String, ToolParameter>,
}

impl ToolDescriptor {
    fn required_names(&self) -> Vec<&str> {
        self.parameters
            .iter()
            .filter(|(_, p)| p.required)
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// Render as the `ollama`/`openai` function-calling schema.
    pub fn to_openai_json(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": {
                    "type": "object",
                    "properties": self.properties_json(),
                    "required": self.required_names(),
                }
            }
        })
    }

    /// Render as the Anthropic `input_schema` shape.
    pub fn to_anthropic_json(&self) -> serde_json::Value {
        serde_json::json!({
            "name": self.name,
            "description": self.description,
            "input_schema": {
                "type": "object",
                "properties": self.properties_json(),
                "required": self.required_names(),
            }
        })
    }

    fn properties_json(&self) -> serde_json::Value {
        let mut props = serde_json::Map::new();
        for (name, param) in &self.parameters {
            props.insert(
                name.clone(),
                serde_json::json!({
                    "type": param.param_type,
                    "description": param.description,
                }),
            );
        }
        serde_json::Value::Object(props)
    }
}

/// Per-request token accounting.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Usage {
    pub input_tokens: u64,
    pub cache_create_tokens: u64,
    pub cache_read_tokens: u64,
    pub output_tokens: u64,
}

impl Usage {
    pub fn add(&mut self, other: &Usage) {
        self.input_tokens += other.input_tokens;
        self.cache_create_tokens += other.cache_create_tokens;
        self.cache_read_tokens += other.cache_read_tokens;
        self.output_tokens += other.output_tokens;
    }
}

/// Per-model cost rates, in currency units per token.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Pricing {
    pub input_rate: f64,
    pub cache_create_rate: f64,
    pub cache_read_rate: f64,
    pub output_rate: f64,
}

impl Pricing {
    pub fn cost(&self, usage: &Usage) -> f64 {
        usage.input_tokens as f64 * self.input_rate
            + usage.cache_create_tokens as f64 * self.cache_create_rate
            + usage.cache_read_tokens as f64 * self.cache_read_rate
            + usage.output_tokens as f64 * self.output_rate
    }
}

/// Prompt-cache annotation hint sent to the provider (spec.md §3).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum CachePolicy {
    #[default]
    None,
    Auto,
    Static,
}

/// Reason a chunk is being reported to the caller's callback (spec.md §4.8).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reason {
    Done,
    Partial,
    FatalError,
    LogNotice,
    LogDebug,
    Cancelled,
    RequestCost,
}

/// A single decoded increment of a streaming response (spec.md §3).
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseChunk {
    Text {
        delta: String,
    },
    Thinking {
        delta: String,
    },
    ToolCall {
        name: String,
        id: Option<String>,
        arguments: serde_json::Value,
    },
    Done {
        stop_reason: Option<String>,
        usage: Option<Usage>,
    },
    Error {
        kind: String,
        message: String,
    },
}

/// Options accepted by `ChatEngine::chat`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChatOptions {
    pub no_tools: bool,
    pub no_history: bool,
}
