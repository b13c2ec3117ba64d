//! Multi-provider LLM chat client: conversation orchestration, provider
//! adapters (Ollama/OpenAI/Anthropic), stdio MCP tool integration, and the
//! dual-slot history model.
//!
//! Start at [`llm::ChatEngine`]: build a [`config::Config`] from JSON, a
//! [`tools::FunctionTable`] with whatever in-process and MCP-backed tools
//! the caller wants, and call [`llm::ChatEngine::chat`] per user turn.

pub mod config;
pub mod error;
pub mod history;
pub mod llm;
pub mod logger;
pub mod mcp;
pub mod message;
pub mod tools;
pub mod transport;

pub use config::Config;
pub use error::{ConfigError, EngineError, McpError, ToolError, TransportError};
pub use history::History;
pub use llm::{Capabilities, Capability, ChatEngine, ProviderAdapter};
pub use logger::log;
pub use message::{ChatOptions, Message, Pricing, Reason, ResponseChunk, Role, ToolCall, ToolResult, Usage};
pub use tools::{Dialect, FunctionTable, ToolProvider};
