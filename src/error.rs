//! Crate-wide error types.
//!
//! Each error surface gets its own `thiserror`-derived enum, following the
//! teacher's `ProviderError` convention: descriptive `#[error("...")]`
//! messages, `#[from]` conversions at the boundary crates we actually use
//! (`reqwest`, `serde_json`), and no bare `Box<dyn Error>` escaping the
//! public API.

use thiserror::Error;

/// Errors surfaced by the chat engine itself.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("server reported error: {0}")]
    Server(String),

    #[error("request cancelled")]
    Cancelled,

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("mcp error: {0}")]
    Mcp(#[from] McpError),
}

/// Errors from the HTTP transport contract (§4.4).
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connect error: {0}")]
    Connect(String),

    #[error("read error: {0}")]
    Read(String),

    #[error("write error: {0}")]
    Write(String),

    #[error("tls error: {0}")]
    Tls(String),

    #[error("http {status}: {body}")]
    Status { status: u16, body: String },

    #[error("request interrupted")]
    Interrupted,

    #[error(transparent)]
    Reqwest(#[from] reqwest::Error),
}

/// Errors raised while talking to an MCP stdio server.
#[derive(Debug, Error)]
pub enum McpError {
    #[error("failed to spawn server process: {0}")]
    Spawn(String),

    #[error("server initialize failed: {0}")]
    Initialize(String),

    #[error("server did not respond to ping")]
    PingTimeout,

    #[error("server connection closed")]
    Closed,

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Errors raised while executing a tool through the function table.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("could not find tool")]
    NotFound,

    #[error("{0}")]
    ExecutionFailed(String),

    #[error("Permission to run tool {0} is declined")]
    Declined(String),
}

/// Errors raised while loading or applying configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("no endpoints configured")]
    NoEndpoints,

    #[error("unknown endpoint kind: {0}")]
    UnknownKind(String),
}
