//! Configuration types (spec.md §6).
//!
//! Deserialized with `serde_json::from_str` following the teacher's
//! `serde(default)`-heavy idiom. The environment-variable expansion step
//! described in spec.md §6 is an external collaborator and out of scope
//! here — `Config::from_json` accepts already-expanded JSON.

use crate::error::ConfigError;
use crate::mcp::SshLogin;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

fn default_history_size() -> usize {
    50
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_keep_alive() -> String {
    "5m".to_string()
}

fn default_stream() -> bool {
    true
}

fn default_true() -> bool {
    true
}

/// Endpoint kind, selecting the provider adapter and wire dialect.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EndpointKind {
    Ollama,
    Openai,
    Anthropic,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointConfig {
    pub url: String,
    #[serde(rename = "type")]
    pub kind: EndpointKind,
    pub model: String,
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub context_size: Option<u32>,
    #[serde(default = "default_true")]
    pub verify_server_ssl: bool,
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SshConfig {
    pub ssh_program: Option<String>,
    pub key: Option<String>,
    pub user: Option<String>,
    pub hostname: String,
    #[serde(default = "default_ssh_port")]
    pub port: u16,
}

fn default_ssh_port() -> u16 {
    22
}

impl From<SshConfig> for SshLogin {
    fn from(cfg: SshConfig) -> Self {
        let mut login = SshLogin {
            hostname: cfg.hostname,
            port: cfg.port,
            ..SshLogin::default()
        };
        if let Some(prog) = cfg.ssh_program {
            login.ssh_program = prog;
        }
        if let Some(key) = cfg.key {
            login.ssh_key = key;
        }
        if let Some(user) = cfg.user {
            login.user = user;
        }
        login
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum McpServerKind {
    Stdio,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpServerConfig {
    pub command: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(rename = "type")]
    pub kind: McpServerKind,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub ssh: Option<SshConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ServerTimeout {
    #[serde(default)]
    pub connect_ms: Option<u64>,
    #[serde(default)]
    pub read_ms: Option<u64>,
    #[serde(default)]
    pub write_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub endpoints: Vec<EndpointConfig>,
    #[serde(default)]
    pub servers: HashMap<String, McpServerConfig>,
    #[serde(default = "default_history_size")]
    pub history_size: usize,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_keep_alive")]
    pub keep_alive: String,
    #[serde(default = "default_stream")]
    pub stream: bool,
    #[serde(default)]
    pub server_timeout: ServerTimeout,
}

impl Config {
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_json::from_str(text)?;
        if config.endpoints.is_empty() {
            return Err(ConfigError::NoEndpoints);
        }
        Ok(config)
    }

    /// The active endpoint: the one marked `active=true`, or the first
    /// entry if none is (spec.md §6).
    pub fn active_endpoint(&self) -> Option<&EndpointConfig> {
        self.endpoints
            .iter()
            .find(|e| e.active)
            .or_else(|| self.endpoints.first())
    }
}
