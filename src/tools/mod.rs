//! Function table: the name → callable registry the chat engine consults
//! when the model requests a tool call.
//!
//! Generalizes the teacher's `llm::registry::ToolRegistry` (a flat
//! `HashMap<String, Arc<dyn ToolProvider>>` over in-process tools only) to
//! also own a list of MCP client handles, matching spec.md §4.2's function
//! table: "a name→callable map and a separate owned list of MCP client
//! handles whose lifetimes match the table's lifetime". `ToolProvider` and
//! `BoxFuture` are not present anywhere in the teacher's retrieved tree
//! (`tools::editor_edit` references both without either being declared) —
//! they're authored here in the shape their call sites imply.

pub mod bash;

pub use bash::BashTool;

use crate::error::ToolError;
use crate::mcp::McpClient;
use crate::message::ToolCall;
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::sync::Arc;

/// Wire dialect a tool catalog should be rendered in (spec.md §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Ollama,
    OpenAi,
    Anthropic,
}

/// An in-process tool the engine can invoke directly.
///
/// `execute` returns a boxed future rather than being an `async fn` so the
/// trait stays object-safe — `FunctionTable` stores providers behind
/// `Arc<dyn ToolProvider>`, same shape as the teacher's `ToolRegistry`.
pub trait ToolProvider: Send + Sync {
    fn name(&self) -> &str;

    /// One-line summary, used where a brief description suffices.
    fn description(&self) -> &str;

    /// The description sent in the tool catalog; may be longer and more
    /// detailed than `description()` (the teacher's `BashTool::as_tool`
    /// builds an OS-specific multi-line description for this purpose).
    fn full_description(&self) -> String {
        self.description().to_string()
    }

    /// JSON-schema `{type:"object", properties:{...}, required:[...]}`.
    fn parameters(&self) -> serde_json::Value;

    fn execute<'a>(&'a self, call: &'a ToolCall) -> BoxFuture<'a, Result<String, String>>;
}

/// All built-in tools shipped with the crate.
pub fn all_tools() -> Vec<Arc<dyn ToolProvider>> {
    vec![Arc::new(BashTool::new())]
}

struct McpToolProxy {
    client: Arc<McpClient>,
    name: String,
    description: String,
    parameters: serde_json::Value,
}

impl ToolProvider for McpToolProxy {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters(&self) -> serde_json::Value {
        self.parameters.clone()
    }

    fn execute<'a>(&'a self, call: &'a ToolCall) -> BoxFuture<'a, Result<String, String>> {
        let client = self.client.clone();
        let name = self.name.clone();
        let args = call.arguments.clone();
        Box::pin(async move { client.call(&name, args).await.map_err(|e| e.to_string()) })
    }
}

/// Name → callable registry aggregating in-process tools and MCP-backed
/// tools, plus the MCP client handles that back the latter.
pub struct FunctionTable {
    tools: HashMap<String, Arc<dyn ToolProvider>>,
    mcp_clients: Vec<Arc<McpClient>>,
    mcp_tool_names: std::collections::HashSet<String>,
}

impl FunctionTable {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
            mcp_clients: Vec::new(),
            mcp_tool_names: std::collections::HashSet::new(),
        }
    }

    /// Register a tool. Duplicate names are ignored (logged, not an error)
    /// per spec.md §4.2.
    pub fn add(&mut self, tool: Arc<dyn ToolProvider>) {
        let name = tool.name().to_string();
        if self.tools.contains_key(&name) {
            log::warn!("tool '{name}' is already registered, ignoring duplicate");
            return;
        }
        self.tools.insert(name, tool);
    }

    pub fn add_all_builtin(&mut self) {
        for tool in all_tools() {
            self.add(tool);
        }
    }

    /// Adopt an MCP client and register every tool it advertises.
    pub async fn add_mcp_server(&mut self, client: Arc<McpClient>) -> Result<(), ToolError> {
        let catalog = client
            .list_tools()
            .await
            .map_err(|e| ToolError::ExecutionFailed(e.to_string()))?;
        for tool_info in catalog {
            let proxy = McpToolProxy {
                client: client.clone(),
                name: tool_info.name.clone(),
                description: tool_info.description,
                parameters: tool_info.parameters,
            };
            self.mcp_tool_names.insert(tool_info.name);
            self.add(Arc::new(proxy));
        }
        self.mcp_clients.push(client);
        Ok(())
    }

    /// Remove every MCP-backed tool and handle, leaving in-process tools
    /// untouched. The caller re-populates from config afterward.
    pub fn clear_mcp_servers(&mut self) {
        for name in self.mcp_tool_names.drain() {
            self.tools.remove(&name);
        }
        self.mcp_clients.clear();
    }

    /// Remove all external tools and handles, then re-spawn and re-add from
    /// config; in-process tools are preserved (spec.md §4.2).
    pub async fn reload_mcp_servers(
        &mut self,
        servers: &HashMap<String, crate::config::McpServerConfig>,
    ) {
        self.clear_mcp_servers();
        for (name, server) in servers {
            if !server.enabled {
                continue;
            }
            let env = if server.env.is_empty() {
                None
            } else {
                Some(server.env.clone())
            };
            let spawned = match &server.ssh {
                Some(ssh) => {
                    McpClient::spawn_remote(server.command.clone(), ssh.clone().into(), env).await
                }
                None => McpClient::spawn(server.command.clone(), env).await,
            };
            match spawned {
                Ok(client) => {
                    if let Err(e) = self.add_mcp_server(Arc::new(client)).await {
                        log::warn!("failed to register tools from MCP server '{name}': {e}");
                    }
                }
                Err(e) => log::warn!("failed to start MCP server '{name}': {e}"),
            }
        }
    }

    pub fn has_tool(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn tool_names(&self) -> Vec<&str> {
        self.tools.keys().map(|s| s.as_str()).collect()
    }

    /// Look up and invoke a tool, wrapping failures into `{is_error, text}`
    /// rather than propagating them (spec.md §4.2, §7: tool errors never
    /// terminate the chat loop).
    pub async fn call(&self, call: &ToolCall) -> crate::message::ToolResult {
        let Some(provider) = self.tools.get(&call.name).cloned() else {
            return crate::message::ToolResult {
                is_error: true,
                text: "could not find tool".to_string(),
            };
        };
        match provider.execute(call).await {
            Ok(text) => crate::message::ToolResult {
                is_error: false,
                text,
            },
            Err(text) => crate::message::ToolResult {
                is_error: true,
                text,
            },
        }
    }

    /// Render the full tool catalog in the given provider dialect.
    pub fn to_json(&self, dialect: Dialect) -> serde_json::Value {
        let tools: Vec<serde_json::Value> = self
            .tools
            .values()
            .map(|provider| match dialect {
                Dialect::Ollama | Dialect::OpenAi => serde_json::json!({
                    "type": "function",
                    "function": {
                        "name": provider.name(),
                        "description": provider.full_description(),
                        "parameters": provider.parameters(),
                    }
                }),
                Dialect::Anthropic => serde_json::json!({
                    "name": provider.name(),
                    "description": provider.full_description(),
                    "input_schema": provider.parameters(),
                }),
            })
            .collect();
        serde_json::Value::Array(tools)
    }
}

impl Default for FunctionTable {
    fn default() -> Self {
        Self::new()
    }
}
