//! MCP stdio client: talks to an external tool server over its standard
//! input/output, local or remote via a shell program such as `ssh`.
//!
//! Spawning and piped-stdio handling is grounded in the teacher's
//! `tools::bash::BashTool::execute_command` (`tokio::process::Command` with
//! piped stdio, separate reader tasks, timeout-wrapped wait), generalized
//! from a single blocking invocation into a long-lived child: a background
//! task owns the child's stdin writer and a line-framed stdout reader, and
//! pairs requests with responses over an internal channel, the same
//! background-task-plus-channel shape the teacher's `AnthropicProvider::
//! chat_loop` uses for its own bidirectional protocol. The argv-joining and
//! SSH-wrap command construction are ported from
//! `original_source/assistant/mcp.cpp::InitialiseStdio`.

use crate::error::McpError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicI64, Ordering};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::time::{timeout, Duration};

/// Remote-shell descriptor wrapping the server's argv in an `ssh` invocation
/// (`original_source/assistant/mcp_local_process.hpp::SSHLogin`).
#[derive(Debug, Clone)]
pub struct SshLogin {
    pub ssh_program: String,
    pub ssh_key: String,
    pub user: String,
    pub hostname: String,
    pub port: u16,
}

impl Default for SshLogin {
    fn default() -> Self {
        Self {
            ssh_program: "ssh".to_string(),
            ssh_key: String::new(),
            user: String::new(),
            hostname: "127.0.0.1".to_string(),
            port: 22,
        }
    }
}

/// A tool advertised by an MCP server.
#[derive(Debug, Clone)]
pub struct McpToolInfo {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

fn quote_if_needed(token: &str) -> String {
    if token.chars().any(char::is_whitespace) {
        format!("\"{}\"", token.replace('"', "\\\""))
    } else {
        token.to_string()
    }
}

/// Join argv into a single command string, wrapping in an SSH invocation
/// when a remote-shell descriptor is present (spec.md §4.3 step 1).
fn build_command_line(args: &[String], ssh: Option<&SshLogin>) -> String {
    let inner = args
        .iter()
        .map(|a| quote_if_needed(a))
        .collect::<Vec<_>>()
        .join(" ");

    let Some(ssh) = ssh else {
        return inner;
    };

    let mut ss = String::new();
    ss.push_str(&quote_if_needed(&ssh.ssh_program));
    if !ssh.ssh_key.is_empty() {
        ss.push_str(" -i ");
        ss.push_str(&quote_if_needed(&ssh.ssh_key));
    }
    if !ssh.user.is_empty() {
        ss.push_str(" -l ");
        ss.push_str(&quote_if_needed(&ssh.user));
    }
    ss.push_str(" -o ServerAliveInterval=30");
    ss.push_str(&format!(" -p {} {} ", ssh.port, ssh.hostname));

    let escaped_inner = inner.replace('"', "\\\"");
    ss.push('"');
    ss.push_str(&escaped_inner);
    ss.push('"');
    ss
}

#[derive(Serialize)]
struct JsonRpcRequest {
    jsonrpc: &'static str,
    id: i64,
    method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    params: Option<Value>,
}

#[derive(Deserialize)]
struct JsonRpcResponse {
    #[serde(default)]
    id: Option<i64>,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<JsonRpcError>,
}

#[derive(Deserialize)]
struct JsonRpcError {
    message: String,
}

enum Command_ {
    Request {
        method: String,
        params: Option<Value>,
        reply: oneshot::Sender<Result<Value, McpError>>,
    },
}

/// A long-lived connection to an MCP server over its stdio.
pub struct McpClient {
    tx: mpsc::Sender<Command_>,
    tools: Mutex<Vec<McpToolInfo>>,
    child: Mutex<Child>,
}

impl McpClient {
    /// Spawn a server from a bare argv.
    pub async fn spawn(args: Vec<String>, env: Option<HashMap<String, String>>) -> Result<Self, McpError> {
        Self::spawn_inner(args, env, None).await
    }

    /// Spawn a server, wrapping the command in an SSH invocation.
    pub async fn spawn_remote(
        args: Vec<String>,
        ssh: SshLogin,
        env: Option<HashMap<String, String>>,
    ) -> Result<Self, McpError> {
        Self::spawn_inner(args, env, Some(ssh)) .await
    }

    async fn spawn_inner(
        args: Vec<String>,
        env: Option<HashMap<String, String>>,
        ssh: Option<SshLogin>,
    ) -> Result<Self, McpError> {
        let command_line = build_command_line(&args, ssh.as_ref());
        log::info!("starting MCP server: {command_line}");

        let mut cmd = if cfg!(target_os = "windows") {
            let mut c = Command::new("powershell");
            c.args(["-NoProfile", "-Command", &command_line]);
            c
        } else {
            let mut c = Command::new("sh");
            c.args(["-c", &command_line]);
            c
        };
        if let Some(env) = env {
            for (k, v) in env {
                cmd.env(k, v);
            }
        }
        cmd.stdin(Stdio::piped());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        let mut child = cmd
            .spawn()
            .map_err(|e| McpError::Spawn(e.to_string()))?;

        let stdin = child.stdin.take().ok_or_else(|| McpError::Spawn("no stdin".into()))?;
        let stdout = child.stdout.take().ok_or_else(|| McpError::Spawn("no stdout".into()))?;
        let stderr = child.stderr.take().ok_or_else(|| McpError::Spawn("no stderr".into()))?;

        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                log::debug!("mcp server stderr: {line}");
            }
        });

        let (tx, mut rx) = mpsc::channel::<Command_>(32);
        let pending: std::sync::Arc<Mutex<HashMap<i64, oneshot::Sender<Result<Value, McpError>>>>> =
            std::sync::Arc::new(Mutex::new(HashMap::new()));
        let next_id = std::sync::Arc::new(AtomicI64::new(1));

        let reader_pending = pending.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        if line.trim().is_empty() {
                            continue;
                        }
                        let parsed: Result<JsonRpcResponse, _> = serde_json::from_str(&line);
                        match parsed {
                            Ok(resp) => {
                                if let Some(id) = resp.id {
                                    if let Some(sender) = reader_pending.lock().await.remove(&id) {
                                        let result = match resp.error {
                                            Some(err) => Err(McpError::Protocol(err.message)),
                                            None => Ok(resp.result.unwrap_or(Value::Null)),
                                        };
                                        let _ = sender.send(result);
                                    }
                                }
                            }
                            Err(e) => log::warn!("mcp server sent malformed response: {e}"),
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        log::warn!("mcp server stdout read error: {e}");
                        break;
                    }
                }
            }
            // Connection closed: wake every still-pending caller with an error.
            let mut pending = reader_pending.lock().await;
            for (_, sender) in pending.drain() {
                let _ = sender.send(Err(McpError::Closed));
            }
        });

        let writer_pending = pending.clone();
        let mut stdin = stdin;
        tokio::spawn(async move {
            while let Some(Command_::Request { method, params, reply }) = rx.recv().await {
                let id = next_id.fetch_add(1, Ordering::SeqCst);
                writer_pending.lock().await.insert(id, reply);
                let request = JsonRpcRequest {
                    jsonrpc: "2.0",
                    id,
                    method,
                    params,
                };
                let mut line = match serde_json::to_string(&request) {
                    Ok(s) => s,
                    Err(e) => {
                        if let Some(sender) = writer_pending.lock().await.remove(&id) {
                            let _ = sender.send(Err(McpError::Json(e)));
                        }
                        continue;
                    }
                };
                line.push('\n');
                if let Err(e) = stdin.write_all(line.as_bytes()).await {
                    if let Some(sender) = writer_pending.lock().await.remove(&id) {
                        let _ = sender.send(Err(McpError::Io(e)));
                    }
                    break;
                }
            }
        });

        let client = Self {
            tx,
            tools: Mutex::new(Vec::new()),
            child: Mutex::new(child),
        };
        client.initialize().await?;
        client.ping().await?;
        let tools = client.fetch_tools().await?;
        *client.tools.lock().await = tools;
        Ok(client)
    }

    async fn request(&self, method: &str, params: Option<Value>) -> Result<Value, McpError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(Command_::Request {
                method: method.to_string(),
                params,
                reply: reply_tx,
            })
            .await
            .map_err(|_| McpError::Closed)?;
        timeout(Duration::from_secs(30), reply_rx)
            .await
            .map_err(|_| McpError::PingTimeout)?
            .map_err(|_| McpError::Closed)?
    }

    async fn initialize(&self) -> Result<(), McpError> {
        self.request(
            "initialize",
            Some(serde_json::json!({
                "clientInfo": {"name": "chatcore", "version": env!("CARGO_PKG_VERSION")},
                "protocolVersion": "2024-11-05",
                "capabilities": {},
            })),
        )
        .await
        .map_err(|e| McpError::Initialize(e.to_string()))?;
        Ok(())
    }

    async fn ping(&self) -> Result<(), McpError> {
        self.request("ping", None).await.map(|_| ())
    }

    async fn fetch_tools(&self) -> Result<Vec<McpToolInfo>, McpError> {
        let result = self.request("tools/list", None).await?;
        let tools = result
            .get("tools")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();
        Ok(tools
            .into_iter()
            .filter_map(|t| {
                Some(McpToolInfo {
                    name: t.get("name")?.as_str()?.to_string(),
                    description: t
                        .get("description")
                        .and_then(|v| v.as_str())
                        .unwrap_or_default()
                        .to_string(),
                    parameters: t
                        .get("inputSchema")
                        .cloned()
                        .unwrap_or_else(|| serde_json::json!({"type":"object","properties":{}})),
                })
            })
            .collect())
    }

    pub async fn list_tools(&self) -> Result<Vec<McpToolInfo>, McpError> {
        Ok(self.tools.lock().await.clone())
    }

    /// Invoke a tool and return its first text content block (spec.md
    /// §4.3 step 5: `call(tool_name, args_json) → {is_error, content[0].text}`).
    pub async fn call(&self, name: &str, args: Value) -> Result<String, McpError> {
        let result = self
            .request(
                "tools/call",
                Some(serde_json::json!({"name": name, "arguments": args})),
            )
            .await?;
        let text = result
            .get("content")
            .and_then(|c| c.as_array())
            .and_then(|arr| arr.first())
            .and_then(|block| block.get("text"))
            .and_then(|t| t.as_str())
            .unwrap_or_default()
            .to_string();
        Ok(text)
    }
}

impl Drop for McpClient {
    fn drop(&mut self) {
        if let Ok(mut child) = self.child.try_lock() {
            let _ = child.start_kill();
        }
    }
}
