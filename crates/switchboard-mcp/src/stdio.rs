//! Stdio transport for MCP servers launched as child processes.
//!
//! Messages are newline-delimited JSON in both directions. A reader task
//! owns the child's stdout and routes responses to their pending requests;
//! requests the server sends to us are answered in place. Child stderr is
//! forwarded to the log.

use crate::error::{McpError, McpResult};
use crate::protocol::{JsonRpcMessage, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};
use crate::transport::{await_response, reply_to_server_request, PendingRequests, Transport};
use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// How to launch a stdio server.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StdioConfig {
    pub command: String,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
    pub cwd: Option<PathBuf>,
}

impl StdioConfig {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ..Self::default()
        }
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// The command line as a single string, for messages.
    pub fn command_line(&self) -> String {
        std::iter::once(self.command.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

type SharedStdin = Arc<Mutex<Option<ChildStdin>>>;

/// MCP transport over a child process's stdio.
pub struct StdioTransport {
    command: String,
    child: Mutex<Option<Child>>,
    stdin: SharedStdin,
    pending: PendingRequests,
    connected: Arc<AtomicBool>,
    tasks: Vec<JoinHandle<()>>,
}

impl StdioTransport {
    /// Spawn the server process and start reading from it.
    ///
    /// A missing executable is reported as [`McpError::CommandNotFound`].
    pub fn spawn(config: &StdioConfig) -> McpResult<Self> {
        let mut cmd = Command::new(&config.command);
        cmd.args(&config.args)
            .envs(&config.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(dir) = &config.cwd {
            cmd.current_dir(dir);
        }

        debug!(command = %config.command, args = ?config.args, "Starting MCP server process");

        let mut child = cmd.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                McpError::CommandNotFound(config.command.clone())
            } else {
                McpError::ProcessError(format!("failed to start '{}': {e}", config.command))
            }
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| McpError::ProcessError("failed to get stdin".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| McpError::ProcessError("failed to get stdout".to_string()))?;
        let stderr = child.stderr.take();

        let stdin: SharedStdin = Arc::new(Mutex::new(Some(stdin)));
        let pending = PendingRequests::new();
        let connected = Arc::new(AtomicBool::new(true));

        let mut tasks = vec![tokio::spawn(read_loop(
            config.command.clone(),
            stdout,
            stdin.clone(),
            pending.clone(),
            connected.clone(),
        ))];

        if let Some(stderr) = stderr {
            let command = config.command.clone();
            tasks.push(tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(command = %command, "stderr: {}", line);
                }
            }));
        }

        Ok(Self {
            command: config.command.clone(),
            child: Mutex::new(Some(child)),
            stdin,
            pending,
            connected,
            tasks,
        })
    }

    /// Process id of the child, if it is still owned by this transport.
    pub async fn pid(&self) -> Option<u32> {
        self.child.lock().await.as_ref().and_then(|c| c.id())
    }

    async fn send<T: Serialize>(&self, message: &T) -> McpResult<()> {
        let line = serde_json::to_string(message)?;
        write_line(&self.stdin, &line).await
    }
}

async fn write_line(stdin: &SharedStdin, line: &str) -> McpResult<()> {
    let mut guard = stdin.lock().await;
    let stdin = guard.as_mut().ok_or(McpError::Closed)?;
    stdin.write_all(line.as_bytes()).await?;
    stdin.write_all(b"\n").await?;
    stdin.flush().await?;
    Ok(())
}

async fn read_loop(
    command: String,
    stdout: ChildStdout,
    stdin: SharedStdin,
    pending: PendingRequests,
    connected: Arc<AtomicBool>,
) {
    let mut lines = BufReader::new(stdout).lines();

    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                match JsonRpcMessage::parse(line) {
                    Some(JsonRpcMessage::Response(response)) => {
                        pending.resolve(response).await;
                    }
                    Some(JsonRpcMessage::Request(request)) => {
                        if let Some(reply) = reply_to_server_request(&request) {
                            match serde_json::to_string(&reply) {
                                Ok(text) => {
                                    if let Err(e) = write_line(&stdin, &text).await {
                                        warn!(command = %command, error = %e, "Failed to answer server request");
                                    }
                                }
                                Err(e) => warn!(error = %e, "Failed to encode reply"),
                            }
                        }
                    }
                    Some(JsonRpcMessage::Notification(notification)) => {
                        debug!(command = %command, method = %notification.method, "Server notification");
                    }
                    None => {
                        warn!(command = %command, "Ignoring non JSON-RPC output: {}", line);
                    }
                }
            }
            Ok(None) => {
                debug!(command = %command, "Server stdout closed");
                break;
            }
            Err(e) => {
                warn!(command = %command, error = %e, "Error reading server stdout");
                break;
            }
        }
    }

    connected.store(false, Ordering::SeqCst);
    pending.fail_all().await;
}

#[async_trait]
impl Transport for StdioTransport {
    async fn request(&self, request: JsonRpcRequest) -> McpResult<JsonRpcResponse> {
        if !self.is_connected() {
            return Err(McpError::Closed);
        }

        let rx = self.pending.register(&request).await?;
        // The reader may have drained the pending map between the check above
        // and the registration.
        if !self.is_connected() {
            if let Some(id) = &request.id {
                self.pending.cancel(id).await;
            }
            return Err(McpError::Closed);
        }
        if let Err(e) = self.send(&request).await {
            if let Some(id) = &request.id {
                self.pending.cancel(id).await;
            }
            return Err(e);
        }

        await_response(&self.pending, &request, rx).await
    }

    async fn notify(&self, notification: JsonRpcNotification) -> McpResult<()> {
        self.send(&notification).await
    }

    async fn close(&self) -> McpResult<()> {
        self.connected.store(false, Ordering::SeqCst);
        self.stdin.lock().await.take();

        if let Some(mut child) = self.child.lock().await.take() {
            if let Err(e) = child.kill().await {
                debug!(command = %self.command, error = %e, "Server process already gone");
            }
        }

        self.pending.fail_all().await;
        debug!(command = %self.command, "Closed stdio transport");
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

impl Drop for StdioTransport {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
        // kill_on_drop covers the child itself.
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::RequestId;

    fn responder(script: &str) -> StdioConfig {
        StdioConfig::new("sh").args(["-c", script])
    }

    #[test]
    fn test_command_line() {
        let config = StdioConfig::new("npx").args(["-y", "server-fs", "/tmp"]);
        assert_eq!(config.command_line(), "npx -y server-fs /tmp");
        assert_eq!(StdioConfig::new("echo").command_line(), "echo");
    }

    #[test]
    fn test_env_builder() {
        let config = StdioConfig::new("x").env("TOKEN", "abc");
        assert_eq!(config.env.get("TOKEN").map(String::as_str), Some("abc"));
    }

    #[tokio::test]
    async fn test_spawn_missing_command() {
        let config = StdioConfig::new("nonexistent_command_that_does_not_exist_12345");
        let result = StdioTransport::spawn(&config);
        match result {
            Err(McpError::CommandNotFound(command)) => {
                assert_eq!(command, "nonexistent_command_that_does_not_exist_12345")
            }
            Err(other) => panic!("expected CommandNotFound, got {other}"),
            Ok(_) => panic!("expected spawn failure"),
        }
    }

    #[tokio::test]
    async fn test_request_roundtrip() {
        let transport = StdioTransport::spawn(&responder(
            r#"read line; echo '{"jsonrpc":"2.0","id":1,"result":{"ok":true}}'; sleep 5"#,
        ))
        .unwrap();

        let response = transport
            .request(JsonRpcRequest::new(1, "ping", None))
            .await
            .unwrap();
        assert_eq!(response.id, RequestId::Number(1));
        assert_eq!(response.result.unwrap()["ok"], true);

        transport.close().await.unwrap();
        assert!(!transport.is_connected());
    }

    #[tokio::test]
    async fn test_process_exit_fails_pending_request() {
        let transport = StdioTransport::spawn(&responder("read line; exit 0")).unwrap();
        let result = transport
            .request(JsonRpcRequest::new(1, "ping", None))
            .await;
        assert!(matches!(result, Err(McpError::Closed)));
        assert!(!transport.is_connected());
    }

    #[tokio::test]
    async fn test_request_after_close_fails() {
        let transport = StdioTransport::spawn(&responder("sleep 5")).unwrap();
        transport.close().await.unwrap();
        let result = transport
            .request(JsonRpcRequest::new(1, "ping", None))
            .await;
        assert!(matches!(result, Err(McpError::Closed)));
    }

    #[tokio::test]
    async fn test_timed_out_requests_leave_nothing_pending() {
        let transport =
            StdioTransport::spawn(&responder("while read line; do :; done")).unwrap();
        for id in 1..=3 {
            let result = tokio::time::timeout(
                std::time::Duration::from_millis(50),
                transport.request(JsonRpcRequest::new(id, "tools/call", None)),
            )
            .await;
            assert!(result.is_err());
        }
        tokio::task::yield_now().await;
        assert_eq!(transport.pending.len().await, 0);
        transport.close().await.unwrap();
    }
}
