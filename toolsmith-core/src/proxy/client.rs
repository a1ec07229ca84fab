//! MCP client over a child process's stdio
//!
//! Spawns the server, then speaks newline-delimited JSON-RPC on its
//! stdin/stdout. A writer task serialises outgoing lines; a reader task
//! routes responses to the pending request they answer. Stderr is drained
//! into the log. Shutdown closes stdin first and only kills the process if
//! it outlives the grace period.

use super::config::ExternalServerConfig;
use super::manager::{Launcher, RemoteSession};
use crate::config::ProxyConfig;
use crate::error::{Result, ToolsmithError};
use crate::mcp::{
    Implementation, InitializeParams, InitializeResult, JsonRpcError, JsonRpcMessage,
    JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, MCP_PROTOCOL_VERSION, McpTool,
    RequestId, ToolCallResult, ToolsListResult,
};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::{BTreeMap, HashMap};
use std::process::Stdio;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Requests awaiting a response, keyed by id
#[derive(Default)]
struct Pending {
    /// Set once stdout closes; no further requests are accepted
    closed: bool,
    waiters: HashMap<i64, oneshot::Sender<JsonRpcMessage>>,
}

type PendingMap = Arc<std::sync::Mutex<Pending>>;

fn lock_pending(pending: &PendingMap) -> MutexGuard<'_, Pending> {
    pending.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Removes a request's waiter when the caller stops waiting, however it stops
struct WaiterGuard<'a> {
    pending: &'a PendingMap,
    id: i64,
}

impl Drop for WaiterGuard<'_> {
    fn drop(&mut self) {
        lock_pending(self.pending).waiters.remove(&self.id);
    }
}

/// Launches external servers as child processes
#[derive(Debug, Clone)]
pub struct StdioLauncher {
    timeouts: ProxyConfig,
    client_info: Implementation,
}

impl StdioLauncher {
    pub fn new(timeouts: ProxyConfig, client_info: Implementation) -> Self {
        Self {
            timeouts,
            client_info,
        }
    }
}

#[async_trait]
impl Launcher for StdioLauncher {
    async fn launch(&self, config: &ExternalServerConfig) -> Result<Arc<dyn RemoteSession>> {
        let env = config.resolve_env()?;
        let mut session = StdioSession::spawn(config, &env, &self.timeouts)?;

        let handshake = async {
            session.initialize(&self.client_info).await?;
            session.refresh_tools().await
        };
        let outcome = tokio::time::timeout(self.timeouts.connect_timeout, handshake).await;
        match outcome {
            Ok(Ok(())) => Ok(Arc::new(session)),
            Ok(Err(e)) => {
                session.shutdown().await;
                Err(ToolsmithError::Connection(format!(
                    "Handshake with '{}' failed: {}",
                    config.namespace,
                    e.detail()
                )))
            }
            Err(_) => {
                session.shutdown().await;
                Err(ToolsmithError::Connection(format!(
                    "Handshake with '{}' timed out after {:?}",
                    config.namespace, self.timeouts.connect_timeout
                )))
            }
        }
    }
}

/// A live connection to one external server
pub struct StdioSession {
    namespace: String,
    writer_tx: mpsc::Sender<String>,
    pending: PendingMap,
    next_id: AtomicI64,
    request_timeout: Duration,
    shutdown_timeout: Duration,
    child: Mutex<Option<Child>>,
    server_info: Option<Implementation>,
    tools: Vec<McpTool>,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl StdioSession {
    /// Start the process and the background I/O tasks.
    ///
    /// # Errors
    ///
    /// `Connection` if the process cannot be started.
    pub fn spawn(
        config: &ExternalServerConfig,
        env: &BTreeMap<String, String>,
        timeouts: &ProxyConfig,
    ) -> Result<Self> {
        info!(namespace = %config.namespace, command = %config.command_line(), "Launching MCP server");

        let mut child = Command::new(&config.command)
            .args(&config.args)
            .envs(env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                ToolsmithError::Connection(format!(
                    "Failed to launch '{}' for server '{}': {}",
                    config.command, config.namespace, e
                ))
            })?;

        let missing = || ToolsmithError::Connection("Child process has no stdio pipes".into());
        let stdin = child.stdin.take().ok_or_else(missing)?;
        let stdout = child.stdout.take().ok_or_else(missing)?;
        let stderr = child.stderr.take().ok_or_else(missing)?;

        let pending: PendingMap = Arc::new(std::sync::Mutex::new(Pending::default()));
        let (writer_tx, writer_rx) = mpsc::channel::<String>(64);

        let writer = tokio::spawn(write_lines(stdin, writer_rx));
        let reader = tokio::spawn(route_responses(
            config.namespace.clone(),
            stdout,
            Arc::clone(&pending),
            writer_tx.clone(),
        ));
        tokio::spawn(drain_stderr(config.namespace.clone(), stderr));

        Ok(Self {
            namespace: config.namespace.clone(),
            writer_tx,
            pending,
            next_id: AtomicI64::new(1),
            request_timeout: timeouts.request_timeout,
            shutdown_timeout: timeouts.shutdown_timeout,
            child: Mutex::new(Some(child)),
            server_info: None,
            tools: Vec::new(),
            reader,
            writer,
        })
    }

    pub fn server_info(&self) -> Option<&Implementation> {
        self.server_info.as_ref()
    }

    /// Requests still waiting for an answer
    pub fn pending_requests(&self) -> usize {
        lock_pending(&self.pending).waiters.len()
    }

    async fn send(&self, message: JsonRpcMessage) -> Result<()> {
        let line = serde_json::to_string(&message)?;
        self.writer_tx.send(line).await.map_err(|_| {
            ToolsmithError::Connection(format!("Server '{}' is no longer running", self.namespace))
        })
    }

    /// Send a request and wait for its response.
    ///
    /// # Errors
    ///
    /// `Timeout` after the request timeout, `Connection` if the server goes
    /// away, `RemoteExecution` for a JSON-RPC error response.
    pub async fn request(&self, method: &str, params: Value) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        {
            let mut pending = lock_pending(&self.pending);
            if pending.closed {
                return Err(ToolsmithError::Connection(format!(
                    "Server '{}' is no longer running",
                    self.namespace
                )));
            }
            pending.waiters.insert(id, tx);
        }
        let _waiter = WaiterGuard {
            pending: &self.pending,
            id,
        };

        let request = JsonRpcRequest::new(id, method).with_params(params);
        self.send(request.into()).await?;

        let response = match tokio::time::timeout(self.request_timeout, rx).await {
            Ok(Ok(response)) => response,
            Ok(Err(_)) => {
                return Err(ToolsmithError::Connection(format!(
                    "Server '{}' closed before answering '{}'",
                    self.namespace, method
                )));
            }
            Err(_) => {
                return Err(ToolsmithError::Timeout(format!(
                    "'{}' on server '{}' timed out after {:?}",
                    method, self.namespace, self.request_timeout
                )));
            }
        };

        if let Some(error) = response.error {
            return Err(ToolsmithError::RemoteExecution(error.message));
        }
        Ok(response.result.unwrap_or(Value::Null))
    }

    pub async fn notify(&self, method: &str, params: Option<Value>) -> Result<()> {
        let mut notification = JsonRpcNotification::new(method);
        if let Some(params) = params {
            notification = notification.with_params(params);
        }
        self.send(notification.into()).await
    }

    /// `initialize` followed by `notifications/initialized`
    pub async fn initialize(&mut self, client_info: &Implementation) -> Result<InitializeResult> {
        let params = InitializeParams {
            protocol_version: MCP_PROTOCOL_VERSION.to_string(),
            capabilities: json!({}),
            client_info: client_info.clone(),
        };
        let result = self
            .request("initialize", serde_json::to_value(&params)?)
            .await?;
        let result: InitializeResult = serde_json::from_value(result)
            .map_err(|e| ToolsmithError::Protocol(format!("Bad initialize result: {}", e)))?;

        self.notify("notifications/initialized", None).await?;
        debug!(
            namespace = %self.namespace,
            protocol = %result.protocol_version,
            "MCP handshake complete"
        );
        self.server_info = result.server_info.clone();
        Ok(result)
    }

    /// Fetch `tools/list` and remember it
    pub async fn refresh_tools(&mut self) -> Result<()> {
        let result = self.request("tools/list", json!({})).await?;
        let list: ToolsListResult = serde_json::from_value(result)
            .map_err(|e| ToolsmithError::Protocol(format!("Bad tools/list result: {}", e)))?;
        info!(namespace = %self.namespace, tools = list.tools.len(), "Discovered remote tools");
        self.tools = list.tools;
        Ok(())
    }
}

#[async_trait]
impl RemoteSession for StdioSession {
    fn tools(&self) -> &[McpTool] {
        &self.tools
    }

    async fn call_tool(&self, tool: &str, arguments: Value) -> Result<String> {
        let result = self
            .request("tools/call", json!({"name": tool, "arguments": arguments}))
            .await?;
        let result: ToolCallResult = serde_json::from_value(result)
            .map_err(|e| ToolsmithError::Protocol(format!("Bad tools/call result: {}", e)))?;

        let text = result.joined_text();
        if result.is_error {
            return Err(ToolsmithError::RemoteExecution(text));
        }
        Ok(text)
    }

    fn is_alive(&self) -> bool {
        !self.reader.is_finished()
    }

    async fn shutdown(&self) {
        let mut guard = self.child.lock().await;
        // Aborting the writer drops the child's stdin
        self.writer.abort();
        if let Some(mut child) = guard.take() {
            info!(namespace = %self.namespace, "Stopping MCP server");
            match tokio::time::timeout(self.shutdown_timeout, child.wait()).await {
                Ok(Ok(status)) => {
                    debug!(namespace = %self.namespace, %status, "MCP server exited");
                }
                Ok(Err(e)) => {
                    debug!(namespace = %self.namespace, error = %e, "Waiting for MCP server failed");
                }
                Err(_) => {
                    warn!(
                        namespace = %self.namespace,
                        grace = ?self.shutdown_timeout,
                        "MCP server did not exit after stdin closed, killing it"
                    );
                    if let Err(e) = child.kill().await {
                        debug!(namespace = %self.namespace, error = %e, "Kill failed, process already gone");
                    }
                }
            }
        }
        self.reader.abort();
        let mut pending = lock_pending(&self.pending);
        pending.closed = true;
        pending.waiters.clear();
    }
}

impl Drop for StdioSession {
    fn drop(&mut self) {
        self.reader.abort();
        self.writer.abort();
    }
}

async fn write_lines(mut stdin: tokio::process::ChildStdin, mut rx: mpsc::Receiver<String>) {
    while let Some(mut line) = rx.recv().await {
        line.push('\n');
        if let Err(e) = stdin.write_all(line.as_bytes()).await {
            warn!(error = %e, "MCP server stdin closed");
            break;
        }
        if let Err(e) = stdin.flush().await {
            warn!(error = %e, "MCP server stdin flush failed");
            break;
        }
    }
}

async fn route_responses<R: AsyncRead + Unpin>(
    namespace: String,
    stdout: R,
    pending: PendingMap,
    writer_tx: mpsc::Sender<String>,
) {
    let mut lines = BufReader::new(stdout).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => {
                info!(namespace = %namespace, "MCP server closed stdout");
                break;
            }
            Err(e) => {
                warn!(namespace = %namespace, error = %e, "MCP server read failed");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let message: JsonRpcMessage = match serde_json::from_str(&line) {
            Ok(message) => message,
            Err(e) => {
                warn!(namespace = %namespace, error = %e, "Unparseable line from MCP server");
                continue;
            }
        };

        match (&message.method, &message.id) {
            (None, Some(RequestId::Number(id))) => {
                let waiter = lock_pending(&pending).waiters.remove(id);
                if let Some(tx) = waiter {
                    let _ = tx.send(message);
                } else {
                    debug!(namespace = %namespace, id, "Response for abandoned request");
                }
            }
            (Some(method), Some(id)) => {
                // Server-to-client requests: only ping is supported
                let response = if method == "ping" {
                    JsonRpcResponse::success(id.clone(), json!({}))
                } else {
                    JsonRpcResponse::error(id.clone(), JsonRpcError::method_not_found())
                };
                if let Ok(line) = serde_json::to_string(&JsonRpcMessage::from(response)) {
                    let _ = writer_tx.send(line).await;
                }
            }
            (Some(method), None) => {
                debug!(namespace = %namespace, method = %method, "Notification from MCP server");
            }
            (None, _) => {
                debug!(namespace = %namespace, "Ignoring message without method or numeric id");
            }
        }
    }

    // Dropping the senders wakes every waiter with a closed-channel error
    let mut pending = lock_pending(&pending);
    pending.closed = true;
    pending.waiters.clear();
}

async fn drain_stderr<R: AsyncRead + Unpin>(namespace: String, stderr: R) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        let line = line.trim();
        if !line.is_empty() {
            debug!(namespace = %namespace, "[stderr] {}", line);
        }
    }
}
