//! MCP Server Implementation
//!
//! Serves the runtime's entry-point tools, the registry resource and the
//! workflow prompt. Registry names are dotted (`registry.add`); MCP clients
//! see them with dashes (`registry-add`).

use super::protocol::*;
use super::resources::{PromptTemplate, RegistryResource, ResourceProvider, workflow_prompt};
use super::transport::{Incoming, Transport};
use crate::builtins;
use crate::engine::ToolRuntime;
use crate::error::Result;
use crate::registry::{ToolDefinition, input_schema};
use crate::tools::{ToolResult, ToolResultEnvelope};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Registry name to MCP name: every `.` becomes `-`
pub fn to_mcp_name(registry_name: &str) -> String {
    registry_name.replace('.', "-")
}

/// MCP name to registry name: the first `-` becomes `.`
pub fn to_registry_name(mcp_name: &str) -> String {
    mcp_name.replacen('-', ".", 1)
}

/// MCP server over a [`ToolRuntime`]
pub struct McpServer {
    runtime: ToolRuntime,
    info: Implementation,
    instructions: Option<String>,
    resources: Vec<Box<dyn ResourceProvider>>,
    prompts: Vec<PromptTemplate>,
    initialized: AtomicBool,
}

impl std::fmt::Debug for McpServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpServer")
            .field("info", &self.info)
            .field("initialized", &self.initialized)
            .finish()
    }
}

fn parse_params<T: DeserializeOwned>(params: Option<Value>, what: &str) -> std::result::Result<T, JsonRpcError> {
    let params = params.ok_or_else(|| JsonRpcError::invalid_params(format!("Missing {} params", what)))?;
    serde_json::from_value(params)
        .map_err(|e| JsonRpcError::invalid_params(format!("Invalid {} params: {}", what, e)))
}

fn call_result(envelope: ToolResultEnvelope) -> ToolCallResult {
    match envelope.result {
        ToolResult::Success { value: Value::String(text) } => ToolCallResult::text(text),
        ToolResult::Success { value } => ToolCallResult::text(
            serde_json::to_string_pretty(&value).unwrap_or_else(|_| value.to_string()),
        ),
        ToolResult::Error { error } => {
            let retry = if error.kind.is_retryable() {
                " (retryable)"
            } else {
                ""
            };
            ToolCallResult::error(format!("Error [{}]{}: {}", error.kind, retry, error.message))
        }
        ToolResult::Cancelled { reason } => {
            ToolCallResult::error(format!("Error [cancelled]: {}", reason))
        }
    }
}

impl McpServer {
    /// Builder seeded with the runtime's server name and version
    pub fn builder(runtime: ToolRuntime) -> McpServerBuilder {
        McpServerBuilder::new(runtime)
    }

    pub fn new(runtime: ToolRuntime) -> Self {
        Self::builder(runtime).build()
    }

    pub fn runtime(&self) -> &ToolRuntime {
        &self.runtime
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    /// Handle one incoming message; `None` when nothing should be sent back
    pub async fn handle_message(&self, message: JsonRpcMessage) -> Option<JsonRpcMessage> {
        if message.is_response() {
            debug!(id = ?message.id, "Ignoring response from client");
            return None;
        }
        if message.is_notification() {
            self.handle_notification(message.method.as_deref().unwrap_or_default());
            return None;
        }
        let id = message.id.clone().unwrap_or(RequestId::Null);
        match message.into_request() {
            Some(request) => Some(self.handle_request(request).await.into()),
            None => Some(JsonRpcResponse::error(id, JsonRpcError::invalid_request()).into()),
        }
    }

    fn handle_notification(&self, method: &str) {
        match method {
            "notifications/initialized" | "initialized" => {
                self.initialized.store(true, Ordering::SeqCst);
                debug!("Client initialized");
            }
            other => debug!(method = %other, "Ignoring notification"),
        }
    }

    /// Handle an incoming JSON-RPC request
    pub async fn handle_request(&self, request: JsonRpcRequest) -> JsonRpcResponse {
        let JsonRpcRequest { id, method, params, .. } = request;
        debug!(id = %id, method = %method, "Request");

        let outcome = match method.as_str() {
            "initialize" => self.handle_initialize(params),
            "ping" => Ok(json!({})),
            "tools/list" => self.handle_tools_list().await,
            "tools/call" => self.handle_tools_call(params).await,
            "resources/list" => self.handle_resources_list().await,
            "resources/read" => self.handle_resources_read(params).await,
            "prompts/list" => self.handle_prompts_list(),
            "prompts/get" => self.handle_prompts_get(params),
            _ => Err(JsonRpcError::method_not_found()),
        };

        match outcome {
            Ok(result) => JsonRpcResponse::success(id, result),
            Err(error) => JsonRpcResponse::error(id, error),
        }
    }

    fn handle_initialize(&self, params: Option<Value>) -> std::result::Result<Value, JsonRpcError> {
        let params: InitializeParams = parse_params(params, "initialize")?;
        info!(
            client = %params.client_info.name,
            client_version = %params.client_info.version,
            protocol = %params.protocol_version,
            "Client connected"
        );

        let result = InitializeResult {
            protocol_version: MCP_PROTOCOL_VERSION.to_string(),
            capabilities: ServerCapabilities {
                tools: Some(ListChanged::default()),
                resources: Some(ResourcesCapability::default()),
                prompts: Some(ListChanged::default()),
            },
            server_info: Some(self.info.clone()),
            instructions: self.instructions.clone(),
        };
        serde_json::to_value(result).map_err(|e| JsonRpcError::internal_error(e.to_string()))
    }

    async fn handle_tools_list(&self) -> std::result::Result<Value, JsonRpcError> {
        let store = self.runtime.store();
        let mut tools = Vec::new();
        for name in builtins::ENTRY_POINTS {
            if let Some(definition) = store.find(name).await {
                tools.push(McpTool {
                    name: to_mcp_name(&definition.name),
                    description: definition.description.clone(),
                    input_schema: input_schema(&definition),
                });
            }
        }
        serde_json::to_value(ToolsListResult { tools })
            .map_err(|e| JsonRpcError::internal_error(e.to_string()))
    }

    /// Converted name first, then the raw name, then a scan
    async fn find_tool(&self, mcp_name: &str) -> Option<Arc<ToolDefinition>> {
        let store = self.runtime.store();
        if let Some(definition) = store.find(&to_registry_name(mcp_name)).await {
            return Some(definition);
        }
        if let Some(definition) = store.find(mcp_name).await {
            return Some(definition);
        }
        store
            .all()
            .await
            .into_iter()
            .find(|d| to_mcp_name(&d.name) == mcp_name)
    }

    async fn handle_tools_call(&self, params: Option<Value>) -> std::result::Result<Value, JsonRpcError> {
        let params: ToolCallParams = parse_params(params, "tool call")?;

        let result = match self.find_tool(&params.name).await {
            None => ToolCallResult::error(format!(
                "Error [not_found]: Unknown tool '{}'",
                params.name
            )),
            Some(definition) if !builtins::is_entry_point(&definition.name) => {
                ToolCallResult::error(format!(
                    "Error [not_found]: '{name}' is not exposed directly.\n\
                     Call it via registry-execute:\n  \
                     `registry-execute(name=\"{name}\", params='{{...}}')`",
                    name = definition.name
                ))
            }
            Some(definition) => {
                let envelope = self.runtime.execute(&definition.name, params.arguments).await;
                call_result(envelope)
            }
        };
        serde_json::to_value(result).map_err(|e| JsonRpcError::internal_error(e.to_string()))
    }

    async fn handle_resources_list(&self) -> std::result::Result<Value, JsonRpcError> {
        let mut resources = Vec::new();
        for provider in &self.resources {
            resources.extend(provider.list_resources().await);
        }
        serde_json::to_value(ResourcesListResult { resources })
            .map_err(|e| JsonRpcError::internal_error(e.to_string()))
    }

    async fn handle_resources_read(&self, params: Option<Value>) -> std::result::Result<Value, JsonRpcError> {
        let params: ResourceReadParams = parse_params(params, "resource read")?;
        for provider in &self.resources {
            if let Some(content) = provider.read_resource(&params.uri).await {
                return serde_json::to_value(ResourceReadResult {
                    contents: vec![content],
                })
                .map_err(|e| JsonRpcError::internal_error(e.to_string()));
            }
        }
        Err(JsonRpcError::new(
            ERROR_NOT_FOUND,
            format!("Resource '{}' not found", params.uri),
        ))
    }

    fn handle_prompts_list(&self) -> std::result::Result<Value, JsonRpcError> {
        let prompts = self.prompts.iter().map(PromptTemplate::to_mcp).collect();
        serde_json::to_value(PromptsListResult { prompts })
            .map_err(|e| JsonRpcError::internal_error(e.to_string()))
    }

    fn handle_prompts_get(&self, params: Option<Value>) -> std::result::Result<Value, JsonRpcError> {
        let params: PromptGetParams = parse_params(params, "prompt get")?;
        let prompt = self
            .prompts
            .iter()
            .find(|p| p.name == params.name)
            .ok_or_else(|| {
                JsonRpcError::new(ERROR_NOT_FOUND, format!("Prompt '{}' not found", params.name))
            })?;

        serde_json::to_value(PromptGetResult {
            description: Some(prompt.description.clone()),
            messages: vec![PromptMessage {
                role: PromptRole::Assistant,
                content: ContentBlock::text(prompt.text.clone()),
            }],
        })
        .map_err(|e| JsonRpcError::internal_error(e.to_string()))
    }

    /// Serve until the transport closes and every request has been answered.
    ///
    /// Each request runs on its own task, so a slow tool call does not hold
    /// up a `ping` behind it; replies go out in completion order through this
    /// loop, the transport's only writer. Notifications are applied inline
    /// before the next message is read. Unparseable input gets a parse error
    /// reply with a null id.
    ///
    /// # Errors
    ///
    /// Returns an error when the transport fails to read or write.
    pub async fn run<T: Transport>(self: Arc<Self>, mut transport: T) -> Result<()> {
        info!(server = %self.info.name, version = %self.info.version, "MCP server listening");
        let (reply_tx, mut reply_rx) = mpsc::channel::<JsonRpcMessage>(64);
        let mut in_flight = JoinSet::new();
        let mut reading = true;

        while reading || !in_flight.is_empty() {
            tokio::select! {
                incoming = transport.receive(), if reading => match incoming? {
                    Some(Incoming::Malformed(error)) => {
                        warn!(error = %error, "Unparseable message");
                        let reply = JsonRpcResponse::error(RequestId::Null, JsonRpcError::parse_error());
                        transport.send(reply.into()).await?;
                    }
                    Some(Incoming::Message(message))
                        if message.is_notification() || message.is_response() =>
                    {
                        self.handle_message(message).await;
                    }
                    Some(Incoming::Message(message)) => {
                        let server = Arc::clone(&self);
                        let replies = reply_tx.clone();
                        in_flight.spawn(async move {
                            if let Some(reply) = server.handle_message(message).await {
                                let _ = replies.send(reply).await;
                            }
                        });
                    }
                    None => {
                        info!("Client closed the connection");
                        reading = false;
                    }
                },
                Some(reply) = reply_rx.recv() => transport.send(reply).await?,
                Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                    if let Err(e) = joined {
                        error!(error = %e, "Request task failed, no reply sent");
                    }
                }
            }
        }

        // Finished tasks may have queued replies the loop has not sent yet
        while let Ok(reply) = reply_rx.try_recv() {
            transport.send(reply).await?;
        }
        Ok(())
    }
}

/// Builder for [`McpServer`]
pub struct McpServerBuilder {
    runtime: ToolRuntime,
    info: Implementation,
    instructions: Option<String>,
    resources: Vec<Box<dyn ResourceProvider>>,
    prompts: Vec<PromptTemplate>,
}

impl McpServerBuilder {
    pub fn new(runtime: ToolRuntime) -> Self {
        let info = Implementation {
            name: runtime.config().server.name.clone(),
            version: runtime.config().server.version.clone(),
        };
        Self {
            resources: vec![Box::new(RegistryResource::new(runtime.clone()))],
            runtime,
            info,
            instructions: None,
            prompts: vec![workflow_prompt()],
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.info.name = name.into();
        self
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.info.version = version.into();
        self
    }

    pub fn instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    pub fn with_resource_provider(mut self, provider: Box<dyn ResourceProvider>) -> Self {
        self.resources.push(provider);
        self
    }

    pub fn with_prompt(mut self, prompt: PromptTemplate) -> Self {
        self.prompts.push(prompt);
        self
    }

    pub fn build(self) -> McpServer {
        McpServer {
            runtime: self.runtime,
            info: self.info,
            instructions: self.instructions,
            resources: self.resources,
            prompts: self.prompts,
            initialized: AtomicBool::new(false),
        }
    }
}
