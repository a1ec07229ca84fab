//! Model Context Protocol (MCP)
//!
//! Both directions of the protocol live here: the server that exposes the
//! tool runtime to agents, and the wire types the proxy uses to talk to
//! external servers.
//!
//! # Example
//!
//! ```rust,ignore
//! use toolsmith_core::{config::ToolsmithConfig, engine::ToolRuntime};
//! use std::sync::Arc;
//! use toolsmith_core::mcp::{McpServer, StdioTransport};
//!
//! let runtime = ToolRuntime::builder(ToolsmithConfig::load()?).build().await?;
//! Arc::new(McpServer::new(runtime)).run(StdioTransport::stdio()).await?;
//! ```
//!
//! # Protocol Overview
//!
//! MCP uses JSON-RPC 2.0 over newline-delimited stdio:
//! - `initialize` / `notifications/initialized` - Connection setup
//! - `ping` - Liveness
//! - `tools/list` / `tools/call` - Entry-point tools
//! - `resources/list` / `resources/read` - Registry summary
//! - `prompts/list` / `prompts/get` - Workflow prompt
//!
//! # References
//!
//! - [MCP Specification](https://modelcontextprotocol.io/specification)

mod protocol;
mod resources;
mod server;
mod transport;

pub use protocol::*;
pub use resources::{
    PromptTemplate, REGISTRY_URI, RegistryResource, ResourceProvider, WORKFLOW_PROMPT_NAME,
    workflow_prompt,
};
pub use server::{McpServer, McpServerBuilder, to_mcp_name, to_registry_name};
pub use transport::{Incoming, LineTransport, MemoryTransport, StdioTransport, Transport};
