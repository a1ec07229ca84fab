//! # Toolsmith - A Self-Extending Tool Registry for Agents
//!
//! Toolsmith serves a small set of entry-point tools over the Model Context
//! Protocol. Behind them sits a registry of dotted-name tools that agents can
//! grow at runtime:
//! - Tool definitions stored as YAML, one file per tool
//! - Local tools backed by shell scripts or built-in Rust modules
//! - Proxied tools discovered from external MCP servers
//! - Hot reload of edited scripts and definitions
//! - Uniform result envelopes with provenance
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use toolsmith_core::prelude::*;
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let runtime = ToolRuntime::builder(ToolsmithConfig::load()?).build().await?;
//!
//!     let envelope = runtime.execute("registry.list", json!({})).await;
//!     println!("{:?}", envelope.result);
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! - **registry**: Definitions, aliases and validation
//! - **catalog**: Definition directory on disk and stub generation
//! - **modules**: Loading and caching of local callables
//! - **proxy**: Connections to external MCP servers
//! - **engine**: Argument binding and dispatch
//! - **builtins**: The `registry.*`, `observe.*` and `mcp.*` tools
//! - **mcp**: Protocol types and the stdio server

pub mod builtins;
pub mod catalog;
pub mod config;
pub mod engine;
pub mod error;
pub mod mcp;
pub mod modules;
pub mod proxy;
pub mod registry;
pub mod tools;

/// Current library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Re-export commonly used types
pub mod prelude {
    pub use crate::catalog::{Catalog, CatalogSnapshot, StubGenerator};
    pub use crate::config::{ModuleConfig, ProxyConfig, ServerConfig, ToolsmithConfig};
    pub use crate::engine::{RuntimeBuilder, ToolRuntime};
    pub use crate::error::{Result, ToolsmithError};
    pub use crate::mcp::{
        McpServer, McpServerBuilder, MemoryTransport, StdioTransport, Transport,
    };
    pub use crate::modules::{BuiltinModule, BuiltinModules};
    pub use crate::proxy::{ConnectionState, ExternalServerConfig, ProxyManager};
    pub use crate::registry::{
        DefinitionStore, DispatchTarget, ParamType, ToolAlias, ToolDefinition, ToolParameter,
        ValidationReport,
    };
    pub use crate::tools::{
        ToolContext, ToolError, ToolErrorKind, ToolHandler, ToolProvenance, ToolResult,
        ToolResultEnvelope,
    };
}
