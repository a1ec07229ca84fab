//! Proxying to external MCP servers
//!
//! Definitions whose module is `mcp://<namespace>` are forwarded to the
//! server configured for that namespace. Servers are launched on first use
//! and stay up until disconnected.

mod client;
mod config;
mod manager;

pub use client::{StdioLauncher, StdioSession};
pub use config::ExternalServerConfig;
pub use manager::{ConnectionState, Launcher, ProxyManager, RemoteSession};
