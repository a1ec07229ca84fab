//! Per-namespace connection state for external servers
//!
//! Each namespace is either absent, connecting or connected. A connect
//! attempt is one shared future: every caller that arrives while it is in
//! flight awaits the same launch and sees the same outcome, error included.
//! The slot is cleared only once that attempt resolves, so a failure is not
//! remembered and the next call starts from scratch. A connected session
//! whose process has exited is replaced on the next connect.

use super::config::ExternalServerConfig;
use crate::error::{Result, ToolsmithError};
use crate::mcp::McpTool;
use async_trait::async_trait;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

/// A connected external server
#[async_trait]
pub trait RemoteSession: Send + Sync {
    /// Tools the server reported during the handshake
    fn tools(&self) -> &[McpTool];

    /// Forward `tools/call`, returning the joined text content
    async fn call_tool(&self, tool: &str, arguments: Value) -> Result<String>;

    /// False once the server has gone away; the manager then relaunches it
    fn is_alive(&self) -> bool {
        true
    }

    /// Stop the server process
    async fn shutdown(&self);
}

/// Starts an external server and completes the MCP handshake
#[async_trait]
pub trait Launcher: Send + Sync {
    async fn launch(&self, config: &ExternalServerConfig) -> Result<Arc<dyn RemoteSession>>;
}

/// Observable connection state of a namespace
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Absent,
    Connecting,
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ConnectionState::Absent => "absent",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
        })
    }
}

type LaunchOutcome = std::result::Result<Arc<dyn RemoteSession>, Arc<ToolsmithError>>;

enum Slot {
    Connecting {
        attempt_id: u64,
        attempt: Shared<BoxFuture<'static, LaunchOutcome>>,
    },
    Connected(Arc<dyn RemoteSession>),
}

/// Owns every external server session
pub struct ProxyManager {
    launcher: Arc<dyn Launcher>,
    configs: RwLock<BTreeMap<String, ExternalServerConfig>>,
    slots: Mutex<HashMap<String, Slot>>,
    next_attempt: AtomicU64,
}

impl ProxyManager {
    pub fn new(launcher: Arc<dyn Launcher>) -> Self {
        Self {
            launcher,
            configs: RwLock::new(BTreeMap::new()),
            slots: Mutex::new(HashMap::new()),
            next_attempt: AtomicU64::new(1),
        }
    }

    /// Replace the known server configs
    pub async fn set_configs(&self, configs: BTreeMap<String, ExternalServerConfig>) {
        *self.configs.write().await = configs;
    }

    /// Re-read server configs through `source`; returns how many are configured.
    ///
    /// Live sessions are left alone; they pick up new configs after a
    /// disconnect.
    pub async fn reload_configs<F>(&self, source: F) -> Result<usize>
    where
        F: FnOnce() -> Result<BTreeMap<String, ExternalServerConfig>>,
    {
        let configs = source()?;
        let count = configs.len();
        self.set_configs(configs).await;
        info!(servers = count, "External server configs reloaded");
        Ok(count)
    }

    /// Config for one namespace
    pub async fn config(&self, namespace: &str) -> Option<ExternalServerConfig> {
        self.configs.read().await.get(namespace).cloned()
    }

    /// Snapshot of every configured server, sorted by namespace
    pub async fn configured(&self) -> Vec<ExternalServerConfig> {
        self.configs.read().await.values().cloned().collect()
    }

    /// Add or replace one config
    pub async fn insert_config(&self, config: ExternalServerConfig) {
        self.configs
            .write()
            .await
            .insert(config.namespace.clone(), config);
    }

    /// Forget one config, returning it
    pub async fn remove_config(&self, namespace: &str) -> Option<ExternalServerConfig> {
        self.configs.write().await.remove(namespace)
    }

    pub async fn state(&self, namespace: &str) -> ConnectionState {
        match self.slots.lock().await.get(namespace) {
            Some(Slot::Connecting { .. }) => ConnectionState::Connecting,
            Some(Slot::Connected(session)) if session.is_alive() => ConnectionState::Connected,
            _ => ConnectionState::Absent,
        }
    }

    /// Live session for `namespace`, launching it if needed.
    ///
    /// # Errors
    ///
    /// `Connection` for an unknown namespace or a failed launch. Failures
    /// are not remembered.
    pub async fn connect(&self, namespace: &str) -> Result<Arc<dyn RemoteSession>> {
        let mut stale = None;
        let (attempt_id, attempt) = {
            let mut slots = self.slots.lock().await;
            let in_flight = match slots.get(namespace) {
                Some(Slot::Connected(session)) if session.is_alive() => {
                    return Ok(Arc::clone(session));
                }
                Some(Slot::Connected(session)) => {
                    warn!(namespace = %namespace, "MCP server exited, relaunching");
                    stale = Some(Arc::clone(session));
                    None
                }
                Some(Slot::Connecting {
                    attempt_id,
                    attempt,
                }) => Some((*attempt_id, attempt.clone())),
                None => None,
            };

            match in_flight {
                Some(joined) => joined,
                None => {
                    let Some(config) = self.config(namespace).await else {
                        slots.remove(namespace);
                        return Err(ToolsmithError::Connection(format!(
                            "No MCP server configured for namespace '{}'",
                            namespace
                        )));
                    };
                    let launcher = Arc::clone(&self.launcher);
                    let attempt = async move { launcher.launch(&config).await.map_err(Arc::new) }
                        .boxed()
                        .shared();
                    let attempt_id = self.next_attempt.fetch_add(1, Ordering::Relaxed);
                    slots.insert(
                        namespace.to_string(),
                        Slot::Connecting {
                            attempt_id,
                            attempt: attempt.clone(),
                        },
                    );
                    (attempt_id, attempt)
                }
            }
        };

        if let Some(session) = stale {
            session.shutdown().await;
        }

        let outcome = attempt.await;

        let mut slots = self.slots.lock().await;
        let owns_slot = matches!(
            slots.get(namespace),
            Some(Slot::Connecting { attempt_id: current, .. }) if *current == attempt_id
        );
        match outcome {
            Ok(session) => {
                if owns_slot {
                    info!(namespace = %namespace, tools = session.tools().len(), "Connected to MCP server");
                    slots.insert(namespace.to_string(), Slot::Connected(Arc::clone(&session)));
                    return Ok(session);
                }
                if let Some(Slot::Connected(current)) = slots.get(namespace) {
                    if Arc::ptr_eq(current, &session) {
                        return Ok(session);
                    }
                }
                drop(slots);
                // Disconnected while the attempt was running
                session.shutdown().await;
                Err(ToolsmithError::Connection(format!(
                    "Connection to '{}' was closed while connecting",
                    namespace
                )))
            }
            Err(e) => {
                if owns_slot {
                    slots.remove(namespace);
                    warn!(namespace = %namespace, error = %e, "MCP server connection failed");
                }
                Err(ToolsmithError::Connection(e.detail()))
            }
        }
    }

    /// Forward a call, connecting first when needed
    pub async fn call(&self, namespace: &str, tool: &str, arguments: Value) -> Result<String> {
        let session = self.connect(namespace).await?;
        debug!(namespace = %namespace, tool = %tool, "Forwarding tool call");
        session.call_tool(tool, arguments).await
    }

    /// Tear down a session; returns whether one existed
    pub async fn disconnect(&self, namespace: &str) -> bool {
        let slot = self.slots.lock().await.remove(namespace);
        match slot {
            Some(Slot::Connected(session)) => {
                session.shutdown().await;
                info!(namespace = %namespace, "Disconnected from MCP server");
                true
            }
            Some(Slot::Connecting { .. }) => {
                debug!(namespace = %namespace, "Abandoned an in-flight connection");
                false
            }
            None => false,
        }
    }

    /// Tear down every session; returns the namespaces that were connected
    pub async fn disconnect_all(&self) -> Vec<String> {
        let slots: Vec<(String, Slot)> = self.slots.lock().await.drain().collect();
        let mut closed = Vec::new();
        for (namespace, slot) in slots {
            if let Slot::Connected(session) = slot {
                session.shutdown().await;
                closed.push(namespace);
            }
        }
        closed.sort();
        closed
    }

    /// Namespaces with a live session, sorted
    pub async fn connected(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .slots
            .lock()
            .await
            .iter()
            .filter(|(_, slot)| matches!(slot, Slot::Connected(session) if session.is_alive()))
            .map(|(namespace, _)| namespace.clone())
            .collect();
        names.sort();
        names
    }
}
