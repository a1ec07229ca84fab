//! Execution engine
//!
//! [`ToolRuntime`] ties the definition store, module cache and proxy manager
//! together. Every call goes through the same pipeline:
//!
//! 1. Look up the definition (aliases resolved)
//! 2. Bind and validate arguments
//! 3. Dispatch locally through the module cache, or remotely through the proxy
//! 4. Wrap the outcome in a [`ToolResultEnvelope`]
//!
//! Failures at any step, panics inside local callables included, come back
//! as error envelopes.

mod args;

pub use args::bind_arguments;

use crate::builtins;
use crate::catalog::{Catalog, StubGenerator};
use crate::config::{ResolvedPaths, ToolsmithConfig};
use crate::error::Result;
use crate::mcp::Implementation;
use crate::modules::{
    BUILTIN_PREFIX, BuiltinModule, DefaultLoader, ModuleCache, ScriptLoader,
};
use crate::proxy::{Launcher, ProxyManager, StdioLauncher};
use crate::registry::{DefinitionStore, DispatchTarget, ValidationReport, Validator};
use crate::tools::{
    ToolContext, ToolError, ToolErrorKind, ToolProvenance, ToolResultEnvelope,
};
use futures::FutureExt;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Shared handle to the whole runtime; cheap to clone
#[derive(Clone)]
pub struct ToolRuntime {
    config: Arc<ToolsmithConfig>,
    paths: Arc<ResolvedPaths>,
    store: Arc<DefinitionStore>,
    modules: Arc<ModuleCache>,
    proxy: Arc<ProxyManager>,
    catalog: Arc<Catalog>,
    stubs: Arc<StubGenerator>,
    source_warnings: Arc<RwLock<Vec<String>>>,
}

/// Builder for [`ToolRuntime`]
pub struct RuntimeBuilder {
    config: ToolsmithConfig,
    launcher: Option<Arc<dyn Launcher>>,
    extra_modules: Vec<(String, BuiltinModule)>,
}

impl RuntimeBuilder {
    /// Use `launcher` for external servers instead of spawning processes
    pub fn launcher(mut self, launcher: Arc<dyn Launcher>) -> Self {
        self.launcher = Some(launcher);
        self
    }

    /// Register an additional Rust module as `builtin:<name>`
    pub fn builtin_module(mut self, name: impl Into<String>, module: BuiltinModule) -> Self {
        self.extra_modules.push((name.into(), module));
        self
    }

    /// Load the definition directory and assemble the runtime.
    ///
    /// Definitions that fail admission are skipped and logged.
    ///
    /// # Errors
    ///
    /// Returns an error if the definition directory cannot be read.
    pub async fn build(self) -> Result<ToolRuntime> {
        let config = self.config;
        let paths = config.resolve_paths();
        let catalog = Catalog::new(&paths.tool_defs);
        let snapshot = catalog.load()?;

        let mut builtin_modules = builtins::modules();
        for (name, module) in self.extra_modules {
            builtin_modules.register(name, module);
        }
        let loader = DefaultLoader::new(
            Arc::new(builtin_modules),
            ScriptLoader::new(&paths.project_root, &config.modules.shell),
        );

        let launcher = self.launcher.unwrap_or_else(|| {
            Arc::new(StdioLauncher::new(
                config.proxy.clone(),
                Implementation {
                    name: config.server.name.clone(),
                    version: config.server.version.clone(),
                },
            )) as Arc<dyn Launcher>
        });
        let proxy = ProxyManager::new(launcher);
        proxy.set_configs(snapshot.servers).await;

        let store = DefinitionStore::with_validator(
            Validator::new().with_project_root(&paths.project_root),
        );
        for problem in store.seed(builtins::definitions(), []).await {
            warn!(problem = %problem, "Builtin definition rejected");
        }
        for problem in store.seed(snapshot.definitions, snapshot.aliases).await {
            warn!(problem = %problem, "Skipping tool definition");
        }

        let mut source_warnings = snapshot.warnings;
        source_warnings.extend(snapshot.errors);

        info!(
            tool_defs = %paths.tool_defs.display(),
            tools = store.len().await,
            servers = proxy.configured().await.len(),
            "Tool runtime ready"
        );

        Ok(ToolRuntime {
            stubs: Arc::new(StubGenerator::new(
                &paths.project_root,
                &config.modules.stub_dir,
            )),
            config: Arc::new(config),
            paths: Arc::new(paths),
            store: Arc::new(store),
            modules: Arc::new(ModuleCache::new(Arc::new(loader))),
            proxy: Arc::new(proxy),
            catalog: Arc::new(catalog),
            source_warnings: Arc::new(RwLock::new(source_warnings)),
        })
    }
}

impl ToolRuntime {
    pub fn builder(config: ToolsmithConfig) -> RuntimeBuilder {
        RuntimeBuilder {
            config,
            launcher: None,
            extra_modules: Vec::new(),
        }
    }

    pub fn config(&self) -> &ToolsmithConfig {
        &self.config
    }

    pub fn paths(&self) -> &ResolvedPaths {
        &self.paths
    }

    pub fn store(&self) -> &DefinitionStore {
        &self.store
    }

    pub fn modules(&self) -> &ModuleCache {
        &self.modules
    }

    pub fn proxy(&self) -> &ProxyManager {
        &self.proxy
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn stubs(&self) -> &StubGenerator {
        &self.stubs
    }

    /// Store report plus findings from reading the definition directory
    pub async fn validate(&self) -> ValidationReport {
        let mut report = self.store.validate_all().await;
        for warning in self.source_warnings.read().await.iter() {
            report.warning(warning.clone());
        }
        report
    }

    /// Re-read the definition directory's findings (not its definitions)
    pub async fn refresh_source_warnings(&self) -> Result<()> {
        let snapshot = self.catalog.load()?;
        let mut warnings = snapshot.warnings;
        warnings.extend(snapshot.errors);
        *self.source_warnings.write().await = warnings;
        Ok(())
    }

    /// Execute a tool by name or alias
    pub async fn execute(&self, name: &str, args: Value) -> ToolResultEnvelope {
        self.execute_with_context(name, args, &ToolContext::new())
            .await
    }

    /// Execute with a caller-supplied context (trace id, cancellation, depth)
    pub async fn execute_with_context(
        &self,
        name: &str,
        args: Value,
        ctx: &ToolContext,
    ) -> ToolResultEnvelope {
        let started_at = chrono::Utc::now();
        let trace_id = ctx
            .trace_id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let mut provenance =
            ToolProvenance::new(name, args_hash(&args)).with_trace_id(&trace_id);

        let elapsed = || {
            (chrono::Utc::now() - started_at)
                .to_std()
                .unwrap_or_default()
        };

        if ctx.is_cancelled() {
            return ToolResultEnvelope::cancelled(
                "Cancelled before execution",
                provenance.with_duration(elapsed()),
            );
        }

        let Some(definition) = self.store.find(name).await else {
            debug!(tool = %name, "Unknown tool");
            return ToolResultEnvelope::error(
                ToolError::not_found(format!("Tool '{}' not found", name)),
                provenance.with_duration(elapsed()),
            );
        };

        let args = match bind_arguments(&definition, args) {
            Ok(bound) => Value::Object(bound),
            Err(problems) => {
                debug!(tool = %name, problems = problems.len(), "Argument validation failed");
                return ToolResultEnvelope::error(
                    ToolError::validation(problems),
                    provenance.with_duration(elapsed()),
                );
            }
        };

        let target = definition.dispatch();
        provenance = provenance.with_dispatch(target.label());
        let call_ctx = ctx
            .clone()
            .with_trace_id(&trace_id)
            .with_runtime(self.clone());

        let execution = self.dispatch(target, args, &call_ctx);
        let result = match &ctx.cancellation {
            Some(token) => tokio::select! {
                _ = token.cancelled() => {
                    return ToolResultEnvelope::cancelled(
                        "Execution cancelled",
                        provenance.with_duration(elapsed()),
                    );
                }
                result = execution => result,
            },
            None => execution.await,
        };

        let provenance = provenance.with_duration(elapsed());
        match result {
            Ok(value) => {
                debug!(tool = %definition.name, duration_ms = provenance.duration.as_millis() as u64, "Tool succeeded");
                ToolResultEnvelope::success(value, provenance)
            }
            Err(error) => {
                info!(tool = %definition.name, kind = %error.kind, "Tool failed: {}", error.message);
                ToolResultEnvelope::error(error, provenance)
            }
        }
    }

    async fn dispatch(
        &self,
        target: DispatchTarget,
        args: Value,
        ctx: &ToolContext,
    ) -> std::result::Result<Value, ToolError> {
        match target {
            DispatchTarget::Local { module, function } => {
                self.invoke_local(&module, &function, args, ctx).await
            }
            DispatchTarget::Remote { namespace, tool } => self
                .proxy
                .call(&namespace, &tool, args)
                .await
                .map(Value::String)
                .map_err(ToolError::from),
        }
    }

    async fn invoke_local(
        &self,
        module: &str,
        function: &str,
        args: Value,
        ctx: &ToolContext,
    ) -> std::result::Result<Value, ToolError> {
        let handler = self.modules.resolve(module, function).await?;
        let call = AssertUnwindSafe(handler.handle(args, ctx)).catch_unwind();

        // Builtins may legitimately wait on nested calls or server handshakes
        let outcome = if module.starts_with(BUILTIN_PREFIX) {
            call.await
        } else {
            let limit = self.config.modules.timeout;
            match tokio::time::timeout(limit, call).await {
                Ok(outcome) => outcome,
                Err(_) => return Err(ToolError::timeout(limit)),
            }
        };

        outcome.unwrap_or_else(|panic| {
            warn!(module = %module, function = %function, "Tool panicked");
            Err(ToolError::new(
                ToolErrorKind::Execution,
                format!("Tool panicked: {}", panic_message(&*panic)),
            ))
        })
    }

    /// Stop every external server
    pub async fn shutdown(&self) {
        let closed = self.proxy.disconnect_all().await;
        if !closed.is_empty() {
            info!(servers = ?closed, "External servers stopped");
        }
    }
}

fn args_hash(args: &Value) -> String {
    let digest = Sha256::digest(args.to_string().as_bytes());
    format!("{:x}", digest)[..16].to_string()
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
