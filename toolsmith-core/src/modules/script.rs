//! Shell-script modules
//!
//! A script module is a file of shell functions. Loading reads the file once
//! and keeps the text; each invocation runs that snapshot, so edits on disk
//! take effect only after the module is invalidated.

use super::loader::{LoadedModule, ModuleLoader};
use crate::catalog::{STUB_MARKER, env_var_name};
use crate::error::{Result, ToolsmithError};
use crate::tools::{ToolContext, ToolError, ToolHandler};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Value, json};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

/// POSIX `name() {` headers only; the bash `function` keyword is not
/// accepted since the configured shell may be a plain `sh`
static FUNCTION_HEADER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^[ \t]*([A-Za-z_][A-Za-z0-9_]*)[ \t]*\([ \t]*\)")
        .expect("function header pattern is valid")
});

/// Defined ahead of every script so a stub that is run anyway fails cleanly
const PRELUDE: &str = "tool_not_implemented() { echo \"$1 not implemented\" >&2; exit 2; }";

/// Loads shell-script modules relative to a project root
#[derive(Debug, Clone)]
pub struct ScriptLoader {
    project_root: PathBuf,
    shell: String,
}

impl ScriptLoader {
    pub fn new(project_root: impl Into<PathBuf>, shell: impl Into<String>) -> Self {
        Self {
            project_root: project_root.into(),
            shell: shell.into(),
        }
    }

    /// Absolute path of a module reference
    pub fn path_for(&self, module_ref: &str) -> PathBuf {
        let path = Path::new(module_ref);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.project_root.join(path)
        }
    }
}

#[async_trait]
impl ModuleLoader for ScriptLoader {
    async fn load(&self, module_ref: &str) -> Result<Arc<dyn LoadedModule>> {
        let path = self.path_for(module_ref);
        let source = tokio::fs::read_to_string(&path).await.map_err(|e| {
            ToolsmithError::ModuleLoad(format!(
                "Cannot load module '{}' ({}): {}",
                module_ref,
                path.display(),
                e
            ))
        })?;

        let module = ScriptModule::parse(module_ref, source, &self.shell, &self.project_root);
        debug!(
            module = %module_ref,
            functions = module.functions.len(),
            digest = %module.digest,
            "Script module loaded"
        );
        Ok(Arc::new(module))
    }
}

/// Snapshot of one script file
#[derive(Debug)]
pub struct ScriptModule {
    digest: String,
    functions: BTreeMap<String, Arc<ScriptFunction>>,
}

impl ScriptModule {
    /// Split `source` into its shell functions
    pub fn parse(module_ref: &str, source: String, shell: &str, working_dir: &Path) -> Self {
        let digest = format!("{:x}", Sha256::digest(source.as_bytes()))[..16].to_string();
        let source: Arc<str> = Arc::from(source);

        let headers: Vec<(String, usize, usize)> = FUNCTION_HEADER
            .captures_iter(&source)
            .filter_map(|caps| {
                let whole = caps.get(0)?;
                Some((caps[1].to_string(), whole.start(), whole.end()))
            })
            .collect();

        let mut functions = BTreeMap::new();
        for (i, (name, _, body_start)) in headers.iter().enumerate() {
            let body_end = headers
                .get(i + 1)
                .map(|(_, start, _)| *start)
                .unwrap_or(source.len());
            let stub = source[*body_start..body_end].contains(STUB_MARKER);
            functions.insert(
                name.clone(),
                Arc::new(ScriptFunction {
                    module_ref: module_ref.to_string(),
                    function: name.clone(),
                    source: Arc::clone(&source),
                    shell: shell.to_string(),
                    working_dir: working_dir.to_path_buf(),
                    stub,
                }),
            );
        }

        Self { digest, functions }
    }
}

impl LoadedModule for ScriptModule {
    fn function(&self, name: &str) -> Option<Arc<dyn ToolHandler>> {
        self.functions
            .get(name)
            .map(|f| Arc::clone(f) as Arc<dyn ToolHandler>)
    }

    fn function_names(&self) -> Vec<String> {
        self.functions.keys().cloned().collect()
    }

    fn digest(&self) -> Option<&str> {
        Some(&self.digest)
    }
}

/// One shell function inside a script snapshot
#[derive(Debug)]
struct ScriptFunction {
    module_ref: String,
    function: String,
    source: Arc<str>,
    shell: String,
    working_dir: PathBuf,
    stub: bool,
}

/// Value of a `TOOL_ARG_*` variable: strings raw, everything else as JSON
fn env_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[async_trait]
impl ToolHandler for ScriptFunction {
    async fn handle(&self, args: Value, ctx: &ToolContext) -> std::result::Result<Value, ToolError> {
        let script = format!("{}\n{}\n{} \"$@\"\n", PRELUDE, self.source, self.function);

        let mut command = Command::new(&self.shell);
        command
            .arg("-c")
            .arg(script)
            .arg(&self.function)
            .current_dir(&self.working_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(trace_id) = &ctx.trace_id {
            command.env("TOOL_TRACE_ID", trace_id);
        }
        if let Some(map) = args.as_object() {
            for (name, value) in map {
                command.env(env_var_name(name), env_value(value));
            }
        }

        let mut child = command.spawn().map_err(|e| {
            ToolError::execution(format!("Failed to start '{}': {}", self.shell, e))
        })?;

        if let Some(mut stdin) = child.stdin.take() {
            let payload = args.to_string();
            tokio::spawn(async move {
                // Scripts that ignore stdin close the pipe early
                if let Err(e) = stdin.write_all(payload.as_bytes()).await {
                    debug!(error = %e, "Script did not read its stdin");
                }
            });
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| ToolError::execution(format!("Failed to run '{}': {}", self.function, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let message = if stderr.is_empty() {
                format!("{} exited with {}", self.function, output.status)
            } else {
                stderr
            };
            warn!(module = %self.module_ref, function = %self.function, "Script failed");
            return Err(ToolError::execution(message).with_context(json!({
                "module": self.module_ref,
                "exit_code": output.status.code(),
            })));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(Value::String(stdout.trim_end().to_string()))
    }

    fn is_stub(&self) -> bool {
        self.stub
    }
}
