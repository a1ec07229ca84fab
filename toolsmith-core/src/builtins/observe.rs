//! `observe.*`: structured logs, call traces and state checkpoints on disk
//!
//! Relative paths resolve against the project root.

use super::{builtin, object, opt_str, optional, required, str_arg, structured};
use crate::modules::BuiltinModule;
use crate::registry::{ParamType, ToolDefinition};
use crate::tools::{ToolContext, ToolError, ToolHandler};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value, json};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;

pub(super) fn module() -> BuiltinModule {
    BuiltinModule::new()
        .with_function("log", LogTool)
        .with_function("trace_call", TraceCallTool::default())
        .with_function("session", SessionTool)
}

pub(super) fn definitions() -> Vec<ToolDefinition> {
    vec![
        builtin("observe.log", "Append a structured entry to a JSONL log file.")
            .with_parameter(required("file", ParamType::String, "Log file path"))
            .with_parameter(required("category", ParamType::String, "Entry category, e.g. 'decision'"))
            .with_parameter(required("message", ParamType::String, "Log message"))
            .with_parameter(optional("metadata", ParamType::Any, "Extra structured data")),
        builtin(
            "observe.trace-call",
            "Record the start or end of a traced call.\n\nA start returns the trace_id to pass to the matching end.",
        )
        .with_parameter(required("file", ParamType::String, "Trace file path"))
        .with_parameter(required("tool_name", ParamType::String, "Name of the traced call"))
        .with_parameter(required("phase", ParamType::String, "'start' or 'end'"))
        .with_parameter(optional("data", ParamType::Any, "Params on start, result on end"))
        .with_parameter(optional("trace_id", ParamType::String, "Trace id from the start phase")),
        builtin("observe.session", "Save a named state checkpoint as a JSON file.")
            .with_parameter(required("checkpoint_dir", ParamType::String, "Directory for checkpoints"))
            .with_parameter(required("checkpoint_name", ParamType::String, "Checkpoint name"))
            .with_parameter(required("state", ParamType::Any, "State to save")),
    ]
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn resolve(ctx: &ToolContext, file: &str) -> Result<PathBuf, ToolError> {
    let path = Path::new(file);
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    Ok(ctx.runtime()?.paths().project_root.join(path))
}

fn io_error(path: &Path, e: std::io::Error) -> ToolError {
    ToolError::execution(format!("{}: {}", path.display(), e))
}

async fn ensure_parent(path: &Path) -> Result<(), ToolError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| io_error(parent, e))?;
    }
    Ok(())
}

async fn append_line(path: &Path, entry: &Value) -> Result<(), ToolError> {
    ensure_parent(path).await?;
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
        .map_err(|e| io_error(path, e))?;
    let mut line = entry.to_string();
    line.push('\n');
    file.write_all(line.as_bytes())
        .await
        .map_err(|e| io_error(path, e))?;
    file.flush().await.map_err(|e| io_error(path, e))
}

struct LogTool;

#[async_trait]
impl ToolHandler for LogTool {
    async fn handle(&self, args: Value, ctx: &ToolContext) -> Result<Value, ToolError> {
        let path = resolve(ctx, str_arg(&args, "file")?)?;

        let mut entry = Map::new();
        entry.insert("timestamp".into(), json!(timestamp(Utc::now())));
        entry.insert("category".into(), json!(str_arg(&args, "category")?));
        entry.insert("message".into(), json!(str_arg(&args, "message")?));
        if let Some(metadata) = object(&args)?.get("metadata") {
            entry.insert("metadata".into(), structured(metadata));
        }
        append_line(&path, &Value::Object(entry)).await?;

        let contents = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| io_error(&path, e))?;
        let entry_count = contents.lines().filter(|l| !l.trim().is_empty()).count();

        Ok(json!({
            "logged": true,
            "file": path.display().to_string(),
            "entry_count": entry_count,
        }))
    }
}

/// Start times of traces that have not ended yet
#[derive(Default)]
struct TraceCallTool {
    open: Mutex<HashMap<String, DateTime<Utc>>>,
}

#[async_trait]
impl ToolHandler for TraceCallTool {
    async fn handle(&self, args: Value, ctx: &ToolContext) -> Result<Value, ToolError> {
        let path = resolve(ctx, str_arg(&args, "file")?)?;
        let tool = str_arg(&args, "tool_name")?;
        let phase = str_arg(&args, "phase")?;
        let data = object(&args)?.get("data").map(structured);
        let now = Utc::now();

        match phase {
            "start" => {
                let trace_id = match opt_str(&args, "trace_id") {
                    Some(id) => id.to_string(),
                    None => uuid::Uuid::new_v4().simple().to_string()[..8].to_string(),
                };
                self.open.lock().await.insert(trace_id.clone(), now);

                let mut entry = json!({
                    "timestamp": timestamp(now),
                    "trace_id": trace_id,
                    "tool": tool,
                    "phase": "start",
                });
                if let Some(params) = data {
                    entry["params"] = params;
                }
                append_line(&path, &entry).await?;
                debug!(trace_id = %trace_id, tool = %tool, "Trace started");

                Ok(json!({ "trace_id": trace_id, "phase": "start" }))
            }
            "end" => {
                let trace_id = opt_str(&args, "trace_id").ok_or_else(|| {
                    ToolError::execution("trace_id is required for phase 'end'")
                })?;
                let duration_ms = self
                    .open
                    .lock()
                    .await
                    .remove(trace_id)
                    .map(|started| (now - started).num_milliseconds());

                let mut entry = json!({
                    "timestamp": timestamp(now),
                    "trace_id": trace_id,
                    "tool": tool,
                    "phase": "end",
                    "duration_ms": duration_ms,
                });
                if let Some(result) = data {
                    entry["result"] = result;
                }
                append_line(&path, &entry).await?;

                Ok(json!({
                    "trace_id": trace_id,
                    "phase": "end",
                    "duration_ms": duration_ms,
                }))
            }
            other => Err(ToolError::execution(format!(
                "Invalid phase: {}. Use 'start' or 'end'.",
                other
            ))),
        }
    }
}

fn safe_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

struct SessionTool;

#[async_trait]
impl ToolHandler for SessionTool {
    async fn handle(&self, args: Value, ctx: &ToolContext) -> Result<Value, ToolError> {
        let dir = resolve(ctx, str_arg(&args, "checkpoint_dir")?)?;
        let name = str_arg(&args, "checkpoint_name")?;
        let state = object(&args)?
            .get("state")
            .map(structured)
            .unwrap_or(Value::Null);

        let now = Utc::now();
        let path = dir.join(format!(
            "{}_{}.json",
            now.format("%Y%m%d_%H%M%S"),
            safe_name(name)
        ));
        let checkpoint = json!({
            "checkpoint": name,
            "timestamp": timestamp(now),
            "state": state,
        });
        let body = serde_json::to_string_pretty(&checkpoint)
            .map_err(|e| ToolError::internal(e.to_string()))?;

        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| io_error(&dir, e))?;
        tokio::fs::write(&path, body)
            .await
            .map_err(|e| io_error(&path, e))?;

        Ok(json!({
            "checkpoint": name,
            "file": path.display().to_string(),
            "timestamp": timestamp(now),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_name() {
        assert_eq!(safe_name("before deploy/v2"), "before_deploy_v2");
        assert_eq!(safe_name("ok-name_1"), "ok-name_1");
    }

    #[test]
    fn test_timestamp_is_utc_rfc3339() {
        let at = DateTime::parse_from_rfc3339("2026-01-02T03:04:05Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(timestamp(at), "2026-01-02T03:04:05.000000Z");
    }
}
