//! Tools implemented in Rust and seeded into every runtime
//!
//! | Namespace  | Tools |
//! |------------|-------|
//! | `registry` | add, remove, update, list, validate, execute, reload, alias |
//! | `observe`  | log, trace-call, session |
//! | `mcp`      | add, list, remove, connect, disconnect, inspect |
//!
//! Only the entry points in [`ENTRY_POINTS`] are advertised over MCP; the
//! rest are reached through `registry.execute`.

mod mcp;
mod observe;
mod registry;

use crate::modules::BuiltinModules;
use crate::registry::{ParamType, ToolDefinition, ToolParameter};
use crate::tools::{ToolError, ToolErrorKind};
use serde_json::{Map, Value, json};

/// Tools listed by the MCP server
pub const ENTRY_POINTS: &[&str] = &[
    "registry.add",
    "registry.remove",
    "registry.update",
    "registry.list",
    "registry.validate",
    "registry.execute",
    "registry.reload",
    "observe.log",
    "observe.trace-call",
    "observe.session",
];

/// Namespaces owned by builtins; external servers may not use them
pub const RESERVED_NAMESPACES: &[&str] = &["registry", "observe", "mcp"];

pub fn is_entry_point(name: &str) -> bool {
    ENTRY_POINTS.contains(&name)
}

/// Every builtin module, keyed by namespace
pub fn modules() -> BuiltinModules {
    BuiltinModules::new()
        .with_module("registry", registry::module())
        .with_module("observe", observe::module())
        .with_module("mcp", mcp::module())
}

/// Definitions for every builtin tool
pub fn definitions() -> Vec<ToolDefinition> {
    let mut definitions = registry::definitions();
    definitions.extend(observe::definitions());
    definitions.extend(mcp::definitions());
    definitions
}

fn builtin(name: &str, description: &str) -> ToolDefinition {
    let definition = ToolDefinition::new(name, description);
    let module = BuiltinModules::module_ref(definition.namespace());
    let function = definition.function_name();
    definition.with_module(module).with_function(function)
}

fn required(name: &str, param_type: ParamType, description: &str) -> ToolParameter {
    ToolParameter::required(name, param_type, description)
}

fn optional(name: &str, param_type: ParamType, description: &str) -> ToolParameter {
    ToolParameter::optional(name, param_type, description)
}

/// Bound arguments as a map; the engine always passes an object
fn object(args: &Value) -> Result<&Map<String, Value>, ToolError> {
    args.as_object()
        .ok_or_else(|| ToolError::internal("builtin called without an argument object"))
}

fn str_arg<'a>(args: &'a Value, name: &str) -> Result<&'a str, ToolError> {
    object(args)?
        .get(name)
        .and_then(Value::as_str)
        .ok_or_else(|| {
            ToolError::new(
                ToolErrorKind::MissingParameter,
                format!("{}: Missing required parameter", name),
            )
        })
}

fn opt_str<'a>(args: &'a Value, name: &str) -> Option<&'a str> {
    args.get(name)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}

/// An `any` parameter given either as structured JSON or as a JSON string.
///
/// Strings that do not parse are wrapped as `{"raw": <string>}`.
fn structured(value: &Value) -> Value {
    match value {
        Value::String(text) => {
            serde_json::from_str(text).unwrap_or_else(|_| json!({ "raw": text }))
        }
        other => other.clone(),
    }
}

/// An `any` parameter that must decode to `T`; JSON strings are parsed first.
fn decode<T: serde::de::DeserializeOwned>(
    value: &Value,
    name: &str,
    kind: ToolErrorKind,
) -> Result<T, ToolError> {
    let value = match value {
        Value::String(text) => serde_json::from_str(text).map_err(|e| {
            ToolError::new(kind, format!("Invalid {} JSON: {}", name, e))
        })?,
        other => other.clone(),
    };
    serde_json::from_value(value)
        .map_err(|e| ToolError::new(kind, format!("Invalid {}: {}", name, e)))
}

#[cfg(test)]
mod tests;
