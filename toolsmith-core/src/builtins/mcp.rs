//! `mcp.*`: configure external MCP servers and import their tools

use super::{RESERVED_NAMESPACES, builtin, decode, object, opt_str, optional, required, str_arg};
use crate::modules::BuiltinModule;
use crate::proxy::{ExternalServerConfig, ProxyManager};
use crate::registry::{
    ParamType, REMOTE_MODULE_PREFIX, ToolDefinition, is_dotted_name, parameters_from_schema,
};
use crate::tools::{ToolContext, ToolError, ToolErrorKind, ToolHandler};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{info, warn};

pub(super) fn module() -> BuiltinModule {
    BuiltinModule::new()
        .with_function("add", AddServer)
        .with_function("list", ListServers)
        .with_function("remove", RemoveServer)
        .with_function("connect", Connect)
        .with_function("disconnect", Disconnect)
        .with_function("inspect", Inspect)
}

/// Package run through `npx` to inspect a server interactively
const INSPECTOR_PACKAGE: &str = "@modelcontextprotocol/inspector";
const INSPECTOR_URL: &str = "http://localhost:6274";

pub(super) fn definitions() -> Vec<ToolDefinition> {
    vec![
        builtin("mcp.add", "Add an external MCP server. Its tools appear as '<name>.<tool>'.")
            .with_parameter(required("name", ParamType::String, "Namespace for the server's tools"))
            .with_parameter(required("command", ParamType::String, "Executable to launch"))
            .with_parameter(optional("args", ParamType::Any, "Command arguments (list)"))
            .with_parameter(optional(
                "env",
                ParamType::Any,
                "Environment variables; values may use ${VAR}",
            )),
        builtin("mcp.list", "List configured external MCP servers."),
        builtin("mcp.remove", "Remove an external MCP server and its tools.")
            .with_parameter(required("name", ParamType::String, "Server to remove")),
        builtin("mcp.connect", "Start an external MCP server and register its tools.")
            .with_parameter(required("name", ParamType::String, "Server to connect")),
        builtin("mcp.disconnect", "Stop one external MCP server, or all of them.")
            .with_parameter(optional("name", ParamType::String, "Server to stop; all when omitted")),
        builtin(
            "mcp.inspect",
            "Show how to open the MCP Inspector on a server.\n\nWith no arguments, inspects this toolsmith server.",
        )
        .with_parameter(optional("server", ParamType::String, "Configured server to inspect"))
        .with_parameter(optional(
            "command",
            ParamType::String,
            "Command line to inspect instead of a configured server",
        )),
    ]
}

fn config_location(path: &Path, ctx: &ToolContext) -> Result<String, ToolError> {
    let root = &ctx.runtime()?.paths().project_root;
    Ok(path.strip_prefix(root).unwrap_or(path).display().to_string())
}

fn check_server_name(name: &str) -> Result<(), ToolError> {
    let valid = !name.contains('.') && is_dotted_name(&format!("{}.tool", name));
    if !valid {
        return Err(ToolError::new(
            ToolErrorKind::InvalidSchema,
            format!("Invalid server name '{}': use letters, digits, '-' or '_'", name),
        ));
    }
    if RESERVED_NAMESPACES.contains(&name) {
        return Err(ToolError::new(
            ToolErrorKind::InvalidSchema,
            format!("'{}' is reserved for builtin tools", name),
        ));
    }
    Ok(())
}

async fn unknown_server(name: &str, proxy: &ProxyManager) -> ToolError {
    let available: Vec<String> = proxy
        .configured()
        .await
        .into_iter()
        .map(|c| c.namespace)
        .collect();
    let available = if available.is_empty() {
        "none".to_string()
    } else {
        available.join(", ")
    };
    ToolError::not_found(format!(
        "MCP server '{}' not found. Available: {}",
        name, available
    ))
}

struct AddServer;

#[async_trait]
impl ToolHandler for AddServer {
    async fn handle(&self, args: Value, ctx: &ToolContext) -> Result<Value, ToolError> {
        let runtime = ctx.runtime()?;
        let name = str_arg(&args, "name")?;
        let command = str_arg(&args, "command")?;
        check_server_name(name)?;

        let fields = object(&args)?;
        let server_args: Vec<String> = match fields.get("args") {
            None | Some(Value::Null) => Vec::new(),
            Some(value) => decode(value, "args", ToolErrorKind::TypeMismatch)?,
        };
        let env: BTreeMap<String, String> = match fields.get("env") {
            None | Some(Value::Null) => BTreeMap::new(),
            Some(value) => decode(value, "env", ToolErrorKind::TypeMismatch)?,
        };

        if runtime.proxy().config(name).await.is_some()
            || runtime.catalog().server_names()?.iter().any(|n| n == name)
        {
            return Err(ToolError::new(
                ToolErrorKind::DuplicateName,
                format!("MCP server '{}' already exists. Use mcp.remove first.", name),
            ));
        }

        let mut config = ExternalServerConfig::new(name, command).with_args(server_args);
        config.env = env;
        let saved = runtime.catalog().save_server(&config)?;
        runtime.proxy().insert_config(config.clone()).await;
        info!(server = %name, command = %config.command_line(), "MCP server added");

        let mut out = format!(
            "Added MCP server: {}\n\nCommand: {}\n",
            name,
            config.command_line()
        );
        if !config.env.is_empty() {
            let keys: Vec<&str> = config.env.keys().map(String::as_str).collect();
            out.push_str(&format!("Environment: {}\n", keys.join(", ")));
        }
        out.push_str(&format!(
            "\nServer config saved to: {}\nUse mcp.connect to start using it immediately.",
            config_location(&saved, ctx)?
        ));
        Ok(Value::String(out))
    }
}

struct ListServers;

#[async_trait]
impl ToolHandler for ListServers {
    async fn handle(&self, _args: Value, ctx: &ToolContext) -> Result<Value, ToolError> {
        let proxy = ctx.runtime()?.proxy();
        let configs = proxy.configured().await;
        if configs.is_empty() {
            return Ok(Value::String(
                "No external MCP servers configured.\n\nUse mcp.add to add one.".to_string(),
            ));
        }

        let mut lines = vec!["## External MCP Servers".to_string(), String::new()];
        for config in configs {
            lines.push(format!("### {}", config.namespace));
            lines.push(format!("Command: `{}`", config.command_line()));
            if !config.env.is_empty() {
                let keys: Vec<&str> = config.env.keys().map(String::as_str).collect();
                lines.push(format!("Environment: {}", keys.join(", ")));
            }
            lines.push(format!("Status: {}", proxy.state(&config.namespace).await));
            lines.push(String::new());
        }
        Ok(Value::String(lines.join("\n")))
    }
}

struct RemoveServer;

#[async_trait]
impl ToolHandler for RemoveServer {
    async fn handle(&self, args: Value, ctx: &ToolContext) -> Result<Value, ToolError> {
        let runtime = ctx.runtime()?;
        let name = str_arg(&args, "name")?;

        if runtime.proxy().config(name).await.is_none() {
            return Err(unknown_server(name, runtime.proxy()).await);
        }

        runtime.proxy().disconnect(name).await;
        runtime.proxy().remove_config(name).await;
        let path = runtime.catalog().servers_dir().join(format!("{}.yaml", name));
        runtime.catalog().delete_server(name)?;

        // Imported tools go with the server
        let replaced = runtime.store().replace_server_tools(name, Vec::new()).await?;
        if !replaced.dropped_aliases.is_empty() {
            runtime
                .catalog()
                .save_aliases(&runtime.store().aliases().await)?;
        }

        Ok(Value::String(format!(
            "Removed MCP server: {}\n\nServer config deleted from: {}",
            name,
            config_location(&path, ctx)?
        )))
    }
}

struct Connect;

#[async_trait]
impl ToolHandler for Connect {
    async fn handle(&self, args: Value, ctx: &ToolContext) -> Result<Value, ToolError> {
        let runtime = ctx.runtime()?;
        let name = str_arg(&args, "name")?;

        let session = runtime.proxy().connect(name).await?;
        let mut definitions = Vec::new();
        for tool in session.tools() {
            let full_name = format!("{}.{}", name, tool.name);
            if !is_dotted_name(&full_name) {
                warn!(server = %name, tool = %tool.name, "Skipping remote tool with unusable name");
                continue;
            }
            let mut definition = ToolDefinition::new(full_name, tool.description.clone())
                .with_module(format!("{}{}", REMOTE_MODULE_PREFIX, name))
                .with_function(tool.name.clone());
            definition.parameters = parameters_from_schema(&tool.input_schema);
            definitions.push(definition);
        }
        let listed: Vec<(String, String)> = definitions
            .iter()
            .map(|d| (d.tool_name().to_string(), d.description.clone()))
            .collect();
        runtime.store().replace_server_tools(name, definitions).await?;

        if listed.is_empty() {
            return Ok(Value::String(format!(
                "Connected to {}, but no tools discovered.",
                name
            )));
        }

        let mut out = format!(
            "## Connected to {}\n\nDiscovered {} tools:\n\n",
            name,
            listed.len()
        );
        for (tool, description) in &listed {
            let short: String = description.chars().take(60).collect();
            out.push_str(&format!("- `{}`: {}\n", tool, short));
        }
        out.push_str(&format!(
            "\nCall these tools via registry-execute:\n  `registry-execute(name=\"{}.<tool>\", params='{{...}}')`",
            name
        ));
        Ok(Value::String(out))
    }
}

struct Disconnect;

#[async_trait]
impl ToolHandler for Disconnect {
    async fn handle(&self, args: Value, ctx: &ToolContext) -> Result<Value, ToolError> {
        let proxy = ctx.runtime()?.proxy();
        let message = match opt_str(&args, "name") {
            Some(name) => {
                if proxy.disconnect(name).await {
                    format!("Disconnected from {}.", name)
                } else {
                    format!("Server '{}' is not connected.", name)
                }
            }
            None => {
                proxy.disconnect_all().await;
                "Disconnected from all external MCP servers.".to_string()
            }
        };
        Ok(Value::String(message))
    }
}

struct Inspect;

#[async_trait]
impl ToolHandler for Inspect {
    async fn handle(&self, args: Value, ctx: &ToolContext) -> Result<Value, ToolError> {
        let runtime = ctx.runtime()?;

        let (label, target) = match (opt_str(&args, "command"), opt_str(&args, "server")) {
            (Some(command), _) => ("custom".to_string(), command.trim().to_string()),
            (None, Some(server)) => {
                let Some(config) = runtime.proxy().config(server).await else {
                    return Err(unknown_server(server, runtime.proxy()).await);
                };
                let mut target = String::new();
                // Templates stay unexpanded so the shell running the inspector resolves them
                for (key, value) in &config.env {
                    target.push_str(&format!("-e {}=\"{}\" ", key, value));
                }
                target.push_str(&config.command_line());
                (server.to_string(), target)
            }
            (None, None) => {
                let tool_defs = config_location(&runtime.paths().tool_defs, ctx)?;
                (
                    runtime.config().server.name.clone(),
                    format!("toolsmith --tool-defs {} serve", tool_defs),
                )
            }
        };
        if target.is_empty() {
            return Err(ToolError::new(
                ToolErrorKind::MissingParameter,
                "Nothing to inspect: 'command' is empty",
            ));
        }

        let lines = [
            format!("## MCP Inspector for {}", label),
            String::new(),
            "Run this command to start the inspector:".to_string(),
            String::new(),
            "```bash".to_string(),
            format!("npx -y {} {}", INSPECTOR_PACKAGE, target),
            "```".to_string(),
            String::new(),
            format!("The inspector will start at: `{}`", INSPECTOR_URL),
            String::new(),
            "### Available Tabs".to_string(),
            "- **Resources**: Browse and read server resources".to_string(),
            "- **Prompts**: Test prompt templates".to_string(),
            "- **Tools**: Execute tools with custom inputs".to_string(),
            "- **Notifications**: View server logs".to_string(),
        ];
        Ok(Value::String(lines.join("\n")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_names() {
        assert!(check_server_name("github").is_ok());
        assert!(check_server_name("my-server_2").is_ok());
        assert!(check_server_name("a.b").is_err());
        assert!(check_server_name("has space").is_err());
        assert_eq!(
            check_server_name("registry").unwrap_err().kind,
            ToolErrorKind::InvalidSchema
        );
    }
}
