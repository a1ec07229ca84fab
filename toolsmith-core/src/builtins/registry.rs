//! `registry.*`: manage definitions from inside an agent session

use super::{builtin, decode, object, opt_str, optional, required, str_arg};
use crate::modules::{BUILTIN_PREFIX, BuiltinModule};
use crate::registry::{DefinitionPatch, ParamType, ToolAlias, ToolDefinition, ToolParameter};
use crate::tools::{ToolContext, ToolError, ToolErrorKind, ToolHandler};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::path::Path;
use tracing::{info, warn};

pub(super) fn module() -> BuiltinModule {
    BuiltinModule::new()
        .with_function("add", AddTool)
        .with_function("remove", RemoveTool)
        .with_function("update", UpdateTool)
        .with_function("list", ListTool)
        .with_function("validate", ValidateTool)
        .with_function("execute", ExecuteTool)
        .with_function("reload", ReloadTool)
        .with_function("alias", AliasTool)
}

pub(super) fn definitions() -> Vec<ToolDefinition> {
    vec![
        builtin(
            "registry.add",
            "Create a new tool: definition file plus an implementation stub.\n\nUse for any repeatable process worth keeping.",
        )
        .with_parameter(required("name", ParamType::String, "Dotted tool name, 'namespace.tool-name'"))
        .with_parameter(required("description", ParamType::String, "What the tool does"))
        .with_parameter(optional(
            "parameters",
            ParamType::Any,
            "Parameter list: [{name, type, description, required, default}]",
        )),
        builtin("registry.remove", "Remove a tool definition. The stub script is kept.")
            .with_parameter(required("name", ParamType::String, "Tool to remove")),
        builtin("registry.update", "Update a tool's description or parameters.")
            .with_parameter(required("name", ParamType::String, "Tool to update"))
            .with_parameter(optional("description", ParamType::String, "New description"))
            .with_parameter(optional("parameters", ParamType::Any, "New parameter list")),
        builtin("registry.list", "List every tool, grouped by namespace."),
        builtin("registry.validate", "Check every definition and report errors and warnings."),
        builtin(
            "registry.execute",
            "Run any registered tool by name, including ones not listed over MCP.",
        )
        .with_parameter(required("name", ParamType::String, "Tool name or alias"))
        .with_parameter(optional("params", ParamType::Any, "Arguments object")),
        builtin(
            "registry.reload",
            "Drop cached modules and re-read external server configs.\n\nUse after editing a tool implementation.",
        ),
        builtin("registry.alias", "Add an alternate name for an existing tool.")
            .with_parameter(required("alias", ParamType::String, "New dotted name"))
            .with_parameter(required("target", ParamType::String, "Existing tool name")),
    ]
}

fn display_relative(path: &Path, root: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .display()
        .to_string()
}

fn ensure_not_builtin(definition: &ToolDefinition, action: &str) -> Result<(), ToolError> {
    if definition.module.starts_with(BUILTIN_PREFIX) {
        return Err(ToolError::new(
            ToolErrorKind::InvalidSchema,
            format!("Builtin tool '{}' cannot be {}", definition.name, action),
        ));
    }
    Ok(())
}

fn parse_parameters(value: Option<&Value>) -> Result<Option<Vec<ToolParameter>>, ToolError> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(value) => decode(value, "parameters", ToolErrorKind::InvalidSchema).map(Some),
    }
}

struct AddTool;

#[async_trait]
impl ToolHandler for AddTool {
    async fn handle(&self, args: Value, ctx: &ToolContext) -> Result<Value, ToolError> {
        let runtime = ctx.runtime()?;
        let name = str_arg(&args, "name")?;
        let description = str_arg(&args, "description")?;
        let parameters = parse_parameters(object(&args)?.get("parameters"))?.unwrap_or_default();

        let mut definition = ToolDefinition::new(name, description);
        definition.parameters = parameters;
        definition.function = definition.function_name();
        definition.module = runtime.stubs().module_ref(&definition);

        runtime.store().add(definition.clone()).await?;

        let saved = match runtime.catalog().save_definition(&definition) {
            Ok(path) => path,
            Err(e) => {
                // Keep store and disk in step
                let _ = runtime.store().remove(name).await;
                return Err(e.into());
            }
        };
        let stub = runtime.stubs().generate(&definition)?;
        info!(tool = %name, stub_created = stub.created, "Tool created");

        let root = runtime.stubs().project_root();
        let stub_note = if stub.created {
            "Implement here"
        } else {
            "Existing file, left as is"
        };
        Ok(Value::String(format!(
            "Created tool: {name}\n\n\
             Files created:\n  \
             {def}  \u{2190} Tool definition\n  \
             {stub}  \u{2190} {stub_note}\n\n\
             Next steps:\n  \
             1. Implement {function}() in {module}\n  \
             2. Call registry.reload to pick up the change\n  \
             3. Run it with registry.execute(name=\"{name}\")\n",
            def = display_relative(&saved, root),
            stub = display_relative(&stub.path, root),
            function = definition.function,
            module = definition.module,
        )))
    }
}

struct RemoveTool;

#[async_trait]
impl ToolHandler for RemoveTool {
    async fn handle(&self, args: Value, ctx: &ToolContext) -> Result<Value, ToolError> {
        let runtime = ctx.runtime()?;
        let name = str_arg(&args, "name")?;

        if let Some(existing) = runtime.store().find(name).await {
            ensure_not_builtin(&existing, "removed")?;
        }
        let aliases: Vec<ToolAlias> = runtime
            .store()
            .aliases()
            .await
            .into_iter()
            .filter(|a| a.target == name)
            .collect();
        let removed = runtime.store().remove(name).await?;

        let remaining = runtime.store().aliases().await;
        let written = runtime
            .catalog()
            .delete_definition(name)
            .and_then(|_| runtime.catalog().save_aliases(&remaining));
        if let Err(e) = written {
            if let Err(resave) = runtime.catalog().save_definition(&removed) {
                warn!(tool = %name, error = %resave, "Could not restore definition file");
            }
            runtime.store().reinstate(removed, &aliases).await;
            return Err(e.into());
        }

        Ok(Value::String(format!(
            "Removed tool: {name}\n\n\
             Note: the stub script was NOT deleted.\n\
             Delete it manually if needed.\n"
        )))
    }
}

struct UpdateTool;

#[async_trait]
impl ToolHandler for UpdateTool {
    async fn handle(&self, args: Value, ctx: &ToolContext) -> Result<Value, ToolError> {
        let runtime = ctx.runtime()?;
        let name = str_arg(&args, "name")?;

        let patch = DefinitionPatch {
            description: opt_str(&args, "description").map(str::to_string),
            parameters: parse_parameters(object(&args)?.get("parameters"))?,
            ..DefinitionPatch::default()
        };

        let existing = runtime.store().find(name).await.ok_or_else(|| {
            ToolError::not_found(format!(
                "Tool '{}' not found. Use registry.add for new tools.",
                name
            ))
        })?;
        ensure_not_builtin(&existing, "updated")?;

        if patch.is_empty() {
            return Ok(Value::String(
                "No fields to update. Provide description or parameters.".to_string(),
            ));
        }

        let updated = runtime.store().update(name, &patch).await?;
        if let Err(e) = runtime.catalog().save_definition(&updated) {
            runtime.store().reinstate(existing, &[]).await;
            return Err(e.into());
        }

        Ok(Value::String(format!(
            "Updated tool: {}\n\n\
             Fields updated: {}\n\n\
             Note: the stub script was NOT modified.\n\
             Update the implementation manually if the interface changed.\n",
            updated.name,
            patch.fields().join(", ")
        )))
    }
}

struct ListTool;

#[async_trait]
impl ToolHandler for ListTool {
    async fn handle(&self, _args: Value, ctx: &ToolContext) -> Result<Value, ToolError> {
        let runtime = ctx.runtime()?;
        let mut lines = vec!["tools:".to_string()];
        for (namespace, definitions) in runtime.store().by_namespace().await {
            lines.push(format!("  {}:", namespace));
            for definition in definitions {
                lines.push(format!(
                    "    {}: {}",
                    definition.tool_name(),
                    definition.short_description()
                ));
            }
        }
        Ok(Value::String(lines.join("\n")))
    }
}

struct ValidateTool;

#[async_trait]
impl ToolHandler for ValidateTool {
    async fn handle(&self, _args: Value, ctx: &ToolContext) -> Result<Value, ToolError> {
        let runtime = ctx.runtime()?;
        if let Err(e) = runtime.refresh_source_warnings().await {
            warn!(error = %e, "Could not re-read definition directory");
        }
        Ok(Value::String(runtime.validate().await.format()))
    }
}

struct ExecuteTool;

#[async_trait]
impl ToolHandler for ExecuteTool {
    async fn handle(&self, args: Value, ctx: &ToolContext) -> Result<Value, ToolError> {
        let runtime = ctx.runtime()?;
        let name = str_arg(&args, "name")?;
        let params = match object(&args)?.get("params") {
            None | Some(Value::Null) => json!({}),
            Some(Value::String(s)) if s.trim().is_empty() => json!({}),
            Some(value) => decode::<Value>(value, "params", ToolErrorKind::TypeMismatch)?,
        };

        let nested = ctx.nested()?;
        runtime
            .execute_with_context(name, params, &nested)
            .await
            .into_result()
    }
}

struct ReloadTool;

#[async_trait]
impl ToolHandler for ReloadTool {
    async fn handle(&self, _args: Value, ctx: &ToolContext) -> Result<Value, ToolError> {
        let runtime = ctx.runtime()?;
        let cleared = runtime.modules().invalidate(None).await;

        let external = match runtime
            .proxy()
            .reload_configs(|| runtime.catalog().servers())
            .await
        {
            Ok(count) => format!("Reloaded configs ({} servers configured)", count),
            Err(e) => format!("Could not reload configs: {}", e.detail()),
        };
        if let Err(e) = runtime.refresh_source_warnings().await {
            warn!(error = %e, "Could not re-read definition directory");
        }

        Ok(Value::String(format!(
            "## Cache Cleared\n\n\
             **Local tools**: Cleared {cleared} modules.\n\n\
             **External servers**: {external}\n\n\
             Next tool calls will use fresh code/configs.\n\n\
             **Note**: External MCP server code changes require `mcp.disconnect` + `mcp.connect`."
        )))
    }
}

struct AliasTool;

#[async_trait]
impl ToolHandler for AliasTool {
    async fn handle(&self, args: Value, ctx: &ToolContext) -> Result<Value, ToolError> {
        let runtime = ctx.runtime()?;
        let alias = str_arg(&args, "alias")?;
        let target = str_arg(&args, "target")?;

        let added = runtime.store().add_alias(alias, target).await?;
        if let Err(e) = runtime
            .catalog()
            .save_aliases(&runtime.store().aliases().await)
        {
            let _ = runtime.store().remove_alias(alias).await;
            return Err(e.into());
        }
        Ok(Value::String(format!(
            "Added alias: {} -> {}",
            added.alias, added.target
        )))
    }
}
