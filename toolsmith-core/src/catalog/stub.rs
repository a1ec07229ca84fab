//! Shell-script stubs for newly added tools

use crate::error::Result;
use crate::registry::ToolDefinition;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Command a stub function body calls until it is implemented
pub const STUB_MARKER: &str = "tool_not_implemented";

/// A stub written (or found) by [`StubGenerator::generate`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StubFile {
    /// Module reference relative to the project root
    pub module_ref: String,
    pub path: PathBuf,
    /// False when the file already existed and was left alone
    pub created: bool,
}

/// Writes `<project_root>/<stub_dir>/<namespace>/<function>.sh`
#[derive(Debug, Clone)]
pub struct StubGenerator {
    project_root: PathBuf,
    stub_dir: PathBuf,
}

impl StubGenerator {
    pub fn new(project_root: impl Into<PathBuf>, stub_dir: impl Into<PathBuf>) -> Self {
        Self {
            project_root: project_root.into(),
            stub_dir: stub_dir.into(),
        }
    }

    /// Module reference a definition's stub lives at
    pub fn module_ref(&self, definition: &ToolDefinition) -> String {
        let relative = self
            .stub_dir
            .join(definition.namespace())
            .join(format!("{}.sh", definition.function_name()));
        relative.to_string_lossy().replace('\\', "/")
    }

    /// Write the stub unless a file is already there.
    pub fn generate(&self, definition: &ToolDefinition) -> Result<StubFile> {
        let module_ref = self.module_ref(definition);
        let path = self.project_root.join(&module_ref);

        if path.exists() {
            debug!(path = %path.display(), "Stub exists, leaving it");
            return Ok(StubFile {
                module_ref,
                path,
                created: false,
            });
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, render(definition))?;
        debug!(tool = %definition.name, path = %path.display(), "Stub written");

        Ok(StubFile {
            module_ref,
            path,
            created: true,
        })
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }
}

fn render(definition: &ToolDefinition) -> String {
    let mut out = String::from("#!/bin/sh\n");
    out.push_str(&format!(
        "# {}: {}\n#\n",
        definition.name,
        definition.short_description()
    ));
    for line in definition.description.lines() {
        if line.trim().is_empty() {
            out.push_str("#\n");
        } else {
            out.push_str(&format!("# {}\n", line));
        }
    }
    out.push_str("#\n# Arguments arrive as TOOL_ARG_<NAME> variables and as JSON on stdin.\n");
    if definition.parameters.is_empty() {
        out.push_str("#   (no parameters)\n");
    }
    for param in &definition.parameters {
        let requirement = if param.required { "required" } else { "optional" };
        out.push_str(&format!(
            "#   {} ({}, {}): {}\n",
            env_var_name(&param.name),
            param.param_type,
            requirement,
            param.description
        ));
    }
    out.push_str("#\n# Print the result on stdout. A non-zero exit reports stderr as the error.\n\n");
    out.push_str(&format!(
        "{}() {{\n    # implement below\n    {} \"{}\"\n}}\n",
        definition.function_name(),
        STUB_MARKER,
        definition.name
    ));
    out
}

/// Environment variable a parameter is bound to
pub(crate) fn env_var_name(param: &str) -> String {
    format!("TOOL_ARG_{}", param.to_uppercase().replace('-', "_"))
}
