//! Structural validation of tool definitions
//!
//! Validation is exhaustive: every problem of every definition is collected
//! into one [`ValidationReport`] rather than stopping at the first.

use super::definition::{DispatchTarget, ToolDefinition};
use crate::modules::BUILTIN_PREFIX;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;

static DOTTED_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9_][A-Za-z0-9_-]*\.[A-Za-z0-9_][A-Za-z0-9_.-]*$")
        .expect("dotted name pattern is valid")
});

/// True if `name` has the `namespace.tool-name` shape
pub fn is_dotted_name(name: &str) -> bool {
    DOTTED_NAME.is_match(name)
}

/// Aggregated outcome of validating one or more definitions
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub tool_count: usize,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    pub fn new(tool_count: usize) -> Self {
        Self {
            tool_count,
            ..Default::default()
        }
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    pub fn warning(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    /// Fold another report's findings into this one (tool counts are not summed).
    pub fn extend(&mut self, other: ValidationReport) {
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
    }

    /// Human-readable rendering used by `registry.validate` and the CLI
    pub fn format(&self) -> String {
        let mut lines = vec![format!("Validated {} tools", self.tool_count)];

        if !self.errors.is_empty() {
            lines.push(String::new());
            lines.push(format!("Errors ({}):", self.errors.len()));
            lines.extend(self.errors.iter().map(|e| format!("  ✗ {}", e)));
        }

        if !self.warnings.is_empty() {
            lines.push(String::new());
            lines.push(format!("Warnings ({}):", self.warnings.len()));
            lines.extend(self.warnings.iter().map(|w| format!("  ⚠ {}", w)));
        }

        if self.errors.is_empty() && self.warnings.is_empty() {
            lines.push(String::new());
            lines.push("✓ No issues found".to_string());
        }

        lines.join("\n")
    }
}

impl std::fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.format())
    }
}

/// Checks definitions for structural correctness
#[derive(Debug, Clone, Default)]
pub struct Validator {
    project_root: Option<PathBuf>,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also warn about local module files missing under `root`
    pub fn with_project_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.project_root = Some(root.into());
        self
    }

    /// Problems that keep a definition out of the store.
    ///
    /// Covers the dotted-name shape and every parameter: missing name,
    /// unknown type tag, duplicate name, required-with-default.
    pub fn admission_errors(&self, definition: &ToolDefinition) -> Vec<String> {
        let mut errors = Vec::new();
        let label = if definition.name.is_empty() {
            "<unnamed>"
        } else {
            definition.name.as_str()
        };

        if definition.name.is_empty() {
            errors.push("Missing 'name' field".to_string());
        } else if !is_dotted_name(&definition.name) {
            errors.push(format!(
                "{}: Tool name must be 'namespace.tool-name'",
                definition.name
            ));
        }

        let mut seen = HashSet::new();
        for (index, param) in definition.parameters.iter().enumerate() {
            if param.name.is_empty() {
                errors.push(format!("{}: Parameter {} missing 'name' field", label, index));
                continue;
            }
            if !seen.insert(param.name.as_str()) {
                errors.push(format!("{}: Duplicate parameter '{}'", label, param.name));
            }
            if !param.param_type.is_known() {
                errors.push(format!(
                    "{}: Parameter '{}' has unknown type '{}'",
                    label, param.name, param.param_type
                ));
            }
            if param.required && param.default.is_some() {
                errors.push(format!(
                    "{}: Parameter '{}' is required but declares a default",
                    label, param.name
                ));
            }
        }

        errors
    }

    /// Full check of one definition, as reported by `validate_all`
    pub fn check(&self, definition: &ToolDefinition, report: &mut ValidationReport) {
        for error in self.admission_errors(definition) {
            report.error(error);
        }

        if definition.description.trim().is_empty() {
            report.warning(format!("{}: Missing description", definition.name));
        }

        match definition.dispatch() {
            DispatchTarget::Remote { namespace, .. } if namespace.is_empty() => {
                report.error(format!("{}: Remote module has no server name", definition.name));
            }
            DispatchTarget::Remote { .. } => {}
            DispatchTarget::Local { module, function } => {
                if module.is_empty() {
                    report.error(format!("{}: Missing 'module' field", definition.name));
                    return;
                }
                if function.is_empty() {
                    report.error(format!("{}: Missing 'function' field", definition.name));
                }
                if let Some(root) = &self.project_root {
                    if !module.starts_with(BUILTIN_PREFIX) && !root.join(&module).exists() {
                        report.warning(format!(
                            "{}: Module not found: {}",
                            definition.name, module
                        ));
                    }
                }
            }
        }
    }

    /// Validate a set of definitions, including cross-definition uniqueness
    pub fn check_all<'a>(
        &self,
        definitions: impl IntoIterator<Item = &'a ToolDefinition>,
    ) -> ValidationReport {
        let mut report = ValidationReport::default();
        let mut names = HashSet::new();

        for definition in definitions {
            report.tool_count += 1;
            if !definition.name.is_empty() && !names.insert(definition.name.clone()) {
                report.error(format!("{}: Duplicate tool name", definition.name));
            }
            self.check(definition, &mut report);
        }

        report
    }
}
