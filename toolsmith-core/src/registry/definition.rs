//! Tool definition data model

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Module reference prefix that routes a definition to an external server
pub const REMOTE_MODULE_PREFIX: &str = "mcp://";

/// Parameter type tag
///
/// Unrecognised tags are kept verbatim in [`ParamType::Unknown`] so the
/// validator can report them alongside every other problem instead of
/// failing at parse time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ParamType {
    #[default]
    String,
    Number,
    Integer,
    Boolean,
    Object,
    Array,
    Any,
    Unknown(String),
}

impl ParamType {
    /// Wire name of this type
    pub fn as_str(&self) -> &str {
        match self {
            ParamType::String => "string",
            ParamType::Number => "number",
            ParamType::Integer => "integer",
            ParamType::Boolean => "boolean",
            ParamType::Object => "object",
            ParamType::Array => "array",
            ParamType::Any => "any",
            ParamType::Unknown(tag) => tag,
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, ParamType::Unknown(_))
    }

    /// Coarse JSON type check; never coerces.
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            ParamType::String => value.is_string(),
            ParamType::Number => value.is_number(),
            ParamType::Integer => {
                value.is_i64()
                    || value.is_u64()
                    || value.as_f64().is_some_and(|f| f.fract() == 0.0)
            }
            ParamType::Boolean => value.is_boolean(),
            ParamType::Object => value.is_object(),
            ParamType::Array => value.is_array(),
            ParamType::Any => true,
            ParamType::Unknown(_) => false,
        }
    }
}

impl From<String> for ParamType {
    fn from(tag: String) -> Self {
        match tag.as_str() {
            "string" => ParamType::String,
            "number" => ParamType::Number,
            "integer" => ParamType::Integer,
            "boolean" => ParamType::Boolean,
            "object" => ParamType::Object,
            "array" => ParamType::Array,
            "any" => ParamType::Any,
            _ => ParamType::Unknown(tag),
        }
    }
}

impl From<&str> for ParamType {
    fn from(tag: &str) -> Self {
        ParamType::from(tag.to_string())
    }
}

impl From<ParamType> for String {
    fn from(ty: ParamType) -> Self {
        ty.as_str().to_string()
    }
}

impl std::fmt::Display for ParamType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Name of the JSON type a value actually has, for mismatch messages
pub fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "number",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn default_true() -> bool {
    true
}

fn is_empty(s: &str) -> bool {
    s.is_empty()
}

/// A single declared parameter of a tool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolParameter {
    #[serde(default)]
    pub name: String,

    #[serde(rename = "type", default)]
    pub param_type: ParamType,

    #[serde(default, skip_serializing_if = "is_empty")]
    pub description: String,

    #[serde(default = "default_true")]
    pub required: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

impl ToolParameter {
    /// Required parameter
    pub fn required(
        name: impl Into<String>,
        param_type: ParamType,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            param_type,
            description: description.into(),
            required: true,
            default: None,
        }
    }

    /// Optional parameter without a default
    pub fn optional(
        name: impl Into<String>,
        param_type: ParamType,
        description: impl Into<String>,
    ) -> Self {
        Self {
            required: false,
            ..Self::required(name, param_type, description)
        }
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }
}

/// Where a definition's invocations go, decided from its module reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchTarget {
    /// Loaded through the module cache
    Local { module: String, function: String },
    /// Forwarded to an external MCP server
    Remote { namespace: String, tool: String },
}

impl DispatchTarget {
    pub fn label(&self) -> &'static str {
        match self {
            DispatchTarget::Local { .. } => "local",
            DispatchTarget::Remote { .. } => "remote",
        }
    }
}

/// Declarative description of one tool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Dotted `namespace.tool-name`
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub description: String,

    /// Opaque module locator
    #[serde(default)]
    pub module: String,

    /// Symbol within the module
    #[serde(default)]
    pub function: String,

    #[serde(default)]
    pub parameters: Vec<ToolParameter>,
}

impl ToolDefinition {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            module: String::new(),
            function: String::new(),
            parameters: Vec::new(),
        }
    }

    pub fn with_module(mut self, module: impl Into<String>) -> Self {
        self.module = module.into();
        self
    }

    pub fn with_function(mut self, function: impl Into<String>) -> Self {
        self.function = function.into();
        self
    }

    pub fn with_parameter(mut self, parameter: ToolParameter) -> Self {
        self.parameters.push(parameter);
        self
    }

    /// Everything before the first dot
    pub fn namespace(&self) -> &str {
        self.name.split_once('.').map(|(ns, _)| ns).unwrap_or("")
    }

    /// Everything after the first dot
    pub fn tool_name(&self) -> &str {
        self.name
            .split_once('.')
            .map(|(_, tool)| tool)
            .unwrap_or(&self.name)
    }

    /// Tool name as a shell function name: `-` and `.` become `_`
    pub fn function_name(&self) -> String {
        self.tool_name().replace(['-', '.'], "_")
    }

    /// First description line, at most 60 characters
    pub fn short_description(&self) -> String {
        self.description
            .lines()
            .next()
            .unwrap_or("")
            .chars()
            .take(60)
            .collect()
    }

    pub fn parameter(&self, name: &str) -> Option<&ToolParameter> {
        self.parameters.iter().find(|p| p.name == name)
    }

    pub fn is_remote(&self) -> bool {
        self.module.starts_with(REMOTE_MODULE_PREFIX)
    }

    /// Dispatch target derived from the module reference.
    ///
    /// A remote definition with no function reference calls the tool by its
    /// own tool name.
    pub fn dispatch(&self) -> DispatchTarget {
        match self.module.strip_prefix(REMOTE_MODULE_PREFIX) {
            Some(namespace) => DispatchTarget::Remote {
                namespace: namespace.trim_end_matches('/').to_string(),
                tool: if self.function.is_empty() {
                    self.tool_name().to_string()
                } else {
                    self.function.clone()
                },
            },
            None => DispatchTarget::Local {
                module: self.module.clone(),
                function: self.function.clone(),
            },
        }
    }
}

/// Alternate name resolving to a canonical definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolAlias {
    pub alias: String,
    pub target: String,
}

impl ToolAlias {
    pub fn new(alias: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            alias: alias.into(),
            target: target.into(),
        }
    }
}

/// Partial update applied by `update`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DefinitionPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Vec<ToolParameter>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function: Option<String>,
}

impl DefinitionPatch {
    pub fn is_empty(&self) -> bool {
        self.description.is_none()
            && self.parameters.is_none()
            && self.module.is_none()
            && self.function.is_none()
    }

    /// Names of the fields this patch touches, in declaration order
    pub fn fields(&self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if self.description.is_some() {
            fields.push("description");
        }
        if self.parameters.is_some() {
            fields.push("parameters");
        }
        if self.module.is_some() {
            fields.push("module");
        }
        if self.function.is_some() {
            fields.push("function");
        }
        fields
    }

    /// Apply to a copy of `definition`
    pub fn apply(&self, definition: &ToolDefinition) -> ToolDefinition {
        let mut merged = definition.clone();
        if let Some(description) = &self.description {
            merged.description = description.clone();
        }
        if let Some(parameters) = &self.parameters {
            merged.parameters = parameters.clone();
        }
        if let Some(module) = &self.module {
            merged.module = module.clone();
        }
        if let Some(function) = &self.function {
            merged.function = function.clone();
        }
        merged
    }
}
