//! Structured tool result envelope and error model
//!
//! Every execution, successful or not, produces a [`ToolResultEnvelope`]:
//! - Success/error/cancelled status
//! - A structured [`ToolError`] with a stable kind on failure
//! - Provenance metadata for tracing

use crate::error::ToolsmithError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

/// Current schema version for result envelopes
pub const RESULT_SCHEMA_VERSION: u32 = 1;

/// Structured result envelope for tool execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResultEnvelope {
    /// Schema version for forward compatibility
    pub schema_version: u32,

    /// Result status and payload
    pub result: ToolResult,

    /// Provenance metadata for tracing
    pub provenance: ToolProvenance,
}

impl ToolResultEnvelope {
    /// Create a successful result envelope
    pub fn success(value: Value, provenance: ToolProvenance) -> Self {
        Self {
            schema_version: RESULT_SCHEMA_VERSION,
            result: ToolResult::Success { value },
            provenance,
        }
    }

    /// Create an error result envelope
    pub fn error(error: ToolError, provenance: ToolProvenance) -> Self {
        Self {
            schema_version: RESULT_SCHEMA_VERSION,
            result: ToolResult::Error { error },
            provenance,
        }
    }

    /// Create a cancelled result envelope
    pub fn cancelled(reason: impl Into<String>, provenance: ToolProvenance) -> Self {
        Self {
            schema_version: RESULT_SCHEMA_VERSION,
            result: ToolResult::Cancelled {
                reason: reason.into(),
            },
            provenance,
        }
    }

    /// Check if this result represents success
    pub fn is_success(&self) -> bool {
        matches!(self.result, ToolResult::Success { .. })
    }

    /// Check if this result represents an error
    pub fn is_error(&self) -> bool {
        matches!(self.result, ToolResult::Error { .. })
    }

    /// Check if this result represents cancellation
    pub fn is_cancelled(&self) -> bool {
        matches!(self.result, ToolResult::Cancelled { .. })
    }

    /// Get the value if successful
    pub fn value(&self) -> Option<&Value> {
        match &self.result {
            ToolResult::Success { value } => Some(value),
            _ => None,
        }
    }

    /// Get the error if failed
    pub fn get_error(&self) -> Option<&ToolError> {
        match &self.result {
            ToolResult::Error { error } => Some(error),
            _ => None,
        }
    }

    /// Error kind, if this envelope carries an error
    pub fn error_kind(&self) -> Option<ToolErrorKind> {
        self.get_error().map(|e| e.kind)
    }

    /// Collapse into a plain result, turning cancellation into an error.
    pub fn into_result(self) -> Result<Value, ToolError> {
        match self.result {
            ToolResult::Success { value } => Ok(value),
            ToolResult::Error { error } => Err(error),
            ToolResult::Cancelled { reason } => {
                Err(ToolError::new(ToolErrorKind::Cancelled, reason))
            }
        }
    }
}

/// Tool execution result (success, error, or cancelled)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ToolResult {
    /// Tool executed successfully
    Success {
        /// The result value
        value: Value,
    },

    /// Tool execution failed
    Error {
        /// Structured error information
        error: ToolError,
    },

    /// Tool execution was cancelled
    Cancelled {
        /// Reason for cancellation
        reason: String,
    },
}

/// Structured tool error
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolError {
    /// Error kind
    pub kind: ToolErrorKind,

    /// Human-readable error message
    pub message: String,

    /// Underlying error code (if applicable)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,

    /// Additional context
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Value>,
}

impl ToolError {
    /// Create a new tool error
    pub fn new(kind: ToolErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            code: None,
            context: None,
        }
    }

    /// Add an error code
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    /// Add context
    pub fn with_context(mut self, context: Value) -> Self {
        self.context = Some(context);
        self
    }

    /// Aggregate argument problems into one error.
    ///
    /// The kind is taken from the first problem; every problem is kept in
    /// `context`.
    pub fn validation(errors: Vec<ValidationError>) -> Self {
        let kind = errors
            .first()
            .map(|e| e.kind)
            .unwrap_or(ToolErrorKind::TypeMismatch);
        Self {
            kind,
            message: errors
                .iter()
                .map(|e| e.to_string())
                .collect::<Vec<_>>()
                .join("; "),
            code: Some("VALIDATION_FAILED".to_string()),
            context: Some(serde_json::to_value(&errors).unwrap_or_default()),
        }
    }

    /// Create a timeout error
    pub fn timeout(duration: Duration) -> Self {
        Self::new(
            ToolErrorKind::Timeout,
            format!("Tool execution timed out after {:?}", duration),
        )
        .with_code("TIMEOUT")
    }

    /// Create an execution error
    pub fn execution(message: impl Into<String>) -> Self {
        Self::new(ToolErrorKind::Execution, message)
    }

    /// Create a not-found error
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ToolErrorKind::NotFound, message)
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ToolErrorKind::Internal, message).with_code("INTERNAL_ERROR")
    }
}

impl std::fmt::Display for ToolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)
    }
}

impl std::error::Error for ToolError {}

impl From<ToolsmithError> for ToolError {
    fn from(err: ToolsmithError) -> Self {
        let kind = err.kind();
        let error = ToolError::new(kind, err.detail());
        match err {
            ToolsmithError::InvalidSchema(problems) => error.with_context(Value::from(problems)),
            _ => error,
        }
    }
}

/// Error kind taxonomy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolErrorKind {
    DuplicateName,
    InvalidSchema,
    NotFound,
    ModuleLoad,
    NotImplemented,
    MissingParameter,
    UnknownParameter,
    TypeMismatch,
    Connection,
    RemoteExecution,
    Execution,
    Timeout,
    Cancelled,
    Internal,
}

impl ToolErrorKind {
    /// Stable wire name of this kind
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolErrorKind::DuplicateName => "duplicate_name",
            ToolErrorKind::InvalidSchema => "invalid_schema",
            ToolErrorKind::NotFound => "not_found",
            ToolErrorKind::ModuleLoad => "module_load",
            ToolErrorKind::NotImplemented => "not_implemented",
            ToolErrorKind::MissingParameter => "missing_parameter",
            ToolErrorKind::UnknownParameter => "unknown_parameter",
            ToolErrorKind::TypeMismatch => "type_mismatch",
            ToolErrorKind::Connection => "connection",
            ToolErrorKind::RemoteExecution => "remote_execution",
            ToolErrorKind::Execution => "execution",
            ToolErrorKind::Timeout => "timeout",
            ToolErrorKind::Cancelled => "cancelled",
            ToolErrorKind::Internal => "internal",
        }
    }

    /// Whether the same call may succeed if simply repeated
    pub fn is_retryable(&self) -> bool {
        matches!(self, ToolErrorKind::Timeout | ToolErrorKind::Connection)
    }
}

impl std::fmt::Display for ToolErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validation problem for a specific argument
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationError {
    /// Argument name
    pub field: String,

    /// Error message
    pub message: String,

    /// Problem kind
    pub kind: ToolErrorKind,
}

impl ValidationError {
    /// Create a new validation error
    pub fn new(kind: ToolErrorKind, field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            kind,
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Provenance metadata for tracing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolProvenance {
    /// Tool name as requested
    pub tool_name: String,

    /// Prefix of the sha256 of the serialized arguments
    pub args_hash: String,

    /// Timestamp when execution started
    pub started_at: DateTime<Utc>,

    /// Execution duration
    #[serde(with = "duration_millis")]
    pub duration: Duration,

    /// Request/trace ID for correlation
    pub trace_id: Option<String>,

    /// `local` or `remote`, once the dispatch target is known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dispatch: Option<String>,
}

impl ToolProvenance {
    /// Create new provenance
    pub fn new(tool_name: impl Into<String>, args_hash: impl Into<String>) -> Self {
        Self {
            tool_name: tool_name.into(),
            args_hash: args_hash.into(),
            started_at: Utc::now(),
            duration: Duration::ZERO,
            trace_id: None,
            dispatch: None,
        }
    }

    /// Set duration
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    /// Set trace ID
    pub fn with_trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = Some(trace_id.into());
        self
    }

    /// Record the dispatch target
    pub fn with_dispatch(mut self, dispatch: impl Into<String>) -> Self {
        self.dispatch = Some(dispatch.into());
        self
    }
}

// Serde helper for Duration serialization as milliseconds
mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
