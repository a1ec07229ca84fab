//! Error types for toolsmith operations

use crate::tools::ToolErrorKind;

/// Result type for toolsmith operations
pub type Result<T> = std::result::Result<T, ToolsmithError>;

/// Error types for the tool registry and runtime
#[derive(Debug, thiserror::Error)]
pub enum ToolsmithError {
    /// A definition or alias with this name already exists
    #[error("Tool '{0}' already exists")]
    DuplicateName(String),

    /// Definition failed structural validation; carries every problem found
    #[error("Invalid tool definition: {}", .0.join("; "))]
    InvalidSchema(Vec<String>),

    /// Tool, alias, module or server not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Module could not be located or the function is absent
    #[error("Module load error: {0}")]
    ModuleLoad(String),

    /// Function exists but is still an unimplemented stub
    #[error("Not implemented: {0}")]
    NotImplemented(String),

    /// Required argument was not supplied
    #[error("Missing parameter: {0}")]
    MissingParameter(String),

    /// Argument outside the declared schema
    #[error("Unknown parameter: {0}")]
    UnknownParameter(String),

    /// Argument value has the wrong JSON type
    #[error("Type mismatch: {0}")]
    TypeMismatch(String),

    /// External server could not be launched or handshaken
    #[error("Connection error: {0}")]
    Connection(String),

    /// External server reported a failure
    #[error("Remote execution error: {0}")]
    RemoteExecution(String),

    /// Local callable failed
    #[error("Execution error: {0}")]
    Execution(String),

    /// Operation exceeded its deadline
    #[error("Timed out: {0}")]
    Timeout(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Malformed protocol traffic
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML error from the definition source
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl ToolsmithError {
    /// Map this error onto the kind reported in result envelopes.
    pub fn kind(&self) -> ToolErrorKind {
        match self {
            ToolsmithError::DuplicateName(_) => ToolErrorKind::DuplicateName,
            ToolsmithError::InvalidSchema(_) => ToolErrorKind::InvalidSchema,
            ToolsmithError::NotFound(_) => ToolErrorKind::NotFound,
            ToolsmithError::ModuleLoad(_) => ToolErrorKind::ModuleLoad,
            ToolsmithError::NotImplemented(_) => ToolErrorKind::NotImplemented,
            ToolsmithError::MissingParameter(_) => ToolErrorKind::MissingParameter,
            ToolsmithError::UnknownParameter(_) => ToolErrorKind::UnknownParameter,
            ToolsmithError::TypeMismatch(_) => ToolErrorKind::TypeMismatch,
            ToolsmithError::Connection(_) => ToolErrorKind::Connection,
            ToolsmithError::RemoteExecution(_) => ToolErrorKind::RemoteExecution,
            ToolsmithError::Execution(_) | ToolsmithError::Io(_) => ToolErrorKind::Execution,
            ToolsmithError::Timeout(_) => ToolErrorKind::Timeout,
            ToolsmithError::Configuration(_)
            | ToolsmithError::Protocol(_)
            | ToolsmithError::Serialization(_)
            | ToolsmithError::Yaml(_)
            | ToolsmithError::Other(_) => ToolErrorKind::Internal,
        }
    }

    /// Message without the variant prefix, as shown to agents.
    pub fn detail(&self) -> String {
        match self {
            ToolsmithError::DuplicateName(name) => {
                format!("Tool '{}' already exists. Use registry.update to modify.", name)
            }
            ToolsmithError::InvalidSchema(problems) => problems.join("; "),
            ToolsmithError::NotFound(s)
            | ToolsmithError::ModuleLoad(s)
            | ToolsmithError::NotImplemented(s)
            | ToolsmithError::MissingParameter(s)
            | ToolsmithError::UnknownParameter(s)
            | ToolsmithError::TypeMismatch(s)
            | ToolsmithError::Connection(s)
            | ToolsmithError::RemoteExecution(s)
            | ToolsmithError::Execution(s)
            | ToolsmithError::Timeout(s)
            | ToolsmithError::Configuration(s)
            | ToolsmithError::Protocol(s)
            | ToolsmithError::Other(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

impl From<String> for ToolsmithError {
    fn from(s: String) -> Self {
        ToolsmithError::Other(s)
    }
}

impl From<&str> for ToolsmithError {
    fn from(s: &str) -> Self {
        ToolsmithError::Other(s.to_string())
    }
}

impl From<anyhow::Error> for ToolsmithError {
    fn from(err: anyhow::Error) -> Self {
        ToolsmithError::Other(err.to_string())
    }
}
