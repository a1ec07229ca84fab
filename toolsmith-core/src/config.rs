//! Configuration types for toolsmith

use crate::error::{Result, ToolsmithError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Name of the definition directory looked up relative to the working directory
pub const TOOL_DEFS_DIR: &str = "tool_defs";

/// Default configuration file name
pub const CONFIG_FILE: &str = "toolsmith.toml";

/// Main configuration for the toolsmith runtime
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ToolsmithConfig {
    /// Explicit definition directory (otherwise discovered)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_defs: Option<PathBuf>,

    /// Root that relative module paths resolve against
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_root: Option<PathBuf>,

    /// Local module loading
    pub modules: ModuleConfig,

    /// External MCP server proxying
    pub proxy: ProxyConfig,

    /// Identity reported by the MCP server
    pub server: ServerConfig,
}

/// Local module loading configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModuleConfig {
    /// Shell used to run script modules
    pub shell: String,

    /// Per-invocation timeout for local callables
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,

    /// Directory (relative to the project root) where stubs are generated
    pub stub_dir: PathBuf,
}

impl Default for ModuleConfig {
    fn default() -> Self {
        Self {
            shell: "sh".to_string(),
            timeout: Duration::from_secs(30),
            stub_dir: PathBuf::from("tools"),
        }
    }
}

/// External server connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Launch plus handshake deadline
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,

    /// Deadline for a single forwarded request
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,

    /// Grace period before a child process is killed on disconnect
    #[serde(with = "humantime_serde")]
    pub shutdown_timeout: Duration,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            request_timeout: Duration::from_secs(120),
            shutdown_timeout: Duration::from_secs(5),
        }
    }
}

/// MCP server identity
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub name: String,
    pub version: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: "toolsmith".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Filesystem locations derived from the configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPaths {
    pub tool_defs: PathBuf,
    pub project_root: PathBuf,
}

impl ToolsmithConfig {
    /// Load configuration from file and environment variables.
    ///
    /// Loads in this order:
    /// 1. Default configuration
    /// 2. `toolsmith.toml` in the working directory
    /// 3. `TOOLSMITH_` environment variables (`__` separates nested keys)
    /// 4. File named by `TOOLSMITH_CONFIG_PATH`
    ///
    /// # Errors
    ///
    /// Returns an error if a configuration file is invalid.
    pub fn load() -> Result<Self> {
        use figment::{
            Figment,
            providers::{Env, Format, Serialized, Toml},
        };

        let mut figment = Figment::from(Serialized::defaults(ToolsmithConfig::default()))
            .merge(Toml::file(CONFIG_FILE))
            .merge(Env::prefixed("TOOLSMITH_").split("__"));

        if let Ok(path) = std::env::var("TOOLSMITH_CONFIG_PATH") {
            figment = figment.merge(Toml::file(path));
        }

        let config: ToolsmithConfig = figment.extract().map_err(|e| {
            ToolsmithError::Configuration(format!("Failed to load configuration: {}", e))
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        use figment::{
            Figment,
            providers::{Format, Serialized, Toml},
        };

        let config: ToolsmithConfig =
            Figment::from(Serialized::defaults(ToolsmithConfig::default()))
                .merge(Toml::file(path.as_ref()))
                .extract()
                .map_err(|e| {
                    ToolsmithError::Configuration(format!(
                        "Failed to load configuration file: {}",
                        e
                    ))
                })?;

        config.validate()?;
        Ok(config)
    }

    /// Point the configuration at an explicit definition directory.
    pub fn with_tool_defs(mut self, path: impl Into<PathBuf>) -> Self {
        self.tool_defs = Some(path.into());
        self
    }

    /// Set the project root explicitly.
    pub fn with_project_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.project_root = Some(path.into());
        self
    }

    /// Find the definition directory and the project root.
    ///
    /// The definition directory is, in order: the configured path,
    /// `./tool_defs`, `<config dir>/toolsmith/tool_defs`. When none exists the
    /// local `./tool_defs` is used so that a first `registry.add` creates it.
    pub fn resolve_paths(&self) -> ResolvedPaths {
        let tool_defs = self
            .tool_defs
            .clone()
            .or_else(|| {
                let local = PathBuf::from(TOOL_DEFS_DIR);
                local.is_dir().then_some(local)
            })
            .or_else(|| {
                dirs::config_dir()
                    .map(|dir| dir.join("toolsmith").join(TOOL_DEFS_DIR))
                    .filter(|p| p.is_dir())
            })
            .unwrap_or_else(|| PathBuf::from(TOOL_DEFS_DIR));

        let project_root = self.project_root.clone().unwrap_or_else(|| {
            match tool_defs.parent() {
                Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
                _ => PathBuf::from("."),
            }
        });

        ResolvedPaths {
            tool_defs,
            project_root,
        }
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    fn validate(&self) -> Result<()> {
        if self.modules.shell.trim().is_empty() {
            return Err(ToolsmithError::Configuration(
                "modules.shell must not be empty".to_string(),
            ));
        }
        if self.modules.timeout.is_zero() {
            return Err(ToolsmithError::Configuration(
                "modules.timeout must be greater than zero".to_string(),
            ));
        }
        if self.proxy.request_timeout.is_zero() || self.proxy.connect_timeout.is_zero() {
            return Err(ToolsmithError::Configuration(
                "proxy timeouts must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
