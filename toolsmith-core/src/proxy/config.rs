//! External MCP server configuration

use crate::error::{Result, ToolsmithError};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

static ENV_TEMPLATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("env template pattern is valid")
});

/// How to launch one external MCP server, stored as `_servers/<namespace>.yaml`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalServerConfig {
    /// Taken from the file name, not stored in the file
    #[serde(skip)]
    pub namespace: String,

    pub command: String,

    #[serde(default)]
    pub args: Vec<String>,

    /// Values may contain `${VAR}` templates, resolved at connect time
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
}

impl ExternalServerConfig {
    pub fn new(namespace: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            command: command.into(),
            args: Vec::new(),
            env: BTreeMap::new(),
        }
    }

    pub fn with_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Command line as one string, for reports
    pub fn command_line(&self) -> String {
        std::iter::once(self.command.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Expand `${VAR}` templates in `env` from the process environment.
    ///
    /// # Errors
    ///
    /// `Connection` naming every variable that is not set.
    pub fn resolve_env(&self) -> Result<BTreeMap<String, String>> {
        self.resolve_env_with(|name| std::env::var(name).ok())
    }

    /// Expand `${VAR}` templates using `lookup`.
    pub fn resolve_env_with(
        &self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<BTreeMap<String, String>> {
        let mut missing = Vec::new();
        let mut resolved = BTreeMap::new();

        for (key, template) in &self.env {
            let value = ENV_TEMPLATE.replace_all(template, |caps: &Captures| {
                let name = &caps[1];
                lookup(name).unwrap_or_else(|| {
                    if !missing.iter().any(|m: &String| m == name) {
                        missing.push(name.to_string());
                    }
                    String::new()
                })
            });
            resolved.insert(key.clone(), value.into_owned());
        }

        if !missing.is_empty() {
            return Err(ToolsmithError::Connection(format!(
                "Missing environment variable(s) for server '{}': {}",
                self.namespace,
                missing.join(", ")
            )));
        }
        Ok(resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yaml_shape() {
        let mut config: ExternalServerConfig = serde_yaml::from_str(
            "command: npx\nargs: ['-y', '@modelcontextprotocol/server-github']\nenv:\n  GITHUB_TOKEN: '${GH_TOKEN}'\n",
        )
        .unwrap();
        config.namespace = "github".into();

        assert_eq!(config.args.len(), 2);
        assert_eq!(
            config.command_line(),
            "npx -y @modelcontextprotocol/server-github"
        );

        let yaml = serde_yaml::to_string(&config).unwrap();
        assert!(!yaml.contains("namespace"));
    }

    #[test]
    fn test_resolve_env_templates() {
        let config = ExternalServerConfig::new("github", "npx")
            .with_env("TOKEN", "${GH_TOKEN}")
            .with_env("URL", "https://${HOST}/api/${HOST}")
            .with_env("PLAIN", "literal");

        let env = config
            .resolve_env_with(|name| match name {
                "GH_TOKEN" => Some("secret".into()),
                "HOST" => Some("example.com".into()),
                _ => None,
            })
            .unwrap();

        assert_eq!(env["TOKEN"], "secret");
        assert_eq!(env["URL"], "https://example.com/api/example.com");
        assert_eq!(env["PLAIN"], "literal");
    }

    #[test]
    fn test_missing_variable_is_connection_error() {
        let config = ExternalServerConfig::new("github", "npx")
            .with_env("A", "${NOPE_ONE}")
            .with_env("B", "${NOPE_TWO}-${NOPE_ONE}");

        let err = config.resolve_env_with(|_| None).unwrap_err();
        match err {
            ToolsmithError::Connection(msg) => {
                assert!(msg.contains("'github'"));
                assert!(msg.ends_with("NOPE_ONE, NOPE_TWO"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
