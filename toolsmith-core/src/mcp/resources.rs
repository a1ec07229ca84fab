//! MCP resources and prompts
//!
//! Resources are read-only documents; prompts are canned messages the client
//! can insert into a conversation.

use super::protocol::{McpPrompt, McpResource, ResourceContent};
use crate::engine::ToolRuntime;
use async_trait::async_trait;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::warn;

/// URI of the registry summary resource
pub const REGISTRY_URI: &str = "toolsmith://registry";

/// Name of the workflow prompt
pub const WORKFLOW_PROMPT_NAME: &str = "toolsmith-workflow";

/// Trait for providing MCP resources
#[async_trait]
pub trait ResourceProvider: Send + Sync {
    /// List available resources
    async fn list_resources(&self) -> Vec<McpResource>;

    /// Read a resource by URI; `None` when this provider does not own it
    async fn read_resource(&self, uri: &str) -> Option<ResourceContent>;
}

/// Every registered tool as YAML, grouped by namespace
pub struct RegistryResource {
    runtime: ToolRuntime,
}

#[derive(Serialize)]
struct ToolSummary {
    name: String,
    description: String,
}

impl RegistryResource {
    pub fn new(runtime: ToolRuntime) -> Self {
        Self { runtime }
    }

    async fn render(&self) -> String {
        let mut namespaces: BTreeMap<String, Vec<ToolSummary>> = BTreeMap::new();
        for (namespace, definitions) in self.runtime.store().by_namespace().await {
            namespaces.insert(
                namespace,
                definitions
                    .iter()
                    .map(|d| ToolSummary {
                        name: d.tool_name().to_string(),
                        description: d.short_description(),
                    })
                    .collect(),
            );
        }
        serde_yaml::to_string(&namespaces).unwrap_or_else(|e| {
            warn!(error = %e, "Could not render registry summary");
            String::new()
        })
    }
}

#[async_trait]
impl ResourceProvider for RegistryResource {
    async fn list_resources(&self) -> Vec<McpResource> {
        vec![McpResource {
            uri: REGISTRY_URI.to_string(),
            name: "Tool Registry".to_string(),
            description: Some("All available tools organized by namespace".to_string()),
            mime_type: Some("text/yaml".to_string()),
        }]
    }

    async fn read_resource(&self, uri: &str) -> Option<ResourceContent> {
        if uri != REGISTRY_URI {
            return None;
        }
        Some(ResourceContent {
            uri: uri.to_string(),
            mime_type: Some("text/yaml".to_string()),
            text: Some(self.render().await),
        })
    }
}

/// A fixed prompt served by `prompts/get`
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    pub name: String,
    pub description: String,
    pub text: String,
}

impl PromptTemplate {
    pub fn to_mcp(&self) -> McpPrompt {
        McpPrompt {
            name: self.name.clone(),
            description: Some(self.description.clone()),
        }
    }
}

const WORKFLOW_TEXT: &str = "\
I should check what tools are available before attempting this task.
Let me call `registry-list` first.

If a tool exists, I'll use it.
If not and this task is repeatable, I'll create one with `registry-add` first.

Every repeatable process becomes a tool. My job is to think. Tools do the work.";

/// The agent's working loop: look for a tool, create one when the task repeats
pub fn workflow_prompt() -> PromptTemplate {
    PromptTemplate {
        name: WORKFLOW_PROMPT_NAME.to_string(),
        description: "Check tools first, create one if the task is repeatable".to_string(),
        text: WORKFLOW_TEXT.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ToolsmithConfig;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_registry_resource_yaml() {
        let dir = TempDir::new().unwrap();
        let config = ToolsmithConfig::default()
            .with_tool_defs(dir.path().join("tool_defs"))
            .with_project_root(dir.path());
        let runtime = ToolRuntime::builder(config).build().await.unwrap();
        let resource = RegistryResource::new(runtime);

        assert_eq!(resource.list_resources().await[0].uri, REGISTRY_URI);
        assert!(resource.read_resource("toolsmith://other").await.is_none());

        let content = resource.read_resource(REGISTRY_URI).await.unwrap();
        let parsed: serde_yaml::Value = serde_yaml::from_str(content.text.as_deref().unwrap()).unwrap();
        let registry = parsed.get("registry").unwrap().as_sequence().unwrap();
        assert!(registry.iter().any(|t| t.get("name").and_then(|n| n.as_str()) == Some("add")));
    }

    #[test]
    fn test_workflow_prompt_mentions_entry_points() {
        let prompt = workflow_prompt();
        assert!(prompt.text.contains("registry-list"));
        assert!(prompt.text.contains("registry-add"));
        assert_eq!(prompt.to_mcp().name, WORKFLOW_PROMPT_NAME);
    }
}
