//! Tool definitions, their validation, and the store that holds them
//!
//! The `DefinitionStore` provides:
//! - Admission with duplicate detection and aggregated schema validation
//! - Lookup by name or alias
//! - Namespace-grouped listing
//! - Atomic namespace replacement for tools discovered on external servers
//!
//! # Example
//!
//! ```rust,ignore
//! use toolsmith_core::registry::{DefinitionStore, ParamType, ToolDefinition, ToolParameter};
//!
//! let store = DefinitionStore::new();
//! store
//!     .add(
//!         ToolDefinition::new("git.status", "Show working tree status")
//!             .with_module("tools/git/status.sh")
//!             .with_function("status")
//!             .with_parameter(ToolParameter::required("path", ParamType::String, "Repo path")),
//!     )
//!     .await?;
//!
//! for (namespace, tools) in store.by_namespace().await {
//!     println!("{namespace}: {}", tools.len());
//! }
//! ```

mod definition;
mod schema;
mod store;
mod validate;

pub use definition::{
    DefinitionPatch, DispatchTarget, ParamType, REMOTE_MODULE_PREFIX, ToolAlias, ToolDefinition,
    ToolParameter, json_type_name,
};
pub use schema::{input_schema, parameters_from_schema};
pub use store::{DefinitionStore, NamespaceGroups, NamespaceReplacement};
pub use validate::{ValidationReport, Validator, is_dotted_name};

#[cfg(test)]
mod tests;
