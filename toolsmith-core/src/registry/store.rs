//! In-memory definition store
//!
//! Mutations take the write lock for their whole check-then-commit sequence,
//! so concurrent readers observe either the state before or after a change.

use super::definition::{DefinitionPatch, DispatchTarget, ToolAlias, ToolDefinition};
use super::validate::{ValidationReport, Validator, is_dotted_name};
use crate::error::{Result, ToolsmithError};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

#[derive(Debug, Default)]
struct StoreState {
    definitions: BTreeMap<String, Arc<ToolDefinition>>,
    aliases: BTreeMap<String, String>,
}

impl StoreState {
    fn resolve<'a>(&'a self, name: &'a str) -> Option<&'a str> {
        if self.definitions.contains_key(name) {
            return Some(name);
        }
        self.aliases
            .get(name)
            .map(String::as_str)
            .filter(|target| self.definitions.contains_key(*target))
    }

    fn is_taken(&self, name: &str) -> bool {
        self.definitions.contains_key(name) || self.aliases.contains_key(name)
    }

    fn drop_aliases_of(&mut self, target: &str) -> Vec<String> {
        let dropped: Vec<String> = self
            .aliases
            .iter()
            .filter(|(_, t)| t.as_str() == target)
            .map(|(alias, _)| alias.clone())
            .collect();
        for alias in &dropped {
            self.aliases.remove(alias);
        }
        dropped
    }
}

/// Outcome of [`DefinitionStore::replace_server_tools`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NamespaceReplacement {
    pub removed: usize,
    pub added: usize,
    pub dropped_aliases: Vec<String>,
}

/// Mapping from tool name to definition, plus aliases
#[derive(Debug, Default)]
pub struct DefinitionStore {
    state: RwLock<StoreState>,
    validator: Validator,
}

impl DefinitionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `validator` for admission and reports
    pub fn with_validator(validator: Validator) -> Self {
        Self {
            state: RwLock::new(StoreState::default()),
            validator,
        }
    }

    pub fn validator(&self) -> &Validator {
        &self.validator
    }

    /// Admit a new definition.
    ///
    /// # Errors
    ///
    /// `DuplicateName` if the name is taken by a definition or alias;
    /// `InvalidSchema` carrying every structural problem.
    pub async fn add(&self, definition: ToolDefinition) -> Result<Arc<ToolDefinition>> {
        let problems = self.validator.admission_errors(&definition);
        let mut state = self.state.write().await;

        if state.is_taken(&definition.name) {
            return Err(ToolsmithError::DuplicateName(definition.name));
        }
        if !problems.is_empty() {
            return Err(ToolsmithError::InvalidSchema(problems));
        }

        let definition = Arc::new(definition);
        state
            .definitions
            .insert(definition.name.clone(), Arc::clone(&definition));
        info!(tool = %definition.name, "Tool definition added");
        Ok(definition)
    }

    /// Remove a definition and every alias pointing at it.
    ///
    /// # Errors
    ///
    /// `NotFound` if no definition has this exact name.
    pub async fn remove(&self, name: &str) -> Result<Arc<ToolDefinition>> {
        let mut state = self.state.write().await;
        let removed = state
            .definitions
            .remove(name)
            .ok_or_else(|| ToolsmithError::NotFound(format!("Tool '{}' not found", name)))?;
        let dropped = state.drop_aliases_of(name);
        info!(tool = %name, dropped_aliases = dropped.len(), "Tool definition removed");
        Ok(removed)
    }

    /// Merge `patch` into an existing definition, re-validate, then commit.
    ///
    /// # Errors
    ///
    /// `NotFound` if absent, `InvalidSchema` if the merged definition is
    /// malformed (the stored definition is left untouched).
    pub async fn update(&self, name: &str, patch: &DefinitionPatch) -> Result<Arc<ToolDefinition>> {
        let mut state = self.state.write().await;
        let canonical = state
            .resolve(name)
            .map(str::to_string)
            .ok_or_else(|| ToolsmithError::NotFound(format!("Tool '{}' not found", name)))?;

        let merged = patch.apply(&state.definitions[&canonical]);
        let problems = self.validator.admission_errors(&merged);
        if !problems.is_empty() {
            return Err(ToolsmithError::InvalidSchema(problems));
        }

        let merged = Arc::new(merged);
        state.definitions.insert(canonical.clone(), Arc::clone(&merged));
        info!(tool = %canonical, fields = ?patch.fields(), "Tool definition updated");
        Ok(merged)
    }

    /// Put back a definition and its aliases exactly as they were.
    ///
    /// Undoes a `remove` or `update` whose catalog write failed, so no
    /// admission checks run; the entry was admitted before.
    pub async fn reinstate(&self, definition: Arc<ToolDefinition>, aliases: &[ToolAlias]) {
        let mut state = self.state.write().await;
        for alias in aliases {
            state
                .aliases
                .insert(alias.alias.clone(), alias.target.clone());
        }
        debug!(tool = %definition.name, aliases = aliases.len(), "Tool definition reinstated");
        state
            .definitions
            .insert(definition.name.clone(), definition);
    }

    /// Look up a definition by name or alias
    pub async fn find(&self, name: &str) -> Option<Arc<ToolDefinition>> {
        let state = self.state.read().await;
        state
            .resolve(name)
            .and_then(|canonical| state.definitions.get(canonical))
            .cloned()
    }

    pub async fn exists(&self, name: &str) -> bool {
        self.state.read().await.resolve(name).is_some()
    }

    /// Canonical name for a definition name or alias
    pub async fn canonical_name(&self, name: &str) -> Option<String> {
        self.state.read().await.resolve(name).map(str::to_string)
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.definitions.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.read().await.definitions.is_empty()
    }

    /// Snapshot of every definition, sorted by name
    pub async fn all(&self) -> Vec<Arc<ToolDefinition>> {
        self.state.read().await.definitions.values().cloned().collect()
    }

    /// Definitions grouped by namespace.
    ///
    /// Takes a snapshot under the read lock, then yields groups lazily, sorted
    /// by namespace and, within a group, by tool name.
    pub async fn by_namespace(&self) -> NamespaceGroups {
        let mut definitions = self.all().await;
        definitions.sort_by(|a, b| {
            (a.namespace(), a.tool_name()).cmp(&(b.namespace(), b.tool_name()))
        });
        NamespaceGroups {
            inner: definitions.into_iter().peekable(),
        }
    }

    /// Add an alias.
    ///
    /// # Errors
    ///
    /// `InvalidSchema` for a malformed alias name, `DuplicateName` if the alias
    /// collides with a definition or alias, `NotFound` if the target is absent.
    pub async fn add_alias(&self, alias: &str, target: &str) -> Result<ToolAlias> {
        if !is_dotted_name(alias) {
            return Err(ToolsmithError::InvalidSchema(vec![format!(
                "{}: Alias must be 'namespace.tool-name'",
                alias
            )]));
        }

        let mut state = self.state.write().await;
        if state.is_taken(alias) {
            return Err(ToolsmithError::DuplicateName(alias.to_string()));
        }
        let canonical = state
            .resolve(target)
            .map(str::to_string)
            .ok_or_else(|| ToolsmithError::NotFound(format!("Tool '{}' not found", target)))?;

        state.aliases.insert(alias.to_string(), canonical.clone());
        debug!(alias = %alias, target = %canonical, "Alias added");
        Ok(ToolAlias::new(alias, canonical))
    }

    /// Remove an alias, returning its target
    pub async fn remove_alias(&self, alias: &str) -> Result<String> {
        self.state
            .write()
            .await
            .aliases
            .remove(alias)
            .ok_or_else(|| ToolsmithError::NotFound(format!("Alias '{}' not found", alias)))
    }

    /// Snapshot of every alias, sorted by alias name
    pub async fn aliases(&self) -> Vec<ToolAlias> {
        self.state
            .read()
            .await
            .aliases
            .iter()
            .map(|(alias, target)| ToolAlias::new(alias, target))
            .collect()
    }

    /// Atomically swap the tools imported from external server `namespace`
    /// for `definitions`.
    ///
    /// Only definitions dispatching to that server are replaced; local tools
    /// sharing the namespace stay. Nothing changes unless every new
    /// definition is valid, unique, and dispatches to the server. Aliases to
    /// definitions that disappear are dropped.
    pub async fn replace_server_tools(
        &self,
        namespace: &str,
        definitions: Vec<ToolDefinition>,
    ) -> Result<NamespaceReplacement> {
        let mut problems = Vec::new();
        let mut incoming = HashSet::new();
        for definition in &definitions {
            problems.extend(self.validator.admission_errors(definition));
            if definition.namespace() != namespace {
                problems.push(format!(
                    "{}: Not in namespace '{}'",
                    definition.name, namespace
                ));
            }
            if !served_by(definition, namespace) {
                problems.push(format!(
                    "{}: Not a tool of server '{}'",
                    definition.name, namespace
                ));
            }
            if !incoming.insert(definition.name.as_str()) {
                problems.push(format!("{}: Duplicate tool name", definition.name));
            }
        }

        let mut state = self.state.write().await;
        for definition in &definitions {
            if state.aliases.contains_key(&definition.name) {
                problems.push(format!("{}: Name is taken by an alias", definition.name));
            }
            if let Some(existing) = state.definitions.get(&definition.name)
                && !served_by(existing, namespace)
            {
                problems.push(format!("{}: Name is taken by a local tool", definition.name));
            }
        }
        if !problems.is_empty() {
            return Err(ToolsmithError::InvalidSchema(problems));
        }

        let stale: Vec<String> = state
            .definitions
            .values()
            .filter(|d| d.namespace() == namespace && served_by(d, namespace))
            .map(|d| d.name.clone())
            .collect();
        let mut dropped_aliases = Vec::new();
        for name in &stale {
            state.definitions.remove(name);
            if !incoming.contains(name.as_str()) {
                dropped_aliases.extend(state.drop_aliases_of(name));
            }
        }

        let added = definitions.len();
        for definition in definitions {
            state
                .definitions
                .insert(definition.name.clone(), Arc::new(definition));
        }

        info!(
            namespace = %namespace,
            removed = stale.len(),
            added,
            "Server tools replaced"
        );
        Ok(NamespaceReplacement {
            removed: stale.len(),
            added,
            dropped_aliases,
        })
    }

    /// Bulk-load definitions and aliases at startup.
    ///
    /// Entries that fail admission are skipped; their problems are returned.
    pub async fn seed(
        &self,
        definitions: impl IntoIterator<Item = ToolDefinition>,
        aliases: impl IntoIterator<Item = ToolAlias>,
    ) -> Vec<String> {
        let mut rejected = Vec::new();
        for definition in definitions {
            if let Err(e) = self.add(definition).await {
                rejected.push(e.detail());
            }
        }
        for alias in aliases {
            if let Err(e) = self.add_alias(&alias.alias, &alias.target).await {
                rejected.push(format!("alias {} -> {}: {}", alias.alias, alias.target, e.detail()));
            }
        }
        rejected
    }

    /// Aggregated report over the whole store
    pub async fn validate_all(&self) -> ValidationReport {
        let definitions = self.all().await;
        self.validator.check_all(definitions.iter().map(Arc::as_ref))
    }
}

/// Lazy `(namespace, definitions)` groups produced by [`DefinitionStore::by_namespace`]
#[derive(Debug)]
pub struct NamespaceGroups {
    inner: std::iter::Peekable<std::vec::IntoIter<Arc<ToolDefinition>>>,
}

impl Iterator for NamespaceGroups {
    type Item = (String, Vec<Arc<ToolDefinition>>);

    fn next(&mut self) -> Option<Self::Item> {
        let first = self.inner.next()?;
        let namespace = first.namespace().to_string();
        let mut group = vec![first];
        while let Some(next) = self.inner.next_if(|d| d.namespace() == namespace) {
            group.push(next);
        }
        Some((namespace, group))
    }
}

fn served_by(definition: &ToolDefinition, server: &str) -> bool {
    matches!(definition.dispatch(), DispatchTarget::Remote { namespace, .. } if namespace == server)
}
