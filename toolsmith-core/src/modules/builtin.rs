//! Rust-native modules addressed as `builtin:<name>`

use super::BUILTIN_PREFIX;
use super::loader::{LoadedModule, ModuleLoader};
use crate::error::{Result, ToolsmithError};
use crate::tools::ToolHandler;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;

/// A named group of Rust callables
#[derive(Default)]
pub struct BuiltinModule {
    functions: BTreeMap<String, Arc<dyn ToolHandler>>,
}

impl BuiltinModule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_function(mut self, name: impl Into<String>, handler: impl ToolHandler + 'static) -> Self {
        self.functions.insert(name.into(), Arc::new(handler));
        self
    }
}

impl LoadedModule for BuiltinModule {
    fn function(&self, name: &str) -> Option<Arc<dyn ToolHandler>> {
        self.functions.get(name).cloned()
    }

    fn function_names(&self) -> Vec<String> {
        self.functions.keys().cloned().collect()
    }
}

/// Registry of builtin modules
#[derive(Default)]
pub struct BuiltinModules {
    modules: BTreeMap<String, Arc<BuiltinModule>>,
}

impl BuiltinModules {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `module` under `builtin:<name>`
    pub fn register(&mut self, name: impl Into<String>, module: BuiltinModule) {
        self.modules.insert(name.into(), Arc::new(module));
    }

    pub fn with_module(mut self, name: impl Into<String>, module: BuiltinModule) -> Self {
        self.register(name, module);
        self
    }

    /// Module reference for a registered name
    pub fn module_ref(name: &str) -> String {
        format!("{}{}", BUILTIN_PREFIX, name)
    }

    pub fn contains(&self, module_ref: &str) -> bool {
        module_ref
            .strip_prefix(BUILTIN_PREFIX)
            .is_some_and(|name| self.modules.contains_key(name))
    }
}

#[async_trait]
impl ModuleLoader for BuiltinModules {
    async fn load(&self, module_ref: &str) -> Result<Arc<dyn LoadedModule>> {
        let name = module_ref.strip_prefix(BUILTIN_PREFIX).unwrap_or(module_ref);
        match self.modules.get(name) {
            Some(module) => Ok(Arc::clone(module) as Arc<dyn LoadedModule>),
            None => Err(ToolsmithError::ModuleLoad(format!(
                "Builtin module '{}' is not registered",
                name
            ))),
        }
    }
}
