//! Loader seam

use super::BUILTIN_PREFIX;
use super::builtin::BuiltinModules;
use super::script::ScriptLoader;
use crate::error::Result;
use crate::tools::ToolHandler;
use async_trait::async_trait;
use std::sync::Arc;

/// A loaded module: a set of named callables
pub trait LoadedModule: Send + Sync {
    /// Callable named `name`, if the module defines one
    fn function(&self, name: &str) -> Option<Arc<dyn ToolHandler>>;

    /// Names of every callable, for diagnostics
    fn function_names(&self) -> Vec<String>;

    /// Content digest, when the module is backed by a file
    fn digest(&self) -> Option<&str> {
        None
    }
}

/// Turns a module reference into a loaded module
#[async_trait]
pub trait ModuleLoader: Send + Sync {
    /// Load `module_ref` fresh, bypassing any cache.
    ///
    /// # Errors
    ///
    /// `ModuleLoad` when the module cannot be located or parsed.
    async fn load(&self, module_ref: &str) -> Result<Arc<dyn LoadedModule>>;
}

/// Routes `builtin:` references to Rust modules and everything else to scripts
pub struct DefaultLoader {
    builtins: Arc<BuiltinModules>,
    scripts: ScriptLoader,
}

impl DefaultLoader {
    pub fn new(builtins: Arc<BuiltinModules>, scripts: ScriptLoader) -> Self {
        Self { builtins, scripts }
    }

    pub fn builtins(&self) -> &Arc<BuiltinModules> {
        &self.builtins
    }
}

#[async_trait]
impl ModuleLoader for DefaultLoader {
    async fn load(&self, module_ref: &str) -> Result<Arc<dyn LoadedModule>> {
        if module_ref.starts_with(BUILTIN_PREFIX) {
            self.builtins.load(module_ref).await
        } else {
            self.scripts.load(module_ref).await
        }
    }
}
