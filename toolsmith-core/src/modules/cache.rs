//! Module cache with explicit, generation-based invalidation
//!
//! Every module reference has a stamp made of the global epoch and a
//! per-module generation. A cached entry is served only while its stamp is
//! current. The lock is never held across a load: a load that straddles an
//! invalidation still returns its module to the caller, but the result is
//! not cached, so the next resolve loads again.

use super::loader::{LoadedModule, ModuleLoader};
use crate::error::{Result, ToolsmithError};
use crate::tools::ToolHandler;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

type Stamp = (u64, u64);

struct CachedModule {
    stamp: Stamp,
    module: Arc<dyn LoadedModule>,
}

#[derive(Default)]
struct CacheState {
    epoch: u64,
    generations: HashMap<String, u64>,
    entries: HashMap<String, CachedModule>,
}

impl CacheState {
    fn stamp(&self, module_ref: &str) -> Stamp {
        (
            self.epoch,
            self.generations.get(module_ref).copied().unwrap_or(0),
        )
    }
}

/// Cache from module reference to loaded module
pub struct ModuleCache {
    loader: Arc<dyn ModuleLoader>,
    state: RwLock<CacheState>,
}

impl ModuleCache {
    pub fn new(loader: Arc<dyn ModuleLoader>) -> Self {
        Self {
            loader,
            state: RwLock::new(CacheState::default()),
        }
    }

    /// Callable `function` of `module_ref`, loading the module if needed.
    ///
    /// # Errors
    ///
    /// `ModuleLoad` when the module cannot be loaded or lacks the function;
    /// `NotImplemented` when the function is an unimplemented stub.
    pub async fn resolve(&self, module_ref: &str, function: &str) -> Result<Arc<dyn ToolHandler>> {
        let module = self.module(module_ref).await?;
        let handler = module.function(function).ok_or_else(|| {
            ToolsmithError::ModuleLoad(format!(
                "Function '{}' not found in module '{}'",
                function, module_ref
            ))
        })?;
        if handler.is_stub() {
            return Err(ToolsmithError::NotImplemented(format!(
                "'{}' in module '{}' is a stub. Implement it, then call registry.reload.",
                function, module_ref
            )));
        }
        Ok(handler)
    }

    /// Loaded module for `module_ref`, from cache when current
    pub async fn module(&self, module_ref: &str) -> Result<Arc<dyn LoadedModule>> {
        let stamp = {
            let state = self.state.read().await;
            let stamp = state.stamp(module_ref);
            if let Some(entry) = state.entries.get(module_ref) {
                if entry.stamp == stamp {
                    return Ok(Arc::clone(&entry.module));
                }
            }
            stamp
        };

        let module = self.loader.load(module_ref).await?;

        let mut state = self.state.write().await;
        if state.stamp(module_ref) == stamp {
            state.entries.insert(
                module_ref.to_string(),
                CachedModule {
                    stamp,
                    module: Arc::clone(&module),
                },
            );
            debug!(module = %module_ref, "Module cached");
        } else {
            debug!(module = %module_ref, "Module invalidated during load, not cached");
        }
        Ok(module)
    }

    /// Evict one module, or everything with `None`. Returns the number of
    /// entries evicted.
    pub async fn invalidate(&self, module_ref: Option<&str>) -> usize {
        let mut state = self.state.write().await;
        let evicted = match module_ref {
            Some(module_ref) => {
                *state.generations.entry(module_ref.to_string()).or_insert(0) += 1;
                usize::from(state.entries.remove(module_ref).is_some())
            }
            None => {
                // The new epoch outdates every stamp, so per-module counters can restart
                state.epoch += 1;
                state.generations.clear();
                let count = state.entries.len();
                state.entries.clear();
                count
            }
        };
        debug!(module = ?module_ref, evicted, "Module cache invalidated");
        evicted
    }

    pub async fn is_cached(&self, module_ref: &str) -> bool {
        let state = self.state.read().await;
        state
            .entries
            .get(module_ref)
            .is_some_and(|entry| entry.stamp == state.stamp(module_ref))
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.read().await.entries.is_empty()
    }

    #[cfg(test)]
    async fn tracked_generations(&self) -> usize {
        self.state.read().await.generations.len()
    }
}
