//! Callable loading and caching
//!
//! A definition's `module` reference is opaque to the store. The loaders here
//! turn it into something callable:
//!
//! - `builtin:<name>` resolves to a Rust module registered in [`BuiltinModules`]
//! - anything else is a shell script path relative to the project root,
//!   handled by [`ScriptLoader`]
//!
//! [`ModuleCache`] sits in front of a loader and keeps loaded modules until
//! they are explicitly invalidated.

mod builtin;
mod cache;
mod loader;
mod script;

pub use builtin::{BuiltinModule, BuiltinModules};
pub use cache::ModuleCache;
pub use loader::{DefaultLoader, LoadedModule, ModuleLoader};
pub use script::{ScriptLoader, ScriptModule};

/// Module reference prefix for Rust-native modules
pub const BUILTIN_PREFIX: &str = "builtin:";
