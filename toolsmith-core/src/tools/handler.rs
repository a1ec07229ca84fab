//! Callable seam between the execution engine and tool implementations

use super::result::{ToolError, ToolErrorKind};
use crate::engine::ToolRuntime;
use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

/// Maximum nesting of `registry.execute` calls inside one request
pub const MAX_CALL_DEPTH: usize = 8;

/// Handler trait implemented by every local callable
///
/// `args` is always a JSON object that already passed argument validation,
/// with defaults of absent optional parameters filled in.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Execute and return a plain value
    async fn handle(&self, args: Value, ctx: &ToolContext) -> Result<Value, ToolError>;

    /// True when the callable is a generated placeholder with no body yet
    fn is_stub(&self) -> bool {
        false
    }
}

/// Context handed to a callable for one invocation
#[derive(Clone, Default)]
pub struct ToolContext {
    /// Trace ID for correlation
    pub trace_id: Option<String>,

    /// Cancellation token
    pub cancellation: Option<CancellationToken>,

    /// Nesting level of `registry.execute`
    pub depth: usize,

    runtime: Option<ToolRuntime>,
}

impl std::fmt::Debug for ToolContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolContext")
            .field("trace_id", &self.trace_id)
            .field("depth", &self.depth)
            .field("has_runtime", &self.runtime.is_some())
            .finish()
    }
}

impl ToolContext {
    /// Create a new context
    pub fn new() -> Self {
        Self::default()
    }

    /// Set trace ID
    pub fn with_trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = Some(trace_id.into());
        self
    }

    /// Set cancellation token
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// Attach the runtime so builtins can reach the registry
    pub fn with_runtime(mut self, runtime: ToolRuntime) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// Check if cancellation has been requested
    pub fn is_cancelled(&self) -> bool {
        self.cancellation
            .as_ref()
            .map(|t| t.is_cancelled())
            .unwrap_or(false)
    }

    /// The runtime this call runs under.
    ///
    /// # Errors
    ///
    /// Returns an internal error when the context was built without one.
    pub fn runtime(&self) -> Result<&ToolRuntime, ToolError> {
        self.runtime
            .as_ref()
            .ok_or_else(|| ToolError::internal("tool context has no runtime attached"))
    }

    /// Context for a nested `registry.execute` call.
    ///
    /// # Errors
    ///
    /// Fails once [`MAX_CALL_DEPTH`] is exceeded.
    pub fn nested(&self) -> Result<Self, ToolError> {
        if self.depth >= MAX_CALL_DEPTH {
            return Err(ToolError::new(
                ToolErrorKind::Execution,
                format!("registry.execute nested more than {} levels", MAX_CALL_DEPTH),
            ));
        }
        let mut ctx = self.clone();
        ctx.depth += 1;
        Ok(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nested_depth_limit() {
        let mut ctx = ToolContext::new();
        for _ in 0..MAX_CALL_DEPTH {
            ctx = ctx.nested().unwrap();
        }
        let err = ctx.nested().err().unwrap();
        assert_eq!(err.kind, ToolErrorKind::Execution);
    }

    #[test]
    fn test_missing_runtime_is_internal() {
        let ctx = ToolContext::new();
        assert_eq!(ctx.runtime().err().unwrap().kind, ToolErrorKind::Internal);
    }

    #[test]
    fn test_cancellation_flag() {
        let token = CancellationToken::new();
        let ctx = ToolContext::new().with_cancellation(token.clone());
        assert!(!ctx.is_cancelled());
        token.cancel();
        assert!(ctx.is_cancelled());
    }
}
