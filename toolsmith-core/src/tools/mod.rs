//! Callable interface and result model
//!
//! Everything the engine hands back to a caller is a [`ToolResultEnvelope`];
//! everything it invokes locally is a [`ToolHandler`].

mod handler;
mod result;

pub use handler::{MAX_CALL_DEPTH, ToolContext, ToolHandler};
pub use result::{
    RESULT_SCHEMA_VERSION, ToolError, ToolErrorKind, ToolProvenance, ToolResult,
    ToolResultEnvelope, ValidationError,
};
