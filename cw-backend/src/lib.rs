//! Assistant-backend interface for Chatwire.
//!
//! The backend owns model invocation and tool execution; Chatwire only sees
//! the query surface defined here. Tool-permission checks and session-created
//! notices flow back over explicit channels, never callbacks.

mod dev;
mod error;
mod traits;
mod types;

pub use dev::{DevBackend, DevScript, DevToolUse};
pub use error::{BackendError, Result};
pub use traits::AssistantBackend;
pub use types::{
    ClaudeMdSource, ConversationTurn, PermissionMode, QueryHookReceivers, QueryHooks,
    QueryOptions, QueryOutcome, QueryRequest, SessionCreated, ToolPermissionRequest, TurnRole,
};
