use std::sync::Arc;

use thiserror::Error;

/// Error surfaced to the callers coalesced into a debounce session.
#[derive(Debug, Clone, Error)]
pub enum DebounceError {
    /// The session's cancellation signal fired before the action ran.
    #[error("debounce session cancelled")]
    Cancelled,
    /// The wrapped action ran and failed. Every caller of the session
    /// shares the same underlying error.
    #[error("debounced action failed: {0}")]
    Action(Arc<anyhow::Error>),
}
