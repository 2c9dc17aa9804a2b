//! Error types for dialog orchestration

use thiserror::Error;

/// Result alias used throughout the crate
pub type DialogResult<T> = Result<T, DialogError>;

/// Errors raised by dialog registration, lookup, and turn execution
#[derive(Debug, Error)]
pub enum DialogError {
    /// A dialog with the same id is already registered in the set
    #[error("dialog '{id}' is already registered")]
    DuplicateId { id: String },

    /// A dialog id could not be resolved on the begin/continue path
    #[error("dialog '{id}' was not found")]
    DialogNotFound { id: String },

    /// An operation that requires an active dialog ran against an empty stack
    #[error("no active dialog on the stack")]
    NoActiveDialog,

    /// The turn's cancellation token fired before the operation committed
    #[error("turn was cancelled")]
    TurnCancelled,

    /// Persisted instance state could not be serialized or deserialized
    #[error("invalid dialog state: {0}")]
    State(#[from] serde_json::Error),

    /// Failure reported by a transport, telemetry, or storage collaborator
    #[error(transparent)]
    Collaborator(#[from] anyhow::Error),
}
