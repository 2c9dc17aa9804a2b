//! Dialog-tree orchestration
//!
//! This crate composes stateful conversational dialogs into a tree, routes
//! runtime events up that tree, and detects when a container's set of child
//! dialogs changed between turns of a long-lived, persisted conversation.
//! It provides:
//! - A polymorphic [`Dialog`] capability implemented by every tree node
//! - [`DialogSet`] registries with structural fingerprinting of membership
//! - Per-turn [`DialogContext`] cursors over the active dialog stack
//! - Event bubbling with short-circuit semantics ([`DialogEvent`])
//! - [`DialogContainer`] orchestration with `versionChanged` detection, so
//!   conversations never silently resume against stale dialog logic
//!
//! Transport, persistence, and telemetry are external collaborators behind
//! the traits in [`turn`] and [`state`]; concrete leaf dialogs live in the
//! host application.

pub mod container;
pub mod context;
pub mod dialog;
pub mod error;
pub mod events;
pub mod runner;
pub mod set;
pub mod state;
pub mod turn;

// Re-export main types
pub use container::{DialogContainer, SequentialContainer};
pub use context::{ContextHandle, ContextStore, DialogContext, DIALOG_STATE_KEY};
pub use dialog::{Dialog, DialogReason, DialogTurnResult, DialogTurnStatus};
pub use error::{DialogError, DialogResult};
pub use events::{DialogEvent, DialogEvents};
pub use runner::run_dialog;
pub use set::DialogSet;
pub use state::{DialogInstance, DialogState, DialogStateStore, MemoryDialogStore};
pub use turn::{
    NullTelemetry, NullTransport, TelemetryClient, TraceSeverity, TurnContext, TurnTransport,
};
