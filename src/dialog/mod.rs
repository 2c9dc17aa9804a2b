//! The dialog capability trait
//!
//! Every node in a dialog tree implements [`Dialog`]: leaves (prompts,
//! single-step dialogs) and containers alike. A dialog is identified by a
//! string id unique within the [`DialogSet`](crate::set::DialogSet) that owns
//! it, and may declare a version string that feeds the owning set's
//! structural fingerprint.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::context::DialogContext;
use crate::error::DialogResult;
use crate::events::DialogEvent;

/// Why a dialog method is being invoked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DialogReason {
    /// A new instance of the dialog was pushed onto the stack
    BeginCalled,
    /// The dialog was continued with a new activity
    ContinueCalled,
    /// A child dialog ended and control returned to this dialog
    EndCalled,
    /// The dialog was replaced on the stack
    ReplaceCalled,
    /// The dialog is being cancelled
    CancelCalled,
}

/// Status of the dialog stack after a turn operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DialogTurnStatus {
    /// The stack is empty; nothing was there to run
    Empty,
    /// The active dialog is waiting for further input
    Waiting,
    /// The last dialog on the stack completed
    Complete,
    /// The stack was cancelled
    Cancelled,
}

/// Result of a single stack operation during a turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DialogTurnResult {
    /// Stack status after the operation
    pub status: DialogTurnStatus,

    /// Result produced by a completed dialog, if any
    pub result: Option<Value>,
}

impl DialogTurnResult {
    /// Nothing on the stack
    pub fn empty() -> Self {
        Self {
            status: DialogTurnStatus::Empty,
            result: None,
        }
    }

    /// The active dialog is waiting for the next activity
    pub fn waiting() -> Self {
        Self {
            status: DialogTurnStatus::Waiting,
            result: None,
        }
    }

    /// The stack completed with an optional result
    pub fn complete(result: Option<Value>) -> Self {
        Self {
            status: DialogTurnStatus::Complete,
            result,
        }
    }

    /// The stack was cancelled
    pub fn cancelled() -> Self {
        Self {
            status: DialogTurnStatus::Cancelled,
            result: None,
        }
    }
}

/// Capability set implemented by every node in a dialog tree
#[async_trait]
pub trait Dialog: Send + Sync {
    /// Id of this dialog, unique within its owning set
    fn id(&self) -> &str;

    /// Declared version of this dialog's logic
    ///
    /// Contributes to the owning set's structural fingerprint. Containers
    /// normally leave this unset so that internal changes surface through
    /// their own fingerprint instead of the parent's.
    fn version(&self) -> Option<&str> {
        None
    }

    /// Called when a new instance of the dialog is pushed onto the stack
    async fn begin(
        &self,
        dc: &mut DialogContext<'_>,
        options: Option<Value>,
    ) -> DialogResult<DialogTurnResult>;

    /// Called when the dialog is the active dialog and a new activity arrived
    ///
    /// The default treats the dialog as still waiting; multi-turn dialogs
    /// override this to consume the activity.
    async fn continue_dialog(&self, dc: &mut DialogContext<'_>) -> DialogResult<DialogTurnResult> {
        let _ = dc;
        Ok(DialogTurnResult::waiting())
    }

    /// Called when a child dialog ended and control returns to this dialog
    ///
    /// The default ends this dialog as well, cascading the child's result up
    /// the stack.
    async fn resume(
        &self,
        dc: &mut DialogContext<'_>,
        reason: DialogReason,
        result: Option<Value>,
    ) -> DialogResult<DialogTurnResult> {
        let _ = reason;
        dc.end_dialog(result).await
    }

    /// Called when an event was raised via [`DialogContext::emit_event`]
    ///
    /// Returns `true` to claim the event and stop it bubbling. The default
    /// leaves every event unhandled.
    async fn on_dialog_event(
        &self,
        dc: &mut DialogContext<'_>,
        event: &DialogEvent,
    ) -> DialogResult<bool> {
        let _ = (dc, event);
        Ok(false)
    }
}
