//! Dialog events
//!
//! Events describe something that happened during a turn (a version change,
//! a cancellation, an incoming activity) and travel *up* the dialog tree:
//! delivered to the current context's active dialog first, then re-delivered
//! at each ancestor context until a handler claims them or the root is
//! reached. Events never broadcast to siblings.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Well-known dialog event names
pub struct DialogEvents;

impl DialogEvents {
    /// A new dialog was started
    pub const BEGIN_DIALOG: &'static str = "beginDialog";
    /// The active dialog should re-prompt the user
    pub const REPROMPT_DIALOG: &'static str = "repromptDialog";
    /// A dialog is being cancelled off the stack
    pub const CANCEL_DIALOG: &'static str = "cancelDialog";
    /// An activity arrived from the transport
    pub const ACTIVITY_RECEIVED: &'static str = "activityReceived";
    /// A container's child set changed since the instance last ran
    pub const VERSION_CHANGED: &'static str = "versionChanged";
    /// An error was raised by a dialog
    pub const ERROR: &'static str = "error";
}

/// An immutable description of something that happened during a turn
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DialogEvent {
    /// Event name, one of [`DialogEvents`] or a custom name
    pub name: String,

    /// Opaque payload
    pub value: Option<Value>,

    /// Propagate to the parent context when unhandled at this level
    pub bubble: bool,
}

impl DialogEvent {
    /// Create a new event
    pub fn new(name: impl Into<String>, value: Option<Value>, bubble: bool) -> Self {
        Self {
            name: name.into(),
            value,
            bubble,
        }
    }
}
