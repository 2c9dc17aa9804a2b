//! Dialog contexts
//!
//! A [`DialogContext`] is the runtime cursor over one active path of the
//! dialog tree during a single turn: it pairs a frame in the per-turn
//! [`ContextStore`] arena with the ambient [`TurnContext`]. Each frame holds
//! the [`DialogSet`] it is scoped to, the stack of active
//! [`DialogInstance`] records, and a handle to its parent frame. Parent
//! links are arena indices rather than back-pointers, so event bubbling is a
//! plain upward walk with no cycle risk.

use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::dialog::{Dialog, DialogReason, DialogTurnResult};
use crate::error::{DialogError, DialogResult};
use crate::events::{DialogEvent, DialogEvents};
use crate::set::DialogSet;
use crate::state::{DialogInstance, DialogState};
use crate::turn::TurnContext;

/// Key under which a container persists its child stack inside its own
/// instance state
pub const DIALOG_STATE_KEY: &str = "dialogState";

/// Handle to a frame in the per-turn context arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextHandle(usize);

struct Frame {
    dialogs: Arc<DialogSet>,
    stack: Vec<DialogInstance>,
    parent: Option<ContextHandle>,
}

/// Per-turn arena of dialog context frames
///
/// Created fresh for every turn; frames are appended as containers open
/// child contexts and are never removed, so handles stay valid for the
/// whole turn.
#[derive(Default)]
pub struct ContextStore {
    frames: Vec<Frame>,
}

impl ContextStore {
    /// Create an empty arena
    pub fn new() -> Self {
        Self::default()
    }

    /// Open the root context for a turn
    ///
    /// The root frame is scoped to the conversation's top-level dialog set
    /// and seeded with the persisted stack.
    pub fn root<'t>(
        &'t mut self,
        dialogs: Arc<DialogSet>,
        state: &DialogState,
        turn: &'t TurnContext,
    ) -> DialogContext<'t> {
        let handle = self.push_frame(dialogs, state.stack.clone(), None);
        DialogContext {
            store: self,
            handle,
            turn,
        }
    }

    /// Snapshot the root frame's stack for persistence at end of turn
    pub fn snapshot_root(&self) -> DialogState {
        DialogState {
            stack: self
                .frames
                .first()
                .map(|frame| frame.stack.clone())
                .unwrap_or_default(),
        }
    }

    fn push_frame(
        &mut self,
        dialogs: Arc<DialogSet>,
        stack: Vec<DialogInstance>,
        parent: Option<ContextHandle>,
    ) -> ContextHandle {
        self.frames.push(Frame {
            dialogs,
            stack,
            parent,
        });
        ContextHandle(self.frames.len() - 1)
    }

    /// Resolve a dialog id starting at `handle` and climbing parent frames
    fn find_from(&self, handle: ContextHandle, id: &str) -> Option<Arc<dyn Dialog>> {
        let mut cursor = Some(handle);
        while let Some(h) = cursor {
            let frame = &self.frames[h.0];
            if let Some(dialog) = frame.dialogs.find(id) {
                return Some(dialog);
            }
            cursor = frame.parent;
        }
        None
    }

    /// Deepest frame created under `handle` this turn, or `handle` itself
    fn leaf_descendant(&self, handle: ContextHandle) -> ContextHandle {
        let mut leaf = handle;
        loop {
            match self
                .frames
                .iter()
                .rposition(|frame| frame.parent == Some(leaf))
            {
                Some(index) => leaf = ContextHandle(index),
                None => return leaf,
            }
        }
    }
}

/// Cursor over one active dialog path for the current turn
pub struct DialogContext<'t> {
    store: &'t mut ContextStore,
    handle: ContextHandle,
    turn: &'t TurnContext,
}

impl<'t> DialogContext<'t> {
    /// Handle of this context's frame in the turn arena
    pub fn handle(&self) -> ContextHandle {
        self.handle
    }

    /// Handle of the parent context's frame, if any
    pub fn parent(&self) -> Option<ContextHandle> {
        self.store.frames[self.handle.0].parent
    }

    /// The ambient turn context
    pub fn turn(&self) -> &TurnContext {
        self.turn
    }

    /// The dialog set this context is scoped to
    pub fn dialogs(&self) -> &Arc<DialogSet> {
        &self.store.frames[self.handle.0].dialogs
    }

    /// The stack of active instances for this frame, outermost first
    pub fn stack(&self) -> &[DialogInstance] {
        &self.store.frames[self.handle.0].stack
    }

    /// The innermost active instance, if the stack is non-empty
    pub fn active_dialog(&self) -> Option<&DialogInstance> {
        self.store.frames[self.handle.0].stack.last()
    }

    /// Mutable access to the innermost active instance
    pub fn active_dialog_mut(&mut self) -> Option<&mut DialogInstance> {
        self.store.frames[self.handle.0].stack.last_mut()
    }

    /// Store a fresh structural fingerprint on the active instance
    ///
    /// Returns the previously stored fingerprint so the caller can compare
    /// against it after the write.
    pub fn set_active_version(&mut self, version: String) -> DialogResult<Option<String>> {
        let instance = self.active_dialog_mut().ok_or(DialogError::NoActiveDialog)?;
        Ok(instance.version.replace(version))
    }

    /// Resolve a dialog id against this context's set, climbing parents
    pub fn find_dialog(&self, id: &str) -> Option<Arc<dyn Dialog>> {
        self.store.find_from(self.handle, id)
    }

    /// Push a new instance of `dialog_id` and run its `begin`
    pub async fn begin_dialog(
        &mut self,
        dialog_id: &str,
        options: Option<Value>,
    ) -> DialogResult<DialogTurnResult> {
        self.turn.ensure_active()?;
        let dialog = self
            .find_dialog(dialog_id)
            .ok_or_else(|| DialogError::DialogNotFound {
                id: dialog_id.to_string(),
            })?;
        debug!(dialog = dialog_id, "beginning dialog");
        self.store.frames[self.handle.0]
            .stack
            .push(DialogInstance::new(dialog_id));
        dialog.begin(self, options).await
    }

    /// Continue the active dialog with the turn's activity
    pub async fn continue_dialog(&mut self) -> DialogResult<DialogTurnResult> {
        self.turn.ensure_active()?;
        let Some(instance) = self.active_dialog() else {
            return Ok(DialogTurnResult::empty());
        };
        let id = instance.id.clone();
        let dialog = self
            .find_dialog(&id)
            .ok_or_else(|| DialogError::DialogNotFound { id })?;
        dialog.continue_dialog(self).await
    }

    /// Pop the active instance and resume whatever is underneath it
    pub async fn end_dialog(&mut self, result: Option<Value>) -> DialogResult<DialogTurnResult> {
        self.turn.ensure_active()?;
        let ended = self.store.frames[self.handle.0]
            .stack
            .pop()
            .ok_or(DialogError::NoActiveDialog)?;
        debug!(dialog = %ended.id, "ended dialog");
        match self.active_dialog() {
            Some(instance) => {
                let id = instance.id.clone();
                let dialog = self
                    .find_dialog(&id)
                    .ok_or_else(|| DialogError::DialogNotFound { id })?;
                dialog.resume(self, DialogReason::EndCalled, result).await
            }
            None => Ok(DialogTurnResult::complete(result)),
        }
    }

    /// Pop the active instance and begin `dialog_id` in its place
    pub async fn replace_dialog(
        &mut self,
        dialog_id: &str,
        options: Option<Value>,
    ) -> DialogResult<DialogTurnResult> {
        self.turn.ensure_active()?;
        self.store.frames[self.handle.0].stack.pop();
        self.begin_dialog(dialog_id, options).await
    }

    /// Cancel every instance on this frame's stack, innermost first
    ///
    /// Each instance observes a non-bubbling `cancelDialog` event before it
    /// is popped.
    pub async fn cancel_all_dialogs(&mut self) -> DialogResult<DialogTurnResult> {
        self.turn.ensure_active()?;
        if self.store.frames[self.handle.0].stack.is_empty() {
            return Ok(DialogTurnResult::empty());
        }
        while !self.store.frames[self.handle.0].stack.is_empty() {
            self.turn.ensure_active()?;
            self.emit_event(DialogEvents::CANCEL_DIALOG, None, false, false)
                .await?;
            self.store.frames[self.handle.0].stack.pop();
        }
        Ok(DialogTurnResult::cancelled())
    }

    /// Raise an event at this context and bubble it toward the root
    ///
    /// The event is delivered to the current frame's active dialog; if that
    /// dialog leaves it unhandled and `bubble` is set, it is re-delivered at
    /// the parent frame, stopping at the first handler that claims it.
    /// With `from_leaf`, delivery starts instead at the deepest child frame
    /// opened under this one during the turn.
    pub async fn emit_event(
        &mut self,
        name: &str,
        value: Option<Value>,
        bubble: bool,
        from_leaf: bool,
    ) -> DialogResult<bool> {
        self.turn.ensure_active()?;
        let event = DialogEvent::new(name, value, bubble);
        let start = if from_leaf {
            self.store.leaf_descendant(self.handle)
        } else {
            self.handle
        };

        let mut cursor = Some(start);
        while let Some(handle) = cursor {
            self.turn.ensure_active()?;
            let (active_id, parent) = {
                let frame = &self.store.frames[handle.0];
                (frame.stack.last().map(|i| i.id.clone()), frame.parent)
            };
            if let Some(id) = active_id {
                if let Some(dialog) = self.store.find_from(handle, &id) {
                    let mut dc = DialogContext {
                        store: &mut *self.store,
                        handle,
                        turn: self.turn,
                    };
                    if dialog.on_dialog_event(&mut dc, &event).await? {
                        return Ok(true);
                    }
                }
            }
            if !event.bubble {
                break;
            }
            cursor = parent;
        }
        Ok(false)
    }

    /// Open a child context scoped to `dialogs`
    ///
    /// The child stack is loaded from the active instance's persisted state;
    /// the parent's own stack is never touched. Callers are expected to
    /// write the child stack back with [`DialogContext::save_child_state`]
    /// once the child operation finishes.
    pub fn child_context(&mut self, dialogs: Arc<DialogSet>) -> DialogResult<DialogContext<'_>> {
        self.turn.ensure_active()?;
        let instance = self.active_dialog().ok_or(DialogError::NoActiveDialog)?;
        let stack: Vec<DialogInstance> = match instance.state.get(DIALOG_STATE_KEY) {
            Some(value) => serde_json::from_value(value.clone())?,
            None => Vec::new(),
        };
        let handle = self.store.push_frame(dialogs, stack, Some(self.handle));
        Ok(DialogContext {
            store: &mut *self.store,
            handle,
            turn: self.turn,
        })
    }

    /// Persist a child frame's stack into the active instance's state
    pub fn save_child_state(&mut self, child: ContextHandle) -> DialogResult<()> {
        let stack = self.store.frames[child.0].stack.clone();
        let value = serde_json::to_value(stack)?;
        let instance = self.active_dialog_mut().ok_or(DialogError::NoActiveDialog)?;
        if !instance.state.is_object() {
            instance.state = Value::Object(serde_json::Map::new());
        }
        instance.state[DIALOG_STATE_KEY] = value;
        Ok(())
    }
}

impl std::fmt::Debug for DialogContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DialogContext")
            .field("handle", &self.handle)
            .field("stack", &self.stack().iter().map(|i| &i.id).collect::<Vec<_>>())
            .finish()
    }
}
