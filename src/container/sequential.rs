//! Sequential container
//!
//! Runs its child dialogs one at a time in declared order, passing each
//! completed child's result to the next child as its begin options. The
//! current position and the child stack are persisted inside the container's
//! own instance state, so a conversation can park on any step across turns.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use crate::container::DialogContainer;
use crate::context::DialogContext;
use crate::dialog::{Dialog, DialogReason, DialogTurnResult, DialogTurnStatus};
use crate::error::{DialogError, DialogResult};
use crate::events::DialogEvent;
use crate::set::DialogSet;

const POSITION_KEY: &str = "position";

/// A container that runs registered children in declared order
pub struct SequentialContainer {
    id: String,
    dialogs: Arc<DialogSet>,
    order: Vec<String>,
}

impl SequentialContainer {
    /// Build a container from an ordered list of children
    ///
    /// Fails with [`DialogError::DuplicateId`] if two children share an id.
    pub fn new(id: impl Into<String>, children: Vec<Arc<dyn Dialog>>) -> DialogResult<Self> {
        let mut set = DialogSet::new();
        let mut order = Vec::with_capacity(children.len());
        for child in children {
            order.push(child.id().to_string());
            set.add(child)?;
        }
        Ok(Self {
            id: id.into(),
            dialogs: Arc::new(set),
            order,
        })
    }

    /// Child ids in execution order
    pub fn steps(&self) -> &[String] {
        &self.order
    }

    fn position(&self, dc: &DialogContext<'_>) -> DialogResult<usize> {
        let instance = dc.active_dialog().ok_or(DialogError::NoActiveDialog)?;
        Ok(instance
            .state
            .get(POSITION_KEY)
            .and_then(Value::as_u64)
            .unwrap_or(0) as usize)
    }

    fn set_position(&self, dc: &mut DialogContext<'_>, index: usize) -> DialogResult<()> {
        let instance = dc.active_dialog_mut().ok_or(DialogError::NoActiveDialog)?;
        if !instance.state.is_object() {
            instance.state = json!({});
        }
        instance.state[POSITION_KEY] = json!(index);
        Ok(())
    }

    /// Begin children starting at `index`, advancing through any that
    /// complete synchronously, until one waits or the order is exhausted
    async fn run_from(
        &self,
        dc: &mut DialogContext<'_>,
        mut index: usize,
        mut input: Option<Value>,
    ) -> DialogResult<DialogTurnResult> {
        loop {
            if index >= self.order.len() {
                return dc.end_dialog(input).await;
            }
            self.set_position(dc, index)?;
            let child_id = self.order[index].clone();
            let mut child = self.create_child_context(dc)?;
            let result = child.begin_dialog(&child_id, input.take()).await?;
            let handle = child.handle();
            drop(child);
            dc.save_child_state(handle)?;
            match result.status {
                DialogTurnStatus::Waiting => return Ok(result),
                DialogTurnStatus::Complete => {
                    input = result.result;
                    index += 1;
                }
                DialogTurnStatus::Empty => {
                    input = None;
                    index += 1;
                }
                DialogTurnStatus::Cancelled => return Ok(result),
            }
        }
    }
}

#[async_trait]
impl Dialog for SequentialContainer {
    fn id(&self) -> &str {
        &self.id
    }

    async fn begin(
        &self,
        dc: &mut DialogContext<'_>,
        options: Option<Value>,
    ) -> DialogResult<DialogTurnResult> {
        self.check_for_version_change(dc).await?;
        self.run_from(dc, 0, options).await
    }

    async fn continue_dialog(&self, dc: &mut DialogContext<'_>) -> DialogResult<DialogTurnResult> {
        self.check_for_version_change(dc).await?;
        let mut child = self.create_child_context(dc)?;
        let result = child.continue_dialog().await?;
        let handle = child.handle();
        drop(child);
        dc.save_child_state(handle)?;
        match result.status {
            DialogTurnStatus::Waiting | DialogTurnStatus::Cancelled => Ok(result),
            DialogTurnStatus::Complete => {
                let position = self.position(dc)?;
                self.run_from(dc, position + 1, result.result).await
            }
            DialogTurnStatus::Empty => {
                let position = self.position(dc)?;
                self.run_from(dc, position, None).await
            }
        }
    }

    async fn resume(
        &self,
        dc: &mut DialogContext<'_>,
        reason: DialogReason,
        result: Option<Value>,
    ) -> DialogResult<DialogTurnResult> {
        self.check_for_version_change(dc).await?;
        let mut child = self.create_child_context(dc)?;
        let Some(instance) = child.active_dialog() else {
            drop(child);
            return dc.end_dialog(result).await;
        };
        let id = instance.id.clone();
        let dialog = child
            .find_dialog(&id)
            .ok_or_else(|| DialogError::DialogNotFound { id })?;
        let turn_result = dialog.resume(&mut child, reason, result).await?;
        let handle = child.handle();
        drop(child);
        dc.save_child_state(handle)?;
        match turn_result.status {
            DialogTurnStatus::Waiting | DialogTurnStatus::Cancelled => Ok(turn_result),
            DialogTurnStatus::Complete => {
                let position = self.position(dc)?;
                self.run_from(dc, position + 1, turn_result.result).await
            }
            DialogTurnStatus::Empty => {
                let position = self.position(dc)?;
                self.run_from(dc, position, None).await
            }
        }
    }

    async fn on_dialog_event(
        &self,
        dc: &mut DialogContext<'_>,
        event: &DialogEvent,
    ) -> DialogResult<bool> {
        self.handle_event(dc, event).await
    }
}

impl DialogContainer for SequentialContainer {
    fn dialogs(&self) -> &Arc<DialogSet> {
        &self.dialogs
    }

    // Step order matters for behavior, so it is folded into the fingerprint
    // alongside the child set: reordering steps trips the version check even
    // when membership is unchanged.
    fn get_internal_version(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.dialogs.get_internal_version().as_bytes());
        for id in &self.order {
            hasher.update(id.as_bytes());
            hasher.update([0x1f]);
        }
        hex::encode(hasher.finalize())
    }
}
