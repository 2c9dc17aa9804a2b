//! Turn driver
//!
//! [`run_dialog`] is the one-call entry point a host uses per turn: load the
//! conversation's persisted stack, continue the active dialog (or begin the
//! root dialog on a fresh conversation), then snapshot and save the stack.
//! A turn that fails, including one aborted by cancellation, saves nothing.

use std::sync::Arc;

use tracing::debug;
use uuid::Uuid;

use crate::context::ContextStore;
use crate::dialog::{DialogTurnResult, DialogTurnStatus};
use crate::error::DialogResult;
use crate::set::DialogSet;
use crate::state::DialogStateStore;
use crate::turn::TurnContext;

/// Run one conversation turn against the root dialog set
pub async fn run_dialog(
    root_id: &str,
    dialogs: Arc<DialogSet>,
    store: &dyn DialogStateStore,
    conversation_id: Uuid,
    turn: &TurnContext,
) -> DialogResult<DialogTurnResult> {
    let state = store.load(conversation_id).await?;
    debug!(
        conversation = %conversation_id,
        depth = state.stack.len(),
        "starting turn"
    );

    let mut contexts = ContextStore::new();
    let result = {
        let mut dc = contexts.root(dialogs, &state, turn);
        let result = dc.continue_dialog().await?;
        if result.status == DialogTurnStatus::Empty {
            dc.begin_dialog(root_id, None).await?
        } else {
            result
        }
    };

    store.save(conversation_id, contexts.snapshot_root()).await?;
    Ok(result)
}
