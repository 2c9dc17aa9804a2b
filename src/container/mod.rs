//! Dialog containers
//!
//! A container is a [`Dialog`] that owns a nested [`DialogSet`] and hosts
//! child dialogs inside a child context. Containers hide their internals
//! from the parent set: to the outside they are just an id, and changes to
//! their child set surface through their own structural fingerprint, checked
//! at the start of every `begin`/`continue`/`resume` entry point. When the
//! fingerprint stored on a long-lived instance no longer matches the live
//! set, a `versionChanged` event bubbles up so the application can reset or
//! migrate state; if nobody handles it, a warning trace is the only effect
//! and the turn proceeds.

mod sequential;

pub use sequential::SequentialContainer;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

use crate::context::DialogContext;
use crate::dialog::Dialog;
use crate::error::DialogResult;
use crate::events::{DialogEvent, DialogEvents};
use crate::set::DialogSet;
use crate::turn::TraceSeverity;

/// Orchestration contract for dialogs that host child dialogs
#[async_trait]
pub trait DialogContainer: Dialog {
    /// The container's child dialog set
    fn dialogs(&self) -> &Arc<DialogSet>;

    /// Open a child context scoped to this container's dialog set
    ///
    /// The default loads the child stack persisted inside the container's
    /// own instance state and leaves the parent stack untouched. Concrete
    /// container kinds override this when they scope child contexts
    /// differently.
    fn create_child_context<'a>(
        &self,
        dc: &'a mut DialogContext<'_>,
    ) -> DialogResult<DialogContext<'a>> {
        dc.child_context(Arc::clone(self.dialogs()))
    }

    /// Resolve a child dialog by id, without climbing to parents
    fn find_dialog(&self, id: &str) -> Option<Arc<dyn Dialog>> {
        self.dialogs().find(id)
    }

    /// Structural fingerprint of this container's internals
    ///
    /// Defaults to the child set's fingerprint. Containers whose behavior
    /// depends on more than membership override this to fold that state in,
    /// so changing it also trips the version check.
    fn get_internal_version(&self) -> String {
        self.dialogs().get_internal_version()
    }

    /// Container-specific event handling, before the unhandled-event trace
    ///
    /// Concrete containers override this to claim events (returning `true`
    /// stops bubbling). The default claims nothing.
    async fn on_container_event(
        &self,
        dc: &mut DialogContext<'_>,
        event: &DialogEvent,
    ) -> DialogResult<bool> {
        let _ = (dc, event);
        Ok(false)
    }

    /// Event dispatch for containers
    ///
    /// Concrete containers call this from their `Dialog::on_dialog_event`.
    /// A `versionChanged` event left unhandled here is traced to the
    /// telemetry sink with the active dialog's id so operators can see which
    /// conversation hit an unresolved structural change; the trace does not
    /// claim the event, so it keeps bubbling.
    async fn handle_event(
        &self,
        dc: &mut DialogContext<'_>,
        event: &DialogEvent,
    ) -> DialogResult<bool> {
        let handled = self.on_container_event(dc, event).await?;
        if !handled && event.name == DialogEvents::VERSION_CHANGED {
            let active = dc
                .active_dialog()
                .map(|instance| instance.id.clone())
                .unwrap_or_else(|| "<none>".to_string());
            let message = format!(
                "Unhandled dialog event: {}. Active dialog: {}",
                event.name, active
            );
            warn!(event = %event.name, dialog = %active, "unhandled dialog event");
            dc.turn()
                .send_trace(&message, TraceSeverity::Warning, event.value.clone())
                .await?;
        }
        Ok(handled)
    }

    /// Detect whether this container's internals changed since the active
    /// instance last ran
    ///
    /// Called at the start of every `begin`, `continue_dialog`, and `resume`
    /// of a concrete container. The fresh fingerprint is written to the
    /// active instance unconditionally *before* the comparison, so a handler
    /// that re-enters this check while reacting to the event sees no further
    /// change. A difference against a previously stored fingerprint raises a
    /// bubbling `versionChanged` event carrying this container's id; the
    /// first-ever run stores the fingerprint silently. A version change is a
    /// warning signal, never fatal.
    async fn check_for_version_change(&self, dc: &mut DialogContext<'_>) -> DialogResult<()> {
        dc.turn().ensure_active()?;
        let next = self.get_internal_version();
        let current = dc.set_active_version(next.clone())?;
        if let Some(current) = current {
            if current != next {
                debug!(container = %self.id(), "child dialog set changed since instance last ran");
                dc.emit_event(
                    DialogEvents::VERSION_CHANGED,
                    Some(Value::String(self.id().to_string())),
                    true,
                    false,
                )
                .await?;
            }
        }
        Ok(())
    }
}
