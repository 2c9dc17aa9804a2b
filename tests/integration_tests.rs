//! End-to-end tests: sequential containers across persisted turns

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use dialog_flow::{
    run_dialog, ContextStore, Dialog, DialogContainer, DialogContext, DialogError, DialogEvent,
    DialogEvents, DialogResult, DialogSet, DialogState, DialogStateStore, DialogTurnResult,
    DialogTurnStatus, MemoryDialogStore, NullTelemetry, NullTransport, SequentialContainer,
    TelemetryClient, TraceSeverity, TurnContext, TurnTransport,
};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Prompt leaf: sends its prompt on begin, completes with the turn's
/// activity text on continue
struct TextPrompt {
    id: String,
    prompt: String,
}

impl TextPrompt {
    fn new(id: &str, prompt: &str) -> Arc<dyn Dialog> {
        Arc::new(Self {
            id: id.to_string(),
            prompt: prompt.to_string(),
        })
    }
}

#[async_trait]
impl Dialog for TextPrompt {
    fn id(&self) -> &str {
        &self.id
    }

    async fn begin(
        &self,
        dc: &mut DialogContext<'_>,
        _options: Option<Value>,
    ) -> DialogResult<DialogTurnResult> {
        dc.turn()
            .send_activity(json!({ "text": self.prompt }))
            .await?;
        Ok(DialogTurnResult::waiting())
    }

    async fn continue_dialog(&self, dc: &mut DialogContext<'_>) -> DialogResult<DialogTurnResult> {
        let text = dc.turn().activity.get("text").cloned();
        dc.end_dialog(text).await
    }
}

/// Transport that records outgoing activities
#[derive(Default)]
struct CollectingTransport {
    sent: Mutex<Vec<Value>>,
}

/// Telemetry sink that records trace messages
#[derive(Default)]
struct CollectingTelemetry {
    traces: Mutex<Vec<String>>,
}

#[async_trait]
impl TelemetryClient for CollectingTelemetry {
    async fn send_trace(
        &self,
        message: &str,
        _severity: TraceSeverity,
        _context: Option<Value>,
    ) -> anyhow::Result<()> {
        self.traces.lock().unwrap().push(message.to_string());
        Ok(())
    }
}

#[async_trait]
impl TurnTransport for CollectingTransport {
    async fn send_activity(&self, activity: Value) -> anyhow::Result<()> {
        self.sent.lock().unwrap().push(activity);
        Ok(())
    }
}

fn signup_set() -> Arc<DialogSet> {
    let container = SequentialContainer::new(
        "signup",
        vec![
            TextPrompt::new("askName", "What is your name?"),
            TextPrompt::new("askEmail", "What is your email?"),
        ],
    )
    .unwrap();
    let mut set = DialogSet::new();
    set.add(Arc::new(container)).unwrap();
    Arc::new(set)
}

fn turn_with(text: &str, transport: Arc<dyn TurnTransport>) -> TurnContext {
    TurnContext::new(json!({ "text": text }), transport, Arc::new(NullTelemetry))
}

#[tokio::test]
async fn sequential_container_runs_across_persisted_turns() {
    let set = signup_set();
    let store = MemoryDialogStore::new();
    let conversation = Uuid::new_v4();
    let transport = Arc::new(CollectingTransport::default());

    // Turn 1: fresh conversation, first prompt goes out.
    let turn = turn_with("hi", transport.clone());
    let result = run_dialog("signup", Arc::clone(&set), &store, conversation, &turn)
        .await
        .unwrap();
    assert_eq!(result.status, DialogTurnStatus::Waiting);

    // Turn 2: name answered, second prompt goes out.
    let turn = turn_with("alice", transport.clone());
    let result = run_dialog("signup", Arc::clone(&set), &store, conversation, &turn)
        .await
        .unwrap();
    assert_eq!(result.status, DialogTurnStatus::Waiting);

    // Turn 3: email answered, the container completes with it.
    let turn = turn_with("alice@example.com", transport.clone());
    let result = run_dialog("signup", Arc::clone(&set), &store, conversation, &turn)
        .await
        .unwrap();
    assert_eq!(result.status, DialogTurnStatus::Complete);
    assert_eq!(result.result, Some(json!("alice@example.com")));

    let sent = transport.sent.lock().unwrap().clone();
    assert_eq!(
        sent,
        vec![
            json!({ "text": "What is your name?" }),
            json!({ "text": "What is your email?" }),
        ]
    );

    // The completed conversation persists an empty stack.
    let state = store.load(conversation).await.unwrap();
    assert!(state.stack.is_empty());
}

#[tokio::test]
async fn parked_conversation_persists_its_position() {
    let set = signup_set();
    let store = MemoryDialogStore::new();
    let conversation = Uuid::new_v4();

    let turn = turn_with("hi", Arc::new(NullTransport));
    run_dialog("signup", Arc::clone(&set), &store, conversation, &turn)
        .await
        .unwrap();
    let turn = turn_with("alice", Arc::new(NullTransport));
    run_dialog("signup", Arc::clone(&set), &store, conversation, &turn)
        .await
        .unwrap();

    // Parked on the second step: the container instance carries its
    // position, child stack, and fingerprint.
    let state = store.load(conversation).await.unwrap();
    assert_eq!(state.stack.len(), 1);
    let instance = &state.stack[0];
    assert_eq!(instance.id, "signup");
    assert_eq!(instance.state["position"], json!(1));
    assert!(instance.version.is_some());
    let child_stack = instance.state["dialogState"].as_array().unwrap();
    assert_eq!(child_stack[0]["id"], json!("askEmail"));
}

fn signup_with_confirm(step_ids: &[&str]) -> Arc<DialogSet> {
    let steps: Vec<Arc<dyn Dialog>> = step_ids
        .iter()
        .map(|id| TextPrompt::new(id, &format!("{id}?")))
        .collect();
    let container = SequentialContainer::new("signup", steps).unwrap();
    let mut set = DialogSet::new();
    set.add(Arc::new(container)).unwrap();
    set.add(TextPrompt::new("confirm", "Are you sure?")).unwrap();
    Arc::new(set)
}

#[tokio::test]
async fn resuming_a_parked_container_checks_version_and_advances() {
    let transport = Arc::new(CollectingTransport::default());
    let telemetry = Arc::new(CollectingTelemetry::default());

    // Turn 1: park the container on its first step, then stack a
    // confirmation prompt above it.
    let set = signup_with_confirm(&["askName", "askEmail"]);
    let turn = TurnContext::new(json!({ "text": "hi" }), transport.clone(), telemetry.clone());
    let mut contexts = ContextStore::new();
    let state = {
        let mut dc = contexts.root(Arc::clone(&set), &DialogState::new(), &turn);
        dc.begin_dialog("signup", None).await.unwrap();
        dc.begin_dialog("confirm", None).await.unwrap();
        contexts.snapshot_root()
    };
    assert_eq!(state.stack.len(), 2);
    assert!(telemetry.traces.lock().unwrap().is_empty());

    // A step is added to the container between turns, so the parked
    // instance's fingerprint is stale when it gets resumed.
    let set = signup_with_confirm(&["askName", "askEmail", "askAge"]);
    let turn = TurnContext::new(json!({ "text": "yes" }), transport.clone(), telemetry.clone());
    let mut contexts = ContextStore::new();
    let result = {
        let mut dc = contexts.root(Arc::clone(&set), &state, &turn);
        dc.continue_dialog().await.unwrap()
    };
    let state = contexts.snapshot_root();

    // The confirmation ended, the container was resumed: its version check
    // ran first and raised exactly one versionChanged on the resume path.
    let traces = telemetry.traces.lock().unwrap().clone();
    assert_eq!(traces.len(), 1);
    assert!(traces[0].contains("Unhandled dialog event: versionChanged"));
    assert!(traces[0].contains("signup"));

    // The resume was forwarded into the child: the first step consumed the
    // confirmation result and the container advanced to its second step.
    assert_eq!(result.status, DialogTurnStatus::Waiting);
    assert_eq!(
        transport.sent.lock().unwrap().last().unwrap(),
        &json!({ "text": "askEmail?" })
    );
    assert_eq!(state.stack.len(), 1);
    let instance = &state.stack[0];
    assert_eq!(instance.id, "signup");
    assert_eq!(instance.state["position"], json!(1));
    let child_stack = instance.state["dialogState"].as_array().unwrap();
    assert_eq!(child_stack[0]["id"], json!("askEmail"));

    // The stored fingerprint rotated to the new shape during the resume.
    let current = SequentialContainer::new(
        "signup",
        vec![
            TextPrompt::new("askName", "askName?"),
            TextPrompt::new("askEmail", "askEmail?"),
            TextPrompt::new("askAge", "askAge?"),
        ],
    )
    .unwrap()
    .get_internal_version();
    assert_eq!(instance.version.as_deref(), Some(current.as_str()));
}

#[tokio::test]
async fn cancelled_turn_aborts_without_saving() {
    let set = signup_set();
    let store = MemoryDialogStore::new();
    let conversation = Uuid::new_v4();

    let token = CancellationToken::new();
    token.cancel();
    let turn = TurnContext::new(
        json!({ "text": "hi" }),
        Arc::new(NullTransport),
        Arc::new(NullTelemetry),
    )
    .with_cancellation(token);

    let err = run_dialog("signup", Arc::clone(&set), &store, conversation, &turn)
        .await
        .unwrap_err();
    assert!(matches!(err, DialogError::TurnCancelled));
    assert_eq!(store.conversation_count().await, 0);
}

#[tokio::test]
async fn beginning_an_unknown_dialog_fails_the_turn() {
    let set = signup_set();
    let turn = turn_with("hi", Arc::new(NullTransport));
    let mut contexts = ContextStore::new();
    let mut dc = contexts.root(set, &DialogState::new(), &turn);

    let err = dc.begin_dialog("missing", None).await.unwrap_err();
    assert!(matches!(err, DialogError::DialogNotFound { id } if id == "missing"));
}

/// Container with an empty child set that begins a dialog by id, relying on
/// the child context climbing to ancestor sets
struct ForwardContainer {
    id: String,
    dialogs: Arc<DialogSet>,
    target: String,
}

impl ForwardContainer {
    fn new(id: &str, target: &str) -> Arc<dyn Dialog> {
        Arc::new(Self {
            id: id.to_string(),
            dialogs: Arc::new(DialogSet::new()),
            target: target.to_string(),
        })
    }
}

#[async_trait]
impl Dialog for ForwardContainer {
    fn id(&self) -> &str {
        &self.id
    }

    async fn begin(
        &self,
        dc: &mut DialogContext<'_>,
        options: Option<Value>,
    ) -> DialogResult<DialogTurnResult> {
        self.check_for_version_change(dc).await?;
        let mut child = self.create_child_context(dc)?;
        let result = child.begin_dialog(&self.target, options).await?;
        let handle = child.handle();
        drop(child);
        dc.save_child_state(handle)?;
        Ok(result)
    }

    async fn on_dialog_event(
        &self,
        dc: &mut DialogContext<'_>,
        event: &DialogEvent,
    ) -> DialogResult<bool> {
        self.handle_event(dc, event).await
    }
}

impl DialogContainer for ForwardContainer {
    fn dialogs(&self) -> &Arc<DialogSet> {
        &self.dialogs
    }
}

#[tokio::test]
async fn child_context_lookup_climbs_to_the_root_set() {
    let mut root = DialogSet::new();
    root.add(TextPrompt::new("helper", "From the root set"))
        .unwrap();
    root.add(ForwardContainer::new("wrapper", "helper")).unwrap();
    let set = Arc::new(root);

    let transport = Arc::new(CollectingTransport::default());
    let turn = turn_with("hi", transport.clone());
    let mut contexts = ContextStore::new();
    let mut dc = contexts.root(set, &DialogState::new(), &turn);

    let result = dc.begin_dialog("wrapper", None).await.unwrap();
    assert_eq!(result.status, DialogTurnStatus::Waiting);
    assert_eq!(
        transport.sent.lock().unwrap().as_slice(),
        &[json!({ "text": "From the root set" })]
    );
}

#[tokio::test]
async fn container_referencing_a_missing_child_fails_the_turn() {
    let mut root = DialogSet::new();
    root.add(ForwardContainer::new("wrapper", "ghost")).unwrap();
    let set = Arc::new(root);

    let turn = turn_with("hi", Arc::new(NullTransport));
    let mut contexts = ContextStore::new();
    let mut dc = contexts.root(set, &DialogState::new(), &turn);

    let err = dc.begin_dialog("wrapper", None).await.unwrap_err();
    assert!(matches!(err, DialogError::DialogNotFound { id } if id == "ghost"));
}

/// Leaf that records cancellation events
struct CancelAware {
    id: String,
    cancelled: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl Dialog for CancelAware {
    fn id(&self) -> &str {
        &self.id
    }

    async fn begin(
        &self,
        _dc: &mut DialogContext<'_>,
        _options: Option<Value>,
    ) -> DialogResult<DialogTurnResult> {
        Ok(DialogTurnResult::waiting())
    }

    async fn on_dialog_event(
        &self,
        _dc: &mut DialogContext<'_>,
        event: &DialogEvent,
    ) -> DialogResult<bool> {
        if event.name == DialogEvents::CANCEL_DIALOG {
            self.cancelled.lock().unwrap().push(self.id.clone());
        }
        Ok(false)
    }
}

#[tokio::test]
async fn cancel_all_notifies_each_instance_and_clears_the_stack() {
    let cancelled = Arc::new(Mutex::new(Vec::new()));
    let mut root = DialogSet::new();
    for id in ["first", "second"] {
        root.add(Arc::new(CancelAware {
            id: id.to_string(),
            cancelled: cancelled.clone(),
        }))
        .unwrap();
    }
    let set = Arc::new(root);

    let turn = turn_with("hi", Arc::new(NullTransport));
    let mut contexts = ContextStore::new();
    let mut dc = contexts.root(Arc::clone(&set), &DialogState::new(), &turn);

    dc.begin_dialog("first", None).await.unwrap();
    dc.begin_dialog("second", None).await.unwrap();
    assert_eq!(dc.stack().len(), 2);

    let result = dc.cancel_all_dialogs().await.unwrap();
    assert_eq!(result.status, DialogTurnStatus::Cancelled);
    assert!(dc.stack().is_empty());

    // Innermost first, each exactly once.
    assert_eq!(cancelled.lock().unwrap().as_slice(), &["second", "first"]);
}

#[tokio::test]
async fn replace_dialog_swaps_the_active_instance() {
    let set = {
        let mut root = DialogSet::new();
        root.add(TextPrompt::new("a", "a?")).unwrap();
        root.add(TextPrompt::new("b", "b?")).unwrap();
        Arc::new(root)
    };

    let turn = turn_with("hi", Arc::new(NullTransport));
    let mut contexts = ContextStore::new();
    let mut dc = contexts.root(set, &DialogState::new(), &turn);

    dc.begin_dialog("a", None).await.unwrap();
    dc.replace_dialog("b", None).await.unwrap();

    assert_eq!(dc.stack().len(), 1);
    assert_eq!(dc.active_dialog().unwrap().id, "b");
}
