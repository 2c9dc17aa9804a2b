//! Persisted conversation state
//!
//! One [`DialogInstance`] record exists per dialog that is active on the
//! execution stack; the ordered stack of records is what an external storage
//! collaborator reads at the start of a turn and writes back at the end.
//! Nested containers persist their own child stacks *inside* their instance
//! record's opaque `state`, so the root stack is the only thing stored
//! externally.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Conversation-state record for one active dialog on the stack
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DialogInstance {
    /// Id of the dialog this is an instance of
    pub id: String,

    /// Opaque per-dialog state
    pub state: Value,

    /// Structural fingerprint observed the last time this instance ran
    ///
    /// Unset until the owning container's first version check; after that it
    /// changes only through
    /// [`DialogContainer::check_for_version_change`](crate::container::DialogContainer::check_for_version_change).
    pub version: Option<String>,
}

impl DialogInstance {
    /// Create a fresh instance for a dialog id
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            state: Value::Object(serde_json::Map::new()),
            version: None,
        }
    }
}

/// The persisted dialog stack for one conversation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DialogState {
    /// Active instances, outermost first
    pub stack: Vec<DialogInstance>,
}

impl DialogState {
    /// Empty state for a conversation that has not run yet
    pub fn new() -> Self {
        Self::default()
    }
}

/// Storage collaborator for per-conversation dialog state
#[async_trait]
pub trait DialogStateStore: Send + Sync {
    /// Load the state for a conversation, empty if never saved
    async fn load(&self, conversation_id: Uuid) -> anyhow::Result<DialogState>;

    /// Persist the state for a conversation
    async fn save(&self, conversation_id: Uuid, state: DialogState) -> anyhow::Result<()>;
}

/// In-memory state store for tests and single-process hosts
#[derive(Debug, Default)]
pub struct MemoryDialogStore {
    conversations: RwLock<HashMap<Uuid, DialogState>>,
}

impl MemoryDialogStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of conversations with saved state
    pub async fn conversation_count(&self) -> usize {
        self.conversations.read().await.len()
    }
}

#[async_trait]
impl DialogStateStore for MemoryDialogStore {
    async fn load(&self, conversation_id: Uuid) -> anyhow::Result<DialogState> {
        let conversations = self.conversations.read().await;
        Ok(conversations
            .get(&conversation_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn save(&self, conversation_id: Uuid, state: DialogState) -> anyhow::Result<()> {
        let mut conversations = self.conversations.write().await;
        conversations.insert(conversation_id, state);
        Ok(())
    }
}
