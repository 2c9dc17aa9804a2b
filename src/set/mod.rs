//! Dialog sets
//!
//! A [`DialogSet`] is the indexed collection of sibling dialogs owned by one
//! container (or by the conversation root). Membership is fixed after setup,
//! which is what makes the set safely shareable across concurrent turns, and
//! what makes its structural fingerprint meaningful: the fingerprint is a
//! pure function of the member ids and their declared versions, nothing else.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use sha2::{Digest, Sha256};

use crate::dialog::Dialog;
use crate::error::{DialogError, DialogResult};

/// An indexed collection of sibling dialogs
#[derive(Default)]
pub struct DialogSet {
    // BTreeMap keeps fingerprint iteration order independent of insertion
    // order.
    dialogs: BTreeMap<String, Arc<dyn Dialog>>,
}

impl DialogSet {
    /// Create an empty set
    pub fn new() -> Self {
        Self {
            dialogs: BTreeMap::new(),
        }
    }

    /// Register a dialog under its id
    ///
    /// Fails with [`DialogError::DuplicateId`] if the id is already taken;
    /// the existing member is left untouched.
    pub fn add(&mut self, dialog: Arc<dyn Dialog>) -> DialogResult<()> {
        let id = dialog.id().to_string();
        if self.dialogs.contains_key(&id) {
            return Err(DialogError::DuplicateId { id });
        }
        self.dialogs.insert(id, dialog);
        Ok(())
    }

    /// Look up a dialog by id
    ///
    /// Absence is not an error on this path; callers decide whether a miss
    /// is fatal.
    pub fn find(&self, id: &str) -> Option<Arc<dyn Dialog>> {
        self.dialogs.get(id).cloned()
    }

    /// Ids of all registered dialogs, in fingerprint order
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.dialogs.keys().map(String::as_str)
    }

    /// Number of registered dialogs
    pub fn len(&self) -> usize {
        self.dialogs.len()
    }

    /// Whether the set is empty
    pub fn is_empty(&self) -> bool {
        self.dialogs.is_empty()
    }

    /// Structural fingerprint over the set's membership
    ///
    /// Combines every member's id and declared version into one opaque
    /// token. Identical membership yields an identical token; adding or
    /// removing a member, or bumping a member's declared version, yields a
    /// different one. Runtime values never contribute, only shape.
    pub fn get_internal_version(&self) -> String {
        let mut hasher = Sha256::new();
        for (id, dialog) in &self.dialogs {
            hasher.update(id.as_bytes());
            hasher.update([0x00]);
            if let Some(version) = dialog.version() {
                hasher.update(version.as_bytes());
            }
            hasher.update([0xff]);
        }
        hex::encode(hasher.finalize())
    }
}

impl fmt::Debug for DialogSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DialogSet")
            .field("ids", &self.dialogs.keys().collect::<Vec<_>>())
            .finish()
    }
}
