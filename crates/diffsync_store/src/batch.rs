//! Grouped writes for one key.

use diffsync_protocol::{BackupShadowDocument, ClientDocument, DocumentKey, Edit, ShadowDocument};
use serde::{Deserialize, Serialize};

/// A set of writes to one key that a store applies all-or-nothing.
///
/// Each record is either left untouched (`None`) or replaced. The pending
/// edit list is replaced as a whole.
///
/// # Example
///
/// ```rust
/// use diffsync_protocol::{ClientDocument, ShadowDocument};
/// use diffsync_store::{DataStore, InMemoryDataStore, WriteBatch};
///
/// let store = InMemoryDataStore::<String>::new();
/// let doc = ClientDocument::new("notes", "alice", "hello".to_string());
///
/// let batch = WriteBatch::new(doc.key())
///     .put_shadow(ShadowDocument::initial(doc.clone()))
///     .put_document(doc.clone())
///     .set_edits(Vec::new());
/// store.write(&batch).unwrap();
/// assert!(store.get_shadow(&doc.key()).unwrap().is_some());
/// ```
#[derive(Debug, Clone)]
pub struct WriteBatch<T> {
    /// Key every record in the batch belongs to.
    pub key: DocumentKey,
    /// New client document.
    pub document: Option<ClientDocument<T>>,
    /// New shadow.
    pub shadow: Option<ShadowDocument<T>>,
    /// New backup shadow.
    pub backup: Option<BackupShadowDocument<T>>,
    /// New pending edit list, oldest first.
    pub edits: Option<Vec<Edit>>,
    /// New value of the failed marker.
    pub failed: Option<bool>,
}

impl<T> WriteBatch<T> {
    /// Creates an empty batch for `key`.
    pub fn new(key: DocumentKey) -> Self {
        Self {
            key,
            document: None,
            shadow: None,
            backup: None,
            edits: None,
            failed: None,
        }
    }

    /// Replaces the client document.
    pub fn put_document(mut self, document: ClientDocument<T>) -> Self {
        self.document = Some(document);
        self
    }

    /// Replaces the shadow.
    pub fn put_shadow(mut self, shadow: ShadowDocument<T>) -> Self {
        self.shadow = Some(shadow);
        self
    }

    /// Replaces the backup shadow.
    pub fn put_backup(mut self, backup: BackupShadowDocument<T>) -> Self {
        self.backup = Some(backup);
        self
    }

    /// Replaces the pending edit list.
    pub fn set_edits(mut self, edits: Vec<Edit>) -> Self {
        self.edits = Some(edits);
        self
    }

    /// Sets or clears the failed marker.
    pub fn set_failed(mut self, failed: bool) -> Self {
        self.failed = Some(failed);
        self
    }

    /// Returns true if the batch writes nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.document.is_none()
            && self.shadow.is_none()
            && self.backup.is_none()
            && self.edits.is_none()
            && self.failed.is_none()
    }
}

/// Everything a store holds for one key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct KeyState<T> {
    pub document: Option<ClientDocument<T>>,
    pub shadow: Option<ShadowDocument<T>>,
    pub backup: Option<BackupShadowDocument<T>>,
    #[serde(default)]
    pub edits: Vec<Edit>,
    #[serde(default)]
    pub failed: bool,
}

impl<T> Default for KeyState<T> {
    fn default() -> Self {
        Self {
            document: None,
            shadow: None,
            backup: None,
            edits: Vec::new(),
            failed: false,
        }
    }
}

impl<T> KeyState<T> {
    pub fn is_empty(&self) -> bool {
        self.document.is_none()
            && self.shadow.is_none()
            && self.backup.is_none()
            && self.edits.is_empty()
            && !self.failed
    }
}

impl<T: Clone> KeyState<T> {
    pub fn apply(&mut self, batch: &WriteBatch<T>) {
        if let Some(document) = &batch.document {
            self.document = Some(document.clone());
        }
        if let Some(shadow) = &batch.shadow {
            self.shadow = Some(shadow.clone());
        }
        if let Some(backup) = &batch.backup {
            self.backup = Some(backup.clone());
        }
        if let Some(edits) = &batch.edits {
            self.edits = edits.clone();
        }
        if let Some(failed) = batch.failed {
            self.failed = failed;
        }
    }
}
