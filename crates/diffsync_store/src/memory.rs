//! In-memory data store for testing.

use crate::batch::{KeyState, WriteBatch};
use crate::error::StoreResult;
use crate::store::DataStore;
use diffsync_protocol::{BackupShadowDocument, ClientDocument, DocumentKey, Edit, ShadowDocument};
use parking_lot::RwLock;
use std::collections::HashMap;

/// An in-memory data store.
///
/// This store keeps all state in a map keyed by [`DocumentKey`] and is
/// suitable for:
/// - Unit tests
/// - Integration tests
/// - Single-process hosts that don't need persistence
///
/// # Thread Safety
///
/// This store is thread-safe and can be shared across threads.
///
/// # Example
///
/// ```rust
/// use diffsync_protocol::{DocumentKey, Edit};
/// use diffsync_store::{DataStore, InMemoryDataStore};
///
/// let store = InMemoryDataStore::<String>::new();
/// store.save_edit(&Edit::new("doc", "client", 0, 0, "ab")).unwrap();
/// assert_eq!(store.get_edits(&DocumentKey::new("doc", "client")).unwrap().len(), 1);
/// ```
#[derive(Debug)]
pub struct InMemoryDataStore<T> {
    entries: RwLock<HashMap<DocumentKey, KeyState<T>>>,
}

impl<T> InMemoryDataStore<T> {
    /// Creates a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the number of keys holding any state.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns true if no key holds any state.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Removes all state for all keys.
    pub fn clear(&self) {
        self.entries.write().clear();
    }

    fn update(&self, key: DocumentKey, f: impl FnOnce(&mut KeyState<T>)) {
        let mut entries = self.entries.write();
        let entry = entries.entry(key.clone()).or_default();
        f(entry);
        if entry.is_empty() {
            entries.remove(&key);
        }
    }
}

impl<T> Default for InMemoryDataStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Send + Sync> DataStore<T> for InMemoryDataStore<T> {
    fn save_client_document(&self, document: &ClientDocument<T>) -> StoreResult<()> {
        self.update(document.key(), |e| e.document = Some(document.clone()));
        Ok(())
    }

    fn get_client_document(&self, key: &DocumentKey) -> StoreResult<Option<ClientDocument<T>>> {
        Ok(self.entries.read().get(key).and_then(|e| e.document.clone()))
    }

    fn save_shadow(&self, shadow: &ShadowDocument<T>) -> StoreResult<()> {
        self.update(shadow.key(), |e| e.shadow = Some(shadow.clone()));
        Ok(())
    }

    fn get_shadow(&self, key: &DocumentKey) -> StoreResult<Option<ShadowDocument<T>>> {
        Ok(self.entries.read().get(key).and_then(|e| e.shadow.clone()))
    }

    fn save_backup_shadow(&self, backup: &BackupShadowDocument<T>) -> StoreResult<()> {
        self.update(backup.shadow.key(), |e| e.backup = Some(backup.clone()));
        Ok(())
    }

    fn get_backup_shadow(
        &self,
        key: &DocumentKey,
    ) -> StoreResult<Option<BackupShadowDocument<T>>> {
        Ok(self.entries.read().get(key).and_then(|e| e.backup.clone()))
    }

    fn save_edit(&self, edit: &Edit) -> StoreResult<()> {
        self.update(edit.key(), |e| e.edits.push(edit.clone()));
        Ok(())
    }

    fn get_edits(&self, key: &DocumentKey) -> StoreResult<Vec<Edit>> {
        Ok(self
            .entries
            .read()
            .get(key)
            .map(|e| e.edits.clone())
            .unwrap_or_default())
    }

    fn remove_edit(&self, edit: &Edit) -> StoreResult<()> {
        self.update(edit.key(), |e| e.edits.retain(|pending| pending != edit));
        Ok(())
    }

    fn remove_edits(&self, key: &DocumentKey) -> StoreResult<()> {
        self.update(key.clone(), |e| e.edits.clear());
        Ok(())
    }

    fn remove_document(&self, key: &DocumentKey) -> StoreResult<()> {
        self.entries.write().remove(key);
        Ok(())
    }

    fn write(&self, batch: &WriteBatch<T>) -> StoreResult<()> {
        self.update(batch.key.clone(), |e| e.apply(batch));
        Ok(())
    }

    fn is_failed(&self, key: &DocumentKey) -> StoreResult<bool> {
        Ok(self.entries.read().get(key).is_some_and(|e| e.failed))
    }
}
