//! Data store trait definition.

use crate::batch::WriteBatch;
use crate::error::StoreResult;
use diffsync_protocol::{BackupShadowDocument, ClientDocument, DocumentKey, Edit, ShadowDocument};

/// Durable keyed storage for differential sync state.
///
/// All state is addressed by a [`DocumentKey`] (document id, client id).
/// The sync engine owns all interpretation of the stored values; a store only
/// persists and returns them.
///
/// # Invariants
///
/// - Each call is atomic for its key; [`write`](Self::write) applies a whole
///   [`WriteBatch`] or none of it
/// - `get_*` returns exactly what the last `save_*` for that key stored
/// - Edits are returned in the order they were saved
/// - Calls complete or fail in bounded time; failures are reported, never
///   swallowed
///
/// # Implementors
///
/// - [`super::InMemoryDataStore`] - For testing
/// - [`super::FileDataStore`] - For persistent storage
pub trait DataStore<T>: Send + Sync {
    /// Stores the client document, replacing any previous one.
    fn save_client_document(&self, document: &ClientDocument<T>) -> StoreResult<()>;

    /// Returns the client document for `key`.
    fn get_client_document(&self, key: &DocumentKey) -> StoreResult<Option<ClientDocument<T>>>;

    /// Stores the shadow, replacing any previous one.
    fn save_shadow(&self, shadow: &ShadowDocument<T>) -> StoreResult<()>;

    /// Returns the shadow for `key`.
    fn get_shadow(&self, key: &DocumentKey) -> StoreResult<Option<ShadowDocument<T>>>;

    /// Stores the backup shadow, replacing any previous one.
    fn save_backup_shadow(&self, backup: &BackupShadowDocument<T>) -> StoreResult<()>;

    /// Returns the backup shadow for `key`.
    fn get_backup_shadow(&self, key: &DocumentKey)
        -> StoreResult<Option<BackupShadowDocument<T>>>;

    /// Appends a pending edit to the list for the edit's key.
    fn save_edit(&self, edit: &Edit) -> StoreResult<()>;

    /// Returns the pending edits for `key`, oldest first.
    fn get_edits(&self, key: &DocumentKey) -> StoreResult<Vec<Edit>>;

    /// Removes one pending edit (all entries equal to `edit`).
    fn remove_edit(&self, edit: &Edit) -> StoreResult<()>;

    /// Removes all pending edits for `key`.
    fn remove_edits(&self, key: &DocumentKey) -> StoreResult<()>;

    /// Removes every record held for `key`.
    fn remove_document(&self, key: &DocumentKey) -> StoreResult<()>;

    /// Applies every write in `batch` at once.
    ///
    /// On error the key's state is exactly as it was before the call.
    fn write(&self, batch: &WriteBatch<T>) -> StoreResult<()>;

    /// Returns true if the failed marker is set for `key`.
    fn is_failed(&self, key: &DocumentKey) -> StoreResult<bool>;
}
