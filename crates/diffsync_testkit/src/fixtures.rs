//! Test fixtures and engine helpers.

use diffsync_engine::{EngineConfig, JsonSynchronizer, SyncEngine, TextSynchronizer};
use diffsync_protocol::ClientDocument;
use diffsync_store::{FileDataStore, FileStoreConfig, InMemoryDataStore};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

/// Document id used by the fixtures.
pub const DOCUMENT_ID: &str = "doc-1";

/// Client id used by the fixtures.
pub const CLIENT_ID: &str = "client-1";

/// Engine over text content kept in memory.
pub type MemoryTextEngine = SyncEngine<TextSynchronizer, InMemoryDataStore<String>>;

/// Engine over JSON content kept in memory.
pub type MemoryJsonEngine = SyncEngine<JsonSynchronizer, InMemoryDataStore<Value>>;

/// Returns a fixture document with `content`.
pub fn document<T>(content: T) -> ClientDocument<T> {
    ClientDocument::new(DOCUMENT_ID, CLIENT_ID, content)
}

/// Returns a fixture text document.
pub fn text_document(content: &str) -> ClientDocument<String> {
    document(content.to_string())
}

/// Creates a text engine with the default configuration.
pub fn memory_text_engine() -> MemoryTextEngine {
    SyncEngine::new(EngineConfig::default(), TextSynchronizer, InMemoryDataStore::new())
}

/// Creates a JSON engine with the default configuration.
pub fn memory_json_engine() -> MemoryJsonEngine {
    SyncEngine::new(EngineConfig::default(), JsonSynchronizer, InMemoryDataStore::new())
}

/// A file store in a temporary directory that is deleted on drop.
pub struct TempFileStore<T> {
    /// The store.
    pub store: Arc<FileDataStore<T>>,
    dir: TempDir,
}

impl<T: Serialize + DeserializeOwned> TempFileStore<T> {
    /// Creates an empty store in a fresh temporary directory.
    pub fn new() -> Self {
        let dir = TempDir::new().expect("Failed to create temp directory");
        let store = FileDataStore::open(dir.path(), FileStoreConfig::default())
            .expect("Failed to open file store");
        Self {
            store: Arc::new(store),
            dir,
        }
    }

    /// Returns the store directory.
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Closes the store and opens it again from disk.
    ///
    /// Panics if other handles to the store are still alive.
    pub fn reopen(self) -> Self {
        let Self { store, dir } = self;
        drop(Arc::into_inner(store).expect("Store is still shared"));
        let store = FileDataStore::open(dir.path(), FileStoreConfig::default())
            .expect("Failed to reopen file store");
        Self {
            store: Arc::new(store),
            dir,
        }
    }
}

impl<T: Serialize + DeserializeOwned> Default for TempFileStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Runs `f` with a text engine backed by a temporary file store.
pub fn with_file_text_engine<F, R>(f: F) -> R
where
    F: FnOnce(&SyncEngine<TextSynchronizer, FileDataStore<String>>) -> R,
{
    let temp = TempFileStore::<String>::new();
    let engine = SyncEngine::with_shared_store(
        EngineConfig::default(),
        TextSynchronizer,
        Arc::clone(&temp.store),
    );
    f(&engine)
}
