//! File-based data store for durable sync state.
//!
//! Layout:
//!
//! ```text
//! <root>/
//! ├─ LOCK                                # Advisory lock for single-process ownership
//! └─ <hex(document_id)>/<hex(client_id)>/
//!    └─ state.json                       # Document, shadows, pending edits, failed marker
//! ```
//!
//! All records of a key live in one file, so every update to a key, batched
//! or not, is a single write-then-rename.

use crate::batch::{KeyState, WriteBatch};
use crate::error::{StoreError, StoreResult};
use crate::store::DataStore;
use diffsync_protocol::{BackupShadowDocument, ClientDocument, DocumentKey, Edit, ShadowDocument};
use fs2::FileExt;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use tracing::debug;

const LOCK_FILE: &str = "LOCK";
const STATE_FILE: &str = "state.json";
const STATE_TEMP_FILE: &str = "state.json.tmp";

/// Options for opening a [`FileDataStore`].
#[derive(Debug, Clone)]
pub struct FileStoreConfig {
    /// Create the root directory if it does not exist.
    pub create_if_missing: bool,
    /// Fsync every record and its directory after writing.
    pub sync_writes: bool,
}

impl FileStoreConfig {
    /// Creates the default configuration.
    pub fn new() -> Self {
        Self {
            create_if_missing: true,
            sync_writes: true,
        }
    }

    /// Sets whether a missing root directory is created.
    pub fn with_create_if_missing(mut self, create: bool) -> Self {
        self.create_if_missing = create;
        self
    }

    /// Sets whether writes are fsynced.
    pub fn with_sync_writes(mut self, sync: bool) -> Self {
        self.sync_writes = sync;
        self
    }
}

impl Default for FileStoreConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// A durable data store backed by JSON files.
///
/// Each key's state is written with the write-then-rename pattern, so a
/// crash leaves either the old or the new state, never a torn one.
///
/// # Thread Safety
///
/// This store is thread-safe. Writes are serialized internally; the root
/// directory is locked against other processes for the lifetime of the
/// store.
///
/// # Example
///
/// ```no_run
/// use diffsync_store::{FileDataStore, FileStoreConfig};
/// use std::path::Path;
///
/// let store: FileDataStore<String> =
///     FileDataStore::open(Path::new("sync-state"), FileStoreConfig::default()).unwrap();
/// ```
#[derive(Debug)]
pub struct FileDataStore<T> {
    root: PathBuf,
    config: FileStoreConfig,
    write_lock: Mutex<()>,
    _lock_file: File,
    _content: PhantomData<fn() -> T>,
}

impl<T> FileDataStore<T> {
    /// Opens or creates a store rooted at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The directory doesn't exist and `create_if_missing` is false
    /// - Another process holds the lock (returns `Locked`)
    /// - I/O errors occur
    pub fn open(path: &Path, config: FileStoreConfig) -> StoreResult<Self> {
        if !path.exists() {
            if config.create_if_missing {
                fs::create_dir_all(path)?;
            } else {
                return Err(StoreError::NotFound(path.to_path_buf()));
            }
        }

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.join(LOCK_FILE))?;

        if lock_file.try_lock_exclusive().is_err() {
            return Err(StoreError::Locked(path.to_path_buf()));
        }

        debug!(root = %path.display(), "opened file data store");

        Ok(Self {
            root: path.to_path_buf(),
            config,
            write_lock: Mutex::new(()),
            _lock_file: lock_file,
            _content: PhantomData,
        })
    }

    /// Returns the root directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.root
    }

    fn key_dir(&self, key: &DocumentKey) -> PathBuf {
        self.root
            .join(hex::encode(key.document_id.as_bytes()))
            .join(hex::encode(key.client_id.as_bytes()))
    }

    fn remove_key_dir(&self, key: &DocumentKey) -> StoreResult<()> {
        let dir = self.key_dir(key);
        match fs::remove_dir_all(&dir) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(err) => return Err(err.into()),
        }

        // Drop the per-document directory once its last client is gone.
        if let Some(parent) = dir.parent() {
            if fs::read_dir(parent)?.next().is_none() {
                fs::remove_dir(parent)?;
            }
        }
        Ok(())
    }
}

impl<T> FileDataStore<T>
where
    T: Serialize + DeserializeOwned,
{
    fn read_state(&self, key: &DocumentKey) -> StoreResult<KeyState<T>> {
        let path = self.key_dir(key).join(STATE_FILE);
        let data = match fs::read(&path) {
            Ok(data) => data,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(KeyState::default()),
            Err(err) => return Err(err.into()),
        };

        serde_json::from_slice(&data).map_err(|err| StoreError::Corrupted {
            path,
            message: err.to_string(),
        })
    }

    /// Writes a key's state atomically. Caller must hold `write_lock`.
    fn write_state(&self, key: &DocumentKey, state: &KeyState<T>) -> StoreResult<()> {
        if state.is_empty() {
            return self.remove_key_dir(key);
        }

        let dir = self.key_dir(key);
        fs::create_dir_all(&dir)?;

        let data = serde_json::to_vec(state)?;
        let path = dir.join(STATE_FILE);
        let temp_path = dir.join(STATE_TEMP_FILE);

        let mut file = File::create(&temp_path)?;
        file.write_all(&data)?;
        if self.config.sync_writes {
            file.sync_all()?;
        }
        drop(file);

        fs::rename(&temp_path, &path)?;

        if self.config.sync_writes {
            sync_directory(&dir)?;
        }
        Ok(())
    }

    /// Read-modify-write of one key's state under the write lock.
    fn modify(&self, key: &DocumentKey, f: impl FnOnce(&mut KeyState<T>)) -> StoreResult<()> {
        let _guard = self.write_lock.lock();
        let mut state = self.read_state(key)?;
        f(&mut state);
        self.write_state(key, &state)
    }
}

#[cfg(unix)]
fn sync_directory(dir: &Path) -> io::Result<()> {
    File::open(dir)?.sync_all()
}

#[cfg(not(unix))]
fn sync_directory(_dir: &Path) -> io::Result<()> {
    Ok(())
}

impl<T> DataStore<T> for FileDataStore<T>
where
    T: Clone + Serialize + DeserializeOwned,
{
    fn save_client_document(&self, document: &ClientDocument<T>) -> StoreResult<()> {
        self.modify(&document.key(), |s| s.document = Some(document.clone()))
    }

    fn get_client_document(&self, key: &DocumentKey) -> StoreResult<Option<ClientDocument<T>>> {
        Ok(self.read_state(key)?.document)
    }

    fn save_shadow(&self, shadow: &ShadowDocument<T>) -> StoreResult<()> {
        self.modify(&shadow.key(), |s| s.shadow = Some(shadow.clone()))
    }

    fn get_shadow(&self, key: &DocumentKey) -> StoreResult<Option<ShadowDocument<T>>> {
        Ok(self.read_state(key)?.shadow)
    }

    fn save_backup_shadow(&self, backup: &BackupShadowDocument<T>) -> StoreResult<()> {
        self.modify(&backup.shadow.key(), |s| s.backup = Some(backup.clone()))
    }

    fn get_backup_shadow(
        &self,
        key: &DocumentKey,
    ) -> StoreResult<Option<BackupShadowDocument<T>>> {
        Ok(self.read_state(key)?.backup)
    }

    fn save_edit(&self, edit: &Edit) -> StoreResult<()> {
        self.modify(&edit.key(), |s| s.edits.push(edit.clone()))
    }

    fn get_edits(&self, key: &DocumentKey) -> StoreResult<Vec<Edit>> {
        Ok(self.read_state(key)?.edits)
    }

    fn remove_edit(&self, edit: &Edit) -> StoreResult<()> {
        self.modify(&edit.key(), |s| s.edits.retain(|pending| pending != edit))
    }

    fn remove_edits(&self, key: &DocumentKey) -> StoreResult<()> {
        self.modify(key, |s| s.edits.clear())
    }

    fn remove_document(&self, key: &DocumentKey) -> StoreResult<()> {
        let _guard = self.write_lock.lock();
        self.remove_key_dir(key)?;
        debug!(document_id = %key.document_id, client_id = %key.client_id, "removed document state");
        Ok(())
    }

    fn write(&self, batch: &WriteBatch<T>) -> StoreResult<()> {
        if batch.is_empty() {
            return Ok(());
        }
        self.modify(&batch.key, |s| s.apply(batch))
    }

    fn is_failed(&self, key: &DocumentKey) -> StoreResult<bool> {
        Ok(self.read_state(key)?.failed)
    }
}
