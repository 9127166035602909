//! The client-side synchronization state machine.

use crate::config::{AddPolicy, EngineConfig};
use crate::error::{SyncError, SyncResult};
use crate::state::{PatchOutcome, SyncState};
use crate::synchronizer::ClientSynchronizer;
use diffsync_protocol::{
    AddMessage, BackupShadowDocument, ClientDocument, DetachMessage, DocumentKey, Edit,
    PatchMessage, ShadowDocument,
};
use diffsync_store::{DataStore, WriteBatch};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Exclusive section for one key.
struct Slot {
    state: SyncState,
    /// Set once the key is removed; a retired slot is no longer in the map.
    retired: bool,
}

type Section = Arc<Mutex<Slot>>;

/// How a single inbound edit was handled.
enum Applied {
    Normal,
    Duplicate,
    Recovered,
}

/// In-memory copy of one pair's state while an operation runs.
///
/// Nothing reaches the store until the operation succeeded, and then it is
/// written as one [`WriteBatch`].
///
/// While edits are pending, `backup` holds the shadow the oldest of them was
/// computed against.
struct Working<T> {
    key: DocumentKey,
    shadow: ShadowDocument<T>,
    backup: Option<BackupShadowDocument<T>>,
    document: ClientDocument<T>,
    pending: Vec<Edit>,
}

impl<T: Clone> Working<T> {
    /// Drops pending edits the peer has seen.
    fn acknowledge(&mut self, client_version: u64) {
        self.pending.retain(|e| e.client_version >= client_version);
    }

    fn into_batch(self) -> WriteBatch<T> {
        let mut batch = WriteBatch::new(self.key)
            .put_shadow(self.shadow)
            .put_document(self.document)
            .set_edits(self.pending);
        batch.backup = self.backup;
        batch
    }
}

/// Client-side differential synchronization engine.
///
/// The engine tracks one shadow per [`DocumentKey`] in a [`DataStore`] and
/// turns local changes into [`PatchMessage`]s and peer messages into shadow
/// and document updates.
///
/// # Concurrency
///
/// Mutating operations on one key run one at a time. Operations on
/// different keys proceed in parallel. Read accessors go straight to the
/// store and observe the last committed state.
///
/// # Versions
///
/// `diff` stamps an edit with the shadow's current versions and then
/// increments the shadow's client version. Applying a peer edit increments
/// the shadow's server version. A pending edit is acknowledged once the
/// peer sends an edit with a higher client version.
pub struct SyncEngine<S, D> {
    config: EngineConfig,
    synchronizer: S,
    store: Arc<D>,
    sections: Mutex<HashMap<DocumentKey, Section>>,
}

impl<S, D> SyncEngine<S, D>
where
    S: ClientSynchronizer,
    D: DataStore<S::Content>,
{
    /// Creates an engine that owns its store.
    pub fn new(config: EngineConfig, synchronizer: S, store: D) -> Self {
        Self::with_shared_store(config, synchronizer, Arc::new(store))
    }

    /// Creates an engine over a store shared with other components.
    pub fn with_shared_store(config: EngineConfig, synchronizer: S, store: Arc<D>) -> Self {
        Self {
            config,
            synchronizer,
            store,
            sections: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Returns the synchronizer.
    pub fn synchronizer(&self) -> &S {
        &self.synchronizer
    }

    /// Returns the underlying store.
    pub fn store(&self) -> &Arc<D> {
        &self.store
    }

    /// Returns the section for `key`, creating it if needed.
    ///
    /// Without `create`, untracked keys fail with `DocumentNotFound` and
    /// leave no entry behind.
    fn section(&self, key: &DocumentKey, create: bool) -> SyncResult<Section> {
        if let Some(section) = self.sections.lock().get(key) {
            return Ok(section.clone());
        }
        if !create && !self.contains(key)? {
            return Err(SyncError::DocumentNotFound(key.clone()));
        }

        let state = if self.store.is_failed(key)? {
            SyncState::Failed
        } else {
            SyncState::Unsynced
        };
        Ok(self
            .sections
            .lock()
            .entry(key.clone())
            .or_insert_with(|| {
                Arc::new(Mutex::new(Slot {
                    state,
                    retired: false,
                }))
            })
            .clone())
    }

    /// Runs `f` inside the exclusive section for `key`.
    fn exclusive<R>(
        &self,
        key: &DocumentKey,
        create: bool,
        f: impl FnOnce(&mut Slot) -> SyncResult<R>,
    ) -> SyncResult<R> {
        let mut f = Some(f);
        loop {
            let section = self.section(key, create)?;
            let mut slot = section.lock();
            // Lost a race with `remove_document`; look the key up again.
            if slot.retired {
                continue;
            }
            if let Some(f) = f.take() {
                return f(&mut *slot);
            }
        }
    }

    fn load_shadow(&self, key: &DocumentKey) -> SyncResult<ShadowDocument<S::Content>> {
        self.store
            .get_shadow(key)?
            .ok_or_else(|| SyncError::DocumentNotFound(key.clone()))
    }

    fn load_working(&self, key: &DocumentKey) -> SyncResult<Working<S::Content>> {
        let shadow = self.load_shadow(key)?;
        let document = match self.store.get_client_document(key)? {
            Some(document) => document,
            None => shadow.client_document.clone(),
        };
        Ok(Working {
            key: key.clone(),
            shadow,
            backup: self.store.get_backup_shadow(key)?,
            document,
            pending: self.store.get_edits(key)?,
        })
    }

    fn ensure_usable(key: &DocumentKey, state: SyncState) -> SyncResult<()> {
        if state.is_usable() {
            Ok(())
        } else {
            Err(SyncError::ReseedRequired(key.clone()))
        }
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Starts tracking a document.
    ///
    /// Seeds the shadow and backup shadow at version (0, 0). Adding a key
    /// that is already tracked is a no-op when the content is unchanged;
    /// otherwise the [`AddPolicy`] decides.
    pub fn add_document(&self, document: &ClientDocument<S::Content>) -> SyncResult<()> {
        let key = document.key();
        self.exclusive(&key, true, |slot| {
            if self.store.get_shadow(&key)?.is_some() {
                match self.config.add_policy {
                    AddPolicy::Reject => {
                        let current = self.store.get_client_document(&key)?;
                        if current.is_some_and(|c| c.content == document.content) {
                            debug!(%key, "document already tracked");
                            return Ok(());
                        }
                        return Err(SyncError::DocumentAlreadyExists(key.clone()));
                    }
                    AddPolicy::Reset => info!(%key, "replacing tracked document"),
                }
            }

            self.seed(document)?;
            slot.state = SyncState::Unsynced;
            info!(%key, "document added");
            Ok(())
        })
    }

    /// Re-seeds a document, discarding its shadow, backup and pending edits.
    ///
    /// This is the way out of [`SyncState::Failed`].
    pub fn reset_document(&self, document: &ClientDocument<S::Content>) -> SyncResult<()> {
        let key = document.key();
        self.exclusive(&key, true, |slot| {
            self.seed(document)?;
            slot.state = SyncState::Unsynced;
            info!(%key, "document re-seeded");
            Ok(())
        })
    }

    fn seed(&self, document: &ClientDocument<S::Content>) -> SyncResult<()> {
        let shadow = ShadowDocument::initial(document.clone());
        let batch = WriteBatch::new(document.key())
            .put_backup(BackupShadowDocument::of(shadow.clone()))
            .put_shadow(shadow)
            .put_document(document.clone())
            .set_edits(Vec::new())
            .set_failed(false);
        self.store.write(&batch)?;
        Ok(())
    }

    /// Stops tracking a document and deletes all of its state.
    ///
    /// Returns false if the key was not tracked.
    pub fn remove_document(&self, key: &DocumentKey) -> SyncResult<bool> {
        self.exclusive(key, true, |slot| {
            let tracked = self.store.get_shadow(key)?.is_some();
            self.store.remove_document(key)?;
            slot.retired = true;
            self.sections.lock().remove(key);
            if tracked {
                info!(%key, "document removed");
            }
            Ok(tracked)
        })
    }

    // ========================================================================
    // Outbound
    // ========================================================================

    /// Computes the local changes since the shadow and returns the message
    /// to send to the peer.
    ///
    /// A non-empty diff is queued as a pending edit and advances the
    /// shadow's client version. The message carries every pending edit,
    /// oldest first. With nothing pending and nothing changed, it carries a
    /// single empty edit that acknowledges the peer's versions.
    pub fn diff(&self, document: &ClientDocument<S::Content>) -> SyncResult<PatchMessage> {
        let key = document.key();
        self.exclusive(&key, false, |slot| {
            Self::ensure_usable(&key, slot.state)?;

            let mut working = self.load_working(&key)?;
            working.document = document.clone();
            if self.stage_local_edit(&mut working)? {
                let message = self.outgoing(&working);
                self.store.write(&working.into_batch())?;
                Ok(message)
            } else {
                self.store.save_client_document(document)?;
                debug!(%key, pending = working.pending.len(), "no local changes");
                Ok(self.outgoing(&working))
            }
        })
    }

    /// Queues the difference between the working shadow and document.
    ///
    /// Returns false if there is nothing to queue.
    fn stage_local_edit(&self, working: &mut Working<S::Content>) -> SyncResult<bool> {
        let edit = self
            .synchronizer
            .client_diff(&working.shadow, &working.document);
        if edit.is_empty() {
            return Ok(false);
        }

        if let Some(limit) = self.config.max_pending_edits {
            if working.pending.len() >= limit {
                return Err(SyncError::PendingLimitExceeded {
                    key: working.key.clone(),
                    limit,
                });
            }
        }

        let next = ShadowDocument::new(
            working.document.clone(),
            working.shadow.client_version + 1,
            working.shadow.server_version,
        );
        let base = std::mem::replace(&mut working.shadow, next);
        if working.pending.is_empty() {
            working.backup = Some(BackupShadowDocument::of(base));
        }

        debug!(
            key = %working.key,
            client_version = edit.client_version,
            server_version = edit.server_version,
            diffs = edit.diffs.len(),
            "queued local edit"
        );
        working.pending.push(edit);
        Ok(true)
    }

    /// Builds the message carrying the pending edits, or an empty edit
    /// acknowledging the peer when nothing is pending.
    fn outgoing(&self, working: &Working<S::Content>) -> PatchMessage {
        let edits = if working.pending.is_empty() {
            vec![self
                .synchronizer
                .client_diff(&working.shadow, &working.shadow.client_document)]
        } else {
            working.pending.clone()
        };
        PatchMessage::new(
            working.key.document_id.clone(),
            working.key.client_id.clone(),
            edits,
        )
    }

    // ========================================================================
    // Inbound
    // ========================================================================

    /// Applies a message from the peer.
    ///
    /// Edits are applied in order to a working copy; the store is only
    /// updated if all of them succeed. Edits the shadow has already seen are
    /// discarded. If an edit does not fit the shadow, the backup shadow is
    /// tried once; on success the outcome carries a corrective message in
    /// [`PatchOutcome::resync`].
    ///
    /// # Errors
    ///
    /// - `DocumentNotFound` if the key is not tracked
    /// - `VersionMismatch` if an edit is ahead of the shadow
    /// - `DesyncUnrecoverable` if neither shadow nor backup fit; the pair
    ///   then needs [`reset_document`](Self::reset_document)
    pub fn patch(&self, message: &PatchMessage) -> SyncResult<PatchOutcome> {
        let key = message.key();
        self.exclusive(&key, false, |slot| {
            Self::ensure_usable(&key, slot.state)?;

            let mut working = self.load_working(&key)?;
            let mut outcome = PatchOutcome::default();
            for (index, edit) in message.edits.iter().enumerate() {
                match self.apply_edit(index, edit, &mut working) {
                    Ok(Applied::Normal) => outcome.applied += 1,
                    Ok(Applied::Duplicate) => outcome.discarded += 1,
                    Ok(Applied::Recovered) => outcome.recovered += 1,
                    Err(e) => {
                        warn!(%key, edit_index = index, error = %e, "message rejected");
                        if e.requires_reseed() {
                            self.mark_failed(&key);
                            slot.state = SyncState::Failed;
                        }
                        return Err(e);
                    }
                }
            }

            if outcome.is_noop() {
                debug!(%key, discarded = outcome.discarded, "nothing to apply");
                return Ok(outcome);
            }

            let recovered = outcome.recovered > 0;
            if recovered {
                self.stage_local_edit(&mut working)?;
                outcome.resync = Some(self.outgoing(&working));
            }
            self.store.write(&working.into_batch())?;
            slot.state = if recovered {
                SyncState::Desynced
            } else {
                SyncState::Synced
            };

            debug!(
                %key,
                applied = outcome.applied,
                discarded = outcome.discarded,
                recovered = outcome.recovered,
                "message applied"
            );
            Ok(outcome)
        })
    }

    /// Decodes a wire-format patch message and applies it.
    pub fn patch_encoded(&self, text: &str) -> SyncResult<PatchOutcome> {
        let message = PatchMessage::decode(text)?;
        self.patch(&message)
    }

    fn mark_failed(&self, key: &DocumentKey) {
        if let Err(e) = self.store.write(&WriteBatch::new(key.clone()).set_failed(true)) {
            warn!(%key, error = %e, "could not persist failed marker");
        }
    }

    fn apply_edit(
        &self,
        index: usize,
        edit: &Edit,
        working: &mut Working<S::Content>,
    ) -> SyncResult<Applied> {
        let key = &working.key;
        let shadow = &working.shadow;

        if edit.server_version < shadow.server_version {
            debug!(%key, server_version = edit.server_version, "discarding seen edit");
            return Ok(Applied::Duplicate);
        }
        if edit.server_version > shadow.server_version
            || edit.client_version > shadow.client_version
        {
            return Err(SyncError::version_mismatch(key, index, edit, shadow));
        }

        let actual = self.synchronizer.checksum(shadow.content());
        let cause = if actual != edit.checksum {
            SyncError::ChecksumMismatch {
                key: key.clone(),
                expected: edit.checksum.clone(),
                actual,
            }
        } else if edit.client_version < shadow.client_version {
            SyncError::version_mismatch(key, index, edit, shadow)
        } else {
            match self.synchronizer.patch_shadow(edit, shadow) {
                Ok(patched) => {
                    let previous = std::mem::replace(&mut working.shadow, patched);
                    working.backup = Some(BackupShadowDocument::of(previous));
                    working.document = self.synchronizer.patch_document(edit, &working.document);
                    working.acknowledge(edit.client_version);
                    return Ok(Applied::Normal);
                }
                Err(e) => e,
            }
        };

        self.recover(index, edit, working, cause)
    }

    /// Rebuilds the shadow the peer computed `edit` against.
    ///
    /// That is the backup shadow, rolled forward over the pending edits the
    /// peer had already applied.
    fn peer_shadow(
        &self,
        edit: &Edit,
        working: &Working<S::Content>,
    ) -> SyncResult<Option<ShadowDocument<S::Content>>> {
        let Some(backup) = &working.backup else {
            return Ok(None);
        };
        if backup.shadow.server_version != edit.server_version
            || backup.client_version > edit.client_version
        {
            return Ok(None);
        }

        let mut candidate = backup.shadow.clone();
        for pending in working
            .pending
            .iter()
            .filter(|p| p.client_version < edit.client_version)
        {
            if pending.client_version != candidate.client_version
                || pending.server_version != candidate.server_version
            {
                return Ok(None);
            }
            let content = self.synchronizer.apply(&pending.diffs, candidate.content())?;
            candidate = ShadowDocument::new(
                candidate.client_document.with_content(content),
                candidate.client_version + 1,
                candidate.server_version,
            );
        }

        let fits = candidate.client_version == edit.client_version
            && self.synchronizer.checksum(candidate.content()) == edit.checksum;
        Ok(fits.then_some(candidate))
    }

    /// Retries `edit` against the shadow rebuilt from the backup.
    fn recover(
        &self,
        index: usize,
        edit: &Edit,
        working: &mut Working<S::Content>,
        cause: SyncError,
    ) -> SyncResult<Applied> {
        let key = working.key.clone();
        let unrecoverable = |cause: SyncError| SyncError::DesyncUnrecoverable {
            key: key.clone(),
            edit_index: index,
            cause: Box::new(cause),
        };

        let restored = match self.peer_shadow(edit, working) {
            Ok(Some(restored)) => restored,
            Ok(None) => return Err(unrecoverable(cause)),
            Err(e) => return Err(unrecoverable(e)),
        };

        warn!(
            %key,
            edit_index = index,
            client_version = edit.client_version,
            cause = %cause,
            "restoring backup shadow"
        );
        let patched = self
            .synchronizer
            .patch_shadow(edit, &restored)
            .map_err(unrecoverable)?;

        working.backup = Some(BackupShadowDocument::of(restored));
        working.shadow = patched;
        working.document = self.synchronizer.patch_document(edit, &working.document);
        working.pending.clear();
        Ok(Applied::Recovered)
    }

    // ========================================================================
    // Queries and messages
    // ========================================================================

    /// Returns true if the key is tracked.
    pub fn contains(&self, key: &DocumentKey) -> SyncResult<bool> {
        Ok(self.store.get_shadow(key)?.is_some())
    }

    /// Returns the current client document.
    pub fn document(&self, key: &DocumentKey) -> SyncResult<Option<ClientDocument<S::Content>>> {
        Ok(self.store.get_client_document(key)?)
    }

    /// Returns the current shadow.
    pub fn shadow(&self, key: &DocumentKey) -> SyncResult<Option<ShadowDocument<S::Content>>> {
        Ok(self.store.get_shadow(key)?)
    }

    /// Returns the current backup shadow.
    pub fn backup_shadow(
        &self,
        key: &DocumentKey,
    ) -> SyncResult<Option<BackupShadowDocument<S::Content>>> {
        Ok(self.store.get_backup_shadow(key)?)
    }

    /// Returns the edits awaiting acknowledgement, oldest first.
    pub fn pending_edits(&self, key: &DocumentKey) -> SyncResult<Vec<Edit>> {
        Ok(self.store.get_edits(key)?)
    }

    /// Returns the sync state of a tracked key.
    ///
    /// A key that failed before a restart reports [`SyncState::Failed`].
    pub fn state(&self, key: &DocumentKey) -> SyncResult<Option<SyncState>> {
        if !self.contains(key)? {
            return Ok(None);
        }
        let section = self.sections.lock().get(key).cloned();
        match section {
            Some(section) => Ok(Some(section.lock().state)),
            None if self.store.is_failed(key)? => Ok(Some(SyncState::Failed)),
            None => Ok(Some(SyncState::Unsynced)),
        }
    }

    /// Builds the message announcing a tracked document to the peer.
    pub fn add_message(&self, key: &DocumentKey) -> SyncResult<AddMessage>
    where
        S::Content: Serialize,
    {
        let document = self
            .store
            .get_client_document(key)?
            .ok_or_else(|| SyncError::DocumentNotFound(key.clone()))?;
        Ok(AddMessage::new(
            document.id,
            document.client_id,
            serde_json::to_value(&document.content)?,
        ))
    }

    /// Builds the message telling the peer to stop syncing a document.
    pub fn detach_message(&self, key: &DocumentKey) -> SyncResult<DetachMessage> {
        if !self.contains(key)? {
            return Err(SyncError::DocumentNotFound(key.clone()));
        }
        Ok(DetachMessage::new(
            key.document_id.clone(),
            key.client_id.clone(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::text::TextSynchronizer;
    use diffsync_protocol::Diff;
    use diffsync_store::{InMemoryDataStore, StoreError, StoreResult};
    use std::sync::atomic::{AtomicBool, Ordering};

    type TextEngine = SyncEngine<TextSynchronizer, InMemoryDataStore<String>>;

    fn engine() -> TextEngine {
        engine_with(EngineConfig::default())
    }

    fn engine_with(config: EngineConfig) -> TextEngine {
        SyncEngine::new(config, TextSynchronizer, InMemoryDataStore::new())
    }

    fn doc(content: &str) -> ClientDocument<String> {
        ClientDocument::new("notes", "alice", content.to_string())
    }

    fn key() -> DocumentKey {
        DocumentKey::new("notes", "alice")
    }

    fn checksum(content: &str) -> String {
        TextSynchronizer.checksum(&content.to_string())
    }

    fn peer_edit(cv: u64, sv: u64, base: &str, diffs: Vec<Diff>) -> Edit {
        Edit::new("notes", "alice", cv, sv, checksum(base)).with_diffs(diffs)
    }

    fn message(edits: Vec<Edit>) -> PatchMessage {
        PatchMessage::new("notes", "alice", edits)
    }

    fn versions(engine: &TextEngine) -> (u64, u64) {
        let shadow = engine.shadow(&key()).unwrap().unwrap();
        (shadow.client_version, shadow.server_version)
    }

    #[test]
    fn add_document_seeds_shadow_and_backup() {
        let engine = engine();
        engine.add_document(&doc("foo")).unwrap();

        let shadow = engine.shadow(&key()).unwrap().unwrap();
        assert_eq!(shadow, ShadowDocument::initial(doc("foo")));
        let backup = engine.backup_shadow(&key()).unwrap().unwrap();
        assert_eq!(backup.client_version, 0);
        assert_eq!(engine.state(&key()).unwrap(), Some(SyncState::Unsynced));
    }

    #[test]
    fn add_document_twice() {
        let engine = engine();
        engine.add_document(&doc("foo")).unwrap();
        engine.add_document(&doc("foo")).unwrap();

        let err = engine.add_document(&doc("bar")).unwrap_err();
        assert!(matches!(err, SyncError::DocumentAlreadyExists(_)));
        assert_eq!(engine.document(&key()).unwrap().unwrap().content, "foo");
    }

    #[test]
    fn add_document_reset_policy() {
        let engine = engine_with(EngineConfig::new().with_add_policy(AddPolicy::Reset));
        engine.add_document(&doc("foo")).unwrap();
        engine.diff(&doc("foo!")).unwrap();

        engine.add_document(&doc("bar")).unwrap();
        assert_eq!(versions(&engine), (0, 0));
        assert!(engine.pending_edits(&key()).unwrap().is_empty());
        assert_eq!(engine.shadow(&key()).unwrap().unwrap().content(), "bar");
    }

    #[test]
    fn unknown_document() {
        let engine = engine();
        assert!(matches!(
            engine.diff(&doc("x")),
            Err(SyncError::DocumentNotFound(_))
        ));
        assert!(matches!(
            engine.patch(&message(vec![])),
            Err(SyncError::DocumentNotFound(_))
        ));
        assert_eq!(engine.state(&key()).unwrap(), None);
        assert!(engine.sections.lock().is_empty());
    }

    #[test]
    fn sections_are_not_kept_for_untracked_keys() {
        let engine = engine();
        for n in 0..1000 {
            let stray = ClientDocument::new(format!("stray-{n}"), "alice", String::new());
            assert!(engine.diff(&stray).is_err());
        }
        assert!(engine.sections.lock().is_empty());

        engine.add_document(&doc("x")).unwrap();
        assert_eq!(engine.sections.lock().len(), 1);
        assert!(engine.remove_document(&key()).unwrap());
        assert!(engine.sections.lock().is_empty());

        assert!(!engine.remove_document(&key()).unwrap());
        assert!(engine.sections.lock().is_empty());
    }

    #[test]
    fn empty_diff_is_not_queued() {
        let engine = engine();
        engine.add_document(&doc("foo")).unwrap();

        let msg = engine.diff(&doc("foo")).unwrap();
        assert_eq!(msg.edits.len(), 1);
        assert!(msg.edits[0].is_empty());
        assert_eq!(msg.edits[0].checksum, checksum("foo"));
        assert_eq!(versions(&engine), (0, 0));
        assert!(engine.pending_edits(&key()).unwrap().is_empty());
    }

    #[test]
    fn diff_queues_edit_and_advances_shadow() {
        let engine = engine();
        engine.add_document(&doc("foo")).unwrap();

        let msg = engine.diff(&doc("foobar")).unwrap();
        assert_eq!(msg.edits.len(), 1);
        let edit = &msg.edits[0];
        assert_eq!((edit.client_version, edit.server_version), (0, 0));
        assert_eq!(edit.checksum, checksum("foo"));
        assert_eq!(edit.diffs, vec![Diff::add("/3", "bar")]);

        assert_eq!(versions(&engine), (1, 0));
        assert_eq!(engine.shadow(&key()).unwrap().unwrap().content(), "foobar");
        let backup = engine.backup_shadow(&key()).unwrap().unwrap();
        assert_eq!(backup.shadow.content(), "foo");
        assert_eq!(engine.pending_edits(&key()).unwrap().len(), 1);
    }

    #[test]
    fn pending_edits_are_retransmitted_in_order() {
        let engine = engine();
        engine.add_document(&doc("a")).unwrap();
        engine.diff(&doc("ab")).unwrap();
        let msg = engine.diff(&doc("abc")).unwrap();

        let versions: Vec<u64> = msg.edits.iter().map(|e| e.client_version).collect();
        assert_eq!(versions, vec![0, 1]);

        let again = engine.diff(&doc("abc")).unwrap();
        assert_eq!(again.edits, msg.edits);
    }

    #[test]
    fn acknowledgement_clears_pending() {
        let engine = engine();
        engine.add_document(&doc("foo")).unwrap();
        engine.diff(&doc("foobar")).unwrap();

        let outcome = engine
            .patch(&message(vec![peer_edit(1, 0, "foobar", vec![])]))
            .unwrap();
        assert_eq!(outcome.applied, 1);
        assert_eq!(versions(&engine), (1, 1));
        assert!(engine.pending_edits(&key()).unwrap().is_empty());
        assert_eq!(engine.state(&key()).unwrap(), Some(SyncState::Synced));
    }

    #[test]
    fn peer_changes_reach_document() {
        let engine = engine();
        engine.add_document(&doc("hello")).unwrap();

        engine
            .patch(&message(vec![peer_edit(
                0,
                0,
                "hello",
                vec![Diff::add("/5", " world")],
            )]))
            .unwrap();
        assert_eq!(engine.document(&key()).unwrap().unwrap().content, "hello world");
        assert_eq!(engine.shadow(&key()).unwrap().unwrap().content(), "hello world");
    }

    #[test]
    fn duplicate_edit_is_discarded() {
        let engine = engine();
        engine.add_document(&doc("x")).unwrap();
        let msg = message(vec![peer_edit(0, 0, "x", vec![Diff::add("/1", "y")])]);

        engine.patch(&msg).unwrap();
        let outcome = engine.patch(&msg).unwrap();
        assert_eq!(outcome.discarded, 1);
        assert!(outcome.is_noop());
        assert_eq!(engine.document(&key()).unwrap().unwrap().content, "xy");
        assert_eq!(versions(&engine), (0, 1));
    }

    #[test]
    fn edit_ahead_of_shadow_is_version_mismatch() {
        let engine = engine();
        engine.add_document(&doc("x")).unwrap();

        let err = engine
            .patch(&message(vec![peer_edit(0, 3, "x", vec![])]))
            .unwrap_err();
        assert!(matches!(err, SyncError::VersionMismatch { edit_index: 0, .. }));
        assert!(err.is_recoverable());
        assert_eq!(versions(&engine), (0, 0));
    }

    #[test]
    fn checksum_mismatch_without_backup_fails() {
        let engine = engine();
        engine.add_document(&doc("abc")).unwrap();

        let err = engine
            .patch(&message(vec![peer_edit(0, 0, "zzz", vec![])]))
            .unwrap_err();
        match &err {
            SyncError::DesyncUnrecoverable { cause, .. } => {
                assert!(matches!(**cause, SyncError::ChecksumMismatch { .. }))
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(
            engine.shadow(&key()).unwrap().unwrap(),
            ShadowDocument::initial(doc("abc"))
        );
        assert_eq!(engine.state(&key()).unwrap(), Some(SyncState::Failed));
        assert!(engine.store().is_failed(&key()).unwrap());
        assert!(matches!(
            engine.diff(&doc("abcd")),
            Err(SyncError::ReseedRequired(_))
        ));

        engine.reset_document(&doc("abc")).unwrap();
        assert_eq!(engine.state(&key()).unwrap(), Some(SyncState::Unsynced));
        assert!(!engine.store().is_failed(&key()).unwrap());
        assert!(engine.diff(&doc("abcd")).is_ok());
    }

    #[test]
    fn failed_state_survives_a_new_engine() {
        let store = Arc::new(InMemoryDataStore::<String>::new());
        let first = SyncEngine::with_shared_store(EngineConfig::default(), TextSynchronizer, store.clone());
        first.add_document(&doc("abc")).unwrap();
        assert!(first
            .patch(&message(vec![peer_edit(0, 0, "zzz", vec![])]))
            .is_err());
        drop(first);

        let second = SyncEngine::with_shared_store(EngineConfig::default(), TextSynchronizer, store);
        assert_eq!(second.state(&key()).unwrap(), Some(SyncState::Failed));
        assert!(matches!(
            second.diff(&doc("abcd")),
            Err(SyncError::ReseedRequired(_))
        ));
        assert!(matches!(
            second.patch(&message(vec![peer_edit(0, 0, "abc", vec![])])),
            Err(SyncError::ReseedRequired(_))
        ));

        second.reset_document(&doc("abc")).unwrap();
        assert_eq!(second.state(&key()).unwrap(), Some(SyncState::Unsynced));
        assert!(second.diff(&doc("abcd")).is_ok());
    }

    #[test]
    fn lost_local_edit_recovers_from_backup() {
        let engine = engine();
        engine.add_document(&doc("foo")).unwrap();
        // Local edit never reaches the peer.
        engine.diff(&doc("foo!")).unwrap();

        let outcome = engine
            .patch(&message(vec![peer_edit(
                0,
                0,
                "foo",
                vec![Diff::add("/0", ">")],
            )]))
            .unwrap();
        assert_eq!(outcome.recovered, 1);
        assert_eq!(engine.document(&key()).unwrap().unwrap().content, ">foo!");
        assert_eq!(engine.state(&key()).unwrap(), Some(SyncState::Desynced));

        let resync = outcome.resync.unwrap();
        assert_eq!(resync.edits.len(), 1);
        let edit = &resync.edits[0];
        assert_eq!((edit.client_version, edit.server_version), (0, 1));
        assert_eq!(edit.checksum, checksum(">foo"));
        assert_eq!(engine.pending_edits(&key()).unwrap(), resync.edits);
        assert_eq!(versions(&engine), (1, 1));
    }

    #[test]
    fn concurrent_peer_edit_after_two_unsent_local_edits() {
        let engine = engine();
        engine.add_document(&doc("a")).unwrap();
        engine.diff(&doc("ab")).unwrap();
        engine.diff(&doc("abc")).unwrap();
        let backup = engine.backup_shadow(&key()).unwrap().unwrap();
        assert_eq!((backup.client_version, backup.shadow.content().as_str()), (0, "a"));

        // Neither local edit arrived; the peer edited the shared base.
        let outcome = engine
            .patch(&message(vec![peer_edit(0, 0, "a", vec![Diff::add("/0", ">")])]))
            .unwrap();
        assert_eq!(outcome.recovered, 1);
        assert_eq!(engine.document(&key()).unwrap().unwrap().content, ">abc");
        assert_eq!(engine.state(&key()).unwrap(), Some(SyncState::Desynced));

        let resync = outcome.resync.unwrap();
        assert_eq!(resync.edits.len(), 1);
        let edit = &resync.edits[0];
        assert_eq!((edit.client_version, edit.server_version), (0, 1));
        assert_eq!(edit.checksum, checksum(">a"));
        assert_eq!(TextSynchronizer.apply(&edit.diffs, &">a".to_string()).unwrap(), ">abc");
        assert_eq!(versions(&engine), (1, 1));
    }

    #[test]
    fn recovery_replays_local_edits_the_peer_applied() {
        let engine = engine();
        engine.add_document(&doc("a")).unwrap();
        engine.diff(&doc("ab")).unwrap();
        engine.diff(&doc("abc")).unwrap();

        // The peer applied only the first local edit before editing.
        let outcome = engine
            .patch(&message(vec![peer_edit(1, 0, "ab", vec![Diff::add("/0", ">")])]))
            .unwrap();
        assert_eq!(outcome.recovered, 1);
        assert_eq!(engine.document(&key()).unwrap().unwrap().content, ">abc");

        let resync = outcome.resync.unwrap();
        assert_eq!(resync.edits.len(), 1);
        let edit = &resync.edits[0];
        assert_eq!((edit.client_version, edit.server_version), (1, 1));
        assert_eq!(edit.checksum, checksum(">ab"));
        assert_eq!(edit.diffs, vec![Diff::add("/3", "c")]);
        assert_eq!(versions(&engine), (2, 1));
    }

    #[test]
    fn failure_reports_index_and_commits_nothing() {
        let engine = engine();
        engine.add_document(&doc("ab")).unwrap();

        let good = peer_edit(0, 0, "ab", vec![Diff::add("/2", "c")]);
        let bad = peer_edit(0, 1, "nope", vec![]);
        let err = engine.patch(&message(vec![good, bad])).unwrap_err();
        assert_eq!(err.edit_index(), Some(1));
        assert_eq!(versions(&engine), (0, 0));
        assert_eq!(engine.document(&key()).unwrap().unwrap().content, "ab");
    }

    #[test]
    fn patch_failure_falls_back_to_backup_check() {
        let engine = engine();
        engine.add_document(&doc("ab")).unwrap();

        let err = engine
            .patch(&message(vec![peer_edit(
                0,
                0,
                "ab",
                vec![Diff::remove("/0", Some("zz".into()))],
            )]))
            .unwrap_err();
        match err {
            SyncError::DesyncUnrecoverable { cause, .. } => {
                assert!(matches!(*cause, SyncError::PatchApplication { .. }))
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn pending_limit() {
        let engine = engine_with(EngineConfig::new().with_max_pending_edits(1));
        engine.add_document(&doc("a")).unwrap();
        engine.diff(&doc("ab")).unwrap();

        let err = engine.diff(&doc("abc")).unwrap_err();
        assert!(matches!(err, SyncError::PendingLimitExceeded { limit: 1, .. }));
        assert_eq!(versions(&engine), (1, 0));
        // Unchanged content still produces the retransmission.
        assert_eq!(engine.diff(&doc("ab")).unwrap().edits.len(), 1);
    }

    #[test]
    fn encoded_patch() {
        let engine = engine();
        engine.add_document(&doc("x")).unwrap();

        let text = message(vec![peer_edit(0, 0, "x", vec![Diff::add("/0", "<")])]).encode();
        engine.patch_encoded(&text).unwrap();
        assert_eq!(engine.document(&key()).unwrap().unwrap().content, "<x");

        assert!(matches!(
            engine.patch_encoded("{\"msgType\":\"patch\"}"),
            Err(SyncError::Decode(_))
        ));
    }

    #[test]
    fn add_and_detach_messages() {
        let engine = engine();
        assert!(engine.detach_message(&key()).is_err());
        engine.add_document(&doc("hi")).unwrap();

        let add = engine.add_message(&key()).unwrap();
        assert_eq!(add.content, serde_json::json!("hi"));
        assert_eq!(add.document_id, "notes");
        let detach = engine.detach_message(&key()).unwrap();
        assert_eq!(detach.client_id, "alice");
    }

    /// Store whose writes can be switched to fail.
    struct FailingStore {
        inner: InMemoryDataStore<String>,
        fail_writes: AtomicBool,
    }

    impl FailingStore {
        fn new() -> Self {
            Self {
                inner: InMemoryDataStore::new(),
                fail_writes: AtomicBool::new(false),
            }
        }

        fn set_failing(&self, failing: bool) {
            self.fail_writes.store(failing, Ordering::SeqCst);
        }

        fn check(&self) -> StoreResult<()> {
            if self.fail_writes.load(Ordering::SeqCst) {
                Err(StoreError::backend("write refused"))
            } else {
                Ok(())
            }
        }
    }

    impl DataStore<String> for FailingStore {
        fn save_client_document(&self, document: &ClientDocument<String>) -> StoreResult<()> {
            self.check()?;
            self.inner.save_client_document(document)
        }
        fn get_client_document(&self, key: &DocumentKey) -> StoreResult<Option<ClientDocument<String>>> {
            self.inner.get_client_document(key)
        }
        fn save_shadow(&self, shadow: &ShadowDocument<String>) -> StoreResult<()> {
            self.check()?;
            self.inner.save_shadow(shadow)
        }
        fn get_shadow(&self, key: &DocumentKey) -> StoreResult<Option<ShadowDocument<String>>> {
            self.inner.get_shadow(key)
        }
        fn save_backup_shadow(&self, backup: &BackupShadowDocument<String>) -> StoreResult<()> {
            self.check()?;
            self.inner.save_backup_shadow(backup)
        }
        fn get_backup_shadow(
            &self,
            key: &DocumentKey,
        ) -> StoreResult<Option<BackupShadowDocument<String>>> {
            self.inner.get_backup_shadow(key)
        }
        fn save_edit(&self, edit: &Edit) -> StoreResult<()> {
            self.check()?;
            self.inner.save_edit(edit)
        }
        fn get_edits(&self, key: &DocumentKey) -> StoreResult<Vec<Edit>> {
            self.inner.get_edits(key)
        }
        fn remove_edit(&self, edit: &Edit) -> StoreResult<()> {
            self.check()?;
            self.inner.remove_edit(edit)
        }
        fn remove_edits(&self, key: &DocumentKey) -> StoreResult<()> {
            self.check()?;
            self.inner.remove_edits(key)
        }
        fn remove_document(&self, key: &DocumentKey) -> StoreResult<()> {
            self.check()?;
            self.inner.remove_document(key)
        }
        fn write(&self, batch: &WriteBatch<String>) -> StoreResult<()> {
            self.check()?;
            self.inner.write(batch)
        }
        fn is_failed(&self, key: &DocumentKey) -> StoreResult<bool> {
            self.inner.is_failed(key)
        }
    }

    #[test]
    fn failed_write_leaves_state_retryable() {
        let engine = SyncEngine::new(EngineConfig::default(), TextSynchronizer, FailingStore::new());
        engine.add_document(&doc("a")).unwrap();
        engine.diff(&doc("ab")).unwrap();

        engine.store().set_failing(true);
        assert!(matches!(engine.diff(&doc("abc")), Err(SyncError::Store(_))));
        engine.store().set_failing(false);

        let shadow = engine.shadow(&key()).unwrap().unwrap();
        assert_eq!((shadow.client_version, shadow.content().as_str()), (1, "ab"));
        assert_eq!(engine.pending_edits(&key()).unwrap().len(), 1);

        let msg = engine.diff(&doc("abc")).unwrap();
        let versions: Vec<u64> = msg.edits.iter().map(|e| e.client_version).collect();
        assert_eq!(versions, vec![0, 1]);

        let ack = message(vec![peer_edit(2, 0, "abc", vec![Diff::add("/3", "!")])]);
        engine.store().set_failing(true);
        assert!(engine.patch(&ack).is_err());
        engine.store().set_failing(false);
        assert_eq!(engine.pending_edits(&key()).unwrap().len(), 2);
        assert_eq!(engine.document(&key()).unwrap().unwrap().content, "abc");

        assert_eq!(engine.patch(&ack).unwrap().applied, 1);
        assert!(engine.pending_edits(&key()).unwrap().is_empty());
        assert_eq!(engine.document(&key()).unwrap().unwrap().content, "abc!");
    }

    #[test]
    fn remove_document_forgets_everything() {
        let engine = engine();
        engine.add_document(&doc("x")).unwrap();
        engine.diff(&doc("xy")).unwrap();

        assert!(engine.remove_document(&key()).unwrap());
        assert!(!engine.remove_document(&key()).unwrap());
        assert!(!engine.contains(&key()).unwrap());
        assert!(engine.pending_edits(&key()).unwrap().is_empty());
        engine.add_document(&doc("fresh")).unwrap();
    }
}
