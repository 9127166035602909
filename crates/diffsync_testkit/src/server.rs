//! A reference server peer.
//!
//! [`LoopbackServer`] plays the other side of the protocol for one
//! (document, client) pair. It keeps its own shadow, increments its server
//! version for every edit it sends, and retransmits sent edits until the
//! client acknowledges them. For each unacknowledged edit it remembers the
//! shadow the edit was computed against, so a client that missed replies
//! can be caught up from whichever one it last saw.

use diffsync_engine::{ClientSynchronizer, SyncError, SyncResult};
use diffsync_protocol::{ClientDocument, DocumentKey, Edit, PatchMessage, ShadowDocument};

/// In-process server peer for one document pair.
pub struct LoopbackServer<S: ClientSynchronizer> {
    synchronizer: S,
    document: ClientDocument<S::Content>,
    shadow: ShadowDocument<S::Content>,
    sent: Vec<(Edit, ShadowDocument<S::Content>)>,
}

impl<S: ClientSynchronizer> LoopbackServer<S> {
    /// Creates a server that starts from the same content as the client.
    pub fn new(synchronizer: S, key: &DocumentKey, content: S::Content) -> Self {
        let document = ClientDocument::new(key.document_id.clone(), key.client_id.clone(), content);
        let shadow = ShadowDocument::initial(document.clone());
        Self {
            synchronizer,
            shadow,
            document,
            sent: Vec::new(),
        }
    }

    /// Returns the server's live content.
    pub fn content(&self) -> &S::Content {
        &self.document.content
    }

    /// Returns the server's shadow of the client.
    pub fn shadow(&self) -> &ShadowDocument<S::Content> {
        &self.shadow
    }

    /// Returns the number of edits sent but not yet acknowledged.
    pub fn unacknowledged(&self) -> usize {
        self.sent.len()
    }

    /// Replaces the server's live content, as another client would.
    pub fn set_content(&mut self, content: S::Content) {
        self.document = self.document.with_content(content);
    }

    /// Applies a client message. Returns the number of edits applied.
    pub fn receive(&mut self, message: &PatchMessage) -> SyncResult<usize> {
        let key = message.key();
        let mut applied = 0;

        for (index, edit) in message.edits.iter().enumerate() {
            self.sent
                .retain(|(sent, _)| sent.server_version >= edit.server_version);

            if edit.client_version < self.shadow.client_version {
                continue;
            }
            if edit.client_version > self.shadow.client_version {
                return Err(SyncError::version_mismatch(&key, index, edit, &self.shadow));
            }

            let checksum = self.synchronizer.checksum(self.shadow.content());
            if edit.server_version != self.shadow.server_version || checksum != edit.checksum {
                let snapshot = self.sent.iter().map(|(_, before)| before).find(|before| {
                    before.client_version == edit.client_version
                        && before.server_version == edit.server_version
                        && self.synchronizer.checksum(before.content()) == edit.checksum
                });
                if let Some(before) = snapshot {
                    self.shadow = before.clone();
                    self.sent.clear();
                } else {
                    return Err(SyncError::DesyncUnrecoverable {
                        key: key.clone(),
                        edit_index: index,
                        cause: Box::new(SyncError::ChecksumMismatch {
                            key: key.clone(),
                            expected: edit.checksum.clone(),
                            actual: checksum,
                        }),
                    });
                }
            }

            let content = self.synchronizer.apply(&edit.diffs, self.shadow.content())?;
            let client_version = self.shadow.client_version + u64::from(!edit.is_empty());
            self.shadow = ShadowDocument::new(
                self.shadow.client_document.with_content(content),
                client_version,
                self.shadow.server_version,
            );
            self.document = self.synchronizer.patch_document(edit, &self.document);
            applied += 1;
        }

        Ok(applied)
    }

    /// Diffs the live content against the shadow and returns every
    /// unacknowledged edit, the new one last.
    pub fn reply(&mut self) -> PatchMessage {
        let edit = self.synchronizer.client_diff(&self.shadow, &self.document);
        let next = ShadowDocument::new(
            self.document.clone(),
            self.shadow.client_version,
            self.shadow.server_version + 1,
        );
        let before = std::mem::replace(&mut self.shadow, next);
        self.sent.push((edit, before));
        PatchMessage::new(
            self.document.id.clone(),
            self.document.client_id.clone(),
            self.sent.iter().map(|(edit, _)| edit.clone()).collect(),
        )
    }
}
