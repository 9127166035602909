//! Per-document sync state and patch results.

use diffsync_protocol::PatchMessage;

/// Where a (document, client) pair stands in the sync cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// Tracked, but no peer edit has been applied since it was added.
    Unsynced,
    /// The last inbound message applied cleanly.
    Synced,
    /// Desync was repaired from the backup shadow; a corrective message is
    /// waiting for the peer.
    Desynced,
    /// Desync could not be repaired. The pair must be re-seeded.
    Failed,
}

impl SyncState {
    /// Returns true if the pair accepts `diff` and `patch` calls.
    pub fn is_usable(&self) -> bool {
        !matches!(self, SyncState::Failed)
    }

    /// Returns true if the pair has exchanged at least one edit.
    pub fn has_synced(&self) -> bool {
        matches!(self, SyncState::Synced | SyncState::Desynced)
    }
}

/// What a call to [`SyncEngine::patch`](crate::SyncEngine::patch) did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PatchOutcome {
    /// Edits applied to the shadow.
    pub applied: usize,
    /// Edits skipped as already applied.
    pub discarded: usize,
    /// Edits applied after restoring the backup shadow.
    pub recovered: usize,
    /// Message to send to the peer after a backup restore.
    pub resync: Option<PatchMessage>,
}

impl PatchOutcome {
    /// Returns true if the message changed nothing.
    pub fn is_noop(&self) -> bool {
        self.applied == 0 && self.recovered == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_predicates() {
        assert!(SyncState::Unsynced.is_usable());
        assert!(!SyncState::Unsynced.has_synced());
        assert!(SyncState::Desynced.has_synced());
        assert!(!SyncState::Failed.is_usable());
    }

    #[test]
    fn outcome_noop() {
        assert!(PatchOutcome::default().is_noop());
        let outcome = PatchOutcome {
            discarded: 3,
            ..Default::default()
        };
        assert!(outcome.is_noop());
    }
}
