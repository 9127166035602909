//! Configuration for the sync engine.

/// What `add_document` does when the key already holds a shadow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AddPolicy {
    /// Fail with `DocumentAlreadyExists` unless the content is unchanged.
    #[default]
    Reject,
    /// Discard the existing shadow, backup and pending edits and start over.
    Reset,
}

/// Configuration for a [`SyncEngine`](crate::SyncEngine).
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    /// Behavior when adding a key that is already tracked.
    pub add_policy: AddPolicy,
    /// Maximum number of unacknowledged edits per key. `None` is unbounded.
    pub max_pending_edits: Option<usize>,
}

impl EngineConfig {
    /// Creates the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the add policy.
    pub fn with_add_policy(mut self, policy: AddPolicy) -> Self {
        self.add_policy = policy;
        self
    }

    /// Caps the number of pending edits per key.
    pub fn with_max_pending_edits(mut self, limit: usize) -> Self {
        self.max_pending_edits = Some(limit);
        self
    }
}
