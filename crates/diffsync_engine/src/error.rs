//! Error types for the sync engine.

use diffsync_protocol::{DecodeError, DocumentKey, Edit, ShadowDocument};
use diffsync_store::StoreError;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during sync operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// No shadow is tracked for the key.
    #[error("document not found: {0}")]
    DocumentNotFound(DocumentKey),

    /// A different document is already tracked under the key.
    #[error("document already exists: {0}")]
    DocumentAlreadyExists(DocumentKey),

    /// An inbound edit references versions this side never produced.
    #[error(
        "version mismatch for {key} at edit {edit_index}: \
         shadow=({shadow_client}, {shadow_server}), edit=({edit_client}, {edit_server})"
    )]
    VersionMismatch {
        /// Document key.
        key: DocumentKey,
        /// Index of the offending edit within its message.
        edit_index: usize,
        /// Client version of the local shadow.
        shadow_client: u64,
        /// Server version of the local shadow.
        shadow_server: u64,
        /// Client version carried by the edit.
        edit_client: u64,
        /// Server version carried by the edit.
        edit_server: u64,
    },

    /// The edit was computed against content that differs from the shadow.
    #[error("checksum mismatch for {key}: expected {expected}, actual {actual}")]
    ChecksumMismatch {
        /// Document key.
        key: DocumentKey,
        /// Checksum carried by the edit.
        expected: String,
        /// Checksum of the local shadow.
        actual: String,
    },

    /// Desync was detected and the backup shadow could not resolve it.
    #[error("unrecoverable desync for {key} at edit {edit_index}: {cause}")]
    DesyncUnrecoverable {
        /// Document key.
        key: DocumentKey,
        /// Index of the offending edit within its message.
        edit_index: usize,
        /// What triggered the recovery attempt.
        #[source]
        cause: Box<SyncError>,
    },

    /// The pair failed earlier and must be re-seeded before further use.
    #[error("document {0} must be re-seeded after an unrecoverable desync")]
    ReseedRequired(DocumentKey),

    /// A diff could not be applied to the content.
    #[error("patch failed at {path:?}: {message}")]
    PatchApplication {
        /// Target path of the failing diff.
        path: String,
        /// Description of the failure.
        message: String,
    },

    /// Too many edits are awaiting acknowledgement.
    #[error("pending edit limit of {limit} reached for {key}")]
    PendingLimitExceeded {
        /// Document key.
        key: DocumentKey,
        /// Configured limit.
        limit: usize,
    },

    /// Store error.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Message decode error.
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    /// Content could not be converted to or from JSON.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SyncError {
    /// Creates a patch application error.
    pub fn patch(path: impl Into<String>, message: impl Into<String>) -> Self {
        SyncError::PatchApplication {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates a version mismatch error for `edit` against `shadow`.
    pub fn version_mismatch<T>(
        key: &DocumentKey,
        edit_index: usize,
        edit: &Edit,
        shadow: &ShadowDocument<T>,
    ) -> Self {
        SyncError::VersionMismatch {
            key: key.clone(),
            edit_index,
            shadow_client: shadow.client_version,
            shadow_server: shadow.server_version,
            edit_client: edit.client_version,
            edit_server: edit.server_version,
        }
    }

    /// Returns true if the peer can resolve this by resending state.
    ///
    /// Version and checksum problems are resolved by retransmission or by
    /// the backup shadow; everything else needs the host's attention.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            SyncError::VersionMismatch { .. } | SyncError::ChecksumMismatch { .. }
        )
    }

    /// Returns true if the pair must be re-seeded with a fresh document.
    pub fn requires_reseed(&self) -> bool {
        matches!(
            self,
            SyncError::DesyncUnrecoverable { .. } | SyncError::ReseedRequired(_)
        )
    }

    /// Returns the index of the failing edit, if the error names one.
    pub fn edit_index(&self) -> Option<usize> {
        match self {
            SyncError::VersionMismatch { edit_index, .. }
            | SyncError::DesyncUnrecoverable { edit_index, .. } => Some(*edit_index),
            _ => None,
        }
    }
}
