//! Client documents and their shadows.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Generates a fresh random client identifier.
pub fn generate_client_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Addresses one synchronized (document, client) pair.
///
/// Every piece of engine state (shadow, backup, pending edits) is keyed by
/// this pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentKey {
    /// Document identifier.
    pub document_id: String,
    /// Client identifier.
    pub client_id: String,
}

impl DocumentKey {
    /// Creates a new key.
    pub fn new(document_id: impl Into<String>, client_id: impl Into<String>) -> Self {
        Self {
            document_id: document_id.into(),
            client_id: client_id.into(),
        }
    }
}

impl fmt::Display for DocumentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.document_id, self.client_id)
    }
}

/// The application's live copy of a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientDocument<T> {
    /// Document identifier.
    pub id: String,
    /// Client identifier.
    pub client_id: String,
    /// Opaque document content.
    pub content: T,
}

impl<T> ClientDocument<T> {
    /// Creates a new client document.
    pub fn new(id: impl Into<String>, client_id: impl Into<String>, content: T) -> Self {
        Self {
            id: id.into(),
            client_id: client_id.into(),
            content,
        }
    }

    /// Returns the key of this document.
    pub fn key(&self) -> DocumentKey {
        DocumentKey::new(self.id.clone(), self.client_id.clone())
    }

    /// Returns a copy of this document carrying different content.
    pub fn with_content(&self, content: T) -> Self {
        Self {
            id: self.id.clone(),
            client_id: self.client_id.clone(),
            content,
        }
    }
}

/// The engine's belief of the last document state acknowledged by the peer.
///
/// # Invariants
///
/// - Exactly one shadow exists per (document, client) pair
/// - `client_version` increments once per accepted outgoing edit
/// - `server_version` increments once per successfully applied inbound edit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShadowDocument<T> {
    /// Shadowed copy of the client document.
    pub client_document: ClientDocument<T>,
    /// Number of outgoing edits taken into this shadow.
    pub client_version: u64,
    /// Number of inbound edits applied to this shadow.
    pub server_version: u64,
}

impl<T> ShadowDocument<T> {
    /// Creates a shadow at the given versions.
    pub fn new(client_document: ClientDocument<T>, client_version: u64, server_version: u64) -> Self {
        Self {
            client_document,
            client_version,
            server_version,
        }
    }

    /// Creates the initial shadow (versions 0/0) for a document.
    pub fn initial(client_document: ClientDocument<T>) -> Self {
        Self::new(client_document, 0, 0)
    }

    /// Returns the key of the shadowed document.
    pub fn key(&self) -> DocumentKey {
        self.client_document.key()
    }

    /// Returns the shadowed content.
    pub fn content(&self) -> &T {
        &self.client_document.content
    }
}

/// A one-step-back checkpoint of a shadow.
///
/// Only consulted when a desynchronization is detected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupShadowDocument<T> {
    /// The checkpointed shadow.
    pub shadow: ShadowDocument<T>,
    /// Client version at the time of the checkpoint.
    pub client_version: u64,
}

impl<T> BackupShadowDocument<T> {
    /// Checkpoints a shadow.
    pub fn of(shadow: ShadowDocument<T>) -> Self {
        let client_version = shadow.client_version;
        Self {
            shadow,
            client_version,
        }
    }
}
