//! Edits and diff operations.

use crate::document::DocumentKey;
use serde::{Deserialize, Serialize};

/// Kind of a single diff step.
///
/// The meaning of each operation depends on the content type the
/// synchronizer works with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    /// Insert a value at a path.
    Add,
    /// Remove the value at a path.
    Remove,
    /// Replace the value at a path.
    Replace,
    /// Assert the value at a path.
    Test,
}

impl Operation {
    /// Returns the wire name of the operation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Add => "add",
            Operation::Remove => "remove",
            Operation::Replace => "replace",
            Operation::Test => "test",
        }
    }

    /// Parses a wire name.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "add" => Some(Operation::Add),
            "remove" => Some(Operation::Remove),
            "replace" => Some(Operation::Replace),
            "test" => Some(Operation::Test),
            _ => None,
        }
    }
}

/// One ordered step of an edit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diff {
    /// Operation kind.
    #[serde(rename = "op")]
    pub operation: Operation,
    /// Location the operation applies to.
    pub path: String,
    /// Operand, absent when the operation takes none.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

impl Diff {
    /// Creates a diff step.
    pub fn new(operation: Operation, path: impl Into<String>, value: Option<String>) -> Self {
        Self {
            operation,
            path: path.into(),
            value,
        }
    }

    /// Creates an `add` step.
    pub fn add(path: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(Operation::Add, path, Some(value.into()))
    }

    /// Creates a `remove` step.
    pub fn remove(path: impl Into<String>, value: Option<String>) -> Self {
        Self::new(Operation::Remove, path, value)
    }

    /// Creates a `replace` step.
    pub fn replace(path: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(Operation::Replace, path, Some(value.into()))
    }

    /// Creates a `test` step.
    pub fn test(path: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(Operation::Test, path, Some(value.into()))
    }
}

/// One versioned, checksummed patch transmission.
///
/// The `checksum` is computed over the sender's shadow content *before* the
/// diffs are applied; the receiver must compute the same checksum over its
/// own shadow before trusting the diffs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Edit {
    /// Document identifier.
    pub document_id: String,
    /// Client identifier.
    pub client_id: String,
    /// Client version the edit was computed against.
    pub client_version: u64,
    /// Server version the edit was computed against.
    pub server_version: u64,
    /// Checksum of the pre-edit shadow content.
    pub checksum: String,
    /// Ordered diff steps.
    pub diffs: Vec<Diff>,
}

impl Edit {
    /// Creates an edit with no diffs.
    pub fn new(
        document_id: impl Into<String>,
        client_id: impl Into<String>,
        client_version: u64,
        server_version: u64,
        checksum: impl Into<String>,
    ) -> Self {
        Self {
            document_id: document_id.into(),
            client_id: client_id.into(),
            client_version,
            server_version,
            checksum: checksum.into(),
            diffs: Vec::new(),
        }
    }

    /// Sets the diff steps.
    pub fn with_diffs(mut self, diffs: Vec<Diff>) -> Self {
        self.diffs = diffs;
        self
    }

    /// Returns the key this edit belongs to.
    pub fn key(&self) -> DocumentKey {
        DocumentKey::new(self.document_id.clone(), self.client_id.clone())
    }

    /// Returns true if the edit carries no diff steps.
    pub fn is_empty(&self) -> bool {
        self.diffs.is_empty()
    }
}
