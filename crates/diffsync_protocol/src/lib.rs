//! # DiffSync Protocol
//!
//! Data model and wire messages for differential synchronization.
//!
//! This crate provides:
//! - [`ClientDocument`], [`ShadowDocument`] and [`BackupShadowDocument`]
//! - [`Edit`] and [`Diff`] for versioned, checksummed patch transmissions
//! - Protocol messages ([`SyncMessage`]: add, patch, detach)
//! - JSON wire encoding with fully fallible decoding
//!
//! This is a pure protocol crate with no I/O operations.
//!
//! ## Wire Shape
//!
//! ```text
//! { "msgType": "patch", "id": "...", "clientId": "...",
//!   "edits": [ { "clientVersion": 0, "serverVersion": 0, "checksum": "...",
//!                "diffs": [ { "op": "add", "path": "/0", "value": "x" } ] } ] }
//! ```
//!
//! ## Example
//!
//! ```
//! use diffsync_protocol::{Diff, Edit, PatchMessage, SyncMessage};
//!
//! let edit = Edit::new("doc", "client", 0, 0, "abc")
//!     .with_diffs(vec![Diff::add("/3", "!")]);
//! let message = SyncMessage::Patch(PatchMessage::new("doc", "client", vec![edit]));
//!
//! let text = message.encode();
//! let decoded = SyncMessage::decode(&text).unwrap();
//! assert_eq!(decoded, message);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod codec;
mod document;
mod edit;
mod error;
mod messages;

pub use document::{generate_client_id, BackupShadowDocument, ClientDocument, DocumentKey, ShadowDocument};
pub use edit::{Diff, Edit, Operation};
pub use error::{DecodeError, DecodeResult};
pub use messages::{AddMessage, DetachMessage, PatchMessage, SyncMessage};
