//! # DiffSync Engine
//!
//! Client-side differential synchronization engine.
//!
//! This crate provides:
//! - The [`ClientSynchronizer`] capability trait (diff, patch, checksum)
//! - [`TextSynchronizer`] for plain text and [`JsonSynchronizer`] for JSON trees
//! - The [`SyncEngine`] state machine over a [`DataStore`](diffsync_store::DataStore)
//! - Backup-shadow recovery from detected desynchronization
//!
//! ## Architecture
//!
//! Each (document, client) pair owns a *shadow*: the engine's belief of what
//! the peer last acknowledged. Outgoing edits are diffs of the live document
//! against the shadow; incoming edits are applied strictly to the shadow and
//! leniently to the live document.
//!
//! 1. `diff` computes an edit, advances the shadow's client version and
//!    queues the edit as pending
//! 2. The host sends every pending edit in one `PatchMessage`
//! 3. `patch` applies the peer's edits and drops the pending edits the peer
//!    acknowledged
//!
//! ## Key Invariants
//!
//! - Exactly one shadow per (document, client) pair
//! - An edit is only trusted if its checksum matches the local shadow
//! - Operations on one pair are serialized; distinct pairs run in parallel
//! - State is written to the store only after an operation fully succeeded,
//!   as one all-or-nothing [`WriteBatch`](diffsync_store::WriteBatch)
//! - While edits are pending, the backup shadow is the base of the oldest one
//!
//! ## Example
//!
//! ```
//! use diffsync_engine::{EngineConfig, SyncEngine, TextSynchronizer};
//! use diffsync_protocol::ClientDocument;
//! use diffsync_store::InMemoryDataStore;
//!
//! let engine = SyncEngine::new(
//!     EngineConfig::default(),
//!     TextSynchronizer::new(),
//!     InMemoryDataStore::<String>::new(),
//! );
//!
//! let doc = ClientDocument::new("notes", "alice", "foo".to_string());
//! engine.add_document(&doc).unwrap();
//!
//! let message = engine.diff(&doc.with_content("foobar".to_string())).unwrap();
//! assert_eq!(message.edits.len(), 1);
//! assert_eq!(engine.pending_edits(&doc.key()).unwrap().len(), 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod engine;
mod error;
mod json;
mod state;
mod synchronizer;
mod text;

pub use config::{AddPolicy, EngineConfig};
pub use engine::SyncEngine;
pub use error::{SyncError, SyncResult};
pub use json::JsonSynchronizer;
pub use state::{PatchOutcome, SyncState};
pub use synchronizer::{checksum_bytes, ClientSynchronizer};
pub use text::TextSynchronizer;
