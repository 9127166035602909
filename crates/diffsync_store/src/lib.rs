//! # DiffSync Store
//!
//! Data store trait and implementations for differential sync state.
//!
//! A data store holds, per (document, client) pair:
//! - the client document
//! - the shadow document
//! - the backup shadow document
//! - the pending (unacknowledged) edits, in the order they were produced
//! - a marker set when the pair has to be re-seeded
//!
//! ## Design Principles
//!
//! - Stores are keyed by [`DocumentKey`](diffsync_protocol::DocumentKey)
//! - Each operation is atomic per key; no cross-key transactions are assumed
//! - Multi-record updates to one key go through a [`WriteBatch`]
//! - Stores never interpret content; they only persist it
//! - Must be `Send + Sync` for concurrent access
//!
//! ## Available Stores
//!
//! - [`InMemoryDataStore`] - For testing and single-process use
//! - [`FileDataStore`] - Durable storage, one state file per key
//!
//! ## Example
//!
//! ```rust
//! use diffsync_protocol::{ClientDocument, ShadowDocument};
//! use diffsync_store::{DataStore, InMemoryDataStore};
//!
//! let store = InMemoryDataStore::<String>::new();
//! let doc = ClientDocument::new("notes", "alice", "hello".to_string());
//! store.save_shadow(&ShadowDocument::initial(doc.clone())).unwrap();
//!
//! let shadow = store.get_shadow(&doc.key()).unwrap().unwrap();
//! assert_eq!(shadow.client_version, 0);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod batch;
mod error;
mod file;
mod memory;
mod store;

pub use batch::WriteBatch;
pub use error::{StoreError, StoreResult};
pub use file::{FileDataStore, FileStoreConfig};
pub use memory::InMemoryDataStore;
pub use store::DataStore;
