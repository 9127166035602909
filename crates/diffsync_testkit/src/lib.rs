//! # DiffSync Testkit
//!
//! Test utilities for DiffSync.
//!
//! This crate provides:
//! - Engine and store fixtures
//! - A reference server peer ([`LoopbackServer`])
//! - Scripted lossy channels and a client/server round harness
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust
//! use diffsync_testkit::prelude::*;
//!
//! let mut harness = SyncHarness::new(memory_text_engine(), &text_document("foo")).unwrap();
//! harness.round(Some("foobar".to_string())).unwrap();
//! harness.settle(1).unwrap();
//! assert!(harness.is_converged().unwrap());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod channel;
pub mod fixtures;
pub mod generators;
pub mod harness;
pub mod server;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::channel::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::harness::*;
    pub use crate::server::*;
}

pub use channel::*;
pub use fixtures::*;
pub use generators::*;
pub use harness::*;
pub use server::*;
