//! # MirrorDB Testkit
//!
//! Test utilities for MirrorDB.
//!
//! This crate provides:
//! - Fixtures: sample posts and drafts
//! - A wiring harness: a synced collection over the in-memory server
//! - A recording subscriber capturing every delivered snapshot
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust,ignore
//! use mirrordb_testkit::prelude::*;
//!
//! #[test]
//! fn optimistic_insert() {
//!     let harness = TestCollection::seeded(3);
//!     let recorder = RecordingSubscriber::new();
//!     let _sub = harness.subscribe(Query::all(), recorder.callback());
//!     // ... drive mutations, assert on recorder.snapshots()
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod harness;
pub mod recorder;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::fixtures::{draft, sample_post, sample_posts};
    pub use crate::harness::TestCollection;
    pub use crate::recorder::RecordingSubscriber;
    pub use mirrordb_core::{Query, SortOrder};
    pub use mirrordb_protocol::{Post, PostDraft, PostId, PostPatch};
}
