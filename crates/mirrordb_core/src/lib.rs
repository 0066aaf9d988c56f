//! # MirrorDB Core
//!
//! The local half of the posts mirror: a keyed entity store with an
//! optimistic overlay per key, a transactional mutation protocol, and
//! a live query engine serving consistent snapshots to subscribers.
//!
//! This crate provides:
//! - Entity store with base + pending-overlay layers per key
//! - Transaction manager (optimistic apply, commit, rollback)
//! - Declarative queries and value-diffed live subscriptions
//!
//! No component here performs I/O; the sync adapter lives in
//! `mirrordb_sync` and feeds verdicts back through
//! [`TransactionManager::resolve`].

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod live;
mod query;
mod store;
mod transaction;
mod types;

pub use error::{CoreError, CoreResult, SyncFailure};
pub use live::{LiveQueryEngine, Subscription};
pub use query::{FilterFn, Query, SortOrder};
pub use store::{ChangeSet, EntityStore, Overlay};
pub use transaction::{
    Mutation, MutationAck, MutationKind, Transaction, TransactionManager, TransactionState,
};
pub use types::{SubscriptionId, TransactionId};
