//! # MirrorDB Sync
//!
//! The remote half of the posts mirror: transports for the external
//! CRUD API, the sync adapter that pushes transactions through them,
//! and the [`SyncedCollection`] facade tying everything to the core
//! engine.
//!
//! This crate provides:
//! - `RestTransport` trait with HTTP and mock implementations
//! - `HttpClient` abstraction (bring your own HTTP library)
//! - An in-memory reference server speaking the exact API contract
//! - The synced collection: optimistic writes, live queries, refresh
//!
//! ## Architecture
//!
//! Mutations flow one way: the collection snapshots a request into a
//! transaction, the core applies it optimistically, a worker thread
//! pushes it through the adapter, and the verdict resolves the
//! transaction: canonical values on commit, rollback on any failure.
//! The adapter is the only component that performs I/O.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod adapter;
mod collection;
mod config;
mod http;
mod server;
mod transport;

pub use adapter::SyncAdapter;
pub use collection::{MutationRequest, PendingTransaction, SyncedCollection};
pub use config::{RetryConfig, SyncConfig};
pub use http::{HttpClient, HttpResponse, HttpTransport, Method};
pub use server::{InMemoryServer, LoopbackClient};
pub use transport::{MockTransport, RestTransport};
