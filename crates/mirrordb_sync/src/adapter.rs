//! Sync adapter: mutations in, verdicts out.
//!
//! The adapter is the only component allowed to perform I/O. It maps
//! each mutation kind onto one call of the external CRUD contract,
//! validates every value crossing the boundary (outbound drafts and
//! patches, inbound canonical posts), and never lets a transport
//! error escape as anything but a [`SyncFailure`].

use crate::transport::RestTransport;
use mirrordb_core::{Mutation, MutationAck, SyncFailure, Transaction};
use mirrordb_protocol::{Post, PostId};
use std::sync::Arc;
use tracing::{debug, warn};

/// Translates transactions into external CRUD calls and normalizes
/// the results.
pub struct SyncAdapter<T: RestTransport> {
    transport: Arc<T>,
}

impl<T: RestTransport> SyncAdapter<T> {
    /// Creates an adapter over the given transport.
    pub fn new(transport: Arc<T>) -> Self {
        Self { transport }
    }

    /// Returns the underlying transport.
    #[must_use]
    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    /// Sends one mutation to the external store.
    ///
    /// Insert maps to create, update to a partial update carrying only
    /// the patched fields, delete to remove. Any failure (validation,
    /// transport, server) comes back as the `Err` variant; this
    /// method does not panic.
    pub fn send(&self, mutation: &Mutation) -> Result<MutationAck, SyncFailure> {
        match mutation {
            Mutation::Insert { draft, .. } => {
                draft
                    .validate()
                    .map_err(|e| SyncFailure::rejected(e.to_string()))?;
                let canonical = self.transport.create(draft)?;
                Ok(MutationAck::with_canonical(self.admit(canonical)?))
            }
            Mutation::Update { original, patch, .. } => {
                patch
                    .validate()
                    .map_err(|e| SyncFailure::rejected(e.to_string()))?;
                let canonical = self.transport.update(original.id, patch)?;
                Ok(MutationAck::with_canonical(self.admit(canonical)?))
            }
            Mutation::Delete { original } => {
                self.transport.remove(original.id)?;
                Ok(MutationAck::acknowledged())
            }
        }
    }

    /// Sends a transaction's mutations in order, fail-fast.
    ///
    /// Returns one acknowledgment per mutation on success; the first
    /// failure aborts the rest (the whole transaction rolls back
    /// anyway).
    pub fn push(&self, txn: &Transaction) -> Result<Vec<MutationAck>, SyncFailure> {
        let mut acks = Vec::with_capacity(txn.mutation_count());
        for mutation in txn.mutations() {
            debug!(txn = %txn.id(), kind = %mutation.kind(), key = %mutation.key(), "pushing mutation");
            match self.send(mutation) {
                Ok(ack) => acks.push(ack),
                Err(failure) => {
                    warn!(txn = %txn.id(), %failure, "push failed");
                    return Err(failure);
                }
            }
        }
        Ok(acks)
    }

    /// Fetches one post from the server, validated.
    pub fn fetch_one(&self, id: PostId) -> Result<Post, SyncFailure> {
        let post = self.transport.fetch(id)?;
        self.admit(post)
    }

    /// Fetches the full server listing, validated.
    pub fn fetch_all(&self) -> Result<Vec<Post>, SyncFailure> {
        let posts = self.transport.list()?;
        posts
            .into_iter()
            .map(|post| self.admit(post))
            .collect()
    }

    /// Admits an inbound post into the local mirror, rejecting
    /// malformed payloads before they reach the store.
    fn admit(&self, post: Post) -> Result<Post, SyncFailure> {
        post.validate_canonical()
            .map_err(|e| SyncFailure::malformed(e.to_string()))?;
        Ok(post)
    }
}

impl<T: RestTransport> Clone for SyncAdapter<T> {
    fn clone(&self) -> Self {
        Self {
            transport: Arc::clone(&self.transport),
        }
    }
}
