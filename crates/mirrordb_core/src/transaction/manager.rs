//! Transaction manager.

use crate::error::{CoreError, CoreResult, SyncFailure};
use crate::live::LiveQueryEngine;
use crate::store::{EntityStore, StoreOp};
use crate::transaction::state::{Mutation, MutationAck, Transaction};
use crate::types::TransactionId;
use mirrordb_protocol::PostId;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Groups mutations into atomic units and drives their lifecycle.
///
/// `begin` applies a transaction's overlays to the store synchronously
/// (optimistic read path); `resolve` later promotes them to base or
/// rolls them back, depending on the sync adapter's verdict. A
/// transaction is the unit of atomicity: its mutations commit or roll
/// back together.
///
/// ## Serialization
///
/// At most one pending overlay exists per key. A transaction touching
/// a busy key fails with [`CoreError::Conflict`] before anything is
/// applied; the caller waits for the in-flight transaction and
/// retries. Transactions on disjoint keys proceed fully in parallel,
/// each resolving the moment its own network call returns.
pub struct TransactionManager {
    /// Shared entity store.
    store: Arc<EntityStore>,
    /// Query engine to notify after every state change.
    queries: Arc<LiveQueryEngine>,
    /// Next transaction ID.
    next_txid: AtomicU64,
    /// Next temporary key for optimistic inserts (negative, counting
    /// down).
    next_temp_id: AtomicI64,
    /// Serializes the begin/resolve critical sections.
    write_lock: Mutex<()>,
    /// Transactions awaiting their verdict.
    active: RwLock<Vec<TransactionId>>,
}

impl TransactionManager {
    /// Creates a new transaction manager.
    pub fn new(store: Arc<EntityStore>, queries: Arc<LiveQueryEngine>) -> Self {
        Self {
            store,
            queries,
            next_txid: AtomicU64::new(1),
            next_temp_id: AtomicI64::new(-1),
            write_lock: Mutex::new(()),
            active: RwLock::new(Vec::new()),
        }
    }

    /// Allocates a temporary key for an optimistic insert.
    ///
    /// Temporary keys are negative so they can never collide with a
    /// server-assigned id.
    pub fn temp_id(&self) -> PostId {
        PostId::new(self.next_temp_id.fetch_sub(1, Ordering::SeqCst))
    }

    /// Begins a transaction, applying its mutations optimistically.
    ///
    /// Validates that no mutation's key carries a pending overlay (and
    /// that the transaction does not touch the same key twice); on any
    /// violation the whole transaction is rejected with
    /// [`CoreError::Conflict`] and the store is untouched. On success
    /// every overlay is installed atomically, affected subscriptions
    /// are recomputed synchronously, and the pending transaction is
    /// returned for the caller to hand to the sync adapter.
    pub fn begin(&self, mutations: Vec<Mutation>) -> CoreResult<Transaction> {
        if mutations.is_empty() {
            return Err(CoreError::EmptyTransaction);
        }

        let id = TransactionId::new(self.next_txid.fetch_add(1, Ordering::SeqCst));
        let ops: Vec<StoreOp> = mutations
            .iter()
            .map(|m| StoreOp::ApplyOverlay(m.key(), m.overlay()))
            .collect();

        let changes = {
            let _guard = self.write_lock.lock();
            self.store.apply_batch(ops)?
        };

        self.active.write().push(id);
        debug!(txn = %id, mutations = mutations.len(), "transaction began");

        self.queries.store_changed(&changes);
        Ok(Transaction::new(id, mutations))
    }

    /// Resolves a pending transaction with the sync adapter's verdict.
    ///
    /// On success, every overlay is committed, using the
    /// server-returned canonical values where provided, so the store
    /// converges to server truth even when the optimistic write was
    /// approximate (server-assigned ids, timestamps). On failure,
    /// every overlay is discarded, restoring the pre-mutation values.
    /// Either way the affected subscriptions observe a single
    /// consistent step.
    pub fn resolve(
        &self,
        txn: &mut Transaction,
        outcome: Result<Vec<MutationAck>, SyncFailure>,
    ) -> CoreResult<()> {
        if !txn.is_pending() {
            return Err(CoreError::invalid_operation(format!(
                "{} is not pending",
                txn.id()
            )));
        }

        let changes = match outcome {
            Ok(acks) => {
                if acks.len() != txn.mutation_count() {
                    return Err(CoreError::invalid_operation(format!(
                        "{} expected {} acknowledgments, got {}",
                        txn.id(),
                        txn.mutation_count(),
                        acks.len()
                    )));
                }

                let mut ops = Vec::new();
                for (mutation, ack) in txn.mutations().iter().zip(&acks) {
                    ops.extend(commit_ops(mutation, ack));
                }

                let changes = {
                    let _guard = self.write_lock.lock();
                    self.store.apply_batch(ops)?
                };

                debug!(txn = %txn.id(), "transaction committed");
                txn.mark_committed();
                changes
            }
            Err(failure) => {
                let ops: Vec<StoreOp> = txn
                    .mutations()
                    .iter()
                    .map(|m| StoreOp::DiscardOverlay(m.key()))
                    .collect();

                let changes = {
                    let _guard = self.write_lock.lock();
                    self.store.apply_batch(ops)?
                };

                warn!(txn = %txn.id(), %failure, "transaction rolled back");
                txn.mark_failed(failure);
                changes
            }
        };

        self.finish(txn.id());
        self.queries.store_changed(&changes);
        Ok(())
    }

    /// Returns the number of pending transactions.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.active.read().len()
    }

    fn finish(&self, id: TransactionId) {
        self.active.write().retain(|&t| t != id);
    }
}

/// Store operations that commit one acknowledged mutation.
fn commit_ops(mutation: &Mutation, ack: &MutationAck) -> Vec<StoreOp> {
    let key = mutation.key();
    match &ack.canonical {
        // No canonical value (delete, or a server that returns none):
        // promote the optimistic overlay as-is.
        None => vec![StoreOp::CommitOverlay(key)],
        Some(canonical) => {
            let mut ops = vec![StoreOp::CommitOverlay(key)];
            if canonical.id != key {
                // The server assigned a different key (insert): the
                // optimistic row moves from the temporary key to the
                // canonical one.
                ops.push(StoreOp::ReplaceBase(key, None));
            }
            ops.push(StoreOp::ReplaceBase(canonical.id, Some(canonical.clone())));
            ops
        }
    }
}

impl std::fmt::Debug for TransactionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionManager")
            .field("active_count", &self.active_count())
            .finish_non_exhaustive()
    }
}
