//! Transaction state.

use crate::error::SyncFailure;
use crate::store::Overlay;
use crate::types::TransactionId;
use mirrordb_protocol::{Post, PostDraft, PostId, PostPatch};
use std::fmt;

/// Lifecycle state of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    /// Applied optimistically; awaiting the server's verdict.
    Pending,
    /// Confirmed by the server; overlays promoted to base.
    Committed,
    /// Rejected by the server; overlays rolled back.
    Failed,
}

/// The kind of a mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    /// Create a new post.
    Insert,
    /// Change fields of an existing post.
    Update,
    /// Remove an existing post.
    Delete,
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MutationKind::Insert => "insert",
            MutationKind::Update => "update",
            MutationKind::Delete => "delete",
        };
        f.write_str(name)
    }
}

/// A single proposed change, carrying the snapshots needed to apply it
/// optimistically and to roll it back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    /// Create a post. `modified` is the draft materialized under a
    /// client-allocated temporary key, replaced by the server's
    /// canonical row on commit.
    Insert {
        /// The fields the caller provided.
        draft: PostDraft,
        /// The optimistic post proposed to the store.
        modified: Post,
    },
    /// Change fields of a post. `modified` is `patch` applied to
    /// `original`; the patch is kept so the wire request can send only
    /// the changed fields.
    Update {
        /// Pre-mutation snapshot.
        original: Post,
        /// The fields being changed.
        patch: PostPatch,
        /// Post-mutation snapshot.
        modified: Post,
    },
    /// Remove a post.
    Delete {
        /// Pre-mutation snapshot.
        original: Post,
    },
}

impl Mutation {
    /// Creates an insert mutation, materializing the draft under a
    /// temporary key.
    #[must_use]
    pub fn insert(draft: PostDraft, id: PostId, timestamp: impl Into<String>) -> Self {
        let timestamp = timestamp.into();
        let modified = draft.materialize(id, &timestamp);
        Self::Insert { draft, modified }
    }

    /// Creates an update mutation, computing the post-mutation
    /// snapshot from the patch and bumping `updated_at`.
    #[must_use]
    pub fn update(original: Post, patch: PostPatch, updated_at: impl Into<String>) -> Self {
        let mut modified = patch.apply_to(&original);
        modified.updated_at = updated_at.into();
        Self::Update {
            original,
            patch,
            modified,
        }
    }

    /// Creates a delete mutation.
    #[must_use]
    pub fn delete(original: Post) -> Self {
        Self::Delete { original }
    }

    /// Returns the mutation's kind.
    #[must_use]
    pub fn kind(&self) -> MutationKind {
        match self {
            Mutation::Insert { .. } => MutationKind::Insert,
            Mutation::Update { .. } => MutationKind::Update,
            Mutation::Delete { .. } => MutationKind::Delete,
        }
    }

    /// Returns the key this mutation touches.
    #[must_use]
    pub fn key(&self) -> PostId {
        match self {
            Mutation::Insert { modified, .. } => modified.id,
            Mutation::Update { original, .. } | Mutation::Delete { original } => original.id,
        }
    }

    /// Returns the pre-mutation snapshot, if the mutation has one.
    #[must_use]
    pub fn original(&self) -> Option<&Post> {
        match self {
            Mutation::Insert { .. } => None,
            Mutation::Update { original, .. } | Mutation::Delete { original } => Some(original),
        }
    }

    /// Returns the proposed post-mutation snapshot, if any.
    #[must_use]
    pub fn modified(&self) -> Option<&Post> {
        match self {
            Mutation::Insert { modified, .. } | Mutation::Update { modified, .. } => {
                Some(modified)
            }
            Mutation::Delete { .. } => None,
        }
    }

    /// Returns the overlay this mutation contributes to the store.
    pub(crate) fn overlay(&self) -> Overlay {
        match self {
            Mutation::Insert { modified, .. } | Mutation::Update { modified, .. } => {
                Overlay::Value(modified.clone())
            }
            Mutation::Delete { .. } => Overlay::Tombstone,
        }
    }
}

/// Per-mutation acknowledgment from the sync adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationAck {
    /// The server's canonical value, when the operation returns one
    /// (insert and update do; delete does not).
    pub canonical: Option<Post>,
}

impl MutationAck {
    /// An acknowledgment carrying the server's canonical value.
    #[must_use]
    pub fn with_canonical(post: Post) -> Self {
        Self {
            canonical: Some(post),
        }
    }

    /// An acknowledgment without a canonical value (delete).
    #[must_use]
    pub fn acknowledged() -> Self {
        Self { canonical: None }
    }
}

/// An ordered, non-empty group of mutations that commit or roll back
/// together.
#[derive(Debug)]
pub struct Transaction {
    id: TransactionId,
    mutations: Vec<Mutation>,
    state: TransactionState,
    failure: Option<SyncFailure>,
}

impl Transaction {
    /// Creates a pending transaction.
    pub(crate) fn new(id: TransactionId, mutations: Vec<Mutation>) -> Self {
        Self {
            id,
            mutations,
            state: TransactionState::Pending,
            failure: None,
        }
    }

    /// Returns the transaction ID.
    #[must_use]
    pub fn id(&self) -> TransactionId {
        self.id
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> TransactionState {
        self.state
    }

    /// Returns true while the server's verdict is outstanding.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.state == TransactionState::Pending
    }

    /// Returns the mutations in application order.
    #[must_use]
    pub fn mutations(&self) -> &[Mutation] {
        &self.mutations
    }

    /// Returns the number of mutations.
    #[must_use]
    pub fn mutation_count(&self) -> usize {
        self.mutations.len()
    }

    /// Returns the keys this transaction touches, in mutation order.
    #[must_use]
    pub fn keys(&self) -> Vec<PostId> {
        self.mutations.iter().map(Mutation::key).collect()
    }

    /// Returns the recorded failure, if the transaction failed.
    #[must_use]
    pub fn failure(&self) -> Option<&SyncFailure> {
        self.failure.as_ref()
    }

    pub(crate) fn mark_committed(&mut self) {
        self.state = TransactionState::Committed;
    }

    pub(crate) fn mark_failed(&mut self, failure: SyncFailure) {
        self.state = TransactionState::Failed;
        self.failure = Some(failure);
    }
}
