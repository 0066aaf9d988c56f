//! The synced collection: optimistic mutations over a live local
//! mirror.
//!
//! `SyncedCollection` wires the core engine (store, transaction
//! manager, live queries) to the sync adapter. Mutations apply to the
//! local mirror synchronously, then a worker thread pushes them to the
//! server and resolves the transaction: commit with canonical values,
//! or rollback. The returned [`PendingTransaction`] handle surfaces
//! the verdict to whoever wants to await it.

use crate::adapter::SyncAdapter;
use crate::config::SyncConfig;
use crate::transport::RestTransport;
use chrono::{SecondsFormat, Utc};
use mirrordb_core::{
    CoreError, CoreResult, EntityStore, LiveQueryEngine, Mutation, Query, Subscription,
    SyncFailure, TransactionId, TransactionManager,
};
use mirrordb_protocol::{Post, PostDraft, PostId, PostPatch};
use std::sync::mpsc::{self, Receiver};
use std::sync::Arc;
use std::thread;
use tracing::{debug, error};

/// One requested change, before it is snapshotted into a
/// [`Mutation`].
#[derive(Debug, Clone)]
pub enum MutationRequest {
    /// Create a post from a draft.
    Insert(PostDraft),
    /// Patch an existing post.
    Update(PostId, PostPatch),
    /// Remove an existing post.
    Delete(PostId),
}

/// Handle to a transaction whose server verdict is outstanding.
///
/// The optimistic change is already visible to queries; `wait`
/// blocks until the server confirms (`Ok`) or the transaction rolls
/// back (`Err` with the failure).
#[must_use = "the transaction resolves in the background; wait() surfaces failures"]
pub struct PendingTransaction {
    id: TransactionId,
    keys: Vec<PostId>,
    outcome: Receiver<Result<(), SyncFailure>>,
}

impl PendingTransaction {
    /// Returns the transaction ID.
    #[must_use]
    pub fn id(&self) -> TransactionId {
        self.id
    }

    /// Returns the keys the transaction touches (temporary keys for
    /// inserts).
    #[must_use]
    pub fn keys(&self) -> &[PostId] {
        &self.keys
    }

    /// Blocks until the transaction resolves.
    pub fn wait(self) -> Result<(), SyncFailure> {
        match self.outcome.recv() {
            Ok(result) => result,
            Err(_) => Err(SyncFailure::transport("sync worker disconnected")),
        }
    }
}

impl std::fmt::Debug for PendingTransaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingTransaction")
            .field("id", &self.id)
            .field("keys", &self.keys)
            .finish_non_exhaustive()
    }
}

/// A local, live-queriable mirror of the remote posts table with
/// optimistic writes.
pub struct SyncedCollection<T: RestTransport + 'static> {
    store: Arc<EntityStore>,
    queries: Arc<LiveQueryEngine>,
    manager: Arc<TransactionManager>,
    adapter: Arc<SyncAdapter<T>>,
    config: SyncConfig,
}

impl<T: RestTransport + 'static> SyncedCollection<T> {
    /// Creates a collection over the given transport with default
    /// configuration.
    pub fn new(transport: T) -> Self {
        Self::with_config(transport, SyncConfig::default())
    }

    /// Creates a collection with an explicit configuration.
    pub fn with_config(transport: T, config: SyncConfig) -> Self {
        let store = Arc::new(EntityStore::new());
        let queries = Arc::new(LiveQueryEngine::new(Arc::clone(&store)));
        let manager = Arc::new(TransactionManager::new(
            Arc::clone(&store),
            Arc::clone(&queries),
        ));
        let adapter = Arc::new(SyncAdapter::new(Arc::new(transport)));

        Self {
            store,
            queries,
            manager,
            adapter,
            config,
        }
    }

    /// Pulls the full server listing into the local mirror.
    ///
    /// Applies the configured retry policy for transient failures.
    /// Pending overlays are preserved; an in-flight optimistic change
    /// keeps masking the refreshed base until it resolves. Returns the
    /// number of posts in the listing.
    pub fn refresh(&self) -> Result<usize, SyncFailure> {
        let retry = &self.config.retry;
        let mut attempt = 0;
        let posts = loop {
            match self.adapter.fetch_all() {
                Ok(posts) => break posts,
                Err(failure) if failure.is_retryable() && attempt + 1 < retry.max_attempts => {
                    attempt += 1;
                    debug!(%failure, attempt, "refresh failed, retrying");
                    thread::sleep(retry.delay_for_attempt(attempt));
                }
                Err(failure) => return Err(failure),
            }
        };

        let count = posts.len();
        let changes = self.store.replace_all_bases(posts);
        self.queries.store_changed(&changes);
        Ok(count)
    }

    /// Fetches one post from the server and reconciles the mirror's
    /// base with the canonical row.
    ///
    /// A pending overlay for the key keeps masking the refreshed base
    /// until its transaction resolves.
    pub fn fetch(&self, id: PostId) -> Result<Post, SyncFailure> {
        let post = self.adapter.fetch_one(id)?;
        let changes = self.store.replace_base(post.id, Some(post.clone()));
        self.queries.store_changed(&changes);
        Ok(post)
    }

    /// Optimistically creates a post.
    ///
    /// The new row is visible to queries immediately, under a
    /// temporary id that the server's canonical id replaces on commit.
    pub fn insert(&self, draft: PostDraft) -> CoreResult<PendingTransaction> {
        self.mutate(vec![MutationRequest::Insert(draft)])
    }

    /// Optimistically patches a post.
    pub fn update(&self, id: PostId, patch: PostPatch) -> CoreResult<PendingTransaction> {
        self.mutate(vec![MutationRequest::Update(id, patch)])
    }

    /// Optimistically deletes a post.
    pub fn delete(&self, id: PostId) -> CoreResult<PendingTransaction> {
        self.mutate(vec![MutationRequest::Delete(id)])
    }

    /// Runs several changes as one atomic transaction.
    ///
    /// All of them become visible in a single step and commit or roll
    /// back together. Fails with [`CoreError::Conflict`], applying
    /// nothing, if any targeted key already has a pending overlay.
    pub fn mutate(&self, requests: Vec<MutationRequest>) -> CoreResult<PendingTransaction> {
        let now = now_rfc3339();
        let mut mutations = Vec::with_capacity(requests.len());
        for request in requests {
            mutations.push(self.snapshot(request, &now)?);
        }

        let txn = self.manager.begin(mutations)?;
        let id = txn.id();
        let keys = txn.keys();

        let (sender, outcome) = mpsc::channel();
        let manager = Arc::clone(&self.manager);
        let adapter = Arc::clone(&self.adapter);
        thread::spawn(move || {
            let mut txn = txn;
            let verdict = adapter.push(&txn);
            let result = match &verdict {
                Ok(_) => Ok(()),
                Err(failure) => Err(failure.clone()),
            };
            if let Err(e) = manager.resolve(&mut txn, verdict) {
                // Resolution can only fail on misuse; the overlays are
                // still consistent, so report it as the outcome.
                error!(txn = %id, error = %e, "failed to resolve transaction");
                let _ = sender.send(Err(SyncFailure::transport(format!(
                    "transaction resolution failed: {e}"
                ))));
                return;
            }
            let _ = sender.send(result);
        });

        debug!(txn = %id, "transaction handed to sync worker");
        Ok(PendingTransaction { id, keys, outcome })
    }

    /// Turns a request into a mutation carrying the snapshots needed
    /// for rollback.
    fn snapshot(&self, request: MutationRequest, now: &str) -> CoreResult<Mutation> {
        match request {
            MutationRequest::Insert(draft) => {
                Ok(Mutation::insert(draft, self.manager.temp_id(), now))
            }
            MutationRequest::Update(id, patch) => {
                let original = self.lookup(id)?;
                Ok(Mutation::update(original, patch, now))
            }
            MutationRequest::Delete(id) => Ok(Mutation::delete(self.lookup(id)?)),
        }
    }

    /// Resolves the pre-mutation snapshot for a keyed request.
    ///
    /// A key with a pending overlay is busy (its base may be about to
    /// change), so the request conflicts rather than snapshotting a
    /// value that is already provisional.
    fn lookup(&self, id: PostId) -> CoreResult<Post> {
        if self.store.has_overlay(id) {
            return Err(CoreError::Conflict { id });
        }
        self.store.get(id).ok_or(CoreError::NotLoaded { id })
    }

    /// Returns the effective value for a key.
    #[must_use]
    pub fn get(&self, id: PostId) -> Option<Post> {
        self.store.get(id)
    }

    /// Returns all effective posts, newest first.
    #[must_use]
    pub fn posts(&self) -> Vec<Post> {
        Query::all().evaluate(&self.store)
    }

    /// Returns the number of posts visible to queries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.store.len()
    }

    /// Returns true when no post is visible.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// Returns the number of transactions awaiting their verdict.
    #[must_use]
    pub fn pending_transactions(&self) -> usize {
        self.manager.active_count()
    }

    /// Subscribes to a query's result set.
    ///
    /// The callback fires once with the current snapshot before this
    /// returns, then on every result change until the handle is
    /// dropped.
    pub fn subscribe(
        &self,
        query: Query,
        on_change: impl Fn(&[Post]) + Send + Sync + 'static,
    ) -> Subscription {
        self.queries.subscribe(query, on_change)
    }

    /// Subscribes with a projection applied to each row.
    pub fn subscribe_with<R>(
        &self,
        query: Query,
        project: impl Fn(&Post) -> R + Send + Sync + 'static,
        on_change: impl Fn(&[R]) + Send + Sync + 'static,
    ) -> Subscription
    where
        R: PartialEq + Send + 'static,
    {
        self.queries.subscribe_with(query, project, on_change)
    }
}

impl<T: RestTransport + 'static> std::fmt::Debug for SyncedCollection<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncedCollection")
            .field("len", &self.len())
            .field("pending_transactions", &self.pending_transactions())
            .finish_non_exhaustive()
    }
}

/// Local wall-clock timestamp for optimistic rows, in the server's
/// format.
fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}
