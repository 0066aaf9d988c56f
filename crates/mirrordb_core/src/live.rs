//! Live query engine: subscriptions kept up to date as the store
//! changes.
//!
//! The engine holds a registry of subscriptions. When the store
//! reports changed keys, it re-evaluates the subscriptions whose query
//! could plausibly be affected and invokes their callbacks, but only
//! when the projected result actually differs (value equality, not
//! reference identity) from the last result delivered to that
//! subscription.
//!
//! Dispatch is synchronous: the callbacks for one store-mutation step
//! run before the mutating call returns, and each observes a
//! consistent post-step snapshot, never a partially applied
//! transaction.

use crate::query::Query;
use crate::store::{ChangeSet, EntityStore};
use crate::types::SubscriptionId;
use mirrordb_protocol::Post;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::{Arc, Weak};

/// A registered query that can be re-evaluated against the store.
trait ActiveQuery: Send + Sync {
    /// Returns true if the changed keys could affect this query.
    fn may_touch(&self, changes: &ChangeSet) -> bool;

    /// Re-evaluates the query and invokes the callback if the result
    /// changed since the last delivery.
    fn refresh(&self, store: &EntityStore);
}

/// A subscription with a projection from posts to an arbitrary
/// value-comparable row type.
struct ProjectedQuery<R> {
    query: Query,
    project: Box<dyn Fn(&Post) -> R + Send + Sync>,
    on_change: Box<dyn Fn(&[R]) + Send + Sync>,
    last: Mutex<Option<Vec<R>>>,
}

impl<R: PartialEq + Send + 'static> ActiveQuery for ProjectedQuery<R> {
    fn may_touch(&self, changes: &ChangeSet) -> bool {
        self.query.may_touch(changes)
    }

    fn refresh(&self, store: &EntityStore) {
        // Evaluate under the per-subscription lock so concurrent
        // refreshes cannot deliver snapshots out of order: the later
        // evaluation always reads the later store state.
        let mut last = self.last.lock();
        let rows: Vec<R> = self
            .query
            .evaluate(store)
            .iter()
            .map(|post| (self.project)(post))
            .collect();

        if last.as_ref() == Some(&rows) {
            return;
        }
        (self.on_change)(&rows);
        *last = Some(rows);
    }
}

type Registry = RwLock<HashMap<SubscriptionId, Arc<dyn ActiveQuery>>>;

/// Handle to a registered subscription.
///
/// The subscription stays registered for as long as the handle lives;
/// dropping it (or calling [`Subscription::cancel`]) unregisters the
/// callback, mirroring a UI component unmounting.
#[must_use = "dropping a Subscription unregisters its callback"]
pub struct Subscription {
    id: SubscriptionId,
    registry: Weak<Registry>,
}

impl Subscription {
    /// Returns the subscription's identifier.
    #[must_use]
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Unregisters the subscription.
    pub fn cancel(self) {
        // Drop does the work.
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.write().remove(&self.id);
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

/// Evaluates declarative queries and pushes incremental updates to
/// subscribers.
pub struct LiveQueryEngine {
    store: Arc<EntityStore>,
    registry: Arc<Registry>,
}

impl LiveQueryEngine {
    /// Creates an engine reading from the given store.
    #[must_use]
    pub fn new(store: Arc<EntityStore>) -> Self {
        Self {
            store,
            registry: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Subscribes to a query's result set.
    ///
    /// The callback is invoked once, synchronously, with the current
    /// snapshot before this method returns, and thereafter whenever
    /// the result set changes. Callbacks may subscribe or cancel
    /// subscriptions, but must not begin mutations synchronously;
    /// schedule those instead.
    pub fn subscribe(
        &self,
        query: Query,
        on_change: impl Fn(&[Post]) + Send + Sync + 'static,
    ) -> Subscription {
        self.subscribe_with(query, |post: &Post| post.clone(), on_change)
    }

    /// Subscribes with a projection applied to each row.
    ///
    /// The change diff runs on the *projected* rows, so a store change
    /// that does not alter any projected field is not delivered.
    pub fn subscribe_with<R>(
        &self,
        query: Query,
        project: impl Fn(&Post) -> R + Send + Sync + 'static,
        on_change: impl Fn(&[R]) + Send + Sync + 'static,
    ) -> Subscription
    where
        R: PartialEq + Send + 'static,
    {
        let id = SubscriptionId::new();
        let active: Arc<dyn ActiveQuery> = Arc::new(ProjectedQuery {
            query,
            project: Box::new(project),
            on_change: Box::new(on_change),
            last: Mutex::new(None),
        });

        self.registry.write().insert(id, Arc::clone(&active));
        tracing::debug!(subscription = %id, "subscription registered");

        // Initial synchronous delivery.
        active.refresh(&self.store);

        Subscription {
            id,
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Reacts to a store-mutation step.
    ///
    /// Re-evaluates every subscription the changed keys could affect.
    /// Callbacks run on the calling thread, after the mutation has
    /// fully applied.
    pub fn store_changed(&self, changes: &ChangeSet) {
        if changes.is_empty() {
            return;
        }

        // Snapshot the affected subscriptions, then release the
        // registry lock so callbacks may subscribe or cancel freely.
        let affected: Vec<Arc<dyn ActiveQuery>> = self
            .registry
            .read()
            .values()
            .filter(|active| active.may_touch(changes))
            .map(Arc::clone)
            .collect();

        for active in affected {
            active.refresh(&self.store);
        }
    }

    /// Returns the number of registered subscriptions.
    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.registry.read().len()
    }
}

impl std::fmt::Debug for LiveQueryEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveQueryEngine")
            .field("subscription_count", &self.subscription_count())
            .finish_non_exhaustive()
    }
}
