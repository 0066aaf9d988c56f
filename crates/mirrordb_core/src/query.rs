//! Declarative queries over the entity store.
//!
//! There is no query DSL: filtering uses host-language closures and
//! ordering is picked from a small set of orders the posts table
//! supports. A query is a stateless specification, re-evaluated on
//! demand against the store's effective values.

use crate::store::{ChangeSet, EntityStore};
use mirrordb_protocol::{Post, PostId};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

/// Filter predicate over posts.
pub type FilterFn = Arc<dyn Fn(&Post) -> bool + Send + Sync>;

/// Result ordering for a query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOrder {
    /// Newest first, the ordering of the remote list endpoint.
    #[default]
    CreatedAtDesc,
    /// Oldest first.
    CreatedAtAsc,
    /// Ascending by identifier.
    ById,
}

/// A declarative selection over the entity store.
///
/// Holds an optional filter, a sort order, and an optional *key scope*:
/// a hint naming the only keys the filter can match. Scoped queries are
/// skipped during invalidation when a change touches none of their
/// keys; scope-less queries are always re-evaluated (coarse
/// invalidation: recomputing too much is tolerated, missing a change
/// is not).
#[derive(Clone, Default)]
pub struct Query {
    filter: Option<FilterFn>,
    order: SortOrder,
    scope: Option<BTreeSet<PostId>>,
}

impl Query {
    /// A query matching every post, newest first.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// A query selecting a single post by key.
    #[must_use]
    pub fn by_id(id: PostId) -> Self {
        Self::all()
            .filter(move |post: &Post| post.id == id)
            .scope([id])
    }

    /// Sets the filter predicate.
    #[must_use]
    pub fn filter(mut self, filter: impl Fn(&Post) -> bool + Send + Sync + 'static) -> Self {
        self.filter = Some(Arc::new(filter));
        self
    }

    /// Sets the sort order.
    #[must_use]
    pub fn order(mut self, order: SortOrder) -> Self {
        self.order = order;
        self
    }

    /// Restricts invalidation to the given keys.
    ///
    /// The caller asserts the filter can only match these keys; a
    /// wrong assertion produces missed updates, so leave the scope
    /// unset when in doubt.
    #[must_use]
    pub fn scope(mut self, keys: impl IntoIterator<Item = PostId>) -> Self {
        self.scope = Some(keys.into_iter().collect());
        self
    }

    /// Returns true if the post satisfies the filter.
    #[must_use]
    pub fn matches(&self, post: &Post) -> bool {
        self.filter.as_ref().map_or(true, |f| f(post))
    }

    /// Returns true if a change to these keys could affect this
    /// query's result set.
    #[must_use]
    pub fn may_touch(&self, changes: &ChangeSet) -> bool {
        match &self.scope {
            None => true,
            Some(scope) => changes.iter().any(|id| scope.contains(&id)),
        }
    }

    /// Evaluates the query against the store's current effective
    /// values.
    #[must_use]
    pub fn evaluate(&self, store: &EntityStore) -> Vec<Post> {
        let mut rows: Vec<Post> = store
            .list_effective()
            .into_iter()
            .filter(|post| self.matches(post))
            .collect();
        sort_rows(&mut rows, self.order);
        rows
    }
}

impl fmt::Debug for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query")
            .field("filter", &self.filter.as_ref().map(|_| "<closure>"))
            .field("order", &self.order)
            .field("scope", &self.scope)
            .finish()
    }
}

fn sort_rows(rows: &mut [Post], order: SortOrder) {
    match order {
        // RFC 3339 strings compare chronologically; ties break on id
        // so the order is total.
        SortOrder::CreatedAtDesc => {
            rows.sort_by(|a, b| {
                b.created_at
                    .cmp(&a.created_at)
                    .then_with(|| b.id.cmp(&a.id))
            });
        }
        SortOrder::CreatedAtAsc => {
            rows.sort_by(|a, b| {
                a.created_at
                    .cmp(&b.created_at)
                    .then_with(|| a.id.cmp(&b.id))
            });
        }
        SortOrder::ById => rows.sort_by_key(|post| post.id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Overlay;

    fn post(id: i64, title: &str, created_at: &str) -> Post {
        Post {
            id: PostId::new(id),
            title: title.into(),
            content: "body".into(),
            author: "Ann".into(),
            created_at: created_at.into(),
            updated_at: created_at.into(),
        }
    }

    fn seeded_store() -> EntityStore {
        let store = EntityStore::new();
        store.replace_all_bases(vec![
            post(1, "oldest", "2024-01-01T00:00:00Z"),
            post(2, "middle", "2024-01-02T00:00:00Z"),
            post(3, "newest", "2024-01-03T00:00:00Z"),
        ]);
        store
    }

    #[test]
    fn default_order_is_newest_first() {
        let store = seeded_store();
        let rows = Query::all().evaluate(&store);
        let titles: Vec<_> = rows.iter().map(|p| p.title.as_str()).collect();
        assert_eq!(titles, ["newest", "middle", "oldest"]);
    }

    #[test]
    fn filter_narrows_results() {
        let store = seeded_store();
        let rows = Query::all()
            .filter(|post: &Post| post.title.contains('e'))
            .evaluate(&store);
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn by_id_selects_one_post() {
        let store = seeded_store();
        let rows = Query::by_id(PostId::new(2)).evaluate(&store);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].title, "middle");
    }

    #[test]
    fn scoped_query_ignores_unrelated_changes() {
        let query = Query::by_id(PostId::new(2));
        assert!(query.may_touch(&ChangeSet::single(PostId::new(2))));
        assert!(!query.may_touch(&ChangeSet::single(PostId::new(9))));
    }

    #[test]
    fn unscoped_query_is_always_invalidated() {
        let query = Query::all();
        assert!(query.may_touch(&ChangeSet::single(PostId::new(9))));
    }

    #[test]
    fn evaluation_sees_overlays() {
        let store = seeded_store();
        store
            .apply_overlay(PostId::new(2), Overlay::Tombstone)
            .unwrap();

        let rows = Query::all().evaluate(&store);
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|p| p.id != PostId::new(2)));
    }

    #[test]
    fn equal_timestamps_break_ties_on_id() {
        let store = EntityStore::new();
        store.replace_all_bases(vec![
            post(1, "a", "2024-01-01T00:00:00Z"),
            post(2, "b", "2024-01-01T00:00:00Z"),
        ]);

        let rows = Query::all().evaluate(&store);
        assert_eq!(rows[0].id, PostId::new(2));

        let rows = Query::all().order(SortOrder::ById).evaluate(&store);
        assert_eq!(rows[0].id, PostId::new(1));
    }
}
