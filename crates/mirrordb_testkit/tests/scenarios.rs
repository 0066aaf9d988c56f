//! End-to-end scenarios driving the synced collection against the
//! in-memory server through the full HTTP transport.

use mirrordb_core::{CoreError, Query};
use mirrordb_protocol::{PostDraft, PostId, PostPatch, WireMessage};
use mirrordb_testkit::prelude::*;
use std::time::Duration;

/// Insert: the subscriber sees the new row under a temporary id
/// immediately, then the server-assigned id after commit.
#[test]
fn insert_shows_temporary_then_canonical_id() {
    let harness = TestCollection::new();
    let recorder = RecordingSubscriber::new();
    let _sub = harness.subscribe(Query::all(), recorder.callback());
    assert_eq!(recorder.snapshot_count(), 1); // initial empty snapshot

    harness.server.set_latency(Duration::from_millis(30));
    let pending = harness
        .insert(PostDraft::new("Hi", "Body").with_author("A"))
        .unwrap();
    let temp = pending.keys()[0];
    assert!(temp.is_temporary());

    // Optimistic delivery happened synchronously during insert().
    let optimistic = recorder.snapshot(1).unwrap();
    assert_eq!(optimistic.len(), 1);
    assert_eq!(optimistic[0].id, temp);
    assert_eq!(optimistic[0].title, "Hi");
    assert_eq!(optimistic[0].author, "A");

    pending.wait().unwrap();
    let committed = recorder.latest().unwrap();
    assert_eq!(committed.len(), 1);
    assert!(!committed[0].id.is_temporary());
    // The temporary key is gone; the canonical row replaced it.
    assert!(harness.get(temp).is_none());
    assert_eq!(harness.get(committed[0].id).unwrap().title, "Hi");
}

/// Insert failure: the optimistic row disappears from the result set.
#[test]
fn failed_insert_disappears_from_subscribers() {
    let harness = TestCollection::new();
    let recorder = RecordingSubscriber::new();
    let _sub = harness.subscribe(Query::all(), recorder.callback());

    harness.server.fail_next(1);
    harness.server.set_latency(Duration::from_millis(30));
    let pending = harness.insert(PostDraft::new("Hi", "Body")).unwrap();

    assert_eq!(recorder.snapshot(1).unwrap().len(), 1);

    let failure = pending.wait().unwrap_err();
    assert!(failure.is_retryable()); // injected 500
    assert_eq!(recorder.latest().unwrap().len(), 0);
    assert!(harness.is_empty());
    assert_eq!(harness.server.post_count(), 0);
}

/// Update: only the patched field changes, immediately; the rest is
/// preserved.
#[test]
fn partial_update_preserves_unpatched_fields() {
    let harness = TestCollection::seeded(1);
    let original = harness.get(PostId::new(1)).unwrap();

    let recorder = RecordingSubscriber::new();
    let _sub = harness.subscribe(Query::by_id(PostId::new(1)), recorder.callback());

    harness.server.set_latency(Duration::from_millis(30));
    let pending = harness
        .update(PostId::new(1), PostPatch::new().content("Edited"))
        .unwrap();

    let optimistic = recorder.snapshot(1).unwrap();
    assert_eq!(optimistic[0].content, "Edited");
    assert_eq!(optimistic[0].title, original.title);
    assert_eq!(optimistic[0].author, original.author);

    pending.wait().unwrap();
    // The mirror converged to the server's canonical row, including
    // the server-side `updated_at` bump.
    let local = harness.get(PostId::new(1)).unwrap();
    let remote = harness.server.get_post(PostId::new(1)).unwrap();
    assert_eq!(local, remote);
    assert!(local.updated_at > original.updated_at);
}

/// Update failure: the patched field reverts to its pre-mutation
/// value.
#[test]
fn failed_update_reverts_the_field() {
    let harness = TestCollection::seeded(1);
    let original = harness.get(PostId::new(1)).unwrap();

    harness.server.fail_next(1);
    let pending = harness
        .update(PostId::new(1), PostPatch::new().content("Edited"))
        .unwrap();

    pending.wait().unwrap_err();
    assert_eq!(harness.get(PostId::new(1)).unwrap(), original);
}

/// Delete then update on the same key: the update is rejected with a
/// conflict while the delete's overlay is pending.
#[test]
fn update_during_pending_delete_conflicts() {
    let harness = TestCollection::seeded(3);

    harness.server.set_latency(Duration::from_millis(40));
    let pending = harness.delete(PostId::new(3)).unwrap();

    let err = harness
        .update(PostId::new(3), PostPatch::new().title("too late"))
        .unwrap_err();
    assert!(matches!(err, CoreError::Conflict { id } if id == PostId::new(3)));
    // The pending delete is untouched by the rejected update.
    assert!(harness.get(PostId::new(3)).is_none());

    pending.wait().unwrap();
    assert_eq!(harness.server.post_count(), 2);
}

/// Mutations on disjoint keys neither block each other nor share a
/// verdict.
#[test]
fn disjoint_mutations_apply_and_resolve_independently() {
    let harness = TestCollection::seeded(2);
    harness.server.set_latency(Duration::from_millis(25));

    let first = harness
        .update(PostId::new(1), PostPatch::new().title("one"))
        .unwrap();
    // Begins immediately, without waiting for the first verdict.
    let second = harness
        .update(PostId::new(2), PostPatch::new().title("two"))
        .unwrap();

    assert_eq!(harness.pending_transactions(), 2);
    assert_eq!(harness.get(PostId::new(1)).unwrap().title, "one");
    assert_eq!(harness.get(PostId::new(2)).unwrap().title, "two");

    // Await in reverse order; each transaction resolved on its own.
    second.wait().unwrap();
    first.wait().unwrap();
    assert_eq!(harness.pending_transactions(), 0);
    assert_eq!(
        harness.server.get_post(PostId::new(1)).unwrap().title,
        "one"
    );
    assert_eq!(
        harness.server.get_post(PostId::new(2)).unwrap().title,
        "two"
    );
}

/// A multi-mutation transaction becomes visible in one step; no
/// subscriber ever sees it half-applied.
#[test]
fn multi_mutation_transaction_is_atomic_to_subscribers() {
    let harness = TestCollection::seeded(2);
    let recorder = RecordingSubscriber::new();
    let _sub = harness.subscribe(Query::all(), recorder.callback());
    assert_eq!(recorder.snapshot_count(), 1);

    harness.server.set_latency(Duration::from_millis(30));
    let pending = harness
        .mutate(vec![
            mirrordb_sync::MutationRequest::Insert(PostDraft::new("New", "Body")),
            mirrordb_sync::MutationRequest::Delete(PostId::new(1)),
        ])
        .unwrap();

    // Exactly one optimistic snapshot, with both effects in it.
    assert_eq!(recorder.snapshot_count(), 2);
    let optimistic = recorder.snapshot(1).unwrap();
    assert_eq!(optimistic.len(), 2);
    assert!(optimistic.iter().any(|p| p.title == "New"));
    assert!(optimistic.iter().all(|p| p.id != PostId::new(1)));

    pending.wait().unwrap();
    assert_eq!(harness.server.post_count(), 2);
    assert!(harness.server.get_post(PostId::new(1)).is_none());
}

/// Commit convergence: after the verdict, the mirror row equals the
/// server row byte for byte, id and timestamps included.
#[test]
fn committed_rows_match_server_truth_exactly() {
    let harness = TestCollection::new();
    let pending = harness.insert(PostDraft::new("Hi", "Body")).unwrap();
    pending.wait().unwrap();

    let local = harness.posts();
    assert_eq!(local.len(), 1);
    let remote = harness.server.get_post(local[0].id).unwrap();
    assert_eq!(local[0], remote);
}

/// Rollback convergence for every mutation kind: after a failure the
/// result set is exactly what it was before the mutation began.
#[test]
fn rollback_restores_the_exact_prior_result_set() {
    let harness = TestCollection::seeded(2);
    let before = harness.posts();

    harness.server.fail_next(1);
    harness
        .insert(PostDraft::new("Doomed", "Body"))
        .unwrap()
        .wait()
        .unwrap_err();
    assert_eq!(harness.posts(), before);

    harness.server.fail_next(1);
    harness
        .update(PostId::new(1), PostPatch::new().title("Doomed"))
        .unwrap()
        .wait()
        .unwrap_err();
    assert_eq!(harness.posts(), before);

    harness.server.fail_next(1);
    harness
        .delete(PostId::new(2))
        .unwrap()
        .wait()
        .unwrap_err();
    assert_eq!(harness.posts(), before);
}

/// The not-found reason survives the rollback path distinguishably.
#[test]
fn deleting_a_post_missing_on_the_server_reports_not_found() {
    let harness = TestCollection::seeded(1);
    // The server loses the row behind the mirror's back.
    let deleted = harness.server.handle(
        mirrordb_sync::Method::Delete,
        "/posts/1",
        None,
    );
    assert_eq!(deleted.status, 200);

    let failure = harness.delete(PostId::new(1)).unwrap().wait().unwrap_err();
    assert!(failure.is_not_found());
    // Rollback put the (stale) row back; a refresh reconciles it.
    assert_eq!(harness.len(), 1);
    harness.refresh().unwrap();
    assert!(harness.is_empty());
}

/// Fetching one post reconciles a row the server changed behind the
/// mirror's back.
#[test]
fn fetch_one_reconciles_server_side_changes() {
    let harness = TestCollection::seeded(2);

    // Another client edits post 2 directly on the server.
    let body = mirrordb_protocol::UpdatePostRequest {
        title: Some("Edited elsewhere".into()),
        content: None,
        author: None,
    }
    .to_json()
    .unwrap();
    let response = harness
        .server
        .handle(mirrordb_sync::Method::Put, "/posts/2", Some(&body));
    assert_eq!(response.status, 200);
    assert_ne!(
        harness.get(PostId::new(2)).unwrap().title,
        "Edited elsewhere"
    );

    let fetched = harness.fetch(PostId::new(2)).unwrap();
    assert_eq!(fetched.title, "Edited elsewhere");
    assert_eq!(harness.get(PostId::new(2)).unwrap(), fetched);
}

/// A subscription created mid-flight sees the optimistic state, and a
/// dropped one stops receiving.
#[test]
fn subscriptions_track_lifecycle() {
    let harness = TestCollection::seeded(1);

    harness.server.set_latency(Duration::from_millis(30));
    let pending = harness.delete(PostId::new(1)).unwrap();

    // Subscribing during the optimistic window sees the tombstoned
    // state.
    let recorder = RecordingSubscriber::new();
    let sub = harness.subscribe(Query::all(), recorder.callback());
    assert_eq!(recorder.snapshot(0).unwrap().len(), 0);

    drop(sub);
    pending.wait().unwrap();
    // No further deliveries after the handle was dropped.
    assert_eq!(recorder.snapshot_count(), 1);
}
