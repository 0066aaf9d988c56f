//! Transport abstraction for the posts API.
//!
//! [`RestTransport`] is the typed seam between the sync adapter and
//! the network: one method per CRUD operation of the external
//! contract. [`crate::http::HttpTransport`] implements it over JSON;
//! [`MockTransport`] scripts responses for tests.

use mirrordb_core::SyncFailure;
use mirrordb_protocol::{Post, PostDraft, PostId, PostPatch};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::Duration;

/// Typed access to the external posts CRUD contract.
///
/// Implementations normalize every transport- or server-level problem
/// into a [`SyncFailure`]; nothing else crosses this boundary.
pub trait RestTransport: Send + Sync {
    /// Fetches all posts, newest first.
    fn list(&self) -> Result<Vec<Post>, SyncFailure>;

    /// Fetches one post.
    fn fetch(&self, id: PostId) -> Result<Post, SyncFailure>;

    /// Creates a post, returning the server's canonical row.
    fn create(&self, draft: &PostDraft) -> Result<Post, SyncFailure>;

    /// Partially updates a post, returning the canonical row.
    fn update(&self, id: PostId, patch: &PostPatch) -> Result<Post, SyncFailure>;

    /// Removes a post, returning the acknowledged id.
    fn remove(&self, id: PostId) -> Result<PostId, SyncFailure>;
}

type Scripted<T> = Mutex<VecDeque<Result<T, SyncFailure>>>;

/// A mock transport with scripted responses, for testing.
///
/// Each operation pops its next scripted response; an unscripted call
/// fails with a transport error. An optional per-call latency makes
/// in-flight windows observable in tests.
#[derive(Default)]
pub struct MockTransport {
    list_responses: Scripted<Vec<Post>>,
    fetch_responses: Scripted<Post>,
    create_responses: Scripted<Post>,
    update_responses: Scripted<Post>,
    remove_responses: Scripted<PostId>,
    latency: Mutex<Option<Duration>>,
    calls: Mutex<Vec<String>>,
}

impl MockTransport {
    /// Creates a mock with no scripted responses.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Scripts the next `list` response.
    pub fn script_list(&self, response: Result<Vec<Post>, SyncFailure>) {
        self.list_responses.lock().push_back(response);
    }

    /// Scripts the next `fetch` response.
    pub fn script_fetch(&self, response: Result<Post, SyncFailure>) {
        self.fetch_responses.lock().push_back(response);
    }

    /// Scripts the next `create` response.
    pub fn script_create(&self, response: Result<Post, SyncFailure>) {
        self.create_responses.lock().push_back(response);
    }

    /// Scripts the next `update` response.
    pub fn script_update(&self, response: Result<Post, SyncFailure>) {
        self.update_responses.lock().push_back(response);
    }

    /// Scripts the next `remove` response.
    pub fn script_remove(&self, response: Result<PostId, SyncFailure>) {
        self.remove_responses.lock().push_back(response);
    }

    /// Delays every call by the given duration.
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock() = Some(latency);
    }

    /// Returns the operations called so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    fn record(&self, call: String) {
        let latency = *self.latency.lock();
        if let Some(latency) = latency {
            std::thread::sleep(latency);
        }
        self.calls.lock().push(call);
    }

    fn next<T>(queue: &Scripted<T>, op: &str) -> Result<T, SyncFailure> {
        queue
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(SyncFailure::transport(format!("no scripted {op} response"))))
    }
}

impl RestTransport for MockTransport {
    fn list(&self) -> Result<Vec<Post>, SyncFailure> {
        self.record("list".into());
        Self::next(&self.list_responses, "list")
    }

    fn fetch(&self, id: PostId) -> Result<Post, SyncFailure> {
        self.record(format!("fetch {id}"));
        Self::next(&self.fetch_responses, "fetch")
    }

    fn create(&self, draft: &PostDraft) -> Result<Post, SyncFailure> {
        self.record(format!("create {}", draft.title));
        Self::next(&self.create_responses, "create")
    }

    fn update(&self, id: PostId, _patch: &PostPatch) -> Result<Post, SyncFailure> {
        self.record(format!("update {id}"));
        Self::next(&self.update_responses, "update")
    }

    fn remove(&self, id: PostId) -> Result<PostId, SyncFailure> {
        self.record(format!("remove {id}"));
        Self::next(&self.remove_responses, "remove")
    }
}
