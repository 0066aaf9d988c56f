//! In-memory reference implementation of the posts API.
//!
//! [`InMemoryServer`] implements the external CRUD contract exactly:
//! envelopes, status codes, the `"Anonymous"` author default, 400 on a
//! missing title or content, 404 on absent ids, with deterministic
//! timestamps, so tests and demos can drive the full HTTP transport
//! without a network. [`LoopbackClient`] routes [`HttpClient`] requests
//! straight into it.

use crate::http::{HttpClient, HttpResponse, Method};
use chrono::{DateTime, SecondsFormat, Utc};
use mirrordb_protocol::{
    CreatePostRequest, DeleteEnvelope, ListEnvelope, Post, PostDraft, PostEnvelope, PostId,
    UpdatePostRequest, WireMessage,
};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Unix seconds of 2024-01-01T00:00:00Z, the server's first tick.
const CLOCK_EPOCH: i64 = 1_704_067_200;

/// An in-memory posts API with the same observable behavior as the
/// real one.
pub struct InMemoryServer {
    posts: Mutex<BTreeMap<i64, Post>>,
    next_id: AtomicI64,
    clock_seq: AtomicI64,
    fail_budget: AtomicUsize,
    offline: AtomicBool,
    latency: Mutex<Option<Duration>>,
}

impl InMemoryServer {
    /// Creates an empty server.
    #[must_use]
    pub fn new() -> Self {
        Self {
            posts: Mutex::new(BTreeMap::new()),
            next_id: AtomicI64::new(1),
            clock_seq: AtomicI64::new(0),
            fail_budget: AtomicUsize::new(0),
            offline: AtomicBool::new(false),
            latency: Mutex::new(None),
        }
    }

    /// Seeds the server with posts created from drafts, returning the
    /// stored rows.
    pub fn seed(&self, drafts: &[PostDraft]) -> Vec<Post> {
        drafts.iter().map(|draft| self.store_draft(draft)).collect()
    }

    /// Makes the next `n` requests fail with HTTP 500.
    pub fn fail_next(&self, n: usize) {
        self.fail_budget.store(n, Ordering::SeqCst);
    }

    /// Simulates losing the network (requests never reach the server).
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Delays every request by the given duration, keeping optimistic
    /// windows open long enough to observe.
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock() = Some(latency);
    }

    /// Returns true when the server is unreachable.
    #[must_use]
    pub fn is_offline(&self) -> bool {
        self.offline.load(Ordering::SeqCst)
    }

    /// Returns the number of stored posts.
    #[must_use]
    pub fn post_count(&self) -> usize {
        self.posts.lock().len()
    }

    /// Returns a stored post for inspection.
    #[must_use]
    pub fn get_post(&self, id: PostId) -> Option<Post> {
        self.posts.lock().get(&id.as_i64()).cloned()
    }

    /// Handles one request against the contract.
    pub fn handle(&self, method: Method, path: &str, body: Option<&[u8]>) -> HttpResponse {
        let latency = *self.latency.lock();
        if let Some(latency) = latency {
            std::thread::sleep(latency);
        }
        if self
            .fail_budget
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return HttpResponse::new(500, encode(&PostEnvelope::failure("injected failure")));
        }

        match (method, parse_path(path)) {
            (Method::Get, Some(Route::Posts)) => self.handle_list(),
            (Method::Get, Some(Route::Post(id))) => self.handle_get(id),
            (Method::Post, Some(Route::Posts)) => self.handle_create(body),
            (Method::Put, Some(Route::Post(id))) => self.handle_update(id, body),
            (Method::Delete, Some(Route::Post(id))) => self.handle_delete(id),
            _ => HttpResponse::new(404, encode(&PostEnvelope::failure("Not found"))),
        }
    }

    fn handle_list(&self) -> HttpResponse {
        let mut posts: Vec<Post> = self.posts.lock().values().cloned().collect();
        posts.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        HttpResponse::new(200, encode(&ListEnvelope::success(posts)))
    }

    fn handle_get(&self, id: i64) -> HttpResponse {
        match self.posts.lock().get(&id) {
            Some(post) => HttpResponse::new(200, encode(&PostEnvelope::success(post.clone()))),
            None => HttpResponse::new(404, encode(&PostEnvelope::failure("Post not found"))),
        }
    }

    fn handle_create(&self, body: Option<&[u8]>) -> HttpResponse {
        let request = match body.map(CreatePostRequest::from_json) {
            Some(Ok(request)) => request,
            _ => {
                return HttpResponse::new(
                    500,
                    encode(&PostEnvelope::failure("Failed to create post")),
                );
            }
        };

        if request.title.is_empty() || request.content.is_empty() {
            return HttpResponse::new(
                400,
                encode(&PostEnvelope::failure("Title and content are required")),
            );
        }

        let draft = PostDraft {
            title: request.title,
            content: request.content,
            author: request.author.filter(|a| !a.is_empty()),
        };
        let post = self.store_draft(&draft);

        HttpResponse::new(
            201,
            encode(&PostEnvelope::success(post).with_message("Post created successfully")),
        )
    }

    fn handle_update(&self, id: i64, body: Option<&[u8]>) -> HttpResponse {
        let request = match body.map(UpdatePostRequest::from_json) {
            Some(Ok(request)) => request,
            _ => {
                return HttpResponse::new(
                    500,
                    encode(&PostEnvelope::failure("Failed to update post")),
                );
            }
        };

        let now = self.now();
        let mut posts = self.posts.lock();
        match posts.get_mut(&id) {
            Some(post) => {
                if let Some(title) = request.title {
                    post.title = title;
                }
                if let Some(content) = request.content {
                    post.content = content;
                }
                if let Some(author) = request.author {
                    post.author = author;
                }
                post.updated_at = now;
                HttpResponse::new(
                    200,
                    encode(
                        &PostEnvelope::success(post.clone())
                            .with_message("Post updated successfully"),
                    ),
                )
            }
            None => HttpResponse::new(404, encode(&PostEnvelope::failure("Post not found"))),
        }
    }

    fn handle_delete(&self, id: i64) -> HttpResponse {
        match self.posts.lock().remove(&id) {
            Some(post) => HttpResponse::new(
                200,
                encode(&DeleteEnvelope::success(post.id)),
            ),
            None => HttpResponse::new(404, encode(&DeleteEnvelope::failure("Post not found"))),
        }
    }

    fn store_draft(&self, draft: &PostDraft) -> Post {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let post = draft.materialize(PostId::new(id), &self.now());
        self.posts.lock().insert(id, post.clone());
        post
    }

    /// Deterministic clock, one second per tick from a fixed epoch.
    fn now(&self) -> String {
        let seq = self.clock_seq.fetch_add(1, Ordering::SeqCst);
        match DateTime::<Utc>::from_timestamp(CLOCK_EPOCH + seq, 0) {
            Some(t) => t.to_rfc3339_opts(SecondsFormat::Secs, true),
            None => format!("tick:{seq}"),
        }
    }
}

impl Default for InMemoryServer {
    fn default() -> Self {
        Self::new()
    }
}

fn encode<T: WireMessage>(value: &T) -> Vec<u8> {
    value
        .to_json()
        .unwrap_or_else(|_| br#"{"success":false,"error":"encoding failed"}"#.to_vec())
}

enum Route {
    Posts,
    Post(i64),
}

fn parse_path(path: &str) -> Option<Route> {
    let rest = path.split('?').next().unwrap_or(path);
    let rest = rest.strip_prefix("/posts")?;
    match rest.trim_end_matches('/') {
        "" => Some(Route::Posts),
        rest => rest
            .strip_prefix('/')
            .and_then(|id| id.parse::<i64>().ok())
            .map(Route::Post),
    }
}

/// An [`HttpClient`] that routes requests directly into an
/// [`InMemoryServer`], without network overhead.
pub struct LoopbackClient {
    server: Arc<InMemoryServer>,
}

impl LoopbackClient {
    /// Creates a client connected to the given server.
    #[must_use]
    pub fn new(server: Arc<InMemoryServer>) -> Self {
        Self { server }
    }
}

impl HttpClient for LoopbackClient {
    fn execute(
        &self,
        method: Method,
        url: &str,
        body: Option<&[u8]>,
    ) -> Result<HttpResponse, String> {
        if self.server.is_offline() {
            return Err("connection refused".to_string());
        }
        // Strip the base URL; the server routes on the path.
        let path = url.find("/posts").map(|i| &url[i..]).unwrap_or(url);
        Ok(self.server.handle(method, path, body))
    }
}
