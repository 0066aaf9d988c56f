//! HTTP transport implementation.
//!
//! The actual HTTP client is abstracted via a trait so any library
//! (reqwest, ureq, hyper), or no network at all as with
//! [`crate::server::LoopbackClient`], can sit underneath. This module
//! maps the typed CRUD calls of [`RestTransport`] onto the posts API's
//! JSON endpoints and normalizes every failure into a
//! [`SyncFailure`].

use crate::transport::RestTransport;
use mirrordb_core::SyncFailure;
use mirrordb_protocol::{
    CreatePostRequest, DeleteEnvelope, ListEnvelope, Post, PostDraft, PostEnvelope, PostId,
    PostPatch, UpdatePostRequest, WireMessage,
};
use std::fmt;
use std::time::Duration;

/// HTTP method, as far as the posts API needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// Read.
    Get,
    /// Create.
    Post,
    /// Update.
    Put,
    /// Remove.
    Delete,
}

impl Method {
    /// Returns the method name as sent on the wire.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A raw HTTP response.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// Status code.
    pub status: u16,
    /// Response body bytes.
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Creates a response.
    #[must_use]
    pub fn new(status: u16, body: Vec<u8>) -> Self {
        Self { status, body }
    }

    /// Returns true for 2xx statuses.
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// HTTP client abstraction.
///
/// Implementations return `Err` only for transport-level failures (no
/// connection, timeout); an HTTP error status is a normal response.
pub trait HttpClient: Send + Sync {
    /// Executes a request with an optional JSON body.
    fn execute(
        &self,
        method: Method,
        url: &str,
        body: Option<&[u8]>,
    ) -> Result<HttpResponse, String>;
}

/// HTTP-based transport speaking the posts API's JSON contract.
pub struct HttpTransport<C: HttpClient> {
    base_url: String,
    client: C,
    timeout: Duration,
}

impl<C: HttpClient> HttpTransport<C> {
    /// Creates a transport against the given API base URL.
    pub fn new(base_url: impl Into<String>, client: C) -> Self {
        Self {
            base_url: base_url.into(),
            client,
            timeout: Duration::from_secs(30),
        }
    }

    /// Sets the advisory request timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Returns the base URL.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Returns the advisory timeout for client implementations.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<Vec<u8>>,
    ) -> Result<HttpResponse, SyncFailure> {
        let url = format!("{}{}", self.base_url, path);
        self.client
            .execute(method, &url, body.as_deref())
            .map_err(SyncFailure::transport)
    }
}

/// Builds the failure for a non-2xx response, pulling the server's
/// `error` message out of the JSON envelope when there is one.
fn status_failure(response: &HttpResponse, not_found: Option<PostId>) -> SyncFailure {
    if response.status == 404 {
        if let Some(id) = not_found {
            return SyncFailure::NotFound { id };
        }
    }
    let message = serde_json::from_slice::<serde_json::Value>(&response.body)
        .ok()
        .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(String::from))
        .unwrap_or_else(|| "no error message in response".to_string());
    SyncFailure::server(response.status, message)
}

fn decode<T: WireMessage>(response: &HttpResponse) -> Result<T, SyncFailure> {
    T::from_json(&response.body).map_err(|e| SyncFailure::malformed(e.to_string()))
}

impl<C: HttpClient> RestTransport for HttpTransport<C> {
    fn list(&self) -> Result<Vec<Post>, SyncFailure> {
        let response = self.request(Method::Get, "/posts", None)?;
        if !response.is_success() {
            return Err(status_failure(&response, None));
        }
        let envelope: ListEnvelope = decode(&response)?;
        if !envelope.success {
            return Err(SyncFailure::server(
                response.status,
                envelope.error.unwrap_or_else(|| "list failed".into()),
            ));
        }
        Ok(envelope.posts)
    }

    fn fetch(&self, id: PostId) -> Result<Post, SyncFailure> {
        let response = self.request(Method::Get, &format!("/posts/{}", id.as_i64()), None)?;
        if !response.is_success() {
            return Err(status_failure(&response, Some(id)));
        }
        let envelope: PostEnvelope = decode(&response)?;
        envelope
            .into_post()
            .map_err(|e| SyncFailure::malformed(e.to_string()))
    }

    fn create(&self, draft: &PostDraft) -> Result<Post, SyncFailure> {
        let body = CreatePostRequest::from_draft(draft)
            .to_json()
            .map_err(|e| SyncFailure::malformed(e.to_string()))?;
        let response = self.request(Method::Post, "/posts", Some(body))?;
        if !response.is_success() {
            return Err(status_failure(&response, None));
        }
        let envelope: PostEnvelope = decode(&response)?;
        envelope
            .into_post()
            .map_err(|e| SyncFailure::malformed(e.to_string()))
    }

    fn update(&self, id: PostId, patch: &PostPatch) -> Result<Post, SyncFailure> {
        let body = UpdatePostRequest::from_patch(patch)
            .to_json()
            .map_err(|e| SyncFailure::malformed(e.to_string()))?;
        let response =
            self.request(Method::Put, &format!("/posts/{}", id.as_i64()), Some(body))?;
        if !response.is_success() {
            return Err(status_failure(&response, Some(id)));
        }
        let envelope: PostEnvelope = decode(&response)?;
        envelope
            .into_post()
            .map_err(|e| SyncFailure::malformed(e.to_string()))
    }

    fn remove(&self, id: PostId) -> Result<PostId, SyncFailure> {
        let response =
            self.request(Method::Delete, &format!("/posts/{}", id.as_i64()), None)?;
        if !response.is_success() {
            return Err(status_failure(&response, Some(id)));
        }
        let envelope: DeleteEnvelope = decode(&response)?;
        envelope
            .into_deleted_id()
            .map_err(|e| SyncFailure::malformed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    /// Client returning a fixed response, recording request lines.
    struct FixedClient {
        response: Mutex<Option<HttpResponse>>,
        requests: Mutex<Vec<String>>,
    }

    impl FixedClient {
        fn new() -> Self {
            Self {
                response: Mutex::new(None),
                requests: Mutex::new(Vec::new()),
            }
        }

        fn set_response(&self, response: HttpResponse) {
            *self.response.lock() = Some(response);
        }

        fn requests(&self) -> Vec<String> {
            self.requests.lock().clone()
        }
    }

    impl HttpClient for FixedClient {
        fn execute(
            &self,
            method: Method,
            url: &str,
            _body: Option<&[u8]>,
        ) -> Result<HttpResponse, String> {
            self.requests.lock().push(format!("{method} {url}"));
            self.response
                .lock()
                .clone()
                .ok_or_else(|| "connection refused".to_string())
        }
    }

    fn post(id: i64) -> Post {
        Post {
            id: PostId::new(id),
            title: "Hello".into(),
            content: "World".into(),
            author: "Ann".into(),
            created_at: "2024-01-01T00:00:00Z".into(),
            updated_at: "2024-01-01T00:00:00Z".into(),
        }
    }

    #[test]
    fn list_hits_the_posts_endpoint() {
        let client = FixedClient::new();
        client.set_response(HttpResponse::new(
            200,
            ListEnvelope::success(vec![post(1)]).to_json().unwrap(),
        ));

        let transport = HttpTransport::new("http://api.test", client);
        let posts = transport.list().unwrap();
        assert_eq!(posts.len(), 1);
        assert_eq!(
            transport.client.requests(),
            vec!["GET http://api.test/posts"]
        );
    }

    #[test]
    fn client_error_becomes_transport_failure() {
        let transport = HttpTransport::new("http://api.test", FixedClient::new());
        let err = transport.list().unwrap_err();
        assert!(matches!(err, SyncFailure::Transport { .. }));
        assert!(err.is_retryable());
    }

    #[test]
    fn not_found_is_distinguished_for_keyed_calls() {
        let client = FixedClient::new();
        client.set_response(HttpResponse::new(
            404,
            PostEnvelope::failure("Post not found").to_json().unwrap(),
        ));

        let transport = HttpTransport::new("http://api.test", client);
        let err = transport
            .update(PostId::new(7), &PostPatch::new().title("x"))
            .unwrap_err();
        assert!(matches!(err, SyncFailure::NotFound { id } if id == PostId::new(7)));
    }

    #[test]
    fn server_error_keeps_the_body_message() {
        let client = FixedClient::new();
        client.set_response(HttpResponse::new(
            500,
            PostEnvelope::failure("Failed to create post")
                .to_json()
                .unwrap(),
        ));

        let transport = HttpTransport::new("http://api.test", client);
        let err = transport.create(&PostDraft::new("Hi", "Body")).unwrap_err();
        assert!(
            matches!(err, SyncFailure::Server { status: 500, ref message } if message == "Failed to create post")
        );
    }

    #[test]
    fn malformed_body_is_not_a_server_error() {
        let client = FixedClient::new();
        client.set_response(HttpResponse::new(200, b"not json".to_vec()));

        let transport = HttpTransport::new("http://api.test", client);
        let err = transport.list().unwrap_err();
        assert!(matches!(err, SyncFailure::MalformedResponse { .. }));
        assert!(!err.is_retryable());
    }

    #[test]
    fn delete_path_includes_the_id() {
        let client = FixedClient::new();
        client.set_response(HttpResponse::new(
            200,
            DeleteEnvelope::success(PostId::new(3)).to_json().unwrap(),
        ));

        let transport = HttpTransport::new("http://api.test", client);
        let deleted = transport.remove(PostId::new(3)).unwrap();
        assert_eq!(deleted, PostId::new(3));
        assert_eq!(
            transport.client.requests(),
            vec!["DELETE http://api.test/posts/3"]
        );
    }
}
