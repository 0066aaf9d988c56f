//! JSON wire envelopes for the external posts API.
//!
//! The external API wraps every response in a `{success, ...}` envelope:
//!
//! | Operation | Success body |
//! |---|---|
//! | `GET /posts` | `{success, count, posts}` |
//! | `GET /posts/:id`, `POST /posts`, `PUT /posts/:id` | `{success, post}` |
//! | `DELETE /posts/:id` | `{success, deletedId}` |
//!
//! Failures carry `{success: false, error}` with an HTTP status of 400,
//! 404, or 500.

use crate::error::{ProtocolError, ProtocolResult};
use crate::post::{Post, PostDraft, PostId, PostPatch};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// JSON encode/decode helpers shared by all wire messages.
pub trait WireMessage: Serialize + DeserializeOwned {
    /// Encodes the message to JSON bytes.
    fn to_json(&self) -> ProtocolResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decodes a message from JSON bytes.
    fn from_json(bytes: &[u8]) -> ProtocolResult<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

impl<T: Serialize + DeserializeOwned> WireMessage for T {}

/// Body of `POST /posts`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatePostRequest {
    /// Post title (required by the server).
    pub title: String,
    /// Post body (required by the server).
    pub content: String,
    /// Author; omitted fields default server-side.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
}

impl CreatePostRequest {
    /// Builds the request body for a draft.
    #[must_use]
    pub fn from_draft(draft: &PostDraft) -> Self {
        Self {
            title: draft.title.clone(),
            content: draft.content.clone(),
            author: draft.author.clone(),
        }
    }
}

/// Body of `PUT /posts/:id`.
///
/// All fields are optional; the server preserves absent ones.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdatePostRequest {
    /// Replacement title, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Replacement body, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Replacement author, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
}

impl UpdatePostRequest {
    /// Builds the request body for a patch, sending only present
    /// fields.
    #[must_use]
    pub fn from_patch(patch: &PostPatch) -> Self {
        Self {
            title: patch.title.clone(),
            content: patch.content.clone(),
            author: patch.author.clone(),
        }
    }
}

/// Response envelope of `GET /posts`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListEnvelope {
    /// Whether the request succeeded.
    pub success: bool,
    /// Number of posts returned.
    #[serde(default)]
    pub count: u64,
    /// The posts, ordered by `created_at` descending.
    #[serde(default)]
    pub posts: Vec<Post>,
    /// Error description when `success` is false.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ListEnvelope {
    /// Creates a success envelope.
    #[must_use]
    pub fn success(posts: Vec<Post>) -> Self {
        Self {
            success: true,
            count: posts.len() as u64,
            posts,
            error: None,
        }
    }

    /// Creates a failure envelope.
    #[must_use]
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            count: 0,
            posts: Vec::new(),
            error: Some(error.into()),
        }
    }
}

/// Response envelope of `GET /posts/:id`, `POST /posts`, and
/// `PUT /posts/:id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostEnvelope {
    /// Whether the request succeeded.
    pub success: bool,
    /// Human-readable status message, when the server sends one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// The post, on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post: Option<Post>,
    /// Error description when `success` is false.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PostEnvelope {
    /// Creates a success envelope.
    #[must_use]
    pub fn success(post: Post) -> Self {
        Self {
            success: true,
            message: None,
            post: Some(post),
            error: None,
        }
    }

    /// Attaches a status message.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Creates a failure envelope.
    #[must_use]
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            message: None,
            post: None,
            error: Some(error.into()),
        }
    }

    /// Extracts the post from a success envelope.
    pub fn into_post(self) -> ProtocolResult<Post> {
        if !self.success {
            return Err(ProtocolError::validation(
                "success",
                self.error.unwrap_or_else(|| "request failed".into()),
            ));
        }
        self.post.ok_or(ProtocolError::MissingField { field: "post" })
    }
}

/// Response envelope of `DELETE /posts/:id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteEnvelope {
    /// Whether the request succeeded.
    pub success: bool,
    /// Human-readable status message, when the server sends one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Identifier of the removed post.
    #[serde(rename = "deletedId", default, skip_serializing_if = "Option::is_none")]
    pub deleted_id: Option<PostId>,
    /// Error description when `success` is false.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DeleteEnvelope {
    /// Creates a success envelope.
    #[must_use]
    pub fn success(deleted_id: PostId) -> Self {
        Self {
            success: true,
            message: None,
            deleted_id: Some(deleted_id),
            error: None,
        }
    }

    /// Creates a failure envelope.
    #[must_use]
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            message: None,
            deleted_id: None,
            error: Some(error.into()),
        }
    }

    /// Extracts the deleted id from a success envelope.
    pub fn into_deleted_id(self) -> ProtocolResult<PostId> {
        if !self.success {
            return Err(ProtocolError::validation(
                "success",
                self.error.unwrap_or_else(|| "request failed".into()),
            ));
        }
        self.deleted_id
            .ok_or(ProtocolError::MissingField { field: "deletedId" })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::post::PostId;

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
    fn list_envelope_round_trip() {
        let envelope = ListEnvelope::success(vec![post(1), post(2)]);
        let bytes = envelope.to_json().unwrap();
        let back = ListEnvelope::from_json(&bytes).unwrap();
        assert_eq!(back, envelope);
        assert_eq!(back.count, 2);
    }

    #[test]
    fn post_envelope_success_path() {
        let envelope = PostEnvelope::success(post(7)).with_message("Post created successfully");
        let bytes = envelope.to_json().unwrap();
        let back = PostEnvelope::from_json(&bytes).unwrap();
        assert_eq!(back.into_post().unwrap().id, PostId::new(7));
    }

    #[test]
    fn post_envelope_failure_surfaces_error() {
        let envelope = PostEnvelope::failure("Post not found");
        let err = envelope.into_post().unwrap_err();
        assert!(err.to_string().contains("Post not found"));
    }

    #[test]
    fn post_envelope_missing_post_is_an_error() {
        let bytes = br#"{"success": true}"#;
        let envelope = PostEnvelope::from_json(bytes).unwrap();
        assert!(matches!(
            envelope.into_post(),
            Err(ProtocolError::MissingField { field: "post" })
        ));
    }

    #[test]
    fn delete_envelope_uses_camel_case_key() {
        let envelope = DeleteEnvelope::success(PostId::new(3));
        let json = String::from_utf8(envelope.to_json().unwrap()).unwrap();
        assert!(json.contains("\"deletedId\":3"));

        let back = DeleteEnvelope::from_json(json.as_bytes()).unwrap();
        assert_eq!(back.into_deleted_id().unwrap(), PostId::new(3));
    }

    #[test]
    fn update_request_omits_absent_fields() {
        let patch = PostPatch::new().content("Edited");
        let request = UpdatePostRequest::from_patch(&patch);
        let json = String::from_utf8(request.to_json().unwrap()).unwrap();
        assert!(json.contains("content"));
        assert!(!json.contains("title"));
        assert!(!json.contains("author"));
    }

    #[test]
    fn create_request_carries_draft_fields() {
        let draft = PostDraft::new("Hi", "Body").with_author("Ann");
        let request = CreatePostRequest::from_draft(&draft);
        assert_eq!(request.title, "Hi");
        assert_eq!(request.author.as_deref(), Some("Ann"));
    }

    #[test]
    fn malformed_body_is_a_json_error() {
        let result = ListEnvelope::from_json(b"not json");
        assert!(matches!(result, Err(ProtocolError::Json(_))));
    }
}
