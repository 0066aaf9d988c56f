//! The `Post` entity, its identifier, and the draft/patch types used
//! to mutate it.

use crate::error::{ProtocolError, ProtocolResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Author assigned by the server when a draft omits one.
pub const DEFAULT_AUTHOR: &str = "Anonymous";

/// Unique identifier for a post.
///
/// Server-assigned identifiers are positive. Optimistically inserted
/// posts carry *temporary* negative identifiers until the server
/// confirms the insert and returns the canonical id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PostId(pub i64);

impl PostId {
    /// Creates a post ID from a raw value.
    #[inline]
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    /// Returns the raw ID value.
    #[inline]
    #[must_use]
    pub const fn as_i64(self) -> i64 {
        self.0
    }

    /// Returns true if this is a client-allocated temporary id that
    /// the server has not yet replaced with a canonical one.
    #[must_use]
    pub const fn is_temporary(self) -> bool {
        self.0 < 0
    }
}

impl fmt::Display for PostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "post:{}", self.0)
    }
}

impl From<i64> for PostId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl From<PostId> for i64 {
    fn from(id: PostId) -> Self {
        id.0
    }
}

/// A blog post as stored in the remote table.
///
/// Identity is immutable; every other field changes only through a
/// committed transaction. Timestamps are kept as the RFC 3339 strings
/// the server produces rather than parsed datetimes, so a round trip
/// through the mirror never reformats server data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    /// Server-assigned identifier (temporary and negative while an
    /// optimistic insert is in flight).
    pub id: PostId,
    /// Post title.
    pub title: String,
    /// Post body.
    pub content: String,
    /// Author name.
    pub author: String,
    /// Creation timestamp (RFC 3339).
    pub created_at: String,
    /// Last-update timestamp (RFC 3339).
    pub updated_at: String,
}

impl Post {
    /// Validates a post crossing the sync boundary.
    ///
    /// Required string fields must be non-empty after trimming.
    pub fn validate(&self) -> ProtocolResult<()> {
        non_empty("title", &self.title)?;
        non_empty("content", &self.content)?;
        non_empty("author", &self.author)?;
        Ok(())
    }

    /// Validates a server-confirmed post before it reaches the store.
    ///
    /// Canonical posts must additionally carry a server-assigned
    /// (positive) identifier.
    pub fn validate_canonical(&self) -> ProtocolResult<()> {
        self.validate()?;
        if self.id.as_i64() <= 0 {
            return Err(ProtocolError::validation(
                "id",
                format!("expected a server-assigned id, got {}", self.id),
            ));
        }
        Ok(())
    }
}

/// The fields a caller provides to create a post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostDraft {
    /// Post title (required).
    pub title: String,
    /// Post body (required).
    pub content: String,
    /// Author name; the server substitutes [`DEFAULT_AUTHOR`] when
    /// absent.
    pub author: Option<String>,
}

impl PostDraft {
    /// Creates a draft with the required fields.
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
            author: None,
        }
    }

    /// Sets the author.
    #[must_use]
    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    /// Returns the author this draft resolves to, applying the
    /// server-side default.
    #[must_use]
    pub fn author_or_default(&self) -> &str {
        self.author.as_deref().unwrap_or(DEFAULT_AUTHOR)
    }

    /// Validates the draft before it is sent.
    ///
    /// Mirrors the server's own check: `title` and `content` are
    /// required.
    pub fn validate(&self) -> ProtocolResult<()> {
        non_empty("title", &self.title)?;
        non_empty("content", &self.content)?;
        if let Some(author) = &self.author {
            non_empty("author", author)?;
        }
        Ok(())
    }

    /// Materializes the optimistic post this draft proposes.
    ///
    /// The id is a client-allocated temporary key and the timestamps a
    /// local approximation; both are replaced by the server's canonical
    /// values on commit.
    #[must_use]
    pub fn materialize(&self, id: PostId, timestamp: &str) -> Post {
        Post {
            id,
            title: self.title.clone(),
            content: self.content.clone(),
            author: self.author_or_default().to_string(),
            created_at: timestamp.to_string(),
            updated_at: timestamp.to_string(),
        }
    }
}

/// A partial update to a post.
///
/// Absent fields are preserved, matching the server's COALESCE
/// semantics. Only present fields are sent over the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostPatch {
    /// Replacement title, if any.
    pub title: Option<String>,
    /// Replacement body, if any.
    pub content: Option<String>,
    /// Replacement author, if any.
    pub author: Option<String>,
}

impl PostPatch {
    /// Creates an empty patch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the title.
    #[must_use]
    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Sets the content.
    #[must_use]
    pub fn content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    /// Sets the author.
    #[must_use]
    pub fn author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    /// Returns true if no field is present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.content.is_none() && self.author.is_none()
    }

    /// Validates the patch before it is sent.
    ///
    /// Present fields must be non-empty, and at least one field must be
    /// present for the update to mean anything.
    pub fn validate(&self) -> ProtocolResult<()> {
        if self.is_empty() {
            return Err(ProtocolError::validation(
                "patch",
                "at least one field must be present",
            ));
        }
        if let Some(title) = &self.title {
            non_empty("title", title)?;
        }
        if let Some(content) = &self.content {
            non_empty("content", content)?;
        }
        if let Some(author) = &self.author {
            non_empty("author", author)?;
        }
        Ok(())
    }

    /// Applies the patch to a post, preserving absent fields.
    ///
    /// Timestamps are left untouched; the caller decides whether to
    /// bump `updated_at`.
    #[must_use]
    pub fn apply_to(&self, post: &Post) -> Post {
        Post {
            id: post.id,
            title: self.title.clone().unwrap_or_else(|| post.title.clone()),
            content: self
                .content
                .clone()
                .unwrap_or_else(|| post.content.clone()),
            author: self.author.clone().unwrap_or_else(|| post.author.clone()),
            created_at: post.created_at.clone(),
            updated_at: post.updated_at.clone(),
        }
    }
}

fn non_empty(field: &'static str, value: &str) -> ProtocolResult<()> {
    if value.trim().is_empty() {
        return Err(ProtocolError::validation(field, "must not be empty"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

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
    fn temporary_ids_are_negative() {
        assert!(PostId::new(-1).is_temporary());
        assert!(!PostId::new(1).is_temporary());
        assert!(!PostId::new(0).is_temporary());
    }

    #[test]
    fn post_id_display() {
        assert_eq!(format!("{}", PostId::new(7)), "post:7");
    }

    #[test]
    fn draft_author_defaults() {
        let draft = PostDraft::new("Hi", "Body");
        assert_eq!(draft.author_or_default(), DEFAULT_AUTHOR);

        let draft = draft.with_author("Ann");
        assert_eq!(draft.author_or_default(), "Ann");
    }

    #[test]
    fn draft_materialize_applies_default_author() {
        let draft = PostDraft::new("Hi", "Body");
        let post = draft.materialize(PostId::new(-1), "2024-01-01T00:00:00Z");
        assert_eq!(post.author, DEFAULT_AUTHOR);
        assert!(post.id.is_temporary());
        assert_eq!(post.created_at, post.updated_at);
    }

    #[test]
    fn draft_validation_requires_title_and_content() {
        assert!(PostDraft::new("Hi", "Body").validate().is_ok());
        assert!(PostDraft::new("", "Body").validate().is_err());
        assert!(PostDraft::new("Hi", "  ").validate().is_err());
    }

    #[test]
    fn patch_applies_present_fields_only() {
        let original = post(7);
        let patch = PostPatch::new().content("Edited");
        let modified = patch.apply_to(&original);

        assert_eq!(modified.title, original.title);
        assert_eq!(modified.author, original.author);
        assert_eq!(modified.content, "Edited");
        assert_eq!(modified.id, original.id);
    }

    #[test]
    fn empty_patch_is_rejected() {
        let err = PostPatch::new().validate();
        assert!(err.is_err());
    }

    #[test]
    fn patch_rejects_blank_replacement() {
        let err = PostPatch::new().title("   ").validate();
        assert!(err.is_err());
    }

    #[test]
    fn canonical_validation_rejects_temporary_ids() {
        let mut p = post(-3);
        assert!(p.validate().is_ok());
        assert!(p.validate_canonical().is_err());

        p.id = PostId::new(3);
        assert!(p.validate_canonical().is_ok());
    }

    #[test]
    fn post_json_round_trip() {
        let p = post(7);
        let json = serde_json::to_string(&p).unwrap();
        let back: Post = serde_json::from_str(&json).unwrap();
        assert_eq!(back, p);
        // PostId serializes transparently as a bare integer.
        assert!(json.contains("\"id\":7"));
    }
}
