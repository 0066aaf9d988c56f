//! Property-based test generators using proptest.
//!
//! Provides strategies for generating drafts, patches, and canonical
//! posts that satisfy boundary validation.

use mirrordb_protocol::{Post, PostDraft, PostId, PostPatch};
use proptest::prelude::*;

/// Strategy for non-empty text fields (no leading space, so trimming
/// never empties them).
pub fn text_strategy() -> impl Strategy<Value = String> {
    proptest::string::string_regex("[a-zA-Z0-9][a-zA-Z0-9 ]{0,30}")
        .expect("valid regex")
}

/// Strategy for valid drafts.
pub fn draft_strategy() -> impl Strategy<Value = PostDraft> {
    (
        text_strategy(),
        text_strategy(),
        proptest::option::of(text_strategy()),
    )
        .prop_map(|(title, content, author)| PostDraft {
            title,
            content,
            author,
        })
}

/// Strategy for valid patches (at least one field present).
pub fn patch_strategy() -> impl Strategy<Value = PostPatch> {
    (
        proptest::option::of(text_strategy()),
        proptest::option::of(text_strategy()),
        proptest::option::of(text_strategy()),
    )
        .prop_map(|(title, content, author)| PostPatch {
            title,
            content,
            author,
        })
        .prop_filter("patch must not be empty", |patch| !patch.is_empty())
}

/// Strategy for canonical posts with server-assigned ids.
pub fn post_strategy() -> impl Strategy<Value = Post> {
    (1i64..10_000, text_strategy(), text_strategy(), text_strategy()).prop_map(
        |(id, title, content, author)| Post {
            id: PostId::new(id),
            title,
            content,
            author,
            created_at: "2024-01-01T00:00:00Z".into(),
            updated_at: "2024-01-01T00:00:00Z".into(),
        },
    )
}
