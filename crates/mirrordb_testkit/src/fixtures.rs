//! Sample posts and drafts for tests.

use mirrordb_protocol::{Post, PostDraft, PostId};

/// Builds a post with predictable fields.
///
/// `created_at` advances one day per id so the server's
/// newest-first ordering is easy to assert against.
#[must_use]
pub fn sample_post(id: i64) -> Post {
    let day = id.rem_euclid(27) + 1;
    Post {
        id: PostId::new(id),
        title: format!("Post {id}"),
        content: format!("Content of post {id}"),
        author: "Ann".into(),
        created_at: format!("2024-01-{day:02}T00:00:00Z"),
        updated_at: format!("2024-01-{day:02}T00:00:00Z"),
    }
}

/// Builds `n` sample posts with ids `1..=n`.
#[must_use]
pub fn sample_posts(n: i64) -> Vec<Post> {
    (1..=n).map(sample_post).collect()
}

/// Builds a draft with a title derived from the label.
#[must_use]
pub fn draft(label: &str) -> PostDraft {
    PostDraft::new(format!("Post {label}"), format!("Content {label}"))
}
