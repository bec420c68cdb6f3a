//! Domain entities mirrored from the authoritative store and the feed cache.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::domain::posts::truncate_preview;
use crate::domain::types::{PostId, UserId};

/// A persisted post. Immutable apart from its like count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: PostId,
    pub author_id: UserId,
    pub text: String,
    pub tags: Vec<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub like_count: u64,
}

/// A validated post submission, before the store assigns an id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPost {
    pub author_id: UserId,
    pub text: String,
    pub tags: Vec<String>,
    pub created_at: OffsetDateTime,
}

/// Denormalized projection of a [`Post`] stored in a viewer's cached feed.
///
/// The serialized form is the wire shape of the feed cache:
/// `{postId, authorId, textPreview, createdAt, cachedAt}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedEntry {
    pub post_id: PostId,
    pub author_id: UserId,
    pub text_preview: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub cached_at: OffsetDateTime,
}

impl FeedEntry {
    pub fn from_post(post: &Post, preview_chars: usize, cached_at: OffsetDateTime) -> Self {
        Self {
            post_id: post.id,
            author_id: post.author_id.clone(),
            text_preview: truncate_preview(&post.text, preview_chars),
            created_at: post.created_at,
            cached_at,
        }
    }
}
