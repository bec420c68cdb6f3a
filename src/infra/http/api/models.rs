use serde::{Deserialize, Serialize};

use crate::application::fanout::{Advisory, PublishOutcome};
use crate::application::feed::FeedPage;
use crate::domain::entities::{FeedEntry, Post};
use crate::domain::types::{FeedSource, PostId, UserId};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostCreateRequest {
    pub author_id: String,
    pub text: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostCreateResponse {
    pub post_id: PostId,
    pub post: Post,
    pub advisories: Vec<Advisory>,
}

impl From<PublishOutcome> for PostCreateResponse {
    fn from(outcome: PublishOutcome) -> Self {
        Self {
            post_id: outcome.post_id(),
            post: outcome.post,
            advisories: outcome.advisories,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LikeRequest {
    pub user_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LikeCountResponse {
    pub post_id: PostId,
    pub like_count: u64,
}

#[derive(Debug, Deserialize)]
pub struct FeedQuery {
    pub use_cache: Option<bool>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedResponse {
    pub user_id: UserId,
    pub source: FeedSource,
    pub entries: Vec<FeedEntry>,
}

impl FeedResponse {
    pub fn new(user_id: UserId, page: FeedPage) -> Self {
        Self {
            user_id,
            source: page.source,
            entries: page.entries,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct FeedResetResponse {
    pub removed: bool,
}

#[derive(Debug, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub q: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct TagTrendsQuery {
    pub from: Option<String>,
    pub to: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsResponse {
    pub posts: u64,
    pub authors: u64,
    #[serde(with = "time::serde::rfc3339")]
    pub generated_at: time::OffsetDateTime,
}

#[derive(Debug, Serialize)]
pub struct FollowResponse {
    pub changed: bool,
}
