//! Traits describing the external collaborators the feed subsystem consumes.

use std::collections::BTreeSet;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::OffsetDateTime;

use crate::domain::entities::{NewPost, Post};
use crate::domain::types::{PostId, UserId};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("resource not found")]
    NotFound,
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("post store call timed out after {}ms", .0.as_millis())]
    Timeout(Duration),
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SearchError {
    #[error("search backend unavailable: {0}")]
    Unavailable(String),
    #[error("search backend rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("search call timed out after {}ms", .0.as_millis())]
    Timeout(Duration),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DirectoryError {
    #[error("follower directory unavailable: {0}")]
    Unavailable(String),
    #[error("follower directory call timed out after {}ms", .0.as_millis())]
    Timeout(Duration),
}

/// Keyset position for paging through posts newest-first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PostCursor {
    pub created_at: OffsetDateTime,
    pub id: PostId,
}

impl PostCursor {
    pub fn after(post: &Post) -> Self {
        Self {
            created_at: post.created_at,
            id: post.id,
        }
    }
}

/// Authoritative, durable storage of posts and their likers.
#[async_trait]
pub trait PostStore: Send + Sync {
    /// Persist a post and return it with its assigned id.
    async fn insert(&self, post: NewPost) -> Result<Post, RepoError>;

    async fn find_by_id(&self, id: PostId) -> Result<Option<Post>, RepoError>;

    /// Up to `limit` posts ordered newest first, strictly older than `before`.
    async fn find_recent(
        &self,
        limit: usize,
        before: Option<PostCursor>,
    ) -> Result<Vec<Post>, RepoError>;

    async fn find_by_author(&self, author: &UserId, limit: usize)
    -> Result<Vec<Post>, RepoError>;

    /// Add `user` to the post's liker set and return the number of unique likers.
    /// Fails with [`RepoError::NotFound`] when the post does not exist.
    async fn add_like(&self, id: PostId, user: &UserId) -> Result<u64, RepoError>;

    /// Totals over every stored post.
    async fn stats(&self) -> Result<StoreStats, RepoError>;

    async fn health_check(&self) -> Result<(), RepoError>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreStats {
    pub posts: u64,
    /// Distinct users that have published at least one post.
    pub authors: u64,
}

/// Fields submitted to the search index for one post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexDocument {
    pub text: String,
    pub tags: Vec<String>,
    pub author_id: UserId,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl From<&Post> for IndexDocument {
    fn from(post: &Post) -> Self {
        Self {
            text: post.text.clone(),
            tags: post.tags.clone(),
            author_id: post.author_id.clone(),
            created_at: post.created_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
    pub id: PostId,
    pub author_id: UserId,
    pub text: String,
    pub tags: Vec<String>,
    pub score: f64,
}

/// Number of indexed posts carrying `tag`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagCount {
    pub tag: String,
    pub count: u64,
}

/// Inclusive `created_at` window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub from: OffsetDateTime,
    pub to: OffsetDateTime,
}

impl TimeRange {
    pub fn contains(&self, instant: OffsetDateTime) -> bool {
        self.from <= instant && instant <= self.to
    }
}

/// Best-effort full-text index over post text and tags.
#[async_trait]
pub trait SearchIndexer: Send + Sync {
    async fn index_document(&self, id: PostId, document: &IndexDocument)
    -> Result<(), SearchError>;

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, SearchError>;

    /// The `limit` most used tags among posts created within `range`, most
    /// used first.
    async fn aggregate_tags(
        &self,
        range: TimeRange,
        limit: usize,
    ) -> Result<Vec<TagCount>, SearchError>;

    async fn health_check(&self) -> Result<(), SearchError>;
}

/// Source of truth for who follows whom. An empty set is a valid answer;
/// failures are reported as errors, never as an empty set.
#[async_trait]
pub trait FollowerDirectory: Send + Sync {
    async fn followers_of(&self, user: &UserId) -> Result<BTreeSet<UserId>, DirectoryError>;
}

pub const DEFAULT_POST_STORE_TIMEOUT: Duration = Duration::from_millis(2000);
pub const DEFAULT_SEARCH_TIMEOUT: Duration = Duration::from_millis(1000);
pub const DEFAULT_DIRECTORY_TIMEOUT: Duration = Duration::from_millis(500);
pub const DEFAULT_CACHE_TIMEOUT: Duration = Duration::from_millis(250);

/// Deadlines applied to every call into a collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallTimeouts {
    pub post_store: Duration,
    pub search: Duration,
    pub directory: Duration,
    pub cache: Duration,
}

impl Default for CallTimeouts {
    fn default() -> Self {
        Self {
            post_store: DEFAULT_POST_STORE_TIMEOUT,
            search: DEFAULT_SEARCH_TIMEOUT,
            directory: DEFAULT_DIRECTORY_TIMEOUT,
            cache: DEFAULT_CACHE_TIMEOUT,
        }
    }
}

impl From<&crate::config::TimeoutSettings> for CallTimeouts {
    fn from(settings: &crate::config::TimeoutSettings) -> Self {
        Self {
            post_store: settings.post_store,
            search: settings.search,
            directory: settings.directory,
            cache: settings.cache,
        }
    }
}
