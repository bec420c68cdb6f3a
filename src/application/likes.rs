//! Like recording and cached like counts.

use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use thiserror::Error;
use tracing::warn;

use crate::application::repos::{CallTimeouts, PostStore, RepoError};
use crate::cache::{CacheError, LikeCountCache};
use crate::domain::types::{PostId, UserId};
use crate::util::deadline::bounded;

const SOURCE: &str = "microfeed::likes";

#[derive(Debug, Error)]
pub enum LikesError {
    #[error("post not found")]
    NotFound,
    #[error("like count could not be loaded from the post store")]
    Store(#[source] RepoError),
}

impl From<RepoError> for LikesError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::NotFound => LikesError::NotFound,
            other => LikesError::Store(other),
        }
    }
}

#[derive(Clone)]
pub struct LikesCounter {
    posts: Arc<dyn PostStore>,
    cache: Arc<dyn LikeCountCache>,
    timeouts: CallTimeouts,
    ttl: Duration,
}

impl LikesCounter {
    pub fn new(
        posts: Arc<dyn PostStore>,
        cache: Arc<dyn LikeCountCache>,
        timeouts: CallTimeouts,
        ttl: Duration,
    ) -> Self {
        Self {
            posts,
            cache,
            timeouts,
            ttl,
        }
    }

    /// Add `user_id` to the post's likers and return the unique liker count.
    /// Liking twice leaves the count unchanged.
    pub async fn record_like(&self, post_id: PostId, user_id: &UserId) -> Result<u64, LikesError> {
        let count = bounded(
            self.timeouts.post_store,
            self.posts.add_like(post_id, user_id),
            RepoError::Timeout,
        )
        .await?;

        self.refresh(post_id, count).await;
        Ok(count)
    }

    /// Cached count while its TTL holds, otherwise the authoritative count.
    pub async fn get_count(&self, post_id: PostId) -> Result<u64, LikesError> {
        match self.cache_call(self.cache.get(post_id)).await {
            Ok(Some(count)) => {
                counter!("microfeed_likes_cache_hit_total").increment(1);
                return Ok(count);
            }
            Ok(None) => {
                counter!("microfeed_likes_cache_miss_total").increment(1);
            }
            Err(err) => {
                counter!("microfeed_likes_cache_miss_total").increment(1);
                warn!(
                    target = SOURCE,
                    post_id = %post_id,
                    error = %err,
                    "like-count cache read failed"
                );
            }
        }

        let post = bounded(
            self.timeouts.post_store,
            self.posts.find_by_id(post_id),
            RepoError::Timeout,
        )
        .await?
        .ok_or(LikesError::NotFound)?;

        self.refresh(post_id, post.like_count).await;
        Ok(post.like_count)
    }

    /// Rewrite the cached count with a fresh TTL. A failed write falls back to
    /// invalidation so a stale count cannot outlive this call.
    async fn refresh(&self, post_id: PostId, count: u64) {
        let Err(err) = self
            .cache_call(self.cache.put(post_id, count, self.ttl))
            .await
        else {
            return;
        };
        warn!(
            target = SOURCE,
            post_id = %post_id,
            error = %err,
            "like-count cache write failed; invalidating"
        );
        if let Err(err) = self.cache_call(self.cache.invalidate(post_id)).await {
            warn!(
                target = SOURCE,
                post_id = %post_id,
                error = %err,
                "like-count cache invalidation failed"
            );
        }
    }

    async fn cache_call<T>(
        &self,
        future: impl std::future::Future<Output = Result<T, CacheError>>,
    ) -> Result<T, CacheError> {
        bounded(self.timeouts.cache, future, CacheError::Timeout).await
    }
}
