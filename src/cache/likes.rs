//! Expiring like-count cache.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use lru::LruCache;
use tokio::time::Instant;

use crate::domain::types::PostId;

use super::config::LikesCacheConfig;
use super::error::CacheError;
use super::lock::mutex_lock;

const SOURCE: &str = "cache::likes";

/// Key → count map with a per-entry time-to-live. An expired entry is absent.
#[async_trait]
pub trait LikeCountCache: Send + Sync {
    async fn get(&self, post_id: PostId) -> Result<Option<u64>, CacheError>;

    /// Cache `count` for `ttl`. Liker counts only grow, so a count below the
    /// live cached one is a late reply and leaves the entry untouched.
    async fn put(&self, post_id: PostId, count: u64, ttl: Duration) -> Result<(), CacheError>;

    async fn invalidate(&self, post_id: PostId) -> Result<(), CacheError>;
}

#[derive(Debug, Clone, Copy)]
struct CachedCount {
    count: u64,
    expires_at: Instant,
}

/// In-process implementation, bounded by LRU eviction.
pub struct MemoryLikeCountCache {
    entries: Mutex<LruCache<PostId, CachedCount>>,
}

impl MemoryLikeCountCache {
    pub fn new(config: &LikesCacheConfig) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(config.capacity_non_zero())),
        }
    }

    pub fn len(&self) -> usize {
        mutex_lock(&self.entries, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl LikeCountCache for MemoryLikeCountCache {
    async fn get(&self, post_id: PostId) -> Result<Option<u64>, CacheError> {
        let mut entries = mutex_lock(&self.entries, SOURCE, "get");
        let Some(cached) = entries.get(&post_id).copied() else {
            return Ok(None);
        };
        if Instant::now() >= cached.expires_at {
            entries.pop(&post_id);
            return Ok(None);
        }
        Ok(Some(cached.count))
    }

    async fn put(&self, post_id: PostId, count: u64, ttl: Duration) -> Result<(), CacheError> {
        let now = Instant::now();
        let mut entries = mutex_lock(&self.entries, SOURCE, "put");
        if let Some(cached) = entries.peek(&post_id)
            && cached.expires_at > now
            && cached.count > count
        {
            return Ok(());
        }
        entries.put(
            post_id,
            CachedCount {
                count,
                expires_at: now + ttl,
            },
        );
        Ok(())
    }

    async fn invalidate(&self, post_id: PostId) -> Result<(), CacheError> {
        mutex_lock(&self.entries, SOURCE, "invalidate").pop(&post_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache(capacity: usize) -> MemoryLikeCountCache {
        MemoryLikeCountCache::new(&LikesCacheConfig {
            capacity,
            ..Default::default()
        })
    }

    #[tokio::test(start_paused = true)]
    async fn entry_expires_after_its_ttl() {
        let cache = cache(10);
        let post = PostId::new();
        cache
            .put(post, 3, Duration::from_secs(3600))
            .await
            .expect("put");

        tokio::time::advance(Duration::from_secs(3599)).await;
        assert_eq!(cache.get(post).await.expect("get"), Some(3));

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(cache.get(post).await.expect("get"), None);
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn rewrite_refreshes_the_ttl() {
        let cache = cache(10);
        let post = PostId::new();
        cache.put(post, 1, Duration::from_secs(60)).await.expect("put");

        tokio::time::advance(Duration::from_secs(50)).await;
        cache.put(post, 2, Duration::from_secs(60)).await.expect("put");

        tokio::time::advance(Duration::from_secs(50)).await;
        assert_eq!(cache.get(post).await.expect("get"), Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn lower_count_does_not_replace_a_live_entry() {
        let cache = cache(10);
        let post = PostId::new();
        let ttl = Duration::from_secs(60);
        cache.put(post, 5, ttl).await.expect("put");
        cache.put(post, 4, ttl).await.expect("late put");
        assert_eq!(cache.get(post).await.expect("get"), Some(5));

        // Once expired, any count may take its place.
        tokio::time::advance(ttl + Duration::from_secs(1)).await;
        cache.put(post, 4, ttl).await.expect("put");
        assert_eq!(cache.get(post).await.expect("get"), Some(4));
    }

    #[tokio::test]
    async fn least_recently_used_entry_is_evicted() {
        let cache = cache(2);
        let (a, b, c) = (PostId::new(), PostId::new(), PostId::new());
        let ttl = Duration::from_secs(60);
        cache.put(a, 1, ttl).await.expect("put");
        cache.put(b, 2, ttl).await.expect("put");
        cache.get(a).await.expect("touch a");
        cache.put(c, 3, ttl).await.expect("put");

        assert_eq!(cache.get(b).await.expect("get"), None);
        assert_eq!(cache.get(a).await.expect("get"), Some(1));
        assert_eq!(cache.get(c).await.expect("get"), Some(3));
    }

    #[tokio::test]
    async fn invalidate_removes_the_entry() {
        let cache = cache(2);
        let post = PostId::new();
        cache.put(post, 9, Duration::from_secs(60)).await.expect("put");
        cache.invalidate(post).await.expect("invalidate");
        assert_eq!(cache.get(post).await.expect("get"), None);
    }
}
