//! Feed reads: cache first, authoritative store on a miss.

use std::sync::Arc;
use std::time::Instant;

use metrics::{counter, histogram};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::application::clock::Clock;
use crate::application::repos::{CallTimeouts, PostStore, RepoError};
use crate::cache::FeedCacheStore;
use crate::domain::entities::FeedEntry;
use crate::domain::posts::DEFAULT_PREVIEW_CHARS;
use crate::domain::types::{FeedSource, UserId};
use crate::util::deadline::bounded;

const SOURCE: &str = "microfeed::feed";
pub const DEFAULT_REBUILD_LIMIT: usize = 50;

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("feed could not be loaded from the post store")]
    Store(#[source] RepoError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeedPage {
    pub entries: Vec<FeedEntry>,
    pub source: FeedSource,
}

#[derive(Debug, Clone, Copy)]
pub struct FeedReaderConfig {
    pub rebuild_limit: usize,
    pub preview_chars: usize,
}

impl Default for FeedReaderConfig {
    fn default() -> Self {
        Self {
            rebuild_limit: DEFAULT_REBUILD_LIMIT,
            preview_chars: DEFAULT_PREVIEW_CHARS,
        }
    }
}

impl From<&crate::config::Settings> for FeedReaderConfig {
    fn from(settings: &crate::config::Settings) -> Self {
        Self {
            rebuild_limit: settings.feed.rebuild_limit.get(),
            preview_chars: settings.feed.preview_chars.get(),
        }
    }
}

#[derive(Clone)]
pub struct FeedReader {
    posts: Arc<dyn PostStore>,
    feeds: FeedCacheStore,
    clock: Arc<dyn Clock>,
    timeouts: CallTimeouts,
    config: FeedReaderConfig,
}

impl FeedReader {
    pub fn new(
        posts: Arc<dyn PostStore>,
        feeds: FeedCacheStore,
        clock: Arc<dyn Clock>,
        timeouts: CallTimeouts,
        config: FeedReaderConfig,
    ) -> Self {
        Self {
            posts,
            feeds,
            clock,
            timeouts,
            config,
        }
    }

    /// Serve `user_id`'s feed.
    ///
    /// With `use_cache` a warm cached list is returned as-is. A cold or
    /// unreachable cache, or `use_cache = false`, rebuilds from the post store
    /// and repairs the cache on a best-effort basis. Only a post store failure
    /// fails the read.
    pub async fn get_feed(&self, user_id: &UserId, use_cache: bool) -> Result<FeedPage, FeedError> {
        if use_cache {
            match self.feeds.get(user_id).await {
                Ok(Some(list)) => {
                    counter!("microfeed_feed_cache_hit_total").increment(1);
                    return Ok(FeedPage {
                        entries: list.into_entries(),
                        source: FeedSource::Cache,
                    });
                }
                Ok(None) => {
                    counter!("microfeed_feed_cache_miss_total").increment(1);
                }
                Err(err) => {
                    counter!("microfeed_feed_cache_unavailable_total").increment(1);
                    warn!(
                        target = SOURCE,
                        user_id = %user_id,
                        kind = err.kind(),
                        error = %err,
                        "feed cache unavailable; reading from post store"
                    );
                }
            }
        }

        self.rebuild(user_id).await
    }

    /// Administrative reset; the next cached read rebuilds.
    pub async fn reset(&self, user_id: &UserId) -> Result<bool, crate::cache::CacheError> {
        self.feeds.delete_all(user_id).await
    }

    async fn rebuild(&self, user_id: &UserId) -> Result<FeedPage, FeedError> {
        let started = Instant::now();
        let posts = bounded(
            self.timeouts.post_store,
            self.posts.find_recent(self.config.rebuild_limit, None),
            RepoError::Timeout,
        )
        .await
        .map_err(FeedError::Store)?;

        let cached_at = self.clock.now();
        let entries: Vec<FeedEntry> = posts
            .iter()
            .map(|post| FeedEntry::from_post(post, self.config.preview_chars, cached_at))
            .collect();

        self.repopulate(user_id, &entries).await;

        histogram!("microfeed_feed_rebuild_ms").record(started.elapsed().as_secs_f64() * 1000.0);
        debug!(
            target = SOURCE,
            user_id = %user_id,
            entries = entries.len(),
            "feed rebuilt from post store"
        );

        Ok(FeedPage {
            entries,
            source: FeedSource::Database,
        })
    }

    /// Oldest first, so the cached order ends up matching `entries`.
    async fn repopulate(&self, user_id: &UserId, entries: &[FeedEntry]) {
        for entry in entries.iter().rev() {
            if let Err(err) = self.feeds.upsert(user_id, entry.clone()).await {
                warn!(
                    target = SOURCE,
                    user_id = %user_id,
                    kind = err.kind(),
                    error = %err,
                    "feed cache repopulation abandoned"
                );
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use time::{Duration, macros::datetime};

    use super::*;
    use crate::application::clock::ManualClock;
    use crate::cache::{
        CacheError, CasOutcome, FeedCacheConfig, FeedListBackend, MemoryFeedBackend, Versioned,
    };
    use crate::domain::entities::NewPost;
    use crate::infra::memory::MemoryPostStore;

    struct UnreachableBackend;

    #[async_trait]
    impl FeedListBackend for UnreachableBackend {
        async fn load(&self, _: &str) -> Result<Option<Versioned>, CacheError> {
            Err(CacheError::unavailable("connection refused"))
        }
        async fn compare_and_set(
            &self,
            _: &str,
            _: Option<u64>,
            _: String,
        ) -> Result<CasOutcome, CacheError> {
            Err(CacheError::unavailable("connection refused"))
        }
        async fn remove(&self, _: &str) -> Result<bool, CacheError> {
            Err(CacheError::unavailable("connection refused"))
        }
        async fn ping(&self) -> Result<(), CacheError> {
            Err(CacheError::unavailable("connection refused"))
        }
    }

    async fn seeded_store(count: i64) -> Arc<MemoryPostStore> {
        let store = Arc::new(MemoryPostStore::new());
        let base = datetime!(2024-05-01 12:00 UTC);
        for i in 0..count {
            store
                .insert(NewPost {
                    author_id: UserId::from("alice"),
                    text: format!("post {i}"),
                    tags: Vec::new(),
                    created_at: base + Duration::seconds(i),
                })
                .await
                .expect("insert");
        }
        store
    }

    fn reader(posts: Arc<MemoryPostStore>, backend: Arc<dyn FeedListBackend>) -> FeedReader {
        FeedReader::new(
            posts,
            FeedCacheStore::new(backend, FeedCacheConfig::default()),
            Arc::new(ManualClock::at(datetime!(2024-06-01 00:00 UTC))),
            CallTimeouts::default(),
            FeedReaderConfig::default(),
        )
    }

    #[tokio::test]
    async fn cold_cache_rebuilds_then_serves_from_cache() {
        let reader = reader(seeded_store(3).await, Arc::new(MemoryFeedBackend::new()));
        let bob = UserId::from("bob");

        let first = reader.get_feed(&bob, true).await.expect("feed");
        assert_eq!(first.source, FeedSource::Database);
        assert_eq!(first.entries.len(), 3);
        assert_eq!(first.entries[0].text_preview, "post 2");

        let second = reader.get_feed(&bob, true).await.expect("feed");
        assert_eq!(second.source, FeedSource::Cache);
        assert_eq!(second.entries, first.entries);
    }

    #[tokio::test]
    async fn rebuild_is_bounded_to_the_most_recent_posts() {
        let reader = reader(seeded_store(60).await, Arc::new(MemoryFeedBackend::new()));

        let page = reader.get_feed(&"bob".into(), false).await.expect("feed");
        assert_eq!(page.source, FeedSource::Database);
        assert_eq!(page.entries.len(), DEFAULT_REBUILD_LIMIT);
        assert_eq!(page.entries[0].text_preview, "post 59");
        assert_eq!(page.entries[49].text_preview, "post 10");
    }

    #[tokio::test]
    async fn bypassing_the_cache_always_hits_the_store() {
        let reader = reader(seeded_store(2).await, Arc::new(MemoryFeedBackend::new()));
        let bob = UserId::from("bob");
        reader.get_feed(&bob, true).await.expect("warm");

        let page = reader.get_feed(&bob, false).await.expect("feed");
        assert_eq!(page.source, FeedSource::Database);
    }

    #[tokio::test]
    async fn unreachable_cache_does_not_fail_the_read() {
        let reader = reader(seeded_store(2).await, Arc::new(UnreachableBackend));

        let page = reader.get_feed(&"bob".into(), true).await.expect("feed");
        assert_eq!(page.source, FeedSource::Database);
        assert_eq!(page.entries.len(), 2);
    }

    #[tokio::test]
    async fn empty_store_yields_an_empty_database_page() {
        let reader = reader(seeded_store(0).await, Arc::new(MemoryFeedBackend::new()));
        let page = reader.get_feed(&"bob".into(), true).await.expect("feed");
        assert_eq!(page.source, FeedSource::Database);
        assert!(page.entries.is_empty());
    }

    #[tokio::test]
    async fn reset_makes_the_next_read_rebuild() {
        let reader = reader(seeded_store(1).await, Arc::new(MemoryFeedBackend::new()));
        let bob = UserId::from("bob");
        reader.get_feed(&bob, true).await.expect("warm");

        assert!(reader.reset(&bob).await.expect("reset"));
        let page = reader.get_feed(&bob, true).await.expect("feed");
        assert_eq!(page.source, FeedSource::Database);
    }
}
