//! Process-wide backend clients and the services wired on top of them.
//!
//! Every client is built once in [`Backends::init`], handed to the services
//! that need it, and released in [`Backends::shutdown`]. Nothing reaches for
//! ambient global state.

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use crate::application::clock::{Clock, SystemClock};
use crate::application::fanout::{FanoutConfig, FanoutWriter};
use crate::application::feed::{FeedReader, FeedReaderConfig};
use crate::application::likes::LikesCounter;
use crate::application::posts::PostQueries;
use crate::application::repos::{
    CallTimeouts, FollowerDirectory, PostStore, RepoError, SearchError, SearchIndexer,
};
use crate::application::search::SearchService;
use crate::cache::{
    CacheError, FeedCacheConfig, FeedCacheStore, FeedListBackend, LikeCountCache,
    LikesCacheConfig, MemoryFeedBackend, MemoryLikeCountCache,
};
use crate::config::Settings;
use crate::util::deadline::bounded;

use super::db::{PostgresFeedBackend, PostgresPostStore};
use super::error::InfraError;
use super::memory::{MemoryFollowerDirectory, MemoryPostStore, MemorySearchIndex};
use super::search::ElasticsearchIndexer;

const SOURCE: &str = "microfeed::bootstrap";

/// Tunables for every service, resolved from [`Settings`] or defaulted in tests.
#[derive(Debug, Clone, Default)]
pub struct ServiceConfig {
    pub timeouts: CallTimeouts,
    pub feed_cache: FeedCacheConfig,
    pub likes_cache: LikesCacheConfig,
    pub fanout: FanoutConfig,
    pub reader: FeedReaderConfig,
}

impl From<&Settings> for ServiceConfig {
    fn from(settings: &Settings) -> Self {
        Self {
            timeouts: CallTimeouts::from(&settings.timeouts),
            feed_cache: FeedCacheConfig::from(settings),
            likes_cache: LikesCacheConfig::from(settings),
            fanout: FanoutConfig::from(settings),
            reader: FeedReaderConfig::from(settings),
        }
    }
}

/// Backend clients owned by the process.
pub struct Backends {
    pub posts: Arc<dyn PostStore>,
    pub search: Arc<dyn SearchIndexer>,
    pub followers: Arc<MemoryFollowerDirectory>,
    pub feed_lists: Arc<dyn FeedListBackend>,
    pub like_counts: Arc<dyn LikeCountCache>,
    postgres: Option<PostgresPostStore>,
}

impl Backends {
    /// Connect to the configured backends, falling back to in-process ones
    /// where no URL is configured.
    pub async fn init(settings: &Settings) -> Result<Self, InfraError> {
        let config = ServiceConfig::from(settings);

        let (posts, feed_lists, postgres) = match settings.database.url.as_deref() {
            Some(url) => {
                let pool =
                    PostgresPostStore::connect(url, settings.database.max_connections.get())
                        .await
                        .map_err(|err| InfraError::database(err.to_string()))?;
                PostgresPostStore::run_migrations(&pool)
                    .await
                    .map_err(|err| InfraError::database(err.to_string()))?;
                let feed_lists: Arc<dyn FeedListBackend> =
                    Arc::new(PostgresFeedBackend::new(pool.clone()));
                let store = PostgresPostStore::new(pool);
                info!(target = SOURCE, "post store and feed cache: postgres");
                let posts: Arc<dyn PostStore> = Arc::new(store.clone());
                (posts, feed_lists, Some(store))
            }
            None => {
                warn!(
                    target = SOURCE,
                    "no database url configured; posts and feeds are kept in memory"
                );
                let posts: Arc<dyn PostStore> = Arc::new(MemoryPostStore::new());
                let feed_lists: Arc<dyn FeedListBackend> = Arc::new(MemoryFeedBackend::new());
                (posts, feed_lists, None)
            }
        };

        let search: Arc<dyn SearchIndexer> = match settings.search.elasticsearch_url.as_deref() {
            Some(url) => {
                info!(
                    target = SOURCE,
                    url,
                    index = %settings.search.index,
                    "search: elasticsearch"
                );
                Arc::new(ElasticsearchIndexer::new(url, &settings.search.index)?)
            }
            None => {
                info!(target = SOURCE, "search: in-memory index");
                Arc::new(MemorySearchIndex::new())
            }
        };

        Ok(Self {
            posts,
            search,
            followers: Arc::new(MemoryFollowerDirectory::new()),
            feed_lists,
            like_counts: Arc::new(MemoryLikeCountCache::new(&config.likes_cache)),
            postgres,
        })
    }

    /// Fully in-process backends.
    pub fn in_memory(likes: &LikesCacheConfig) -> Self {
        Self {
            posts: Arc::new(MemoryPostStore::new()),
            search: Arc::new(MemorySearchIndex::new()),
            followers: Arc::new(MemoryFollowerDirectory::new()),
            feed_lists: Arc::new(MemoryFeedBackend::new()),
            like_counts: Arc::new(MemoryLikeCountCache::new(likes)),
            postgres: None,
        }
    }

    /// Release external connections. Services built from these backends must
    /// not be used afterwards.
    pub async fn shutdown(self) {
        if let Some(postgres) = self.postgres {
            postgres.close().await;
            info!(target = SOURCE, "postgres pool closed");
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Ok,
    Degraded,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub status: HealthStatus,
    pub post_store: bool,
    pub search: bool,
    pub feed_cache: bool,
}

/// Application services sharing one set of [`Backends`].
#[derive(Clone)]
pub struct AppServices {
    pub fanout: FanoutWriter,
    pub feeds: FeedReader,
    pub likes: LikesCounter,
    pub search: SearchService,
    pub posts: PostQueries,
    pub followers: Arc<MemoryFollowerDirectory>,
    feed_cache: FeedCacheStore,
    search_index: Arc<dyn SearchIndexer>,
    timeouts: CallTimeouts,
}

impl AppServices {
    pub fn new(backends: &Backends, config: ServiceConfig) -> Self {
        Self::with_clock(backends, config, Arc::new(SystemClock))
    }

    pub fn with_clock(backends: &Backends, config: ServiceConfig, clock: Arc<dyn Clock>) -> Self {
        let feed_cache = FeedCacheStore::new(backends.feed_lists.clone(), config.feed_cache);
        let followers: Arc<dyn FollowerDirectory> = backends.followers.clone();

        let fanout = FanoutWriter::new(
            backends.posts.clone(),
            backends.search.clone(),
            followers,
            feed_cache.clone(),
            clock.clone(),
            config.timeouts,
            config.fanout,
        );
        let feeds = FeedReader::new(
            backends.posts.clone(),
            feed_cache.clone(),
            clock,
            config.timeouts,
            config.reader,
        );
        let likes = LikesCounter::new(
            backends.posts.clone(),
            backends.like_counts.clone(),
            config.timeouts,
            config.likes_cache.ttl,
        );
        let search = SearchService::new(backends.search.clone(), config.timeouts)
            .with_preview_chars(config.fanout.preview_chars);
        let posts = PostQueries::new(backends.posts.clone(), config.timeouts);

        Self {
            fanout,
            feeds,
            likes,
            search,
            posts,
            followers: backends.followers.clone(),
            feed_cache,
            search_index: backends.search.clone(),
            timeouts: config.timeouts,
        }
    }

    /// Check every backend. Only a failing post store makes the service unusable,
    /// but any failure reports `degraded`.
    pub async fn health(&self) -> HealthReport {
        let post_store = self.posts.health_check().await;
        let search = bounded(
            self.timeouts.search,
            self.search_index.health_check(),
            SearchError::Timeout,
        )
        .await;
        let feed_cache = self.feed_cache.ping().await;

        log_health("post_store", post_store.as_ref().err().map(RepoError::to_string));
        log_health("search", search.as_ref().err().map(SearchError::to_string));
        log_health("feed_cache", feed_cache.as_ref().err().map(CacheError::to_string));

        let post_store = post_store.is_ok();
        let search = search.is_ok();
        let feed_cache = feed_cache.is_ok();
        let status = if post_store && search && feed_cache {
            HealthStatus::Ok
        } else {
            HealthStatus::Degraded
        };

        HealthReport {
            status,
            post_store,
            search,
            feed_cache,
        }
    }
}

fn log_health(backend: &'static str, failure: Option<String>) {
    if let Some(error) = failure {
        warn!(target = SOURCE, backend, error = %error, "health check failed");
    }
}
