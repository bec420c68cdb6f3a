//! Publishing: persist, index, then push the post into every follower's cached feed.

use std::collections::BTreeSet;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use metrics::{counter, histogram};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::application::clock::Clock;
use crate::application::repos::{
    CallTimeouts, DirectoryError, FollowerDirectory, IndexDocument, PostStore, RepoError,
    SearchError, SearchIndexer,
};
use crate::cache::FeedCacheStore;
use crate::domain::entities::{FeedEntry, Post};
use crate::domain::error::DomainError;
use crate::domain::posts::{DEFAULT_PREVIEW_CHARS, PostDraft};
use crate::domain::types::{PostId, UserId};
use crate::util::deadline::bounded;

const SOURCE: &str = "microfeed::fanout";
pub const DEFAULT_FANOUT_CONCURRENCY: usize = 32;

#[derive(Debug, Error)]
pub enum PublishError {
    #[error(transparent)]
    Invalid(#[from] DomainError),
    #[error("post could not be persisted: {0}")]
    PersistenceFailed(#[source] RepoError),
}

/// A failure that was absorbed while publishing. The post is durable regardless.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum Advisory {
    #[error("indexing post {post_id} failed: {reason}")]
    IndexingFailed { post_id: PostId, reason: String },
    #[error("followers of {author_id} could not be resolved: {reason}")]
    DirectoryUnavailable { author_id: UserId, reason: String },
    #[error("feed cache write for {user_id} failed: {reason}")]
    CacheWriteFailed { user_id: UserId, reason: String },
}

impl Advisory {
    pub fn kind(&self) -> &'static str {
        match self {
            Advisory::IndexingFailed { .. } => "indexing_failed",
            Advisory::DirectoryUnavailable { .. } => "directory_unavailable",
            Advisory::CacheWriteFailed { .. } => "cache_write_failed",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishOutcome {
    pub post: Post,
    pub advisories: Vec<Advisory>,
}

impl PublishOutcome {
    pub fn post_id(&self) -> PostId {
        self.post.id
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FanoutConfig {
    pub preview_chars: usize,
    /// Follower feeds updated at once during one publish.
    pub concurrency: usize,
}

impl Default for FanoutConfig {
    fn default() -> Self {
        Self {
            preview_chars: DEFAULT_PREVIEW_CHARS,
            concurrency: DEFAULT_FANOUT_CONCURRENCY,
        }
    }
}

impl From<&crate::config::Settings> for FanoutConfig {
    fn from(settings: &crate::config::Settings) -> Self {
        Self {
            preview_chars: settings.feed.preview_chars.get(),
            concurrency: settings.feed.fanout_concurrency.get(),
        }
    }
}

#[derive(Clone)]
pub struct FanoutWriter {
    posts: Arc<dyn PostStore>,
    search: Arc<dyn SearchIndexer>,
    followers: Arc<dyn FollowerDirectory>,
    feeds: FeedCacheStore,
    clock: Arc<dyn Clock>,
    timeouts: CallTimeouts,
    config: FanoutConfig,
}

impl FanoutWriter {
    pub fn new(
        posts: Arc<dyn PostStore>,
        search: Arc<dyn SearchIndexer>,
        followers: Arc<dyn FollowerDirectory>,
        feeds: FeedCacheStore,
        clock: Arc<dyn Clock>,
        timeouts: CallTimeouts,
        config: FanoutConfig,
    ) -> Self {
        Self {
            posts,
            search,
            followers,
            feeds,
            clock,
            timeouts,
            config,
        }
    }

    /// Persist `draft` and spread it to the author's audience.
    ///
    /// Only validation and the post store write can fail the call. Indexing,
    /// follower lookup, and cache writes report into
    /// [`PublishOutcome::advisories`].
    pub async fn publish(&self, draft: PostDraft) -> Result<PublishOutcome, PublishError> {
        let new_post = draft.validate(self.clock.now())?;

        let post = bounded(
            self.timeouts.post_store,
            self.posts.insert(new_post),
            RepoError::Timeout,
        )
        .await
        .map_err(|err| {
            warn!(target = SOURCE, error = %err, "post persistence failed");
            PublishError::PersistenceFailed(err)
        })?;

        info!(
            target = SOURCE,
            post_id = %post.id,
            author_id = %post.author_id,
            "post persisted"
        );

        let mut advisories = Vec::new();

        if let Err(err) = self.index(&post).await {
            advisories.push(Advisory::IndexingFailed {
                post_id: post.id,
                reason: err.to_string(),
            });
        }

        let audience = match self.audience_of(&post.author_id).await {
            Ok(audience) => audience,
            Err(err) => {
                advisories.push(Advisory::DirectoryUnavailable {
                    author_id: post.author_id.clone(),
                    reason: err.to_string(),
                });
                BTreeSet::new()
            }
        };

        advisories.extend(self.fan_out(&post, audience).await);

        for advisory in &advisories {
            counter!("microfeed_fanout_advisory_total", "kind" => advisory.kind()).increment(1);
            warn!(
                target = SOURCE,
                post_id = %post.id,
                kind = advisory.kind(),
                detail = %advisory,
                "publish completed with advisory"
            );
        }

        Ok(PublishOutcome { post, advisories })
    }

    async fn index(&self, post: &Post) -> Result<(), SearchError> {
        let document = IndexDocument::from(post);
        bounded(
            self.timeouts.search,
            self.search.index_document(post.id, &document),
            SearchError::Timeout,
        )
        .await
    }

    /// Followers plus the author, who always sees their own posts.
    async fn audience_of(&self, author: &UserId) -> Result<BTreeSet<UserId>, DirectoryError> {
        let mut audience = bounded(
            self.timeouts.directory,
            self.followers.followers_of(author),
            DirectoryError::Timeout,
        )
        .await?;
        audience.insert(author.clone());
        Ok(audience)
    }

    async fn fan_out(&self, post: &Post, audience: BTreeSet<UserId>) -> Vec<Advisory> {
        if audience.is_empty() {
            return Vec::new();
        }

        histogram!("microfeed_fanout_followers").record(audience.len() as f64);
        let entry = FeedEntry::from_post(post, self.config.preview_chars, self.clock.now());

        let failures: Vec<Advisory> = stream::iter(audience)
            .map(|user_id| {
                let entry = entry.clone();
                async move {
                    match self.feeds.upsert(&user_id, entry).await {
                        Ok(()) => None,
                        Err(err) => Some(Advisory::CacheWriteFailed {
                            user_id,
                            reason: err.to_string(),
                        }),
                    }
                }
            })
            .buffer_unordered(self.config.concurrency.max(1))
            .filter_map(|failure| async move { failure })
            .collect()
            .await;

        debug!(
            target = SOURCE,
            post_id = %post.id,
            failed = failures.len(),
            "fan-out finished"
        );
        failures
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use time::{Duration, macros::datetime};

    use super::*;
    use crate::application::clock::ManualClock;
    use crate::application::repos::{SearchHit, StoreStats, TagCount, TimeRange};
    use crate::cache::{CacheError, FeedCacheConfig, FeedListBackend, MemoryFeedBackend};
    use crate::cache::{CasOutcome, Versioned};
    use crate::infra::memory::{MemoryFollowerDirectory, MemoryPostStore, MemorySearchIndex};

    struct DownIndexer;

    #[async_trait]
    impl SearchIndexer for DownIndexer {
        async fn index_document(&self, _: PostId, _: &IndexDocument) -> Result<(), SearchError> {
            Err(SearchError::Unavailable("connection refused".into()))
        }

        async fn search(&self, _: &str, _: usize) -> Result<Vec<SearchHit>, SearchError> {
            Err(SearchError::Unavailable("connection refused".into()))
        }

        async fn aggregate_tags(
            &self,
            _: TimeRange,
            _: usize,
        ) -> Result<Vec<TagCount>, SearchError> {
            Err(SearchError::Unavailable("connection refused".into()))
        }

        async fn health_check(&self) -> Result<(), SearchError> {
            Err(SearchError::Unavailable("connection refused".into()))
        }
    }

    struct DownDirectory;

    #[async_trait]
    impl FollowerDirectory for DownDirectory {
        async fn followers_of(&self, _: &UserId) -> Result<BTreeSet<UserId>, DirectoryError> {
            Err(DirectoryError::Unavailable("no route".into()))
        }
    }

    struct DownPostStore;

    #[async_trait]
    impl PostStore for DownPostStore {
        async fn insert(&self, _: crate::domain::entities::NewPost) -> Result<Post, RepoError> {
            Err(RepoError::Persistence("disk full".into()))
        }
        async fn find_by_id(&self, _: PostId) -> Result<Option<Post>, RepoError> {
            Err(RepoError::Persistence("disk full".into()))
        }
        async fn find_recent(
            &self,
            _: usize,
            _: Option<crate::application::repos::PostCursor>,
        ) -> Result<Vec<Post>, RepoError> {
            Err(RepoError::Persistence("disk full".into()))
        }
        async fn find_by_author(&self, _: &UserId, _: usize) -> Result<Vec<Post>, RepoError> {
            Err(RepoError::Persistence("disk full".into()))
        }
        async fn add_like(&self, _: PostId, _: &UserId) -> Result<u64, RepoError> {
            Err(RepoError::Persistence("disk full".into()))
        }
        async fn stats(&self) -> Result<StoreStats, RepoError> {
            Err(RepoError::Persistence("disk full".into()))
        }
        async fn health_check(&self) -> Result<(), RepoError> {
            Err(RepoError::Persistence("disk full".into()))
        }
    }

    /// Rejects writes for one key only.
    struct RejectingBackend {
        inner: MemoryFeedBackend,
        broken_key: &'static str,
    }

    #[async_trait]
    impl FeedListBackend for RejectingBackend {
        async fn load(&self, key: &str) -> Result<Option<Versioned>, CacheError> {
            self.inner.load(key).await
        }
        async fn compare_and_set(
            &self,
            key: &str,
            expected: Option<u64>,
            value: String,
        ) -> Result<CasOutcome, CacheError> {
            if key == self.broken_key {
                return Err(CacheError::unavailable("node down"));
            }
            self.inner.compare_and_set(key, expected, value).await
        }
        async fn remove(&self, key: &str) -> Result<bool, CacheError> {
            self.inner.remove(key).await
        }
        async fn ping(&self) -> Result<(), CacheError> {
            Ok(())
        }
    }

    struct Fixture {
        writer: FanoutWriter,
        feeds: FeedCacheStore,
        directory: Arc<MemoryFollowerDirectory>,
        posts: Arc<MemoryPostStore>,
        clock: Arc<ManualClock>,
    }

    fn fixture_with(
        search: Arc<dyn SearchIndexer>,
        directory_override: Option<Arc<dyn FollowerDirectory>>,
        backend: Arc<dyn FeedListBackend>,
    ) -> Fixture {
        let posts = Arc::new(MemoryPostStore::new());
        let directory = Arc::new(MemoryFollowerDirectory::new());
        let clock = Arc::new(ManualClock::at(datetime!(2024-05-01 12:00 UTC)));
        let feeds = FeedCacheStore::new(backend, FeedCacheConfig::default());
        let followers: Arc<dyn FollowerDirectory> =
            directory_override.unwrap_or_else(|| directory.clone());
        let writer = FanoutWriter::new(
            posts.clone(),
            search,
            followers,
            feeds.clone(),
            clock.clone(),
            CallTimeouts::default(),
            FanoutConfig::default(),
        );
        Fixture {
            writer,
            feeds,
            directory,
            posts,
            clock,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(
            Arc::new(MemorySearchIndex::new()),
            None,
            Arc::new(MemoryFeedBackend::new()),
        )
    }

    fn draft(text: &str) -> PostDraft {
        PostDraft::new("alice", text, vec!["x".into()])
    }

    #[tokio::test]
    async fn publishes_to_followers_and_the_author() {
        let fx = fixture();
        fx.directory.follow(&"alice".into(), &"bob".into());
        fx.directory.follow(&"alice".into(), &"carol".into());

        let outcome = fx.writer.publish(draft("hello")).await.expect("publish");
        assert!(outcome.advisories.is_empty());

        for viewer in ["alice", "bob", "carol"] {
            let list = fx
                .feeds
                .get(&UserId::from(viewer))
                .await
                .expect("get")
                .expect("warm feed");
            assert_eq!(list.len(), 1);
            assert_eq!(list.entries()[0].post_id, outcome.post_id());
            assert_eq!(list.entries()[0].text_preview, "hello");
        }
    }

    #[tokio::test]
    async fn newer_post_goes_to_the_head() {
        let fx = fixture();
        fx.directory.follow(&"alice".into(), &"bob".into());

        let first = fx.writer.publish(draft("first")).await.expect("publish");
        fx.clock.advance(Duration::seconds(5));
        let second = fx.writer.publish(draft("second")).await.expect("publish");

        let list = fx
            .feeds
            .get(&UserId::from("bob"))
            .await
            .expect("get")
            .expect("warm");
        assert_eq!(list.entries()[0].post_id, second.post_id());
        assert_eq!(list.entries()[1].post_id, first.post_id());
    }

    #[tokio::test]
    async fn invalid_draft_is_rejected_before_persistence() {
        let fx = fixture();
        let err = fx
            .writer
            .publish(draft(&"a".repeat(1001)))
            .await
            .expect_err("too long");
        assert!(matches!(err, PublishError::Invalid(_)));
        assert!(fx.posts.is_empty());
    }

    #[tokio::test]
    async fn post_store_failure_fails_the_publish() {
        let fx = fixture();
        let writer = FanoutWriter::new(
            Arc::new(DownPostStore),
            Arc::new(MemorySearchIndex::new()),
            fx.directory.clone(),
            fx.feeds.clone(),
            fx.clock.clone(),
            CallTimeouts::default(),
            FanoutConfig::default(),
        );
        let err = writer.publish(draft("hello")).await.expect_err("fails");
        assert!(matches!(err, PublishError::PersistenceFailed(_)));
        assert!(
            fx.feeds
                .get(&UserId::from("alice"))
                .await
                .expect("get")
                .is_none()
        );
    }

    #[tokio::test]
    async fn indexing_failure_is_advisory() {
        let fx = fixture_with(
            Arc::new(DownIndexer),
            None,
            Arc::new(MemoryFeedBackend::new()),
        );
        let outcome = fx.writer.publish(draft("hello")).await.expect("publish");

        assert_eq!(outcome.advisories.len(), 1);
        assert_eq!(outcome.advisories[0].kind(), "indexing_failed");
        assert!(
            fx.posts
                .find_by_id(outcome.post_id())
                .await
                .expect("find")
                .is_some()
        );
    }

    #[tokio::test]
    async fn directory_failure_skips_fan_out() {
        let fx = fixture_with(
            Arc::new(MemorySearchIndex::new()),
            Some(Arc::new(DownDirectory)),
            Arc::new(MemoryFeedBackend::new()),
        );
        let outcome = fx.writer.publish(draft("hello")).await.expect("publish");

        assert_eq!(outcome.advisories.len(), 1);
        assert_eq!(outcome.advisories[0].kind(), "directory_unavailable");
        assert!(
            fx.feeds
                .get(&UserId::from("alice"))
                .await
                .expect("get")
                .is_none()
        );
    }

    #[tokio::test]
    async fn one_failing_follower_does_not_block_the_rest() {
        let fx = fixture_with(
            Arc::new(MemorySearchIndex::new()),
            None,
            Arc::new(RejectingBackend {
                inner: MemoryFeedBackend::new(),
                broken_key: "bob",
            }),
        );
        fx.directory.follow(&"alice".into(), &"bob".into());
        fx.directory.follow(&"alice".into(), &"carol".into());

        let outcome = fx.writer.publish(draft("hello")).await.expect("publish");

        assert_eq!(
            outcome.advisories,
            vec![Advisory::CacheWriteFailed {
                user_id: UserId::from("bob"),
                reason: "cache backend unavailable: node down".into(),
            }]
        );
        assert!(fx.feeds.get(&"carol".into()).await.expect("get").is_some());
        assert!(fx.feeds.get(&"alice".into()).await.expect("get").is_some());
    }
}
