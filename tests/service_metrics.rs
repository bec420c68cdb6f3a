use std::collections::HashSet;
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use metrics_util::debugging::{DebugValue, DebuggingRecorder, Snapshotter};
use serial_test::serial;

use microfeed::application::repos::{
    IndexDocument, SearchError, SearchHit, SearchIndexer, TagCount, TimeRange,
};
use microfeed::cache::LikesCacheConfig;
use microfeed::domain::posts::PostDraft;
use microfeed::domain::types::{PostId, UserId};
use microfeed::infra::bootstrap::{AppServices, Backends, ServiceConfig};

fn snapshotter() -> &'static Snapshotter {
    static SNAPSHOTTER: OnceLock<Snapshotter> = OnceLock::new();
    SNAPSHOTTER.get_or_init(|| {
        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();
        recorder
            .install()
            .expect("debug metrics recorder should install in this test process");
        snapshotter
    })
}

fn metric_names() -> HashSet<String> {
    snapshotter()
        .snapshot()
        .into_vec()
        .into_iter()
        .map(|(composite_key, _, _, _)| composite_key.key().name().to_string())
        .collect()
}

struct DownIndexer;

#[async_trait]
impl SearchIndexer for DownIndexer {
    async fn index_document(&self, _: PostId, _: &IndexDocument) -> Result<(), SearchError> {
        Err(SearchError::Unavailable("connection refused".into()))
    }

    async fn search(&self, _: &str, _: usize) -> Result<Vec<SearchHit>, SearchError> {
        Err(SearchError::Unavailable("connection refused".into()))
    }

    async fn aggregate_tags(&self, _: TimeRange, _: usize) -> Result<Vec<TagCount>, SearchError> {
        Err(SearchError::Unavailable("connection refused".into()))
    }

    async fn health_check(&self) -> Result<(), SearchError> {
        Err(SearchError::Unavailable("connection refused".into()))
    }
}

#[tokio::test]
#[serial]
async fn read_paths_emit_cache_metrics() {
    snapshotter();
    let backends = Backends::in_memory(&LikesCacheConfig::default());
    let services = AppServices::new(&backends, ServiceConfig::default());
    let alice = UserId::new("alice");

    let outcome = services
        .fanout
        .publish(PostDraft::new("alice", "measured", vec![]))
        .await
        .expect("publish should succeed");

    // bob has no cached feed yet; alice does.
    services
        .feeds
        .get_feed(&UserId::new("bob"), true)
        .await
        .expect("feed should load");
    services
        .feeds
        .get_feed(&alice, true)
        .await
        .expect("feed should load");

    services
        .likes
        .get_count(outcome.post_id())
        .await
        .expect("count should load");
    services
        .likes
        .get_count(outcome.post_id())
        .await
        .expect("count should load");

    let names = metric_names();
    for metric in [
        "microfeed_fanout_followers",
        "microfeed_feed_cache_hit_total",
        "microfeed_feed_cache_miss_total",
        "microfeed_feed_rebuild_ms",
        "microfeed_likes_cache_hit_total",
        "microfeed_likes_cache_miss_total",
    ] {
        assert!(names.contains(metric), "missing metric: {metric}");
    }
}

#[tokio::test]
#[serial]
async fn advisories_are_counted_by_kind() {
    snapshotter();
    let mut backends = Backends::in_memory(&LikesCacheConfig::default());
    backends.search = Arc::new(DownIndexer);
    let services = AppServices::new(&backends, ServiceConfig::default());

    let outcome = services
        .fanout
        .publish(PostDraft::new("alice", "unindexed", vec![]))
        .await
        .expect("indexing failures must not fail the publish");
    assert_eq!(outcome.advisories.len(), 1);
    assert_eq!(outcome.advisories[0].kind(), "indexing_failed");

    let indexing_failures: u64 = snapshotter()
        .snapshot()
        .into_vec()
        .into_iter()
        .filter(|(composite_key, _, _, _)| {
            let key = composite_key.key();
            key.name() == "microfeed_fanout_advisory_total"
                && key
                    .labels()
                    .any(|label| label.key() == "kind" && label.value() == "indexing_failed")
        })
        .map(|(_, _, _, value)| match value {
            DebugValue::Counter(count) => count,
            _ => 0,
        })
        .sum();
    assert!(indexing_failures >= 1);
}
