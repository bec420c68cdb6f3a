//! Full-text search over posts. The index is best-effort, so failures degrade.

use std::sync::Arc;

use serde::Serialize;
use tracing::warn;

use time::OffsetDateTime;

use crate::application::repos::{
    CallTimeouts, SearchError, SearchHit, SearchIndexer, TagCount, TimeRange,
};
use crate::domain::error::DomainError;
use crate::domain::posts::{DEFAULT_PREVIEW_CHARS, truncate_preview};
use crate::domain::types::{PostId, UserId};
use crate::util::deadline::bounded;

const SOURCE: &str = "microfeed::search";
pub const DEFAULT_SEARCH_LIMIT: usize = 10;
pub const MAX_SEARCH_LIMIT: usize = 100;
pub const DEFAULT_TAG_LIMIT: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub id: PostId,
    pub author_id: UserId,
    pub text_preview: String,
    pub tags: Vec<String>,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResults {
    pub query: String,
    pub hits: Vec<SearchResult>,
    /// The index could not be queried; `hits` is empty rather than authoritative.
    pub degraded: bool,
}

/// Most used tags among posts created in a window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TagTrends {
    #[serde(with = "time::serde::rfc3339")]
    pub from: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub to: OffsetDateTime,
    pub tags: Vec<TagCount>,
    pub degraded: bool,
}

#[derive(Clone)]
pub struct SearchService {
    indexer: Arc<dyn SearchIndexer>,
    timeouts: CallTimeouts,
    preview_chars: usize,
}

impl SearchService {
    pub fn new(indexer: Arc<dyn SearchIndexer>, timeouts: CallTimeouts) -> Self {
        Self {
            indexer,
            timeouts,
            preview_chars: DEFAULT_PREVIEW_CHARS,
        }
    }

    pub fn with_preview_chars(mut self, preview_chars: usize) -> Self {
        self.preview_chars = preview_chars;
        self
    }

    pub async fn search(
        &self,
        query: &str,
        limit: Option<usize>,
    ) -> Result<SearchResults, DomainError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(DomainError::validation("q", "search query must not be empty"));
        }
        let limit = limit
            .unwrap_or(DEFAULT_SEARCH_LIMIT)
            .clamp(1, MAX_SEARCH_LIMIT);

        let outcome = bounded(
            self.timeouts.search,
            self.indexer.search(query, limit),
            SearchError::Timeout,
        )
        .await;

        match outcome {
            Ok(hits) => Ok(SearchResults {
                query: query.to_string(),
                hits: hits
                    .into_iter()
                    .take(limit)
                    .map(|hit| self.project(hit))
                    .collect(),
                degraded: false,
            }),
            Err(err) => {
                warn!(
                    target = SOURCE,
                    query,
                    error = %err,
                    "search index unavailable; returning no results"
                );
                Ok(SearchResults {
                    query: query.to_string(),
                    hits: Vec::new(),
                    degraded: true,
                })
            }
        }
    }

    /// Tag usage between `range.from` and `range.to`, both inclusive.
    pub async fn tag_trends(
        &self,
        range: TimeRange,
        limit: Option<usize>,
    ) -> Result<TagTrends, DomainError> {
        if range.from > range.to {
            return Err(DomainError::validation("from", "must not be later than `to`"));
        }
        let limit = limit.unwrap_or(DEFAULT_TAG_LIMIT).clamp(1, MAX_SEARCH_LIMIT);

        let outcome = bounded(
            self.timeouts.search,
            self.indexer.aggregate_tags(range, limit),
            SearchError::Timeout,
        )
        .await;

        let (tags, degraded) = match outcome {
            Ok(tags) => (tags, false),
            Err(err) => {
                warn!(
                    target = SOURCE,
                    error = %err,
                    "tag aggregation unavailable; returning no tags"
                );
                (Vec::new(), true)
            }
        };
        Ok(TagTrends {
            from: range.from,
            to: range.to,
            tags,
            degraded,
        })
    }

    fn project(&self, hit: SearchHit) -> SearchResult {
        SearchResult {
            id: hit.id,
            author_id: hit.author_id,
            text_preview: truncate_preview(&hit.text, self.preview_chars),
            tags: hit.tags,
            score: hit.score,
        }
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use time::macros::datetime;

    use super::*;
    use crate::application::repos::IndexDocument;
    use crate::infra::memory::MemorySearchIndex;

    struct DownIndexer;

    #[async_trait]
    impl SearchIndexer for DownIndexer {
        async fn index_document(&self, _: PostId, _: &IndexDocument) -> Result<(), SearchError> {
            Ok(())
        }
        async fn search(&self, _: &str, _: usize) -> Result<Vec<SearchHit>, SearchError> {
            Err(SearchError::Rejected {
                status: 503,
                message: "cluster red".into(),
            })
        }
        async fn aggregate_tags(
            &self,
            _: TimeRange,
            _: usize,
        ) -> Result<Vec<TagCount>, SearchError> {
            Err(SearchError::Unavailable("connection refused".into()))
        }
        async fn health_check(&self) -> Result<(), SearchError> {
            Ok(())
        }
    }

    async fn indexed(count: usize, text: &str) -> Arc<MemorySearchIndex> {
        let index = Arc::new(MemorySearchIndex::new());
        for _ in 0..count {
            index
                .index_document(
                    PostId::new(),
                    &IndexDocument {
                        text: text.to_string(),
                        tags: vec!["rust".into()],
                        author_id: UserId::from("alice"),
                        created_at: datetime!(2024-05-01 12:00 UTC),
                    },
                )
                .await
                .expect("index");
        }
        index
    }

    #[tokio::test]
    async fn blank_query_is_rejected() {
        let service = SearchService::new(indexed(0, "").await, CallTimeouts::default());
        let err = service.search("   ", None).await.expect_err("blank");
        assert!(matches!(err, DomainError::Validation { field: "q", .. }));
    }

    #[tokio::test]
    async fn limit_is_clamped() {
        let service = SearchService::new(indexed(5, "hello").await, CallTimeouts::default());

        let none = service.search("hello", Some(0)).await.expect("search");
        assert_eq!(none.hits.len(), 1);

        let all = service.search("hello", Some(500)).await.expect("search");
        assert_eq!(all.hits.len(), 5);
    }

    #[tokio::test]
    async fn hits_carry_a_truncated_preview() {
        let long = "word ".repeat(100);
        let service = SearchService::new(indexed(1, &long).await, CallTimeouts::default());

        let results = service.search("word", None).await.expect("search");
        assert_eq!(results.hits[0].text_preview.chars().count(), DEFAULT_PREVIEW_CHARS);
        assert_eq!(results.hits[0].tags, vec!["rust".to_string()]);
        assert!(!results.degraded);
    }

    #[tokio::test]
    async fn index_failure_degrades_to_no_results() {
        let service = SearchService::new(Arc::new(DownIndexer), CallTimeouts::default());

        let results = service.search("hello", None).await.expect("search");
        assert!(results.degraded);
        assert!(results.hits.is_empty());
        assert_eq!(results.query, "hello");
    }

    fn window(hours: i64) -> TimeRange {
        let from = datetime!(2024-05-01 00:00 UTC);
        TimeRange {
            from,
            to: from + time::Duration::hours(hours),
        }
    }

    #[tokio::test]
    async fn tag_trends_count_posts_in_the_window() {
        let service = SearchService::new(indexed(3, "hello").await, CallTimeouts::default());

        let trends = service.tag_trends(window(24), None).await.expect("trends");
        assert!(!trends.degraded);
        assert_eq!(
            trends.tags,
            vec![TagCount {
                tag: "rust".into(),
                count: 3
            }]
        );

        let before = service.tag_trends(window(1), None).await.expect("trends");
        assert!(before.tags.is_empty());
    }

    #[tokio::test]
    async fn inverted_window_is_rejected() {
        let service = SearchService::new(indexed(0, "").await, CallTimeouts::default());
        let err = service
            .tag_trends(window(-1), None)
            .await
            .expect_err("inverted");
        assert!(matches!(err, DomainError::Validation { field: "from", .. }));
    }

    #[tokio::test]
    async fn tag_aggregation_failure_degrades() {
        let service = SearchService::new(Arc::new(DownIndexer), CallTimeouts::default());
        let trends = service.tag_trends(window(24), Some(5)).await.expect("trends");
        assert!(trends.degraded);
        assert!(trends.tags.is_empty());
    }
}
