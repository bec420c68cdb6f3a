//! Elasticsearch-backed search index.

use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use serde_json::{Value, json};

use time::format_description::well_known::Rfc3339;

use crate::application::repos::{
    IndexDocument, SearchError, SearchHit, SearchIndexer, TagCount, TimeRange,
};
use crate::domain::types::{PostId, UserId};

use super::error::InfraError;

#[derive(Clone)]
pub struct ElasticsearchIndexer {
    base_url: String,
    index: String,
    http: reqwest::Client,
}

impl ElasticsearchIndexer {
    pub fn new(base_url: &str, index: &str) -> Result<Self, InfraError> {
        let trimmed = base_url.trim();
        if trimmed.is_empty() {
            return Err(InfraError::search("elasticsearch url is empty"));
        }
        let http = reqwest::Client::builder()
            .build()
            .map_err(|err| InfraError::search(format!("http client: {err}")))?;
        Ok(Self {
            base_url: trimmed.trim_end_matches('/').to_string(),
            index: index.to_string(),
            http,
        })
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        self.http.request(method, url)
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    hits: HitsEnvelope,
}

#[derive(Debug, Deserialize)]
struct HitsEnvelope {
    #[serde(default)]
    hits: Vec<RawHit>,
}

#[derive(Debug, Deserialize)]
struct RawHit {
    #[serde(rename = "_id")]
    id: String,
    #[serde(rename = "_score", default)]
    score: Option<f64>,
    #[serde(rename = "_source")]
    source: HitSource,
}

#[derive(Debug, Deserialize)]
struct HitSource {
    text: String,
    #[serde(default)]
    tags: Vec<String>,
    author_id: String,
}

fn query_body(query: &str, limit: usize) -> Value {
    json!({
        "size": limit,
        "query": {
            "multi_match": {
                "query": query,
                "fields": ["text", "tags^2"]
            }
        },
        "sort": ["_score", { "created_at": "desc" }]
    })
}

#[derive(Debug, Deserialize)]
struct AggregationResponse {
    aggregations: Aggregations,
}

#[derive(Debug, Deserialize)]
struct Aggregations {
    tags: TermsAggregation,
}

#[derive(Debug, Deserialize)]
struct TermsAggregation {
    #[serde(default)]
    buckets: Vec<TermsBucket>,
}

#[derive(Debug, Deserialize)]
struct TermsBucket {
    key: String,
    doc_count: u64,
}

fn tag_aggregation_body(range: TimeRange, limit: usize) -> Result<Value, SearchError> {
    let bound = |instant: time::OffsetDateTime| {
        instant
            .format(&Rfc3339)
            .map_err(|err| SearchError::Unavailable(format!("range bound: {err}")))
    };
    Ok(json!({
        "size": 0,
        "query": {
            "range": {
                "created_at": { "gte": bound(range.from)?, "lte": bound(range.to)? }
            }
        },
        "aggs": {
            "tags": { "terms": { "field": "tags.keyword", "size": limit } }
        }
    }))
}

fn into_tag_counts(response: AggregationResponse) -> Vec<TagCount> {
    response
        .aggregations
        .tags
        .buckets
        .into_iter()
        .map(|bucket| TagCount {
            tag: bucket.key,
            count: bucket.doc_count,
        })
        .collect()
}

/// Hits whose `_id` is not a post id were not written by this service; skip them.
fn into_hits(response: SearchResponse) -> Vec<SearchHit> {
    response
        .hits
        .hits
        .into_iter()
        .filter_map(|hit| {
            let id = hit.id.parse::<PostId>().ok()?;
            Some(SearchHit {
                id,
                author_id: UserId::new(hit.source.author_id),
                text: hit.source.text,
                tags: hit.source.tags,
                score: hit.score.unwrap_or_default(),
            })
        })
        .collect()
}

async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, SearchError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response.text().await.unwrap_or_default();
    Err(SearchError::Rejected {
        status: status.as_u16(),
        message,
    })
}

fn transport(err: reqwest::Error) -> SearchError {
    SearchError::Unavailable(err.to_string())
}

#[async_trait]
impl SearchIndexer for ElasticsearchIndexer {
    async fn index_document(
        &self,
        id: PostId,
        document: &IndexDocument,
    ) -> Result<(), SearchError> {
        let response = self
            .request(Method::PUT, &format!("/{}/_doc/{id}", self.index))
            .json(document)
            .send()
            .await
            .map_err(transport)?;
        ensure_success(response).await.map(|_| ())
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, SearchError> {
        let response = self
            .request(Method::POST, &format!("/{}/_search", self.index))
            .json(&query_body(query, limit))
            .send()
            .await
            .map_err(transport)?;

        // A missing index just means nothing has been published yet.
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }

        let parsed: SearchResponse = ensure_success(response)
            .await?
            .json()
            .await
            .map_err(transport)?;
        Ok(into_hits(parsed))
    }

    async fn aggregate_tags(
        &self,
        range: TimeRange,
        limit: usize,
    ) -> Result<Vec<TagCount>, SearchError> {
        let response = self
            .request(Method::POST, &format!("/{}/_search", self.index))
            .json(&tag_aggregation_body(range, limit)?)
            .send()
            .await
            .map_err(transport)?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }

        let parsed: AggregationResponse = ensure_success(response)
            .await?
            .json()
            .await
            .map_err(transport)?;
        Ok(into_tag_counts(parsed))
    }

    async fn health_check(&self) -> Result<(), SearchError> {
        let response = self
            .request(Method::GET, "/_cluster/health")
            .send()
            .await
            .map_err(transport)?;
        ensure_success(response).await.map(|_| ())
    }
}
