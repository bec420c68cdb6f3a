use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use async_trait::async_trait;

use crate::application::repos::{
    IndexDocument, SearchError, SearchHit, SearchIndexer, TagCount, TimeRange,
};
use crate::cache::lock::{rw_read, rw_write};
use crate::domain::types::PostId;

const SOURCE: &str = "infra::memory::search";
const TAG_WEIGHT: f64 = 2.0;

#[derive(Debug)]
struct Indexed {
    document: IndexDocument,
    words: HashSet<String>,
    tags: HashSet<String>,
}

#[derive(Debug, Default)]
struct Index {
    documents: HashMap<PostId, Indexed>,
    postings: HashMap<String, HashSet<PostId>>,
}

/// Term-matching index over post text and tags. Re-indexing an id replaces it.
#[derive(Debug, Default)]
pub struct MemorySearchIndex {
    index: RwLock<Index>,
}

impl MemorySearchIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        rw_read(&self.index, SOURCE, "len").documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub(crate) fn tokenize(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .map(str::to_lowercase)
        .collect()
}

#[async_trait]
impl SearchIndexer for MemorySearchIndex {
    async fn index_document(
        &self,
        id: PostId,
        document: &IndexDocument,
    ) -> Result<(), SearchError> {
        let words = tokenize(&document.text);
        let tags: HashSet<String> = document
            .tags
            .iter()
            .map(|tag| tag.trim().to_lowercase())
            .collect();

        let mut index = rw_write(&self.index, SOURCE, "index_document");
        if let Some(previous) = index.documents.remove(&id) {
            for term in previous.words.iter().chain(previous.tags.iter()) {
                if let Some(ids) = index.postings.get_mut(term) {
                    ids.remove(&id);
                }
            }
        }
        for term in words.iter().chain(tags.iter()) {
            index.postings.entry(term.clone()).or_default().insert(id);
        }
        index.documents.insert(
            id,
            Indexed {
                document: document.clone(),
                words,
                tags,
            },
        );
        Ok(())
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, SearchError> {
        let terms = tokenize(query);
        let index = rw_read(&self.index, SOURCE, "search");

        let mut scores: HashMap<PostId, f64> = HashMap::new();
        for term in &terms {
            let Some(ids) = index.postings.get(term) else {
                continue;
            };
            for id in ids {
                let Some(indexed) = index.documents.get(id) else {
                    continue;
                };
                let mut weight = 0.0;
                if indexed.tags.contains(term) {
                    weight += TAG_WEIGHT;
                }
                if indexed.words.contains(term) {
                    weight += 1.0;
                }
                *scores.entry(*id).or_default() += weight;
            }
        }

        let mut hits: Vec<(SearchHit, time::OffsetDateTime)> = scores
            .into_iter()
            .filter_map(|(id, score)| {
                index.documents.get(&id).map(|indexed| {
                    let hit = SearchHit {
                        id,
                        author_id: indexed.document.author_id.clone(),
                        text: indexed.document.text.clone(),
                        tags: indexed.document.tags.clone(),
                        score,
                    };
                    (hit, indexed.document.created_at)
                })
            })
            .collect();
        hits.sort_by(|(a, a_time), (b, b_time)| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| b_time.cmp(a_time))
        });

        Ok(hits.into_iter().take(limit).map(|(hit, _)| hit).collect())
    }

    async fn aggregate_tags(
        &self,
        range: TimeRange,
        limit: usize,
    ) -> Result<Vec<TagCount>, SearchError> {
        let index = rw_read(&self.index, SOURCE, "aggregate_tags");

        let mut counts: HashMap<&str, u64> = HashMap::new();
        for indexed in index.documents.values() {
            if !range.contains(indexed.document.created_at) {
                continue;
            }
            let distinct: HashSet<&str> = indexed.document.tags.iter().map(String::as_str).collect();
            for tag in distinct {
                *counts.entry(tag).or_default() += 1;
            }
        }

        let mut buckets: Vec<TagCount> = counts
            .into_iter()
            .map(|(tag, count)| TagCount {
                tag: tag.to_string(),
                count,
            })
            .collect();
        buckets.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.tag.cmp(&b.tag)));
        buckets.truncate(limit);
        Ok(buckets)
    }

    async fn health_check(&self) -> Result<(), SearchError> {
        Ok(())
    }
}
