//! Direct post lookups that bypass the feed cache.

use std::sync::Arc;

use crate::application::repos::{CallTimeouts, PostStore, RepoError, StoreStats};
use crate::domain::entities::Post;
use crate::domain::types::{PostId, UserId};
use crate::util::deadline::bounded;

pub const DEFAULT_AUTHOR_LIMIT: usize = 50;
const MAX_AUTHOR_LIMIT: usize = 200;

#[derive(Clone)]
pub struct PostQueries {
    posts: Arc<dyn PostStore>,
    timeouts: CallTimeouts,
}

impl PostQueries {
    pub fn new(posts: Arc<dyn PostStore>, timeouts: CallTimeouts) -> Self {
        Self { posts, timeouts }
    }

    /// The post with its authoritative like count, `None` if absent.
    pub async fn get_post(&self, id: PostId) -> Result<Option<Post>, RepoError> {
        bounded(
            self.timeouts.post_store,
            self.posts.find_by_id(id),
            RepoError::Timeout,
        )
        .await
    }

    /// `author`'s posts, newest first.
    pub async fn posts_by_author(
        &self,
        author: &UserId,
        limit: Option<usize>,
    ) -> Result<Vec<Post>, RepoError> {
        let limit = limit
            .unwrap_or(DEFAULT_AUTHOR_LIMIT)
            .clamp(1, MAX_AUTHOR_LIMIT);
        bounded(
            self.timeouts.post_store,
            self.posts.find_by_author(author, limit),
            RepoError::Timeout,
        )
        .await
    }

    pub async fn stats(&self) -> Result<StoreStats, RepoError> {
        bounded(
            self.timeouts.post_store,
            self.posts.stats(),
            RepoError::Timeout,
        )
        .await
    }

    pub async fn health_check(&self) -> Result<(), RepoError> {
        bounded(
            self.timeouts.post_store,
            self.posts.health_check(),
            RepoError::Timeout,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use time::{Duration, macros::datetime};

    use super::*;
    use crate::domain::entities::NewPost;
    use crate::infra::memory::MemoryPostStore;

    #[tokio::test]
    async fn author_listing_is_newest_first_and_scoped() {
        let store = Arc::new(MemoryPostStore::new());
        let base = datetime!(2024-05-01 12:00 UTC);
        for (i, author) in ["alice", "bob", "alice"].into_iter().enumerate() {
            store
                .insert(NewPost {
                    author_id: UserId::from(author),
                    text: format!("#{i}"),
                    tags: Vec::new(),
                    created_at: base + Duration::seconds(i as i64),
                })
                .await
                .expect("insert");
        }
        let queries = PostQueries::new(store, CallTimeouts::default());

        let posts = queries
            .posts_by_author(&UserId::from("alice"), None)
            .await
            .expect("posts");
        let texts: Vec<_> = posts.iter().map(|post| post.text.as_str()).collect();
        assert_eq!(texts, ["#2", "#0"]);
    }

    #[tokio::test]
    async fn missing_post_is_none() {
        let queries = PostQueries::new(Arc::new(MemoryPostStore::new()), CallTimeouts::default());
        assert!(queries.get_post(PostId::new()).await.expect("get").is_none());
    }
}
