use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::RwLock;

use async_trait::async_trait;
use time::OffsetDateTime;

use crate::application::repos::{PostCursor, PostStore, RepoError, StoreStats};
use crate::cache::lock::{rw_read, rw_write};
use crate::domain::entities::{NewPost, Post};
use crate::domain::types::{PostId, UserId};

const SOURCE: &str = "infra::memory::posts";

#[derive(Debug)]
struct StoredPost {
    post: Post,
    likers: HashSet<UserId>,
}

impl StoredPost {
    fn snapshot(&self) -> Post {
        Post {
            like_count: self.likers.len() as u64,
            ..self.post.clone()
        }
    }
}

#[derive(Debug, Default)]
struct State {
    posts: HashMap<PostId, StoredPost>,
    by_time: BTreeSet<(OffsetDateTime, PostId)>,
}

/// Post store kept entirely in memory. Each operation is atomic per post.
#[derive(Debug, Default)]
pub struct MemoryPostStore {
    state: RwLock<State>,
}

impl MemoryPostStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        rw_read(&self.state, SOURCE, "len").posts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl PostStore for MemoryPostStore {
    async fn insert(&self, post: NewPost) -> Result<Post, RepoError> {
        let id = PostId::new();
        let post = Post {
            id,
            author_id: post.author_id,
            text: post.text,
            tags: post.tags,
            created_at: post.created_at,
            like_count: 0,
        };

        let mut state = rw_write(&self.state, SOURCE, "insert");
        state.by_time.insert((post.created_at, id));
        state.posts.insert(
            id,
            StoredPost {
                post: post.clone(),
                likers: HashSet::new(),
            },
        );
        Ok(post)
    }

    async fn find_by_id(&self, id: PostId) -> Result<Option<Post>, RepoError> {
        let state = rw_read(&self.state, SOURCE, "find_by_id");
        Ok(state.posts.get(&id).map(StoredPost::snapshot))
    }

    async fn find_recent(
        &self,
        limit: usize,
        before: Option<PostCursor>,
    ) -> Result<Vec<Post>, RepoError> {
        let state = rw_read(&self.state, SOURCE, "find_recent");
        let keys: Box<dyn Iterator<Item = &(OffsetDateTime, PostId)>> = match before {
            Some(cursor) => Box::new(state.by_time.range(..(cursor.created_at, cursor.id)).rev()),
            None => Box::new(state.by_time.iter().rev()),
        };
        Ok(keys
            .filter_map(|(_, id)| state.posts.get(id))
            .take(limit)
            .map(StoredPost::snapshot)
            .collect())
    }

    async fn find_by_author(
        &self,
        author: &UserId,
        limit: usize,
    ) -> Result<Vec<Post>, RepoError> {
        let state = rw_read(&self.state, SOURCE, "find_by_author");
        Ok(state
            .by_time
            .iter()
            .rev()
            .filter_map(|(_, id)| state.posts.get(id))
            .filter(|stored| &stored.post.author_id == author)
            .take(limit)
            .map(StoredPost::snapshot)
            .collect())
    }

    async fn add_like(&self, id: PostId, user: &UserId) -> Result<u64, RepoError> {
        let mut state = rw_write(&self.state, SOURCE, "add_like");
        let stored = state.posts.get_mut(&id).ok_or(RepoError::NotFound)?;
        stored.likers.insert(user.clone());
        Ok(stored.likers.len() as u64)
    }

    async fn stats(&self) -> Result<StoreStats, RepoError> {
        let state = rw_read(&self.state, SOURCE, "stats");
        let authors: HashSet<&UserId> = state
            .posts
            .values()
            .map(|stored| &stored.post.author_id)
            .collect();
        Ok(StoreStats {
            posts: state.posts.len() as u64,
            authors: authors.len() as u64,
        })
    }

    async fn health_check(&self) -> Result<(), RepoError> {
        Ok(())
    }
}
