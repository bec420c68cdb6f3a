use async_trait::async_trait;
use sqlx::{FromRow, QueryBuilder};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::application::repos::{PostCursor, PostStore, RepoError, StoreStats};
use crate::domain::entities::{NewPost, Post};
use crate::domain::types::{PostId, UserId};

use super::{PostgresPostStore, map_sqlx_error};

const SELECT_POSTS: &str = "SELECT p.id, p.author_id, p.text, p.tags, p.created_at, \
     (SELECT COUNT(*) FROM post_likes l WHERE l.post_id = p.id) AS like_count \
     FROM posts p WHERE 1=1 ";

#[derive(Debug, FromRow)]
struct PostRow {
    id: Uuid,
    author_id: String,
    text: String,
    tags: Vec<String>,
    created_at: OffsetDateTime,
    like_count: i64,
}

impl TryFrom<PostRow> for Post {
    type Error = RepoError;

    fn try_from(row: PostRow) -> Result<Self, Self::Error> {
        Ok(Post {
            id: PostId::from_uuid(row.id),
            author_id: UserId::new(row.author_id),
            text: row.text,
            tags: row.tags,
            created_at: row.created_at,
            like_count: PostgresPostStore::convert_count(row.like_count)?,
        })
    }
}

fn into_posts(rows: Vec<PostRow>) -> Result<Vec<Post>, RepoError> {
    rows.into_iter().map(Post::try_from).collect()
}

/// `TIMESTAMPTZ` keeps microseconds; anything finer would be rounded on write.
fn to_stored_precision(instant: OffsetDateTime) -> OffsetDateTime {
    let micros = instant.nanosecond() / 1_000 * 1_000;
    instant.replace_nanosecond(micros).unwrap_or(instant)
}

fn sql_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

#[async_trait]
impl PostStore for PostgresPostStore {
    async fn insert(&self, post: NewPost) -> Result<Post, RepoError> {
        let id = PostId::new();
        let created_at: OffsetDateTime = sqlx::query_scalar(
            "INSERT INTO posts (id, author_id, text, tags, created_at) VALUES ($1, $2, $3, $4, $5) \
             RETURNING created_at",
        )
        .bind(id.as_uuid())
        .bind(post.author_id.as_str())
        .bind(&post.text)
        .bind(&post.tags)
        .bind(to_stored_precision(post.created_at))
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(Post {
            id,
            author_id: post.author_id,
            text: post.text,
            tags: post.tags,
            created_at,
            like_count: 0,
        })
    }

    async fn find_by_id(&self, id: PostId) -> Result<Option<Post>, RepoError> {
        let mut qb = QueryBuilder::new(SELECT_POSTS);
        qb.push(" AND p.id = ");
        qb.push_bind(id.as_uuid());

        qb.build_query_as::<PostRow>()
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?
            .map(Post::try_from)
            .transpose()
    }

    async fn find_recent(
        &self,
        limit: usize,
        before: Option<PostCursor>,
    ) -> Result<Vec<Post>, RepoError> {
        let mut qb = QueryBuilder::new(SELECT_POSTS);
        if let Some(cursor) = before {
            qb.push(" AND (p.created_at, p.id) < (");
            qb.push_bind(cursor.created_at);
            qb.push(", ");
            qb.push_bind(cursor.id.as_uuid());
            qb.push(")");
        }
        qb.push(" ORDER BY p.created_at DESC, p.id DESC LIMIT ");
        qb.push_bind(sql_limit(limit));

        let rows = qb
            .build_query_as::<PostRow>()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        into_posts(rows)
    }

    async fn find_by_author(
        &self,
        author: &UserId,
        limit: usize,
    ) -> Result<Vec<Post>, RepoError> {
        let mut qb = QueryBuilder::new(SELECT_POSTS);
        qb.push(" AND p.author_id = ");
        qb.push_bind(author.as_str());
        qb.push(" ORDER BY p.created_at DESC, p.id DESC LIMIT ");
        qb.push_bind(sql_limit(limit));

        let rows = qb
            .build_query_as::<PostRow>()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        into_posts(rows)
    }

    async fn add_like(&self, id: PostId, user: &UserId) -> Result<u64, RepoError> {
        let mut tx = self.begin().await.map_err(map_sqlx_error)?;

        let exists = sqlx::query("SELECT 1 FROM posts WHERE id = $1 FOR SHARE")
            .bind(id.as_uuid())
            .fetch_optional(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;
        if exists.is_none() {
            return Err(RepoError::NotFound);
        }

        sqlx::query(
            "INSERT INTO post_likes (post_id, user_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(id.as_uuid())
        .bind(user.as_str())
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM post_likes WHERE post_id = $1")
            .bind(id.as_uuid())
            .fetch_one(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

        tx.commit().await.map_err(map_sqlx_error)?;
        Self::convert_count(count)
    }

    async fn stats(&self) -> Result<StoreStats, RepoError> {
        let (posts, authors): (i64, i64) =
            sqlx::query_as("SELECT COUNT(*), COUNT(DISTINCT author_id) FROM posts")
                .fetch_one(self.pool())
                .await
                .map_err(map_sqlx_error)?;
        Ok(StoreStats {
            posts: Self::convert_count(posts)?,
            authors: Self::convert_count(authors)?,
        })
    }

    async fn health_check(&self) -> Result<(), RepoError> {
        self.ping().await.map_err(map_sqlx_error)
    }
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::to_stored_precision;

    #[test]
    fn timestamps_are_truncated_to_microseconds() {
        let precise = datetime!(2024-05-01 12:00:00.123_456_789 UTC);
        assert_eq!(
            to_stored_precision(precise),
            datetime!(2024-05-01 12:00:00.123_456 UTC)
        );

        let whole = datetime!(2024-05-01 12:00 UTC);
        assert_eq!(to_stored_precision(whole), whole);
    }
}
