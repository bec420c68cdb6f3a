//! Feed lists shared by every process pointed at the same database.
//!
//! Versions are drawn from one sequence, so a removed and recreated row never
//! repeats a version a stale writer might still hold.

use async_trait::async_trait;
use sqlx::postgres::PgPool;

use crate::cache::{CacheError, CasOutcome, FeedListBackend, Versioned};

#[derive(Clone)]
pub struct PostgresFeedBackend {
    pool: PgPool,
}

impl PostgresFeedBackend {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn unavailable(err: sqlx::Error) -> CacheError {
    CacheError::unavailable(err.to_string())
}

fn stored_version(key: &str, version: i64) -> Result<u64, CacheError> {
    u64::try_from(version).map_err(|_| CacheError::Encoding {
        key: key.to_string(),
        message: format!("negative version {version}"),
    })
}

#[async_trait]
impl FeedListBackend for PostgresFeedBackend {
    async fn load(&self, key: &str) -> Result<Option<Versioned>, CacheError> {
        let row: Option<(String, i64)> =
            sqlx::query_as("SELECT value, version FROM feed_lists WHERE user_id = $1")
                .bind(key)
                .fetch_optional(&self.pool)
                .await
                .map_err(unavailable)?;

        row.map(|(value, version)| {
            Ok(Versioned {
                value,
                version: stored_version(key, version)?,
            })
        })
        .transpose()
    }

    async fn compare_and_set(
        &self,
        key: &str,
        expected: Option<u64>,
        value: String,
    ) -> Result<CasOutcome, CacheError> {
        let written: Option<i64> = match expected {
            None => {
                sqlx::query_scalar(
                    "INSERT INTO feed_lists (user_id, value, version) \
                     VALUES ($1, $2, nextval('feed_list_versions')) \
                     ON CONFLICT (user_id) DO NOTHING \
                     RETURNING version",
                )
                .bind(key)
                .bind(value)
                .fetch_optional(&self.pool)
                .await
                .map_err(unavailable)?
            }
            Some(version) => {
                // No stored version exceeds i64::MAX, so such a caller is already stale.
                let Ok(version) = i64::try_from(version) else {
                    return Ok(CasOutcome::Conflict);
                };
                sqlx::query_scalar(
                    "UPDATE feed_lists \
                     SET value = $2, version = nextval('feed_list_versions'), updated_at = now() \
                     WHERE user_id = $1 AND version = $3 \
                     RETURNING version",
                )
                .bind(key)
                .bind(value)
                .bind(version)
                .fetch_optional(&self.pool)
                .await
                .map_err(unavailable)?
            }
        };

        match written {
            Some(version) => Ok(CasOutcome::Applied {
                version: stored_version(key, version)?,
            }),
            None => Ok(CasOutcome::Conflict),
        }
    }

    async fn remove(&self, key: &str) -> Result<bool, CacheError> {
        let result = sqlx::query("DELETE FROM feed_lists WHERE user_id = $1")
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(unavailable)?;
        Ok(result.rows_affected() > 0)
    }

    async fn ping(&self) -> Result<(), CacheError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(unavailable)
    }
}
