//! The per-viewer feed cache.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use metrics::counter;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::domain::entities::FeedEntry;
use crate::domain::types::UserId;
use crate::util::deadline::bounded;

use super::backend::{CasOutcome, FeedListBackend};
use super::config::FeedCacheConfig;
use super::error::CacheError;
use super::list::{FeedList, InsertOutcome};

const SOURCE: &str = "cache::store";
const CAS_BACKOFF_BASE_MS: u64 = 2;
const CAS_BACKOFF_CAP_MS: u64 = 100;

type WriterGates = DashMap<String, Arc<Mutex<()>>>;

/// Owns every viewer's [`FeedList`]. No other component writes to the backend.
///
/// Writers for the same viewer inside this process take turns on a per-key
/// async mutex, so the backend's compare-and-set only has to settle races
/// with other processes sharing the backend. A conflicting write retries
/// after a jittered, exponentially growing pause. Different viewers never
/// contend.
#[derive(Clone)]
pub struct FeedCacheStore {
    backend: Arc<dyn FeedListBackend>,
    config: FeedCacheConfig,
    writers: Arc<WriterGates>,
}

/// Holds a viewer's writer gate and drops it from the map once nobody else
/// is queued on it.
struct WriterTurn<'a> {
    writers: &'a WriterGates,
    key: &'a str,
    gate: Arc<Mutex<()>>,
}

impl<'a> WriterTurn<'a> {
    fn new(writers: &'a WriterGates, key: &'a str) -> Self {
        let gate = writers.entry(key.to_string()).or_default().value().clone();
        Self { writers, key, gate }
    }
}

impl Drop for WriterTurn<'_> {
    fn drop(&mut self) {
        // The map holds one reference and this turn another; any more are queued writers.
        self.writers.remove_if(self.key, |_, held| {
            Arc::ptr_eq(held, &self.gate) && Arc::strong_count(held) <= 2
        });
    }
}

impl FeedCacheStore {
    pub fn new(backend: Arc<dyn FeedListBackend>, config: FeedCacheConfig) -> Self {
        Self {
            backend,
            config,
            writers: Arc::new(DashMap::new()),
        }
    }

    pub fn config(&self) -> &FeedCacheConfig {
        &self.config
    }

    /// Place `entry` in `user_id`'s list, trim to capacity, and write the list back atomically.
    pub async fn upsert(&self, user_id: &UserId, entry: FeedEntry) -> Result<(), CacheError> {
        let key = user_id.as_str();
        let turn = WriterTurn::new(&self.writers, key);
        let _held = turn.gate.lock().await;

        let attempts = self.config.cas_max_retries.max(1);
        for attempt in 1..=attempts {
            if self.try_upsert(user_id, &entry).await? {
                return Ok(());
            }
            counter!("microfeed_feed_cache_cas_retry_total").increment(1);
            debug!(
                target = SOURCE,
                user_id = %user_id,
                attempt,
                "concurrent feed write detected; retrying"
            );
            if attempt < attempts {
                tokio::time::sleep(backoff_delay(attempt)).await;
            }
        }

        Err(CacheError::Contention {
            key: key.to_string(),
            attempts,
        })
    }

    /// One read-modify-write cycle. `Ok(false)` means another writer got there
    /// first; a discarded entry is settled since there is nothing to write.
    async fn try_upsert(&self, user_id: &UserId, entry: &FeedEntry) -> Result<bool, CacheError> {
        let key = user_id.as_str();
        let current = self.call(self.backend.load(key)).await?;
        let (mut list, expected) = match current {
            Some(stored) => (self.decode_or_reset(key, &stored.value), Some(stored.version)),
            None => (FeedList::new(), None),
        };

        if let InsertOutcome::Discarded = list.insert(entry.clone(), self.config.capacity) {
            debug!(
                target = SOURCE,
                user_id = %user_id,
                post_id = %entry.post_id,
                "entry older than a full feed; nothing to write"
            );
            return Ok(true);
        }

        let encoded = list.encode().map_err(|err| CacheError::Encoding {
            key: key.to_string(),
            message: err.to_string(),
        })?;

        let outcome = self
            .call(self.backend.compare_and_set(key, expected, encoded))
            .await?;
        Ok(matches!(outcome, CasOutcome::Applied { .. }))
    }

    /// `Ok(None)` means the cache holds no record for this viewer (cold), which
    /// is different from an empty feed.
    pub async fn get(&self, user_id: &UserId) -> Result<Option<FeedList>, CacheError> {
        let key = user_id.as_str();
        let Some(stored) = self.call(self.backend.load(key)).await? else {
            return Ok(None);
        };

        match FeedList::decode(&stored.value) {
            Ok(list) => Ok(Some(list)),
            Err(err) => {
                warn!(
                    target = SOURCE,
                    user_id = %user_id,
                    error = %err,
                    "cached feed is unreadable; treating as cold"
                );
                Ok(None)
            }
        }
    }

    /// Administrative reset of one viewer's list.
    pub async fn delete_all(&self, user_id: &UserId) -> Result<bool, CacheError> {
        self.call(self.backend.remove(user_id.as_str())).await
    }

    pub async fn ping(&self) -> Result<(), CacheError> {
        self.call(self.backend.ping()).await
    }

    async fn call<T>(
        &self,
        future: impl std::future::Future<Output = Result<T, CacheError>>,
    ) -> Result<T, CacheError> {
        bounded(self.config.call_timeout, future, CacheError::Timeout).await
    }

    fn decode_or_reset(&self, key: &str, raw: &str) -> FeedList {
        match FeedList::decode(raw) {
            Ok(list) => FeedList::from_entries(list.into_entries(), self.config.capacity),
            Err(err) => {
                warn!(
                    target = SOURCE,
                    key,
                    error = %err,
                    "replacing unreadable cached feed"
                );
                FeedList::new()
            }
        }
    }
}

/// Pause before retry `attempt` (1-based): doubling from the base step up to
/// the cap, plus up to half of that again as jitter.
fn backoff_delay(attempt: u32) -> Duration {
    let shift = attempt.saturating_sub(1).min(16);
    let step = CAS_BACKOFF_BASE_MS
        .saturating_mul(1 << shift)
        .min(CAS_BACKOFF_CAP_MS);
    let jitter = rand::random::<u64>() % (step / 2 + 1);
    Duration::from_millis(step + jitter)
}
