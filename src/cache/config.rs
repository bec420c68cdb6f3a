//! Cache configuration.

use std::num::NonZeroUsize;
use std::time::Duration;

use crate::application::repos::DEFAULT_CACHE_TIMEOUT;

/// Maximum entries retained per viewer feed.
pub const DEFAULT_FEED_CAPACITY: usize = 100;
pub const DEFAULT_CAS_MAX_RETRIES: u32 = 16;
pub const DEFAULT_LIKE_TTL: Duration = Duration::from_secs(3600);
pub const DEFAULT_LIKE_CACHE_CAPACITY: usize = 10_000;

/// Feed list cache behaviour.
#[derive(Debug, Clone)]
pub struct FeedCacheConfig {
    /// Maximum entries kept in one viewer's list.
    pub capacity: usize,
    /// Compare-and-set attempts before an upsert reports contention.
    pub cas_max_retries: u32,
    /// Deadline applied to every backend round-trip.
    pub call_timeout: Duration,
}

impl Default for FeedCacheConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_FEED_CAPACITY,
            cas_max_retries: DEFAULT_CAS_MAX_RETRIES,
            call_timeout: DEFAULT_CACHE_TIMEOUT,
        }
    }
}

impl From<&crate::config::Settings> for FeedCacheConfig {
    fn from(settings: &crate::config::Settings) -> Self {
        Self {
            capacity: settings.feed.capacity.get(),
            cas_max_retries: settings.feed.cas_max_retries.get(),
            call_timeout: settings.timeouts.cache,
        }
    }
}

/// Like-count cache behaviour.
#[derive(Debug, Clone)]
pub struct LikesCacheConfig {
    pub ttl: Duration,
    pub capacity: usize,
}

impl Default for LikesCacheConfig {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_LIKE_TTL,
            capacity: DEFAULT_LIKE_CACHE_CAPACITY,
        }
    }
}

impl From<&crate::config::Settings> for LikesCacheConfig {
    fn from(settings: &crate::config::Settings) -> Self {
        Self {
            ttl: settings.likes.ttl,
            capacity: settings.likes.cache_capacity.get(),
        }
    }
}

impl LikesCacheConfig {
    /// Returns the capacity as NonZeroUsize, clamping to 1 if zero.
    pub fn capacity_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.capacity).unwrap_or(NonZeroUsize::MIN)
    }
}
