//! Feed and like-count caches.
//!
//! - **Feed lists**: one bounded, newest-first list of [`FeedEntry`] per viewer,
//!   serialized as JSON and stored under the viewer's id. All mutation goes
//!   through [`FeedCacheStore`], which performs optimistic read-modify-write
//!   against a versioned [`FeedListBackend`].
//! - **Like counts**: a post id → count map whose entries expire; an expired
//!   entry means "reload from the post store", never "zero likes".
//!
//! [`FeedEntry`]: crate::domain::entities::FeedEntry

mod backend;
mod config;
mod error;
mod likes;
mod list;
pub(crate) mod lock;
mod store;

pub use backend::{CasOutcome, FeedListBackend, MemoryFeedBackend, Versioned};
pub use config::{
    DEFAULT_CAS_MAX_RETRIES, DEFAULT_FEED_CAPACITY, DEFAULT_LIKE_CACHE_CAPACITY, DEFAULT_LIKE_TTL,
    FeedCacheConfig, LikesCacheConfig,
};
pub use error::CacheError;
pub use likes::{LikeCountCache, MemoryLikeCountCache};
pub use list::{FeedList, InsertOutcome};
pub use store::FeedCacheStore;
