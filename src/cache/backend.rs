//! Key/value backends holding serialized feed lists.
//!
//! A backend stores one opaque string per key together with a version that
//! changes on every successful write. The version is what makes
//! read-modify-write safe: writers present the version they read and the
//! backend refuses the write if anyone else got there first.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::{DashMap, mapref::entry::Entry};

use super::error::CacheError;

/// A stored value and the version it was written at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Versioned {
    pub value: String,
    pub version: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CasOutcome {
    Applied { version: u64 },
    Conflict,
}

#[async_trait]
pub trait FeedListBackend: Send + Sync {
    async fn load(&self, key: &str) -> Result<Option<Versioned>, CacheError>;

    /// Write `value` only if the key is still at `expected` (`None` = absent).
    async fn compare_and_set(
        &self,
        key: &str,
        expected: Option<u64>,
        value: String,
    ) -> Result<CasOutcome, CacheError>;

    /// Remove the key, returning whether it existed.
    async fn remove(&self, key: &str) -> Result<bool, CacheError>;

    async fn ping(&self) -> Result<(), CacheError>;
}

/// Process-local backend. Versions come from one counter shared by all keys
/// so a removed and recreated key never repeats a version.
#[derive(Debug, Default)]
pub struct MemoryFeedBackend {
    entries: DashMap<String, Versioned>,
    next_version: AtomicU64,
}

impl MemoryFeedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn bump(&self) -> u64 {
        self.next_version.fetch_add(1, Ordering::Relaxed) + 1
    }
}

#[async_trait]
impl FeedListBackend for MemoryFeedBackend {
    async fn load(&self, key: &str) -> Result<Option<Versioned>, CacheError> {
        Ok(self.entries.get(key).map(|entry| entry.value().clone()))
    }

    async fn compare_and_set(
        &self,
        key: &str,
        expected: Option<u64>,
        value: String,
    ) -> Result<CasOutcome, CacheError> {
        // The entry guard holds the shard lock, so check and write are atomic.
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if expected != Some(occupied.get().version) {
                    return Ok(CasOutcome::Conflict);
                }
                let version = self.bump();
                occupied.insert(Versioned { value, version });
                Ok(CasOutcome::Applied { version })
            }
            Entry::Vacant(vacant) => {
                if expected.is_some() {
                    return Ok(CasOutcome::Conflict);
                }
                let version = self.bump();
                vacant.insert(Versioned { value, version });
                Ok(CasOutcome::Applied { version })
            }
        }
    }

    async fn remove(&self, key: &str) -> Result<bool, CacheError> {
        Ok(self.entries.remove(key).is_some())
    }

    async fn ping(&self) -> Result<(), CacheError> {
        Ok(())
    }
}
