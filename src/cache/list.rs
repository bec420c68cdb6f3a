//! The bounded, newest-first list of feed entries kept per viewer.

use serde::{Deserialize, Serialize};

use crate::domain::entities::FeedEntry;
use crate::domain::types::PostId;

/// Result of applying one entry to a [`FeedList`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// The entry now sits at `position`; `evicted` older entries fell off the tail.
    Inserted { position: usize, evicted: usize },
    /// The entry was older than every retained entry of a full list.
    Discarded,
}

/// Ordered by `created_at` descending. Among equal timestamps the most
/// recently applied entry comes first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeedList {
    entries: Vec<FeedEntry>,
}

impl FeedList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a list from arbitrary entries, restoring order and capacity.
    pub fn from_entries(mut entries: Vec<FeedEntry>, capacity: usize) -> Self {
        // Stable sort keeps the incoming relative order of equal timestamps.
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let mut seen = std::collections::HashSet::new();
        entries.retain(|entry| seen.insert(entry.post_id));
        entries.truncate(capacity);
        Self { entries }
    }

    pub fn insert(&mut self, entry: FeedEntry, capacity: usize) -> InsertOutcome {
        let existing = self.position_of(entry.post_id);
        let position = self
            .entries
            .iter()
            .enumerate()
            .find(|(index, current)| {
                Some(*index) != existing && current.created_at <= entry.created_at
            })
            .map(|(index, _)| index)
            .unwrap_or(self.entries.len());

        // Index once the previous copy of the same post is gone.
        let position = match existing {
            Some(old) if old < position => position - 1,
            _ => position,
        };

        if existing.is_none() && position >= capacity {
            self.entries.truncate(capacity);
            return InsertOutcome::Discarded;
        }

        if let Some(old) = existing {
            self.entries.remove(old);
        }
        self.entries.insert(position, entry);

        let evicted = self.entries.len().saturating_sub(capacity);
        self.entries.truncate(capacity);

        if position >= capacity {
            return InsertOutcome::Discarded;
        }
        InsertOutcome::Inserted { position, evicted }
    }

    pub fn position_of(&self, post_id: PostId) -> Option<usize> {
        self.entries.iter().position(|entry| entry.post_id == post_id)
    }

    pub fn entries(&self) -> &[FeedEntry] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<FeedEntry> {
        self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_sorted_newest_first(&self) -> bool {
        self.entries
            .windows(2)
            .all(|pair| pair[0].created_at >= pair[1].created_at)
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn decode(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}
