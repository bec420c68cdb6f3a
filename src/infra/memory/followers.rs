use std::collections::BTreeSet;

use async_trait::async_trait;
use dashmap::DashMap;

use crate::application::repos::{DirectoryError, FollowerDirectory};
use crate::domain::types::UserId;

/// Follower graph held in memory, keyed by the followed user.
#[derive(Debug, Default)]
pub struct MemoryFollowerDirectory {
    followers: DashMap<UserId, BTreeSet<UserId>>,
}

impl MemoryFollowerDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `follower` follows `followee`. Returns false if it already did.
    pub fn follow(&self, followee: &UserId, follower: &UserId) -> bool {
        self.followers
            .entry(followee.clone())
            .or_default()
            .insert(follower.clone())
    }

    pub fn unfollow(&self, followee: &UserId, follower: &UserId) -> bool {
        self.followers
            .get_mut(followee)
            .is_some_and(|mut set| set.remove(follower))
    }
}

#[async_trait]
impl FollowerDirectory for MemoryFollowerDirectory {
    async fn followers_of(&self, user: &UserId) -> Result<BTreeSet<UserId>, DirectoryError> {
        Ok(self
            .followers
            .get(user)
            .map(|set| set.value().clone())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn follow_and_unfollow() {
        let directory = MemoryFollowerDirectory::new();
        let alice = UserId::from("alice");
        let bob = UserId::from("bob");

        assert!(directory.follow(&alice, &bob));
        assert!(!directory.follow(&alice, &bob));
        assert_eq!(
            directory.followers_of(&alice).await.expect("followers"),
            BTreeSet::from([bob.clone()])
        );

        assert!(directory.unfollow(&alice, &bob));
        assert!(!directory.unfollow(&alice, &bob));
        assert!(directory.followers_of(&alice).await.expect("followers").is_empty());
    }

    #[tokio::test]
    async fn unknown_user_has_no_followers() {
        let directory = MemoryFollowerDirectory::new();
        let followers = directory
            .followers_of(&UserId::from("nobody"))
            .await
            .expect("followers");
        assert!(followers.is_empty());
    }
}
