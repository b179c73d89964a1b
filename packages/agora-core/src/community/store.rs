//! # Community Store
//!
//! Owns the authoritative community set. Reads hand out shared snapshots;
//! writes replace the stored snapshot wholesale and assign the next version.
//!
//! Only a community's mailbox writes to its entry, so [`CommunityStore::commit`]
//! sees its expected version unless something bypassed the processor.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use super::types::{Community, CommunityId, CommunitySnapshot};
use crate::error::{Error, Result};

/// In-memory community store.
#[derive(Clone, Default)]
pub struct CommunityStore {
    communities: Arc<RwLock<HashMap<CommunityId, CommunitySnapshot>>>,
}

impl CommunityStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a newly created community. Fails if the ID is taken.
    pub fn insert(&self, community: Community) -> Result<CommunitySnapshot> {
        let mut communities = self.communities.write();
        if communities.contains_key(&community.id) {
            return Err(Error::Internal(format!(
                "community {} already exists",
                community.id
            )));
        }
        let snapshot = Arc::new(community);
        communities.insert(snapshot.id.clone(), snapshot.clone());
        Ok(snapshot)
    }

    /// Current snapshot for `id`.
    pub fn get(&self, id: &str) -> Option<CommunitySnapshot> {
        self.communities.read().get(id).cloned()
    }

    /// Replace the stored community with `next`, assigning the next version.
    ///
    /// `expected_version` is the version `next` was derived from; a mismatch
    /// means a lost update and nothing is written.
    pub fn commit(
        &self,
        mut next: Community,
        expected_version: u64,
        now: i64,
    ) -> Result<CommunitySnapshot> {
        let mut communities = self.communities.write();
        let current = communities.get(&next.id).ok_or(Error::CommunityNotFound)?;
        if current.version != expected_version {
            return Err(Error::Internal(format!(
                "version conflict on community {}: expected {}, found {}",
                next.id, expected_version, current.version
            )));
        }

        next.version = current.version + 1;
        next.updated_at = now;
        let snapshot = Arc::new(next);
        communities.insert(snapshot.id.clone(), snapshot.clone());
        Ok(snapshot)
    }

    /// Physically remove a community, returning its last snapshot.
    pub fn remove(&self, id: &str) -> Option<CommunitySnapshot> {
        self.communities.write().remove(id)
    }

    /// All current snapshots, ordered by creation time.
    pub fn list(&self) -> Vec<CommunitySnapshot> {
        let mut all: Vec<_> = self.communities.read().values().cloned().collect();
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        all
    }

    pub fn len(&self) -> usize {
        self.communities.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::community::types::Visibility;

    fn community(id: &str) -> Community {
        Community::new(id.into(), "Rust", "", Visibility::Public, "alice", 100)
    }

    #[test]
    fn test_insert_and_get() {
        let store = CommunityStore::new();
        store.insert(community("c1")).unwrap();
        assert_eq!(store.get("c1").unwrap().name, "Rust");
        assert!(store.get("c2").is_none());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_insert_duplicate_id_fails() {
        let store = CommunityStore::new();
        store.insert(community("c1")).unwrap();
        assert!(store.insert(community("c1")).is_err());
    }

    #[test]
    fn test_commit_bumps_version_and_keeps_old_snapshot_intact() {
        let store = CommunityStore::new();
        let before = store.insert(community("c1")).unwrap();

        let mut next = (*before).clone();
        next.participants.insert("bob".into());
        let after = store.commit(next, before.version, 200).unwrap();

        assert_eq!(after.version, 2);
        assert_eq!(after.updated_at, 200);
        assert!(after.is_participant("bob"));
        // The published snapshot is never edited in place
        assert!(!before.is_participant("bob"));
        assert_eq!(before.version, 1);
    }

    #[test]
    fn test_commit_rejects_stale_version() {
        let store = CommunityStore::new();
        let before = store.insert(community("c1")).unwrap();
        store.commit((*before).clone(), 1, 200).unwrap();

        let err = store.commit((*before).clone(), 1, 300).unwrap_err();
        assert!(matches!(err, Error::Internal(_)));
        assert_eq!(store.get("c1").unwrap().version, 2);
    }

    #[test]
    fn test_commit_unknown_community() {
        let store = CommunityStore::new();
        let err = store.commit(community("nope"), 1, 0).unwrap_err();
        assert_eq!(err, Error::CommunityNotFound);
    }

    #[test]
    fn test_remove() {
        let store = CommunityStore::new();
        store.insert(community("c1")).unwrap();
        assert!(store.remove("c1").is_some());
        assert!(store.get("c1").is_none());
        assert!(store.is_empty());
    }
}
