//! # Client Reconciler
//!
//! A client's local view of communities, driven only by broadcast
//! snapshots. The view is a reducer over `(held version, incoming snapshot)`:
//! newer snapshots replace the held copy wholesale, older or equal ones are
//! dropped, and a deletion retires the ID for good.
//!
//! Command responses never touch the view; the broadcast that follows every
//! commit is the only way state changes arrive.

use std::collections::{HashMap, HashSet};

use super::broadcast::CommunityUpdatePayload;
use super::types::{CommunityId, CommunitySnapshot};
use crate::bus::Subscription;

/// What applying one payload did to the view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// First snapshot for this ID
    Inserted,
    /// Newer snapshot replaced the held one
    Replaced,
    /// Not newer than the held snapshot
    DiscardedStale,
    /// Deleted; the ID is now dead
    Removed,
    /// Payload for an ID that was already deleted
    IgnoredDead,
}

impl ReconcileOutcome {
    /// Whether the view changed.
    pub fn changed(self) -> bool {
        matches!(self, Self::Inserted | Self::Replaced | Self::Removed)
    }
}

/// Local community state for one client.
#[derive(Debug, Clone, Default)]
pub struct ClientView {
    communities: HashMap<CommunityId, CommunitySnapshot>,
    dead: HashSet<CommunityId>,
}

impl ClientView {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one broadcast payload.
    pub fn apply(&mut self, payload: &CommunityUpdatePayload) -> ReconcileOutcome {
        let outcome = match payload {
            CommunityUpdatePayload::Deleted { community } => {
                self.communities.remove(&community.id);
                self.dead.insert(community.id.clone());
                ReconcileOutcome::Removed
            }
            CommunityUpdatePayload::Created { community }
            | CommunityUpdatePayload::Updated { community } => self.offer(community),
        };

        tracing::trace!(
            community_id = payload.community().id.as_str(),
            version = payload.version(),
            outcome = ?outcome,
            "Reconciled payload"
        );
        outcome
    }

    /// Load a snapshot fetched out of band (initial page load). Follows the
    /// same version rule as broadcasts.
    pub fn seed(&mut self, snapshot: CommunitySnapshot) -> ReconcileOutcome {
        self.offer(&snapshot)
    }

    /// Wait for the next payload on `subscription` and apply it. Returns
    /// `None` once the subscription closes.
    pub async fn follow(&mut self, subscription: &mut Subscription) -> Option<ReconcileOutcome> {
        let payload = subscription.recv().await?;
        Some(self.apply(&payload))
    }

    /// Apply every payload already buffered on `subscription`.
    pub fn catch_up(&mut self, subscription: &mut Subscription) -> Vec<ReconcileOutcome> {
        let mut outcomes = Vec::new();
        while let Some(payload) = subscription.try_recv() {
            outcomes.push(self.apply(&payload));
        }
        outcomes
    }

    pub fn get(&self, community_id: &str) -> Option<&CommunitySnapshot> {
        self.communities.get(community_id)
    }

    /// Held version, if the community is in view.
    pub fn version(&self, community_id: &str) -> Option<u64> {
        self.get(community_id).map(|c| c.version)
    }

    pub fn is_dead(&self, community_id: &str) -> bool {
        self.dead.contains(community_id)
    }

    /// Communities in view, oldest first.
    pub fn list(&self) -> Vec<CommunitySnapshot> {
        let mut all: Vec<_> = self.communities.values().cloned().collect();
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        all
    }

    pub fn len(&self) -> usize {
        self.communities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.communities.is_empty()
    }

    fn offer(&mut self, community: &CommunitySnapshot) -> ReconcileOutcome {
        if self.dead.contains(&community.id) {
            return ReconcileOutcome::IgnoredDead;
        }
        match self.communities.get(&community.id) {
            Some(held) if community.version <= held.version => ReconcileOutcome::DiscardedStale,
            Some(_) => {
                self.communities
                    .insert(community.id.clone(), community.clone());
                ReconcileOutcome::Replaced
            }
            None => {
                self.communities
                    .insert(community.id.clone(), community.clone());
                ReconcileOutcome::Inserted
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::community::types::{Community, Visibility};

    fn snapshot(id: &str, version: u64, member: Option<&str>) -> CommunitySnapshot {
        let mut community = Community::new(id.into(), "Rust", "", Visibility::Public, "alice", 0);
        community.version = version;
        if let Some(member) = member {
            community.participants.insert(member.into());
        }
        Arc::new(community)
    }

    fn updated(id: &str, version: u64, member: Option<&str>) -> CommunityUpdatePayload {
        CommunityUpdatePayload::Updated {
            community: snapshot(id, version, member),
        }
    }

    #[test]
    fn test_newer_snapshot_replaces_whole_copy() {
        let mut view = ClientView::new();
        assert_eq!(view.apply(&updated("c1", 2, Some("bob"))), ReconcileOutcome::Inserted);
        assert_eq!(view.apply(&updated("c1", 3, None)), ReconcileOutcome::Replaced);

        let held = view.get("c1").unwrap();
        assert_eq!(held.version, 3);
        // Not merged: bob came from the older snapshot only
        assert!(!held.is_participant("bob"));
    }

    #[test]
    fn test_stale_and_equal_versions_discarded() {
        let mut view = ClientView::new();
        view.apply(&updated("c1", 5, Some("bob")));
        assert_eq!(view.apply(&updated("c1", 4, None)), ReconcileOutcome::DiscardedStale);
        assert_eq!(view.apply(&updated("c1", 5, None)), ReconcileOutcome::DiscardedStale);
        assert!(view.get("c1").unwrap().is_participant("bob"));
    }

    #[test]
    fn test_delete_wins_regardless_of_version() {
        let mut view = ClientView::new();
        view.apply(&updated("c1", 9, None));
        let outcome = view.apply(&CommunityUpdatePayload::Deleted {
            community: snapshot("c1", 2, None),
        });
        assert_eq!(outcome, ReconcileOutcome::Removed);
        assert!(view.get("c1").is_none());
        assert!(view.is_dead("c1"));

        // Late update after delete stays out
        assert_eq!(view.apply(&updated("c1", 10, None)), ReconcileOutcome::IgnoredDead);
        assert!(view.is_empty());
    }

    #[test]
    fn test_created_inserts_into_list() {
        let mut view = ClientView::new();
        let outcome = view.apply(&CommunityUpdatePayload::Created {
            community: snapshot("c2", 1, None),
        });
        assert_eq!(outcome, ReconcileOutcome::Inserted);
        assert!(outcome.changed());
        assert_eq!(view.list().len(), 1);
    }

    #[test]
    fn test_out_of_order_delivery_converges() {
        let mut view = ClientView::new();
        for version in [3, 1, 4, 2, 6, 5] {
            view.apply(&updated("c1", version, None));
        }
        assert_eq!(view.version("c1"), Some(6));
    }

    #[test]
    fn test_seed_follows_version_rule() {
        let mut view = ClientView::new();
        view.seed(snapshot("c1", 3, None));
        assert_eq!(view.seed(snapshot("c1", 2, None)), ReconcileOutcome::DiscardedStale);
        assert_eq!(view.version("c1"), Some(3));
    }
}
