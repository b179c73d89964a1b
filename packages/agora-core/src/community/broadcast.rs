//! # Broadcast Dispatcher
//!
//! Turns every committed community mutation into a self-contained,
//! versioned payload and publishes it on the message bus.
//!
//! The dispatcher is called in-line from a community's mailbox right after
//! the commit, so publication order on a community channel equals commit
//! order without any reordering buffer.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::types::{Community, CommunitySnapshot};
use crate::bus::{Channel, MessageBus};

/// Wire payload for community changes.
///
/// Always carries the full snapshot, never a diff. Consumers must handle all
/// three variants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum CommunityUpdatePayload {
    Created { community: CommunitySnapshot },
    Updated { community: CommunitySnapshot },
    Deleted { community: CommunitySnapshot },
}

impl CommunityUpdatePayload {
    pub fn community(&self) -> &Community {
        match self {
            Self::Created { community }
            | Self::Updated { community }
            | Self::Deleted { community } => community,
        }
    }

    pub fn version(&self) -> u64 {
        self.community().version
    }

    /// Creations and deletions also go to the community-list channel.
    pub fn is_lifecycle(&self) -> bool {
        match self {
            Self::Created { .. } | Self::Deleted { .. } => true,
            Self::Updated { .. } => false,
        }
    }
}

/// Publishes committed snapshots on the injected bus.
#[derive(Clone)]
pub struct BroadcastDispatcher {
    bus: Arc<dyn MessageBus>,
}

impl BroadcastDispatcher {
    pub fn new(bus: Arc<dyn MessageBus>) -> Self {
        Self { bus }
    }

    pub fn bus(&self) -> &Arc<dyn MessageBus> {
        &self.bus
    }

    /// Publish `payload` on its community channel, and on the community-list
    /// channel for creations and deletions. Returns subscribers reached.
    pub fn dispatch(&self, payload: CommunityUpdatePayload) -> usize {
        let payload = Arc::new(payload);
        let community_id = payload.community().id.clone();
        let version = payload.version();

        let mut delivered = self
            .bus
            .publish(&Channel::Community(community_id.clone()), payload.clone());
        if payload.is_lifecycle() {
            delivered += self.bus.publish(&Channel::CommunityList, payload);
        }

        tracing::debug!(
            community_id = community_id.as_str(),
            version,
            delivered,
            "Dispatched community update"
        );
        delivered
    }

    pub fn created(&self, community: CommunitySnapshot) -> usize {
        self.dispatch(CommunityUpdatePayload::Created { community })
    }

    pub fn updated(&self, community: CommunitySnapshot) -> usize {
        self.dispatch(CommunityUpdatePayload::Updated { community })
    }

    pub fn deleted(&self, community: CommunitySnapshot) -> usize {
        self.dispatch(CommunityUpdatePayload::Deleted { community })
    }
}
