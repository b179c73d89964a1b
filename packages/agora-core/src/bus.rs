//! # Message Bus
//!
//! Publish/subscribe abstraction injected into every component that emits or
//! consumes community updates. There is no global connection object: each
//! consumer holds a [`Subscription`], and dropping it unsubscribes.
//!
//! ```text
//!   BroadcastDispatcher ──publish──► MessageBus ──► community:<id> ──► Subscription
//!                                       │
//!                                       └─────────► communities    ──► Subscription
//! ```
//!
//! [`LocalBus`] is the single-process implementation: one tokio broadcast
//! channel per named channel, created lazily on first subscribe and pruned
//! once its last subscriber goes away.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::broadcast;

use crate::community::CommunityUpdatePayload;

/// Channel name for the sitewide community list.
pub const COMMUNITY_LIST_CHANNEL: &str = "communities";

/// Prefix for per-community channel names.
pub const COMMUNITY_CHANNEL_PREFIX: &str = "community:";

/// A named pub/sub channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Channel {
    /// Every committed change to one community
    Community(String),
    /// Creations and deletions across the site
    CommunityList,
}

impl Channel {
    /// Wire name: `community:<id>` or `communities`.
    pub fn name(&self) -> String {
        match self {
            Self::Community(id) => format!("{}{}", COMMUNITY_CHANNEL_PREFIX, id),
            Self::CommunityList => COMMUNITY_LIST_CHANNEL.to_string(),
        }
    }

    /// Parse a wire name. Returns `None` for unknown or empty names.
    pub fn parse(name: &str) -> Option<Self> {
        if name == COMMUNITY_LIST_CHANNEL {
            return Some(Self::CommunityList);
        }
        match name.strip_prefix(COMMUNITY_CHANNEL_PREFIX) {
            Some(id) if !id.is_empty() => Some(Self::Community(id.to_string())),
            _ => None,
        }
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name())
    }
}

/// Shared payload handle; every subscriber receives the same allocation.
pub type SharedPayload = Arc<CommunityUpdatePayload>;

/// Publish/subscribe transport for community updates.
pub trait MessageBus: Send + Sync {
    /// Publish to one channel. Returns the number of subscribers reached.
    fn publish(&self, channel: &Channel, payload: SharedPayload) -> usize;

    /// Subscribe to one channel. The subscription ends when dropped.
    fn subscribe(&self, channel: &Channel) -> Subscription;

    /// Number of channels with at least one live subscriber.
    fn channel_count(&self) -> usize;
}

/// A live subscription to one channel.
pub struct Subscription {
    channel: Channel,
    receiver: broadcast::Receiver<SharedPayload>,
}

impl Subscription {
    pub fn new(channel: Channel, receiver: broadcast::Receiver<SharedPayload>) -> Self {
        Self { channel, receiver }
    }

    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    /// Wait for the next payload. Returns `None` once the channel is closed.
    ///
    /// A subscriber that falls behind skips the payloads it missed; every
    /// payload is a full snapshot, so the next one received supersedes them.
    pub async fn recv(&mut self) -> Option<SharedPayload> {
        loop {
            match self.receiver.recv().await {
                Ok(payload) => return Some(payload),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(
                        channel = %self.channel,
                        skipped,
                        "Subscriber lagged, skipping to latest snapshot"
                    );
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Take the next payload if one is already buffered.
    pub fn try_recv(&mut self) -> Option<SharedPayload> {
        loop {
            match self.receiver.try_recv() {
                Ok(payload) => return Some(payload),
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    tracing::warn!(channel = %self.channel, skipped, "Subscriber lagged");
                }
                Err(_) => return None,
            }
        }
    }
}

/// In-process message bus backed by tokio broadcast channels.
pub struct LocalBus {
    channels: RwLock<HashMap<Channel, broadcast::Sender<SharedPayload>>>,
    capacity: usize,
}

impl LocalBus {
    /// `capacity` is the number of payloads buffered per subscriber before
    /// it starts lagging.
    pub fn new(capacity: usize) -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// Drop channels that no longer have subscribers.
    pub fn prune(&self) -> usize {
        let mut channels = self.channels.write();
        let before = channels.len();
        channels.retain(|_, sender| sender.receiver_count() > 0);
        before - channels.len()
    }
}

impl MessageBus for LocalBus {
    fn publish(&self, channel: &Channel, payload: SharedPayload) -> usize {
        let delivered = {
            let channels = self.channels.read();
            match channels.get(channel) {
                Some(sender) => sender.send(payload).unwrap_or(0),
                None => return 0,
            }
        };

        if delivered == 0 {
            // Last subscriber is gone; re-check under the write lock in case
            // someone subscribed in between.
            let mut channels = self.channels.write();
            if channels
                .get(channel)
                .is_some_and(|sender| sender.receiver_count() == 0)
            {
                channels.remove(channel);
            }
        }
        delivered
    }

    fn subscribe(&self, channel: &Channel) -> Subscription {
        // Fast path: read lock
        {
            let channels = self.channels.read();
            if let Some(sender) = channels.get(channel) {
                return Subscription::new(channel.clone(), sender.subscribe());
            }
        }

        let mut channels = self.channels.write();
        let sender = channels
            .entry(channel.clone())
            .or_insert_with(|| broadcast::channel(self.capacity).0);
        Subscription::new(channel.clone(), sender.subscribe())
    }

    fn channel_count(&self) -> usize {
        self.channels
            .read()
            .values()
            .filter(|sender| sender.receiver_count() > 0)
            .count()
    }
}
