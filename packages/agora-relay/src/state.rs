//! Server state management.
//!
//! Holds the governance engine and tracks online clients. Notifications for
//! users who are offline are queued and delivered when they register.
//! Client maps are concurrent (DashMap) for lock-free access.

use std::collections::VecDeque;
use std::sync::Arc;

use agora_core::{CommunityService, EngineConfig, Notification, Notifier, StaticDirectory};
use dashmap::DashMap;
use tokio::sync::mpsc;

use crate::protocol::ServerMessage;

/// Maximum number of queued notifications per offline user.
const DEFAULT_MAX_PENDING_NOTIFICATIONS: usize = 100;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub port: u16,
    pub engine: EngineConfig,
    /// Usernames counted as premium in community counters
    pub premium_users: Vec<String>,
    /// Queued notifications per offline user. 0 disables queueing.
    pub max_pending_notifications: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            engine: EngineConfig::default(),
            premium_users: Vec::new(),
            max_pending_notifications: DEFAULT_MAX_PENDING_NOTIFICATIONS,
        }
    }
}

/// A connected client's sender channel.
pub type ClientSender = mpsc::UnboundedSender<ServerMessage>;

type ClientMap = Arc<DashMap<String, ClientSender>>;
type PendingMap = Arc<DashMap<String, VecDeque<Notification>>>;

/// Shared server state.
#[derive(Clone)]
pub struct RelayState {
    /// The governance engine. All community reads and commands go through it.
    pub engine: Arc<CommunityService>,

    /// Username → sender channel for online clients.
    pub online_clients: ClientMap,

    /// Username → notifications raised while they were offline.
    pub pending_notifications: PendingMap,

    pub config: RelayConfig,
}

impl RelayState {
    /// Create a new relay state with the given configuration.
    pub fn new(config: RelayConfig) -> Self {
        let online_clients: ClientMap = Arc::new(DashMap::new());
        let pending_notifications: PendingMap = Arc::new(DashMap::new());

        let notifier = Arc::new(SocketNotifier {
            online_clients: online_clients.clone(),
            pending: pending_notifications.clone(),
            max_pending: config.max_pending_notifications,
        });
        let directory = Arc::new(StaticDirectory::new(config.premium_users.iter().cloned()));
        let engine = agora_core::in_process(config.engine.clone(), notifier, directory);

        Self {
            engine: Arc::new(engine),
            online_clients,
            pending_notifications,
            config,
        }
    }

    // ── Client Management ─────────────────────────────────────────────────

    /// Register a connected client, replacing any previous connection for
    /// the same username, and flush its queued notifications.
    pub fn register_client(&self, username: &str, sender: ClientSender) {
        tracing::info!(username, "Client registered");
        self.online_clients
            .insert(username.to_string(), sender.clone());

        // Anything queued before the insert is flushed here; later
        // notifications go straight to the socket.
        if let Some((_, queued)) = self.pending_notifications.remove(username) {
            tracing::info!(username, count = queued.len(), "Delivering queued notifications");
            for notification in queued {
                let _ = sender.send(ServerMessage::Notification { notification });
            }
        }
    }

    /// Unregister a client when they disconnect. Only removes the entry if
    /// it still belongs to `sender`; a newer connection for the same user
    /// stays registered.
    pub fn unregister_client(&self, username: &str, sender: &ClientSender) {
        let removed = self
            .online_clients
            .remove_if(username, |_, current| current.same_channel(sender))
            .is_some();
        if removed {
            tracing::info!(username, "Client unregistered");
        }
    }

    /// Check if a client is currently online.
    pub fn is_online(&self, username: &str) -> bool {
        self.online_clients.contains_key(username)
    }

    /// Send a message to a connected client.
    /// Returns true if the client was online and the message was queued.
    pub fn send_to_client(&self, username: &str, message: ServerMessage) -> bool {
        match self.online_clients.get(username) {
            Some(sender) => sender.send(message).is_ok(),
            None => false,
        }
    }

    // ── Stats ─────────────────────────────────────────────────────────────

    pub fn online_count(&self) -> usize {
        self.online_clients.len()
    }

    pub fn pending_notification_count(&self) -> usize {
        self.pending_notifications
            .iter()
            .map(|entry| entry.value().len())
            .sum()
    }
}

/// Delivers engine notifications over client sockets, queueing them for
/// users who are offline.
struct SocketNotifier {
    online_clients: ClientMap,
    pending: PendingMap,
    max_pending: usize,
}

impl Notifier for SocketNotifier {
    fn notify(&self, notification: Notification) {
        let notification = match self.online_clients.get(&notification.target) {
            Some(sender) => match sender.send(ServerMessage::Notification { notification }) {
                Ok(()) => return,
                // Socket closed but not yet unregistered: queue it instead
                Err(mpsc::error::SendError(msg)) => match msg {
                    ServerMessage::Notification { notification } => notification,
                    _ => return,
                },
            },
            None => notification,
        };
        self.enqueue(notification);
    }
}

impl SocketNotifier {
    fn enqueue(&self, notification: Notification) {
        if self.max_pending == 0 {
            tracing::debug!(
                username = notification.target.as_str(),
                "Offline queue disabled, notification dropped"
            );
            return;
        }

        let mut queue = self.pending.entry(notification.target.clone()).or_default();
        while queue.len() >= self.max_pending {
            // Drop the oldest
            queue.pop_front();
        }
        tracing::debug!(
            username = notification.target.as_str(),
            queued = queue.len() + 1,
            "Notification queued for offline user"
        );
        queue.push_back(notification);
    }
}
