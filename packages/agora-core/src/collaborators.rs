//! # Collaborators
//!
//! Boundaries the engine consumes but does not own: notification delivery
//! and the user directory. Both are injected as trait objects so the relay
//! can wire in socket delivery while tests use the in-memory versions here.

use std::collections::HashSet;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

// ============================================================================
// NOTIFICATIONS
// ============================================================================

/// Notification categories raised by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationKind {
    AppealApproved,
    AppealDenied,
    AutoBan,
}

/// A notification addressed to one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    /// Recipient username
    pub target: String,
    pub title: String,
    pub message: String,
    /// Community the notification refers to
    pub context_id: String,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
}

/// Delivers notifications to users.
///
/// Delivery is fire-and-forget; a failed delivery never fails the command
/// that raised it.
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// Notifier that keeps every notification in memory.
#[derive(Default)]
pub struct InMemoryNotifier {
    sent: Mutex<Vec<Notification>>,
}

impl InMemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Notifications delivered to `username`, oldest first.
    pub fn for_user(&self, username: &str) -> Vec<Notification> {
        self.sent
            .lock()
            .iter()
            .filter(|n| n.target == username)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.sent.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Notifier for InMemoryNotifier {
    fn notify(&self, notification: Notification) {
        tracing::debug!(
            target_user = notification.target.as_str(),
            kind = ?notification.kind,
            "Notification queued"
        );
        self.sent.lock().push(notification);
    }
}

// ============================================================================
// USER DIRECTORY
// ============================================================================

/// Read-only lookups about users that live outside the engine.
///
/// Membership is not asked here: each community snapshot owns its
/// participant set.
pub trait UserDirectory: Send + Sync {
    /// Whether the user holds a premium account. Feeds the derived
    /// premium/non-premium counters.
    fn is_premium(&self, username: &str) -> bool;
}

/// Directory backed by a fixed set of premium usernames.
#[derive(Default)]
pub struct StaticDirectory {
    premium: RwLock<HashSet<String>>,
}

impl StaticDirectory {
    pub fn new<I, S>(premium: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            premium: RwLock::new(premium.into_iter().map(Into::into).collect()),
        }
    }

    pub fn set_premium(&self, username: &str, premium: bool) {
        let mut set = self.premium.write();
        if premium {
            set.insert(username.to_string());
        } else {
            set.remove(username);
        }
    }
}

impl UserDirectory for StaticDirectory {
    fn is_premium(&self, username: &str) -> bool {
        self.premium.read().contains(username)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_memory_notifier_filters_by_user() {
        let notifier = InMemoryNotifier::new();
        notifier.notify(Notification {
            target: "dave".into(),
            title: "Banned".into(),
            message: "You were banned".into(),
            context_id: "c1".into(),
            kind: NotificationKind::AutoBan,
        });
        assert_eq!(notifier.len(), 1);
        assert_eq!(notifier.for_user("dave").len(), 1);
        assert!(notifier.for_user("carol").is_empty());
    }

    #[test]
    fn test_static_directory() {
        let directory = StaticDirectory::new(["alice"]);
        assert!(directory.is_premium("alice"));
        assert!(!directory.is_premium("bob"));

        directory.set_premium("bob", true);
        directory.set_premium("alice", false);
        assert!(directory.is_premium("bob"));
        assert!(!directory.is_premium("alice"));
    }

    #[test]
    fn test_notification_wire_format() {
        let json = serde_json::to_value(Notification {
            target: "carol".into(),
            title: "Appeal approved".into(),
            message: "ok".into(),
            context_id: "c1".into(),
            kind: NotificationKind::AppealApproved,
        })
        .unwrap();
        assert_eq!(json["type"], "APPEAL_APPROVED");
        assert_eq!(json["contextId"], "c1");
    }
}
