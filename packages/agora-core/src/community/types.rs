//! # Community Model
//!
//! The authoritative community entity and the immutable snapshot handle
//! that is shared with callers and subscribers.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Opaque community identifier.
pub type CommunityId = String;

/// A published, immutable community state.
///
/// New commits produce a new snapshot; readers holding an older one never
/// observe the change.
pub type CommunitySnapshot = Arc<Community>;

/// Who may see a community in list views.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Visibility {
    #[default]
    Public,
    Private,
}

/// A community and its role/sanction sets.
///
/// Invariants (checked by [`Community::check_invariants`] in tests and
/// maintained by the state machine):
/// - admin is not banned, muted or a moderator
/// - moderators ⊆ participants
/// - banned ∩ participants = ∅
/// - muted ⊆ participants
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Community {
    pub id: CommunityId,
    pub name: String,
    pub description: String,
    pub visibility: Visibility,
    /// Owner username, fixed at creation
    pub admin: String,
    pub moderators: BTreeSet<String>,
    pub participants: BTreeSet<String>,
    pub banned: BTreeSet<String>,
    pub muted: BTreeSet<String>,
    pub premium_count: u32,
    pub non_premium_count: u32,
    /// Incremented on every committed mutation
    pub version: u64,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Community {
    /// Build a fresh community at version 1 with the admin as its only
    /// participant.
    pub fn new(
        id: CommunityId,
        name: &str,
        description: &str,
        visibility: Visibility,
        admin: &str,
        now: i64,
    ) -> Self {
        let mut participants = BTreeSet::new();
        participants.insert(admin.to_string());
        Self {
            id,
            name: name.to_string(),
            description: description.to_string(),
            visibility,
            admin: admin.to_string(),
            moderators: BTreeSet::new(),
            participants,
            banned: BTreeSet::new(),
            muted: BTreeSet::new(),
            premium_count: 0,
            non_premium_count: 0,
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_admin(&self, username: &str) -> bool {
        self.admin == username
    }

    pub fn is_moderator(&self, username: &str) -> bool {
        self.moderators.contains(username)
    }

    /// Admin or moderator.
    pub fn is_privileged(&self, username: &str) -> bool {
        self.is_admin(username) || self.is_moderator(username)
    }

    pub fn is_participant(&self, username: &str) -> bool {
        self.participants.contains(username)
    }

    pub fn is_banned(&self, username: &str) -> bool {
        self.banned.contains(username)
    }

    pub fn is_muted(&self, username: &str) -> bool {
        self.muted.contains(username)
    }

    /// Whether the user may post or comment here.
    pub fn can_post(&self, username: &str) -> bool {
        self.is_participant(username) && !self.is_muted(username)
    }

    /// Visible in list views to `viewer` (anonymous viewers see public only).
    pub fn is_visible_to(&self, viewer: Option<&str>) -> bool {
        match self.visibility {
            Visibility::Public => true,
            Visibility::Private => viewer.is_some_and(|v| self.is_participant(v)),
        }
    }

    /// Recompute the derived premium/non-premium counters over participants.
    pub fn recount(&mut self, is_premium: impl Fn(&str) -> bool) {
        let premium = self.participants.iter().filter(|u| is_premium(u)).count();
        self.premium_count = premium as u32;
        self.non_premium_count = (self.participants.len() - premium) as u32;
    }

    /// Returns the first violated invariant, if any.
    pub fn check_invariants(&self) -> Option<&'static str> {
        if self.banned.contains(&self.admin) {
            return Some("admin is banned");
        }
        if self.muted.contains(&self.admin) {
            return Some("admin is muted");
        }
        if self.moderators.contains(&self.admin) {
            return Some("admin is a moderator");
        }
        if !self.moderators.is_subset(&self.participants) {
            return Some("moderator is not a participant");
        }
        if !self.banned.is_disjoint(&self.participants) {
            return Some("banned user is a participant");
        }
        if !self.muted.is_subset(&self.participants) {
            return Some("muted user is not a participant");
        }
        None
    }
}

/// The party on whose behalf a command runs.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Requester {
    /// An end user (admin, moderator or member)
    User(String),
    /// The engine itself, e.g. the auto-ban policy
    System,
}

impl Requester {
    pub fn user(username: impl Into<String>) -> Self {
        Self::User(username.into())
    }

    pub fn username(&self) -> Option<&str> {
        match self {
            Self::User(name) => Some(name),
            Self::System => None,
        }
    }
}

impl std::fmt::Display for Requester {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User(name) => f.write_str(name),
            Self::System => f.write_str("system"),
        }
    }
}
