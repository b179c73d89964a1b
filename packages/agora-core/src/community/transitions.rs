//! # Role & Sanction State Machine
//!
//! Pure transition logic over a community's role and sanction sets. Every
//! role or sanction change in the engine goes through [`apply`], so the
//! invariant set is enforced in exactly one place.
//!
//! ```text
//!                 ToggleModerator                 ToggleMute
//!   member ◄──────────────────────► moderator    member ◄────► muted
//!     │                                │
//!     │ ToggleBan                      │ ToggleBan
//!     ▼                                ▼
//!   banned ──── ToggleBan ────► (not banned, not a member)
//! ```
//!
//! Actions are toggles: applying the same action twice restores the prior
//! role/sanction state.

use serde::{Deserialize, Serialize};

use super::types::Community;
use crate::error::{Error, RejectionReason, Result};

/// A role or sanction toggle against one target user.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "action", content = "target", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ModerationAction {
    ToggleModerator(String),
    ToggleBan(String),
    ToggleMute(String),
}

impl ModerationAction {
    /// The user the action targets.
    pub fn target(&self) -> &str {
        match self {
            Self::ToggleModerator(u) | Self::ToggleBan(u) | Self::ToggleMute(u) => u,
        }
    }

    /// Short verb phrase used in authorization errors and logs.
    pub fn describe(&self) -> &'static str {
        match self {
            Self::ToggleModerator(_) => "change moderators",
            Self::ToggleBan(_) => "ban or unban members",
            Self::ToggleMute(_) => "mute or unmute members",
        }
    }

    /// Only the admin may change moderators; bans and mutes are open to
    /// moderators as well.
    pub fn requires_admin(&self) -> bool {
        matches!(self, Self::ToggleModerator(_))
    }
}

/// What a caller wants done, resolved against live state inside the
/// community's mailbox.
///
/// `Toggle` is the plain command surface. The other two exist for internal
/// callers that must decide which toggle to issue (or none) against the
/// state at execution time rather than the state they last read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    Toggle(ModerationAction),
    /// Lift whichever sanction the user currently has: ban first, then mute.
    LiftSanction(String),
    /// Ban the user unless they are already banned.
    EnforceBan(String),
}

impl Directive {
    pub fn target(&self) -> &str {
        match self {
            Self::Toggle(action) => action.target(),
            Self::LiftSanction(u) | Self::EnforceBan(u) => u,
        }
    }
}

/// Resolve a directive into the concrete toggle to run against `community`.
///
/// `None` means the directive is already satisfied and nothing should be
/// committed.
pub fn resolve(community: &Community, directive: &Directive) -> Option<ModerationAction> {
    match directive {
        Directive::Toggle(action) => Some(action.clone()),
        Directive::LiftSanction(user) => {
            if community.is_banned(user) {
                Some(ModerationAction::ToggleBan(user.clone()))
            } else if community.is_muted(user) {
                Some(ModerationAction::ToggleMute(user.clone()))
            } else {
                None
            }
        }
        Directive::EnforceBan(user) => {
            if community.is_banned(user) {
                None
            } else {
                Some(ModerationAction::ToggleBan(user.clone()))
            }
        }
    }
}

/// Compute the next role/sanction state for `action`, or reject it.
///
/// The returned community keeps the input version; committing (and bumping
/// the version) is the processor's job.
pub fn apply(
    community: &Community,
    action: &ModerationAction,
) -> std::result::Result<Community, RejectionReason> {
    let target = action.target();
    if community.is_admin(target) {
        return Err(RejectionReason::TargetIsAdmin);
    }

    let mut next = community.clone();
    match action {
        ModerationAction::ToggleModerator(user) => {
            if community.is_banned(user) {
                return Err(RejectionReason::TargetBanned);
            }
            if !community.is_participant(user) {
                return Err(RejectionReason::TargetNotMember);
            }
            if !next.moderators.remove(user) {
                next.moderators.insert(user.clone());
            }
        }
        ModerationAction::ToggleBan(user) => {
            if next.banned.remove(user) {
                // Unbanned users must rejoin explicitly.
            } else {
                next.participants.remove(user);
                next.moderators.remove(user);
                next.muted.remove(user);
                next.banned.insert(user.clone());
            }
        }
        ModerationAction::ToggleMute(user) => {
            if community.is_banned(user) {
                return Err(RejectionReason::TargetBanned);
            }
            if !community.is_participant(user) {
                return Err(RejectionReason::TargetNotMember);
            }
            if !next.muted.remove(user) {
                next.muted.insert(user.clone());
            }
        }
    }

    debug_assert_eq!(next.check_invariants(), None);
    Ok(next)
}

/// Add `user` to participants.
pub fn join(community: &Community, user: &str) -> Result<Community> {
    if community.is_banned(user) {
        return Err(Error::Rejected(RejectionReason::TargetBanned));
    }
    if community.is_participant(user) {
        return Err(Error::AlreadyMember);
    }
    let mut next = community.clone();
    next.participants.insert(user.to_string());
    Ok(next)
}

/// Remove `user` from participants, dropping any moderator role or mute.
pub fn leave(community: &Community, user: &str) -> Result<Community> {
    if community.is_admin(user) {
        return Err(Error::Rejected(RejectionReason::TargetIsAdmin));
    }
    if !community.is_participant(user) {
        return Err(Error::Rejected(RejectionReason::TargetNotMember));
    }
    let mut next = community.clone();
    next.participants.remove(user);
    next.moderators.remove(user);
    next.muted.remove(user);
    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::community::types::Visibility;

    fn community() -> Community {
        let mut c = Community::new("c1".into(), "Rust", "", Visibility::Public, "alice", 0);
        for user in ["bob", "carol", "dave"] {
            c.participants.insert(user.into());
        }
        c.moderators.insert("bob".into());
        c
    }

    fn roles(c: &Community) -> (Vec<String>, Vec<String>, Vec<String>, Vec<String>) {
        (
            c.moderators.iter().cloned().collect(),
            c.participants.iter().cloned().collect(),
            c.banned.iter().cloned().collect(),
            c.muted.iter().cloned().collect(),
        )
    }

    #[test]
    fn test_toggle_moderator_promotes_and_demotes() {
        let c = community();
        let promoted = apply(&c, &ModerationAction::ToggleModerator("carol".into())).unwrap();
        assert!(promoted.is_moderator("carol"));

        let demoted = apply(&promoted, &ModerationAction::ToggleModerator("carol".into())).unwrap();
        assert!(!demoted.is_moderator("carol"));
        assert_eq!(roles(&demoted), roles(&c));
    }

    #[test]
    fn test_toggle_moderator_requires_membership() {
        let c = community();
        let err = apply(&c, &ModerationAction::ToggleModerator("mallory".into())).unwrap_err();
        assert_eq!(err, RejectionReason::TargetNotMember);
    }

    #[test]
    fn test_toggle_moderator_rejects_banned_target() {
        let c = community();
        let banned = apply(&c, &ModerationAction::ToggleBan("carol".into())).unwrap();
        let err = apply(&banned, &ModerationAction::ToggleModerator("carol".into())).unwrap_err();
        assert_eq!(err, RejectionReason::TargetBanned);
    }

    #[test]
    fn test_admin_cannot_be_targeted() {
        let c = community();
        for action in [
            ModerationAction::ToggleModerator("alice".into()),
            ModerationAction::ToggleBan("alice".into()),
            ModerationAction::ToggleMute("alice".into()),
        ] {
            assert_eq!(apply(&c, &action).unwrap_err(), RejectionReason::TargetIsAdmin);
        }
    }

    #[test]
    fn test_ban_removes_roles_and_unban_does_not_readd() {
        let mut c = community();
        c.muted.insert("bob".into());

        let banned = apply(&c, &ModerationAction::ToggleBan("bob".into())).unwrap();
        assert!(banned.is_banned("bob"));
        assert!(!banned.is_participant("bob"));
        assert!(!banned.is_moderator("bob"));
        assert!(!banned.is_muted("bob"));

        let unbanned = apply(&banned, &ModerationAction::ToggleBan("bob".into())).unwrap();
        assert!(!unbanned.is_banned("bob"));
        assert!(!unbanned.is_participant("bob"));
        assert_eq!(unbanned.check_invariants(), None);
    }

    #[test]
    fn test_ban_non_member_is_allowed() {
        // A user who never joined can still be banned pre-emptively.
        let c = community();
        let banned = apply(&c, &ModerationAction::ToggleBan("mallory".into())).unwrap();
        assert!(banned.is_banned("mallory"));
    }

    #[test]
    fn test_toggle_mute_keeps_membership() {
        let c = community();
        let muted = apply(&c, &ModerationAction::ToggleMute("bob".into())).unwrap();
        assert!(muted.is_muted("bob"));
        assert!(muted.is_participant("bob"));
        assert!(muted.is_moderator("bob"));

        let unmuted = apply(&muted, &ModerationAction::ToggleMute("bob".into())).unwrap();
        assert_eq!(roles(&unmuted), roles(&c));
    }

    #[test]
    fn test_toggle_mute_rejections() {
        let c = community();
        assert_eq!(
            apply(&c, &ModerationAction::ToggleMute("mallory".into())).unwrap_err(),
            RejectionReason::TargetNotMember
        );
        let banned = apply(&c, &ModerationAction::ToggleBan("dave".into())).unwrap();
        assert_eq!(
            apply(&banned, &ModerationAction::ToggleMute("dave".into())).unwrap_err(),
            RejectionReason::TargetBanned
        );
    }

    #[test]
    fn test_apply_keeps_version() {
        let c = community();
        let next = apply(&c, &ModerationAction::ToggleMute("dave".into())).unwrap();
        assert_eq!(next.version, c.version);
    }

    #[test]
    fn test_resolve_lift_sanction_prefers_live_ban() {
        let c = community();
        let banned = apply(&c, &ModerationAction::ToggleBan("dave".into())).unwrap();
        assert_eq!(
            resolve(&banned, &Directive::LiftSanction("dave".into())),
            Some(ModerationAction::ToggleBan("dave".into()))
        );

        let muted = apply(&c, &ModerationAction::ToggleMute("dave".into())).unwrap();
        assert_eq!(
            resolve(&muted, &Directive::LiftSanction("dave".into())),
            Some(ModerationAction::ToggleMute("dave".into()))
        );

        assert_eq!(resolve(&c, &Directive::LiftSanction("dave".into())), None);
    }

    #[test]
    fn test_resolve_enforce_ban_is_noop_when_banned() {
        let c = community();
        assert_eq!(
            resolve(&c, &Directive::EnforceBan("dave".into())),
            Some(ModerationAction::ToggleBan("dave".into()))
        );
        let banned = apply(&c, &ModerationAction::ToggleBan("dave".into())).unwrap();
        assert_eq!(resolve(&banned, &Directive::EnforceBan("dave".into())), None);
    }

    #[test]
    fn test_join_and_leave() {
        let c = community();
        let joined = join(&c, "erin").unwrap();
        assert!(joined.is_participant("erin"));
        assert_eq!(join(&joined, "erin").unwrap_err(), Error::AlreadyMember);

        let left = leave(&joined, "bob").unwrap();
        assert!(!left.is_participant("bob"));
        assert!(!left.is_moderator("bob"));
        assert_eq!(left.check_invariants(), None);
    }

    #[test]
    fn test_join_rejects_banned_and_leave_rejects_admin() {
        let c = community();
        let banned = apply(&c, &ModerationAction::ToggleBan("dave".into())).unwrap();
        assert_eq!(
            join(&banned, "dave").unwrap_err(),
            Error::Rejected(RejectionReason::TargetBanned)
        );
        assert_eq!(
            leave(&c, "alice").unwrap_err(),
            Error::Rejected(RejectionReason::TargetIsAdmin)
        );
        assert_eq!(
            leave(&c, "mallory").unwrap_err(),
            Error::Rejected(RejectionReason::TargetNotMember)
        );
    }

    #[test]
    fn test_action_wire_format() {
        let json = serde_json::to_string(&ModerationAction::ToggleBan("dave".into())).unwrap();
        assert_eq!(json, r#"{"action":"TOGGLE_BAN","target":"dave"}"#);
    }
}
