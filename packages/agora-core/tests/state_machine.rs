//! Property tests for the role/sanction state machine.

use agora_core::community::{apply, ModerationAction};
use agora_core::{Community, Visibility};
use proptest::prelude::*;

const USERS: [&str; 5] = ["alice", "bob", "carol", "dave", "erin"];

/// alice administers; everyone else starts as a plain participant.
fn community() -> Community {
    let mut community = Community::new("c1".into(), "Rust", "", Visibility::Public, "alice", 0);
    for user in &USERS[1..] {
        community.participants.insert(user.to_string());
    }
    community
}

fn action(kind: u8, target: usize) -> ModerationAction {
    let target = USERS[target].to_string();
    match kind {
        0 => ModerationAction::ToggleModerator(target),
        1 => ModerationAction::ToggleBan(target),
        _ => ModerationAction::ToggleMute(target),
    }
}

fn actions() -> impl Strategy<Value = Vec<(u8, usize)>> {
    prop::collection::vec((0u8..3, 0usize..USERS.len()), 0..64)
}

proptest! {
    #[test]
    fn invariants_hold_for_any_action_sequence(steps in actions()) {
        let mut current = community();
        for (kind, target) in steps {
            if let Ok(next) = apply(&current, &action(kind, target)) {
                prop_assert_eq!(next.check_invariants(), None);
                prop_assert!(next.is_admin("alice"));
                current = next;
            }
        }
    }

    #[test]
    fn admin_is_never_a_valid_target(steps in actions(), kind in 0u8..3) {
        let mut current = community();
        for (k, target) in steps {
            if let Ok(next) = apply(&current, &action(k, target)) {
                current = next;
            }
        }
        prop_assert!(apply(&current, &action(kind, 0)).is_err());
    }

    #[test]
    fn moderator_and_mute_toggles_are_involutions(
        steps in actions(),
        kind in prop_oneof![Just(0u8), Just(2u8)],
        target in 1usize..USERS.len(),
    ) {
        let mut current = community();
        for (k, t) in steps {
            if let Ok(next) = apply(&current, &action(k, t)) {
                current = next;
            }
        }

        let toggle = action(kind, target);
        if let Ok(once) = apply(&current, &toggle) {
            let twice = apply(&once, &toggle);
            prop_assert!(twice.is_ok());
            let twice = twice.unwrap();
            prop_assert_eq!(&twice.moderators, &current.moderators);
            prop_assert_eq!(&twice.muted, &current.muted);
            prop_assert_eq!(&twice.participants, &current.participants);
            prop_assert_eq!(&twice.banned, &current.banned);
        }
    }
}
