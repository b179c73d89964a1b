//! # Agora Core
//!
//! Community governance and real-time sync engine for the Agora forum.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         AGORA CORE MODULES                              │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │   command ──► CommunityService ──► ModerationProcessor (per community)  │
//! │                    │                     │                              │
//! │                    │                     ▼                              │
//! │                    │             transitions::apply                     │
//! │                    │                     │                              │
//! │                    │                     ▼                              │
//! │                    │             CommunityStore::commit                 │
//! │                    │                     │                              │
//! │                    │                     ▼                              │
//! │                    └────────────► BroadcastDispatcher                   │
//! │                                          │                              │
//! │                                          ▼                              │
//! │                                    MessageBus ──► ClientView            │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Hierarchy
//!
//! - [`error`] - Error taxonomy and wire payloads
//! - [`config`] - Engine configuration
//! - [`bus`] - Publish/subscribe abstraction and the in-process bus
//! - [`collaborators`] - Notification and user-directory boundaries
//! - [`community`] - State machine, processor, reports, appeals, reconciler
//!
//! ## Ordering
//!
//! Commands for one community run one at a time in arrival order. Versions
//! are assigned once per commit and broadcasts go out in commit order.
//! Commands for different communities run in parallel.

#![warn(rustdoc::missing_crate_level_docs)]

// ============================================================================
// MODULE DECLARATIONS
// ============================================================================

pub mod bus;
pub mod collaborators;
pub mod community;
pub mod config;
pub mod error;
/// Timestamp helpers.
pub mod time;

// ============================================================================
// RE-EXPORTS
// ============================================================================

pub use bus::{Channel, LocalBus, MessageBus, Subscription};
pub use collaborators::{
    InMemoryNotifier, Notification, NotificationKind, Notifier, StaticDirectory, UserDirectory,
};
pub use community::{
    Appeal, AppealDecision, AppealStatus, ClientView, Community, CommunityChanges,
    CommunityService, CommunitySnapshot, CommunityUpdatePayload, ModerationAction,
    ReconcileOutcome, Report, ReportCategory, ReportOutcome, ReportStatus, Visibility,
};
pub use config::EngineConfig;
pub use error::{Error, ErrorKind, ErrorPayload, RejectionReason, Result};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build an engine with the in-process bus and the given collaborators.
pub fn in_process(
    config: EngineConfig,
    notifier: std::sync::Arc<dyn Notifier>,
    directory: std::sync::Arc<dyn UserDirectory>,
) -> CommunityService {
    let bus = std::sync::Arc::new(LocalBus::new(config.channel_capacity));
    CommunityService::new(config, bus, notifier, directory)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[tokio::test]
    async fn test_in_process_engine() {
        let engine = in_process(
            EngineConfig::default(),
            std::sync::Arc::new(InMemoryNotifier::new()),
            std::sync::Arc::new(StaticDirectory::default()),
        );
        let c = engine
            .create_community("alice", "Rust", "", Visibility::Public)
            .unwrap();
        assert_eq!(engine.get_community(&c.id).unwrap().version, 1);
    }
}
