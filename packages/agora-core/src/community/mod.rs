//! # Community Module
//!
//! Governance for sub-communities: roles, sanctions, reports, appeals and
//! the real-time propagation of every committed change.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       COMMUNITY MODULE                                  │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌─────────────┐     ┌─────────────┐                                    │
//! │  │  Reports    │     │  Appeals    │                                    │
//! │  │ - File      │     │ - Submit    │                                    │
//! │  │ - Auto-ban  │     │ - Resolve   │                                    │
//! │  └──────┬──────┘     └──────┬──────┘                                    │
//! │         │                   │                                           │
//! │         ▼                   ▼                                           │
//! │  ┌─────────────────────────────────┐      ┌─────────────────────┐       │
//! │  │  Processor (mailbox per id)     │─────►│  Transitions        │       │
//! │  │ - Authorize                     │      │ - ToggleModerator   │       │
//! │  │ - Serialize                     │      │ - ToggleBan         │       │
//! │  └──────┬──────────────────────────┘      │ - ToggleMute        │       │
//! │         │                                 └─────────────────────┘       │
//! │         ▼                                                               │
//! │  ┌─────────────┐     ┌─────────────┐     ┌─────────────┐                │
//! │  │   Store     │────►│  Broadcast  │────►│ Reconciler  │ (per client)   │
//! │  │ - Commit    │     │ - Dispatch  │     │ - Replace   │                │
//! │  │ - Version   │     │             │     │ - Discard   │                │
//! │  └─────────────┘     └─────────────┘     └─────────────┘                │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

mod appeals;
mod broadcast;
mod processor;
mod reconciler;
mod reports;
mod service;
mod store;
mod transitions;
mod types;

pub use appeals::{Appeal, AppealDecision, AppealStatus, AppealWorkflow};
pub use broadcast::{BroadcastDispatcher, CommunityUpdatePayload};
pub use processor::{CommunityChanges, Execution, ModerationProcessor};
pub use reconciler::{ClientView, ReconcileOutcome};
pub use reports::{Report, ReportAggregator, ReportCategory, ReportOutcome, ReportStatus};
pub use service::CommunityService;
pub use store::CommunityStore;
pub use transitions::{apply, resolve, Directive, ModerationAction};
pub use types::{Community, CommunityId, CommunitySnapshot, Requester, Visibility};
