//! # Error Handling
//!
//! Error types for the governance engine.
//!
//! ## Error Hierarchy
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           ERROR HIERARCHY                               │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Error (top-level)                                                      │
//! │  │                                                                      │
//! │  ├── Authorization (100-199)                                            │
//! │  │   └── Unauthorized          - Requester lacks the privilege          │
//! │  │                                                                      │
//! │  ├── Invariant Rejection (200-299)                                      │
//! │  │   ├── Rejected(reason)      - Transition would break an invariant    │
//! │  │   └── NotEligible           - No active sanction to appeal           │
//! │  │                                                                      │
//! │  ├── Not Found (300-399)                                                │
//! │  │   ├── CommunityNotFound                                              │
//! │  │   ├── AppealNotFound                                                 │
//! │  │   └── ReportNotFound                                                 │
//! │  │                                                                      │
//! │  ├── Duplicate / Terminal State (400-499)                               │
//! │  │   ├── DuplicatePendingAppeal                                         │
//! │  │   ├── DuplicateOpenReport                                            │
//! │  │   ├── AlreadyMember                                                  │
//! │  │   ├── AppealAlreadyResolved                                          │
//! │  │   ├── AppealResolutionInProgress                                     │
//! │  │   └── ReportAlreadyClosed                                            │
//! │  │                                                                      │
//! │  ├── Validation (500-599)                                               │
//! │  │   └── InvalidInput                                                   │
//! │  │                                                                      │
//! │  └── Internal (900-999)                                                 │
//! │      ├── ProcessorUnavailable                                           │
//! │      └── Internal                                                       │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every error is local to the command that produced it. Nothing is retried
//! here, and no error path mutates state or emits a broadcast.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for governance operations
pub type Result<T> = std::result::Result<T, Error>;

/// Why the role & sanction state machine refused a transition.
///
/// Each reason implies a different corrective action for the user, so the
/// message is meant to be shown verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RejectionReason {
    /// The requester targeted themselves
    SelfActionNotAllowed,
    /// The target is the community admin
    TargetIsAdmin,
    /// The target is not a participant
    TargetNotMember,
    /// The target is banned
    TargetBanned,
    /// The requester must be a participant to do this
    RequesterNotMember,
}

impl std::fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let msg = match self {
            Self::SelfActionNotAllowed => "You cannot perform this action on yourself.",
            Self::TargetIsAdmin => "You cannot moderate the community admin.",
            Self::TargetNotMember => "That user is not a member of this community.",
            Self::TargetBanned => "That user is banned from this community.",
            Self::RequesterNotMember => "You must be a member of this community to do that.",
        };
        f.write_str(msg)
    }
}

/// Main error type for the governance engine
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    // ========================================================================
    // Authorization Errors (100-199)
    // ========================================================================

    /// The requester does not hold the privilege the action needs
    #[error("You are not allowed to {0}.")]
    Unauthorized(String),

    // ========================================================================
    // Invariant Rejections (200-299)
    // ========================================================================

    /// The transition would violate a community invariant
    #[error("{0}")]
    Rejected(RejectionReason),

    /// Appeal submitted without an active ban or mute
    #[error("There is no active ban or mute to appeal in this community.")]
    NotEligible,

    // ========================================================================
    // Not Found Errors (300-399)
    // ========================================================================

    /// Community not found (or already deleted)
    #[error("Community not found.")]
    CommunityNotFound,

    /// Appeal not found
    #[error("Appeal not found.")]
    AppealNotFound,

    /// Report not found
    #[error("Report not found.")]
    ReportNotFound,

    // ========================================================================
    // Duplicate / Terminal State Errors (400-499)
    // ========================================================================

    /// A pending appeal already exists for this user in this community
    #[error("You already have a pending appeal in this community.")]
    DuplicatePendingAppeal,

    /// The reporter already has an open report against this user
    #[error("You already have an open report against this user.")]
    DuplicateOpenReport,

    /// The user is already a participant
    #[error("You are already a member of this community.")]
    AlreadyMember,

    /// The appeal has reached a terminal status
    #[error("This appeal has already been resolved.")]
    AppealAlreadyResolved,

    /// Another moderator is resolving this appeal right now
    #[error("This appeal is being resolved by another moderator.")]
    AppealResolutionInProgress,

    /// The report has reached a terminal status
    #[error("This report has already been closed.")]
    ReportAlreadyClosed,

    // ========================================================================
    // Validation Errors (500-599)
    // ========================================================================

    /// Malformed or out-of-bounds input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // ========================================================================
    // Internal Errors (900-999)
    // ========================================================================

    /// The community's mailbox stopped before replying
    #[error("The moderation processor is unavailable.")]
    ProcessorUnavailable,

    /// Internal error (should not happen in normal operation)
    #[error("Internal error: {0}")]
    Internal(String),
}

/// The category an [`Error`] belongs to.
///
/// Transports map this to their own status vocabulary (HTTP status, socket
/// error frame) without matching on individual variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// Requester lacks the privilege
    Authorization,
    /// Target state would violate an invariant
    InvariantRejection,
    /// Unknown community/appeal/report
    NotFound,
    /// Duplicate or already-terminal state
    DuplicateState,
    /// Bad input
    Validation,
    /// Engine fault
    Internal,
}

impl Error {
    /// Get the numeric error code
    ///
    /// Error codes are organized by category:
    /// - 100-199: Authorization
    /// - 200-299: Invariant rejection
    /// - 300-399: Not found
    /// - 400-499: Duplicate / terminal state
    /// - 500-599: Validation
    /// - 900-999: Internal
    pub fn code(&self) -> i32 {
        match self {
            // Authorization (100-199)
            Error::Unauthorized(_) => 100,

            // Invariant rejection (200-299)
            Error::Rejected(RejectionReason::SelfActionNotAllowed) => 200,
            Error::Rejected(RejectionReason::TargetIsAdmin) => 201,
            Error::Rejected(RejectionReason::TargetNotMember) => 202,
            Error::Rejected(RejectionReason::TargetBanned) => 203,
            Error::Rejected(RejectionReason::RequesterNotMember) => 204,
            Error::NotEligible => 210,

            // Not found (300-399)
            Error::CommunityNotFound => 300,
            Error::AppealNotFound => 301,
            Error::ReportNotFound => 302,

            // Duplicate / terminal (400-499)
            Error::DuplicatePendingAppeal => 400,
            Error::DuplicateOpenReport => 401,
            Error::AlreadyMember => 402,
            Error::AppealAlreadyResolved => 403,
            Error::AppealResolutionInProgress => 404,
            Error::ReportAlreadyClosed => 405,

            // Validation (500-599)
            Error::InvalidInput(_) => 500,

            // Internal (900-999)
            Error::ProcessorUnavailable => 900,
            Error::Internal(_) => 901,
        }
    }

    /// Get the error category
    pub fn kind(&self) -> ErrorKind {
        match self.code() {
            100..=199 => ErrorKind::Authorization,
            200..=299 => ErrorKind::InvariantRejection,
            300..=399 => ErrorKind::NotFound,
            400..=499 => ErrorKind::DuplicateState,
            500..=599 => ErrorKind::Validation,
            _ => ErrorKind::Internal,
        }
    }
}

// ============================================================================
// WIRE ERROR REPRESENTATION
// ============================================================================

/// Serializable error sent back to clients in place of a snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorPayload {
    /// Numeric error code
    pub code: i32,
    /// Error category
    pub kind: ErrorKind,
    /// Human-readable, user-presentable message
    pub message: String,
}

impl From<&Error> for ErrorPayload {
    fn from(err: &Error) -> Self {
        Self {
            code: err.code(),
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

impl From<Error> for ErrorPayload {
    fn from(err: Error) -> Self {
        Self::from(&err)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(Error::Unauthorized("ban users".into()).code(), 100);
        assert_eq!(Error::Rejected(RejectionReason::TargetIsAdmin).code(), 201);
        assert_eq!(Error::NotEligible.code(), 210);
        assert_eq!(Error::CommunityNotFound.code(), 300);
        assert_eq!(Error::DuplicatePendingAppeal.code(), 400);
        assert_eq!(Error::InvalidInput("x".into()).code(), 500);
        assert_eq!(Error::ProcessorUnavailable.code(), 900);
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(Error::Unauthorized("x".into()).kind(), ErrorKind::Authorization);
        assert_eq!(
            Error::Rejected(RejectionReason::TargetBanned).kind(),
            ErrorKind::InvariantRejection
        );
        assert_eq!(Error::AppealNotFound.kind(), ErrorKind::NotFound);
        assert_eq!(Error::DuplicateOpenReport.kind(), ErrorKind::DuplicateState);
        assert_eq!(Error::InvalidInput("x".into()).kind(), ErrorKind::Validation);
        assert_eq!(Error::Internal("x".into()).kind(), ErrorKind::Internal);
    }

    #[test]
    fn test_rejection_messages_are_specific() {
        let err = Error::Rejected(RejectionReason::TargetIsAdmin);
        assert_eq!(err.to_string(), "You cannot moderate the community admin.");

        let err = Error::Unauthorized("ban members".into());
        assert_eq!(err.to_string(), "You are not allowed to ban members.");
    }

    #[test]
    fn test_error_payload_conversion() {
        let payload: ErrorPayload = Error::Rejected(RejectionReason::TargetBanned).into();
        assert_eq!(payload.code, 203);
        assert_eq!(payload.kind, ErrorKind::InvariantRejection);
        assert!(payload.message.contains("banned"));

        let json = serde_json::to_string(&payload).unwrap();
        assert!(json.contains("\"kind\":\"INVARIANT_REJECTION\""));
    }
}
