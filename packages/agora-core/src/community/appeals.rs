//! # Appeals
//!
//! A banned or muted user asks to have the sanction lifted; the admin or a
//! moderator approves or denies.
//!
//! ```text
//!   none ──submit──► PENDING ──approve──► APPROVED
//!                       │
//!                       └─────deny──────► DENIED
//! ```
//!
//! Approval lifts whichever sanction is active when the approval runs, not
//! the one that was active when the appeal was filed.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::processor::ModerationProcessor;
use super::store::CommunityStore;
use super::transitions::Directive;
use super::types::{CommunityId, Requester};
use crate::collaborators::{Notification, NotificationKind, Notifier};
use crate::config::{validate_text, EngineConfig};
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AppealStatus {
    Pending,
    Approved,
    Denied,
}

/// A moderator's decision on an appeal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AppealDecision {
    Approved,
    Denied,
}

impl From<AppealDecision> for AppealStatus {
    fn from(decision: AppealDecision) -> Self {
        match decision {
            AppealDecision::Approved => AppealStatus::Approved,
            AppealDecision::Denied => AppealStatus::Denied,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Appeal {
    pub id: String,
    pub community_id: CommunityId,
    /// The sanctioned user
    pub username: String,
    pub description: String,
    pub status: AppealStatus,
    pub created_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_by: Option<String>,
}

impl Appeal {
    pub fn is_pending(&self) -> bool {
        self.status == AppealStatus::Pending
    }
}

/// Releases an appeal's resolution claim when dropped.
struct ResolveClaim<'a> {
    resolving: &'a Mutex<HashSet<String>>,
    appeal_id: String,
}

impl Drop for ResolveClaim<'_> {
    fn drop(&mut self) {
        self.resolving.lock().remove(&self.appeal_id);
    }
}

/// Appeal lifecycle.
pub struct AppealWorkflow {
    appeals: Mutex<HashMap<String, Appeal>>,
    /// Appeals with a resolution in flight
    resolving: Mutex<HashSet<String>>,
    store: CommunityStore,
    processor: ModerationProcessor,
    notifier: Arc<dyn Notifier>,
    max_description_length: usize,
}

impl AppealWorkflow {
    pub fn new(
        store: CommunityStore,
        processor: ModerationProcessor,
        notifier: Arc<dyn Notifier>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            appeals: Mutex::new(HashMap::new()),
            resolving: Mutex::new(HashSet::new()),
            store,
            processor,
            notifier,
            max_description_length: config.max_appeal_length,
        }
    }

    /// Open an appeal. The user must currently be banned or muted and have
    /// no pending appeal in this community.
    pub fn submit(&self, community_id: &str, username: &str, description: &str) -> Result<Appeal> {
        validate_text("description", description, self.max_description_length)?;

        let community = self
            .store
            .get(community_id)
            .ok_or(Error::CommunityNotFound)?;
        if !community.is_banned(username) && !community.is_muted(username) {
            return Err(Error::NotEligible);
        }

        let mut appeals = self.appeals.lock();
        let duplicate = appeals
            .values()
            .any(|a| a.is_pending() && a.community_id == community_id && a.username == username);
        if duplicate {
            return Err(Error::DuplicatePendingAppeal);
        }

        let appeal = Appeal {
            id: uuid::Uuid::new_v4().to_string(),
            community_id: community_id.to_string(),
            username: username.to_string(),
            description: description.trim().to_string(),
            status: AppealStatus::Pending,
            created_at: crate::time::now_timestamp(),
            resolved_at: None,
            resolved_by: None,
        };
        appeals.insert(appeal.id.clone(), appeal.clone());

        tracing::info!(
            community_id,
            username,
            appeal_id = appeal.id.as_str(),
            "Appeal submitted"
        );
        Ok(appeal)
    }

    /// Approve or deny a pending appeal.
    ///
    /// Approval runs through the moderation processor on behalf of
    /// `moderator`; if that fails the appeal stays pending.
    pub async fn resolve(
        &self,
        appeal_id: &str,
        decision: AppealDecision,
        moderator: &str,
    ) -> Result<Appeal> {
        let appeal = self.get_appeal(appeal_id).ok_or(Error::AppealNotFound)?;
        if !appeal.is_pending() {
            return Err(Error::AppealAlreadyResolved);
        }
        let _claim = self.claim(appeal_id)?;

        let community = self
            .store
            .get(&appeal.community_id)
            .ok_or(Error::CommunityNotFound)?;
        if !community.is_privileged(moderator) {
            return Err(Error::Unauthorized("resolve appeals".into()));
        }

        if decision == AppealDecision::Approved {
            self.processor
                .execute(
                    &appeal.community_id,
                    Requester::user(moderator),
                    Directive::LiftSanction(appeal.username.clone()),
                )
                .await?;
        }

        let resolved = {
            let mut appeals = self.appeals.lock();
            let stored = appeals.get_mut(appeal_id).ok_or(Error::AppealNotFound)?;
            stored.status = decision.into();
            stored.resolved_at = Some(crate::time::now_timestamp());
            stored.resolved_by = Some(moderator.to_string());
            stored.clone()
        };

        tracing::info!(
            community_id = resolved.community_id.as_str(),
            appeal_id,
            moderator,
            decision = ?decision,
            "Appeal resolved"
        );

        let (title, outcome, kind) = match decision {
            AppealDecision::Approved => (
                "Appeal approved",
                "approved",
                NotificationKind::AppealApproved,
            ),
            AppealDecision::Denied => ("Appeal denied", "denied", NotificationKind::AppealDenied),
        };
        self.notifier.notify(Notification {
            target: resolved.username.clone(),
            title: title.into(),
            message: format!("Your appeal in {} was {}.", community.name, outcome),
            context_id: resolved.community_id.clone(),
            kind,
        });

        Ok(resolved)
    }

    pub fn get_appeal(&self, appeal_id: &str) -> Option<Appeal> {
        self.appeals.lock().get(appeal_id).cloned()
    }

    /// All appeals in a community, oldest first. Admin and moderators only.
    pub fn list_appeals(&self, community_id: &str, requester: &str) -> Result<Vec<Appeal>> {
        let community = self
            .store
            .get(community_id)
            .ok_or(Error::CommunityNotFound)?;
        if !community.is_privileged(requester) {
            return Err(Error::Unauthorized("view appeals".into()));
        }
        Ok(self.collect(|a| a.community_id == community_id))
    }

    /// Every appeal filed by `username`, oldest first.
    pub fn appeals_for(&self, username: &str) -> Vec<Appeal> {
        self.collect(|a| a.username == username)
    }

    fn collect(&self, filter: impl Fn(&Appeal) -> bool) -> Vec<Appeal> {
        let mut appeals: Vec<Appeal> = self
            .appeals
            .lock()
            .values()
            .filter(|a| filter(a))
            .cloned()
            .collect();
        appeals.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        appeals
    }

    fn claim(&self, appeal_id: &str) -> Result<ResolveClaim<'_>> {
        if !self.resolving.lock().insert(appeal_id.to_string()) {
            return Err(Error::AppealResolutionInProgress);
        }
        // Another resolver may have finished between the status read and the claim
        let claim = ResolveClaim {
            resolving: &self.resolving,
            appeal_id: appeal_id.to_string(),
        };
        match self.get_appeal(appeal_id) {
            Some(appeal) if appeal.is_pending() => Ok(claim),
            Some(_) => Err(Error::AppealAlreadyResolved),
            None => Err(Error::AppealNotFound),
        }
    }
}
