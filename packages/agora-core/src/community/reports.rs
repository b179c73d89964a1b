//! # Reports & Auto-Ban
//!
//! Members report other users; once enough open reports accumulate against
//! one user in one community, the aggregator bans them through the
//! moderation processor as the system requester.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::processor::ModerationProcessor;
use super::store::CommunityStore;
use super::transitions::Directive;
use super::types::{CommunityId, Requester};
use crate::collaborators::{Notification, NotificationKind, Notifier};
use crate::config::{validate_text, EngineConfig};
use crate::error::{Error, RejectionReason, Result};

/// What a report is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReportCategory {
    Spam,
    Harassment,
    HateSpeech,
    InappropriateContent,
    Misinformation,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReportStatus {
    Pending,
    Reviewed,
    Dismissed,
}

/// Terminal outcome chosen by a reviewing moderator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReportOutcome {
    Reviewed,
    Dismissed,
}

impl From<ReportOutcome> for ReportStatus {
    fn from(outcome: ReportOutcome) -> Self {
        match outcome {
            ReportOutcome::Reviewed => ReportStatus::Reviewed,
            ReportOutcome::Dismissed => ReportStatus::Dismissed,
        }
    }
}

/// A complaint by one member against another user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub id: String,
    pub community_id: CommunityId,
    pub reported_user: String,
    pub reporter_user: String,
    pub reason: String,
    pub category: ReportCategory,
    pub status: ReportStatus,
    /// Set once this report contributed to an automatic ban
    pub ban_applied: bool,
    pub created_at: i64,
}

impl Report {
    pub fn is_open(&self) -> bool {
        self.status == ReportStatus::Pending
    }

    /// Open and not yet counted towards an automatic ban.
    fn counts_towards_ban(&self, community_id: &str, reported_user: &str) -> bool {
        self.is_open()
            && !self.ban_applied
            && self.community_id == community_id
            && self.reported_user == reported_user
    }
}

/// Records reports and applies the auto-ban policy.
pub struct ReportAggregator {
    reports: Mutex<HashMap<String, Report>>,
    store: CommunityStore,
    processor: ModerationProcessor,
    notifier: Arc<dyn Notifier>,
    auto_ban_threshold: usize,
    max_reason_length: usize,
}

impl ReportAggregator {
    pub fn new(
        store: CommunityStore,
        processor: ModerationProcessor,
        notifier: Arc<dyn Notifier>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            reports: Mutex::new(HashMap::new()),
            store,
            processor,
            notifier,
            auto_ban_threshold: config.auto_ban_threshold,
            max_reason_length: config.max_report_reason_length,
        }
    }

    /// File a report and, if it tips the open count over the threshold, ban
    /// the reported user.
    pub async fn file_report(
        &self,
        community_id: &str,
        reporter: &str,
        reported: &str,
        reason: &str,
        category: ReportCategory,
    ) -> Result<Report> {
        validate_text("reason", reason, self.max_reason_length)?;
        if reporter == reported {
            return Err(Error::Rejected(RejectionReason::SelfActionNotAllowed));
        }

        let community = self
            .store
            .get(community_id)
            .ok_or(Error::CommunityNotFound)?;
        if !community.is_participant(reporter) {
            return Err(Error::Rejected(RejectionReason::RequesterNotMember));
        }

        let report = Report {
            id: uuid::Uuid::new_v4().to_string(),
            community_id: community_id.to_string(),
            reported_user: reported.to_string(),
            reporter_user: reporter.to_string(),
            reason: reason.trim().to_string(),
            category,
            status: ReportStatus::Pending,
            ban_applied: false,
            created_at: crate::time::now_timestamp(),
        };

        // Duplicate check, insert and count happen under one lock
        let triggering: Vec<String> = {
            let mut reports = self.reports.lock();
            let duplicate = reports.values().any(|r| {
                r.is_open()
                    && r.community_id == community_id
                    && r.reporter_user == reporter
                    && r.reported_user == reported
            });
            if duplicate {
                return Err(Error::DuplicateOpenReport);
            }
            reports.insert(report.id.clone(), report.clone());
            reports
                .values()
                .filter(|r| r.counts_towards_ban(community_id, reported))
                .map(|r| r.id.clone())
                .collect()
        };

        tracing::info!(
            community_id,
            reporter,
            reported,
            category = ?category,
            open_reports = triggering.len(),
            "Report filed"
        );

        if self.auto_ban_threshold == 0 || triggering.len() < self.auto_ban_threshold {
            return Ok(report);
        }

        match self
            .processor
            .execute(
                community_id,
                Requester::System,
                Directive::EnforceBan(reported.to_string()),
            )
            .await
        {
            Ok(execution) if execution.committed => {
                let snapshot = execution.snapshot;
                self.mark_ban_applied(&triggering);
                tracing::warn!(
                    community_id,
                    reported,
                    reports = triggering.len(),
                    version = snapshot.version,
                    "Auto-ban applied"
                );
                self.notifier.notify(Notification {
                    target: reported.to_string(),
                    title: "You have been banned".into(),
                    message: format!(
                        "You were automatically banned from {} after repeated reports.",
                        snapshot.name
                    ),
                    context_id: community_id.to_string(),
                    kind: NotificationKind::AutoBan,
                });
            }
            Ok(_) => {
                // Banned by someone else first; these reports did not cause it
                tracing::debug!(community_id, reported, "Auto-ban target already banned");
            }
            Err(e) => {
                // The report itself stands even if the ban is refused
                tracing::warn!(community_id, reported, error = %e, "Auto-ban not applied");
            }
        }

        Ok(self.get_report(&report.id).unwrap_or(report))
    }

    /// Close a pending report as reviewed or dismissed.
    pub fn review_report(
        &self,
        report_id: &str,
        moderator: &str,
        outcome: ReportOutcome,
    ) -> Result<Report> {
        let community_id = self
            .get_report(report_id)
            .ok_or(Error::ReportNotFound)?
            .community_id;
        let community = self
            .store
            .get(&community_id)
            .ok_or(Error::CommunityNotFound)?;
        if !community.is_privileged(moderator) {
            return Err(Error::Unauthorized("review reports".into()));
        }

        let mut reports = self.reports.lock();
        let report = reports.get_mut(report_id).ok_or(Error::ReportNotFound)?;
        if !report.is_open() {
            return Err(Error::ReportAlreadyClosed);
        }
        report.status = outcome.into();

        tracing::info!(
            community_id = community_id.as_str(),
            report_id,
            moderator,
            status = ?report.status,
            "Report reviewed"
        );
        Ok(report.clone())
    }

    pub fn get_report(&self, report_id: &str) -> Option<Report> {
        self.reports.lock().get(report_id).cloned()
    }

    /// All reports in a community, oldest first. Admin and moderators only.
    pub fn list_reports(&self, community_id: &str, requester: &str) -> Result<Vec<Report>> {
        let community = self
            .store
            .get(community_id)
            .ok_or(Error::CommunityNotFound)?;
        if !community.is_privileged(requester) {
            return Err(Error::Unauthorized("view reports".into()));
        }

        let mut reports: Vec<Report> = self
            .reports
            .lock()
            .values()
            .filter(|r| r.community_id == community_id)
            .cloned()
            .collect();
        reports.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(reports)
    }

    /// Number of open reports against `username` in a community.
    pub fn open_report_count(&self, community_id: &str, username: &str) -> usize {
        self.reports
            .lock()
            .values()
            .filter(|r| r.is_open() && r.community_id == community_id && r.reported_user == username)
            .count()
    }

    fn mark_ban_applied(&self, report_ids: &[String]) {
        let mut reports = self.reports.lock();
        for id in report_ids {
            if let Some(report) = reports.get_mut(id) {
                report.ban_applied = true;
            }
        }
    }
}
