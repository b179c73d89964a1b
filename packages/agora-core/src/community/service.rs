//! # Community Service
//!
//! Command surface for the governance engine. Wires the store, processor,
//! report aggregator, appeal workflow and dispatcher together around one
//! injected message bus.

use std::sync::Arc;

use super::appeals::{Appeal, AppealDecision, AppealWorkflow};
use super::broadcast::BroadcastDispatcher;
use super::processor::{validate_description, CommunityChanges, ModerationProcessor};
use super::reports::{Report, ReportAggregator, ReportCategory, ReportOutcome};
use super::store::CommunityStore;
use super::transitions::ModerationAction;
use super::types::{Community, CommunitySnapshot, Requester, Visibility};
use crate::bus::{Channel, MessageBus, Subscription};
use crate::collaborators::{Notifier, UserDirectory};
use crate::config::{validate_text, EngineConfig, MAX_COMMUNITY_NAME_LENGTH};
use crate::error::{Error, Result};

/// The governance engine.
///
/// Every mutation of an existing community is routed through the
/// per-community mailboxes of [`ModerationProcessor`]; reads return shared
/// snapshots.
pub struct CommunityService {
    config: EngineConfig,
    store: CommunityStore,
    bus: Arc<dyn MessageBus>,
    dispatcher: BroadcastDispatcher,
    directory: Arc<dyn UserDirectory>,
    processor: ModerationProcessor,
    reports: ReportAggregator,
    appeals: AppealWorkflow,
}

impl CommunityService {
    pub fn new(
        config: EngineConfig,
        bus: Arc<dyn MessageBus>,
        notifier: Arc<dyn Notifier>,
        directory: Arc<dyn UserDirectory>,
    ) -> Self {
        let store = CommunityStore::new();
        let dispatcher = BroadcastDispatcher::new(bus.clone());
        let processor = ModerationProcessor::new(
            store.clone(),
            dispatcher.clone(),
            directory.clone(),
            config.mailbox_capacity,
        );
        let reports =
            ReportAggregator::new(store.clone(), processor.clone(), notifier.clone(), &config);
        let appeals = AppealWorkflow::new(store.clone(), processor.clone(), notifier, &config);

        Self {
            config,
            store,
            bus,
            dispatcher,
            directory,
            processor,
            reports,
            appeals,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // ========================================================================
    // LIFECYCLE
    // ========================================================================

    /// Create a community owned by `admin` and broadcast `created`.
    pub fn create_community(
        &self,
        admin: &str,
        name: &str,
        description: &str,
        visibility: Visibility,
    ) -> Result<CommunitySnapshot> {
        if admin.trim().is_empty() {
            return Err(Error::InvalidInput("admin is required".into()));
        }
        validate_text("name", name, MAX_COMMUNITY_NAME_LENGTH)?;
        validate_description(description)?;

        let mut community = Community::new(
            uuid::Uuid::new_v4().to_string(),
            name.trim(),
            description,
            visibility,
            admin,
            crate::time::now_timestamp(),
        );
        community.recount(|username| self.directory.is_premium(username));

        let snapshot = self.store.insert(community)?;
        self.dispatcher.created(snapshot.clone());

        tracing::info!(
            community_id = snapshot.id.as_str(),
            admin,
            name = snapshot.name.as_str(),
            "Community created"
        );
        Ok(snapshot)
    }

    /// Edit name, description or visibility. Admin only.
    pub async fn update_community(
        &self,
        community_id: &str,
        requester: &str,
        changes: CommunityChanges,
    ) -> Result<CommunitySnapshot> {
        self.processor.update(community_id, requester, changes).await
    }

    /// Delete a community. Admin only. Returns the tombstone snapshot.
    pub async fn delete_community(
        &self,
        community_id: &str,
        requester: &str,
    ) -> Result<CommunitySnapshot> {
        self.processor.delete(community_id, requester).await
    }

    pub fn get_community(&self, community_id: &str) -> Result<CommunitySnapshot> {
        self.store.get(community_id).ok_or(Error::CommunityNotFound)
    }

    /// Public communities plus private ones `viewer` belongs to.
    pub fn list_communities(&self, viewer: Option<&str>) -> Vec<CommunitySnapshot> {
        self.store
            .list()
            .into_iter()
            .filter(|c| c.is_visible_to(viewer))
            .collect()
    }

    pub fn community_count(&self) -> usize {
        self.store.len()
    }

    // ========================================================================
    // MEMBERSHIP
    // ========================================================================

    pub async fn join_community(
        &self,
        community_id: &str,
        username: &str,
    ) -> Result<CommunitySnapshot> {
        self.processor.join(community_id, username).await
    }

    pub async fn leave_community(
        &self,
        community_id: &str,
        username: &str,
    ) -> Result<CommunitySnapshot> {
        self.processor.leave(community_id, username).await
    }

    /// Whether `username` may post or comment in the community.
    pub fn can_post(&self, community_id: &str, username: &str) -> Result<bool> {
        Ok(self.get_community(community_id)?.can_post(username))
    }

    // ========================================================================
    // MODERATION
    // ========================================================================

    pub async fn toggle_moderator(
        &self,
        community_id: &str,
        admin: &str,
        target: &str,
    ) -> Result<CommunitySnapshot> {
        self.processor
            .perform(
                community_id,
                Requester::user(admin),
                ModerationAction::ToggleModerator(target.to_string()),
            )
            .await
    }

    pub async fn toggle_ban(
        &self,
        community_id: &str,
        requester: &str,
        target: &str,
    ) -> Result<CommunitySnapshot> {
        self.processor
            .perform(
                community_id,
                Requester::user(requester),
                ModerationAction::ToggleBan(target.to_string()),
            )
            .await
    }

    pub async fn toggle_mute(
        &self,
        community_id: &str,
        requester: &str,
        target: &str,
    ) -> Result<CommunitySnapshot> {
        self.processor
            .perform(
                community_id,
                Requester::user(requester),
                ModerationAction::ToggleMute(target.to_string()),
            )
            .await
    }

    /// Run an arbitrary toggle on behalf of `requester`.
    pub async fn perform(
        &self,
        community_id: &str,
        requester: &str,
        action: ModerationAction,
    ) -> Result<CommunitySnapshot> {
        self.processor
            .perform(community_id, Requester::user(requester), action)
            .await
    }

    // ========================================================================
    // APPEALS
    // ========================================================================

    pub fn submit_appeal(
        &self,
        community_id: &str,
        username: &str,
        description: &str,
    ) -> Result<Appeal> {
        self.appeals.submit(community_id, username, description)
    }

    pub async fn resolve_appeal(
        &self,
        appeal_id: &str,
        decision: AppealDecision,
        moderator: &str,
    ) -> Result<Appeal> {
        self.appeals.resolve(appeal_id, decision, moderator).await
    }

    pub fn get_appeal(&self, appeal_id: &str) -> Result<Appeal> {
        self.appeals
            .get_appeal(appeal_id)
            .ok_or(Error::AppealNotFound)
    }

    pub fn list_appeals(&self, community_id: &str, requester: &str) -> Result<Vec<Appeal>> {
        self.appeals.list_appeals(community_id, requester)
    }

    pub fn appeals_for(&self, username: &str) -> Vec<Appeal> {
        self.appeals.appeals_for(username)
    }

    // ========================================================================
    // REPORTS
    // ========================================================================

    pub async fn file_report(
        &self,
        community_id: &str,
        reporter: &str,
        reported: &str,
        reason: &str,
        category: ReportCategory,
    ) -> Result<Report> {
        self.reports
            .file_report(community_id, reporter, reported, reason, category)
            .await
    }

    pub fn review_report(
        &self,
        report_id: &str,
        moderator: &str,
        outcome: ReportOutcome,
    ) -> Result<Report> {
        self.reports.review_report(report_id, moderator, outcome)
    }

    pub fn get_report(&self, report_id: &str) -> Result<Report> {
        self.reports
            .get_report(report_id)
            .ok_or(Error::ReportNotFound)
    }

    pub fn list_reports(&self, community_id: &str, requester: &str) -> Result<Vec<Report>> {
        self.reports.list_reports(community_id, requester)
    }

    // ========================================================================
    // SUBSCRIPTIONS
    // ========================================================================

    /// Subscribe to a channel on the engine's bus.
    pub fn subscribe(&self, channel: &Channel) -> Subscription {
        self.bus.subscribe(channel)
    }

    pub fn bus(&self) -> &Arc<dyn MessageBus> {
        &self.bus
    }

    /// Number of communities with a live mailbox.
    pub fn active_mailboxes(&self) -> usize {
        self.processor.mailbox_count()
    }
}
