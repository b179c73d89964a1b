//! # Moderation Action Processor
//!
//! Authorizes and executes every mutation of an existing community. Each
//! community gets its own mailbox: a task that owns the community's entry in
//! the store and runs commands one at a time in arrival order.
//!
//! ```text
//!   caller ──Envelope{command, reply}──► mailbox(c1) ──► authorize
//!                                            │              │
//!                                            │           resolve + apply
//!                                            │              │
//!                                            │           store.commit ──► dispatcher
//!   caller ◄────────── oneshot reply ────────┘
//! ```
//!
//! Mailboxes are spawned lazily on the first command for a community and
//! shut down when the community is deleted. Commands for different
//! communities never wait on each other.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};

use super::broadcast::BroadcastDispatcher;
use super::store::CommunityStore;
use super::transitions::{self, Directive, ModerationAction};
use super::types::{Community, CommunityId, CommunitySnapshot, Requester, Visibility};
use crate::collaborators::UserDirectory;
use crate::config::{validate_text, MAX_COMMUNITY_DESCRIPTION_LENGTH, MAX_COMMUNITY_NAME_LENGTH};
use crate::error::{Error, RejectionReason, Result};

/// Editable community metadata. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommunityChanges {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub visibility: Option<Visibility>,
}

impl CommunityChanges {
    pub fn validate(&self) -> Result<()> {
        if let Some(name) = &self.name {
            validate_text("name", name, MAX_COMMUNITY_NAME_LENGTH)?;
        }
        if let Some(description) = &self.description {
            validate_description(description)?;
        }
        Ok(())
    }

    fn apply_to(self, community: &mut Community) {
        if let Some(name) = self.name {
            community.name = name.trim().to_string();
        }
        if let Some(description) = self.description {
            community.description = description;
        }
        if let Some(visibility) = self.visibility {
            community.visibility = visibility;
        }
    }
}

/// Descriptions may be empty but are bounded.
pub(crate) fn validate_description(description: &str) -> Result<()> {
    if description.chars().count() > MAX_COMMUNITY_DESCRIPTION_LENGTH {
        return Err(Error::InvalidInput(format!(
            "description must be at most {} characters",
            MAX_COMMUNITY_DESCRIPTION_LENGTH
        )));
    }
    Ok(())
}

/// Commands executed inside a community's mailbox.
#[derive(Debug)]
enum Command {
    Moderate {
        requester: Requester,
        directive: Directive,
    },
    Join(String),
    Leave(String),
    Update {
        requester: String,
        changes: CommunityChanges,
    },
    Delete {
        requester: String,
    },
}

struct Envelope {
    command: Command,
    reply: oneshot::Sender<Result<Execution>>,
}

/// Outcome of a command run inside a mailbox.
#[derive(Debug, Clone)]
pub struct Execution {
    pub snapshot: CommunitySnapshot,
    /// False when the directive was already satisfied and nothing was
    /// committed or broadcast.
    pub committed: bool,
}

impl Execution {
    fn committed(snapshot: CommunitySnapshot) -> Self {
        Self {
            snapshot,
            committed: true,
        }
    }

    fn unchanged(snapshot: CommunitySnapshot) -> Self {
        Self {
            snapshot,
            committed: false,
        }
    }
}

type Mailboxes = Mutex<HashMap<CommunityId, mpsc::Sender<Envelope>>>;

/// State shared between the processor handle and every mailbox task.
struct Shared {
    store: CommunityStore,
    dispatcher: BroadcastDispatcher,
    directory: Arc<dyn UserDirectory>,
    mailboxes: Mailboxes,
}

/// Handle to the per-community mailboxes. Cheap to clone.
#[derive(Clone)]
pub struct ModerationProcessor {
    shared: Arc<Shared>,
    mailbox_capacity: usize,
}

impl ModerationProcessor {
    pub fn new(
        store: CommunityStore,
        dispatcher: BroadcastDispatcher,
        directory: Arc<dyn UserDirectory>,
        mailbox_capacity: usize,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                store,
                dispatcher,
                directory,
                mailboxes: Mutex::new(HashMap::new()),
            }),
            mailbox_capacity: mailbox_capacity.max(1),
        }
    }

    /// Run a toggle on behalf of `requester`.
    pub async fn perform(
        &self,
        community_id: &str,
        requester: Requester,
        action: ModerationAction,
    ) -> Result<CommunitySnapshot> {
        let execution = self
            .execute(community_id, requester, Directive::Toggle(action))
            .await?;
        Ok(execution.snapshot)
    }

    /// Run a directive that is resolved against live state inside the
    /// mailbox. A directive that is already satisfied returns the current
    /// snapshot with `committed == false`.
    pub async fn execute(
        &self,
        community_id: &str,
        requester: Requester,
        directive: Directive,
    ) -> Result<Execution> {
        self.submit(
            community_id,
            Command::Moderate {
                requester,
                directive,
            },
        )
        .await
    }

    pub async fn join(&self, community_id: &str, username: &str) -> Result<CommunitySnapshot> {
        self.submit(community_id, Command::Join(username.to_string()))
            .await
            .map(|execution| execution.snapshot)
    }

    pub async fn leave(&self, community_id: &str, username: &str) -> Result<CommunitySnapshot> {
        self.submit(community_id, Command::Leave(username.to_string()))
            .await
            .map(|execution| execution.snapshot)
    }

    pub async fn update(
        &self,
        community_id: &str,
        requester: &str,
        changes: CommunityChanges,
    ) -> Result<CommunitySnapshot> {
        changes.validate()?;
        self.submit(
            community_id,
            Command::Update {
                requester: requester.to_string(),
                changes,
            },
        )
        .await
        .map(|execution| execution.snapshot)
    }

    /// Delete a community. Returns the tombstone snapshot that was broadcast.
    pub async fn delete(&self, community_id: &str, requester: &str) -> Result<CommunitySnapshot> {
        self.submit(
            community_id,
            Command::Delete {
                requester: requester.to_string(),
            },
        )
        .await
        .map(|execution| execution.snapshot)
    }

    /// Number of live mailboxes.
    pub fn mailbox_count(&self) -> usize {
        self.shared.mailboxes.lock().len()
    }

    async fn submit(&self, community_id: &str, command: Command) -> Result<Execution> {
        let mailbox = self.mailbox(community_id)?;
        let (reply, response) = oneshot::channel();

        mailbox
            .send(Envelope { command, reply })
            .await
            .map_err(|_| Error::CommunityNotFound)?;

        match response.await {
            Ok(result) => result,
            // Mailbox task died without answering
            Err(_) => Err(Error::ProcessorUnavailable),
        }
    }

    fn mailbox(&self, community_id: &str) -> Result<mpsc::Sender<Envelope>> {
        let mut mailboxes = self.shared.mailboxes.lock();
        if let Some(sender) = mailboxes.get(community_id) {
            if !sender.is_closed() {
                return Ok(sender.clone());
            }
        }

        if self.shared.store.get(community_id).is_none() {
            return Err(Error::CommunityNotFound);
        }

        let (sender, receiver) = mpsc::channel(self.mailbox_capacity);
        mailboxes.insert(community_id.to_string(), sender.clone());
        tokio::spawn(run_mailbox(
            self.shared.clone(),
            community_id.to_string(),
            receiver,
        ));
        Ok(sender)
    }
}

/// Mailbox loop for one community.
async fn run_mailbox(
    shared: Arc<Shared>,
    community_id: CommunityId,
    mut receiver: mpsc::Receiver<Envelope>,
) {
    tracing::debug!(community_id = community_id.as_str(), "Mailbox started");

    while let Some(Envelope { command, reply }) = receiver.recv().await {
        let is_delete = matches!(command, Command::Delete { .. });
        let result = shared.run(&community_id, command);
        let deleted = is_delete && result.is_ok();
        let _ = reply.send(result);
        if deleted {
            break;
        }
    }

    shared.mailboxes.lock().remove(&community_id);
    receiver.close();
    while let Some(envelope) = receiver.recv().await {
        let _ = envelope.reply.send(Err(Error::CommunityNotFound));
    }

    tracing::debug!(community_id = community_id.as_str(), "Mailbox stopped");
}

impl Shared {
    fn run(&self, community_id: &str, command: Command) -> Result<Execution> {
        let current = self
            .store
            .get(community_id)
            .ok_or(Error::CommunityNotFound)?;

        match command {
            Command::Moderate {
                requester,
                directive,
            } => self.moderate(&current, &requester, &directive),
            Command::Join(username) => {
                let next = transitions::join(&current, &username)?;
                let snapshot = self.commit(&current, next)?;
                tracing::info!(
                    community_id,
                    username = username.as_str(),
                    version = snapshot.version,
                    "Member joined"
                );
                Ok(Execution::committed(snapshot))
            }
            Command::Leave(username) => {
                let next = transitions::leave(&current, &username)?;
                let snapshot = self.commit(&current, next)?;
                tracing::info!(
                    community_id,
                    username = username.as_str(),
                    version = snapshot.version,
                    "Member left"
                );
                Ok(Execution::committed(snapshot))
            }
            Command::Update { requester, changes } => {
                if !current.is_admin(&requester) {
                    return Err(Error::Unauthorized("edit this community".into()));
                }
                let mut next = (*current).clone();
                changes.apply_to(&mut next);
                self.commit(&current, next).map(Execution::committed)
            }
            Command::Delete { requester } => {
                self.delete(&current, &requester).map(Execution::committed)
            }
        }
    }

    fn moderate(
        &self,
        current: &CommunitySnapshot,
        requester: &Requester,
        directive: &Directive,
    ) -> Result<Execution> {
        authorize(current, requester, directive)?;

        let Some(action) = transitions::resolve(current, directive) else {
            tracing::debug!(
                community_id = current.id.as_str(),
                target = directive.target(),
                "Directive already satisfied"
            );
            return Ok(Execution::unchanged(current.clone()));
        };

        let next = transitions::apply(current, &action).map_err(|reason| {
            tracing::info!(
                community_id = current.id.as_str(),
                requester = %requester,
                target = action.target(),
                %reason,
                "Moderation action rejected"
            );
            Error::Rejected(reason)
        })?;

        let snapshot = self.commit(current, next)?;
        tracing::info!(
            community_id = current.id.as_str(),
            requester = %requester,
            action = ?action,
            version = snapshot.version,
            "Moderation action committed"
        );
        Ok(Execution::committed(snapshot))
    }

    fn delete(&self, current: &CommunitySnapshot, requester: &str) -> Result<CommunitySnapshot> {
        if !current.is_admin(requester) {
            return Err(Error::Unauthorized("delete this community".into()));
        }

        let tombstone = self.store.commit(
            (**current).clone(),
            current.version,
            crate::time::now_timestamp(),
        )?;
        self.store.remove(&current.id);
        self.dispatcher.deleted(tombstone.clone());

        tracing::info!(
            community_id = current.id.as_str(),
            version = tombstone.version,
            "Community deleted"
        );
        Ok(tombstone)
    }

    /// Recount, commit and broadcast `updated`.
    fn commit(&self, current: &CommunitySnapshot, mut next: Community) -> Result<CommunitySnapshot> {
        next.recount(|username| self.directory.is_premium(username));
        let snapshot = self
            .store
            .commit(next, current.version, crate::time::now_timestamp())?;
        self.dispatcher.updated(snapshot.clone());
        Ok(snapshot)
    }
}

/// Authorization matrix.
///
/// Toggling moderators is admin only. Bans, mutes and lifting a sanction are
/// open to the admin and moderators. The system requester may only enforce a
/// ban. Users may never target themselves.
fn authorize(community: &Community, requester: &Requester, directive: &Directive) -> Result<()> {
    let (describe, admin_only) = match directive {
        Directive::Toggle(action) => (action.describe(), action.requires_admin()),
        Directive::LiftSanction(_) => ("lift sanctions", false),
        Directive::EnforceBan(_) => ("ban or unban members", false),
    };

    match requester {
        Requester::System => match directive {
            Directive::EnforceBan(_) => Ok(()),
            _ => Err(Error::Unauthorized(describe.into())),
        },
        Requester::User(username) => {
            let allowed = if admin_only {
                community.is_admin(username)
            } else {
                community.is_privileged(username)
            };
            if !allowed {
                return Err(Error::Unauthorized(describe.into()));
            }
            if username == directive.target() {
                return Err(Error::Rejected(RejectionReason::SelfActionNotAllowed));
            }
            Ok(())
        }
    }
}
