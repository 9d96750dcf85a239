//! Sync orchestration: one parametrized driver for every managed list kind.
//!
//! The three kinds differ only in which directory records feed the identity
//! normalizer and which fixed list name/domain is targeted, so a single
//! [`Orchestrator`] resolves per-kind targets and drives provisioner and
//! engine in sequence per list. Per-list failures are contained (the run
//! proceeds to the next list), while a directory read failure aborts the
//! run, since no desired set can be computed without it.

use std::collections::HashSet;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::config::{AppConfig, ServerConfig};
use crate::directory::Directory;
use crate::engine::{self, ApplyReport};
use crate::errors::SyncError;
use crate::gateway::{ListGateway, MailmanClient};
use crate::identity::{email_key, IdentitySet};
use crate::provisioner::{ensure_list, ListBlueprint};

// ---------------------------------------------------------------------------
// Targets
// ---------------------------------------------------------------------------

/// Kind discriminator for a managed list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ListKind {
    Organization,
    Student,
    Personal,
}

impl std::fmt::Display for ListKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Organization => write!(f, "organization"),
            Self::Student => write!(f, "student"),
            Self::Personal => write!(f, "personal"),
        }
    }
}

/// A managed list materialized for one run.
#[derive(Debug, Clone)]
pub struct SyncTarget {
    pub server: ServerConfig,
    pub mail_host: String,
    pub list_name: String,
    pub kind: ListKind,
    /// Linked directory organization (organization kind only).
    pub organization: Option<i64>,
}

impl SyncTarget {
    pub fn fqdn(&self) -> String {
        format!("{}@{}", self.list_name, self.mail_host)
    }
}

/// Outcome of one list's reconciliation within a run.
#[derive(Debug)]
pub struct SyncOutcome {
    pub list: String,
    pub kind: ListKind,
    pub result: Result<ApplyReport, SyncError>,
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Drives provisioning and reconciliation for every managed list of a kind.
pub struct Orchestrator<D> {
    config: AppConfig,
    directory: D,
}

impl<D: Directory> Orchestrator<D> {
    pub fn new(config: AppConfig, directory: D) -> Self {
        Self { config, directory }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Materialize the managed lists of a kind from configuration.
    pub fn resolve_targets(&self, kind: ListKind) -> Vec<SyncTarget> {
        match kind {
            ListKind::Organization => self
                .config
                .organization_lists
                .iter()
                .filter(|list| list.enabled)
                .filter_map(|list| match self.config.server_by_url(&list.server) {
                    Some(server) if server.enabled => Some(SyncTarget {
                        server: server.clone(),
                        mail_host: list.domain.clone(),
                        list_name: list.name.clone(),
                        kind,
                        organization: Some(list.organization),
                    }),
                    _ => {
                        warn!(
                            list = %list.name,
                            server = %list.server,
                            "skipping list on unknown or disabled server"
                        );
                        None
                    }
                })
                .collect(),
            ListKind::Student => self
                .domain_targets(kind, &self.config.lists.student_list, |server| {
                    server.student_domain.clone()
                }),
            ListKind::Personal => self
                .domain_targets(kind, &self.config.lists.personal_list, |server| {
                    server.personal_domain.clone()
                }),
        }
    }

    fn domain_targets(
        &self,
        kind: ListKind,
        list_name: &str,
        domain_of: impl Fn(&ServerConfig) -> Option<String>,
    ) -> Vec<SyncTarget> {
        self.config
            .servers
            .iter()
            .filter(|server| server.enabled)
            .filter_map(|server| {
                domain_of(server).map(|mail_host| SyncTarget {
                    server: server.clone(),
                    mail_host,
                    list_name: list_name.to_string(),
                    kind,
                    organization: None,
                })
            })
            .collect()
    }

    /// Reconcile every managed list of a kind.
    ///
    /// Per-list errors are logged and contained; a directory read failure
    /// aborts the run and is surfaced to the caller.
    pub async fn sync_kind(
        &self,
        kind: ListKind,
        dry_run: bool,
    ) -> Result<Vec<SyncOutcome>, SyncError> {
        let targets = self.resolve_targets(kind);
        info!(kind = %kind, targets = targets.len(), dry_run, "starting sync run");

        let mut outcomes = Vec::with_capacity(targets.len());
        for target in targets {
            info!(list = %target.fqdn(), "updating mailing list");
            let result = self.sync_with_server(&target, dry_run).await;
            match result {
                Err(err @ SyncError::Directory(_)) => {
                    error!(list = %target.fqdn(), error = %err, "directory read failed, aborting run");
                    return Err(err);
                }
                Err(err) => {
                    error!(list = %target.fqdn(), error = %err, "list sync failed");
                    outcomes.push(SyncOutcome {
                        list: target.fqdn(),
                        kind,
                        result: Err(err),
                    });
                }
                Ok(report) => {
                    info!(
                        list = %target.fqdn(),
                        subscribed = report.subscribed.len(),
                        unsubscribed = report.unsubscribed.len(),
                        moderators_added = report.moderators_added.len(),
                        moderators_removed = report.moderators_removed.len(),
                        failures = report.failures.len(),
                        dry_run = report.dry_run,
                        "list reconciled"
                    );
                    outcomes.push(SyncOutcome {
                        list: target.fqdn(),
                        kind,
                        result: Ok(report),
                    });
                }
            }
        }
        Ok(outcomes)
    }

    /// Reconcile all kinds in sequence.
    pub async fn sync_all(&self, dry_run: bool) -> Result<Vec<SyncOutcome>, SyncError> {
        let mut outcomes = Vec::new();
        for kind in [ListKind::Organization, ListKind::Student, ListKind::Personal] {
            outcomes.extend(self.sync_kind(kind, dry_run).await?);
        }
        Ok(outcomes)
    }

    async fn sync_with_server(
        &self,
        target: &SyncTarget,
        dry_run: bool,
    ) -> Result<ApplyReport, SyncError> {
        let password =
            target
                .server
                .password
                .clone()
                .ok_or_else(|| SyncError::MissingCredentials {
                    server: target.server.url.clone(),
                })?;
        let gateway = MailmanClient::new(
            &target.server.url,
            &target.server.username,
            password,
            self.config.daemon.http_timeout(),
        );
        self.sync_target(&gateway, target, dry_run).await
    }

    /// Provision one list, snapshot its remote state, compute and apply the
    /// convergence plan.
    pub async fn sync_target<G: ListGateway + ?Sized>(
        &self,
        gateway: &G,
        target: &SyncTarget,
        dry_run: bool,
    ) -> Result<ApplyReport, SyncError> {
        let desired = self.desired_state(target).await?;

        let blueprint = ListBlueprint {
            mail_host: &target.mail_host,
            list_name: &target.list_name,
            style: &self.config.lists.style,
            display_name: &desired.display_name,
            description: &desired.description,
            settings: &self.config.lists.settings,
        };
        let provisioned = ensure_list(gateway, &blueprint, &target.server.url, dry_run).await?;

        let (current_members, current_moderators) = if provisioned.pending_create {
            // Absent list: diff against an empty roster.
            (HashSet::new(), HashSet::new())
        } else {
            let members = engine::member_emails(&gateway.list_members(&provisioned.handle).await?);
            let moderators = if desired.moderators.is_some() {
                engine::moderator_emails(&gateway.list_moderators(&provisioned.handle).await?)
            } else {
                HashSet::new()
            };
            (members, moderators)
        };

        // Kinds without a desired moderator set leave the remote roster alone.
        let desired_moderators = desired.moderators.unwrap_or_else(|| current_moderators.clone());

        let plan = engine::compute_plan(
            &desired.members,
            &current_members,
            &current_moderators,
            &desired_moderators,
        );
        debug!(
            list = %provisioned.handle.fqdn_listname,
            changes = plan.change_count(),
            "computed convergence plan"
        );

        Ok(engine::apply_plan(gateway, &provisioned.handle, &plan, dry_run).await)
    }

    async fn desired_state(&self, target: &SyncTarget) -> Result<DesiredState, SyncError> {
        match target.kind {
            ListKind::Organization => {
                let org_id =
                    target
                        .organization
                        .ok_or_else(|| SyncError::MissingOrganization {
                            list: target.fqdn(),
                        })?;
                let org = self.directory.organization(org_id).await?;
                let members = self.directory.organization_members(org_id).await?;
                let moderators = self.directory.organization_moderators(org_id).await?;
                let moderator_set: HashSet<String> = moderators
                    .iter()
                    .filter_map(|person| person.email.as_deref())
                    .filter(|email| !email.trim().is_empty())
                    .map(email_key)
                    .collect();
                Ok(DesiredState {
                    members: IdentitySet::from_persons(&members),
                    moderators: Some(moderator_set),
                    description: format!("Automatically managed list for {}", org.name),
                    display_name: org.name,
                })
            }
            ListKind::Student => {
                let students = self.directory.students().await?;
                Ok(DesiredState {
                    members: IdentitySet::from_students(&students),
                    moderators: None,
                    display_name: "Students".into(),
                    description: "Automatically managed list for students".into(),
                })
            }
            ListKind::Personal => {
                let employees = self.directory.employees().await?;
                Ok(DesiredState {
                    members: IdentitySet::from_persons(&employees),
                    moderators: None,
                    display_name: "Personal".into(),
                    description: "Automatically managed list for personal".into(),
                })
            }
        }
    }
}

/// Desired membership and presentation for one list, derived from the
/// directory. `moderators` is `None` for kinds whose moderator roster is
/// not managed.
struct DesiredState {
    members: IdentitySet,
    moderators: Option<HashSet<String>>,
    display_name: String,
    description: String,
}
