//! Membership reconciliation engine.
//!
//! [`compute_plan`] diffs the desired identity set against the remote
//! snapshot with pure set difference on normalized email keys; the same two
//! snapshots always yield the same plan, and applying it converges the
//! remote state to exactly the desired set in one pass.
//!
//! [`apply_plan`] executes a plan best-effort: subscribes before
//! unsubscribes and moderator adds before removes, each item attempted
//! independently. Failures are recorded in the [`ApplyReport`] without
//! aborting the remaining items; the next scheduled run re-diffs against the
//! (now partially updated) remote state and completes the remainder, so no
//! transaction or checkpoint mechanism is needed. In dry-run mode no
//! mutating gateway call is issued and the report records what would have
//! happened, identical in shape to a live run.

use std::collections::HashSet;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, warn};

use crate::errors::{GatewayError, PlanOperation, RemoteOperationError};
use crate::gateway::{ListGateway, ListHandle, RemoteMember, RemoteModerator};
use crate::identity::{email_key, Identity, IdentitySet};

// ---------------------------------------------------------------------------
// Roster projection
// ---------------------------------------------------------------------------

/// Project a member roster into the set of normalized email keys.
/// Entries with an empty email are tolerated and excluded.
pub fn member_emails(members: &[RemoteMember]) -> HashSet<String> {
    members
        .iter()
        .filter(|m| !m.email.trim().is_empty())
        .map(|m| email_key(&m.email))
        .collect()
}

/// Project a moderator roster into the set of normalized email keys.
pub fn moderator_emails(moderators: &[RemoteModerator]) -> HashSet<String> {
    moderators
        .iter()
        .filter(|m| !m.email.trim().is_empty())
        .map(|m| email_key(&m.email))
        .collect()
}

// ---------------------------------------------------------------------------
// Convergence plan
// ---------------------------------------------------------------------------

/// The minimal operation set that transforms current remote state into the
/// desired state. Ephemeral; exists only for one reconciliation call.
///
/// The subscribe and unsubscribe sets are disjoint by construction, as are
/// the moderator add and remove sets. All lists are sorted by normalized
/// email, making the plan deterministic.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ConvergencePlan {
    /// Identities to subscribe (with originally-cased email and display name).
    pub subscribe: Vec<Identity>,
    /// Normalized emails to unsubscribe.
    pub unsubscribe: Vec<String>,
    /// Normalized emails to promote to moderator.
    pub add_moderators: Vec<String>,
    /// Normalized emails to demote.
    pub remove_moderators: Vec<String>,
}

impl ConvergencePlan {
    pub fn is_empty(&self) -> bool {
        self.subscribe.is_empty()
            && self.unsubscribe.is_empty()
            && self.add_moderators.is_empty()
            && self.remove_moderators.is_empty()
    }

    pub fn change_count(&self) -> usize {
        self.subscribe.len()
            + self.unsubscribe.len()
            + self.add_moderators.len()
            + self.remove_moderators.len()
    }
}

/// Compute the convergence plan for one list.
///
/// Member plan: `subscribe = desired − current`, `unsubscribe = current −
/// desired`. Moderator plan: `add = desired_moderators −
/// current_moderators`, `remove = current_moderators − desired_moderators`.
/// All inputs are compared on the normalized (lower-case) email key.
pub fn compute_plan(
    desired: &IdentitySet,
    current_members: &HashSet<String>,
    current_moderators: &HashSet<String>,
    desired_moderators: &HashSet<String>,
) -> ConvergencePlan {
    let desired_emails = desired.emails();

    let mut subscribe: Vec<Identity> = desired
        .iter()
        .filter(|identity| !current_members.contains(&identity.key()))
        .cloned()
        .collect();
    subscribe.sort_by_key(|identity| identity.key());

    let mut unsubscribe: Vec<String> = current_members
        .difference(&desired_emails)
        .cloned()
        .collect();
    unsubscribe.sort();

    let mut add_moderators: Vec<String> = desired_moderators
        .difference(current_moderators)
        .cloned()
        .collect();
    add_moderators.sort();

    let mut remove_moderators: Vec<String> = current_moderators
        .difference(desired_moderators)
        .cloned()
        .collect();
    remove_moderators.sort();

    ConvergencePlan {
        subscribe,
        unsubscribe,
        add_moderators,
        remove_moderators,
    }
}

// ---------------------------------------------------------------------------
// Apply report
// ---------------------------------------------------------------------------

/// What one apply pass did, or, in dry-run mode, what it would have done.
#[derive(Debug, Clone, Serialize)]
pub struct ApplyReport {
    /// Fully-qualified list name.
    pub list: String,
    pub dry_run: bool,
    pub subscribed: Vec<String>,
    pub unsubscribed: Vec<String>,
    pub moderators_added: Vec<String>,
    pub moderators_removed: Vec<String>,
    /// Per-item failures; the remaining plan items were still attempted.
    pub failures: Vec<RemoteOperationError>,
    pub started_at: String,
    pub completed_at: Option<String>,
}

impl ApplyReport {
    fn new(list: &str, dry_run: bool) -> Self {
        Self {
            list: list.to_string(),
            dry_run,
            subscribed: Vec::new(),
            unsubscribed: Vec::new(),
            moderators_added: Vec::new(),
            moderators_removed: Vec::new(),
            failures: Vec::new(),
            started_at: Utc::now().to_rfc3339(),
            completed_at: None,
        }
    }

    /// Total intended changes, successful or failed.
    pub fn change_count(&self) -> usize {
        self.subscribed.len()
            + self.unsubscribed.len()
            + self.moderators_added.len()
            + self.moderators_removed.len()
            + self.failures.len()
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    fn record_failure(&mut self, email: String, operation: PlanOperation, cause: &GatewayError) {
        let failure = RemoteOperationError {
            email,
            operation,
            cause: cause.to_string(),
        };
        warn!(error = %failure, list = %self.list, "remote operation failed");
        self.failures.push(failure);
    }
}

// ---------------------------------------------------------------------------
// Apply
// ---------------------------------------------------------------------------

/// Execute a convergence plan against a list through the gateway.
///
/// Subscribes run before unsubscribes and moderator adds before removes:
/// membership is a prerequisite the remote server may require before
/// moderator promotion. Each item is attempted independently.
pub async fn apply_plan<G: ListGateway + ?Sized>(
    gateway: &G,
    list: &ListHandle,
    plan: &ConvergencePlan,
    dry_run: bool,
) -> ApplyReport {
    let mut report = ApplyReport::new(&list.fqdn_listname, dry_run);

    for identity in &plan.subscribe {
        debug!(email = %identity.email, list = %list.fqdn_listname, "subscribing");
        if dry_run {
            report.subscribed.push(identity.key());
            continue;
        }
        match gateway
            .subscribe(list, &identity.email, identity.display_name.as_deref())
            .await
        {
            Ok(()) => report.subscribed.push(identity.key()),
            Err(cause) => report.record_failure(identity.key(), PlanOperation::Subscribe, &cause),
        }
    }

    for email in &plan.unsubscribe {
        debug!(email = %email, list = %list.fqdn_listname, "unsubscribing");
        if dry_run {
            report.unsubscribed.push(email.clone());
            continue;
        }
        match gateway.unsubscribe(list, email).await {
            Ok(()) => report.unsubscribed.push(email.clone()),
            Err(cause) => report.record_failure(email.clone(), PlanOperation::Unsubscribe, &cause),
        }
    }

    for email in &plan.add_moderators {
        debug!(email = %email, list = %list.fqdn_listname, "adding moderator");
        if dry_run {
            report.moderators_added.push(email.clone());
            continue;
        }
        match gateway.add_moderator(list, email).await {
            Ok(()) => report.moderators_added.push(email.clone()),
            Err(cause) => report.record_failure(email.clone(), PlanOperation::AddModerator, &cause),
        }
    }

    for email in &plan.remove_moderators {
        debug!(email = %email, list = %list.fqdn_listname, "removing moderator");
        if dry_run {
            report.moderators_removed.push(email.clone());
            continue;
        }
        match gateway.remove_moderator(list, email).await {
            Ok(()) => report.moderators_removed.push(email.clone()),
            Err(cause) => {
                report.record_failure(email.clone(), PlanOperation::RemoveModerator, &cause)
            }
        }
    }

    report.completed_at = Some(Utc::now().to_rfc3339());
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Identity;

    fn identity_set(emails: &[&str]) -> IdentitySet {
        let mut set = IdentitySet::new();
        for email in emails {
            set.insert(Identity::new(*email, None).unwrap());
        }
        set
    }

    fn email_set(emails: &[&str]) -> HashSet<String> {
        emails.iter().map(|e| e.to_string()).collect()
    }

    #[test]
    fn test_member_plan_is_set_difference() {
        let desired = identity_set(&["a@x.org", "b@x.org"]);
        let current = email_set(&["b@x.org", "c@x.org"]);
        let none = HashSet::new();

        let plan = compute_plan(&desired, &current, &none, &none);
        assert_eq!(
            plan.subscribe.iter().map(Identity::key).collect::<Vec<_>>(),
            vec!["a@x.org"]
        );
        assert_eq!(plan.unsubscribe, vec!["c@x.org"]);
    }

    #[test]
    fn test_plan_sets_are_disjoint() {
        let desired = identity_set(&["a@x.org", "b@x.org", "d@x.org"]);
        let current = email_set(&["b@x.org", "c@x.org"]);
        let none = HashSet::new();

        let plan = compute_plan(&desired, &current, &none, &none);
        for identity in &plan.subscribe {
            assert!(!plan.unsubscribe.contains(&identity.key()));
        }
    }

    #[test]
    fn test_applying_plan_yields_desired_set() {
        let desired = identity_set(&["a@x.org", "b@x.org"]);
        let mut current = email_set(&["b@x.org", "c@x.org"]);
        let none = HashSet::new();

        let plan = compute_plan(&desired, &current, &none, &none);
        for identity in &plan.subscribe {
            current.insert(identity.key());
        }
        for email in &plan.unsubscribe {
            current.remove(email);
        }
        assert_eq!(current, desired.emails());

        // Re-diffing against the converged state yields an empty plan.
        let replan = compute_plan(&desired, &current, &none, &none);
        assert!(replan.is_empty());
    }

    #[test]
    fn test_plan_is_deterministic() {
        let desired = identity_set(&["c@x.org", "a@x.org", "b@x.org"]);
        let current = HashSet::new();
        let none = HashSet::new();

        let first = compute_plan(&desired, &current, &none, &none);
        let second = compute_plan(&desired, &current, &none, &none);
        let emails: Vec<String> = first.subscribe.iter().map(Identity::key).collect();
        assert_eq!(emails, vec!["a@x.org", "b@x.org", "c@x.org"]);
        assert_eq!(
            emails,
            second.subscribe.iter().map(Identity::key).collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_moderator_demotion_only() {
        let desired = identity_set(&[]);
        let current_members = HashSet::new();
        let current_moderators = email_set(&["m1@x.org", "m2@x.org"]);
        let desired_moderators = email_set(&["m1@x.org"]);

        let plan = compute_plan(
            &desired,
            &current_members,
            &current_moderators,
            &desired_moderators,
        );
        assert!(plan.add_moderators.is_empty());
        assert_eq!(plan.remove_moderators, vec!["m2@x.org"]);
    }

    #[test]
    fn test_identical_snapshots_yield_empty_plan() {
        let desired = identity_set(&["a@x.org"]);
        let current = email_set(&["a@x.org"]);
        let moderators = email_set(&["a@x.org"]);

        let plan = compute_plan(&desired, &current, &moderators, &moderators);
        assert!(plan.is_empty());
        assert_eq!(plan.change_count(), 0);
    }

    #[test]
    fn test_roster_projection_excludes_empty_emails() {
        let members = vec![
            RemoteMember {
                email: "A@X.Org".into(),
                member_id: Some("1".into()),
                role: Some("member".into()),
            },
            RemoteMember {
                email: "".into(),
                member_id: Some("2".into()),
                role: Some("member".into()),
            },
        ];
        let emails = member_emails(&members);
        assert_eq!(emails, email_set(&["a@x.org"]));
    }
}
