//! Shared execution context for lifecycles and sweeps
//!
//! Every field is cheap to clone, so each lifecycle holds its own copy.
//! Helpers here wrap collaborator calls: role lookups and mutations are
//! bounded and propagate errors, while notifications, audit appends and event
//! publication are best-effort and only logged on failure.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::clock::SharedClock;
use crate::collaborators::{bounded, Collaborators, Notice};
use crate::config::{CaseworkConfig, ConfigError};
use crate::error::CaseResult;
use crate::events::{CaseEvent, EventBus, SharedEventBus};
use crate::locks::CaseLocks;
use crate::ranks::{Operation, PermissionResolver};
use crate::state::{
    AuditAction, AuditLogEntry, CaseKind, Cases, IntentAction, IntentStatus, ScheduledIntent,
    SharedCaseStore,
};

/// One role mutation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoleOp {
    Grant(String),
    Revoke(String),
}

impl std::fmt::Display for RoleOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Grant(role) => write!(f, "grant:{}", role),
            Self::Revoke(role) => write!(f, "revoke:{}", role),
        }
    }
}

/// Outcome of a batch of role mutations
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleOpsReport {
    pub succeeded: usize,
    /// Failed operations as `grant:<role>` / `revoke:<role>`
    pub failed: Vec<String>,
}

impl RoleOpsReport {
    pub fn failed_count(&self) -> usize {
        self.failed.len()
    }

    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn merge(&mut self, other: RoleOpsReport) {
        self.succeeded += other.succeeded;
        self.failed.extend(other.failed);
    }
}

/// Bundle handed to every lifecycle
#[derive(Clone)]
pub struct CaseContext {
    pub cases: Cases,
    pub resolver: Arc<PermissionResolver>,
    pub collaborators: Collaborators,
    pub clock: SharedClock,
    pub locks: CaseLocks,
    pub events: SharedEventBus,
    pub config: Arc<CaseworkConfig>,
}

impl CaseContext {
    /// Validate `config` and wire the context around `store`
    pub fn new(
        config: CaseworkConfig,
        store: SharedCaseStore,
        collaborators: Collaborators,
        clock: SharedClock,
    ) -> Result<Self, ConfigError> {
        let directory = config.validate()?;
        let resolver = PermissionResolver::new(Arc::new(directory), config.access.clone());
        let timeout = config.collaborators.timeout();
        Ok(Self {
            cases: Cases::new(store, timeout),
            resolver: Arc::new(resolver),
            collaborators,
            clock,
            locks: CaseLocks::new(),
            events: EventBus::new().shared(),
            config: Arc::new(config),
        })
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn timeout(&self) -> Duration {
        self.config.collaborators.timeout()
    }

    /// Current role keys of `member`
    pub async fn roles_of(&self, member: &str) -> CaseResult<BTreeSet<String>> {
        bounded(
            "identity.member_role_keys",
            self.timeout(),
            self.collaborators.identity.member_role_keys(member),
        )
        .await
    }

    /// Fetch the actor's roles and check them against `op`
    pub async fn require(&self, actor: &str, op: Operation) -> CaseResult<BTreeSet<String>> {
        let roles = self.roles_of(actor).await?;
        self.resolver.require(actor, &roles, op)?;
        Ok(roles)
    }

    /// Whether the actor passes `op`, without failing
    pub async fn permits(&self, actor: &str, op: Operation) -> CaseResult<bool> {
        let roles = self.roles_of(actor).await?;
        Ok(self.resolver.permits(&roles, op))
    }

    /// Apply role mutations one by one; failures are logged and collected
    pub async fn apply_roles(&self, member: &str, ops: &[RoleOp]) -> RoleOpsReport {
        let mut report = RoleOpsReport::default();
        let identity = &self.collaborators.identity;
        for op in ops {
            let result = match op {
                RoleOp::Grant(role) => {
                    bounded("identity.grant_role", self.timeout(), identity.grant_role(member, role))
                        .await
                }
                RoleOp::Revoke(role) => {
                    bounded(
                        "identity.revoke_role",
                        self.timeout(),
                        identity.revoke_role(member, role),
                    )
                    .await
                }
            };
            match result {
                Ok(()) => {
                    debug!(member = %member, op = %op, "Role operation applied");
                    report.succeeded += 1;
                }
                Err(e) => {
                    warn!(member = %member, op = %op, error = %e, "Role operation failed");
                    report.failed.push(op.to_string());
                }
            }
        }
        report
    }

    /// Direct message, best-effort
    pub async fn notify(&self, member: &str, notice: Notice) -> bool {
        let kind = notice.kind();
        match bounded(
            "notifier.notify",
            self.timeout(),
            self.collaborators.notifier.notify(member, notice),
        )
        .await
        {
            Ok(()) => true,
            Err(e) => {
                warn!(member = %member, notice = kind, error = %e, "Notification failed");
                false
            }
        }
    }

    /// Log channel post, best-effort; unset channels are skipped
    pub async fn log_to(&self, channel_ref: Option<&str>, notice: Notice) -> bool {
        let Some(channel_ref) = channel_ref else {
            return false;
        };
        let kind = notice.kind();
        match bounded(
            "notifier.log_to_channel",
            self.timeout(),
            self.collaborators.notifier.log_to_channel(channel_ref, notice),
        )
        .await
        {
            Ok(()) => true,
            Err(e) => {
                warn!(channel = %channel_ref, notice = kind, error = %e, "Log post failed");
                false
            }
        }
    }

    /// Direct message and log channel post at once
    pub async fn announce(&self, member: &str, channel_ref: Option<&str>, notice: Notice) {
        futures::join!(
            self.notify(member, notice.clone()),
            self.log_to(channel_ref, notice)
        );
    }

    /// Append an audit entry, best-effort
    pub async fn audit(
        &self,
        action: AuditAction,
        user_id: &str,
        target_id: Option<&str>,
        details: impl Into<String>,
    ) {
        let entry = AuditLogEntry::new(action, user_id, target_id, details, self.now());
        if let Err(e) = self.cases.append_audit(entry).await {
            warn!(action = ?action, user = %user_id, error = %e, "Audit append failed");
        }
    }

    pub fn publish(&self, event: CaseEvent) {
        self.events.publish(event);
    }

    /// Persist a channel deletion request due at `due_at`
    pub async fn schedule_channel_delete(
        &self,
        channel_ref: &str,
        case_kind: CaseKind,
        case_id: &str,
        due_at: DateTime<Utc>,
    ) -> CaseResult<ScheduledIntent> {
        let id = self.cases.allocate_id(CaseKind::Intent).await?;
        let intent = ScheduledIntent::new(
            id,
            IntentAction::DeleteChannel {
                channel_ref: channel_ref.to_string(),
                case_kind,
                case_id: case_id.to_string(),
            },
            due_at,
            self.now(),
        );
        self.cases.save(intent.clone()).await?;
        debug!(
            intent_id = %intent.id,
            channel = %channel_ref,
            due_at = %due_at,
            "Scheduled channel deletion"
        );
        Ok(intent)
    }

    /// Withdraw a pending intent, best-effort
    pub async fn cancel_intent(&self, mut intent: ScheduledIntent, reason: &str) {
        intent.status = IntentStatus::Cancelled;
        intent.last_error = Some(reason.to_string());
        if let Err(e) = self.cases.save(intent.clone()).await {
            warn!(intent_id = %intent.id, error = %e, "Could not cancel intent");
        }
    }
}
