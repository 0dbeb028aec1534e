//! Infraction state machine
//!
//! ```text
//!                     approve                expiry sweep
//! pending_approval ───────────▶ active ─────────────────────▶ completed
//!        │                        │       manual restore
//!        │ deny                   └─────────────────────────▶ manually_completed
//!        ▼
//!      denied
//! ```
//!
//! Approval snapshots the member's staff roles once, then applies the
//! type's role mutation. The snapshot is what an ended suspension gives
//! back. Role mutations are best-effort: a failed grant or revoke is logged
//! and reported but never rolls the persisted transition back.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::drafts::{DraftStore, InfractionDraft};
use crate::collaborators::Notice;
use crate::context::{CaseContext, RoleOp, RoleOpsReport};
use crate::error::{CaseError, CaseResult};
use crate::events::CaseEvent;
use crate::ranks::Operation;
use crate::state::{
    AuditAction, CaseFilter, CaseKind, Infraction, InfractionStatus, InfractionType, MemberId,
    SYSTEM_ACTOR,
};

/// Result of an approval
#[derive(Debug, Clone, PartialEq)]
pub struct ApprovalOutcome {
    pub infraction: Infraction,
    pub roles: RoleOpsReport,
}

/// Result of one expiry sweep
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpiryReport {
    pub examined: usize,
    pub completed: usize,
    /// Completed while another suspension of the same member stays active
    pub restores_deferred: usize,
    pub role_failures: usize,
    pub errors: usize,
}

/// Result of a manual restore
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestoreReport {
    /// Suspensions moved to `manually_completed`
    pub processed: usize,
    /// Role grants and revokes that went through
    pub succeeded: usize,
    /// Role grants and revokes that did not, plus suspensions that could
    /// not be persisted as completed
    pub failed: usize,
    pub failed_ops: Vec<String>,
    /// Roles left revoked because a blacklist is still active
    #[serde(default)]
    pub deferred: bool,
}

impl RestoreReport {
    fn record(&mut self, roles: RoleOpsReport) {
        self.succeeded += roles.succeeded;
        self.failed += roles.failed.len();
        self.failed_ops.extend(roles.failed);
    }

    /// `PartialFailure` when any sub-operation failed
    pub fn into_result(self) -> CaseResult<Self> {
        if self.failed > 0 {
            Err(CaseError::PartialFailure {
                succeeded: self.succeeded,
                failed: self.failed,
            })
        } else {
            Ok(self)
        }
    }
}

struct ExpiryStep {
    roles: RoleOpsReport,
    deferred: bool,
}

/// Infraction lifecycle, including draft handling
#[derive(Clone)]
pub struct InfractionLifecycle {
    ctx: CaseContext,
    drafts: Arc<DraftStore<InfractionDraft>>,
}

impl InfractionLifecycle {
    pub fn new(ctx: CaseContext) -> Self {
        let drafts = Arc::new(DraftStore::new(ctx.config.drafts.ttl()));
        Self { ctx, drafts }
    }

    pub fn drafts(&self) -> &DraftStore<InfractionDraft> {
        &self.drafts
    }

    // ------------------------------------------------------------------
    // Drafts
    // ------------------------------------------------------------------

    pub async fn start_draft(&self, issuer: &str) -> CaseResult<String> {
        self.ctx.require(issuer, Operation::IssueInfraction).await?;
        Ok(self
            .drafts
            .start(issuer, InfractionDraft::default(), self.ctx.now()))
    }

    pub fn update_draft<F>(&self, issuer: &str, draft_id: &str, f: F) -> CaseResult<InfractionDraft>
    where
        F: FnOnce(&mut InfractionDraft),
    {
        self.drafts.update(draft_id, issuer, self.ctx.now(), f)
    }

    pub fn discard_draft(&self, issuer: &str, draft_id: &str) -> CaseResult<()> {
        self.drafts.take(draft_id, issuer, self.ctx.now()).map(|_| ())
    }

    /// Turn a complete draft into a pending infraction. Incomplete drafts
    /// are left in place.
    pub async fn submit_draft(&self, issuer: &str, draft_id: &str) -> CaseResult<Infraction> {
        let now = self.ctx.now();
        let draft = self.drafts.get(draft_id, issuer, now)?;
        let missing = draft.missing_fields();
        if !missing.is_empty() {
            return Err(CaseError::validation(format!(
                "draft is missing {}",
                missing.join(", ")
            )));
        }

        let draft = self.drafts.take(draft_id, issuer, now)?;
        let (Some(user_id), Some(infraction_type), Some(reason)) =
            (draft.user_id, draft.infraction_type, draft.reason)
        else {
            return Err(CaseError::validation("draft is incomplete"));
        };
        self.create(
            issuer,
            &user_id,
            infraction_type,
            &reason,
            draft.evidence,
            draft.appealable,
        )
        .await
    }

    // ------------------------------------------------------------------
    // Transitions
    // ------------------------------------------------------------------

    /// Record a pending infraction; no roles change until approval
    pub async fn create(
        &self,
        issuer: &str,
        user_id: &str,
        infraction_type: InfractionType,
        reason: &str,
        evidence: Vec<String>,
        appealable: bool,
    ) -> CaseResult<Infraction> {
        if reason.trim().is_empty() {
            return Err(CaseError::validation("reason must not be empty"));
        }
        if issuer == user_id {
            return Err(CaseError::permission_denied(
                issuer,
                "issue infractions against themselves",
            ));
        }

        let issuer_roles = self.ctx.require(issuer, Operation::IssueInfraction).await?;
        let user_roles = self.ctx.roles_of(user_id).await?;
        if !self
            .ctx
            .resolver
            .outranks_or_equal(&issuer_roles, &user_roles)
        {
            return Err(CaseError::permission_denied(
                issuer,
                format!("issue infractions against higher-ranked {}", user_id),
            ));
        }

        let now = self.ctx.now();
        let id = self.ctx.cases.allocate_id(CaseKind::Infraction).await?;
        let infraction = Infraction::new(
            id,
            user_id.to_string(),
            issuer.to_string(),
            infraction_type,
            reason.trim().to_string(),
            evidence,
            appealable,
            now,
        );
        self.ctx.cases.save(infraction.clone()).await?;

        info!(
            infraction_id = %infraction.id,
            issuer = %issuer,
            user = %user_id,
            infraction_type = %infraction_type,
            "Infraction created"
        );
        self.ctx
            .audit(
                AuditAction::InfractionCreated,
                issuer,
                Some(&infraction.id),
                format!("{} for {}", infraction_type, user_id),
            )
            .await;
        self.ctx
            .log_to(
                self.ctx.config.channels.approval_log.as_deref(),
                Notice::InfractionPendingApproval {
                    infraction_id: infraction.id.clone(),
                    user_id: user_id.to_string(),
                    issuer_id: issuer.to_string(),
                    infraction_type,
                    reason: infraction.reason.clone(),
                },
            )
            .await;
        self.ctx.publish(CaseEvent::InfractionCreated {
            infraction_id: infraction.id.clone(),
            user_id: user_id.to_string(),
            issuer_id: issuer.to_string(),
            infraction_type,
            timestamp: now,
        });
        Ok(infraction)
    }

    /// Activate a pending infraction and enforce it
    pub async fn approve(&self, actor: &str, infraction_id: &str) -> CaseResult<ApprovalOutcome> {
        self.ctx.require(actor, Operation::ApproveInfraction).await?;

        let user_id = self.ctx.cases.infraction(infraction_id).await?.user_id;
        let _member = self.ctx.locks.lock_member(&user_id).await;
        let _case = self
            .ctx
            .locks
            .lock_case(CaseKind::Infraction, infraction_id)
            .await;

        let mut infraction = self.ctx.cases.infraction(infraction_id).await?;
        if infraction.status != InfractionStatus::PendingApproval {
            return Err(CaseError::transition(
                CaseKind::Infraction,
                infraction_id,
                infraction.status,
                InfractionStatus::Active,
            ));
        }

        let infraction_type = infraction.infraction_type;
        let marker = self.status_marker(infraction_type);
        let held = self.ctx.roles_of(&user_id).await?;
        let held_staff = self.ctx.resolver.directory().staff_roles_in(&held);

        if infraction.previous_roles.is_none() {
            let mut snapshot = held_staff.clone();
            // roles already withheld by another running suspension or blacklist
            for other in self.withholding(&user_id).await? {
                if other.id != infraction.id {
                    snapshot.extend(other.previous_roles.unwrap_or_default());
                }
            }
            if let Some(marker) = &marker {
                snapshot.remove(marker);
            }
            infraction.previous_roles = Some(snapshot);
        }

        let now = self.ctx.now();
        infraction.status = InfractionStatus::Active;
        infraction.approved_by = Some(actor.to_string());
        infraction.approved_at = Some(now);
        if let Some(duration) = infraction_type.duration() {
            infraction.duration_secs = Some(duration.num_seconds());
            infraction.expiry = Some(now + duration);
        }
        self.ctx.cases.save(infraction.clone()).await?;

        info!(
            infraction_id = %infraction_id,
            actor = %actor,
            user = %user_id,
            expiry = ?infraction.expiry,
            "Infraction approved"
        );

        let mut ops = Vec::new();
        if infraction_type.strips_staff_roles() {
            ops.extend(held_staff.iter().cloned().map(RoleOp::Revoke));
        }
        if let Some(marker) = marker {
            ops.push(RoleOp::Grant(marker));
        }
        let roles = self.ctx.apply_roles(&user_id, &ops).await;
        self.report_role_failures(&user_id, infraction_id, &roles)
            .await;

        self.ctx
            .audit(
                AuditAction::InfractionApproved,
                actor,
                Some(infraction_id),
                format!("{} for {}", infraction_type, user_id),
            )
            .await;
        let notice = Notice::InfractionApproved {
            infraction_id: infraction_id.to_string(),
            infraction_type,
            expiry: infraction.expiry,
        };
        self.ctx
            .announce(&user_id, self.ctx.config.channels.infraction_log.as_deref(), notice)
            .await;
        self.ctx.publish(CaseEvent::InfractionApproved {
            infraction_id: infraction_id.to_string(),
            user_id: user_id.clone(),
            approved_by: actor.to_string(),
            expiry: infraction.expiry,
            timestamp: now,
        });

        Ok(ApprovalOutcome { infraction, roles })
    }

    /// Reject a pending infraction
    pub async fn deny(
        &self,
        actor: &str,
        infraction_id: &str,
        reason: Option<&str>,
    ) -> CaseResult<Infraction> {
        self.ctx.require(actor, Operation::ApproveInfraction).await?;

        let _case = self
            .ctx
            .locks
            .lock_case(CaseKind::Infraction, infraction_id)
            .await;
        let mut infraction = self.ctx.cases.infraction(infraction_id).await?;
        if infraction.status != InfractionStatus::PendingApproval {
            return Err(CaseError::transition(
                CaseKind::Infraction,
                infraction_id,
                infraction.status,
                InfractionStatus::Denied,
            ));
        }

        let now = self.ctx.now();
        infraction.status = InfractionStatus::Denied;
        infraction.denied_by = Some(actor.to_string());
        infraction.denied_at = Some(now);
        infraction.deny_reason = reason.map(str::to_string);
        self.ctx.cases.save(infraction.clone()).await?;

        info!(infraction_id = %infraction_id, actor = %actor, "Infraction denied");
        self.ctx
            .audit(
                AuditAction::InfractionDenied,
                actor,
                Some(infraction_id),
                reason.unwrap_or("denied").to_string(),
            )
            .await;
        self.ctx
            .notify(
                &infraction.issuer_id,
                Notice::InfractionDenied {
                    infraction_id: infraction_id.to_string(),
                    reason: infraction.deny_reason.clone(),
                },
            )
            .await;
        self.ctx.publish(CaseEvent::InfractionDenied {
            infraction_id: infraction_id.to_string(),
            user_id: infraction.user_id.clone(),
            denied_by: actor.to_string(),
            timestamp: now,
        });
        Ok(infraction)
    }

    /// Complete every active suspension whose expiry is at or before `now`
    pub async fn expire_due(&self, now: DateTime<Utc>) -> CaseResult<ExpiryReport> {
        let due: Vec<Infraction> = self
            .ctx
            .cases
            .infractions(&CaseFilter::ActiveSuspensions)
            .await?
            .into_iter()
            .filter(|i| i.is_due(now))
            .collect();

        let mut report = ExpiryReport {
            examined: due.len(),
            ..Default::default()
        };

        for candidate in due {
            match self
                .complete_expired(&candidate.id, &candidate.user_id, now)
                .await
            {
                Ok(Some(step)) => {
                    report.completed += 1;
                    report.role_failures += step.roles.failed_count();
                    if step.deferred {
                        report.restores_deferred += 1;
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(infraction_id = %candidate.id, error = %e, "Expiry skipped infraction");
                    report.errors += 1;
                }
            }
        }

        info!(
            examined = report.examined,
            completed = report.completed,
            deferred = report.restores_deferred,
            role_failures = report.role_failures,
            errors = report.errors,
            "Suspension expiry sweep finished"
        );
        Ok(report)
    }

    async fn complete_expired(
        &self,
        infraction_id: &str,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> CaseResult<Option<ExpiryStep>> {
        let _member = self.ctx.locks.lock_member(user_id).await;
        let _case = self
            .ctx
            .locks
            .lock_case(CaseKind::Infraction, infraction_id)
            .await;

        let mut infraction = self.ctx.cases.infraction(infraction_id).await?;
        if !infraction.is_due(now) {
            return Ok(None);
        }

        infraction.status = InfractionStatus::Completed;
        infraction.completed_at = Some(now);
        infraction.completed_by = Some(SYSTEM_ACTOR.to_string());
        self.ctx.cases.save(infraction.clone()).await?;

        let remaining = self.withholding(user_id).await?;
        let deferred = !remaining.is_empty();
        let ops = if deferred {
            info!(
                infraction_id = %infraction_id,
                user = %user_id,
                withheld_by = remaining.len(),
                "Suspension expired; roles stay withheld by another active infraction"
            );
            self.deferred_restore_ops(&remaining)
        } else {
            self.restore_ops(infraction.previous_roles.iter().flatten())
        };
        let roles = self.ctx.apply_roles(user_id, &ops).await;
        self.report_role_failures(user_id, infraction_id, &roles)
            .await;

        info!(infraction_id = %infraction_id, user = %user_id, "Suspension expired");
        self.ctx
            .audit(
                AuditAction::InfractionCompleted,
                SYSTEM_ACTOR,
                Some(infraction_id),
                format!("suspension of {} expired", user_id),
            )
            .await;
        self.finish_notices(&infraction, false, now).await;

        Ok(Some(ExpiryStep { roles, deferred }))
    }

    /// End every active suspension of `user_id` now, regardless of expiry
    pub async fn manual_restore(&self, actor: &str, user_id: &str) -> CaseResult<RestoreReport> {
        self.ctx.require(actor, Operation::RestoreInfraction).await?;

        let _member = self.ctx.locks.lock_member(user_id).await;
        let active = self
            .ctx
            .cases
            .infractions(&CaseFilter::ActiveSuspensionsFor {
                user_id: user_id.to_string(),
            })
            .await?;

        let mut report = RestoreReport::default();
        if active.is_empty() {
            info!(user = %user_id, "Manual restore found no active suspension");
            return Ok(report);
        }

        let now = self.ctx.now();
        let mut restored_roles = BTreeSet::new();
        let mut completed = Vec::new();

        for candidate in active {
            let _case = self
                .ctx
                .locks
                .lock_case(CaseKind::Infraction, &candidate.id)
                .await;
            let mut infraction = match self.ctx.cases.infraction(&candidate.id).await {
                Ok(i) if i.is_active_suspension() => i,
                Ok(_) => continue,
                Err(e) => {
                    warn!(infraction_id = %candidate.id, error = %e, "Manual restore could not load infraction");
                    report.failed += 1;
                    report.failed_ops.push(format!("complete:{}", candidate.id));
                    continue;
                }
            };

            infraction.status = InfractionStatus::ManuallyCompleted;
            infraction.completed_at = Some(now);
            infraction.completed_by = Some(actor.to_string());
            if let Err(e) = self.ctx.cases.save(infraction.clone()).await {
                warn!(infraction_id = %infraction.id, error = %e, "Manual restore could not persist");
                report.failed += 1;
                report.failed_ops.push(format!("complete:{}", infraction.id));
                continue;
            }

            report.processed += 1;
            restored_roles.extend(infraction.previous_roles.clone().unwrap_or_default());
            completed.push(infraction);
        }

        if !completed.is_empty() {
            let remaining = match self.withholding(user_id).await {
                Ok(remaining) => remaining,
                Err(e) => {
                    warn!(user = %user_id, error = %e, "Manual restore could not check remaining infractions");
                    report.failed += 1;
                    report.failed_ops.push(format!("restore:{}", user_id));
                    Vec::new()
                }
            };
            report.deferred = !remaining.is_empty();
            let ops = if report.deferred {
                info!(user = %user_id, "Suspensions lifted; roles stay withheld by an active blacklist");
                self.deferred_restore_ops(&remaining)
            } else {
                self.restore_ops(restored_roles.iter())
            };
            let roles = self.ctx.apply_roles(user_id, &ops).await;
            if let Some(first) = completed.first() {
                self.report_role_failures(user_id, &first.id, &roles)
                    .await;
            }
            report.record(roles);
        }

        for infraction in &completed {
            self.ctx
                .audit(
                    AuditAction::InfractionManuallyCompleted,
                    actor,
                    Some(&infraction.id),
                    format!("suspension of {} lifted early", user_id),
                )
                .await;
            self.finish_notices(infraction, true, now).await;
        }

        info!(
            actor = %actor,
            user = %user_id,
            processed = report.processed,
            succeeded = report.succeeded,
            failed = report.failed,
            "Manual restore finished"
        );
        Ok(report)
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    pub async fn get(&self, infraction_id: &str) -> CaseResult<Infraction> {
        self.ctx.cases.infraction(infraction_id).await
    }

    pub async fn history_of(&self, user_id: &str) -> CaseResult<Vec<Infraction>> {
        self.ctx
            .cases
            .infractions(&CaseFilter::InfractionsFor {
                user_id: MemberId::from(user_id),
            })
            .await
    }

    pub async fn pending(&self) -> CaseResult<Vec<Infraction>> {
        self.ctx
            .cases
            .infractions(&CaseFilter::PendingInfractions)
            .await
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    /// Marker role an approved infraction of this type applies
    fn status_marker(&self, infraction_type: InfractionType) -> Option<String> {
        let markers = &self.ctx.config.status_roles;
        match infraction_type {
            t if t.is_suspension() => Some(markers.suspended.clone()),
            InfractionType::Blacklist => Some(markers.blacklisted.clone()),
            InfractionType::UnderInvestigation => Some(markers.under_investigation.clone()),
            _ => None,
        }
    }

    /// Active infractions of `user_id` that keep staff roles revoked
    async fn withholding(&self, user_id: &str) -> CaseResult<Vec<Infraction>> {
        self.ctx
            .cases
            .infractions(&CaseFilter::WithholdingRolesFor {
                user_id: user_id.to_string(),
            })
            .await
    }

    /// Role changes when a suspension ends but `remaining` still withholds
    /// staff roles: nothing is granted back, and the suspended marker goes
    /// once no other suspension needs it.
    fn deferred_restore_ops(&self, remaining: &[Infraction]) -> Vec<RoleOp> {
        if remaining.iter().any(|i| i.infraction_type.is_suspension()) {
            Vec::new()
        } else {
            vec![RoleOp::Revoke(self.ctx.config.status_roles.suspended.clone())]
        }
    }

    fn restore_ops<'a>(&self, roles: impl Iterator<Item = &'a String>) -> Vec<RoleOp> {
        let mut ops = vec![RoleOp::Revoke(self.ctx.config.status_roles.suspended.clone())];
        ops.extend(roles.cloned().map(RoleOp::Grant));
        ops
    }

    async fn report_role_failures(&self, user_id: &str, infraction_id: &str, roles: &RoleOpsReport) {
        if roles.is_clean() {
            return;
        }
        warn!(
            user = %user_id,
            infraction_id = %infraction_id,
            failed = ?roles.failed,
            "Role changes incomplete"
        );
        self.ctx
            .log_to(
                self.ctx.config.channels.infraction_log.as_deref(),
                Notice::RoleSyncFailed {
                    user_id: user_id.to_string(),
                    infraction_id: infraction_id.to_string(),
                    failed_roles: roles.failed.clone(),
                },
            )
            .await;
    }

    async fn finish_notices(&self, infraction: &Infraction, manual: bool, now: DateTime<Utc>) {
        let notice = Notice::SuspensionEnded {
            infraction_id: infraction.id.clone(),
            manual,
        };
        self.ctx
            .announce(
                &infraction.user_id,
                self.ctx.config.channels.infraction_log.as_deref(),
                notice,
            )
            .await;
        self.ctx.publish(CaseEvent::InfractionCompleted {
            infraction_id: infraction.id.clone(),
            user_id: infraction.user_id.clone(),
            manual,
            timestamp: now,
        });
    }
}
