//! Office lifecycle (investigation dossiers on staff members)
//!
//! `open ──close(outcome)──▶ closed ──decide_disposition──▶ keep | delete_24h | delete_now`
//!
//! The disposition is decided once, after close. Deletion is requested as a
//! scheduled intent; channels are never removed from here.

use chrono::Duration;
use tracing::info;

use crate::collaborators::Notice;
use crate::context::CaseContext;
use crate::error::{CaseError, CaseResult};
use crate::events::CaseEvent;
use crate::ranks::Operation;
use crate::state::{
    AuditAction, CaseFilter, CaseKind, Disposition, Office, OfficeOutcome, OfficeStatus,
    ScheduledIntent,
};

/// Result of a disposition decision
#[derive(Debug, Clone, PartialEq)]
pub struct DispositionOutcome {
    pub office: Office,
    /// Deletion request, unless the office is kept
    pub intent: Option<ScheduledIntent>,
}

/// Office state machine
#[derive(Clone)]
pub struct OfficeLifecycle {
    ctx: CaseContext,
}

impl OfficeLifecycle {
    pub fn new(ctx: CaseContext) -> Self {
        Self { ctx }
    }

    /// Open an investigation into `target_id`
    pub async fn open(
        &self,
        actor: &str,
        target_id: &str,
        channel_ref: &str,
        notes: Option<&str>,
    ) -> CaseResult<Office> {
        if actor == target_id {
            return Err(CaseError::permission_denied(actor, "investigate themselves"));
        }
        if channel_ref.trim().is_empty() {
            return Err(CaseError::validation("channel_ref must not be empty"));
        }

        let actor_roles = self.ctx.roles_of(actor).await?;
        let target_roles = self.ctx.roles_of(target_id).await?;

        // the rank guard applies before any category rule
        let resolver = &self.ctx.resolver;
        let actor_level = resolver.member_level(&actor_roles);
        let target_level = resolver.member_level(&target_roles);
        if target_level > actor_level {
            return Err(CaseError::InsufficientRankToInvestigate {
                actor: actor.to_string(),
                actor_level,
                target: target_id.to_string(),
                target_level,
            });
        }
        resolver.require(actor, &actor_roles, Operation::OpenOffice)?;
        if target_level == 0 {
            return Err(CaseError::TargetNotStaff {
                target: target_id.to_string(),
            });
        }

        let now = self.ctx.now();
        let id = self.ctx.cases.allocate_id(CaseKind::Office).await?;
        let office = Office::new(
            id,
            target_id.to_string(),
            actor.to_string(),
            channel_ref.to_string(),
            notes.map(str::to_string),
            now,
        );
        self.ctx.cases.save(office.clone()).await?;

        info!(office_id = %office.id, actor = %actor, target = %target_id, "Office opened");
        self.ctx
            .audit(
                AuditAction::OfficeOpened,
                actor,
                Some(&office.id),
                format!("investigating {}", target_id),
            )
            .await;
        self.ctx.publish(CaseEvent::OfficeOpened {
            office_id: office.id.clone(),
            target_id: target_id.to_string(),
            creator_id: actor.to_string(),
            timestamp: now,
        });
        Ok(office)
    }

    /// Close with an outcome; `notes` are appended to any existing notes
    pub async fn close(
        &self,
        actor: &str,
        office_id: &str,
        outcome: OfficeOutcome,
        notes: Option<&str>,
    ) -> CaseResult<Office> {
        self.ctx.require(actor, Operation::CloseOffice).await?;

        let _guard = self.ctx.locks.lock_case(CaseKind::Office, office_id).await;
        let mut office = self.ctx.cases.office(office_id).await?;
        if !office.is_open() {
            return Err(CaseError::AlreadyClosed {
                kind: CaseKind::Office,
                id: office_id.to_string(),
            });
        }

        let now = self.ctx.now();
        office.status = OfficeStatus::Closed;
        office.outcome = Some(outcome);
        office.closed_by = Some(actor.to_string());
        office.closed_at = Some(now);
        if let Some(extra) = notes.filter(|n| !n.trim().is_empty()) {
            office.notes = Some(match office.notes.take() {
                Some(existing) => format!("{}\n{}", existing, extra),
                None => extra.to_string(),
            });
        }
        self.ctx.cases.save(office.clone()).await?;

        info!(office_id = %office_id, actor = %actor, outcome = outcome.as_str(), "Office closed");
        self.ctx
            .audit(
                AuditAction::OfficeClosed,
                actor,
                Some(office_id),
                format!("outcome {}", outcome.as_str()),
            )
            .await;
        self.ctx
            .log_to(
                self.ctx.config.channels.office_log.as_deref(),
                Notice::OfficeClosed {
                    office_id: office_id.to_string(),
                    outcome,
                },
            )
            .await;
        self.ctx.publish(CaseEvent::OfficeClosed {
            office_id: office_id.to_string(),
            outcome,
            closed_by: actor.to_string(),
            timestamp: now,
        });
        Ok(office)
    }

    /// Decide what happens to a closed office's channel
    pub async fn decide_disposition(
        &self,
        actor: &str,
        office_id: &str,
        disposition: Disposition,
    ) -> CaseResult<DispositionOutcome> {
        if disposition == Disposition::Undecided {
            return Err(CaseError::validation("disposition must be keep, delete_24h or delete_now"));
        }
        self.ctx.require(actor, Operation::CloseOffice).await?;

        let _guard = self.ctx.locks.lock_case(CaseKind::Office, office_id).await;
        let mut office = self.ctx.cases.office(office_id).await?;

        if office.is_open() {
            return Err(CaseError::transition(
                CaseKind::Office,
                office_id,
                "open",
                disposition,
            ));
        }
        if office.disposition != Disposition::Undecided {
            return Err(CaseError::transition(
                CaseKind::Office,
                office_id,
                format!("closed({})", office.disposition),
                disposition,
            ));
        }

        let now = self.ctx.now();
        let due_at = match disposition {
            Disposition::DeleteNow => Some(now),
            Disposition::Delete24h => Some(now + Duration::hours(24)),
            Disposition::Keep | Disposition::Undecided => None,
        };
        // the intent goes first: a failed write leaves the office undecided
        let intent = match due_at {
            Some(due_at) => Some(
                self.ctx
                    .schedule_channel_delete(&office.channel_ref, CaseKind::Office, office_id, due_at)
                    .await?,
            ),
            None => None,
        };

        office.disposition = disposition;
        office.disposition_by = Some(actor.to_string());
        office.disposition_at = Some(now);
        if let Err(e) = self.ctx.cases.save(office.clone()).await {
            if let Some(intent) = intent {
                self.ctx.cancel_intent(intent, &e.to_string()).await;
            }
            return Err(e);
        }

        info!(office_id = %office_id, actor = %actor, disposition = %disposition, "Office disposition set");
        self.ctx
            .audit(
                AuditAction::OfficeDispositionSet,
                actor,
                Some(office_id),
                disposition.to_string(),
            )
            .await;
        self.ctx.publish(CaseEvent::OfficeDispositionSet {
            office_id: office_id.to_string(),
            disposition,
            timestamp: now,
        });
        Ok(DispositionOutcome { office, intent })
    }

    /// All offices ever opened against `target_id`
    pub async fn offices_for(&self, target_id: &str) -> CaseResult<Vec<Office>> {
        self.ctx
            .cases
            .offices(&CaseFilter::OfficesFor {
                target_id: target_id.to_string(),
            })
            .await
    }
}
