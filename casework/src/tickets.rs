//! Ticket lifecycle
//!
//! ```text
//!            claim            close / auto-close
//! open(unclaimed) ──▶ open(claimed) ──────────────▶ closed
//!        └──────────────────────────────────────────▲
//! ```
//!
//! A member holds at most one open ticket. Staff reports can be elevated to
//! the category above the reported member and restored again. Closing never
//! deletes anything directly; it schedules a channel deletion intent.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::collaborators::Notice;
use crate::context::CaseContext;
use crate::error::{CaseError, CaseResult};
use crate::escalation::{escalation_category, Escalation};
use crate::events::CaseEvent;
use crate::ranks::Operation;
use crate::state::{
    AuditAction, CaseFilter, CaseKind, MemberId, Ticket, TicketCategory, TicketPriority,
    TicketStatus, SYSTEM_ACTOR,
};

const AUTO_CLOSE_REASON: &str = "Closed automatically after inactivity";

/// Result of an inactivity sweep
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    pub examined: usize,
    pub reminded: usize,
    pub closed: usize,
    pub errors: usize,
}

/// Result of elevating a staff report
#[derive(Debug, Clone, PartialEq)]
pub struct ElevationOutcome {
    pub ticket: Ticket,
    pub escalation: Escalation,
    /// Out-of-band alert delivered to the configured top authority
    pub top_authority_alerted: bool,
}

/// Ticket state machine
#[derive(Clone)]
pub struct TicketLifecycle {
    ctx: CaseContext,
}

impl TicketLifecycle {
    pub fn new(ctx: CaseContext) -> Self {
        Self { ctx }
    }

    /// Open a ticket for `creator_id`
    pub async fn create(
        &self,
        creator_id: &str,
        category: TicketCategory,
        channel_ref: &str,
        subject_id: Option<&str>,
    ) -> CaseResult<Ticket> {
        if channel_ref.trim().is_empty() {
            return Err(CaseError::validation("channel_ref must not be empty"));
        }
        if subject_id == Some(creator_id) {
            return Err(CaseError::validation("a ticket cannot report its own creator"));
        }

        let _guard = self.ctx.locks.lock_creator(creator_id).await;

        let open = self
            .ctx
            .cases
            .tickets(&CaseFilter::OpenTicketsBy {
                creator_id: creator_id.to_string(),
            })
            .await?;
        if let Some(existing) = open.first() {
            return Err(CaseError::DuplicateActiveTicket {
                creator_id: creator_id.to_string(),
                existing_id: existing.id.clone(),
            });
        }

        let now = self.ctx.now();
        let id = self.ctx.cases.allocate_id(CaseKind::Ticket).await?;
        let ticket = Ticket::new(
            id,
            creator_id.to_string(),
            category,
            channel_ref.to_string(),
            subject_id.map(str::to_string),
            now,
        );
        self.ctx.cases.save(ticket.clone()).await?;

        info!(ticket_id = %ticket.id, creator = %creator_id, category = ?category, "Ticket created");
        self.ctx
            .audit(
                AuditAction::TicketCreated,
                creator_id,
                Some(&ticket.id),
                format!("{:?} ticket opened", category),
            )
            .await;
        self.ctx.publish(CaseEvent::TicketCreated {
            ticket_id: ticket.id.clone(),
            creator_id: creator_id.to_string(),
            category,
            timestamp: now,
        });
        Ok(ticket)
    }

    /// Claim an open ticket
    pub async fn claim(&self, actor: &str, ticket_id: &str) -> CaseResult<Ticket> {
        self.ctx.require(actor, Operation::TicketStaff).await?;

        let _guard = self.ctx.locks.lock_case(CaseKind::Ticket, ticket_id).await;
        let mut ticket = self.ctx.cases.ticket(ticket_id).await?;

        if !ticket.is_open() {
            return Err(CaseError::transition(
                CaseKind::Ticket,
                ticket_id,
                ticket.state_label(),
                "open(claimed)",
            ));
        }
        match &ticket.claimed_by {
            Some(holder) if holder == actor => {
                return Err(CaseError::AlreadyClaimedByYou {
                    ticket_id: ticket_id.to_string(),
                })
            }
            Some(holder) => {
                return Err(CaseError::AlreadyClaimed {
                    ticket_id: ticket_id.to_string(),
                    claimed_by: holder.clone(),
                })
            }
            None => {}
        }

        let now = self.ctx.now();
        ticket.claimed_by = Some(actor.to_string());
        ticket.participants.insert(actor.to_string());
        ticket.touch(now);
        self.ctx.cases.save(ticket.clone()).await?;

        info!(ticket_id = %ticket_id, actor = %actor, "Ticket claimed");
        self.ctx
            .audit(AuditAction::TicketClaimed, actor, Some(ticket_id), "claimed")
            .await;
        self.ctx.publish(CaseEvent::TicketClaimed {
            ticket_id: ticket_id.to_string(),
            claimed_by: actor.to_string(),
            timestamp: now,
        });
        Ok(ticket)
    }

    pub async fn set_priority(
        &self,
        actor: &str,
        ticket_id: &str,
        priority: TicketPriority,
    ) -> CaseResult<Ticket> {
        self.ctx.require(actor, Operation::TicketStaff).await?;

        let _guard = self.ctx.locks.lock_case(CaseKind::Ticket, ticket_id).await;
        let mut ticket = self.open_ticket(ticket_id, "priority change").await?;

        let now = self.ctx.now();
        let previous = ticket.priority;
        ticket.priority = priority;
        ticket.touch(now);
        self.ctx.cases.save(ticket.clone()).await?;

        info!(ticket_id = %ticket_id, actor = %actor, priority = ?priority, "Ticket priority changed");
        self.ctx
            .audit(
                AuditAction::TicketPriorityChanged,
                actor,
                Some(ticket_id),
                format!("{:?} -> {:?}", previous, priority),
            )
            .await;
        self.ctx.publish(CaseEvent::TicketPriorityChanged {
            ticket_id: ticket_id.to_string(),
            priority,
            changed_by: actor.to_string(),
            timestamp: now,
        });
        Ok(ticket)
    }

    /// Staff or the creator may add participants
    pub async fn add_participant(
        &self,
        actor: &str,
        ticket_id: &str,
        member_id: &str,
    ) -> CaseResult<Ticket> {
        let _guard = self.ctx.locks.lock_case(CaseKind::Ticket, ticket_id).await;
        let mut ticket = self.ctx.cases.ticket(ticket_id).await?;

        if ticket.creator_id != actor {
            self.ctx.require(actor, Operation::TicketStaff).await?;
        }
        if !ticket.is_open() {
            return Err(CaseError::transition(
                CaseKind::Ticket,
                ticket_id,
                ticket.state_label(),
                "participant added",
            ));
        }
        if ticket.participants.contains(member_id) {
            return Ok(ticket);
        }

        let now = self.ctx.now();
        ticket.participants.insert(member_id.to_string());
        ticket.touch(now);
        self.ctx.cases.save(ticket.clone()).await?;

        self.ctx
            .audit(
                AuditAction::TicketParticipantAdded,
                actor,
                Some(ticket_id),
                format!("added {}", member_id),
            )
            .await;
        self.ctx.publish(CaseEvent::TicketParticipantChanged {
            ticket_id: ticket_id.to_string(),
            member_id: member_id.to_string(),
            added: true,
            actor: actor.to_string(),
            timestamp: now,
        });
        Ok(ticket)
    }

    /// Staff only; the creator can never be removed
    pub async fn remove_participant(
        &self,
        actor: &str,
        ticket_id: &str,
        member_id: &str,
    ) -> CaseResult<Ticket> {
        self.ctx.require(actor, Operation::TicketStaff).await?;

        let _guard = self.ctx.locks.lock_case(CaseKind::Ticket, ticket_id).await;
        let mut ticket = self.open_ticket(ticket_id, "participant removed").await?;

        if ticket.creator_id == member_id {
            return Err(CaseError::CannotRemoveCreator {
                ticket_id: ticket_id.to_string(),
            });
        }
        if !ticket.participants.remove(member_id) {
            return Ok(ticket);
        }

        let now = self.ctx.now();
        ticket.touch(now);
        self.ctx.cases.save(ticket.clone()).await?;

        self.ctx
            .audit(
                AuditAction::TicketParticipantRemoved,
                actor,
                Some(ticket_id),
                format!("removed {}", member_id),
            )
            .await;
        self.ctx.publish(CaseEvent::TicketParticipantChanged {
            ticket_id: ticket_id.to_string(),
            member_id: member_id.to_string(),
            added: false,
            actor: actor.to_string(),
            timestamp: now,
        });
        Ok(ticket)
    }

    /// Staff or the creator may close
    pub async fn close(
        &self,
        actor: &str,
        ticket_id: &str,
        reason: Option<&str>,
    ) -> CaseResult<Ticket> {
        let _guard = self.ctx.locks.lock_case(CaseKind::Ticket, ticket_id).await;
        let ticket = self.ctx.cases.ticket(ticket_id).await?;

        if ticket.creator_id != actor {
            self.ctx.require(actor, Operation::TicketStaff).await?;
        }
        if !ticket.is_open() {
            return Err(CaseError::AlreadyClosed {
                kind: CaseKind::Ticket,
                id: ticket_id.to_string(),
            });
        }

        self.finish_close(ticket, actor, reason.map(str::to_string), false)
            .await
    }

    /// Bump `last_activity` for a message in the ticket's channel
    pub async fn record_activity(&self, ticket_id: &str) -> CaseResult<()> {
        let _guard = self.ctx.locks.lock_case(CaseKind::Ticket, ticket_id).await;
        let mut ticket = self.ctx.cases.ticket(ticket_id).await?;
        if !ticket.is_open() {
            return Ok(());
        }
        ticket.touch(self.ctx.now());
        // a fresh idle period earns a fresh reminder
        ticket.reminder_sent_at = None;
        self.ctx.cases.save(ticket).await
    }

    /// Raise a staff report's visibility above the reported member
    pub async fn elevate(&self, actor: &str, ticket_id: &str) -> CaseResult<ElevationOutcome> {
        self.ctx.require(actor, Operation::ElevateTicket).await?;

        let _guard = self.ctx.locks.lock_case(CaseKind::Ticket, ticket_id).await;
        let mut ticket = self.open_ticket(ticket_id, "elevated").await?;

        if ticket.category != TicketCategory::StaffReport {
            return Err(CaseError::validation("only staff reports can be elevated"));
        }
        if ticket.elevated {
            return Err(CaseError::AlreadyElevated {
                ticket_id: ticket_id.to_string(),
            });
        }

        let reported_category = match &ticket.subject_id {
            Some(subject) => {
                let roles = self.ctx.roles_of(subject).await?;
                self.ctx.resolver.highest_rank(&roles).map(|r| r.category)
            }
            None => None,
        };
        let escalation = escalation_category(reported_category);

        let now = self.ctx.now();
        ticket.elevated = true;
        ticket.elevated_by = Some(actor.to_string());
        ticket.viewing_category = Some(escalation.viewing_category);
        ticket.touch(now);
        self.ctx.cases.save(ticket.clone()).await?;

        info!(
            ticket_id = %ticket_id,
            actor = %actor,
            viewing = %escalation.viewing_category,
            "Ticket elevated"
        );
        self.ctx
            .audit(
                AuditAction::TicketElevated,
                actor,
                Some(ticket_id),
                format!("visible to {}", escalation.viewing_category),
            )
            .await;
        self.ctx
            .log_to(
                self.ctx.config.channels.ticket_log.as_deref(),
                Notice::TicketElevated {
                    ticket_id: ticket_id.to_string(),
                    viewing_category: escalation.viewing_category,
                },
            )
            .await;

        let mut top_authority_alerted = false;
        if escalation.alert_top_authority {
            match self.ctx.config.alerts.top_authority_id.as_deref() {
                Some(authority) => {
                    top_authority_alerted = self
                        .ctx
                        .notify(
                            authority,
                            Notice::TopAuthorityAlert {
                                ticket_id: ticket_id.to_string(),
                                subject_id: ticket.subject_id.clone(),
                            },
                        )
                        .await;
                }
                None => warn!(
                    ticket_id = %ticket_id,
                    "Report against the top category but no top authority is configured"
                ),
            }
        }

        self.ctx.publish(CaseEvent::TicketElevated {
            ticket_id: ticket_id.to_string(),
            viewing_category: escalation.viewing_category,
            alert_top_authority: escalation.alert_top_authority,
            timestamp: now,
        });

        Ok(ElevationOutcome {
            ticket,
            escalation,
            top_authority_alerted,
        })
    }

    /// Undo [`elevate`](Self::elevate)
    pub async fn restore_visibility(&self, actor: &str, ticket_id: &str) -> CaseResult<Ticket> {
        self.ctx.require(actor, Operation::ElevateTicket).await?;

        let _guard = self.ctx.locks.lock_case(CaseKind::Ticket, ticket_id).await;
        let mut ticket = self.ctx.cases.ticket(ticket_id).await?;

        if !ticket.elevated {
            return Err(CaseError::NotElevated {
                ticket_id: ticket_id.to_string(),
            });
        }

        let now = self.ctx.now();
        ticket.elevated = false;
        ticket.elevated_by = None;
        ticket.viewing_category = None;
        ticket.touch(now);
        self.ctx.cases.save(ticket.clone()).await?;

        info!(ticket_id = %ticket_id, actor = %actor, "Ticket visibility restored");
        self.ctx
            .audit(
                AuditAction::TicketVisibilityRestored,
                actor,
                Some(ticket_id),
                "visibility restored",
            )
            .await;
        self.ctx.publish(CaseEvent::TicketVisibilityRestored {
            ticket_id: ticket_id.to_string(),
            timestamp: now,
        });
        Ok(ticket)
    }

    /// Remind idle creators once, auto-close long-idle tickets
    pub async fn sweep_inactive(&self, now: DateTime<Utc>) -> CaseResult<SweepReport> {
        let tickets = &self.ctx.config.tickets;
        let reminder_after = tickets.reminder_after();
        let auto_close_after = tickets.auto_close_after();

        let open = self.ctx.cases.tickets(&CaseFilter::OpenTickets).await?;
        let mut report = SweepReport {
            examined: open.len(),
            ..Default::default()
        };

        for candidate in open {
            let idle = now - candidate.last_activity;
            let result = if idle >= auto_close_after {
                self.auto_close(&candidate.id, now).await.map(|done| {
                    if done {
                        report.closed += 1;
                    }
                })
            } else if idle >= reminder_after && candidate.reminder_sent_at.is_none() {
                self.remind(&candidate.id, now).await.map(|done| {
                    if done {
                        report.reminded += 1;
                    }
                })
            } else {
                Ok(())
            };

            if let Err(e) = result {
                warn!(ticket_id = %candidate.id, error = %e, "Inactivity sweep skipped ticket");
                report.errors += 1;
            }
        }

        info!(
            examined = report.examined,
            reminded = report.reminded,
            closed = report.closed,
            errors = report.errors,
            "Ticket inactivity sweep finished"
        );
        Ok(report)
    }

    async fn auto_close(&self, ticket_id: &str, now: DateTime<Utc>) -> CaseResult<bool> {
        let _guard = self.ctx.locks.lock_case(CaseKind::Ticket, ticket_id).await;
        let ticket = self.ctx.cases.ticket(ticket_id).await?;
        if !ticket.is_open() || now - ticket.last_activity < self.ctx.config.tickets.auto_close_after()
        {
            return Ok(false);
        }
        self.finish_close(ticket, SYSTEM_ACTOR, Some(AUTO_CLOSE_REASON.to_string()), true)
            .await?;
        Ok(true)
    }

    async fn remind(&self, ticket_id: &str, now: DateTime<Utc>) -> CaseResult<bool> {
        let _guard = self.ctx.locks.lock_case(CaseKind::Ticket, ticket_id).await;
        let mut ticket = self.ctx.cases.ticket(ticket_id).await?;
        if !ticket.is_open()
            || ticket.reminder_sent_at.is_some()
            || now - ticket.last_activity < self.ctx.config.tickets.reminder_after()
        {
            return Ok(false);
        }

        ticket.reminder_sent_at = Some(now);
        self.ctx.cases.save(ticket.clone()).await?;

        self.ctx
            .notify(
                &ticket.creator_id,
                Notice::TicketReminder {
                    ticket_id: ticket.id.clone(),
                    idle_since: ticket.last_activity,
                },
            )
            .await;
        self.ctx.publish(CaseEvent::TicketReminderSent {
            ticket_id: ticket.id.clone(),
            creator_id: ticket.creator_id.clone(),
            timestamp: now,
        });
        Ok(true)
    }

    async fn open_ticket(&self, ticket_id: &str, attempted: &str) -> CaseResult<Ticket> {
        let ticket = self.ctx.cases.ticket(ticket_id).await?;
        if !ticket.is_open() {
            return Err(CaseError::transition(
                CaseKind::Ticket,
                ticket_id,
                ticket.state_label(),
                attempted,
            ));
        }
        Ok(ticket)
    }

    /// Caller holds the ticket lock and has checked the ticket is open
    async fn finish_close(
        &self,
        mut ticket: Ticket,
        closer: &str,
        reason: Option<String>,
        automatic: bool,
    ) -> CaseResult<Ticket> {
        let now = self.ctx.now();
        ticket.status = TicketStatus::Closed;
        ticket.closed_by = Some(closer.to_string());
        ticket.closed_at = Some(now);
        ticket.close_reason = reason.clone();
        self.ctx.cases.save(ticket.clone()).await?;

        info!(ticket_id = %ticket.id, closer = %closer, automatic, "Ticket closed");

        let due_at = now + self.ctx.config.tickets.channel_delete_grace();
        if let Err(e) = self
            .ctx
            .schedule_channel_delete(&ticket.channel_ref, CaseKind::Ticket, &ticket.id, due_at)
            .await
        {
            warn!(ticket_id = %ticket.id, error = %e, "Failed to schedule channel deletion");
        }

        let action = if automatic {
            AuditAction::TicketAutoClosed
        } else {
            AuditAction::TicketClosed
        };
        self.ctx
            .audit(
                action,
                closer,
                Some(&ticket.id),
                reason.clone().unwrap_or_else(|| "closed".to_string()),
            )
            .await;

        let notice = Notice::TicketClosed {
            ticket_id: ticket.id.clone(),
            closed_by: closer.to_string(),
            reason,
            automatic,
        };
        if closer != ticket.creator_id {
            self.ctx.notify(&ticket.creator_id, notice.clone()).await;
        }
        self.ctx
            .log_to(self.ctx.config.channels.ticket_log.as_deref(), notice)
            .await;

        self.ctx.publish(CaseEvent::TicketClosed {
            ticket_id: ticket.id.clone(),
            closed_by: closer.to_string(),
            automatic,
            timestamp: now,
        });
        Ok(ticket)
    }

    /// Open tickets created by `creator_id`
    pub async fn open_tickets_of(&self, creator_id: &str) -> CaseResult<Vec<Ticket>> {
        self.ctx
            .cases
            .tickets(&CaseFilter::OpenTicketsBy {
                creator_id: MemberId::from(creator_id),
            })
            .await
    }
}
