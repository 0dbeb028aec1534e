//! Scheduled intent dispatch
//!
//! Channel deletions are persisted as [`ScheduledIntent`]s when a case is
//! closed or disposed of, and handed to the [`ChannelJanitor`] once due.
//! Because they live in the store, pending deletions survive a restart.
//! A failed dispatch is retried with a linear backoff until the attempt
//! limit, then marked failed.
//!
//! [`ChannelJanitor`]: crate::collaborators::ChannelJanitor

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::collaborators::{bounded, CollaboratorError};
use crate::context::CaseContext;
use crate::error::{CaseError, CaseResult};
use crate::events::CaseEvent;
use crate::state::{
    AuditAction, CaseFilter, CaseKind, IntentAction, IntentStatus, ScheduledIntent, SYSTEM_ACTOR,
};

/// Result of one dispatch pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchReport {
    pub due: usize,
    pub dispatched: usize,
    pub retrying: usize,
    pub failed: usize,
    pub errors: usize,
}

enum Dispatch {
    Done,
    Retry,
    GaveUp,
    Skipped,
}

#[derive(Clone)]
pub struct IntentDispatcher {
    ctx: CaseContext,
}

impl IntentDispatcher {
    pub fn new(ctx: CaseContext) -> Self {
        Self { ctx }
    }

    /// Hand every due intent to its collaborator
    pub async fn dispatch_due(&self, now: DateTime<Utc>) -> CaseResult<DispatchReport> {
        let due = self
            .ctx
            .cases
            .intents(&CaseFilter::PendingIntentsDue { at: now })
            .await?;

        let mut report = DispatchReport {
            due: due.len(),
            ..Default::default()
        };

        for intent in due {
            match self.dispatch_one(&intent.id, now).await {
                Ok(Dispatch::Done) => report.dispatched += 1,
                Ok(Dispatch::Retry) => report.retrying += 1,
                Ok(Dispatch::GaveUp) => report.failed += 1,
                Ok(Dispatch::Skipped) => {}
                Err(e) => {
                    warn!(intent_id = %intent.id, error = %e, "Intent dispatch skipped");
                    report.errors += 1;
                }
            }
        }

        if report.due > 0 {
            info!(
                due = report.due,
                dispatched = report.dispatched,
                retrying = report.retrying,
                failed = report.failed,
                errors = report.errors,
                "Intent dispatch finished"
            );
        }
        Ok(report)
    }

    async fn dispatch_one(&self, intent_id: &str, now: DateTime<Utc>) -> CaseResult<Dispatch> {
        let _guard = self.ctx.locks.lock_case(CaseKind::Intent, intent_id).await;
        let mut intent = self.ctx.cases.intent(intent_id).await?;
        if !intent.is_due(now) {
            return Ok(Dispatch::Skipped);
        }

        let IntentAction::DeleteChannel { channel_ref, .. } = &intent.action;
        let channel_ref = channel_ref.clone();

        let janitor = &self.ctx.collaborators.janitor;
        let result = bounded("janitor.delete_channel", self.ctx.timeout(), async {
            match janitor.delete_channel(&channel_ref).await {
                // already gone counts as done
                Err(CollaboratorError::ChannelNotFound(_)) => {
                    debug!(channel = %channel_ref, "Channel already deleted");
                    Ok(())
                }
                other => other,
            }
        })
        .await;

        intent.attempts += 1;
        match result {
            Ok(()) => {
                intent.status = IntentStatus::Dispatched;
                intent.last_error = None;
                self.ctx.cases.save(intent.clone()).await?;

                info!(intent_id = %intent.id, channel = %channel_ref, "Channel deleted");
                self.ctx
                    .audit(
                        AuditAction::IntentDispatched,
                        SYSTEM_ACTOR,
                        Some(&intent.id),
                        format!("deleted channel {}", channel_ref),
                    )
                    .await;
                self.ctx.publish(CaseEvent::IntentDispatched {
                    intent_id: intent.id.clone(),
                    channel_ref,
                    timestamp: now,
                });
                Ok(Dispatch::Done)
            }
            Err(e) => self.record_failure(intent, e, now).await,
        }
    }

    async fn record_failure(
        &self,
        mut intent: ScheduledIntent,
        error: CaseError,
        now: DateTime<Utc>,
    ) -> CaseResult<Dispatch> {
        let sweeps = &self.ctx.config.sweeps;
        intent.last_error = Some(error.to_string());

        if intent.attempts >= sweeps.intent_max_attempts {
            intent.status = IntentStatus::Failed;
            self.ctx.cases.save(intent.clone()).await?;

            warn!(
                intent_id = %intent.id,
                attempts = intent.attempts,
                error = %error,
                "Intent failed permanently"
            );
            self.ctx
                .audit(
                    AuditAction::IntentFailed,
                    SYSTEM_ACTOR,
                    Some(&intent.id),
                    error.to_string(),
                )
                .await;
            self.ctx.publish(CaseEvent::IntentFailed {
                intent_id: intent.id.clone(),
                attempts: intent.attempts,
                error: error.to_string(),
                timestamp: now,
            });
            return Ok(Dispatch::GaveUp);
        }

        intent.due_at = now + sweeps.intent_retry_delay(intent.attempts);
        self.ctx.cases.save(intent.clone()).await?;
        warn!(
            intent_id = %intent.id,
            attempts = intent.attempts,
            retry_at = %intent.due_at,
            error = %error,
            "Intent dispatch failed, will retry"
        );
        Ok(Dispatch::Retry)
    }

    /// Intents still waiting to run
    pub async fn pending(&self) -> CaseResult<Vec<ScheduledIntent>> {
        let mut intents = self.ctx.cases.intents(&CaseFilter::PendingIntents).await?;
        intents.sort_by_key(|i| i.due_at);
        Ok(intents)
    }
}
