//! Periodic reconciliation
//!
//! ```text
//!   suspension tick ──▶ InfractionLifecycle::expire_due ─┬─▶ purge drafts
//!                                                        └─▶ prune idle locks
//!   ticket tick     ──▶ TicketLifecycle::sweep_inactive
//!   intent tick     ──▶ IntentDispatcher::dispatch_due
//! ```
//!
//! Each tick reads the clock once and hands that instant to the lifecycle.
//! The tick methods are the whole contract; [`ReconciliationScheduler::run`]
//! is a convenience driver for hosts that have no timer of their own.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::context::CaseContext;
use crate::error::CaseResult;
use crate::infractions::{ExpiryReport, InfractionLifecycle};
use crate::intents::{DispatchReport, IntentDispatcher};
use crate::tickets::{SweepReport, TicketLifecycle};

/// Result of one suspension tick
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuspensionTickReport {
    pub expiry: ExpiryReport,
    pub drafts_purged: usize,
    pub locks_pruned: usize,
}

#[derive(Clone)]
pub struct ReconciliationScheduler {
    ctx: CaseContext,
    tickets: TicketLifecycle,
    infractions: InfractionLifecycle,
    intents: IntentDispatcher,
}

impl ReconciliationScheduler {
    pub fn new(
        ctx: CaseContext,
        tickets: TicketLifecycle,
        infractions: InfractionLifecycle,
        intents: IntentDispatcher,
    ) -> Self {
        Self {
            ctx,
            tickets,
            infractions,
            intents,
        }
    }

    /// Expire due suspensions, then drop stale drafts and idle locks
    pub async fn on_suspension_sweep_tick(&self) -> CaseResult<SuspensionTickReport> {
        let now = self.ctx.now();
        let expiry = self.infractions.expire_due(now).await?;
        let drafts_purged = self.infractions.drafts().purge_expired(now);
        let locks_pruned = self.ctx.locks.prune();
        debug!(drafts_purged, locks_pruned, "Suspension tick housekeeping");
        Ok(SuspensionTickReport {
            expiry,
            drafts_purged,
            locks_pruned,
        })
    }

    /// Remind or auto-close idle tickets
    pub async fn on_ticket_inactivity_sweep_tick(&self) -> CaseResult<SweepReport> {
        self.tickets.sweep_inactive(self.ctx.now()).await
    }

    /// Dispatch due scheduled intents
    pub async fn on_intent_dispatch_tick(&self) -> CaseResult<DispatchReport> {
        self.intents.dispatch_due(self.ctx.now()).await
    }

    /// Drive all three ticks on their configured intervals until cancelled
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let sweeps = &self.ctx.config.sweeps;
        let mut suspensions = tokio::time::interval(sweeps.suspension_interval());
        let mut tickets = tokio::time::interval(sweeps.ticket_interval());
        let mut intents = tokio::time::interval(sweeps.intent_interval());
        for timer in [&mut suspensions, &mut tickets, &mut intents] {
            timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
        }

        info!(
            suspension_secs = sweeps.suspension_interval_secs,
            ticket_secs = sweeps.ticket_interval_secs,
            intent_secs = sweeps.intent_interval_secs,
            "Reconciliation scheduler started"
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = suspensions.tick() => {
                    if let Err(e) = self.on_suspension_sweep_tick().await {
                        warn!(error = %e, "Suspension sweep failed");
                    }
                }
                _ = tickets.tick() => {
                    if let Err(e) = self.on_ticket_inactivity_sweep_tick().await {
                        warn!(error = %e, "Ticket inactivity sweep failed");
                    }
                }
                _ = intents.tick() => {
                    if let Err(e) = self.on_intent_dispatch_tick().await {
                        warn!(error = %e, "Intent dispatch failed");
                    }
                }
            }
        }

        info!("Reconciliation scheduler stopped");
    }

    /// Spawn [`run`](Self::run) on the current runtime
    pub fn spawn(self: Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(cancel))
    }
}
