//! Engine facade
//!
//! [`Casework`] wires one [`CaseContext`] into every lifecycle so hosts have
//! a single value to construct and share.

use std::sync::Arc;

use crate::clock::SharedClock;
use crate::collaborators::Collaborators;
use crate::config::{CaseworkConfig, ConfigError};
use crate::context::CaseContext;
use crate::error::CaseResult;
use crate::events::SharedEventBus;
use crate::infractions::InfractionLifecycle;
use crate::intents::IntentDispatcher;
use crate::offices::OfficeLifecycle;
use crate::promotions::RankChangeService;
use crate::ranks::PermissionResolver;
use crate::scheduler::ReconciliationScheduler;
use crate::state::{AuditLogEntry, SharedCaseStore};
use crate::tickets::TicketLifecycle;

#[derive(Clone)]
pub struct Casework {
    ctx: CaseContext,
    tickets: TicketLifecycle,
    offices: OfficeLifecycle,
    infractions: InfractionLifecycle,
    rank_changes: RankChangeService,
    intents: IntentDispatcher,
    scheduler: Arc<ReconciliationScheduler>,
}

impl Casework {
    /// Validate `config` and build every lifecycle around `store`
    pub fn new(
        config: CaseworkConfig,
        store: SharedCaseStore,
        collaborators: Collaborators,
        clock: SharedClock,
    ) -> Result<Self, ConfigError> {
        let ctx = CaseContext::new(config, store, collaborators, clock)?;
        let tickets = TicketLifecycle::new(ctx.clone());
        let infractions = InfractionLifecycle::new(ctx.clone());
        let intents = IntentDispatcher::new(ctx.clone());
        let scheduler = Arc::new(ReconciliationScheduler::new(
            ctx.clone(),
            tickets.clone(),
            infractions.clone(),
            intents.clone(),
        ));
        Ok(Self {
            offices: OfficeLifecycle::new(ctx.clone()),
            rank_changes: RankChangeService::new(ctx.clone()),
            ctx,
            tickets,
            infractions,
            intents,
            scheduler,
        })
    }

    pub fn tickets(&self) -> &TicketLifecycle {
        &self.tickets
    }

    pub fn offices(&self) -> &OfficeLifecycle {
        &self.offices
    }

    pub fn infractions(&self) -> &InfractionLifecycle {
        &self.infractions
    }

    pub fn rank_changes(&self) -> &RankChangeService {
        &self.rank_changes
    }

    pub fn intents(&self) -> &IntentDispatcher {
        &self.intents
    }

    /// Shared so it can be handed to [`ReconciliationScheduler::spawn`]
    pub fn scheduler(&self) -> Arc<ReconciliationScheduler> {
        Arc::clone(&self.scheduler)
    }

    pub fn events(&self) -> &SharedEventBus {
        &self.ctx.events
    }

    pub fn resolver(&self) -> &PermissionResolver {
        &self.ctx.resolver
    }

    pub fn context(&self) -> &CaseContext {
        &self.ctx
    }

    /// Newest audit entries first
    pub async fn recent_audit(&self, limit: usize) -> CaseResult<Vec<AuditLogEntry>> {
        self.ctx.cases.list_audit(limit).await
    }
}
