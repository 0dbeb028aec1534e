//! Casework engine
//!
//! Rank-gated staff moderation workflows for a community server:
//! - Support tickets with claiming, participants, staff-report elevation and
//!   inactivity auto-close
//! - Internal affairs offices with a closing outcome and channel disposition
//! - Infractions with approval, role stripping and timed restoration
//! - Promotions and demotions along a single rank hierarchy
//!
//! # Architecture
//!
//! ```text
//!                 ┌──────────────────────┐
//!                 │  PermissionResolver  │◀── RankDirectory (config)
//!                 └──────────┬───────────┘
//!                            │ gates
//!   ┌────────────┬───────────┼────────────┬──────────────┐
//!   ▼            ▼           ▼            ▼              ▼
//! tickets     offices   infractions   promotions      intents
//!   │            │           │            │              │
//!   └────────────┴─────┬─────┴────────────┴──────────────┘
//!                      ▼
//!        CaseStore · audit log · EventBus · collaborators
//!                      ▲
//!         ReconciliationScheduler (suspension / ticket / intent ticks)
//! ```
//!
//! The platform itself (members, roles, channels, messages) is reached only
//! through the traits in [`collaborators`]. Wire them up with [`Casework`]:
//!
//! ```ignore
//! use std::sync::Arc;
//! use casework::{Casework, CaseworkConfig, MemoryCaseStore, SystemClock};
//!
//! let config = CaseworkConfig::load("casework.toml".as_ref())?;
//! let store = MemoryCaseStore::open("casework-state.json")?.shared();
//! let engine = Casework::new(config, store, collaborators, Arc::new(SystemClock))?;
//! engine.scheduler().spawn(cancel.clone());
//! ```

#![allow(clippy::uninlined_format_args)]

pub mod clock;
pub mod collaborators;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod escalation;
pub mod events;
pub mod infractions;
pub mod intents;
pub mod locks;
pub mod offices;
pub mod promotions;
pub mod ranks;
pub mod scheduler;
pub mod state;
pub mod testkit;
pub mod tickets;

pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use collaborators::{
    ChannelJanitor, CollaboratorError, Collaborators, IdentityProvider, Notice, Notifier,
};
pub use config::{CaseworkConfig, ConfigError};
pub use context::{CaseContext, RoleOp, RoleOpsReport};
pub use engine::Casework;
pub use error::{CaseError, CaseResult, StructuredError};
pub use escalation::{escalation_category, Escalation};
pub use events::{CaseEvent, EventBus, EventFilter, SharedEventBus};
pub use infractions::{
    ApprovalOutcome, ExpiryReport, InfractionDraft, InfractionLifecycle, RestoreReport,
};
pub use intents::{DispatchReport, IntentDispatcher};
pub use offices::{DispositionOutcome, OfficeLifecycle};
pub use promotions::{RankChangeOutcome, RankChangeService};
pub use ranks::{Operation, PermissionResolver, Rank, RankCategory, RankDirectory};
pub use scheduler::{ReconciliationScheduler, SuspensionTickReport};
pub use state::{CaseFilter, CaseKind, CaseStore, MemoryCaseStore, SharedCaseStore};
pub use tickets::{ElevationOutcome, SweepReport, TicketLifecycle};
