//! Case store contract
//!
//! [`CaseStore`] is the persistence collaborator: keyed by case kind and a
//! stable, store-assigned id, read-your-writes. Lifecycles never call it
//! directly; they go through [`Cases`], which bounds every call with the
//! collaborator timeout and hands back typed records.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::types::*;
use crate::collaborators::bounded;
use crate::error::{CaseError, CaseResult};

/// Error type for state store operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Lock poisoned")]
    LockPoisoned,

    #[error("Column family not found: {0}")]
    ColumnFamilyNotFound(String),

    #[error("Expected {expected} record for {id}, found {found}")]
    KindMismatch {
        expected: CaseKind,
        found: CaseKind,
        id: String,
    },

    #[cfg(feature = "rocksdb-store")]
    #[error("RocksDB error: {0}")]
    RocksDb(#[from] rocksdb::Error),
}

impl StoreError {
    /// Whether a retry could succeed
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Backend(_) => true,
            Self::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::WouldBlock
                    | std::io::ErrorKind::Interrupted
                    | std::io::ErrorKind::TimedOut
            ),
            _ => false,
        }
    }
}

/// Result type for state store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Shared reference to a case store
pub type SharedCaseStore = Arc<dyn CaseStore>;

/// Selection criteria for [`CaseStore::query_cases`]
///
/// Filters are plain data so remote stores can translate them into their own
/// query language; [`CaseFilter::matches`] is the reference semantics.
#[derive(Debug, Clone, PartialEq)]
pub enum CaseFilter {
    All,
    OpenTickets,
    OpenTicketsBy { creator_id: MemberId },
    OfficesFor { target_id: MemberId },
    InfractionsFor { user_id: MemberId },
    PendingInfractions,
    ActiveSuspensions,
    ActiveSuspensionsFor { user_id: MemberId },
    /// Active suspensions and blacklists of one member
    WithholdingRolesFor { user_id: MemberId },
    PromotionsFor { staff_id: MemberId },
    PendingIntents,
    PendingIntentsDue { at: DateTime<Utc> },
}

impl CaseFilter {
    pub fn matches(&self, case: &StoredCase) -> bool {
        match (self, case) {
            (Self::All, _) => true,
            (Self::OpenTickets, StoredCase::Ticket(t)) => t.is_open(),
            (Self::OpenTicketsBy { creator_id }, StoredCase::Ticket(t)) => {
                t.is_open() && &t.creator_id == creator_id
            }
            (Self::OfficesFor { target_id }, StoredCase::Office(o)) => &o.target_id == target_id,
            (Self::InfractionsFor { user_id }, StoredCase::Infraction(i)) => &i.user_id == user_id,
            (Self::PendingInfractions, StoredCase::Infraction(i)) => {
                i.status == InfractionStatus::PendingApproval
            }
            (Self::ActiveSuspensions, StoredCase::Infraction(i)) => i.is_active_suspension(),
            (Self::ActiveSuspensionsFor { user_id }, StoredCase::Infraction(i)) => {
                i.is_active_suspension() && &i.user_id == user_id
            }
            (Self::WithholdingRolesFor { user_id }, StoredCase::Infraction(i)) => {
                i.withholds_staff_roles() && &i.user_id == user_id
            }
            (Self::PromotionsFor { staff_id }, StoredCase::Promotion(p)) => &p.staff_id == staff_id,
            (Self::PendingIntents, StoredCase::Intent(i)) => i.status == IntentStatus::Pending,
            (Self::PendingIntentsDue { at }, StoredCase::Intent(i)) => i.is_due(*at),
            _ => false,
        }
    }
}

/// Persistence collaborator
#[async_trait]
pub trait CaseStore: Send + Sync {
    /// Reserve a fresh id for a new record of `kind`
    async fn allocate_id(&self, kind: CaseKind) -> StoreResult<CaseId>;

    async fn get_case(&self, kind: CaseKind, id: &str) -> StoreResult<Option<StoredCase>>;

    async fn upsert_case(&self, case: StoredCase) -> StoreResult<()>;

    async fn query_cases(&self, kind: CaseKind, filter: &CaseFilter)
        -> StoreResult<Vec<StoredCase>>;

    async fn append_audit(&self, entry: AuditLogEntry) -> StoreResult<()>;

    /// Most recent entries first
    async fn list_audit(&self, limit: usize) -> StoreResult<Vec<AuditLogEntry>>;
}

fn mismatch(expected: CaseKind, found: &StoredCase) -> CaseError {
    CaseError::Store(StoreError::KindMismatch {
        expected,
        found: found.kind(),
        id: found.id().to_string(),
    })
}

/// Typed, time-bounded view over a [`CaseStore`]
#[derive(Clone)]
pub struct Cases {
    store: SharedCaseStore,
    timeout: Duration,
}

impl Cases {
    pub fn new(store: SharedCaseStore, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    pub fn store(&self) -> &SharedCaseStore {
        &self.store
    }

    pub async fn allocate_id(&self, kind: CaseKind) -> CaseResult<CaseId> {
        bounded("store.allocate_id", self.timeout, self.store.allocate_id(kind)).await
    }

    async fn fetch(&self, kind: CaseKind, id: &str) -> CaseResult<StoredCase> {
        bounded("store.get_case", self.timeout, self.store.get_case(kind, id))
            .await?
            .ok_or_else(|| CaseError::not_found(kind, id))
    }

    async fn query(&self, kind: CaseKind, filter: &CaseFilter) -> CaseResult<Vec<StoredCase>> {
        bounded(
            "store.query_cases",
            self.timeout,
            self.store.query_cases(kind, filter),
        )
        .await
    }

    pub async fn save(&self, case: impl Into<StoredCase>) -> CaseResult<()> {
        bounded("store.upsert_case", self.timeout, self.store.upsert_case(case.into())).await
    }

    pub async fn append_audit(&self, entry: AuditLogEntry) -> CaseResult<()> {
        bounded("store.append_audit", self.timeout, self.store.append_audit(entry)).await
    }

    pub async fn list_audit(&self, limit: usize) -> CaseResult<Vec<AuditLogEntry>> {
        bounded("store.list_audit", self.timeout, self.store.list_audit(limit)).await
    }

    pub async fn ticket(&self, id: &str) -> CaseResult<Ticket> {
        match self.fetch(CaseKind::Ticket, id).await? {
            StoredCase::Ticket(t) => Ok(t),
            other => Err(mismatch(CaseKind::Ticket, &other)),
        }
    }

    pub async fn office(&self, id: &str) -> CaseResult<Office> {
        match self.fetch(CaseKind::Office, id).await? {
            StoredCase::Office(o) => Ok(o),
            other => Err(mismatch(CaseKind::Office, &other)),
        }
    }

    pub async fn infraction(&self, id: &str) -> CaseResult<Infraction> {
        match self.fetch(CaseKind::Infraction, id).await? {
            StoredCase::Infraction(i) => Ok(i),
            other => Err(mismatch(CaseKind::Infraction, &other)),
        }
    }

    pub async fn intent(&self, id: &str) -> CaseResult<ScheduledIntent> {
        match self.fetch(CaseKind::Intent, id).await? {
            StoredCase::Intent(i) => Ok(i),
            other => Err(mismatch(CaseKind::Intent, &other)),
        }
    }

    pub async fn tickets(&self, filter: &CaseFilter) -> CaseResult<Vec<Ticket>> {
        Ok(self
            .query(CaseKind::Ticket, filter)
            .await?
            .into_iter()
            .filter_map(|c| match c {
                StoredCase::Ticket(t) => Some(t),
                _ => None,
            })
            .collect())
    }

    pub async fn offices(&self, filter: &CaseFilter) -> CaseResult<Vec<Office>> {
        Ok(self
            .query(CaseKind::Office, filter)
            .await?
            .into_iter()
            .filter_map(|c| match c {
                StoredCase::Office(o) => Some(o),
                _ => None,
            })
            .collect())
    }

    pub async fn infractions(&self, filter: &CaseFilter) -> CaseResult<Vec<Infraction>> {
        Ok(self
            .query(CaseKind::Infraction, filter)
            .await?
            .into_iter()
            .filter_map(|c| match c {
                StoredCase::Infraction(i) => Some(i),
                _ => None,
            })
            .collect())
    }

    pub async fn promotions(&self, filter: &CaseFilter) -> CaseResult<Vec<Promotion>> {
        Ok(self
            .query(CaseKind::Promotion, filter)
            .await?
            .into_iter()
            .filter_map(|c| match c {
                StoredCase::Promotion(p) => Some(p),
                _ => None,
            })
            .collect())
    }

    pub async fn intents(&self, filter: &CaseFilter) -> CaseResult<Vec<ScheduledIntent>> {
        Ok(self
            .query(CaseKind::Intent, filter)
            .await?
            .into_iter()
            .filter_map(|c| match c {
                StoredCase::Intent(i) => Some(i),
                _ => None,
            })
            .collect())
    }
}
