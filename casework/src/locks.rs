//! Per-case serialization
//!
//! Transitions on the same case never interleave: each takes the case's
//! async mutex, re-reads the record, validates and writes. Distinct cases
//! proceed in parallel. Ticket creation additionally locks on the creator so
//! two concurrent creates cannot both pass the one-open-ticket check.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::debug;

use crate::state::CaseKind;

/// Guard held for the duration of one transition
pub type CaseGuard = OwnedMutexGuard<()>;

/// Lazily-populated lock table
#[derive(Debug, Default, Clone)]
pub struct CaseLocks {
    table: Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>,
}

impl CaseLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, key: String) -> Arc<AsyncMutex<()>> {
        let mut table = self.table.lock().unwrap_or_else(|e| e.into_inner());
        table.entry(key).or_default().clone()
    }

    /// Lock an arbitrary key
    pub async fn lock_key(&self, key: String) -> CaseGuard {
        debug!(key = %key, "Acquiring case lock");
        self.slot(key).lock_owned().await
    }

    /// Lock one case
    pub async fn lock_case(&self, kind: CaseKind, id: &str) -> CaseGuard {
        self.lock_key(format!("{}:{}", kind.as_str(), id)).await
    }

    /// Lock ticket creation for one member
    pub async fn lock_creator(&self, creator_id: &str) -> CaseGuard {
        self.lock_key(format!("creator:{}", creator_id)).await
    }

    /// Lock every active suspension of one member
    pub async fn lock_member(&self, member_id: &str) -> CaseGuard {
        self.lock_key(format!("member:{}", member_id)).await
    }

    /// Drop entries nobody holds or waits on; returns how many were removed
    pub fn prune(&self) -> usize {
        let mut table = self.table.lock().unwrap_or_else(|e| e.into_inner());
        let before = table.len();
        table.retain(|_, slot| Arc::strong_count(slot) > 1);
        before - table.len()
    }

    pub fn len(&self) -> usize {
        self.table.lock().map(|t| t.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
