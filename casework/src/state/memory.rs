//! In-memory case store with optional JSON snapshot persistence
//!
//! Without a path this is a plain in-process store (tests, dry runs). With a
//! path every write rewrites the snapshot file atomically, so scheduled
//! intents and suspension expiries survive a restart.
//!
//! A write only lands in memory once the snapshot file took it. The file is
//! written while the state lock is held, which serializes writers; the
//! snapshot is small enough that this stays off the hot path.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::schema::keys;
use super::store::{CaseFilter, CaseStore, SharedCaseStore, StoreError, StoreResult};
use super::types::*;

#[derive(Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    #[serde(default)]
    cases: BTreeMap<String, StoredCase>,
    #[serde(default)]
    audit: Vec<AuditLogEntry>,
}

/// Case store held in memory
#[derive(Debug, Default)]
pub struct MemoryCaseStore {
    state: RwLock<Snapshot>,
    snapshot_path: Option<PathBuf>,
}

impl MemoryCaseStore {
    /// Create an empty, non-persistent store
    pub fn new() -> Self {
        Self::default()
    }

    /// Open (or create) a store snapshotted at `path`
    pub fn open(path: impl Into<PathBuf>) -> StoreResult<Self> {
        let path = path.into();
        let snapshot = if path.exists() {
            let bytes = std::fs::read(&path)?;
            serde_json::from_slice(&bytes)
                .map_err(|e| StoreError::Deserialization(e.to_string()))?
        } else {
            Snapshot::default()
        };
        debug!(
            path = %path.display(),
            cases = snapshot.cases.len(),
            audit = snapshot.audit.len(),
            "Opened case snapshot"
        );
        Ok(Self {
            state: RwLock::new(snapshot),
            snapshot_path: Some(path),
        })
    }

    /// Create a shared reference to this store
    pub fn shared(self) -> SharedCaseStore {
        Arc::new(self)
    }

    /// Snapshot file, if persistent
    pub fn path(&self) -> Option<&Path> {
        self.snapshot_path.as_deref()
    }

    /// Number of stored records across all kinds
    pub fn len(&self) -> usize {
        self.state.read().map(|s| s.cases.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn persist(&self, snapshot: &Snapshot) -> StoreResult<()> {
        let Some(path) = &self.snapshot_path else {
            return Ok(());
        };
        let bytes = serde_json::to_vec_pretty(snapshot)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, bytes)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }
}

#[async_trait]
impl CaseStore for MemoryCaseStore {
    async fn allocate_id(&self, _kind: CaseKind) -> StoreResult<CaseId> {
        Ok(uuid::Uuid::new_v4().to_string())
    }

    async fn get_case(&self, kind: CaseKind, id: &str) -> StoreResult<Option<StoredCase>> {
        let state = self.state.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(state.cases.get(&keys::case(kind, id)).cloned())
    }

    async fn upsert_case(&self, case: StoredCase) -> StoreResult<()> {
        let mut state = self.state.write().map_err(|_| StoreError::LockPoisoned)?;
        let key = keys::case(case.kind(), case.id());
        let previous = state.cases.insert(key.clone(), case);
        if let Err(e) = self.persist(&state) {
            match previous {
                Some(previous) => state.cases.insert(key, previous),
                None => state.cases.remove(&key),
            };
            return Err(e);
        }
        Ok(())
    }

    async fn query_cases(
        &self,
        kind: CaseKind,
        filter: &CaseFilter,
    ) -> StoreResult<Vec<StoredCase>> {
        let state = self.state.read().map_err(|_| StoreError::LockPoisoned)?;
        let prefix = keys::case_prefix(kind);
        Ok(state
            .cases
            .range(prefix.clone()..)
            .take_while(|(key, _)| key.starts_with(&prefix))
            .map(|(_, case)| case)
            .filter(|case| filter.matches(case))
            .cloned()
            .collect())
    }

    async fn append_audit(&self, entry: AuditLogEntry) -> StoreResult<()> {
        let mut state = self.state.write().map_err(|_| StoreError::LockPoisoned)?;
        state.audit.push(entry);
        if let Err(e) = self.persist(&state) {
            state.audit.pop();
            return Err(e);
        }
        Ok(())
    }

    async fn list_audit(&self, limit: usize) -> StoreResult<Vec<AuditLogEntry>> {
        let state = self.state.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(state.audit.iter().rev().take(limit).cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tempfile::tempdir;

    fn ticket(id: &str, creator: &str) -> Ticket {
        Ticket::new(
            id.into(),
            creator.into(),
            TicketCategory::General,
            format!("chan-{}", id),
            None,
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn test_upsert_and_get() {
        let store = MemoryCaseStore::new();
        store.upsert_case(ticket("t-1", "u-1").into()).await.unwrap();

        let got = store.get_case(CaseKind::Ticket, "t-1").await.unwrap();
        assert!(matches!(got, Some(StoredCase::Ticket(t)) if t.creator_id == "u-1"));
        assert!(store
            .get_case(CaseKind::Office, "t-1")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_query_stays_within_kind() {
        let store = MemoryCaseStore::new();
        store.upsert_case(ticket("a", "u-1").into()).await.unwrap();
        store.upsert_case(ticket("b", "u-2").into()).await.unwrap();
        let office = Office::new(
            "o".into(),
            "u-1".into(),
            "u-9".into(),
            "chan-o".into(),
            None,
            Utc::now(),
        );
        store.upsert_case(office.into()).await.unwrap();

        let tickets = store
            .query_cases(CaseKind::Ticket, &CaseFilter::All)
            .await
            .unwrap();
        assert_eq!(tickets.len(), 2);

        let mine = store
            .query_cases(
                CaseKind::Ticket,
                &CaseFilter::OpenTicketsBy {
                    creator_id: "u-2".into(),
                },
            )
            .await
            .unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].id(), "b");
    }

    #[tokio::test]
    async fn test_audit_most_recent_first() {
        let store = MemoryCaseStore::new();
        for i in 0..3 {
            store
                .append_audit(AuditLogEntry::new(
                    AuditAction::TicketCreated,
                    format!("u-{}", i),
                    None,
                    "created",
                    Utc::now(),
                ))
                .await
                .unwrap();
        }
        let recent = store.list_audit(2).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].user_id, "u-2");
        assert_eq!(recent[1].user_id, "u-1");
    }

    #[tokio::test]
    async fn test_snapshot_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cases.json");

        {
            let store = MemoryCaseStore::open(&path).unwrap();
            store.upsert_case(ticket("t-1", "u-1").into()).await.unwrap();
        }

        let reopened = MemoryCaseStore::open(&path).unwrap();
        assert_eq!(reopened.len(), 1);
        assert!(reopened
            .get_case(CaseKind::Ticket, "t-1")
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_failed_snapshot_write_leaves_memory_unchanged() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cases.json");
        let store = MemoryCaseStore::open(&path).unwrap();
        store.upsert_case(ticket("t-1", "u-1").into()).await.unwrap();

        // a directory where the temp file goes makes every write fail
        std::fs::create_dir(path.with_extension("json.tmp")).unwrap();

        let mut changed = ticket("t-1", "u-2");
        changed.claimed_by = Some("u-3".into());
        assert!(store.upsert_case(changed.into()).await.is_err());
        assert!(store.upsert_case(ticket("t-2", "u-1").into()).await.is_err());
        let entry = AuditLogEntry::new(AuditAction::TicketCreated, "u-1", None, "created", Utc::now());
        assert!(store.append_audit(entry).await.is_err());

        assert_eq!(store.len(), 1);
        let kept = store.get_case(CaseKind::Ticket, "t-1").await.unwrap();
        assert!(matches!(kept, Some(StoredCase::Ticket(t)) if t.creator_id == "u-1" && t.claimed_by.is_none()));
        assert!(store.get_case(CaseKind::Ticket, "t-2").await.unwrap().is_none());
        assert!(store.list_audit(10).await.unwrap().is_empty());
    }
}
