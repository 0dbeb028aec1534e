//! RocksDB-backed case store
//!
//! One column family per case kind plus one for the audit log. Records are
//! stored as JSON for debuggability.

use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use rocksdb::{ColumnFamilyDescriptor, Options, DB};
use serde::{de::DeserializeOwned, Serialize};

use super::schema::{self, ALL_CFS};
use super::store::{CaseFilter, CaseStore, SharedCaseStore, StoreError, StoreResult};
use super::types::*;

/// Durable [`CaseStore`] over a local RocksDB directory
pub struct RocksCaseStore {
    db: RwLock<DB>,
    path: PathBuf,
}

impl RocksCaseStore {
    /// Opens `path`, creating the database and any missing column families
    pub fn open(path: impl Into<PathBuf>) -> StoreResult<Self> {
        let path = path.into();

        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let families = ALL_CFS
            .iter()
            .map(|cf| ColumnFamilyDescriptor::new(*cf, Options::default()));
        let db = DB::open_cf_descriptors(&opts, &path, families)?;

        Ok(Self {
            db: RwLock::new(db),
            path,
        })
    }

    pub fn shared(self) -> SharedCaseStore {
        Arc::new(self)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn put<T: Serialize>(&self, cf_name: &str, key: &str, value: &T) -> StoreResult<()> {
        let db = self.db.read().map_err(|_| StoreError::LockPoisoned)?;
        let cf = db
            .cf_handle(cf_name)
            .ok_or_else(|| StoreError::ColumnFamilyNotFound(cf_name.to_string()))?;

        let bytes =
            serde_json::to_vec(value).map_err(|e| StoreError::Serialization(e.to_string()))?;

        db.put_cf(&cf, key.as_bytes(), bytes)?;
        Ok(())
    }

    fn get<T: DeserializeOwned>(&self, cf_name: &str, key: &str) -> StoreResult<Option<T>> {
        let db = self.db.read().map_err(|_| StoreError::LockPoisoned)?;
        let cf = db
            .cf_handle(cf_name)
            .ok_or_else(|| StoreError::ColumnFamilyNotFound(cf_name.to_string()))?;

        match db.get_cf(&cf, key.as_bytes())? {
            Some(bytes) => {
                let value = serde_json::from_slice(&bytes)
                    .map_err(|e| StoreError::Deserialization(e.to_string()))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    fn scan<T: DeserializeOwned>(&self, cf_name: &str, mode: rocksdb::IteratorMode<'_>)
        -> StoreResult<Vec<T>> {
        let db = self.db.read().map_err(|_| StoreError::LockPoisoned)?;
        let cf = db
            .cf_handle(cf_name)
            .ok_or_else(|| StoreError::ColumnFamilyNotFound(cf_name.to_string()))?;

        let mut values = Vec::new();
        for result in db.iterator_cf(&cf, mode) {
            let (_, value) = result?;
            let value = serde_json::from_slice(&value)
                .map_err(|e| StoreError::Deserialization(e.to_string()))?;
            values.push(value);
        }
        Ok(values)
    }
}

#[async_trait]
impl CaseStore for RocksCaseStore {
    async fn allocate_id(&self, _kind: CaseKind) -> StoreResult<CaseId> {
        Ok(uuid::Uuid::new_v4().to_string())
    }

    async fn get_case(&self, kind: CaseKind, id: &str) -> StoreResult<Option<StoredCase>> {
        self.get(schema::cf_for(kind), &schema::keys::case(kind, id))
    }

    async fn upsert_case(&self, case: StoredCase) -> StoreResult<()> {
        let kind = case.kind();
        let key = schema::keys::case(kind, case.id());
        self.put(schema::cf_for(kind), &key, &case)
    }

    async fn query_cases(
        &self,
        kind: CaseKind,
        filter: &CaseFilter,
    ) -> StoreResult<Vec<StoredCase>> {
        let all: Vec<StoredCase> = self.scan(schema::cf_for(kind), rocksdb::IteratorMode::Start)?;
        Ok(all.into_iter().filter(|c| filter.matches(c)).collect())
    }

    async fn append_audit(&self, entry: AuditLogEntry) -> StoreResult<()> {
        let nanos = entry.timestamp.timestamp_nanos_opt().unwrap_or(0);
        let key = schema::keys::audit(nanos, &entry.id);
        self.put(schema::CF_AUDIT, &key, &entry)
    }

    async fn list_audit(&self, limit: usize) -> StoreResult<Vec<AuditLogEntry>> {
        let mut entries: Vec<AuditLogEntry> =
            self.scan(schema::CF_AUDIT, rocksdb::IteratorMode::End)?;
        entries.truncate(limit);
        Ok(entries)
    }
}
