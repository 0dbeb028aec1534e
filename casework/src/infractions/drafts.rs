//! Expiring drafts for multi-step infraction entry
//!
//! A draft belongs to the member who started it and lives until it is
//! submitted, discarded or left untouched for longer than the TTL.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{CaseError, CaseResult};
use crate::state::{InfractionType, MemberId};

/// Partially filled infraction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InfractionDraft {
    pub user_id: Option<MemberId>,
    pub infraction_type: Option<InfractionType>,
    pub reason: Option<String>,
    pub evidence: Vec<String>,
    pub appealable: bool,
}

impl Default for InfractionDraft {
    fn default() -> Self {
        Self {
            user_id: None,
            infraction_type: None,
            reason: None,
            evidence: Vec::new(),
            appealable: true,
        }
    }
}

impl InfractionDraft {
    /// Names of the fields still missing
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.user_id.is_none() {
            missing.push("user_id");
        }
        if self.infraction_type.is_none() {
            missing.push("infraction_type");
        }
        if self.reason.as_deref().map_or(true, |r| r.trim().is_empty()) {
            missing.push("reason");
        }
        missing
    }
}

#[derive(Debug)]
struct Entry<T> {
    owner: MemberId,
    value: T,
    touched_at: DateTime<Utc>,
}

/// Keyed, owner-scoped, expiring store
#[derive(Debug)]
pub struct DraftStore<T> {
    ttl: Duration,
    entries: Mutex<HashMap<String, Entry<T>>>,
}

impl<T: Clone> DraftStore<T> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn is_live(&self, entry: &Entry<T>, now: DateTime<Utc>) -> bool {
        now - entry.touched_at < self.ttl
    }

    /// Store a new draft and return its id
    pub fn start(&self, owner: &str, value: T, now: DateTime<Utc>) -> String {
        let id = uuid::Uuid::new_v4().to_string();
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.insert(
            id.clone(),
            Entry {
                owner: owner.to_string(),
                value,
                touched_at: now,
            },
        );
        id
    }

    /// Current value of a live draft
    pub fn get(&self, draft_id: &str, owner: &str, now: DateTime<Utc>) -> CaseResult<T> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        match entries.get(draft_id) {
            Some(entry) if entry.owner == owner && self.is_live(entry, now) => {
                Ok(entry.value.clone())
            }
            _ => Err(not_found(draft_id)),
        }
    }

    /// Mutate a live draft and refresh its TTL
    pub fn update<F>(&self, draft_id: &str, owner: &str, now: DateTime<Utc>, f: F) -> CaseResult<T>
    where
        F: FnOnce(&mut T),
    {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let live = entries
            .get(draft_id)
            .is_some_and(|entry| entry.owner == owner && self.is_live(entry, now));
        if !live {
            return Err(not_found(draft_id));
        }
        let entry = entries
            .get_mut(draft_id)
            .ok_or_else(|| not_found(draft_id))?;
        f(&mut entry.value);
        entry.touched_at = now;
        Ok(entry.value.clone())
    }

    /// Remove a live draft and return it
    pub fn take(&self, draft_id: &str, owner: &str, now: DateTime<Utc>) -> CaseResult<T> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        match entries.remove(draft_id) {
            Some(entry) if entry.owner == owner && self.is_live(&entry, now) => Ok(entry.value),
            Some(entry) if entry.owner != owner => {
                // not theirs; put it back untouched
                entries.insert(draft_id.to_string(), entry);
                Err(not_found(draft_id))
            }
            _ => Err(not_found(draft_id)),
        }
    }

    /// Drop expired drafts; returns how many were removed
    pub fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let before = entries.len();
        let ttl = self.ttl;
        entries.retain(|_, entry| now - entry.touched_at < ttl);
        let purged = before - entries.len();
        if purged > 0 {
            debug!(purged, "Purged expired drafts");
        }
        purged
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn not_found(draft_id: &str) -> CaseError {
    CaseError::DraftNotFound {
        draft_id: draft_id.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_update_refreshes_ttl() {
        let store = DraftStore::new(Duration::minutes(15));
        let id = store.start("issuer", InfractionDraft::default(), t0());

        let later = t0() + Duration::minutes(10);
        store
            .update(&id, "issuer", later, |d| d.reason = Some("spam".into()))
            .unwrap();

        // 20 minutes after start but only 10 after the update
        let draft = store.get(&id, "issuer", t0() + Duration::minutes(20)).unwrap();
        assert_eq!(draft.reason.as_deref(), Some("spam"));
    }

    #[test]
    fn test_expired_draft_is_gone() {
        let store = DraftStore::new(Duration::minutes(15));
        let id = store.start("issuer", InfractionDraft::default(), t0());
        let err = store
            .take(&id, "issuer", t0() + Duration::minutes(15))
            .unwrap_err();
        assert!(matches!(err, CaseError::DraftNotFound { .. }));
    }

    #[test]
    fn test_other_members_cannot_touch_draft() {
        let store = DraftStore::new(Duration::minutes(15));
        let id = store.start("issuer", InfractionDraft::default(), t0());
        assert!(store.take(&id, "someone-else", t0()).is_err());
        assert!(store.update(&id, "someone-else", t0(), |_| {}).is_err());
        assert!(store.take(&id, "issuer", t0()).is_ok());
        assert!(store.is_empty());
    }

    #[test]
    fn test_purge_expired() {
        let store = DraftStore::new(Duration::minutes(15));
        store.start("a", InfractionDraft::default(), t0());
        store.start("b", InfractionDraft::default(), t0() + Duration::minutes(10));
        assert_eq!(store.purge_expired(t0() + Duration::minutes(16)), 1);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_missing_fields() {
        let mut draft = InfractionDraft::default();
        assert_eq!(draft.missing_fields(), vec!["user_id", "infraction_type", "reason"]);
        draft.user_id = Some("u".into());
        draft.infraction_type = Some(InfractionType::Warning);
        draft.reason = Some("  ".into());
        assert_eq!(draft.missing_fields(), vec!["reason"]);
    }
}
