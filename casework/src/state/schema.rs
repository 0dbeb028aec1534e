//! Key layout shared by the bundled stores
//!
//! Each case kind lives in its own namespace (a column family for RocksDB, a
//! key prefix for the snapshot store) and audit entries are keyed by
//! timestamp so a reverse scan yields the most recent first.

use super::types::CaseKind;

/// Column family for tickets
pub const CF_TICKETS: &str = "tickets";

/// Column family for offices
pub const CF_OFFICES: &str = "offices";

/// Column family for infractions
pub const CF_INFRACTIONS: &str = "infractions";

/// Column family for promotions
pub const CF_PROMOTIONS: &str = "promotions";

/// Column family for scheduled intents
pub const CF_INTENTS: &str = "intents";

/// Column family for the audit log
pub const CF_AUDIT: &str = "audit";

/// All column family names
pub const ALL_CFS: &[&str] = &[
    CF_TICKETS,
    CF_OFFICES,
    CF_INFRACTIONS,
    CF_PROMOTIONS,
    CF_INTENTS,
    CF_AUDIT,
];

/// Column family holding records of `kind`
pub fn cf_for(kind: CaseKind) -> &'static str {
    match kind {
        CaseKind::Ticket => CF_TICKETS,
        CaseKind::Office => CF_OFFICES,
        CaseKind::Infraction => CF_INFRACTIONS,
        CaseKind::Promotion => CF_PROMOTIONS,
        CaseKind::Intent => CF_INTENTS,
    }
}

/// Key prefixes for compound keys
pub mod keys {
    use super::CaseKind;

    /// Create a case key
    pub fn case(kind: CaseKind, id: &str) -> String {
        format!("{}:{}", kind.as_str(), id)
    }

    /// Prefix shared by every key of `kind`
    pub fn case_prefix(kind: CaseKind) -> String {
        format!("{}:", kind.as_str())
    }

    /// Create an audit key (zero-padded nanos keep lexical order == time order)
    pub fn audit(timestamp_nanos: i64, entry_id: &str) -> String {
        format!("audit:{:020}:{}", timestamp_nanos, entry_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_case_keys_are_namespaced() {
        assert_eq!(keys::case(CaseKind::Ticket, "abc"), "ticket:abc");
        assert!(keys::case(CaseKind::Office, "abc").starts_with(&keys::case_prefix(CaseKind::Office)));
    }

    #[test]
    fn test_audit_keys_sort_by_time() {
        let a = keys::audit(1_000, "z");
        let b = keys::audit(20_000, "a");
        assert!(a < b);
    }

    #[test]
    fn test_every_kind_has_a_cf() {
        for kind in CaseKind::all() {
            assert!(ALL_CFS.contains(&cf_for(*kind)));
        }
    }
}
