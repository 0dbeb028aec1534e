//! Case persistence
//!
//! - `types`: ticket, office, infraction, promotion, intent and audit records
//! - `store`: the [`CaseStore`] collaborator contract and the typed, bounded
//!   [`Cases`] view lifecycles use
//! - `memory`: in-process store with optional JSON snapshot file
//! - `rocks`: RocksDB store (feature `rocksdb-store`)
//!
//! # Usage
//!
//! ```ignore
//! use casework::state::{Cases, MemoryCaseStore};
//!
//! let store = MemoryCaseStore::open("./casework-state.json")?.shared();
//! let cases = Cases::new(store, std::time::Duration::from_secs(5));
//! let ticket = cases.ticket("7f3c").await?;
//! ```

pub mod memory;
#[cfg(feature = "rocksdb-store")]
pub mod rocks;
pub mod schema;
pub mod store;
pub mod types;

pub use memory::MemoryCaseStore;
#[cfg(feature = "rocksdb-store")]
pub use rocks::RocksCaseStore;
pub use store::{CaseFilter, CaseStore, Cases, SharedCaseStore, StoreError, StoreResult};
pub use types::{
    AuditAction, AuditLogEntry, CaseId, CaseKind, Disposition, Infraction, InfractionStatus,
    InfractionType, IntentAction, IntentStatus, MemberId, Office, OfficeOutcome, OfficeStatus,
    Promotion, ScheduledIntent, StoredCase, Ticket, TicketCategory, TicketPriority, TicketStatus,
    SYSTEM_ACTOR,
};
