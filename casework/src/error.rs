//! Case operation error types
//!
//! Every lifecycle operation returns [`CaseResult`]. Errors are recovered at
//! the boundary of the operation that raised them and can be converted into a
//! [`StructuredError`] for whatever surface (slash command, HTTP, CLI) is
//! presenting the result.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::state::{CaseKind, StoreError};

pub type CaseResult<T> = Result<T, CaseError>;

/// Error payload handed to the presentation collaborator, e.g.
///
/// ```json
/// {
///   "code": "ALREADY_CLAIMED",
///   "message": "Ticket 7f3c is already claimed by 1189",
///   "recovery_action": "Ask the current claimer to hand the ticket over",
///   "context": { "ticket_id": "7f3c" }
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredError {
    /// Stable machine code, see [`CaseError::code`]
    pub code: String,
    pub message: String,
    pub recovery_action: String,
    /// Identifiers of the case involved
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub context: BTreeMap<String, Value>,
    /// Same operation may succeed if repeated
    #[serde(default)]
    pub retryable: bool,
}

impl From<&CaseError> for StructuredError {
    fn from(err: &CaseError) -> Self {
        let mut context = BTreeMap::new();
        let mut put = |key: &str, value: Value| {
            context.insert(key.to_string(), value);
        };
        match err {
            CaseError::NotFound { kind, id }
            | CaseError::InvalidStateTransition { kind, id, .. }
            | CaseError::AlreadyClosed { kind, id } => {
                put("kind", Value::from(kind.to_string()));
                put("id", Value::from(id.as_str()));
            }
            CaseError::AlreadyClaimed { ticket_id, .. }
            | CaseError::AlreadyClaimedByYou { ticket_id }
            | CaseError::AlreadyElevated { ticket_id }
            | CaseError::NotElevated { ticket_id }
            | CaseError::CannotRemoveCreator { ticket_id } => {
                put("ticket_id", Value::from(ticket_id.as_str()));
            }
            CaseError::PartialFailure { succeeded, failed } => {
                put("succeeded", Value::from(*succeeded));
                put("failed", Value::from(*failed));
            }
            _ => {}
        }
        Self {
            code: err.code().to_string(),
            message: err.to_string(),
            recovery_action: err.recovery_suggestion().to_string(),
            context,
            retryable: err.is_retryable(),
        }
    }
}

impl std::fmt::Display for StructuredError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for StructuredError {}

/// Errors raised by case operations
#[derive(Error, Debug)]
pub enum CaseError {
    /// Rank or category check failed
    #[error("Permission denied: {actor} may not {operation}")]
    PermissionDenied { actor: String, operation: String },

    /// Case id could not be resolved
    #[error("{kind} not found: {id}")]
    NotFound { kind: CaseKind, id: String },

    /// Operation attempted on a case in an incompatible status
    #[error("Invalid state transition for {kind} {id}: {from} -> {to}")]
    InvalidStateTransition {
        kind: CaseKind,
        id: String,
        from: String,
        to: String,
    },

    /// Creator already has an open ticket
    #[error("Member {creator_id} already has an open ticket ({existing_id})")]
    DuplicateActiveTicket {
        creator_id: String,
        existing_id: String,
    },

    /// Actor tried to open an office against a strictly higher rank
    #[error(
        "{actor} (level {actor_level}) cannot investigate {target} (level {target_level})"
    )]
    InsufficientRankToInvestigate {
        actor: String,
        actor_level: u32,
        target: String,
        target_level: u32,
    },

    /// The ticket creator is always a participant
    #[error("The creator of ticket {ticket_id} cannot be removed")]
    CannotRemoveCreator { ticket_id: String },

    /// Batch of role operations finished with some failures
    #[error("Partial failure: {succeeded} succeeded, {failed} failed")]
    PartialFailure { succeeded: usize, failed: usize },

    /// Ticket claimed by someone else
    #[error("Ticket {ticket_id} is already claimed by {claimed_by}")]
    AlreadyClaimed {
        ticket_id: String,
        claimed_by: String,
    },

    /// Ticket already claimed by the same actor
    #[error("Ticket {ticket_id} is already claimed by you")]
    AlreadyClaimedByYou { ticket_id: String },

    /// Case is already closed
    #[error("{kind} {id} is already closed")]
    AlreadyClosed { kind: CaseKind, id: String },

    /// Ticket visibility already elevated
    #[error("Ticket {ticket_id} is already elevated")]
    AlreadyElevated { ticket_id: String },

    /// Ticket visibility was never elevated
    #[error("Ticket {ticket_id} is not elevated")]
    NotElevated { ticket_id: String },

    /// Office target holds no staff rank
    #[error("{target} does not hold a staff rank")]
    TargetNotStaff { target: String },

    /// Rank key absent from the directory
    #[error("Unknown rank: {key}")]
    UnknownRank { key: String },

    /// Infraction draft expired or never existed
    #[error("Draft not found or expired: {draft_id}")]
    DraftNotFound { draft_id: String },

    /// Invalid input parameters
    #[error("Invalid input: {message}")]
    Validation { message: String },

    /// A collaborator call exceeded its time bound
    #[error("{operation} timed out after {timeout_ms}ms")]
    CollaboratorTimeout { operation: String, timeout_ms: u64 },

    /// A collaborator call failed
    #[error("{operation} failed: {message}")]
    Collaborator { operation: String, message: String },

    /// Persistence failure
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl CaseError {
    /// Create a permission denied error
    pub fn permission_denied(actor: impl Into<String>, operation: impl Into<String>) -> Self {
        Self::PermissionDenied {
            actor: actor.into(),
            operation: operation.into(),
        }
    }

    /// Create a not found error
    pub fn not_found(kind: CaseKind, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    /// Create an invalid state transition error
    pub fn transition(
        kind: CaseKind,
        id: impl Into<String>,
        from: impl std::fmt::Display,
        to: impl std::fmt::Display,
    ) -> Self {
        Self::InvalidStateTransition {
            kind,
            id: id.into(),
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            Self::PermissionDenied { .. } => "PERMISSION_DENIED",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::InvalidStateTransition { .. } => "INVALID_STATE_TRANSITION",
            Self::DuplicateActiveTicket { .. } => "DUPLICATE_ACTIVE_TICKET",
            Self::InsufficientRankToInvestigate { .. } => "INSUFFICIENT_RANK_TO_INVESTIGATE",
            Self::CannotRemoveCreator { .. } => "CANNOT_REMOVE_CREATOR",
            Self::PartialFailure { .. } => "PARTIAL_FAILURE",
            Self::AlreadyClaimed { .. } => "ALREADY_CLAIMED",
            Self::AlreadyClaimedByYou { .. } => "ALREADY_CLAIMED_BY_YOU",
            Self::AlreadyClosed { .. } => "ALREADY_CLOSED",
            Self::AlreadyElevated { .. } => "ALREADY_ELEVATED",
            Self::NotElevated { .. } => "NOT_ELEVATED",
            Self::TargetNotStaff { .. } => "TARGET_NOT_STAFF",
            Self::UnknownRank { .. } => "UNKNOWN_RANK",
            Self::DraftNotFound { .. } => "DRAFT_NOT_FOUND",
            Self::Validation { .. } => "VALIDATION_ERROR",
            Self::CollaboratorTimeout { .. } => "COLLABORATOR_TIMEOUT",
            Self::Collaborator { .. } => "COLLABORATOR_ERROR",
            Self::Store(_) => "STORE_ERROR",
        }
    }

    /// Transient failures worth retrying unchanged
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::CollaboratorTimeout { .. } | Self::Collaborator { .. } => true,
            Self::Store(e) => e.is_transient(),
            _ => false,
        }
    }

    /// What the caller can do next
    pub fn recovery_suggestion(&self) -> &'static str {
        match self {
            Self::PermissionDenied { .. } => {
                "Ask a member whose rank covers this operation to perform it."
            }
            Self::NotFound { .. } => "Check the case id; it may belong to another case kind.",
            Self::InvalidStateTransition { .. } => {
                "Re-read the case; its status changed or does not allow this operation."
            }
            Self::DuplicateActiveTicket { .. } => {
                "Continue in the existing ticket or close it before opening another."
            }
            Self::InsufficientRankToInvestigate { .. } => {
                "Hand the investigation to someone ranked at or above the target."
            }
            Self::CannotRemoveCreator { .. } => "Close the ticket instead of removing its creator.",
            Self::PartialFailure { .. } => {
                "Some role changes failed; review the member's roles and apply the rest by hand."
            }
            Self::AlreadyClaimed { .. } => "Ask the current claimer to hand the ticket over.",
            Self::AlreadyClaimedByYou { .. } => "Nothing to do; the ticket is yours.",
            Self::AlreadyClosed { .. } => "Nothing to do; the case is closed.",
            Self::AlreadyElevated { .. } => "Restore visibility first if it must be re-elevated.",
            Self::NotElevated { .. } => "Nothing to restore.",
            Self::TargetNotStaff { .. } => "Offices are only opened for staff members.",
            Self::UnknownRank { .. } => "Use a rank key from the configured rank table.",
            Self::DraftNotFound { .. } => "Start a new draft; drafts expire after inactivity.",
            Self::Validation { .. } => "Check the request parameters and try again.",
            Self::CollaboratorTimeout { .. } | Self::Collaborator { .. } => {
                "A downstream service is unavailable. Retry shortly."
            }
            Self::Store(_) => "Persistence is unavailable. Retry shortly.",
        }
    }

    /// Payload for the presentation layer
    pub fn to_structured(&self) -> StructuredError {
        StructuredError::from(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_stable() {
        let err = CaseError::CannotRemoveCreator {
            ticket_id: "t-1".into(),
        };
        assert_eq!(err.code(), "CANNOT_REMOVE_CREATOR");
        let err = CaseError::PartialFailure {
            succeeded: 2,
            failed: 1,
        };
        assert_eq!(err.code(), "PARTIAL_FAILURE");
    }

    #[test]
    fn test_structured_carries_context() {
        let err = CaseError::AlreadyClaimed {
            ticket_id: "t-9".into(),
            claimed_by: "u-2".into(),
        };
        let structured = err.to_structured();
        assert_eq!(structured.code, "ALREADY_CLAIMED");
        assert_eq!(structured.context["ticket_id"], "t-9");
        assert!(!structured.retryable);
    }

    #[test]
    fn test_timeouts_are_retryable() {
        let err = CaseError::CollaboratorTimeout {
            operation: "grant_role".into(),
            timeout_ms: 5000,
        };
        assert!(err.is_retryable());
        assert!(err.to_structured().retryable);
        assert!(!CaseError::validation("bad").is_retryable());
    }
}
