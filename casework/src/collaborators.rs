//! External collaborators
//!
//! The engine never talks to the chat platform directly. Member roles,
//! notifications and channel deletion go through the traits below, and every
//! call is wrapped in [`bounded`] so a stalled collaborator surfaces as
//! [`CaseError::CollaboratorTimeout`] instead of hanging a lifecycle.

use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CaseError, CaseResult};
use crate::ranks::RankCategory;
use crate::state::{CaseId, InfractionType, MemberId, OfficeOutcome, StoreError};

/// Error reported by a collaborator implementation
#[derive(Debug, Clone, thiserror::Error)]
pub enum CollaboratorError {
    #[error("Member not found: {0}")]
    MemberNotFound(String),

    #[error("Channel not found: {0}")]
    ChannelNotFound(String),

    #[error("Rejected: {0}")]
    Rejected(String),

    #[error("Unavailable: {0}")]
    Unavailable(String),
}

/// Conversion into a [`CaseError`] tagged with the failing operation
pub trait IntoCaseError {
    fn into_case_error(self, operation: &str) -> CaseError;
}

impl IntoCaseError for StoreError {
    fn into_case_error(self, _operation: &str) -> CaseError {
        CaseError::Store(self)
    }
}

impl IntoCaseError for CollaboratorError {
    fn into_case_error(self, operation: &str) -> CaseError {
        CaseError::Collaborator {
            operation: operation.to_string(),
            message: self.to_string(),
        }
    }
}

impl IntoCaseError for CaseError {
    fn into_case_error(self, _operation: &str) -> CaseError {
        self
    }
}

/// Run a collaborator call under a time bound
pub async fn bounded<T, E, F>(operation: &str, limit: Duration, fut: F) -> CaseResult<T>
where
    F: Future<Output = Result<T, E>>,
    E: IntoCaseError,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(e.into_case_error(operation)),
        Err(_) => Err(CaseError::CollaboratorTimeout {
            operation: operation.to_string(),
            timeout_ms: limit.as_millis() as u64,
        }),
    }
}

/// Member role lookup and mutation
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Every role key the member currently holds, in no particular order
    async fn member_role_keys(&self, member: &str) -> Result<BTreeSet<String>, CollaboratorError>;

    async fn grant_role(&self, member: &str, role: &str) -> Result<(), CollaboratorError>;

    async fn revoke_role(&self, member: &str, role: &str) -> Result<(), CollaboratorError>;
}

/// Message delivery; rendering is the implementation's concern
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Direct message to a member
    async fn notify(&self, member: &str, notice: Notice) -> Result<(), CollaboratorError>;

    /// Post to a log channel
    async fn log_to_channel(&self, channel_ref: &str, notice: Notice)
        -> Result<(), CollaboratorError>;
}

/// Consumer of channel deletion intents
#[async_trait]
pub trait ChannelJanitor: Send + Sync {
    async fn delete_channel(&self, channel_ref: &str) -> Result<(), CollaboratorError>;
}

pub type SharedIdentity = Arc<dyn IdentityProvider>;
pub type SharedNotifier = Arc<dyn Notifier>;
pub type SharedJanitor = Arc<dyn ChannelJanitor>;

/// Everything the engine needs from the outside world besides storage
#[derive(Clone)]
pub struct Collaborators {
    pub identity: SharedIdentity,
    pub notifier: SharedNotifier,
    pub janitor: SharedJanitor,
}

impl Collaborators {
    pub fn new(identity: SharedIdentity, notifier: SharedNotifier, janitor: SharedJanitor) -> Self {
        Self {
            identity,
            notifier,
            janitor,
        }
    }
}

/// Data handed to the notifier. Presentation (wording, embeds, colors) is
/// left entirely to the implementation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "notice", rename_all = "snake_case")]
pub enum Notice {
    TicketReminder {
        ticket_id: CaseId,
        idle_since: DateTime<Utc>,
    },
    TicketClosed {
        ticket_id: CaseId,
        closed_by: MemberId,
        reason: Option<String>,
        automatic: bool,
    },
    TicketElevated {
        ticket_id: CaseId,
        viewing_category: RankCategory,
    },
    /// Report against a top-category member; nobody above can view it
    TopAuthorityAlert {
        ticket_id: CaseId,
        subject_id: Option<MemberId>,
    },
    InfractionPendingApproval {
        infraction_id: CaseId,
        user_id: MemberId,
        issuer_id: MemberId,
        infraction_type: InfractionType,
        reason: String,
    },
    InfractionApproved {
        infraction_id: CaseId,
        infraction_type: InfractionType,
        expiry: Option<DateTime<Utc>>,
    },
    InfractionDenied {
        infraction_id: CaseId,
        reason: Option<String>,
    },
    SuspensionEnded {
        infraction_id: CaseId,
        manual: bool,
    },
    /// Some role changes did not go through and need a human
    RoleSyncFailed {
        user_id: MemberId,
        infraction_id: CaseId,
        failed_roles: Vec<String>,
    },
    OfficeClosed {
        office_id: CaseId,
        outcome: OfficeOutcome,
    },
    RankChanged {
        staff_id: MemberId,
        old_rank: Option<String>,
        new_rank: String,
    },
}

impl Notice {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::TicketReminder { .. } => "ticket_reminder",
            Self::TicketClosed { .. } => "ticket_closed",
            Self::TicketElevated { .. } => "ticket_elevated",
            Self::TopAuthorityAlert { .. } => "top_authority_alert",
            Self::InfractionPendingApproval { .. } => "infraction_pending_approval",
            Self::InfractionApproved { .. } => "infraction_approved",
            Self::InfractionDenied { .. } => "infraction_denied",
            Self::SuspensionEnded { .. } => "suspension_ended",
            Self::RoleSyncFailed { .. } => "role_sync_failed",
            Self::OfficeClosed { .. } => "office_closed",
            Self::RankChanged { .. } => "rank_changed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bounded_passes_through() {
        let v: CaseResult<u32> = bounded("op", Duration::from_secs(1), async {
            Ok::<_, CollaboratorError>(7)
        })
        .await;
        assert_eq!(v.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_bounded_maps_collaborator_error() {
        let err = bounded("grant_role", Duration::from_secs(1), async {
            Err::<(), _>(CollaboratorError::Rejected("missing permission".into()))
        })
        .await
        .unwrap_err();
        match err {
            CaseError::Collaborator { operation, message } => {
                assert_eq!(operation, "grant_role");
                assert!(message.contains("missing permission"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_bounded_times_out() {
        let err = bounded("delete_channel", Duration::from_millis(50), async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok::<(), CollaboratorError>(())
        })
        .await
        .unwrap_err();
        assert!(matches!(
            err,
            CaseError::CollaboratorTimeout { timeout_ms: 50, .. }
        ));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_notice_is_tagged() {
        let notice = Notice::SuspensionEnded {
            infraction_id: "i-1".into(),
            manual: true,
        };
        let json = serde_json::to_value(&notice).unwrap();
        assert_eq!(json["notice"], "suspension_ended");
        assert_eq!(notice.kind(), "suspension_ended");
    }
}
