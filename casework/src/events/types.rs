//! Case events
//!
//! Published after a transition has been persisted. Presentation
//! collaborators subscribe to render them; nothing in the engine depends on
//! anyone listening.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ranks::RankCategory;
use crate::state::{
    CaseId, CaseKind, Disposition, InfractionType, MemberId, OfficeOutcome, TicketCategory,
    TicketPriority,
};

/// Everything observable that happens to a case
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CaseEvent {
    TicketCreated {
        ticket_id: CaseId,
        creator_id: MemberId,
        category: TicketCategory,
        timestamp: DateTime<Utc>,
    },

    TicketClaimed {
        ticket_id: CaseId,
        claimed_by: MemberId,
        timestamp: DateTime<Utc>,
    },

    TicketPriorityChanged {
        ticket_id: CaseId,
        priority: TicketPriority,
        changed_by: MemberId,
        timestamp: DateTime<Utc>,
    },

    /// Participant added (`added = true`) or removed
    TicketParticipantChanged {
        ticket_id: CaseId,
        member_id: MemberId,
        added: bool,
        actor: MemberId,
        timestamp: DateTime<Utc>,
    },

    TicketReminderSent {
        ticket_id: CaseId,
        creator_id: MemberId,
        timestamp: DateTime<Utc>,
    },

    TicketClosed {
        ticket_id: CaseId,
        closed_by: MemberId,
        automatic: bool,
        timestamp: DateTime<Utc>,
    },

    TicketElevated {
        ticket_id: CaseId,
        viewing_category: RankCategory,
        alert_top_authority: bool,
        timestamp: DateTime<Utc>,
    },

    TicketVisibilityRestored {
        ticket_id: CaseId,
        timestamp: DateTime<Utc>,
    },

    OfficeOpened {
        office_id: CaseId,
        target_id: MemberId,
        creator_id: MemberId,
        timestamp: DateTime<Utc>,
    },

    OfficeClosed {
        office_id: CaseId,
        outcome: OfficeOutcome,
        closed_by: MemberId,
        timestamp: DateTime<Utc>,
    },

    OfficeDispositionSet {
        office_id: CaseId,
        disposition: Disposition,
        timestamp: DateTime<Utc>,
    },

    InfractionCreated {
        infraction_id: CaseId,
        user_id: MemberId,
        issuer_id: MemberId,
        infraction_type: InfractionType,
        timestamp: DateTime<Utc>,
    },

    InfractionApproved {
        infraction_id: CaseId,
        user_id: MemberId,
        approved_by: MemberId,
        expiry: Option<DateTime<Utc>>,
        timestamp: DateTime<Utc>,
    },

    InfractionDenied {
        infraction_id: CaseId,
        user_id: MemberId,
        denied_by: MemberId,
        timestamp: DateTime<Utc>,
    },

    /// Suspension ended by expiry (`manual = false`) or manual restore
    InfractionCompleted {
        infraction_id: CaseId,
        user_id: MemberId,
        manual: bool,
        timestamp: DateTime<Utc>,
    },

    RankChanged {
        staff_id: MemberId,
        old_rank: Option<String>,
        new_rank: String,
        timestamp: DateTime<Utc>,
    },

    IntentDispatched {
        intent_id: CaseId,
        channel_ref: String,
        timestamp: DateTime<Utc>,
    },

    IntentFailed {
        intent_id: CaseId,
        attempts: u32,
        error: String,
        timestamp: DateTime<Utc>,
    },
}

impl CaseEvent {
    /// Get the event type as a string
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::TicketCreated { .. } => "ticket_created",
            Self::TicketClaimed { .. } => "ticket_claimed",
            Self::TicketPriorityChanged { .. } => "ticket_priority_changed",
            Self::TicketParticipantChanged { .. } => "ticket_participant_changed",
            Self::TicketReminderSent { .. } => "ticket_reminder_sent",
            Self::TicketClosed { .. } => "ticket_closed",
            Self::TicketElevated { .. } => "ticket_elevated",
            Self::TicketVisibilityRestored { .. } => "ticket_visibility_restored",
            Self::OfficeOpened { .. } => "office_opened",
            Self::OfficeClosed { .. } => "office_closed",
            Self::OfficeDispositionSet { .. } => "office_disposition_set",
            Self::InfractionCreated { .. } => "infraction_created",
            Self::InfractionApproved { .. } => "infraction_approved",
            Self::InfractionDenied { .. } => "infraction_denied",
            Self::InfractionCompleted { .. } => "infraction_completed",
            Self::RankChanged { .. } => "rank_changed",
            Self::IntentDispatched { .. } => "intent_dispatched",
            Self::IntentFailed { .. } => "intent_failed",
        }
    }

    /// Get the timestamp of this event
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::TicketCreated { timestamp, .. }
            | Self::TicketClaimed { timestamp, .. }
            | Self::TicketPriorityChanged { timestamp, .. }
            | Self::TicketParticipantChanged { timestamp, .. }
            | Self::TicketReminderSent { timestamp, .. }
            | Self::TicketClosed { timestamp, .. }
            | Self::TicketElevated { timestamp, .. }
            | Self::TicketVisibilityRestored { timestamp, .. }
            | Self::OfficeOpened { timestamp, .. }
            | Self::OfficeClosed { timestamp, .. }
            | Self::OfficeDispositionSet { timestamp, .. }
            | Self::InfractionCreated { timestamp, .. }
            | Self::InfractionApproved { timestamp, .. }
            | Self::InfractionDenied { timestamp, .. }
            | Self::InfractionCompleted { timestamp, .. }
            | Self::RankChanged { timestamp, .. }
            | Self::IntentDispatched { timestamp, .. }
            | Self::IntentFailed { timestamp, .. } => *timestamp,
        }
    }

    /// Kind and id of the case this event concerns, if any
    pub fn case_ref(&self) -> Option<(CaseKind, &str)> {
        match self {
            Self::TicketCreated { ticket_id, .. }
            | Self::TicketClaimed { ticket_id, .. }
            | Self::TicketPriorityChanged { ticket_id, .. }
            | Self::TicketParticipantChanged { ticket_id, .. }
            | Self::TicketReminderSent { ticket_id, .. }
            | Self::TicketClosed { ticket_id, .. }
            | Self::TicketElevated { ticket_id, .. }
            | Self::TicketVisibilityRestored { ticket_id, .. } => {
                Some((CaseKind::Ticket, ticket_id.as_str()))
            }
            Self::OfficeOpened { office_id, .. }
            | Self::OfficeClosed { office_id, .. }
            | Self::OfficeDispositionSet { office_id, .. } => Some((CaseKind::Office, office_id.as_str())),
            Self::InfractionCreated { infraction_id, .. }
            | Self::InfractionApproved { infraction_id, .. }
            | Self::InfractionDenied { infraction_id, .. }
            | Self::InfractionCompleted { infraction_id, .. } => {
                Some((CaseKind::Infraction, infraction_id.as_str()))
            }
            Self::IntentDispatched { intent_id, .. } | Self::IntentFailed { intent_id, .. } => {
                Some((CaseKind::Intent, intent_id.as_str()))
            }
            Self::RankChanged { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialized_tag_matches_event_type() {
        let event = CaseEvent::OfficeDispositionSet {
            office_id: "o-1".into(),
            disposition: Disposition::Delete24h,
            timestamp: Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], event.event_type());
        assert_eq!(json["disposition"], "delete_24h");
        assert_eq!(event.case_ref(), Some((CaseKind::Office, "o-1")));
    }
}
