//! Case records
//!
//! These are the records the [`CaseStore`](super::CaseStore) persists. They
//! carry no behaviour beyond small status helpers; transitions live in the
//! lifecycle modules.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::str::FromStr;

use crate::ranks::RankCategory;

/// Stable, collaborator-assigned case identifier
pub type CaseId = String;

/// Opaque member identifier
pub type MemberId = String;

/// Closer recorded for transitions the sweep performs
pub const SYSTEM_ACTOR: &str = "system";

/// Kinds of stored records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseKind {
    Ticket,
    Office,
    Infraction,
    Promotion,
    Intent,
}

impl CaseKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ticket => "ticket",
            Self::Office => "office",
            Self::Infraction => "infraction",
            Self::Promotion => "promotion",
            Self::Intent => "intent",
        }
    }

    pub fn all() -> &'static [CaseKind] {
        &[
            Self::Ticket,
            Self::Office,
            Self::Infraction,
            Self::Promotion,
            Self::Intent,
        ]
    }
}

impl std::fmt::Display for CaseKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Tickets
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    Open,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketPriority {
    Low,
    #[default]
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketCategory {
    General,
    /// Report against a staff member; may be elevated
    StaffReport,
    Appeal,
}

/// Support request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticket {
    pub id: CaseId,
    pub channel_ref: String,
    pub creator_id: MemberId,
    pub category: TicketCategory,
    pub status: TicketStatus,
    pub priority: TicketPriority,
    #[serde(default)]
    pub claimed_by: Option<MemberId>,
    pub participants: BTreeSet<MemberId>,
    /// Reported member for staff reports
    #[serde(default)]
    pub subject_id: Option<MemberId>,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    #[serde(default)]
    pub reminder_sent_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub closed_by: Option<MemberId>,
    #[serde(default)]
    pub closed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub close_reason: Option<String>,
    #[serde(default)]
    pub elevated: bool,
    #[serde(default)]
    pub elevated_by: Option<MemberId>,
    #[serde(default)]
    pub viewing_category: Option<RankCategory>,
}

impl Ticket {
    pub fn new(
        id: CaseId,
        creator_id: MemberId,
        category: TicketCategory,
        channel_ref: String,
        subject_id: Option<MemberId>,
        now: DateTime<Utc>,
    ) -> Self {
        let mut participants = BTreeSet::new();
        participants.insert(creator_id.clone());
        Self {
            id,
            channel_ref,
            creator_id,
            category,
            status: TicketStatus::Open,
            priority: TicketPriority::default(),
            claimed_by: None,
            participants,
            subject_id,
            created_at: now,
            last_activity: now,
            reminder_sent_at: None,
            closed_by: None,
            closed_at: None,
            close_reason: None,
            elevated: false,
            elevated_by: None,
            viewing_category: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.status == TicketStatus::Open
    }

    /// Human-readable state for transition errors
    pub fn state_label(&self) -> &'static str {
        match (self.status, &self.claimed_by) {
            (TicketStatus::Closed, _) => "closed",
            (TicketStatus::Open, Some(_)) => "open(claimed)",
            (TicketStatus::Open, None) => "open(unclaimed)",
        }
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        if now > self.last_activity {
            self.last_activity = now;
        }
    }
}

// ============================================================================
// Offices
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OfficeStatus {
    Open,
    Closed,
}

/// Result recorded when an office closes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OfficeOutcome {
    NoAction,
    Warning,
    Infraction,
    Dismissed,
    Referred,
}

impl OfficeOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoAction => "no_action",
            Self::Warning => "warning",
            Self::Infraction => "infraction",
            Self::Dismissed => "dismissed",
            Self::Referred => "referred",
        }
    }
}

/// Post-closure fate of an office channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
    #[default]
    Undecided,
    Keep,
    #[serde(rename = "delete_24h")]
    Delete24h,
    DeleteNow,
}

impl std::fmt::Display for Disposition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Undecided => "undecided",
            Self::Keep => "keep",
            Self::Delete24h => "delete_24h",
            Self::DeleteNow => "delete_now",
        })
    }
}

/// Investigation dossier on a staff member
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Office {
    pub id: CaseId,
    pub channel_ref: String,
    pub target_id: MemberId,
    pub creator_id: MemberId,
    pub status: OfficeStatus,
    #[serde(default)]
    pub outcome: Option<OfficeOutcome>,
    #[serde(default)]
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub closed_by: Option<MemberId>,
    #[serde(default)]
    pub closed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub disposition: Disposition,
    #[serde(default)]
    pub disposition_by: Option<MemberId>,
    #[serde(default)]
    pub disposition_at: Option<DateTime<Utc>>,
}

impl Office {
    pub fn new(
        id: CaseId,
        target_id: MemberId,
        creator_id: MemberId,
        channel_ref: String,
        notes: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            channel_ref,
            target_id,
            creator_id,
            status: OfficeStatus::Open,
            outcome: None,
            notes,
            created_at: now,
            closed_by: None,
            closed_at: None,
            disposition: Disposition::Undecided,
            disposition_by: None,
            disposition_at: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.status == OfficeStatus::Open
    }
}

// ============================================================================
// Infractions
// ============================================================================

/// Disciplinary action kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InfractionType {
    Warning,
    #[serde(rename = "suspension_1d")]
    Suspension1d,
    #[serde(rename = "suspension_3d")]
    Suspension3d,
    #[serde(rename = "suspension_1w")]
    Suspension1w,
    #[serde(rename = "suspension_2w")]
    Suspension2w,
    Blacklist,
    UnderInvestigation,
    Demotion,
}

impl InfractionType {
    pub fn all() -> &'static [InfractionType] {
        &[
            Self::Warning,
            Self::Suspension1d,
            Self::Suspension3d,
            Self::Suspension1w,
            Self::Suspension2w,
            Self::Blacklist,
            Self::UnderInvestigation,
            Self::Demotion,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Warning => "warning",
            Self::Suspension1d => "suspension_1d",
            Self::Suspension3d => "suspension_3d",
            Self::Suspension1w => "suspension_1w",
            Self::Suspension2w => "suspension_2w",
            Self::Blacklist => "blacklist",
            Self::UnderInvestigation => "under_investigation",
            Self::Demotion => "demotion",
        }
    }

    /// Enforcement length for suspensions
    pub fn duration(&self) -> Option<Duration> {
        match self {
            Self::Suspension1d => Some(Duration::days(1)),
            Self::Suspension3d => Some(Duration::days(3)),
            Self::Suspension1w => Some(Duration::weeks(1)),
            Self::Suspension2w => Some(Duration::weeks(2)),
            _ => None,
        }
    }

    pub fn is_suspension(&self) -> bool {
        self.duration().is_some()
    }

    /// Whether approval revokes every staff role
    pub fn strips_staff_roles(&self) -> bool {
        self.is_suspension() || *self == Self::Blacklist
    }
}

impl std::fmt::Display for InfractionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InfractionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::all()
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown infraction type: {}", s))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InfractionStatus {
    PendingApproval,
    Active,
    Completed,
    ManuallyCompleted,
    Denied,
}

impl InfractionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::ManuallyCompleted | Self::Denied)
    }
}

impl std::fmt::Display for InfractionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::PendingApproval => "pending_approval",
            Self::Active => "active",
            Self::Completed => "completed",
            Self::ManuallyCompleted => "manually_completed",
            Self::Denied => "denied",
        })
    }
}

/// Disciplinary case against a member
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Infraction {
    pub id: CaseId,
    pub user_id: MemberId,
    pub issuer_id: MemberId,
    #[serde(rename = "type")]
    pub infraction_type: InfractionType,
    pub reason: String,
    #[serde(default)]
    pub evidence: Vec<String>,
    pub appealable: bool,
    pub status: InfractionStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub approved_by: Option<MemberId>,
    #[serde(default)]
    pub approved_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub denied_by: Option<MemberId>,
    #[serde(default)]
    pub denied_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub deny_reason: Option<String>,
    /// Staff roles held at approval time, restored when the suspension ends
    #[serde(default)]
    pub previous_roles: Option<BTreeSet<String>>,
    #[serde(default)]
    pub duration_secs: Option<i64>,
    #[serde(default)]
    pub expiry: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_by: Option<MemberId>,
}

impl Infraction {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: CaseId,
        user_id: MemberId,
        issuer_id: MemberId,
        infraction_type: InfractionType,
        reason: String,
        evidence: Vec<String>,
        appealable: bool,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            user_id,
            issuer_id,
            infraction_type,
            reason,
            evidence,
            appealable,
            status: InfractionStatus::PendingApproval,
            created_at: now,
            approved_by: None,
            approved_at: None,
            denied_by: None,
            denied_at: None,
            deny_reason: None,
            previous_roles: None,
            duration_secs: None,
            expiry: None,
            completed_at: None,
            completed_by: None,
        }
    }

    /// Active suspension whose expiry has passed at `now`
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == InfractionStatus::Active
            && self.infraction_type.is_suspension()
            && self.expiry.is_some_and(|expiry| now >= expiry)
    }

    pub fn is_active_suspension(&self) -> bool {
        self.status == InfractionStatus::Active && self.infraction_type.is_suspension()
    }

    /// Active and keeping the member's staff roles revoked (suspensions and
    /// blacklists)
    pub fn withholds_staff_roles(&self) -> bool {
        self.status == InfractionStatus::Active && self.infraction_type.strips_staff_roles()
    }
}

// ============================================================================
// Promotions and audit
// ============================================================================

/// Immutable record of a rank change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Promotion {
    pub id: CaseId,
    pub staff_id: MemberId,
    #[serde(default)]
    pub old_rank: Option<String>,
    pub new_rank: String,
    pub reason: String,
    pub promoter_id: MemberId,
    pub timestamp: DateTime<Utc>,
}

/// Audited actions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    TicketCreated,
    TicketClaimed,
    TicketPriorityChanged,
    TicketParticipantAdded,
    TicketParticipantRemoved,
    TicketClosed,
    TicketAutoClosed,
    TicketElevated,
    TicketVisibilityRestored,
    OfficeOpened,
    OfficeClosed,
    OfficeDispositionSet,
    InfractionCreated,
    InfractionApproved,
    InfractionDenied,
    InfractionCompleted,
    InfractionManuallyCompleted,
    RankChanged,
    IntentDispatched,
    IntentFailed,
}

/// Append-only audit record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub id: String,
    pub action_type: AuditAction,
    pub user_id: MemberId,
    #[serde(default)]
    pub target_id: Option<String>,
    pub details: String,
    pub timestamp: DateTime<Utc>,
}

impl AuditLogEntry {
    pub fn new(
        action_type: AuditAction,
        user_id: impl Into<String>,
        target_id: Option<&str>,
        details: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            action_type,
            user_id: user_id.into(),
            target_id: target_id.map(str::to_string),
            details: details.into(),
            timestamp,
        }
    }
}

// ============================================================================
// Scheduled intents
// ============================================================================

/// Deferred external side effect
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum IntentAction {
    DeleteChannel {
        channel_ref: String,
        case_kind: CaseKind,
        case_id: CaseId,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentStatus {
    Pending,
    Dispatched,
    Failed,
    /// Withdrawn before dispatch; the case that asked for it was not updated
    Cancelled,
}

/// Persisted, due-dated request for a side effect
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledIntent {
    pub id: CaseId,
    pub action: IntentAction,
    pub due_at: DateTime<Utc>,
    pub status: IntentStatus,
    #[serde(default)]
    pub attempts: u32,
    #[serde(default)]
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ScheduledIntent {
    pub fn new(id: CaseId, action: IntentAction, due_at: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        Self {
            id,
            action,
            due_at,
            status: IntentStatus::Pending,
            attempts: 0,
            last_error: None,
            created_at: now,
        }
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == IntentStatus::Pending && self.due_at <= now
    }
}

// ============================================================================
// Store envelope
// ============================================================================

/// Any record the store holds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "record", rename_all = "snake_case")]
pub enum StoredCase {
    Ticket(Ticket),
    Office(Office),
    Infraction(Infraction),
    Promotion(Promotion),
    Intent(ScheduledIntent),
}

impl StoredCase {
    pub fn kind(&self) -> CaseKind {
        match self {
            Self::Ticket(_) => CaseKind::Ticket,
            Self::Office(_) => CaseKind::Office,
            Self::Infraction(_) => CaseKind::Infraction,
            Self::Promotion(_) => CaseKind::Promotion,
            Self::Intent(_) => CaseKind::Intent,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Self::Ticket(t) => &t.id,
            Self::Office(o) => &o.id,
            Self::Infraction(i) => &i.id,
            Self::Promotion(p) => &p.id,
            Self::Intent(i) => &i.id,
        }
    }
}

impl From<Ticket> for StoredCase {
    fn from(t: Ticket) -> Self {
        Self::Ticket(t)
    }
}

impl From<Office> for StoredCase {
    fn from(o: Office) -> Self {
        Self::Office(o)
    }
}

impl From<Infraction> for StoredCase {
    fn from(i: Infraction) -> Self {
        Self::Infraction(i)
    }
}

impl From<Promotion> for StoredCase {
    fn from(p: Promotion) -> Self {
        Self::Promotion(p)
    }
}

impl From<ScheduledIntent> for StoredCase {
    fn from(i: ScheduledIntent) -> Self {
        Self::Intent(i)
    }
}
