//! Access rules per gated operation
//!
//! Every permission check is one of two shapes: a minimum rank level, or
//! membership of a category in a fixed allow-set. An [`AccessRule`] carries
//! both, and a member passes when either matches.

use serde::{Deserialize, Serialize};

use super::directory::{RankCategory, RankDirectory};

/// Operations gated by the resolver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    /// Claim, prioritize, manage participants and close any ticket
    TicketStaff,
    ElevateTicket,
    OpenOffice,
    CloseOffice,
    IssueInfraction,
    ApproveInfraction,
    RestoreInfraction,
    ChangeRank,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TicketStaff => "manage tickets",
            Self::ElevateTicket => "elevate tickets",
            Self::OpenOffice => "open offices",
            Self::CloseOffice => "close offices",
            Self::IssueInfraction => "issue infractions",
            Self::ApproveInfraction => "approve infractions",
            Self::RestoreInfraction => "restore infractions",
            Self::ChangeRank => "change ranks",
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Level threshold and/or category allow-set.
///
/// A rule with neither form (and not `top_only`) admits nobody.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessRule {
    /// Minimum rank key; members at or above its level pass
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_rank: Option<String>,

    /// Members holding any rank in one of these categories pass
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub categories: Vec<RankCategory>,

    /// Only the top-of-hierarchy rank passes; other fields are ignored
    #[serde(default)]
    pub top_only: bool,
}

impl AccessRule {
    pub fn at_least(key: &str) -> Self {
        Self {
            min_rank: Some(key.to_string()),
            ..Default::default()
        }
    }

    pub fn categories(categories: &[RankCategory]) -> Self {
        Self {
            categories: categories.to_vec(),
            ..Default::default()
        }
    }

    pub fn top_only() -> Self {
        Self {
            top_only: true,
            ..Default::default()
        }
    }

    pub fn or_categories(mut self, categories: &[RankCategory]) -> Self {
        self.categories.extend_from_slice(categories);
        self
    }
}

/// Rule per operation, overridable from configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccessPolicy {
    pub ticket_staff: AccessRule,
    pub elevate_ticket: AccessRule,
    pub open_office: AccessRule,
    pub close_office: AccessRule,
    pub issue_infraction: AccessRule,
    pub approve_infraction: AccessRule,
    pub restore_infraction: AccessRule,
    pub change_rank: AccessRule,
}

impl Default for AccessPolicy {
    fn default() -> Self {
        use RankCategory::*;
        let investigators = [InternalAffairs, Supervision, Management, Directive];
        Self {
            ticket_staff: AccessRule::at_least("trial_moderator"),
            elevate_ticket: AccessRule::at_least("trial_admin"),
            open_office: AccessRule::categories(&investigators),
            close_office: AccessRule::categories(&investigators),
            issue_infraction: AccessRule::at_least("senior_admin").or_categories(&[InternalAffairs]),
            approve_infraction: AccessRule::top_only(),
            restore_infraction: AccessRule::top_only(),
            change_rank: AccessRule::at_least("supervisor"),
        }
    }
}

impl AccessPolicy {
    pub fn rule(&self, op: Operation) -> &AccessRule {
        match op {
            Operation::TicketStaff => &self.ticket_staff,
            Operation::ElevateTicket => &self.elevate_ticket,
            Operation::OpenOffice => &self.open_office,
            Operation::CloseOffice => &self.close_office,
            Operation::IssueInfraction => &self.issue_infraction,
            Operation::ApproveInfraction => &self.approve_infraction,
            Operation::RestoreInfraction => &self.restore_infraction,
            Operation::ChangeRank => &self.change_rank,
        }
    }

    /// Rank keys referenced by rules that the directory does not know
    pub fn unknown_ranks(&self, directory: &RankDirectory) -> Vec<String> {
        [
            &self.ticket_staff,
            &self.elevate_ticket,
            &self.open_office,
            &self.close_office,
            &self.issue_infraction,
            &self.approve_infraction,
            &self.restore_infraction,
            &self.change_rank,
        ]
        .iter()
        .filter_map(|rule| rule.min_rank.as_deref())
        .filter(|key| directory.rank_of(key).is_none())
        .map(str::to_string)
        .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy_references_known_ranks() {
        let dir = RankDirectory::standard();
        assert!(AccessPolicy::default().unknown_ranks(&dir).is_empty());
    }

    #[test]
    fn test_policy_overrides_from_toml() {
        let policy: AccessPolicy = toml::from_str(
            r#"
            [elevate_ticket]
            min_rank = "admin"
            categories = ["internal_affairs"]
            "#,
        )
        .unwrap();
        assert_eq!(policy.elevate_ticket.min_rank.as_deref(), Some("admin"));
        assert_eq!(policy.elevate_ticket.categories, vec![RankCategory::InternalAffairs]);
        // untouched rules keep defaults
        assert!(policy.approve_infraction.top_only);
    }
}
