//! Staff-report escalation: who gets to see a report about a staff member
//!
//! A report is raised to the category directly above the reported member's
//! category. The table is fixed:
//!
//! ```text
//! moderation        → administration
//! administration    → internal_affairs
//! internal_affairs  → supervision
//! supervision       → directive
//! management        → directive
//! directive         → directive   (terminal, alerts the top authority)
//! none / unknown    → internal_affairs
//! ```

use serde::{Deserialize, Serialize};

use crate::ranks::RankCategory;

/// Where a report is routed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Escalation {
    pub viewing_category: RankCategory,
    /// No higher viewer exists; the designated top authority is told out of band
    pub alert_top_authority: bool,
}

/// Viewing category for a report against a member of `reported`
pub fn escalation_category(reported: Option<RankCategory>) -> Escalation {
    use RankCategory::*;
    let viewing_category = match reported {
        Some(Moderation) => Administration,
        Some(Administration) => InternalAffairs,
        Some(InternalAffairs) => Supervision,
        Some(Supervision) | Some(Management) => Directive,
        Some(Directive) => Directive,
        None => InternalAffairs,
    };
    Escalation {
        viewing_category,
        alert_top_authority: reported == Some(Directive),
    }
}
