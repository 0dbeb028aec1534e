//! Disciplinary infractions
//!
//! | type | on approval |
//! |---|---|
//! | warning | nothing |
//! | suspension_1d/3d/1w/2w | staff roles revoked, `suspended` granted, expiry set |
//! | blacklist | staff roles revoked, `blacklisted` granted, no expiry |
//! | under_investigation | `under_investigation` granted |
//! | demotion | nothing here; the rank change goes through [`RankChangeService`](crate::promotions::RankChangeService) |

pub mod drafts;
pub mod lifecycle;

pub use drafts::{DraftStore, InfractionDraft};
pub use lifecycle::{ApprovalOutcome, ExpiryReport, InfractionLifecycle, RestoreReport};
