//! Rank changes (promotions and demotions)
//!
//! Every change leaves an immutable [`Promotion`] record. An actor may only
//! move members between ranks strictly below their own, unless they hold the
//! top rank.

use tracing::info;

use crate::collaborators::Notice;
use crate::context::{CaseContext, RoleOp, RoleOpsReport};
use crate::error::{CaseError, CaseResult};
use crate::events::CaseEvent;
use crate::ranks::Operation;
use crate::state::{AuditAction, CaseFilter, CaseKind, Promotion};

/// Result of a rank change
#[derive(Debug, Clone, PartialEq)]
pub struct RankChangeOutcome {
    pub promotion: Promotion,
    pub roles: RoleOpsReport,
}

#[derive(Clone)]
pub struct RankChangeService {
    ctx: CaseContext,
}

impl RankChangeService {
    pub fn new(ctx: CaseContext) -> Self {
        Self { ctx }
    }

    /// Move `staff_id` to `new_rank`
    pub async fn change_rank(
        &self,
        actor: &str,
        staff_id: &str,
        new_rank: &str,
        reason: &str,
    ) -> CaseResult<RankChangeOutcome> {
        if reason.trim().is_empty() {
            return Err(CaseError::validation("reason must not be empty"));
        }
        if actor == staff_id {
            return Err(CaseError::permission_denied(actor, "change their own rank"));
        }

        let directory = self.ctx.resolver.directory();
        let new = directory
            .rank_of(new_rank)
            .cloned()
            .ok_or_else(|| CaseError::UnknownRank {
                key: new_rank.to_string(),
            })?;

        let actor_roles = self.ctx.require(actor, Operation::ChangeRank).await?;
        let _member = self.ctx.locks.lock_member(staff_id).await;
        let staff_roles = self.ctx.roles_of(staff_id).await?;
        let old = self.ctx.resolver.highest_rank(&staff_roles).cloned();

        if old.as_ref().is_some_and(|o| o.key == new.key) {
            return Err(CaseError::validation(format!(
                "{} already holds {}",
                staff_id, new.key
            )));
        }

        if !self.ctx.resolver.is_top(&actor_roles) {
            let actor_level = self.ctx.resolver.member_level(&actor_roles);
            let old_level = old.as_ref().map(|r| r.level).unwrap_or(0);
            if actor_level <= new.level || actor_level <= old_level {
                return Err(CaseError::permission_denied(
                    actor,
                    format!("move {} to {}", staff_id, new.key),
                ));
            }
        }

        let now = self.ctx.now();
        let id = self.ctx.cases.allocate_id(CaseKind::Promotion).await?;
        let promotion = Promotion {
            id,
            staff_id: staff_id.to_string(),
            old_rank: old.as_ref().map(|r| r.key.clone()),
            new_rank: new.key.clone(),
            reason: reason.trim().to_string(),
            promoter_id: actor.to_string(),
            timestamp: now,
        };
        self.ctx.cases.save(promotion.clone()).await?;

        // every rank key the member holds goes, not only the highest
        let mut ops: Vec<RoleOp> = staff_roles
            .iter()
            .filter(|k| directory.rank_of(k).is_some() && **k != new.key)
            .cloned()
            .map(RoleOp::Revoke)
            .collect();
        let old_category = old.as_ref().map(|r| r.category);
        if old_category != Some(new.category) {
            if let Some(role) = old_category.and_then(|c| directory.category_role(c)) {
                if staff_roles.contains(role) {
                    ops.push(RoleOp::Revoke(role.to_string()));
                }
            }
            if let Some(role) = directory.category_role(new.category) {
                ops.push(RoleOp::Grant(role.to_string()));
            }
        }
        ops.push(RoleOp::Grant(new.key.clone()));
        let roles = self.ctx.apply_roles(staff_id, &ops).await;

        info!(
            staff = %staff_id,
            actor = %actor,
            old_rank = ?promotion.old_rank,
            new_rank = %new.key,
            role_failures = roles.failed_count(),
            "Rank changed"
        );
        self.ctx
            .audit(
                AuditAction::RankChanged,
                actor,
                Some(staff_id),
                format!(
                    "{} -> {}: {}",
                    promotion.old_rank.as_deref().unwrap_or("none"),
                    new.key,
                    promotion.reason
                ),
            )
            .await;
        let notice = Notice::RankChanged {
            staff_id: staff_id.to_string(),
            old_rank: promotion.old_rank.clone(),
            new_rank: new.key.clone(),
        };
        self.ctx
            .announce(staff_id, self.ctx.config.channels.promotion_log.as_deref(), notice)
            .await;
        self.ctx.publish(CaseEvent::RankChanged {
            staff_id: staff_id.to_string(),
            old_rank: promotion.old_rank.clone(),
            new_rank: new.key.clone(),
            timestamp: now,
        });

        Ok(RankChangeOutcome { promotion, roles })
    }

    /// Rank history of one member
    pub async fn history_of(&self, staff_id: &str) -> CaseResult<Vec<Promotion>> {
        let mut records = self
            .ctx
            .cases
            .promotions(&CaseFilter::PromotionsFor {
                staff_id: staff_id.to_string(),
            })
            .await?;
        records.sort_by_key(|p| p.timestamp);
        Ok(records)
    }
}
