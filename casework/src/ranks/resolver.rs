//! Permission resolver: hierarchy queries over a member's held roles
//!
//! Held role sets arrive from the identity collaborator in no particular
//! order. Every answer here is derived by scanning the directory's total
//! order, so results never depend on input order.

use std::collections::HashSet;
use std::sync::Arc;

use super::directory::{Rank, RankDirectory};
use super::policy::{AccessPolicy, AccessRule, Operation};
use crate::error::{CaseError, CaseResult};

/// Answers rank and access questions for held role sets
#[derive(Debug, Clone)]
pub struct PermissionResolver {
    directory: Arc<RankDirectory>,
    policy: AccessPolicy,
}

impl PermissionResolver {
    pub fn new(directory: Arc<RankDirectory>, policy: AccessPolicy) -> Self {
        Self { directory, policy }
    }

    pub fn directory(&self) -> &RankDirectory {
        &self.directory
    }

    pub fn policy(&self) -> &AccessPolicy {
        &self.policy
    }

    /// Highest rank contained in `held`, if any
    pub fn highest_rank<I, S>(&self, held: I) -> Option<&Rank>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let held: HashSet<String> = held.into_iter().map(|k| k.as_ref().to_string()).collect();
        self.directory
            .all_ranks_ordered_high_to_low()
            .find(|rank| held.contains(&rank.key))
    }

    /// Level of a rank key; 0 for keys outside the directory
    pub fn rank_level(&self, key: &str) -> u32 {
        self.directory.rank_of(key).map(|r| r.level).unwrap_or(0)
    }

    /// Level of the highest held rank; 0 when none is held
    pub fn member_level<I, S>(&self, held: I) -> u32
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.highest_rank(held).map(|r| r.level).unwrap_or(0)
    }

    /// Whether the highest held rank is at or above `threshold_key`.
    /// Unknown thresholds admit nobody.
    pub fn has_at_least<I, S>(&self, held: I, threshold_key: &str) -> bool
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        match self.directory.rank_of(threshold_key) {
            Some(threshold) => self.member_level(held) >= threshold.level,
            None => false,
        }
    }

    /// Whether `held` contains the top-of-hierarchy rank
    pub fn is_top<I, S>(&self, held: I) -> bool
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let top = &self.directory.top_rank().key;
        held.into_iter().any(|k| k.as_ref() == top)
    }

    /// Evaluate an access rule
    pub fn allows<I, S>(&self, held: I, rule: &AccessRule) -> bool
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let held: Vec<String> = held.into_iter().map(|k| k.as_ref().to_string()).collect();

        if rule.top_only {
            return self.is_top(&held);
        }

        if let Some(min) = &rule.min_rank {
            if self.has_at_least(&held, min) {
                return true;
            }
        }

        !rule.categories.is_empty()
            && held
                .iter()
                .filter_map(|k| self.directory.rank_of(k))
                .any(|rank| rule.categories.contains(&rank.category))
    }

    /// Evaluate the configured rule for `op`
    pub fn permits<I, S>(&self, held: I, op: Operation) -> bool
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.allows(held, self.policy.rule(op))
    }

    /// `permits`, as a `PermissionDenied` error
    pub fn require<I, S>(&self, actor: &str, held: I, op: Operation) -> CaseResult<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        if self.permits(held, op) {
            Ok(())
        } else {
            Err(CaseError::permission_denied(actor, op.as_str()))
        }
    }

    /// False when the target's level is strictly above the actor's
    pub fn outranks_or_equal<A, T, S1, S2>(&self, actor_held: A, target_held: T) -> bool
    where
        A: IntoIterator<Item = S1>,
        T: IntoIterator<Item = S2>,
        S1: AsRef<str>,
        S2: AsRef<str>,
    {
        self.member_level(target_held) <= self.member_level(actor_held)
    }
}
