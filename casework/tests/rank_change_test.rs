//! Promotions and demotions.

mod common;

use std::collections::BTreeSet;

use casework::CaseError;
use common::*;

fn set(roles: &[&str]) -> BTreeSet<String> {
    roles.iter().map(|r| r.to_string()).collect()
}

#[tokio::test]
async fn test_promotion_within_category() {
    let h = harness();
    let outcome = h
        .engine
        .rank_changes()
        .change_rank(SUPERVISOR, MODERATOR, "senior_moderator", "consistent work")
        .await
        .unwrap();

    assert_eq!(outcome.promotion.old_rank.as_deref(), Some("moderator"));
    assert_eq!(outcome.promotion.new_rank, "senior_moderator");
    assert!(outcome.roles.is_clean());
    assert_eq!(
        h.fakes.identity.roles(MODERATOR),
        set(&["moderation_team", "senior_moderator"])
    );
}

#[tokio::test]
async fn test_promotion_across_categories_swaps_team_role() {
    let h = harness();
    h.engine
        .rank_changes()
        .change_rank(MANAGER, MODERATOR, "trial_admin", "moving up")
        .await
        .unwrap();
    assert_eq!(
        h.fakes.identity.roles(MODERATOR),
        set(&["administration_team", "trial_admin"])
    );

    let history = h.engine.rank_changes().history_of(MODERATOR).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].promoter_id, MANAGER);
}

#[tokio::test]
async fn test_cannot_promote_to_own_level() {
    let h = harness();
    assert!(matches!(
        h.engine
            .rank_changes()
            .change_rank(SUPERVISOR, MODERATOR, "supervisor", "peer")
            .await,
        Err(CaseError::PermissionDenied { .. })
    ));
    // the top rank is exempt
    h.engine
        .rank_changes()
        .change_rank(DIRECTOR, MODERATOR, "manager", "exceptional")
        .await
        .unwrap();
}

#[tokio::test]
async fn test_rank_change_validation() {
    let h = harness();
    let changes = h.engine.rank_changes();

    assert!(matches!(
        changes.change_rank(SUPERVISOR, MODERATOR, "overlord", "x").await,
        Err(CaseError::UnknownRank { .. })
    ));
    assert!(matches!(
        changes.change_rank(SUPERVISOR, MODERATOR, "moderator", "x").await,
        Err(CaseError::Validation { .. })
    ));
    assert!(matches!(
        changes.change_rank(SUPERVISOR, MODERATOR, "admin", "  ").await,
        Err(CaseError::Validation { .. })
    ));
    assert!(matches!(
        changes.change_rank(SUPERVISOR, SUPERVISOR, "manager", "x").await,
        Err(CaseError::PermissionDenied { .. })
    ));
    assert!(matches!(
        changes.change_rank(ADMIN, MODERATOR, "senior_moderator", "x").await,
        Err(CaseError::PermissionDenied { .. })
    ));
}

#[tokio::test]
async fn test_demotion_of_higher_member_is_refused() {
    let h = harness();
    assert!(matches!(
        h.engine
            .rank_changes()
            .change_rank(SUPERVISOR, MANAGER, "moderator", "x")
            .await,
        Err(CaseError::PermissionDenied { .. })
    ));
}
