//! Infraction lifecycle: approval snapshots, timed expiry, manual restore
//! and the draft flow.

mod common;

use std::collections::BTreeSet;

use casework::state::{InfractionStatus, InfractionType};
use casework::{CaseError, Notice};
use chrono::{Duration, TimeZone, Utc};
use common::*;

fn set(roles: &[&str]) -> BTreeSet<String> {
    roles.iter().map(|r| r.to_string()).collect()
}

async fn approved(h: &Harness, user: &str, infraction_type: InfractionType) -> String {
    let infraction = h
        .engine
        .infractions()
        .create(SENIOR_ADMIN, user, infraction_type, "rule 4", vec![], true)
        .await
        .unwrap();
    h.engine
        .infractions()
        .approve(DIRECTOR, &infraction.id)
        .await
        .unwrap();
    infraction.id
}

#[tokio::test]
async fn test_suspension_1w_expires_and_restores_snapshot() {
    let h = harness();
    let infractions = h.engine.infractions();

    let pending = infractions
        .create(
            SENIOR_ADMIN,
            ADMIN,
            InfractionType::Suspension1w,
            "abuse of permissions",
            vec!["https://example.invalid/log/1".to_string()],
            true,
        )
        .await
        .unwrap();
    assert_eq!(pending.status, InfractionStatus::PendingApproval);
    // nothing changes before approval
    assert!(h.fakes.identity.roles(ADMIN).contains("admin"));

    let outcome = infractions.approve(DIRECTOR, &pending.id).await.unwrap();
    let infraction = outcome.infraction;
    assert!(outcome.roles.is_clean());
    assert_eq!(infraction.status, InfractionStatus::Active);
    assert_eq!(
        infraction.expiry,
        Some(Utc.with_ymd_and_hms(2024, 1, 8, 0, 0, 0).unwrap())
    );
    assert_eq!(
        infraction.previous_roles,
        Some(set(&["admin", "administration_team"]))
    );
    assert_eq!(h.fakes.identity.roles(ADMIN), set(&["event_host", "suspended"]));

    // one second early: nothing
    h.clock
        .set(Utc.with_ymd_and_hms(2024, 1, 7, 23, 59, 59).unwrap());
    let tick = h.engine.scheduler().on_suspension_sweep_tick().await.unwrap();
    assert_eq!(tick.expiry.completed, 0);

    h.clock.set(Utc.with_ymd_and_hms(2024, 1, 8, 0, 0, 1).unwrap());
    let tick = h.engine.scheduler().on_suspension_sweep_tick().await.unwrap();
    assert_eq!(tick.expiry.completed, 1);
    assert_eq!(tick.expiry.role_failures, 0);

    let done = infractions.get(&infraction.id).await.unwrap();
    assert_eq!(done.status, InfractionStatus::Completed);
    assert_eq!(
        h.fakes.identity.roles(ADMIN),
        set(&["admin", "administration_team", "event_host"])
    );
    assert!(h
        .fakes
        .notifier
        .sent_to(ADMIN)
        .iter()
        .any(|n| matches!(n, Notice::SuspensionEnded { manual: false, .. })));
}

#[tokio::test]
async fn test_expiry_is_exact() {
    let h = harness();
    let id = approved(&h, MODERATOR, InfractionType::Suspension1d).await;

    h.clock.set(t0() + Duration::hours(24));
    let report = h
        .engine
        .infractions()
        .expire_due(h.now())
        .await
        .unwrap();
    assert_eq!(report.completed, 1);
    assert_eq!(
        h.engine.infractions().get(&id).await.unwrap().status,
        InfractionStatus::Completed
    );
}

#[tokio::test]
async fn test_manual_restore_then_expiry_is_noop() {
    let h = harness();
    let id = approved(&h, MODERATOR, InfractionType::Suspension1d).await;

    h.clock.advance(Duration::hours(2));
    let report = h
        .engine
        .infractions()
        .manual_restore(DIRECTOR, MODERATOR)
        .await
        .unwrap()
        .into_result()
        .unwrap();
    assert_eq!(report.processed, 1);
    assert_eq!(
        h.fakes.identity.roles(MODERATOR),
        set(&["moderation_team", "moderator"])
    );

    h.clock.advance(Duration::days(2));
    let tick = h.engine.scheduler().on_suspension_sweep_tick().await.unwrap();
    assert_eq!(tick.expiry.completed, 0);

    let infraction = h.engine.infractions().get(&id).await.unwrap();
    assert_eq!(infraction.status, InfractionStatus::ManuallyCompleted);
    assert_eq!(infraction.completed_by.as_deref(), Some(DIRECTOR));
}

#[tokio::test]
async fn test_expiry_then_manual_restore_is_noop() {
    let h = harness();
    let id = approved(&h, MODERATOR, InfractionType::Suspension1d).await;

    h.clock.advance(Duration::days(1));
    h.engine.scheduler().on_suspension_sweep_tick().await.unwrap();

    let report = h
        .engine
        .infractions()
        .manual_restore(DIRECTOR, MODERATOR)
        .await
        .unwrap();
    assert_eq!(report.processed, 0);
    assert_eq!(
        h.engine.infractions().get(&id).await.unwrap().status,
        InfractionStatus::Completed
    );
}

#[tokio::test]
async fn test_concurrent_restore_and_expiry_pick_one_terminal_state() {
    let h = harness();
    let id = approved(&h, MODERATOR, InfractionType::Suspension1d).await;
    h.clock.advance(Duration::days(1));

    let infractions = h.engine.infractions().clone();
    let scheduler = h.engine.scheduler();
    let (restore, tick) = tokio::join!(
        infractions.manual_restore(DIRECTOR, MODERATOR),
        scheduler.on_suspension_sweep_tick()
    );
    let processed = restore.unwrap().processed;
    let completed = tick.unwrap().expiry.completed;
    assert_eq!(processed + completed, 1);

    let status = h.engine.infractions().get(&id).await.unwrap().status;
    assert!(matches!(
        status,
        InfractionStatus::Completed | InfractionStatus::ManuallyCompleted
    ));
}

#[tokio::test]
async fn test_overlapping_suspensions_restore_once_all_end() {
    let h = harness();
    approved(&h, ADMIN, InfractionType::Suspension1d).await;
    let long = approved(&h, ADMIN, InfractionType::Suspension1w).await;

    // the second snapshot carries the roles the first one withheld
    let second = h.engine.infractions().get(&long).await.unwrap();
    assert_eq!(
        second.previous_roles,
        Some(set(&["admin", "administration_team"]))
    );

    h.clock.advance(Duration::days(1));
    let tick = h.engine.scheduler().on_suspension_sweep_tick().await.unwrap();
    assert_eq!(tick.expiry.completed, 1);
    assert_eq!(tick.expiry.restores_deferred, 1);
    assert!(h.fakes.identity.roles(ADMIN).contains("suspended"));

    h.clock.advance(Duration::days(6));
    let tick = h.engine.scheduler().on_suspension_sweep_tick().await.unwrap();
    assert_eq!(tick.expiry.completed, 1);
    assert_eq!(tick.expiry.restores_deferred, 0);
    assert_eq!(
        h.fakes.identity.roles(ADMIN),
        set(&["admin", "administration_team", "event_host"])
    );
}

#[tokio::test]
async fn test_expiry_under_blacklist_keeps_roles_revoked() {
    let h = harness();
    approved(&h, MODERATOR, InfractionType::Suspension1d).await;
    let blacklist = approved(&h, MODERATOR, InfractionType::Blacklist).await;
    assert_eq!(
        h.fakes.identity.roles(MODERATOR),
        set(&["blacklisted", "suspended"])
    );
    // the blacklist snapshot inherits what the suspension withheld
    assert_eq!(
        h.engine.infractions().get(&blacklist).await.unwrap().previous_roles,
        Some(set(&["moderation_team", "moderator"]))
    );

    h.clock.advance(Duration::days(1) + Duration::seconds(1));
    let tick = h.engine.scheduler().on_suspension_sweep_tick().await.unwrap();
    assert_eq!(tick.expiry.completed, 1);
    assert_eq!(tick.expiry.restores_deferred, 1);
    assert_eq!(h.fakes.identity.roles(MODERATOR), set(&["blacklisted"]));
    assert_eq!(
        h.engine.infractions().get(&blacklist).await.unwrap().status,
        InfractionStatus::Active
    );
}

#[tokio::test]
async fn test_manual_restore_under_blacklist_keeps_roles_revoked() {
    let h = harness();
    let suspension = approved(&h, MODERATOR, InfractionType::Suspension3d).await;
    approved(&h, MODERATOR, InfractionType::Blacklist).await;

    let report = h
        .engine
        .infractions()
        .manual_restore(DIRECTOR, MODERATOR)
        .await
        .unwrap()
        .into_result()
        .unwrap();
    assert_eq!(report.processed, 1);
    assert!(report.deferred);
    assert_eq!(h.fakes.identity.roles(MODERATOR), set(&["blacklisted"]));
    assert_eq!(
        h.engine.infractions().get(&suspension).await.unwrap().status,
        InfractionStatus::ManuallyCompleted
    );
}

#[tokio::test]
async fn test_blacklist_has_no_expiry() {
    let h = harness();
    let id = approved(&h, MODERATOR, InfractionType::Blacklist).await;

    let infraction = h.engine.infractions().get(&id).await.unwrap();
    assert_eq!(infraction.expiry, None);
    assert_eq!(h.fakes.identity.roles(MODERATOR), set(&["blacklisted"]));

    h.clock.advance(Duration::weeks(52));
    let tick = h.engine.scheduler().on_suspension_sweep_tick().await.unwrap();
    assert_eq!(tick.expiry.examined, 0);
}

#[tokio::test]
async fn test_warning_changes_no_roles() {
    let h = harness();
    approved(&h, MODERATOR, InfractionType::Warning).await;
    assert_eq!(
        h.fakes.identity.roles(MODERATOR),
        set(&["moderation_team", "moderator"])
    );
}

#[tokio::test]
async fn test_denied_is_terminal() {
    let h = harness();
    let infractions = h.engine.infractions();
    let pending = infractions
        .create(SENIOR_ADMIN, MODERATOR, InfractionType::Suspension3d, "spam", vec![], false)
        .await
        .unwrap();

    let denied = infractions
        .deny(DIRECTOR, &pending.id, Some("insufficient evidence"))
        .await
        .unwrap();
    assert_eq!(denied.status, InfractionStatus::Denied);
    assert!(h
        .fakes
        .notifier
        .sent_to(SENIOR_ADMIN)
        .iter()
        .any(|n| matches!(n, Notice::InfractionDenied { .. })));

    assert!(matches!(
        infractions.approve(DIRECTOR, &pending.id).await,
        Err(CaseError::InvalidStateTransition { .. })
    ));
    assert_eq!(
        h.fakes.identity.roles(MODERATOR),
        set(&["moderation_team", "moderator"])
    );
}

#[tokio::test]
async fn test_authority_checks() {
    let h = harness();
    let infractions = h.engine.infractions();

    // moderators cannot issue
    assert!(matches!(
        infractions
            .create(MODERATOR, MEMBER, InfractionType::Warning, "x", vec![], true)
            .await,
        Err(CaseError::PermissionDenied { .. })
    ));
    // nobody can target a higher rank
    assert!(matches!(
        infractions
            .create(SENIOR_ADMIN, SUPERVISOR, InfractionType::Warning, "x", vec![], true)
            .await,
        Err(CaseError::PermissionDenied { .. })
    ));

    let pending = infractions
        .create(SENIOR_ADMIN, MODERATOR, InfractionType::Warning, "x", vec![], true)
        .await
        .unwrap();
    // only the top rank approves
    assert!(matches!(
        infractions.approve(MANAGER, &pending.id).await,
        Err(CaseError::PermissionDenied { .. })
    ));
    assert!(matches!(
        infractions.manual_restore(MANAGER, MODERATOR).await,
        Err(CaseError::PermissionDenied { .. })
    ));
}

#[tokio::test]
async fn test_draft_flow() {
    let h = harness();
    let infractions = h.engine.infractions();

    let draft_id = infractions.start_draft(IA_AGENT).await.unwrap();
    infractions
        .update_draft(IA_AGENT, &draft_id, |d| {
            d.user_id = Some(MODERATOR.to_string());
            d.infraction_type = Some(InfractionType::Suspension1d);
        })
        .unwrap();

    match infractions.submit_draft(IA_AGENT, &draft_id).await {
        Err(CaseError::Validation { message }) => assert!(message.contains("reason")),
        other => panic!("expected Validation, got {:?}", other),
    }

    infractions
        .update_draft(IA_AGENT, &draft_id, |d| {
            d.reason = Some("ignored escalation".to_string());
            d.evidence.push("msg-1".to_string());
        })
        .unwrap();
    let infraction = infractions.submit_draft(IA_AGENT, &draft_id).await.unwrap();
    assert_eq!(infraction.status, InfractionStatus::PendingApproval);
    assert_eq!(infraction.evidence, vec!["msg-1".to_string()]);
    assert!(infractions.drafts().is_empty());
    assert_eq!(infractions.pending().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_stale_drafts_are_purged_by_suspension_tick() {
    let h = harness();
    let infractions = h.engine.infractions();
    let draft_id = infractions.start_draft(IA_AGENT).await.unwrap();

    h.clock.advance(Duration::minutes(16));
    let tick = h.engine.scheduler().on_suspension_sweep_tick().await.unwrap();
    assert_eq!(tick.drafts_purged, 1);
    assert!(matches!(
        infractions.submit_draft(IA_AGENT, &draft_id).await,
        Err(CaseError::DraftNotFound { .. })
    ));
}

#[tokio::test]
async fn test_role_failures_surface_as_partial_failure() {
    let h = harness();
    approved(&h, MODERATOR, InfractionType::Suspension1w).await;
    h.fakes.identity.fail_role("moderator");

    let report = h
        .engine
        .infractions()
        .manual_restore(DIRECTOR, MODERATOR)
        .await
        .unwrap();
    assert_eq!(report.processed, 1);
    assert_eq!(report.failed_ops, vec!["grant:moderator".to_string()]);

    match report.into_result() {
        Err(CaseError::PartialFailure { succeeded, failed }) => {
            // revoke suspended + grant moderation_team
            assert_eq!(succeeded, 2);
            assert_eq!(failed, 1);
        }
        other => panic!("expected PartialFailure, got {:?}", other),
    }

    let posts = h.fakes.notifier.channel_posts();
    assert!(posts.iter().any(|(channel, notice)| channel == "infraction-log"
        && matches!(notice, Notice::RoleSyncFailed { .. })));
}
