//! Failure injection at the identity seam: role mutations that fail, and
//! lookups that never answer.

mod common;

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use casework::collaborators::{CollaboratorError, Collaborators, IdentityProvider};
use casework::state::{InfractionStatus, InfractionType, TicketCategory};
use casework::testkit::{RecordingJanitor, RecordingNotifier};
use casework::{CaseError, Casework, ManualClock, MemoryCaseStore, Notice};
use common::*;
use mockall::mock;
use mockall::predicate::eq;

mock! {
    pub Identity {}

    #[async_trait]
    impl IdentityProvider for Identity {
        async fn member_role_keys(&self, member: &str) -> Result<BTreeSet<String>, CollaboratorError>;
        async fn grant_role(&self, member: &str, role: &str) -> Result<(), CollaboratorError>;
        async fn revoke_role(&self, member: &str, role: &str) -> Result<(), CollaboratorError>;
    }
}

fn roles_for(member: &str) -> Result<BTreeSet<String>, CollaboratorError> {
    let roles: &[&str] = match member {
        DIRECTOR => &["director", "directive_team"],
        SENIOR_ADMIN => &["senior_admin", "administration_team"],
        MODERATOR => &["moderator", "moderation_team"],
        other => return Err(CollaboratorError::MemberNotFound(other.to_string())),
    };
    Ok(roles.iter().map(|r| r.to_string()).collect())
}

fn engine_with(identity: MockIdentity, notifier: Arc<RecordingNotifier>) -> Casework {
    let collaborators = Collaborators::new(
        Arc::new(identity),
        notifier,
        Arc::new(RecordingJanitor::new()),
    );
    Casework::new(
        test_config(),
        MemoryCaseStore::new().shared(),
        collaborators,
        Arc::new(ManualClock::new(t0())),
    )
    .unwrap()
}

#[tokio::test]
async fn test_failed_grant_keeps_approval_and_reports() {
    let mut identity = MockIdentity::new();
    identity
        .expect_member_role_keys()
        .returning(|member: &str| roles_for(member));
    identity
        .expect_revoke_role()
        .with(eq(MODERATOR), mockall::predicate::always())
        .times(2)
        .returning(|_, _| Ok(()));
    identity
        .expect_grant_role()
        .with(eq(MODERATOR), eq("suspended"))
        .times(1)
        .returning(|_, _| Err(CollaboratorError::Unavailable("gateway down".to_string())));

    let notifier = Arc::new(RecordingNotifier::new());
    let engine = engine_with(identity, notifier.clone());

    let pending = engine
        .infractions()
        .create(SENIOR_ADMIN, MODERATOR, InfractionType::Suspension3d, "spam", vec![], true)
        .await
        .unwrap();
    let outcome = engine
        .infractions()
        .approve(DIRECTOR, &pending.id)
        .await
        .unwrap();

    // the transition stands; the failure is reported, not rolled back
    assert_eq!(outcome.infraction.status, InfractionStatus::Active);
    assert_eq!(outcome.roles.succeeded, 2);
    assert_eq!(outcome.roles.failed, vec!["grant:suspended".to_string()]);

    let alerts: Vec<_> = notifier
        .channel_posts()
        .into_iter()
        .filter(|(_, n)| matches!(n, Notice::RoleSyncFailed { .. }))
        .collect();
    assert_eq!(alerts.len(), 1);
}

#[tokio::test]
async fn test_unknown_member_is_a_collaborator_error() {
    let mut identity = MockIdentity::new();
    identity
        .expect_member_role_keys()
        .returning(|member: &str| roles_for(member));
    identity.expect_grant_role().never();
    identity.expect_revoke_role().never();

    let engine = engine_with(identity, Arc::new(RecordingNotifier::new()));
    let err = engine
        .tickets()
        .claim("nobody", "t-1")
        .await
        .unwrap_err();
    assert!(matches!(err, CaseError::Collaborator { .. }));
    assert_eq!(err.to_structured().code, "COLLABORATOR_ERROR");
}

#[tokio::test(start_paused = true)]
async fn test_stalled_identity_times_out() {
    let h = harness();
    let ticket = h
        .engine
        .tickets()
        .create(MEMBER, TicketCategory::General, "chan-1", None)
        .await
        .unwrap();

    h.fakes.identity.hang(StdDuration::from_secs(30));
    let err = h
        .engine
        .tickets()
        .claim(MODERATOR, &ticket.id)
        .await
        .unwrap_err();
    assert!(err.is_retryable());
    match err {
        CaseError::CollaboratorTimeout { timeout_ms, .. } => assert_eq!(timeout_ms, 5000),
        other => panic!("expected CollaboratorTimeout, got {:?}", other),
    }
}
