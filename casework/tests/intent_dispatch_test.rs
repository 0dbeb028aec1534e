//! Scheduled intents and the reconciliation driver.

mod common;

use std::time::Duration as StdDuration;

use casework::state::{AuditAction, IntentStatus, TicketCategory};
use casework::{CaseEvent, EventFilter, MemoryCaseStore};
use chrono::Duration;
use common::*;
use tokio_util::sync::CancellationToken;

async fn closed_ticket(h: &Harness, channel_ref: &str) -> String {
    let ticket = h
        .engine
        .tickets()
        .create(MEMBER, TicketCategory::General, channel_ref, None)
        .await
        .unwrap();
    h.engine
        .tickets()
        .close(MODERATOR, &ticket.id, None)
        .await
        .unwrap();
    ticket.id
}

#[tokio::test]
async fn test_intent_waits_for_grace_period() {
    let h = harness();
    closed_ticket(&h, "chan-1").await;

    let report = h.engine.intents().dispatch_due(h.now()).await.unwrap();
    assert_eq!(report.due, 0);

    h.clock.advance(Duration::seconds(10));
    let report = h.engine.intents().dispatch_due(h.now()).await.unwrap();
    assert_eq!(report.dispatched, 1);
    assert_eq!(h.fakes.janitor.deleted(), vec!["chan-1".to_string()]);

    // never twice
    h.clock.advance(Duration::minutes(5));
    let report = h.engine.intents().dispatch_due(h.now()).await.unwrap();
    assert_eq!(report.due, 0);
    assert_eq!(h.fakes.janitor.deleted().len(), 1);
}

#[tokio::test]
async fn test_missing_channel_counts_as_deleted() {
    let h = harness();
    closed_ticket(&h, "chan-gone").await;
    h.fakes.janitor.forget("chan-gone");

    h.clock.advance(Duration::seconds(10));
    let report = h.engine.intents().dispatch_due(h.now()).await.unwrap();
    assert_eq!(report.dispatched, 1);
    assert!(h.engine.intents().pending().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_failed_dispatch_backs_off_then_gives_up() {
    let h = harness();
    let mut failures = h
        .engine
        .events()
        .subscribe_filtered(EventFilter::new().types(vec!["intent_failed"]));
    closed_ticket(&h, "chan-1").await;
    h.fakes.janitor.fail("chan-1");

    h.clock.advance(Duration::seconds(10));
    let first = h.engine.intents().dispatch_due(h.now()).await.unwrap();
    assert_eq!(first.retrying, 1);

    let intent = h.engine.intents().pending().await.unwrap().remove(0);
    assert_eq!(intent.attempts, 1);
    assert_eq!(intent.due_at, h.now() + Duration::seconds(60));
    assert!(intent.last_error.is_some());

    // not due again before the backoff
    h.clock.advance(Duration::seconds(30));
    assert_eq!(h.engine.intents().dispatch_due(h.now()).await.unwrap().due, 0);

    for attempt in 2..=5u32 {
        let pending = h.engine.intents().pending().await.unwrap();
        h.clock.set(pending[0].due_at);
        let report = h.engine.intents().dispatch_due(h.now()).await.unwrap();
        if attempt < 5 {
            assert_eq!(report.retrying, 1, "attempt {}", attempt);
        } else {
            assert_eq!(report.failed, 1);
        }
    }

    assert!(h.engine.intents().pending().await.unwrap().is_empty());
    match failures.recv().await.unwrap() {
        CaseEvent::IntentFailed { attempts, .. } => assert_eq!(attempts, 5),
        other => panic!("unexpected event {:?}", other),
    }
}

#[tokio::test]
async fn test_recovered_janitor_succeeds_on_retry() {
    let h = harness();
    closed_ticket(&h, "chan-1").await;
    h.fakes.janitor.fail("chan-1");

    h.clock.advance(Duration::seconds(10));
    h.engine.intents().dispatch_due(h.now()).await.unwrap();

    h.fakes.janitor.recover("chan-1");
    h.clock.advance(Duration::seconds(60));
    let report = h.engine.intents().dispatch_due(h.now()).await.unwrap();
    assert_eq!(report.dispatched, 1);

    let audit = h.engine.recent_audit(10).await.unwrap();
    assert_eq!(audit[0].action_type, AuditAction::IntentDispatched);
    assert!(audit[0].details.contains("chan-1"));
}

#[tokio::test]
async fn test_intents_survive_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");

    let clock = std::sync::Arc::new(casework::ManualClock::new(t0()));
    let fakes = casework::testkit::TestCollaborators::new(staff_identity());
    {
        let engine = casework::Casework::new(
            test_config(),
            MemoryCaseStore::open(&path).unwrap().shared(),
            fakes.collaborators(),
            clock.clone(),
        )
        .unwrap();
        let ticket = engine
            .tickets()
            .create(MEMBER, TicketCategory::General, "chan-1", None)
            .await
            .unwrap();
        engine.tickets().close(MEMBER, &ticket.id, None).await.unwrap();
    }

    let engine = casework::Casework::new(
        test_config(),
        MemoryCaseStore::open(&path).unwrap().shared(),
        fakes.collaborators(),
        clock.clone(),
    )
    .unwrap();
    let pending = engine.intents().pending().await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].status, IntentStatus::Pending);

    clock.advance(Duration::seconds(10));
    let report = engine
        .scheduler()
        .on_intent_dispatch_tick()
        .await
        .unwrap();
    assert_eq!(report.dispatched, 1);
    assert_eq!(fakes.janitor.deleted(), vec!["chan-1".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn test_scheduler_runs_until_cancelled() {
    let h = harness();
    closed_ticket(&h, "chan-1").await;
    h.clock.advance(Duration::minutes(1));

    let cancel = CancellationToken::new();
    let handle = h.engine.scheduler().spawn(cancel.clone());

    // intervals fire immediately on start
    tokio::time::sleep(StdDuration::from_secs(1)).await;
    assert_eq!(h.fakes.janitor.deleted(), vec!["chan-1".to_string()]);

    cancel.cancel();
    handle.await.unwrap();
}
