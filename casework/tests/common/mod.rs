//! Shared fixture: an engine over the in-memory store, a manual clock and
//! the recording collaborators, with one member per rank of interest.

#![allow(dead_code)]

use std::sync::Arc;

use casework::testkit::{FakeIdentity, TestCollaborators};
use casework::{Casework, CaseworkConfig, Clock, ManualClock, MemoryCaseStore};
use chrono::{DateTime, TimeZone, Utc};

pub const DIRECTOR: &str = "dana";
pub const MANAGER: &str = "milo";
pub const SUPERVISOR: &str = "suri";
pub const IA_AGENT: &str = "ines";
pub const SENIOR_ADMIN: &str = "sam";
pub const ADMIN: &str = "ada";
pub const MODERATOR: &str = "mona";
pub const MEMBER: &str = "pat";
pub const OTHER_MEMBER: &str = "quinn";

pub struct Harness {
    pub engine: Casework,
    pub clock: Arc<ManualClock>,
    pub fakes: TestCollaborators,
}

impl Harness {
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }
}

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

pub fn staff_identity() -> FakeIdentity {
    FakeIdentity::new()
        .with_member(DIRECTOR, &["director", "directive_team"])
        .with_member(MANAGER, &["manager", "management_team"])
        .with_member(SUPERVISOR, &["supervisor", "supervision_team"])
        .with_member(IA_AGENT, &["internal_affairs_agent", "internal_affairs_team"])
        .with_member(SENIOR_ADMIN, &["senior_admin", "administration_team"])
        .with_member(ADMIN, &["admin", "administration_team", "event_host"])
        .with_member(MODERATOR, &["moderator", "moderation_team"])
        .with_member(MEMBER, &["verified"])
        .with_member(OTHER_MEMBER, &["verified"])
}

pub fn test_config() -> CaseworkConfig {
    let mut config = CaseworkConfig::default();
    config.alerts.top_authority_id = Some(DIRECTOR.to_string());
    config.channels.infraction_log = Some("infraction-log".to_string());
    config.channels.ticket_log = Some("ticket-log".to_string());
    config
}

pub fn harness() -> Harness {
    harness_with(test_config(), staff_identity())
}

pub fn harness_with(config: CaseworkConfig, identity: FakeIdentity) -> Harness {
    let clock = Arc::new(ManualClock::new(t0()));
    let fakes = TestCollaborators::new(identity);
    let engine = Casework::new(
        config,
        MemoryCaseStore::new().shared(),
        fakes.collaborators(),
        clock.clone(),
    )
    .expect("test config is valid");
    Harness {
        engine,
        clock,
        fakes,
    }
}
