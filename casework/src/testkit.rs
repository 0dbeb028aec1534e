//! In-process collaborators for tests and offline tooling
//!
//! [`FakeIdentity`] keeps member roles in memory and can be told to fail or
//! stall specific calls. [`RecordingNotifier`] and [`RecordingJanitor`]
//! remember what they were asked to do.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::collaborators::{
    ChannelJanitor, CollaboratorError, Collaborators, IdentityProvider, Notice, Notifier,
};

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

/// Role table held in memory
#[derive(Debug, Default)]
pub struct FakeIdentity {
    members: Mutex<BTreeMap<String, BTreeSet<String>>>,
    failing_roles: Mutex<HashSet<String>>,
    delay: Mutex<Option<Duration>>,
}

impl FakeIdentity {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`set_roles`](Self::set_roles)
    pub fn with_member(self, member: &str, roles: &[&str]) -> Self {
        self.set_roles(member, roles);
        self
    }

    pub fn set_roles(&self, member: &str, roles: &[&str]) {
        lock(&self.members).insert(
            member.to_string(),
            roles.iter().map(|r| r.to_string()).collect(),
        );
    }

    pub fn roles(&self, member: &str) -> BTreeSet<String> {
        lock(&self.members).get(member).cloned().unwrap_or_default()
    }

    /// Make every grant or revoke of `role` fail
    pub fn fail_role(&self, role: &str) {
        lock(&self.failing_roles).insert(role.to_string());
    }

    pub fn heal_role(&self, role: &str) {
        lock(&self.failing_roles).remove(role);
    }

    /// Delay every call by `delay`
    pub fn hang(&self, delay: Duration) {
        *lock(&self.delay) = Some(delay);
    }

    async fn pause(&self) {
        let delay = *lock(&self.delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    fn check_role(&self, role: &str) -> Result<(), CollaboratorError> {
        if lock(&self.failing_roles).contains(role) {
            return Err(CollaboratorError::Rejected(format!("role {} is locked", role)));
        }
        Ok(())
    }
}

#[async_trait]
impl IdentityProvider for FakeIdentity {
    async fn member_role_keys(&self, member: &str) -> Result<BTreeSet<String>, CollaboratorError> {
        self.pause().await;
        lock(&self.members)
            .get(member)
            .cloned()
            .ok_or_else(|| CollaboratorError::MemberNotFound(member.to_string()))
    }

    async fn grant_role(&self, member: &str, role: &str) -> Result<(), CollaboratorError> {
        self.pause().await;
        self.check_role(role)?;
        lock(&self.members)
            .entry(member.to_string())
            .or_default()
            .insert(role.to_string());
        Ok(())
    }

    async fn revoke_role(&self, member: &str, role: &str) -> Result<(), CollaboratorError> {
        self.pause().await;
        self.check_role(role)?;
        if let Some(roles) = lock(&self.members).get_mut(member) {
            roles.remove(role);
        }
        Ok(())
    }
}

/// Notifier that stores every notice
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    direct: Mutex<Vec<(String, Notice)>>,
    channel: Mutex<Vec<(String, Notice)>>,
    unreachable: Mutex<HashSet<String>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Direct messages in delivery order
    pub fn direct(&self) -> Vec<(String, Notice)> {
        lock(&self.direct).clone()
    }

    /// Log channel posts in delivery order
    pub fn channel_posts(&self) -> Vec<(String, Notice)> {
        lock(&self.channel).clone()
    }

    /// Direct messages to `member`
    pub fn sent_to(&self, member: &str) -> Vec<Notice> {
        lock(&self.direct)
            .iter()
            .filter(|(m, _)| m == member)
            .map(|(_, n)| n.clone())
            .collect()
    }

    /// Members with closed DMs
    pub fn block(&self, member: &str) {
        lock(&self.unreachable).insert(member.to_string());
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, member: &str, notice: Notice) -> Result<(), CollaboratorError> {
        if lock(&self.unreachable).contains(member) {
            return Err(CollaboratorError::Rejected(format!("{} does not accept DMs", member)));
        }
        lock(&self.direct).push((member.to_string(), notice));
        Ok(())
    }

    async fn log_to_channel(
        &self,
        channel_ref: &str,
        notice: Notice,
    ) -> Result<(), CollaboratorError> {
        lock(&self.channel).push((channel_ref.to_string(), notice));
        Ok(())
    }
}

/// Janitor that records deletions
#[derive(Debug, Default)]
pub struct RecordingJanitor {
    deleted: Mutex<Vec<String>>,
    failing: Mutex<HashSet<String>>,
    missing: Mutex<HashSet<String>>,
}

impl RecordingJanitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deleted(&self) -> Vec<String> {
        lock(&self.deleted).clone()
    }

    /// Deleting `channel_ref` fails until [`recover`](Self::recover)
    pub fn fail(&self, channel_ref: &str) {
        lock(&self.failing).insert(channel_ref.to_string());
    }

    pub fn recover(&self, channel_ref: &str) {
        lock(&self.failing).remove(channel_ref);
    }

    /// Report `channel_ref` as already gone
    pub fn forget(&self, channel_ref: &str) {
        lock(&self.missing).insert(channel_ref.to_string());
    }
}

#[async_trait]
impl ChannelJanitor for RecordingJanitor {
    async fn delete_channel(&self, channel_ref: &str) -> Result<(), CollaboratorError> {
        if lock(&self.failing).contains(channel_ref) {
            return Err(CollaboratorError::Unavailable(format!(
                "cannot delete {}",
                channel_ref
            )));
        }
        if lock(&self.missing).contains(channel_ref) {
            return Err(CollaboratorError::ChannelNotFound(channel_ref.to_string()));
        }
        lock(&self.deleted).push(channel_ref.to_string());
        Ok(())
    }
}

/// The three fakes, kept around for assertions
#[derive(Clone)]
pub struct TestCollaborators {
    pub identity: Arc<FakeIdentity>,
    pub notifier: Arc<RecordingNotifier>,
    pub janitor: Arc<RecordingJanitor>,
}

impl TestCollaborators {
    pub fn new(identity: FakeIdentity) -> Self {
        Self {
            identity: Arc::new(identity),
            notifier: Arc::new(RecordingNotifier::new()),
            janitor: Arc::new(RecordingJanitor::new()),
        }
    }

    /// Trait-object view for the engine
    pub fn collaborators(&self) -> Collaborators {
        Collaborators::new(
            self.identity.clone(),
            self.notifier.clone(),
            self.janitor.clone(),
        )
    }
}
