//! Collaborators for running the engine without a chat platform attached.
//!
//! Role lookups answer from the persisted state only (every member holds no
//! roles), role mutations and notices are logged, and channel deletions are
//! logged and reported as done.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use casework::collaborators::{
    ChannelJanitor, CollaboratorError, Collaborators, IdentityProvider, Notifier,
};
use casework::Notice;
use tracing::{info, warn};

/// Logs every outbound call instead of performing it
#[derive(Debug, Default)]
pub struct LogOnly {
    /// When set, channel deletions are refused so intents stay pending
    pub dry_run: bool,
}

impl LogOnly {
    pub fn collaborators(dry_run: bool) -> Collaborators {
        let this = Arc::new(Self { dry_run });
        Collaborators::new(this.clone(), this.clone(), this)
    }
}

#[async_trait]
impl IdentityProvider for LogOnly {
    async fn member_role_keys(&self, member: &str) -> Result<BTreeSet<String>, CollaboratorError> {
        warn!(member, "No identity provider attached, assuming no roles");
        Ok(BTreeSet::new())
    }

    async fn grant_role(&self, member: &str, role: &str) -> Result<(), CollaboratorError> {
        info!(member, role, "grant_role (offline)");
        Ok(())
    }

    async fn revoke_role(&self, member: &str, role: &str) -> Result<(), CollaboratorError> {
        info!(member, role, "revoke_role (offline)");
        Ok(())
    }
}

#[async_trait]
impl Notifier for LogOnly {
    async fn notify(&self, member: &str, notice: Notice) -> Result<(), CollaboratorError> {
        info!(member, kind = notice.kind(), "notify (offline)");
        Ok(())
    }

    async fn log_to_channel(
        &self,
        channel_ref: &str,
        notice: Notice,
    ) -> Result<(), CollaboratorError> {
        info!(channel = channel_ref, kind = notice.kind(), "log_to_channel (offline)");
        Ok(())
    }
}

#[async_trait]
impl ChannelJanitor for LogOnly {
    async fn delete_channel(&self, channel_ref: &str) -> Result<(), CollaboratorError> {
        if self.dry_run {
            return Err(CollaboratorError::Unavailable(format!(
                "dry run, not deleting {}",
                channel_ref
            )));
        }
        info!(channel = channel_ref, "delete_channel (offline)");
        Ok(())
    }
}
