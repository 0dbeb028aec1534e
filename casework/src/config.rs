//! Engine configuration
//!
//! Loaded from TOML, then overridden from the environment.
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |---|---|---|
//! | `CASEWORK_TOP_AUTHORITY_ID` | unset | Member alerted about reports against the top category |
//! | `CASEWORK_COLLABORATOR_TIMEOUT_MS` | `5000` | Bound on every store, identity, notifier and janitor call |
//! | `CASEWORK_SUSPENSION_SWEEP_SECS` | `300` | Suspension expiry sweep interval |
//! | `CASEWORK_TICKET_SWEEP_SECS` | `21600` | Ticket inactivity sweep interval |
//! | `CASEWORK_STATE_PATH` | unset | JSON snapshot file for the bundled store |
//!
//! # Example
//!
//! ```toml
//! state_path = "/var/lib/casework/state.json"
//!
//! [tickets]
//! reminder_after_secs = 86400
//! auto_close_after_secs = 172800
//!
//! [alerts]
//! top_authority_id = "100200300"
//!
//! [channels]
//! approval_log = "staff-approvals"
//!
//! [access.change_rank]
//! min_rank = "manager"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::ranks::{AccessPolicy, CategoryRole, RankDirectory, RankSpec, RankTable, RankTableError};

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for {var}: {value}")]
    InvalidEnv { var: String, value: String },

    #[error("Invalid rank table: {0}")]
    RankTable(#[from] RankTableError),

    #[error("Access policy references unknown ranks: {0:?}")]
    UnknownAccessRanks(Vec<String>),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Longest duration any setting may name (ten years)
pub const MAX_DURATION_SECS: u64 = 10 * 365 * 24 * 3600;

/// Highest accepted `sweeps.intent_max_attempts`
pub const MAX_INTENT_ATTEMPTS: u32 = 1000;

fn clamped_secs(secs: u64) -> chrono::Duration {
    chrono::Duration::seconds(secs.min(MAX_DURATION_SECS) as i64)
}

/// Ticket thresholds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TicketConfig {
    /// Idle time before the creator is reminded once
    pub reminder_after_secs: u64,
    /// Idle time before the ticket is closed by the system
    pub auto_close_after_secs: u64,
    /// Delay between close and channel deletion
    pub channel_delete_grace_secs: u64,
}

impl Default for TicketConfig {
    fn default() -> Self {
        Self {
            reminder_after_secs: 24 * 3600,
            auto_close_after_secs: 48 * 3600,
            channel_delete_grace_secs: 10,
        }
    }
}

impl TicketConfig {
    pub fn reminder_after(&self) -> chrono::Duration {
        clamped_secs(self.reminder_after_secs)
    }

    pub fn auto_close_after(&self) -> chrono::Duration {
        clamped_secs(self.auto_close_after_secs)
    }

    pub fn channel_delete_grace(&self) -> chrono::Duration {
        clamped_secs(self.channel_delete_grace_secs)
    }
}

/// Reconciliation intervals and intent retry policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepConfig {
    pub suspension_interval_secs: u64,
    pub ticket_interval_secs: u64,
    pub intent_interval_secs: u64,
    /// Dispatch attempts before an intent is marked failed
    pub intent_max_attempts: u32,
    /// Retry delay, multiplied by the attempt count
    pub intent_retry_backoff_secs: u64,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            suspension_interval_secs: 5 * 60,
            ticket_interval_secs: 6 * 3600,
            intent_interval_secs: 60,
            intent_max_attempts: 5,
            intent_retry_backoff_secs: 60,
        }
    }
}

impl SweepConfig {
    pub fn suspension_interval(&self) -> Duration {
        Duration::from_secs(self.suspension_interval_secs)
    }

    pub fn ticket_interval(&self) -> Duration {
        Duration::from_secs(self.ticket_interval_secs)
    }

    pub fn intent_interval(&self) -> Duration {
        Duration::from_secs(self.intent_interval_secs)
    }

    pub fn intent_retry_backoff(&self) -> chrono::Duration {
        clamped_secs(self.intent_retry_backoff_secs)
    }

    /// Delay before retrying an intent that has failed `attempts` times
    pub fn intent_retry_delay(&self, attempts: u32) -> chrono::Duration {
        clamped_secs(
            self.intent_retry_backoff_secs
                .saturating_mul(u64::from(attempts)),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollaboratorConfig {
    pub timeout_ms: u64,
}

impl Default for CollaboratorConfig {
    fn default() -> Self {
        Self { timeout_ms: 5000 }
    }
}

impl CollaboratorConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DraftConfig {
    pub ttl_secs: u64,
}

impl Default for DraftConfig {
    fn default() -> Self {
        Self { ttl_secs: 15 * 60 }
    }
}

impl DraftConfig {
    pub fn ttl(&self) -> chrono::Duration {
        clamped_secs(self.ttl_secs)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    /// Receives reports nobody in the hierarchy outranks
    pub top_authority_id: Option<String>,
}

/// Log channel refs; unset channels are skipped
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    pub approval_log: Option<String>,
    pub infraction_log: Option<String>,
    pub ticket_log: Option<String>,
    pub office_log: Option<String>,
    pub promotion_log: Option<String>,
}

/// Marker roles applied by infractions. Never counted as staff roles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusRoles {
    pub suspended: String,
    pub blacklisted: String,
    pub under_investigation: String,
}

impl Default for StatusRoles {
    fn default() -> Self {
        Self {
            suspended: "suspended".to_string(),
            blacklisted: "blacklisted".to_string(),
            under_investigation: "under_investigation".to_string(),
        }
    }
}

impl StatusRoles {
    pub fn all(&self) -> [&str; 3] {
        [
            self.suspended.as_str(),
            self.blacklisted.as_str(),
            self.under_investigation.as_str(),
        ]
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaseworkConfig {
    /// Snapshot file for the bundled JSON store
    pub state_path: Option<PathBuf>,
    pub tickets: TicketConfig,
    pub sweeps: SweepConfig,
    pub collaborators: CollaboratorConfig,
    pub drafts: DraftConfig,
    pub alerts: AlertConfig,
    pub channels: ChannelConfig,
    pub status_roles: StatusRoles,
    /// Custom hierarchy, lowest first; empty means the built-in table
    pub ranks: Vec<RankSpec>,
    pub category_roles: Vec<CategoryRole>,
    pub access: AccessPolicy,
}

impl CaseworkConfig {
    /// Parse TOML text
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Read and parse a TOML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&text)
    }

    /// Apply `CASEWORK_*` environment variables
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides_from(|var| std::env::var(var).ok())
    }

    /// Apply overrides from any variable lookup
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("CASEWORK_TOP_AUTHORITY_ID") {
            let v = v.trim();
            self.alerts.top_authority_id = (!v.is_empty()).then(|| v.to_string());
        }
        if let Some(v) = lookup("CASEWORK_COLLABORATOR_TIMEOUT_MS") {
            self.collaborators.timeout_ms = parse_u64_env("CASEWORK_COLLABORATOR_TIMEOUT_MS", &v)?;
        }
        if let Some(v) = lookup("CASEWORK_SUSPENSION_SWEEP_SECS") {
            self.sweeps.suspension_interval_secs =
                parse_u64_env("CASEWORK_SUSPENSION_SWEEP_SECS", &v)?;
        }
        if let Some(v) = lookup("CASEWORK_TICKET_SWEEP_SECS") {
            self.sweeps.ticket_interval_secs = parse_u64_env("CASEWORK_TICKET_SWEEP_SECS", &v)?;
        }
        if let Some(v) = lookup("CASEWORK_STATE_PATH") {
            let v = v.trim();
            if !v.is_empty() {
                self.state_path = Some(PathBuf::from(v));
            }
        }
        Ok(())
    }

    /// Hierarchy table in effect
    pub fn rank_table(&self) -> RankTable {
        if self.ranks.is_empty() {
            RankTable::default()
        } else {
            RankTable {
                ranks: self.ranks.clone(),
                category_roles: self.category_roles.clone(),
            }
        }
    }

    /// Build the directory this config describes
    pub fn rank_directory(&self) -> Result<RankDirectory, ConfigError> {
        Ok(RankDirectory::from_table(&self.rank_table())?)
    }

    /// Check cross-field constraints; returns the validated directory
    pub fn validate(&self) -> Result<RankDirectory, ConfigError> {
        let directory = self.rank_directory()?;

        let unknown = self.access.unknown_ranks(&directory);
        if !unknown.is_empty() {
            return Err(ConfigError::UnknownAccessRanks(unknown));
        }

        if self.tickets.reminder_after_secs >= self.tickets.auto_close_after_secs {
            return Err(ConfigError::Invalid(format!(
                "tickets.reminder_after_secs ({}) must be below tickets.auto_close_after_secs ({})",
                self.tickets.reminder_after_secs, self.tickets.auto_close_after_secs
            )));
        }

        let intervals = [
            ("sweeps.suspension_interval_secs", self.sweeps.suspension_interval_secs),
            ("sweeps.ticket_interval_secs", self.sweeps.ticket_interval_secs),
            ("sweeps.intent_interval_secs", self.sweeps.intent_interval_secs),
            ("collaborators.timeout_ms", self.collaborators.timeout_ms),
            ("drafts.ttl_secs", self.drafts.ttl_secs),
        ];
        if let Some((name, _)) = intervals.iter().find(|(_, v)| *v == 0) {
            return Err(ConfigError::Invalid(format!("{} must be greater than zero", name)));
        }
        let bounded = [
            ("tickets.reminder_after_secs", self.tickets.reminder_after_secs),
            ("tickets.auto_close_after_secs", self.tickets.auto_close_after_secs),
            ("tickets.channel_delete_grace_secs", self.tickets.channel_delete_grace_secs),
            ("sweeps.intent_retry_backoff_secs", self.sweeps.intent_retry_backoff_secs),
            ("sweeps.suspension_interval_secs", self.sweeps.suspension_interval_secs),
            ("sweeps.ticket_interval_secs", self.sweeps.ticket_interval_secs),
            ("sweeps.intent_interval_secs", self.sweeps.intent_interval_secs),
            ("collaborators.timeout_ms", self.collaborators.timeout_ms / 1000),
            ("drafts.ttl_secs", self.drafts.ttl_secs),
        ];
        if let Some((name, _)) = bounded.iter().find(|(_, v)| *v > MAX_DURATION_SECS) {
            return Err(ConfigError::Invalid(format!(
                "{} exceeds the limit of {} seconds",
                name, MAX_DURATION_SECS
            )));
        }
        if self.sweeps.intent_max_attempts == 0
            || self.sweeps.intent_max_attempts > MAX_INTENT_ATTEMPTS
        {
            return Err(ConfigError::Invalid(format!(
                "sweeps.intent_max_attempts must be between 1 and {}",
                MAX_INTENT_ATTEMPTS
            )));
        }

        for marker in self.status_roles.all() {
            if directory.is_staff_role(marker) {
                return Err(ConfigError::Invalid(format!(
                    "status role {} collides with a staff role",
                    marker
                )));
            }
        }

        Ok(directory)
    }
}

fn parse_u64_env(var: &str, value: &str) -> Result<u64, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
        var: var.to_string(),
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ranks::{AccessRule, RankCategory};
    use std::collections::HashMap;

    #[test]
    fn test_defaults_validate() {
        let config = CaseworkConfig::default();
        let directory = config.validate().unwrap();
        assert_eq!(directory.len(), 12);
        assert_eq!(config.tickets.reminder_after(), chrono::Duration::hours(24));
        assert_eq!(config.sweeps.intent_interval(), Duration::from_secs(60));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = CaseworkConfig::from_toml(
            r#"
            [tickets]
            reminder_after_secs = 3600

            [alerts]
            top_authority_id = "42"

            [access.change_rank]
            min_rank = "manager"
            "#,
        )
        .unwrap();
        assert_eq!(config.tickets.reminder_after_secs, 3600);
        assert_eq!(config.tickets.auto_close_after_secs, 48 * 3600);
        assert_eq!(config.alerts.top_authority_id.as_deref(), Some("42"));
        assert_eq!(config.access.change_rank, AccessRule::at_least("manager"));
        assert_eq!(config.access.ticket_staff, AccessRule::at_least("trial_moderator"));
    }

    #[test]
    fn test_custom_rank_table() {
        let config = CaseworkConfig::from_toml(
            r#"
            [[ranks]]
            key = "helper"
            name = "Helper"
            category = "moderation"

            [[ranks]]
            key = "owner"
            name = "Owner"
            category = "directive"

            [access]
            ticket_staff = { min_rank = "helper" }
            elevate_ticket = { min_rank = "owner" }
            issue_infraction = { min_rank = "owner" }
            change_rank = { min_rank = "owner" }
            "#,
        )
        .unwrap();
        let directory = config.validate().unwrap();
        assert_eq!(directory.top_rank().key, "owner");
        assert_eq!(directory.rank_of("helper").unwrap().category, RankCategory::Moderation);
    }

    #[test]
    fn test_unknown_access_rank_rejected() {
        let mut config = CaseworkConfig::default();
        config.access.change_rank = AccessRule::at_least("overlord");
        assert!(matches!(
            config.validate(),
            Err(ConfigError::UnknownAccessRanks(keys)) if keys == vec!["overlord".to_string()]
        ));
    }

    #[test]
    fn test_reminder_must_precede_auto_close() {
        let mut config = CaseworkConfig::default();
        config.tickets.reminder_after_secs = config.tickets.auto_close_after_secs;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_zero_interval_rejected() {
        let mut config = CaseworkConfig::default();
        config.sweeps.intent_interval_secs = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(msg)) if msg.contains("intent_interval")));
    }

    #[test]
    fn test_oversized_durations_rejected() {
        let mut config = CaseworkConfig::default();
        config.tickets.auto_close_after_secs = u64::MAX;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid(msg)) if msg.contains("auto_close_after_secs")
        ));

        let mut config = CaseworkConfig::default();
        config.sweeps.intent_retry_backoff_secs = MAX_DURATION_SECS + 1;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid(msg)) if msg.contains("intent_retry_backoff_secs")
        ));

        let mut config = CaseworkConfig::default();
        config.sweeps.intent_max_attempts = u32::MAX;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid(msg)) if msg.contains("intent_max_attempts")
        ));
    }

    #[test]
    fn test_retry_delay_saturates() {
        let mut sweeps = SweepConfig::default();
        assert_eq!(sweeps.intent_retry_delay(3), chrono::Duration::seconds(180));

        sweeps.intent_retry_backoff_secs = u64::MAX;
        let cap = chrono::Duration::seconds(MAX_DURATION_SECS as i64);
        assert_eq!(sweeps.intent_retry_delay(u32::MAX), cap);
        assert_eq!(sweeps.intent_retry_backoff(), cap);
    }

    #[test]
    fn test_status_role_may_not_be_staff() {
        let mut config = CaseworkConfig::default();
        config.status_roles.suspended = "moderation_team".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("CASEWORK_TOP_AUTHORITY_ID", "777"),
            ("CASEWORK_COLLABORATOR_TIMEOUT_MS", "1500"),
            ("CASEWORK_TICKET_SWEEP_SECS", " 600 "),
            ("CASEWORK_STATE_PATH", "/tmp/casework.json"),
        ]
        .into_iter()
        .collect();

        let mut config = CaseworkConfig::default();
        config
            .apply_overrides_from(|k| vars.get(k).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.alerts.top_authority_id.as_deref(), Some("777"));
        assert_eq!(config.collaborators.timeout(), Duration::from_millis(1500));
        assert_eq!(config.sweeps.ticket_interval_secs, 600);
        assert_eq!(config.sweeps.suspension_interval_secs, 300);
        assert_eq!(config.state_path, Some(PathBuf::from("/tmp/casework.json")));
    }

    #[test]
    fn test_bad_env_value() {
        let mut config = CaseworkConfig::default();
        let err = config
            .apply_overrides_from(|k| (k == "CASEWORK_SUSPENSION_SWEEP_SECS").then(|| "soon".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnv { var, .. } if var == "CASEWORK_SUSPENSION_SWEEP_SECS"));
    }
}
