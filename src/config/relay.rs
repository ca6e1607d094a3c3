//! Relay behaviour configuration

use serde::Deserialize;
use std::time::Duration;

use crate::application::RestartPolicy;

use super::error::ValidationError;

/// Timeouts and supervision settings of the relay core
#[derive(Debug, Clone, Deserialize)]
pub struct RelayConfig {
    /// How long `POST /event/send` waits for the matching reply
    #[serde(default = "default_reply_timeout")]
    pub reply_timeout_secs: u64,

    /// Validity window of a delivery claim
    #[serde(default = "default_dedup_ttl")]
    pub dedup_ttl_secs: u64,

    /// First restart delay of a failed top-level task
    #[serde(default = "default_initial_backoff")]
    pub restart_initial_backoff_ms: u64,

    /// Upper bound of the restart delay
    #[serde(default = "default_max_backoff")]
    pub restart_max_backoff_ms: u64,

    /// Time allowed for tasks to stop on shutdown
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_secs: u64,
}

impl RelayConfig {
    pub fn reply_timeout(&self) -> Duration {
        Duration::from_secs(self.reply_timeout_secs)
    }

    pub fn dedup_ttl(&self) -> Duration {
        Duration::from_secs(self.dedup_ttl_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }

    /// Restart policy for supervised tasks
    pub fn restart_policy(&self) -> RestartPolicy {
        RestartPolicy::default()
            .with_initial_backoff(Duration::from_millis(self.restart_initial_backoff_ms))
            .with_max_backoff(Duration::from_millis(self.restart_max_backoff_ms))
    }

    /// Validate relay configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.reply_timeout_secs == 0 {
            return Err(ValidationError::InvalidTimeout("relay.reply_timeout_secs"));
        }
        if self.dedup_ttl_secs == 0 {
            return Err(ValidationError::InvalidTimeout("relay.dedup_ttl_secs"));
        }
        if self.restart_initial_backoff_ms == 0 {
            return Err(ValidationError::InvalidTimeout(
                "relay.restart_initial_backoff_ms",
            ));
        }
        if self.restart_initial_backoff_ms > self.restart_max_backoff_ms {
            return Err(ValidationError::InvalidBackoff);
        }
        Ok(())
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            reply_timeout_secs: default_reply_timeout(),
            dedup_ttl_secs: default_dedup_ttl(),
            restart_initial_backoff_ms: default_initial_backoff(),
            restart_max_backoff_ms: default_max_backoff(),
            shutdown_grace_secs: default_shutdown_grace(),
        }
    }
}

fn default_reply_timeout() -> u64 {
    10
}

fn default_dedup_ttl() -> u64 {
    30
}

fn default_initial_backoff() -> u64 {
    100
}

fn default_max_backoff() -> u64 {
    5_000
}

fn default_shutdown_grace() -> u64 {
    10
}
