//! Orchestrator configuration

use std::time::Duration;

use agora_types::DEFAULT_DID_METHOD;
use serde::{Deserialize, Serialize};

/// Timeouts and retry policy of the orchestrator.
///
/// Durations are wall-clock milliseconds. They are unrelated to the
/// per-condition ledger timeouts, which are counted in blocks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Submissions per ledger step, first attempt included
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// Wait for the agreement-created event
    #[serde(default = "default_confirmation_timeout_ms")]
    pub confirmation_timeout_ms: u64,
    /// Wait for the lock-fulfilled event
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,
    /// Wait for the provider to fulfill the service condition
    #[serde(default = "default_service_timeout_ms")]
    pub service_timeout_ms: u64,
    /// Wait for the reward-fulfilled event after a successful receipt
    #[serde(default = "default_reward_timeout_ms")]
    pub reward_timeout_ms: u64,
    /// Wait for the service condition to abort before refunding
    #[serde(default = "default_refund_timeout_ms")]
    pub refund_timeout_ms: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_did_method")]
    pub did_method: String,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    500
}

fn default_confirmation_timeout_ms() -> u64 {
    30_000
}

fn default_lock_timeout_ms() -> u64 {
    30_000
}

fn default_service_timeout_ms() -> u64 {
    60_000
}

fn default_reward_timeout_ms() -> u64 {
    30_000
}

fn default_refund_timeout_ms() -> u64 {
    120_000
}

fn default_poll_interval_ms() -> u64 {
    250
}

fn default_did_method() -> String {
    DEFAULT_DID_METHOD.to_string()
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
            confirmation_timeout_ms: default_confirmation_timeout_ms(),
            lock_timeout_ms: default_lock_timeout_ms(),
            service_timeout_ms: default_service_timeout_ms(),
            reward_timeout_ms: default_reward_timeout_ms(),
            refund_timeout_ms: default_refund_timeout_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            did_method: default_did_method(),
        }
    }
}

impl OrchestratorConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn confirmation_timeout(&self) -> Duration {
        Duration::from_millis(self.confirmation_timeout_ms)
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    pub fn service_timeout(&self) -> Duration {
        Duration::from_millis(self.service_timeout_ms)
    }

    pub fn reward_timeout(&self) -> Duration {
        Duration::from_millis(self.reward_timeout_ms)
    }

    pub fn refund_timeout(&self) -> Duration {
        Duration::from_millis(self.refund_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_fills_defaults() {
        let config: OrchestratorConfig = serde_json::from_str(r#"{"max_attempts": 5}"#).unwrap();
        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.service_timeout(), Duration::from_secs(60));
        assert_eq!(config.did_method, "nv");
    }
}
