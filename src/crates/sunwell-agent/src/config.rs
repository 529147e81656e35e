//! Agent configuration
//!
//! One struct carries every limit the execution core enforces. Values are
//! set by the embedding application (CLI flags, config files); the core
//! only consumes the typed form.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use sunwell_core::TrustPolicy;

use crate::recovery::RetryPolicy;

/// What happens to a subagent's session state after completion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CleanupPolicy {
    /// Delete session state when the subagent finishes
    #[default]
    Delete,
    /// Keep session state for inspection
    Keep,
}

impl CleanupPolicy {
    /// String form used in persistence
    pub fn as_str(&self) -> &'static str {
        match self {
            CleanupPolicy::Delete => "delete",
            CleanupPolicy::Keep => "keep",
        }
    }
}

/// Limits and policies for one agent run
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Global cap on concurrently running subagents
    pub max_concurrent_subagents: usize,

    /// Maximum recursion depth for subagents spawning subagents
    pub max_subagent_depth: usize,

    /// Cleanup policy applied to spawned subagents
    pub subagent_cleanup: CleanupPolicy,

    /// Expected heartbeat interval for spawned subagents, in seconds
    pub heartbeat_interval_seconds: u64,

    /// How long a failed cache entry suppresses retries
    ///
    /// A `failed` execution younger than this yields a
    /// `prior_failure_cooldown` skip; older failures are retried.
    pub failure_cooldown: Duration,

    /// Bounded attempts for the validation-gate auto-fix loop
    pub max_fix_attempts: u32,

    /// Retry policy for recoverable execution errors
    pub retry: RetryPolicy,

    /// Trust policy applied to tool invocations
    pub trust: TrustPolicy,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_concurrent_subagents: 4,
            max_subagent_depth: 2,
            subagent_cleanup: CleanupPolicy::Delete,
            heartbeat_interval_seconds: 30,
            failure_cooldown: Duration::from_secs(3600),
            max_fix_attempts: 3,
            retry: RetryPolicy::default(),
            trust: TrustPolicy::default(),
        }
    }
}

impl AgentConfig {
    /// Set the concurrent subagent cap
    pub fn with_max_concurrent_subagents(mut self, max: usize) -> Self {
        self.max_concurrent_subagents = max;
        self
    }

    /// Set the spawn depth cap
    pub fn with_max_subagent_depth(mut self, max: usize) -> Self {
        self.max_subagent_depth = max;
        self
    }

    /// Set the failed-entry retry cooldown
    pub fn with_failure_cooldown(mut self, cooldown: Duration) -> Self {
        self.failure_cooldown = cooldown;
        self
    }

    /// Set the auto-fix attempt bound
    pub fn with_max_fix_attempts(mut self, attempts: u32) -> Self {
        self.max_fix_attempts = attempts;
        self
    }

    /// Set the retry policy
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Set the trust policy
    pub fn with_trust(mut self, trust: TrustPolicy) -> Self {
        self.trust = trust;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AgentConfig::default();
        assert_eq!(config.max_concurrent_subagents, 4);
        assert_eq!(config.max_subagent_depth, 2);
        assert_eq!(config.failure_cooldown, Duration::from_secs(3600));
        assert_eq!(config.max_fix_attempts, 3);
        assert_eq!(config.subagent_cleanup, CleanupPolicy::Delete);
    }

    #[test]
    fn test_builder() {
        let config = AgentConfig::default()
            .with_max_concurrent_subagents(8)
            .with_failure_cooldown(Duration::from_secs(60));
        assert_eq!(config.max_concurrent_subagents, 8);
        assert_eq!(config.failure_cooldown, Duration::from_secs(60));
    }
}
