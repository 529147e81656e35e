//! Failure recovery - retry policies and reasoned strategies
//!
//! Execution errors enter a recovery loop instead of failing the run: the
//! reasoner picks a [`RecoveryStrategy`], retries back off exponentially
//! with jitter, and exhausted or escalated failures surface to the caller.
//! Every terminal task failure is also written to the learning journal as a
//! `failure_pattern` so future runs see it.
//!
//! **Don't retry when** errors are structural (a cycle won't go away) or
//! cancellation (expected flow); the loop checks the error kind first.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use sunwell_core::{CancellationToken, CoreError, ErrorKind};
use sunwell_memory::{category, Learning};

use crate::reasoner::{DecisionType, Reasoner};

/// How to react to a recoverable failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryStrategy {
    /// Try the same operation again
    Retry,
    /// Try again with a changed approach (hint passed to the operation)
    RetryDifferent,
    /// Stop and hand the failure to a human
    Escalate,
    /// Stop entirely
    Abort,
}

impl RecoveryStrategy {
    /// String form used in reasoner outcomes
    pub fn as_str(&self) -> &'static str {
        match self {
            RecoveryStrategy::Retry => "retry",
            RecoveryStrategy::RetryDifferent => "retry_different",
            RecoveryStrategy::Escalate => "escalate",
            RecoveryStrategy::Abort => "abort",
        }
    }

    /// Parse a reasoner outcome; unknown strings escalate conservatively
    pub fn parse(outcome: &str) -> Self {
        match outcome {
            "retry" => RecoveryStrategy::Retry,
            "retry_different" => RecoveryStrategy::RetryDifferent,
            "abort" => RecoveryStrategy::Abort,
            _ => RecoveryStrategy::Escalate,
        }
    }

    /// True if this strategy means another attempt
    pub fn is_retry(&self) -> bool {
        matches!(self, RecoveryStrategy::Retry | RecoveryStrategy::RetryDifferent)
    }
}

/// Exponential backoff policy with jitter
///
/// `delay = initial × factor^attempt`, capped at `max_interval`; jitter
/// multiplies by a random factor in 0.5..1.5 to avoid thundering herds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum attempts (including the first)
    pub max_attempts: u32,

    /// First backoff interval in seconds
    pub initial_interval: f64,

    /// Multiplier applied per attempt
    pub backoff_factor: f64,

    /// Cap on any single backoff interval, in seconds
    pub max_interval: f64,

    /// Whether to randomize delays
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_interval: 0.5,
            backoff_factor: 2.0,
            max_interval: 128.0,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Policy with a custom attempt cap
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Self::default()
        }
    }

    /// Set the initial interval in seconds
    pub fn with_initial_interval(mut self, seconds: f64) -> Self {
        self.initial_interval = seconds;
        self
    }

    /// Set the backoff multiplier
    pub fn with_backoff_factor(mut self, factor: f64) -> Self {
        self.backoff_factor = factor;
        self
    }

    /// Set the interval cap in seconds
    pub fn with_max_interval(mut self, seconds: f64) -> Self {
        self.max_interval = seconds;
        self
    }

    /// Enable or disable jitter
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// True if another attempt is allowed after `attempt` failures
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt + 1 < self.max_attempts
    }

    /// Backoff before attempt `attempt + 1`
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let base = self.initial_interval * self.backoff_factor.powi(attempt as i32);
        let mut seconds = base.min(self.max_interval);
        if self.jitter {
            seconds *= rand::thread_rng().gen_range(0.5..1.5);
        }
        Duration::from_secs_f64(seconds.max(0.0))
    }
}

/// Attempt tracking for one operation
#[derive(Debug, Clone, Default)]
pub struct RetryState {
    /// Failed attempts so far
    pub attempts: u32,

    /// Most recent error message
    pub last_error: Option<String>,
}

impl RetryState {
    /// Fresh state
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one failed attempt
    pub fn record_attempt(&mut self, error: Option<String>) {
        self.attempts += 1;
        self.last_error = error;
    }

    /// Reset after success
    pub fn reset(&mut self) {
        self.attempts = 0;
        self.last_error = None;
    }
}

/// Run an operation under the recovery loop
///
/// The operation receives the attempt number (0-indexed) and an optional
/// retry hint from the reasoner. Structural errors and cancellation
/// propagate immediately; execution errors consult the reasoner for a
/// strategy and back off before retrying.
pub async fn with_recovery<T, F, Fut>(
    reasoner: &Reasoner,
    policy: &RetryPolicy,
    token: &CancellationToken,
    mut operation: F,
) -> Result<T, CoreError>
where
    F: FnMut(u32, Option<String>) -> Fut,
    Fut: std::future::Future<Output = Result<T, CoreError>>,
{
    let mut hint: Option<String> = None;

    for attempt in 0..policy.max_attempts {
        token.checkpoint()?;

        match operation(attempt, hint.clone()).await {
            Ok(value) => return Ok(value),
            Err(err) => {
                match err.kind() {
                    ErrorKind::Execution => {}
                    // Not recoverable by retrying; surface immediately.
                    _ => return Err(err),
                }

                let decision = reasoner
                    .decide(
                        DecisionType::RecoveryStrategy,
                        serde_json::json!({
                            "error_type": format!("{:?}", err.kind()),
                            "error_message": err.to_string(),
                            "attempt_number": attempt + 1,
                        }),
                        false,
                    )
                    .await;
                let strategy =
                    RecoveryStrategy::parse(decision.outcome.as_str().unwrap_or("escalate"));

                debug!(
                    attempt,
                    strategy = strategy.as_str(),
                    confidence = decision.confidence,
                    "recovery decision"
                );

                if !strategy.is_retry() || !policy.should_retry(attempt) {
                    warn!(
                        attempt,
                        strategy = strategy.as_str(),
                        error = %err,
                        "recovery exhausted"
                    );
                    return Err(err);
                }

                if strategy == RecoveryStrategy::RetryDifferent {
                    hint = Some(decision.rationale.clone());
                }
                tokio::time::sleep(policy.calculate_delay(attempt)).await;
            }
        }
    }

    Err(CoreError::Execution("retry attempts exhausted".to_string()))
}

/// Build the `failure_pattern` learning recorded for a terminal failure
pub fn failure_learning(artifact_id: &str, error: &CoreError) -> Learning {
    Learning::new(
        format!("artifact '{artifact_id}' failed: {error}"),
        category::FAILURE_PATTERN,
        0.8,
    )
}
