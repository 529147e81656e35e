//! Validation gates and the bounded auto-fix loop
//!
//! Gates fire at planned points in execution (after an artifact is
//! produced, before it is committed). A failing gate does not immediately
//! fail the artifact: the errors are fed back to the model with
//! instructions to fix, up to `max_fix_attempts` times. Only an exhausted
//! loop marks the artifact failed.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, warn};

use sunwell_core::{
    ArtifactSpec, CancellationToken, CoreError, EventBus, EventType, GenerateOptions, Model,
};

/// Kinds of validation gates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateKind {
    /// Content parses at all
    Syntax,
    /// Style and lint rules
    Lint,
    /// Type checking
    Type,
    /// Executes/behaves correctly
    Runtime,
}

impl GateKind {
    /// String form used in events
    pub fn as_str(&self) -> &'static str {
        match self {
            GateKind::Syntax => "syntax",
            GateKind::Lint => "lint",
            GateKind::Type => "type",
            GateKind::Runtime => "runtime",
        }
    }
}

/// Result of one gate evaluation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateResult {
    /// Unique gate identifier
    pub gate_id: String,
    /// Gate kind
    pub kind: GateKind,
    /// Whether the gate passed
    pub passed: bool,
    /// Error messages when it failed
    #[serde(default)]
    pub errors: Vec<String>,
    /// Evaluation time in milliseconds
    pub duration_ms: u64,
}

/// One validation gate
#[async_trait]
pub trait ValidationGate: Send + Sync {
    /// Gate identifier
    fn gate_id(&self) -> &str;

    /// Gate kind
    fn kind(&self) -> GateKind;

    /// Evaluate produced content
    async fn check(&self, artifact: &ArtifactSpec, content: &str) -> GateResult;
}

/// Run every gate, emitting `gate_pass`/`gate_fail` events
///
/// Returns the failing results (empty means all gates passed).
pub async fn run_gates(
    gates: &[Arc<dyn ValidationGate>],
    artifact: &ArtifactSpec,
    content: &str,
    events: &EventBus,
) -> Vec<GateResult> {
    let mut failures = Vec::new();
    for gate in gates {
        let result = gate.check(artifact, content).await;
        let event_type = if result.passed {
            EventType::GatePass
        } else {
            EventType::GateFail
        };
        events.publish(
            event_type,
            json!({
                "gate_id": result.gate_id,
                "gate_type": result.kind.as_str(),
                "artifact_id": artifact.id,
                "errors": result.errors,
                "duration_ms": result.duration_ms,
            }),
        );
        if !result.passed {
            failures.push(result);
        }
    }
    failures
}

/// Validate content, auto-fixing failures up to `max_fix_attempts`
///
/// Each round feeds the gate errors back to the model with instructions to
/// fix; the loop ends when every gate passes or attempts run out, at which
/// point the artifact is failed with [`CoreError::GateFailed`].
pub async fn validate_with_auto_fix(
    model: &Arc<dyn Model>,
    gates: &[Arc<dyn ValidationGate>],
    artifact: &ArtifactSpec,
    initial_content: String,
    max_fix_attempts: u32,
    events: &EventBus,
    token: &CancellationToken,
) -> Result<String, CoreError> {
    let mut content = initial_content;

    for attempt in 0..=max_fix_attempts {
        token.checkpoint()?;

        let failures = run_gates(gates, artifact, &content, events).await;
        if failures.is_empty() {
            if attempt > 0 {
                info!(
                    artifact_id = %artifact.id,
                    attempts = attempt,
                    "auto-fix converged"
                );
            }
            return Ok(content);
        }

        if attempt == max_fix_attempts {
            warn!(
                artifact_id = %artifact.id,
                attempts = attempt,
                "auto-fix attempts exhausted"
            );
            let worst = &failures[0];
            return Err(CoreError::GateFailed {
                gate: worst.gate_id.clone(),
                errors: failures.iter().flat_map(|f| f.errors.clone()).collect(),
            });
        }

        let error_report: Vec<String> = failures
            .iter()
            .map(|f| format!("[{}] {}", f.kind.as_str(), f.errors.join("; ")))
            .collect();
        debug!(
            artifact_id = %artifact.id,
            attempt,
            gates_failed = failures.len(),
            "feeding gate errors back for auto-fix"
        );

        let prompt = format!(
            "The following output for '{}' failed validation.\n\n\
             TASK: {}\n\n\
             OUTPUT:\n{content}\n\n\
             VALIDATION ERRORS:\n{}\n\n\
             Produce a corrected version of the COMPLETE output that fixes\n\
             every error. Output only the corrected content, no commentary.",
            artifact.id,
            artifact.description,
            error_report.join("\n"),
        );
        let options = GenerateOptions::default().with_temperature(0.2);
        match model.generate(&prompt, &options).await {
            Ok(result) => content = result.content,
            Err(err) => {
                warn!(error = %err, "auto-fix model call failed");
                let worst = &failures[0];
                return Err(CoreError::GateFailed {
                    gate: worst.gate_id.clone(),
                    errors: failures.iter().flat_map(|f| f.errors.clone()).collect(),
                });
            }
        }
    }

    unreachable!("loop returns before exhausting the range")
}
