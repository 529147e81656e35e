//! Reasoner - typed, context-aware decisions with rule-based fallback
//!
//! The reasoner replaces brittle rule tables with reasoned judgments where
//! rules are insufficient, without ever being unable to answer:
//!
//! 1. context is enriched from available sources (execution-cache
//!    provenance, decision history);
//! 2. a structurally similar past decision with confidence ≥ 0.90 is
//!    reused outright (fast path, no model call);
//! 3. otherwise the model is prompted with a decision-type-specific
//!    structured-output tool;
//! 4. a low-confidence or failed model response falls back to the
//!    decision type's rule function;
//! 5. every decision lands in a per-type history index for future reuse.
//!
//! `decide` therefore never returns an error - the worst case is a
//! conservative rule-derived decision at confidence 0.5.

pub mod decisions;
pub mod prompts;

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tracing::debug;

use sunwell_core::{GenerateOptions, Model};

use crate::incremental::{ExecutionCache, ExecutionStatus};

pub use decisions::{
    conservative_default, outcome_is_valid, DecisionType, ReasonedDecision, AUTONOMOUS_CONFIDENCE,
    FALLBACK_CONFIDENCE, REUSE_CONFIDENCE,
};
pub use prompts::{build_prompt, decision_tool};

/// How much history per type the fast path scans
const FAST_PATH_WINDOW: usize = 50;

struct HistoryEntry {
    decision: ReasonedDecision,
    signal_type: Option<String>,
    file_path: Option<String>,
}

/// LLM-backed decision maker with rule fallback
pub struct Reasoner {
    model: Arc<dyn Model>,
    execution_cache: Option<Arc<ExecutionCache>>,
    confidence_threshold: f64,
    history: Mutex<HashMap<DecisionType, Vec<HistoryEntry>>>,
}

impl Reasoner {
    /// Reasoner over a wisdom model
    pub fn new(model: Arc<dyn Model>) -> Self {
        Self {
            model,
            execution_cache: None,
            confidence_threshold: AUTONOMOUS_CONFIDENCE,
            history: Mutex::new(HashMap::new()),
        }
    }

    /// Attach the execution cache for provenance enrichment
    pub fn with_execution_cache(mut self, cache: Arc<ExecutionCache>) -> Self {
        self.execution_cache = Some(cache);
        self
    }

    /// Override the autonomous-confidence threshold
    pub fn with_confidence_threshold(mut self, threshold: f64) -> Self {
        self.confidence_threshold = threshold;
        self
    }

    /// Make a reasoned decision about the given context
    ///
    /// `force_reasoning` skips the history fast path and always consults
    /// the model.
    pub async fn decide(
        &self,
        decision_type: DecisionType,
        context: Value,
        force_reasoning: bool,
    ) -> ReasonedDecision {
        let enriched = self.enrich(decision_type, context).await;

        if !force_reasoning {
            if let Some(cached) = self.check_similar_decisions(decision_type, &enriched) {
                debug!(
                    decision_type = decision_type.as_str(),
                    "reusing high-confidence past decision"
                );
                return cached;
            }
        }

        let decision = match self.reason_with_model(decision_type, &enriched).await {
            Some(decision) if decision.confidence >= self.confidence_threshold => decision,
            Some(hedged) => {
                debug!(
                    decision_type = decision_type.as_str(),
                    confidence = hedged.confidence,
                    "model confidence below threshold; falling back to rules"
                );
                self.apply_fallback(decision_type, &enriched, "low model confidence")
            }
            None => self.apply_fallback(decision_type, &enriched, "model call failed"),
        };

        self.record(decision_type, &enriched, decision.clone());
        decision
    }

    /// Convenience wrapper: severity of a code signal
    pub async fn decide_severity(
        &self,
        signal_type: &str,
        content: &str,
        file_path: &str,
        code_context: Option<&str>,
    ) -> ReasonedDecision {
        self.decide(
            DecisionType::SeverityAssessment,
            serde_json::json!({
                "signal_type": signal_type,
                "content": content,
                "file_path": file_path,
                "code_context": code_context.unwrap_or(""),
            }),
            false,
        )
        .await
    }

    /// Convenience wrapper: recovery strategy for a failure
    pub async fn decide_recovery(
        &self,
        error_type: &str,
        error_message: &str,
        attempt_number: u32,
    ) -> ReasonedDecision {
        self.decide(
            DecisionType::RecoveryStrategy,
            serde_json::json!({
                "error_type": error_type,
                "error_message": error_message,
                "attempt_number": attempt_number,
            }),
            false,
        )
        .await
    }

    /// Recent decision history, newest first
    pub fn decision_history(&self, limit: usize) -> Vec<ReasonedDecision> {
        let history = self.history.lock();
        let mut all: Vec<ReasonedDecision> = history
            .values()
            .flat_map(|entries| entries.iter().map(|e| e.decision.clone()))
            .collect();
        all.reverse();
        all.truncate(limit);
        all
    }

    /// Clear decision history (tests)
    pub fn clear_history(&self) {
        self.history.lock().clear();
    }

    async fn enrich(&self, decision_type: DecisionType, context: Value) -> Value {
        let mut enriched = match context {
            Value::Object(map) => Value::Object(map),
            other => serde_json::json!({ "input": other }),
        };

        // Provenance enrichment: prior failure count for the artifact
        // under discussion sharpens recovery and risk decisions.
        if let (Some(cache), Some(artifact_id)) = (
            &self.execution_cache,
            enriched.get("artifact_id").and_then(Value::as_str),
        ) {
            if let Ok(history) = cache.history_for_artifact(artifact_id).await {
                let prior_failures = history
                    .iter()
                    .filter(|e| e.status == ExecutionStatus::Failed)
                    .count();
                if let Some(map) = enriched.as_object_mut() {
                    map.insert("prior_failures".into(), prior_failures.into());
                }
            }
        }

        debug!(
            decision_type = decision_type.as_str(),
            "assembled decision context"
        );
        enriched
    }

    /// Fast path: reuse a structurally similar high-confidence decision
    fn check_similar_decisions(
        &self,
        decision_type: DecisionType,
        context: &Value,
    ) -> Option<ReasonedDecision> {
        let signal_type = context.get("signal_type").and_then(Value::as_str)?;
        let file_path = context.get("file_path").and_then(Value::as_str)?;

        let history = self.history.lock();
        let entries = history.get(&decision_type)?;
        entries
            .iter()
            .rev()
            .take(FAST_PATH_WINDOW)
            .find(|entry| {
                entry.decision.confidence >= REUSE_CONFIDENCE
                    && entry.signal_type.as_deref() == Some(signal_type)
                    && entry.file_path.as_deref() == Some(file_path)
            })
            .map(|entry| entry.decision.clone())
    }

    async fn reason_with_model(
        &self,
        decision_type: DecisionType,
        context: &Value,
    ) -> Option<ReasonedDecision> {
        let prompt = build_prompt(decision_type, context);
        let options = GenerateOptions::default()
            .with_temperature(0.2)
            .with_required_tools(vec![decision_tool(decision_type)]);

        let result = match self.model.generate(&prompt, &options).await {
            Ok(result) => result,
            Err(err) => {
                debug!(error = %err, "reasoner model call failed");
                return None;
            }
        };

        let tool_call = result.tool_calls.first()?;
        let args = tool_call.arguments.as_object()?;

        let outcome = args
            .get(decision_type.outcome_field())
            .or_else(|| args.get("outcome"))?
            .clone();
        if !outcome_is_valid(decision_type, &outcome) {
            debug!(
                decision_type = decision_type.as_str(),
                outcome = %outcome,
                "model produced invalid outcome"
            );
            return None;
        }

        let confidence = args
            .get("confidence")
            .and_then(Value::as_f64)
            .unwrap_or(FALLBACK_CONFIDENCE)
            .clamp(0.0, 1.0);
        let rationale = args
            .get("rationale")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string();
        let context_factors = args
            .get("context_factors")
            .or_else(|| args.get("risk_factors"))
            .and_then(Value::as_array)
            .map(|factors| {
                factors
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Some(ReasonedDecision {
            decision_type,
            outcome,
            confidence,
            rationale,
            context_factors,
        })
    }

    fn apply_fallback(
        &self,
        decision_type: DecisionType,
        context: &Value,
        reason: &str,
    ) -> ReasonedDecision {
        let outcome = match decision_type {
            DecisionType::SeverityAssessment => severity_fallback(context),
            DecisionType::AutoFixable => auto_fixable_fallback(context),
            DecisionType::RecoveryStrategy => recovery_fallback(context),
            DecisionType::SemanticApproval => approval_fallback(context),
            DecisionType::RiskAssessment => risk_fallback(context),
            DecisionType::RootCauseAnalysis => conservative_default(decision_type),
        };

        ReasonedDecision {
            decision_type,
            outcome,
            confidence: FALLBACK_CONFIDENCE,
            rationale: format!("Fallback to rules: {reason}"),
            context_factors: Vec::new(),
        }
    }

    fn record(&self, decision_type: DecisionType, context: &Value, decision: ReasonedDecision) {
        let entry = HistoryEntry {
            signal_type: context
                .get("signal_type")
                .and_then(Value::as_str)
                .map(str::to_string),
            file_path: context
                .get("file_path")
                .and_then(Value::as_str)
                .map(str::to_string),
            decision,
        };
        self.history
            .lock()
            .entry(decision_type)
            .or_default()
            .push(entry);
    }
}

fn signal_type_of(context: &Value) -> String {
    context
        .get("signal_type")
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_lowercase()
}

/// Rule-based severity assessment
fn severity_fallback(context: &Value) -> Value {
    let signal = signal_type_of(context);
    if signal.contains("fixme") || signal.contains("type_error") {
        "high".into()
    } else if signal.contains("todo") {
        "low".into()
    } else {
        "medium".into()
    }
}

/// Rule-based auto-fixable assessment
fn auto_fixable_fallback(context: &Value) -> Value {
    let signal = signal_type_of(context);
    // Lint warnings are usually mechanical; TODOs need human judgment.
    (signal.contains("lint") || signal.contains("failing_test")).into()
}

/// Rule-based recovery strategy
fn recovery_fallback(context: &Value) -> Value {
    let attempt = context
        .get("attempt_number")
        .and_then(Value::as_u64)
        .unwrap_or(1);
    let error_type = context
        .get("error_type")
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_lowercase();

    if attempt <= 3 && error_type.contains("timeout") {
        "retry".into()
    } else if attempt > 5 {
        "escalate".into()
    } else if attempt > 2 {
        "retry_different".into()
    } else {
        "retry".into()
    }
}

/// Rule-based approval decision
fn approval_fallback(context: &Value) -> Value {
    let category = context
        .get("goal_category")
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_lowercase();
    if category.contains("docs") || category.contains("documentation") || category.contains("test")
    {
        "approve".into()
    } else {
        "flag".into()
    }
}

/// Rule-based risk assessment
fn risk_fallback(context: &Value) -> Value {
    let lines_changed = context
        .get("lines_changed")
        .and_then(Value::as_u64)
        .unwrap_or(0);
    let files_affected = context
        .get("files_affected")
        .and_then(Value::as_array)
        .map(Vec::len)
        .unwrap_or(0);

    if lines_changed > 500 || files_affected > 10 {
        "high".into()
    } else if files_affected > 5 {
        "medium".into()
    } else {
        "low".into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use futures::stream::BoxStream;
    use serde_json::json;
    use sunwell_core::{CoreError, GenerateResult, StreamChunk, ToolCall};

    /// Model that always answers with one scripted tool call (or fails)
    struct DecisionModel {
        response: Option<Value>,
    }

    #[async_trait]
    impl Model for DecisionModel {
        fn id(&self) -> &str {
            "decision-model"
        }

        async fn generate(
            &self,
            _prompt: &str,
            options: &GenerateOptions,
        ) -> sunwell_core::Result<GenerateResult> {
            let Some(arguments) = self.response.clone() else {
                return Err(CoreError::Model("model unavailable".into()));
            };
            let tool = options.tools.first().expect("reasoner always sends a tool");
            Ok(GenerateResult {
                tool_calls: vec![ToolCall {
                    name: tool.name.clone(),
                    arguments,
                }],
                ..Default::default()
            })
        }

        async fn generate_stream(
            &self,
            _prompt: &str,
            _options: &GenerateOptions,
        ) -> sunwell_core::Result<BoxStream<'static, sunwell_core::Result<StreamChunk>>> {
            Err(CoreError::Model("not scripted".into()))
        }
    }

    #[tokio::test]
    async fn test_confident_model_decision_is_used() {
        let reasoner = Reasoner::new(Arc::new(DecisionModel {
            response: Some(json!({
                "severity": "high",
                "confidence": 0.85,
                "rationale": "race condition in billing code",
                "context_factors": ["billing module", "concurrency"],
            })),
        }));

        let decision = reasoner
            .decide_severity("fixme_comment", "race condition", "billing.py", None)
            .await;

        assert_eq!(decision.outcome, json!("high"));
        assert_eq!(decision.confidence, 0.85);
        assert!(decision.is_confident());
        assert_eq!(decision.context_factors.len(), 2);
    }

    #[tokio::test]
    async fn test_model_failure_falls_back_to_rules() {
        let reasoner = Reasoner::new(Arc::new(DecisionModel { response: None }));

        let decision = reasoner
            .decide_severity("todo_comment", "cleanup later", "util.py", None)
            .await;

        assert_eq!(decision.outcome, json!("low"));
        assert_eq!(decision.confidence, FALLBACK_CONFIDENCE);
        assert!(decision.rationale.contains("Fallback to rules"));
    }

    #[tokio::test]
    async fn test_low_confidence_falls_back() {
        let reasoner = Reasoner::new(Arc::new(DecisionModel {
            response: Some(json!({
                "severity": "critical",
                "confidence": 0.4,
                "rationale": "not sure",
            })),
        }));

        let decision = reasoner
            .decide_severity("lint_warning", "unused import", "main.py", None)
            .await;

        // The hedged "critical" was discarded for the rule answer.
        assert_eq!(decision.outcome, json!("medium"));
        assert_eq!(decision.confidence, FALLBACK_CONFIDENCE);
    }

    #[tokio::test]
    async fn test_invalid_outcome_falls_back() {
        let reasoner = Reasoner::new(Arc::new(DecisionModel {
            response: Some(json!({
                "severity": "apocalyptic",
                "confidence": 0.99,
                "rationale": "very bad",
            })),
        }));

        let decision = reasoner
            .decide_severity("fixme_comment", "bad", "a.py", None)
            .await;
        assert_eq!(decision.outcome, json!("high")); // fixme rule
    }

    #[tokio::test]
    async fn test_fast_path_reuses_high_confidence_decision() {
        let reasoner = Reasoner::new(Arc::new(DecisionModel {
            response: Some(json!({
                "severity": "high",
                "confidence": 0.95,
                "rationale": "first assessment",
            })),
        }));

        let first = reasoner
            .decide_severity("fixme_comment", "race", "billing.py", None)
            .await;
        assert_eq!(first.rationale, "first assessment");

        // Same signal and file: reused without consulting the model, and
        // the fast path does not re-record.
        let second = reasoner
            .decide_severity("fixme_comment", "race again", "billing.py", None)
            .await;
        assert_eq!(second.rationale, "first assessment");
        assert_eq!(reasoner.decision_history(10).len(), 1);
    }

    #[tokio::test]
    async fn test_recovery_fallback_rules() {
        let reasoner = Reasoner::new(Arc::new(DecisionModel { response: None }));

        let early = reasoner.decide_recovery("TimeoutError", "timed out", 1).await;
        assert_eq!(early.outcome, json!("retry"));

        let late = reasoner.decide_recovery("ValueError", "bad input", 6).await;
        assert_eq!(late.outcome, json!("escalate"));

        let middle = reasoner.decide_recovery("ValueError", "bad input", 3).await;
        assert_eq!(middle.outcome, json!("retry_different"));
    }

    #[tokio::test]
    async fn test_provenance_enrichment_counts_prior_failures() {
        use crate::incremental::Provenance;

        let cache = Arc::new(ExecutionCache::open_in_memory().await.unwrap());
        let provenance = Provenance {
            run_id: "r".into(),
            goal_hash: "g".into(),
            duration_ms: 5,
            model_id: "m".into(),
        };
        cache
            .record("flaky", "h1", None, ExecutionStatus::Failed, &provenance)
            .await
            .unwrap();
        cache
            .record("flaky", "h2", None, ExecutionStatus::Failed, &provenance)
            .await
            .unwrap();

        let reasoner = Reasoner::new(Arc::new(DecisionModel { response: None }))
            .with_execution_cache(cache);
        let enriched = reasoner
            .enrich(
                DecisionType::RecoveryStrategy,
                json!({"artifact_id": "flaky"}),
            )
            .await;
        assert_eq!(enriched["prior_failures"], 2);
    }
}
