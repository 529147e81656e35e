//! Decision types and constants

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Closed set of decisions the reasoner can make
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionType {
    /// How severe is a code signal
    SeverityAssessment,
    /// How to recover from a failure
    RecoveryStrategy,
    /// Can a change be auto-approved
    SemanticApproval,
    /// Can a signal be fixed automatically
    AutoFixable,
    /// What actually caused a failure
    RootCauseAnalysis,
    /// How risky is a change
    RiskAssessment,
}

impl DecisionType {
    /// String form used in prompts and history
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionType::SeverityAssessment => "severity_assessment",
            DecisionType::RecoveryStrategy => "recovery_strategy",
            DecisionType::SemanticApproval => "semantic_approval",
            DecisionType::AutoFixable => "auto_fixable",
            DecisionType::RootCauseAnalysis => "root_cause_analysis",
            DecisionType::RiskAssessment => "risk_assessment",
        }
    }

    /// Name of the outcome field in the structured-output tool
    pub fn outcome_field(&self) -> &'static str {
        match self {
            DecisionType::SeverityAssessment => "severity",
            DecisionType::RecoveryStrategy => "strategy",
            DecisionType::SemanticApproval => "decision",
            DecisionType::AutoFixable => "auto_fixable",
            DecisionType::RootCauseAnalysis => "root_cause",
            DecisionType::RiskAssessment => "risk_level",
        }
    }
}

/// Valid severity/risk levels
pub const SEVERITY_LEVELS: [&str; 4] = ["critical", "high", "medium", "low"];

/// Valid recovery strategies
pub const RECOVERY_STRATEGIES: [&str; 4] = ["retry", "retry_different", "escalate", "abort"];

/// Valid approval outcomes
pub const APPROVAL_OUTCOMES: [&str; 3] = ["approve", "flag", "deny"];

/// Minimum confidence for acting autonomously
pub const AUTONOMOUS_CONFIDENCE: f64 = 0.7;

/// Minimum confidence for reusing a past decision without the model
pub const REUSE_CONFIDENCE: f64 = 0.90;

/// Confidence assigned to rule-based fallback decisions
pub const FALLBACK_CONFIDENCE: f64 = 0.5;

/// One decision, reasoned or rule-derived
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReasonedDecision {
    /// What kind of decision this is
    pub decision_type: DecisionType,

    /// The outcome: a string for most types, a boolean for `auto_fixable`
    pub outcome: Value,

    /// Confidence 0.0-1.0
    pub confidence: f64,

    /// Why this outcome was chosen
    pub rationale: String,

    /// Context factors that influenced the decision
    #[serde(default)]
    pub context_factors: Vec<String>,
}

impl ReasonedDecision {
    /// True when confidence clears the autonomous-action bar
    ///
    /// Below the bar, callers should escalate or downgrade to a
    /// conservative default.
    pub fn is_confident(&self) -> bool {
        self.confidence >= AUTONOMOUS_CONFIDENCE
    }

    /// The outcome as a string, when it is one
    pub fn outcome_str(&self) -> Option<&str> {
        self.outcome.as_str()
    }
}

/// Validate an outcome against the decision type's allowed set
pub fn outcome_is_valid(decision_type: DecisionType, outcome: &Value) -> bool {
    match decision_type {
        DecisionType::SeverityAssessment | DecisionType::RiskAssessment => outcome
            .as_str()
            .map(|s| SEVERITY_LEVELS.contains(&s))
            .unwrap_or(false),
        DecisionType::RecoveryStrategy => outcome
            .as_str()
            .map(|s| RECOVERY_STRATEGIES.contains(&s))
            .unwrap_or(false),
        DecisionType::SemanticApproval => outcome
            .as_str()
            .map(|s| APPROVAL_OUTCOMES.contains(&s))
            .unwrap_or(false),
        DecisionType::AutoFixable => outcome.is_boolean(),
        DecisionType::RootCauseAnalysis => outcome.is_string(),
    }
}

/// Conservative default outcome per decision type
pub fn conservative_default(decision_type: DecisionType) -> Value {
    match decision_type {
        DecisionType::SeverityAssessment | DecisionType::RiskAssessment => "medium".into(),
        DecisionType::RecoveryStrategy => "escalate".into(),
        DecisionType::SemanticApproval => "flag".into(),
        DecisionType::AutoFixable => false.into(),
        DecisionType::RootCauseAnalysis => "Unknown".into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_outcome_validation() {
        assert!(outcome_is_valid(
            DecisionType::SeverityAssessment,
            &json!("high")
        ));
        assert!(!outcome_is_valid(
            DecisionType::SeverityAssessment,
            &json!("catastrophic")
        ));
        assert!(outcome_is_valid(DecisionType::AutoFixable, &json!(true)));
        assert!(!outcome_is_valid(DecisionType::AutoFixable, &json!("yes")));
        assert!(outcome_is_valid(
            DecisionType::RecoveryStrategy,
            &json!("retry_different")
        ));
    }

    #[test]
    fn test_conservative_defaults_are_valid() {
        for decision_type in [
            DecisionType::SeverityAssessment,
            DecisionType::RecoveryStrategy,
            DecisionType::SemanticApproval,
            DecisionType::AutoFixable,
            DecisionType::RootCauseAnalysis,
            DecisionType::RiskAssessment,
        ] {
            assert!(outcome_is_valid(
                decision_type,
                &conservative_default(decision_type)
            ));
        }
    }

    #[test]
    fn test_confidence_bar() {
        let decision = ReasonedDecision {
            decision_type: DecisionType::SeverityAssessment,
            outcome: json!("high"),
            confidence: 0.85,
            rationale: "race condition in billing".to_string(),
            context_factors: vec![],
        };
        assert!(decision.is_confident());

        let hedged = ReasonedDecision {
            confidence: 0.6,
            ..decision
        };
        assert!(!hedged.is_confident());
    }
}
