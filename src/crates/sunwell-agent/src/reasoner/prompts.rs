//! Reasoner prompt and tool construction

use serde_json::json;

use sunwell_core::Tool;

use crate::reasoner::decisions::DecisionType;

/// Build the reasoning prompt for one decision
pub fn build_prompt(decision_type: DecisionType, context: &serde_json::Value) -> String {
    let preamble = match decision_type {
        DecisionType::SeverityAssessment => {
            "Assess the severity of this code signal. Consider what the code does, \
             where it lives, and what breaks if the signal is ignored."
        }
        DecisionType::RecoveryStrategy => {
            "A task failed. Choose the recovery strategy: retry the same approach, \
             retry with a different approach, escalate to a human, or abort. \
             Consider the error, how many attempts were already made, and any \
             similar past failures."
        }
        DecisionType::SemanticApproval => {
            "Decide whether this change can be auto-approved, should be flagged \
             for review, or must be denied. Consider blast radius and reversibility."
        }
        DecisionType::AutoFixable => {
            "Determine whether this signal can be fixed automatically without \
             human judgment."
        }
        DecisionType::RootCauseAnalysis => {
            "Analyze the root cause of this failure. Look past the immediate \
             error to what actually went wrong, and how to prevent it."
        }
        DecisionType::RiskAssessment => {
            "Assess the risk level of this change. Consider scope, the files \
             affected, and how central they are."
        }
    };

    format!(
        "{preamble}\n\nCONTEXT:\n{}\n\nCall the decision tool with your \
         assessment, a confidence between 0 and 1, and a short rationale.",
        serde_json::to_string_pretty(context).unwrap_or_else(|_| context.to_string()),
    )
}

/// Structured-output tool definition for one decision type
pub fn decision_tool(decision_type: DecisionType) -> Tool {
    let (name, description, outcome_schema) = match decision_type {
        DecisionType::SeverityAssessment => (
            "decide_severity",
            "Assess severity of a code signal",
            json!({
                "type": "string",
                "enum": ["critical", "high", "medium", "low"],
                "description": "Assessed severity level",
            }),
        ),
        DecisionType::RecoveryStrategy => (
            "decide_recovery",
            "Choose recovery strategy for a failure",
            json!({
                "type": "string",
                "enum": ["retry", "retry_different", "escalate", "abort"],
                "description": "Recovery strategy",
            }),
        ),
        DecisionType::SemanticApproval => (
            "decide_approval",
            "Decide if change can be auto-approved",
            json!({
                "type": "string",
                "enum": ["approve", "flag", "deny"],
                "description": "Approval decision",
            }),
        ),
        DecisionType::AutoFixable => (
            "decide_auto_fixable",
            "Determine if signal can be auto-fixed",
            json!({
                "type": "boolean",
                "description": "Whether it can be auto-fixed",
            }),
        ),
        DecisionType::RootCauseAnalysis => (
            "decide_root_cause",
            "Analyze root cause of failure",
            json!({
                "type": "string",
                "description": "Identified root cause",
            }),
        ),
        DecisionType::RiskAssessment => (
            "decide_risk",
            "Assess risk level of a change",
            json!({
                "type": "string",
                "enum": ["low", "medium", "high", "critical"],
                "description": "Assessed risk level",
            }),
        ),
    };

    Tool {
        name: name.to_string(),
        description: description.to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                decision_type.outcome_field(): outcome_schema,
                "confidence": {
                    "type": "number",
                    "minimum": 0,
                    "maximum": 1,
                    "description": "Confidence 0-1 in this assessment",
                },
                "rationale": {
                    "type": "string",
                    "description": "Why this outcome was chosen",
                },
                "context_factors": {
                    "type": "array",
                    "items": {"type": "string"},
                    "description": "What factors influenced the decision",
                },
            },
            "required": [decision_type.outcome_field(), "confidence", "rationale"],
        }),
    }
}
