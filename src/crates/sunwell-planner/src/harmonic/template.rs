//! Template-guided planning
//!
//! When a remembered plan template matches the goal with high confidence,
//! candidate generation is skipped entirely: the model only extracts the
//! template's variables from the goal, and the artifact list comes from
//! substituting them into the template's expected artifacts.

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::sync::OnceLock;
use tracing::debug;

use sunwell_core::{ArtifactGraph, ArtifactSpec, EventType, GenerateOptions};

use crate::error::Result;
use crate::harmonic::scoring::compute_metrics;
use crate::harmonic::HarmonicPlanner;
use crate::metrics::Metrics;

fn json_object_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{[^{}]*\}").expect("static regex"))
}

/// One variable a template extracts from the goal
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateVariable {
    /// Variable name referenced as `{{name}}`
    pub name: String,
    /// What the variable means
    pub description: String,
    /// Hints that help the model locate it in the goal
    #[serde(default)]
    pub extraction_hints: Vec<String>,
}

/// A reusable plan structure extracted from past successful runs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanTemplate {
    /// Template name
    pub name: String,
    /// Artifact path patterns with `{{var}}` placeholders
    pub expected_artifacts: Vec<String>,
    /// Requirements substituted into every generated artifact
    #[serde(default)]
    pub requires: Vec<String>,
    /// Variables to extract from the goal
    #[serde(default)]
    pub variables: Vec<TemplateVariable>,
}

/// Plan by substituting goal variables into the template
pub async fn plan_with_template(
    planner: &HarmonicPlanner,
    goal: &str,
    template: &PlanTemplate,
) -> Result<(ArtifactGraph, Metrics)> {
    let variables = extract_template_variables(planner, goal, template).await;

    let mut graph = ArtifactGraph::with_limits(planner.limits());
    for pattern in &template.expected_artifacts {
        let resolved = substitute_variables(pattern, &variables);
        let id = resolved.replace(['/', '.'], "_");

        let spec = ArtifactSpec::new(id, format!("Create {resolved}"))
            .with_produces([resolved.clone()])
            .with_produces_file(resolved)
            .with_requires(
                template
                    .requires
                    .iter()
                    .map(|r| substitute_variables(r, &variables)),
            );

        match graph.add(spec) {
            Ok(()) => {}
            Err(sunwell_core::CoreError::DuplicateArtifactId(_)) => continue,
            Err(err) => return Err(err.into()),
        }
    }

    let use_v2 = planner.use_v2_scoring(goal);
    let metrics = compute_metrics(&graph, goal, use_v2);

    planner.emit(
        EventType::PlanWinner,
        json!({
            "tasks": graph.len(),
            "artifact_count": graph.len(),
            "selected_candidate_id": "template-guided",
            "total_candidates": 1,
            "score": metrics.effective_score(),
            "scoring_version": planner.scoring_version().as_str(),
            "metrics": metrics.to_event_payload(),
            "selection_reason": format!("Template-guided: {}", template.name),
            "variance_strategy": "template",
            "variance_config": {
                "template_name": template.name,
                "variables": variables,
            },
            "refinement_rounds": 0,
            "final_score_improvement": 0.0,
        }),
    );

    Ok((graph, metrics))
}

/// Extract variable values from the goal text using the model
///
/// Returns an empty map when the template has no variables or the model
/// output cannot be parsed; substitution then passes patterns through
/// unchanged.
pub async fn extract_template_variables(
    planner: &HarmonicPlanner,
    goal: &str,
    template: &PlanTemplate,
) -> HashMap<String, String> {
    if template.variables.is_empty() {
        return HashMap::new();
    }

    let var_specs: Vec<String> = template
        .variables
        .iter()
        .map(|v| {
            format!(
                "- {}: {} (hints: {})",
                v.name,
                v.description,
                v.extraction_hints.join(", ")
            )
        })
        .collect();

    let prompt = format!(
        "Extract template variables from this goal.\n\n\
         Template: {}\n\
         Variables to extract:\n{}\n\n\
         Goal: \"{goal}\"\n\n\
         Return JSON mapping variable names to extracted values.\n\
         Example: {{\"entity\": \"Product\"}}\n\n\
         IMPORTANT: Return ONLY the JSON object, no other text.",
        template.name,
        var_specs.join("\n"),
    );

    let options = GenerateOptions::default()
        .with_temperature(0.1)
        .with_max_tokens(200);

    let result = match planner.model().generate(&prompt, &options).await {
        Ok(result) => result,
        Err(err) => {
            debug!(error = %err, "variable extraction failed; using empty variables");
            return HashMap::new();
        }
    };

    json_object_re()
        .find(&result.content)
        .and_then(|m| serde_json::from_str(m.as_str()).ok())
        .unwrap_or_default()
}

/// Substitute `{{var}}` patterns (plus `_lower`/`_upper` forms)
pub fn substitute_variables(pattern: &str, variables: &HashMap<String, String>) -> String {
    let mut result = pattern.to_string();
    for (name, value) in variables {
        result = result.replace(&format!("{{{{{name}}}}}"), value);
        result = result.replace(&format!("{{{{{name}_lower}}}}"), &value.to_lowercase());
        result = result.replace(&format!("{{{{{name}_upper}}}}"), &value.to_uppercase());
    }
    result
}
