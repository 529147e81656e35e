//! Parallel candidate generation

use futures::future::join_all;
use serde_json::{json, Value};
use tracing::debug;

use sunwell_core::{ArtifactGraph, EventType, GenerateOptions};

use crate::harmonic::HarmonicPlanner;
use crate::metrics::CandidateResult;
use crate::parsing::parse_artifacts;
use crate::variance::{apply_variance, variance_configs, VarianceConfig};

/// Generate up to N candidate plans in parallel
///
/// Failed discoveries (model error, unparseable output, invalid graph) are
/// skipped; the survivors keep their stable `candidate-{index}` ids so
/// event consumers can align with them.
pub async fn generate_candidates(
    planner: &HarmonicPlanner,
    goal: &str,
    context: Option<&Value>,
) -> Vec<CandidateResult> {
    let configs = variance_configs(planner.variance(), planner.candidate_count());

    planner.emit(
        EventType::PlanCandidateStart,
        json!({
            "total_candidates": configs.len(),
            "variance_strategy": planner.variance().as_str(),
        }),
    );

    let total = configs.len();
    let discoveries = configs
        .iter()
        .enumerate()
        .map(|(index, config)| discover_one(planner, goal, context, config, index, total));
    let results: Vec<Option<CandidateResult>> = join_all(discoveries).await;

    let candidates: Vec<CandidateResult> = results.into_iter().flatten().collect();

    planner.emit(
        EventType::PlanCandidatesComplete,
        json!({
            "total_candidates": total,
            "successful_candidates": candidates.len(),
            "failed_candidates": total - candidates.len(),
        }),
    );

    candidates
}

async fn discover_one(
    planner: &HarmonicPlanner,
    goal: &str,
    context: Option<&Value>,
    config: &VarianceConfig,
    index: usize,
    total: usize,
) -> Option<CandidateResult> {
    let candidate_id = format!("candidate-{index}");

    let varied_goal = apply_variance(goal, config);
    let prompt = discovery_prompt(&varied_goal, context);

    let options = GenerateOptions::default()
        .with_temperature(config.temperature.unwrap_or(0.7))
        .with_max_tokens(3000);

    let result = match planner.model().generate(&prompt, &options).await {
        Ok(result) => result,
        Err(err) => {
            debug!(candidate = %candidate_id, error = %err, "candidate discovery failed");
            return None;
        }
    };

    let graph = match build_graph(planner, &result.content) {
        Ok(graph) => graph,
        Err(err) => {
            debug!(candidate = %candidate_id, error = %err, "candidate rejected");
            return None;
        }
    };

    planner.emit(
        EventType::PlanCandidateGenerated,
        json!({
            "candidate_id": candidate_id,
            "artifact_count": graph.len(),
            "progress": index + 1,
            "total_candidates": total,
            "variance_config": config,
        }),
    );

    Some(CandidateResult {
        id: candidate_id,
        graph,
        variance_config: config.clone(),
    })
}

/// Parse model output and assemble a validated graph
///
/// Candidates with duplicate ids keep the first occurrence; cyclic,
/// oversized, or conflicting graphs are rejected outright.
pub(crate) fn build_graph(
    planner: &HarmonicPlanner,
    output: &str,
) -> crate::error::Result<ArtifactGraph> {
    let specs = parse_artifacts(output)?;

    let mut graph = ArtifactGraph::with_limits(planner.limits());
    for spec in specs {
        match graph.add(spec) {
            Ok(()) => {}
            Err(sunwell_core::CoreError::DuplicateArtifactId(_)) => continue,
            Err(err) => return Err(err.into()),
        }
    }
    graph.validate()?;
    Ok(graph)
}

/// Build the discovery prompt for one (varied) goal
pub(crate) fn discovery_prompt(goal: &str, context: Option<&Value>) -> String {
    let mut prompt = format!(
        "GOAL: {goal}\n\n\
         Break this goal into artifacts forming a dependency graph.\n\
         Each artifact is one unit of work a focused agent can complete.\n\
         Artifacts with no dependencies run in parallel; prefer wide, shallow\n\
         graphs over deep chains.\n"
    );

    if let Some(context) = context {
        prompt.push_str("\nPROJECT CONTEXT:\n");
        prompt.push_str(&context.to_string());
        prompt.push('\n');
    }

    prompt.push_str(
        "\nOutput ONLY a JSON array:\n\
         [\n\
           {\n\
             \"id\": \"ArtifactName\",\n\
             \"description\": \"What to build\",\n\
             \"requires\": [\"DependencyId\"],\n\
             \"produces_file\": \"path/to/file\",\n\
             \"domain_type\": \"protocol|model|service|test|docs\"\n\
           }\n\
         ]",
    );
    prompt
}
