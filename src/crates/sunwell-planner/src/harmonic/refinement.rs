//! Winner refinement
//!
//! After selection, the planner can spend extra rounds asking the model to
//! restructure the winning graph: flatten deep chains, spread unbalanced
//! waves, add a missing convergence artifact. A refined plan is accepted
//! only when its score actually improves.

use tracing::debug;

use sunwell_core::{ArtifactGraph, GenerateOptions};

use crate::harmonic::candidate::build_graph;
use crate::harmonic::HarmonicPlanner;
use crate::metrics::{Metrics, PlanMetricsV2};

/// Identify what could be improved in a plan; `None` when nothing stands out
pub fn identify_improvements(metrics: &Metrics) -> Option<String> {
    let base = metrics.base();
    let mut suggestions: Vec<String> = Vec::new();

    if base.depth > 3 {
        suggestions.push(format!(
            "Critical path is {} steps. Can any artifacts be parallelized instead of sequential?",
            base.depth
        ));
    }
    if base.parallelism_factor < 0.3 {
        suggestions.push(format!(
            "Only {}/{} artifacts are leaves. Can more artifacts have no dependencies?",
            base.leaf_count, base.artifact_count
        ));
    }
    if base.file_conflicts > 0 {
        suggestions.push(format!(
            "Found {} file conflicts. Can artifacts write to different files?",
            base.file_conflicts
        ));
    }
    if base.balance_factor < 0.5 {
        suggestions
            .push("Graph is unbalanced (deep and narrow). Can the structure be flattened?".into());
    }

    if let Metrics::V2(v2) = metrics {
        append_v2_suggestions(v2, &mut suggestions);
    }

    if suggestions.is_empty() {
        None
    } else {
        Some(suggestions.join(" "))
    }
}

fn append_v2_suggestions(metrics: &PlanMetricsV2, suggestions: &mut Vec<String>) {
    if metrics.wave_variance > 5.0 {
        suggestions.push(format!(
            "Wave sizes are unbalanced (variance={:.1}). Can work be distributed more evenly across waves?",
            metrics.wave_variance
        ));
    }
    if metrics.keyword_coverage < 0.5 {
        suggestions.push(format!(
            "Low keyword coverage ({:.0}%). Are all aspects of the goal addressed by artifacts?",
            metrics.keyword_coverage * 100.0
        ));
    }
    if !metrics.has_convergence {
        suggestions.push(
            "Graph has multiple roots (no single convergence point). \
             Should there be a final integration artifact?"
                .into(),
        );
    }
    if metrics.depth_utilization < 1.0 && metrics.base.depth > 2 {
        suggestions.push(format!(
            "Depth utilization is low ({:.1}). Depth is not being used productively for parallelism.",
            metrics.depth_utilization
        ));
    }
}

/// Ask the model to restructure a plan based on feedback
///
/// Returns `None` when the refined output cannot be parsed into a valid
/// acyclic graph; the caller keeps the original in that case.
pub async fn refine_with_feedback(
    planner: &HarmonicPlanner,
    goal: &str,
    graph: &ArtifactGraph,
    feedback: &str,
) -> Option<ArtifactGraph> {
    let artifacts_desc: Vec<String> = graph
        .artifacts()
        .map(|a| format!("- {}: requires {:?}", a.id, a.requires))
        .collect();

    let prompt = format!(
        "GOAL: {goal}\n\n\
         CURRENT PLAN:\n{}\n\n\
         METRICS:\n\
         - Depth (critical path): {}\n\
         - Leaves (parallel start): {}\n\
         - Total artifacts: {}\n\n\
         IMPROVEMENT FEEDBACK:\n{feedback}\n\n\
         === REFINEMENT TASK ===\n\n\
         Restructure the artifact graph to address the feedback.\n\
         Keep the same essential artifacts but reorganize dependencies\n\
         for better parallelism and shallower depth.\n\n\
         Consider:\n\
         1. Can sequential artifacts become parallel (remove a dependency)?\n\
         2. Can a deep chain be split into parallel branches?\n\
         3. Can a bottleneck artifact be split into independent pieces?\n\n\
         Output the COMPLETE revised artifact list as a JSON array with the\n\
         same shape as before.",
        artifacts_desc.join("\n"),
        graph.max_depth(),
        graph.leaves().len(),
        graph.len(),
    );

    let options = GenerateOptions::default()
        .with_temperature(0.3)
        .with_max_tokens(3000);

    let result = match planner.model().generate(&prompt, &options).await {
        Ok(result) => result,
        Err(err) => {
            debug!(error = %err, "refinement call failed; keeping original plan");
            return None;
        }
    };

    match build_graph(planner, &result.content) {
        Ok(refined) => Some(refined),
        Err(err) => {
            debug!(error = %err, "refined plan rejected; keeping original");
            None
        }
    }
}

/// Describe what a refinement round changed
pub fn describe_refinement(refined: &ArtifactGraph, original: &ArtifactGraph) -> String {
    use std::cmp::Ordering;

    match refined.len().cmp(&original.len()) {
        Ordering::Greater => format!("Added {} artifacts", refined.len() - original.len()),
        Ordering::Less => format!("Removed {} artifacts", original.len() - refined.len()),
        Ordering::Equal => "Restructured dependencies".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::harmonic::scoring::{compute_metrics_v1, compute_metrics_v2};
    use sunwell_core::ArtifactSpec;

    fn chain(n: usize) -> ArtifactGraph {
        let mut graph = ArtifactGraph::new();
        for i in 0..n {
            let mut spec = ArtifactSpec::new(format!("s{i}"), "step")
                .with_produces([format!("o{i}")]);
            if i > 0 {
                spec = spec.with_requires([format!("o{}", i - 1)]);
            }
            graph.add(spec).unwrap();
        }
        graph
    }

    #[test]
    fn test_deep_chain_flagged() {
        let metrics = Metrics::V1(compute_metrics_v1(&chain(5)));
        let feedback = identify_improvements(&metrics).unwrap();
        assert!(feedback.contains("Critical path is 5 steps"));
    }

    #[test]
    fn test_multi_root_flagged_in_v2() {
        let mut graph = ArtifactGraph::new();
        graph.add(ArtifactSpec::new("a", "alpha work")).unwrap();
        graph.add(ArtifactSpec::new("b", "beta work")).unwrap();

        let metrics = Metrics::V2(compute_metrics_v2(&graph, "alpha beta gamma"));
        let feedback = identify_improvements(&metrics).unwrap();
        assert!(feedback.contains("multiple roots"));
    }

    #[test]
    fn test_healthy_graph_has_no_feedback() {
        // Wide, shallow, converging, well-covered: nothing to flag.
        let mut graph = ArtifactGraph::new();
        for id in ["alpha", "beta", "gamma"] {
            graph
                .add(
                    ArtifactSpec::new(id, format!("{id} processing work"))
                        .with_produces([format!("{id}-out")]),
                )
                .unwrap();
        }
        graph
            .add(
                ArtifactSpec::new("combine", "combine processing results").with_requires([
                    "alpha-out",
                    "beta-out",
                    "gamma-out",
                ]),
            )
            .unwrap();

        let metrics = Metrics::V2(compute_metrics_v2(&graph, "alpha beta gamma processing"));
        assert!(identify_improvements(&metrics).is_none());
    }

    #[test]
    fn test_describe_refinement() {
        assert_eq!(describe_refinement(&chain(4), &chain(2)), "Added 2 artifacts");
        assert_eq!(
            describe_refinement(&chain(2), &chain(4)),
            "Removed 2 artifacts"
        );
        assert_eq!(
            describe_refinement(&chain(3), &chain(3)),
            "Restructured dependencies"
        );
    }
}
