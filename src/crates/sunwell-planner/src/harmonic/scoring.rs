//! Candidate metric computation

use std::collections::HashMap;
use std::collections::HashSet;

use sunwell_core::ArtifactGraph;

use crate::harmonic::utils::extract_keywords;
use crate::metrics::{Metrics, PlanMetrics, PlanMetricsV2};

/// Compute V1 structural metrics for a candidate graph
pub fn compute_metrics_v1(graph: &ArtifactGraph) -> PlanMetrics {
    let waves = graph.execution_waves();
    let depth = waves.len();
    let width = waves.iter().map(Vec::len).max().unwrap_or(1);
    let leaf_count = graph.leaves().len();
    let artifact_count = graph.len();

    PlanMetrics {
        depth,
        width,
        leaf_count,
        artifact_count,
        parallelism_factor: leaf_count as f64 / artifact_count.max(1) as f64,
        balance_factor: width as f64 / depth.max(1) as f64,
        file_conflicts: count_file_conflicts(graph),
        estimated_waves: depth,
    }
}

/// Compute V2 metrics: V1 plus wave analysis and semantic signals
pub fn compute_metrics_v2(graph: &ArtifactGraph, goal: &str) -> PlanMetricsV2 {
    let base = compute_metrics_v1(graph);
    let waves = graph.execution_waves();

    let wave_sizes: Vec<usize> = waves.iter().map(Vec::len).collect();
    let num_waves = wave_sizes.len().max(1);
    let artifact_count = base.artifact_count;

    let avg_wave_width = artifact_count as f64 / num_waves as f64;
    let parallel_work_ratio =
        (artifact_count.saturating_sub(1)) as f64 / (num_waves.saturating_sub(1)).max(1) as f64;
    let wave_variance = stddev(&wave_sizes);

    // High value means depth is buying parallel work, not just a chain.
    let depth_utilization = avg_wave_width / base.depth.max(1) as f64;

    let goal_keywords: HashSet<String> = extract_keywords(goal).into_iter().collect();
    let mut artifact_keywords: HashSet<String> = HashSet::new();
    for artifact in graph.artifacts() {
        artifact_keywords.extend(extract_keywords(&artifact.description));
        artifact_keywords.extend(extract_keywords(&artifact.id));
    }
    let keyword_coverage = if goal_keywords.is_empty() {
        1.0
    } else {
        goal_keywords.intersection(&artifact_keywords).count() as f64 / goal_keywords.len() as f64
    };

    let has_convergence = graph.roots().len() == 1;

    PlanMetricsV2 {
        base,
        wave_sizes,
        avg_wave_width,
        parallel_work_ratio,
        wave_variance,
        keyword_coverage,
        has_convergence,
        depth_utilization,
    }
}

/// Compute metrics for the requested version
pub fn compute_metrics(graph: &ArtifactGraph, goal: &str, use_v2: bool) -> Metrics {
    if use_v2 {
        Metrics::V2(compute_metrics_v2(graph, goal))
    } else {
        Metrics::V1(compute_metrics_v1(graph))
    }
}

/// Count pairs of artifacts producing the same file
fn count_file_conflicts(graph: &ArtifactGraph) -> usize {
    let mut producers: HashMap<&str, usize> = HashMap::new();
    for artifact in graph.artifacts() {
        if let Some(file) = &artifact.produces_file {
            *producers.entry(file.as_str()).or_insert(0) += 1;
        }
    }
    producers
        .values()
        .filter(|&&n| n > 1)
        .map(|&n| n * (n - 1) / 2)
        .sum()
}

fn stddev(values: &[usize]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<usize>() as f64 / n;
    let variance = values
        .iter()
        .map(|&v| (v as f64 - mean).powi(2))
        .sum::<f64>()
        / (n - 1.0);
    variance.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use sunwell_core::ArtifactSpec;

    fn chain(n: usize) -> ArtifactGraph {
        let mut graph = ArtifactGraph::new();
        for i in 0..n {
            let mut spec = ArtifactSpec::new(format!("step-{i}"), format!("step {i}"))
                .with_produces([format!("out-{i}")]);
            if i > 0 {
                spec = spec.with_requires([format!("out-{}", i - 1)]);
            }
            graph.add(spec).unwrap();
        }
        graph
    }

    fn fan(n_leaves: usize) -> ArtifactGraph {
        let mut graph = ArtifactGraph::new();
        let mut outs = Vec::new();
        for i in 0..n_leaves {
            graph
                .add(
                    ArtifactSpec::new(format!("leaf-{i}"), "independent work")
                        .with_produces([format!("leaf-out-{i}")]),
                )
                .unwrap();
            outs.push(format!("leaf-out-{i}"));
        }
        graph
            .add(ArtifactSpec::new("merge", "integrate results").with_requires(outs))
            .unwrap();
        graph
    }

    #[test]
    fn test_v1_metrics_of_chain() {
        let metrics = compute_metrics_v1(&chain(5));
        assert_eq!(metrics.depth, 5);
        assert_eq!(metrics.width, 1);
        assert_eq!(metrics.leaf_count, 1);
        assert_eq!(metrics.artifact_count, 5);
        assert_eq!(metrics.file_conflicts, 0);
    }

    #[test]
    fn test_v1_metrics_of_fan() {
        let metrics = compute_metrics_v1(&fan(4));
        assert_eq!(metrics.depth, 2);
        assert_eq!(metrics.width, 4);
        assert_eq!(metrics.leaf_count, 4);
    }

    #[test]
    fn test_fan_beats_chain_on_v1_score() {
        let chain_score = compute_metrics_v1(&chain(5)).score();
        let fan_score = compute_metrics_v1(&fan(4)).score();
        assert!(fan_score > chain_score);
    }

    #[test]
    fn test_file_conflicts_counted_pairwise() {
        let mut graph = ArtifactGraph::new();
        graph
            .add(
                ArtifactSpec::new("a", "one")
                    .with_produces(["a-out"])
                    .with_produces_file("src/x.py")
                    .with_parallel_group("g1"),
            )
            .unwrap();
        graph
            .add(
                ArtifactSpec::new("b", "two")
                    .with_requires(["a-out"])
                    .with_produces_file("src/x.py")
                    .with_parallel_group("g2"),
            )
            .unwrap();
        assert_eq!(compute_metrics_v1(&graph).file_conflicts, 1);
    }

    #[test]
    fn test_v2_convergence_detection() {
        let fan_metrics = compute_metrics_v2(&fan(3), "merge the results");
        assert!(fan_metrics.has_convergence);

        let mut no_root = ArtifactGraph::new();
        no_root.add(ArtifactSpec::new("a", "one")).unwrap();
        no_root.add(ArtifactSpec::new("b", "two")).unwrap();
        assert!(!compute_metrics_v2(&no_root, "goal").has_convergence);
    }

    #[test]
    fn test_v2_keyword_coverage() {
        let mut graph = ArtifactGraph::new();
        graph
            .add(ArtifactSpec::new("parser", "tokenize and parse expressions"))
            .unwrap();
        let metrics = compute_metrics_v2(&graph, "parse arithmetic expressions");
        assert!(metrics.keyword_coverage > 0.0);

        let unrelated = compute_metrics_v2(&graph, "deploy kubernetes manifests");
        assert_eq!(unrelated.keyword_coverage, 0.0);
    }

    #[test]
    fn test_v2_wave_variance_zero_for_uniform_waves() {
        let metrics = compute_metrics_v2(&chain(4), "goal");
        assert_eq!(metrics.wave_variance, 0.0);
    }
}
