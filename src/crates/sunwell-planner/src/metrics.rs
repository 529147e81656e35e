//! Plan metrics and scoring
//!
//! Candidates are compared on structural quality. V1 metrics capture the
//! basic shape (depth, width, parallelism, conflicts); V2 adds wave
//! analysis and lightweight semantic signals (keyword coverage,
//! convergence). `auto` scoring picks V2 when the goal is wordy enough for
//! keyword coverage to mean something.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use sunwell_core::ArtifactGraph;

use crate::variance::VarianceConfig;

/// Penalty weight per wave of depth (V1 score)
const DEPTH_PENALTY_WEIGHT: f64 = 0.1;

/// Penalty weight per file conflict
const CONFLICT_PENALTY_WEIGHT: f64 = 0.2;

/// Bonus for a single convergence root (V2 score)
const CONVERGENCE_BONUS: f64 = 0.5;

/// Scoring version selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoringVersion {
    /// Structural metrics only
    V1,
    /// Wave analysis + semantic signals
    V2,
    /// V2 when the goal has at least 5 meaningful keywords, else V1
    #[default]
    Auto,
}

impl ScoringVersion {
    /// String form for event payloads
    pub fn as_str(&self) -> &'static str {
        match self {
            ScoringVersion::V1 => "v1",
            ScoringVersion::V2 => "v2",
            ScoringVersion::Auto => "auto",
        }
    }
}

/// V1 structural metrics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanMetrics {
    /// Critical-path length (number of waves)
    pub depth: usize,
    /// Widest wave
    pub width: usize,
    /// Artifacts with no dependencies
    pub leaf_count: usize,
    /// Total artifacts
    pub artifact_count: usize,
    /// leaves / artifacts
    pub parallelism_factor: f64,
    /// width / depth
    pub balance_factor: f64,
    /// Pairs of artifacts producing the same file
    pub file_conflicts: usize,
    /// Number of execution waves
    pub estimated_waves: usize,
}

impl PlanMetrics {
    /// V1 score: parallelism + balance − depth penalty − conflict penalty
    pub fn score(&self) -> f64 {
        self.parallelism_factor + self.balance_factor
            - DEPTH_PENALTY_WEIGHT * self.depth as f64
            - CONFLICT_PENALTY_WEIGHT * self.file_conflicts as f64
    }
}

/// V2 metrics: V1 plus wave analysis and semantic signals
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanMetricsV2 {
    /// Base structural metrics
    #[serde(flatten)]
    pub base: PlanMetrics,

    /// Artifacts per wave
    pub wave_sizes: Vec<usize>,
    /// artifacts / waves
    pub avg_wave_width: f64,
    /// (artifacts − 1) / (waves − 1); how much work runs off the spine
    pub parallel_work_ratio: f64,
    /// Standard deviation of wave sizes
    pub wave_variance: f64,
    /// Fraction of goal keywords covered by artifact text
    pub keyword_coverage: f64,
    /// True when the graph converges to a single root
    pub has_convergence: bool,
    /// avg_wave_width / depth; is depth buying parallelism
    pub depth_utilization: f64,
}

impl PlanMetricsV2 {
    /// V2 score: parallel work + depth utilization + keyword coverage +
    /// wave balance + convergence bonus − conflict penalty
    pub fn score_v2(&self) -> f64 {
        let wave_balance = 1.0 / (1.0 + self.wave_variance);
        let convergence = if self.has_convergence {
            CONVERGENCE_BONUS
        } else {
            0.0
        };
        self.parallel_work_ratio + self.depth_utilization + self.keyword_coverage + wave_balance
            + convergence
            - CONFLICT_PENALTY_WEIGHT * self.base.file_conflicts as f64
    }
}

/// Metrics for one candidate, either version
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Metrics {
    /// V2 metrics
    V2(PlanMetricsV2),
    /// V1 metrics
    V1(PlanMetrics),
}

impl Metrics {
    /// The effective score for candidate comparison
    pub fn effective_score(&self) -> f64 {
        match self {
            Metrics::V1(m) => m.score(),
            Metrics::V2(m) => m.score_v2(),
        }
    }

    /// Critical-path depth
    pub fn depth(&self) -> usize {
        match self {
            Metrics::V1(m) => m.depth,
            Metrics::V2(m) => m.base.depth,
        }
    }

    /// Base structural metrics
    pub fn base(&self) -> &PlanMetrics {
        match self {
            Metrics::V1(m) => m,
            Metrics::V2(m) => &m.base,
        }
    }

    /// Flatten into an event payload object
    pub fn to_event_payload(&self) -> Value {
        match self {
            Metrics::V1(m) => {
                let mut payload = serde_json::to_value(m).unwrap_or_else(|_| json!({}));
                if let Some(map) = payload.as_object_mut() {
                    map.insert("score_v1".into(), json!(m.score()));
                }
                payload
            }
            Metrics::V2(m) => {
                let mut payload = serde_json::to_value(m).unwrap_or_else(|_| json!({}));
                if let Some(map) = payload.as_object_mut() {
                    map.insert("score_v1".into(), json!(m.base.score()));
                    map.insert("score_v2".into(), json!(m.score_v2()));
                }
                payload
            }
        }
    }
}

/// One generated candidate with its stable id
///
/// Ids are `candidate-{index}` so frontend and backend always refer to the
/// same plan regardless of which candidates failed.
#[derive(Debug, Clone)]
pub struct CandidateResult {
    /// Stable candidate id ("candidate-0", "candidate-1", ...)
    pub id: String,
    /// The parsed and validated graph
    pub graph: ArtifactGraph,
    /// Variance configuration that produced it
    pub variance_config: VarianceConfig,
}

/// Human-readable reason for the winner selection
pub fn format_selection_reason(metrics: &Metrics, candidate_count: usize) -> String {
    if candidate_count == 1 {
        return "Only candidate generated".to_string();
    }
    match metrics {
        Metrics::V2(_) => "Highest V2 score (parallel_work_ratio + depth_utilization \
                           + keyword_coverage + wave_balance - conflicts)"
            .to_string(),
        Metrics::V1(_) => "Highest V1 score (parallelism + balance - depth penalty)".to_string(),
    }
}
