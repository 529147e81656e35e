//! Harmonic planner - generate, score, select, refine
//!
//! Harmonic planning trades one model call for several: N candidate plans
//! are generated in parallel under a variance strategy, each parsed into an
//! artifact graph and scored on structural quality, and the best one wins.
//! Optional refinement rounds then feed the winner's weaknesses back to the
//! model, accepting a restructured plan only when its score improves.
//!
//! ```text
//! goal ──► variance configs ──► N parallel discoveries
//!                                     │ parse + validate
//!                                     ▼
//!                          score (v1 | v2 | auto)
//!                                     │ select best
//!                                     ▼
//!                       refine ×R (accept on improvement)
//!                                     │
//!                                     ▼
//!                               ArtifactGraph
//! ```
//!
//! Every phase emits events (`plan_candidate_start`,
//! `plan_candidate_generated`, `plan_candidates_complete`, `plan_winner`)
//! so the selection is observable and replayable.

pub mod candidate;
pub mod refinement;
pub mod scoring;
pub mod template;
pub mod utils;

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{debug, info};

use sunwell_core::{ArtifactGraph, ArtifactLimits, EventBus, EventType, Model};

use crate::error::{PlanError, Result};
use crate::metrics::{format_selection_reason, CandidateResult, Metrics, ScoringVersion};
use crate::variance::VarianceStrategy;

use self::candidate::generate_candidates;
use self::refinement::{describe_refinement, identify_improvements, refine_with_feedback};
use self::scoring::compute_metrics;
use self::template::{plan_with_template, PlanTemplate};
use self::utils::extract_keywords;

/// Goals with at least this many keywords get V2 scoring under `auto`
const AUTO_V2_KEYWORD_THRESHOLD: usize = 5;

/// Multi-candidate planner
pub struct HarmonicPlanner {
    model: Arc<dyn Model>,
    events: Arc<EventBus>,
    candidates: usize,
    variance: VarianceStrategy,
    scoring: ScoringVersion,
    refinement_rounds: usize,
    limits: ArtifactLimits,
    template: Option<PlanTemplate>,
}

impl HarmonicPlanner {
    /// Planner with defaults: 3 candidates, prompting variance, auto scoring
    pub fn new(model: Arc<dyn Model>, events: Arc<EventBus>) -> Self {
        Self {
            model,
            events,
            candidates: 3,
            variance: VarianceStrategy::default(),
            scoring: ScoringVersion::default(),
            refinement_rounds: 0,
            limits: ArtifactLimits::default(),
            template: None,
        }
    }

    /// Set the number of candidates to generate
    pub fn with_candidates(mut self, candidates: usize) -> Self {
        self.candidates = candidates.max(1);
        self
    }

    /// Set the variance strategy
    pub fn with_variance(mut self, variance: VarianceStrategy) -> Self {
        self.variance = variance;
        self
    }

    /// Set the scoring version
    pub fn with_scoring(mut self, scoring: ScoringVersion) -> Self {
        self.scoring = scoring;
        self
    }

    /// Set how many refinement rounds to attempt after selection
    pub fn with_refinement_rounds(mut self, rounds: usize) -> Self {
        self.refinement_rounds = rounds;
        self
    }

    /// Set graph size limits
    pub fn with_limits(mut self, limits: ArtifactLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Provide a matched memory template (used with template variance)
    pub fn with_template(mut self, template: PlanTemplate) -> Self {
        self.template = Some(template);
        self
    }

    pub(crate) fn model(&self) -> &Arc<dyn Model> {
        &self.model
    }

    pub(crate) fn variance(&self) -> VarianceStrategy {
        self.variance
    }

    pub(crate) fn candidate_count(&self) -> usize {
        self.candidates
    }

    pub(crate) fn limits(&self) -> ArtifactLimits {
        self.limits
    }

    pub(crate) fn scoring_version(&self) -> ScoringVersion {
        self.scoring
    }

    pub(crate) fn emit(&self, event_type: EventType, data: Value) {
        self.events.publish(event_type, data);
    }

    /// Whether this goal is scored with V2 metrics
    pub(crate) fn use_v2_scoring(&self, goal: &str) -> bool {
        match self.scoring {
            ScoringVersion::V1 => false,
            ScoringVersion::V2 => true,
            ScoringVersion::Auto => extract_keywords(goal).len() >= AUTO_V2_KEYWORD_THRESHOLD,
        }
    }

    /// Produce a plan for the goal
    pub async fn plan(&self, goal: &str, context: Option<&Value>) -> Result<ArtifactGraph> {
        self.plan_with_metrics(goal, context).await.map(|(g, _)| g)
    }

    /// Produce a plan along with the winning candidate's metrics
    pub async fn plan_with_metrics(
        &self,
        goal: &str,
        context: Option<&Value>,
    ) -> Result<(ArtifactGraph, Metrics)> {
        // Template shortcut: skip candidate generation entirely.
        if self.variance == VarianceStrategy::Template {
            if let Some(template) = &self.template {
                return plan_with_template(self, goal, template).await;
            }
            debug!("template variance requested but no template matched; falling back to prompting");
        }

        let candidates = generate_candidates(self, goal, context).await;
        if candidates.is_empty() {
            return Err(PlanError::PlanningFailure {
                attempted: self.candidates,
            });
        }

        let use_v2 = self.use_v2_scoring(goal);
        let total_candidates = candidates.len();

        let mut scored: Vec<(CandidateResult, Metrics)> = candidates
            .into_iter()
            .map(|candidate| {
                let metrics = compute_metrics(&candidate.graph, goal, use_v2);
                (candidate, metrics)
            })
            .collect();

        // Highest score wins; ties break toward smaller depth, then the
        // lexicographically first artifact id.
        scored.sort_by(|(a_cand, a), (b_cand, b)| {
            b.effective_score()
                .partial_cmp(&a.effective_score())
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.depth().cmp(&b.depth()))
                .then_with(|| {
                    a_cand
                        .graph
                        .ids()
                        .first()
                        .cloned()
                        .unwrap_or_default()
                        .cmp(&b_cand.graph.ids().first().cloned().unwrap_or_default())
                })
        });
        let (winner, mut metrics) = scored.remove(0);
        let initial_score = metrics.effective_score();

        let mut graph = winner.graph;
        let mut rounds_applied = 0usize;
        for round in 0..self.refinement_rounds {
            let Some(feedback) = identify_improvements(&metrics) else {
                break;
            };
            let Some(refined) = refine_with_feedback(self, goal, &graph, &feedback).await else {
                break;
            };

            let refined_metrics = compute_metrics(&refined, goal, use_v2);
            if refined_metrics.effective_score() > metrics.effective_score() {
                info!(
                    round,
                    improvement = %describe_refinement(&refined, &graph),
                    "accepted refined plan"
                );
                graph = refined;
                metrics = refined_metrics;
                rounds_applied += 1;
            } else {
                debug!(round, "refinement did not improve score; stopping");
                break;
            }
        }

        self.emit(
            EventType::PlanWinner,
            json!({
                "tasks": graph.len(),
                "artifact_count": graph.len(),
                "selected_candidate_id": winner.id,
                "total_candidates": total_candidates,
                "score": metrics.effective_score(),
                "scoring_version": self.scoring.as_str(),
                "metrics": metrics.to_event_payload(),
                "selection_reason": format_selection_reason(&metrics, total_candidates),
                "variance_strategy": self.variance.as_str(),
                "variance_config": winner.variance_config,
                "refinement_rounds": rounds_applied,
                "final_score_improvement": metrics.effective_score() - initial_score,
            }),
        );

        Ok((graph, metrics))
    }
}
