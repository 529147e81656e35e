//! # sunwell-planner - Plan Discovery Strategies
//!
//! Turns a natural-language goal into an executable
//! [`ArtifactGraph`](sunwell_core::ArtifactGraph). Three strategies share
//! one `plan(goal, context)` contract and are selected by configuration,
//! not runtime polymorphism:
//!
//! - [`harmonic::HarmonicPlanner`] - generate N candidates in parallel,
//!   score them (V1 structural / V2 wave + semantic metrics), select the
//!   best, optionally refine it with model feedback;
//! - [`sequential::SequentialPlanner`] - one model call, strictly ordered
//!   chain; the fallback when harmonic planning fails;
//! - [`contract_first::ContractFirstPlanner`] - interface contracts first,
//!   implementations that depend on them second.

pub mod contract_first;
pub mod error;
pub mod harmonic;
pub mod metrics;
pub mod parsing;
pub mod sequential;
pub mod variance;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use sunwell_core::ArtifactGraph;

pub use contract_first::ContractFirstPlanner;
pub use error::{PlanError, Result};
pub use harmonic::template::{PlanTemplate, TemplateVariable};
pub use harmonic::HarmonicPlanner;
pub use metrics::{CandidateResult, Metrics, PlanMetrics, PlanMetricsV2, ScoringVersion};
pub use sequential::SequentialPlanner;
pub use variance::{VarianceConfig, VarianceStrategy};

/// Which planning strategy a run uses (a config value)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlannerChoice {
    /// Strictly ordered chain
    Sequential,
    /// Contracts first, implementations second
    ContractFirst,
    /// Multi-candidate generate/score/refine
    #[default]
    Harmonic,
}

/// The configured planner for a run, as a tagged variant
///
/// Selection happens once from config; callers hold one `Planner` and call
/// [`Planner::plan`] without caring which strategy is inside.
pub enum Planner {
    /// Sequential chain planner
    Sequential(SequentialPlanner),
    /// Contract-first planner
    ContractFirst(ContractFirstPlanner),
    /// Harmonic multi-candidate planner
    Harmonic(HarmonicPlanner),
}

impl Planner {
    /// Produce a plan with whichever strategy is configured
    pub async fn plan(&self, goal: &str, context: Option<&Value>) -> Result<ArtifactGraph> {
        match self {
            Planner::Sequential(p) => p.plan(goal, context).await,
            Planner::ContractFirst(p) => p.plan(goal, context).await,
            Planner::Harmonic(p) => p.plan(goal, context).await,
        }
    }

    /// Which strategy this planner is
    pub fn choice(&self) -> PlannerChoice {
        match self {
            Planner::Sequential(_) => PlannerChoice::Sequential,
            Planner::ContractFirst(_) => PlannerChoice::ContractFirst,
            Planner::Harmonic(_) => PlannerChoice::Harmonic,
        }
    }
}
