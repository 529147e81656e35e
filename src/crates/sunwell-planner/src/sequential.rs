//! Sequential fallback planner
//!
//! The simplest possible strategy: one model call produces ordered steps,
//! and each step depends on the previous one. Used when harmonic planning
//! fails outright or when a caller explicitly wants a predictable chain.

use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use sunwell_core::{ArtifactGraph, ArtifactLimits, ArtifactSpec, GenerateOptions, Model};

use crate::error::{PlanError, Result};
use crate::parsing::parse_artifacts;

/// Single-shot chain planner
pub struct SequentialPlanner {
    model: Arc<dyn Model>,
    limits: ArtifactLimits,
}

impl SequentialPlanner {
    /// Planner with default limits
    pub fn new(model: Arc<dyn Model>) -> Self {
        Self {
            model,
            limits: ArtifactLimits::default(),
        }
    }

    /// Set graph size limits
    pub fn with_limits(mut self, limits: ArtifactLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Produce a chain plan for the goal
    pub async fn plan(&self, goal: &str, context: Option<&Value>) -> Result<ArtifactGraph> {
        let mut prompt = format!(
            "GOAL: {goal}\n\n\
             Break this goal into a SHORT ordered list of steps. Steps run\n\
             strictly one after another, so only split where order matters.\n"
        );
        if let Some(context) = context {
            prompt.push_str("\nPROJECT CONTEXT:\n");
            prompt.push_str(&context.to_string());
            prompt.push('\n');
        }
        prompt.push_str(
            "\nOutput ONLY a JSON array of steps in execution order:\n\
             [{\"id\": \"StepName\", \"description\": \"What to do\"}]",
        );

        let options = GenerateOptions::default()
            .with_temperature(0.3)
            .with_max_tokens(2000);
        let result = self
            .model
            .generate(&prompt, &options)
            .await
            .map_err(PlanError::Core)?;

        let specs = parse_artifacts(&result.content)?;

        // Chain the steps regardless of what dependencies the model wrote;
        // sequential means sequential.
        let mut graph = ArtifactGraph::with_limits(self.limits);
        let mut previous: Option<String> = None;
        for spec in specs {
            let id = spec.id.clone();
            let mut chained = ArtifactSpec::new(spec.id, spec.description)
                .with_produces([id.clone()]);
            if let Some(prev) = &previous {
                chained = chained.with_requires([prev.clone()]);
            }
            if let Some(file) = spec.produces_file {
                chained = chained.with_produces_file(file);
            }

            match graph.add(chained) {
                Ok(()) => previous = Some(id),
                Err(sunwell_core::CoreError::DuplicateArtifactId(dup)) => {
                    debug!(id = %dup, "skipping duplicate step");
                }
                Err(err) => return Err(err.into()),
            }
        }

        graph.validate()?;
        Ok(graph)
    }
}
