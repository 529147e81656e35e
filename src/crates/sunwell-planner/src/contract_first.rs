//! Contract-first planner
//!
//! Interfaces before implementations: the model is asked to split the goal
//! into contract artifacts (pure interface definitions, mutually
//! independent) and implementation artifacts that depend on them. Contract
//! artifacts form the first wave, which gives implementations stable
//! boundaries to build against in parallel.

use std::sync::Arc;

use serde_json::Value;

use sunwell_core::{ArtifactGraph, ArtifactLimits, GenerateOptions, Model};

use crate::error::{PlanError, Result};
use crate::parsing::parse_artifacts;

/// Contracts-then-implementations planner
pub struct ContractFirstPlanner {
    model: Arc<dyn Model>,
    limits: ArtifactLimits,
}

impl ContractFirstPlanner {
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

    /// Produce a contract-first plan for the goal
    pub async fn plan(&self, goal: &str, context: Option<&Value>) -> Result<ArtifactGraph> {
        let mut prompt = format!(
            "GOAL: {goal}\n\n\
             Plan this in two layers:\n\
             1. CONTRACTS: interface definitions only (mark with \"is_contract\": true).\n\
                Contracts must not depend on anything.\n\
             2. IMPLEMENTATIONS: artifacts that satisfy the contracts. Each lists\n\
                the contracts it implements in \"requires\".\n"
        );
        if let Some(context) = context {
            prompt.push_str("\nPROJECT CONTEXT:\n");
            prompt.push_str(&context.to_string());
            prompt.push('\n');
        }
        prompt.push_str(
            "\nOutput ONLY a JSON array:\n\
             [{\"id\": \"Name\", \"description\": \"...\", \"is_contract\": true,\n\
               \"requires\": [], \"produces_file\": \"path\"}]",
        );

        let options = GenerateOptions::default()
            .with_temperature(0.4)
            .with_max_tokens(3000);
        let result = self
            .model
            .generate(&prompt, &options)
            .await
            .map_err(PlanError::Core)?;

        let mut specs = parse_artifacts(&result.content)?;

        // Contracts are parallelizable by definition: strip any
        // dependencies the model attached to them.
        for spec in specs.iter_mut() {
            if spec.is_contract {
                spec.requires.clear();
            }
        }

        let mut graph = ArtifactGraph::with_limits(self.limits);
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
}
