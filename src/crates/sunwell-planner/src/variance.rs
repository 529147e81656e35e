//! Candidate variance strategies
//!
//! Harmonic planning needs genuinely different candidates, not three copies
//! of the same plan. Variance comes from one of three sources: varying the
//! planner persona in the prompt, varying sampling temperature, or
//! substituting into a remembered plan template.

use serde::{Deserialize, Serialize};

/// How candidate diversity is produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VarianceStrategy {
    /// Vary the planner system prompt with persona hints
    #[default]
    Prompting,
    /// Fix the prompt, vary sampling temperature across candidates
    Temperature,
    /// Substitute variables into a high-confidence memory template
    Template,
}

impl VarianceStrategy {
    /// String form for event payloads
    pub fn as_str(&self) -> &'static str {
        match self {
            VarianceStrategy::Prompting => "prompting",
            VarianceStrategy::Temperature => "temperature",
            VarianceStrategy::Template => "template",
        }
    }
}

/// Configuration for one candidate generation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VarianceConfig {
    /// Persona applied to the prompt ("default" when unvaried)
    pub prompt_style: String,

    /// Sampling temperature override
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Extra constraint appended to the prompt
    #[serde(skip_serializing_if = "Option::is_none")]
    pub constraint: Option<String>,
}

impl Default for VarianceConfig {
    fn default() -> Self {
        Self {
            prompt_style: "default".to_string(),
            temperature: None,
            constraint: None,
        }
    }
}

/// Persona hints cycled through by the prompting strategy
const PROMPT_STYLES: &[(&str, &str)] = &[
    ("default", ""),
    (
        "parallel-maximizer",
        "Favor plans where as many artifacts as possible have no dependencies \
         and can start immediately.",
    ),
    (
        "minimalist",
        "Favor the smallest plan that fully satisfies the goal; merge artifacts \
         that would otherwise be trivial.",
    ),
    (
        "contract-first",
        "Start by defining interface contracts, then implementations that depend \
         on them.",
    ),
    (
        "risk-averse",
        "Isolate risky or uncertain work into leaf artifacts so failures cannot \
         block unrelated branches.",
    ),
];

/// Build the variance configurations for `count` candidates
pub fn variance_configs(strategy: VarianceStrategy, count: usize) -> Vec<VarianceConfig> {
    match strategy {
        VarianceStrategy::Prompting => (0..count)
            .map(|i| {
                let (style, _) = PROMPT_STYLES[i % PROMPT_STYLES.len()];
                VarianceConfig {
                    prompt_style: style.to_string(),
                    temperature: None,
                    constraint: None,
                }
            })
            .collect(),
        VarianceStrategy::Temperature => (0..count)
            .map(|i| VarianceConfig {
                prompt_style: "default".to_string(),
                temperature: Some((0.3 + 0.25 * i as f32).min(1.0)),
                constraint: None,
            })
            .collect(),
        VarianceStrategy::Template => vec![VarianceConfig {
            prompt_style: "template".to_string(),
            temperature: None,
            constraint: None,
        }],
    }
}

/// Apply a variance configuration to the goal prompt
pub fn apply_variance(goal: &str, config: &VarianceConfig) -> String {
    let mut varied = String::new();
    if let Some((_, hint)) = PROMPT_STYLES
        .iter()
        .find(|(style, _)| *style == config.prompt_style)
    {
        if !hint.is_empty() {
            varied.push_str(hint);
            varied.push_str("\n\n");
        }
    }
    varied.push_str(goal);
    if let Some(constraint) = &config.constraint {
        varied.push_str("\n\nCONSTRAINT: ");
        varied.push_str(constraint);
    }
    varied
}
