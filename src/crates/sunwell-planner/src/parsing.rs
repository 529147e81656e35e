//! Parse model output into artifact specs
//!
//! Planner prompts ask for a JSON array, but models wrap output in code
//! fences, prose, or both. Extraction tries a fenced block first, then the
//! outermost bracketed span. Unknown fields are ignored so prompt drift
//! does not break parsing.

use regex::Regex;
use serde::Deserialize;
use std::sync::OnceLock;

use sunwell_core::ArtifactSpec;

use crate::error::{PlanError, Result};

fn code_block_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"```(?:json)?\s*([\s\S]*?)```").expect("static regex"))
}

/// Raw artifact shape emitted by planner prompts
#[derive(Debug, Deserialize)]
struct RawArtifact {
    id: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    requires: Vec<String>,
    #[serde(default)]
    produces: Vec<String>,
    #[serde(default)]
    modifies: Vec<String>,
    #[serde(default)]
    produces_file: Option<String>,
    #[serde(default)]
    domain_type: Option<String>,
    #[serde(default)]
    is_contract: bool,
    #[serde(default)]
    parallel_group: Option<String>,
}

impl RawArtifact {
    fn into_spec(self) -> ArtifactSpec {
        let mut spec = ArtifactSpec::new(self.id.clone(), self.description)
            .with_requires(self.requires)
            .with_modifies(self.modifies);

        // An artifact with no declared outputs produces its own id, so
        // downstream requires-entries can reference it by name.
        if self.produces.is_empty() {
            spec = spec.with_produces([self.id]);
        } else {
            spec = spec.with_produces(self.produces);
        }

        if let Some(file) = self.produces_file {
            spec = spec.with_produces_file(file);
        }
        if let Some(domain) = self.domain_type {
            spec = spec.with_domain_type(domain);
        }
        if self.is_contract {
            spec = spec.as_contract();
        }
        if let Some(group) = self.parallel_group {
            spec = spec.with_parallel_group(group);
        }
        spec
    }
}

/// Extract the JSON artifact array from raw model output
pub fn parse_artifacts(output: &str) -> Result<Vec<ArtifactSpec>> {
    let json_text = extract_json_array(output)
        .ok_or_else(|| PlanError::Parse("no JSON array found in output".to_string()))?;

    let raw: Vec<RawArtifact> = serde_json::from_str(json_text)
        .map_err(|e| PlanError::Parse(format!("invalid artifact array: {e}")))?;

    if raw.is_empty() {
        return Err(PlanError::Parse("artifact array is empty".to_string()));
    }
    Ok(raw.into_iter().map(RawArtifact::into_spec).collect())
}

/// Find the artifact array: fenced code block first, bare array second
fn extract_json_array(output: &str) -> Option<&str> {
    if let Some(captures) = code_block_re().captures(output) {
        let inner = captures.get(1)?.as_str().trim();
        if inner.starts_with('[') {
            return Some(inner);
        }
    }

    let start = output.find('[')?;
    let end = output.rfind(']')?;
    if end > start {
        Some(&output[start..=end])
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PLAN_JSON: &str = r#"[
        {"id": "user-model", "description": "Define the user model",
         "produces": ["user-model"], "produces_file": "src/models/user.py",
         "domain_type": "model"},
        {"id": "auth-service", "description": "Implement authentication",
         "requires": ["user-model"], "produces_file": "src/auth/service.py"}
    ]"#;

    #[test]
    fn test_parse_bare_array() {
        let specs = parse_artifacts(PLAN_JSON).unwrap();
        assert_eq!(specs.len(), 2);
        assert_eq!(specs[0].id, "user-model");
        assert!(specs[1].requires.contains("user-model"));
    }

    #[test]
    fn test_parse_fenced_block_with_prose() {
        let output = format!("Here is the plan:\n```json\n{PLAN_JSON}\n```\nLet me know!");
        let specs = parse_artifacts(&output).unwrap();
        assert_eq!(specs.len(), 2);
    }

    #[test]
    fn test_produces_defaults_to_id() {
        let specs = parse_artifacts(r#"[{"id": "solo", "description": "standalone"}]"#).unwrap();
        assert!(specs[0].produces.contains("solo"));
    }

    #[test]
    fn test_produces_file_registers_in_modifies() {
        let specs = parse_artifacts(PLAN_JSON).unwrap();
        assert!(specs[0].modifies.contains("src/models/user.py"));
    }

    #[test]
    fn test_unknown_fields_are_ignored() {
        let output = r#"[{"id": "a", "description": "d", "contract": "must parse", "extra": 7}]"#;
        assert_eq!(parse_artifacts(output).unwrap().len(), 1);
    }

    #[test]
    fn test_no_array_is_parse_error() {
        let err = parse_artifacts("I could not produce a plan.").unwrap_err();
        assert!(matches!(err, PlanError::Parse(_)));
    }

    #[test]
    fn test_empty_array_is_parse_error() {
        assert!(matches!(parse_artifacts("[]"), Err(PlanError::Parse(_))));
    }
}
