//! Learning records
//!
//! A learning is one durable fact the agent extracted from a run: a failure
//! pattern, a project convention, a tooling quirk. Identity is
//! content-derived so the same fact learned twice collapses to one record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sunwell_core::hash::sha256_hex;

/// Well-known learning categories
///
/// Categories are free-form strings; these constants cover the ones the
/// core itself writes.
pub mod category {
    /// A task failure worth remembering (written by the recovery loop)
    pub const FAILURE_PATTERN: &str = "failure_pattern";
    /// Project-level conventions and constraints
    pub const PROJECT: &str = "project";
    /// Reusable plan structure extracted from successful runs
    pub const PLAN_TEMPLATE: &str = "plan_template";
}

/// One durable learning
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Learning {
    /// Deterministic id derived from fact, category, and source
    pub id: String,

    /// The fact itself
    pub fact: String,

    /// Category ("failure_pattern", "project", ...)
    pub category: String,

    /// Confidence in the fact, 0.0-1.0
    pub confidence: f64,

    /// When the learning was recorded
    pub timestamp: DateTime<Utc>,

    /// Source file the fact was extracted from, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_file: Option<String>,

    /// Line within the source file, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_line: Option<u32>,
}

impl Learning {
    /// Create a learning with a content-derived id
    pub fn new(fact: impl Into<String>, category: impl Into<String>, confidence: f64) -> Self {
        let fact = fact.into();
        let category = category.into();
        let id = derive_id(&fact, &category, None);
        Self {
            id,
            fact,
            category,
            confidence: confidence.clamp(0.0, 1.0),
            timestamp: Utc::now(),
            source_file: None,
            source_line: None,
        }
    }

    /// Attach the source location (re-derives the id)
    pub fn with_source(mut self, file: impl Into<String>, line: Option<u32>) -> Self {
        self.source_file = Some(file.into());
        self.source_line = line;
        self.id = derive_id(&self.fact, &self.category, self.source_file.as_deref());
        self
    }
}

/// Deterministic learning id: hash of fact + category + source
pub fn derive_id(fact: &str, category: &str, source_file: Option<&str>) -> String {
    let material = format!("{fact}\u{1f}{category}\u{1f}{}", source_file.unwrap_or(""));
    sha256_hex(material.as_bytes())[..16].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_is_deterministic() {
        let a = Learning::new("sqlite needs WAL here", category::PROJECT, 0.8);
        let b = Learning::new("sqlite needs WAL here", category::PROJECT, 0.3);
        assert_eq!(a.id, b.id);
        assert_eq!(a.id.len(), 16);
    }

    #[test]
    fn test_id_varies_by_category_and_source() {
        let base = Learning::new("fact", category::PROJECT, 0.5);
        let other_cat = Learning::new("fact", category::FAILURE_PATTERN, 0.5);
        let with_source = Learning::new("fact", category::PROJECT, 0.5).with_source("a.rs", Some(3));

        assert_ne!(base.id, other_cat.id);
        assert_ne!(base.id, with_source.id);
    }

    #[test]
    fn test_confidence_is_clamped() {
        assert_eq!(Learning::new("f", "c", 1.7).confidence, 1.0);
        assert_eq!(Learning::new("f", "c", -0.2).confidence, 0.0);
    }

    #[test]
    fn test_json_round_trip() {
        let learning = Learning::new("watch the flaky test", category::PROJECT, 0.9)
            .with_source("tests/flaky.rs", Some(42));
        let json = serde_json::to_string(&learning).unwrap();
        let back: Learning = serde_json::from_str(&json).unwrap();
        assert_eq!(learning, back);
    }
}
