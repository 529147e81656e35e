//! Content-addressed artifact hashing
//!
//! An artifact's `input_hash` is the cache key deciding whether it needs to
//! be rebuilt. It covers everything that can change the output:
//!
//! - the artifact spec itself (canonical JSON, so field order is
//!   irrelevant);
//! - the input hashes of its in-graph dependencies, sorted by artifact id
//!   (a change anywhere upstream ripples down);
//! - a tool-version stamp (new tooling invalidates old outputs).
//!
//! Two artifacts with identical `input_hash` are guaranteed to produce
//! identical outputs, modulo model non-determinism, which is why the
//! executor can share in-flight work by hash alone.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use sunwell_core::hash::{canonical_json, sha256_hex};
use sunwell_core::{ArtifactGraph, ArtifactSpec};

/// Tool-version stamp mixed into every input hash
///
/// Bump when tool behavior changes in a way that invalidates cached
/// outputs.
pub const TOOL_VERSION_STAMP: &str = "sunwell-tools-v1";

/// Hashes computed for one artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactHash {
    /// Artifact id
    pub artifact_id: String,
    /// Hash of the spec alone
    pub spec_hash: String,
    /// Cache key: spec + dependency hashes + tool stamp
    pub input_hash: String,
}

/// Hash the artifact spec itself
pub fn compute_spec_hash(spec: &ArtifactSpec) -> String {
    let value = serde_json::to_value(spec).expect("artifact specs are always serializable");
    sha256_hex(canonical_json(&value).as_bytes())
}

/// Hash spec + sorted dependency hashes + tool stamp into the cache key
///
/// `dependency_hashes` must map dependency artifact id → that dependency's
/// `input_hash`; a `BTreeMap` keeps the ordering deterministic.
pub fn compute_input_hash(
    spec: &ArtifactSpec,
    dependency_hashes: &BTreeMap<String, String>,
    tool_version: &str,
) -> String {
    let mut material = compute_spec_hash(spec);
    for (dep_id, dep_hash) in dependency_hashes {
        material.push('\u{1f}');
        material.push_str(dep_id);
        material.push('=');
        material.push_str(dep_hash);
    }
    material.push('\u{1f}');
    material.push_str(tool_version);
    sha256_hex(material.as_bytes())
}

/// Compute hashes for every artifact in the graph, in dependency order
pub fn compute_graph_hashes(
    graph: &ArtifactGraph,
    tool_version: &str,
) -> BTreeMap<String, ArtifactHash> {
    let mut hashes: BTreeMap<String, ArtifactHash> = BTreeMap::new();

    for wave in graph.execution_waves() {
        for id in wave {
            let spec = graph.get(&id).expect("wave ids come from the graph");
            let dependency_hashes: BTreeMap<String, String> = graph
                .dependencies_of(&id)
                .into_iter()
                .filter_map(|dep| hashes.get(&dep).map(|h| (dep.clone(), h.input_hash.clone())))
                .collect();

            let spec_hash = compute_spec_hash(spec);
            let input_hash = compute_input_hash(spec, &dependency_hashes, tool_version);
            hashes.insert(
                id.clone(),
                ArtifactHash {
                    artifact_id: id,
                    spec_hash,
                    input_hash,
                },
            );
        }
    }

    hashes
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph() -> ArtifactGraph {
        let mut graph = ArtifactGraph::new();
        graph
            .add(ArtifactSpec::new("base", "foundation work").with_produces(["base-out"]))
            .unwrap();
        graph
            .add(ArtifactSpec::new("top", "depends on base").with_requires(["base-out"]))
            .unwrap();
        graph
    }

    #[test]
    fn test_spec_hash_ignores_field_order() {
        // Same logical spec built in different orders hashes identically.
        let a = ArtifactSpec::new("x", "work")
            .with_requires(["r1", "r2"])
            .with_produces(["p"]);
        let b = ArtifactSpec::new("x", "work")
            .with_produces(["p"])
            .with_requires(["r2", "r1"]);
        assert_eq!(compute_spec_hash(&a), compute_spec_hash(&b));
    }

    #[test]
    fn test_spec_change_changes_hash() {
        let a = ArtifactSpec::new("x", "one description");
        let b = ArtifactSpec::new("x", "another description");
        assert_ne!(compute_spec_hash(&a), compute_spec_hash(&b));
    }

    #[test]
    fn test_dependency_change_ripples_to_dependents() {
        let original = compute_graph_hashes(&graph(), TOOL_VERSION_STAMP);

        let mut changed_graph = ArtifactGraph::new();
        changed_graph
            .add(ArtifactSpec::new("base", "changed foundation work").with_produces(["base-out"]))
            .unwrap();
        changed_graph
            .add(ArtifactSpec::new("top", "depends on base").with_requires(["base-out"]))
            .unwrap();
        let changed = compute_graph_hashes(&changed_graph, TOOL_VERSION_STAMP);

        assert_ne!(original["base"].input_hash, changed["base"].input_hash);
        // "top" spec is identical but its input hash moved with the dep.
        assert_eq!(original["top"].spec_hash, changed["top"].spec_hash);
        assert_ne!(original["top"].input_hash, changed["top"].input_hash);
    }

    #[test]
    fn test_tool_stamp_invalidates() {
        let v1 = compute_graph_hashes(&graph(), "tools-v1");
        let v2 = compute_graph_hashes(&graph(), "tools-v2");
        assert_ne!(v1["base"].input_hash, v2["base"].input_hash);
    }

    #[test]
    fn test_hashes_are_stable() {
        let first = compute_graph_hashes(&graph(), TOOL_VERSION_STAMP);
        let second = compute_graph_hashes(&graph(), TOOL_VERSION_STAMP);
        assert_eq!(first, second);
    }
}
