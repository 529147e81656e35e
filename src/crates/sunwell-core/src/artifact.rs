//! Artifact graphs - the plan representation executed by the agent
//!
//! A plan is a DAG of [`ArtifactSpec`] nodes. Each artifact names what it
//! `produces` and what it `requires`; adjacency is derived from those sets,
//! so planners emit flat artifact lists and the graph wires itself.
//!
//! # Graph structure
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                 ArtifactGraph                       │
//! │                                                     │
//! │   user-model ──────┐                                │
//! │                    ▼                                │
//! │   auth-contract ─► auth-service ─► integration      │
//! │                    ▲                                │
//! │   token-store ─────┘                                │
//! │                                                     │
//! │   waves: [user-model, auth-contract, token-store]   │
//! │          [auth-service]                             │
//! │          [integration]                              │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! # Invariants
//!
//! - `requires ∩ produces = ∅` for each artifact (a 1-cycle otherwise);
//! - the graph is a DAG; [`ArtifactGraph::detect_cycle`] must be consulted
//!   before execution;
//! - two artifacts in the same concurrent wave have disjoint `modifies`
//!   sets, enforced by [`ArtifactGraph::validate`];
//! - wave layering is deterministic: Kahn's algorithm with lexicographic
//!   ordering inside each wave.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::model::ModelTier;

/// Size limits applied while building a graph
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ArtifactLimits {
    /// Maximum number of artifacts in one graph
    pub max_artifacts: usize,
}

impl Default for ArtifactLimits {
    fn default() -> Self {
        Self { max_artifacts: 64 }
    }
}

/// Immutable node in the plan
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ArtifactSpec {
    /// Stable identifier, unique per graph
    pub id: String,

    /// Natural-language task statement
    pub description: String,

    /// Logical artifact names this node outputs
    #[serde(default)]
    pub produces: BTreeSet<String>,

    /// Logical artifact names or artifact ids this node consumes
    #[serde(default)]
    pub requires: BTreeSet<String>,

    /// File paths potentially written (conflict detection)
    #[serde(default)]
    pub modifies: BTreeSet<String>,

    /// Output file path, if the artifact is a single file
    #[serde(default)]
    pub produces_file: Option<String>,

    /// Free-form domain tag ("protocol", "service", ...)
    #[serde(default)]
    pub domain_type: Option<String>,

    /// True if the artifact purely defines an interface
    ///
    /// Contracts carry no implementation and parallelize freely with
    /// their siblings.
    #[serde(default)]
    pub is_contract: bool,

    /// Optional phase label for grouping
    #[serde(default)]
    pub parallel_group: Option<String>,
}

impl ArtifactSpec {
    /// Create a spec with just an id and description
    pub fn new(id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            produces: BTreeSet::new(),
            requires: BTreeSet::new(),
            modifies: BTreeSet::new(),
            produces_file: None,
            domain_type: None,
            is_contract: false,
            parallel_group: None,
        }
    }

    /// Add produced artifact names
    pub fn with_produces<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.produces.extend(names.into_iter().map(Into::into));
        self
    }

    /// Add required artifact names or ids
    pub fn with_requires<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.requires.extend(names.into_iter().map(Into::into));
        self
    }

    /// Add potentially-written file paths
    pub fn with_modifies<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.modifies.extend(paths.into_iter().map(Into::into));
        self
    }

    /// Set the output file path (also recorded under `modifies`)
    pub fn with_produces_file(mut self, path: impl Into<String>) -> Self {
        let path = path.into();
        self.modifies.insert(path.clone());
        self.produces_file = Some(path);
        self
    }

    /// Set the domain tag
    pub fn with_domain_type(mut self, domain: impl Into<String>) -> Self {
        self.domain_type = Some(domain.into());
        self
    }

    /// Mark the artifact as a pure interface contract
    pub fn as_contract(mut self) -> Self {
        self.is_contract = true;
        self
    }

    /// Set the phase label
    pub fn with_parallel_group(mut self, group: impl Into<String>) -> Self {
        self.parallel_group = Some(group.into());
        self
    }
}

/// One task derived from an artifact, annotated with its wave and tier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannedTask {
    /// Artifact id this task builds
    pub artifact_id: String,

    /// Task statement handed to the subagent
    pub description: String,

    /// Wave index the task executes in
    pub wave: usize,

    /// Model tier selected for the task
    pub model_tier: ModelTier,
}

/// Collection of artifacts with adjacency derived from requires/produces
#[derive(Debug, Clone, Default)]
pub struct ArtifactGraph {
    artifacts: BTreeMap<String, ArtifactSpec>,
    known_artifacts: BTreeSet<String>,
    limits: ArtifactLimits,
}

impl ArtifactGraph {
    /// Empty graph with default limits
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty graph with explicit limits
    pub fn with_limits(limits: ArtifactLimits) -> Self {
        Self {
            limits,
            ..Self::default()
        }
    }

    /// Declare artifact names that already exist in memory
    ///
    /// A requires-entry naming a known artifact is satisfied externally and
    /// does not count as dangling.
    pub fn with_known_artifacts<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.known_artifacts.extend(names.into_iter().map(Into::into));
        self
    }

    /// Number of artifacts
    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    /// True if the graph holds no artifacts
    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }

    /// Look up an artifact by id
    pub fn get(&self, id: &str) -> Option<&ArtifactSpec> {
        self.artifacts.get(id)
    }

    /// All artifact ids in lexicographic order
    pub fn ids(&self) -> Vec<String> {
        self.artifacts.keys().cloned().collect()
    }

    /// Iterate artifacts in id order
    pub fn artifacts(&self) -> impl Iterator<Item = &ArtifactSpec> {
        self.artifacts.values()
    }

    /// Add an artifact
    ///
    /// Fails with [`CoreError::DuplicateArtifactId`] if the id exists,
    /// [`CoreError::ArtifactLimitExceeded`] past the size limit, and
    /// [`CoreError::CycleDetected`] when the artifact requires something it
    /// produces (a 1-cycle).
    pub fn add(&mut self, spec: ArtifactSpec) -> Result<()> {
        if self.artifacts.len() >= self.limits.max_artifacts {
            return Err(CoreError::ArtifactLimitExceeded {
                limit: self.limits.max_artifacts,
            });
        }
        if self.artifacts.contains_key(&spec.id) {
            return Err(CoreError::DuplicateArtifactId(spec.id));
        }
        if spec.requires.intersection(&spec.produces).next().is_some()
            || spec.requires.contains(&spec.id)
        {
            return Err(CoreError::CycleDetected {
                path: vec![spec.id.clone(), spec.id],
            });
        }
        self.artifacts.insert(spec.id.clone(), spec);
        Ok(())
    }

    /// Resolve the in-graph dependency ids of one artifact
    ///
    /// A requires-entry resolves to an artifact id directly, or to every
    /// artifact whose `produces` set contains the entry. Entries naming
    /// known external artifacts resolve to nothing.
    pub fn dependencies_of(&self, id: &str) -> BTreeSet<String> {
        let Some(spec) = self.artifacts.get(id) else {
            return BTreeSet::new();
        };

        let mut deps = BTreeSet::new();
        for requirement in &spec.requires {
            if self.artifacts.contains_key(requirement) {
                deps.insert(requirement.clone());
                continue;
            }
            for candidate in self.artifacts.values() {
                if candidate.produces.contains(requirement) {
                    deps.insert(candidate.id.clone());
                }
            }
        }
        deps.remove(id);
        deps
    }

    /// Artifact ids that directly depend on `id`
    pub fn dependents_of(&self, id: &str) -> BTreeSet<String> {
        self.artifacts
            .keys()
            .filter(|candidate| self.dependencies_of(candidate).contains(id))
            .cloned()
            .collect()
    }

    /// True if `to` transitively depends on `from`
    pub fn has_path(&self, from: &str, to: &str) -> bool {
        let mut stack = vec![from.to_string()];
        let mut seen = HashSet::new();
        while let Some(current) = stack.pop() {
            for dependent in self.dependents_of(&current) {
                if dependent == to {
                    return true;
                }
                if seen.insert(dependent.clone()) {
                    stack.push(dependent);
                }
            }
        }
        false
    }

    /// DFS cycle detection; must be consulted before execution
    pub fn detect_cycle(&self) -> bool {
        self.find_cycle().is_some()
    }

    /// Find one cycle, if any, as the id path along it
    pub fn find_cycle(&self) -> Option<Vec<String>> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Visiting,
            Done,
        }

        fn visit(
            graph: &ArtifactGraph,
            id: &str,
            marks: &mut HashMap<String, Mark>,
            stack: &mut Vec<String>,
        ) -> Option<Vec<String>> {
            match marks.get(id) {
                Some(Mark::Done) => return None,
                Some(Mark::Visiting) => {
                    let start = stack.iter().position(|s| s == id).unwrap_or(0);
                    let mut path: Vec<String> = stack[start..].to_vec();
                    path.push(id.to_string());
                    return Some(path);
                }
                None => {}
            }

            marks.insert(id.to_string(), Mark::Visiting);
            stack.push(id.to_string());
            for dep in graph.dependencies_of(id) {
                if let Some(cycle) = visit(graph, &dep, marks, stack) {
                    return Some(cycle);
                }
            }
            stack.pop();
            marks.insert(id.to_string(), Mark::Done);
            None
        }

        let mut marks = HashMap::new();
        let mut stack = Vec::new();
        for id in self.artifacts.keys() {
            if let Some(cycle) = visit(self, id, &mut marks, &mut stack) {
                return Some(cycle);
            }
        }
        None
    }

    /// Validate structural integrity beyond per-add checks
    ///
    /// Checks, in order: cycles, dangling dependencies, and file conflicts.
    /// A file conflict exists when two artifacts would write the same path
    /// (equal `produces_file`, or overlapping `modifies`) without a
    /// dependency path ordering them into different waves. Equal
    /// `produces_file` is additionally only tolerated across different
    /// parallel groups.
    pub fn validate(&self) -> Result<()> {
        if let Some(path) = self.find_cycle() {
            return Err(CoreError::CycleDetected { path });
        }

        for spec in self.artifacts.values() {
            for requirement in &spec.requires {
                let in_graph = self.artifacts.contains_key(requirement)
                    || self
                        .artifacts
                        .values()
                        .any(|a| a.produces.contains(requirement));
                if !in_graph && !self.known_artifacts.contains(requirement) {
                    return Err(CoreError::DanglingDependency {
                        artifact: spec.id.clone(),
                        dependency: requirement.clone(),
                    });
                }
            }
        }

        let specs: Vec<&ArtifactSpec> = self.artifacts.values().collect();
        for (i, a) in specs.iter().enumerate() {
            for b in specs.iter().skip(i + 1) {
                let ordered = self.has_path(&a.id, &b.id) || self.has_path(&b.id, &a.id);

                if let (Some(file_a), Some(file_b)) = (&a.produces_file, &b.produces_file) {
                    if file_a == file_b {
                        let separated_groups = a.parallel_group != b.parallel_group;
                        if !(ordered && separated_groups) {
                            return Err(CoreError::FileConflict {
                                file: file_a.clone(),
                                first: a.id.clone(),
                                second: b.id.clone(),
                            });
                        }
                    }
                }

                if !ordered {
                    if let Some(shared) = a.modifies.intersection(&b.modifies).next() {
                        return Err(CoreError::FileConflict {
                            file: shared.clone(),
                            first: a.id.clone(),
                            second: b.id.clone(),
                        });
                    }
                }
            }
        }

        Ok(())
    }

    /// Deterministic topological layering
    ///
    /// Wave `n` contains artifacts whose in-graph dependencies all sit in
    /// waves `< n`. Within a wave, ids are in lexicographic order. On a
    /// cyclic graph the artifacts along the cycle are omitted; run
    /// [`validate`](Self::validate) first to reject cycles outright.
    pub fn execution_waves(&self) -> Vec<Vec<String>> {
        let deps: BTreeMap<String, BTreeSet<String>> = self
            .artifacts
            .keys()
            .map(|id| (id.clone(), self.dependencies_of(id)))
            .collect();

        let mut placed: BTreeSet<String> = BTreeSet::new();
        let mut waves: Vec<Vec<String>> = Vec::new();

        while placed.len() < self.artifacts.len() {
            // BTreeMap iteration keeps each wave lexicographically ordered.
            let wave: Vec<String> = deps
                .iter()
                .filter(|(id, dependencies)| {
                    !placed.contains(*id) && dependencies.iter().all(|d| placed.contains(d))
                })
                .map(|(id, _)| id.clone())
                .collect();

            if wave.is_empty() {
                break; // remaining artifacts form a cycle
            }
            placed.extend(wave.iter().cloned());
            waves.push(wave);
        }

        waves
    }

    /// Artifacts with no in-graph dependencies
    pub fn leaves(&self) -> Vec<String> {
        self.artifacts
            .keys()
            .filter(|id| self.dependencies_of(id).is_empty())
            .cloned()
            .collect()
    }

    /// Artifacts nothing else depends on
    pub fn roots(&self) -> Vec<String> {
        self.artifacts
            .keys()
            .filter(|id| self.dependents_of(id).is_empty())
            .cloned()
            .collect()
    }

    /// Critical-path length (number of execution waves)
    pub fn max_depth(&self) -> usize {
        self.execution_waves().len()
    }

    /// Select a model tier for one artifact
    ///
    /// Deterministic from graph structure: no dependencies → small;
    /// fan-in of three or more → large; everything else → medium.
    pub fn model_tier(&self, id: &str) -> ModelTier {
        let fan_in = self.dependencies_of(id).len();
        if fan_in == 0 {
            ModelTier::Small
        } else if fan_in >= 3 {
            ModelTier::Large
        } else {
            ModelTier::Medium
        }
    }

    /// Flatten the graph into wave-ordered tasks for subagent dispatch
    pub fn to_tasks(&self) -> Vec<PlannedTask> {
        let mut tasks = Vec::with_capacity(self.artifacts.len());
        for (wave, ids) in self.execution_waves().iter().enumerate() {
            for id in ids {
                let spec = &self.artifacts[id];
                tasks.push(PlannedTask {
                    artifact_id: id.clone(),
                    description: spec.description.clone(),
                    wave,
                    model_tier: self.model_tier(id),
                });
            }
        }
        tasks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn diamond() -> ArtifactGraph {
        // base -> (left, right) -> top
        let mut graph = ArtifactGraph::new();
        graph
            .add(ArtifactSpec::new("base", "foundation").with_produces(["base"]))
            .unwrap();
        graph
            .add(
                ArtifactSpec::new("left", "left branch")
                    .with_requires(["base"])
                    .with_produces(["left"]),
            )
            .unwrap();
        graph
            .add(
                ArtifactSpec::new("right", "right branch")
                    .with_requires(["base"])
                    .with_produces(["right"]),
            )
            .unwrap();
        graph
            .add(ArtifactSpec::new("top", "integration").with_requires(["left", "right"]))
            .unwrap();
        graph
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let mut graph = ArtifactGraph::new();
        graph.add(ArtifactSpec::new("a", "first")).unwrap();
        let err = graph.add(ArtifactSpec::new("a", "second")).unwrap_err();
        assert!(matches!(err, CoreError::DuplicateArtifactId(id) if id == "a"));
    }

    #[test]
    fn test_self_dependency_is_a_cycle() {
        let mut graph = ArtifactGraph::new();
        let err = graph
            .add(
                ArtifactSpec::new("a", "self-referential")
                    .with_produces(["thing"])
                    .with_requires(["thing"]),
            )
            .unwrap_err();
        assert!(matches!(err, CoreError::CycleDetected { .. }));
    }

    #[test]
    fn test_artifact_limit_enforced() {
        let mut graph = ArtifactGraph::with_limits(ArtifactLimits { max_artifacts: 1 });
        graph.add(ArtifactSpec::new("a", "fits")).unwrap();
        let err = graph.add(ArtifactSpec::new("b", "does not")).unwrap_err();
        assert!(matches!(err, CoreError::ArtifactLimitExceeded { limit: 1 }));
    }

    #[test]
    fn test_diamond_waves() {
        let waves = diamond().execution_waves();
        assert_eq!(
            waves,
            vec![
                vec!["base".to_string()],
                vec!["left".to_string(), "right".to_string()],
                vec!["top".to_string()],
            ]
        );
    }

    #[test]
    fn test_wave_tiebreak_is_lexicographic() {
        let mut graph = ArtifactGraph::new();
        for id in ["zeta", "alpha", "mid"] {
            graph.add(ArtifactSpec::new(id, "independent")).unwrap();
        }
        assert_eq!(graph.execution_waves(), vec![vec!["alpha", "mid", "zeta"]]);
    }

    #[test]
    fn test_structural_metrics() {
        let graph = diamond();
        assert_eq!(graph.leaves(), vec!["base"]);
        assert_eq!(graph.roots(), vec!["top"]);
        assert_eq!(graph.max_depth(), 3);
    }

    #[test]
    fn test_cycle_detection() {
        let mut graph = ArtifactGraph::new();
        graph
            .add(
                ArtifactSpec::new("a", "needs b")
                    .with_requires(["b-out"])
                    .with_produces(["a-out"]),
            )
            .unwrap();
        graph
            .add(
                ArtifactSpec::new("b", "needs a")
                    .with_requires(["a-out"])
                    .with_produces(["b-out"]),
            )
            .unwrap();
        assert!(graph.detect_cycle());
        assert!(matches!(
            graph.validate(),
            Err(CoreError::CycleDetected { .. })
        ));
    }

    #[test]
    fn test_dangling_dependency() {
        let mut graph = ArtifactGraph::new();
        graph
            .add(ArtifactSpec::new("a", "needs ghost").with_requires(["ghost"]))
            .unwrap();
        let err = graph.validate().unwrap_err();
        assert!(matches!(
            err,
            CoreError::DanglingDependency { artifact, dependency }
                if artifact == "a" && dependency == "ghost"
        ));
    }

    #[test]
    fn test_known_artifact_satisfies_requirement() {
        let mut graph = ArtifactGraph::new().with_known_artifacts(["ghost"]);
        graph
            .add(ArtifactSpec::new("a", "needs ghost").with_requires(["ghost"]))
            .unwrap();
        assert!(graph.validate().is_ok());
    }

    #[test]
    fn test_modifies_conflict_without_ordering() {
        let mut graph = ArtifactGraph::new();
        graph
            .add(ArtifactSpec::new("a", "writes main").with_modifies(["src/main.py"]))
            .unwrap();
        graph
            .add(ArtifactSpec::new("b", "also writes main").with_modifies(["src/main.py"]))
            .unwrap();
        let err = graph.validate().unwrap_err();
        assert!(matches!(err, CoreError::FileConflict { file, .. } if file == "src/main.py"));
    }

    #[test]
    fn test_modifies_overlap_allowed_when_ordered() {
        let mut graph = ArtifactGraph::new();
        graph
            .add(
                ArtifactSpec::new("a", "writes main first")
                    .with_produces(["skeleton"])
                    .with_modifies(["src/main.py"]),
            )
            .unwrap();
        graph
            .add(
                ArtifactSpec::new("b", "extends main")
                    .with_requires(["skeleton"])
                    .with_modifies(["src/main.py"]),
            )
            .unwrap();
        assert!(graph.validate().is_ok());
        // Ordered artifacts land in different waves.
        assert_eq!(graph.execution_waves(), vec![vec!["a"], vec!["b"]]);
    }

    #[test]
    fn test_produces_file_conflict_needs_groups_and_ordering() {
        let mut graph = ArtifactGraph::new();
        graph
            .add(
                ArtifactSpec::new("a", "writes module")
                    .with_produces(["module-v1"])
                    .with_produces_file("src/module.py")
                    .with_parallel_group("scaffold"),
            )
            .unwrap();
        graph
            .add(
                ArtifactSpec::new("b", "rewrites module")
                    .with_requires(["module-v1"])
                    .with_produces_file("src/module.py")
                    .with_parallel_group("implement"),
            )
            .unwrap();
        assert!(graph.validate().is_ok());
    }

    #[test]
    fn test_model_tier_from_structure() {
        let mut graph = ArtifactGraph::new();
        graph
            .add(ArtifactSpec::new("leaf", "no deps").with_produces(["l"]))
            .unwrap();
        graph
            .add(
                ArtifactSpec::new("mid", "one dep")
                    .with_requires(["l"])
                    .with_produces(["m"]),
            )
            .unwrap();
        for id in ["x", "y"] {
            graph
                .add(ArtifactSpec::new(id, "extra leaf").with_produces([format!("{id}-out")]))
                .unwrap();
        }
        graph
            .add(ArtifactSpec::new("hub", "fan-in").with_requires(["l", "m", "x-out", "y-out"]))
            .unwrap();

        assert_eq!(graph.model_tier("leaf"), ModelTier::Small);
        assert_eq!(graph.model_tier("mid"), ModelTier::Medium);
        assert_eq!(graph.model_tier("hub"), ModelTier::Large);
    }

    #[test]
    fn test_to_tasks_is_wave_ordered() {
        let tasks = diamond().to_tasks();
        assert_eq!(tasks.len(), 4);
        assert_eq!(tasks[0].artifact_id, "base");
        assert_eq!(tasks[0].wave, 0);
        assert_eq!(tasks[3].artifact_id, "top");
        assert_eq!(tasks[3].wave, 2);
    }

    /// Random acyclic graphs: each artifact may depend only on lower ids.
    fn arbitrary_dag() -> impl Strategy<Value = ArtifactGraph> {
        (1usize..10)
            .prop_flat_map(|n| {
                proptest::collection::vec(proptest::collection::vec(any::<bool>(), n), n)
            })
            .prop_map(|adjacency| {
                let n = adjacency.len();
                let mut graph = ArtifactGraph::new();
                for (i, row) in adjacency.iter().enumerate() {
                    let mut spec = ArtifactSpec::new(format!("a{i:02}"), "generated")
                        .with_produces([format!("out{i:02}")]);
                    for j in 0..i.min(n) {
                        if row[j] {
                            spec = spec.with_requires([format!("out{j:02}")]);
                        }
                    }
                    graph.add(spec).unwrap();
                }
                graph
            })
    }

    proptest! {
        #[test]
        fn prop_waves_cover_every_artifact_once(graph in arbitrary_dag()) {
            prop_assert!(!graph.detect_cycle());

            let waves = graph.execution_waves();
            let mut seen = BTreeSet::new();
            for wave in &waves {
                for id in wave {
                    prop_assert!(seen.insert(id.clone()), "artifact scheduled twice: {id}");
                }
            }
            prop_assert_eq!(seen.len(), graph.len());
        }

        #[test]
        fn prop_dependencies_precede_dependents(graph in arbitrary_dag()) {
            let waves = graph.execution_waves();
            let wave_of: HashMap<String, usize> = waves
                .iter()
                .enumerate()
                .flat_map(|(w, ids)| ids.iter().map(move |id| (id.clone(), w)))
                .collect();

            for id in graph.ids() {
                for dep in graph.dependencies_of(&id) {
                    prop_assert!(wave_of[&dep] < wave_of[&id],
                        "dependency {dep} not before {id}");
                }
            }
        }

        #[test]
        fn prop_validated_waves_have_disjoint_modifies(graph in arbitrary_dag()) {
            // Give every artifact a file keyed by its first dependency count,
            // creating occasional overlaps.
            let mut graph = graph;
            let ids = graph.ids();
            for id in &ids {
                let fan_in = graph.dependencies_of(id).len();
                let spec = graph.artifacts.get_mut(id).unwrap();
                spec.modifies.insert(format!("src/file{}.py", fan_in % 3));
            }

            if graph.validate().is_ok() {
                for wave in graph.execution_waves() {
                    for (i, a) in wave.iter().enumerate() {
                        for b in wave.iter().skip(i + 1) {
                            let ma = &graph.get(a).unwrap().modifies;
                            let mb = &graph.get(b).unwrap().modifies;
                            prop_assert!(ma.is_disjoint(mb),
                                "artifacts {a} and {b} share a modified file in one wave");
                        }
                    }
                }
            }
        }
    }
}
