//! Incremental executor - drive the graph wave by wave, skipping cached work
//!
//! Given an [`ArtifactGraph`] and an [`ExecutionCache`], the executor
//! decides what actually needs to run (content-addressed planning), then
//! dispatches each wave's work concurrently under the configured
//! concurrency bound.
//!
//! # Guarantees
//!
//! - at-most-once execution per `(artifact_id, input_hash)` within a run
//!   (in-flight deduplication);
//! - dependents of a failed artifact never execute - they become
//!   `upstream_failed` skips;
//! - every skip carries an explicit reason code;
//! - the full run is observable: `execution_plan_computed`, per-artifact
//!   cache hit/miss/skip events, `artifact_hash_computed` on success, and
//!   a final `complete` event with counts.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;
use std::time::Instant;

use futures::future::{join_all, BoxFuture};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use sunwell_core::hash::sha256_hex;
#[cfg(test)]
use sunwell_core::CoreError;
use sunwell_core::{ArtifactGraph, ArtifactSpec, CancellationToken, EventBus, EventType};

use crate::config::AgentConfig;
use crate::error::Result;
use crate::incremental::cache::{ExecutionCache, ExecutionStatus, Provenance};
use crate::incremental::deduper::WorkDeduper;
use crate::incremental::hasher::{compute_graph_hashes, ArtifactHash, TOOL_VERSION_STAMP};

/// Why an artifact was not executed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Cached success with a matching input hash
    Unchanged,
    /// A dependency failed or was itself unavailable
    UpstreamFailed,
    /// A recent failure is still inside the retry cooldown
    PriorFailureCooldown,
    /// Cache was bypassed because a rebuild was forced
    ForcedRebuild,
    /// Artifact was explicitly disabled for this run
    Disabled,
}

impl SkipReason {
    /// String form used in events
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::Unchanged => "unchanged",
            SkipReason::UpstreamFailed => "upstream_failed",
            SkipReason::PriorFailureCooldown => "prior_failure_cooldown",
            SkipReason::ForcedRebuild => "forced_rebuild",
            SkipReason::Disabled => "disabled",
        }
    }
}

/// One explicit skip
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkipDecision {
    /// Artifact being skipped
    pub artifact_id: String,
    /// Why
    pub reason: SkipReason,
}

/// Per-artifact plan decision
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Build the artifact
    Execute {
        /// True when the cache was bypassed deliberately
        forced: bool,
    },
    /// Skip with a reason
    Skip(SkipReason),
}

/// The computed plan for one run
#[derive(Debug, Clone)]
pub struct ExecutionPlan {
    /// Decision per artifact id
    pub decisions: BTreeMap<String, Decision>,
    /// Content hashes per artifact id
    pub hashes: BTreeMap<String, ArtifactHash>,
}

impl ExecutionPlan {
    /// Artifact ids that will execute
    pub fn to_execute(&self) -> Vec<&str> {
        self.decisions
            .iter()
            .filter(|(_, d)| matches!(d, Decision::Execute { .. }))
            .map(|(id, _)| id.as_str())
            .collect()
    }

    /// Planned skips
    pub fn to_skip(&self) -> Vec<SkipDecision> {
        self.decisions
            .iter()
            .filter_map(|(id, d)| match d {
                Decision::Skip(reason) => Some(SkipDecision {
                    artifact_id: id.clone(),
                    reason: *reason,
                }),
                Decision::Execute { .. } => None,
            })
            .collect()
    }

    /// Fraction of artifacts skipped, 0.0-1.0
    pub fn skip_percentage(&self) -> f64 {
        if self.decisions.is_empty() {
            return 0.0;
        }
        self.to_skip().len() as f64 / self.decisions.len() as f64
    }
}

/// Output produced for one artifact
#[derive(Debug, Clone)]
pub struct CreatedArtifact {
    /// Produced content; hashed into `output_hash`
    pub content: String,
}

/// Callback performing the actual work for one artifact
///
/// Typically delegates to a subagent. Receives a child cancellation token
/// it must check at suspension points.
pub type CreateArtifactFn = Arc<
    dyn Fn(ArtifactSpec, CancellationToken) -> BoxFuture<'static, sunwell_core::Result<CreatedArtifact>>
        + Send
        + Sync,
>;

/// Identity of the run, stamped into provenance rows
#[derive(Debug, Clone)]
pub struct RunInfo {
    /// Run id
    pub run_id: String,
    /// Hash of the top-level goal
    pub goal_hash: String,
    /// Model doing the work
    pub model_id: String,
}

/// Final result counts for one run
#[derive(Debug, Clone, Default)]
pub struct IncrementalResult {
    /// Artifacts built this run
    pub completed: Vec<String>,
    /// Artifacts skipped, with reasons (includes cache hits)
    pub skipped: Vec<SkipDecision>,
    /// Artifacts that failed
    pub failed: Vec<String>,
    /// Index of the first wave containing a failure
    pub first_failed_wave: Option<usize>,
}

impl IncrementalResult {
    /// True when nothing failed
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Shared outcome of one artifact execution (dedup payload)
#[derive(Debug, Clone)]
struct ArtifactRunOutcome {
    output_hash: Option<String>,
    error: Option<String>,
    cancelled: bool,
}

/// Wave-by-wave incremental executor
pub struct IncrementalExecutor {
    graph: ArtifactGraph,
    cache: Arc<ExecutionCache>,
    events: Arc<EventBus>,
    config: AgentConfig,
    run: RunInfo,
    token: CancellationToken,
    forced: BTreeSet<String>,
    disabled: BTreeSet<String>,
    deduper: WorkDeduper<ArtifactRunOutcome>,
}

impl IncrementalExecutor {
    /// Executor over a validated graph
    pub fn new(
        graph: ArtifactGraph,
        cache: Arc<ExecutionCache>,
        events: Arc<EventBus>,
        config: AgentConfig,
        run: RunInfo,
    ) -> Self {
        Self {
            graph,
            cache,
            events,
            config,
            run,
            token: CancellationToken::new(),
            forced: BTreeSet::new(),
            disabled: BTreeSet::new(),
            deduper: WorkDeduper::new(),
        }
    }

    /// Attach a cancellation token observed at every suspension point
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.token = token;
        self
    }

    /// Force specific artifacts to rebuild regardless of cache state
    pub fn force_rebuild<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.forced.extend(ids.into_iter().map(Into::into));
        self
    }

    /// Disable specific artifacts for this run
    pub fn disable<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.disabled.extend(ids.into_iter().map(Into::into));
        self
    }

    /// Compute the skip/execute plan without running anything
    ///
    /// Emits `execution_plan_computed` with the skip percentage.
    pub async fn plan_execution(&self) -> Result<ExecutionPlan> {
        let hashes = compute_graph_hashes(&self.graph, TOOL_VERSION_STAMP);
        let mut decisions: BTreeMap<String, Decision> = BTreeMap::new();
        // Artifacts whose outputs will not exist this run.
        let mut unavailable: BTreeSet<String> = BTreeSet::new();

        for wave in self.graph.execution_waves() {
            for id in wave {
                let decision = self
                    .plan_one(&id, &hashes[&id], &unavailable)
                    .await?;
                if matches!(
                    decision,
                    Decision::Skip(SkipReason::Disabled)
                        | Decision::Skip(SkipReason::PriorFailureCooldown)
                        | Decision::Skip(SkipReason::UpstreamFailed)
                ) {
                    unavailable.insert(id.clone());
                }
                decisions.insert(id, decision);
            }
        }

        let plan = ExecutionPlan { decisions, hashes };
        let to_execute = plan.to_execute().len();
        let to_skip = plan.to_skip().len();
        info!(
            to_execute,
            to_skip,
            skip_percentage = plan.skip_percentage(),
            "execution plan computed"
        );
        self.events.publish(
            EventType::ExecutionPlanComputed,
            json!({
                "total_artifacts": plan.decisions.len(),
                "to_execute": to_execute,
                "to_skip": to_skip,
                "skip_percentage": plan.skip_percentage(),
            }),
        );
        Ok(plan)
    }

    async fn plan_one(
        &self,
        id: &str,
        hash: &ArtifactHash,
        unavailable: &BTreeSet<String>,
    ) -> Result<Decision> {
        if self
            .graph
            .dependencies_of(id)
            .iter()
            .any(|dep| unavailable.contains(dep))
        {
            return Ok(Decision::Skip(SkipReason::UpstreamFailed));
        }
        if self.disabled.contains(id) {
            return Ok(Decision::Skip(SkipReason::Disabled));
        }
        if self.forced.contains(id) {
            return Ok(Decision::Execute { forced: true });
        }

        match self.cache.lookup(id, &hash.input_hash).await? {
            Some(entry) if entry.is_valid_success() => Ok(Decision::Skip(SkipReason::Unchanged)),
            Some(entry)
                if entry.status == ExecutionStatus::Failed
                    && entry.invalidated_at.is_none()
                    && entry.age().to_std().unwrap_or_default() < self.config.failure_cooldown =>
            {
                debug!(artifact_id = id, "prior failure still cooling down");
                Ok(Decision::Skip(SkipReason::PriorFailureCooldown))
            }
            _ => Ok(Decision::Execute { forced: false }),
        }
    }

    /// Plan and execute the graph
    pub async fn execute(&self, create: CreateArtifactFn) -> Result<IncrementalResult> {
        let plan = self.plan_execution().await?;

        let mut result = IncrementalResult::default();
        // Outputs unavailable due to runtime failures (extends the
        // plan-time set as waves execute).
        let mut runtime_unavailable: HashSet<String> = HashSet::new();
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_subagents.max(1)));

        for (wave_index, wave) in self.graph.execution_waves().into_iter().enumerate() {
            self.token.checkpoint().map_err(crate::error::AgentError::Core)?;

            let mut wave_jobs: Vec<(String, BoxFuture<'_, ArtifactRunOutcome>)> = Vec::new();

            for id in wave {
                match &plan.decisions[&id] {
                    Decision::Skip(SkipReason::Unchanged) => {
                        self.events.publish(
                            EventType::ArtifactCacheHit,
                            json!({
                                "artifact_id": id,
                                "input_hash": plan.hashes[&id].input_hash,
                            }),
                        );
                        result.skipped.push(SkipDecision {
                            artifact_id: id,
                            reason: SkipReason::Unchanged,
                        });
                    }
                    Decision::Skip(reason) => {
                        self.emit_skipped(&id, *reason);
                        result.skipped.push(SkipDecision {
                            artifact_id: id,
                            reason: *reason,
                        });
                    }
                    Decision::Execute { .. } => {
                        let upstream_failed = self
                            .graph
                            .dependencies_of(&id)
                            .iter()
                            .any(|dep| runtime_unavailable.contains(dep));
                        if upstream_failed {
                            self.emit_skipped(&id, SkipReason::UpstreamFailed);
                            runtime_unavailable.insert(id.clone());
                            result.skipped.push(SkipDecision {
                                artifact_id: id,
                                reason: SkipReason::UpstreamFailed,
                            });
                            continue;
                        }

                        let hash = plan.hashes[&id].clone();
                        let semaphore = Arc::clone(&semaphore);
                        let create = Arc::clone(&create);
                        let job = Box::pin(async move {
                            let _permit =
                                semaphore.acquire().await.expect("semaphore never closed");
                            self.execute_one(&hash, create).await
                        }) as BoxFuture<'_, ArtifactRunOutcome>;
                        wave_jobs.push((id, job));
                    }
                }
            }

            let (ids, jobs): (Vec<String>, Vec<_>) = wave_jobs.into_iter().unzip();
            for (id, outcome) in ids.into_iter().zip(join_all(jobs).await) {
                if outcome.output_hash.is_some() {
                    result.completed.push(id);
                } else {
                    if outcome.cancelled {
                        debug!(artifact_id = %id, "artifact cancelled mid-wave");
                    }
                    warn!(
                        artifact_id = %id,
                        error = outcome.error.as_deref().unwrap_or("unknown"),
                        "artifact failed"
                    );
                    runtime_unavailable.insert(id.clone());
                    result.failed.push(id);
                    result.first_failed_wave.get_or_insert(wave_index);
                }
            }
        }

        // Goal → artifacts mapping covers everything whose output exists.
        let mut produced: Vec<String> = result.completed.clone();
        produced.extend(
            result
                .skipped
                .iter()
                .filter(|s| s.reason == SkipReason::Unchanged)
                .map(|s| s.artifact_id.clone()),
        );
        if !produced.is_empty() {
            self.cache
                .record_goal_execution(&self.run.goal_hash, &produced)
                .await?;
        }

        self.events.publish(
            EventType::Complete,
            json!({
                "completed": result.completed.len(),
                "skipped": result.skipped.len(),
                "failed": result.failed.len(),
                "first_failed_wave": result.first_failed_wave,
            }),
        );
        Ok(result)
    }

    fn emit_skipped(&self, id: &str, reason: SkipReason) {
        self.events.publish(
            EventType::ArtifactSkipped,
            json!({"artifact_id": id, "reason": reason.as_str()}),
        );
    }

    /// Build one artifact, deduplicated by input hash
    ///
    /// The leader emits the events and writes the cache entry; concurrent
    /// requests for the same hash share its outcome.
    async fn execute_one(
        &self,
        hash: &ArtifactHash,
        create: CreateArtifactFn,
    ) -> ArtifactRunOutcome {
        let artifact_id = hash.artifact_id.clone();
        let input_hash = hash.input_hash.clone();
        let dedup_key = input_hash.clone();

        self.deduper
            .run(&dedup_key, || async move {
                let spec = self
                    .graph
                    .get(&artifact_id)
                    .expect("plan ids come from the graph")
                    .clone();

                self.events.publish(
                    EventType::ArtifactCacheMiss,
                    json!({"artifact_id": artifact_id, "input_hash": input_hash}),
                );
                self.events.publish(
                    EventType::TaskStart,
                    json!({"artifact_id": artifact_id, "description": spec.description}),
                );

                let started = Instant::now();
                match create(spec, self.token.child()).await {
                    Ok(created) => {
                        let output_hash = sha256_hex(created.content.as_bytes());
                        let provenance = Provenance {
                            run_id: self.run.run_id.clone(),
                            goal_hash: self.run.goal_hash.clone(),
                            duration_ms: started.elapsed().as_millis() as u64,
                            model_id: self.run.model_id.clone(),
                        };
                        if let Err(err) = self
                            .cache
                            .record(
                                &artifact_id,
                                &input_hash,
                                Some(&output_hash),
                                ExecutionStatus::Success,
                                &provenance,
                            )
                            .await
                        {
                            warn!(error = %err, "failed to record execution; continuing");
                        }

                        self.events.publish(
                            EventType::ArtifactHashComputed,
                            json!({
                                "artifact_id": artifact_id,
                                "input_hash": input_hash,
                                "output_hash": output_hash,
                            }),
                        );
                        self.events.publish(
                            EventType::TaskComplete,
                            json!({
                                "artifact_id": artifact_id,
                                "duration_ms": provenance.duration_ms,
                            }),
                        );
                        ArtifactRunOutcome {
                            output_hash: Some(output_hash),
                            error: None,
                            cancelled: false,
                        }
                    }
                    Err(err) => {
                        let cancelled = err.is_cancelled();
                        if !cancelled {
                            let provenance = Provenance {
                                run_id: self.run.run_id.clone(),
                                goal_hash: self.run.goal_hash.clone(),
                                duration_ms: started.elapsed().as_millis() as u64,
                                model_id: self.run.model_id.clone(),
                            };
                            if let Err(record_err) = self
                                .cache
                                .record(
                                    &artifact_id,
                                    &input_hash,
                                    None,
                                    ExecutionStatus::Failed,
                                    &provenance,
                                )
                                .await
                            {
                                warn!(error = %record_err, "failed to record failure");
                            }
                            self.events.publish(
                                EventType::TaskError,
                                json!({"artifact_id": artifact_id, "error": err.to_string()}),
                            );
                            self.events.publish(
                                EventType::Error,
                                err.event_data(Some(&artifact_id), Some(&self.run.run_id)),
                            );
                        }
                        ArtifactRunOutcome {
                            output_hash: None,
                            error: Some(err.to_string()),
                            cancelled,
                        }
                    }
                }
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use sunwell_core::AgentEvent;

    fn chain_graph() -> ArtifactGraph {
        // a -> b -> c
        let mut graph = ArtifactGraph::new();
        graph
            .add(ArtifactSpec::new("a", "first").with_produces(["a-out"]))
            .unwrap();
        graph
            .add(
                ArtifactSpec::new("b", "second")
                    .with_requires(["a-out"])
                    .with_produces(["b-out"]),
            )
            .unwrap();
        graph
            .add(ArtifactSpec::new("c", "third").with_requires(["b-out"]))
            .unwrap();
        graph
    }

    fn run_info() -> RunInfo {
        RunInfo {
            run_id: "run-1".to_string(),
            goal_hash: "goal-1".to_string(),
            model_id: "test-model".to_string(),
        }
    }

    fn counting_create(counter: Arc<AtomicUsize>) -> CreateArtifactFn {
        Arc::new(move |spec, _token| {
            let counter = Arc::clone(&counter);
            Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(CreatedArtifact {
                    content: format!("built {}", spec.id),
                })
            })
        })
    }

    fn failing_create(fail_id: &'static str) -> CreateArtifactFn {
        Arc::new(move |spec, _token| {
            Box::pin(async move {
                if spec.id == fail_id {
                    Err(CoreError::Execution(format!("{} exploded", spec.id)))
                } else {
                    Ok(CreatedArtifact {
                        content: format!("built {}", spec.id),
                    })
                }
            })
        })
    }

    fn collecting_bus() -> (Arc<EventBus>, Arc<Mutex<Vec<AgentEvent>>>) {
        let bus = Arc::new(EventBus::new("exec-test"));
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        bus.subscribe(move |event| sink.lock().push(event.clone()));
        (bus, events)
    }

    #[tokio::test]
    async fn test_fresh_graph_executes_everything() {
        let cache = Arc::new(ExecutionCache::open_in_memory().await.unwrap());
        let (bus, _) = collecting_bus();
        let counter = Arc::new(AtomicUsize::new(0));

        let executor = IncrementalExecutor::new(
            chain_graph(),
            cache,
            bus,
            AgentConfig::default(),
            run_info(),
        );
        let result = executor
            .execute(counting_create(Arc::clone(&counter)))
            .await
            .unwrap();

        assert_eq!(result.completed.len(), 3);
        assert!(result.is_success());
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_second_run_skips_unchanged() {
        let cache = Arc::new(ExecutionCache::open_in_memory().await.unwrap());
        let counter = Arc::new(AtomicUsize::new(0));

        let (bus, _) = collecting_bus();
        let first = IncrementalExecutor::new(
            chain_graph(),
            Arc::clone(&cache),
            bus,
            AgentConfig::default(),
            run_info(),
        );
        first
            .execute(counting_create(Arc::clone(&counter)))
            .await
            .unwrap();

        let (bus, events) = collecting_bus();
        let second = IncrementalExecutor::new(
            chain_graph(),
            cache,
            bus,
            AgentConfig::default(),
            run_info(),
        );
        let plan = second.plan_execution().await.unwrap();
        assert!(plan.to_execute().is_empty());
        assert_eq!(plan.to_skip().len(), 3);
        assert_eq!(plan.skip_percentage(), 1.0);

        let result = second
            .execute(counting_create(Arc::clone(&counter)))
            .await
            .unwrap();
        assert_eq!(result.completed.len(), 0);
        assert_eq!(result.skipped.len(), 3);
        // No extra work happened on the second run.
        assert_eq!(counter.load(Ordering::SeqCst), 3);

        let events = events.lock();
        assert_eq!(
            events
                .iter()
                .filter(|e| e.event_type == EventType::ArtifactCacheHit)
                .count(),
            3
        );
        assert!(!events
            .iter()
            .any(|e| e.event_type == EventType::ArtifactCacheMiss));
    }

    #[tokio::test]
    async fn test_failure_propagates_to_dependents() {
        let cache = Arc::new(ExecutionCache::open_in_memory().await.unwrap());
        let (bus, events) = collecting_bus();

        let executor = IncrementalExecutor::new(
            chain_graph(),
            cache,
            bus,
            AgentConfig::default(),
            run_info(),
        );
        let result = executor.execute(failing_create("a")).await.unwrap();

        assert_eq!(result.completed.len(), 0);
        assert_eq!(result.failed, vec!["a"]);
        assert_eq!(result.skipped.len(), 2);
        assert!(result
            .skipped
            .iter()
            .all(|s| s.reason == SkipReason::UpstreamFailed));
        assert_eq!(result.first_failed_wave, Some(0));

        let events = events.lock();
        let skip_reasons: Vec<&str> = events
            .iter()
            .filter(|e| e.event_type == EventType::ArtifactSkipped)
            .map(|e| e.data["reason"].as_str().unwrap())
            .collect();
        assert_eq!(skip_reasons, vec!["upstream_failed", "upstream_failed"]);
    }

    #[tokio::test]
    async fn test_mid_graph_failure_keeps_earlier_work() {
        let cache = Arc::new(ExecutionCache::open_in_memory().await.unwrap());
        let (bus, _) = collecting_bus();

        let executor = IncrementalExecutor::new(
            chain_graph(),
            Arc::clone(&cache),
            bus,
            AgentConfig::default(),
            run_info(),
        );
        let result = executor.execute(failing_create("b")).await.unwrap();

        assert_eq!(result.completed, vec!["a"]);
        assert_eq!(result.failed, vec!["b"]);
        assert_eq!(result.skipped.len(), 1);
        assert_eq!(result.first_failed_wave, Some(1));
    }

    #[tokio::test]
    async fn test_prior_failure_cooldown_skips() {
        let cache = Arc::new(ExecutionCache::open_in_memory().await.unwrap());
        let (bus, _) = collecting_bus();

        // First run: "a" fails and is recorded.
        let executor = IncrementalExecutor::new(
            chain_graph(),
            Arc::clone(&cache),
            bus,
            AgentConfig::default(),
            run_info(),
        );
        executor.execute(failing_create("a")).await.unwrap();

        // Second run inside the cooldown: "a" is skipped, dependents too.
        let (bus, _) = collecting_bus();
        let second = IncrementalExecutor::new(
            chain_graph(),
            Arc::clone(&cache),
            bus,
            AgentConfig::default(),
            run_info(),
        );
        let plan = second.plan_execution().await.unwrap();
        assert_eq!(
            plan.decisions["a"],
            Decision::Skip(SkipReason::PriorFailureCooldown)
        );
        assert_eq!(
            plan.decisions["b"],
            Decision::Skip(SkipReason::UpstreamFailed)
        );

        // With a zero cooldown the failure is retried instead.
        let (bus, _) = collecting_bus();
        let retry = IncrementalExecutor::new(
            chain_graph(),
            cache,
            bus,
            AgentConfig::default().with_failure_cooldown(std::time::Duration::ZERO),
            run_info(),
        );
        let plan = retry.plan_execution().await.unwrap();
        assert_eq!(plan.decisions["a"], Decision::Execute { forced: false });
    }

    #[tokio::test]
    async fn test_forced_rebuild_bypasses_cache() {
        let cache = Arc::new(ExecutionCache::open_in_memory().await.unwrap());
        let counter = Arc::new(AtomicUsize::new(0));

        let (bus, _) = collecting_bus();
        let first = IncrementalExecutor::new(
            chain_graph(),
            Arc::clone(&cache),
            bus,
            AgentConfig::default(),
            run_info(),
        );
        first
            .execute(counting_create(Arc::clone(&counter)))
            .await
            .unwrap();

        let (bus, _) = collecting_bus();
        let second = IncrementalExecutor::new(
            chain_graph(),
            cache,
            bus,
            AgentConfig::default(),
            run_info(),
        )
        .force_rebuild(["b"]);
        let plan = second.plan_execution().await.unwrap();
        assert_eq!(plan.decisions["a"], Decision::Skip(SkipReason::Unchanged));
        assert_eq!(plan.decisions["b"], Decision::Execute { forced: true });

        let result = second
            .execute(counting_create(Arc::clone(&counter)))
            .await
            .unwrap();
        assert_eq!(result.completed, vec!["b"]);
        assert_eq!(counter.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_disabled_artifact_blocks_dependents() {
        let cache = Arc::new(ExecutionCache::open_in_memory().await.unwrap());
        let (bus, _) = collecting_bus();

        let executor = IncrementalExecutor::new(
            chain_graph(),
            cache,
            bus,
            AgentConfig::default(),
            run_info(),
        )
        .disable(["a"]);
        let plan = executor.plan_execution().await.unwrap();
        assert_eq!(plan.decisions["a"], Decision::Skip(SkipReason::Disabled));
        assert_eq!(
            plan.decisions["b"],
            Decision::Skip(SkipReason::UpstreamFailed)
        );
    }

    #[tokio::test]
    async fn test_cancellation_stops_the_run() {
        let cache = Arc::new(ExecutionCache::open_in_memory().await.unwrap());
        let (bus, _) = collecting_bus();
        let token = CancellationToken::new();
        token.cancel();

        let executor = IncrementalExecutor::new(
            chain_graph(),
            cache,
            bus,
            AgentConfig::default(),
            run_info(),
        )
        .with_cancellation(token);

        let counter = Arc::new(AtomicUsize::new(0));
        let err = executor
            .execute(counting_create(Arc::clone(&counter)))
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }
}
