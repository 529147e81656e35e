//! End-to-end scenarios over the agent execution core
//!
//! Each test wires real components together (planner, cache, executor,
//! registry, recorder) around a scripted model, then asserts over observed
//! events and outcomes.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::BoxStream;
use parking_lot::Mutex;
use serde_json::json;

use sunwell_agent::{
    AgentConfig, CreateArtifactFn, CreatedArtifact, EventRecorder, ExecutionCache,
    IncrementalExecutor, ParentContext, RunInfo, SpawnTask, SubagentOutcome, SubagentRegistry,
};
use sunwell_core::{
    goal_hash, ArtifactGraph, ArtifactSpec, CoreError, EventBus, EventType, GenerateOptions,
    GenerateResult, Model, StreamChunk,
};
use sunwell_planner::{HarmonicPlanner, ScoringVersion};

/// Model that answers every prompt with the same plan JSON
struct PlanModel(String);

#[async_trait]
impl Model for PlanModel {
    fn id(&self) -> &str {
        "plan-model"
    }

    async fn generate(
        &self,
        _prompt: &str,
        _options: &GenerateOptions,
    ) -> sunwell_core::Result<GenerateResult> {
        Ok(GenerateResult {
            content: self.0.clone(),
            ..Default::default()
        })
    }

    async fn generate_stream(
        &self,
        _prompt: &str,
        _options: &GenerateOptions,
    ) -> sunwell_core::Result<BoxStream<'static, sunwell_core::Result<StreamChunk>>> {
        Err(CoreError::Model("streaming not scripted".into()))
    }
}

fn hello_plan_json() -> String {
    r#"[
        {"id": "hello-core", "description": "Write the hello module core",
         "produces_file": "src/hello.py"},
        {"id": "hello-tests", "description": "Write tests for the hello module",
         "requires": ["hello-core"], "produces_file": "tests/test_hello.py"}
    ]"#
    .to_string()
}

fn counting_create(counter: Arc<AtomicUsize>) -> CreateArtifactFn {
    Arc::new(move |spec, _token| {
        let counter = Arc::clone(&counter);
        Box::pin(async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(CreatedArtifact {
                content: format!("content of {}", spec.id),
            })
        })
    })
}

fn run_info(goal: &str) -> RunInfo {
    RunInfo {
        run_id: "scenario-run".to_string(),
        goal_hash: goal_hash(goal),
        model_id: "plan-model".to_string(),
    }
}

/// Scenario 1: a second run of the same goal is satisfied from the cache.
#[tokio::test]
async fn cache_hit_skips_work() {
    let goal = "build hello module";
    let model: Arc<dyn Model> = Arc::new(PlanModel(hello_plan_json()));
    let cache = Arc::new(ExecutionCache::open_in_memory().await.unwrap());
    let counter = Arc::new(AtomicUsize::new(0));

    // First run: plan and execute everything.
    let bus = Arc::new(EventBus::new("run-1"));
    let planner =
        HarmonicPlanner::new(Arc::clone(&model), Arc::clone(&bus)).with_candidates(1);
    let graph = planner.plan(goal, None).await.unwrap();
    graph.validate().unwrap();

    let executor = IncrementalExecutor::new(
        graph,
        Arc::clone(&cache),
        Arc::clone(&bus),
        AgentConfig::default(),
        run_info(goal),
    );
    let result = executor
        .execute(counting_create(Arc::clone(&counter)))
        .await
        .unwrap();
    assert_eq!(result.completed.len(), 2);
    assert_eq!(counter.load(Ordering::SeqCst), 2);

    // Second run with the same goal: nothing to execute.
    let bus = Arc::new(EventBus::new("run-2"));
    let recorder = EventRecorder::attach(Arc::clone(&bus));
    let planner =
        HarmonicPlanner::new(Arc::clone(&model), Arc::clone(&bus)).with_candidates(1);
    let graph = planner.plan(goal, None).await.unwrap();

    let executor = IncrementalExecutor::new(
        graph,
        Arc::clone(&cache),
        Arc::clone(&bus),
        AgentConfig::default(),
        run_info(goal),
    );
    let result = executor
        .execute(counting_create(Arc::clone(&counter)))
        .await
        .unwrap();

    assert_eq!(result.completed.len(), 0);
    assert_eq!(result.skipped.len(), 2);
    assert_eq!(counter.load(Ordering::SeqCst), 2);

    let plan_events = recorder.events_of_type(EventType::ExecutionPlanComputed);
    assert_eq!(plan_events.len(), 1);
    assert_eq!(plan_events[0].data["to_execute"], 0);
    assert_eq!(plan_events[0].data["to_skip"], 2);

    assert_eq!(recorder.events_of_type(EventType::ArtifactCacheHit).len(), 2);
    assert!(recorder.events_of_type(EventType::ArtifactCacheMiss).is_empty());
    assert!(!recorder.has_tool_call("write_file"));

    // The goal → artifacts mapping covers both artifacts.
    let produced = cache.artifacts_for_goal(&goal_hash(goal)).await.unwrap();
    assert_eq!(produced, vec!["hello-core", "hello-tests"]);
}

/// Scenario 2: two artifacts writing the same file with no ordering are
/// rejected at graph construction.
#[tokio::test]
async fn modifies_conflict_rejected_at_planning() {
    let mut graph = ArtifactGraph::new();
    graph
        .add(ArtifactSpec::new("a", "writes main").with_modifies(["src/main.py"]))
        .unwrap();
    graph
        .add(ArtifactSpec::new("b", "also writes main").with_modifies(["src/main.py"]))
        .unwrap();

    let err = graph.validate().unwrap_err();
    assert!(matches!(
        err,
        CoreError::FileConflict { ref file, .. } if file == "src/main.py"
    ));
}

/// Scenario 3: a subagent that stops heartbeating is cancelled.
#[tokio::test]
async fn stale_subagent_cancelled() {
    let registry = SubagentRegistry::new();
    let record = registry.register(
        "child-1",
        "parent-1",
        "long running task",
        sunwell_agent::CleanupPolicy::Delete,
        None,
        30,
    );
    registry.mark_started(&record.run_id);

    // No heartbeat arrives; past the threshold the record is stale.
    tokio::time::sleep(Duration::from_millis(20)).await;
    let cancelled = registry.cancel_stale(Some(0.01), "No heartbeat received");
    assert_eq!(cancelled, 1);

    let record = registry.get(&record.run_id).unwrap();
    assert_eq!(record.outcome, Some(SubagentOutcome::Cancelled));
    assert_eq!(record.error_message.as_deref(), Some("No heartbeat received"));
    assert!(registry
        .cancellation_token(&record.run_id)
        .unwrap()
        .is_cancelled());
}

/// Scenario 4 lives with the planner (best candidate wins); here we check
/// the winner event reaches journey consumers through a shared bus.
#[tokio::test]
async fn plan_winner_is_observable() {
    let bus = Arc::new(EventBus::new("plan-run"));
    let recorder = EventRecorder::attach(Arc::clone(&bus));

    let model: Arc<dyn Model> = Arc::new(PlanModel(hello_plan_json()));
    let planner = HarmonicPlanner::new(model, Arc::clone(&bus))
        .with_candidates(2)
        .with_scoring(ScoringVersion::V1);
    planner.plan("build hello module", None).await.unwrap();

    let winners = recorder.events_of_type(EventType::PlanWinner);
    assert_eq!(winners.len(), 1);
    assert_eq!(winners[0].data["selected_candidate_id"], "candidate-0");
    assert_eq!(winners[0].data["artifact_count"], 2);
}

/// Scenario 5: a failure blocks all transitive dependents.
#[tokio::test]
async fn failure_propagates_to_dependents() {
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

    let cache = Arc::new(ExecutionCache::open_in_memory().await.unwrap());
    let bus = Arc::new(EventBus::new("fail-run"));
    let recorder = EventRecorder::attach(Arc::clone(&bus));

    let create: CreateArtifactFn = Arc::new(|spec, _token| {
        Box::pin(async move {
            if spec.id == "a" {
                Err(CoreError::Execution("forced failure".into()))
            } else {
                Ok(CreatedArtifact {
                    content: "ok".into(),
                })
            }
        })
    });

    let executor = IncrementalExecutor::new(
        graph,
        cache,
        Arc::clone(&bus),
        AgentConfig::default(),
        run_info("doomed goal"),
    );
    let result = executor.execute(create).await.unwrap();

    assert_eq!(result.completed.len(), 0);
    assert_eq!(result.skipped.len(), 2);
    assert_eq!(result.failed, vec!["a"]);
    assert!(result
        .skipped
        .iter()
        .all(|s| s.reason == sunwell_agent::SkipReason::UpstreamFailed));

    // One error event, surfaced by kind.
    assert!(recorder.has_error());
    let errors = recorder.events_of_type(EventType::Error);
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].data["kind"], "execution");
    assert_eq!(errors[0].data["artifact_id"], "a");
}

/// Scenario 6: a parent at the depth limit cannot spawn.
#[tokio::test]
async fn spawn_depth_limit_enforced() {
    let registry = SubagentRegistry::new();
    let config = AgentConfig::default().with_max_subagent_depth(2);
    let parent = ParentContext {
        session_id: "deep-parent".to_string(),
        spawn_depth: 2,
    };

    let err = registry
        .spawn_parallel(
            &parent,
            &[
                SpawnTask {
                    task: "task one".to_string(),
                    label: None,
                },
                SpawnTask {
                    task: "task two".to_string(),
                    label: None,
                },
            ],
            &config,
        )
        .unwrap_err();

    assert!(matches!(
        err,
        CoreError::SpawnDepthExceeded { depth: 2, limit: 2 }
    ));
    assert!(registry.list_pending().is_empty());
    assert!(registry.list_active().is_empty());
}

/// Full pipeline: spawned subagents execute the waves, heartbeat, and are
/// awaited; every lifecycle stage is observable on the bus.
#[tokio::test]
async fn wave_execution_with_registry() {
    let goal = "build hello module";
    let model: Arc<dyn Model> = Arc::new(PlanModel(hello_plan_json()));
    let bus = Arc::new(EventBus::new("pipeline-run"));
    let recorder = EventRecorder::attach(Arc::clone(&bus));

    let planner = HarmonicPlanner::new(model, Arc::clone(&bus)).with_candidates(1);
    let graph = planner.plan(goal, None).await.unwrap();

    let registry = Arc::new(SubagentRegistry::new().with_events(Arc::clone(&bus)));
    let config = AgentConfig::default();

    // Drive each artifact through a registered subagent.
    let create: CreateArtifactFn = {
        let registry = Arc::clone(&registry);
        let config = config.clone();
        Arc::new(move |spec, _token| {
            let registry = Arc::clone(&registry);
            let config = config.clone();
            let parent = ParentContext {
                session_id: "root-session".to_string(),
                spawn_depth: 0,
            };
            Box::pin(async move {
                let records = registry
                    .spawn_parallel(
                        &parent,
                        &[SpawnTask {
                            task: spec.description.clone(),
                            label: Some(spec.id.clone()),
                        }],
                        &config,
                    )
                    .map_err(|e| CoreError::Execution(e.to_string()))?;
                let record = &records[0];

                registry.mark_started(&record.run_id);
                registry.heartbeat(&record.run_id, Some(0.5), Some("working".into()));
                registry.mark_complete(&record.run_id, SubagentOutcome::Ok, None);

                Ok(CreatedArtifact {
                    content: format!("built {}", spec.id),
                })
            })
        })
    };

    let cache = Arc::new(ExecutionCache::open_in_memory().await.unwrap());
    let executor = IncrementalExecutor::new(
        graph,
        cache,
        Arc::clone(&bus),
        config,
        run_info(goal),
    );
    let result = executor.execute(create).await.unwrap();
    assert!(result.is_success());
    assert_eq!(result.completed.len(), 2);

    // Subagent lifecycle fully observable.
    assert_eq!(recorder.events_of_type(EventType::SubagentSpawn).len(), 2);
    assert_eq!(recorder.events_of_type(EventType::SubagentStart).len(), 2);
    assert_eq!(recorder.events_of_type(EventType::SubagentHeartbeat).len(), 2);
    assert_eq!(recorder.events_of_type(EventType::SubagentComplete).len(), 2);

    // Chain graph: hello-core ran before hello-tests.
    let events = recorder.all_events();
    let pos = |id: &str| {
        events
            .iter()
            .position(|e| {
                e.event_type == EventType::ArtifactHashComputed && e.data["artifact_id"] == id
            })
            .unwrap()
    };
    assert!(pos("hello-core") < pos("hello-tests"));

    // All subagents finished; none left running.
    assert!(registry.list_active().is_empty());
    assert_eq!(registry.list_for_parent("root-session").len(), 2);
}

/// Await-all marks laggards as timed out.
#[tokio::test]
async fn await_all_times_out_stragglers() {
    let registry = SubagentRegistry::new();
    let config = AgentConfig::default();
    let parent = ParentContext {
        session_id: "parent".to_string(),
        spawn_depth: 0,
    };

    let records = registry
        .spawn_parallel(
            &parent,
            &[
                SpawnTask {
                    task: "finishes".to_string(),
                    label: None,
                },
                SpawnTask {
                    task: "hangs".to_string(),
                    label: None,
                },
            ],
            &config,
        )
        .unwrap();

    registry.mark_started(&records[0].run_id);
    registry.mark_started(&records[1].run_id);
    registry.mark_complete(&records[0].run_id, SubagentOutcome::Ok, None);

    let results = registry
        .await_all(
            &records,
            Duration::from_millis(80),
            Duration::from_millis(10),
        )
        .await;

    assert_eq!(results[&records[0].run_id], SubagentOutcome::Ok);
    assert_eq!(results[&records[1].run_id], SubagentOutcome::Timeout);
}

/// NDJSON sink: the full event stream serializes one object per line with
/// the required fields.
#[tokio::test]
async fn ndjson_stream_has_required_fields() {
    use std::io::Write;

    struct SharedBuf(Arc<Mutex<Vec<u8>>>);
    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    let buf = Arc::new(Mutex::new(Vec::new()));
    let bus = Arc::new(EventBus::new("ndjson-run"));
    bus.set_ndjson_sink(Box::new(SharedBuf(Arc::clone(&buf))));

    bus.publish(EventType::TaskStart, json!({"artifact_id": "a"}));
    bus.publish(EventType::GatePass, json!({"gate_id": "g", "gate_type": "syntax"}));
    bus.publish(EventType::Complete, json!({"completed": 1}));

    let text = String::from_utf8(buf.lock().clone()).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 3);

    for line in lines {
        let value: serde_json::Value = serde_json::from_str(line).unwrap();
        assert!(value["type"].is_string());
        assert!(value["timestamp"].is_f64());
        assert!(value["data"].is_object());
    }
}
