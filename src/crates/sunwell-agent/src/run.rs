//! Goal runner - bind planning, execution, and memory for one goal
//!
//! The components in this workspace compose freely, but a normal run
//! always has the same shape: plan the goal, validate the graph, execute
//! it incrementally, and write back what was learned. [`GoalRunner`] is
//! that composition:
//!
//! ```text
//! goal ──► Planner ──► ArtifactGraph ──► IncrementalExecutor
//!                                              │
//!                      briefing updates ◄── events
//!                                              │
//!                    failure learnings ──► LearningJournal
//! ```
//!
//! The briefing is created on the first goal, updated as artifacts land
//! (observed through the event bus), and overwritten atomically. Terminal
//! task failures become `failure_pattern` learnings in the journal.

use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{info, warn};

use sunwell_core::{goal_hash, CancellationToken, EventBus, EventType, Model};
use sunwell_memory::{category, Briefing, Learning, LearningJournal, WorkspacePaths};
use sunwell_planner::Planner;

use crate::config::AgentConfig;
use crate::error::Result;
use crate::incremental::{CreateArtifactFn, ExecutionCache, IncrementalExecutor, IncrementalResult, RunInfo};

/// Orchestrates one goal end to end
pub struct GoalRunner {
    model: Arc<dyn Model>,
    events: Arc<EventBus>,
    cache: Arc<ExecutionCache>,
    journal: LearningJournal,
    briefing_path: PathBuf,
    config: AgentConfig,
    token: CancellationToken,
}

impl GoalRunner {
    /// Runner over a workspace layout
    pub fn new(
        model: Arc<dyn Model>,
        events: Arc<EventBus>,
        cache: Arc<ExecutionCache>,
        paths: &WorkspacePaths,
        config: AgentConfig,
    ) -> Self {
        Self {
            model,
            events,
            cache,
            journal: LearningJournal::new(paths.memory_dir()),
            briefing_path: paths.briefing_file(),
            config,
            token: CancellationToken::new(),
        }
    }

    /// Attach a cancellation token for the whole run
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.token = token;
        self
    }

    /// Plan and execute one goal, writing memory back as it goes
    pub async fn run(
        &self,
        goal: &str,
        planner: &Planner,
        create: CreateArtifactFn,
    ) -> Result<IncrementalResult> {
        let goal_hash = goal_hash(goal);
        let session_id = self.events.session_id().to_string();

        // Reuse the briefing when the same goal resumes; start fresh
        // otherwise.
        let briefing = Briefing::load(&self.briefing_path)
            .filter(|b| b.goal_hash == goal_hash)
            .unwrap_or_else(|| Briefing::new(goal, &goal_hash, &session_id));
        let briefing = Arc::new(Mutex::new(briefing));
        self.save_briefing(&briefing);

        let graph = planner.plan(goal, None).await?;
        graph.validate()?;
        let total_artifacts = graph.len().max(1);

        // Track progress through the event stream so the briefing stays
        // current while waves execute.
        let progress_done = Arc::new(Mutex::new(0usize));
        let subscriber_id = {
            let briefing = Arc::clone(&briefing);
            let progress_done = Arc::clone(&progress_done);
            let briefing_path = self.briefing_path.clone();
            self.events.subscribe(move |event| {
                let action = match event.event_type {
                    EventType::TaskComplete | EventType::ArtifactCacheHit => {
                        event.data["artifact_id"].as_str().map(str::to_string)
                    }
                    _ => None,
                };
                let Some(artifact_id) = action else { return };

                let mut done = progress_done.lock();
                *done += 1;
                let mut briefing = briefing.lock();
                briefing.record_progress(
                    *done as f64 / total_artifacts as f64,
                    format!("finished {artifact_id}"),
                    String::new(),
                );
                if let Err(err) = briefing.save(&briefing_path) {
                    warn!(error = %err, "failed to save briefing");
                }
            })
        };

        let run_info = RunInfo {
            run_id: uuid::Uuid::new_v4().simple().to_string()[..16].to_string(),
            goal_hash: goal_hash.clone(),
            model_id: self.model.id().to_string(),
        };
        let executor = IncrementalExecutor::new(
            graph,
            Arc::clone(&self.cache),
            Arc::clone(&self.events),
            self.config.clone(),
            run_info,
        )
        .with_cancellation(self.token.child());

        let result = executor.execute(create).await;
        self.events.unsubscribe(subscriber_id);

        let result = result?;

        // Memory write-back: failures become durable learnings.
        if !result.failed.is_empty() {
            let learnings: Vec<Learning> = result
                .failed
                .iter()
                .map(|artifact_id| {
                    Learning::new(
                        format!("artifact '{artifact_id}' failed under goal '{goal}'"),
                        category::FAILURE_PATTERN,
                        0.8,
                    )
                })
                .collect();
            if let Err(err) = self.journal.append_batch(&learnings) {
                warn!(error = %err, "failed to journal failure patterns");
            }
        }

        {
            let mut briefing = briefing.lock();
            if result.failed.is_empty() {
                briefing.record_progress(1.0, "goal complete", String::new());
            } else {
                for artifact_id in &result.failed {
                    briefing.record_blocker(format!("artifact '{artifact_id}' failed"));
                }
            }
        }
        self.save_briefing(&briefing);

        info!(
            completed = result.completed.len(),
            skipped = result.skipped.len(),
            failed = result.failed.len(),
            "goal run finished"
        );
        Ok(result)
    }

    fn save_briefing(&self, briefing: &Arc<Mutex<Briefing>>) {
        if let Err(err) = briefing.lock().save(&self.briefing_path) {
            warn!(error = %err, "failed to save briefing");
        }
    }
}
