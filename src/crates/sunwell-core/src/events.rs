//! Agent event stream - totally-ordered observability for every run
//!
//! Everything the core does is observable through a single event stream:
//! planning, cache decisions, subagent lifecycle, tool invocations,
//! validation gates, and errors. The stream drives three consumers:
//!
//! - **Live observers** (CLI/IDE front-ends) subscribe to the bus and render
//!   progress in real time;
//! - **NDJSON sinks** capture the stream as one JSON object per line for
//!   replay and external tooling;
//! - **The journey recorder** collects events per turn and exposes a
//!   behavioral assertion API for tests.
//!
//! # Ordering
//!
//! Events published through one [`EventBus`] carry a monotonically
//! increasing sequence number, so the per-session stream is totally
//! ordered. Events from different subagents interleave in publish order.
//!
//! # Subscriber isolation
//!
//! Subscribers are invoked synchronously in registration order. A panicking
//! subscriber is caught and logged; it never breaks the publisher or other
//! subscribers.

use std::io::Write;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, warn};

/// Closed set of event types emitted by the core
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// Candidate generation is starting (total_candidates, variance_strategy)
    PlanCandidateStart,
    /// One candidate plan was generated (candidate_id, artifact_count, ...)
    PlanCandidateGenerated,
    /// All candidate generation finished (successful/failed counts)
    PlanCandidatesComplete,
    /// A winning plan was selected (selected_candidate_id, metrics, reason)
    PlanWinner,
    /// The incremental executor computed its skip/execute plan
    ExecutionPlanComputed,
    /// An artifact was satisfied from the execution cache
    ArtifactCacheHit,
    /// An artifact must be built (cache miss or hash mismatch)
    ArtifactCacheMiss,
    /// An artifact's output hash was computed and recorded
    ArtifactHashComputed,
    /// An artifact was skipped (reason code in payload)
    ArtifactSkipped,
    /// A task began executing
    TaskStart,
    /// A task finished successfully
    TaskComplete,
    /// A task failed
    TaskError,
    /// A tool invocation started
    ToolStart,
    /// A tool invocation finished
    ToolComplete,
    /// A tool invocation failed
    ToolError,
    /// A subagent was registered
    SubagentSpawn,
    /// A subagent began executing
    SubagentStart,
    /// A subagent reported a heartbeat
    SubagentHeartbeat,
    /// A subagent finished (outcome in payload)
    SubagentComplete,
    /// A model generation finished (usage metrics in payload)
    ModelComplete,
    /// A validation gate passed
    GatePass,
    /// A validation gate failed
    GateFail,
    /// A signal was extracted from source or output
    Signal,
    /// A signal was routed to a handler
    SignalRoute,
    /// A reliability heuristic flagged the run
    ReliabilityWarning,
    /// Output claimed completion that observed behavior contradicts
    ReliabilityHallucination,
    /// An error occurred (kind, message, suggested_action)
    Error,
    /// The run completed
    Complete,
}

impl EventType {
    /// Wire name of this event type (NDJSON `type` field)
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::PlanCandidateStart => "plan_candidate_start",
            EventType::PlanCandidateGenerated => "plan_candidate_generated",
            EventType::PlanCandidatesComplete => "plan_candidates_complete",
            EventType::PlanWinner => "plan_winner",
            EventType::ExecutionPlanComputed => "execution_plan_computed",
            EventType::ArtifactCacheHit => "artifact_cache_hit",
            EventType::ArtifactCacheMiss => "artifact_cache_miss",
            EventType::ArtifactHashComputed => "artifact_hash_computed",
            EventType::ArtifactSkipped => "artifact_skipped",
            EventType::TaskStart => "task_start",
            EventType::TaskComplete => "task_complete",
            EventType::TaskError => "task_error",
            EventType::ToolStart => "tool_start",
            EventType::ToolComplete => "tool_complete",
            EventType::ToolError => "tool_error",
            EventType::SubagentSpawn => "subagent_spawn",
            EventType::SubagentStart => "subagent_start",
            EventType::SubagentHeartbeat => "subagent_heartbeat",
            EventType::SubagentComplete => "subagent_complete",
            EventType::ModelComplete => "model_complete",
            EventType::GatePass => "gate_pass",
            EventType::GateFail => "gate_fail",
            EventType::Signal => "signal",
            EventType::SignalRoute => "signal_route",
            EventType::ReliabilityWarning => "reliability_warning",
            EventType::ReliabilityHallucination => "reliability_hallucination",
            EventType::Error => "error",
            EventType::Complete => "complete",
        }
    }
}

/// One event in the per-session stream
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentEvent {
    /// Event type
    #[serde(rename = "type")]
    pub event_type: EventType,

    /// Wall-clock seconds since the Unix epoch
    pub timestamp: f64,

    /// Per-bus monotonic sequence number (total order within a session)
    pub seq: u64,

    /// Session the event belongs to
    pub session_id: String,

    /// Structured payload
    pub data: Value,
}

impl AgentEvent {
    /// Render as one NDJSON line (no trailing newline)
    pub fn to_ndjson(&self) -> String {
        serde_json::to_string(self).expect("events are always serializable")
    }
}

/// Subscriber callback invoked for every published event
pub type EventSubscriber = Arc<dyn Fn(&AgentEvent) + Send + Sync>;

struct BusState {
    subscribers: Vec<(u64, EventSubscriber)>,
    sink: Option<Box<dyn Write + Send>>,
}

/// Single-process broadcast event bus
///
/// Publishing is synchronous from the caller's execution context; there is
/// no buffering unless an NDJSON sink is attached, in which case each event
/// is additionally written as one JSON line.
///
/// ```rust
/// use sunwell_core::events::{EventBus, EventType};
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicUsize, Ordering};
///
/// let bus = EventBus::new("session-1");
/// let seen = Arc::new(AtomicUsize::new(0));
/// let seen_clone = Arc::clone(&seen);
///
/// bus.subscribe(move |_event| {
///     seen_clone.fetch_add(1, Ordering::SeqCst);
/// });
///
/// bus.publish(EventType::TaskStart, serde_json::json!({"task": "demo"}));
/// assert_eq!(seen.load(Ordering::SeqCst), 1);
/// ```
pub struct EventBus {
    session_id: String,
    seq: AtomicU64,
    next_subscriber_id: AtomicU64,
    state: Mutex<BusState>,
}

impl EventBus {
    /// Create a bus for one session
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            seq: AtomicU64::new(0),
            next_subscriber_id: AtomicU64::new(0),
            state: Mutex::new(BusState {
                subscribers: Vec::new(),
                sink: None,
            }),
        }
    }

    /// Session id this bus publishes under
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Attach an NDJSON sink (json-stream mode)
    ///
    /// Every subsequent event is written as one JSON object per line.
    pub fn set_ndjson_sink(&self, sink: Box<dyn Write + Send>) {
        self.state.lock().sink = Some(sink);
    }

    /// Register a subscriber; returns an id usable with [`unsubscribe`]
    ///
    /// [`unsubscribe`]: EventBus::unsubscribe
    pub fn subscribe<F>(&self, subscriber: F) -> u64
    where
        F: Fn(&AgentEvent) + Send + Sync + 'static,
    {
        let id = self.next_subscriber_id.fetch_add(1, Ordering::Relaxed);
        self.state.lock().subscribers.push((id, Arc::new(subscriber)));
        id
    }

    /// Remove a subscriber by id
    pub fn unsubscribe(&self, id: u64) {
        self.state.lock().subscribers.retain(|(sid, _)| *sid != id);
    }

    /// Publish an event to all subscribers (and the sink, if any)
    ///
    /// Returns the published event. Subscriber callbacks run outside any
    /// internal lock; a panicking subscriber is isolated and logged.
    pub fn publish(&self, event_type: EventType, data: Value) -> AgentEvent {
        let event = AgentEvent {
            event_type,
            timestamp: wall_clock_seconds(),
            seq: self.seq.fetch_add(1, Ordering::SeqCst),
            session_id: self.session_id.clone(),
            data,
        };

        // Snapshot subscribers and write the sink under the lock, then
        // dispatch callbacks outside it so a subscriber publishing back
        // into the bus cannot deadlock.
        let subscribers: Vec<EventSubscriber> = {
            let mut state = self.state.lock();
            if let Some(sink) = state.sink.as_mut() {
                let line = event.to_ndjson();
                if let Err(err) = writeln!(sink, "{line}").and_then(|_| sink.flush()) {
                    warn!(error = %err, "failed to write event to NDJSON sink");
                }
            }
            state.subscribers.iter().map(|(_, s)| Arc::clone(s)).collect()
        };

        for subscriber in subscribers {
            let result = catch_unwind(AssertUnwindSafe(|| subscriber(&event)));
            if result.is_err() {
                error!(
                    event_type = event.event_type.as_str(),
                    "event subscriber panicked; continuing with remaining subscribers"
                );
            }
        }

        event
    }

    /// Number of registered subscribers
    pub fn subscriber_count(&self) -> usize {
        self.state.lock().subscribers.len()
    }
}

fn wall_clock_seconds() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}
