//! Subagent registry - track spawned subagents and their lifecycle
//!
//! The registry is the single owning authority over subagent records.
//! Subagents hold only their `run_id` (a weak handle); parent↔child links
//! are session-id strings, never ownership pointers.
//!
//! # Lifecycle
//!
//! ```text
//! PENDING ──mark_started──► RUNNING ──mark_complete(ok|error|timeout|cancelled)──► COMPLETE
//!   │                          │
//!   └─heartbeat updates────────┘
//! ```
//!
//! # Concurrency
//!
//! Internal state sits behind one mutex; operations are O(1) or
//! O(n records). Listener callbacks always run outside the critical
//! section so a listener can call back into the registry without
//! deadlocking.
//!
//! # Persistence
//!
//! With a persistence path set, every state change serializes the whole
//! record map to JSON (`{"version": 1, "runs": {...}}`) and renames a temp
//! file into place. `restore` re-hydrates on startup; unknown versions are
//! skipped with a warning.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use sunwell_core::{CancellationToken, CoreError, EventBus, EventType};

use crate::config::{AgentConfig, CleanupPolicy};

/// Persistence format version
const REGISTRY_VERSION: u64 = 1;

/// Outcome of a subagent run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubagentOutcome {
    /// Finished successfully
    Ok,
    /// Failed with an error
    Error,
    /// Did not finish before the await deadline
    Timeout,
    /// Cancelled (stale heartbeat or explicit request)
    Cancelled,
}

impl SubagentOutcome {
    /// String form used in events and persistence
    pub fn as_str(&self) -> &'static str {
        match self {
            SubagentOutcome::Ok => "ok",
            SubagentOutcome::Error => "error",
            SubagentOutcome::Timeout => "timeout",
            SubagentOutcome::Cancelled => "cancelled",
        }
    }
}

/// Lifecycle record for one spawned subagent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubagentRecord {
    /// Unique run identifier
    pub run_id: String,

    /// Session id of the spawned subagent
    pub child_session_id: String,

    /// Session id of the parent that spawned it
    pub parent_session_id: String,

    /// Task/goal assigned to the subagent
    pub task: String,

    /// Cleanup policy for session state after completion
    pub cleanup: CleanupPolicy,

    /// Optional label for identification
    #[serde(default)]
    pub label: Option<String>,

    /// When the subagent was registered
    pub created_at: DateTime<Utc>,

    /// When execution started (may be delayed past registration)
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,

    /// When the subagent completed
    #[serde(default)]
    pub ended_at: Option<DateTime<Utc>>,

    /// Outcome; `None` while pending or running
    #[serde(default)]
    pub outcome: Option<SubagentOutcome>,

    /// Error message when the outcome is `Error` or `Cancelled`
    #[serde(default)]
    pub error_message: Option<String>,

    /// When the last heartbeat was received
    #[serde(default)]
    pub last_heartbeat: Option<DateTime<Utc>>,

    /// Expected heartbeat interval; staleness is 2× this
    pub heartbeat_interval_seconds: u64,

    /// Reported progress, 0.0-1.0
    #[serde(default)]
    pub progress: Option<f64>,

    /// Latest status message from the subagent
    #[serde(default)]
    pub status_message: Option<String>,
}

impl SubagentRecord {
    /// True if not yet started
    pub fn is_pending(&self) -> bool {
        self.started_at.is_none()
    }

    /// True if started but not ended
    pub fn is_running(&self) -> bool {
        self.started_at.is_some() && self.ended_at.is_none()
    }

    /// True if ended (any outcome)
    pub fn is_complete(&self) -> bool {
        self.ended_at.is_some()
    }

    /// Runtime in milliseconds once complete
    pub fn duration_ms(&self) -> Option<i64> {
        match (self.started_at, self.ended_at) {
            (Some(started), Some(ended)) => Some((ended - started).num_milliseconds()),
            _ => None,
        }
    }

    /// Seconds since the last heartbeat (or start, before any heartbeat)
    pub fn seconds_since_heartbeat(&self) -> Option<f64> {
        if !self.is_running() {
            return None;
        }
        let last_contact = self.last_heartbeat.or(self.started_at)?;
        Some((Utc::now() - last_contact).num_milliseconds() as f64 / 1000.0)
    }

    /// True when no heartbeat arrived within 2× the expected interval
    ///
    /// A stale subagent may be hung and should be investigated or
    /// cancelled.
    pub fn is_stale(&self) -> bool {
        match self.seconds_since_heartbeat() {
            Some(elapsed) => elapsed > (self.heartbeat_interval_seconds * 2) as f64,
            None => false,
        }
    }
}

/// Lifecycle event delivered to registry listeners
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryEvent {
    /// Record created
    Register,
    /// Subagent started
    Start,
    /// Heartbeat received
    Heartbeat,
    /// Subagent completed
    Complete,
}

/// Listener callback: `(record, event)`
pub type SubagentListener = Arc<dyn Fn(&SubagentRecord, RegistryEvent) + Send + Sync>;

/// A parent's identity and recursion depth, checked on spawn
#[derive(Debug, Clone)]
pub struct ParentContext {
    /// Parent session id
    pub session_id: String,
    /// How many spawn levels above this parent exist
    pub spawn_depth: usize,
}

/// One task to spawn a subagent for
#[derive(Debug, Clone)]
pub struct SpawnTask {
    /// Task/goal for the subagent
    pub task: String,
    /// Optional label (usually the artifact id)
    pub label: Option<String>,
}

#[derive(Serialize, Deserialize)]
struct PersistedRegistry {
    version: u64,
    runs: HashMap<String, SubagentRecord>,
}

#[derive(Default)]
struct RegistryState {
    runs: HashMap<String, SubagentRecord>,
    tokens: HashMap<String, CancellationToken>,
    persistence_path: Option<PathBuf>,
}

/// In-memory registry for tracking subagents, with optional persistence
pub struct SubagentRegistry {
    state: Mutex<RegistryState>,
    listeners: Mutex<Vec<(u64, SubagentListener)>>,
    next_listener_id: AtomicU64,
    events: Option<Arc<EventBus>>,
}

impl SubagentRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self {
            state: Mutex::new(RegistryState::default()),
            listeners: Mutex::new(Vec::new()),
            next_listener_id: AtomicU64::new(0),
            events: None,
        }
    }

    /// Registry that publishes `subagent_*` events to a bus
    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    /// Register a new subagent run
    pub fn register(
        &self,
        child_session_id: impl Into<String>,
        parent_session_id: impl Into<String>,
        task: impl Into<String>,
        cleanup: CleanupPolicy,
        label: Option<String>,
        heartbeat_interval_seconds: u64,
    ) -> SubagentRecord {
        let run_id = uuid::Uuid::new_v4().simple().to_string()[..16].to_string();
        let record = SubagentRecord {
            run_id: run_id.clone(),
            child_session_id: child_session_id.into(),
            parent_session_id: parent_session_id.into(),
            task: task.into(),
            cleanup,
            label,
            created_at: Utc::now(),
            started_at: None,
            ended_at: None,
            outcome: None,
            error_message: None,
            last_heartbeat: None,
            heartbeat_interval_seconds,
            progress: None,
            status_message: None,
        };

        {
            let mut state = self.state.lock();
            state.runs.insert(run_id.clone(), record.clone());
            state.tokens.insert(run_id.clone(), CancellationToken::new());
            self.persist_locked(&state);
        }

        self.notify(&record, RegistryEvent::Register);
        debug!(run_id = %record.run_id, parent = %record.parent_session_id, "registered subagent");
        record
    }

    /// Mark a subagent as started; `None` if the run id is unknown
    pub fn mark_started(&self, run_id: &str) -> Option<SubagentRecord> {
        let record = {
            let mut state = self.state.lock();
            let record = match state.runs.get_mut(run_id) {
                Some(record) => {
                    record.started_at = Some(Utc::now());
                    record.clone()
                }
                None => {
                    warn!(run_id, "cannot mark started: run not found");
                    return None;
                }
            };
            self.persist_locked(&state);
            record
        };

        self.notify(&record, RegistryEvent::Start);
        debug!(run_id, "subagent started");
        Some(record)
    }

    /// Mark a subagent as complete; `None` if the run id is unknown
    pub fn mark_complete(
        &self,
        run_id: &str,
        outcome: SubagentOutcome,
        error_message: Option<String>,
    ) -> Option<SubagentRecord> {
        let record = {
            let mut state = self.state.lock();
            let record = match state.runs.get_mut(run_id) {
                Some(record) => {
                    record.ended_at = Some(Utc::now());
                    record.outcome = Some(outcome);
                    record.error_message = error_message;
                    record.clone()
                }
                None => {
                    warn!(run_id, "cannot mark complete: run not found");
                    return None;
                }
            };
            self.persist_locked(&state);
            record
        };

        self.notify(&record, RegistryEvent::Complete);
        debug!(run_id, outcome = outcome.as_str(), "subagent completed");
        Some(record)
    }

    /// Record a heartbeat from a running subagent
    ///
    /// Fails silently (returns `None` with a warning) for unknown or
    /// non-running runs, since a late heartbeat after completion is
    /// expected noise.
    pub fn heartbeat(
        &self,
        run_id: &str,
        progress: Option<f64>,
        status: Option<String>,
    ) -> Option<SubagentRecord> {
        let record = {
            let mut state = self.state.lock();
            let record = match state.runs.get_mut(run_id) {
                Some(record) if record.is_running() => {
                    record.last_heartbeat = Some(Utc::now());
                    if let Some(progress) = progress {
                        record.progress = Some(progress.clamp(0.0, 1.0));
                    }
                    if let Some(status) = status {
                        record.status_message = Some(status);
                    }
                    record.clone()
                }
                Some(_) => {
                    warn!(run_id, "heartbeat for non-running subagent");
                    return None;
                }
                None => {
                    warn!(run_id, "heartbeat for unknown run");
                    return None;
                }
            };
            self.persist_locked(&state);
            record
        };

        self.notify(&record, RegistryEvent::Heartbeat);
        Some(record)
    }

    /// Get a record by run id
    pub fn get(&self, run_id: &str) -> Option<SubagentRecord> {
        self.state.lock().runs.get(run_id).cloned()
    }

    /// The cancellation token for a run
    pub fn cancellation_token(&self, run_id: &str) -> Option<CancellationToken> {
        self.state.lock().tokens.get(run_id).cloned()
    }

    /// All subagents spawned by a parent session
    pub fn list_for_parent(&self, parent_session_id: &str) -> Vec<SubagentRecord> {
        self.state
            .lock()
            .runs
            .values()
            .filter(|r| r.parent_session_id == parent_session_id)
            .cloned()
            .collect()
    }

    /// All running subagents
    pub fn list_active(&self) -> Vec<SubagentRecord> {
        self.state
            .lock()
            .runs
            .values()
            .filter(|r| r.is_running())
            .cloned()
            .collect()
    }

    /// All registered-but-unstarted subagents
    pub fn list_pending(&self) -> Vec<SubagentRecord> {
        self.state
            .lock()
            .runs
            .values()
            .filter(|r| r.is_pending())
            .cloned()
            .collect()
    }

    /// Count running subagents for one parent
    pub fn count_active_for_parent(&self, parent_session_id: &str) -> usize {
        self.state
            .lock()
            .runs
            .values()
            .filter(|r| r.parent_session_id == parent_session_id && r.is_running())
            .count()
    }

    /// Remove a record outright; true if it existed
    pub fn remove(&self, run_id: &str) -> bool {
        let mut state = self.state.lock();
        let removed = state.runs.remove(run_id).is_some();
        state.tokens.remove(run_id);
        if removed {
            self.persist_locked(&state);
            debug!(run_id, "removed subagent record");
        }
        removed
    }

    /// GC completed records older than `max_age_hours`
    pub fn cleanup_completed(&self, max_age_hours: i64) -> usize {
        let cutoff = Utc::now();
        let mut state = self.state.lock();

        let stale_ids: Vec<String> = state
            .runs
            .values()
            .filter(|r| {
                r.is_complete()
                    && r.ended_at
                        .map(|ended| (cutoff - ended).num_hours() > max_age_hours)
                        .unwrap_or(false)
            })
            .map(|r| r.run_id.clone())
            .collect();

        for run_id in &stale_ids {
            state.runs.remove(run_id);
            state.tokens.remove(run_id);
        }
        if !stale_ids.is_empty() {
            self.persist_locked(&state);
            info!(count = stale_ids.len(), "cleaned up completed subagents");
        }
        stale_ids.len()
    }

    /// Register subagents for a batch of parallelizable tasks
    ///
    /// Enforces the spawn depth and global concurrency limits before
    /// creating any record; on a limit error nothing is registered.
    /// Execution itself is the executor's job - this only registers.
    pub fn spawn_parallel(
        &self,
        parent: &ParentContext,
        tasks: &[SpawnTask],
        config: &AgentConfig,
    ) -> Result<Vec<SubagentRecord>, CoreError> {
        if parent.spawn_depth >= config.max_subagent_depth {
            return Err(CoreError::SpawnDepthExceeded {
                depth: parent.spawn_depth,
                limit: config.max_subagent_depth,
            });
        }

        let active = self.list_active().len();
        if active + tasks.len() > config.max_concurrent_subagents {
            return Err(CoreError::ConcurrencyLimitExceeded {
                requested: tasks.len(),
                available: config.max_concurrent_subagents.saturating_sub(active),
                limit: config.max_concurrent_subagents,
                active,
            });
        }

        let records: Vec<SubagentRecord> = tasks
            .iter()
            .map(|task| {
                let child_session_id =
                    uuid::Uuid::new_v4().simple().to_string()[..16].to_string();
                self.register(
                    child_session_id,
                    parent.session_id.clone(),
                    task.task.clone(),
                    config.subagent_cleanup,
                    task.label.clone(),
                    config.heartbeat_interval_seconds,
                )
            })
            .collect();

        info!(
            count = records.len(),
            parent = %parent.session_id,
            "spawned subagents"
        );
        Ok(records)
    }

    /// Wait for a batch of subagents to complete
    ///
    /// Polls at `poll_interval`; at `timeout`, records still incomplete
    /// are marked `Timeout` and included in the result.
    pub async fn await_all(
        &self,
        records: &[SubagentRecord],
        timeout: Duration,
        poll_interval: Duration,
    ) -> HashMap<String, SubagentOutcome> {
        let run_ids: Vec<String> = records.iter().map(|r| r.run_id.clone()).collect();
        let started = std::time::Instant::now();
        let mut results: HashMap<String, SubagentOutcome> = HashMap::new();

        loop {
            for run_id in &run_ids {
                if results.contains_key(run_id) {
                    continue;
                }
                if let Some(record) = self.get(run_id) {
                    if let (true, Some(outcome)) = (record.is_complete(), record.outcome) {
                        results.insert(run_id.clone(), outcome);
                    }
                }
            }

            if results.len() == run_ids.len() {
                break;
            }

            if started.elapsed() >= timeout {
                let remaining: Vec<String> = run_ids
                    .iter()
                    .filter(|id| !results.contains_key(*id))
                    .cloned()
                    .collect();
                warn!(
                    timed_out = remaining.len(),
                    elapsed_s = started.elapsed().as_secs_f64(),
                    "subagent await timed out"
                );
                for run_id in remaining {
                    self.mark_complete(&run_id, SubagentOutcome::Timeout, None);
                    results.insert(run_id, SubagentOutcome::Timeout);
                }
                break;
            }

            tokio::time::sleep(poll_interval).await;
        }

        results
    }

    /// Running subagents past the heartbeat threshold
    ///
    /// With `threshold_seconds` unset, each record's own staleness rule
    /// (2× its heartbeat interval) applies.
    pub fn get_stale(&self, threshold_seconds: Option<f64>) -> Vec<SubagentRecord> {
        self.state
            .lock()
            .runs
            .values()
            .filter(|record| {
                if !record.is_running() {
                    return false;
                }
                match threshold_seconds {
                    Some(threshold) => record
                        .seconds_since_heartbeat()
                        .map(|elapsed| elapsed > threshold)
                        .unwrap_or(false),
                    None => record.is_stale(),
                }
            })
            .cloned()
            .collect()
    }

    /// Cancel subagents that appear hung
    ///
    /// Marks stale records `Cancelled` and fires their cancellation
    /// tokens. Does not kill external processes - signalling is the
    /// caller's responsibility. Returns the number cancelled.
    pub fn cancel_stale(&self, threshold_seconds: Option<f64>, reason: &str) -> usize {
        let stale = self.get_stale(threshold_seconds);
        let cancelled = stale.len();

        for record in stale {
            warn!(
                run_id = %record.run_id,
                since_heartbeat = ?record.seconds_since_heartbeat(),
                "cancelling stale subagent"
            );
            self.cancel(&record.run_id, reason);
        }

        if cancelled > 0 {
            info!(count = cancelled, "cancelled stale subagents");
        }
        cancelled
    }

    /// Cancel one run and all its descendants recursively
    ///
    /// Marks the record `Cancelled`, fires its cancellation token (the
    /// running task stops at its next cooperative checkpoint), and
    /// cascades to every subagent whose parent session is the cancelled
    /// run's child session.
    pub fn cancel(&self, run_id: &str, reason: &str) {
        let (record, token, descendants) = {
            let state = self.state.lock();
            let Some(record) = state.runs.get(run_id).cloned() else {
                return;
            };
            let token = state.tokens.get(run_id).cloned();
            let descendants: Vec<String> = state
                .runs
                .values()
                .filter(|r| r.parent_session_id == record.child_session_id && !r.is_complete())
                .map(|r| r.run_id.clone())
                .collect();
            (record, token, descendants)
        };

        if let Some(token) = token {
            token.cancel();
        }
        if !record.is_complete() {
            self.mark_complete(run_id, SubagentOutcome::Cancelled, Some(reason.to_string()));
        }
        for descendant in descendants {
            self.cancel(&descendant, reason);
        }
    }

    /// Add a lifecycle listener; returns an id for [`remove_listener`]
    ///
    /// [`remove_listener`]: SubagentRegistry::remove_listener
    pub fn add_listener<F>(&self, listener: F) -> u64
    where
        F: Fn(&SubagentRecord, RegistryEvent) + Send + Sync + 'static,
    {
        let id = self.next_listener_id.fetch_add(1, Ordering::Relaxed);
        self.listeners.lock().push((id, Arc::new(listener)));
        id
    }

    /// Remove a listener by id
    pub fn remove_listener(&self, id: u64) {
        self.listeners.lock().retain(|(lid, _)| *lid != id);
    }

    /// Set the persistence path and restore any saved state
    pub fn set_persistence_path(&self, path: impl AsRef<Path>) {
        {
            let mut state = self.state.lock();
            state.persistence_path = Some(path.as_ref().to_path_buf());
        }
        self.restore();
    }

    /// Restore records from disk; unknown versions are skipped
    pub fn restore(&self) {
        let path = match self.state.lock().persistence_path.clone() {
            Some(path) if path.exists() => path,
            _ => return,
        };

        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "failed to read subagent registry");
                return;
            }
        };
        let value: serde_json::Value = match serde_json::from_str(&text) {
            Ok(value) => value,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "malformed subagent registry");
                return;
            }
        };
        // Version gate comes before record parsing so a future format
        // never half-loads.
        let version = value.get("version").and_then(|v| v.as_u64()).unwrap_or(0);
        if version != REGISTRY_VERSION {
            warn!(
                version,
                expected = REGISTRY_VERSION,
                "unknown registry version, skipping restore"
            );
            return;
        }
        let persisted: PersistedRegistry = match serde_json::from_value(value) {
            Ok(persisted) => persisted,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "malformed subagent registry");
                return;
            }
        };

        let count = persisted.runs.len();
        {
            let mut state = self.state.lock();
            for (run_id, record) in persisted.runs {
                state.tokens.entry(run_id.clone()).or_default();
                state.runs.insert(run_id, record);
            }
        }
        info!(count, "restored subagent records from disk");
    }

    /// Clear all records (tests)
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.runs.clear();
        state.tokens.clear();
        self.persist_locked(&state);
    }

    fn persist_locked(&self, state: &RegistryState) {
        let Some(path) = &state.persistence_path else {
            return;
        };

        let persisted = PersistedRegistry {
            version: REGISTRY_VERSION,
            runs: state.runs.clone(),
        };

        let result = (|| -> std::io::Result<()> {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let dir = path.parent().unwrap_or_else(|| Path::new("."));
            let temp = NamedTempFile::new_in(dir)?;
            serde_json::to_writer_pretty(&temp, &persisted)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
            temp.persist(path).map_err(|e| e.error)?;
            Ok(())
        })();

        if let Err(err) = result {
            warn!(path = %path.display(), error = %err, "failed to persist subagent registry");
        }
    }

    fn notify(&self, record: &SubagentRecord, event: RegistryEvent) {
        // Snapshot outside the state lock; listeners may call back in.
        let listeners: Vec<SubagentListener> = self
            .listeners
            .lock()
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();
        for listener in listeners {
            listener(record, event);
        }

        let Some(bus) = &self.events else {
            return;
        };
        let mut data = json!({
            "run_id": record.run_id,
            "child_session_id": record.child_session_id,
            "parent_session_id": record.parent_session_id,
            "task": record.task,
        });
        let map = data.as_object_mut().expect("object literal");
        let event_type = match event {
            RegistryEvent::Register => EventType::SubagentSpawn,
            RegistryEvent::Start => EventType::SubagentStart,
            RegistryEvent::Heartbeat => {
                map.insert("progress".into(), json!(record.progress));
                map.insert("status".into(), json!(record.status_message));
                EventType::SubagentHeartbeat
            }
            RegistryEvent::Complete => {
                map.insert(
                    "outcome".into(),
                    json!(record.outcome.map(|o| o.as_str())),
                );
                map.insert("duration_ms".into(), json!(record.duration_ms()));
                EventType::SubagentComplete
            }
        };
        bus.publish(event_type, data);
    }
}

impl Default for SubagentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> SubagentRegistry {
        SubagentRegistry::new()
    }

    fn register_one(registry: &SubagentRegistry) -> SubagentRecord {
        registry.register(
            "child-1",
            "parent-1",
            "implement the auth module",
            CleanupPolicy::Delete,
            Some("auth".to_string()),
            30,
        )
    }

    #[test]
    fn test_lifecycle_transitions() {
        let registry = registry();
        let record = register_one(&registry);
        assert!(record.is_pending());

        let record = registry.mark_started(&record.run_id).unwrap();
        assert!(record.is_running());

        let record = registry
            .mark_complete(&record.run_id, SubagentOutcome::Ok, None)
            .unwrap();
        assert!(record.is_complete());
        assert_eq!(record.outcome, Some(SubagentOutcome::Ok));
        assert!(record.duration_ms().unwrap() >= 0);
    }

    #[test]
    fn test_unknown_run_ids_return_none() {
        let registry = registry();
        assert!(registry.mark_started("missing").is_none());
        assert!(registry
            .mark_complete("missing", SubagentOutcome::Ok, None)
            .is_none());
        assert!(registry.heartbeat("missing", None, None).is_none());
    }

    #[test]
    fn test_heartbeat_updates_running_only() {
        let registry = registry();
        let record = register_one(&registry);

        // Pending: heartbeat rejected.
        assert!(registry.heartbeat(&record.run_id, Some(0.5), None).is_none());

        registry.mark_started(&record.run_id);
        let updated = registry
            .heartbeat(&record.run_id, Some(1.7), Some("working".to_string()))
            .unwrap();
        assert_eq!(updated.progress, Some(1.0)); // clamped
        assert_eq!(updated.status_message.as_deref(), Some("working"));
        assert!(updated.last_heartbeat.is_some());
    }

    #[test]
    fn test_listings() {
        let registry = registry();
        let a = register_one(&registry);
        let b = registry.register(
            "child-2",
            "parent-1",
            "write tests",
            CleanupPolicy::Keep,
            None,
            30,
        );
        registry.mark_started(&b.run_id);

        assert_eq!(registry.list_pending().len(), 1);
        assert_eq!(registry.list_active().len(), 1);
        assert_eq!(registry.list_for_parent("parent-1").len(), 2);
        assert_eq!(registry.count_active_for_parent("parent-1"), 1);
        assert_eq!(registry.list_for_parent("other").len(), 0);
        drop(a);
    }

    #[test]
    fn test_spawn_depth_limit() {
        let registry = registry();
        let config = AgentConfig::default().with_max_subagent_depth(2);
        let parent = ParentContext {
            session_id: "deep-parent".to_string(),
            spawn_depth: 2,
        };

        let err = registry
            .spawn_parallel(
                &parent,
                &[SpawnTask {
                    task: "too deep".to_string(),
                    label: None,
                }],
                &config,
            )
            .unwrap_err();

        assert!(matches!(
            err,
            CoreError::SpawnDepthExceeded { depth: 2, limit: 2 }
        ));
        // Nothing was registered.
        assert!(registry.list_pending().is_empty());
    }

    #[test]
    fn test_concurrency_limit_fails_fast() {
        let registry = registry();
        let config = AgentConfig::default().with_max_concurrent_subagents(2);
        let parent = ParentContext {
            session_id: "parent-1".to_string(),
            spawn_depth: 0,
        };

        let records = registry
            .spawn_parallel(
                &parent,
                &[
                    SpawnTask {
                        task: "one".to_string(),
                        label: None,
                    },
                    SpawnTask {
                        task: "two".to_string(),
                        label: None,
                    },
                ],
                &config,
            )
            .unwrap();
        for record in &records {
            registry.mark_started(&record.run_id);
        }
        assert!(registry.list_active().len() <= config.max_concurrent_subagents);

        let err = registry
            .spawn_parallel(
                &parent,
                &[SpawnTask {
                    task: "three".to_string(),
                    label: None,
                }],
                &config,
            )
            .unwrap_err();
        assert!(matches!(
            err,
            CoreError::ConcurrencyLimitExceeded {
                requested: 1,
                available: 0,
                limit: 2,
                active: 2,
            }
        ));
    }

    #[tokio::test]
    async fn test_await_all_collects_outcomes() {
        let registry = Arc::new(registry());
        let record = register_one(&registry);
        registry.mark_started(&record.run_id);

        let completer = {
            let registry = Arc::clone(&registry);
            let run_id = record.run_id.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                registry.mark_complete(&run_id, SubagentOutcome::Ok, None);
            })
        };

        let results = registry
            .await_all(
                std::slice::from_ref(&record),
                Duration::from_secs(5),
                Duration::from_millis(10),
            )
            .await;
        completer.await.unwrap();

        assert_eq!(results[&record.run_id], SubagentOutcome::Ok);
    }

    #[tokio::test]
    async fn test_await_all_marks_timeouts() {
        let registry = registry();
        let record = register_one(&registry);
        registry.mark_started(&record.run_id);

        let results = registry
            .await_all(
                std::slice::from_ref(&record),
                Duration::from_millis(50),
                Duration::from_millis(10),
            )
            .await;

        assert_eq!(results[&record.run_id], SubagentOutcome::Timeout);
        assert_eq!(
            registry.get(&record.run_id).unwrap().outcome,
            Some(SubagentOutcome::Timeout)
        );
    }

    #[test]
    fn test_stale_detection_and_cancel() {
        let registry = registry();
        let record = register_one(&registry);
        registry.mark_started(&record.run_id);

        // No heartbeat at all: with a zero threshold the record is stale.
        let stale = registry.get_stale(Some(0.0));
        assert_eq!(stale.len(), 1);

        let cancelled = registry.cancel_stale(Some(0.0), "No heartbeat received");
        assert_eq!(cancelled, 1);

        let record = registry.get(&record.run_id).unwrap();
        assert_eq!(record.outcome, Some(SubagentOutcome::Cancelled));
        assert_eq!(record.error_message.as_deref(), Some("No heartbeat received"));
    }

    #[test]
    fn test_cancel_cascades_to_descendants() {
        let registry = registry();
        let parent = registry.register(
            "child-a",
            "root-session",
            "parent task",
            CleanupPolicy::Delete,
            None,
            30,
        );
        // Grandchild spawned by the parent's child session.
        let grandchild = registry.register(
            "child-b",
            "child-a",
            "nested task",
            CleanupPolicy::Delete,
            None,
            30,
        );
        registry.mark_started(&parent.run_id);
        registry.mark_started(&grandchild.run_id);

        registry.cancel(&parent.run_id, "parent cancelled");

        assert_eq!(
            registry.get(&parent.run_id).unwrap().outcome,
            Some(SubagentOutcome::Cancelled)
        );
        assert_eq!(
            registry.get(&grandchild.run_id).unwrap().outcome,
            Some(SubagentOutcome::Cancelled)
        );
        assert!(registry
            .cancellation_token(&grandchild.run_id)
            .unwrap()
            .is_cancelled());
    }

    #[test]
    fn test_listener_receives_lifecycle_events() {
        let registry = registry();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        registry.add_listener(move |record, event| {
            sink.lock().push((record.run_id.clone(), event));
        });

        let record = register_one(&registry);
        registry.mark_started(&record.run_id);
        registry.heartbeat(&record.run_id, Some(0.3), None);
        registry.mark_complete(&record.run_id, SubagentOutcome::Ok, None);

        let seen = seen.lock();
        let events: Vec<RegistryEvent> = seen.iter().map(|(_, e)| *e).collect();
        assert_eq!(
            events,
            vec![
                RegistryEvent::Register,
                RegistryEvent::Start,
                RegistryEvent::Heartbeat,
                RegistryEvent::Complete,
            ]
        );
    }

    #[test]
    fn test_listener_can_call_back_into_registry() {
        // Would deadlock if listeners ran under the state lock.
        let registry = Arc::new(registry());
        let registry_clone = Arc::clone(&registry);
        registry.add_listener(move |_record, _event| {
            let _ = registry_clone.list_active();
        });
        let record = register_one(&registry);
        registry.mark_started(&record.run_id);
    }

    #[test]
    fn test_cleanup_completed_removes_old_records() {
        let registry = registry();
        let record = register_one(&registry);
        registry.mark_started(&record.run_id);
        registry.mark_complete(&record.run_id, SubagentOutcome::Ok, None);

        // Records just completed are kept.
        assert_eq!(registry.cleanup_completed(24), 0);
        // With a negative threshold everything completed qualifies.
        assert_eq!(registry.cleanup_completed(-1), 1);
        assert!(registry.get(&record.run_id).is_none());
    }

    #[test]
    fn test_persistence_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("subagents").join("registry.json");

        let registry = registry();
        registry.set_persistence_path(&path);
        let record = register_one(&registry);
        registry.mark_started(&record.run_id);

        // A fresh registry restores from the same file.
        let restored = SubagentRegistry::new();
        restored.set_persistence_path(&path);
        let loaded = restored.get(&record.run_id).unwrap();
        assert_eq!(loaded.task, "implement the auth module");
        assert!(loaded.is_running());
    }

    #[test]
    fn test_restore_skips_unknown_version() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry.json");
        std::fs::write(&path, r#"{"version": 99, "runs": {"x": {}}}"#).unwrap();

        let registry = registry();
        registry.set_persistence_path(&path);
        assert!(registry.list_pending().is_empty());
        assert!(registry.list_active().is_empty());
    }
}
