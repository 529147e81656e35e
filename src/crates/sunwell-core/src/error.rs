//! Error types for the agent execution core
//!
//! All errors surface as [`CoreError`] and carry a [`ErrorKind`] classifying
//! how callers should react:
//!
//! ```text
//! CoreError
//! ├── Structural    - fail fast, no retry is sensible
//! │     DuplicateArtifactId, CycleDetected, DanglingDependency, FileConflict
//! ├── Limit         - caller-recoverable (reduce batch, back off)
//! │     SpawnDepthExceeded, ConcurrencyLimitExceeded, ArtifactLimitExceeded
//! ├── Execution     - recoverable via the recovery loop
//! │     Execution, Tool, Model, Timeout, GateFailed
//! ├── Data          - log and continue
//! │     Data, Serialization, Io
//! └── Cancellation  - expected flow, not logged as an error
//!       Cancelled
//! ```
//!
//! Every error can be rendered as a single `error` event payload via
//! [`CoreError::event_data`]; the UI surfaces errors by kind, not by stack
//! trace.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Convenience result type using [`CoreError`]
pub type Result<T> = std::result::Result<T, CoreError>;

/// Error classification used for recovery routing and event payloads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Graph structure is invalid; fail fast
    Structural,
    /// A configured limit was hit; the caller can reduce and retry
    Limit,
    /// A task, tool, or model operation failed; enters the recovery loop
    Execution,
    /// Durable state was unreadable; logged, execution continues
    Data,
    /// Operation cancelled via token; expected flow
    Cancellation,
}

impl ErrorKind {
    /// String form used in `error` event payloads
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Structural => "structural",
            ErrorKind::Limit => "limit",
            ErrorKind::Execution => "execution",
            ErrorKind::Data => "data",
            ErrorKind::Cancellation => "cancellation",
        }
    }
}

/// Errors produced by the agent execution core
#[derive(Error, Debug)]
pub enum CoreError {
    /// An artifact with this id is already present in the graph
    #[error("duplicate artifact id '{0}'")]
    DuplicateArtifactId(String),

    /// The graph contains a dependency cycle
    ///
    /// `path` lists the artifact ids along the detected cycle in order.
    #[error("dependency cycle detected: {}", path.join(" -> "))]
    CycleDetected {
        /// Artifact ids along the cycle
        path: Vec<String>,
    },

    /// A requires-entry names neither an artifact in the graph nor a
    /// pre-existing artifact in memory
    #[error("artifact '{artifact}' requires '{dependency}' which nothing produces")]
    DanglingDependency {
        /// The artifact with the unresolved requirement
        artifact: String,
        /// The name that could not be resolved
        dependency: String,
    },

    /// Two artifacts would write the same file without an ordering between
    /// them
    #[error("file conflict on '{file}' between '{first}' and '{second}'")]
    FileConflict {
        /// Conflicting file path
        file: String,
        /// First artifact id
        first: String,
        /// Second artifact id
        second: String,
    },

    /// A parent at the maximum spawn depth tried to spawn subagents
    #[error("spawn depth {depth} exceeds limit {limit}")]
    SpawnDepthExceeded {
        /// Current depth of the would-be parent
        depth: usize,
        /// Configured maximum depth
        limit: usize,
    },

    /// A batch spawn would push the registry past the concurrency cap
    #[error(
        "cannot spawn {requested} subagents: only {available} slots available (max={limit}, active={active})"
    )]
    ConcurrencyLimitExceeded {
        /// Number of subagents the caller asked for
        requested: usize,
        /// Slots currently free
        available: usize,
        /// Configured maximum concurrent subagents
        limit: usize,
        /// Subagents currently running
        active: usize,
    },

    /// Adding another artifact would exceed the graph size limit
    #[error("artifact limit of {limit} exceeded")]
    ArtifactLimitExceeded {
        /// Configured maximum artifact count
        limit: usize,
    },

    /// A task failed during execution
    #[error("execution failed: {0}")]
    Execution(String),

    /// A tool invocation failed
    #[error("tool '{tool}' failed: {message}")]
    Tool {
        /// Tool name
        tool: String,
        /// Failure description from the executor
        message: String,
    },

    /// A model call failed
    #[error("model call failed: {0}")]
    Model(String),

    /// An operation exceeded its time limit
    #[error("operation timed out after {duration_ms}ms: {operation}")]
    Timeout {
        /// Description of the operation that timed out
        operation: String,
        /// Timeout duration in milliseconds
        duration_ms: u64,
    },

    /// A validation gate rejected produced output
    #[error("validation gate '{gate}' failed: {}", errors.join("; "))]
    GateFailed {
        /// Gate identifier
        gate: String,
        /// Error messages reported by the gate
        errors: Vec<String>,
    },

    /// Durable state was unreadable or inconsistent
    #[error("data error: {0}")]
    Data(String),

    /// JSON serialization/deserialization failed
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Operation cancelled via its cancellation token
    #[error("operation cancelled")]
    Cancelled,
}

impl CoreError {
    /// Classify this error for recovery routing
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::DuplicateArtifactId(_)
            | CoreError::CycleDetected { .. }
            | CoreError::DanglingDependency { .. }
            | CoreError::FileConflict { .. } => ErrorKind::Structural,
            CoreError::SpawnDepthExceeded { .. }
            | CoreError::ConcurrencyLimitExceeded { .. }
            | CoreError::ArtifactLimitExceeded { .. } => ErrorKind::Limit,
            CoreError::Execution(_)
            | CoreError::Tool { .. }
            | CoreError::Model(_)
            | CoreError::Timeout { .. }
            | CoreError::GateFailed { .. } => ErrorKind::Execution,
            CoreError::Data(_) | CoreError::Serialization(_) | CoreError::Io(_) => ErrorKind::Data,
            CoreError::Cancelled => ErrorKind::Cancellation,
        }
    }

    /// True if this error represents cooperative cancellation
    pub fn is_cancelled(&self) -> bool {
        matches!(self, CoreError::Cancelled)
    }

    /// Build the payload for a single `error` event
    ///
    /// The payload shape is `{kind, message, artifact_id?, run_id?,
    /// suggested_action?}`; absent optional fields are omitted.
    pub fn event_data(
        &self,
        artifact_id: Option<&str>,
        run_id: Option<&str>,
    ) -> serde_json::Value {
        let mut data = serde_json::json!({
            "kind": self.kind().as_str(),
            "message": self.to_string(),
        });
        let map = data.as_object_mut().expect("object literal");
        if let Some(artifact_id) = artifact_id {
            map.insert("artifact_id".into(), artifact_id.into());
        }
        if let Some(run_id) = run_id {
            map.insert("run_id".into(), run_id.into());
        }
        if let Some(action) = self.suggested_action() {
            map.insert("suggested_action".into(), action.into());
        }
        data
    }

    fn suggested_action(&self) -> Option<&'static str> {
        match self.kind() {
            ErrorKind::Structural => Some("fix the plan structure before retrying"),
            ErrorKind::Limit => Some("reduce batch size or wait for running work to finish"),
            ErrorKind::Execution => Some("consult the recovery strategy"),
            ErrorKind::Data => Some("rebuild the affected cache from its source of truth"),
            ErrorKind::Cancellation => None,
        }
    }
}
