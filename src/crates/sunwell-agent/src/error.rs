//! Agent error type
//!
//! Wraps the workspace error taxonomy into one type for the agent layer.
//! The classification (structural / limit / execution / data /
//! cancellation) lives on [`sunwell_core::CoreError`]; this type only adds
//! the storage and planning wrappers the agent touches directly.

use thiserror::Error;

use sunwell_core::{CoreError, ErrorKind};

/// Convenience result type using [`AgentError`]
pub type Result<T> = std::result::Result<T, AgentError>;

/// Errors surfaced by the agent execution core
#[derive(Error, Debug)]
pub enum AgentError {
    /// Core error (graph, limits, execution, cancellation)
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Persistent memory error
    #[error(transparent)]
    Memory(#[from] sunwell_memory::MemoryError),

    /// Planning error
    #[error(transparent)]
    Plan(#[from] sunwell_planner::PlanError),

    /// Execution cache database error
    #[error("execution cache error: {0}")]
    Cache(#[from] sqlx::Error),

    /// JSON (de)serialization failed
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// File operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl AgentError {
    /// Error-kind classification for recovery routing and `error` events
    pub fn kind(&self) -> ErrorKind {
        match self {
            AgentError::Core(err) => err.kind(),
            AgentError::Plan(sunwell_planner::PlanError::Core(err)) => err.kind(),
            AgentError::Plan(_) => ErrorKind::Execution,
            AgentError::Memory(_) | AgentError::Cache(_) => ErrorKind::Data,
            AgentError::Serialization(_) | AgentError::Io(_) => ErrorKind::Data,
        }
    }

    /// True if this error represents cooperative cancellation
    pub fn is_cancelled(&self) -> bool {
        matches!(self, AgentError::Core(CoreError::Cancelled))
    }
}
