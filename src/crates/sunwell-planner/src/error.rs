//! Planner error types

use thiserror::Error;

/// Convenience result type using [`PlanError`]
pub type Result<T> = std::result::Result<T, PlanError>;

/// Errors from plan discovery and selection
#[derive(Error, Debug)]
pub enum PlanError {
    /// No candidate survived generation and validation
    ///
    /// Callers may retry with a different variance strategy or fall back to
    /// the sequential planner.
    #[error("planning failed: none of {attempted} candidates produced a valid graph")]
    PlanningFailure {
        /// How many candidates were attempted
        attempted: usize,
    },

    /// Model output could not be parsed into artifacts
    #[error("could not parse artifacts from model output: {0}")]
    Parse(String),

    /// Core error (graph construction, model call, cancellation)
    #[error(transparent)]
    Core(#[from] sunwell_core::CoreError),
}
