//! # sunwell-agent - The Agent Execution Core
//!
//! The orchestration fabric that binds planning, execution, and memory.
//! Given a goal and a planned [`ArtifactGraph`](sunwell_core::ArtifactGraph),
//! this crate:
//!
//! - decides what actually needs to run via the content-addressed
//!   [`incremental`] executor and its SQLite execution cache;
//! - fans work out to subagents tracked by the [`registry`] (lifecycle,
//!   heartbeats, parallel batch spawn/await, cancellation cascade);
//! - gates produced output through [`validation`] with a bounded auto-fix
//!   loop;
//! - routes failures through [`recovery`] strategies chosen by the
//!   [`reasoner`];
//! - wraps every tool invocation in the trust-enforcing [`tools`] façade;
//! - records behavior for test assertion via the [`journey`] recorder.
//!
//! Concurrency contract: waves dispatch concurrently bounded by
//! `min(wave_size, max_concurrent_subagents)`; the registry enforces the
//! global cap and the spawn depth, failing fast rather than blocking;
//! cancellation is cooperative via tokens checked at every suspension
//! point.

pub mod config;
pub mod error;
pub mod incremental;
pub mod journey;
pub mod reasoner;
pub mod recovery;
pub mod registry;
pub mod run;
pub mod tools;
pub mod validation;

pub use config::{AgentConfig, CleanupPolicy};
pub use error::{AgentError, Result};
pub use incremental::{
    CreateArtifactFn, CreatedArtifact, ExecutionCache, ExecutionPlan, ExecutionStatus,
    IncrementalExecutor, IncrementalResult, Provenance, RunInfo, SkipDecision, SkipReason,
};
pub use journey::{EventRecorder, TurnSnapshot};
pub use reasoner::{DecisionType, ReasonedDecision, Reasoner};
pub use recovery::{with_recovery, RecoveryStrategy, RetryPolicy, RetryState};
pub use registry::{
    ParentContext, RegistryEvent, SpawnTask, SubagentOutcome, SubagentRecord, SubagentRegistry,
};
pub use run::GoalRunner;
pub use tools::TrustedToolExecutor;
pub use validation::{validate_with_auto_fix, GateKind, GateResult, ValidationGate};
