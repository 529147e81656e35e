//! # sunwell-core - Agent Execution Fabric Foundations
//!
//! Core types for sunwell, a domain-agnostic LLM-driven task runner. Given
//! a natural-language goal, sunwell discovers an artifact dependency graph,
//! schedules it across a pool of concurrent subagents with
//! content-addressed caching, enforces validation gates, routes failures to
//! recovery strategies, and persists learnings across runs.
//!
//! This crate holds the pieces everything else builds on:
//!
//! - [`artifact`] - the plan representation: artifact specs, DAG
//!   validation, deterministic execution waves, structural metrics;
//! - [`events`] - the totally-ordered agent event stream: closed event
//!   catalog, broadcast bus, NDJSON sink;
//! - [`cancel`] - cooperative cancellation tokens with parent→child
//!   propagation;
//! - [`model`] - the `Model`/`Embedder` contracts concrete LLM clients
//!   implement;
//! - [`tools`] - the `ToolExecutor` contract and trust-policy tiers;
//! - [`hash`] - content hashing: canonical JSON, goal hashes;
//! - [`error`] - the error taxonomy shared across the workspace.
//!
//! Higher layers live in sibling crates: `sunwell-planner` (harmonic
//! planning), `sunwell-memory` (journal + learning cache + briefing), and
//! `sunwell-agent` (incremental executor, subagent registry, reasoner).

pub mod artifact;
pub mod cancel;
pub mod error;
pub mod events;
pub mod hash;
pub mod model;
pub mod tools;

pub use artifact::{ArtifactGraph, ArtifactLimits, ArtifactSpec, PlannedTask};
pub use cancel::CancellationToken;
pub use error::{CoreError, ErrorKind, Result};
pub use events::{AgentEvent, EventBus, EventType};
pub use hash::{canonical_json, goal_hash, normalize_goal, sha256_hex};
pub use model::{
    Embedder, GenerateOptions, GenerateResult, Model, ModelTier, StreamChunk, TokenUsage, Tool,
    ToolCall, ToolChoice,
};
pub use tools::{ToolExecutor, ToolOutput, ToolRequest, TrustLevel, TrustPolicy};
