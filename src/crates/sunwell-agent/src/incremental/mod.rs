//! Incremental execution with content-addressed caching
//!
//! The pieces that let a second run of the same goal do (almost) nothing:
//!
//! - [`hasher`] - content-addressed input hashes over spec + dependencies
//!   + tool stamp;
//! - [`cache`] - the durable SQLite execution cache with provenance;
//! - [`deduper`] - in-flight work sharing so one hash executes at most
//!   once concurrently;
//! - [`executor`] - wave-by-wave planning and dispatch with explicit skip
//!   reasons.

pub mod cache;
pub mod deduper;
pub mod executor;
pub mod hasher;

pub use cache::{CacheStats, CachedExecution, ExecutionCache, ExecutionStatus, Provenance};
pub use deduper::WorkDeduper;
pub use executor::{
    CreateArtifactFn, CreatedArtifact, Decision, ExecutionPlan, IncrementalExecutor,
    IncrementalResult, RunInfo, SkipDecision, SkipReason,
};
pub use hasher::{
    compute_graph_hashes, compute_input_hash, compute_spec_hash, ArtifactHash, TOOL_VERSION_STAMP,
};
