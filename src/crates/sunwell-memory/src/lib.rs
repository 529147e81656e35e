//! # sunwell-memory - Persistent Cross-Session Memory
//!
//! Durable, crash-safe storage of what the agent has learned, built as two
//! tiers: an append-only JSONL journal that is the source of truth, and a
//! derived SQLite cache providing indexed queries (category, recency,
//! confidence) plus BM25 full-text ranking over an inverted index.
//!
//! The crate also owns the [`briefing::Briefing`] (the rolling project
//! snapshot, overwritten atomically) and the [`paths::WorkspacePaths`]
//! layout for everything sunwell persists under `.sunwell/`.
//!
//! Consistency model: the journal wins. The cache may lag and is caught up
//! with [`cache::LearningCache::sync_from_journal`]; an id in the cache
//! that the journal does not contain triggers a full rebuild.

pub mod bm25;
pub mod briefing;
pub mod cache;
pub mod error;
pub mod journal;
pub mod learning;
pub mod paths;

pub use bm25::{Bm25Stats, DEFAULT_B, DEFAULT_K1};
pub use briefing::{Briefing, BriefingStatus};
pub use cache::{EntityMention, EntityStats, LearningCache};
pub use error::{MemoryError, Result};
pub use journal::LearningJournal;
pub use learning::{category, Learning};
pub use paths::WorkspacePaths;
