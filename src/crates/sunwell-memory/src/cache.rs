//! Learning cache - SQLite-backed queries over the journal
//!
//! Two-tier memory architecture:
//!
//! ```text
//! Journal (JSONL)  ← primary durable storage (append-only)
//!       ↓ sync
//! LearningCache (SQLite, WAL)  ← fast queryable cache
//! ```
//!
//! The journal remains the source of truth. The cache may lag; on startup
//! [`LearningCache::sync_from_journal`] catches it up, and any
//! inconsistency (an id in the cache that the journal does not contain)
//! triggers a full [`LearningCache::rebuild_from_journal`].
//!
//! WAL mode gives concurrent readers with a single serialized writer, which
//! is exactly the cache's access pattern: many subagents query, one
//! coordinator writes.

use std::collections::HashSet;
use std::path::Path;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use tracing::{info, warn};

use crate::error::{MemoryError, Result};
use crate::journal::LearningJournal;
use crate::learning::Learning;

/// Cache database filename inside the memory directory
pub const CACHE_DB_NAME: &str = "learnings.db";

/// Schema statements, executed in order on open
const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS learnings (
        id TEXT PRIMARY KEY,
        fact TEXT NOT NULL,
        category TEXT NOT NULL,
        confidence REAL NOT NULL,
        timestamp TEXT NOT NULL,
        source_file TEXT,
        source_line INTEGER
    )",
    "CREATE INDEX IF NOT EXISTS idx_learnings_category ON learnings(category)",
    "CREATE INDEX IF NOT EXISTS idx_learnings_timestamp ON learnings(timestamp)",
    "CREATE INDEX IF NOT EXISTS idx_learnings_confidence ON learnings(confidence)",
    "CREATE TABLE IF NOT EXISTS cache_metadata (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS entities (
        entity_id TEXT PRIMARY KEY,
        canonical_name TEXT NOT NULL,
        entity_type TEXT NOT NULL,
        aliases TEXT,
        first_seen TEXT NOT NULL,
        mention_count INTEGER DEFAULT 0
    )",
    "CREATE INDEX IF NOT EXISTS idx_entities_type ON entities(entity_type)",
    "CREATE INDEX IF NOT EXISTS idx_entities_name ON entities(canonical_name)",
    "CREATE TABLE IF NOT EXISTS learning_entities (
        learning_id TEXT NOT NULL,
        entity_id TEXT NOT NULL,
        mention_text TEXT,
        confidence REAL DEFAULT 1.0,
        PRIMARY KEY (learning_id, entity_id)
    )",
    "CREATE TABLE IF NOT EXISTS bm25_index (
        term TEXT NOT NULL,
        learning_id TEXT NOT NULL,
        term_frequency INTEGER NOT NULL,
        PRIMARY KEY (term, learning_id)
    )",
    "CREATE INDEX IF NOT EXISTS idx_bm25_term ON bm25_index(term)",
    "CREATE TABLE IF NOT EXISTS bm25_metadata (
        key TEXT PRIMARY KEY,
        value REAL NOT NULL
    )",
];

#[derive(sqlx::FromRow)]
struct LearningRow {
    id: String,
    fact: String,
    category: String,
    confidence: f64,
    timestamp: String,
    source_file: Option<String>,
    source_line: Option<i64>,
}

impl LearningRow {
    fn into_learning(self) -> Result<Learning> {
        let timestamp = DateTime::parse_from_rfc3339(&self.timestamp)
            .map_err(|e| MemoryError::Corrupt(format!("bad timestamp '{}': {e}", self.timestamp)))?
            .with_timezone(&Utc);
        Ok(Learning {
            id: self.id,
            fact: self.fact,
            category: self.category,
            confidence: self.confidence,
            timestamp,
            source_file: self.source_file,
            source_line: self.source_line.map(|l| l as u32),
        })
    }
}

/// An entity mentioned by one or more learnings
#[derive(Debug, Clone)]
pub struct EntityMention {
    /// Entity identifier
    pub entity_id: String,
    /// Canonical name
    pub canonical_name: String,
    /// Entity type ("file", "tech", "concept", ...)
    pub entity_type: String,
    /// Text where the entity was mentioned
    pub mention_text: Option<String>,
    /// Confidence of the link
    pub confidence: f64,
}

/// Aggregate entity statistics
#[derive(Debug, Clone, Default)]
pub struct EntityStats {
    /// Distinct entities tracked
    pub total_entities: u64,
    /// Learning↔entity links
    pub total_links: u64,
    /// Most-mentioned entities: (name, type, mentions)
    pub top_entities: Vec<(String, String, u64)>,
}

/// SQLite-backed cache over the learning journal
pub struct LearningCache {
    pub(crate) pool: SqlitePool,
}

impl LearningCache {
    /// Open (or create) the cache database inside `memory_dir`
    pub async fn open(memory_dir: impl AsRef<Path>) -> Result<Self> {
        let memory_dir = memory_dir.as_ref();
        std::fs::create_dir_all(memory_dir)?;

        let options = SqliteConnectOptions::new()
            .filename(memory_dir.join(CACHE_DB_NAME))
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let cache = Self { pool };
        cache.ensure_schema().await?;
        Ok(cache)
    }

    /// Open an in-memory cache (tests)
    pub async fn open_in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(MemoryError::Database)?;
        // One connection only: each in-memory connection is its own database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        let cache = Self { pool };
        cache.ensure_schema().await?;
        Ok(cache)
    }

    async fn ensure_schema(&self) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    /// Add one learning; returns false if the id already exists
    pub async fn add(&self, learning: &Learning) -> Result<bool> {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO learnings
             (id, fact, category, confidence, timestamp, source_file, source_line)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&learning.id)
        .bind(&learning.fact)
        .bind(&learning.category)
        .bind(learning.confidence)
        .bind(learning.timestamp.to_rfc3339())
        .bind(&learning.source_file)
        .bind(learning.source_line.map(|l| l as i64))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Add a batch in one transaction; returns the number inserted
    pub async fn add_batch(&self, learnings: &[Learning]) -> Result<usize> {
        if learnings.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        let mut added = 0usize;
        for learning in learnings {
            let result = sqlx::query(
                "INSERT OR IGNORE INTO learnings
                 (id, fact, category, confidence, timestamp, source_file, source_line)
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&learning.id)
            .bind(&learning.fact)
            .bind(&learning.category)
            .bind(learning.confidence)
            .bind(learning.timestamp.to_rfc3339())
            .bind(&learning.source_file)
            .bind(learning.source_line.map(|l| l as i64))
            .execute(&mut *tx)
            .await?;
            added += result.rows_affected() as usize;
        }
        tx.commit().await?;
        Ok(added)
    }

    /// Get one learning by id
    pub async fn get_by_id(&self, id: &str) -> Result<Option<Learning>> {
        let row = sqlx::query_as::<_, LearningRow>("SELECT * FROM learnings WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(LearningRow::into_learning).transpose()
    }

    /// Learnings in one category, best-confidence first
    pub async fn get_by_category(&self, category: &str, limit: u32) -> Result<Vec<Learning>> {
        let rows = sqlx::query_as::<_, LearningRow>(
            "SELECT * FROM learnings
             WHERE category = ?
             ORDER BY confidence DESC, timestamp DESC
             LIMIT ?",
        )
        .bind(category)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(LearningRow::into_learning).collect()
    }

    /// Most recent learnings
    pub async fn get_recent(&self, limit: u32) -> Result<Vec<Learning>> {
        let rows = sqlx::query_as::<_, LearningRow>(
            "SELECT * FROM learnings ORDER BY timestamp DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(LearningRow::into_learning).collect()
    }

    /// Learnings at or above a confidence threshold
    pub async fn get_high_confidence(
        &self,
        min_confidence: f64,
        limit: u32,
    ) -> Result<Vec<Learning>> {
        let rows = sqlx::query_as::<_, LearningRow>(
            "SELECT * FROM learnings
             WHERE confidence >= ?
             ORDER BY confidence DESC
             LIMIT ?",
        )
        .bind(min_confidence)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(LearningRow::into_learning).collect()
    }

    /// Substring search over facts (for semantic search, use BM25)
    pub async fn search_facts(&self, query: &str, limit: u32) -> Result<Vec<Learning>> {
        let rows = sqlx::query_as::<_, LearningRow>(
            "SELECT * FROM learnings
             WHERE fact LIKE ?
             ORDER BY confidence DESC
             LIMIT ?",
        )
        .bind(format!("%{query}%"))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(LearningRow::into_learning).collect()
    }

    /// Total learnings in the cache
    pub async fn count(&self) -> Result<u64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM learnings")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get::<i64, _>("n") as u64)
    }

    /// All learning ids currently cached
    pub async fn all_ids(&self) -> Result<HashSet<String>> {
        let rows = sqlx::query("SELECT id FROM learnings")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|r| r.get::<String, _>("id")).collect())
    }

    /// Reconcile the cache from the journal (idempotent)
    ///
    /// Inserts journal entries the cache is missing. If the cache holds an
    /// id the journal does not, the cache is considered inconsistent and is
    /// fully rebuilt instead.
    ///
    /// Returns the number of learnings added (or present after a rebuild).
    pub async fn sync_from_journal(&self, journal: &LearningJournal) -> Result<usize> {
        if !journal.exists() {
            return Ok(0);
        }

        let journal_entries = journal.load_deduplicated()?;
        let cached_ids = self.all_ids().await?;

        let inconsistent = cached_ids
            .iter()
            .any(|id| !journal_entries.contains_key(id));
        if inconsistent {
            warn!("learning cache holds ids missing from the journal; rebuilding");
            return self.rebuild_from_journal(journal).await;
        }

        let missing: Vec<Learning> = journal_entries
            .into_values()
            .filter(|entry| !cached_ids.contains(&entry.id))
            .collect();
        self.add_batch(&missing).await
    }

    /// Drop the cache contents and repopulate from the journal
    ///
    /// Used when the cache is corrupt or the schema changed. Returns the
    /// number of learnings in the rebuilt cache.
    pub async fn rebuild_from_journal(&self, journal: &LearningJournal) -> Result<usize> {
        let mut tx = self.pool.begin().await?;
        for table in ["learning_entities", "bm25_index", "bm25_metadata", "learnings"] {
            sqlx::query(&format!("DELETE FROM {table}"))
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        if !journal.exists() {
            return Ok(0);
        }

        let entries: Vec<Learning> = journal.load_deduplicated()?.into_values().collect();
        let count = self.add_batch(&entries).await?;
        info!(count, "rebuilt learning cache from journal");
        Ok(count)
    }

    // === Entity extraction ===

    /// Register an entity; returns false if it already exists
    pub async fn add_entity(
        &self,
        entity_id: &str,
        canonical_name: &str,
        entity_type: &str,
        aliases: &[String],
    ) -> Result<bool> {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO entities
             (entity_id, canonical_name, entity_type, aliases, first_seen)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(entity_id)
        .bind(canonical_name)
        .bind(entity_type)
        .bind(serde_json::to_string(aliases)?)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Link a learning to an entity; returns false if already linked
    pub async fn link_learning_to_entity(
        &self,
        learning_id: &str,
        entity_id: &str,
        mention_text: &str,
        confidence: f64,
    ) -> Result<bool> {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO learning_entities
             (learning_id, entity_id, mention_text, confidence)
             VALUES (?, ?, ?, ?)",
        )
        .bind(learning_id)
        .bind(entity_id)
        .bind(mention_text)
        .bind(confidence)
        .execute(&self.pool)
        .await?;

        let linked = result.rows_affected() > 0;
        if linked {
            sqlx::query("UPDATE entities SET mention_count = mention_count + 1 WHERE entity_id = ?")
                .bind(entity_id)
                .execute(&self.pool)
                .await?;
        }
        Ok(linked)
    }

    /// Entities mentioned by one learning
    pub async fn entities_for_learning(&self, learning_id: &str) -> Result<Vec<EntityMention>> {
        let rows = sqlx::query(
            "SELECT e.entity_id, e.canonical_name, e.entity_type,
                    le.mention_text, le.confidence
             FROM entities e
             INNER JOIN learning_entities le ON e.entity_id = le.entity_id
             WHERE le.learning_id = ?",
        )
        .bind(learning_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| EntityMention {
                entity_id: row.get("entity_id"),
                canonical_name: row.get("canonical_name"),
                entity_type: row.get("entity_type"),
                mention_text: row.get("mention_text"),
                confidence: row.get("confidence"),
            })
            .collect())
    }

    /// Aggregate entity statistics
    pub async fn entity_stats(&self) -> Result<EntityStats> {
        let total_entities: i64 = sqlx::query("SELECT COUNT(*) AS n FROM entities")
            .fetch_one(&self.pool)
            .await?
            .get("n");
        let total_links: i64 = sqlx::query("SELECT COUNT(*) AS n FROM learning_entities")
            .fetch_one(&self.pool)
            .await?
            .get("n");

        let top = sqlx::query(
            "SELECT canonical_name, entity_type, mention_count
             FROM entities
             ORDER BY mention_count DESC
             LIMIT 10",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(EntityStats {
            total_entities: total_entities as u64,
            total_links: total_links as u64,
            top_entities: top
                .into_iter()
                .map(|row| {
                    (
                        row.get::<String, _>("canonical_name"),
                        row.get::<String, _>("entity_type"),
                        row.get::<i64, _>("mention_count") as u64,
                    )
                })
                .collect(),
        })
    }
}
