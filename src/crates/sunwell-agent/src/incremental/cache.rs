//! Execution cache - durable, content-addressed record of prior work
//!
//! Every artifact execution (success or failure) is recorded against its
//! `input_hash` with full provenance: which run built it, under which goal,
//! with which model, and how long it took. On the next run, a matching
//! hash means the work can be skipped outright.
//!
//! # Storage
//!
//! SQLite at `{workspace}/.sunwell/cache/execution.db`, WAL mode so
//! multiple reader processes can consult the cache while one writer
//! records. Schema is versioned; a version mismatch drops and rebuilds the
//! tables (the cache is always reconstructible by re-executing).
//!
//! # Invariants
//!
//! - one row per `input_hash` (upsert semantics);
//! - a `success` row is never overwritten by a `failed` row without
//!   explicit invalidation;
//! - `invalidate` timestamps rows rather than deleting them, preserving
//!   the audit trail.

use std::path::Path;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use tracing::{debug, warn};

use crate::error::Result;

/// Current schema version
const SCHEMA_VERSION: &str = "1";

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS schema_meta (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS executions (
        input_hash TEXT PRIMARY KEY,
        artifact_id TEXT NOT NULL,
        output_hash TEXT,
        status TEXT NOT NULL,
        goal_hash TEXT,
        run_id TEXT,
        duration_ms INTEGER,
        timestamp TEXT NOT NULL,
        model_id TEXT,
        invalidated_at TEXT
    )",
    "CREATE INDEX IF NOT EXISTS idx_executions_artifact_id ON executions(artifact_id)",
    "CREATE INDEX IF NOT EXISTS idx_executions_goal_hash ON executions(goal_hash)",
    "CREATE TABLE IF NOT EXISTS goal_executions (
        goal_hash TEXT NOT NULL,
        artifact_id TEXT NOT NULL,
        PRIMARY KEY (goal_hash, artifact_id)
    )",
];

/// Outcome of one recorded execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// The artifact was produced
    Success,
    /// The attempt failed
    Failed,
}

impl ExecutionStatus {
    /// String form stored in the database
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Success => "success",
            ExecutionStatus::Failed => "failed",
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value {
            "success" => Some(ExecutionStatus::Success),
            "failed" => Some(ExecutionStatus::Failed),
            _ => None,
        }
    }
}

/// Who produced an execution and under what circumstances
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Provenance {
    /// Run that produced the entry
    pub run_id: String,
    /// Top-level goal hash
    pub goal_hash: String,
    /// Wall-clock execution time in milliseconds
    pub duration_ms: u64,
    /// Model that did the work
    pub model_id: String,
}

/// One cached execution row
#[derive(Debug, Clone)]
pub struct CachedExecution {
    /// Artifact the row belongs to
    pub artifact_id: String,
    /// Content-addressed cache key
    pub input_hash: String,
    /// Hash over produced output (absent for failures)
    pub output_hash: Option<String>,
    /// Success or failure
    pub status: ExecutionStatus,
    /// Provenance of the entry
    pub provenance: Provenance,
    /// When the entry was recorded
    pub timestamp: DateTime<Utc>,
    /// When the entry was invalidated, if ever
    pub invalidated_at: Option<DateTime<Utc>>,
}

impl CachedExecution {
    /// True for a live (non-invalidated) success
    pub fn is_valid_success(&self) -> bool {
        self.status == ExecutionStatus::Success && self.invalidated_at.is_none()
    }

    /// Age of the entry relative to now
    pub fn age(&self) -> chrono::Duration {
        Utc::now() - self.timestamp
    }
}

/// Cache hit/miss counters plus table size
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheStats {
    /// Rows in the executions table
    pub entries: u64,
    /// Lookups that found a row this session
    pub hits: u64,
    /// Lookups that found nothing this session
    pub misses: u64,
    /// Timestamp of the newest row
    pub last_updated: Option<DateTime<Utc>>,
}

/// Content-addressed execution cache
pub struct ExecutionCache {
    pool: SqlitePool,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ExecutionCache {
    /// Open (or create) the cache database at `db_path`
    pub async fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        let db_path = db_path.as_ref();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let cache = Self {
            pool,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        };
        cache.ensure_schema().await?;
        Ok(cache)
    }

    /// Open an in-memory cache (tests)
    pub async fn open_in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        // One connection: each in-memory connection is a separate database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        let cache = Self {
            pool,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        };
        cache.ensure_schema().await?;
        Ok(cache)
    }

    async fn ensure_schema(&self) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }

        let version = sqlx::query("SELECT value FROM schema_meta WHERE key = 'version'")
            .fetch_optional(&self.pool)
            .await?
            .map(|row| row.get::<String, _>("value"));

        match version.as_deref() {
            Some(v) if v == SCHEMA_VERSION => {}
            Some(other) => {
                warn!(
                    found = other,
                    expected = SCHEMA_VERSION,
                    "execution cache schema mismatch; rebuilding"
                );
                self.rebuild_tables().await?;
            }
            None => {
                sqlx::query("INSERT OR REPLACE INTO schema_meta (key, value) VALUES ('version', ?)")
                    .bind(SCHEMA_VERSION)
                    .execute(&self.pool)
                    .await?;
            }
        }
        Ok(())
    }

    async fn rebuild_tables(&self) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM executions").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM goal_executions").execute(&mut *tx).await?;
        sqlx::query("INSERT OR REPLACE INTO schema_meta (key, value) VALUES ('version', ?)")
            .bind(SCHEMA_VERSION)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    /// Look up a prior execution for `(artifact_id, input_hash)`
    pub async fn lookup(
        &self,
        artifact_id: &str,
        input_hash: &str,
    ) -> Result<Option<CachedExecution>> {
        let row = sqlx::query(
            "SELECT * FROM executions WHERE input_hash = ? AND artifact_id = ?",
        )
        .bind(input_hash)
        .bind(artifact_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Ok(Some(row_to_execution(&row)?))
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                Ok(None)
            }
        }
    }

    /// Record an execution outcome (upsert by `input_hash`)
    ///
    /// A live success row is preserved when a failure arrives for the same
    /// hash; invalidate first to overwrite.
    pub async fn record(
        &self,
        artifact_id: &str,
        input_hash: &str,
        output_hash: Option<&str>,
        status: ExecutionStatus,
        provenance: &Provenance,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO executions
               (input_hash, artifact_id, output_hash, status, goal_hash,
                run_id, duration_ms, timestamp, model_id, invalidated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, NULL)
             ON CONFLICT(input_hash) DO UPDATE SET
               artifact_id = excluded.artifact_id,
               output_hash = excluded.output_hash,
               status = excluded.status,
               goal_hash = excluded.goal_hash,
               run_id = excluded.run_id,
               duration_ms = excluded.duration_ms,
               timestamp = excluded.timestamp,
               model_id = excluded.model_id,
               invalidated_at = NULL
             WHERE NOT (executions.status = 'success'
                        AND excluded.status = 'failed'
                        AND executions.invalidated_at IS NULL)",
        )
        .bind(input_hash)
        .bind(artifact_id)
        .bind(output_hash)
        .bind(status.as_str())
        .bind(&provenance.goal_hash)
        .bind(&provenance.run_id)
        .bind(provenance.duration_ms as i64)
        .bind(Utc::now().to_rfc3339())
        .bind(&provenance.model_id)
        .execute(&self.pool)
        .await?;

        debug!(artifact_id, status = status.as_str(), "recorded execution");
        Ok(())
    }

    /// Invalidate all entries for an artifact (timestamp mark, no delete)
    ///
    /// Returns the number of rows marked.
    pub async fn invalidate(&self, artifact_id: &str) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE executions SET invalidated_at = ?
             WHERE artifact_id = ? AND invalidated_at IS NULL",
        )
        .bind(Utc::now().to_rfc3339())
        .bind(artifact_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// All recorded executions for one artifact, newest first
    pub async fn history_for_artifact(&self, artifact_id: &str) -> Result<Vec<CachedExecution>> {
        let rows = sqlx::query(
            "SELECT * FROM executions WHERE artifact_id = ? ORDER BY timestamp DESC",
        )
        .bind(artifact_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_execution).collect()
    }

    /// Record which artifacts a top-level goal produced
    pub async fn record_goal_execution(
        &self,
        goal_hash: &str,
        artifact_ids: &[String],
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for artifact_id in artifact_ids {
            sqlx::query(
                "INSERT OR IGNORE INTO goal_executions (goal_hash, artifact_id) VALUES (?, ?)",
            )
            .bind(goal_hash)
            .bind(artifact_id)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Artifacts previously produced under a goal
    pub async fn artifacts_for_goal(&self, goal_hash: &str) -> Result<Vec<String>> {
        let rows = sqlx::query(
            "SELECT artifact_id FROM goal_executions WHERE goal_hash = ? ORDER BY artifact_id",
        )
        .bind(goal_hash)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|row| row.get::<String, _>("artifact_id"))
            .collect())
    }

    /// Session hit/miss counters plus table size
    pub async fn stats(&self) -> Result<CacheStats> {
        let entries: i64 = sqlx::query("SELECT COUNT(*) AS n FROM executions")
            .fetch_one(&self.pool)
            .await?
            .get("n");
        let last_updated = sqlx::query("SELECT MAX(timestamp) AS ts FROM executions")
            .fetch_one(&self.pool)
            .await?
            .get::<Option<String>, _>("ts")
            .and_then(|ts| DateTime::parse_from_rfc3339(&ts).ok())
            .map(|ts| ts.with_timezone(&Utc));

        Ok(CacheStats {
            entries: entries as u64,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            last_updated,
        })
    }
}

fn row_to_execution(row: &sqlx::sqlite::SqliteRow) -> Result<CachedExecution> {
    let status_text: String = row.get("status");
    let status = ExecutionStatus::parse(&status_text).unwrap_or_else(|| {
        warn!(status = %status_text, "unknown execution status in cache; treating as failed");
        ExecutionStatus::Failed
    });

    let parse_ts = |text: String| {
        DateTime::parse_from_rfc3339(&text)
            .map(|ts| ts.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now())
    };

    Ok(CachedExecution {
        artifact_id: row.get("artifact_id"),
        input_hash: row.get("input_hash"),
        output_hash: row.get("output_hash"),
        status,
        provenance: Provenance {
            run_id: row.get::<Option<String>, _>("run_id").unwrap_or_default(),
            goal_hash: row.get::<Option<String>, _>("goal_hash").unwrap_or_default(),
            duration_ms: row.get::<Option<i64>, _>("duration_ms").unwrap_or(0) as u64,
            model_id: row.get::<Option<String>, _>("model_id").unwrap_or_default(),
        },
        timestamp: parse_ts(row.get("timestamp")),
        invalidated_at: row
            .get::<Option<String>, _>("invalidated_at")
            .map(parse_ts),
    })
}
