//! BM25 full-text ranking over the learning cache
//!
//! The inverted index (`bm25_index` table: term → {learning_id, tf}) turns
//! the naive O(n) scan over all facts into an index lookup per query term.
//! Learnings are additive and the bulk rebuild is cheap, so the index is
//! rebuilt rather than updated incrementally.
//!
//! Scoring uses the standard formula with `IDF = ln((N − df + 0.5) /
//! (df + 0.5) + 1)`; defaults `k1 = 1.5`, `b = 0.75`.

use std::collections::HashMap;

use sqlx::Row;
use tracing::{info, warn};

use crate::cache::LearningCache;
use crate::error::Result;

/// Default term-frequency saturation parameter
pub const DEFAULT_K1: f64 = 1.5;

/// Default length-normalization parameter
pub const DEFAULT_B: f64 = 0.75;

/// Index statistics
#[derive(Debug, Clone, Default)]
pub struct Bm25Stats {
    /// True once the index has been built
    pub indexed: bool,
    /// Distinct terms in the index
    pub unique_terms: u64,
    /// Total (term, learning) postings
    pub total_entries: u64,
    /// Average document length in tokens
    pub avg_doc_length: f64,
    /// Documents indexed
    pub total_docs: u64,
}

/// Tokenize a fact the same way the index does
fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

fn idf(total_docs: u64, doc_freq: u64) -> f64 {
    let numerator = total_docs as f64 - doc_freq as f64 + 0.5;
    let denominator = doc_freq as f64 + 0.5;
    (numerator / denominator + 1.0).ln()
}

fn bm25_term_score(tf: u64, doc_length: u64, avg_doc_length: f64, idf: f64, k1: f64, b: f64) -> f64 {
    let tf = tf as f64;
    let numerator = tf * (k1 + 1.0);
    let denominator = tf + k1 * (1.0 - b + b * doc_length as f64 / avg_doc_length.max(f64::EPSILON));
    idf * (numerator / denominator)
}

impl LearningCache {
    /// Build the BM25 inverted index from scratch
    ///
    /// Clears any previous index, tokenizes every fact, and stores term
    /// frequencies plus `avg_doc_length`/`total_docs` metadata. Returns the
    /// number of unique terms indexed.
    pub async fn build_bm25_index(&self) -> Result<u64> {
        let rows = sqlx::query("SELECT id, fact FROM learnings")
            .fetch_all(&self.pool)
            .await?;

        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM bm25_index").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM bm25_metadata").execute(&mut *tx).await?;

        if rows.is_empty() {
            tx.commit().await?;
            return Ok(0);
        }

        let mut total_tokens = 0u64;
        for row in &rows {
            let learning_id: String = row.get("id");
            let fact: String = row.get("fact");

            let tokens = tokenize(&fact);
            total_tokens += tokens.len() as u64;

            let mut term_freq: HashMap<String, u64> = HashMap::new();
            for token in tokens {
                *term_freq.entry(token).or_insert(0) += 1;
            }
            for (term, freq) in term_freq {
                sqlx::query(
                    "INSERT INTO bm25_index (term, learning_id, term_frequency) VALUES (?, ?, ?)",
                )
                .bind(&term)
                .bind(&learning_id)
                .bind(freq as i64)
                .execute(&mut *tx)
                .await?;
            }
        }

        let total_docs = rows.len() as u64;
        let avg_doc_length = total_tokens as f64 / total_docs as f64;
        sqlx::query("INSERT INTO bm25_metadata (key, value) VALUES ('avg_doc_length', ?)")
            .bind(avg_doc_length)
            .execute(&mut *tx)
            .await?;
        sqlx::query("INSERT INTO bm25_metadata (key, value) VALUES ('total_docs', ?)")
            .bind(total_docs as f64)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        let unique_terms: i64 = sqlx::query("SELECT COUNT(DISTINCT term) AS n FROM bm25_index")
            .fetch_one(&self.pool)
            .await?
            .get("n");

        info!(
            unique_terms,
            total_docs, avg_doc_length, "built BM25 index"
        );
        Ok(unique_terms as u64)
    }

    /// True if the index has been built
    pub async fn has_bm25_index(&self) -> Result<bool> {
        let count: i64 = sqlx::query("SELECT COUNT(*) AS n FROM bm25_index")
            .fetch_one(&self.pool)
            .await?
            .get("n");
        Ok(count > 0)
    }

    /// Fast BM25 query using the inverted index
    ///
    /// Returns `(learning_id, score)` pairs sorted by descending score.
    /// Ties break by learning id so the ranking is deterministic.
    pub async fn bm25_query_fast(
        &self,
        query: &str,
        limit: usize,
        k1: f64,
        b: f64,
    ) -> Result<Vec<(String, f64)>> {
        let query_terms = tokenize(query);
        if query_terms.is_empty() {
            return Ok(Vec::new());
        }

        let Some((avg_doc_length, total_docs)) = self.bm25_metadata().await? else {
            warn!("BM25 metadata missing; index may not be built");
            return Ok(Vec::new());
        };

        // Document lengths in one pass instead of a subquery per posting.
        let doc_lengths: HashMap<String, u64> = sqlx::query(
            "SELECT learning_id, SUM(term_frequency) AS len FROM bm25_index GROUP BY learning_id",
        )
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(|row| (row.get::<String, _>("learning_id"), row.get::<i64, _>("len") as u64))
        .collect();

        let mut unique_terms: Vec<&String> = query_terms.iter().collect();
        unique_terms.sort();
        unique_terms.dedup();

        let mut doc_scores: HashMap<String, f64> = HashMap::new();
        for term in unique_terms {
            let postings = sqlx::query(
                "SELECT learning_id, term_frequency FROM bm25_index WHERE term = ?",
            )
            .bind(term)
            .fetch_all(&self.pool)
            .await?;

            let df = postings.len() as u64;
            if df == 0 {
                continue;
            }
            let term_idf = idf(total_docs, df);

            for posting in postings {
                let learning_id: String = posting.get("learning_id");
                let tf = posting.get::<i64, _>("term_frequency") as u64;
                let doc_length = doc_lengths.get(&learning_id).copied().unwrap_or(0);

                let score = bm25_term_score(tf, doc_length, avg_doc_length, term_idf, k1, b);
                *doc_scores.entry(learning_id).or_insert(0.0) += score;
            }
        }

        let mut ranked: Vec<(String, f64)> = doc_scores.into_iter().collect();
        ranked.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        ranked.truncate(limit);
        Ok(ranked)
    }

    /// Reference O(n) BM25 scorer
    ///
    /// Scans every fact and scores it on the fly. Kept as the ground truth
    /// the indexed query is checked against.
    pub async fn bm25_query_reference(
        &self,
        query: &str,
        limit: usize,
        k1: f64,
        b: f64,
    ) -> Result<Vec<(String, f64)>> {
        let query_terms = tokenize(query);
        if query_terms.is_empty() {
            return Ok(Vec::new());
        }

        let rows = sqlx::query("SELECT id, fact FROM learnings")
            .fetch_all(&self.pool)
            .await?;
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let docs: Vec<(String, Vec<String>)> = rows
            .into_iter()
            .map(|row| {
                let id: String = row.get("id");
                let fact: String = row.get("fact");
                (id, tokenize(&fact))
            })
            .collect();

        let total_docs = docs.len() as u64;
        let avg_doc_length =
            docs.iter().map(|(_, t)| t.len() as f64).sum::<f64>() / total_docs as f64;

        let mut unique_terms: Vec<&String> = query_terms.iter().collect();
        unique_terms.sort();
        unique_terms.dedup();

        let mut ranked: Vec<(String, f64)> = Vec::new();
        for (id, tokens) in &docs {
            let mut score = 0.0;
            for term in &unique_terms {
                let tf = tokens.iter().filter(|t| *t == *term).count() as u64;
                if tf == 0 {
                    continue;
                }
                let df = docs
                    .iter()
                    .filter(|(_, other)| other.iter().any(|t| &t == term))
                    .count() as u64;
                score += bm25_term_score(
                    tf,
                    tokens.len() as u64,
                    avg_doc_length,
                    idf(total_docs, df),
                    k1,
                    b,
                );
            }
            if score > 0.0 {
                ranked.push((id.clone(), score));
            }
        }

        ranked.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        ranked.truncate(limit);
        Ok(ranked)
    }

    /// Index statistics
    pub async fn bm25_stats(&self) -> Result<Bm25Stats> {
        if !self.has_bm25_index().await? {
            return Ok(Bm25Stats::default());
        }

        let unique_terms: i64 = sqlx::query("SELECT COUNT(DISTINCT term) AS n FROM bm25_index")
            .fetch_one(&self.pool)
            .await?
            .get("n");
        let total_entries: i64 = sqlx::query("SELECT COUNT(*) AS n FROM bm25_index")
            .fetch_one(&self.pool)
            .await?
            .get("n");
        let (avg_doc_length, total_docs) = self.bm25_metadata().await?.unwrap_or((0.0, 0));

        Ok(Bm25Stats {
            indexed: true,
            unique_terms: unique_terms as u64,
            total_entries: total_entries as u64,
            avg_doc_length,
            total_docs,
        })
    }

    async fn bm25_metadata(&self) -> Result<Option<(f64, u64)>> {
        let avg = sqlx::query("SELECT value FROM bm25_metadata WHERE key = 'avg_doc_length'")
            .fetch_optional(&self.pool)
            .await?;
        let total = sqlx::query("SELECT value FROM bm25_metadata WHERE key = 'total_docs'")
            .fetch_optional(&self.pool)
            .await?;

        match (avg, total) {
            (Some(avg), Some(total)) => Ok(Some((
                avg.get::<f64, _>("value"),
                total.get::<f64, _>("value") as u64,
            ))),
            _ => Ok(None),
        }
    }
}
