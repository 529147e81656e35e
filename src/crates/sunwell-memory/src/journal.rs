//! Append-only learning journal
//!
//! The journal is the source of truth for cross-session memory. Writes are
//! O(1) appends of one JSON line each; the queryable SQLite cache is always
//! derived from it and can be rebuilt at any time.
//!
//! Malformed lines are skipped with a warning rather than failing the load
//! (data errors: log and continue). Duplicate ids are merged on load with
//! the highest-confidence variant winning and the earliest timestamp
//! retained.
//!
//! Cross-process appends are guarded by a lock file next to the journal
//! (`journal.jsonl.lock`); writers always open the journal in append mode,
//! so concurrent processes converge to the same JSONL content.

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime};

use tracing::{debug, warn};

use crate::error::{MemoryError, Result};
use crate::learning::Learning;

/// Journal filename inside the memory directory
pub const JOURNAL_FILE_NAME: &str = "journal.jsonl";

const LOCK_SUFFIX: &str = ".lock";
const LOCK_TIMEOUT: Duration = Duration::from_secs(5);
const LOCK_STALE_AFTER: Duration = Duration::from_secs(30);

/// Append-only JSONL journal of learnings
#[derive(Debug, Clone)]
pub struct LearningJournal {
    path: PathBuf,
}

impl LearningJournal {
    /// Journal rooted in `memory_dir`
    pub fn new(memory_dir: impl AsRef<Path>) -> Self {
        Self {
            path: memory_dir.as_ref().join(JOURNAL_FILE_NAME),
        }
    }

    /// Journal file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// True if the journal file exists on disk
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Append one learning
    pub fn append(&self, learning: &Learning) -> Result<()> {
        self.append_batch(std::slice::from_ref(learning)).map(|_| ())
    }

    /// Append a batch of learnings under one lock acquisition
    ///
    /// Returns the number of lines written.
    pub fn append_batch(&self, learnings: &[Learning]) -> Result<usize> {
        if learnings.is_empty() {
            return Ok(0);
        }
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let _lock = JournalLock::acquire(&self.path)?;
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        for learning in learnings {
            let line = serde_json::to_string(learning)?;
            writeln!(file, "{line}")?;
        }
        file.flush()?;

        debug!(count = learnings.len(), path = %self.path.display(), "appended learnings");
        Ok(learnings.len())
    }

    /// Load every parseable entry in file order
    ///
    /// Malformed lines are logged and skipped.
    pub fn load_all(&self) -> Result<Vec<Learning>> {
        if !self.exists() {
            return Ok(Vec::new());
        }

        let reader = BufReader::new(File::open(&self.path)?);
        let mut entries = Vec::new();
        for (line_number, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<Learning>(&line) {
                Ok(learning) => entries.push(learning),
                Err(err) => {
                    warn!(
                        line = line_number + 1,
                        error = %err,
                        "skipping malformed journal entry"
                    );
                }
            }
        }
        Ok(entries)
    }

    /// Load entries deduplicated by id
    ///
    /// For duplicates, the highest-confidence variant wins and the earliest
    /// timestamp is retained.
    pub fn load_deduplicated(&self) -> Result<BTreeMap<String, Learning>> {
        let mut merged: BTreeMap<String, Learning> = BTreeMap::new();
        for entry in self.load_all()? {
            match merged.get_mut(&entry.id) {
                None => {
                    merged.insert(entry.id.clone(), entry);
                }
                Some(existing) => {
                    let earliest = existing.timestamp.min(entry.timestamp);
                    if entry.confidence > existing.confidence {
                        *existing = entry;
                    }
                    existing.timestamp = earliest;
                }
            }
        }
        Ok(merged)
    }
}

/// Lock-file guard for cross-process journal appends
///
/// Created with `O_CREAT|O_EXCL`; removed on drop. A lock older than
/// [`LOCK_STALE_AFTER`] is treated as abandoned by a crashed process and
/// broken.
struct JournalLock {
    lock_path: PathBuf,
}

impl JournalLock {
    fn acquire(journal_path: &Path) -> Result<Self> {
        let lock_path = journal_path.with_extension(format!(
            "{}{}",
            journal_path
                .extension()
                .map(|e| e.to_string_lossy().into_owned())
                .unwrap_or_default(),
            LOCK_SUFFIX
        ));

        let started = Instant::now();
        loop {
            match OpenOptions::new().write(true).create_new(true).open(&lock_path) {
                Ok(_) => return Ok(Self { lock_path }),
                Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
                    if Self::is_stale(&lock_path) {
                        warn!(path = %lock_path.display(), "breaking stale journal lock");
                        let _ = std::fs::remove_file(&lock_path);
                        continue;
                    }
                    if started.elapsed() > LOCK_TIMEOUT {
                        return Err(MemoryError::LockTimeout {
                            path: lock_path.display().to_string(),
                        });
                    }
                    std::thread::sleep(Duration::from_millis(10));
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    fn is_stale(lock_path: &Path) -> bool {
        lock_path
            .metadata()
            .and_then(|m| m.modified())
            .map(|modified| {
                SystemTime::now()
                    .duration_since(modified)
                    .map(|age| age > LOCK_STALE_AFTER)
                    .unwrap_or(false)
            })
            .unwrap_or(false)
    }
}

impl Drop for JournalLock {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.lock_path);
    }
}
