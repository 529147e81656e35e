//! Project briefing - rolling snapshot of where a run stands
//!
//! The briefing is the one-page answer to "what was the agent doing and
//! what should happen next". It is created on the first goal, updated at
//! the end of each execution wave, and always overwritten atomically
//! (write-temp, rename) so readers never observe a torn file.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::warn;

use crate::error::Result;

/// Bound on hazards/blockers/hot_files lists
const MAX_LIST_ENTRIES: usize = 10;

/// Overall run status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BriefingStatus {
    /// No goal in flight
    Ready,
    /// Executing
    InProgress,
    /// Waiting on something the agent cannot resolve
    Blocked,
    /// Goal finished
    Complete,
}

/// Rolling project snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Briefing {
    /// Current mission statement (the active goal)
    pub mission: String,

    /// Run status
    pub status: BriefingStatus,

    /// Progress through the plan, 0.0-1.0
    pub progress: f64,

    /// Last thing the agent did
    pub last_action: String,

    /// What the agent intends to do next
    pub next_action: String,

    /// Known hazards (bounded)
    #[serde(default)]
    pub hazards: Vec<String>,

    /// Active blockers (bounded)
    #[serde(default)]
    pub blockers: Vec<String>,

    /// Files under heavy churn (bounded)
    #[serde(default)]
    pub hot_files: Vec<String>,

    /// Hash of the active goal
    pub goal_hash: String,

    /// Session that wrote this briefing
    pub session_id: String,

    /// Last update time
    pub updated_at: DateTime<Utc>,
}

impl Briefing {
    /// Create a briefing for a fresh goal
    pub fn new(
        mission: impl Into<String>,
        goal_hash: impl Into<String>,
        session_id: impl Into<String>,
    ) -> Self {
        Self {
            mission: mission.into(),
            status: BriefingStatus::Ready,
            progress: 0.0,
            last_action: String::new(),
            next_action: String::new(),
            hazards: Vec::new(),
            blockers: Vec::new(),
            hot_files: Vec::new(),
            goal_hash: goal_hash.into(),
            session_id: session_id.into(),
            updated_at: Utc::now(),
        }
    }

    /// Record progress after a wave completes
    pub fn record_progress(
        &mut self,
        progress: f64,
        last_action: impl Into<String>,
        next_action: impl Into<String>,
    ) {
        self.progress = progress.clamp(0.0, 1.0);
        self.last_action = last_action.into();
        self.next_action = next_action.into();
        self.status = if self.progress >= 1.0 {
            BriefingStatus::Complete
        } else {
            BriefingStatus::InProgress
        };
        self.updated_at = Utc::now();
    }

    /// Note a hazard (oldest entries roll off past the bound)
    pub fn record_hazard(&mut self, hazard: impl Into<String>) {
        push_bounded(&mut self.hazards, hazard.into());
        self.updated_at = Utc::now();
    }

    /// Note a blocker and mark the run blocked
    pub fn record_blocker(&mut self, blocker: impl Into<String>) {
        push_bounded(&mut self.blockers, blocker.into());
        self.status = BriefingStatus::Blocked;
        self.updated_at = Utc::now();
    }

    /// Note a file under churn
    pub fn record_hot_file(&mut self, path: impl Into<String>) {
        push_bounded(&mut self.hot_files, path.into());
        self.updated_at = Utc::now();
    }

    /// Write atomically: serialize to a temp file, then rename into place
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(dir)?;

        let temp = NamedTempFile::new_in(dir)?;
        serde_json::to_writer_pretty(&temp, self)?;
        temp.persist(path).map_err(|e| e.error)?;
        Ok(())
    }

    /// Load a briefing; `None` if the file does not exist or is unreadable
    ///
    /// A corrupt briefing is a data error: logged and treated as absent so
    /// a fresh one can be written.
    pub fn load(path: impl AsRef<Path>) -> Option<Briefing> {
        let path = path.as_ref();
        if !path.exists() {
            return None;
        }
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "unreadable briefing; ignoring");
                return None;
            }
        };
        match serde_json::from_str(&text) {
            Ok(briefing) => Some(briefing),
            Err(err) => {
                warn!(path = %path.display(), error = %err, "malformed briefing; ignoring");
                None
            }
        }
    }
}

fn push_bounded(list: &mut Vec<String>, entry: String) {
    if list.contains(&entry) {
        return;
    }
    list.push(entry);
    if list.len() > MAX_LIST_ENTRIES {
        list.remove(0);
    }
}
