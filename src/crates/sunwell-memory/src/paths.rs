//! Workspace layout for durable state
//!
//! Everything sunwell persists lives under `{workspace}/.sunwell/`:
//!
//! ```text
//! .sunwell/
//! ├── cache/
//! │   └── execution.db        - content-addressed execution cache
//! ├── memory/
//! │   ├── journal.jsonl       - append-only learning journal
//! │   ├── learnings.db        - derived learning cache
//! │   └── briefing.json       - rolling project briefing
//! └── subagents/
//!     └── registry.json       - subagent registry persistence
//! ```

use std::path::{Path, PathBuf};

/// Application directory name inside the workspace
pub const APP_DIR_NAME: &str = ".sunwell";

/// Resolved paths for one workspace
#[derive(Debug, Clone)]
pub struct WorkspacePaths {
    root: PathBuf,
}

impl WorkspacePaths {
    /// Paths rooted at `workspace`
    pub fn new(workspace: impl AsRef<Path>) -> Self {
        Self {
            root: workspace.as_ref().to_path_buf(),
        }
    }

    /// Workspace root
    pub fn workspace(&self) -> &Path {
        &self.root
    }

    /// `{workspace}/.sunwell`
    pub fn app_dir(&self) -> PathBuf {
        self.root.join(APP_DIR_NAME)
    }

    /// `{workspace}/.sunwell/cache`
    pub fn cache_dir(&self) -> PathBuf {
        self.app_dir().join("cache")
    }

    /// `{workspace}/.sunwell/memory`
    pub fn memory_dir(&self) -> PathBuf {
        self.app_dir().join("memory")
    }

    /// `{workspace}/.sunwell/subagents`
    pub fn subagents_dir(&self) -> PathBuf {
        self.app_dir().join("subagents")
    }

    /// `{workspace}/.sunwell/cache/execution.db`
    pub fn execution_db(&self) -> PathBuf {
        self.cache_dir().join("execution.db")
    }

    /// `{workspace}/.sunwell/memory/journal.jsonl`
    pub fn journal_file(&self) -> PathBuf {
        self.memory_dir().join(crate::journal::JOURNAL_FILE_NAME)
    }

    /// `{workspace}/.sunwell/memory/briefing.json`
    pub fn briefing_file(&self) -> PathBuf {
        self.memory_dir().join("briefing.json")
    }

    /// `{workspace}/.sunwell/subagents/registry.json`
    pub fn registry_file(&self) -> PathBuf {
        self.subagents_dir().join("registry.json")
    }

    /// Create every directory in the layout
    pub fn ensure(&self) -> std::io::Result<()> {
        for dir in [self.cache_dir(), self.memory_dir(), self.subagents_dir()] {
            std::fs::create_dir_all(dir)?;
        }
        Ok(())
    }
}
