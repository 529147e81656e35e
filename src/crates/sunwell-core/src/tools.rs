//! Tool execution contract and trust policy
//!
//! Concrete tools (file I/O, shell, git) live outside the core behind the
//! [`ToolExecutor`] trait. What the core does own is *policy*: every tool
//! declares the [`TrustLevel`] it needs, and a [`TrustPolicy`] decides
//! which invocations the executor will even attempt.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;
use crate::model::Tool;

/// Policy tier controlling which tools may run
///
/// Tiers are ordered: a policy at `Shell` allows everything, `Workspace`
/// allows workspace writes and reads, `ReadOnly` allows only reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrustLevel {
    /// Read files and inspect state only
    ReadOnly,
    /// Read and write within the workspace
    Workspace,
    /// Arbitrary shell commands
    Shell,
}

impl TrustLevel {
    /// String form used in config and events
    pub fn as_str(&self) -> &'static str {
        match self {
            TrustLevel::ReadOnly => "read_only",
            TrustLevel::Workspace => "workspace",
            TrustLevel::Shell => "shell",
        }
    }
}

/// Trust policy applied to every tool invocation
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TrustPolicy {
    /// Highest trust level this policy grants
    pub level: TrustLevel,
}

impl TrustPolicy {
    /// Policy granting up to `level`
    pub fn new(level: TrustLevel) -> Self {
        Self { level }
    }

    /// True if a tool requiring `required` may run under this policy
    pub fn allows(&self, required: TrustLevel) -> bool {
        required <= self.level
    }
}

impl Default for TrustPolicy {
    fn default() -> Self {
        Self::new(TrustLevel::Workspace)
    }
}

/// One tool invocation request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolRequest {
    /// Tool name
    pub name: String,

    /// Arguments object
    pub arguments: Value,

    /// Trust level this tool needs
    pub required_trust: TrustLevel,
}

impl ToolRequest {
    /// Build a request
    pub fn new(name: impl Into<String>, arguments: Value, required_trust: TrustLevel) -> Self {
        Self {
            name: name.into(),
            arguments,
            required_trust,
        }
    }
}

/// Result of one tool invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolOutput {
    /// Tool output content
    pub content: String,

    /// Whether the invocation succeeded
    pub success: bool,

    /// Error message if it failed
    pub error: Option<String>,
}

impl ToolOutput {
    /// Successful output
    pub fn ok(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            success: true,
            error: None,
        }
    }

    /// Failed output
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            content: String::new(),
            success: false,
            error: Some(error.into()),
        }
    }
}

/// Contract for concrete tool backends
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    /// Execute one tool request
    async fn execute(&self, request: &ToolRequest) -> Result<ToolOutput>;

    /// Tools this executor can run (definitions handed to the model)
    fn available_tools(&self) -> Vec<Tool>;
}
