//! Model and embedder contracts
//!
//! The core never talks to a concrete LLM provider. Planners, subagents,
//! and the reasoner all depend on the [`Model`] trait; embedding providers
//! are abstracted behind [`Embedder`]. Concrete clients live outside the
//! core and are injected at construction time, which is also what makes
//! every component testable with a scripted mock.

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

/// Model capability tier selected per artifact
///
/// Derived deterministically from graph structure: leaves get small models,
/// high-fan-in integration nodes get large ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelTier {
    /// Cheap model for leaf artifacts with no in-graph dependencies
    Small,
    /// Default tier
    Medium,
    /// High-capability model for convergence/integration artifacts
    Large,
}

impl ModelTier {
    /// String form used in events and provenance rows
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelTier::Small => "small",
            ModelTier::Medium => "medium",
            ModelTier::Large => "large",
        }
    }
}

/// Tool definition handed to the model for structured output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tool {
    /// Tool name the model calls
    pub name: String,

    /// What the tool does
    pub description: String,

    /// JSON schema for the arguments object
    pub parameters: Value,
}

/// A tool invocation requested by the model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    /// Name of the requested tool
    pub name: String,

    /// Arguments object produced by the model
    pub arguments: Value,
}

/// How the model should treat the provided tools
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolChoice {
    /// Model decides whether to call a tool
    #[default]
    Auto,
    /// Model must call one of the provided tools
    Required,
    /// Tools are ignored
    None,
}

/// Options for a single generation call
#[derive(Debug, Clone)]
pub struct GenerateOptions {
    /// Sampling temperature
    pub temperature: f32,

    /// Optional completion token cap
    pub max_tokens: Option<usize>,

    /// Tools available for this call
    pub tools: Vec<Tool>,

    /// Tool-choice policy
    pub tool_choice: ToolChoice,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: None,
            tools: Vec::new(),
            tool_choice: ToolChoice::Auto,
        }
    }
}

impl GenerateOptions {
    /// Set the sampling temperature
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Cap the completion length
    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Provide tools and require the model to call one
    pub fn with_required_tools(mut self, tools: Vec<Tool>) -> Self {
        self.tools = tools;
        self.tool_choice = ToolChoice::Required;
        self
    }
}

/// Token accounting for one generation
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Tokens in the prompt
    pub prompt_tokens: usize,

    /// Tokens in the completion
    pub completion_tokens: usize,
}

impl TokenUsage {
    /// Total tokens consumed
    pub fn total(&self) -> usize {
        self.prompt_tokens + self.completion_tokens
    }
}

/// Result of a generation call
#[derive(Debug, Clone, Default)]
pub struct GenerateResult {
    /// Text content (may be empty when the model only called tools)
    pub content: String,

    /// Tool calls requested by the model
    pub tool_calls: Vec<ToolCall>,

    /// Token accounting
    pub usage: TokenUsage,

    /// Why generation stopped ("stop", "length", "tool_calls", ...)
    pub finish_reason: Option<String>,
}

impl GenerateResult {
    /// True if the model requested at least one tool call
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// One chunk of a streamed generation
#[derive(Debug, Clone)]
pub struct StreamChunk {
    /// Incremental text content
    pub delta: String,

    /// Set on the final chunk
    pub finish_reason: Option<String>,
}

/// LLM client contract
///
/// Implementations are injected from outside the core. The `generate_stream`
/// operation powers token-by-token observability; components that only need
/// the final text use `generate`.
#[async_trait]
pub trait Model: Send + Sync {
    /// Stable identifier recorded in provenance rows ("qwen2.5:14b", ...)
    fn id(&self) -> &str;

    /// Generate a completion for the prompt
    async fn generate(&self, prompt: &str, options: &GenerateOptions) -> Result<GenerateResult>;

    /// Generate a completion as a chunk stream
    async fn generate_stream(
        &self,
        prompt: &str,
        options: &GenerateOptions,
    ) -> Result<BoxStream<'static, Result<StreamChunk>>>;
}

/// Batch embedding provider contract
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a batch of texts; one vector per input, in order
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}
