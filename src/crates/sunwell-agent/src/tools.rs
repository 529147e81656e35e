//! Trust-enforcing tool façade
//!
//! Every tool invocation in a run goes through [`TrustedToolExecutor`],
//! which is where the three cross-cutting policies attach:
//!
//! - **trust**: a tool whose required trust exceeds the policy is denied
//!   before it runs;
//! - **cancellation**: the token is checked before dispatch, so a
//!   cancelled subagent stops at its next tool call;
//! - **observability**: `tool_start` / `tool_complete` / `tool_error`
//!   events are emitted around every invocation.

use std::sync::Arc;
use std::time::Instant;

use serde_json::json;
use tracing::{debug, warn};

use sunwell_core::{
    CancellationToken, CoreError, EventBus, EventType, Tool, ToolExecutor, ToolOutput, ToolRequest,
    TrustPolicy,
};

/// Tool executor wrapper enforcing trust, cancellation, and events
pub struct TrustedToolExecutor {
    inner: Arc<dyn ToolExecutor>,
    policy: TrustPolicy,
    events: Arc<EventBus>,
    token: CancellationToken,
}

impl TrustedToolExecutor {
    /// Wrap a concrete executor
    pub fn new(
        inner: Arc<dyn ToolExecutor>,
        policy: TrustPolicy,
        events: Arc<EventBus>,
        token: CancellationToken,
    ) -> Self {
        Self {
            inner,
            policy,
            events,
            token,
        }
    }

    /// Tools the wrapped executor offers
    pub fn available_tools(&self) -> Vec<Tool> {
        self.inner.available_tools()
    }

    /// Execute one request under policy
    pub async fn execute(&self, request: &ToolRequest) -> Result<ToolOutput, CoreError> {
        self.token.checkpoint()?;

        if !self.policy.allows(request.required_trust) {
            warn!(
                tool = %request.name,
                required = request.required_trust.as_str(),
                granted = self.policy.level.as_str(),
                "tool denied by trust policy"
            );
            let err = CoreError::Tool {
                tool: request.name.clone(),
                message: format!(
                    "requires trust level '{}' but policy grants '{}'",
                    request.required_trust.as_str(),
                    self.policy.level.as_str()
                ),
            };
            self.events.publish(
                EventType::ToolError,
                json!({
                    "tool": request.name,
                    "arguments": request.arguments,
                    "error": err.to_string(),
                    "denied": true,
                }),
            );
            return Err(err);
        }

        self.events.publish(
            EventType::ToolStart,
            json!({"tool": request.name, "arguments": request.arguments}),
        );
        let started = Instant::now();

        match self.inner.execute(request).await {
            Ok(output) if output.success => {
                debug!(
                    tool = %request.name,
                    duration_ms = started.elapsed().as_millis() as u64,
                    "tool completed"
                );
                self.events.publish(
                    EventType::ToolComplete,
                    json!({
                        "tool": request.name,
                        "arguments": request.arguments,
                        "result": output.content,
                        "duration_ms": started.elapsed().as_millis() as u64,
                    }),
                );
                Ok(output)
            }
            Ok(output) => {
                self.events.publish(
                    EventType::ToolError,
                    json!({
                        "tool": request.name,
                        "arguments": request.arguments,
                        "error": output.error.clone().unwrap_or_default(),
                    }),
                );
                Ok(output)
            }
            Err(err) => {
                self.events.publish(
                    EventType::ToolError,
                    json!({
                        "tool": request.name,
                        "arguments": request.arguments,
                        "error": err.to_string(),
                    }),
                );
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use sunwell_core::{AgentEvent, TrustLevel};

    struct EchoExecutor;

    #[async_trait]
    impl ToolExecutor for EchoExecutor {
        async fn execute(&self, request: &ToolRequest) -> sunwell_core::Result<ToolOutput> {
            if request.name == "broken" {
                return Ok(ToolOutput::failed("tool reported failure"));
            }
            Ok(ToolOutput::ok(format!("ran {}", request.name)))
        }

        fn available_tools(&self) -> Vec<Tool> {
            vec![Tool {
                name: "echo".to_string(),
                description: "echo back".to_string(),
                parameters: json!({"type": "object"}),
            }]
        }
    }

    fn wired(policy: TrustPolicy) -> (TrustedToolExecutor, Arc<Mutex<Vec<AgentEvent>>>) {
        let bus = Arc::new(EventBus::new("tool-test"));
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        bus.subscribe(move |event| sink.lock().push(event.clone()));

        (
            TrustedToolExecutor::new(
                Arc::new(EchoExecutor),
                policy,
                bus,
                CancellationToken::new(),
            ),
            events,
        )
    }

    #[tokio::test]
    async fn test_allowed_tool_runs_and_emits() {
        let (executor, events) = wired(TrustPolicy::new(TrustLevel::Workspace));
        let request = ToolRequest::new("echo", json!({"text": "hi"}), TrustLevel::ReadOnly);

        let output = executor.execute(&request).await.unwrap();
        assert!(output.success);
        assert_eq!(output.content, "ran echo");

        let types: Vec<EventType> = events.lock().iter().map(|e| e.event_type).collect();
        assert_eq!(types, vec![EventType::ToolStart, EventType::ToolComplete]);
    }

    #[tokio::test]
    async fn test_trust_denial_blocks_execution() {
        let (executor, events) = wired(TrustPolicy::new(TrustLevel::ReadOnly));
        let request = ToolRequest::new("shell", json!({"command": "rm -rf"}), TrustLevel::Shell);

        let err = executor.execute(&request).await.unwrap_err();
        assert!(matches!(err, CoreError::Tool { ref tool, .. } if tool == "shell"));

        let events = events.lock();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, EventType::ToolError);
        assert_eq!(events[0].data["denied"], true);
    }

    #[tokio::test]
    async fn test_tool_reported_failure_emits_error() {
        let (executor, events) = wired(TrustPolicy::new(TrustLevel::Shell));
        let request = ToolRequest::new("broken", json!({}), TrustLevel::Workspace);

        let output = executor.execute(&request).await.unwrap();
        assert!(!output.success);

        let types: Vec<EventType> = events.lock().iter().map(|e| e.event_type).collect();
        assert_eq!(types, vec![EventType::ToolStart, EventType::ToolError]);
    }

    #[tokio::test]
    async fn test_cancelled_token_blocks_dispatch() {
        let bus = Arc::new(EventBus::new("tool-test"));
        let token = CancellationToken::new();
        token.cancel();
        let executor = TrustedToolExecutor::new(
            Arc::new(EchoExecutor),
            TrustPolicy::default(),
            bus,
            token,
        );

        let request = ToolRequest::new("echo", json!({}), TrustLevel::ReadOnly);
        assert!(matches!(
            executor.execute(&request).await,
            Err(CoreError::Cancelled)
        ));
    }
}
