//! Journey recording - capture agent behavior for assertion
//!
//! A journey test drives the agent and then asserts over *observed
//! outcomes* - which tools ran, which files changed, what the output said,
//! whether gates passed - rather than over code paths. The
//! [`EventRecorder`] subscribes to the event bus and derives structured
//! views from the raw stream; the assertion API lives in [`assertions`].
//!
//! Multi-turn journeys call [`EventRecorder::new_turn`] between turns;
//! each turn's collections are archived as an immutable [`TurnSnapshot`].

pub mod assertions;

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;

use sunwell_core::{AgentEvent, EventBus, EventType};

/// Record of a single tool call
#[derive(Debug, Clone)]
pub struct ToolCallRecord {
    /// Tool name ("write_file", "shell", ...)
    pub name: String,
    /// Arguments passed to the tool
    pub arguments: Value,
    /// Tool result, once captured
    pub result: Option<String>,
    /// Whether the call succeeded
    pub success: bool,
    /// Error message if it failed
    pub error: Option<String>,
    /// When the tool was called
    pub timestamp: f64,
}

/// Record of a file change derived from tool calls
#[derive(Debug, Clone)]
pub struct FileChange {
    /// File path
    pub path: String,
    /// Operation: "create", "modify", "delete"
    pub operation: String,
    /// File content after the operation, when available
    pub content: Option<String>,
}

/// Record of a validation gate result
#[derive(Debug, Clone)]
pub struct ValidationRecord {
    /// Gate identifier
    pub gate_id: String,
    /// Gate type ("syntax", "lint", "type", "runtime")
    pub gate_type: String,
    /// Whether the gate passed
    pub passed: bool,
    /// Errors when it failed
    pub errors: Vec<String>,
    /// Gate duration in milliseconds
    pub duration_ms: u64,
}

/// Record of a reliability issue
#[derive(Debug, Clone)]
pub struct ReliabilityRecord {
    /// Failure type ("hallucinated_completion", ...)
    pub failure_type: String,
    /// Detection confidence 0.0-1.0
    pub confidence: f64,
    /// Human-readable description
    pub message: String,
    /// Recommended remediation
    pub suggested_action: Option<String>,
}

/// Record of a plan selection
#[derive(Debug, Clone)]
pub struct PlanRecord {
    /// Selected candidate id
    pub selected_candidate_id: Option<String>,
    /// Variance strategy used
    pub strategy: Option<String>,
    /// Number of tasks in the plan
    pub tasks: u64,
    /// Winning score
    pub score: f64,
}

/// Record of model generation metrics
#[derive(Debug, Clone, Default)]
pub struct ModelMetricsRecord {
    /// Model identifier
    pub model: Option<String>,
    /// Prompt tokens
    pub prompt_tokens: u64,
    /// Completion tokens
    pub completion_tokens: u64,
    /// Total tokens consumed
    pub total_tokens: u64,
    /// Generation duration in seconds
    pub duration_s: Option<f64>,
    /// Why generation stopped
    pub finish_reason: Option<String>,
}

/// Record of an extracted signal
#[derive(Debug, Clone)]
pub struct SignalRecord {
    /// Signal kind
    pub kind: String,
    /// Full payload
    pub data: Value,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct TurnData {
    pub events: Vec<AgentEvent>,
    pub tool_calls: Vec<ToolCallRecord>,
    pub file_changes: Vec<FileChange>,
    pub outputs: Vec<String>,
    pub validations: Vec<ValidationRecord>,
    pub reliability: Vec<ReliabilityRecord>,
    pub plans: Vec<PlanRecord>,
    pub model_metrics: Vec<ModelMetricsRecord>,
    pub signals: Vec<SignalRecord>,
    pub errors: Vec<Value>,
}

/// Immutable snapshot of one completed turn
#[derive(Debug, Clone)]
pub struct TurnSnapshot {
    /// 0-indexed turn number
    pub turn_index: usize,
    /// Raw events captured during the turn
    pub events: Vec<AgentEvent>,
    /// Tool calls during the turn
    pub tool_calls: Vec<ToolCallRecord>,
    /// File changes during the turn
    pub file_changes: Vec<FileChange>,
    /// Output fragments during the turn
    pub outputs: Vec<String>,
    /// Validation results during the turn
    pub validations: Vec<ValidationRecord>,
}

struct RecorderState {
    current: TurnData,
    turns: Vec<TurnSnapshot>,
}

/// Bus subscriber that captures per-turn agent behavior
pub struct EventRecorder {
    bus: Arc<EventBus>,
    subscriber_id: u64,
    state: Arc<Mutex<RecorderState>>,
}

impl EventRecorder {
    /// Attach a recorder to a bus (begins capturing immediately)
    pub fn attach(bus: Arc<EventBus>) -> Self {
        let state = Arc::new(Mutex::new(RecorderState {
            current: TurnData::default(),
            turns: Vec::new(),
        }));

        let sink = Arc::clone(&state);
        let subscriber_id = bus.subscribe(move |event| {
            let mut state = sink.lock();
            extract_into(&mut state.current, event);
            state.current.events.push(event.clone());
        });

        Self {
            bus,
            subscriber_id,
            state,
        }
    }

    /// Stop capturing (detaches from the bus)
    pub fn detach(&self) {
        self.bus.unsubscribe(self.subscriber_id);
    }

    /// Archive the current turn and start a fresh one
    pub fn new_turn(&self) {
        let mut state = self.state.lock();
        let turn_index = state.turns.len();
        let data = std::mem::take(&mut state.current);
        state.turns.push(TurnSnapshot {
            turn_index,
            events: data.events,
            tool_calls: data.tool_calls,
            file_changes: data.file_changes,
            outputs: data.outputs,
            validations: data.validations,
        });
    }

    /// Drop everything captured so far
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.current = TurnData::default();
        state.turns.clear();
    }

    /// Number of archived turns
    pub fn turn_count(&self) -> usize {
        self.state.lock().turns.len()
    }

    /// One archived turn
    pub fn get_turn(&self, turn_index: usize) -> Option<TurnSnapshot> {
        self.state.lock().turns.get(turn_index).cloned()
    }

    pub(crate) fn with_current<R>(&self, f: impl FnOnce(&TurnData) -> R) -> R {
        f(&self.state.lock().current)
    }
}

impl Drop for EventRecorder {
    fn drop(&mut self) {
        self.detach();
    }
}

/// Derive structured records from one event
fn extract_into(turn: &mut TurnData, event: &AgentEvent) {
    let data = &event.data;
    match event.event_type {
        EventType::ToolStart => {
            turn.tool_calls.push(ToolCallRecord {
                name: str_field(data, "tool"),
                arguments: data.get("arguments").cloned().unwrap_or(Value::Null),
                result: None,
                success: true,
                error: None,
                timestamp: event.timestamp,
            });
        }
        EventType::ToolComplete => {
            let name = str_field(data, "tool");
            if let Some(call) = turn
                .tool_calls
                .iter_mut()
                .rev()
                .find(|c| c.name == name && c.result.is_none() && c.error.is_none())
            {
                call.result = data.get("result").and_then(Value::as_str).map(str::to_string);
            }
            record_file_change(turn, &name, data);
        }
        EventType::ToolError => {
            let name = str_field(data, "tool");
            if let Some(call) = turn
                .tool_calls
                .iter_mut()
                .rev()
                .find(|c| c.name == name && c.result.is_none() && c.error.is_none())
            {
                call.success = false;
                call.error = data.get("error").and_then(Value::as_str).map(str::to_string);
            }
        }
        EventType::TaskComplete | EventType::Complete => {
            if let Some(output) = data.get("output").and_then(Value::as_str) {
                turn.outputs.push(output.to_string());
            }
        }
        EventType::ModelComplete => {
            if let Some(content) = data.get("content").and_then(Value::as_str) {
                turn.outputs.push(content.to_string());
            }
            turn.model_metrics.push(ModelMetricsRecord {
                model: data.get("model").and_then(Value::as_str).map(str::to_string),
                prompt_tokens: u64_field(data, "prompt_tokens"),
                completion_tokens: u64_field(data, "completion_tokens"),
                total_tokens: u64_field(data, "total_tokens"),
                duration_s: data.get("duration_s").and_then(Value::as_f64),
                finish_reason: data
                    .get("finish_reason")
                    .and_then(Value::as_str)
                    .map(str::to_string),
            });
        }
        EventType::GatePass | EventType::GateFail => {
            turn.validations.push(ValidationRecord {
                gate_id: str_field(data, "gate_id"),
                gate_type: str_field(data, "gate_type"),
                passed: event.event_type == EventType::GatePass,
                errors: data
                    .get("errors")
                    .and_then(Value::as_array)
                    .map(|errors| {
                        errors
                            .iter()
                            .filter_map(Value::as_str)
                            .map(str::to_string)
                            .collect()
                    })
                    .unwrap_or_default(),
                duration_ms: u64_field(data, "duration_ms"),
            });
        }
        EventType::ReliabilityWarning | EventType::ReliabilityHallucination => {
            turn.reliability.push(ReliabilityRecord {
                failure_type: str_field(data, "failure_type"),
                confidence: data.get("confidence").and_then(Value::as_f64).unwrap_or(0.5),
                message: str_field(data, "message"),
                suggested_action: data
                    .get("suggested_action")
                    .and_then(Value::as_str)
                    .map(str::to_string),
            });
        }
        EventType::PlanWinner => {
            turn.plans.push(PlanRecord {
                selected_candidate_id: data
                    .get("selected_candidate_id")
                    .and_then(Value::as_str)
                    .map(str::to_string),
                strategy: data
                    .get("variance_strategy")
                    .and_then(Value::as_str)
                    .map(str::to_string),
                tasks: u64_field(data, "tasks"),
                score: data.get("score").and_then(Value::as_f64).unwrap_or(0.0),
            });
        }
        EventType::Signal => {
            turn.signals.push(SignalRecord {
                kind: str_field(data, "kind"),
                data: data.clone(),
            });
        }
        EventType::Error => {
            turn.errors.push(data.clone());
        }
        _ => {}
    }
}

fn record_file_change(turn: &mut TurnData, tool_name: &str, data: &Value) {
    let operation = match data.get("operation").and_then(Value::as_str) {
        Some(op) => op.to_string(),
        None => match tool_name {
            "write_file" | "create_file" => "create".to_string(),
            "edit_file" | "append_file" => "modify".to_string(),
            "delete_file" => "delete".to_string(),
            _ => return,
        },
    };

    let path = data
        .get("path")
        .or_else(|| data.get("arguments").and_then(|a| a.get("path")))
        .and_then(Value::as_str);
    let Some(path) = path else { return };

    turn.file_changes.push(FileChange {
        path: path.to_string(),
        operation,
        content: data
            .get("arguments")
            .and_then(|a| a.get("content"))
            .and_then(Value::as_str)
            .map(str::to_string),
    });
}

fn str_field(data: &Value, key: &str) -> String {
    data.get(key)
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string()
}

fn u64_field(data: &Value, key: &str) -> u64 {
    data.get(key).and_then(Value::as_u64).unwrap_or(0)
}
