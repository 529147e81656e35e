//! Behavioral assertion API over recorded journeys
//!
//! Assertions express expectations over what the agent *did* - tools
//! invoked, files touched, gates passed - so tests survive refactors that
//! keep behavior intact. String matchers accept glob patterns
//! (`src/**/*.py`) wherever a pattern makes sense.

use glob::Pattern;
use serde_json::Value;

use sunwell_core::{AgentEvent, EventType};

use crate::journey::{EventRecorder, ToolCallRecord, ValidationRecord};

impl EventRecorder {
    /// All events captured in the current turn
    pub fn all_events(&self) -> Vec<AgentEvent> {
        self.with_current(|turn| turn.events.clone())
    }

    /// Events of one type in the current turn
    pub fn events_of_type(&self, event_type: EventType) -> Vec<AgentEvent> {
        self.with_current(|turn| {
            turn.events
                .iter()
                .filter(|e| e.event_type == event_type)
                .cloned()
                .collect()
        })
    }

    /// All tool calls in the current turn
    pub fn all_tool_calls(&self) -> Vec<ToolCallRecord> {
        self.with_current(|turn| turn.tool_calls.clone())
    }

    /// Tool calls for one tool
    pub fn get_tool_calls(&self, tool_name: &str) -> Vec<ToolCallRecord> {
        self.with_current(|turn| {
            turn.tool_calls
                .iter()
                .filter(|c| c.name == tool_name)
                .cloned()
                .collect()
        })
    }

    /// True if the tool was called at least once this turn
    pub fn has_tool_call(&self, tool_name: &str) -> bool {
        !self.get_tool_calls(tool_name).is_empty()
    }

    /// True if some call to `tool_name` matches every entry in
    /// `partial_args`
    ///
    /// String expectations support glob patterns; other values compare by
    /// equality. Keys absent from the expectation are ignored.
    pub fn tool_call_args_match(&self, tool_name: &str, partial_args: &Value) -> bool {
        let Some(expected) = partial_args.as_object() else {
            return false;
        };
        self.get_tool_calls(tool_name).iter().any(|call| {
            expected.iter().all(|(key, want)| {
                match call.arguments.get(key) {
                    Some(actual) => values_match(want, actual),
                    None => false,
                }
            })
        })
    }

    /// True if any recorded file change matches the glob (or exact path)
    pub fn has_file_change(&self, pattern: &str) -> bool {
        let matcher = Pattern::new(pattern).ok();
        self.with_current(|turn| {
            turn.file_changes.iter().any(|change| {
                change.path == pattern
                    || matcher
                        .as_ref()
                        .map(|m| m.matches(&change.path))
                        .unwrap_or(false)
            })
        })
    }

    /// True if a recorded file change for `path` contains every pattern
    pub fn file_contains(&self, path: &str, patterns: &[&str]) -> bool {
        self.with_current(|turn| {
            turn.file_changes
                .iter()
                .filter(|change| change.path == path)
                .filter_map(|change| change.content.as_deref())
                .any(|content| patterns.iter().all(|p| content.contains(p)))
        })
    }

    /// Concatenated output fragments for the current turn
    pub fn all_output(&self) -> String {
        self.with_current(|turn| turn.outputs.join("\n"))
    }

    /// True if the output contains every pattern
    pub fn output_contains(&self, patterns: &[&str], case_sensitive: bool) -> bool {
        let output = if case_sensitive {
            self.all_output()
        } else {
            self.all_output().to_lowercase()
        };
        patterns.iter().all(|pattern| {
            let needle = if case_sensitive {
                pattern.to_string()
            } else {
                pattern.to_lowercase()
            };
            output.contains(&needle)
        })
    }

    /// True if the output contains none of the patterns
    pub fn output_not_contains(&self, patterns: &[&str], case_sensitive: bool) -> bool {
        patterns
            .iter()
            .all(|pattern| !self.output_contains(&[pattern], case_sensitive))
    }

    /// True if any `error` event was recorded this turn
    pub fn has_error(&self) -> bool {
        self.with_current(|turn| !turn.errors.is_empty())
    }

    /// All validation results this turn
    pub fn all_validations(&self) -> Vec<ValidationRecord> {
        self.with_current(|turn| turn.validations.clone())
    }

    /// True if validation passed
    ///
    /// With a gate type: at least one gate of that type ran and none of
    /// that type failed. Without: at least one gate ran and none failed.
    pub fn validation_passed(&self, gate_type: Option<&str>) -> bool {
        let validations = self.all_validations();
        let relevant: Vec<&ValidationRecord> = validations
            .iter()
            .filter(|v| gate_type.map(|t| v.gate_type == t).unwrap_or(true))
            .collect();
        !relevant.is_empty() && relevant.iter().all(|v| v.passed)
    }

    /// True if any (matching) gate failed
    pub fn validation_failed(&self, gate_type: Option<&str>) -> bool {
        self.all_validations()
            .iter()
            .any(|v| !v.passed && gate_type.map(|t| v.gate_type == t).unwrap_or(true))
    }

    /// True if a reliability issue (optionally of one type) was flagged
    pub fn has_reliability_issue(&self, failure_type: Option<&str>) -> bool {
        self.with_current(|turn| {
            turn.reliability
                .iter()
                .any(|r| failure_type.map(|t| r.failure_type == t).unwrap_or(true))
        })
    }

    /// All signals extracted this turn
    pub fn all_signals(&self) -> Vec<crate::journey::SignalRecord> {
        self.with_current(|turn| turn.signals.clone())
    }

    /// The most recent plan selection this turn
    pub fn selected_plan(&self) -> Option<crate::journey::PlanRecord> {
        self.with_current(|turn| turn.plans.last().cloned())
    }

    /// Total tokens consumed this turn
    pub fn total_tokens(&self) -> u64 {
        self.with_current(|turn| {
            turn.model_metrics
                .iter()
                .map(|m| {
                    if m.total_tokens > 0 {
                        m.total_tokens
                    } else {
                        m.prompt_tokens + m.completion_tokens
                    }
                })
                .sum()
        })
    }
}

/// Compare an expected value against an actual one, glob-aware for strings
fn values_match(expected: &Value, actual: &Value) -> bool {
    match (expected, actual) {
        (Value::String(want), Value::String(have)) => {
            want == have
                || Pattern::new(want)
                    .map(|pattern| pattern.matches(have))
                    .unwrap_or(false)
        }
        _ => expected == actual,
    }
}
