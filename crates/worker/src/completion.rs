//! Detection of which upstream event types carry the turn's final assistant message.
//!
//! The upstream agent service does not formally document a closed set of "this is the last
//! word" event types, so the allow-list is configurable rather than hard-coded.

use std::collections::HashSet;

use serde_json::Value;

#[derive(Debug, Clone)]
pub struct CompletionPolicy {
    completion_event_types: HashSet<String>,
}

impl CompletionPolicy {
    pub fn new(completion_event_types: impl IntoIterator<Item = String>) -> Self {
        Self {
            completion_event_types: completion_event_types.into_iter().collect(),
        }
    }

    pub fn is_completion_event(&self, event_type: &str) -> bool {
        self.completion_event_types.contains(event_type)
    }

    /// Extracts the textual payload of a completion-bearing event, if any.
    pub fn extract_output(&self, payload: &Value) -> Option<String> {
        payload.get("content").and_then(Value::as_str).map(str::to_string)
    }
}

impl Default for CompletionPolicy {
    fn default() -> Self {
        Self::new(["assistant.message".to_string()])
    }
}
