use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Prefix of shared-state keys that are not step outputs.
pub const RESERVED_PREFIX: &str = "__";

/// Prefix of the shared-state key holding a step's user-supplied input.
pub const INPUT_PREFIX: &str = "__input__";

/// Shared-state key holding an explicit message for delegate steps.
pub const DELEGATE_MESSAGE_KEY: &str = "__delegate_message__";

/// State key under which the user input for `step_id` is stored.
pub fn input_key(step_id: &str) -> String {
    format!("{}{}", INPUT_PREFIX, step_id)
}

/// Whether a shared-state key is reserved (never a step output).
pub fn is_reserved_key(key: &str) -> bool {
    key.starts_with(RESERVED_PREFIX)
}

/// Unique run session identifier.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn new() -> Self {
        Self(format!("sess-{}", Uuid::new_v4().simple()))
    }

    pub fn from_string(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Generate a random id with the given prefix, e.g. `ev-3f2a...`.
pub fn generate_id(prefix: &str) -> String {
    let raw = Uuid::new_v4().simple().to_string();
    format!("{}-{}", prefix, &raw[..16])
}

/// Role in a model conversation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    /// Raw JSON arguments as produced by the model.
    pub arguments: String,
}

/// A chat message in a reasoner conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    pub fn system(text: impl Into<String>) -> Self {
        Self::plain(Role::System, text)
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::plain(Role::User, text)
    }

    /// Assistant turn that requested tool calls.
    pub fn assistant_with_tools(text: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            role: Role::Assistant,
            content: text.into(),
            tool_calls,
            tool_call_id: None,
        }
    }

    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: Some(tool_call_id.into()),
        }
    }

    fn plain(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            content: text.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }
}

/// Tool specification sent to the model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

/// Chat-completion request handed to a model provider.
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,
}

/// Chat-completion response from a model provider.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ChatResponse {
    pub content: String,
    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default)]
    pub finish_reason: String,
}

impl ChatResponse {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            tool_calls: Vec::new(),
            finish_reason: "stop".into(),
        }
    }

    pub fn with_tool_calls(tool_calls: Vec<ToolCall>) -> Self {
        Self {
            content: String::new(),
            tool_calls,
            finish_reason: "tool_calls".into(),
        }
    }
}

/// Lifecycle status of a step within one run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Pending,
    Running,
    Completed,
    Error,
    Skipped,
    /// Paused on an external signal (e.g. approval).
    Waiting,
}

impl StepStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Error | Self::Skipped)
    }

    /// Whether dependents of a step in this status must be skipped.
    pub fn blocks_dependents(self) -> bool {
        matches!(self, Self::Error | Self::Skipped)
    }
}

/// Kind of a progress event.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum EventKind {
    StepStarted,
    StepCompleted,
    StepError,
    StepSkipped,
    StepWaiting,
    ModelRequest,
    ModelResponse,
    ToolCall,
    ToolResult,
    DelegateSending,
    DelegateReceived,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StepStarted => "step-started",
            Self::StepCompleted => "step-completed",
            Self::StepError => "step-error",
            Self::StepSkipped => "step-skipped",
            Self::StepWaiting => "step-waiting",
            Self::ModelRequest => "model-request",
            Self::ModelResponse => "model-response",
            Self::ToolCall => "tool-call",
            Self::ToolResult => "tool-result",
            Self::DelegateSending => "delegate-sending",
            Self::DelegateReceived => "delegate-received",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A progress event emitted during a run. Immutable once emitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowEvent {
    pub id: String,
    pub step_id: String,
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub payload: serde_json::Map<String, serde_json::Value>,
    pub timestamp: DateTime<Utc>,
}

impl WorkflowEvent {
    pub fn new(
        step_id: impl Into<String>,
        kind: EventKind,
        payload: serde_json::Map<String, serde_json::Value>,
    ) -> Self {
        Self {
            id: generate_id("ev"),
            step_id: step_id.into(),
            kind,
            payload,
            timestamp: Utc::now(),
        }
    }
}

/// Terminal outcome of one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    pub session_id: SessionId,
    /// Final shared state, reserved keys removed.
    pub state: HashMap<String, serde_json::Value>,
    /// Terminal status of every step.
    pub steps: HashMap<String, StepStatus>,
}

impl RunResult {
    /// Ids of steps that ended in error, sorted.
    pub fn failed_steps(&self) -> Vec<&str> {
        let mut failed: Vec<&str> = self
            .steps
            .iter()
            .filter(|(_, s)| **s == StepStatus::Error)
            .map(|(id, _)| id.as_str())
            .collect();
        failed.sort_unstable();
        failed
    }

    /// Every step reached a terminal status and none errored.
    pub fn succeeded(&self) -> bool {
        self.steps
            .values()
            .all(|s| s.is_terminal() && *s != StepStatus::Error)
    }
}

/// Render a JSON value the way templates and aggregators see it:
/// strings verbatim, everything else as compact JSON.
pub fn value_to_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_kind_wire_names() {
        assert_eq!(EventKind::StepStarted.as_str(), "step-started");
        assert_eq!(
            serde_json::to_value(EventKind::DelegateReceived).unwrap(),
            serde_json::json!("delegate-received")
        );
    }

    #[test]
    fn reserved_keys() {
        assert_eq!(input_key("topic"), "__input__topic");
        assert!(is_reserved_key(&input_key("topic")));
        assert!(is_reserved_key(DELEGATE_MESSAGE_KEY));
        assert!(!is_reserved_key("topic"));
    }

    #[test]
    fn status_blocking() {
        assert!(StepStatus::Error.blocks_dependents());
        assert!(StepStatus::Skipped.blocks_dependents());
        assert!(!StepStatus::Completed.blocks_dependents());
        assert!(!StepStatus::Waiting.is_terminal());
    }

    #[test]
    fn generated_ids_have_prefix() {
        let id = generate_id("ev");
        assert!(id.starts_with("ev-"));
        assert_eq!(id.len(), 19);
    }
}
