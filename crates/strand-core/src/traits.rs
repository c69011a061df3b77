use futures::future::BoxFuture;

use crate::error::Result;
use crate::types::*;

/// Model provider: one chat-completion round trip.
pub trait ModelProvider: Send + Sync + 'static {
    /// Registry name (the part of a model id before the first `/`).
    fn name(&self) -> &str;

    /// Send the accumulated conversation and return the model's reply.
    fn chat_completion(&self, request: ChatRequest) -> BoxFuture<'_, Result<ChatResponse>>;
}

/// Context handed to a tool invocation.
#[derive(Debug, Clone)]
pub struct ToolContext {
    pub session_id: SessionId,
    pub step_id: String,
}

impl ToolContext {
    pub fn new(session_id: SessionId, step_id: impl Into<String>) -> Self {
        Self {
            session_id,
            step_id: step_id.into(),
        }
    }
}

/// Named capability invoked by tool steps and reasoner turns.
pub trait Tool: Send + Sync + 'static {
    /// Tool name (used in model tool calls and step config).
    fn name(&self) -> &str;

    /// Human-readable description.
    fn description(&self) -> &str;

    /// JSON Schema for tool input.
    fn input_schema(&self) -> serde_json::Value;

    /// Execute the tool with the given input.
    fn execute(
        &self,
        input: serde_json::Value,
        ctx: ToolContext,
    ) -> BoxFuture<'_, Result<String>>;

    /// Timeout in seconds for this tool.
    fn timeout_secs(&self) -> u64 {
        30
    }
}
