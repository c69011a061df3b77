//! Mocks shared by strand tests: a scripted model provider and simple tools.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;

use strand_core::error::{Result, StrandError};
use strand_core::traits::{ModelProvider, Tool, ToolContext};
use strand_core::types::{value_to_text, ChatRequest, ChatResponse, ToolCall};

enum Scripted {
    Reply(ChatResponse),
    Fail(String),
}

#[derive(Default)]
struct Script {
    queue: VecDeque<Scripted>,
    fallback: Option<ChatResponse>,
    requests: Vec<ChatRequest>,
}

/// Model provider that replays queued responses and records every request.
///
/// Clones share the same script, so a test can keep a handle after
/// registering the provider.
#[derive(Clone)]
pub struct ScriptedProvider {
    name: String,
    script: Arc<Mutex<Script>>,
}

impl ScriptedProvider {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            script: Arc::new(Mutex::new(Script::default())),
        }
    }

    /// Provider that answers every request with `response`.
    pub fn always(name: impl Into<String>, response: ChatResponse) -> Self {
        let provider = Self::new(name);
        provider.lock().fallback = Some(response);
        provider
    }

    pub fn reply(self, response: ChatResponse) -> Self {
        self.lock().queue.push_back(Scripted::Reply(response));
        self
    }

    pub fn reply_text(self, text: &str) -> Self {
        self.reply(ChatResponse::text(text))
    }

    /// Queue a single tool call with JSON arguments.
    pub fn reply_tool_call(self, id: &str, tool: &str, arguments: serde_json::Value) -> Self {
        self.reply(ChatResponse::with_tool_calls(vec![ToolCall {
            id: id.to_string(),
            name: tool.to_string(),
            arguments: arguments.to_string(),
        }]))
    }

    /// Queue a failed request.
    pub fn fail(self, message: &str) -> Self {
        self.lock().queue.push_back(Scripted::Fail(message.to_string()));
        self
    }

    /// Requests received so far.
    pub fn requests(&self) -> Vec<ChatRequest> {
        self.lock().requests.clone()
    }

    pub fn call_count(&self) -> usize {
        self.lock().requests.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Script> {
        match self.script.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl ModelProvider for ScriptedProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn chat_completion(&self, request: ChatRequest) -> BoxFuture<'_, Result<ChatResponse>> {
        let outcome = {
            let mut script = self.lock();
            script.requests.push(request);
            match script.queue.pop_front() {
                Some(Scripted::Reply(r)) => Ok(r),
                Some(Scripted::Fail(msg)) => Err(StrandError::ModelRequest(msg)),
                None => script
                    .fallback
                    .clone()
                    .ok_or_else(|| StrandError::ModelRequest("script exhausted".into())),
            }
        };
        Box::pin(async move { outcome })
    }
}

/// Tool that returns its input as text.
pub struct EchoTool;

impl Tool for EchoTool {
    fn name(&self) -> &str {
        "echo"
    }

    fn description(&self) -> &str {
        "Echo the input back"
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": { "text": { "type": "string" } }
        })
    }

    fn execute(&self, input: serde_json::Value, _ctx: ToolContext) -> BoxFuture<'_, Result<String>> {
        Box::pin(async move {
            Ok(match input.get("text") {
                Some(text) => value_to_text(text),
                None => value_to_text(&input),
            })
        })
    }
}

/// Tool that always fails with the given message.
pub struct FailingTool {
    pub message: String,
}

impl FailingTool {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl Tool for FailingTool {
    fn name(&self) -> &str {
        "fail"
    }

    fn description(&self) -> &str {
        "Always fails"
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({ "type": "object" })
    }

    fn execute(&self, _input: serde_json::Value, _ctx: ToolContext) -> BoxFuture<'_, Result<String>> {
        Box::pin(async move {
            Err(StrandError::ToolExecution {
                tool: "fail".into(),
                message: self.message.clone(),
            })
        })
    }
}
