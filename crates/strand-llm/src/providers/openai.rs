use std::collections::HashMap;

use futures::future::BoxFuture;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use strand_core::config::ProviderConfig;
use strand_core::error::{Result, StrandError};
use strand_core::traits::ModelProvider;
use strand_core::types::*;

const OPENAI_API_URL: &str = "https://api.openai.com/v1";

/// OpenAI-compatible provider. Works with OpenAI, Ollama, vLLM, Groq, OpenRouter, etc.
pub struct OpenAiProvider {
    name: String,
    http: Client,
    base_url: String,
    api_key: Option<String>,
    extra_headers: HashMap<String, String>,
}

impl OpenAiProvider {
    pub fn new(name: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            http: Client::new(),
            base_url: base_url.into(),
            api_key: None,
            extra_headers: HashMap::new(),
        }
    }

    pub fn from_config(name: &str, config: &ProviderConfig) -> Self {
        let base_url = if config.base_url.is_empty() {
            OPENAI_API_URL.to_string()
        } else {
            config.base_url.clone()
        };
        Self {
            name: name.to_string(),
            http: Client::new(),
            base_url,
            api_key: config.api_key.clone(),
            extra_headers: config.extra_headers.clone(),
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    fn endpoint(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        if base.ends_with("/chat/completions") {
            base.to_string()
        } else {
            format!("{}/chat/completions", base)
        }
    }
}

// Request types
#[derive(Serialize)]
struct OaiRequest {
    model: String,
    messages: Vec<OaiMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<OaiTool>,
}

#[derive(Serialize)]
pub(crate) struct OaiMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<OaiToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub(crate) struct OaiToolCall {
    #[serde(default)]
    id: String,
    #[serde(default = "function_type")]
    r#type: String,
    function: OaiFunction,
}

fn function_type() -> String {
    "function".to_string()
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub(crate) struct OaiFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Serialize)]
pub(crate) struct OaiTool {
    r#type: String,
    function: OaiToolDef,
}

#[derive(Serialize)]
pub(crate) struct OaiToolDef {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

// Response types
#[derive(Deserialize, Debug)]
struct OaiResponse {
    #[serde(default)]
    choices: Vec<OaiChoice>,
}

#[derive(Deserialize, Debug)]
struct OaiChoice {
    message: OaiResponseMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize, Debug)]
struct OaiResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<OaiToolCall>,
}

pub(crate) fn convert_tools(tools: &[ToolDefinition]) -> Vec<OaiTool> {
    tools
        .iter()
        .map(|t| OaiTool {
            r#type: "function".to_string(),
            function: OaiToolDef {
                name: t.name.clone(),
                description: t.description.clone(),
                parameters: t.input_schema.clone(),
            },
        })
        .collect()
}

pub(crate) fn convert_messages(messages: Vec<ChatMessage>) -> Vec<OaiMessage> {
    messages
        .into_iter()
        .map(|msg| match msg.role {
            Role::System | Role::User => OaiMessage {
                role: if msg.role == Role::System { "system" } else { "user" }.to_string(),
                content: Some(msg.content),
                tool_calls: None,
                tool_call_id: None,
            },
            Role::Assistant if msg.tool_calls.is_empty() => OaiMessage {
                role: "assistant".to_string(),
                content: Some(msg.content),
                tool_calls: None,
                tool_call_id: None,
            },
            Role::Assistant => {
                let calls = msg
                    .tool_calls
                    .into_iter()
                    .map(|tc| OaiToolCall {
                        id: tc.id,
                        r#type: function_type(),
                        function: OaiFunction {
                            name: tc.name,
                            arguments: tc.arguments,
                        },
                    })
                    .collect();
                OaiMessage {
                    role: "assistant".to_string(),
                    content: if msg.content.is_empty() {
                        None
                    } else {
                        Some(msg.content)
                    },
                    tool_calls: Some(calls),
                    tool_call_id: None,
                }
            }
            Role::Tool => OaiMessage {
                role: "tool".to_string(),
                content: Some(msg.content),
                tool_calls: None,
                tool_call_id: msg.tool_call_id,
            },
        })
        .collect()
}

fn convert_response(response: OaiResponse) -> Result<ChatResponse> {
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| StrandError::ModelRequest("response contained no choices".into()))?;

    Ok(ChatResponse {
        content: choice.message.content.unwrap_or_default(),
        tool_calls: choice
            .message
            .tool_calls
            .into_iter()
            .map(|tc| ToolCall {
                id: tc.id,
                name: tc.function.name,
                arguments: tc.function.arguments,
            })
            .collect(),
        finish_reason: choice.finish_reason.unwrap_or_default(),
    })
}

impl ModelProvider for OpenAiProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn chat_completion(&self, request: ChatRequest) -> BoxFuture<'_, Result<ChatResponse>> {
        Box::pin(async move {
            let body = OaiRequest {
                tools: convert_tools(&request.tools),
                messages: convert_messages(request.messages),
                model: request.model,
                stream: false,
            };

            debug!(provider = %self.name, model = %body.model, messages = body.messages.len(), "Sending chat completion");

            let mut req = self.http.post(self.endpoint()).json(&body);

            if let Some(api_key) = &self.api_key {
                req = req.header("Authorization", format!("Bearer {}", api_key));
            }

            for (k, v) in &self.extra_headers {
                req = req.header(k.as_str(), v.as_str());
            }

            let response = req
                .send()
                .await
                .map_err(|e| StrandError::ModelRequest(e.to_string()))?;

            if !response.status().is_success() {
                let status = response.status();
                let body = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "unknown".to_string());
                return Err(StrandError::ModelRequest(format!("HTTP {}: {}", status, body)));
            }

            let parsed: OaiResponse = response
                .json()
                .await
                .map_err(|e| StrandError::ModelRequest(format!("invalid response: {}", e)))?;

            convert_response(parsed)
        })
    }
}
