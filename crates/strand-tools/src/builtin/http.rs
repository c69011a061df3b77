use std::collections::HashMap;
use std::time::Duration;

use futures::future::BoxFuture;
use serde::Deserialize;

use strand_core::error::{Result, StrandError};
use strand_core::traits::{Tool, ToolContext};

const MAX_BODY_BYTES: usize = 100 * 1024;
const ALLOWED_METHODS: &[&str] = &["GET", "POST", "PUT", "PATCH", "DELETE", "HEAD"];

pub struct HttpRequestTool;

#[derive(Deserialize)]
struct HttpRequestInput {
    url: String,
    #[serde(default = "default_method")]
    method: String,
    #[serde(default)]
    headers: HashMap<String, String>,
    #[serde(default)]
    body: Option<String>,
}

fn default_method() -> String {
    "GET".into()
}

impl HttpRequestInput {
    /// Accept either a JSON object or a bare URL string.
    fn parse(input: serde_json::Value) -> Result<Self> {
        match input {
            serde_json::Value::String(url) => Ok(Self {
                url: url.trim().to_string(),
                method: default_method(),
                headers: HashMap::new(),
                body: None,
            }),
            other => serde_json::from_value(other)
                .map_err(|e| StrandError::ToolValidation(e.to_string())),
        }
    }
}

fn execution_error(message: impl std::fmt::Display) -> StrandError {
    StrandError::ToolExecution {
        tool: "http_request".into(),
        message: message.to_string(),
    }
}

/// Truncate to at most `max` bytes on a char boundary.
fn truncate_body(body: &str, max: usize) -> String {
    if body.len() <= max {
        return body.to_string();
    }
    let mut end = max;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}\n... [truncated at {}KB]", &body[..end], max / 1024)
}

impl Tool for HttpRequestTool {
    fn name(&self) -> &str {
        "http_request"
    }
    fn timeout_secs(&self) -> u64 {
        60
    }
    fn description(&self) -> &str {
        "Make an HTTP request. Returns status, headers, and body."
    }
    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "url": { "type": "string" },
                "method": { "type": "string", "description": "GET, POST, PUT, PATCH, DELETE or HEAD (default: GET)" },
                "headers": { "type": "object", "description": "Request headers" },
                "body": { "type": "string", "description": "Request body" }
            },
            "required": ["url"]
        })
    }
    fn execute(
        &self,
        input: serde_json::Value,
        _ctx: ToolContext,
    ) -> BoxFuture<'_, Result<String>> {
        Box::pin(async move {
            let p = HttpRequestInput::parse(input)?;
            if p.url.is_empty() {
                return Err(StrandError::ToolValidation("url is required".into()));
            }
            let method_name = p.method.to_uppercase();
            if !ALLOWED_METHODS.contains(&method_name.as_str()) {
                return Err(StrandError::ToolValidation(format!(
                    "unsupported HTTP method: {:?}",
                    p.method
                )));
            }
            let method = method_name
                .parse::<reqwest::Method>()
                .map_err(|e| StrandError::ToolValidation(format!("Invalid method: {}", e)))?;

            let client = reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .map_err(execution_error)?;

            let mut req = client.request(method, &p.url);
            for (k, v) in &p.headers {
                req = req.header(k.as_str(), v.as_str());
            }
            if let Some(body) = p.body {
                req = req.body(body);
            }

            let resp = req.send().await.map_err(execution_error)?;
            let status = resp.status();
            let mut headers: Vec<String> = resp
                .headers()
                .iter()
                .map(|(k, v)| format!("{}: {}", k, v.to_str().unwrap_or("?")))
                .collect();
            headers.sort();
            let body = resp.text().await.unwrap_or_default();

            Ok(format!(
                "HTTP {} {}\n\n{}\n\n{}",
                status.as_u16(),
                status.canonical_reason().unwrap_or(""),
                headers.join("\n"),
                truncate_body(&body, MAX_BODY_BYTES)
            ))
        })
    }
}
