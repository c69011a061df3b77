use futures::future::BoxFuture;

use strand_core::error::Result;
use strand_core::traits::{Tool, ToolContext};

/// Returns the current UTC time in RFC 3339 form.
pub struct CurrentTimeTool;

impl Tool for CurrentTimeTool {
    fn name(&self) -> &str {
        "current_time"
    }
    fn timeout_secs(&self) -> u64 {
        5
    }
    fn description(&self) -> &str {
        "Get the current date and time (UTC, RFC 3339)."
    }
    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({ "type": "object", "properties": {} })
    }
    fn execute(
        &self,
        _input: serde_json::Value,
        _ctx: ToolContext,
    ) -> BoxFuture<'_, Result<String>> {
        Box::pin(async move {
            Ok(chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true))
        })
    }
}
