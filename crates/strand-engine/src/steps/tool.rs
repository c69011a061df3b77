use serde::Deserialize;
use serde_json::json;
use tokio::sync::RwLock;
use tracing::debug;

use strand_core::error::{Result, StrandError};
use strand_core::types::EventKind;
use strand_core::workflow::StepDefinition;
use strand_tools::ToolRegistry;

use super::{parse_config, required, tool_input, StepContext};
use crate::state::RunState;
use crate::template;

#[derive(Debug, Deserialize)]
struct ToolStepConfig {
    #[serde(default)]
    tool: Option<String>,
    #[serde(default)]
    input: String,
}

/// Invoke one registered tool with template-resolved input.
pub async fn execute(
    step: &StepDefinition,
    state: &RunState,
    tools: &RwLock<ToolRegistry>,
    ctx: &StepContext,
) -> Result<serde_json::Value> {
    let config: ToolStepConfig = parse_config(step)?;
    let name = required(config.tool, "tool")?;
    let input = tool_input(&template::resolve(&config.input, state));

    debug!(step_id = %step.id, tool = %name, "Running tool step");
    ctx.events.emit_json(
        &step.id,
        EventKind::ToolCall,
        json!({ "tool": name, "args": input }),
    );

    let prepared = tools.read().await.prepare(&name)?;
    let result = tokio::select! {
        result = prepared.execute(input, ctx.tool_context()) => result?,
        _ = ctx.cancel.cancelled() => return Err(StrandError::Cancelled),
    };

    ctx.events.emit_json(
        &step.id,
        EventKind::ToolResult,
        json!({ "tool": name, "result": result }),
    );
    Ok(serde_json::Value::String(result))
}
