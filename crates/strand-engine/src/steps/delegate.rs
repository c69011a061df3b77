use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use strand_a2a::{DelegationClient, Message, TaskStatus};
use strand_core::error::{Result, StrandError};
use strand_core::types::{input_key, EventKind, DELEGATE_MESSAGE_KEY};
use strand_core::workflow::StepDefinition;

use super::{parse_config, required, StepContext};
use crate::state::RunState;

#[derive(Debug, Deserialize)]
struct DelegateConfig {
    #[serde(default, alias = "endpointUrl")]
    endpoint_url: Option<String>,
}

/// Outbound text: explicit delegation message, else this step's input,
/// else a synthetic instruction.
pub(crate) fn outbound_text(step_id: &str, state: &RunState) -> String {
    state
        .get_text(DELEGATE_MESSAGE_KEY)
        .or_else(|| state.get_text(&input_key(step_id)))
        .unwrap_or_else(|| format!("Execute step {}", step_id))
}

/// Hand the step to a remote agent and return its flattened output.
pub async fn execute(
    step: &StepDefinition,
    state: &RunState,
    client: &DelegationClient,
    ctx: &StepContext,
) -> Result<serde_json::Value> {
    let config: DelegateConfig = parse_config(step)?;
    let endpoint = required(config.endpoint_url, "endpoint_url")?;
    let text = outbound_text(&step.id, state);

    ctx.events.emit_json(
        &step.id,
        EventKind::DelegateSending,
        json!({ "endpoint": endpoint, "message": text }),
    );
    debug!(step_id = %step.id, endpoint = %endpoint, "Delegating step");

    let task = tokio::select! {
        result = client.send_message(&endpoint, Message::user_text(text)) => result?,
        _ = ctx.cancel.cancelled() => return Err(StrandError::Cancelled),
    };

    ctx.events.emit_json(
        &step.id,
        EventKind::DelegateReceived,
        json!({ "task_id": task.id, "status": task.status }),
    );

    if task.status == TaskStatus::Failed {
        warn!(step_id = %step.id, task_id = %task.id, "Remote agent reported failure");
        return Err(StrandError::DelegateFailed(endpoint));
    }

    Ok(serde_json::Value::String(
        task.output_text().unwrap_or_else(|| "no output".to_string()),
    ))
}
