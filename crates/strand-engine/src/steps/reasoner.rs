//! Bounded multi-turn model conversation with tool use.

use serde::Deserialize;
use serde_json::json;
use tokio::sync::RwLock;
use tracing::{debug, error, warn};

use strand_core::config::EngineConfig;
use strand_core::error::{Result, StrandError};
use strand_core::types::{ChatMessage, ChatRequest, EventKind, ToolCall, ToolDefinition};
use strand_core::workflow::StepDefinition;
use strand_llm::ProviderRegistry;
use strand_tools::ToolRegistry;

use super::{parse_config, required, tool_input, StepContext};
use crate::state::RunState;
use crate::template;

#[derive(Debug, Deserialize)]
struct ReasonerConfig {
    #[serde(default)]
    model: Option<String>,
    #[serde(default, alias = "systemPrompt")]
    system_prompt: String,
    #[serde(default)]
    prompt: String,
    #[serde(default)]
    tools: Vec<String>,
    #[serde(default, alias = "maxTurns")]
    max_turns: Option<usize>,
}

/// Turn budget: explicit value or the configured default, raised to the
/// tool floor when tools are available (one turn cannot both call a tool
/// and answer).
pub(crate) fn effective_max_turns(
    requested: Option<usize>,
    has_tools: bool,
    limits: &EngineConfig,
) -> usize {
    let base = match requested {
        Some(n) if n > 0 => n,
        _ => limits.default_max_turns.max(1),
    };
    if has_tools && base < 2 {
        limits.tool_turns_floor.max(2)
    } else {
        base
    }
}

pub async fn execute(
    step: &StepDefinition,
    state: &RunState,
    providers: &RwLock<ProviderRegistry>,
    tools: &RwLock<ToolRegistry>,
    limits: &EngineConfig,
    ctx: &StepContext,
) -> Result<serde_json::Value> {
    let config: ReasonerConfig = parse_config(step)?;
    let model_id = required(config.model, "model")?;
    let (provider, model) = providers.read().await.resolve(&model_id)?;

    let mut messages = Vec::new();
    if !config.system_prompt.is_empty() {
        messages.push(ChatMessage::system(template::resolve(
            &config.system_prompt,
            state,
        )));
    }
    if !config.prompt.is_empty() {
        messages.push(ChatMessage::user(template::resolve(&config.prompt, state)));
    }

    let tool_defs = resolve_tools(&step.id, &config.tools, tools).await;
    let max_turns = effective_max_turns(config.max_turns, !tool_defs.is_empty(), limits);
    debug!(step_id = %step.id, model = %model_id, tools = tool_defs.len(), max_turns, "Starting reasoner");

    for turn in 0..max_turns {
        if ctx.cancel.is_cancelled() {
            return Err(StrandError::Cancelled.in_turn(turn));
        }

        ctx.events.emit_json(
            &step.id,
            EventKind::ModelRequest,
            json!({ "turn": turn, "model": model_id }),
        );

        let request = ChatRequest {
            model: model.clone(),
            messages: messages.clone(),
            tools: tool_defs.clone(),
        };
        let response = tokio::select! {
            result = provider.chat_completion(request) => result.map_err(|e| e.in_turn(turn))?,
            _ = ctx.cancel.cancelled() => return Err(StrandError::Cancelled.in_turn(turn)),
        };

        ctx.events.emit_json(
            &step.id,
            EventKind::ModelResponse,
            json!({
                "turn": turn,
                "content": response.content,
                "tool_calls": response.tool_calls,
            }),
        );

        if response.tool_calls.is_empty() {
            return Ok(serde_json::Value::String(response.content));
        }

        debug!(step_id = %step.id, turn, calls = response.tool_calls.len(), "Model requested tools");
        messages.push(ChatMessage::assistant_with_tools(
            response.content,
            response.tool_calls.clone(),
        ));

        for call in &response.tool_calls {
            let result = run_tool_call(&step.id, call, tools, ctx).await;
            messages.push(ChatMessage::tool_result(call.id.clone(), result));
        }
    }

    Err(StrandError::MaxTurnsExceeded(max_turns).in_turn(max_turns - 1))
}

/// Look up tool definitions, dropping names the registry does not know.
async fn resolve_tools(
    step_id: &str,
    names: &[String],
    tools: &RwLock<ToolRegistry>,
) -> Vec<ToolDefinition> {
    let registry = tools.read().await;
    names
        .iter()
        .filter_map(|name| match registry.describe(name) {
            Ok(def) => Some(def),
            Err(e) => {
                warn!(step_id = %step_id, tool = %name, error = %e, "Skipping unavailable tool");
                None
            }
        })
        .collect()
}

/// Execute one requested tool call. Failures become conversation text.
async fn run_tool_call(
    step_id: &str,
    call: &ToolCall,
    tools: &RwLock<ToolRegistry>,
    ctx: &StepContext,
) -> String {
    let args = parse_arguments(&call.arguments);
    ctx.events.emit_json(
        step_id,
        EventKind::ToolCall,
        json!({ "tool": call.name, "args": args }),
    );

    let prepared = tools.read().await.prepare(&call.name);
    let outcome = match prepared {
        Ok(tool) => tokio::select! {
            result = tool.execute(args, ctx.tool_context()) => result,
            _ = ctx.cancel.cancelled() => Err(StrandError::Cancelled),
        },
        Err(e) => Err(e),
    };
    let result = match outcome {
        Ok(output) => output,
        Err(e) => {
            error!(step_id = %step_id, tool = %call.name, error = %e, "Tool execution failed");
            format!("Error: {}", e)
        }
    };

    ctx.events.emit_json(
        step_id,
        EventKind::ToolResult,
        json!({ "tool": call.name, "result": result }),
    );
    result
}

fn parse_arguments(raw: &str) -> serde_json::Value {
    if raw.trim().is_empty() {
        serde_json::Value::Object(serde_json::Map::new())
    } else {
        tool_input(raw)
    }
}
