#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use serde_json::Value;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use strand_a2a::DelegationClient;
use strand_core::error::Result;
use strand_core::traits::{Tool, ToolContext};
use strand_core::types::{RunResult, WorkflowEvent};
use strand_core::workflow::WorkflowDefinition;
use strand_engine::{Runner, StepExecutors};
use strand_llm::ProviderRegistry;
use strand_test_utils::{EchoTool, FailingTool, ScriptedProvider};
use strand_tools::ToolRegistry;

pub const MODEL: &str = "mock/test-model";

/// Tool that never finishes on its own.
pub struct SleepTool;

impl Tool for SleepTool {
    fn name(&self) -> &str {
        "sleep"
    }

    fn description(&self) -> &str {
        "Sleeps for an hour"
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({ "type": "object" })
    }

    fn timeout_secs(&self) -> u64 {
        7200
    }

    fn execute(&self, _input: Value, _ctx: ToolContext) -> BoxFuture<'_, Result<String>> {
        Box::pin(async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok("woke".into())
        })
    }
}

/// Runner over a `mock` provider and the echo, fail and sleep tools.
pub fn runner(provider: ScriptedProvider) -> Runner {
    let mut providers = ProviderRegistry::new();
    providers.register(provider);

    let mut tools = ToolRegistry::new();
    tools.register(EchoTool);
    tools.register(FailingTool::new("boom"));
    tools.register(SleepTool);

    let delegation = DelegationClient::new(Duration::from_secs(5)).expect("delegation client");
    Runner::new(StepExecutors::new(
        Arc::new(RwLock::new(providers)),
        Arc::new(RwLock::new(tools)),
        Arc::new(delegation),
    ))
}

pub fn inputs(pairs: &[(&str, &str)]) -> HashMap<String, Value> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
        .collect()
}

/// Run to completion, returning every event and the result.
pub async fn run(
    runner: &Runner,
    workflow: &WorkflowDefinition,
    inputs: HashMap<String, Value>,
) -> (Vec<WorkflowEvent>, RunResult) {
    let handle = runner
        .start(workflow, inputs, CancellationToken::new())
        .expect("start run");
    let (events, result) = handle.collect().await;
    (events, result.expect("run result"))
}

/// `(step_id, type)` pairs in emission order.
pub fn trace(events: &[WorkflowEvent]) -> Vec<(String, &'static str)> {
    events
        .iter()
        .map(|e| (e.step_id.clone(), e.kind.as_str()))
        .collect()
}

/// Events of one type for one step.
pub fn of<'a>(events: &'a [WorkflowEvent], step_id: &str, kind: &str) -> Vec<&'a WorkflowEvent> {
    events
        .iter()
        .filter(|e| e.step_id == step_id && e.kind.as_str() == kind)
        .collect()
}
