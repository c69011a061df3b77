mod common;

use serde_json::json;

use strand_core::types::{ChatResponse, Role, StepStatus, ToolCall};
use strand_core::workflow::{EdgeDefinition, StepDefinition, StepKind, WorkflowDefinition};
use strand_test_utils::ScriptedProvider;

use common::{inputs, of, run, runner, trace, MODEL};

fn single(step: StepDefinition) -> WorkflowDefinition {
    WorkflowDefinition::new("reasoner").step(step)
}

fn reasoner(id: &str) -> StepDefinition {
    StepDefinition::new(id, StepKind::Reasoner).with("model", json!(MODEL))
}

#[tokio::test]
async fn test_plain_answer_in_one_turn() {
    let provider = ScriptedProvider::new("mock").reply_text("42");
    let runner = runner(provider.clone());
    let wf = WorkflowDefinition::new("qa")
        .step(StepDefinition::new("role", StepKind::Intake))
        .step(
            reasoner("r")
                .with("system_prompt", json!("You are a {{role}}"))
                .with("prompt", json!("What is the answer?"))
                .with("max_turns", json!(1)),
        )
        .edge(EdgeDefinition::new("role", "r"));

    let (events, result) = run(&runner, &wf, inputs(&[("role", "librarian")])).await;

    assert_eq!(result.state["r"], json!("42"));
    let request = &provider.requests()[0];
    assert_eq!(request.messages.len(), 2);
    assert_eq!(request.messages[0].role, Role::System);
    assert_eq!(request.messages[0].content, "You are a librarian");
    assert_eq!(request.messages[1].role, Role::User);
    assert!(request.tools.is_empty());

    let req = &of(&events, "r", "model-request")[0].payload;
    assert_eq!(req["turn"], json!(0));
    assert_eq!(req["model"], json!(MODEL));
    let resp = &of(&events, "r", "model-response")[0].payload;
    assert_eq!(resp["content"], json!("42"));
    assert_eq!(resp["tool_calls"], json!([]));
}

#[tokio::test]
async fn test_tools_raise_single_turn_budget() {
    let provider = ScriptedProvider::new("mock")
        .reply_tool_call("c1", "echo", json!({"text": "hi"}))
        .reply_text("final");
    let runner = runner(provider.clone());
    let wf = single(
        reasoner("r")
            .with("prompt", json!("use the tool"))
            .with("tools", json!(["echo"]))
            .with("max_turns", json!(1)),
    );

    let (events, result) = run(&runner, &wf, Default::default()).await;

    assert_eq!(result.state["r"], json!("final"));
    assert_eq!(provider.call_count(), 2);

    let requests = provider.requests();
    assert_eq!(requests[0].tools.len(), 1);
    assert_eq!(requests[0].tools[0].name, "echo");
    let second = &requests[1].messages;
    assert_eq!(second.len(), 3);
    assert_eq!(second[1].role, Role::Assistant);
    assert_eq!(second[1].tool_calls[0].id, "c1");
    assert_eq!(second[2].role, Role::Tool);
    assert_eq!(second[2].tool_call_id.as_deref(), Some("c1"));
    assert_eq!(second[2].content, "hi");

    let kinds: Vec<&str> = trace(&events).into_iter().map(|(_, k)| k).collect();
    assert_eq!(
        kinds,
        vec![
            "step-started",
            "model-request",
            "model-response",
            "tool-call",
            "tool-result",
            "model-request",
            "model-response",
            "step-completed",
        ]
    );
    let call = &of(&events, "r", "tool-call")[0].payload;
    assert_eq!(call["tool"], json!("echo"));
    assert_eq!(call["args"], json!({"text": "hi"}));
    assert_eq!(of(&events, "r", "tool-result")[0].payload["result"], json!("hi"));
    assert_eq!(of(&events, "r", "model-request")[1].payload["turn"], json!(1));
}

#[tokio::test]
async fn test_endless_tool_calls_exceed_max_turns() {
    let provider = ScriptedProvider::always(
        "mock",
        ChatResponse::with_tool_calls(vec![ToolCall {
            id: "loop".into(),
            name: "echo".into(),
            arguments: r#"{"text": "again"}"#.into(),
        }]),
    );
    let runner = runner(provider.clone());
    let wf = single(reasoner("r").with("prompt", json!("go")).with("tools", json!(["echo"])));

    let (events, result) = run(&runner, &wf, Default::default()).await;

    assert_eq!(provider.call_count(), 10);
    assert_eq!(result.steps["r"], StepStatus::Error);
    assert_eq!(
        of(&events, "r", "step-error")[0].payload["error"],
        json!("step r: turn 9: exceeded max turns (10)")
    );
}

#[tokio::test]
async fn test_tool_failure_becomes_conversation_text() {
    let provider = ScriptedProvider::new("mock")
        .reply_tool_call("c1", "fail", json!({}))
        .reply_tool_call("c2", "ghost", json!({}))
        .reply_text("recovered");
    let runner = runner(provider.clone());
    let wf = single(
        reasoner("r")
            .with("prompt", json!("try"))
            .with("tools", json!(["fail"]))
            .with("maxTurns", json!(5)),
    );

    let (events, result) = run(&runner, &wf, Default::default()).await;

    assert_eq!(result.state["r"], json!("recovered"));
    let last = provider.requests().pop().unwrap().messages;
    assert_eq!(last[2].content, "Error: tool execution failed: fail: boom");
    assert_eq!(last[4].content, "Error: tool not found: ghost");
    assert_eq!(
        of(&events, "r", "tool-result")[0].payload["result"],
        json!("Error: tool execution failed: fail: boom")
    );
}

#[tokio::test]
async fn test_unknown_configured_tools_are_dropped() {
    let provider = ScriptedProvider::new("mock").reply_text("plain");
    let runner = runner(provider.clone());
    let wf = single(
        reasoner("r")
            .with("prompt", json!("hi"))
            .with("tools", json!(["nonexistent"])),
    );

    let (_, result) = run(&runner, &wf, Default::default()).await;

    assert_eq!(result.state["r"], json!("plain"));
    assert!(provider.requests()[0].tools.is_empty());
}

#[tokio::test]
async fn test_configuration_and_provider_errors() {
    let provider = ScriptedProvider::new("mock").fail("HTTP 500: upstream");
    let runner = runner(provider);
    let wf = WorkflowDefinition::new("errors")
        .step(
            StepDefinition::new("unknown", StepKind::Reasoner)
                .with("model", json!("nowhere/x"))
                .with("prompt", json!("hi")),
        )
        .step(StepDefinition::new("nomodel", StepKind::Reasoner).with("prompt", json!("hi")))
        .step(reasoner("upstream").with("prompt", json!("hi")));

    let (events, _) = run(&runner, &wf, Default::default()).await;

    let error = |id: &str| of(&events, id, "step-error")[0].payload["error"].clone();
    assert_eq!(error("unknown"), json!("step unknown: unknown provider: nowhere"));
    assert_eq!(error("nomodel"), json!("step nomodel: missing required config: model"));
    assert_eq!(
        error("upstream"),
        json!("step upstream: turn 0: model request failed: HTTP 500: upstream")
    );
}
