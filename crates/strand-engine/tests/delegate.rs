mod common;

use serde_json::json;
use wiremock::matchers::{body_partial_json, method};
use wiremock::{Mock, MockServer, ResponseTemplate};

use strand_core::types::StepStatus;
use strand_core::workflow::{StepDefinition, StepKind, WorkflowDefinition};
use strand_test_utils::ScriptedProvider;

use common::{inputs, of, run, runner};

fn delegate_to(server: &MockServer) -> WorkflowDefinition {
    WorkflowDefinition::new("delegate").step(
        StepDefinition::new("remote", StepKind::Delegate).with("endpoint_url", json!(server.uri())),
    )
}

fn task(status: &str, artifacts: serde_json::Value) -> serde_json::Value {
    json!({
        "jsonrpc": "2.0",
        "id": 1,
        "result": {"id": "task-7", "status": status, "artifacts": artifacts}
    })
}

#[tokio::test]
async fn test_delegate_returns_artifact_text() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({
            "method": "sendMessage",
            "params": {"message": {"role": "user", "parts": [{"type": "text", "text": "summarize this"}]}}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(task(
            "completed",
            json!([{"parts": [{"type": "text", "text": "summary"}], "index": 0}]),
        )))
        .expect(1)
        .mount(&server)
        .await;

    let runner = runner(ScriptedProvider::new("mock"));
    let (events, result) = run(&runner, &delegate_to(&server), inputs(&[("remote", "summarize this")])).await;

    assert_eq!(result.state["remote"], json!("summary"));
    let sending = &of(&events, "remote", "delegate-sending")[0].payload;
    assert_eq!(sending["endpoint"], json!(server.uri()));
    assert_eq!(sending["message"], json!("summarize this"));
    let received = &of(&events, "remote", "delegate-received")[0].payload;
    assert_eq!(received["task_id"], json!("task-7"));
    assert_eq!(received["status"], json!("completed"));
}

#[tokio::test]
async fn test_delegate_message_key_and_data_artifact() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({
            "params": {"message": {"parts": [{"type": "text", "text": "explicit"}]}}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(task(
            "completed",
            json!([{"parts": [{"type": "data", "data": {"score": 9}}], "index": 0}]),
        )))
        .expect(1)
        .mount(&server)
        .await;

    let runner = runner(ScriptedProvider::new("mock"));
    let (_, result) = run(
        &runner,
        &delegate_to(&server),
        inputs(&[("remote", "ignored"), ("__delegate_message__", "explicit")]),
    )
    .await;

    assert_eq!(result.state["remote"], json!(r#"{"score":9}"#));
}

#[tokio::test]
async fn test_delegate_without_artifacts() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({
            "params": {"message": {"parts": [{"type": "text", "text": "Execute step remote"}]}}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(task("completed", json!([]))))
        .mount(&server)
        .await;

    let runner = runner(ScriptedProvider::new("mock"));
    let (_, result) = run(&runner, &delegate_to(&server), Default::default()).await;

    assert_eq!(result.state["remote"], json!("no output"));
}

#[tokio::test]
async fn test_delegate_failures() {
    let failed = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(task("failed", json!([]))))
        .mount(&failed)
        .await;

    let rpc = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "error": {"code": -32600, "message": "Invalid Request"}
        })))
        .mount(&rpc)
        .await;

    let wf = WorkflowDefinition::new("failures")
        .step(StepDefinition::new("a", StepKind::Delegate).with("endpointUrl", json!(failed.uri())))
        .step(StepDefinition::new("b", StepKind::Delegate).with("endpoint_url", json!(rpc.uri())))
        .step(StepDefinition::new("c", StepKind::Delegate));

    let runner = runner(ScriptedProvider::new("mock"));
    let (events, result) = run(&runner, &wf, Default::default()).await;

    let error = |id: &str| of(&events, id, "step-error")[0].payload["error"].clone();
    assert_eq!(
        error("a"),
        json!(format!("step a: remote agent {} reported failure", failed.uri()))
    );
    assert_eq!(error("b"), json!("step b: a2a error -32600: Invalid Request"));
    assert_eq!(error("c"), json!("step c: missing required config: endpoint_url"));
    assert!(result.steps.values().all(|s| *s == StepStatus::Error));
}
