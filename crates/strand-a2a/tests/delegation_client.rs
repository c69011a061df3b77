use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{body_partial_json, method};
use wiremock::{Mock, MockServer, ResponseTemplate};

use strand_a2a::{DelegationClient, Message, TaskStatus};
use strand_core::StrandError;

fn client() -> DelegationClient {
    DelegationClient::new(Duration::from_secs(5)).unwrap()
}

#[tokio::test]
async fn test_send_message_success() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "sendMessage",
            "params": {
                "message": {"role": "user", "parts": [{"type": "text", "text": "hello"}]},
                "configuration": {"acceptedOutputModes": ["text/plain", "application/json"], "blocking": true}
            }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "result": {
                "id": "task-123",
                "status": "completed",
                "messages": [
                    {"role": "user", "parts": [{"type": "text", "text": "hello", "mimeType": "text/plain"}]},
                    {"role": "agent", "parts": [{"type": "text", "text": "world", "mimeType": "text/plain"}]}
                ],
                "artifacts": [{"parts": [{"type": "text", "text": "result text", "mimeType": "text/plain"}], "index": 0}]
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let task = client()
        .send_message(&server.uri(), Message::user_text("hello"))
        .await
        .unwrap();
    assert_eq!(task.id, "task-123");
    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.messages[1].role, "agent");
    assert_eq!(task.artifacts[0].first_text(), Some("result text"));
}

#[tokio::test]
async fn test_rpc_error_formatting() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "error": {"code": -32600, "message": "Invalid Request"}
        })))
        .mount(&server)
        .await;

    let err = client()
        .send_message(&server.uri(), Message::user_text("trigger error"))
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "a2a error -32600: Invalid Request");
}

#[tokio::test]
async fn test_rpc_error_body_on_http_error_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "jsonrpc": "2.0",
            "id": null,
            "error": {"code": -32700, "message": "Parse error"}
        })))
        .mount(&server)
        .await;

    let err = client()
        .send_message(&server.uri(), Message::user_text("x"))
        .await
        .unwrap_err();
    assert!(matches!(err, StrandError::Rpc { code: -32700, .. }));
}

#[tokio::test]
async fn test_http_error_without_rpc_body_is_transport() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
        .mount(&server)
        .await;

    let err = client()
        .send_message(&server.uri(), Message::user_text("x"))
        .await
        .unwrap_err();
    assert!(matches!(err, StrandError::Transport(ref m) if m.starts_with("HTTP 502")));
}

#[tokio::test]
async fn test_malformed_body_is_protocol_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
        .mount(&server)
        .await;

    let err = client()
        .send_message(&server.uri(), Message::user_text("x"))
        .await
        .unwrap_err();
    assert!(matches!(err, StrandError::Protocol(_)));
}

#[tokio::test]
async fn test_unreachable_endpoint() {
    let err = client()
        .send_message("http://127.0.0.1:1/a2a", Message::user_text("hello"))
        .await
        .unwrap_err();
    assert!(matches!(err, StrandError::Transport(_)));
}
