use serde_json::json;
use wiremock::matchers::{body_string, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use strand_core::traits::ToolContext;
use strand_core::types::SessionId;
use strand_core::StrandError;
use strand_tools::ToolRegistry;

fn ctx() -> ToolContext {
    ToolContext::new(SessionId::from_string("sess-test"), "fetch")
}

#[tokio::test]
async fn test_get_with_bare_url() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/status"))
        .respond_with(ResponseTemplate::new(200).set_body_string("all good"))
        .mount(&server)
        .await;

    let registry = ToolRegistry::with_builtins();
    let out = registry
        .execute("http_request", json!(format!("{}/status", server.uri())), ctx())
        .await
        .unwrap();
    assert!(out.starts_with("HTTP 200 OK"), "{out}");
    assert!(out.ends_with("all good"), "{out}");
}

#[tokio::test]
async fn test_post_with_headers_and_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/items"))
        .and(header("X-Token", "abc"))
        .and(body_string("payload"))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    let registry = ToolRegistry::with_builtins();
    let out = registry
        .execute(
            "http_request",
            json!({
                "url": format!("{}/items", server.uri()),
                "method": "post",
                "headers": {"X-Token": "abc"},
                "body": "payload"
            }),
            ctx(),
        )
        .await
        .unwrap();
    assert!(out.starts_with("HTTP 201 Created"), "{out}");
}

#[tokio::test]
async fn test_rejects_unsupported_method() {
    let registry = ToolRegistry::with_builtins();
    let err = registry
        .execute(
            "http_request",
            json!({"url": "http://localhost:1", "method": "TRACE"}),
            ctx(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, StrandError::ToolValidation(_)));
}

#[tokio::test]
async fn test_unknown_tool() {
    let registry = ToolRegistry::with_builtins();
    let err = registry.execute("teleport", json!({}), ctx()).await.unwrap_err();
    assert_eq!(err.to_string(), "tool not found: teleport");
}
