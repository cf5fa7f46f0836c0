//! Async job dispatch against *dynamic* (unregistered) backends — the
//! `/tool/execute/dynamic` path from spec scenario S3, plus an SSE
//! header-mode backend standing in for scenario S4. Both are stood up with
//! `wiremock` rather than a real MCP server.

mod support;

use axum::http::StatusCode;
use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use support::{bearer_request, json_request, send, test_app};

#[tokio::test]
async fn dynamic_http_job_completes_and_unwraps_the_result() {
    let mock_server = MockServer::start().await;

    // The dynamic dispatch path calls the tool name directly as the JSON-RPC
    // method (open question #1), with no prior `initialize` handshake, so
    // this is the adapter's first and only request: id is always 1.
    Mock::given(method("POST"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "result": {"bio": "a friendly test backend"},
        })))
        .mount(&mock_server)
        .await;

    let (app, _config) = test_app();
    let (status, receipt) = send(
        &app,
        json_request(
            "POST",
            "/tool/execute/dynamic",
            json!({
                "mcp_server_url": mock_server.uri(),
                "tool_name": "get_bio",
                "parameters": {},
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(receipt["status"], "QUEUED");
    let job_id = receipt["job_id"].as_str().unwrap().to_string();
    let token = receipt["bearer_token"].as_str().unwrap().to_string();

    let mut view = json!({});
    for _ in 0..20 {
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        let (_status, body) = send(&app, bearer_request("POST", &format!("/results/{job_id}"), &token)).await;
        view = body;
        if view["status"] == "COMPLETED" || view["status"] == "FAILED" {
            break;
        }
    }
    assert_eq!(view["status"], "COMPLETED");
    assert_eq!(view["result"]["bio"], "a friendly test backend");

    let (status, _body) = send(&app, bearer_request("POST", &format!("/results/{job_id}"), "tok_wrong")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn dynamic_sse_job_uses_header_mode_session_discovery() {
    let mock_server = MockServer::start().await;

    // GET /sse: header-mode session discovery — the response
    // headers carry `MCP-Session-Id` instead of opening a real event stream.
    Mock::given(method("GET"))
        .and(path("/sse"))
        .respond_with(ResponseTemplate::new(200).insert_header("MCP-Session-Id", "sess-123").set_body_raw(
            Vec::new(),
            "text/event-stream",
        ))
        .mount(&mock_server)
        .await;

    // POST back to the same URL with the session header: the response
    // arrives inline in the POST body.
    Mock::given(method("POST"))
        .and(path("/sse"))
        .and(header("MCP-Session-Id", "sess-123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "result": {"summary": "dynamic sse summary"},
        })))
        .mount(&mock_server)
        .await;

    let (app, _config) = test_app();
    let sse_url = format!("{}/sse", mock_server.uri());
    let (status, receipt) = send(
        &app,
        json_request(
            "POST",
            "/tool/execute/dynamic",
            json!({
                "mcp_server_url": sse_url,
                "tool_name": "summarize",
                "parameters": {},
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let job_id = receipt["job_id"].as_str().unwrap().to_string();
    let token = receipt["bearer_token"].as_str().unwrap().to_string();

    let mut view = json!({});
    for _ in 0..40 {
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        let (_status, body) = send(&app, bearer_request("POST", &format!("/results/{job_id}"), &token)).await;
        view = body;
        if view["status"] == "COMPLETED" || view["status"] == "FAILED" {
            break;
        }
    }
    assert_eq!(view["status"], "COMPLETED");
    assert_eq!(view["result"]["summary"], "dynamic sse summary");
}
