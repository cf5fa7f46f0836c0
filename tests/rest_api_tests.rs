//! End-to-end tests of the REST facade: add/list/remove a backend, call its
//! tools under each risk level, confirmation lifecycle, job polling, and the
//! bounded timeout probe endpoint. Drives the axum `Router` directly via
//! `tower::ServiceExt::oneshot` rather than binding a real TCP port.

mod support;

use axum::http::StatusCode;
use serde_json::json;

use mcp_bridge::config::RiskLevel;
use support::{bearer_request, delete_request, echo_backend_spec, get_request, json_request, send, test_app};

#[tokio::test]
async fn health_reports_zero_servers_on_a_fresh_bridge() {
    let (app, _config) = test_app();
    let (status, body) = send(&app, get_request("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["serverCount"], 0);
}

#[tokio::test]
async fn add_list_call_and_remove_a_low_risk_backend() {
    let (app, _config) = test_app();
    let spec = serde_json::to_value(echo_backend_spec("echo", None)).unwrap();

    let (status, body) = send(&app, json_request("POST", "/servers", spec)).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["initialization_state"], "initialized");

    let (status, body) = send(&app, get_request("/servers")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["servers"][0]["id"], "echo");

    let (status, body) = send(&app, get_request("/servers/echo/tools")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["tools"][0]["name"], "echo");

    let (status, body) = send(
        &app,
        json_request("POST", "/servers/echo/tools/echo", json!({"message": "hi"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["tools"][0]["name"], "echo");

    let (status, body) = send(&app, delete_request("/servers/echo")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "disconnected");

    let (status, _body) = send(&app, get_request("/servers/echo/tools")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn adding_the_same_backend_id_twice_conflicts() {
    let (app, _config) = test_app();
    let spec = serde_json::to_value(echo_backend_spec("dup", None)).unwrap();

    let (status, _) = send(&app, json_request("POST", "/servers", spec.clone())).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = send(&app, json_request("POST", "/servers", spec)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].as_str().unwrap().contains("already exists"));
}

#[tokio::test]
async fn medium_risk_call_is_suspended_then_confirmed_and_single_use() {
    let (app, _config) = test_app();
    let spec = serde_json::to_value(echo_backend_spec("fs", Some(RiskLevel::Medium))).unwrap();
    let (status, _) = send(&app, json_request("POST", "/servers", spec)).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = send(
        &app,
        json_request("POST", "/servers/fs/tools/write_file", json!({"path": "/t", "content": "x"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["requires_confirmation"], true);
    assert_eq!(body["risk_level"], "medium");
    let confirmation_id = body["confirmation_id"].as_str().unwrap().to_string();

    let (status, body) = send(
        &app,
        json_request("POST", &format!("/confirmations/{confirmation_id}"), json!({"confirm": true})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["tools"][0]["name"], "echo");

    // Single-use: the same confirmation id is gone on replay.
    let (status, _body) = send(
        &app,
        json_request("POST", &format!("/confirmations/{confirmation_id}"), json!({"confirm": true})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn high_risk_without_isolation_descriptor_downgrades_to_medium() {
    let (app, _config) = test_app();
    let spec = serde_json::to_value(echo_backend_spec("risky", Some(RiskLevel::High))).unwrap();

    let (status, _) = send(&app, json_request("POST", "/servers", spec)).await;
    assert_eq!(status, StatusCode::CREATED);

    let (_status, body) = send(&app, get_request("/servers")).await;
    assert_eq!(body["servers"][0]["risk_level"], "medium");
}

#[tokio::test]
async fn job_lifecycle_enqueues_processes_and_rejects_wrong_bearer_token() {
    let (app, _config) = test_app();
    let spec = serde_json::to_value(echo_backend_spec("echo", None)).unwrap();
    let (status, _) = send(&app, json_request("POST", "/servers", spec)).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, receipt) = send(
        &app,
        json_request(
            "POST",
            "/tool/execute",
            json!({"tool_name": "echo", "server_id": "echo", "parameters": {"message": "hi"}}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(receipt["status"], "QUEUED");
    let job_id = receipt["job_id"].as_str().unwrap().to_string();
    assert_eq!(job_id.len(), 15);
    let token = receipt["bearer_token"].as_str().unwrap().to_string();
    assert!(token.starts_with("tok_"));

    // Give the background task a moment to run to completion.
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
    assert_eq!(view["result"]["tools"][0]["name"], "echo");

    let (status, _body) = send(&app, bearer_request("POST", &format!("/results/{job_id}"), "tok_wrong")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _body) = send(&app, json_request("POST", "/results/UNKNOWNJOBID1234", json!({}))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // A well-formed bearer token against an id that was never issued: the
    // queue's own NotFound path, distinct from the missing-header case above.
    let (status, _body) = send(
        &app,
        bearer_request("POST", "/results/UNKNOWNJOBID1234", "tok_0000000000000000000000000000000000000000000000000000000000000000"),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn admin_job_listing_never_leaks_bearer_tokens() {
    let (app, _config) = test_app();
    let spec = serde_json::to_value(echo_backend_spec("echo", None)).unwrap();
    send(&app, json_request("POST", "/servers", spec)).await;

    send(
        &app,
        json_request("POST", "/tool/execute", json!({"tool_name": "echo", "server_id": "echo"})),
    )
    .await;

    let (status, body) = send(&app, get_request("/jobs")).await;
    assert_eq!(status, StatusCode::OK);
    let rendered = serde_json::to_string(&body).unwrap();
    assert!(!rendered.contains("tok_"));
}

#[tokio::test]
async fn test_timeout_endpoint_rejects_values_outside_bounds() {
    let (app, _config) = test_app();

    let (status, _body) = send(&app, json_request("POST", "/test/timeout/0.001", json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _body) = send(&app, json_request("POST", "/test/timeout/96", json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(&app, json_request("POST", "/test/timeout/0.01", json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["slept_minutes"], 0.01);
}
