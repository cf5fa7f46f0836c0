//! Shared test scaffolding: an in-process REST facade plus a throwaway
//! stdio backend that answers any correlated JSON-RPC request with a fixed
//! `tools/list`-shaped result, so the REST/risk/job layers can be exercised
//! end-to-end without a real MCP server.

use std::collections::HashMap;
use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, Response, StatusCode};
use serde_json::Value;
use tempfile::NamedTempFile;
use tower::ServiceExt;

use mcp_bridge::config::{BackendSpec, RiskLevel, Transport};
use mcp_bridge::rest::{self, AppState};
use mcp_bridge::supervisor::Supervisor;

/// A POSIX shell one-liner that reads newline-delimited JSON-RPC requests
/// and answers every one carrying an `"id"` with a canned `tools/list`
/// result, regardless of the requested method. Good enough to drive the
/// initialize handshake and any subsequent request the tests issue.
const ECHO_BACKEND_SCRIPT: &str = r#"
while IFS= read -r line; do
  id=$(printf '%s' "$line" | sed -n 's/.*"id":\([0-9]*\).*/\1/p')
  if [ -n "$id" ]; then
    printf '{"jsonrpc":"2.0","id":%s,"result":{"tools":[{"name":"echo","description":"echoes input","inputSchema":{"type":"object","properties":{"message":{"type":"string"}}}}]}}\n' "$id"
  fi
done
"#;

pub fn echo_backend_spec(id: &str, risk_level: Option<RiskLevel>) -> BackendSpec {
    BackendSpec {
        id: id.to_string(),
        transport: Transport::Stdio {
            command: "sh".to_string(),
            args: vec!["-c".to_string(), ECHO_BACKEND_SCRIPT.to_string()],
            env: HashMap::new(),
        },
        risk_level,
        isolation: None,
        ssrf_protection: Default::default(),
    }
}

/// Builds a fresh router over an empty persisted-config file. The temp file
/// is leaked into the returned tuple so it stays alive for the test's
/// duration (it's removed when the `NamedTempFile` drops).
pub fn test_app() -> (Router, NamedTempFile) {
    let config_file = NamedTempFile::new().expect("create temp config file");
    std::fs::write(config_file.path(), r#"{"mcpServers":{}}"#).expect("seed empty config");

    let supervisor = Arc::new(Supervisor::new());
    let state = AppState::new(supervisor, config_file.path().to_path_buf());
    (rest::router(state), config_file)
}

pub async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response: Response<Body> = app.clone().oneshot(request).await.expect("request dispatch");
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read response body");
    let body: Value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("response body is valid json")
    };
    (status, body)
}

pub fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(&body).unwrap()))
        .unwrap()
}

pub fn get_request(uri: &str) -> Request<Body> {
    Request::builder().method("GET").uri(uri).body(Body::empty()).unwrap()
}

pub fn delete_request(uri: &str) -> Request<Body> {
    Request::builder().method("DELETE").uri(uri).body(Body::empty()).unwrap()
}

pub fn bearer_request(method: &str, uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("authorization", format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap()
}
