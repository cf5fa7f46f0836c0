use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use serde_json::{Value, json};

use crate::config::{self, BackendSpec, Transport};
use crate::error::{ProxyError, ProxyResult};
use crate::introspection::generate_collection;
use crate::jobs::{DynamicTarget, JobTarget};
use crate::risk::GateOutcome;

use super::AppState;

type Resp = Result<(StatusCode, Json<Value>), ProxyError>;

fn ok(body: Value) -> Resp {
    Ok((StatusCode::OK, Json(body)))
}

// GET /health
pub async fn health(State(state): State<Arc<AppState>>) -> Resp {
    let servers: Vec<Value> = state
        .supervisor
        .list()
        .iter()
        .map(|session| {
            json!({
                "id": session.id,
                "transport": session.transport_kind,
                "initialization_state": session.state(),
            })
        })
        .collect();
    ok(json!({
        "status": "ok",
        "uptime": state.started_at.elapsed().as_secs(),
        "serverCount": servers.len(),
        "servers": servers,
        "metrics": state.metrics.snapshot(),
    }))
}

/// Dispatches a backend request through the supervisor, recording the
/// outcome on the shared `AtomicMetrics` counters, exposed informally on
/// `/health`.
async fn dispatch_tracked(
    state: &AppState,
    id: &str,
    method: &str,
    params: Value,
    deadline: Option<std::time::Duration>,
) -> ProxyResult<Value> {
    let started = std::time::Instant::now();
    let result = state.supervisor.request(id, method, params, deadline).await;
    state.metrics.update_latency_us(started.elapsed().as_micros() as u64);
    match &result {
        Ok(_) => state.metrics.inc_requests_forwarded(),
        Err(_) => state.metrics.inc_requests_failed(),
    }
    result
}

// GET /servers
pub async fn list_servers(State(state): State<Arc<AppState>>) -> Resp {
    let servers: Vec<Value> = state
        .supervisor
        .list()
        .iter()
        .map(|session| {
            json!({
                "id": session.id,
                "connected": true,
                "transport": session.transport_kind,
                "initialization_state": session.state(),
                "risk_level": session.risk_level,
            })
        })
        .collect();
    ok(json!({ "servers": servers }))
}

// POST /servers
pub async fn add_server(State(state): State<Arc<AppState>>, body: Json<Value>) -> Result<(StatusCode, Json<Value>), ProxyError> {
    let mut document = body.0;
    config::interpolate_value(&mut document);

    let backend_id_hint = document.get("id").and_then(Value::as_str).unwrap_or("<new>").to_string();
    config::sanitize_malformed_isolation(&mut document, &backend_id_hint);

    let spec: BackendSpec = serde_json::from_value(document)
        .map_err(|e| ProxyError::BadRequest(format!("invalid backend spec: {e}")))?;
    validate_transport(&spec.transport, &spec.ssrf_protection)?;
    let spec = spec.validate();
    let id = spec.id.clone();

    let loaded = config::load(&state.config_path)?;
    if loaded.servers.contains_key(&id) {
        return Err(ProxyError::Conflict(format!("backend '{id}' already exists")));
    }

    config::rewrite(&state.config_path, |servers| {
        servers.insert(id.clone(), spec.clone());
    })?;

    match state.supervisor.start(spec).await {
        Ok(session) => Ok((
            StatusCode::CREATED,
            Json(json!({
                "id": session.id,
                "connected": true,
                "initialization_state": session.state(),
            })),
        )),
        Err(e) => {
            tracing::warn!(backend = %id, error = %e, "backend persisted but failed to start");
            Ok((
                StatusCode::ACCEPTED,
                Json(json!({ "id": id, "connected": false, "error": e.to_string() })),
            ))
        }
    }
}

fn validate_transport(transport: &Transport, ssrf_protection: &config::SsrfProtection) -> ProxyResult<()> {
    if let Some(url) = transport.url() {
        config::validate_backend_url(url, ssrf_protection)?;
    }
    if let Transport::Stdio { command, .. } = transport {
        if command.is_empty() {
            return Err(ProxyError::BadRequest("stdio backend requires a command".into()));
        }
    }
    Ok(())
}

// DELETE /servers/:id
pub async fn remove_server(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Resp {
    let loaded = config::load(&state.config_path)?;
    if !loaded.servers.contains_key(&id) && state.supervisor.get(&id).is_err() {
        return Err(ProxyError::NotFound(format!("backend '{id}'")));
    }

    state.supervisor.stop(&id).await;
    config::rewrite(&state.config_path, |servers| {
        servers.remove(&id);
    })?;

    ok(json!({ "status": "disconnected" }))
}

// GET /servers/:id/tools
pub async fn list_tools(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Resp {
    let deadline = state.supervisor.get(&id)?.adapter.sync_deadline();
    let result = dispatch_tracked(&state, &id, "tools/list", json!({}), Some(deadline)).await?;
    ok(result)
}

// POST /servers/:id/tools/:tool_name
pub async fn call_tool(
    State(state): State<Arc<AppState>>,
    Path((id, tool_name)): Path<(String, String)>,
    body: Json<Value>,
) -> Resp {
    let outcome = state.risk_gate.call_tool(&state.supervisor, &id, &tool_name, body.0).await?;
    match outcome {
        GateOutcome::Pass { mut result, execution_environment } => {
            if let Some(annotation) = execution_environment {
                if let (Value::Object(result_map), Value::Object(annotation_map)) = (&mut result, annotation) {
                    result_map.extend(annotation_map);
                }
            }
            ok(result)
        }
        GateOutcome::Challenge(challenge) => Ok((
            StatusCode::OK,
            Json(serde_json::to_value(challenge).expect("challenge always serializes")),
        )),
    }
}

// GET /servers/:id/resources
pub async fn list_resources(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Resp {
    let deadline = state.supervisor.get(&id)?.adapter.sync_deadline();
    let result = dispatch_tracked(&state, &id, "resources/list", json!({}), Some(deadline)).await?;
    ok(result)
}

// GET /servers/:id/resources/*uri (percent-decoded by axum's router)
pub async fn read_resource(State(state): State<Arc<AppState>>, Path((id, uri)): Path<(String, String)>) -> Resp {
    let deadline = state.supervisor.get(&id)?.adapter.sync_deadline();
    let result = dispatch_tracked(&state, &id, "resources/read", json!({ "uri": uri }), Some(deadline)).await?;
    ok(result)
}

// GET /servers/:id/prompts
pub async fn list_prompts(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Resp {
    let deadline = state.supervisor.get(&id)?.adapter.sync_deadline();
    let result = dispatch_tracked(&state, &id, "prompts/list", json!({}), Some(deadline)).await?;
    ok(result)
}

// POST /servers/:id/prompts/:name
pub async fn get_prompt(
    State(state): State<Arc<AppState>>,
    Path((id, name)): Path<(String, String)>,
    body: Json<Value>,
) -> Resp {
    let deadline = state.supervisor.get(&id)?.adapter.sync_deadline();
    let params = json!({ "name": name, "arguments": body.0 });
    let result = dispatch_tracked(&state, &id, "prompts/get", params, Some(deadline)).await?;
    ok(result)
}

// POST /confirmations/:confirmation_id
pub async fn confirm(
    State(state): State<Arc<AppState>>,
    Path(confirmation_id): Path<String>,
    body: Json<Value>,
) -> Resp {
    let confirmed = body.0.get("confirm").and_then(Value::as_bool).unwrap_or(false);
    let result = state.risk_gate.confirm(&state.supervisor, &confirmation_id, confirmed).await?;
    ok(result)
}

// POST /generate-postman
pub async fn generate_postman(State(state): State<Arc<AppState>>, body: Json<Value>) -> Resp {
    let request = body.0;
    let spec = transient_spec_from_request(&request)?;
    let base_url = request
        .get("serverUrl")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| format!("http://localhost:{}", std::env::var("PORT").unwrap_or_else(|_| "3000".into())));

    let discovered = state.introspector.generate(&state.supervisor, spec.clone()).await?;
    let collection = generate_collection(&base_url, &spec, &discovered);
    ok(collection)
}

fn transient_spec_from_request(request: &Value) -> ProxyResult<BackendSpec> {
    if let Some(url) = request.get("serverUrl").and_then(Value::as_str) {
        let ssrf_protection = config::SsrfProtection::default();
        config::validate_backend_url(url, &ssrf_protection)?;
        let transport = if url.ends_with("/sse") {
            Transport::Sse { url: url.to_string(), tuning: Default::default() }
        } else {
            Transport::Http { url: url.to_string() }
        };
        return Ok(BackendSpec { id: String::new(), transport, risk_level: None, isolation: None, ssrf_protection });
    }
    if let Some(command) = request.get("serverCommand").and_then(Value::as_str) {
        let args = request
            .get("serverArgs")
            .and_then(Value::as_array)
            .map(|a| a.iter().filter_map(Value::as_str).map(str::to_string).collect())
            .unwrap_or_default();
        return Ok(BackendSpec {
            id: String::new(),
            transport: Transport::Stdio { command: command.to_string(), args, env: Default::default() },
            risk_level: None,
            isolation: None,
            ssrf_protection: config::SsrfProtection::default(),
        });
    }
    Err(ProxyError::BadRequest("generate-postman requires serverUrl or serverCommand".into()))
}

// POST /tool/execute
pub async fn execute_tool(State(state): State<Arc<AppState>>, body: Json<Value>) -> Resp {
    let request = body.0;
    let tool_name = request
        .get("tool_name")
        .and_then(Value::as_str)
        .ok_or_else(|| ProxyError::BadRequest("tool_name is required".into()))?
        .to_string();

    let target = match request.get("server_id").and_then(Value::as_str) {
        Some(server_id) => JobTarget::Backend(server_id.to_string()),
        None => JobTarget::AnyBackend,
    };

    let parameters = parameters_from_request(&request, &["tool_name", "server_id"]);
    let receipt = state.jobs.enqueue(tool_name, target, parameters);
    Ok((StatusCode::ACCEPTED, Json(serde_json::to_value(receipt).expect("receipt always serializes"))))
}

// POST /tool/execute/dynamic
pub async fn execute_tool_dynamic(State(state): State<Arc<AppState>>, body: Json<Value>) -> Resp {
    let request = body.0;
    let url = request
        .get("mcp_server_url")
        .and_then(Value::as_str)
        .ok_or_else(|| ProxyError::BadRequest("mcp_server_url is required".into()))?
        .to_string();
    let tool_name = request
        .get("tool_name")
        .and_then(Value::as_str)
        .ok_or_else(|| ProxyError::BadRequest("tool_name is required".into()))?
        .to_string();
    let auth_token = request.get("mcp_auth_token").and_then(Value::as_str).map(str::to_string);
    let parameters = request.get("parameters").cloned().unwrap_or_else(|| json!({}));

    let target = JobTarget::Dynamic(DynamicTarget { url, auth_token });
    let receipt = state.jobs.enqueue(tool_name, target, parameters);
    Ok((StatusCode::ACCEPTED, Json(serde_json::to_value(receipt).expect("receipt always serializes"))))
}

fn parameters_from_request(request: &Value, exclude: &[&str]) -> Value {
    if let Some(parameters) = request.get("parameters") {
        return parameters.clone();
    }
    let Some(map) = request.as_object() else { return json!({}) };
    let mut params = serde_json::Map::new();
    for (key, value) in map {
        if !exclude.contains(&key.as_str()) {
            params.insert(key.clone(), value.clone());
        }
    }
    Value::Object(params)
}

// POST|GET /results/:job_id
pub async fn poll_job(State(state): State<Arc<AppState>>, Path(job_id): Path<String>, headers: HeaderMap) -> Resp {
    let token = bearer_token(&headers).ok_or_else(|| ProxyError::Unauthorized("missing bearer token".into()))?;
    let view = state.jobs.poll(&job_id, &token)?;
    ok(serde_json::to_value(view).expect("job status always serializes"))
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_string)
}

// GET /jobs
pub async fn list_jobs(State(state): State<Arc<AppState>>) -> Resp {
    let jobs = state.jobs.list();
    ok(json!({ "jobs": jobs }))
}

// POST /test/timeout/:minutes
pub async fn test_timeout(Path(minutes): Path<String>) -> Resp {
    let minutes: f64 = minutes
        .parse()
        .map_err(|_| ProxyError::BadRequest(format!("invalid minutes value '{minutes}'")))?;
    if !(0.01..=95.0).contains(&minutes) {
        return Err(ProxyError::BadRequest("minutes must be within [0.01, 95]".into()));
    }
    tokio::time::sleep(std::time::Duration::from_secs_f64(minutes * 60.0)).await;
    ok(json!({ "slept_minutes": minutes }))
}
