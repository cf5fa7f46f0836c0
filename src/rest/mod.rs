//! REST Facade: thin mapping of HTTP verbs/paths onto the
//! Supervisor, Risk Gate, Job Queue, and Introspection components.

mod handlers;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::routing::{delete, get, post};
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::introspection::McpIntrospector;
use crate::jobs::JobQueue;
use crate::proxy::AtomicMetrics;
use crate::risk::RiskGate;
use crate::supervisor::Supervisor;

/// 10 MiB request body cap, applied uniformly across the facade.
const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

pub struct AppState {
    pub supervisor: Arc<Supervisor>,
    pub risk_gate: Arc<RiskGate>,
    pub jobs: Arc<JobQueue>,
    pub introspector: McpIntrospector,
    pub metrics: Arc<AtomicMetrics>,
    pub config_path: PathBuf,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(supervisor: Arc<Supervisor>, config_path: PathBuf) -> Arc<Self> {
        let jobs = Arc::new(JobQueue::new(supervisor.clone()));
        Arc::new(Self {
            supervisor,
            risk_gate: Arc::new(RiskGate::new()),
            jobs,
            introspector: McpIntrospector::new(),
            metrics: Arc::new(AtomicMetrics::new()),
            config_path,
            started_at: Instant::now(),
        })
    }
}

/// Builds the full route table: one route per endpoint this bridge exposes.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/servers", get(handlers::list_servers).post(handlers::add_server))
        .route("/servers/{id}", delete(handlers::remove_server))
        .route("/servers/{id}/tools", get(handlers::list_tools))
        .route("/servers/{id}/tools/{tool_name}", post(handlers::call_tool))
        .route("/servers/{id}/resources", get(handlers::list_resources))
        .route("/servers/{id}/resources/{*uri}", get(handlers::read_resource))
        .route("/servers/{id}/prompts", get(handlers::list_prompts))
        .route("/servers/{id}/prompts/{name}", post(handlers::get_prompt))
        .route("/confirmations/{confirmation_id}", post(handlers::confirm))
        .route("/generate-postman", post(handlers::generate_postman))
        .route("/tool/execute", post(handlers::execute_tool))
        .route("/tool/execute/dynamic", post(handlers::execute_tool_dynamic))
        .route("/results/{job_id}", get(handlers::poll_job).post(handlers::poll_job))
        .route("/jobs", get(handlers::list_jobs))
        .route("/test/timeout/{minutes}", post(handlers::test_timeout))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .with_state(state)
}
