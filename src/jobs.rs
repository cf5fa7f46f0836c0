//! Job Queue: an in-memory `job_id -> Job` map with a QUEUED -> PROCESSING ->
//! COMPLETED|FAILED status machine, bearer-token authorized polling, and a
//! TTL sweeper.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use dashmap::DashMap;
use parking_lot::RwLock;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::config::SseTuning;
use crate::error::{ProxyError, ProxyResult};
use crate::supervisor::Supervisor;
use crate::transport::{HttpAdapter, SseAdapter};

/// Absolute job lifetime: expiry is always created_at + 24 hours.
const JOB_TTL: Duration = Duration::from_secs(24 * 60 * 60);
/// The TTL sweeper runs on this period.
const SWEEP_INTERVAL: Duration = Duration::from_secs(10 * 60);
/// Retry-after hint returned while a job is QUEUED/PROCESSING.
const DEFAULT_RETRY_AFTER_SECS: u64 = 10;

const JOB_ID_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const JOB_ID_LEN: usize = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

/// The dynamic-job path calls the tool name directly as the JSON-RPC
/// method, which may be a protocol-compatibility convention for certain SSE
/// backends or a latent bug in whatever this convention originated from.
/// Implemented literally (`ToolNameAsMethod`) but made an explicit,
/// swappable policy rather than a buried assumption.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DynamicCallConvention {
    /// `request(tool_name, parameters)` — the tool name IS the RPC method.
    ToolNameAsMethod,
    /// `request("tools/call", {name: tool_name, arguments: parameters})`.
    ToolsCall,
}

impl Default for DynamicCallConvention {
    fn default() -> Self {
        Self::ToolNameAsMethod
    }
}

/// A dynamic backend target: a bare URL (and optional bearer token) that
/// isn't a registered backend id.
#[derive(Debug, Clone)]
pub struct DynamicTarget {
    pub url: String,
    pub auth_token: Option<String>,
}

/// Where a job's tool invocation should be dispatched.
#[derive(Debug, Clone)]
pub enum JobTarget {
    Backend(String),
    Dynamic(DynamicTarget),
    /// Neither given: enumerate initialized backends and pick the first
    /// whose `tools/list` contains the requested tool.
    AnyBackend,
}

pub struct Job {
    pub id: String,
    token: SecretString,
    pub status: JobStatus,
    pub tool_name: String,
    pub target: JobTarget,
    pub parameters: Value,
    pub result: Option<Value>,
    pub error: Option<String>,
    pub created_at: SystemTime,
    pub started_at: Option<SystemTime>,
    pub completed_at: Option<SystemTime>,
    pub expires_at: SystemTime,
}

impl Job {
    fn token_matches(&self, presented: &str) -> bool {
        self.token.expose_secret() == presented
    }

    fn is_expired(&self) -> bool {
        SystemTime::now() >= self.expires_at
    }
}

fn unix_seconds(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH).unwrap_or_default().as_secs()
}

/// 15 independent uniform draws from `[A-Z0-9]`, sourced from UUID entropy
/// (36^15 ≈ 2.2 × 10^23 possible ids, so collisions are checked but never
/// expected to occur in practice).
fn generate_job_id() -> String {
    let bytes = Uuid::new_v4().into_bytes();
    bytes
        .iter()
        .cycle()
        .take(JOB_ID_LEN)
        .map(|b| JOB_ID_ALPHABET[(*b as usize) % JOB_ID_ALPHABET.len()] as char)
        .collect()
}

/// 32 bytes drawn directly from the OS CSPRNG, hex-encoded, prefixed `tok_`.
fn generate_bearer_token_plaintext() -> String {
    let mut raw = [0u8; 32];
    getrandom::getrandom(&mut raw).expect("OS random number generator unavailable");
    let mut token = String::with_capacity(4 + raw.len() * 2);
    token.push_str("tok_");
    for byte in raw {
        token.push_str(&format!("{byte:02x}"));
    }
    token
}

/// The receipt handed back synchronously from `enqueue`.
#[derive(Debug, Serialize)]
pub struct JobReceipt {
    pub job_id: String,
    pub bearer_token: String,
    pub status: JobStatus,
    pub created_at: u64,
    pub expires_at: u64,
}

/// What `/results/{job_id}` returns. Bearer tokens never appear here or in
/// the admin listing.
#[derive(Debug, Serialize)]
pub struct JobStatusView {
    pub job_id: String,
    pub status: JobStatus,
    pub created_at: u64,
    pub started_at: Option<u64>,
    pub completed_at: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
}

pub struct JobQueue {
    jobs: DashMap<String, Arc<RwLock<Job>>>,
    supervisor: Arc<Supervisor>,
}

impl JobQueue {
    pub fn new(supervisor: Arc<Supervisor>) -> Self {
        Self {
            jobs: DashMap::new(),
            supervisor,
        }
    }

    /// Synchronous receipt; spawns the background task that actually runs
    /// the tool call.
    pub fn enqueue(self: &Arc<Self>, tool_name: String, target: JobTarget, parameters: Value) -> JobReceipt {
        let id = loop {
            let candidate = generate_job_id();
            if !self.jobs.contains_key(&candidate) {
                break candidate;
            }
        };
        let token_plaintext = generate_bearer_token_plaintext();
        let created_at = SystemTime::now();
        let expires_at = created_at + JOB_TTL;

        let job = Job {
            id: id.clone(),
            token: SecretString::from(token_plaintext.clone()),
            status: JobStatus::Queued,
            tool_name: tool_name.clone(),
            target,
            parameters,
            result: None,
            error: None,
            created_at,
            started_at: None,
            completed_at: None,
            expires_at,
        };
        let handle = Arc::new(RwLock::new(job));
        self.jobs.insert(id.clone(), handle.clone());

        let queue = self.clone();
        tokio::spawn(async move { queue.run(handle).await });

        JobReceipt {
            job_id: id,
            bearer_token: token_plaintext,
            status: JobStatus::Queued,
            created_at: unix_seconds(created_at),
            expires_at: unix_seconds(expires_at),
        }
    }

    async fn run(&self, handle: Arc<RwLock<Job>>) {
        let (tool_name, target, parameters) = {
            let mut job = handle.write();
            job.status = JobStatus::Processing;
            job.started_at = Some(SystemTime::now());
            (job.tool_name.clone(), job.target.clone(), job.parameters.clone())
        };

        let outcome = self.dispatch(&tool_name, &target, parameters).await;

        let mut job = handle.write();
        match outcome {
            Ok(result) => {
                job.result = Some(unwrap_envelope(result));
                job.status = JobStatus::Completed;
            }
            Err(e) => {
                job.error = Some(e.to_string());
                job.status = JobStatus::Failed;
            }
        }
        job.completed_at = Some(SystemTime::now());
    }

    async fn dispatch(&self, tool_name: &str, target: &JobTarget, parameters: Value) -> ProxyResult<Value> {
        match target {
            JobTarget::Backend(backend_id) => {
                let params = serde_json::json!({ "name": tool_name, "arguments": parameters });
                self.supervisor.request(backend_id, "tools/call", params, None).await
            }
            JobTarget::Dynamic(dynamic) => self.dispatch_dynamic(tool_name, dynamic, parameters).await,
            JobTarget::AnyBackend => {
                for session in self.supervisor.list() {
                    let tools = self
                        .supervisor
                        .request(&session.id, "tools/list", serde_json::json!({}), None)
                        .await;
                    let Ok(tools) = tools else { continue };
                    let has_tool = tools
                        .get("tools")
                        .and_then(Value::as_array)
                        .is_some_and(|list| list.iter().any(|t| t.get("name").and_then(Value::as_str) == Some(tool_name)));
                    if has_tool {
                        let params = serde_json::json!({ "name": tool_name, "arguments": parameters });
                        return self.supervisor.request(&session.id, "tools/call", params, None).await;
                    }
                }
                Err(ProxyError::NotFound(format!("no initialized backend exposes tool '{tool_name}'")))
            }
        }
    }

    /// Opens a throwaway adapter inferred from the URL shape and invokes
    /// the tool per `DynamicCallConvention::ToolNameAsMethod`, the default
    /// policy for dynamic (unregistered) backend targets.
    async fn dispatch_dynamic(&self, tool_name: &str, dynamic: &DynamicTarget, parameters: Value) -> ProxyResult<Value> {
        let convention = DynamicCallConvention::default();
        let (method, params) = match convention {
            DynamicCallConvention::ToolNameAsMethod => (tool_name.to_string(), parameters),
            DynamicCallConvention::ToolsCall => (
                "tools/call".to_string(),
                serde_json::json!({ "name": tool_name, "arguments": parameters }),
            ),
        };

        if dynamic.url.ends_with("/sse") || dynamic.url.contains("/sse?") {
            let adapter = SseAdapter::new(dynamic.url.clone(), SseTuning::default())?
                .with_auth_token(dynamic.auth_token.clone());
            adapter.request(&method, params, None).await
        } else {
            let adapter = HttpAdapter::new(dynamic.url.clone())?.with_auth_token(dynamic.auth_token.clone());
            adapter.request(&method, params, None).await
        }
    }

    /// `Unauthorized` on missing/mismatched token, `NotFound` on unknown id,
    /// `Gone` (and evicted) past expiry.
    pub fn poll(&self, job_id: &str, bearer_token: &str) -> ProxyResult<JobStatusView> {
        let entry = self
            .jobs
            .get(job_id)
            .ok_or_else(|| ProxyError::NotFound(format!("job '{job_id}'")))?;
        let handle = entry.value().clone();
        drop(entry);

        let job = handle.read();
        if !job.token_matches(bearer_token) {
            return Err(ProxyError::Unauthorized("bearer token does not match job".into()));
        }
        if job.is_expired() {
            drop(job);
            self.jobs.remove(job_id);
            return Err(ProxyError::Gone(format!("job '{job_id}' expired")));
        }

        let retry_after = matches!(job.status, JobStatus::Queued | JobStatus::Processing)
            .then_some(DEFAULT_RETRY_AFTER_SECS);

        Ok(JobStatusView {
            job_id: job.id.clone(),
            status: job.status,
            created_at: unix_seconds(job.created_at),
            started_at: job.started_at.map(unix_seconds),
            completed_at: job.completed_at.map(unix_seconds),
            result: job.result.clone(),
            error: job.error.clone(),
            retry_after,
        })
    }

    /// Admin listing: every field except the bearer token.
    pub fn list(&self) -> Vec<JobStatusView> {
        self.jobs
            .iter()
            .map(|entry| {
                let job = entry.value().read();
                JobStatusView {
                    job_id: job.id.clone(),
                    status: job.status,
                    created_at: unix_seconds(job.created_at),
                    started_at: job.started_at.map(unix_seconds),
                    completed_at: job.completed_at.map(unix_seconds),
                    result: job.result.clone(),
                    error: job.error.clone(),
                    retry_after: None,
                }
            })
            .collect()
    }

    /// Deletes every job whose `expires_at` has passed. Runs every 10
    /// minutes as a periodic task.
    pub async fn run_sweeper(self: Arc<Self>) {
        let mut interval = tokio::time::interval(SWEEP_INTERVAL);
        loop {
            interval.tick().await;
            self.sweep();
        }
    }

    fn sweep(&self) {
        let expired: Vec<String> = self
            .jobs
            .iter()
            .filter(|entry| entry.value().read().is_expired())
            .map(|entry| entry.key().clone())
            .collect();
        for id in &expired {
            self.jobs.remove(id);
        }
        if !expired.is_empty() {
            tracing::info!(count = expired.len(), "swept expired jobs");
        }
    }
}

/// SSE/HTTP envelope unwrap on poll: if the stored payload is a
/// string beginning with `data:`, parse the remainder as JSON and extract
/// `.result`/`.content`; if it's an object with `.result`/`.content`,
/// return that inner value. Otherwise the value passes through unchanged
/// (idempotent on a plain value with no envelope).
fn unwrap_envelope(value: Value) -> Value {
    if let Value::String(s) = &value {
        if let Some(rest) = s.strip_prefix("data:") {
            if let Ok(parsed) = serde_json::from_str::<Value>(rest.trim_start()) {
                return unwrap_inner(parsed);
            }
        }
    }
    unwrap_inner(value)
}

fn unwrap_inner(value: Value) -> Value {
    if let Value::Object(ref map) = value {
        if let Some(inner) = map.get("result").or_else(|| map.get("content")) {
            return inner.clone();
        }
    }
    value
}
