//! Session Supervisor: holds the registry of active backends, tracks each
//! one's `initialization_state`, serializes start/stop per id, and routes
//! calls to the right adapter.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{Mutex, Notify};

use crate::config::{BackendSpec, RiskLevel, Transport as TransportKind};
use crate::error::{ProxyError, ProxyResult};
use crate::transport::{Adapter, INIT_DEADLINE};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InitializationState {
    Starting,
    Initialized,
    Timeout,
    Error,
}

pub struct BackendSession {
    pub id: String,
    pub transport_kind: &'static str,
    pub state: RwLock<InitializationState>,
    pub risk_level: Option<RiskLevel>,
    pub spec: BackendSpec,
    pub adapter: Adapter,
    pub started_at: Instant,
}

impl BackendSession {
    pub fn state(&self) -> InitializationState {
        *self.state.read()
    }
}

pub struct Supervisor {
    sessions: DashMap<String, Arc<BackendSession>>,
    start_locks: DashMap<String, Arc<Mutex<()>>>,
    pub shutdown: Arc<Notify>,
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::new()
    }
}

impl Supervisor {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
            start_locks: DashMap::new(),
            shutdown: Arc::new(Notify::new()),
        }
    }

    fn transport_kind(spec: &BackendSpec) -> &'static str {
        match spec.transport {
            TransportKind::Stdio { .. } => "stdio",
            TransportKind::Http { .. } => "http",
            TransportKind::Sse { .. } => "sse",
        }
    }

    /// Idempotent-failing: rejects if `id` exists and is live. Synchronous in
    /// effect — the caller observes either an initialized session or an error.
    pub async fn start(&self, spec: BackendSpec) -> ProxyResult<Arc<BackendSession>> {
        if self.sessions.contains_key(&spec.id) {
            return Err(ProxyError::Conflict(format!("backend '{}' already exists", spec.id)));
        }

        let lock = self
            .start_locks
            .entry(spec.id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        if self.sessions.contains_key(&spec.id) {
            return Err(ProxyError::Conflict(format!("backend '{}' already exists", spec.id)));
        }

        let id = spec.id.clone();
        let risk_level = spec.risk_level;
        let kind = Self::transport_kind(&spec);

        tracing::info!(backend = %id, transport = kind, "starting backend session");

        match tokio::time::timeout(INIT_DEADLINE, Adapter::connect(&spec)).await {
            Ok(Ok(adapter)) => {
                let session = Arc::new(BackendSession {
                    id: id.clone(),
                    transport_kind: kind,
                    state: RwLock::new(InitializationState::Initialized),
                    risk_level,
                    spec,
                    adapter,
                    started_at: Instant::now(),
                });
                self.sessions.insert(id.clone(), session.clone());
                tracing::info!(backend = %id, "backend session initialized");
                Ok(session)
            }
            Ok(Err(e)) => {
                tracing::warn!(backend = %id, error = %e, "backend session failed to initialize");
                Err(e)
            }
            Err(_) => {
                tracing::warn!(backend = %id, "backend session initialize timed out");
                Err(ProxyError::Timeout(format!("backend '{id}' initialize")))
            }
        }
    }

    /// Safe to call on a non-existent id (used during shutdown sweeps).
    pub async fn stop(&self, id: &str) {
        if let Some((_, session)) = self.sessions.remove(id) {
            session.adapter.shutdown().await;
            tracing::info!(backend = %id, "backend session stopped");
        }
    }

    pub fn get(&self, id: &str) -> ProxyResult<Arc<BackendSession>> {
        self.sessions
            .get(id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| ProxyError::NotFound(format!("backend '{id}'")))
    }

    pub fn list(&self) -> Vec<Arc<BackendSession>> {
        self.sessions.iter().map(|entry| entry.value().clone()).collect()
    }

    /// `NotFound` if the id is absent, `BadRequest` if the session's state
    /// isn't `initialized`.
    pub async fn request(
        &self,
        id: &str,
        method: &str,
        params: Value,
        deadline: Option<Duration>,
    ) -> ProxyResult<Value> {
        let session = self.get(id)?;
        if session.state() != InitializationState::Initialized {
            return Err(ProxyError::BadRequest(format!("backend '{id}' is not initialized")));
        }
        session.adapter.request(method, params, deadline).await
    }

    /// Stops every live session in parallel and awaits completion; called
    /// from the shutdown-signal handler so every backend gets a chance to
    /// exit cleanly before the process terminates.
    pub async fn shutdown_all(&self) {
        let ids: Vec<String> = self.sessions.iter().map(|entry| entry.key().clone()).collect();
        let stops = ids.iter().map(|id| self.stop(id));
        futures_util::future::join_all(stops).await;
        self.shutdown.notify_waiters();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_kind_matches_spec() {
        let spec = BackendSpec {
            id: "math".into(),
            transport: TransportKind::Http { url: "https://example.com/mcp".into() },
            risk_level: None,
            isolation: None,
            ssrf_protection: Default::default(),
        };
        assert_eq!(Supervisor::transport_kind(&spec), "http");
    }
}
