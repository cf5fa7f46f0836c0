//! Transport Adapters: three variants implementing a common contract
//! {`start`, `request(method, params) -> result`, `shutdown`}, modeled as a
//! closed enum rather than a trait object so each variant keeps its own
//! correlation state without boxing.

pub mod http;
pub mod sse;
pub mod stdio;

use std::time::Duration;

use serde_json::Value;

use crate::config::{BackendSpec, Transport as TransportKind};
use crate::error::ProxyResult;

pub use http::HttpAdapter;
pub use sse::SseAdapter;
pub use stdio::StdioAdapter;

/// 30s initialize deadline, shared by every transport.
pub const INIT_DEADLINE: Duration = Duration::from_secs(30);
/// Synchronous per-request deadline for the stdio adapter.
pub const SYNC_DEADLINE_STDIO: Duration = Duration::from_secs(10);
/// Synchronous per-request deadline for the http adapter.
pub const SYNC_DEADLINE_HTTP: Duration = Duration::from_secs(60);

pub enum Adapter {
    Stdio(StdioAdapter),
    Http(HttpAdapter),
    Sse(SseAdapter),
}

impl Adapter {
    /// Spawns/connects and runs the `initialize` handshake for `spec`.
    pub async fn connect(spec: &BackendSpec) -> ProxyResult<Self> {
        let adapter = match &spec.transport {
            TransportKind::Stdio { command, args, env } => {
                let high_risk = spec.risk_level == Some(crate::config::RiskLevel::High);
                let stdio = StdioAdapter::spawn(command, args, env, spec.isolation.as_ref(), high_risk)?;
                Adapter::Stdio(stdio)
            }
            TransportKind::Http { url } => Adapter::Http(HttpAdapter::new(url.clone())?),
            TransportKind::Sse { url, tuning } => Adapter::Sse(SseAdapter::new(url.clone(), tuning.clone())?),
        };
        adapter.start().await?;
        Ok(adapter)
    }

    async fn start(&self) -> ProxyResult<()> {
        match self {
            Adapter::Stdio(a) => a.start().await,
            Adapter::Http(a) => a.start().await,
            Adapter::Sse(a) => a.start().await,
        }
    }

    /// Dispatches a correlated JSON-RPC call, optionally bounded by `deadline`.
    /// `None` means no deadline, the calling convention background-job
    /// dispatch uses.
    pub async fn request(
        &self,
        method: &str,
        params: Value,
        deadline: Option<Duration>,
    ) -> ProxyResult<Value> {
        match self {
            Adapter::Stdio(a) => a.request(method, params, deadline).await,
            Adapter::Http(a) => a.request(method, params, deadline).await,
            Adapter::Sse(a) => a.request(method, params, deadline).await,
        }
    }

    pub async fn shutdown(&self) {
        match self {
            Adapter::Stdio(a) => a.shutdown().await,
            Adapter::Http(a) => a.shutdown().await,
            Adapter::Sse(a) => a.shutdown().await,
        }
    }

    /// The deadline a synchronous REST call should pass to `request`.
    pub fn sync_deadline(&self) -> Duration {
        match self {
            Adapter::Stdio(_) => SYNC_DEADLINE_STDIO,
            Adapter::Http(_) => SYNC_DEADLINE_HTTP,
            Adapter::Sse(_) => sse::RESPONSE_DEADLINE,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Adapter::Stdio(_) => "stdio",
            Adapter::Http(_) => "http",
            Adapter::Sse(_) => "sse",
        }
    }
}
