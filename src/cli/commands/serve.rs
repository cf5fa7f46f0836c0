//! Serve command implementation
//!
//! Loads the backend registry, starts every configured backend under the
//! Session Supervisor, and serves the REST facade until a termination
//! signal arrives.

use std::sync::Arc;

use clap::Args;
use tracing::{info, warn};

use crate::cli::args::ConfigArgs;
use crate::error::{ProxyError, ProxyResult};
use crate::rest::{self, AppState};
use crate::supervisor::Supervisor;

/// Start the REST bridge
#[derive(Debug, Args)]
pub struct ServeCommand {
    #[command(flatten)]
    pub config: ConfigArgs,

    /// Bind address for the REST facade.
    ///
    /// Default: 127.0.0.1:$PORT (`PORT` env var, default 3000), localhost only.
    /// Binding to 0.0.0.0 exposes every configured backend's tools to the
    /// network; only do so behind your own authentication layer.
    #[arg(long, value_name = "ADDR")]
    pub bind: Option<String>,
}

fn default_bind_address() -> String {
    let port = std::env::var("PORT").unwrap_or_else(|_| "3000".to_string());
    format!("127.0.0.1:{port}")
}

impl ServeCommand {
    /// Execute the serve command
    pub async fn execute(self) -> ProxyResult<()> {
        let loaded = crate::config::load(&self.config.config)?;
        let supervisor = Arc::new(Supervisor::new());

        for (id, spec) in loaded.servers {
            match supervisor.start(spec).await {
                Ok(_) => info!(backend = %id, "backend started"),
                Err(e) => warn!(backend = %id, error = %e, "backend failed to start, continuing without it"),
            }
        }

        let state = AppState::new(supervisor.clone(), loaded.path);
        tokio::spawn(state.jobs.clone().run_sweeper());
        tokio::spawn(state.risk_gate.clone().run_sweeper());

        let bind = self.bind.clone().unwrap_or_else(default_bind_address);
        let addr: std::net::SocketAddr = bind
            .parse()
            .map_err(|e| ProxyError::Configuration(format!("invalid bind address: {e}")))?;

        let listener = tokio::net::TcpListener::bind(&addr).await?;
        info!(addr = %addr, "mcp-bridge listening");

        let app = rest::router(state);
        let shutdown_supervisor = supervisor.clone();
        axum::serve(listener, app)
            .with_graceful_shutdown(wait_for_shutdown_signal(shutdown_supervisor))
            .await?;

        Ok(())
    }
}

async fn wait_for_shutdown_signal(supervisor: Arc<Supervisor>) {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }

    info!("shutdown signal received, stopping all backends");
    supervisor.shutdown_all().await;
}
