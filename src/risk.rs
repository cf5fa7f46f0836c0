//! Risk Gate: intercepts `tools/call` exclusively and enforces the
//! Low/Medium/High policy with a single-use Pending Confirmations table.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use dashmap::DashMap;
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::config::RiskLevel;
use crate::error::{ProxyError, ProxyResult};
use crate::supervisor::Supervisor;

const CONFIRMATION_TTL: Duration = Duration::from_secs(600);

struct PendingConfirmation {
    backend_id: String,
    tool_name: String,
    arguments: Value,
    created_at: SystemTime,
}

impl PendingConfirmation {
    fn expires_at(&self) -> SystemTime {
        self.created_at + CONFIRMATION_TTL
    }

    fn is_expired(&self) -> bool {
        SystemTime::now() >= self.expires_at()
    }
}

fn unix_seconds(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH).unwrap_or_default().as_secs()
}

#[derive(Debug, Serialize)]
pub struct ConfirmationChallenge {
    pub requires_confirmation: bool,
    pub confirmation_id: String,
    pub risk_level: RiskLevel,
    pub risk_description: &'static str,
    pub server_id: String,
    pub method: &'static str,
    pub tool_name: String,
    pub expires_at: u64,
}

/// The outcome of gating a `tools/call`: either the dispatched result (with
/// an optional `execution_environment` annotation for High-risk calls) or a
/// confirmation challenge the client must replay through `/confirmations`.
pub enum GateOutcome {
    Pass { result: Value, execution_environment: Option<Value> },
    Challenge(ConfirmationChallenge),
}

pub struct RiskGate {
    pending: DashMap<String, PendingConfirmation>,
}

impl Default for RiskGate {
    fn default() -> Self {
        Self::new()
    }
}

impl RiskGate {
    pub fn new() -> Self {
        Self { pending: DashMap::new() }
    }

    pub async fn call_tool(
        &self,
        supervisor: &Supervisor,
        backend_id: &str,
        tool_name: &str,
        arguments: Value,
    ) -> ProxyResult<GateOutcome> {
        let session = supervisor.get(backend_id)?;
        let risk = session.risk_level.unwrap_or(RiskLevel::Low);

        match risk {
            RiskLevel::Low => {
                let result = dispatch(supervisor, backend_id, tool_name, arguments).await?;
                Ok(GateOutcome::Pass { result, execution_environment: None })
            }
            RiskLevel::Medium => {
                let confirmation_id = Uuid::new_v4().to_string();
                let confirmation = PendingConfirmation {
                    backend_id: backend_id.to_string(),
                    tool_name: tool_name.to_string(),
                    arguments,
                    created_at: SystemTime::now(),
                };
                let expires_at = unix_seconds(confirmation.expires_at());
                self.pending.insert(confirmation_id.clone(), confirmation);
                tracing::info!(backend = %backend_id, tool = %tool_name, confirmation = %confirmation_id, "medium-risk call suspended pending confirmation");
                Ok(GateOutcome::Challenge(ConfirmationChallenge {
                    requires_confirmation: true,
                    confirmation_id,
                    risk_level: risk,
                    risk_description: risk.description(),
                    server_id: backend_id.to_string(),
                    method: "tools/call",
                    tool_name: tool_name.to_string(),
                    expires_at,
                }))
            }
            RiskLevel::High => {
                let result = dispatch(supervisor, backend_id, tool_name, arguments).await?;
                let docker_image = session.spec.isolation.as_ref().map(|d| d.image.clone());
                let annotation = serde_json::json!({
                    "execution_environment": {
                        "risk_level": risk,
                        "risk_description": risk.description(),
                        "docker": true,
                        "docker_image": docker_image,
                    }
                });
                Ok(GateOutcome::Pass { result, execution_environment: Some(annotation) })
            }
        }
    }

    /// Consumes a pending confirmation (single-use; a second call on the
    /// same id returns `NotFound`) and, if `confirm` is true, dispatches the
    /// original suspended call.
    pub async fn confirm(
        &self,
        supervisor: &Supervisor,
        confirmation_id: &str,
        confirm: bool,
    ) -> ProxyResult<Value> {
        let (_, pending) = self
            .pending
            .remove(confirmation_id)
            .ok_or_else(|| ProxyError::NotFound(format!("confirmation '{confirmation_id}'")))?;

        if pending.is_expired() {
            return Err(ProxyError::Gone(format!("confirmation '{confirmation_id}' expired")));
        }
        if !confirm {
            return Err(ProxyError::BadRequest("confirmation rejected".into()));
        }

        dispatch(supervisor, &pending.backend_id, &pending.tool_name, pending.arguments).await
    }

    /// Periodically evicts pending confirmations past their 10-minute TTL
    /// so an unconsumed challenge doesn't linger in the table forever.
    /// Consumption still checks expiry lazily on use; this just bounds the
    /// table's size between uses.
    pub async fn run_sweeper(self: std::sync::Arc<Self>) {
        let mut interval = tokio::time::interval(CONFIRMATION_TTL);
        loop {
            interval.tick().await;
            self.sweep();
        }
    }

    fn sweep(&self) {
        let expired: Vec<String> = self
            .pending
            .iter()
            .filter(|entry| entry.value().is_expired())
            .map(|entry| entry.key().clone())
            .collect();
        for id in &expired {
            self.pending.remove(id);
        }
        if !expired.is_empty() {
            tracing::info!(count = expired.len(), "swept expired pending confirmations");
        }
    }
}

async fn dispatch(
    supervisor: &Supervisor,
    backend_id: &str,
    tool_name: &str,
    arguments: Value,
) -> ProxyResult<Value> {
    let session = supervisor.get(backend_id)?;
    let deadline = session.adapter.sync_deadline();
    let params = serde_json::json!({ "name": tool_name, "arguments": arguments });
    supervisor.request(backend_id, "tools/call", params, Some(deadline)).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confirmation_ttl_is_ten_minutes() {
        assert_eq!(CONFIRMATION_TTL, Duration::from_secs(600));
    }

    #[test]
    fn expiry_check_flags_stale_entries() {
        let pending = PendingConfirmation {
            backend_id: "fs".into(),
            tool_name: "write_file".into(),
            arguments: serde_json::json!({}),
            created_at: SystemTime::now() - Duration::from_secs(601),
        };
        assert!(pending.is_expired());
    }
}
