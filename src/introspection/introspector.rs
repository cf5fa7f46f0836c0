//! Introspection orchestration: starts a transient backend, probes
//! `tools/list`/`resources/list`/`prompts/list` in parallel (each failure
//! folded to an empty list), and tears it down even on failure.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::config::BackendSpec;
use crate::error::ProxyResult;
use crate::supervisor::Supervisor;

use super::spec::{ServerSpec, parse_prompts, parse_resources, parse_tools};

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Bounded warm-up after a transient backend's `initialize` handshake
/// completes, before probing its surface.
const WARMUP: Duration = Duration::from_secs(2);

pub struct McpIntrospector;

impl McpIntrospector {
    pub fn new() -> Self {
        Self
    }

    /// Starts `spec` under a fresh `temp-<monotonic>` id, probes its
    /// surface, and stops it again regardless of outcome: the backend is
    /// never left running past this call.
    pub async fn generate(&self, supervisor: &Supervisor, mut spec: BackendSpec) -> ProxyResult<ServerSpec> {
        let temp_id = format!("temp-{}", TEMP_COUNTER.fetch_add(1, Ordering::SeqCst));
        spec.id = temp_id.clone();

        let start_result = supervisor.start(spec).await;
        let outcome = match start_result {
            Ok(_) => {
                tokio::time::sleep(WARMUP).await;
                Ok(self.probe(supervisor, &temp_id).await)
            }
            Err(e) => Err(e),
        };

        supervisor.stop(&temp_id).await;
        outcome
    }

    /// `tools/list`, `resources/list`, `prompts/list` in parallel; any
    /// individual failure folds to an empty list rather than failing the
    /// whole probe.
    async fn probe(&self, supervisor: &Supervisor, backend_id: &str) -> ServerSpec {
        let empty = serde_json::json!({});
        let (tools, resources, prompts) = tokio::join!(
            supervisor.request(backend_id, "tools/list", empty.clone(), None),
            supervisor.request(backend_id, "resources/list", empty.clone(), None),
            supervisor.request(backend_id, "prompts/list", empty, None),
        );

        ServerSpec {
            tools: tools.map(|r| parse_tools(&r)).unwrap_or_default(),
            resources: resources.map(|r| parse_resources(&r)).unwrap_or_default(),
            prompts: prompts.map(|r| parse_prompts(&r)).unwrap_or_default(),
        }
    }
}

impl Default for McpIntrospector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn temp_ids_are_monotonic_and_unique() {
        let a = TEMP_COUNTER.fetch_add(1, Ordering::SeqCst);
        let b = TEMP_COUNTER.fetch_add(1, Ordering::SeqCst);
        assert_ne!(a, b);
    }
}
