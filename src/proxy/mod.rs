//! Shared proxy-wide bookkeeping that sits alongside the Session Supervisor.
//!
//! The supervisor, risk gate, and job queue each own their own table; this
//! module holds the one piece of state every REST handler touches
//! regardless of which table it's hitting: request counters for `/health`.

pub mod metrics;

pub use metrics::{AtomicMetrics, ProxyMetrics};
