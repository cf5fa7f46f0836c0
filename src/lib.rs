//! mcp-bridge: a uniform HTTP/REST surface over stdio, HTTP, and SSE MCP backends
//!
//! Configured backend MCP servers are supervised behind a single REST facade:
//! their tools, resources, and prompts become plain HTTP endpoints, tool calls
//! are gated by a per-backend risk policy, and long-running invocations can be
//! dispatched as background jobs polled by bearer token.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │ REST Facade (axum)                                       │
//! │ • maps HTTP verbs/paths onto the components below        │
//! └─────────────────────────────────────────────────────────┘
//!                           ↓
//! ┌──────────────┬──────────────┬──────────────┬────────────┐
//! │ Supervisor   │ Risk Gate    │ Job Queue     │ Introspect │
//! │ owns sessions│ Low/Med/High │ async jobs,   │ transient  │
//! │ start/stop   │ confirmation │ bearer tokens │ discovery, │
//! │              │ challenges   │               │ Postman    │
//! └──────────────┴──────────────┴──────────────┴────────────┘
//!                           ↓
//! ┌─────────────────────────────────────────────────────────┐
//! │ Transport Adapters: stdio / http / sse                   │
//! └─────────────────────────────────────────────────────────┘
//! ```

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod introspection;
pub mod jobs;
pub mod jsonrpc;
pub mod proxy;
pub mod rest;
pub mod risk;
pub mod supervisor;
pub mod transport;

#[cfg(feature = "cli")]
pub mod cli;

pub use error::{ProxyError, ProxyResult};

/// MCP protocol version this bridge speaks during `initialize`.
pub const MCP_PROTOCOL_VERSION: &str = "2025-06-18";
