//! Introspection & Postman-Collection Generator: starts a transient
//! backend, discovers its tools/resources/prompts, and emits a portable
//! Postman v2.1 collection document.

pub mod introspector;
pub mod postman;
pub mod spec;

pub use introspector::McpIntrospector;
pub use postman::generate_collection;
pub use spec::{PromptArgument, PromptSpec, ResourceSpec, ServerSpec, ToolSpec};
