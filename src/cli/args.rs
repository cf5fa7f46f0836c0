//! Shared CLI argument types

use std::path::PathBuf;

use clap::Args;

/// Location of the persisted `{mcpServers: {...}}` config document, shared
/// by every command that needs to load or rewrite it.
#[derive(Debug, Clone, Args)]
pub struct ConfigArgs {
    /// Path to the backend registry config document
    #[arg(long, value_name = "FILE", default_value = "./mcp_config.json", env = "MCP_CONFIG_PATH")]
    pub config: PathBuf,
}
