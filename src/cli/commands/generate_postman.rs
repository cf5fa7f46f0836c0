//! `generate-postman` command implementation
//!
//! A thin alias for `inspect` under the name that mirrors the REST facade's
//! `/generate-postman` route: same flags, same output, different entry point
//! for operators who reach for the HTTP route's name on the command line.

use clap::Args;

use crate::error::ProxyResult;

use super::inspect::InspectCommand;

/// Discover a backend's surface and print a Postman v2.1 collection for it
#[derive(Debug, Args)]
pub struct GeneratePostmanCommand {
    #[command(flatten)]
    pub inspect: InspectCommand,
}

impl GeneratePostmanCommand {
    /// Execute the generate-postman command
    pub async fn execute(self) -> ProxyResult<()> {
        self.inspect.execute().await
    }
}
