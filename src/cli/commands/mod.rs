//! CLI command implementations

pub mod generate_postman;
pub mod inspect;
pub mod serve;

use clap::Subcommand;

use crate::error::ProxyResult;

/// All available CLI commands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start the REST bridge, supervising every backend in the config document
    #[command(visible_alias = "s")]
    Serve(serve::ServeCommand),

    /// Start a backend transiently, discover its surface, and print a
    /// Postman v2.1 collection for it
    #[command(visible_alias = "i")]
    Inspect(inspect::InspectCommand),

    /// Alias for `inspect` under the REST facade's route name
    #[command(name = "generate-postman")]
    GeneratePostman(generate_postman::GeneratePostmanCommand),
}

impl Command {
    /// Execute the command
    ///
    /// # Errors
    ///
    /// Returns `ProxyError` if the command execution fails.
    pub async fn execute(self) -> ProxyResult<()> {
        match self {
            Command::Serve(cmd) => cmd.execute().await,
            Command::Inspect(cmd) => cmd.execute().await,
            Command::GeneratePostman(cmd) => cmd.execute().await,
        }
    }
}
