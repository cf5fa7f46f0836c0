//! Inspect command implementation
//!
//! Starts a backend transiently (without persisting it), discovers its
//! tools/resources/prompts, and prints a Postman v2.1 collection for it.

use std::path::PathBuf;

use clap::Args;

use crate::config::{BackendSpec, SseTuning, Transport};
use crate::error::{ProxyError, ProxyResult};
use crate::introspection::{McpIntrospector, generate_collection};
use crate::supervisor::Supervisor;

/// Inspect an MCP server and print a Postman collection for it
#[derive(Debug, Args)]
pub struct InspectCommand {
    /// Command to spawn for a stdio backend (mutually exclusive with `--url`)
    #[arg(long, value_name = "COMMAND")]
    pub command: Option<String>,

    /// Arguments passed to `--command`
    #[arg(long, value_name = "ARG")]
    pub arg: Vec<String>,

    /// URL of an http/sse backend (mutually exclusive with `--command`)
    #[arg(long, value_name = "URL")]
    pub url: Option<String>,

    /// Base URL the generated collection's requests are built against
    #[arg(long, value_name = "URL", default_value = "http://localhost:3000")]
    pub base_url: String,

    /// Write the collection to a file instead of stdout
    #[arg(short = 'o', long, value_name = "FILE")]
    pub output: Option<PathBuf>,
}

impl InspectCommand {
    /// Execute the inspect command
    pub async fn execute(self) -> ProxyResult<()> {
        let spec = self.spec()?;
        let supervisor = Supervisor::new();
        let introspector = McpIntrospector::new();

        let discovered = introspector.generate(&supervisor, spec.clone()).await?;
        tracing::info!(summary = %discovered.summary(), "introspection complete");

        let collection = generate_collection(&self.base_url, &spec, &discovered);
        let rendered = serde_json::to_string_pretty(&collection)?;

        match self.output {
            Some(path) => std::fs::write(path, rendered)?,
            None => println!("{rendered}"),
        }

        Ok(())
    }

    fn spec(&self) -> ProxyResult<BackendSpec> {
        if let Some(command) = &self.command {
            return Ok(BackendSpec {
                id: "inspect".into(),
                transport: Transport::Stdio {
                    command: command.clone(),
                    args: self.arg.clone(),
                    env: Default::default(),
                },
                risk_level: None,
                isolation: None,
                ssrf_protection: Default::default(),
            });
        }
        if let Some(url) = &self.url {
            let ssrf_protection = crate::config::SsrfProtection::default();
            crate::config::validate_backend_url(url, &ssrf_protection)?;
            let transport = if url.ends_with("/sse") {
                Transport::Sse { url: url.clone(), tuning: SseTuning::default() }
            } else {
                Transport::Http { url: url.clone() }
            };
            return Ok(BackendSpec { id: "inspect".into(), transport, risk_level: None, isolation: None, ssrf_protection });
        }
        Err(ProxyError::BadRequest("inspect requires --command or --url".into()))
    }
}
