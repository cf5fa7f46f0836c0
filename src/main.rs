//! mcp-bridge CLI entry point

#![warn(clippy::all)]

#[cfg(not(feature = "cli"))]
fn main() {
    eprintln!("Error: CLI feature not enabled. Build with --features cli");
    std::process::exit(1);
}

#[cfg(feature = "cli")]
#[tokio::main]
async fn main() {
    use clap::Parser;

    let cli = mcp_bridge::cli::Cli::parse();

    if let Err(e) = cli.execute().await {
        let exit_code = mcp_bridge::cli::error::display_error(&e);
        std::process::exit(exit_code);
    }
}
