//! User-friendly error formatting for CLI

use colored::Colorize;

use crate::error::ProxyError;

/// Format an error for CLI display
#[must_use]
pub fn format_error(error: &ProxyError) -> String {
    match error {
        ProxyError::Configuration(message) => {
            format!(
                "{} Configuration error\n  {}\n\n{}\n  {}",
                "✗".red().bold(),
                message,
                "Suggestion:".yellow(),
                "Check the backend registry document and run with --help to see available options"
            )
        }
        ProxyError::UpstreamError { message, .. } => {
            format!(
                "{} Upstream error\n  {}\n\n{}\n  {}",
                "✗".red().bold(),
                message,
                "Suggestion:".yellow(),
                "Check that the server command is correct and the server starts successfully"
            )
        }
        ProxyError::Serialization(err) => {
            format!(
                "{} JSON parsing error\n  {}\n\n{}\n  {}",
                "✗".red().bold(),
                err,
                "Suggestion:".yellow(),
                "The server may be returning invalid JSON. Check server output."
            )
        }
        ProxyError::Io(err) => {
            format!(
                "{} I/O error\n  {}\n\n{}\n  {}",
                "✗".red().bold(),
                err,
                "Suggestion:".yellow(),
                "Check file permissions and disk space"
            )
        }
        _ => format!("{} {}", "✗".red().bold(), error),
    }
}

/// Display an error to stderr and return exit code
#[must_use]
pub fn display_error(error: &ProxyError) -> i32 {
    eprintln!("{}", format_error(error));
    1
}
