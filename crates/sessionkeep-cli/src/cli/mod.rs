//! CLI command definitions for the `skeep` binary.
//!
//! Uses clap derive macros for argument parsing. Commands follow a
//! noun-verb pattern (e.g., `skeep sessions list`, `skeep creds check <id>`).

pub mod creds;
pub mod session;
pub mod status;
pub mod sweep;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Inspect and maintain session and credential stores.
#[derive(Parser)]
#[command(name = "skeep", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all output except errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for verbose, -vv for debug/trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Data directory (defaults to ~/.sessionkeep).
    #[arg(long, global = true, env = "SESSIONKEEP_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Export spans to stdout via OpenTelemetry.
    #[arg(long, global = true)]
    pub otel: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Backend health, cache and buffer sizes.
    Status,

    /// Inspect and delete session records.
    #[command(alias = "s")]
    Sessions {
        #[command(subcommand)]
        action: session::SessionCommand,
    },

    /// Inspect and purge stored credentials.
    Creds {
        #[command(subcommand)]
        action: creds::CredsCommand,
    },

    /// Migrate legacy auth directories and remove orphaned ones.
    Sweep,
}

/// Green check or red cross.
pub(crate) fn check_mark(ok: bool) -> String {
    if ok {
        format!("{}", console::style("✓").green())
    } else {
        format!("{}", console::style("✗").red())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_delete_hard() {
        let cli = Cli::parse_from(["skeep", "--json", "sessions", "delete", "abc", "--hard"]);
        assert!(cli.json);
        match cli.command {
            Commands::Sessions {
                action: session::SessionCommand::Delete { session_id, hard },
            } => {
                assert_eq!(session_id, "abc");
                assert!(hard);
            }
            _ => panic!("unexpected command"),
        }
    }

    #[test]
    fn test_parse_verbosity_count() {
        let cli = Cli::parse_from(["skeep", "-vv", "status"]);
        assert_eq!(cli.verbose, 2);
        assert!(matches!(cli.command, Commands::Status));
    }
}
