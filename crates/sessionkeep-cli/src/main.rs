//! sessionkeep maintenance CLI.
//!
//! Binary name: `skeep`
//!
//! Parses CLI arguments, opens the session and credential stores, then
//! dispatches to the command handler. Every command closes the stores on the
//! way out so buffered writes are flushed.

mod cli;
mod state;

use clap::Parser;

use cli::{Cli, Commands};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Set up tracing based on verbosity
    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "warn",
        1 => "info,sessionkeep=debug",
        _ => "trace",
    };
    sessionkeep_observe::tracing_setup::init_tracing(filter, cli.otel)
        .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {e}"))?;

    let state = AppState::init(cli.data_dir.clone()).await?;

    let result = match cli.command {
        Commands::Status => cli::status::status(&state, cli.json).await,
        Commands::Sessions { action } => {
            cli::session::handle_session_command(action, &state, cli.json).await
        }
        Commands::Creds { action } => {
            cli::creds::handle_creds_command(action, &state, cli.json).await
        }
        Commands::Sweep => cli::sweep::sweep(&state, cli.json).await,
    };

    state.stores.close().await;
    sessionkeep_observe::tracing_setup::shutdown_tracing();
    result
}
