//! Session record CLI subcommands: list, show, delete, undetected, detect.

use anyhow::{Context, Result};
use clap::Subcommand;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;

use sessionkeep_types::session::{ConnectionStatus, SessionRecord};

use super::check_mark;
use crate::state::AppState;

/// Session subcommands.
#[derive(Subcommand)]
pub enum SessionCommand {
    /// List all sessions, newest first.
    #[command(alias = "ls")]
    List,

    /// Show one session record.
    Show {
        /// Session id.
        session_id: String,
    },

    /// Delete a session record.
    #[command(alias = "rm")]
    Delete {
        /// Session id.
        session_id: String,

        /// Remove the record entirely instead of marking it disconnected.
        #[arg(long)]
        hard: bool,
    },

    /// List connected secondary-channel sessions not yet picked up.
    Undetected,

    /// Mark a session as picked up.
    Detect {
        /// Session id.
        session_id: String,
    },
}

/// Handle a session subcommand.
pub async fn handle_session_command(cmd: SessionCommand, state: &AppState, json: bool) -> Result<()> {
    match cmd {
        SessionCommand::List => {
            let sessions = state.stores.coordinator.list_sessions().await;
            print_sessions(&sessions, "Sessions", json)
        }
        SessionCommand::Show { session_id } => show_session(state, &session_id, json).await,
        SessionCommand::Delete { session_id, hard } => {
            delete_session(state, &session_id, hard, json).await
        }
        SessionCommand::Undetected => {
            let sessions = state.stores.coordinator.get_undetected_sessions().await;
            print_sessions(&sessions, "Undetected sessions", json)
        }
        SessionCommand::Detect { session_id } => detect_session(state, &session_id, json).await,
    }
}

fn status_cell(status: ConnectionStatus) -> Cell {
    let color = match status {
        ConnectionStatus::Connected => Color::Green,
        ConnectionStatus::Connecting | ConnectionStatus::Reconnecting => Color::Yellow,
        ConnectionStatus::Disconnected => Color::DarkGrey,
    };
    Cell::new(status.to_string()).fg(color)
}

fn print_sessions(sessions: &[SessionRecord], title: &str, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(sessions)?);
        return Ok(());
    }

    if sessions.is_empty() {
        println!();
        println!("  {} No sessions found.", style("i").blue().bold());
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Session").fg(Color::White),
        Cell::new("Owner").fg(Color::White),
        Cell::new("Phone").fg(Color::White),
        Cell::new("Status").fg(Color::White),
        Cell::new("Source").fg(Color::White),
        Cell::new("Updated").fg(Color::White),
    ]);

    for session in sessions {
        table.add_row(vec![
            Cell::new(&session.session_id).fg(Color::Cyan),
            Cell::new(&session.owner_id),
            Cell::new(session.phone_number.as_deref().unwrap_or("-")).fg(Color::DarkGrey),
            status_cell(session.connection_status),
            Cell::new(session.source.to_string()),
            Cell::new(session.updated_at.format("%Y-%m-%d %H:%M:%S").to_string())
                .fg(Color::DarkGrey),
        ]);
    }

    println!();
    println!("  {}", style(title).bold());
    println!();
    println!("{table}");
    println!();
    println!(
        "  {} session{}",
        style(sessions.len()).bold(),
        if sessions.len() == 1 { "" } else { "s" }
    );
    println!();
    Ok(())
}

async fn show_session(state: &AppState, session_id: &str, json: bool) -> Result<()> {
    let session = state
        .stores
        .coordinator
        .get_session(session_id)
        .await
        .with_context(|| format!("Session '{session_id}' not found"))?;
    let credentials_valid = state.stores.credentials.is_valid(session_id).await;

    if json {
        let mut value = serde_json::to_value(&session)?;
        value["credentials_valid"] = serde_json::Value::Bool(credentials_valid);
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    println!();
    println!("  Session {}", style(&session.session_id).cyan().bold());
    println!();
    println!("  Owner:       {}", session.owner_id);
    println!(
        "  Phone:       {}",
        session.phone_number.as_deref().unwrap_or("-")
    );
    println!("  Status:      {}", session.connection_status);
    println!("  Reconnects:  {}", session.reconnect_attempts);
    println!("  Source:      {}", session.source);
    println!("  Detected:    {}", session.detected);
    println!(
        "  Created:     {}",
        session.created_at.format("%Y-%m-%d %H:%M:%S")
    );
    println!(
        "  Updated:     {}",
        session.updated_at.format("%Y-%m-%d %H:%M:%S")
    );
    println!("  {} Credentials usable", check_mark(credentials_valid));
    println!();
    Ok(())
}

async fn delete_session(state: &AppState, session_id: &str, hard: bool, json: bool) -> Result<()> {
    let coordinator = &state.stores.coordinator;
    let deleted = if hard {
        coordinator.completely_delete_session(session_id).await
    } else {
        coordinator.delete_session(session_id).await
    };

    if json {
        let out = serde_json::json!({
            "session_id": session_id,
            "deleted": deleted,
            "hard": hard,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    if !deleted {
        anyhow::bail!("Session '{session_id}' not found or no backend available");
    }
    println!();
    println!(
        "  {} Session '{}' {}",
        style("✓").green().bold(),
        style(session_id).cyan(),
        if hard { "deleted" } else { "marked disconnected" }
    );
    println!();
    Ok(())
}

async fn detect_session(state: &AppState, session_id: &str, json: bool) -> Result<()> {
    let marked = state
        .stores
        .coordinator
        .mark_session_as_detected(session_id)
        .await;

    if json {
        let out = serde_json::json!({ "session_id": session_id, "detected": marked });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    if !marked {
        anyhow::bail!("Session '{session_id}' not found or no backend available");
    }
    println!();
    println!(
        "  {} Session '{}' marked as detected",
        style("✓").green().bold(),
        style(session_id).cyan()
    );
    println!();
    Ok(())
}
