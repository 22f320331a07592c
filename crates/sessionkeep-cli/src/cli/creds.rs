//! Credential CLI subcommands: list, check, purge.

use anyhow::Result;
use clap::Subcommand;
use console::style;

use sessionkeep_types::credential::{CredentialKey, REQUIRED_IDENTITY_FIELDS};

use super::check_mark;
use crate::state::AppState;

/// Credential subcommands.
#[derive(Subcommand)]
pub enum CredsCommand {
    /// List session ids that have stored credentials.
    #[command(alias = "ls")]
    List,

    /// Check whether a session's credentials are usable for resuming.
    Check {
        /// Session id.
        session_id: String,
    },

    /// Delete every stored credential of a session, including its files.
    Purge {
        /// Session id.
        session_id: String,
    },
}

/// Handle a credential subcommand.
pub async fn handle_creds_command(cmd: CredsCommand, state: &AppState, json: bool) -> Result<()> {
    match cmd {
        CredsCommand::List => list_creds(state, json).await,
        CredsCommand::Check { session_id } => check_creds(state, &session_id, json).await,
        CredsCommand::Purge { session_id } => purge_creds(state, &session_id, json).await,
    }
}

async fn list_creds(state: &AppState, json: bool) -> Result<()> {
    let sessions = state.stores.credentials.known_sessions().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&sessions)?);
        return Ok(());
    }

    println!();
    if sessions.is_empty() {
        println!("  {} No stored credentials.", style("i").blue().bold());
    } else {
        for id in &sessions {
            println!("  {}", style(id).cyan());
        }
        println!();
        println!(
            "  {} session{} in {}",
            style(sessions.len()).bold(),
            if sessions.len() == 1 { "" } else { "s" },
            style(state.stores.credentials.backend_name()).dim()
        );
    }
    println!();
    Ok(())
}

async fn check_creds(state: &AppState, session_id: &str, json: bool) -> Result<()> {
    let root = state
        .stores
        .credentials
        .read(&CredentialKey::root(session_id))
        .await;
    let present = root.is_some();
    let fields: Vec<(&str, bool)> = REQUIRED_IDENTITY_FIELDS
        .iter()
        .map(|field| {
            let ok = root
                .as_ref()
                .and_then(|creds| creds.get(field))
                .is_some_and(|v| !v.is_null());
            (*field, ok)
        })
        .collect();
    let valid = present && fields.iter().all(|(_, ok)| *ok);

    if json {
        let out = serde_json::json!({
            "session_id": session_id,
            "root_present": present,
            "fields": fields
                .iter()
                .map(|(name, ok)| ((*name).to_string(), serde_json::Value::Bool(*ok)))
                .collect::<serde_json::Map<_, _>>(),
            "valid": valid,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!();
    println!(
        "  Credential check for '{}'",
        style(session_id).cyan()
    );
    println!();
    println!("  {} Root record present", check_mark(present));
    for (field, ok) in &fields {
        println!("  {} {field}", check_mark(*ok));
    }
    println!();
    if valid {
        println!("  {}", style("Session can be resumed.").green());
    } else {
        println!("  {}", style("Session needs to be paired again.").yellow());
    }
    println!();
    Ok(())
}

async fn purge_creds(state: &AppState, session_id: &str, json: bool) -> Result<()> {
    let stores = &state.stores;
    let removed = stores.credentials.delete_session_data(session_id).await;
    let dir_removed = stores.files.remove_session_dir(session_id).await?;

    if json {
        let out = serde_json::json!({
            "session_id": session_id,
            "entries_removed": removed,
            "directory_removed": dir_removed,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!();
    println!(
        "  {} Purged {} credential entr{} for '{}'",
        style("✓").green().bold(),
        style(removed).bold(),
        if removed == 1 { "y" } else { "ies" },
        style(session_id).cyan()
    );
    println!();
    Ok(())
}
