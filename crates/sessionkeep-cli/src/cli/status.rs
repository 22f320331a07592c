//! Store status dashboard command.

use anyhow::Result;
use console::style;

use super::check_mark;
use crate::state::AppState;

/// Display backend health, session counts and in-memory queue sizes.
pub async fn status(state: &AppState, json: bool) -> Result<()> {
    let stores = &state.stores;
    let report = stores.status();
    let sessions = stores.coordinator.list_sessions().await;
    let undetected = stores.coordinator.get_undetected_sessions().await;
    let connected = sessions.iter().filter(|s| s.is_connected).count();
    let credential_sessions = stores.credentials.known_sessions().await;
    let credentials_up = stores.credentials.ping().await;

    if json {
        let status = serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "data_dir": state.data_dir.display().to_string(),
            "backends": report,
            "credential_backend": {
                "name": stores.credentials.backend_name(),
                "up": credentials_up,
            },
            "sessions": {
                "total": sessions.len(),
                "connected": connected,
                "undetected": undetected.len(),
            },
            "credential_sessions": credential_sessions.len(),
        });
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    println!();
    println!(
        "  {} sessionkeep v{}",
        style("⚡").bold(),
        env!("CARGO_PKG_VERSION")
    );
    println!();

    println!("  {}", style("── Backends ──").dim());
    println!("  {} Document store (redb)", check_mark(report.document_store_up));
    println!("  {} Relational store (SQLite)", check_mark(report.relational_store_up));
    println!(
        "  {} Credentials ({})",
        check_mark(credentials_up),
        style(stores.credentials.backend_name()).cyan()
    );
    println!();

    println!("  {}", style("── Sessions ──").dim());
    println!("  Total:      {}", style(sessions.len()).bold());
    println!("  Connected:  {}", style(connected).green());
    if !undetected.is_empty() {
        println!("  Undetected: {}", style(undetected.len()).yellow());
    }
    println!("  With credentials: {}", credential_sessions.len());
    println!();

    println!("  {}", style("── Memory ──").dim());
    println!("  Cached records:   {}", report.cache_size);
    println!("  Buffered updates: {}", report.buffer_size);
    println!();

    println!("  {}", style("── System ──").dim());
    println!("  Data dir: {}", style(state.data_dir.display()).dim());
    println!();

    Ok(())
}
