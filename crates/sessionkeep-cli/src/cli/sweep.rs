//! Orphan sweep command for the credential file directory.

use anyhow::Result;
use console::style;

use crate::state::AppState;

/// Migrate legacy directories and remove orphans past the grace period.
pub async fn sweep(state: &AppState, json: bool) -> Result<()> {
    let report = state.stores.sweep_orphans().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!();
    println!(
        "  {} Swept {}",
        style("✓").green().bold(),
        style(state.stores.files.base_dir().display()).dim()
    );
    println!();
    println!("  Migrated: {}", report.migrated);
    println!("  Removed:  {}", report.removed);
    println!("  Retained: {}", report.retained);
    println!();
    Ok(())
}
