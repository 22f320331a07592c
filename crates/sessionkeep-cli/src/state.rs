//! Shared state for CLI commands.

use std::path::PathBuf;

use sessionkeep_infra::config::{load_store_config, resolve_data_dir};
use sessionkeep_infra::{Stores, open_stores};

pub struct AppState {
    pub data_dir: PathBuf,
    pub stores: Stores,
}

impl AppState {
    /// Load `sessionkeep.toml` and open every store under the data dir.
    pub async fn init(data_dir: Option<PathBuf>) -> anyhow::Result<Self> {
        let data_dir = data_dir.unwrap_or_else(resolve_data_dir);
        let config = load_store_config(&data_dir).await;
        let stores = open_stores(&data_dir, config).await?;
        tracing::debug!(data_dir = %data_dir.display(), "stores opened");
        Ok(Self { data_dir, stores })
    }
}
