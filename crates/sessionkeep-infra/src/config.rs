//! Store configuration loader.
//!
//! Reads `sessionkeep.toml` from the data directory (`~/.sessionkeep/` in
//! production) and deserializes it into [`StoreConfig`]. Falls back to
//! defaults when the file is missing or malformed.

use std::path::{Path, PathBuf};

use sessionkeep_types::config::StoreConfig;
use sessionkeep_types::error::ConfigError;

pub const CONFIG_FILE_NAME: &str = "sessionkeep.toml";

/// Resolve the data directory.
///
/// Priority:
/// 1. `SESSIONKEEP_DATA_DIR` environment variable
/// 2. `~/.sessionkeep`
/// 3. `./.sessionkeep`
pub fn resolve_data_dir() -> PathBuf {
    data_dir_from(std::env::var("SESSIONKEEP_DATA_DIR").ok())
}

fn data_dir_from(env_dir: Option<String>) -> PathBuf {
    if let Some(dir) = env_dir {
        return PathBuf::from(dir);
    }

    if let Some(home) = dirs::home_dir() {
        return home.join(".sessionkeep");
    }

    PathBuf::from(".sessionkeep")
}

/// Load configuration from `{data_dir}/sessionkeep.toml`.
///
/// - Missing file: returns [`StoreConfig::default()`].
/// - Unreadable or unparsable file: logs a warning and returns the default.
pub async fn load_store_config(data_dir: &Path) -> StoreConfig {
    let config_path = data_dir.join(CONFIG_FILE_NAME);

    let content = match tokio::fs::read_to_string(&config_path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No {CONFIG_FILE_NAME} found at {}, using defaults", config_path.display());
            return StoreConfig::default();
        }
        Err(err) => {
            tracing::warn!("Failed to read {}: {err}, using defaults", config_path.display());
            return StoreConfig::default();
        }
    };

    match toml::from_str::<StoreConfig>(&content) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!(
                "Failed to parse {}: {err}, using defaults",
                config_path.display()
            );
            StoreConfig::default()
        }
    }
}

/// Strict variant of [`load_store_config`]: a missing file still yields the
/// default, but read and parse failures are returned.
pub async fn try_load_store_config(data_dir: &Path) -> Result<StoreConfig, ConfigError> {
    let config_path = data_dir.join(CONFIG_FILE_NAME);
    let content = match tokio::fs::read_to_string(&config_path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Ok(StoreConfig::default());
        }
        Err(err) => return Err(ConfigError::Io(err)),
    };
    toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))
}
