//! Store configuration types for sessionkeep.
//!
//! `StoreConfig` represents `sessionkeep.toml`. Every field has a default so
//! an empty or missing file yields a working configuration. Durations are
//! written as integer milliseconds.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Which backing store holds protocol credentials.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialBackendKind {
    /// Relational store (SQLite `auth_credentials` table).
    #[default]
    Sqlite,
    /// Document store (redb `credentials` table).
    Document,
    /// Plain files under `{data_dir}/auth`.
    File,
}

/// Top-level configuration for the persistence layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// SQLite URL. Defaults to `{data_dir}/sessions.db` when unset.
    #[serde(default)]
    pub database_url: Option<String>,

    /// redb file path. Defaults to `{data_dir}/sessions.redb` when unset.
    #[serde(default)]
    pub document_path: Option<String>,

    /// Credential file directory. Defaults to `{data_dir}/auth` when unset.
    #[serde(default)]
    pub auth_dir: Option<String>,

    #[serde(default)]
    pub credential_backend: CredentialBackendKind,

    /// Wrap the credential backend with the file store as a secondary path.
    #[serde(default = "default_true")]
    pub file_fallback: bool,

    #[serde(default = "default_session_cache_ttl_ms")]
    pub session_cache_ttl_ms: u64,

    #[serde(default = "default_record_cache_ttl_ms")]
    pub record_cache_ttl_ms: u64,

    #[serde(default = "default_cache_sweep_interval_ms")]
    pub cache_sweep_interval_ms: u64,

    #[serde(default = "default_session_debounce_ms")]
    pub session_debounce_ms: u64,

    #[serde(default = "default_credential_debounce_ms")]
    pub credential_debounce_ms: u64,

    #[serde(default = "default_connect_attempts")]
    pub connect_attempts: u32,

    #[serde(default = "default_connect_backoff_base_ms")]
    pub connect_backoff_base_ms: u64,

    #[serde(default = "default_probe_interval_ms")]
    pub probe_interval_ms: u64,

    /// Attempts for reading the root credential record.
    #[serde(default = "default_credential_read_attempts")]
    pub credential_read_attempts: u32,

    #[serde(default = "default_credential_retry_step_ms")]
    pub credential_retry_step_ms: u64,

    #[serde(default = "default_batch_read_group")]
    pub batch_read_group: usize,

    #[serde(default = "default_batch_write_group")]
    pub batch_write_group: usize,

    #[serde(default = "default_orphan_grace_ms")]
    pub orphan_grace_ms: u64,

    #[serde(default = "default_dir_remove_attempts")]
    pub dir_remove_attempts: u32,
}

fn default_true() -> bool {
    true
}

fn default_session_cache_ttl_ms() -> u64 {
    60_000
}

fn default_record_cache_ttl_ms() -> u64 {
    300_000
}

fn default_cache_sweep_interval_ms() -> u64 {
    120_000
}

fn default_session_debounce_ms() -> u64 {
    300
}

fn default_credential_debounce_ms() -> u64 {
    50
}

fn default_connect_attempts() -> u32 {
    3
}

fn default_connect_backoff_base_ms() -> u64 {
    500
}

fn default_probe_interval_ms() -> u64 {
    60_000
}

fn default_credential_read_attempts() -> u32 {
    3
}

fn default_credential_retry_step_ms() -> u64 {
    1_000
}

fn default_batch_read_group() -> usize {
    10
}

fn default_batch_write_group() -> usize {
    20
}

fn default_orphan_grace_ms() -> u64 {
    2 * 60 * 60 * 1_000
}

fn default_dir_remove_attempts() -> u32 {
    3
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            document_path: None,
            auth_dir: None,
            credential_backend: CredentialBackendKind::default(),
            file_fallback: default_true(),
            session_cache_ttl_ms: default_session_cache_ttl_ms(),
            record_cache_ttl_ms: default_record_cache_ttl_ms(),
            cache_sweep_interval_ms: default_cache_sweep_interval_ms(),
            session_debounce_ms: default_session_debounce_ms(),
            credential_debounce_ms: default_credential_debounce_ms(),
            connect_attempts: default_connect_attempts(),
            connect_backoff_base_ms: default_connect_backoff_base_ms(),
            probe_interval_ms: default_probe_interval_ms(),
            credential_read_attempts: default_credential_read_attempts(),
            credential_retry_step_ms: default_credential_retry_step_ms(),
            batch_read_group: default_batch_read_group(),
            batch_write_group: default_batch_write_group(),
            orphan_grace_ms: default_orphan_grace_ms(),
            dir_remove_attempts: default_dir_remove_attempts(),
        }
    }
}

impl StoreConfig {
    pub fn session_cache_ttl(&self) -> Duration {
        Duration::from_millis(self.session_cache_ttl_ms)
    }

    pub fn record_cache_ttl(&self) -> Duration {
        Duration::from_millis(self.record_cache_ttl_ms)
    }

    pub fn cache_sweep_interval(&self) -> Duration {
        Duration::from_millis(self.cache_sweep_interval_ms)
    }

    pub fn session_debounce(&self) -> Duration {
        Duration::from_millis(self.session_debounce_ms)
    }

    pub fn credential_debounce(&self) -> Duration {
        Duration::from_millis(self.credential_debounce_ms)
    }

    pub fn connect_backoff_base(&self) -> Duration {
        Duration::from_millis(self.connect_backoff_base_ms)
    }

    pub fn probe_interval(&self) -> Duration {
        Duration::from_millis(self.probe_interval_ms)
    }

    pub fn credential_retry_step(&self) -> Duration {
        Duration::from_millis(self.credential_retry_step_ms)
    }

    pub fn orphan_grace(&self) -> Duration {
        Duration::from_millis(self.orphan_grace_ms)
    }
}
