//! Filesystem credential store, used as the fallback behind the database
//! backends.
//!
//! Layout under `{data_dir}/auth/`:
//! ```text
//! session_{id}/
//!   creds.json
//!   pre-key-1.json
//!   session-abc.json
//! auth_info_{id}/      legacy naming, migrated by the orphan sweep
//! ```

pub mod sweep;

use std::path::{Path, PathBuf};
use std::time::Duration;

use uuid::Uuid;

use sessionkeep_core::backend::CredentialBackend;
use sessionkeep_types::credential::{CredentialKey, sanitize_file_name};
use sessionkeep_types::error::RepositoryError;

pub use sweep::{OrphanSweeper, SweepReport};

/// Prefix of canonical session directories.
pub const SESSION_DIR_PREFIX: &str = "session_";

/// Prefix of directories written by older deployments.
pub const LEGACY_DIR_PREFIX: &str = "auth_info_";

const FILE_EXTENSION: &str = "json";
const REMOVE_BACKOFF_STEP: Duration = Duration::from_millis(100);

/// Normalize an external session id to the id used in directory names.
///
/// Strips a known directory prefix and sanitizes the remainder.
pub fn canonical_id(external_id: &str) -> String {
    let stripped = external_id
        .strip_prefix(SESSION_DIR_PREFIX)
        .or_else(|| external_id.strip_prefix(LEGACY_DIR_PREFIX))
        .unwrap_or(external_id);
    sanitize_file_name(stripped)
}

#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    base_dir: PathBuf,
    remove_attempts: u32,
}

impl FileCredentialStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            remove_attempts: 3,
        }
    }

    /// Store rooted at `{data_dir}/auth`.
    pub fn in_data_dir(data_dir: &Path) -> Self {
        Self::new(data_dir.join("auth"))
    }

    pub fn with_remove_attempts(mut self, attempts: u32) -> Self {
        self.remove_attempts = attempts.max(1);
        self
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// `{base}/session_{canonical id}`.
    pub fn session_dir(&self, session_id: &str) -> PathBuf {
        self.base_dir
            .join(format!("{SESSION_DIR_PREFIX}{}", canonical_id(session_id)))
    }

    /// `{base}/auth_info_{canonical id}`.
    pub fn legacy_dir(&self, session_id: &str) -> PathBuf {
        self.base_dir
            .join(format!("{LEGACY_DIR_PREFIX}{}", canonical_id(session_id)))
    }

    fn file_path(dir: &Path, file_name: &str) -> PathBuf {
        dir.join(format!("{file_name}.{FILE_EXTENSION}"))
    }

    /// Remove a session's directory (and any legacy directory) recursively.
    ///
    /// Returns whether anything was removed.
    pub async fn remove_session_dir(&self, session_id: &str) -> Result<bool, RepositoryError> {
        let mut removed = false;
        for dir in [self.session_dir(session_id), self.legacy_dir(session_id)] {
            if tokio::fs::try_exists(&dir).await.unwrap_or(false) {
                remove_dir_with_retry(&dir, self.remove_attempts).await?;
                removed = true;
            }
        }
        Ok(removed)
    }

    async fn count_files(dir: &Path) -> usize {
        let Ok(mut entries) = tokio::fs::read_dir(dir).await else {
            return 0;
        };
        let mut count = 0;
        while let Ok(Some(entry)) = entries.next_entry().await {
            if entry.path().extension().and_then(|e| e.to_str()) == Some(FILE_EXTENSION) {
                count += 1;
            }
        }
        count
    }
}

/// Recursively remove `path`, retrying transient failures with a linear
/// backoff. A directory that is already gone counts as removed.
pub async fn remove_dir_with_retry(path: &Path, attempts: u32) -> Result<(), RepositoryError> {
    let attempts = attempts.max(1);
    let mut last_error = None;

    for attempt in 1..=attempts {
        match tokio::fs::remove_dir_all(path).await {
            Ok(()) => return Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => {
                tracing::debug!(
                    path = %path.display(),
                    attempt,
                    error = %e,
                    "directory removal failed"
                );
                last_error = Some(e);
                if attempt < attempts {
                    tokio::time::sleep(REMOVE_BACKOFF_STEP * attempt).await;
                }
            }
        }
    }

    let error = last_error.map(|e| e.to_string()).unwrap_or_default();
    tracing::warn!(path = %path.display(), attempts, %error, "giving up on directory removal");
    Err(RepositoryError::Query(format!(
        "failed to remove {}: {error}",
        path.display()
    )))
}

fn io_err(context: &str, path: &Path, e: std::io::Error) -> RepositoryError {
    RepositoryError::Query(format!("{context} {}: {e}", path.display()))
}

impl CredentialBackend for FileCredentialStore {
    fn name(&self) -> &str {
        "file"
    }

    async fn read(&self, key: &CredentialKey) -> Result<Option<String>, RepositoryError> {
        for dir in [
            self.session_dir(&key.session_id),
            self.legacy_dir(&key.session_id),
        ] {
            let path = Self::file_path(&dir, &key.file_name);
            match tokio::fs::read_to_string(&path).await {
                Ok(content) => return Ok(Some(content)),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(io_err("failed to read", &path, e)),
            }
        }
        Ok(None)
    }

    async fn write(&self, key: &CredentialKey, payload: &str) -> Result<(), RepositoryError> {
        let dir = self.session_dir(&key.session_id);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| io_err("failed to create", &dir, e))?;

        let target = Self::file_path(&dir, &key.file_name);
        let tmp = dir.join(format!(
            "{}.{FILE_EXTENSION}.tmp-{}",
            key.file_name,
            Uuid::now_v7().simple()
        ));

        if let Err(e) = tokio::fs::write(&tmp, payload).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(io_err("failed to write", &tmp, e));
        }
        if let Err(e) = tokio::fs::rename(&tmp, &target).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(io_err("failed to replace", &target, e));
        }
        Ok(())
    }

    async fn delete(&self, key: &CredentialKey) -> Result<bool, RepositoryError> {
        let mut removed = false;
        for dir in [
            self.session_dir(&key.session_id),
            self.legacy_dir(&key.session_id),
        ] {
            let path = Self::file_path(&dir, &key.file_name);
            match tokio::fs::remove_file(&path).await {
                Ok(()) => removed = true,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(io_err("failed to delete", &path, e)),
            }
        }
        Ok(removed)
    }

    async fn delete_session(&self, session_id: &str) -> Result<usize, RepositoryError> {
        let count = Self::count_files(&self.session_dir(session_id)).await
            + Self::count_files(&self.legacy_dir(session_id)).await;
        self.remove_session_dir(session_id).await?;
        Ok(count)
    }

    async fn list_sessions(&self) -> Result<Vec<String>, RepositoryError> {
        let mut entries = match tokio::fs::read_dir(&self.base_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_err("failed to list", &self.base_dir, e)),
        };

        let mut sessions = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| io_err("failed to list", &self.base_dir, e))?
        {
            let is_dir = entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false);
            if !is_dir {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with(SESSION_DIR_PREFIX) || name.starts_with(LEGACY_DIR_PREFIX) {
                sessions.push(canonical_id(&name));
            }
        }
        sessions.sort();
        sessions.dedup();
        Ok(sessions)
    }

    async fn ping(&self) -> Result<(), RepositoryError> {
        tokio::fs::create_dir_all(&self.base_dir)
            .await
            .map_err(|e| RepositoryError::Unavailable(format!("{}: {e}", self.base_dir.display())))
    }

    async fn close(&self) -> Result<(), RepositoryError> {
        Ok(())
    }
}
