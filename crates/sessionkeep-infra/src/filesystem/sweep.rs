//! Orphan sweep for the filesystem credential store.
//!
//! Compares on-disk session directories against the session ids the
//! backing stores know about. Legacy `auth_info_{id}` directories are
//! renamed to the canonical `session_{id}` name first. Canonical
//! directories with no matching id are removed once their mtime is older
//! than the grace period; younger orphans are left alone.

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::{Duration, SystemTime};

use serde::Serialize;

use sessionkeep_types::error::RepositoryError;

use super::{FileCredentialStore, LEGACY_DIR_PREFIX, SESSION_DIR_PREFIX, canonical_id};

/// Outcome of one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Legacy directories renamed to the canonical scheme.
    pub migrated: usize,
    /// Orphan directories removed.
    pub removed: usize,
    /// Orphan directories kept because they are within the grace period.
    pub retained: usize,
}

pub struct OrphanSweeper {
    store: FileCredentialStore,
    grace: Duration,
    remove_attempts: u32,
}

impl OrphanSweeper {
    pub fn new(store: FileCredentialStore, grace: Duration) -> Self {
        Self {
            store,
            grace,
            remove_attempts: 3,
        }
    }

    pub fn with_remove_attempts(mut self, attempts: u32) -> Self {
        self.remove_attempts = attempts.max(1);
        self
    }

    pub fn grace(&self) -> Duration {
        self.grace
    }

    /// Run one sweep. `known` holds external session ids; `now` is the
    /// reference time for the grace period.
    pub async fn sweep(
        &self,
        known: &HashSet<String>,
        now: SystemTime,
    ) -> Result<SweepReport, RepositoryError> {
        let known: HashSet<String> = known.iter().map(|id| canonical_id(id)).collect();
        let mut report = SweepReport::default();

        for (name, path) in self.session_dirs().await? {
            if let Some(id) = name.strip_prefix(LEGACY_DIR_PREFIX) {
                let target = self.store.session_dir(id);
                if tokio::fs::try_exists(&target).await.unwrap_or(false) {
                    tracing::warn!(
                        legacy = %path.display(),
                        "canonical directory already exists, leaving legacy directory"
                    );
                    continue;
                }
                match tokio::fs::rename(&path, &target).await {
                    Ok(()) => {
                        tracing::info!(session_id = %id, "migrated legacy auth directory");
                        report.migrated += 1;
                    }
                    Err(e) => {
                        tracing::warn!(legacy = %path.display(), error = %e, "legacy migration failed");
                    }
                }
            }
        }

        for (name, path) in self.session_dirs().await? {
            let Some(id) = name.strip_prefix(SESSION_DIR_PREFIX) else {
                continue;
            };
            if known.contains(id) {
                continue;
            }

            let modified = tokio::fs::metadata(&path)
                .await
                .and_then(|m| m.modified())
                .unwrap_or(now);
            let age = now.duration_since(modified).unwrap_or(Duration::ZERO);

            if age <= self.grace {
                report.retained += 1;
                continue;
            }

            match super::remove_dir_with_retry(&path, self.remove_attempts).await {
                Ok(()) => {
                    tracing::info!(session_id = %id, age_secs = age.as_secs(), "removed orphan auth directory");
                    report.removed += 1;
                }
                Err(e) => {
                    tracing::warn!(session_id = %id, error = %e, "failed to remove orphan auth directory");
                }
            }
        }

        tracing::debug!(
            migrated = report.migrated,
            removed = report.removed,
            retained = report.retained,
            "orphan sweep finished"
        );
        Ok(report)
    }

    /// Session directories (canonical and legacy) directly under the base dir.
    async fn session_dirs(&self) -> Result<Vec<(String, PathBuf)>, RepositoryError> {
        let base = self.store.base_dir();
        let mut entries = match tokio::fs::read_dir(base).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(RepositoryError::Query(format!(
                    "failed to list {}: {e}",
                    base.display()
                )));
            }
        };

        let mut dirs = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?
        {
            if !entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false) {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with(SESSION_DIR_PREFIX) || name.starts_with(LEGACY_DIR_PREFIX) {
                dirs.push((name, entry.path()));
            }
        }
        dirs.sort();
        Ok(dirs)
    }
}
