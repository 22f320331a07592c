//! Shared redb handle for the document store.
//!
//! redb holds an exclusive lock on its file, so the session and credential
//! adapters share one lazily opened `Database`. redb calls are blocking and
//! run on the blocking thread pool.
//!
//! Tables:
//! - `sessions`: session_id -> JSON `SessionRecord`
//! - `credentials`: "{session_id}\0{file_name}" -> encoded payload text

use std::path::{Path, PathBuf};
use std::sync::Arc;

use redb::{Database, TableDefinition};
use tokio::sync::RwLock;

use sessionkeep_types::error::RepositoryError;

pub(crate) const SESSIONS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("sessions");

pub(crate) const CREDENTIALS_TABLE: TableDefinition<&str, &[u8]> =
    TableDefinition::new("credentials");

/// Separator between session id and file name in credential keys.
pub(crate) const KEY_SEPARATOR: char = '\0';

#[derive(Clone)]
pub struct DocumentDb {
    path: PathBuf,
    db: Arc<RwLock<Option<Arc<Database>>>>,
}

impl DocumentDb {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            db: Arc::new(RwLock::new(None)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Open (or create) the database file and its tables if not open yet.
    pub async fn open(&self) -> Result<(), RepositoryError> {
        if self.db.read().await.is_some() {
            return Ok(());
        }
        let mut slot = self.db.write().await;
        if slot.is_some() {
            return Ok(());
        }

        let path = self.path.clone();
        let db = tokio::task::spawn_blocking(move || -> Result<Database, redb::Error> {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(redb::Error::Io)?;
            }
            let db = Database::create(&path)?;
            let write_txn = db.begin_write()?;
            {
                let _ = write_txn.open_table(SESSIONS_TABLE)?;
                let _ = write_txn.open_table(CREDENTIALS_TABLE)?;
            }
            write_txn.commit()?;
            Ok(db)
        })
        .await
        .map_err(|e| RepositoryError::Unavailable(format!("document store: {e}")))?
        .map_err(|e| RepositoryError::Unavailable(format!("document store: {e}")))?;

        tracing::debug!(path = %self.path.display(), "document store opened");
        *slot = Some(Arc::new(db));
        Ok(())
    }

    /// Run a blocking closure against the open database.
    pub(crate) async fn with_db<T, F>(&self, f: F) -> Result<T, RepositoryError>
    where
        T: Send + 'static,
        F: FnOnce(&Database) -> Result<T, RepositoryError> + Send + 'static,
    {
        let db = self
            .db
            .read()
            .await
            .clone()
            .ok_or_else(|| RepositoryError::Unavailable("document store not open".to_string()))?;
        tokio::task::spawn_blocking(move || f(&db))
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?
    }

    /// Open if needed, then run a read transaction.
    pub async fn ping(&self) -> Result<(), RepositoryError> {
        self.open().await?;
        self.with_db(|db| {
            let read_txn = db.begin_read().map_err(query_err)?;
            read_txn.open_table(SESSIONS_TABLE).map_err(query_err)?;
            Ok(())
        })
        .await
    }

    pub async fn close(&self) {
        if self.db.write().await.take().is_some() {
            tracing::debug!(path = %self.path.display(), "document store closed");
        }
    }
}

pub(crate) fn query_err(e: impl Into<redb::Error>) -> RepositoryError {
    RepositoryError::Query(e.into().to_string())
}

/// Storage key for one credential entry.
pub(crate) fn credential_key(session_id: &str, file_name: &str) -> String {
    format!("{session_id}{KEY_SEPARATOR}{file_name}")
}

/// Half-open key range covering every credential of a session.
pub(crate) fn session_range(session_id: &str) -> (String, String) {
    (
        format!("{session_id}{KEY_SEPARATOR}"),
        format!("{session_id}\u{1}"),
    )
}
