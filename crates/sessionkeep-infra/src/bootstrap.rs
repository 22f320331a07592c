//! Store wiring: builds the adapters from a `StoreConfig`, connects the
//! coordinator and selects the credential backend.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use sessionkeep_core::auth_state::SessionAuthState;
use sessionkeep_core::backend::{BoxCredentialBackend, FallbackCredentialBackend, ManagedBackend};
use sessionkeep_core::coordinator::{CoordinatorSettings, SessionCoordinator};
use sessionkeep_core::credential::{CredentialSettings, CredentialStore};
use sessionkeep_types::config::{CredentialBackendKind, StoreConfig};
use sessionkeep_types::error::RepositoryError;
use sessionkeep_types::session::ConnectionStatusReport;

use crate::document::{DocumentCredentialBackend, DocumentDb, DocumentSessionBackend};
use crate::filesystem::{FileCredentialStore, OrphanSweeper, SweepReport};
use crate::sqlite::pool::default_database_url;
use crate::sqlite::{SharedPool, SqliteCredentialBackend, SqliteSessionBackend};

/// Everything a host process needs from the persistence layer.
pub struct Stores {
    pub data_dir: PathBuf,
    pub config: StoreConfig,
    pub coordinator: Arc<SessionCoordinator>,
    pub credentials: Arc<CredentialStore>,
    pub files: FileCredentialStore,
    /// Database-only view of the credential store, used to decide which
    /// session directories are orphans. `None` when files are the primary.
    credential_index: Option<BoxCredentialBackend>,
    connection: ConnectionStatusReport,
}

/// Open both session backends, connect the coordinator and build the
/// credential store.
///
/// Only fails if the data directory cannot be created. Backends that do not
/// come up are left to the health monitor.
pub async fn open_stores(data_dir: &Path, config: StoreConfig) -> Result<Stores, RepositoryError> {
    tokio::fs::create_dir_all(data_dir).await.map_err(|e| {
        RepositoryError::Unavailable(format!("cannot create {}: {e}", data_dir.display()))
    })?;

    let database_url = config
        .database_url
        .clone()
        .unwrap_or_else(|| default_database_url(data_dir));
    let document_path = config
        .document_path
        .as_ref()
        .map(PathBuf::from)
        .unwrap_or_else(|| data_dir.join("sessions.redb"));
    let auth_dir = config
        .auth_dir
        .as_ref()
        .map(PathBuf::from)
        .unwrap_or_else(|| data_dir.join("auth"));

    let pool = SharedPool::new(database_url);
    let document = DocumentDb::new(document_path);
    let files = FileCredentialStore::new(auth_dir).with_remove_attempts(config.dir_remove_attempts);

    let coordinator = SessionCoordinator::new(
        ManagedBackend::new(DocumentSessionBackend::new(document.clone())),
        ManagedBackend::new(SqliteSessionBackend::new(pool.clone())),
        CoordinatorSettings::from(&config),
    );
    let connection = coordinator.connect().await;
    tracing::info!(
        document = connection.document_store_up,
        relational = connection.relational_store_up,
        "session backends connected"
    );

    let credential_backend = select_credential_backend(&config, &pool, &document, &files);
    let credential_index = match config.credential_backend {
        CredentialBackendKind::Sqlite => Some(BoxCredentialBackend::new(
            SqliteCredentialBackend::new(pool.clone()),
        )),
        CredentialBackendKind::Document => Some(BoxCredentialBackend::new(
            DocumentCredentialBackend::new(document.clone()),
        )),
        CredentialBackendKind::File => None,
    };

    let credentials = CredentialStore::new(credential_backend, CredentialSettings::from(&config));
    credentials.start();
    if !credentials.ping().await {
        tracing::warn!(
            backend = credentials.backend_name(),
            "credential backend not reachable at startup"
        );
    }

    Ok(Stores {
        data_dir: data_dir.to_path_buf(),
        config,
        coordinator: Arc::new(coordinator),
        credentials: Arc::new(credentials),
        files,
        credential_index,
        connection,
    })
}

fn select_credential_backend(
    config: &StoreConfig,
    pool: &SharedPool,
    document: &DocumentDb,
    files: &FileCredentialStore,
) -> BoxCredentialBackend {
    let fallback = config.file_fallback;
    let backend = match config.credential_backend {
        CredentialBackendKind::File => BoxCredentialBackend::new(files.clone()),
        CredentialBackendKind::Sqlite if fallback => BoxCredentialBackend::new(
            FallbackCredentialBackend::new(SqliteCredentialBackend::new(pool.clone()), files.clone()),
        ),
        CredentialBackendKind::Sqlite => {
            BoxCredentialBackend::new(SqliteCredentialBackend::new(pool.clone()))
        }
        CredentialBackendKind::Document if fallback => {
            BoxCredentialBackend::new(FallbackCredentialBackend::new(
                DocumentCredentialBackend::new(document.clone()),
                files.clone(),
            ))
        }
        CredentialBackendKind::Document => {
            BoxCredentialBackend::new(DocumentCredentialBackend::new(document.clone()))
        }
    };
    tracing::debug!(backend = backend.name(), "credential backend selected");
    backend
}

impl Stores {
    pub fn status(&self) -> ConnectionStatusReport {
        self.coordinator.get_connection_status()
    }

    /// Status captured right after connecting.
    pub fn initial_status(&self) -> ConnectionStatusReport {
        self.connection
    }

    /// Protocol-facing credential hooks bound to one session.
    pub fn auth_state(&self, session_id: &str) -> SessionAuthState {
        SessionAuthState::new(session_id, Arc::clone(&self.credentials))
    }

    /// Session ids known to the database backends: session records from
    /// every available session backend plus database-held credentials.
    ///
    /// Fails when no session backend is available, a session listing fails,
    /// or the credential index cannot be listed.
    pub async fn known_session_ids(&self) -> Result<HashSet<String>, RepositoryError> {
        let mut known = self.coordinator.known_session_ids().await.ok_or_else(|| {
            RepositoryError::Unavailable("session backends could not be listed".to_string())
        })?;
        if let Some(index) = &self.credential_index {
            known.extend(index.list_sessions().await?);
        }
        Ok(known)
    }

    /// Run the file orphan sweep against the ids the databases know about.
    ///
    /// Refuses to run unless every available session backend and the
    /// credential index could be listed.
    pub async fn sweep_orphans(&self) -> Result<SweepReport, RepositoryError> {
        self.sweep_orphans_at(SystemTime::now()).await
    }

    pub async fn sweep_orphans_at(&self, now: SystemTime) -> Result<SweepReport, RepositoryError> {
        let known = self.known_session_ids().await?;
        OrphanSweeper::new(self.files.clone(), self.config.orphan_grace())
            .with_remove_attempts(self.config.dir_remove_attempts)
            .sweep(&known, now)
            .await
    }

    /// Delete a session everywhere: record, credentials and file directory.
    pub async fn purge_session(&self, session_id: &str) -> bool {
        let record = self.coordinator.completely_delete_session(session_id).await;
        let credentials = self.credentials.delete_session_data(session_id).await;
        let files = self
            .files
            .remove_session_dir(session_id)
            .await
            .unwrap_or_else(|e| {
                tracing::warn!(session_id, error = %e, "failed to remove session directory");
                false
            });
        record || credentials > 0 || files
    }

    /// Flush pending credential writes and session patches, then close
    /// every backend.
    ///
    /// Both buffers are flushed before anything closes: the adapters share
    /// one SQLite pool and one redb handle.
    pub async fn close(&self) {
        tokio::join!(
            self.coordinator.flush_write_buffers(),
            self.credentials.flush()
        );
        self.coordinator.close().await;
        self.credentials.close().await;
        if let Some(index) = &self.credential_index {
            if let Err(e) = index.close().await {
                tracing::warn!(backend = index.name(), error = %e, "credential index close failed");
            }
        }
    }
}
