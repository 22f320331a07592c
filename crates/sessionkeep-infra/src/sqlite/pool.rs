//! Database pool with split reader/writer connections in WAL mode.
//!
//! SQLite allows only one writer at a time. `DatabasePool` pairs a
//! multi-connection reader pool for concurrent reads with a single-connection
//! writer pool for serialized writes. `SharedPool` opens it lazily so the
//! session and credential adapters can share one pool and reconnect after a
//! failed start.

use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use tokio::sync::RwLock;

use sessionkeep_types::error::RepositoryError;

/// Split read/write pool for SQLite with WAL mode.
///
/// - `reader`: Multi-connection pool (up to 8) for concurrent SELECT queries.
/// - `writer`: Single-connection pool for serialized INSERT/UPDATE/DELETE.
#[derive(Clone)]
pub struct DatabasePool {
    pub reader: SqlitePool,
    pub writer: SqlitePool,
}

impl DatabasePool {
    /// Open both pools and run migrations on the writer.
    ///
    /// Both pools use WAL journal mode and a 5-second busy timeout.
    pub async fn new(database_url: &str) -> Result<Self, sqlx::Error> {
        let base_opts = SqliteConnectOptions::from_str(database_url)?
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5))
            .create_if_missing(true);

        let read_opts = base_opts.clone().read_only(true);
        let write_opts = base_opts;

        let writer = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(write_opts)
            .await?;

        // Run migrations on writer before opening reader pool
        sqlx::migrate!("../../migrations").run(&writer).await?;

        let reader = SqlitePoolOptions::new()
            .max_connections(8)
            .connect_with(read_opts)
            .await?;

        Ok(Self { reader, writer })
    }

    pub async fn close(&self) {
        self.writer.close().await;
        self.reader.close().await;
    }
}

/// Lazily opened `DatabasePool` shared between adapters.
#[derive(Clone)]
pub struct SharedPool {
    database_url: String,
    pool: Arc<RwLock<Option<DatabasePool>>>,
}

impl SharedPool {
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            pool: Arc::new(RwLock::new(None)),
        }
    }

    /// Open the pool if it is not open yet.
    pub async fn open(&self) -> Result<DatabasePool, RepositoryError> {
        if let Some(pool) = self.pool.read().await.as_ref() {
            return Ok(pool.clone());
        }
        let mut slot = self.pool.write().await;
        if let Some(pool) = slot.as_ref() {
            return Ok(pool.clone());
        }
        let pool = DatabasePool::new(&self.database_url)
            .await
            .map_err(|e| RepositoryError::Unavailable(format!("sqlite: {e}")))?;
        *slot = Some(pool.clone());
        Ok(pool)
    }

    /// The open pool, or `Unavailable` if `open` has not succeeded.
    pub async fn get(&self) -> Result<DatabasePool, RepositoryError> {
        self.pool
            .read()
            .await
            .clone()
            .ok_or_else(|| RepositoryError::Unavailable("sqlite: pool not open".to_string()))
    }

    pub async fn ping(&self) -> Result<(), RepositoryError> {
        let pool = self.open().await?;
        sqlx::query("SELECT 1")
            .execute(&pool.reader)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;
        Ok(())
    }

    pub async fn close(&self) {
        if let Some(pool) = self.pool.write().await.take() {
            pool.close().await;
        }
    }
}

/// Default database URL inside a data directory: `{data_dir}/sessions.db`.
pub fn default_database_url(data_dir: &Path) -> String {
    format!("sqlite://{}", data_dir.join("sessions.db").display())
}
