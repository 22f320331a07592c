//! SQLite session backend (the relational store).
//!
//! Implements `SessionBackend` from `sessionkeep-core` using sqlx with split
//! read/write pools.

use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::Row;

use sessionkeep_core::backend::SessionBackend;
use sessionkeep_types::error::RepositoryError;
use sessionkeep_types::session::{
    ConnectionStatus, SessionPatch, SessionRecord, SessionSource,
};

use super::pool::SharedPool;

pub struct SqliteSessionBackend {
    pool: SharedPool,
}

impl SqliteSessionBackend {
    pub fn new(pool: SharedPool) -> Self {
        Self { pool }
    }
}

/// Internal row type for mapping SQLite rows to `SessionRecord`.
struct SessionRow {
    session_id: String,
    owner_id: String,
    phone_number: Option<String>,
    is_connected: bool,
    connection_status: String,
    reconnect_attempts: i64,
    source: String,
    detected: bool,
    created_at: String,
    updated_at: String,
}

impl SessionRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            session_id: row.try_get("session_id")?,
            owner_id: row.try_get("owner_id")?,
            phone_number: row.try_get("phone_number")?,
            is_connected: row.try_get("is_connected")?,
            connection_status: row.try_get("connection_status")?,
            reconnect_attempts: row.try_get("reconnect_attempts")?,
            source: row.try_get("source")?,
            detected: row.try_get("detected")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn into_record(self) -> Result<SessionRecord, RepositoryError> {
        let connection_status: ConnectionStatus = self
            .connection_status
            .parse()
            .map_err(|e: String| RepositoryError::Query(e))?;

        let source: SessionSource = self
            .source
            .parse()
            .map_err(|e: String| RepositoryError::Query(e))?;

        Ok(SessionRecord {
            session_id: self.session_id,
            owner_id: self.owner_id,
            phone_number: self.phone_number,
            is_connected: self.is_connected,
            connection_status,
            reconnect_attempts: u32::try_from(self.reconnect_attempts).unwrap_or(0),
            source,
            detected: self.detected,
            created_at: parse_datetime(&self.created_at)?,
            updated_at: parse_datetime(&self.updated_at)?,
        })
    }
}

pub(crate) fn parse_datetime(s: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Query(format!("invalid datetime: {e}")))
}

/// Fixed-width RFC 3339 so `ORDER BY updated_at` sorts chronologically.
pub(crate) fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn map_rows(rows: Vec<sqlx::sqlite::SqliteRow>) -> Result<Vec<SessionRecord>, RepositoryError> {
    rows.iter()
        .map(|row| {
            SessionRow::from_row(row)
                .map_err(|e| RepositoryError::Query(e.to_string()))?
                .into_record()
        })
        .collect()
}

impl SessionBackend for SqliteSessionBackend {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn connect(&self) -> Result<(), RepositoryError> {
        self.pool.open().await.map(|_| ())
    }

    async fn save_session(&self, record: &SessionRecord) -> Result<(), RepositoryError> {
        let pool = self.pool.get().await?;
        sqlx::query(
            "INSERT INTO sessions (session_id, owner_id, phone_number, is_connected, connection_status, reconnect_attempts, source, detected, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(session_id) DO UPDATE SET
                owner_id = excluded.owner_id,
                phone_number = excluded.phone_number,
                is_connected = excluded.is_connected,
                connection_status = excluded.connection_status,
                reconnect_attempts = excluded.reconnect_attempts,
                source = excluded.source,
                detected = excluded.detected,
                created_at = excluded.created_at,
                updated_at = excluded.updated_at",
        )
        .bind(&record.session_id)
        .bind(&record.owner_id)
        .bind(&record.phone_number)
        .bind(record.is_connected)
        .bind(record.connection_status.to_string())
        .bind(i64::from(record.reconnect_attempts))
        .bind(record.source.to_string())
        .bind(record.detected)
        .bind(format_datetime(&record.created_at))
        .bind(format_datetime(&record.updated_at))
        .execute(&pool.writer)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        Ok(())
    }

    async fn get_session(&self, session_id: &str) -> Result<Option<SessionRecord>, RepositoryError> {
        let pool = self.pool.get().await?;
        let row = sqlx::query("SELECT * FROM sessions WHERE session_id = ?")
            .bind(session_id)
            .fetch_optional(&pool.reader)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        match row {
            Some(row) => {
                let session_row =
                    SessionRow::from_row(&row).map_err(|e| RepositoryError::Query(e.to_string()))?;
                Ok(Some(session_row.into_record()?))
            }
            None => Ok(None),
        }
    }

    async fn update_session(
        &self,
        session_id: &str,
        patch: &SessionPatch,
    ) -> Result<bool, RepositoryError> {
        let pool = self.pool.get().await?;
        // Unset fields bind NULL and COALESCE keeps the stored value.
        let result = sqlx::query(
            "UPDATE sessions SET
                owner_id = COALESCE(?, owner_id),
                phone_number = COALESCE(?, phone_number),
                is_connected = COALESCE(?, is_connected),
                connection_status = COALESCE(?, connection_status),
                reconnect_attempts = COALESCE(?, reconnect_attempts),
                source = COALESCE(?, source),
                detected = COALESCE(?, detected),
                updated_at = ?
             WHERE session_id = ?",
        )
        .bind(&patch.owner_id)
        .bind(&patch.phone_number)
        .bind(patch.is_connected)
        .bind(patch.connection_status.map(|s| s.to_string()))
        .bind(patch.reconnect_attempts.map(i64::from))
        .bind(patch.source.map(|s| s.to_string()))
        .bind(patch.detected)
        .bind(format_datetime(&Utc::now()))
        .bind(session_id)
        .execute(&pool.writer)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_session(&self, session_id: &str) -> Result<bool, RepositoryError> {
        let pool = self.pool.get().await?;
        let result = sqlx::query(
            "UPDATE sessions SET is_connected = 0, connection_status = ?, reconnect_attempts = 0, updated_at = ?
             WHERE session_id = ?",
        )
        .bind(ConnectionStatus::Disconnected.to_string())
        .bind(format_datetime(&Utc::now()))
        .bind(session_id)
        .execute(&pool.writer)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    async fn completely_delete_session(&self, session_id: &str) -> Result<bool, RepositoryError> {
        let pool = self.pool.get().await?;
        let result = sqlx::query("DELETE FROM sessions WHERE session_id = ?")
            .bind(session_id)
            .execute(&pool.writer)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_sessions(&self) -> Result<Vec<SessionRecord>, RepositoryError> {
        let pool = self.pool.get().await?;
        let rows = sqlx::query("SELECT * FROM sessions ORDER BY updated_at DESC")
            .fetch_all(&pool.reader)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        map_rows(rows)
    }

    async fn list_undetected(&self) -> Result<Vec<SessionRecord>, RepositoryError> {
        let pool = self.pool.get().await?;
        let rows = sqlx::query(
            "SELECT * FROM sessions
             WHERE source = ? AND connection_status = ? AND detected = 0
             ORDER BY updated_at DESC",
        )
        .bind(SessionSource::Secondary.to_string())
        .bind(ConnectionStatus::Connected.to_string())
        .fetch_all(&pool.reader)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        map_rows(rows)
    }

    async fn ping(&self) -> Result<(), RepositoryError> {
        self.pool.ping().await
    }

    async fn close(&self) -> Result<(), RepositoryError> {
        self.pool.close().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn backend() -> SqliteSessionBackend {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("test.db").display());
        // Keep the tempdir alive for the whole test
        std::mem::forget(dir);
        let backend = SqliteSessionBackend::new(SharedPool::new(url));
        backend.connect().await.unwrap();
        backend
    }

    #[tokio::test]
    async fn test_save_and_get() {
        let backend = backend().await;
        let record = SessionRecord::new("s1", "owner-1").with_phone_number("4915550001");
        backend.save_session(&record).await.unwrap();

        let fetched = backend.get_session("s1").await.unwrap().unwrap();
        assert_eq!(fetched.owner_id, "owner-1");
        assert_eq!(fetched.phone_number.as_deref(), Some("4915550001"));
        assert_eq!(fetched.connection_status, ConnectionStatus::Connecting);
        assert_eq!(
            format_datetime(&fetched.created_at),
            format_datetime(&record.created_at)
        );
    }

    #[tokio::test]
    async fn test_save_is_upsert() {
        let backend = backend().await;
        backend
            .save_session(&SessionRecord::new("s1", "a"))
            .await
            .unwrap();
        backend
            .save_session(&SessionRecord::new("s1", "b").with_status(ConnectionStatus::Connected))
            .await
            .unwrap();

        let fetched = backend.get_session("s1").await.unwrap().unwrap();
        assert_eq!(fetched.owner_id, "b");
        assert!(fetched.is_connected);
        assert_eq!(backend.list_sessions().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_get_missing() {
        let backend = backend().await;
        assert!(backend.get_session("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_applies_only_set_fields() {
        let backend = backend().await;
        let record = SessionRecord::new("s1", "owner").with_phone_number("555");
        backend.save_session(&record).await.unwrap();

        let patch = SessionPatch::new()
            .status(ConnectionStatus::Connected)
            .reconnect_attempts(2);
        assert!(backend.update_session("s1", &patch).await.unwrap());

        let fetched = backend.get_session("s1").await.unwrap().unwrap();
        assert_eq!(fetched.connection_status, ConnectionStatus::Connected);
        assert!(fetched.is_connected);
        assert_eq!(fetched.reconnect_attempts, 2);
        assert_eq!(fetched.phone_number.as_deref(), Some("555"));
        assert_eq!(fetched.owner_id, "owner");
        assert!(fetched.updated_at >= record.updated_at);
    }

    #[tokio::test]
    async fn test_update_missing_returns_false() {
        let backend = backend().await;
        let patch = SessionPatch::new().detected(true);
        assert!(!backend.update_session("nope", &patch).await.unwrap());
    }

    #[tokio::test]
    async fn test_soft_delete_clears_connection() {
        let backend = backend().await;
        let mut record = SessionRecord::new("s1", "owner").with_status(ConnectionStatus::Connected);
        record.reconnect_attempts = 5;
        backend.save_session(&record).await.unwrap();

        assert!(backend.delete_session("s1").await.unwrap());
        let fetched = backend.get_session("s1").await.unwrap().unwrap();
        assert!(!fetched.is_connected);
        assert_eq!(fetched.connection_status, ConnectionStatus::Disconnected);
        assert_eq!(fetched.reconnect_attempts, 0);
        assert_eq!(fetched.owner_id, "owner");
    }

    #[tokio::test]
    async fn test_hard_delete() {
        let backend = backend().await;
        backend
            .save_session(&SessionRecord::new("s1", "o"))
            .await
            .unwrap();
        assert!(backend.completely_delete_session("s1").await.unwrap());
        assert!(!backend.completely_delete_session("s1").await.unwrap());
        assert!(backend.get_session("s1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_orders_newest_first() {
        let backend = backend().await;
        let base = Utc::now();
        for (i, id) in ["old", "mid", "new"].iter().enumerate() {
            let mut record = SessionRecord::new(*id, "o");
            record.updated_at = base + chrono::Duration::seconds(i as i64);
            backend.save_session(&record).await.unwrap();
        }

        let ids: Vec<String> = backend
            .list_sessions()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.session_id)
            .collect();
        assert_eq!(ids, vec!["new", "mid", "old"]);
    }

    #[tokio::test]
    async fn test_list_undetected() {
        let backend = backend().await;
        let web = SessionRecord::new("web", "o")
            .with_source(SessionSource::Secondary)
            .with_status(ConnectionStatus::Connected);
        let web_pending = SessionRecord::new("web-pending", "o")
            .with_source(SessionSource::Secondary);
        let cmd = SessionRecord::new("cmd", "o").with_status(ConnectionStatus::Connected);
        for record in [&web, &web_pending, &cmd] {
            backend.save_session(record).await.unwrap();
        }

        let undetected = backend.list_undetected().await.unwrap();
        assert_eq!(undetected.len(), 1);
        assert_eq!(undetected[0].session_id, "web");

        backend
            .update_session("web", &SessionPatch::new().detected(true))
            .await
            .unwrap();
        assert!(backend.list_undetected().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_operations_fail_before_connect() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("t.db").display());
        let backend = SqliteSessionBackend::new(SharedPool::new(url));

        assert!(matches!(
            backend.get_session("s1").await,
            Err(RepositoryError::Unavailable(_))
        ));
        backend.ping().await.unwrap();
    }
}
