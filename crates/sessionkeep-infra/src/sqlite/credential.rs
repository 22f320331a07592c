//! SQLite credential backend.
//!
//! Stores encoded credential payloads in `auth_credentials`, keyed by
//! `(session_id, file_name)`.

use chrono::Utc;

use sessionkeep_core::backend::CredentialBackend;
use sessionkeep_types::credential::CredentialKey;
use sessionkeep_types::error::RepositoryError;

use super::pool::SharedPool;
use super::session::format_datetime;

pub struct SqliteCredentialBackend {
    pool: SharedPool,
}

impl SqliteCredentialBackend {
    pub fn new(pool: SharedPool) -> Self {
        Self { pool }
    }
}

impl CredentialBackend for SqliteCredentialBackend {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn read(&self, key: &CredentialKey) -> Result<Option<String>, RepositoryError> {
        let pool = self.pool.get().await?;
        let row: Option<(String,)> = sqlx::query_as(
            "SELECT payload FROM auth_credentials WHERE session_id = ? AND file_name = ?",
        )
        .bind(&key.session_id)
        .bind(&key.file_name)
        .fetch_optional(&pool.reader)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        Ok(row.map(|(payload,)| payload))
    }

    async fn write(&self, key: &CredentialKey, payload: &str) -> Result<(), RepositoryError> {
        let pool = self.pool.get().await?;
        sqlx::query(
            "INSERT INTO auth_credentials (session_id, file_name, payload, updated_at)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(session_id, file_name) DO UPDATE SET
                payload = excluded.payload,
                updated_at = excluded.updated_at",
        )
        .bind(&key.session_id)
        .bind(&key.file_name)
        .bind(payload)
        .bind(format_datetime(&Utc::now()))
        .execute(&pool.writer)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        Ok(())
    }

    async fn delete(&self, key: &CredentialKey) -> Result<bool, RepositoryError> {
        let pool = self.pool.get().await?;
        let result =
            sqlx::query("DELETE FROM auth_credentials WHERE session_id = ? AND file_name = ?")
                .bind(&key.session_id)
                .bind(&key.file_name)
                .execute(&pool.writer)
                .await
                .map_err(|e| RepositoryError::Query(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_session(&self, session_id: &str) -> Result<usize, RepositoryError> {
        let pool = self.pool.get().await?;
        let result = sqlx::query("DELETE FROM auth_credentials WHERE session_id = ?")
            .bind(session_id)
            .execute(&pool.writer)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        Ok(result.rows_affected() as usize)
    }

    async fn list_sessions(&self) -> Result<Vec<String>, RepositoryError> {
        let pool = self.pool.get().await?;
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT DISTINCT session_id FROM auth_credentials ORDER BY session_id")
                .fetch_all(&pool.reader)
                .await
                .map_err(|e| RepositoryError::Query(e.to_string()))?;

        Ok(rows.into_iter().map(|(id,)| id).collect())
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

    async fn backend() -> SqliteCredentialBackend {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("creds.db").display());
        std::mem::forget(dir);
        let pool = SharedPool::new(url);
        pool.open().await.unwrap();
        SqliteCredentialBackend::new(pool)
    }

    #[tokio::test]
    async fn test_write_read_overwrite() {
        let backend = backend().await;
        let key = CredentialKey::root("s1");

        assert!(backend.read(&key).await.unwrap().is_none());
        backend.write(&key, r#"{"a":1}"#).await.unwrap();
        backend.write(&key, r#"{"a":2}"#).await.unwrap();
        assert_eq!(backend.read(&key).await.unwrap().as_deref(), Some(r#"{"a":2}"#));
    }

    #[tokio::test]
    async fn test_delete_and_delete_session() {
        let backend = backend().await;
        let root = CredentialKey::root("s1");
        let pre_key = CredentialKey::for_key("s1", "pre-key", "1");
        let other = CredentialKey::root("s2");
        for key in [&root, &pre_key, &other] {
            backend.write(key, "x").await.unwrap();
        }

        assert!(backend.delete(&pre_key).await.unwrap());
        assert!(!backend.delete(&pre_key).await.unwrap());

        backend.write(&pre_key, "y").await.unwrap();
        assert_eq!(backend.delete_session("s1").await.unwrap(), 2);
        assert_eq!(backend.list_sessions().await.unwrap(), vec!["s2".to_string()]);
    }

    #[tokio::test]
    async fn test_list_sessions_distinct() {
        let backend = backend().await;
        backend.write(&CredentialKey::root("b"), "x").await.unwrap();
        backend.write(&CredentialKey::root("a"), "x").await.unwrap();
        backend
            .write(&CredentialKey::for_key("a", "session", "p"), "x")
            .await
            .unwrap();

        assert_eq!(
            backend.list_sessions().await.unwrap(),
            vec!["a".to_string(), "b".to_string()]
        );
    }
}
