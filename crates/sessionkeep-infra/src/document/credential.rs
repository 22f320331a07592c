//! redb credential backend.

use redb::ReadableTable;

use sessionkeep_core::backend::CredentialBackend;
use sessionkeep_types::credential::CredentialKey;
use sessionkeep_types::error::RepositoryError;

use super::db::{
    CREDENTIALS_TABLE, DocumentDb, KEY_SEPARATOR, credential_key, query_err, session_range,
};

pub struct DocumentCredentialBackend {
    db: DocumentDb,
}

impl DocumentCredentialBackend {
    pub fn new(db: DocumentDb) -> Self {
        Self { db }
    }
}

impl CredentialBackend for DocumentCredentialBackend {
    fn name(&self) -> &str {
        "document"
    }

    async fn read(&self, key: &CredentialKey) -> Result<Option<String>, RepositoryError> {
        let storage_key = credential_key(&key.session_id, &key.file_name);
        self.db
            .with_db(move |db| {
                let read_txn = db.begin_read().map_err(query_err)?;
                let table = read_txn.open_table(CREDENTIALS_TABLE).map_err(query_err)?;
                match table.get(storage_key.as_str()).map_err(query_err)? {
                    Some(bytes) => String::from_utf8(bytes.value().to_vec())
                        .map(Some)
                        .map_err(|e| RepositoryError::Query(e.to_string())),
                    None => Ok(None),
                }
            })
            .await
    }

    async fn write(&self, key: &CredentialKey, payload: &str) -> Result<(), RepositoryError> {
        let storage_key = credential_key(&key.session_id, &key.file_name);
        let payload = payload.to_string();
        self.db
            .with_db(move |db| {
                let write_txn = db.begin_write().map_err(query_err)?;
                {
                    let mut table = write_txn.open_table(CREDENTIALS_TABLE).map_err(query_err)?;
                    table
                        .insert(storage_key.as_str(), payload.as_bytes())
                        .map_err(query_err)?;
                }
                write_txn.commit().map_err(query_err)?;
                Ok(())
            })
            .await
    }

    async fn delete(&self, key: &CredentialKey) -> Result<bool, RepositoryError> {
        let storage_key = credential_key(&key.session_id, &key.file_name);
        self.db
            .with_db(move |db| {
                let write_txn = db.begin_write().map_err(query_err)?;
                let removed = {
                    let mut table = write_txn.open_table(CREDENTIALS_TABLE).map_err(query_err)?;
                    let removed = table.remove(storage_key.as_str()).map_err(query_err)?;
                    removed.is_some()
                };
                write_txn.commit().map_err(query_err)?;
                Ok(removed)
            })
            .await
    }

    async fn delete_session(&self, session_id: &str) -> Result<usize, RepositoryError> {
        let (start, end) = session_range(session_id);
        self.db
            .with_db(move |db| {
                let write_txn = db.begin_write().map_err(query_err)?;
                let removed = {
                    let mut table = write_txn.open_table(CREDENTIALS_TABLE).map_err(query_err)?;
                    let mut keys = Vec::new();
                    for entry in table
                        .range(start.as_str()..end.as_str())
                        .map_err(query_err)?
                    {
                        let (key, _) = entry.map_err(query_err)?;
                        keys.push(key.value().to_string());
                    }
                    for key in &keys {
                        table.remove(key.as_str()).map_err(query_err)?;
                    }
                    keys.len()
                };
                write_txn.commit().map_err(query_err)?;
                Ok(removed)
            })
            .await
    }

    async fn list_sessions(&self) -> Result<Vec<String>, RepositoryError> {
        self.db
            .with_db(|db| {
                let read_txn = db.begin_read().map_err(query_err)?;
                let table = read_txn.open_table(CREDENTIALS_TABLE).map_err(query_err)?;
                let mut sessions: Vec<String> = Vec::new();
                for entry in table.iter().map_err(query_err)? {
                    let (key, _) = entry.map_err(query_err)?;
                    let Some((session_id, _)) = key.value().split_once(KEY_SEPARATOR) else {
                        continue;
                    };
                    // Keys iterate in order, so duplicates are adjacent.
                    if sessions.last().map(String::as_str) != Some(session_id) {
                        sessions.push(session_id.to_string());
                    }
                }
                Ok(sessions)
            })
            .await
    }

    async fn ping(&self) -> Result<(), RepositoryError> {
        self.db.ping().await
    }

    async fn close(&self) -> Result<(), RepositoryError> {
        self.db.close().await;
        Ok(())
    }
}
