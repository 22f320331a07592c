//! redb session backend (the document store).
//!
//! Each session is one JSON document keyed by session id, so a point lookup
//! is a single B-tree get. Updates are read-modify-write inside one write
//! transaction.

use redb::ReadableTable;

use sessionkeep_core::backend::SessionBackend;
use sessionkeep_types::error::RepositoryError;
use sessionkeep_types::session::{SessionPatch, SessionRecord};

use super::db::{DocumentDb, SESSIONS_TABLE, query_err};

pub struct DocumentSessionBackend {
    db: DocumentDb,
}

impl DocumentSessionBackend {
    pub fn new(db: DocumentDb) -> Self {
        Self { db }
    }

    /// Read-modify-write one document. Returns false if it does not exist.
    async fn modify<F>(&self, session_id: &str, f: F) -> Result<bool, RepositoryError>
    where
        F: FnOnce(&mut SessionRecord) + Send + 'static,
    {
        let session_id = session_id.to_string();
        self.db
            .with_db(move |db| {
                let write_txn = db.begin_write().map_err(query_err)?;
                let found = {
                    let mut table = write_txn.open_table(SESSIONS_TABLE).map_err(query_err)?;
                    let existing = match table.get(session_id.as_str()).map_err(query_err)? {
                        Some(bytes) => Some(decode(bytes.value())?),
                        None => None,
                    };
                    match existing {
                        Some(mut record) => {
                            f(&mut record);
                            let bytes = encode(&record)?;
                            table
                                .insert(session_id.as_str(), bytes.as_slice())
                                .map_err(query_err)?;
                            true
                        }
                        None => false,
                    }
                };
                write_txn.commit().map_err(query_err)?;
                Ok(found)
            })
            .await
    }

    async fn scan<P>(&self, keep: P) -> Result<Vec<SessionRecord>, RepositoryError>
    where
        P: Fn(&SessionRecord) -> bool + Send + 'static,
    {
        let mut records = self
            .db
            .with_db(move |db| {
                let read_txn = db.begin_read().map_err(query_err)?;
                let table = read_txn.open_table(SESSIONS_TABLE).map_err(query_err)?;
                let mut records = Vec::new();
                for entry in table.iter().map_err(query_err)? {
                    let (_, value) = entry.map_err(query_err)?;
                    let record = decode(value.value())?;
                    if keep(&record) {
                        records.push(record);
                    }
                }
                Ok(records)
            })
            .await?;

        // Sort by updated_at descending (newest first)
        records.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(records)
    }
}

fn encode(record: &SessionRecord) -> Result<Vec<u8>, RepositoryError> {
    serde_json::to_vec(record).map_err(|e| RepositoryError::Query(e.to_string()))
}

fn decode(bytes: &[u8]) -> Result<SessionRecord, RepositoryError> {
    serde_json::from_slice(bytes)
        .map_err(|e| RepositoryError::Query(format!("invalid session document: {e}")))
}

impl SessionBackend for DocumentSessionBackend {
    fn name(&self) -> &str {
        "document"
    }

    async fn connect(&self) -> Result<(), RepositoryError> {
        self.db.open().await
    }

    async fn save_session(&self, record: &SessionRecord) -> Result<(), RepositoryError> {
        let bytes = encode(record)?;
        let session_id = record.session_id.clone();
        self.db
            .with_db(move |db| {
                let write_txn = db.begin_write().map_err(query_err)?;
                {
                    let mut table = write_txn.open_table(SESSIONS_TABLE).map_err(query_err)?;
                    table
                        .insert(session_id.as_str(), bytes.as_slice())
                        .map_err(query_err)?;
                }
                write_txn.commit().map_err(query_err)?;
                Ok(())
            })
            .await
    }

    async fn get_session(&self, session_id: &str) -> Result<Option<SessionRecord>, RepositoryError> {
        let session_id = session_id.to_string();
        self.db
            .with_db(move |db| {
                let read_txn = db.begin_read().map_err(query_err)?;
                let table = read_txn.open_table(SESSIONS_TABLE).map_err(query_err)?;
                match table.get(session_id.as_str()).map_err(query_err)? {
                    Some(bytes) => Ok(Some(decode(bytes.value())?)),
                    None => Ok(None),
                }
            })
            .await
    }

    async fn update_session(
        &self,
        session_id: &str,
        patch: &SessionPatch,
    ) -> Result<bool, RepositoryError> {
        let patch = patch.clone();
        self.modify(session_id, move |record| patch.apply_to(record))
            .await
    }

    async fn delete_session(&self, session_id: &str) -> Result<bool, RepositoryError> {
        self.modify(session_id, SessionRecord::clear_connection)
            .await
    }

    async fn completely_delete_session(&self, session_id: &str) -> Result<bool, RepositoryError> {
        let session_id = session_id.to_string();
        self.db
            .with_db(move |db| {
                let write_txn = db.begin_write().map_err(query_err)?;
                let removed = {
                    let mut table = write_txn.open_table(SESSIONS_TABLE).map_err(query_err)?;
                    let removed = table.remove(session_id.as_str()).map_err(query_err)?;
                    removed.is_some()
                };
                write_txn.commit().map_err(query_err)?;
                Ok(removed)
            })
            .await
    }

    async fn list_sessions(&self) -> Result<Vec<SessionRecord>, RepositoryError> {
        self.scan(|_| true).await
    }

    async fn list_undetected(&self) -> Result<Vec<SessionRecord>, RepositoryError> {
        self.scan(SessionRecord::is_undetected).await
    }

    async fn ping(&self) -> Result<(), RepositoryError> {
        self.db.ping().await
    }

    async fn close(&self) -> Result<(), RepositoryError> {
        self.db.close().await;
        Ok(())
    }
}
