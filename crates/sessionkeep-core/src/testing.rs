//! In-memory backends for unit tests.
//!
//! Both backends are cheap `Clone` handles over shared state so a test can
//! keep one handle for assertions while the code under test owns another.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use sessionkeep_types::credential::CredentialKey;
use sessionkeep_types::error::RepositoryError;
use sessionkeep_types::session::{SessionPatch, SessionRecord};

use crate::backend::{CredentialBackend, SessionBackend};

#[derive(Default)]
struct SessionState {
    records: Mutex<BTreeMap<String, SessionRecord>>,
    failing: AtomicBool,
    connect_failures_left: AtomicU32,
    connect_calls: AtomicU32,
    writes: AtomicUsize,
}

#[derive(Clone)]
pub struct MemorySessionBackend {
    name: String,
    state: Arc<SessionState>,
}

impl MemorySessionBackend {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            state: Arc::new(SessionState::default()),
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.state.failing.store(failing, Ordering::SeqCst);
    }

    /// Make the next `n` connect calls fail.
    pub fn fail_connects(&self, n: u32) {
        self.state.connect_failures_left.store(n, Ordering::SeqCst);
    }

    pub fn connect_calls(&self) -> u32 {
        self.state.connect_calls.load(Ordering::SeqCst)
    }

    /// Number of save/update/delete calls that reached the store.
    pub fn write_count(&self) -> usize {
        self.state.writes.load(Ordering::SeqCst)
    }

    pub fn stored(&self, session_id: &str) -> Option<SessionRecord> {
        self.state.records.lock().unwrap().get(session_id).cloned()
    }

    /// Insert directly, bypassing counters and failure switches.
    pub fn seed(&self, record: SessionRecord) {
        self.state
            .records
            .lock()
            .unwrap()
            .insert(record.session_id.clone(), record);
    }

    fn check(&self) -> Result<(), RepositoryError> {
        if self.state.failing.load(Ordering::SeqCst) {
            Err(RepositoryError::Unavailable(self.name.clone()))
        } else {
            Ok(())
        }
    }

    fn write_op(&self) -> Result<(), RepositoryError> {
        self.check()?;
        self.state.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

impl SessionBackend for MemorySessionBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn connect(&self) -> Result<(), RepositoryError> {
        self.state.connect_calls.fetch_add(1, Ordering::SeqCst);
        let left = self.state.connect_failures_left.load(Ordering::SeqCst);
        if left > 0 {
            self.state
                .connect_failures_left
                .store(left - 1, Ordering::SeqCst);
            return Err(RepositoryError::Connection);
        }
        self.check()
    }

    async fn save_session(&self, record: &SessionRecord) -> Result<(), RepositoryError> {
        self.write_op()?;
        self.seed(record.clone());
        Ok(())
    }

    async fn get_session(&self, session_id: &str) -> Result<Option<SessionRecord>, RepositoryError> {
        self.check()?;
        Ok(self.stored(session_id))
    }

    async fn update_session(
        &self,
        session_id: &str,
        patch: &SessionPatch,
    ) -> Result<bool, RepositoryError> {
        self.write_op()?;
        let mut records = self.state.records.lock().unwrap();
        match records.get_mut(session_id) {
            Some(record) => {
                patch.apply_to(record);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_session(&self, session_id: &str) -> Result<bool, RepositoryError> {
        self.write_op()?;
        let mut records = self.state.records.lock().unwrap();
        match records.get_mut(session_id) {
            Some(record) => {
                record.clear_connection();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn completely_delete_session(&self, session_id: &str) -> Result<bool, RepositoryError> {
        self.write_op()?;
        Ok(self.state.records.lock().unwrap().remove(session_id).is_some())
    }

    async fn list_sessions(&self) -> Result<Vec<SessionRecord>, RepositoryError> {
        self.check()?;
        let mut all: Vec<SessionRecord> =
            self.state.records.lock().unwrap().values().cloned().collect();
        all.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(all)
    }

    async fn list_undetected(&self) -> Result<Vec<SessionRecord>, RepositoryError> {
        Ok(self
            .list_sessions()
            .await?
            .into_iter()
            .filter(SessionRecord::is_undetected)
            .collect())
    }

    async fn ping(&self) -> Result<(), RepositoryError> {
        self.check()
    }

    async fn close(&self) -> Result<(), RepositoryError> {
        Ok(())
    }
}

#[derive(Default)]
struct CredentialState {
    entries: Mutex<BTreeMap<CredentialKey, String>>,
    failing: AtomicBool,
    /// Fail this many reads, then recover.
    read_failures_left: AtomicU32,
    reads: AtomicUsize,
    writes: AtomicUsize,
}

#[derive(Clone)]
pub struct MemoryCredentialBackend {
    name: String,
    state: Arc<CredentialState>,
}

impl MemoryCredentialBackend {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            state: Arc::new(CredentialState::default()),
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.state.failing.store(failing, Ordering::SeqCst);
    }

    pub fn fail_reads(&self, n: u32) {
        self.state.read_failures_left.store(n, Ordering::SeqCst);
    }

    pub fn read_count(&self) -> usize {
        self.state.reads.load(Ordering::SeqCst)
    }

    pub fn write_count(&self) -> usize {
        self.state.writes.load(Ordering::SeqCst)
    }

    pub fn stored(&self, key: &CredentialKey) -> Option<String> {
        self.state.entries.lock().unwrap().get(key).cloned()
    }

    pub fn seed(&self, key: CredentialKey, payload: &str) {
        self.state
            .entries
            .lock()
            .unwrap()
            .insert(key, payload.to_string());
    }

    pub fn len(&self) -> usize {
        self.state.entries.lock().unwrap().len()
    }

    fn check(&self) -> Result<(), RepositoryError> {
        if self.state.failing.load(Ordering::SeqCst) {
            Err(RepositoryError::Unavailable(self.name.clone()))
        } else {
            Ok(())
        }
    }
}

impl CredentialBackend for MemoryCredentialBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn read(&self, key: &CredentialKey) -> Result<Option<String>, RepositoryError> {
        self.state.reads.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        let left = self.state.read_failures_left.load(Ordering::SeqCst);
        if left > 0 {
            self.state.read_failures_left.store(left - 1, Ordering::SeqCst);
            return Err(RepositoryError::Query("transient read failure".to_string()));
        }
        Ok(self.stored(key))
    }

    async fn write(&self, key: &CredentialKey, payload: &str) -> Result<(), RepositoryError> {
        self.check()?;
        self.state.writes.fetch_add(1, Ordering::SeqCst);
        self.seed(key.clone(), payload);
        Ok(())
    }

    async fn delete(&self, key: &CredentialKey) -> Result<bool, RepositoryError> {
        self.check()?;
        Ok(self.state.entries.lock().unwrap().remove(key).is_some())
    }

    async fn delete_session(&self, session_id: &str) -> Result<usize, RepositoryError> {
        self.check()?;
        let mut entries = self.state.entries.lock().unwrap();
        let before = entries.len();
        entries.retain(|key, _| key.session_id != session_id);
        Ok(before - entries.len())
    }

    async fn list_sessions(&self) -> Result<Vec<String>, RepositoryError> {
        self.check()?;
        let mut ids: Vec<String> = self
            .state
            .entries
            .lock()
            .unwrap()
            .keys()
            .map(|key| key.session_id.clone())
            .collect();
        ids.dedup();
        Ok(ids)
    }

    async fn ping(&self) -> Result<(), RepositoryError> {
        self.check()
    }

    async fn close(&self) -> Result<(), RepositoryError> {
        Ok(())
    }
}
