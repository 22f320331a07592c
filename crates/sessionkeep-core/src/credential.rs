//! Credential store on the protocol hot path.
//!
//! A cache + write buffer + backend stack for protocol key material. Writes
//! land in the cache immediately (read-your-writes within the process) and
//! reach the backend after a short debounce. Deletes are immediate. Every
//! failure degrades to "absent" so the session lifecycle can decide to
//! re-pair; nothing here returns an error.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::{BoxFuture, join_all};
use tokio_util::sync::CancellationToken;

use sessionkeep_types::config::StoreConfig;
use sessionkeep_types::credential::{AuthValue, CredentialKey};

use crate::backend::BoxCredentialBackend;
use crate::buffer::WriteBuffer;
use crate::cache::TtlCache;
use crate::codec;

/// Tuning for the credential store, taken from `StoreConfig`.
#[derive(Debug, Clone)]
pub struct CredentialSettings {
    pub cache_ttl: Duration,
    pub cache_sweep_interval: Duration,
    pub debounce: Duration,
    /// Attempts for the root record; other keys get one.
    pub root_read_attempts: u32,
    /// Linear backoff step between root record attempts.
    pub retry_step: Duration,
    pub read_group: usize,
    pub write_group: usize,
}

impl From<&StoreConfig> for CredentialSettings {
    fn from(config: &StoreConfig) -> Self {
        Self {
            cache_ttl: config.record_cache_ttl(),
            cache_sweep_interval: config.cache_sweep_interval(),
            debounce: config.credential_debounce(),
            root_read_attempts: config.credential_read_attempts,
            retry_step: config.credential_retry_step(),
            read_group: config.batch_read_group,
            write_group: config.batch_write_group,
        }
    }
}

impl Default for CredentialSettings {
    fn default() -> Self {
        Self::from(&StoreConfig::default())
    }
}

pub struct CredentialStore {
    backend: Arc<BoxCredentialBackend>,
    cache: Arc<TtlCache<CredentialKey, AuthValue>>,
    buffer: WriteBuffer<CredentialKey, String>,
    settings: CredentialSettings,
    cancel: CancellationToken,
}

impl CredentialStore {
    pub fn new(backend: BoxCredentialBackend, settings: CredentialSettings) -> Self {
        let backend = Arc::new(backend);
        let flush_backend = Arc::clone(&backend);
        let buffer = WriteBuffer::new(
            settings.debounce,
            move |key: CredentialKey, payload: String| -> BoxFuture<'static, ()> {
                let backend = Arc::clone(&flush_backend);
                Box::pin(async move {
                    if let Err(e) = backend.write(&key, &payload).await {
                        tracing::error!(
                            backend = backend.name(),
                            key = %key,
                            error = %e,
                            "credential write lost"
                        );
                    }
                })
            },
        );

        Self {
            backend,
            cache: Arc::new(TtlCache::new(settings.cache_ttl)),
            buffer,
            settings,
            cancel: CancellationToken::new(),
        }
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Start the periodic cache sweep. Must be called from inside a runtime.
    pub fn start(&self) {
        self.cache
            .spawn_sweeper(self.settings.cache_sweep_interval, self.cancel.child_token());
    }

    /// Read one entry: cache first, then the backend.
    ///
    /// The root record is retried with linear backoff since losing it forces
    /// a full re-pairing. Undecodable payloads count as absent.
    pub async fn read(&self, key: &CredentialKey) -> Option<AuthValue> {
        if let Some(value) = self.cache.get(key) {
            return Some(value);
        }

        let attempts = if key.is_root() {
            self.settings.root_read_attempts.max(1)
        } else {
            1
        };

        for attempt in 1..=attempts {
            match self.backend.read(key).await {
                Ok(Some(text)) => {
                    return match codec::decode(&text) {
                        Ok(value) => {
                            self.cache.insert(key.clone(), value.clone());
                            Some(value)
                        }
                        Err(e) => {
                            tracing::warn!(key = %key, error = %e, "undecodable credential payload");
                            None
                        }
                    };
                }
                Ok(None) => return None,
                Err(e) => {
                    tracing::warn!(key = %key, attempt, attempts, error = %e, "credential read failed");
                    if attempt < attempts {
                        tokio::time::sleep(self.settings.retry_step * attempt).await;
                    }
                }
            }
        }
        None
    }

    /// Cache the value now and queue a debounced durable write.
    ///
    /// A second write to the same key inside the window replaces the first;
    /// only the last value reaches the backend.
    pub fn write(&self, key: CredentialKey, value: AuthValue) {
        let payload = codec::encode(&value);
        self.cache.insert(key.clone(), value);
        self.buffer.enqueue(key, payload);
    }

    /// Remove from cache, pending buffer and backend immediately.
    pub async fn delete(&self, key: &CredentialKey) -> bool {
        self.cache.remove(key);
        self.buffer.cancel(key).await;
        match self.backend.delete(key).await {
            Ok(removed) => removed,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "credential delete failed");
                false
            }
        }
    }

    /// Read many keys in bounded concurrent groups. Missing or failed keys
    /// are left out of the result.
    pub async fn read_batch(&self, keys: &[CredentialKey]) -> HashMap<CredentialKey, AuthValue> {
        let mut found = HashMap::with_capacity(keys.len());
        for group in keys.chunks(self.settings.read_group.max(1)) {
            let values = join_all(group.iter().map(|key| self.read(key))).await;
            for (key, value) in group.iter().zip(values) {
                if let Some(value) = value {
                    found.insert(key.clone(), value);
                }
            }
        }
        found
    }

    /// Apply many mutations in bounded groups. `None` or a null value deletes.
    pub async fn write_batch(&self, entries: Vec<(CredentialKey, Option<AuthValue>)>) {
        let mut entries = entries.into_iter().peekable();
        let group_size = self.settings.write_group.max(1);
        while entries.peek().is_some() {
            let group: Vec<_> = entries.by_ref().take(group_size).collect();
            join_all(group.into_iter().map(|(key, value)| async move {
                match value {
                    Some(value) if !value.is_null() => self.write(key, value),
                    _ => {
                        self.delete(&key).await;
                    }
                }
            }))
            .await;
        }
    }

    /// Drop every cached entry and pending write of a session. Returns the
    /// number of pending writes that were cancelled.
    pub async fn clear_session(&self, session_id: &str) -> usize {
        self.cache.retain(|key| key.session_id != session_id);
        let cancelled = self
            .buffer
            .cancel_matching(|key| key.session_id == session_id)
            .await;
        tracing::debug!(session_id, cancelled, "cleared credential state");
        cancelled
    }

    /// Clear the session's in-memory state, then delete its stored entries.
    pub async fn delete_session_data(&self, session_id: &str) -> usize {
        self.clear_session(session_id).await;
        match self.backend.delete_session(session_id).await {
            Ok(removed) => {
                tracing::info!(session_id, removed, "deleted session credentials");
                removed
            }
            Err(e) => {
                tracing::warn!(session_id, error = %e, "failed to delete session credentials");
                0
            }
        }
    }

    /// True iff the root record decodes and carries the required identity fields.
    pub async fn is_valid(&self, session_id: &str) -> bool {
        self.read(&CredentialKey::root(session_id))
            .await
            .is_some_and(|creds| creds.has_identity_fields())
    }

    /// Session ids with at least one stored entry.
    pub async fn known_sessions(&self) -> Vec<String> {
        match self.backend.list_sessions().await {
            Ok(ids) => ids,
            Err(e) => {
                tracing::warn!(error = %e, "failed to list credential sessions");
                Vec::new()
            }
        }
    }

    pub async fn ping(&self) -> bool {
        self.backend.ping().await.is_ok()
    }

    pub async fn flush(&self) -> usize {
        self.buffer.flush_all().await
    }

    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }

    pub fn pending_writes(&self) -> usize {
        self.buffer.len()
    }

    /// Stop the sweeper, flush pending writes and close the backend.
    pub async fn close(&self) {
        self.cancel.cancel();
        let flushed = self.flush().await;
        if let Err(e) = self.backend.close().await {
            tracing::warn!(error = %e, "credential backend close failed");
        }
        tracing::info!(flushed, "credential store closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryCredentialBackend;

    fn settings() -> CredentialSettings {
        CredentialSettings {
            cache_ttl: Duration::from_secs(300),
            cache_sweep_interval: Duration::from_secs(120),
            debounce: Duration::from_millis(50),
            root_read_attempts: 3,
            retry_step: Duration::from_secs(1),
            read_group: 10,
            write_group: 20,
        }
    }

    fn store() -> (CredentialStore, MemoryCredentialBackend) {
        let memory = MemoryCredentialBackend::new("memory");
        let store = CredentialStore::new(BoxCredentialBackend::new(memory.clone()), settings());
        (store, memory)
    }

    fn creds() -> AuthValue {
        AuthValue::object([
            ("noiseKey", AuthValue::Bytes(vec![1; 32])),
            ("signedIdentityKey", AuthValue::Bytes(vec![2; 32])),
        ])
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_your_write_before_flush() {
        let (store, memory) = store();
        let key = CredentialKey::root("s1");
        memory.seed(key.clone(), &codec::encode(&AuthValue::from("old")));

        store.write(key.clone(), creds());
        assert_eq!(store.read(&key).await, Some(creds()));
        assert_eq!(memory.write_count(), 0);

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(memory.write_count(), 1);
        assert_eq!(codec::decode(&memory.stored(&key).unwrap()).unwrap(), creds());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rapid_writes_keep_last_value() {
        let (store, memory) = store();
        let key = CredentialKey::for_key("s1", "pre-key", "1");

        store.write(key.clone(), AuthValue::Bytes(vec![1]));
        store.write(key.clone(), AuthValue::Bytes(vec![2]));
        tokio::time::sleep(Duration::from_millis(60)).await;

        assert_eq!(memory.write_count(), 1);
        assert_eq!(
            codec::decode(&memory.stored(&key).unwrap()).unwrap(),
            AuthValue::Bytes(vec![2])
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_beats_pending_write() {
        let (store, memory) = store();
        let key = CredentialKey::for_key("s1", "session", "peer");

        store.write(key.clone(), AuthValue::Bytes(vec![7]));
        store.delete(&key).await;
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(memory.stored(&key).is_none());
        assert!(store.read(&key).await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_root_read_retries_with_linear_backoff() {
        let (store, memory) = store();
        let key = CredentialKey::root("s1");
        memory.seed(key.clone(), &codec::encode(&creds()));
        memory.fail_reads(2);

        let started = tokio::time::Instant::now();
        assert_eq!(store.read(&key).await, Some(creds()));
        assert_eq!(memory.read_count(), 3);
        assert_eq!(started.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_other_keys_read_once() {
        let (store, memory) = store();
        let key = CredentialKey::for_key("s1", "pre-key", "5");
        memory.seed(key.clone(), &codec::encode(&AuthValue::Bytes(vec![5])));
        memory.fail_reads(1);

        assert!(store.read(&key).await.is_none());
        assert_eq!(memory.read_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cache_ttl_boundary() {
        let (store, memory) = store();
        let key = CredentialKey::for_key("s1", "pre-key", "1");
        memory.seed(key.clone(), &codec::encode(&AuthValue::Bytes(vec![1])));

        store.read(&key).await;
        tokio::time::advance(Duration::from_millis(299_999)).await;
        store.read(&key).await;
        assert_eq!(memory.read_count(), 1);

        tokio::time::advance(Duration::from_millis(2)).await;
        store.read(&key).await;
        assert_eq!(memory.read_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_is_valid_gate() {
        let (store, memory) = store();
        assert!(!store.is_valid("missing").await);

        memory.seed(CredentialKey::root("good"), &codec::encode(&creds()));
        assert!(store.is_valid("good").await);

        let partial = AuthValue::object([("noiseKey", AuthValue::Bytes(vec![1]))]);
        memory.seed(CredentialKey::root("partial"), &codec::encode(&partial));
        assert!(!store.is_valid("partial").await);

        memory.seed(CredentialKey::root("corrupt"), "{\"noiseKey\":");
        assert!(!store.is_valid("corrupt").await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_batch_omits_missing_and_corrupt() {
        let (store, memory) = store();
        let keys: Vec<CredentialKey> = (0..25)
            .map(|i| CredentialKey::for_key("s1", "pre-key", &i.to_string()))
            .collect();
        for (i, key) in keys.iter().enumerate() {
            match i {
                3 => memory.seed(key.clone(), "not json"),
                7 => {}
                _ => memory.seed(key.clone(), &codec::encode(&AuthValue::Bytes(vec![i as u8]))),
            }
        }

        let found = store.read_batch(&keys).await;
        assert_eq!(found.len(), 23);
        assert!(!found.contains_key(&keys[3]));
        assert!(!found.contains_key(&keys[7]));
        assert_eq!(found[&keys[24]], AuthValue::Bytes(vec![24]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_batch_deletes_absent_values() {
        let (store, memory) = store();
        let stale = CredentialKey::for_key("s1", "pre-key", "1");
        memory.seed(stale.clone(), "x");
        let fresh = CredentialKey::for_key("s1", "pre-key", "2");
        let nulled = CredentialKey::for_key("s1", "pre-key", "3");
        memory.seed(nulled.clone(), "y");

        store
            .write_batch(vec![
                (stale.clone(), None),
                (fresh.clone(), Some(AuthValue::Bytes(vec![2]))),
                (nulled.clone(), Some(AuthValue::Null)),
            ])
            .await;

        assert!(memory.stored(&stale).is_none());
        assert!(memory.stored(&nulled).is_none());
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(memory.stored(&fresh).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_session_stops_late_writes() {
        let (store, memory) = store();
        store.write(CredentialKey::root("s1"), creds());
        store.write(CredentialKey::for_key("s1", "pre-key", "1"), AuthValue::Bytes(vec![1]));
        store.write(CredentialKey::root("s2"), creds());

        assert_eq!(store.clear_session("s1").await, 2);
        tokio::time::sleep(Duration::from_millis(60)).await;

        assert_eq!(memory.len(), 1);
        assert!(memory.stored(&CredentialKey::root("s2")).is_some());
        assert_eq!(store.cache_len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_session_data_and_known_sessions() {
        let (store, memory) = store();
        memory.seed(CredentialKey::root("s1"), "a");
        memory.seed(CredentialKey::for_key("s1", "pre-key", "1"), "b");
        memory.seed(CredentialKey::root("s2"), "c");

        assert_eq!(store.known_sessions().await, vec!["s1".to_string(), "s2".to_string()]);
        assert_eq!(store.delete_session_data("s1").await, 2);
        assert_eq!(store.known_sessions().await, vec!["s2".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backend_failure_degrades_to_absent() {
        let (store, memory) = store();
        memory.set_failing(true);

        assert!(store.read(&CredentialKey::for_key("s1", "pre-key", "1")).await.is_none());
        assert!(!store.delete(&CredentialKey::root("s1")).await);
        assert!(store.known_sessions().await.is_empty());
        assert!(!store.ping().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_flushes_pending() {
        let (store, memory) = store();
        store.write(CredentialKey::root("s1"), creds());
        store.close().await;

        assert_eq!(memory.write_count(), 1);
        assert_eq!(store.pending_writes(), 0);
    }
}
