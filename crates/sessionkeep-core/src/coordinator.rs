//! Session metadata coordinator.
//!
//! Fans session operations out across the document and relational backends,
//! fronted by a short-lived read cache and a debounced write buffer.
//! Operations route only to backends whose availability flag is up, and a
//! write succeeds if either backend persisted it. Nothing here returns an
//! error: a backend failure degrades to "absent" or `false`.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures_util::future::{BoxFuture, join_all};
use tokio_util::sync::CancellationToken;

use sessionkeep_types::config::StoreConfig;
use sessionkeep_types::session::{ConnectionStatusReport, SessionPatch, SessionRecord};

use crate::backend::ManagedBackend;
use crate::buffer::WriteBuffer;
use crate::cache::TtlCache;
use crate::health::HealthMonitor;

/// Timing knobs for the coordinator, taken from `StoreConfig`.
#[derive(Debug, Clone)]
pub struct CoordinatorSettings {
    pub cache_ttl: Duration,
    pub cache_sweep_interval: Duration,
    pub debounce: Duration,
    pub connect_attempts: u32,
    pub connect_backoff_base: Duration,
    pub probe_interval: Duration,
}

impl From<&StoreConfig> for CoordinatorSettings {
    fn from(config: &StoreConfig) -> Self {
        Self {
            cache_ttl: config.session_cache_ttl(),
            cache_sweep_interval: config.cache_sweep_interval(),
            debounce: config.session_debounce(),
            connect_attempts: config.connect_attempts,
            connect_backoff_base: config.connect_backoff_base(),
            probe_interval: config.probe_interval(),
        }
    }
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self::from(&StoreConfig::default())
    }
}

struct Shared {
    document: Arc<ManagedBackend>,
    relational: Arc<ManagedBackend>,
    cache: Arc<TtlCache<String, SessionRecord>>,
}

impl Shared {
    /// Backends currently routable, document store first.
    fn available(&self) -> Vec<&ManagedBackend> {
        [self.document.as_ref(), self.relational.as_ref()]
            .into_iter()
            .filter(|b| b.is_available())
            .collect()
    }

    /// Write a coalesced patch to every available backend and the cache.
    async fn apply_patch(&self, session_id: String, patch: SessionPatch) {
        let targets = self.available();
        let results = join_all(
            targets
                .iter()
                .map(|b| b.update_session(&session_id, &patch)),
        )
        .await;

        self.cache.update(&session_id, |record| patch.apply_to(record));

        if targets.is_empty() {
            tracing::error!(session_id = %session_id, "no backend available, buffered update lost");
        } else if !results.iter().any(|ok| *ok) {
            tracing::warn!(session_id = %session_id, "buffered update was not persisted by any backend");
        } else {
            tracing::debug!(session_id = %session_id, "buffered update flushed");
        }
    }
}

/// Coordinates session metadata across both backends.
pub struct SessionCoordinator {
    shared: Arc<Shared>,
    buffer: WriteBuffer<String, SessionPatch>,
    settings: CoordinatorSettings,
    cancel: CancellationToken,
}

impl SessionCoordinator {
    pub fn new(
        document: ManagedBackend,
        relational: ManagedBackend,
        settings: CoordinatorSettings,
    ) -> Self {
        let shared = Arc::new(Shared {
            document: Arc::new(document),
            relational: Arc::new(relational),
            cache: Arc::new(TtlCache::new(settings.cache_ttl)),
        });

        let flush_target = Arc::clone(&shared);
        let buffer = WriteBuffer::new(
            settings.debounce,
            move |session_id: String, patch: SessionPatch| -> BoxFuture<'static, ()> {
                let shared = Arc::clone(&flush_target);
                Box::pin(async move { shared.apply_patch(session_id, patch).await })
            },
        );

        Self {
            shared,
            buffer,
            settings,
            cancel: CancellationToken::new(),
        }
    }

    /// Connect both backends concurrently, then start the health monitor
    /// and the cache sweeper. Returns the resulting status.
    ///
    /// Never fails: a backend that cannot connect stays unavailable and the
    /// monitor keeps probing it.
    pub async fn connect(&self) -> ConnectionStatusReport {
        let attempts = self.settings.connect_attempts;
        let base = self.settings.connect_backoff_base;
        let (document_up, relational_up) = tokio::join!(
            self.shared.document.connect(attempts, base),
            self.shared.relational.connect(attempts, base)
        );
        if !document_up && !relational_up {
            tracing::error!("no session backend could be connected");
        }

        HealthMonitor::new(
            vec![
                Arc::clone(&self.shared.document),
                Arc::clone(&self.shared.relational),
            ],
            self.settings.probe_interval,
        )
        .spawn(self.cancel.child_token());
        self.shared
            .cache
            .spawn_sweeper(self.settings.cache_sweep_interval, self.cancel.child_token());

        self.get_connection_status()
    }

    /// Persist a full record to every available backend.
    ///
    /// `created_at` is kept as given; `updated_at` is stamped now. The cache
    /// is updated regardless of the outcome. A buffered patch for the same
    /// session is dropped, since it predates this record.
    pub async fn save_session(&self, record: SessionRecord) -> bool {
        let mut record = record;
        record.updated_at = Utc::now();
        let session_id = record.session_id.clone();

        self.buffer.cancel(&session_id).await;

        let targets = self.shared.available();
        let results = join_all(targets.iter().map(|b| b.save_session(&record))).await;
        self.shared.cache.insert(session_id.clone(), record);

        let saved = results.iter().any(|ok| *ok);
        if !saved {
            tracing::warn!(session_id = %session_id, "session save not persisted by any backend");
        }
        saved
    }

    /// Cached read, else the newest record across available backends.
    ///
    /// Both backends are queried concurrently and the record with the
    /// newest `updated_at` wins; on a tie the document store wins.
    pub async fn get_session(&self, session_id: &str) -> Option<SessionRecord> {
        if let Some(record) = self.shared.cache.get(&session_id.to_string()) {
            return Some(record);
        }

        let targets = self.shared.available();
        let found = join_all(targets.iter().map(|b| b.get_session(session_id))).await;
        let newest = found.into_iter().flatten().fold(None, |best: Option<SessionRecord>, r| {
            match best {
                Some(b) if b.updated_at >= r.updated_at => Some(b),
                _ => Some(r),
            }
        });

        match newest {
            Some(record) => {
                self.shared
                    .cache
                    .insert(session_id.to_string(), record.clone());
                Some(record)
            }
            None => {
                self.shared.cache.remove(&session_id.to_string());
                None
            }
        }
    }

    /// Queue a patch. Bursts within the debounce window become one write.
    ///
    /// Returns false for an empty patch, which is ignored.
    pub fn update_session(&self, session_id: &str, patch: SessionPatch) -> bool {
        if patch.is_empty() {
            return false;
        }
        self.buffer.enqueue(session_id.to_string(), patch);
        true
    }

    /// Soft delete: cancel any buffered patch, drop the cache entry, then
    /// clear the connection fields on every available backend.
    pub async fn delete_session(&self, session_id: &str) -> bool {
        self.evict(session_id).await;
        let targets = self.shared.available();
        let results = join_all(targets.iter().map(|b| b.delete_session(session_id))).await;
        results.into_iter().any(|ok| ok)
    }

    /// Hard delete, in the same order as `delete_session`.
    pub async fn completely_delete_session(&self, session_id: &str) -> bool {
        self.evict(session_id).await;
        let targets = self.shared.available();
        let results = join_all(
            targets
                .iter()
                .map(|b| b.completely_delete_session(session_id)),
        )
        .await;
        results.into_iter().any(|ok| ok)
    }

    async fn evict(&self, session_id: &str) {
        let key = session_id.to_string();
        if self.buffer.cancel(&key).await {
            tracing::debug!(session_id, "dropped buffered update before delete");
        }
        self.shared.cache.remove(&key);
    }

    /// All sessions, newest first. Relational store first, document store
    /// if it is down or fails.
    pub async fn list_sessions(&self) -> Vec<SessionRecord> {
        for backend in self.scan_order() {
            if let Some(records) = backend.list_sessions().await {
                return records;
            }
        }
        Vec::new()
    }

    /// Ids of every session held by any available backend.
    ///
    /// `None` when no backend is available or any listing fails.
    pub async fn known_session_ids(&self) -> Option<HashSet<String>> {
        let backends = self.scan_order();
        if backends.is_empty() {
            return None;
        }
        let listings = join_all(backends.iter().map(|b| b.list_sessions())).await;
        let mut ids = HashSet::new();
        for records in listings {
            ids.extend(records?.into_iter().map(|r| r.session_id));
        }
        Some(ids)
    }

    /// Secondary-channel sessions waiting to be picked up by a sweep.
    pub async fn get_undetected_sessions(&self) -> Vec<SessionRecord> {
        for backend in self.scan_order() {
            if let Some(records) = backend.list_undetected().await {
                return records;
            }
        }
        Vec::new()
    }

    fn scan_order(&self) -> Vec<&ManagedBackend> {
        [self.shared.relational.as_ref(), self.shared.document.as_ref()]
            .into_iter()
            .filter(|b| b.is_available())
            .collect()
    }

    /// Mark a session as picked up. Written directly, not buffered, so a
    /// sweep polling right after sees the flag.
    pub async fn mark_session_as_detected(&self, session_id: &str) -> bool {
        let patch = SessionPatch::new().detected(true);
        let targets = self.shared.available();
        let results = join_all(targets.iter().map(|b| b.update_session(session_id, &patch))).await;
        self.shared
            .cache
            .update(&session_id.to_string(), |record| patch.apply_to(record));
        results.into_iter().any(|ok| ok)
    }

    pub fn get_connection_status(&self) -> ConnectionStatusReport {
        ConnectionStatusReport {
            document_store_up: self.shared.document.is_available(),
            relational_store_up: self.shared.relational.is_available(),
            cache_size: self.shared.cache.len(),
            buffer_size: self.buffer.len(),
        }
    }

    /// Write every buffered patch now. Returns how many were flushed.
    pub async fn flush_write_buffers(&self) -> usize {
        self.buffer.flush_all().await
    }

    /// Stop background tasks, flush every buffered patch, then close both
    /// backends. The only point guaranteeing no buffered update is lost.
    pub async fn close(&self) {
        self.cancel.cancel();
        let flushed = self.flush_write_buffers().await;
        tokio::join!(self.shared.document.close(), self.shared.relational.close());
        self.shared.cache.clear();
        tracing::info!(flushed, "session coordinator closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::SessionBackend;
    use crate::testing::MemorySessionBackend;
    use sessionkeep_types::session::{ConnectionStatus, SessionSource};

    fn settings() -> CoordinatorSettings {
        CoordinatorSettings {
            cache_ttl: Duration::from_secs(60),
            cache_sweep_interval: Duration::from_secs(120),
            debounce: Duration::from_millis(300),
            connect_attempts: 1,
            connect_backoff_base: Duration::from_millis(10),
            probe_interval: Duration::from_secs(60),
        }
    }

    async fn coordinator() -> (SessionCoordinator, MemorySessionBackend, MemorySessionBackend) {
        let document = MemorySessionBackend::new("document");
        let relational = MemorySessionBackend::new("relational");
        let coordinator = SessionCoordinator::new(
            ManagedBackend::new(document.clone()),
            ManagedBackend::new(relational.clone()),
            settings(),
        );
        coordinator.connect().await;
        (coordinator, document, relational)
    }

    #[tokio::test(start_paused = true)]
    async fn test_save_writes_both_backends() {
        let (coordinator, document, relational) = coordinator().await;
        let record = SessionRecord::new("s1", "owner");
        let created_at = record.created_at;

        assert!(coordinator.save_session(record).await);
        let stored = document.stored("s1").unwrap();
        assert_eq!(stored.created_at, created_at);
        assert!(relational.stored("s1").is_some());
        assert_eq!(coordinator.get_connection_status().cache_size, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_save_succeeds_if_either_backend_does() {
        let (coordinator, document, relational) = coordinator().await;
        document.set_failing(true);

        assert!(coordinator.save_session(SessionRecord::new("s1", "o")).await);
        assert!(relational.stored("s1").is_some());
        assert!(!coordinator.get_connection_status().document_store_up);
    }

    #[tokio::test(start_paused = true)]
    async fn test_debounced_updates_persist_last_state_once() {
        let (coordinator, document, relational) = coordinator().await;
        coordinator
            .save_session(SessionRecord::new("s1", "owner").with_status(ConnectionStatus::Connecting))
            .await;
        let writes_before = document.write_count();

        coordinator.update_session(
            "s1",
            SessionPatch::new()
                .status(ConnectionStatus::Connected)
                .reconnect_attempts(1),
        );
        tokio::time::sleep(Duration::from_millis(100)).await;
        coordinator.update_session("s1", SessionPatch::new().reconnect_attempts(2));
        assert_eq!(coordinator.get_connection_status().buffer_size, 1);

        tokio::time::sleep(Duration::from_millis(400)).await;

        assert_eq!(document.write_count(), writes_before + 1);
        for backend in [&document, &relational] {
            let stored = backend.stored("s1").unwrap();
            assert_eq!(stored.connection_status, ConnectionStatus::Connected);
            assert!(stored.is_connected);
            assert_eq!(stored.reconnect_attempts, 2);
        }
        let cached = coordinator.get_session("s1").await.unwrap();
        assert_eq!(cached.reconnect_attempts, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_serves_cache_until_ttl() {
        let (coordinator, document, relational) = coordinator().await;
        coordinator.save_session(SessionRecord::new("s1", "a")).await;

        // Change the stored copy behind the cache's back.
        let mut changed = document.stored("s1").unwrap();
        changed.owner_id = "b".to_string();
        changed.updated_at = Utc::now();
        document.seed(changed.clone());
        relational.seed(changed);

        tokio::time::advance(Duration::from_millis(59_999)).await;
        assert_eq!(coordinator.get_session("s1").await.unwrap().owner_id, "a");

        tokio::time::advance(Duration::from_millis(2)).await;
        assert_eq!(coordinator.get_session("s1").await.unwrap().owner_id, "b");
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_fails_over_to_other_backend() {
        let (coordinator, document, relational) = coordinator().await;
        relational.seed(SessionRecord::new("s1", "owner"));
        document.set_failing(true);
        coordinator.shared.document.probe().await;

        let record = coordinator.get_session("s1").await.unwrap();
        assert_eq!(record.owner_id, "owner");
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_prefers_newest_record() {
        let (coordinator, document, relational) = coordinator().await;
        let older = SessionRecord::new("s1", "stale");
        let mut newer = older.clone();
        newer.owner_id = "fresh".to_string();
        newer.updated_at = older.updated_at + chrono::Duration::seconds(5);
        document.seed(older);
        relational.seed(newer);

        assert_eq!(coordinator.get_session("s1").await.unwrap().owner_id, "fresh");
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_missing_purges_cache() {
        let (coordinator, document, relational) = coordinator().await;
        coordinator.save_session(SessionRecord::new("s1", "o")).await;
        document.completely_delete_session("s1").await.unwrap();
        relational.completely_delete_session("s1").await.unwrap();

        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(coordinator.get_session("s1").await.is_none());
        assert_eq!(coordinator.get_connection_status().cache_size, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_cancels_pending_update() {
        let (coordinator, document, relational) = coordinator().await;
        coordinator.save_session(SessionRecord::new("s1", "o")).await;
        coordinator.update_session("s1", SessionPatch::new().status(ConnectionStatus::Connected));

        assert!(coordinator.completely_delete_session("s1").await);
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert!(document.stored("s1").is_none());
        assert!(relational.stored("s1").is_none());
        assert!(coordinator.get_session("s1").await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_soft_delete_keeps_record() {
        let (coordinator, document, _) = coordinator().await;
        let mut record = SessionRecord::new("s1", "o").with_status(ConnectionStatus::Connected);
        record.reconnect_attempts = 3;
        coordinator.save_session(record).await;
        coordinator.update_session("s1", SessionPatch::new().reconnect_attempts(4));

        assert!(coordinator.delete_session("s1").await);
        tokio::time::sleep(Duration::from_secs(1)).await;

        let stored = document.stored("s1").unwrap();
        assert!(!stored.is_connected);
        assert_eq!(stored.connection_status, ConnectionStatus::Disconnected);
        assert_eq!(stored.reconnect_attempts, 0);
        assert_eq!(stored.owner_id, "o");
    }

    #[tokio::test(start_paused = true)]
    async fn test_list_prefers_relational_then_document() {
        let (coordinator, document, relational) = coordinator().await;
        document.seed(SessionRecord::new("doc-only", "o"));
        relational.seed(SessionRecord::new("rel-only", "o"));

        let ids: Vec<String> = coordinator
            .list_sessions()
            .await
            .into_iter()
            .map(|r| r.session_id)
            .collect();
        assert_eq!(ids, vec!["rel-only".to_string()]);

        relational.set_failing(true);
        let ids: Vec<String> = coordinator
            .list_sessions()
            .await
            .into_iter()
            .map(|r| r.session_id)
            .collect();
        assert_eq!(ids, vec!["doc-only".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_known_ids_union_both_backends() {
        let (coordinator, document, relational) = coordinator().await;
        document.seed(SessionRecord::new("doc-only", "o"));
        relational.seed(SessionRecord::new("rel-only", "o"));
        relational.seed(SessionRecord::new("both", "o"));
        document.seed(SessionRecord::new("both", "o"));

        let ids = coordinator.known_session_ids().await.unwrap();
        let expected: HashSet<String> = ["doc-only", "rel-only", "both"]
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(ids, expected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_known_ids_none_when_a_listing_fails() {
        let (coordinator, document, relational) = coordinator().await;
        document.seed(SessionRecord::new("a", "o"));
        relational.set_failing(true);

        assert!(coordinator.known_session_ids().await.is_none());

        // The failed listing took the relational store offline.
        let ids = coordinator.known_session_ids().await.unwrap();
        assert!(ids.contains("a"));

        document.set_failing(true);
        assert!(coordinator.known_session_ids().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_undetected_sweep_pattern() {
        let (coordinator, _, _) = coordinator().await;
        let web = SessionRecord::new("web-1", "o")
            .with_source(SessionSource::Secondary)
            .with_status(ConnectionStatus::Connected);
        coordinator.save_session(web).await;
        coordinator
            .save_session(SessionRecord::new("cmd-1", "o").with_status(ConnectionStatus::Connected))
            .await;

        let pending = coordinator.get_undetected_sessions().await;
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].session_id, "web-1");

        assert!(coordinator.mark_session_as_detected("web-1").await);
        assert!(coordinator.get_undetected_sessions().await.is_empty());
        assert!(coordinator.get_session("web-1").await.unwrap().detected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_flushes_pending_updates() {
        let (coordinator, document, _) = coordinator().await;
        coordinator.save_session(SessionRecord::new("s1", "o")).await;
        coordinator.update_session("s1", SessionPatch::new().phone_number("4915"));

        coordinator.close().await;

        assert_eq!(
            document.stored("s1").unwrap().phone_number.as_deref(),
            Some("4915")
        );
        let status = coordinator.get_connection_status();
        assert_eq!(status.buffer_size, 0);
        assert!(!status.document_store_up);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_patch_ignored() {
        let (coordinator, _, _) = coordinator().await;
        assert!(!coordinator.update_session("s1", SessionPatch::new()));
        assert_eq!(coordinator.get_connection_status().buffer_size, 0);
    }
}
