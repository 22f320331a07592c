//! Availability tracking around a session backend.
//!
//! `ManagedBackend` is the adapter boundary seen by the coordinator: every
//! operation returns a plain value (`bool`, `Option`) instead of an error.
//! A failed operation logs, flips the availability flag to false, and
//! reports failure. Only a successful `connect` or `probe` flips it back.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use sessionkeep_types::error::RepositoryError;
use sessionkeep_types::session::{SessionPatch, SessionRecord};

use super::box_backend::BoxSessionBackend;
use super::session::SessionBackend;

pub struct ManagedBackend {
    backend: BoxSessionBackend,
    available: AtomicBool,
}

impl ManagedBackend {
    /// Wrap a backend. It starts unavailable until `connect` succeeds.
    pub fn new<T: SessionBackend + 'static>(backend: T) -> Self {
        Self {
            backend: BoxSessionBackend::new(backend),
            available: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &str {
        self.backend.name()
    }

    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::Acquire)
    }

    fn set_available(&self, up: bool) {
        let was = self.available.swap(up, Ordering::AcqRel);
        if was != up {
            if up {
                tracing::info!(backend = self.name(), "backend available");
            } else {
                tracing::warn!(backend = self.name(), "backend marked unavailable");
            }
        }
    }

    /// Connect with exponential backoff (`base`, `2*base`, ...).
    ///
    /// Gives up after `attempts` tries and leaves the backend unavailable;
    /// the health monitor may bring it back later.
    pub async fn connect(&self, attempts: u32, base: Duration) -> bool {
        let attempts = attempts.max(1);
        for attempt in 1..=attempts {
            match self.backend.connect().await {
                Ok(()) => {
                    self.set_available(true);
                    return true;
                }
                Err(e) => {
                    tracing::warn!(
                        backend = self.name(),
                        attempt,
                        attempts,
                        error = %e,
                        "backend connect failed"
                    );
                    if attempt < attempts {
                        let delay = base.saturating_mul(1u32 << (attempt - 1).min(16));
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }
        self.set_available(false);
        false
    }

    /// Ping the backend and set availability from the outcome.
    pub async fn probe(&self) -> bool {
        match self.backend.ping().await {
            Ok(()) => {
                self.set_available(true);
                true
            }
            Err(e) => {
                tracing::debug!(backend = self.name(), error = %e, "liveness probe failed");
                self.set_available(false);
                false
            }
        }
    }

    fn settle<T>(&self, op: &'static str, result: Result<T, RepositoryError>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(backend = self.name(), op, error = %e, "backend operation failed");
                self.set_available(false);
                None
            }
        }
    }

    pub async fn save_session(&self, record: &SessionRecord) -> bool {
        let result = self.backend.save_session(record).await;
        self.settle("save_session", result).is_some()
    }

    /// `None` covers both "not found" and "failed".
    pub async fn get_session(&self, session_id: &str) -> Option<SessionRecord> {
        let result = self.backend.get_session(session_id).await;
        self.settle("get_session", result).flatten()
    }

    pub async fn update_session(&self, session_id: &str, patch: &SessionPatch) -> bool {
        let result = self.backend.update_session(session_id, patch).await;
        self.settle("update_session", result).unwrap_or(false)
    }

    pub async fn delete_session(&self, session_id: &str) -> bool {
        let result = self.backend.delete_session(session_id).await;
        self.settle("delete_session", result).unwrap_or(false)
    }

    pub async fn completely_delete_session(&self, session_id: &str) -> bool {
        let result = self.backend.completely_delete_session(session_id).await;
        self.settle("completely_delete_session", result)
            .unwrap_or(false)
    }

    /// `None` when the backend failed, so the caller can try the other one.
    pub async fn list_sessions(&self) -> Option<Vec<SessionRecord>> {
        let result = self.backend.list_sessions().await;
        self.settle("list_sessions", result)
    }

    pub async fn list_undetected(&self) -> Option<Vec<SessionRecord>> {
        let result = self.backend.list_undetected().await;
        self.settle("list_undetected", result)
    }

    pub async fn close(&self) {
        if let Err(e) = self.backend.close().await {
            tracing::warn!(backend = self.name(), error = %e, "backend close failed");
        }
        self.available.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemorySessionBackend;

    #[tokio::test(start_paused = true)]
    async fn test_connect_retries_with_backoff() {
        let memory = MemorySessionBackend::new("document");
        memory.fail_connects(2);
        let managed = ManagedBackend::new(memory.clone());

        let started = tokio::time::Instant::now();
        assert!(managed.connect(3, Duration::from_millis(500)).await);
        assert!(managed.is_available());
        assert_eq!(memory.connect_calls(), 3);
        // 500ms after the first failure, 1000ms after the second.
        assert_eq!(started.elapsed(), Duration::from_millis(1500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_gives_up() {
        let memory = MemorySessionBackend::new("document");
        memory.fail_connects(10);
        let managed = ManagedBackend::new(memory.clone());

        assert!(!managed.connect(3, Duration::from_millis(10)).await);
        assert!(!managed.is_available());
        assert_eq!(memory.connect_calls(), 3);
    }

    #[tokio::test]
    async fn test_operation_failure_flips_flag() {
        let memory = MemorySessionBackend::new("relational");
        let managed = ManagedBackend::new(memory.clone());
        assert!(managed.connect(1, Duration::ZERO).await);

        memory.set_failing(true);
        let record = SessionRecord::new("s1", "owner");
        assert!(!managed.save_session(&record).await);
        assert!(!managed.is_available());
        assert!(managed.list_sessions().await.is_none());
    }

    #[tokio::test]
    async fn test_probe_restores_availability() {
        let memory = MemorySessionBackend::new("relational");
        let managed = ManagedBackend::new(memory.clone());

        memory.set_failing(true);
        assert!(!managed.probe().await);
        assert!(!managed.is_available());

        memory.set_failing(false);
        assert!(managed.probe().await);
        assert!(managed.is_available());
    }

    #[tokio::test]
    async fn test_missing_record_is_none_not_failure() {
        let memory = MemorySessionBackend::new("document");
        let managed = ManagedBackend::new(memory);
        assert!(managed.connect(1, Duration::ZERO).await);

        assert!(managed.get_session("missing").await.is_none());
        assert!(!managed.update_session("missing", &SessionPatch::new().detected(true)).await);
        assert!(managed.is_available());
    }
}
