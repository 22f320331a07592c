//! Object-safe dynamic dispatch wrappers for the backend traits.
//!
//! Same blanket-impl pattern for both traits:
//! 1. Define an object-safe `XxxDyn` trait with boxed futures
//! 2. Blanket-impl `XxxDyn` for all `T: Xxx`
//! 3. `BoxXxx` wraps `Box<dyn XxxDyn>` and delegates

use std::future::Future;
use std::pin::Pin;

use sessionkeep_types::credential::CredentialKey;
use sessionkeep_types::error::RepositoryError;
use sessionkeep_types::session::{SessionPatch, SessionRecord};

use super::credential::CredentialBackend;
use super::session::SessionBackend;

type BoxFut<'a, T> = Pin<Box<dyn Future<Output = Result<T, RepositoryError>> + Send + 'a>>;

/// Object-safe version of [`SessionBackend`] with boxed futures.
pub trait SessionBackendDyn: Send + Sync {
    fn name(&self) -> &str;
    fn connect_boxed(&self) -> BoxFut<'_, ()>;
    fn save_session_boxed<'a>(&'a self, record: &'a SessionRecord) -> BoxFut<'a, ()>;
    fn get_session_boxed<'a>(&'a self, session_id: &'a str) -> BoxFut<'a, Option<SessionRecord>>;
    fn update_session_boxed<'a>(
        &'a self,
        session_id: &'a str,
        patch: &'a SessionPatch,
    ) -> BoxFut<'a, bool>;
    fn delete_session_boxed<'a>(&'a self, session_id: &'a str) -> BoxFut<'a, bool>;
    fn completely_delete_session_boxed<'a>(&'a self, session_id: &'a str) -> BoxFut<'a, bool>;
    fn list_sessions_boxed(&self) -> BoxFut<'_, Vec<SessionRecord>>;
    fn list_undetected_boxed(&self) -> BoxFut<'_, Vec<SessionRecord>>;
    fn ping_boxed(&self) -> BoxFut<'_, ()>;
    fn close_boxed(&self) -> BoxFut<'_, ()>;
}

impl<T: SessionBackend> SessionBackendDyn for T {
    fn name(&self) -> &str {
        SessionBackend::name(self)
    }

    fn connect_boxed(&self) -> BoxFut<'_, ()> {
        Box::pin(self.connect())
    }

    fn save_session_boxed<'a>(&'a self, record: &'a SessionRecord) -> BoxFut<'a, ()> {
        Box::pin(self.save_session(record))
    }

    fn get_session_boxed<'a>(&'a self, session_id: &'a str) -> BoxFut<'a, Option<SessionRecord>> {
        Box::pin(self.get_session(session_id))
    }

    fn update_session_boxed<'a>(
        &'a self,
        session_id: &'a str,
        patch: &'a SessionPatch,
    ) -> BoxFut<'a, bool> {
        Box::pin(self.update_session(session_id, patch))
    }

    fn delete_session_boxed<'a>(&'a self, session_id: &'a str) -> BoxFut<'a, bool> {
        Box::pin(self.delete_session(session_id))
    }

    fn completely_delete_session_boxed<'a>(&'a self, session_id: &'a str) -> BoxFut<'a, bool> {
        Box::pin(self.completely_delete_session(session_id))
    }

    fn list_sessions_boxed(&self) -> BoxFut<'_, Vec<SessionRecord>> {
        Box::pin(self.list_sessions())
    }

    fn list_undetected_boxed(&self) -> BoxFut<'_, Vec<SessionRecord>> {
        Box::pin(self.list_undetected())
    }

    fn ping_boxed(&self) -> BoxFut<'_, ()> {
        Box::pin(self.ping())
    }

    fn close_boxed(&self) -> BoxFut<'_, ()> {
        Box::pin(self.close())
    }
}

/// Type-erased session backend for runtime adapter selection.
///
/// Since `SessionBackend` uses RPITIT, it cannot be used as a trait object
/// directly. `BoxSessionBackend` provides the same methods and delegates to
/// the inner `SessionBackendDyn` trait object.
pub struct BoxSessionBackend {
    inner: Box<dyn SessionBackendDyn + Send + Sync>,
}

impl BoxSessionBackend {
    pub fn new<T: SessionBackend + 'static>(backend: T) -> Self {
        Self {
            inner: Box::new(backend),
        }
    }

    pub fn name(&self) -> &str {
        self.inner.name()
    }

    pub async fn connect(&self) -> Result<(), RepositoryError> {
        self.inner.connect_boxed().await
    }

    pub async fn save_session(&self, record: &SessionRecord) -> Result<(), RepositoryError> {
        self.inner.save_session_boxed(record).await
    }

    pub async fn get_session(
        &self,
        session_id: &str,
    ) -> Result<Option<SessionRecord>, RepositoryError> {
        self.inner.get_session_boxed(session_id).await
    }

    pub async fn update_session(
        &self,
        session_id: &str,
        patch: &SessionPatch,
    ) -> Result<bool, RepositoryError> {
        self.inner.update_session_boxed(session_id, patch).await
    }

    pub async fn delete_session(&self, session_id: &str) -> Result<bool, RepositoryError> {
        self.inner.delete_session_boxed(session_id).await
    }

    pub async fn completely_delete_session(
        &self,
        session_id: &str,
    ) -> Result<bool, RepositoryError> {
        self.inner.completely_delete_session_boxed(session_id).await
    }

    pub async fn list_sessions(&self) -> Result<Vec<SessionRecord>, RepositoryError> {
        self.inner.list_sessions_boxed().await
    }

    pub async fn list_undetected(&self) -> Result<Vec<SessionRecord>, RepositoryError> {
        self.inner.list_undetected_boxed().await
    }

    pub async fn ping(&self) -> Result<(), RepositoryError> {
        self.inner.ping_boxed().await
    }

    pub async fn close(&self) -> Result<(), RepositoryError> {
        self.inner.close_boxed().await
    }
}

/// Object-safe version of [`CredentialBackend`] with boxed futures.
pub trait CredentialBackendDyn: Send + Sync {
    fn name(&self) -> &str;
    fn read_boxed<'a>(&'a self, key: &'a CredentialKey) -> BoxFut<'a, Option<String>>;
    fn write_boxed<'a>(&'a self, key: &'a CredentialKey, payload: &'a str) -> BoxFut<'a, ()>;
    fn delete_boxed<'a>(&'a self, key: &'a CredentialKey) -> BoxFut<'a, bool>;
    fn delete_session_boxed<'a>(&'a self, session_id: &'a str) -> BoxFut<'a, usize>;
    fn list_sessions_boxed(&self) -> BoxFut<'_, Vec<String>>;
    fn ping_boxed(&self) -> BoxFut<'_, ()>;
    fn close_boxed(&self) -> BoxFut<'_, ()>;
}

impl<T: CredentialBackend> CredentialBackendDyn for T {
    fn name(&self) -> &str {
        CredentialBackend::name(self)
    }

    fn read_boxed<'a>(&'a self, key: &'a CredentialKey) -> BoxFut<'a, Option<String>> {
        Box::pin(self.read(key))
    }

    fn write_boxed<'a>(&'a self, key: &'a CredentialKey, payload: &'a str) -> BoxFut<'a, ()> {
        Box::pin(self.write(key, payload))
    }

    fn delete_boxed<'a>(&'a self, key: &'a CredentialKey) -> BoxFut<'a, bool> {
        Box::pin(self.delete(key))
    }

    fn delete_session_boxed<'a>(&'a self, session_id: &'a str) -> BoxFut<'a, usize> {
        Box::pin(self.delete_session(session_id))
    }

    fn list_sessions_boxed(&self) -> BoxFut<'_, Vec<String>> {
        Box::pin(self.list_sessions())
    }

    fn ping_boxed(&self) -> BoxFut<'_, ()> {
        Box::pin(self.ping())
    }

    fn close_boxed(&self) -> BoxFut<'_, ()> {
        Box::pin(self.close())
    }
}

/// Type-erased credential backend, selected at startup from configuration.
pub struct BoxCredentialBackend {
    inner: Box<dyn CredentialBackendDyn + Send + Sync>,
}

impl BoxCredentialBackend {
    pub fn new<T: CredentialBackend + 'static>(backend: T) -> Self {
        Self {
            inner: Box::new(backend),
        }
    }

    pub fn name(&self) -> &str {
        self.inner.name()
    }

    pub async fn read(&self, key: &CredentialKey) -> Result<Option<String>, RepositoryError> {
        self.inner.read_boxed(key).await
    }

    pub async fn write(&self, key: &CredentialKey, payload: &str) -> Result<(), RepositoryError> {
        self.inner.write_boxed(key, payload).await
    }

    pub async fn delete(&self, key: &CredentialKey) -> Result<bool, RepositoryError> {
        self.inner.delete_boxed(key).await
    }

    pub async fn delete_session(&self, session_id: &str) -> Result<usize, RepositoryError> {
        self.inner.delete_session_boxed(session_id).await
    }

    pub async fn list_sessions(&self) -> Result<Vec<String>, RepositoryError> {
        self.inner.list_sessions_boxed().await
    }

    pub async fn ping(&self) -> Result<(), RepositoryError> {
        self.inner.ping_boxed().await
    }

    pub async fn close(&self) -> Result<(), RepositoryError> {
        self.inner.close_boxed().await
    }
}

/// A boxed backend is itself a backend, so it can sit inside a
/// [`FallbackCredentialBackend`](super::FallbackCredentialBackend).
impl CredentialBackend for BoxCredentialBackend {
    fn name(&self) -> &str {
        BoxCredentialBackend::name(self)
    }

    async fn read(&self, key: &CredentialKey) -> Result<Option<String>, RepositoryError> {
        BoxCredentialBackend::read(self, key).await
    }

    async fn write(&self, key: &CredentialKey, payload: &str) -> Result<(), RepositoryError> {
        BoxCredentialBackend::write(self, key, payload).await
    }

    async fn delete(&self, key: &CredentialKey) -> Result<bool, RepositoryError> {
        BoxCredentialBackend::delete(self, key).await
    }

    async fn delete_session(&self, session_id: &str) -> Result<usize, RepositoryError> {
        BoxCredentialBackend::delete_session(self, session_id).await
    }

    async fn list_sessions(&self) -> Result<Vec<String>, RepositoryError> {
        BoxCredentialBackend::list_sessions(self).await
    }

    async fn ping(&self) -> Result<(), RepositoryError> {
        BoxCredentialBackend::ping(self).await
    }

    async fn close(&self) -> Result<(), RepositoryError> {
        BoxCredentialBackend::close(self).await
    }
}
