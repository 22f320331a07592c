//! Session backend trait definition.

use sessionkeep_types::error::RepositoryError;
use sessionkeep_types::session::{SessionPatch, SessionRecord};

/// Uniform CRUD contract over one physical session store.
///
/// Implementations live in sessionkeep-infra (`SqliteSessionBackend`,
/// `DocumentSessionBackend`). Errors are returned, never swallowed; turning
/// them into routing decisions is the job of `ManagedBackend`.
pub trait SessionBackend: Send + Sync {
    /// Short backend name for logs and status output.
    fn name(&self) -> &str;

    /// Open the connection pool or database handle. Safe to call again after a failure.
    fn connect(&self) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Insert or replace a record as given.
    fn save_session(
        &self,
        record: &SessionRecord,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    fn get_session(
        &self,
        session_id: &str,
    ) -> impl std::future::Future<Output = Result<Option<SessionRecord>, RepositoryError>> + Send;

    /// Apply the set fields of `patch` and stamp `updated_at`.
    ///
    /// Returns `Ok(false)` when no record exists for `session_id`.
    fn update_session(
        &self,
        session_id: &str,
        patch: &SessionPatch,
    ) -> impl std::future::Future<Output = Result<bool, RepositoryError>> + Send;

    /// Soft delete: clear the connection fields and keep the record.
    fn delete_session(
        &self,
        session_id: &str,
    ) -> impl std::future::Future<Output = Result<bool, RepositoryError>> + Send;

    /// Hard delete: remove the record entirely.
    fn completely_delete_session(
        &self,
        session_id: &str,
    ) -> impl std::future::Future<Output = Result<bool, RepositoryError>> + Send;

    /// Every record, newest `updated_at` first.
    fn list_sessions(
        &self,
    ) -> impl std::future::Future<Output = Result<Vec<SessionRecord>, RepositoryError>> + Send;

    /// Secondary-channel sessions that are connected and not yet detected.
    fn list_undetected(
        &self,
    ) -> impl std::future::Future<Output = Result<Vec<SessionRecord>, RepositoryError>> + Send;

    /// Lightweight liveness probe.
    fn ping(&self) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    fn close(&self) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;
}
