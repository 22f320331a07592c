//! Credential backend trait definition.

use sessionkeep_types::credential::CredentialKey;
use sessionkeep_types::error::RepositoryError;

/// Key-value store for encoded credential payloads.
///
/// Payloads cross this boundary as the text produced by `codec::encode`;
/// backends never interpret them.
pub trait CredentialBackend: Send + Sync {
    fn name(&self) -> &str;

    fn read(
        &self,
        key: &CredentialKey,
    ) -> impl std::future::Future<Output = Result<Option<String>, RepositoryError>> + Send;

    /// Insert or overwrite the payload for `key`.
    fn write(
        &self,
        key: &CredentialKey,
        payload: &str,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Returns whether an entry was removed.
    fn delete(
        &self,
        key: &CredentialKey,
    ) -> impl std::future::Future<Output = Result<bool, RepositoryError>> + Send;

    /// Remove every entry of a session. Returns how many were removed.
    fn delete_session(
        &self,
        session_id: &str,
    ) -> impl std::future::Future<Output = Result<usize, RepositoryError>> + Send;

    /// Distinct session ids that have at least one entry.
    fn list_sessions(
        &self,
    ) -> impl std::future::Future<Output = Result<Vec<String>, RepositoryError>> + Send;

    fn ping(&self) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    fn close(&self) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;
}
