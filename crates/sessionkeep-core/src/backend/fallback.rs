//! Primary/secondary chaining for credential backends.
//!
//! Writes go to the primary and fall through to the secondary only on
//! error. A successful primary write drops the secondary's copy, so the
//! secondary only ever holds keys written while the primary was failing,
//! and those are newer than anything the primary has. Reads therefore
//! consult the secondary first. Deletes go to both so neither side can
//! resurrect a removed key.

use sessionkeep_types::credential::CredentialKey;
use sessionkeep_types::error::RepositoryError;

use super::credential::CredentialBackend;

pub struct FallbackCredentialBackend<P, S> {
    primary: P,
    secondary: S,
    name: String,
}

impl<P: CredentialBackend, S: CredentialBackend> FallbackCredentialBackend<P, S> {
    pub fn new(primary: P, secondary: S) -> Self {
        let name = format!("{}+{}", primary.name(), secondary.name());
        Self {
            primary,
            secondary,
            name,
        }
    }
}

/// Combine two results, succeeding if either side did.
fn either<T>(
    primary: Result<T, RepositoryError>,
    secondary: Result<T, RepositoryError>,
    combine: impl FnOnce(T, T) -> T,
) -> Result<T, RepositoryError> {
    match (primary, secondary) {
        (Ok(a), Ok(b)) => Ok(combine(a, b)),
        (Ok(a), Err(_)) => Ok(a),
        (Err(_), Ok(b)) => Ok(b),
        (Err(e), Err(_)) => Err(e),
    }
}

impl<P: CredentialBackend, S: CredentialBackend> CredentialBackend
    for FallbackCredentialBackend<P, S>
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn read(&self, key: &CredentialKey) -> Result<Option<String>, RepositoryError> {
        let secondary_err = match self.secondary.read(key).await {
            Ok(Some(payload)) => return Ok(Some(payload)),
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(
                    backend = self.secondary.name(),
                    key = %key,
                    error = %e,
                    "secondary credential read failed, trying primary"
                );
                Some(e)
            }
        };
        match self.primary.read(key).await {
            Ok(Some(payload)) => Ok(Some(payload)),
            Ok(None) => match secondary_err {
                Some(e) => Err(e),
                None => Ok(None),
            },
            Err(e) => Err(e),
        }
    }

    async fn write(&self, key: &CredentialKey, payload: &str) -> Result<(), RepositoryError> {
        if let Err(e) = self.primary.write(key, payload).await {
            tracing::warn!(
                backend = self.primary.name(),
                key = %key,
                error = %e,
                "primary credential write failed, writing to secondary"
            );
            return self.secondary.write(key, payload).await;
        }

        // A stale secondary copy would shadow the value just written.
        if let Err(e) = self.secondary.delete(key).await {
            tracing::warn!(
                backend = self.secondary.name(),
                key = %key,
                error = %e,
                "failed to drop secondary copy, overwriting it instead"
            );
            return self.secondary.write(key, payload).await;
        }
        Ok(())
    }

    async fn delete(&self, key: &CredentialKey) -> Result<bool, RepositoryError> {
        let (primary, secondary) =
            tokio::join!(self.primary.delete(key), self.secondary.delete(key));
        either(primary, secondary, |a, b| a || b)
    }

    async fn delete_session(&self, session_id: &str) -> Result<usize, RepositoryError> {
        let (primary, secondary) = tokio::join!(
            self.primary.delete_session(session_id),
            self.secondary.delete_session(session_id)
        );
        either(primary, secondary, |a, b| a + b)
    }

    async fn list_sessions(&self) -> Result<Vec<String>, RepositoryError> {
        let (primary, secondary) =
            tokio::join!(self.primary.list_sessions(), self.secondary.list_sessions());
        either(primary, secondary, |mut a, b| {
            a.extend(b);
            a.sort();
            a.dedup();
            a
        })
    }

    async fn ping(&self) -> Result<(), RepositoryError> {
        match self.primary.ping().await {
            Ok(()) => Ok(()),
            Err(_) => self.secondary.ping().await,
        }
    }

    async fn close(&self) -> Result<(), RepositoryError> {
        let (primary, secondary) = tokio::join!(self.primary.close(), self.secondary.close());
        primary.and(secondary)
    }
}
