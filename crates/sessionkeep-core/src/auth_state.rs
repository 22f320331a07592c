//! Protocol runtime hooks bound to one session.
//!
//! The protocol runtime loads and saves its auth state through four hooks:
//! the root credential record, and batched typed keys addressed by
//! `(category, id)`. `SessionAuthState` maps those onto `CredentialStore`.

use std::collections::HashMap;
use std::sync::Arc;

use sessionkeep_types::credential::{AuthValue, CredentialKey};

use crate::credential::CredentialStore;

/// Key mutations grouped by category: `category -> id -> value`.
/// A `None` value deletes the key.
pub type KeyMutations = HashMap<String, HashMap<String, Option<AuthValue>>>;

#[derive(Clone)]
pub struct SessionAuthState {
    session_id: String,
    store: Arc<CredentialStore>,
}

impl SessionAuthState {
    pub fn new(session_id: impl Into<String>, store: Arc<CredentialStore>) -> Self {
        Self {
            session_id: session_id.into(),
            store,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Load the root credential record, if present and decodable.
    pub async fn load_creds(&self) -> Option<AuthValue> {
        self.store.read(&CredentialKey::root(&self.session_id)).await
    }

    pub fn save_creds(&self, creds: AuthValue) {
        self.store.write(CredentialKey::root(&self.session_id), creds);
    }

    /// Fetch keys of one category. Ids that are missing are left out.
    pub async fn get_keys(&self, category: &str, ids: &[&str]) -> HashMap<String, AuthValue> {
        let keyed: Vec<(&str, CredentialKey)> = ids
            .iter()
            .map(|id| (*id, CredentialKey::for_key(&self.session_id, category, id)))
            .collect();
        let keys: Vec<CredentialKey> = keyed.iter().map(|(_, key)| key.clone()).collect();

        let mut found = self.store.read_batch(&keys).await;
        keyed
            .into_iter()
            .filter_map(|(id, key)| found.remove(&key).map(|value| (id.to_string(), value)))
            .collect()
    }

    pub async fn set_keys(&self, mutations: KeyMutations) {
        let entries: Vec<(CredentialKey, Option<AuthValue>)> = mutations
            .into_iter()
            .flat_map(|(category, values)| {
                values.into_iter().map(move |(id, value)| {
                    (
                        CredentialKey::for_key(&self.session_id, &category, &id),
                        value,
                    )
                })
            })
            .collect();
        self.store.write_batch(entries).await;
    }

    /// Remove every credential of this session.
    pub async fn clear(&self) -> usize {
        self.store.delete_session_data(&self.session_id).await
    }
}
