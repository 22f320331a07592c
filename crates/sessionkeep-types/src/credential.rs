//! Credential key and payload types.
//!
//! A credential entry is addressed by `(session_id, file_name)` and holds an
//! opaque tree of protocol key material. Leaves may be raw bytes; the
//! textual storage encoding lives in `sessionkeep-core::codec`.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// File name of the root identity record. Losing it forces a full re-pairing.
pub const ROOT_CREDENTIAL_FILE: &str = "creds";

/// Fields the root record must carry for a session to be resumable.
pub const REQUIRED_IDENTITY_FIELDS: [&str; 2] = ["noiseKey", "signedIdentityKey"];

/// Key categories the protocol runtime reads and writes in batches.
pub mod category {
    pub const PRE_KEY: &str = "pre-key";
    pub const SESSION: &str = "session";
    pub const SENDER_KEY: &str = "sender-key";
    pub const SENDER_KEY_MEMORY: &str = "sender-key-memory";
    pub const APP_STATE_SYNC_KEY: &str = "app-state-sync-key";
    pub const APP_STATE_SYNC_VERSION: &str = "app-state-sync-version";
}

/// Make a logical key name safe to use as a storage key or file name.
///
/// `/` and `\` become `__`, `:` becomes `-`.
pub fn sanitize_file_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        match c {
            '/' | '\\' => out.push_str("__"),
            ':' => out.push('-'),
            other => out.push(other),
        }
    }
    out
}

/// Composite key for one credential entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CredentialKey {
    pub session_id: String,
    /// Sanitized file name.
    pub file_name: String,
}

impl CredentialKey {
    /// Build a key, sanitizing the logical file name.
    pub fn new(session_id: impl Into<String>, file_name: &str) -> Self {
        Self {
            session_id: session_id.into(),
            file_name: sanitize_file_name(file_name),
        }
    }

    /// Key of the root identity record for a session.
    pub fn root(session_id: impl Into<String>) -> Self {
        Self::new(session_id, ROOT_CREDENTIAL_FILE)
    }

    /// Key of a categorized protocol key, e.g. `pre-key-17`.
    pub fn for_key(session_id: impl Into<String>, category: &str, id: &str) -> Self {
        Self::new(session_id, &format!("{category}-{id}"))
    }

    pub fn is_root(&self) -> bool {
        self.file_name == ROOT_CREDENTIAL_FILE
    }
}

impl fmt::Display for CredentialKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.session_id, self.file_name)
    }
}

/// Credential payload: a JSON-shaped tree whose leaves may be raw bytes.
#[derive(Debug, Clone, PartialEq)]
pub enum AuthValue {
    Null,
    Bool(bool),
    Number(serde_json::Number),
    String(String),
    Bytes(Vec<u8>),
    Array(Vec<AuthValue>),
    Object(BTreeMap<String, AuthValue>),
}

impl AuthValue {
    /// Look up a field of an object value.
    pub fn get(&self, field: &str) -> Option<&AuthValue> {
        match self {
            AuthValue::Object(map) => map.get(field),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, AuthValue::Null)
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            AuthValue::Bytes(bytes) => Some(bytes),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            AuthValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Build an object from `(field, value)` pairs.
    pub fn object<I, K>(fields: I) -> Self
    where
        I: IntoIterator<Item = (K, AuthValue)>,
        K: Into<String>,
    {
        AuthValue::Object(fields.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// True when the root record carries every required identity field.
    pub fn has_identity_fields(&self) -> bool {
        REQUIRED_IDENTITY_FIELDS
            .iter()
            .all(|field| self.get(field).is_some_and(|v| !v.is_null()))
    }
}

impl From<Vec<u8>> for AuthValue {
    fn from(bytes: Vec<u8>) -> Self {
        AuthValue::Bytes(bytes)
    }
}

impl From<&str> for AuthValue {
    fn from(s: &str) -> Self {
        AuthValue::String(s.to_string())
    }
}

impl From<String> for AuthValue {
    fn from(s: String) -> Self {
        AuthValue::String(s)
    }
}

impl From<bool> for AuthValue {
    fn from(b: bool) -> Self {
        AuthValue::Bool(b)
    }
}

impl From<i64> for AuthValue {
    fn from(n: i64) -> Self {
        AuthValue::Number(n.into())
    }
}
