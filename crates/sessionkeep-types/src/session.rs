//! Session metadata types.
//!
//! A `SessionRecord` is the persisted view of one long-lived protocol
//! connection. The lifecycle collaborator mutates it through `SessionPatch`
//! values; this crate never decides status transitions itself.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use std::fmt;
use std::str::FromStr;

/// Connection status as reported by the session lifecycle.
///
/// disconnected -> connecting -> connected -> {disconnected | reconnecting -> connected | disconnected}
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionStatus::Disconnected => write!(f, "disconnected"),
            ConnectionStatus::Connecting => write!(f, "connecting"),
            ConnectionStatus::Connected => write!(f, "connected"),
            ConnectionStatus::Reconnecting => write!(f, "reconnecting"),
        }
    }
}

impl FromStr for ConnectionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "disconnected" => Ok(ConnectionStatus::Disconnected),
            "connecting" => Ok(ConnectionStatus::Connecting),
            "connected" => Ok(ConnectionStatus::Connected),
            "reconnecting" => Ok(ConnectionStatus::Reconnecting),
            other => Err(format!("invalid connection status: '{other}'")),
        }
    }
}

/// Channel through which a session was established.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionSource {
    /// Paired through the bot's own command flow.
    #[default]
    Primary,
    /// Paired out-of-band (e.g. a web pairing page) and picked up by a sweep.
    Secondary,
}

impl fmt::Display for SessionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionSource::Primary => write!(f, "primary"),
            SessionSource::Secondary => write!(f, "secondary"),
        }
    }
}

impl FromStr for SessionSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "primary" => Ok(SessionSource::Primary),
            "secondary" => Ok(SessionSource::Secondary),
            other => Err(format!("invalid session source: '{other}'")),
        }
    }
}

/// Persisted metadata for one session.
///
/// `session_id` is unique within each backend. The two backends may
/// transiently disagree; readers reconcile by taking the newest `updated_at`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub session_id: String,
    pub owner_id: String,
    pub phone_number: Option<String>,
    pub is_connected: bool,
    pub connection_status: ConnectionStatus,
    pub reconnect_attempts: u32,
    pub source: SessionSource,
    /// Whether an out-of-band session has been picked up by the sweep.
    pub detected: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SessionRecord {
    /// Create a record for a first connection attempt.
    pub fn new(session_id: impl Into<String>, owner_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            session_id: session_id.into(),
            owner_id: owner_id.into(),
            phone_number: None,
            is_connected: false,
            connection_status: ConnectionStatus::Connecting,
            reconnect_attempts: 0,
            source: SessionSource::Primary,
            detected: false,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_source(mut self, source: SessionSource) -> Self {
        self.source = source;
        self
    }

    pub fn with_phone_number(mut self, phone_number: impl Into<String>) -> Self {
        self.phone_number = Some(phone_number.into());
        self
    }

    pub fn with_status(mut self, status: ConnectionStatus) -> Self {
        self.connection_status = status;
        self.is_connected = status == ConnectionStatus::Connected;
        self
    }

    /// Clear the connection fields, keeping identity and ownership.
    pub fn clear_connection(&mut self) {
        self.is_connected = false;
        self.connection_status = ConnectionStatus::Disconnected;
        self.reconnect_attempts = 0;
        self.updated_at = Utc::now();
    }

    /// True for out-of-band sessions that are live and not yet picked up.
    pub fn is_undetected(&self) -> bool {
        self.source == SessionSource::Secondary
            && self.connection_status == ConnectionStatus::Connected
            && !self.detected
    }
}

/// Partial update listing only the mutable fields of a `SessionRecord`.
///
/// `None` means "leave unchanged". Patches coalesce field by field: a later
/// patch's `Some` wins over an earlier one.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionPatch {
    pub owner_id: Option<String>,
    pub phone_number: Option<String>,
    pub is_connected: Option<bool>,
    pub connection_status: Option<ConnectionStatus>,
    pub reconnect_attempts: Option<u32>,
    pub source: Option<SessionSource>,
    pub detected: Option<bool>,
}

impl SessionPatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the connection status and keep `is_connected` consistent with it.
    pub fn status(mut self, status: ConnectionStatus) -> Self {
        self.connection_status = Some(status);
        self.is_connected = Some(status == ConnectionStatus::Connected);
        self
    }

    pub fn reconnect_attempts(mut self, attempts: u32) -> Self {
        self.reconnect_attempts = Some(attempts);
        self
    }

    pub fn phone_number(mut self, phone_number: impl Into<String>) -> Self {
        self.phone_number = Some(phone_number.into());
        self
    }

    pub fn owner(mut self, owner_id: impl Into<String>) -> Self {
        self.owner_id = Some(owner_id.into());
        self
    }

    pub fn detected(mut self, detected: bool) -> Self {
        self.detected = Some(detected);
        self
    }

    pub fn is_empty(&self) -> bool {
        *self == SessionPatch::default()
    }

    /// Merge a newer patch into this one (last write wins per field).
    pub fn merge(&mut self, newer: SessionPatch) {
        if newer.owner_id.is_some() {
            self.owner_id = newer.owner_id;
        }
        if newer.phone_number.is_some() {
            self.phone_number = newer.phone_number;
        }
        if newer.is_connected.is_some() {
            self.is_connected = newer.is_connected;
        }
        if newer.connection_status.is_some() {
            self.connection_status = newer.connection_status;
        }
        if newer.reconnect_attempts.is_some() {
            self.reconnect_attempts = newer.reconnect_attempts;
        }
        if newer.source.is_some() {
            self.source = newer.source;
        }
        if newer.detected.is_some() {
            self.detected = newer.detected;
        }
    }

    /// Apply the set fields to a record and stamp `updated_at`.
    pub fn apply_to(&self, record: &mut SessionRecord) {
        if let Some(owner_id) = &self.owner_id {
            record.owner_id = owner_id.clone();
        }
        if let Some(phone_number) = &self.phone_number {
            record.phone_number = Some(phone_number.clone());
        }
        if let Some(is_connected) = self.is_connected {
            record.is_connected = is_connected;
        }
        if let Some(status) = self.connection_status {
            record.connection_status = status;
        }
        if let Some(attempts) = self.reconnect_attempts {
            record.reconnect_attempts = attempts;
        }
        if let Some(source) = self.source {
            record.source = source;
        }
        if let Some(detected) = self.detected {
            record.detected = detected;
        }
        record.updated_at = Utc::now();
    }
}

/// Snapshot of coordinator health for administrative collaborators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionStatusReport {
    pub document_store_up: bool,
    pub relational_store_up: bool,
    pub cache_size: usize,
    pub buffer_size: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enum_defaults() {
        assert_eq!(ConnectionStatus::default(), ConnectionStatus::Disconnected);
        assert_eq!(SessionSource::default(), SessionSource::Primary);
    }

    #[test]
    fn test_connection_status_roundtrip() {
        for status in [
            ConnectionStatus::Disconnected,
            ConnectionStatus::Connecting,
            ConnectionStatus::Connected,
            ConnectionStatus::Reconnecting,
        ] {
            let parsed: ConnectionStatus = status.to_string().parse().unwrap();
            assert_eq!(parsed, status);
        }
        assert!("online".parse::<ConnectionStatus>().is_err());
    }

    #[test]
    fn test_session_source_serde() {
        let json = serde_json::to_string(&SessionSource::Secondary).unwrap();
        assert_eq!(json, "\"secondary\"");
        let parsed: SessionSource = serde_json::from_str("\"primary\"").unwrap();
        assert_eq!(parsed, SessionSource::Primary);
    }

    #[test]
    fn test_new_record_defaults() {
        let record = SessionRecord::new("s1", "owner-1");
        assert_eq!(record.connection_status, ConnectionStatus::Connecting);
        assert!(!record.is_connected);
        assert_eq!(record.reconnect_attempts, 0);
        assert_eq!(record.source, SessionSource::Primary);
        assert_eq!(record.created_at, record.updated_at);
    }

    #[test]
    fn test_patch_merge_last_write_wins_per_field() {
        let mut first = SessionPatch::new()
            .status(ConnectionStatus::Connected)
            .reconnect_attempts(1);
        let second = SessionPatch::new().reconnect_attempts(2).phone_number("123");
        first.merge(second);

        assert_eq!(first.connection_status, Some(ConnectionStatus::Connected));
        assert_eq!(first.is_connected, Some(true));
        assert_eq!(first.reconnect_attempts, Some(2));
        assert_eq!(first.phone_number.as_deref(), Some("123"));
    }

    #[test]
    fn test_patch_apply_leaves_unset_fields() {
        let mut record = SessionRecord::new("s1", "owner-1").with_phone_number("555");
        let before = record.updated_at;
        SessionPatch::new().reconnect_attempts(4).apply_to(&mut record);

        assert_eq!(record.reconnect_attempts, 4);
        assert_eq!(record.phone_number.as_deref(), Some("555"));
        assert_eq!(record.owner_id, "owner-1");
        assert!(record.updated_at >= before);
    }

    #[test]
    fn test_empty_patch() {
        assert!(SessionPatch::new().is_empty());
        assert!(!SessionPatch::new().detected(true).is_empty());
    }

    #[test]
    fn test_clear_connection() {
        let mut record = SessionRecord::new("s1", "owner-1").with_status(ConnectionStatus::Connected);
        record.reconnect_attempts = 3;
        record.clear_connection();

        assert!(!record.is_connected);
        assert_eq!(record.connection_status, ConnectionStatus::Disconnected);
        assert_eq!(record.reconnect_attempts, 0);
        assert_eq!(record.owner_id, "owner-1");
    }

    #[test]
    fn test_is_undetected() {
        let record = SessionRecord::new("s1", "o")
            .with_source(SessionSource::Secondary)
            .with_status(ConnectionStatus::Connected);
        assert!(record.is_undetected());

        let mut detected = record.clone();
        detected.detected = true;
        assert!(!detected.is_undetected());

        let primary = record.clone().with_source(SessionSource::Primary);
        assert!(!primary.is_undetected());

        let connecting = record.with_status(ConnectionStatus::Connecting);
        assert!(!connecting.is_undetected());
    }

    #[test]
    fn test_record_serde_roundtrip() {
        let record = SessionRecord::new("s1", "owner-1").with_phone_number("4915");
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"connection_status\":\"connecting\""));
        let parsed: SessionRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, record);
    }
}
