use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use vaultline_core::{AppError, TenantId};

/// Textual timestamps without an offset are interpreted in this format and
/// assumed to be UTC.
const NAIVE_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

/// Stable audit event kinds emitted by mutation and login handlers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    /// Emitted when an API key is created.
    CreateKey,
    /// Emitted when an API key is read.
    GetKey,
    /// Emitted when an API key is updated.
    UpdateKey,
    /// Emitted when an API key is deleted.
    DeleteKey,
    /// Emitted when a login succeeds.
    LoginSuccess,
    /// Emitted when a login fails.
    LoginFailed,
    /// Emitted when a stored key reaches its expiry.
    KeyExpiration,
}

impl AuditAction {
    /// Returns the stable wire value for this action.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CreateKey => "create_key",
            Self::GetKey => "get_key",
            Self::UpdateKey => "update_key",
            Self::DeleteKey => "delete_key",
            Self::LoginSuccess => "login_success",
            Self::LoginFailed => "login_failed",
            Self::KeyExpiration => "key_expiration",
        }
    }
}

impl FromStr for AuditAction {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "create_key" => Ok(Self::CreateKey),
            "get_key" => Ok(Self::GetKey),
            "update_key" => Ok(Self::UpdateKey),
            "delete_key" => Ok(Self::DeleteKey),
            "login_success" => Ok(Self::LoginSuccess),
            "login_failed" => Ok(Self::LoginFailed),
            "key_expiration" => Ok(Self::KeyExpiration),
            _ => Err(AppError::Validation(format!(
                "unknown audit action value '{value}'"
            ))),
        }
    }
}

/// Moment an audit event occurred.
///
/// Records written by this service carry the ingestion backend's native
/// integer nanosecond form. Textual ISO-8601 timestamps remain accepted on
/// the wire so that records queued by older producers still normalize.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AuditTimestamp {
    /// Nanoseconds since the Unix epoch, the backend's native unit.
    Nanos(i64),
    /// A textual ISO-8601 / RFC 3339 timestamp, normalized at batching time.
    Text(String),
}

impl AuditTimestamp {
    /// Captures the current wall-clock time in nanoseconds.
    #[must_use]
    pub fn now() -> Self {
        Self::Nanos(Utc::now().timestamp_nanos_opt().unwrap_or(i64::MAX))
    }

    /// Normalizes this timestamp to integer nanoseconds.
    ///
    /// Unparseable textual timestamps fall back to the supplied wall-clock
    /// instant; this is a lossy one-shot substitution and never an error.
    #[must_use]
    pub fn to_nanos(&self, fallback: DateTime<Utc>) -> i64 {
        match self {
            Self::Nanos(value) => *value,
            Self::Text(value) => parse_text_timestamp(value)
                .unwrap_or_else(|| fallback.timestamp_nanos_opt().unwrap_or(i64::MAX)),
        }
    }
}

fn parse_text_timestamp(value: &str) -> Option<i64> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return parsed.timestamp_nanos_opt();
    }

    NaiveDateTime::parse_from_str(value, NAIVE_TIMESTAMP_FORMAT)
        .ok()
        .and_then(|naive| naive.and_utc().timestamp_nanos_opt())
}

/// One immutable audit event.
///
/// Serializes to the flat JSON object used both as the queued wire format
/// and as the log line shipped to the ingestion backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Moment the business event occurred.
    pub timestamp: AuditTimestamp,
    /// Event kind.
    pub action: AuditAction,
    /// Tenant the event belongs to.
    pub tenant_id: TenantId,
    /// Open mapping of event-specific fields (key name, username, reason, ...).
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

impl AuditRecord {
    /// Creates a record stamped with the current wall-clock time.
    #[must_use]
    pub fn new(action: AuditAction, tenant_id: TenantId, attributes: Map<String, Value>) -> Self {
        Self {
            timestamp: AuditTimestamp::now(),
            action,
            tenant_id,
            attributes,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, TimeZone, Utc};
    use serde_json::{Map, Value, json};
    use vaultline_core::TenantId;

    use super::{AuditAction, AuditRecord, AuditTimestamp};

    fn fallback_instant() -> DateTime<Utc> {
        match Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0) {
            chrono::LocalResult::Single(instant) => instant,
            other => panic!("fallback instant should be unambiguous, got {other:?}"),
        }
    }

    #[test]
    fn action_wire_values_round_trip() {
        for action in [
            AuditAction::CreateKey,
            AuditAction::GetKey,
            AuditAction::UpdateKey,
            AuditAction::DeleteKey,
            AuditAction::LoginSuccess,
            AuditAction::LoginFailed,
            AuditAction::KeyExpiration,
        ] {
            assert_eq!(action.as_str().parse::<AuditAction>().ok(), Some(action));
        }
    }

    #[test]
    fn unknown_action_is_rejected() {
        assert!("drop_table".parse::<AuditAction>().is_err());
    }

    #[test]
    fn integer_timestamp_passes_through() {
        let timestamp = AuditTimestamp::Nanos(1_700_000_000_000_000_000);
        assert_eq!(
            timestamp.to_nanos(fallback_instant()),
            1_700_000_000_000_000_000
        );
    }

    #[test]
    fn rfc3339_text_timestamp_is_parsed() {
        let timestamp = AuditTimestamp::Text("2023-11-14T22:13:20+00:00".to_owned());
        assert_eq!(
            timestamp.to_nanos(fallback_instant()),
            1_700_000_000_000_000_000
        );
    }

    #[test]
    fn naive_text_timestamp_is_assumed_utc() {
        let timestamp = AuditTimestamp::Text("2023-11-14T22:13:20.500".to_owned());
        assert_eq!(
            timestamp.to_nanos(fallback_instant()),
            1_700_000_000_500_000_000
        );
    }

    #[test]
    fn unparseable_text_timestamp_uses_fallback() {
        let fallback = fallback_instant();
        let timestamp = AuditTimestamp::Text("not-a-timestamp".to_owned());
        assert_eq!(
            timestamp.to_nanos(fallback),
            fallback.timestamp_nanos_opt().unwrap_or(i64::MAX)
        );
    }

    #[test]
    fn record_serializes_to_flat_json() {
        let Ok(tenant_id) = TenantId::new("acme") else {
            panic!("tenant id 'acme' should be valid");
        };
        let mut attributes = Map::new();
        attributes.insert("key".to_owned(), json!("billing"));
        attributes.insert("username".to_owned(), json!("ops"));
        let record = AuditRecord {
            timestamp: AuditTimestamp::Nanos(42),
            action: AuditAction::CreateKey,
            tenant_id,
            attributes,
        };

        let value: Value = match serde_json::to_value(&record) {
            Ok(value) => value,
            Err(error) => panic!("audit record should serialize: {error}"),
        };
        assert_eq!(value["timestamp"], json!(42));
        assert_eq!(value["action"], json!("create_key"));
        assert_eq!(value["tenant_id"], json!("acme"));
        assert_eq!(value["key"], json!("billing"));

        let parsed: AuditRecord = match serde_json::from_value(value) {
            Ok(parsed) => parsed,
            Err(error) => panic!("flat json should deserialize back: {error}"),
        };
        assert_eq!(parsed, record);
    }
}
