use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Sentinel for descriptive fields the source schema did not supply.
///
/// Applied uniformly at parse time: every optional attribute of a record is a
/// plain string, and absence is always this value, never an empty string.
pub const NOT_APPLICABLE: &str = "N/A";

/// Canonical sign-in outcome vocabulary shared by both log schemas.
pub const STATUS_SUCCESS: &str = "Success";
pub const STATUS_FAILURE: &str = "Failure";
pub const STATUS_INTERRUPTED: &str = "Interrupted";

/// One authentication event as parsed from a log export, before geocoding.
///
/// Field names serialize in camelCase so share payloads keep the wire shape
/// the map viewer expects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogRecord {
    pub user: String,
    pub ip: String,
    pub timestamp: DateTime<Utc>,
    pub application: String,
    pub mfa_requirement: String,
    pub mfa_method: String,
    pub user_agent: String,
    pub os: String,
    pub browser: String,
    pub compliant: String,
    pub managed: String,
    pub status: String,
    pub reason: String,
}

impl LogRecord {
    /// A record with every descriptive attribute set to the sentinel.
    pub fn bare(user: String, ip: String, timestamp: DateTime<Utc>) -> Self {
        LogRecord {
            user,
            ip,
            timestamp,
            application: NOT_APPLICABLE.to_string(),
            mfa_requirement: NOT_APPLICABLE.to_string(),
            mfa_method: NOT_APPLICABLE.to_string(),
            user_agent: NOT_APPLICABLE.to_string(),
            os: NOT_APPLICABLE.to_string(),
            browser: NOT_APPLICABLE.to_string(),
            compliant: NOT_APPLICABLE.to_string(),
            managed: NOT_APPLICABLE.to_string(),
            status: NOT_APPLICABLE.to_string(),
            reason: NOT_APPLICABLE.to_string(),
        }
    }
}

/// A log record whose IP resolved to geographic coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Connection {
    #[serde(flatten)]
    pub record: LogRecord,
    pub lat: f64,
    pub lon: f64,
}

/// Per-identity aggregate produced by one ingestion run.
///
/// Replaced wholesale on re-ingestion; never mutated incrementally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserMapData {
    pub user: String,
    /// Deterministic `hsl(h, 90%, 70%)` display color for this identity.
    pub color: String,
    /// All geocoded connections, ascending by timestamp.
    pub all_connections: Vec<Connection>,
}

impl UserMapData {
    /// The chronologically last connection, if any.
    pub fn latest_connection(&self) -> Option<&Connection> {
        self.all_connections.last()
    }
}

/// One identity's share of a rendered marker.
#[derive(Debug, Clone, PartialEq)]
pub struct UserMarker {
    pub color: String,
    pub connections: Vec<Connection>,
}

/// One rendered map point, possibly folding several nearby IPs together.
///
/// Built fresh on every clustering pass and never persisted. The `lat`/`lon`
/// pair is the position of the first candidate folded in, not a centroid.
#[derive(Debug, Clone, PartialEq)]
pub struct MarkerData {
    pub ips: Vec<String>,
    pub lat: f64,
    pub lon: f64,
    pub users: BTreeMap<String, UserMarker>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_record() -> LogRecord {
        LogRecord::bare(
            "alice@x.com".to_string(),
            "8.8.8.8".to_string(),
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        )
    }

    #[test]
    fn test_bare_record_uses_sentinel() {
        let record = sample_record();
        assert_eq!(record.application, NOT_APPLICABLE);
        assert_eq!(record.status, NOT_APPLICABLE);
        assert_eq!(record.reason, NOT_APPLICABLE);
    }

    #[test]
    fn test_record_serializes_camel_case() {
        let json = serde_json::to_value(sample_record()).unwrap();
        assert!(json.get("mfaRequirement").is_some());
        assert!(json.get("userAgent").is_some());
        assert!(json.get("mfa_requirement").is_none());
    }

    #[test]
    fn test_connection_flattens_record_fields() {
        let conn = Connection {
            record: sample_record(),
            lat: 37.4,
            lon: -122.0,
        };
        let json = serde_json::to_value(&conn).unwrap();
        assert_eq!(json["user"], "alice@x.com");
        assert_eq!(json["lat"], 37.4);
    }

    #[test]
    fn test_latest_connection_is_last_element() {
        let first = Connection {
            record: sample_record(),
            lat: 1.0,
            lon: 1.0,
        };
        let mut second = first.clone();
        second.record.timestamp = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();

        let data = UserMapData {
            user: "alice@x.com".to_string(),
            color: "hsl(0, 90%, 70%)".to_string(),
            all_connections: vec![first, second.clone()],
        };
        assert_eq!(data.latest_connection(), Some(&second));

        let empty = UserMapData {
            user: "bob@x.com".to_string(),
            color: "hsl(180, 90%, 70%)".to_string(),
            all_connections: Vec::new(),
        };
        assert!(empty.latest_connection().is_none());
    }
}
