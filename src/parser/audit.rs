//! Embedded-event schema: each row carries a JSON event blob in one column.

use serde::Deserialize;

use crate::models::{
    LogRecord, NOT_APPLICABLE, STATUS_FAILURE, STATUS_INTERRUPTED, STATUS_SUCCESS,
};

use super::{canonicalize_os, field, is_ip_shaped, normalize_reason, parse_timestamp, HeaderIndex};

const OP_LOGIN_SUCCESS: &str = "UserLoggedIn";
const OP_LOGIN_FAILED: &str = "UserLoginFailed";
// Case-sensitive keyword that reclassifies a failure as an interruption.
const INTERRUPT_KEYWORD: &str = "Interrupt";

#[derive(Debug, Deserialize)]
struct AuditEvent {
    #[serde(rename = "Operation")]
    operation: Option<String>,
    #[serde(rename = "ClientIP")]
    client_ip: Option<String>,
    #[serde(rename = "LogonError")]
    logon_error: Option<String>,
    #[serde(rename = "DeviceProperties", default)]
    device_properties: Vec<NamedProperty>,
    #[serde(rename = "ExtendedProperties", default)]
    extended_properties: Vec<NamedProperty>,
}

#[derive(Debug, Deserialize)]
struct NamedProperty {
    #[serde(rename = "Name")]
    name: Option<String>,
    #[serde(rename = "Value")]
    value: Option<String>,
}

fn named(props: &[NamedProperty], name: &str) -> Option<String> {
    props
        .iter()
        .find(|p| p.name.as_deref() == Some(name))
        .and_then(|p| p.value.clone())
}

/// Parse one audit-trail row. Only login success/failure events with a
/// plausible client IP become records; everything else is skipped.
pub(crate) fn parse_row(fields: &[String], idx: &HeaderIndex) -> Option<LogRecord> {
    let blob = field(fields, idx.audit_data)?;
    if blob.is_empty() {
        return None;
    }
    let event: AuditEvent = match serde_json::from_str(blob) {
        Ok(event) => event,
        Err(e) => {
            log::debug!("skipping row with malformed audit blob: {}", e);
            return None;
        }
    };

    let operation = event.operation.as_deref()?;
    if operation != OP_LOGIN_SUCCESS && operation != OP_LOGIN_FAILED {
        return None;
    }
    let ip = event.client_ip.as_deref().filter(|ip| is_ip_shaped(ip))?;

    let raw_reason = event.logon_error.as_deref().unwrap_or(NOT_APPLICABLE);
    let status = if operation == OP_LOGIN_SUCCESS {
        STATUS_SUCCESS
    } else if raw_reason.contains(INTERRUPT_KEYWORD) {
        STATUS_INTERRUPTED
    } else {
        STATUS_FAILURE
    };

    let timestamp = parse_timestamp(field(fields, idx.date)?.trim())?;
    let user = match field(fields, idx.user).map(str::trim) {
        Some(value) if !value.is_empty() => value.to_string(),
        _ => "Unknown".to_string(),
    };

    let devices = &event.device_properties;
    let extended = &event.extended_properties;

    let mut record = LogRecord::bare(user, ip.to_string(), timestamp);
    record.user_agent = named(extended, "UserAgent").unwrap_or_else(|| NOT_APPLICABLE.to_string());
    record.os = match named(devices, "OS") {
        Some(value) if !value.trim().is_empty() => canonicalize_os(&value),
        _ => NOT_APPLICABLE.to_string(),
    };
    record.browser = named(devices, "BrowserType").unwrap_or_else(|| NOT_APPLICABLE.to_string());
    // Boolean-ish compliance flags normalize to lowercase strings.
    record.compliant = named(devices, "IsCompliant")
        .map(|v| v.to_lowercase())
        .unwrap_or_else(|| NOT_APPLICABLE.to_string());
    record.managed = named(devices, "IsCompliantAndManaged")
        .map(|v| v.to_lowercase())
        .unwrap_or_else(|| NOT_APPLICABLE.to_string());
    record.status = status.to_string();
    record.reason = normalize_reason(Some(raw_reason));
    Some(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    const HEADER: &str = "CreationDate,UserId,AuditData";

    /// Build a one-row audit export, quoting the JSON blob CSV-style.
    fn audit_file(date: &str, user: &str, blob: &str) -> String {
        let quoted = blob.replace('"', "\"\"");
        format!("{HEADER}\n{date},{user},\"{quoted}\"")
    }

    fn parse_one(blob: &str) -> Vec<LogRecord> {
        parse(&audit_file("2024-03-05T08:30:00", "carol@corp.com", blob))
    }

    #[test]
    fn test_login_success_row() {
        let records = parse_one(
            r#"{"Operation":"UserLoggedIn","ClientIP":"203.0.113.9","DeviceProperties":[{"Name":"OS","Value":"ios 17.1"},{"Name":"BrowserType","Value":"Safari"},{"Name":"IsCompliant","Value":"True"},{"Name":"IsCompliantAndManaged","Value":"False"}],"ExtendedProperties":[{"Name":"UserAgent","Value":"Mozilla/5.0"}]}"#,
        );
        assert_eq!(records.len(), 1);
        let r = &records[0];
        assert_eq!(r.user, "carol@corp.com");
        assert_eq!(r.ip, "203.0.113.9");
        assert_eq!(r.status, STATUS_SUCCESS);
        assert_eq!(r.os, "iOS 17.1");
        assert_eq!(r.browser, "Safari");
        assert_eq!(r.compliant, "true");
        assert_eq!(r.managed, "false");
        assert_eq!(r.user_agent, "Mozilla/5.0");
        // Sign-in-only columns stay at the sentinel.
        assert_eq!(r.application, NOT_APPLICABLE);
        assert_eq!(r.mfa_requirement, NOT_APPLICABLE);
    }

    #[test]
    fn test_failure_and_interrupt_reclassification() {
        let failed =
            parse_one(r#"{"Operation":"UserLoginFailed","ClientIP":"203.0.113.9","LogonError":"InvalidPassword"}"#);
        assert_eq!(failed[0].status, STATUS_FAILURE);
        assert_eq!(failed[0].reason, "InvalidPassword");

        let interrupted =
            parse_one(r#"{"Operation":"UserLoginFailed","ClientIP":"203.0.113.9","LogonError":"UserNeedsInterrupt"}"#);
        assert_eq!(interrupted[0].status, STATUS_INTERRUPTED);

        // The keyword match is case-sensitive.
        let lowercase =
            parse_one(r#"{"Operation":"UserLoginFailed","ClientIP":"203.0.113.9","LogonError":"user interrupt flow"}"#);
        assert_eq!(lowercase[0].status, STATUS_FAILURE);
    }

    #[test]
    fn test_non_login_operations_skipped() {
        assert!(parse_one(r#"{"Operation":"FileAccessed","ClientIP":"203.0.113.9"}"#).is_empty());
        assert!(parse_one(r#"{"Operation":"UserLoggedIn","ClientIP":"1.2"}"#).is_empty());
        assert!(parse_one(r#"{"Operation":"UserLoggedIn"}"#).is_empty());
    }

    #[test]
    fn test_malformed_blob_skips_row_only() {
        let good = r#"{"Operation":"UserLoggedIn","ClientIP":"203.0.113.9"}"#.replace('"', "\"\"");
        let input = format!(
            "{HEADER}\n\
             2024-03-05T08:30:00,carol@corp.com,\"{{not json at all\"\n\
             2024-03-05T08:31:00,carol@corp.com,\"{good}\""
        );
        assert_eq!(parse(&input).len(), 1);
    }

    #[test]
    fn test_audit_schema_wins_over_tabular() {
        // A file with an AuditData column is never parsed as tabular, even
        // though user and date columns resolve.
        let blob = r#"{"Operation":"FileAccessed","ClientIP":"203.0.113.9"}"#;
        assert!(parse_one(blob).is_empty());
    }

    #[test]
    fn test_missing_user_defaults_to_unknown() {
        let blob = r#"{"Operation":"UserLoggedIn","ClientIP":"203.0.113.9"}"#.replace('"', "\"\"");
        let input = format!("{HEADER}\n2024-03-05T08:30:00,,\"{blob}\"");
        let records = parse(&input);
        assert_eq!(records[0].user, "Unknown");
    }
}
