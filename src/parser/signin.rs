//! Tabular sign-in schema: all fields are flat columns.

use crate::models::{
    LogRecord, NOT_APPLICABLE, STATUS_FAILURE, STATUS_INTERRUPTED, STATUS_SUCCESS,
};

use super::{
    canonicalize_os, field, field_or_na, is_email_shaped, is_ip_shaped, normalize_reason,
    parse_timestamp, HeaderIndex,
};

// Localized status synonyms mapped to the canonical vocabulary.
const SUCCESS_SYNONYMS: &[&str] = &["Opération réussie", "Success"];
const INTERRUPTED_SYNONYMS: &[&str] = &["Interrompu", "Interrupted"];
const FAILURE_SYNONYMS: &[&str] = &["Échec", "Failure"];

/// Parse one tabular row. Returns `None` when the row (or the whole file, if
/// a required column never resolved) is unusable.
pub(crate) fn parse_row(fields: &[String], idx: &HeaderIndex) -> Option<LogRecord> {
    // user, ip and date columns must all resolve or the file is unrecognized
    let user = field(fields, Some(idx.user?))?.trim();
    let ip = field(fields, Some(idx.ip?))?.trim();
    let raw_time = field(fields, Some(idx.date?))?.trim();

    if !is_email_shaped(user) || !is_ip_shaped(ip) {
        return None;
    }
    let timestamp = parse_timestamp(raw_time)?;

    let status = match field(fields, idx.status).map(str::trim) {
        Some(s) if SUCCESS_SYNONYMS.contains(&s) => STATUS_SUCCESS.to_string(),
        Some(s) if INTERRUPTED_SYNONYMS.contains(&s) => STATUS_INTERRUPTED.to_string(),
        Some(s) if FAILURE_SYNONYMS.contains(&s) => STATUS_FAILURE.to_string(),
        Some(s) if !s.is_empty() => s.to_string(),
        _ => NOT_APPLICABLE.to_string(),
    };

    let os = match field(fields, idx.os).map(canonicalize_os) {
        Some(value) if !value.is_empty() => value,
        _ => NOT_APPLICABLE.to_string(),
    };

    Some(LogRecord {
        user: user.to_string(),
        ip: ip.to_string(),
        timestamp,
        application: field_or_na(fields, idx.application),
        mfa_requirement: field_or_na(fields, idx.mfa_requirement),
        mfa_method: field_or_na(fields, idx.mfa_method),
        user_agent: field_or_na(fields, idx.user_agent),
        os,
        browser: field_or_na(fields, idx.browser),
        compliant: field_or_na(fields, idx.compliant),
        managed: field_or_na(fields, idx.managed),
        status,
        reason: normalize_reason(field(fields, idx.reason)),
    })
}
