//! Format-detecting parser for sign-in log exports.
//!
//! One entry point serves two unrelated export shapes: audit-trail rows
//! carrying a JSON event blob and flat tabular sign-in rows. The delimiter is
//! auto-detected and header names are matched against per-locale aliases, so
//! exports from differently localized spreadsheet tools parse without
//! configuration. A malformed row is skipped, never fatal.

pub mod audit;
pub mod signin;

use chrono::{DateTime, NaiveDateTime, Utc};

use crate::models::{LogRecord, NOT_APPLICABLE};

/// Rows shorter than this are treated as noise and skipped outright.
const MIN_ROW_LEN: usize = 10;

// Known header names per logical field, across locales and export tools.
const USER_ALIASES: &[&str] = &["Nom d'utilisateur", "Username", "UserId"];
const IP_ALIASES: &[&str] = &["Adresse IP", "IP address", "ClientIP"];
const DATE_ALIASES: &[&str] = &["Date (UTC)", "CreationDate"];
const APP_ALIASES: &[&str] = &["Application"];
const COMPLIANT_ALIASES: &[&str] = &["Conforme", "Compliant", "IsCompliant"];
const MANAGED_ALIASES: &[&str] = &["Géré", "Managed", "IsCompliantAndManaged"];
const OS_ALIASES: &[&str] = &["Système d'exploitation", "Operating System", "OS"];
const BROWSER_ALIASES: &[&str] = &["Navigateur", "Browser", "BrowserType"];
const USER_AGENT_ALIASES: &[&str] = &["Agent utilisateur", "User agent", "UserAgent"];
const MFA_REQ_ALIASES: &[&str] = &[
    "Exigence d\u{2019}authentification",
    "Authentication requirement",
];
const MFA_METHOD_ALIASES: &[&str] = &[
    "Méthode d\u{2019}authentification multifacteur",
    "Multifactor authentication auth method",
];
const STATUS_ALIASES: &[&str] = &["Statut", "Status"];
const REASON_ALIASES: &[&str] = &["Raison de l'échec", "Failure reason", "ResultReason"];
const AUDIT_DATA_ALIASES: &[&str] = &["AuditData"];

/// Resolved column positions for the logical fields of a header line.
#[derive(Debug, Default)]
pub(crate) struct HeaderIndex {
    pub user: Option<usize>,
    pub ip: Option<usize>,
    pub date: Option<usize>,
    pub application: Option<usize>,
    pub compliant: Option<usize>,
    pub managed: Option<usize>,
    pub os: Option<usize>,
    pub browser: Option<usize>,
    pub user_agent: Option<usize>,
    pub mfa_requirement: Option<usize>,
    pub mfa_method: Option<usize>,
    pub status: Option<usize>,
    pub reason: Option<usize>,
    pub audit_data: Option<usize>,
}

impl HeaderIndex {
    fn resolve(headers: &[String]) -> Self {
        HeaderIndex {
            user: find_any(headers, USER_ALIASES),
            ip: find_any(headers, IP_ALIASES),
            date: find_any(headers, DATE_ALIASES),
            application: find_any(headers, APP_ALIASES),
            compliant: find_any(headers, COMPLIANT_ALIASES),
            managed: find_any(headers, MANAGED_ALIASES),
            os: find_any(headers, OS_ALIASES),
            browser: find_any(headers, BROWSER_ALIASES),
            user_agent: find_any(headers, USER_AGENT_ALIASES),
            mfa_requirement: find_any(headers, MFA_REQ_ALIASES),
            mfa_method: find_any(headers, MFA_METHOD_ALIASES),
            status: find_any(headers, STATUS_ALIASES),
            reason: find_any(headers, REASON_ALIASES),
            audit_data: find_any(headers, AUDIT_DATA_ALIASES),
        }
    }
}

fn find_any(headers: &[String], aliases: &[&str]) -> Option<usize> {
    headers.iter().position(|h| aliases.contains(&h.as_str()))
}

/// Parse a raw log export into normalized records.
///
/// Never fails: malformed rows are skipped and an input with fewer than two
/// lines (header plus one data row) yields an empty vector.
pub fn parse(raw: &str) -> Vec<LogRecord> {
    let content = raw.strip_prefix('\u{feff}').unwrap_or(raw);
    let lines: Vec<&str> = content
        .split('\n')
        .map(|l| l.strip_suffix('\r').unwrap_or(l))
        .collect();
    if lines.len() < 2 {
        return Vec::new();
    }

    let delimiter = detect_delimiter(lines[0]);
    let headers: Vec<String> = split_line(lines[0], delimiter)
        .into_iter()
        .map(|h| h.trim().to_string())
        .collect();
    let idx = HeaderIndex::resolve(&headers);

    // The audit-trail shape is identified by its JSON blob column together
    // with the creation-date and user-id columns.
    let is_audit = idx.audit_data.is_some() && idx.date.is_some() && idx.user.is_some();

    let mut records = Vec::new();
    for line in &lines[1..] {
        if line.len() < MIN_ROW_LEN {
            continue;
        }
        let fields = split_line(line, delimiter);
        let parsed = if is_audit {
            audit::parse_row(&fields, &idx)
        } else {
            signin::parse_row(&fields, &idx)
        };
        if let Some(record) = parsed {
            records.push(record);
        }
    }
    records
}

/// Pick the field delimiter from the header line.
///
/// Candidate characters are counted outside quoted spans. Comma wins ties;
/// any other candidate needs a strictly higher count to be chosen.
fn detect_delimiter(header: &str) -> char {
    let mut comma = 0usize;
    let mut semicolon = 0usize;
    let mut tab = 0usize;
    let mut pipe = 0usize;
    let mut in_quotes = false;
    for ch in header.chars() {
        match ch {
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => comma += 1,
            ';' if !in_quotes => semicolon += 1,
            '\t' if !in_quotes => tab += 1,
            '|' if !in_quotes => pipe += 1,
            _ => {}
        }
    }
    let mut best = (',', comma);
    for (ch, count) in [(';', semicolon), ('\t', tab), ('|', pipe)] {
        if count > best.1 {
            best = (ch, count);
        }
    }
    best.0
}

/// Split one line on `delimiter`, honoring double-quote escaping: a doubled
/// quote inside a quoted span is a literal quote, and delimiters inside a
/// quoted span do not split.
fn split_line(line: &str, delimiter: char) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch == '"' {
            if in_quotes && chars.peek() == Some(&'"') {
                current.push('"');
                chars.next();
            } else {
                in_quotes = !in_quotes;
            }
        } else if ch == delimiter && !in_quotes {
            fields.push(std::mem::take(&mut current));
        } else {
            current.push(ch);
        }
    }
    fields.push(current);
    fields
}

pub(crate) fn field<'a>(fields: &'a [String], idx: Option<usize>) -> Option<&'a str> {
    idx.and_then(|i| fields.get(i)).map(|s| s.as_str())
}

/// Trimmed column value, or the sentinel when the column is absent or empty.
pub(crate) fn field_or_na(fields: &[String], idx: Option<usize>) -> String {
    match field(fields, idx).map(str::trim) {
        Some(value) if !value.is_empty() => value.to_string(),
        _ => NOT_APPLICABLE.to_string(),
    }
}

pub(crate) fn is_email_shaped(value: &str) -> bool {
    value.contains('@') && value.contains('.')
}

pub(crate) fn is_ip_shaped(value: &str) -> bool {
    value.len() >= 7 && (value.contains('.') || value.contains(':'))
}

/// Force the canonical `iOS` casing when the value starts with it, keeping
/// the remainder untouched.
pub(crate) fn canonicalize_os(raw: &str) -> String {
    let trimmed = raw.trim();
    match trimmed.get(..3) {
        Some(prefix) if prefix.eq_ignore_ascii_case("ios") => format!("iOS{}", &trimmed[3..]),
        _ => trimmed.to_string(),
    }
}

/// Normalize a failure-reason string.
///
/// Trims, drops a trailing period only when it is the sole period in the
/// value (multi-sentence reasons keep theirs), and maps `Other` or an empty
/// result to the sentinel.
pub(crate) fn normalize_reason(raw: Option<&str>) -> String {
    let mut trimmed = match raw {
        Some(value) => value.trim(),
        None => return NOT_APPLICABLE.to_string(),
    };
    if let Some(base) = trimmed.strip_suffix('.') {
        if !base.contains('.') {
            trimmed = base.trim_end();
        }
    }
    if trimmed.is_empty() || trimmed == "Other" {
        NOT_APPLICABLE.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Parse a source timestamp. Accepts RFC 3339 plus the naive shapes common
/// in spreadsheet exports, which are taken as UTC.
pub(crate) fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M:%S",
    ] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(DateTime::from_naive_utc_and_offset(naive, Utc));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::STATUS_SUCCESS;

    #[test]
    fn test_empty_and_header_only_input() {
        assert!(parse("").is_empty());
        assert!(parse("Username,IP address,Date (UTC)").is_empty());
    }

    #[test]
    fn test_bom_is_stripped() {
        let input = "\u{feff}Username,IP address,Date (UTC)\n\
                     alice@x.com,8.8.8.8,2024-01-01T00:00:00Z";
        assert_eq!(parse(input).len(), 1);
    }

    #[test]
    fn test_french_header_single_row() {
        let input = "Nom d'utilisateur,Adresse IP,Date (UTC),Statut\n\
                     alice@x.com,8.8.8.8,2024-01-01T00:00:00Z,Success";
        let records = parse(input);
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.user, "alice@x.com");
        assert_eq!(record.ip, "8.8.8.8");
        assert_eq!(record.status, STATUS_SUCCESS);
    }

    #[test]
    fn test_delimiter_stability() {
        let comma = "Username,IP address,Date (UTC),Status\n\
                     alice@x.com,8.8.8.8,2024-01-01T00:00:00Z,Success\n\
                     bob@y.org,1.2.3.4,2024-01-02T12:30:00Z,Failure";
        let semicolon = comma.replace(',', ";");
        assert_eq!(parse(comma), parse(&semicolon));
    }

    #[test]
    fn test_delimiter_detection_prefers_higher_count() {
        assert_eq!(detect_delimiter("a,b,c"), ',');
        assert_eq!(detect_delimiter("a;b;c"), ';');
        // Quoted spans do not count.
        assert_eq!(detect_delimiter("\"a;b;c;d\",x,y"), ',');
        // Tie resolves to comma.
        assert_eq!(detect_delimiter("a,b;c"), ',');
        assert_eq!(detect_delimiter("a\tb\tc"), '\t');
        assert_eq!(detect_delimiter("a|b|c"), '|');
    }

    #[test]
    fn test_split_line_quoting() {
        assert_eq!(
            split_line("a,\"b,c\",d", ','),
            vec!["a".to_string(), "b,c".to_string(), "d".to_string()]
        );
        // Doubled quote is a literal quote.
        assert_eq!(
            split_line("\"say \"\"hi\"\"\",x", ','),
            vec!["say \"hi\"".to_string(), "x".to_string()]
        );
        assert_eq!(split_line("", ','), vec!["".to_string()]);
    }

    #[test]
    fn test_short_rows_skipped_as_noise() {
        let input = "Username,IP address,Date (UTC)\n\
                     ,,\n\
                     alice@x.com,8.8.8.8,2024-01-01T00:00:00Z";
        assert_eq!(parse(input).len(), 1);
    }

    #[test]
    fn test_malformed_row_does_not_abort_file() {
        let input = "Username,IP address,Date (UTC)\n\
                     not-an-email,8.8.8.8,2024-01-01T00:00:00Z\n\
                     alice@x.com,8.8.8.8,not-a-date-at-all\n\
                     alice@x.com,8.8.8.8,2024-01-01T00:00:00Z";
        assert_eq!(parse(input).len(), 1);
    }

    #[test]
    fn test_canonicalize_os() {
        assert_eq!(canonicalize_os("ios 17.2"), "iOS 17.2");
        assert_eq!(canonicalize_os("IOS"), "iOS");
        assert_eq!(canonicalize_os(" Windows 10 "), "Windows 10");
        assert_eq!(canonicalize_os("io"), "io");
    }

    #[test]
    fn test_normalize_reason() {
        assert_eq!(normalize_reason(None), "N/A");
        assert_eq!(normalize_reason(Some("  ")), "N/A");
        assert_eq!(normalize_reason(Some("Other")), "N/A");
        assert_eq!(normalize_reason(Some("Bad password.")), "Bad password");
        // A multi-sentence reason keeps its trailing period.
        assert_eq!(
            normalize_reason(Some("Bad password. Try again.")),
            "Bad password. Try again."
        );
    }

    #[test]
    fn test_parse_timestamp_formats() {
        for raw in [
            "2024-01-01T00:00:00Z",
            "2024-01-01T00:00:00+00:00",
            "2024-01-01T00:00:00",
            "2024-01-01 00:00:00",
            "2024-01-01T00:00:00.123",
        ] {
            assert!(parse_timestamp(raw).is_some(), "failed to parse {raw}");
        }
        assert!(parse_timestamp("yesterday").is_none());
    }
}
