//! End-to-end ingestion pipeline: parse, geocode, assemble.
//!
//! One run produces one fresh generation of per-identity data; callers
//! replace any prior generation wholesale instead of merging.

use std::collections::{HashMap, HashSet};

use thiserror::Error;

use crate::geocode::{GeoTransport, GeocodingClient, ProgressSink, ProgressUpdate};
use crate::models::{Connection, UserMapData};
use crate::parser;

// Geocoding progress occupies this slice of the overall run.
const GEOCODE_SPAN: (f64, f64) = (10.0, 90.0);

/// Terminal pipeline failures. Everything below this level (malformed rows,
/// unresolved IPs, exhausted batches) is absorbed silently upstream.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("no valid log entries found in the file")]
    NoValidRecords,

    #[error("could not geocode any IP addresses from the file")]
    NoGeocodedConnections,
}

/// Hue in degrees for the i-th of `total` identities, dividing the hue
/// circle evenly.
pub fn identity_hue(index: usize, total: usize) -> f64 {
    index as f64 * 360.0 / total as f64
}

fn identity_color(index: usize, total: usize) -> String {
    format!("hsl({}, 90%, 70%)", identity_hue(index, total))
}

/// Run the full pipeline over a raw log export.
pub async fn run<T: GeoTransport>(
    raw_text: &str,
    client: &GeocodingClient<T>,
    progress: &mut dyn ProgressSink,
) -> Result<Vec<UserMapData>, PipelineError> {
    progress.report(ProgressUpdate {
        message: "Parsing log export...".to_string(),
        percent: 0.0,
        resolved: 0,
    });
    let records = parser::parse(raw_text);
    if records.is_empty() {
        return Err(PipelineError::NoValidRecords);
    }
    log::info!("parsed {} log records", records.len());

    // Unique IPs in first-occurrence order; the coordinator expects the
    // caller to have deduplicated already.
    let mut seen = HashSet::new();
    let mut unique_ips = Vec::new();
    for record in &records {
        if seen.insert(record.ip.clone()) {
            unique_ips.push(record.ip.clone());
        }
    }

    let coords = client.geocode(&unique_ips, GEOCODE_SPAN, progress).await;

    let total_records = records.len();
    let mut connections = Vec::new();
    for record in records {
        if let Some(&(lat, lon)) = coords.get(&record.ip) {
            connections.push(Connection { record, lat, lon });
        }
    }
    if connections.is_empty() {
        return Err(PipelineError::NoGeocodedConnections);
    }
    if connections.len() < total_records {
        log::debug!(
            "dropped {} records whose IP never resolved",
            total_records - connections.len()
        );
    }

    let users = assemble(connections);
    progress.report(ProgressUpdate {
        message: "Finalizing data...".to_string(),
        percent: 100.0,
        resolved: coords.len(),
    });
    Ok(users)
}

/// Group geocoded connections per identity in stable display order.
///
/// Identities sort lexicographically, colors divide the hue circle evenly
/// over that ordering, and each identity's connections sort ascending by
/// timestamp.
pub fn assemble(connections: Vec<Connection>) -> Vec<UserMapData> {
    let mut by_user: HashMap<String, Vec<Connection>> = HashMap::new();
    for conn in connections {
        by_user
            .entry(conn.record.user.clone())
            .or_default()
            .push(conn);
    }

    let mut users: Vec<String> = by_user.keys().cloned().collect();
    users.sort();
    let total = users.len();

    users
        .into_iter()
        .enumerate()
        .map(|(index, user)| {
            let mut conns = by_user.remove(&user).unwrap_or_default();
            conns.sort_by_key(|c| c.record.timestamp);
            UserMapData {
                user,
                color: identity_color(index, total),
                all_connections: conns,
            }
        })
        .collect()
}
