//! Screen-space proximity clustering of geocoded connection points.
//!
//! Clustering is a rendering concern: whether two points overlap depends on
//! the current zoom, so distances are measured in projected screen units,
//! never geographic ones. The same pair of points merges when zoomed out and
//! separates when zoomed in.

use std::collections::{BTreeMap, HashMap};

use crate::models::{MarkerData, UserMapData, UserMarker};

/// Screen-space distance below which two points fold into one marker.
pub const CLUSTER_THRESHOLD: f64 = 50.0;

/// A projected point in screen-space units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScreenPoint {
    pub x: f64,
    pub y: f64,
}

impl ScreenPoint {
    pub fn distance_to(&self, other: &ScreenPoint) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

/// Web Mercator projection at a fixed zoom, for headless clustering runs.
#[derive(Debug, Clone, Copy)]
pub struct WebMercator {
    pub zoom: u8,
}

impl WebMercator {
    pub fn project(&self, lat: f64, lon: f64) -> ScreenPoint {
        let scale = 256.0 * f64::powi(2.0, self.zoom as i32);
        let lat_rad = lat.to_radians();
        ScreenPoint {
            x: (lon + 180.0) / 360.0 * scale,
            y: (1.0 - (lat_rad.tan() + 1.0 / lat_rad.cos()).ln() / std::f64::consts::PI) / 2.0
                * scale,
        }
    }
}

/// Merge connection points that would visually overlap under `project`.
///
/// Candidates are per-IP groups visited in first-occurrence order, so the
/// output order follows the input order; that makes results deterministic
/// for a fixed input, which tests rely on. A cluster keeps the coordinate
/// of its first candidate; merging never moves it.
pub fn cluster<P>(users: &[UserMapData], project: P) -> Vec<MarkerData>
where
    P: Fn(f64, f64) -> ScreenPoint,
{
    // First pass: fold every connection into one candidate per distinct IP,
    // carrying per-identity provenance.
    let mut order: Vec<String> = Vec::new();
    let mut candidates: HashMap<String, MarkerData> = HashMap::new();
    for user in users {
        for conn in &user.all_connections {
            let ip = &conn.record.ip;
            let entry = candidates.entry(ip.clone()).or_insert_with(|| {
                order.push(ip.clone());
                MarkerData {
                    ips: vec![ip.clone()],
                    lat: conn.lat,
                    lon: conn.lon,
                    users: BTreeMap::new(),
                }
            });
            entry
                .users
                .entry(user.user.clone())
                .or_insert_with(|| UserMarker {
                    color: user.color.clone(),
                    connections: Vec::new(),
                })
                .connections
                .push(conn.clone());
        }
    }

    let mut markers: Vec<MarkerData> = Vec::new();
    // Scratch grid for this pass only: cell -> index into `markers`.
    let mut grid: HashMap<(i64, i64), usize> = HashMap::new();

    for ip in order {
        let Some(candidate) = candidates.remove(&ip) else {
            continue;
        };
        let point = project(candidate.lat, candidate.lon);
        let gx = (point.x / CLUSTER_THRESHOLD).floor() as i64;
        let gy = (point.y / CLUSTER_THRESHOLD).floor() as i64;

        // Search the 3x3 cell neighborhood for an already-placed cluster
        // whose center is within the threshold.
        let mut target: Option<usize> = None;
        'search: for x in gx - 1..=gx + 1 {
            for y in gy - 1..=gy + 1 {
                if let Some(&index) = grid.get(&(x, y)) {
                    let center = project(markers[index].lat, markers[index].lon);
                    if point.distance_to(&center) < CLUSTER_THRESHOLD {
                        target = Some(index);
                        break 'search;
                    }
                }
            }
        }

        match target {
            Some(index) => {
                let marker = &mut markers[index];
                marker.ips.extend(candidate.ips);
                for (user, data) in candidate.users {
                    match marker.users.get_mut(&user) {
                        Some(existing) => existing.connections.extend(data.connections),
                        None => {
                            marker.users.insert(user, data);
                        }
                    }
                }
            }
            None => {
                markers.push(candidate);
                grid.insert((gx, gy), markers.len() - 1);
            }
        }
    }

    markers
}
