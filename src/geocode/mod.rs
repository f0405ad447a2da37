//! Batched IP geocoding against an external lookup service.
//!
//! Unique IPs are chunked into fixed-size batches and fetched with a bounded
//! number of batches in flight. A failed batch is retried with a linearly
//! growing delay and dropped once the retry budget is exhausted; the pipeline
//! consumes whatever subset resolved.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// IPs per geocoding request.
pub const BATCH_SIZE: usize = 100;
/// Batches in flight at once; the service does not tolerate a full fan-out.
pub const MAX_IN_FLIGHT: usize = 4;

const QUERY_FIELDS: &str = "query,lon,lat";

/// Errors from a single batch request.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("geocoding service returned status {0}")]
    Status(reqwest::StatusCode),
}

/// One entry of a batch response, keyed by the echoed query IP.
///
/// The service may return entries in any order, so the echo is the only
/// reliable join key. Entries missing either coordinate are unusable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeoResult {
    pub query: String,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
}

#[derive(Debug, Serialize)]
struct GeoQuery<'a> {
    query: &'a str,
    fields: &'static str,
}

/// Transport seam for the lookup service, mockable in tests.
#[async_trait]
pub trait GeoTransport: Send + Sync {
    async fn send_batch(&self, ips: &[String]) -> Result<Vec<GeoResult>, TransportError>;
}

/// Production transport: one POST per batch with a JSON query array.
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpTransport {
    pub fn new(endpoint: impl Into<String>) -> Self {
        HttpTransport {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .unwrap_or_default(),
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl GeoTransport for HttpTransport {
    async fn send_batch(&self, ips: &[String]) -> Result<Vec<GeoResult>, TransportError> {
        let payload: Vec<GeoQuery> = ips
            .iter()
            .map(|ip| GeoQuery {
                query: ip,
                fields: QUERY_FIELDS,
            })
            .collect();

        let response = self.client.post(&self.endpoint).json(&payload).send().await?;
        if !response.status().is_success() {
            return Err(TransportError::Status(response.status()));
        }
        Ok(response.json().await?)
    }
}

/// Retry policy for failed batches: `max_attempts` total tries with a delay
/// of `attempt * base_delay` between them.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay * attempt
    }

    /// No waiting between attempts; used by tests.
    pub fn immediate(max_attempts: u32) -> Self {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::ZERO,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

/// One progress step of a geocoding run.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressUpdate {
    pub message: String,
    pub percent: f64,
    /// Running count of IPs resolved so far.
    pub resolved: usize,
}

/// Consumer of progress updates, typically the UI layer.
pub trait ProgressSink {
    fn report(&mut self, update: ProgressUpdate);
}

impl<F: FnMut(ProgressUpdate)> ProgressSink for F {
    fn report(&mut self, update: ProgressUpdate) {
        self(update)
    }
}

/// Coordinates batched lookups over a [`GeoTransport`].
pub struct GeocodingClient<T: GeoTransport> {
    transport: T,
    batch_size: usize,
    max_in_flight: usize,
    retry: RetryPolicy,
}

impl<T: GeoTransport> GeocodingClient<T> {
    pub fn new(transport: T) -> Self {
        GeocodingClient {
            transport,
            batch_size: BATCH_SIZE,
            max_in_flight: MAX_IN_FLIGHT,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_policy(
        transport: T,
        batch_size: usize,
        max_in_flight: usize,
        retry: RetryPolicy,
    ) -> Self {
        GeocodingClient {
            transport,
            batch_size: batch_size.max(1),
            max_in_flight: max_in_flight.max(1),
            retry,
        }
    }

    /// Geocode a deduplicated IP list.
    ///
    /// Returns coordinates for the subset that resolved; IPs the service
    /// could not place are simply absent. Partial or total batch failure is
    /// never a hard error here.
    ///
    /// Progress percentages are interpolated over `span` by completed-batch
    /// fraction and held one unit below the end bound until the final update.
    pub async fn geocode(
        &self,
        ips: &[String],
        span: (f64, f64),
        progress: &mut dyn ProgressSink,
    ) -> HashMap<String, (f64, f64)> {
        let (start, end) = span;
        let mut resolved: HashMap<String, (f64, f64)> = HashMap::new();

        if !ips.is_empty() {
            let batches: Vec<&[String]> = ips.chunks(self.batch_size).collect();
            let total = batches.len();

            let mut outcomes = stream::iter(batches)
                .map(|batch| self.fetch_with_retry(batch))
                .buffer_unordered(self.max_in_flight);

            // Merging happens here in the driver, one completion at a time,
            // so each IP is written at most once regardless of batch order.
            let mut completed = 0usize;
            while let Some(outcome) = outcomes.next().await {
                completed += 1;
                if let Some(results) = outcome {
                    for geo in results {
                        if let (Some(lat), Some(lon)) = (geo.lat, geo.lon) {
                            resolved.insert(geo.query, (lat, lon));
                        }
                    }
                }
                let fraction = completed as f64 / total as f64;
                let percent = (start + (end - start) * fraction).min(end - 1.0);
                progress.report(ProgressUpdate {
                    message: format!(
                        "Geocoded batch {}/{} ({} IPs located)",
                        completed,
                        total,
                        resolved.len()
                    ),
                    percent,
                    resolved: resolved.len(),
                });
            }
        }

        progress.report(ProgressUpdate {
            message: format!(
                "Geocoding complete. Found locations for {} IPs.",
                resolved.len()
            ),
            percent: end,
            resolved: resolved.len(),
        });
        resolved
    }

    async fn fetch_with_retry(&self, batch: &[String]) -> Option<Vec<GeoResult>> {
        for attempt in 1..=self.retry.max_attempts {
            match self.transport.send_batch(batch).await {
                Ok(results) => return Some(results),
                Err(e) if attempt < self.retry.max_attempts => {
                    log::debug!(
                        "geocode batch of {} failed on attempt {}: {}",
                        batch.len(),
                        attempt,
                        e
                    );
                    tokio::time::sleep(self.retry.delay_for(attempt)).await;
                }
                Err(e) => {
                    log::warn!(
                        "dropping geocode batch of {} after {} attempts: {}",
                        batch.len(),
                        attempt,
                        e
                    );
                }
            }
        }
        None
    }
}
