pub mod cluster;
pub mod config;
pub mod geocode;
pub mod models;
pub mod parser;
pub mod pipeline;
pub mod share;

// Re-export commonly used types
pub use cluster::{ScreenPoint, WebMercator};
pub use geocode::{GeoTransport, GeocodingClient, HttpTransport, ProgressSink, ProgressUpdate, RetryPolicy};
pub use models::{Connection, LogRecord, MarkerData, UserMapData, UserMarker};
pub use pipeline::PipelineError;
