use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::geocode::RetryPolicy;

/// Configuration for the connmap CLI
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Geocoding service configuration
    pub geocode: GeocodeConfig,
    /// Map rendering configuration
    pub map: MapConfig,
}

/// Geocoding service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeocodeConfig {
    /// Batch lookup endpoint URL
    pub endpoint: String,
    /// IPs per batch request
    pub batch_size: usize,
    /// Maximum batches in flight at once
    pub max_in_flight: usize,
    /// Retry configuration for failed batches
    pub retry: RetryConfig,
}

/// Retry configuration for failed batches
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts per batch, including the first
    pub max_attempts: u32,
    /// Base delay in milliseconds; attempt n waits n times this
    pub base_delay_ms: u64,
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_millis(self.base_delay_ms),
        }
    }
}

/// Map rendering configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapConfig {
    /// Web Mercator zoom level used for headless clustering
    pub zoom: u8,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            geocode: GeocodeConfig {
                endpoint: "https://ip-geolocation-api.eudaeon.workers.dev/".to_string(),
                batch_size: 100,
                max_in_flight: 4,
                retry: RetryConfig {
                    max_attempts: 3,
                    base_delay_ms: 1000,
                },
            },
            map: MapConfig { zoom: 3 },
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save configuration to a file
    pub fn to_file(&self, path: &PathBuf) -> Result<(), Box<dyn std::error::Error>> {
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }
}
