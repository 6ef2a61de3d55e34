//! Telemetry configuration.
//!
//! Settings shared by the logger, the metrics aggregator and the tracer.

use crate::models::LogLevel;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use validator::Validate;

/// Default histogram bucket upper bounds, in seconds.
pub const DEFAULT_HISTOGRAM_BUCKETS: [f64; 10] =
    [0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0];

/// Default number of recent observations kept per histogram series.
pub const DEFAULT_HISTOGRAM_WINDOW: usize = 1024;

/// Default number of ended spans kept for inspection.
pub const DEFAULT_SPAN_BUFFER_CAPACITY: usize = 256;

/// Errors raised by invalid telemetry settings.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Histogram buckets are missing.
    #[error("At least one histogram bucket is required")]
    EmptyBuckets,

    /// Histogram buckets are not strictly ascending finite numbers.
    #[error("Histogram buckets must be finite and sorted in ascending order")]
    InvalidBuckets,

    /// Validation failed with details.
    #[error("Validation failed: {0}")]
    ValidationError(#[from] validator::ValidationErrors),
}

/// Telemetry settings.
///
/// # Examples
///
/// ```
/// use shared::config::TelemetryConfig;
///
/// let config = TelemetryConfig::new("todoscope-api");
/// assert!(config.validate_config().is_ok());
/// assert_eq!(config.histogram_window, 1024);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct TelemetryConfig {
    /// Service name stamped on every span.
    #[validate(length(min = 1, message = "Service name cannot be empty"))]
    pub service_name: String,

    /// Minimum level emitted by loggers.
    #[serde(default)]
    pub log_level: LogLevel,

    /// Recent observations kept per histogram series.
    #[validate(range(min = 1, message = "Histogram window must be greater than zero"))]
    pub histogram_window: usize,

    /// Histogram bucket upper bounds.
    pub histogram_buckets: Vec<f64>,

    /// Ended spans kept by the in-memory exporter.
    #[validate(range(min = 1, message = "Span buffer capacity must be greater than zero"))]
    pub span_buffer_capacity: usize,

    /// Whether ended spans are also written to the diagnostic log.
    pub log_spans: bool,
}

impl TelemetryConfig {
    /// Creates a configuration with defaults for the given service.
    #[must_use]
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            log_level: LogLevel::default(),
            histogram_window: DEFAULT_HISTOGRAM_WINDOW,
            histogram_buckets: DEFAULT_HISTOGRAM_BUCKETS.to_vec(),
            span_buffer_capacity: DEFAULT_SPAN_BUFFER_CAPACITY,
            log_spans: true,
        }
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The service name is empty
    /// - The histogram window or span buffer is zero
    /// - Histogram buckets are empty, non-finite or not strictly ascending
    pub fn validate_config(&self) -> Result<(), ConfigError> {
        if self.histogram_buckets.is_empty() {
            return Err(ConfigError::EmptyBuckets);
        }
        if self.histogram_buckets.iter().any(|b| !b.is_finite())
            || self.histogram_buckets.windows(2).any(|w| w[1] <= w[0])
        {
            return Err(ConfigError::InvalidBuckets);
        }
        self.validate()?;
        Ok(())
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self::new("todoscope")
    }
}
