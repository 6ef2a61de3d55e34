//! Server configuration module.
//!
//! Handles loading configuration from environment variables with sensible defaults.

use anyhow::{Context, Result};
use shared::config::TelemetryConfig;
use std::net::SocketAddr;
use std::str::FromStr;

/// Service name stamped on every server span.
pub const SERVICE_NAME: &str = "todoscope-api";

/// Server configuration.
///
/// Configuration values can be set via environment variables:
/// - `TODOSCOPE_HOST`: The host address to bind to (default: "0.0.0.0")
/// - `TODOSCOPE_PORT`: The port to listen on (default: 3000)
/// - `TODOSCOPE_SEED_EXAMPLE`: Whether to start with an example todo (default: true)
/// - `TODOSCOPE_LOG_FORMAT`: `json` for JSON diagnostics (default: text)
/// - `TODOSCOPE_LOG_LEVEL`: Minimum level of domain log records (default: INFO)
/// - `TODOSCOPE_HISTOGRAM_WINDOW`: Observations kept per histogram series (default: 1024)
/// - `TODOSCOPE_SPAN_BUFFER`: Ended spans kept for `/debug/spans` (default: 256)
/// - `TODOSCOPE_LOG_SPANS`: Whether ended spans are logged (default: true)
#[derive(Debug, Clone)]
pub struct Config {
    /// The host address to bind to.
    pub host: String,
    /// The port to listen on.
    pub port: u16,
    /// Whether the store starts with an example todo.
    pub seed_example: bool,
    /// Whether diagnostics are formatted as JSON.
    pub json_logs: bool,
    /// Telemetry settings.
    pub telemetry: TelemetryConfig,
}

fn env_parse<T>(name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    std::env::var(name)
        .ok()
        .map(|value| value.parse::<T>())
        .transpose()
        .with_context(|| format!("Invalid value for {name}"))
}

impl Config {
    /// Creates a new configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - A numeric, boolean or level variable is set but cannot be parsed
    /// - The resulting telemetry settings are invalid
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        let host = std::env::var("TODOSCOPE_HOST").unwrap_or(defaults.host);

        let port = env_parse("TODOSCOPE_PORT")?.unwrap_or(defaults.port);
        let seed_example = env_parse("TODOSCOPE_SEED_EXAMPLE")?.unwrap_or(defaults.seed_example);
        let json_logs = std::env::var("TODOSCOPE_LOG_FORMAT")
            .is_ok_and(|format| format.eq_ignore_ascii_case("json"));

        let mut telemetry = defaults.telemetry;
        if let Some(level) = env_parse("TODOSCOPE_LOG_LEVEL")? {
            telemetry.log_level = level;
        }
        if let Some(window) = env_parse("TODOSCOPE_HISTOGRAM_WINDOW")? {
            telemetry.histogram_window = window;
        }
        if let Some(capacity) = env_parse("TODOSCOPE_SPAN_BUFFER")? {
            telemetry.span_buffer_capacity = capacity;
        }
        if let Some(log_spans) = env_parse("TODOSCOPE_LOG_SPANS")? {
            telemetry.log_spans = log_spans;
        }
        telemetry.validate_config()?;

        Ok(Self {
            host,
            port,
            seed_example,
            json_logs,
            telemetry,
        })
    }

    /// Returns the socket address for binding.
    ///
    /// # Errors
    ///
    /// Returns an error if the host and port do not form a valid socket address.
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("Invalid socket address {}:{}", self.host, self.port))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            seed_example: true,
            json_logs: false,
            telemetry: TelemetryConfig::new(SERVICE_NAME),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default_values() {
        let config = Config::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3000);
        assert!(config.seed_example);
        assert_eq!(config.telemetry.service_name, SERVICE_NAME);
    }

    #[test]
    fn test_config_socket_addr() {
        let config = Config {
            host: "127.0.0.1".to_string(),
            port: 3000,
            ..Config::default()
        };
        let addr = config.socket_addr().unwrap();
        assert_eq!(addr.to_string(), "127.0.0.1:3000");
    }

    #[test]
    fn test_invalid_socket_addr() {
        let config = Config {
            host: "not a host".to_string(),
            ..Config::default()
        };
        assert!(config.socket_addr().is_err());
    }
}
