//! Configuration module for Todoscope.
//!
//! This module contains the telemetry settings shared by server and client.

pub mod telemetry;

pub use telemetry::{
    ConfigError, TelemetryConfig, DEFAULT_HISTOGRAM_BUCKETS, DEFAULT_HISTOGRAM_WINDOW,
    DEFAULT_SPAN_BUFFER_CAPACITY,
};
