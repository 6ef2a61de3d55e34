//! In-process metrics aggregation.
//!
//! Counters, gauges and histograms keyed by metric name plus canonical label
//! set. All series live for the lifetime of the aggregator.
//!
//! Histogram retention is bounded: each series keeps only its most recent
//! `histogram_window` observations. Count, sum and bucket counts cover every
//! observation ever recorded, so eviction never changes exported totals.

use crate::config::{TelemetryConfig, DEFAULT_HISTOGRAM_BUCKETS, DEFAULT_HISTOGRAM_WINDOW};
use crate::models::{
    HistogramBucket, HistogramSample, LabelSet, MetricKey, MetricKind, MetricsSnapshot,
    ScalarSample,
};
use crate::telemetry::exposition;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Mutex;
use thiserror::Error;

/// Errors that can occur when updating metrics.
#[derive(Debug, Error, PartialEq)]
pub enum MetricsError {
    /// The metric name is not a valid exposition name.
    #[error("Invalid metric name: '{0}'")]
    InvalidName(String),

    /// A label name is not a valid exposition name.
    #[error("Invalid label name: '{0}'")]
    InvalidLabelName(String),

    /// Counters only go up.
    #[error("Counter '{name}' cannot be incremented by negative amount {amount}")]
    NegativeIncrement {
        /// Counter name.
        name: String,
        /// Rejected amount.
        amount: f64,
    },

    /// NaN and infinities are rejected.
    #[error("Metric '{0}' received a non-finite value")]
    NonFiniteValue(String),

    /// The name is already registered as another kind.
    #[error("Metric '{name}' is a {existing}, not a {requested}")]
    KindMismatch {
        /// Metric name.
        name: String,
        /// Kind the name was first used with.
        existing: MetricKind,
        /// Kind of the rejected call.
        requested: MetricKind,
    },

    /// Failed to acquire lock on the aggregator.
    #[error("Failed to acquire lock on metrics aggregator")]
    LockError,

    /// The exposition encoder rejected the snapshot.
    #[error("Failed to encode metrics: {0}")]
    Encode(String),
}

#[derive(Debug)]
struct HistogramSeries {
    window: VecDeque<f64>,
    bucket_counts: Vec<u64>,
    sum: f64,
    count: u64,
}

impl HistogramSeries {
    fn new(bucket_len: usize) -> Self {
        Self {
            window: VecDeque::new(),
            bucket_counts: vec![0; bucket_len],
            sum: 0.0,
            count: 0,
        }
    }

    fn observe(&mut self, value: f64, bounds: &[f64], capacity: usize) {
        if self.window.len() == capacity {
            self.window.pop_front();
        }
        self.window.push_back(value);
        for (count, bound) in self.bucket_counts.iter_mut().zip(bounds) {
            if value <= *bound {
                *count += 1;
            }
        }
        self.sum += value;
        self.count += 1;
    }
}

#[derive(Debug, Default)]
struct Registry {
    kinds: HashMap<String, MetricKind>,
    descriptions: BTreeMap<String, String>,
    counters: BTreeMap<MetricKey, f64>,
    gauges: BTreeMap<MetricKey, f64>,
    histograms: BTreeMap<MetricKey, HistogramSeries>,
}

impl Registry {
    fn bind_kind(&mut self, name: &str, requested: MetricKind) -> Result<(), MetricsError> {
        match self.kinds.get(name) {
            Some(existing) if *existing != requested => Err(MetricsError::KindMismatch {
                name: name.to_string(),
                existing: *existing,
                requested,
            }),
            Some(_) => Ok(()),
            None => {
                self.kinds.insert(name.to_string(), requested);
                Ok(())
            }
        }
    }
}

fn is_valid_name(name: &str, allow_colon: bool) -> bool {
    let mut chars = name.chars();
    let valid_start =
        |c: char| c.is_ascii_alphabetic() || c == '_' || (allow_colon && c == ':');
    match chars.next() {
        Some(first) if valid_start(first) => {
            chars.all(|c| valid_start(c) || c.is_ascii_digit())
        }
        _ => false,
    }
}

fn validate_key(name: &str, labels: &LabelSet) -> Result<(), MetricsError> {
    if !is_valid_name(name, true) {
        return Err(MetricsError::InvalidName(name.to_string()));
    }
    if let Some((key, _)) = labels
        .iter()
        .find(|(key, _)| !is_valid_name(key, false) || *key == "le")
    {
        return Err(MetricsError::InvalidLabelName(key.to_string()));
    }
    Ok(())
}

/// Aggregates counters, gauges and histograms.
///
/// Every mutation takes one lock over the whole registry, so concurrent
/// updates to the same series are never lost.
///
/// # Example
///
/// ```
/// use shared::models::LabelSet;
/// use shared::telemetry::MetricsAggregator;
///
/// let metrics = MetricsAggregator::default();
/// for _ in 0..3 {
///     metrics.increment("todos_added", &LabelSet::new()).unwrap();
/// }
///
/// let snapshot = metrics.snapshot().unwrap();
/// assert_eq!(snapshot.counter("todos_added", &LabelSet::new()), Some(3.0));
/// ```
#[derive(Debug)]
pub struct MetricsAggregator {
    registry: Mutex<Registry>,
    histogram_window: usize,
    bucket_bounds: Vec<f64>,
}

impl Default for MetricsAggregator {
    fn default() -> Self {
        Self::new(DEFAULT_HISTOGRAM_WINDOW, DEFAULT_HISTOGRAM_BUCKETS.to_vec())
    }
}

impl MetricsAggregator {
    /// Creates an aggregator.
    ///
    /// # Arguments
    ///
    /// * `histogram_window` - Recent observations kept per histogram series (min 1)
    /// * `bucket_bounds` - Ascending histogram bucket upper bounds
    #[must_use]
    pub fn new(histogram_window: usize, bucket_bounds: Vec<f64>) -> Self {
        Self {
            registry: Mutex::new(Registry::default()),
            histogram_window: histogram_window.max(1),
            bucket_bounds,
        }
    }

    /// Creates an aggregator from telemetry settings.
    #[must_use]
    pub fn from_config(config: &TelemetryConfig) -> Self {
        Self::new(config.histogram_window, config.histogram_buckets.clone())
    }

    /// Adds `amount` to a counter, creating it at zero if absent.
    ///
    /// Returns the new total.
    ///
    /// # Errors
    ///
    /// Returns an error if the amount is negative or non-finite, the name or
    /// a label name is invalid, or the name is registered as another kind.
    pub fn increment_counter(
        &self,
        name: &str,
        amount: f64,
        labels: &LabelSet,
    ) -> Result<f64, MetricsError> {
        if !amount.is_finite() {
            return Err(MetricsError::NonFiniteValue(name.to_string()));
        }
        if amount < 0.0 {
            return Err(MetricsError::NegativeIncrement {
                name: name.to_string(),
                amount,
            });
        }
        validate_key(name, labels)?;

        let mut registry = self.registry.lock().map_err(|_| MetricsError::LockError)?;
        registry.bind_kind(name, MetricKind::Counter)?;
        let total = registry
            .counters
            .entry(MetricKey::new(name, labels.clone()))
            .or_insert(0.0);
        *total += amount;
        let total = *total;
        drop(registry);

        tracing::trace!(metric = name, labels = %labels, total, "Counter incremented");
        Ok(total)
    }

    /// Increments a counter by one.
    ///
    /// # Errors
    ///
    /// See [`MetricsAggregator::increment_counter`].
    pub fn increment(&self, name: &str, labels: &LabelSet) -> Result<f64, MetricsError> {
        self.increment_counter(name, 1.0, labels)
    }

    /// Overwrites a gauge with `value`.
    ///
    /// # Errors
    ///
    /// Returns an error if the value is non-finite, the name or a label name
    /// is invalid, or the name is registered as another kind.
    pub fn set_gauge(&self, name: &str, value: f64, labels: &LabelSet) -> Result<(), MetricsError> {
        if !value.is_finite() {
            return Err(MetricsError::NonFiniteValue(name.to_string()));
        }
        validate_key(name, labels)?;

        let mut registry = self.registry.lock().map_err(|_| MetricsError::LockError)?;
        registry.bind_kind(name, MetricKind::Gauge)?;
        registry
            .gauges
            .insert(MetricKey::new(name, labels.clone()), value);
        drop(registry);

        tracing::trace!(metric = name, labels = %labels, value, "Gauge set");
        Ok(())
    }

    /// Records one histogram observation.
    ///
    /// # Errors
    ///
    /// Returns an error if the value is non-finite, the name or a label name
    /// is invalid, or the name is registered as another kind.
    pub fn record_histogram(
        &self,
        name: &str,
        value: f64,
        labels: &LabelSet,
    ) -> Result<(), MetricsError> {
        if !value.is_finite() {
            return Err(MetricsError::NonFiniteValue(name.to_string()));
        }
        validate_key(name, labels)?;

        let mut registry = self.registry.lock().map_err(|_| MetricsError::LockError)?;
        registry.bind_kind(name, MetricKind::Histogram)?;
        let bucket_len = self.bucket_bounds.len();
        registry
            .histograms
            .entry(MetricKey::new(name, labels.clone()))
            .or_insert_with(|| HistogramSeries::new(bucket_len))
            .observe(value, &self.bucket_bounds, self.histogram_window);
        drop(registry);

        tracing::trace!(metric = name, labels = %labels, value, "Histogram recorded");
        Ok(())
    }

    /// Attaches HELP text to a metric name.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn describe(&self, name: &str, help: &str) -> Result<(), MetricsError> {
        let mut registry = self.registry.lock().map_err(|_| MetricsError::LockError)?;
        registry
            .descriptions
            .insert(name.to_string(), help.to_string());
        Ok(())
    }

    /// Returns an immutable copy of every series.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn snapshot(&self) -> Result<MetricsSnapshot, MetricsError> {
        let registry = self.registry.lock().map_err(|_| MetricsError::LockError)?;

        let scalar = |key: &MetricKey, value: f64| {
            (
                key.to_string(),
                ScalarSample {
                    name: key.name.clone(),
                    labels: key.labels.clone(),
                    value,
                },
            )
        };

        let counters = registry
            .counters
            .iter()
            .map(|(key, value)| scalar(key, *value))
            .collect();
        let gauges = registry
            .gauges
            .iter()
            .map(|(key, value)| scalar(key, *value))
            .collect();
        let histograms = registry
            .histograms
            .iter()
            .map(|(key, series)| {
                let buckets = self
                    .bucket_bounds
                    .iter()
                    .zip(&series.bucket_counts)
                    .map(|(bound, count)| HistogramBucket {
                        upper_bound: *bound,
                        count: *count,
                    })
                    .collect();
                (
                    key.to_string(),
                    HistogramSample {
                        name: key.name.clone(),
                        labels: key.labels.clone(),
                        observations: series.window.iter().copied().collect(),
                        buckets,
                        sum: series.sum,
                        count: series.count,
                    },
                )
            })
            .collect();

        Ok(MetricsSnapshot {
            counters,
            gauges,
            histograms,
            descriptions: registry.descriptions.clone(),
        })
    }

    /// Renders every series in the Prometheus text exposition format.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned or encoding fails.
    pub fn render_prometheus(&self) -> Result<String, MetricsError> {
        exposition::render(&self.snapshot()?).map_err(|e| MetricsError::Encode(e.to_string()))
    }
}
