//! Metric data model.
//!
//! Defines metric kinds, canonical label sets and the immutable snapshot
//! types produced by the metrics aggregator.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Kind of metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MetricKind {
    /// A counter that only increases (e.g., request count).
    Counter,
    /// A gauge holding the last value set (e.g., active todos).
    Gauge,
    /// A histogram for measuring distributions (e.g., request latency).
    Histogram,
}

impl std::fmt::Display for MetricKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Counter => write!(f, "counter"),
            Self::Gauge => write!(f, "gauge"),
            Self::Histogram => write!(f, "histogram"),
        }
    }
}

/// A set of metric labels.
///
/// Labels are kept sorted by key, so two label sets built in a different
/// insertion order are equal, hash the same and render the same.
///
/// # Example
///
/// ```
/// use shared::models::LabelSet;
///
/// let a = LabelSet::new().with("a", "1").with("b", "2");
/// let b = LabelSet::new().with("b", "2").with("a", "1");
///
/// assert_eq!(a, b);
/// assert_eq!(a.to_string(), r#"{a="1",b="2"}"#);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LabelSet(BTreeMap<String, String>);

impl LabelSet {
    /// Creates an empty label set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a label, replacing any previous value for the same key.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Returns the value of a label.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Returns true if the set has no labels.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates labels in canonical (key-sorted) order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for LabelSet {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// Escapes a label value for the text exposition format.
#[must_use]
pub fn escape_label_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            '\n' => escaped.push_str("\\n"),
            other => escaped.push(other),
        }
    }
    escaped
}

impl std::fmt::Display for LabelSet {
    /// Renders `{k="v",...}` in key order, or nothing for an empty set.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.0.is_empty() {
            return Ok(());
        }
        write!(f, "{{")?;
        for (i, (key, value)) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{key}=\"{}\"", escape_label_value(value))?;
        }
        write!(f, "}}")
    }
}

/// Identity of one metric series: name plus canonical labels.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MetricKey {
    /// Metric name.
    pub name: String,
    /// Canonical labels.
    pub labels: LabelSet,
}

impl MetricKey {
    /// Creates a key.
    #[must_use]
    pub fn new(name: impl Into<String>, labels: LabelSet) -> Self {
        Self {
            name: name.into(),
            labels,
        }
    }
}

impl std::fmt::Display for MetricKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", self.name, self.labels)
    }
}

/// Point-in-time value of a counter or gauge series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalarSample {
    /// Metric name.
    pub name: String,
    /// Series labels.
    pub labels: LabelSet,
    /// Current value.
    pub value: f64,
}

/// A cumulative histogram bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistogramBucket {
    /// The inclusive upper bound of this bucket.
    pub upper_bound: f64,
    /// Number of observations less than or equal to `upper_bound`.
    pub count: u64,
}

/// Point-in-time state of a histogram series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistogramSample {
    /// Metric name.
    pub name: String,
    /// Series labels.
    pub labels: LabelSet,
    /// Most recent observations, oldest first.
    pub observations: Vec<f64>,
    /// Cumulative buckets over every observation ever recorded.
    pub buckets: Vec<HistogramBucket>,
    /// Sum of every observation ever recorded.
    pub sum: f64,
    /// Number of observations ever recorded.
    pub count: u64,
}

/// Immutable copy of everything the aggregator holds, keyed by canonical key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// Counter series.
    pub counters: BTreeMap<String, ScalarSample>,
    /// Gauge series.
    pub gauges: BTreeMap<String, ScalarSample>,
    /// Histogram series.
    pub histograms: BTreeMap<String, HistogramSample>,
    /// HELP text by metric name.
    #[serde(default)]
    pub descriptions: BTreeMap<String, String>,
}

impl MetricsSnapshot {
    /// Returns the value of a counter series.
    #[must_use]
    pub fn counter(&self, name: &str, labels: &LabelSet) -> Option<f64> {
        self.counters
            .get(&MetricKey::new(name, labels.clone()).to_string())
            .map(|s| s.value)
    }

    /// Returns the value of a gauge series.
    #[must_use]
    pub fn gauge(&self, name: &str, labels: &LabelSet) -> Option<f64> {
        self.gauges
            .get(&MetricKey::new(name, labels.clone()).to_string())
            .map(|s| s.value)
    }

    /// Returns a histogram series.
    #[must_use]
    pub fn histogram(&self, name: &str, labels: &LabelSet) -> Option<&HistogramSample> {
        self.histograms
            .get(&MetricKey::new(name, labels.clone()).to_string())
    }
}
