//! Span data models.
//!
//! Defines the completed-span record handed to span exporters.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Span attributes: an open mapping of string keys to JSON values.
pub type Attributes = Map<String, Value>;

/// Converts a JSON value into span attributes.
///
/// Objects become the attribute map, `null` becomes an empty map and any
/// other value is stored under the `value` key.
#[must_use]
pub fn into_attributes(value: Value) -> Attributes {
    match value {
        Value::Object(map) => map,
        Value::Null => Attributes::new(),
        other => {
            let mut map = Attributes::new();
            map.insert("value".to_string(), other);
            map
        }
    }
}

/// Status code for a span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum SpanStatus {
    /// The span completed without error.
    #[default]
    Ok,
    /// The span encountered an error.
    Error,
}

impl std::fmt::Display for SpanStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ok => write!(f, "OK"),
            Self::Error => write!(f, "ERROR"),
        }
    }
}

/// A completed span, as handed to exporters.
///
/// # Example
///
/// ```
/// use shared::models::{SpanRecord, SpanStatus};
///
/// let record = SpanRecord::new("trace-123", "span-456", "create_todo", "todoscope-api");
///
/// assert!(record.is_root());
/// assert_eq!(record.status, SpanStatus::Ok);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpanRecord {
    /// Identifier shared by every span of one logical request.
    pub trace_id: String,

    /// Unique identifier for this span.
    pub span_id: String,

    /// The parent span ID (None for root spans).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_span_id: Option<String>,

    /// The name of the unit of work.
    pub name: String,

    /// The service that produced the span.
    pub service: String,

    /// Final status.
    #[serde(default)]
    pub status: SpanStatus,

    /// Timestamp when the span started.
    pub start_time: DateTime<Utc>,

    /// Timestamp when the span ended.
    pub end_time: DateTime<Utc>,

    /// Attributes set during the span.
    #[serde(default)]
    pub attributes: Attributes,

    /// Message of the error captured on the span, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exception: Option<String>,
}

impl SpanRecord {
    /// Creates a record with the current time as both start and end.
    #[must_use]
    pub fn new(
        trace_id: impl Into<String>,
        span_id: impl Into<String>,
        name: impl Into<String>,
        service: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            trace_id: trace_id.into(),
            span_id: span_id.into(),
            parent_span_id: None,
            name: name.into(),
            service: service.into(),
            status: SpanStatus::default(),
            start_time: now,
            end_time: now,
            attributes: Attributes::new(),
            exception: None,
        }
    }

    /// Returns the duration of the span.
    #[must_use]
    pub fn duration(&self) -> Duration {
        self.end_time - self.start_time
    }

    /// Returns true if this is a root span (no parent).
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.parent_span_id.is_none()
    }

    /// Returns true if the span ended with an error.
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.status == SpanStatus::Error
    }
}
