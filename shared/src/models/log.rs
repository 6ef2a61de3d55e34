//! Log record data model.
//!
//! Defines the `LogRecord` structure emitted by the structured logger.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};
use thiserror::Error;

/// Record fields that caller-supplied metadata may never override.
pub const RESERVED_KEYS: [&str; 6] = [
    "timestamp",
    "level",
    "context",
    "message",
    "trace_id",
    "span_id",
];

/// Prefix applied to metadata keys that collide with a reserved field.
pub const METADATA_NAMESPACE: &str = "meta.";

/// Log severity level.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    /// Debug information.
    Debug,
    /// Informational messages.
    #[default]
    Info,
    /// Warning conditions.
    Warn,
    /// Error conditions.
    Error,
}

impl LogLevel {
    /// Returns true if records at this level belong on the error stream.
    #[must_use]
    pub fn is_error_stream(self) -> bool {
        matches!(self, Self::Warn | Self::Error)
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Debug => write!(f, "DEBUG"),
            Self::Info => write!(f, "INFO"),
            Self::Warn => write!(f, "WARN"),
            Self::Error => write!(f, "ERROR"),
        }
    }
}

/// Error returned when a log level name cannot be parsed.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("Unknown log level: '{0}'")]
pub struct UnknownLogLevel(pub String);

impl std::str::FromStr for LogLevel {
    type Err = UnknownLogLevel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "debug" | "trace" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" | "warning" => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            _ => Err(UnknownLogLevel(s.to_string())),
        }
    }
}

/// A single structured log event.
///
/// Metadata is flattened into the top level of the serialized record, so a
/// record with metadata `{"todoId": 5}` serializes as
/// `{"timestamp": ..., "level": "INFO", ..., "todoId": 5}`.
///
/// # Example
///
/// ```
/// use shared::models::{LogLevel, LogRecord};
/// use serde_json::json;
///
/// let record = LogRecord::new(LogLevel::Info, "TodoList", "Todo created")
///     .with_metadata(json!({"todoId": 5, "level": "sneaky"}));
///
/// assert_eq!(record.metadata["todoId"], json!(5));
/// assert_eq!(record.metadata["meta.level"], json!("sneaky"));
/// assert_eq!(record.level, LogLevel::Info);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    /// When the record was created, serialized as ISO-8601 with milliseconds.
    #[serde(serialize_with = "serialize_iso8601")]
    pub timestamp: DateTime<Utc>,

    /// Severity level.
    pub level: LogLevel,

    /// Name of the component that owns the logger.
    pub context: String,

    /// Human readable message.
    pub message: String,

    /// Trace id of the span active when the record was created.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,

    /// Span id of the span active when the record was created.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub span_id: Option<String>,

    /// Caller supplied fields.
    #[serde(flatten)]
    pub metadata: Map<String, Value>,
}

fn serialize_iso8601<S: Serializer>(
    timestamp: &DateTime<Utc>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&timestamp.to_rfc3339_opts(SecondsFormat::Millis, true))
}

/// Returns true if `key` names a field owned by the record itself.
#[must_use]
pub fn is_reserved_key(key: &str) -> bool {
    RESERVED_KEYS.contains(&key)
}

impl LogRecord {
    /// Creates a record stamped with the current time and no metadata.
    #[must_use]
    pub fn new(level: LogLevel, context: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            level,
            context: context.into(),
            message: message.into(),
            trace_id: None,
            span_id: None,
            metadata: Map::new(),
        }
    }

    /// Merges caller metadata into the record.
    ///
    /// Objects are merged key by key; keys colliding with a reserved field are
    /// stored under `meta.<key>`. `null` adds nothing, and any other value is
    /// stored under `meta.value`.
    #[must_use]
    pub fn with_metadata(mut self, metadata: Value) -> Self {
        match metadata {
            Value::Null => {}
            Value::Object(fields) => {
                for (key, value) in fields {
                    self.insert_metadata(key, value);
                }
            }
            other => {
                self.metadata.insert(format!("{METADATA_NAMESPACE}value"), other);
            }
        }
        self
    }

    /// Inserts one metadata field, namespacing reserved keys.
    pub fn insert_metadata(&mut self, key: impl Into<String>, value: Value) {
        let key = key.into();
        if is_reserved_key(&key) {
            self.metadata
                .insert(format!("{METADATA_NAMESPACE}{key}"), value);
        } else {
            self.metadata.insert(key, value);
        }
    }

    /// Attaches trace correlation identifiers.
    #[must_use]
    pub fn with_trace(mut self, trace_id: impl Into<String>, span_id: impl Into<String>) -> Self {
        self.trace_id = Some(trace_id.into());
        self.span_id = Some(span_id.into());
        self
    }

    /// Serializes the record as a single newline-terminated JSON line.
    ///
    /// # Errors
    ///
    /// Returns an error if a metadata value cannot be serialized.
    pub fn to_json_line(&self) -> Result<String, serde_json::Error> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }
}
