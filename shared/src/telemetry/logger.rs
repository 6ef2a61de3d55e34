//! Structured logger.
//!
//! A `Logger` is bound to one context label (usually a component name) and
//! emits one `LogRecord` per call to its `LogSink`. Records are never
//! buffered or retained by the logger.

use crate::models::{LogLevel, LogRecord};
use crate::telemetry::tracer;
use serde_json::Value;
use std::io::{Stderr, Stdout, Write};
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;

/// Errors raised while emitting a record.
#[derive(Debug, Error)]
pub enum LogSinkError {
    /// The record could not be serialized.
    #[error("Failed to serialize log record: {0}")]
    Serialize(#[from] serde_json::Error),

    /// The output stream rejected the write.
    #[error("Failed to write log record: {0}")]
    Io(#[from] std::io::Error),
}

/// Destination for log records.
///
/// Each call to `emit` must write the whole record atomically with respect
/// to other callers.
pub trait LogSink: Send + Sync {
    /// Emits a single record.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be written.
    fn emit(&self, record: &LogRecord) -> Result<(), LogSinkError>;
}

/// Writes one JSON object per line: WARN and ERROR to the error stream,
/// everything else to the output stream.
///
/// `StreamSink::new()` writes to stdout and stderr.
#[derive(Debug)]
pub struct StreamSink<O = Stdout, E = Stderr> {
    out: Mutex<O>,
    err: Mutex<E>,
}

impl StreamSink {
    /// Creates a sink writing to stdout and stderr.
    #[must_use]
    pub fn new() -> Self {
        Self::with_writers(std::io::stdout(), std::io::stderr())
    }
}

impl Default for StreamSink {
    fn default() -> Self {
        Self::new()
    }
}

impl<O: Write, E: Write> StreamSink<O, E> {
    /// Creates a sink writing to the given output and error streams.
    pub fn with_writers(out: O, err: E) -> Self {
        Self {
            out: Mutex::new(out),
            err: Mutex::new(err),
        }
    }

    /// Returns the output and error streams.
    pub fn into_writers(self) -> (O, E) {
        (
            self.out.into_inner().unwrap_or_else(PoisonError::into_inner),
            self.err.into_inner().unwrap_or_else(PoisonError::into_inner),
        )
    }
}

impl<O: Write + Send, E: Write + Send> LogSink for StreamSink<O, E> {
    fn emit(&self, record: &LogRecord) -> Result<(), LogSinkError> {
        let line = record.to_json_line()?;
        if record.level.is_error_stream() {
            let mut err = self.err.lock().unwrap_or_else(PoisonError::into_inner);
            err.write_all(line.as_bytes())?;
            err.flush()?;
        } else {
            let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
            out.write_all(line.as_bytes())?;
            out.flush()?;
        }
        Ok(())
    }
}

/// Forwards records to the `tracing` subscriber installed by the binary.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn emit(&self, record: &LogRecord) -> Result<(), LogSinkError> {
        let fields = serde_json::to_string(&record.metadata)?;
        let trace_id = record.trace_id.as_deref().unwrap_or("");
        match record.level {
            LogLevel::Debug => tracing::debug!(
                context = %record.context,
                trace_id,
                fields = %fields,
                "{}",
                record.message
            ),
            LogLevel::Info => tracing::info!(
                context = %record.context,
                trace_id,
                fields = %fields,
                "{}",
                record.message
            ),
            LogLevel::Warn => tracing::warn!(
                context = %record.context,
                trace_id,
                fields = %fields,
                "{}",
                record.message
            ),
            LogLevel::Error => tracing::error!(
                context = %record.context,
                trace_id,
                fields = %fields,
                "{}",
                record.message
            ),
        }
        Ok(())
    }
}

/// Captures records in memory. Used by tests to assert on log output.
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<LogRecord>>,
}

impl MemorySink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every record emitted so far.
    #[must_use]
    pub fn records(&self) -> Vec<LogRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Returns the records whose message matches exactly.
    #[must_use]
    pub fn find(&self, message: &str) -> Vec<LogRecord> {
        self.records()
            .into_iter()
            .filter(|r| r.message == message)
            .collect()
    }

    /// Drops every captured record.
    pub fn clear(&self) {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl LogSink for MemorySink {
    fn emit(&self, record: &LogRecord) -> Result<(), LogSinkError> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record.clone());
        Ok(())
    }
}

/// Structured logger bound to a context label.
///
/// When a span is active on the current task, its trace and span ids are
/// attached to every record.
///
/// # Example
///
/// ```
/// use shared::models::LogLevel;
/// use shared::telemetry::{Logger, MemorySink};
/// use serde_json::json;
/// use std::sync::Arc;
///
/// let sink = Arc::new(MemorySink::new());
/// let logger = Logger::new("TodoList", sink.clone());
///
/// logger.info("Todo created", json!({"todoId": 5})).unwrap();
///
/// let records = sink.records();
/// assert_eq!(records[0].level, LogLevel::Info);
/// assert_eq!(records[0].metadata["todoId"], json!(5));
/// ```
#[derive(Clone)]
pub struct Logger {
    context: Arc<str>,
    min_level: LogLevel,
    sink: Arc<dyn LogSink>,
}

impl std::fmt::Debug for Logger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Logger")
            .field("context", &self.context)
            .field("min_level", &self.min_level)
            .finish_non_exhaustive()
    }
}

impl Logger {
    /// Creates a logger that emits every level.
    #[must_use]
    pub fn new(context: impl Into<String>, sink: Arc<dyn LogSink>) -> Self {
        Self {
            context: Arc::from(context.into()),
            min_level: LogLevel::Debug,
            sink,
        }
    }

    /// Drops records below `level`.
    #[must_use]
    pub fn with_min_level(mut self, level: LogLevel) -> Self {
        self.min_level = level;
        self
    }

    /// Returns a logger with the same sink and level bound to another context.
    #[must_use]
    pub fn for_context(&self, context: impl Into<String>) -> Self {
        Self {
            context: Arc::from(context.into()),
            min_level: self.min_level,
            sink: Arc::clone(&self.sink),
        }
    }

    /// Returns the context label.
    #[must_use]
    pub fn context(&self) -> &str {
        &self.context
    }

    /// Returns true if records at `level` would be emitted.
    #[must_use]
    pub fn enabled(&self, level: LogLevel) -> bool {
        level >= self.min_level
    }

    /// Emits a record at `level`.
    ///
    /// Records below the minimum level are dropped and count as emitted.
    ///
    /// # Errors
    ///
    /// Returns the sink's error if the record could not be written.
    pub fn log(&self, level: LogLevel, message: &str, metadata: Value) -> Result<(), LogSinkError> {
        if !self.enabled(level) {
            return Ok(());
        }

        let mut record =
            LogRecord::new(level, self.context.as_ref(), message).with_metadata(metadata);
        if let Some(span) = tracer::active_span() {
            record = record.with_trace(span.trace_id(), span.span_id());
        }

        self.sink.emit(&record)
    }

    /// Emits a DEBUG record.
    ///
    /// # Errors
    ///
    /// See [`Logger::log`].
    pub fn debug(&self, message: &str, metadata: Value) -> Result<(), LogSinkError> {
        self.log(LogLevel::Debug, message, metadata)
    }

    /// Emits an INFO record.
    ///
    /// # Errors
    ///
    /// See [`Logger::log`].
    pub fn info(&self, message: &str, metadata: Value) -> Result<(), LogSinkError> {
        self.log(LogLevel::Info, message, metadata)
    }

    /// Emits a WARN record.
    ///
    /// # Errors
    ///
    /// See [`Logger::log`].
    pub fn warn(&self, message: &str, metadata: Value) -> Result<(), LogSinkError> {
        self.log(LogLevel::Warn, message, metadata)
    }

    /// Emits an ERROR record.
    ///
    /// # Errors
    ///
    /// See [`Logger::log`].
    pub fn error(&self, message: &str, metadata: Value) -> Result<(), LogSinkError> {
        self.log(LogLevel::Error, message, metadata)
    }
}
