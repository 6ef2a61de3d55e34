//! Destinations for ended spans.

use crate::models::SpanRecord;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

/// Receives every span when it ends.
pub trait SpanExporter: Send + Sync {
    /// Exports one ended span. Must not block for long.
    fn export(&self, span: SpanRecord);
}

/// Writes each ended span as one structured `tracing` event.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSpanExporter;

impl SpanExporter for LogSpanExporter {
    fn export(&self, span: SpanRecord) {
        let attributes = serde_json::to_string(&span.attributes).unwrap_or_default();
        tracing::info!(
            target: "todoscope::spans",
            trace_id = %span.trace_id,
            span_id = %span.span_id,
            parent_span_id = span.parent_span_id.as_deref().unwrap_or(""),
            service = %span.service,
            status = %span.status,
            duration_ms = span.duration().num_milliseconds(),
            exception = span.exception.as_deref().unwrap_or(""),
            attributes = %attributes,
            "Span ended: {}",
            span.name
        );
    }
}

/// Keeps the most recent ended spans in a bounded ring buffer, oldest first.
#[derive(Debug)]
pub struct InMemorySpanExporter {
    capacity: usize,
    spans: Mutex<VecDeque<SpanRecord>>,
}

impl InMemorySpanExporter {
    /// Creates a buffer holding at most `capacity` spans (min 1).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            spans: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    /// Returns the buffered spans, oldest first.
    #[must_use]
    pub fn spans(&self) -> Vec<SpanRecord> {
        self.spans
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    /// Returns buffered spans with the given name.
    #[must_use]
    pub fn find(&self, name: &str) -> Vec<SpanRecord> {
        self.spans()
            .into_iter()
            .filter(|s| s.name == name)
            .collect()
    }

    /// Number of buffered spans.
    #[must_use]
    pub fn len(&self) -> usize {
        self.spans.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Returns true if nothing is buffered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every buffered span.
    pub fn clear(&self) {
        self.spans
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl SpanExporter for InMemorySpanExporter {
    fn export(&self, span: SpanRecord) {
        let mut spans = self.spans.lock().unwrap_or_else(PoisonError::into_inner);
        if spans.len() == self.capacity {
            spans.pop_front();
        }
        spans.push_back(span);
    }
}

/// Hands every span to each inner exporter in order.
#[derive(Default)]
pub struct FanoutExporter {
    exporters: Vec<Arc<dyn SpanExporter>>,
}

impl FanoutExporter {
    /// Creates an exporter with no destinations.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a destination.
    #[must_use]
    pub fn with_exporter(mut self, exporter: Arc<dyn SpanExporter>) -> Self {
        self.exporters.push(exporter);
        self
    }
}

impl SpanExporter for FanoutExporter {
    fn export(&self, span: SpanRecord) {
        if let Some((last, rest)) = self.exporters.split_last() {
            for exporter in rest {
                exporter.export(span.clone());
            }
            last.export(span);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str) -> SpanRecord {
        SpanRecord::new("trace", name, name, "svc")
    }

    #[test]
    fn test_buffer_keeps_most_recent() {
        let exporter = InMemorySpanExporter::new(2);

        exporter.export(record("a"));
        exporter.export(record("b"));
        exporter.export(record("c"));

        let names: Vec<_> = exporter.spans().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["b", "c"]);
    }

    #[test]
    fn test_find_and_clear() {
        let exporter = InMemorySpanExporter::new(8);
        exporter.export(record("a"));
        exporter.export(record("b"));

        assert_eq!(exporter.find("b").len(), 1);
        exporter.clear();
        assert!(exporter.is_empty());
    }

    #[test]
    fn test_fanout_reaches_every_exporter() {
        let first = Arc::new(InMemorySpanExporter::new(4));
        let second = Arc::new(InMemorySpanExporter::new(4));
        let fanout = FanoutExporter::new()
            .with_exporter(first.clone())
            .with_exporter(second.clone())
            .with_exporter(Arc::new(LogSpanExporter));

        fanout.export(record("op"));

        assert_eq!(first.len(), 1);
        assert_eq!(second.len(), 1);
    }
}
