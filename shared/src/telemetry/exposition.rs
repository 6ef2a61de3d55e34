//! Prometheus text exposition.
//!
//! The aggregator stays the source of truth; a snapshot is mapped into
//! `prometheus` metric families and encoded with its `TextEncoder`.

use crate::models::{HistogramSample, LabelSet, MetricsSnapshot, ScalarSample};
use prometheus::proto::{
    Bucket, Counter, Gauge, Histogram, LabelPair, Metric, MetricFamily, MetricType,
};
use prometheus::{Encoder, TextEncoder};
use std::collections::BTreeMap;

/// Content type of the encoded exposition.
#[must_use]
pub fn content_type() -> String {
    TextEncoder::new().format_type().to_string()
}

fn label_pairs(labels: &LabelSet) -> Vec<LabelPair> {
    labels
        .iter()
        .map(|(name, value)| {
            let mut pair = LabelPair::default();
            pair.set_name(name.to_string());
            pair.set_value(value.to_string());
            pair
        })
        .collect()
}

fn family(snapshot: &MetricsSnapshot, name: &str, kind: MetricType) -> MetricFamily {
    let mut family = MetricFamily::default();
    family.set_name(name.to_string());
    family.set_help(
        snapshot
            .descriptions
            .get(name)
            .cloned()
            .unwrap_or_else(|| name.to_string()),
    );
    family.set_field_type(kind);
    family
}

fn scalar_metric(sample: &ScalarSample, kind: MetricType) -> Metric {
    let mut metric = Metric::default();
    for pair in label_pairs(&sample.labels) {
        metric.mut_label().push(pair);
    }
    if kind == MetricType::COUNTER {
        let mut counter = Counter::default();
        counter.set_value(sample.value);
        metric.set_counter(counter);
    } else {
        let mut gauge = Gauge::default();
        gauge.set_value(sample.value);
        metric.set_gauge(gauge);
    }
    metric
}

fn histogram_metric(sample: &HistogramSample) -> Metric {
    let mut histogram = Histogram::default();
    histogram.set_sample_count(sample.count);
    histogram.set_sample_sum(sample.sum);
    for bucket in &sample.buckets {
        let mut encoded = Bucket::default();
        encoded.set_upper_bound(bucket.upper_bound);
        encoded.set_cumulative_count(bucket.count);
        histogram.mut_bucket().push(encoded);
    }

    let mut metric = Metric::default();
    for pair in label_pairs(&sample.labels) {
        metric.mut_label().push(pair);
    }
    metric.set_histogram(histogram);
    metric
}

/// Maps a snapshot into metric families, one per name, names in sorted order
/// within each kind.
#[must_use]
pub fn metric_families(snapshot: &MetricsSnapshot) -> Vec<MetricFamily> {
    let mut families = Vec::new();

    for (kind, samples) in [
        (MetricType::COUNTER, &snapshot.counters),
        (MetricType::GAUGE, &snapshot.gauges),
    ] {
        let mut by_name: BTreeMap<&str, MetricFamily> = BTreeMap::new();
        for sample in samples.values() {
            by_name
                .entry(sample.name.as_str())
                .or_insert_with(|| family(snapshot, &sample.name, kind))
                .mut_metric()
                .push(scalar_metric(sample, kind));
        }
        families.extend(by_name.into_values());
    }

    let mut by_name: BTreeMap<&str, MetricFamily> = BTreeMap::new();
    for sample in snapshot.histograms.values() {
        by_name
            .entry(sample.name.as_str())
            .or_insert_with(|| family(snapshot, &sample.name, MetricType::HISTOGRAM))
            .mut_metric()
            .push(histogram_metric(sample));
    }
    families.extend(by_name.into_values());

    families
}

/// Encodes a snapshot in the text exposition format.
///
/// # Errors
///
/// Returns an error if the encoder rejects a metric family.
pub fn render(snapshot: &MetricsSnapshot) -> prometheus::Result<String> {
    let mut buffer = Vec::new();
    TextEncoder::new().encode(&metric_families(snapshot), &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::MetricsAggregator;

    #[test]
    fn test_content_type() {
        assert!(content_type().starts_with("text/plain; version=0.0.4"));
    }

    #[test]
    fn test_render_counter_and_gauge() {
        let metrics = MetricsAggregator::default();
        metrics
            .describe("todoscope_todos_active", "Active todos")
            .unwrap();
        metrics
            .increment(
                "todoscope_todo_operations_total",
                &LabelSet::new()
                    .with("operation", "create")
                    .with("outcome", "success"),
            )
            .unwrap();
        metrics
            .set_gauge("todoscope_todos_active", 2.0, &LabelSet::new())
            .unwrap();

        let text = render(&metrics.snapshot().unwrap()).unwrap();

        assert!(text.contains("# TYPE todoscope_todo_operations_total counter\n"));
        assert!(text.contains(
            "todoscope_todo_operations_total{operation=\"create\",outcome=\"success\"} 1\n"
        ));
        assert!(text.contains("# HELP todoscope_todos_active Active todos\n"));
        assert!(text.contains("# TYPE todoscope_todos_active gauge\n"));
        assert!(text.contains("todoscope_todos_active 2\n"));
        assert!(text.ends_with('\n'));
    }

    #[test]
    fn test_one_family_per_name() {
        let metrics = MetricsAggregator::default();
        metrics
            .increment("requests", &LabelSet::new().with("route", "/a"))
            .unwrap();
        metrics
            .increment("requests", &LabelSet::new().with("route", "/b"))
            .unwrap();

        let snapshot = metrics.snapshot().unwrap();
        let families = metric_families(&snapshot);
        assert_eq!(families.len(), 1);
        assert_eq!(families[0].get_metric().len(), 2);

        let text = render(&snapshot).unwrap();
        assert_eq!(text.matches("# TYPE requests counter").count(), 1);
        assert_eq!(text.matches("requests{route=").count(), 2);
    }

    #[test]
    fn test_render_histogram() {
        let metrics = MetricsAggregator::new(16, vec![0.1, 1.0]);
        let labels = LabelSet::new().with("operation", "list");
        metrics.record_histogram("latency", 0.0625, &labels).unwrap();
        metrics.record_histogram("latency", 0.5, &labels).unwrap();

        let text = render(&metrics.snapshot().unwrap()).unwrap();

        assert!(text.contains("# TYPE latency histogram\n"));
        assert!(text.contains("latency_bucket{operation=\"list\",le=\"0.1\"} 1\n"));
        assert!(text.contains("latency_bucket{operation=\"list\",le=\"1\"} 2\n"));
        assert!(text.contains("latency_bucket{operation=\"list\",le=\"+Inf\"} 2\n"));
        assert!(text.contains("latency_sum{operation=\"list\"} 0.5625\n"));
        assert!(text.contains("latency_count{operation=\"list\"} 2\n"));
    }

    #[test]
    fn test_label_values_escaped() {
        let metrics = MetricsAggregator::default();
        metrics
            .increment("c", &LabelSet::new().with("path", "a\"b\\c"))
            .unwrap();

        let text = render(&metrics.snapshot().unwrap()).unwrap();
        assert!(text.contains(r#"c{path="a\"b\\c"} 1"#));
    }

    #[test]
    fn test_empty_snapshot_renders_nothing() {
        assert!(render(&MetricsSnapshot::default()).unwrap().is_empty());
    }
}
