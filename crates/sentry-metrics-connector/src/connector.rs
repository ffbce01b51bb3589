//! Trace → metrics derivation.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error};

use sentry_receiver::EnvelopeType;
use telemetry_model::{
    AggregationTemporality, ConsumerError, Metric, MetricData, Metrics, MetricsConsumer,
    NumberDataPoint, ResourceMetrics, ScopeMetrics, Span, Traces, TracesConsumer,
};

use crate::config::Config;
use crate::histogram::CustomHistogram;

const SCOPE_NAME: &str = "sentry-metrics-connector";

/// Evaluates metrics from sentry trace batches and forwards them to the
/// metrics consumer. Input traces are never mutated.
pub struct SentryMetricsConnector {
    config: Config,
    metrics_consumer: Arc<dyn MetricsConsumer>,
    measurements_hist: CustomHistogram,
}

impl SentryMetricsConnector {
    pub fn new(config: Config, metrics_consumer: Arc<dyn MetricsConsumer>) -> SentryMetricsConnector {
        debug!(
            "default measurement labels: {:?}",
            config.sentry_measurements.default_labels
        );
        SentryMetricsConnector {
            config,
            metrics_consumer,
            measurements_hist: CustomHistogram::new(),
        }
    }

    fn session_count_metric(&self, traces: &Traces) -> Metric {
        let mut data_points = Vec::new();
        for span in traces.iter_spans() {
            if envelope_type_int(span) != EnvelopeType::Session.as_i64() {
                continue;
            }
            if span.attribute_string("session.status") != "exited" {
                continue;
            }
            let mut point = NumberDataPoint {
                value: 1.0,
                ..NumberDataPoint::default()
            };
            point.attributes.insert(
                "service_name".to_string(),
                span.attribute_string("service.name"),
            );
            data_points.push(point);
        }

        Metric {
            name: "sentry_session_exited_count".to_string(),
            description: "The metric counts total number of sessions".to_string(),
            unit: String::new(),
            data: MetricData::Sum {
                aggregation_temporality: AggregationTemporality::Delta,
                is_monotonic: true,
                data_points,
            },
        }
    }

    fn event_count_metric(&self, traces: &Traces) -> Metric {
        let labels_to_extract = &self.config.sentry_events.labels;
        let mut data_points = Vec::new();
        for span in traces.iter_spans() {
            if envelope_type_int(span) != EnvelopeType::Event.as_i64() {
                continue;
            }
            let mut point = NumberDataPoint {
                value: 1.0,
                ..NumberDataPoint::default()
            };
            for (label_name, label_value) in extract_labels(span, labels_to_extract) {
                point.attributes.insert(label_name, label_value);
            }
            data_points.push(point);
        }

        Metric {
            name: "sentry_event_count".to_string(),
            description: "The metric counts total number of events by level".to_string(),
            unit: String::new(),
            data: MetricData::Sum {
                aggregation_temporality: AggregationTemporality::Delta,
                is_monotonic: true,
                data_points,
            },
        }
    }

    fn measurements_metric(&self, traces: &Traces) -> Metric {
        for span in traces.iter_spans() {
            if envelope_type_int(span) != EnvelopeType::Transaction.as_i64() {
                continue;
            }
            let default_labels = self.configurable_labels(span, "");
            let measurements = span
                .attribute("measurements")
                .and_then(|v| v.as_map().cloned())
                .unwrap_or_default();
            debug!(
                "got transaction with {} measurements, default labels {:?}",
                measurements.len(),
                default_labels
            );

            for (name, entry) in &measurements {
                let mut labels = HashMap::new();
                labels.insert("type".to_string(), name.clone());
                labels.extend(self.measurement_labels(span, name, &default_labels));

                let Some(entry_map) = entry.as_map() else {
                    error!("error reading measurements entry for {name}");
                    continue;
                };
                let unit = entry_map
                    .get("unit")
                    .map(|v| v.as_string())
                    .unwrap_or_default();
                match entry_map.get("value").and_then(|v| v.as_double()) {
                    Some(value) => {
                        self.measurements_hist.observe_single(
                            normalize_unit(value, &unit),
                            &self.measurement_buckets(name),
                            labels,
                        );
                    }
                    None => error!("error reading measurements value for {name}"),
                }
            }

            let mut labels = HashMap::new();
            labels.insert("type".to_string(), "transaction_duration".to_string());
            labels.extend(self.measurement_labels(span, "transaction_duration", &default_labels));
            let duration_ms =
                (span.end_unix_nano.saturating_sub(span.start_unix_nano) / 1_000_000) as f64;
            self.measurements_hist.observe_single(
                normalize_unit(duration_ms, ""),
                &self.measurement_buckets("transaction_duration"),
                labels,
            );
        }

        self.measurements_hist.render_metric()
    }

    /// Labels for one measurement type: its custom mapping when configured,
    /// otherwise the already-extracted defaults.
    fn measurement_labels(
        &self,
        span: &Span,
        measurement_type: &str,
        default_labels: &HashMap<String, String>,
    ) -> HashMap<String, String> {
        match self
            .config
            .sentry_measurements
            .custom
            .get(measurement_type)
            .and_then(|custom| custom.labels.as_ref())
        {
            Some(_) => self.configurable_labels(span, measurement_type),
            None => default_labels.clone(),
        }
    }

    fn configurable_labels(&self, span: &Span, measurement_type: &str) -> HashMap<String, String> {
        let labels_to_extract = if measurement_type.is_empty() {
            &self.config.sentry_measurements.default_labels
        } else {
            self.config
                .sentry_measurements
                .custom
                .get(measurement_type)
                .and_then(|custom| custom.labels.as_ref())
                .unwrap_or(&self.config.sentry_measurements.default_labels)
        };
        extract_labels(span, labels_to_extract)
    }

    fn measurement_buckets(&self, measurement_type: &str) -> Vec<f64> {
        let buckets = self
            .config
            .sentry_measurements
            .custom
            .get(measurement_type)
            .map(|custom| custom.buckets.clone())
            .unwrap_or_default();
        if buckets.is_empty() {
            return self.config.sentry_measurements.default_buckets.clone();
        }
        buckets
    }
}

#[async_trait]
impl TracesConsumer for SentryMetricsConnector {
    async fn consume_traces(&self, traces: Traces) -> Result<(), ConsumerError> {
        let metrics = Metrics {
            resource_metrics: vec![ResourceMetrics {
                scope_metrics: vec![ScopeMetrics {
                    scope_name: SCOPE_NAME.to_string(),
                    metrics: vec![
                        self.session_count_metric(&traces),
                        self.event_count_metric(&traces),
                        self.measurements_metric(&traces),
                    ],
                }],
            }],
        };
        self.metrics_consumer.consume_metrics(metrics).await
    }
}

fn envelope_type_int(span: &Span) -> i64 {
    span.attribute("sentry.envelop.type.int")
        .and_then(|v| v.as_int())
        .unwrap_or(0)
}

/// Resolves a label mapping against span attributes; a missing source
/// attribute yields the empty string.
fn extract_labels(span: &Span, labels_to_extract: &HashMap<String, String>) -> HashMap<String, String> {
    labels_to_extract
        .iter()
        .map(|(label_name, label_path)| (label_name.clone(), span.attribute_string(label_path)))
        .collect()
}

/// Normalises a measurement value to the histogram's base units
/// (milliseconds for durations, bytes for sizes). Unknown units pass
/// through unchanged.
fn normalize_unit(val: f64, unit: &str) -> f64 {
    match unit {
        "millisecond" | "byte" | "none" | "ratio" | "" => val,
        "percent" => val / 100.0,
        "microsecond" => val / 1000.0,
        "nanosecond" => val / 1_000_000.0,
        "second" | "kilobyte" => val * 1000.0,
        "minute" => val * 1000.0 * 60.0,
        "hour" => val * 1000.0 * 60.0 * 60.0,
        "day" => val * 1000.0 * 60.0 * 60.0 * 24.0,
        "week" => val * 1000.0 * 60.0 * 60.0 * 24.0 * 7.0,
        "bit" => val / 8.0,
        "megabyte" => val * 1_000_000.0,
        "gigabyte" => val * 1_000_000_000.0,
        "terabyte" => val * 1_000_000_000_000.0,
        "petabyte" => val * 1_000_000_000_000_000.0,
        "exabyte" => val * 1_000_000_000_000_000_000.0,
        "kibibyte" => val * 1024.0,
        "mebibyte" => val * 1024.0 * 1024.0,
        "gibibyte" => val * 1024.0 * 1024.0 * 1024.0,
        "tebibyte" => val * 1024.0 * 1024.0 * 1024.0 * 1024.0,
        "pebibyte" => val * 1024.0 * 1024.0 * 1024.0 * 1024.0 * 1024.0,
        "exbibyte" => val * 1024.0 * 1024.0 * 1024.0 * 1024.0 * 1024.0 * 1024.0,
        _ => val,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use duplicate::duplicate_item;
    use std::sync::Mutex;
    use telemetry_model::{AttributeMap, ResourceSpans, ScopeSpans, Value};

    struct CapturingMetricsConsumer {
        batches: Mutex<Vec<Metrics>>,
    }

    #[async_trait]
    impl MetricsConsumer for CapturingMetricsConsumer {
        async fn consume_metrics(&self, metrics: Metrics) -> Result<(), ConsumerError> {
            self.batches.lock().unwrap().push(metrics);
            Ok(())
        }
    }

    fn connector(config: Config) -> (SentryMetricsConnector, Arc<CapturingMetricsConsumer>) {
        let consumer = Arc::new(CapturingMetricsConsumer {
            batches: Mutex::new(Vec::new()),
        });
        (SentryMetricsConnector::new(config, consumer.clone()), consumer)
    }

    fn traces_of(spans: Vec<Span>) -> Traces {
        Traces {
            resource_spans: vec![ResourceSpans {
                resource: Default::default(),
                scope_spans: vec![ScopeSpans {
                    scope: Default::default(),
                    spans,
                }],
            }],
        }
    }

    fn span_with(attrs: Vec<(&str, Value)>) -> Span {
        let mut attributes = AttributeMap::new();
        for (key, value) in attrs {
            attributes.insert(key.to_string(), value);
        }
        Span {
            attributes,
            ..Span::default()
        }
    }

    fn measurement(value: f64, unit: &str) -> Value {
        let mut map = AttributeMap::new();
        map.insert("value".into(), Value::Double(value));
        map.insert("unit".into(), Value::Str(unit.into()));
        Value::Map(map)
    }

    fn consumed_metrics(consumer: &CapturingMetricsConsumer) -> Vec<Metric> {
        let batches = consumer.batches.lock().unwrap();
        batches
            .last()
            .unwrap()
            .iter_metrics()
            .cloned()
            .collect()
    }

    #[tokio::test]
    async fn test_metrics_appended_in_order() {
        let (connector, consumer) = connector(Config::default());
        connector.consume_traces(traces_of(vec![])).await.unwrap();

        let metrics = consumed_metrics(&consumer);
        assert_eq!(metrics.len(), 3);
        assert_eq!(metrics[0].name, "sentry_session_exited_count");
        assert_eq!(metrics[1].name, "sentry_event_count");
        assert_eq!(metrics[2].name, "sentry_measurements_statistic");
        assert_eq!(metrics[2].unit, "millisecond");
    }

    #[tokio::test]
    async fn test_session_exited_count() {
        let (connector, consumer) = connector(Config::default());
        let spans = vec![
            span_with(vec![
                ("sentry.envelop.type.int", Value::Int(3)),
                ("session.status", Value::Str("exited".into())),
                ("service.name", Value::Str("shop-ui".into())),
            ]),
            // Session that has not exited: skipped.
            span_with(vec![
                ("sentry.envelop.type.int", Value::Int(3)),
                ("session.status", Value::Str("ok".into())),
            ]),
            // Event span: skipped by the session metric.
            span_with(vec![("sentry.envelop.type.int", Value::Int(2))]),
        ];
        connector.consume_traces(traces_of(spans)).await.unwrap();

        let metrics = consumed_metrics(&consumer);
        let MetricData::Sum {
            is_monotonic,
            ref data_points,
            ..
        } = metrics[0].data
        else {
            panic!("expected sum");
        };
        assert!(is_monotonic);
        assert_eq!(data_points.len(), 1);
        assert_eq!(data_points[0].value, 1.0);
        assert_eq!(data_points[0].attributes["service_name"], "shop-ui");
    }

    #[tokio::test]
    async fn test_event_count_labels() {
        let mut config = Config::default();
        config
            .sentry_events
            .labels
            .insert("level".to_string(), "level".to_string());
        config
            .sentry_events
            .labels
            .insert("service_name".to_string(), "service.name".to_string());
        let (connector, consumer) = connector(config);

        let spans = vec![span_with(vec![
            ("sentry.envelop.type.int", Value::Int(2)),
            ("level", Value::Str("error".into())),
        ])];
        connector.consume_traces(traces_of(spans)).await.unwrap();

        let metrics = consumed_metrics(&consumer);
        let MetricData::Sum { ref data_points, .. } = metrics[1].data else {
            panic!("expected sum");
        };
        assert_eq!(data_points.len(), 1);
        assert_eq!(data_points[0].attributes["level"], "error");
        // Missing source attribute yields the empty string.
        assert_eq!(data_points[0].attributes["service_name"], "");
    }

    #[tokio::test]
    async fn test_transaction_measurements_and_duration() {
        let (connector, consumer) = connector(Config::default());

        let mut measurements = AttributeMap::new();
        measurements.insert("fcp".into(), measurement(123.0, "millisecond"));
        let mut span = span_with(vec![
            ("sentry.envelop.type.int", Value::Int(1)),
            ("measurements", Value::Map(measurements)),
        ]);
        span.start_unix_nano = 1_000_000_000_000;
        span.end_unix_nano = 1_000_250_000_000;

        connector.consume_traces(traces_of(vec![span])).await.unwrap();

        let metrics = consumed_metrics(&consumer);
        let MetricData::Histogram { ref data_points, .. } = metrics[2].data else {
            panic!("expected histogram");
        };
        assert_eq!(data_points.len(), 2);

        let fcp = data_points
            .iter()
            .find(|p| p.attributes["type"] == "fcp")
            .unwrap();
        assert_eq!(fcp.sum, 123.0);
        assert_eq!(fcp.count, 1);
        assert_eq!(fcp.explicit_bounds, vec![100.0, 1000.0, 5000.0]);
        assert_eq!(fcp.bucket_counts, vec![0, 1, 0]);

        let duration = data_points
            .iter()
            .find(|p| p.attributes["type"] == "transaction_duration")
            .unwrap();
        assert_eq!(duration.sum, 250.0);
        assert_eq!(duration.count, 1);
    }

    #[tokio::test]
    async fn test_second_unit_is_normalised() {
        let (connector, consumer) = connector(Config::default());
        let mut measurements = AttributeMap::new();
        measurements.insert("ttfb".into(), measurement(1.5, "second"));
        let span = span_with(vec![
            ("sentry.envelop.type.int", Value::Int(1)),
            ("measurements", Value::Map(measurements)),
        ]);
        connector.consume_traces(traces_of(vec![span])).await.unwrap();

        let metrics = consumed_metrics(&consumer);
        let MetricData::Histogram { ref data_points, .. } = metrics[2].data else {
            panic!("expected histogram");
        };
        let ttfb = data_points
            .iter()
            .find(|p| p.attributes["type"] == "ttfb")
            .unwrap();
        assert_eq!(ttfb.sum, 1500.0);
    }

    #[tokio::test]
    async fn test_custom_buckets_and_labels() {
        let mut config = Config::default();
        config.sentry_measurements.custom.insert(
            "fcp".to_string(),
            crate::config::CustomSentryMeasurementsConfig {
                buckets: vec![10.0, 20.0],
                labels: Some(HashMap::from([(
                    "env".to_string(),
                    "environment".to_string(),
                )])),
            },
        );
        config
            .sentry_measurements
            .default_labels
            .insert("service_name".to_string(), "service.name".to_string());
        let (connector, consumer) = connector(config);

        let mut measurements = AttributeMap::new();
        measurements.insert("fcp".into(), measurement(15.0, ""));
        measurements.insert("lcp".into(), measurement(30.0, ""));
        let span = span_with(vec![
            ("sentry.envelop.type.int", Value::Int(1)),
            ("measurements", Value::Map(measurements)),
            ("environment", Value::Str("prod".into())),
            ("service.name", Value::Str("shop-ui".into())),
        ]);
        connector.consume_traces(traces_of(vec![span])).await.unwrap();

        let metrics = consumed_metrics(&consumer);
        let MetricData::Histogram { ref data_points, .. } = metrics[2].data else {
            panic!("expected histogram");
        };

        let fcp = data_points
            .iter()
            .find(|p| p.attributes["type"] == "fcp")
            .unwrap();
        assert_eq!(fcp.explicit_bounds, vec![10.0, 20.0]);
        assert_eq!(fcp.attributes["env"], "prod");
        assert!(!fcp.attributes.contains_key("service_name"));

        let lcp = data_points
            .iter()
            .find(|p| p.attributes["type"] == "lcp")
            .unwrap();
        assert_eq!(lcp.explicit_bounds, vec![100.0, 1000.0, 5000.0]);
        assert_eq!(lcp.attributes["service_name"], "shop-ui");
    }

    #[tokio::test]
    async fn test_histogram_accumulates_across_batches() {
        let (connector, consumer) = connector(Config::default());
        let make_span = || {
            let mut measurements = AttributeMap::new();
            measurements.insert("fcp".into(), measurement(50.0, ""));
            span_with(vec![
                ("sentry.envelop.type.int", Value::Int(1)),
                ("measurements", Value::Map(measurements)),
            ])
        };
        connector
            .consume_traces(traces_of(vec![make_span()]))
            .await
            .unwrap();
        connector
            .consume_traces(traces_of(vec![make_span()]))
            .await
            .unwrap();

        let metrics = consumed_metrics(&consumer);
        let MetricData::Histogram { ref data_points, .. } = metrics[2].data else {
            panic!("expected histogram");
        };
        let fcp = data_points
            .iter()
            .find(|p| p.attributes["type"] == "fcp")
            .unwrap();
        assert_eq!(fcp.count, 2);
        assert_eq!(fcp.sum, 100.0);
    }

    #[duplicate_item(
        test_name                     unit            input       expected;
        [test_normalize_millisecond]  ["millisecond"] [100.0]     [100.0];
        [test_normalize_percent]      ["percent"]     [50.0]      [0.5];
        [test_normalize_microsecond]  ["microsecond"] [1000.0]    [1.0];
        [test_normalize_nanosecond]   ["nanosecond"]  [2_000_000.0] [2.0];
        [test_normalize_second]       ["second"]      [1.5]       [1500.0];
        [test_normalize_minute]       ["minute"]      [2.0]       [120_000.0];
        [test_normalize_hour]         ["hour"]        [1.0]       [3_600_000.0];
        [test_normalize_day]          ["day"]         [1.0]       [86_400_000.0];
        [test_normalize_week]         ["week"]        [1.0]       [604_800_000.0];
        [test_normalize_bit]          ["bit"]         [16.0]      [2.0];
        [test_normalize_kilobyte]     ["kilobyte"]    [2.0]       [2000.0];
        [test_normalize_megabyte]     ["megabyte"]    [1.0]       [1_000_000.0];
        [test_normalize_kibibyte]     ["kibibyte"]    [1.0]       [1024.0];
        [test_normalize_mebibyte]     ["mebibyte"]    [1.0]       [1_048_576.0];
        [test_normalize_unknown]      ["parsec"]      [42.0]      [42.0];
        [test_normalize_empty]        [""]            [7.0]       [7.0];
    )]
    #[test]
    fn test_name() {
        assert_eq!(normalize_unit(input, unit), expected);
    }
}
