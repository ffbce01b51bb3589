//! Metric containers mirroring the trace side: resource → scope → metric.

use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregationTemporality {
    Delta,
    Cumulative,
}

/// Data point of a sum metric. Labels are plain strings on purpose: every
/// derived metric labels its points with extracted attribute text.
#[derive(Debug, Clone, Default)]
pub struct NumberDataPoint {
    pub attributes: BTreeMap<String, String>,
    pub value: f64,
}

#[derive(Debug, Clone, Default)]
pub struct HistogramDataPoint {
    pub attributes: BTreeMap<String, String>,
    pub sum: f64,
    pub count: u64,
    pub explicit_bounds: Vec<f64>,
    pub bucket_counts: Vec<u64>,
}

#[derive(Debug, Clone)]
pub enum MetricData {
    Sum {
        aggregation_temporality: AggregationTemporality,
        is_monotonic: bool,
        data_points: Vec<NumberDataPoint>,
    },
    Histogram {
        aggregation_temporality: AggregationTemporality,
        data_points: Vec<HistogramDataPoint>,
    },
}

#[derive(Debug, Clone)]
pub struct Metric {
    pub name: String,
    pub description: String,
    pub unit: String,
    pub data: MetricData,
}

#[derive(Debug, Clone, Default)]
pub struct ScopeMetrics {
    pub scope_name: String,
    pub metrics: Vec<Metric>,
}

#[derive(Debug, Clone, Default)]
pub struct ResourceMetrics {
    pub scope_metrics: Vec<ScopeMetrics>,
}

/// A batch of metric data as handed to the metrics consumer.
#[derive(Debug, Clone, Default)]
pub struct Metrics {
    pub resource_metrics: Vec<ResourceMetrics>,
}

impl Metrics {
    pub fn new() -> Metrics {
        Metrics::default()
    }

    pub fn iter_metrics(&self) -> impl Iterator<Item = &Metric> {
        self.resource_metrics
            .iter()
            .flat_map(|rm| rm.scope_metrics.iter())
            .flat_map(|sm| sm.metrics.iter())
    }
}
