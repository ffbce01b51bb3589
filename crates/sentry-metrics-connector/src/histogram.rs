//! Histogram state shared across trace batches.
//!
//! Observations accumulate per label set for the lifetime of the connector
//! and are re-rendered on every batch. Bucketing is first-match: a sample
//! increments only the first bucket whose upper bound is >= the value, and
//! `bucket_counts` are emitted as-is. This is NOT the conventional
//! cumulative-bucket encoding; consumers of the rendered histogram must not
//! assume bucket counts are cumulative.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use telemetry_model::{AggregationTemporality, HistogramDataPoint, Metric, MetricData};

/// Canonical form of a label set: `k="v",` pairs concatenated in key order.
pub(crate) fn map_to_string(labels: &HashMap<String, String>) -> String {
    let mut keys: Vec<&String> = labels.keys().collect();
    keys.sort();
    let mut out = String::new();
    for key in keys {
        out.push_str(&format!("{}=\"{}\",", key, labels[key]));
    }
    out
}

struct HistogramState {
    sum: f64,
    count: u64,
    /// Aligned with `bucket_list`; only the first matching bucket of each
    /// observation is incremented.
    bucket_counts: Vec<u64>,
    bucket_list: Vec<f64>,
    labels: HashMap<String, String>,
}

#[derive(Default)]
pub struct CustomHistogram {
    state: Mutex<HashMap<String, HistogramState>>,
}

impl CustomHistogram {
    pub fn new() -> CustomHistogram {
        CustomHistogram::default()
    }

    /// Records one observation under the given label set.
    pub fn observe_single(&self, val: f64, bucket_list: &[f64], labels: HashMap<String, String>) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let key = map_to_string(&labels);
        let entry = state.entry(key).or_insert_with(|| HistogramState {
            sum: 0.0,
            count: 0,
            bucket_counts: vec![0; bucket_list.len()],
            bucket_list: bucket_list.to_vec(),
            labels,
        });

        entry.sum += val;
        entry.count += 1;
        for (i, bound) in entry.bucket_list.iter().enumerate() {
            if val <= *bound {
                entry.bucket_counts[i] += 1;
                break;
            }
        }
    }

    /// Renders the accumulated state as the measurements histogram metric.
    pub fn render_metric(&self) -> Metric {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let data_points = state
            .values()
            .map(|entry| HistogramDataPoint {
                attributes: entry
                    .labels
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect::<BTreeMap<String, String>>(),
                sum: entry.sum,
                count: entry.count,
                explicit_bounds: entry.bucket_list.clone(),
                bucket_counts: entry.bucket_counts.clone(),
            })
            .collect();

        Metric {
            name: "sentry_measurements_statistic".to_string(),
            description: "The metric shows sentry measurements statistic".to_string(),
            unit: "millisecond".to_string(),
            data: MetricData::Histogram {
                aggregation_temporality: AggregationTemporality::Cumulative,
                data_points,
            },
        }
    }
}
