//! Connector configuration.

use std::collections::HashMap;

use serde::Deserialize;

fn default_buckets() -> Vec<f64> {
    vec![100.0, 1000.0, 5000.0]
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub sentry_measurements: SentryMeasurementsConfig,
    pub sentry_events: SentryEventCountConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SentryMeasurementsConfig {
    /// Bucket bounds used for measurement types without a custom entry.
    pub default_buckets: Vec<f64>,
    /// Data point labels: output label name → source span attribute key.
    pub default_labels: HashMap<String, String>,
    /// Per-measurement-type overrides, keyed by measurement name.
    pub custom: HashMap<String, CustomSentryMeasurementsConfig>,
}

impl Default for SentryMeasurementsConfig {
    fn default() -> Self {
        SentryMeasurementsConfig {
            default_buckets: default_buckets(),
            default_labels: HashMap::new(),
            custom: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CustomSentryMeasurementsConfig {
    pub buckets: Vec<f64>,
    pub labels: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SentryEventCountConfig {
    /// Output label name → source span attribute key.
    pub labels: HashMap<String, String>,
}
