//! Aggregated configuration for the wired pipeline.

use serde::Deserialize;

use crate::error::ServicesError;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ServicesConfig {
    pub receiver: sentry_receiver::Config,
    pub connector: sentry_metrics_connector::Config,
    pub exporter: log_tcp_exporter::Config,
}

impl ServicesConfig {
    pub fn validate(&self) -> Result<(), ServicesError> {
        self.receiver
            .validate()
            .map_err(|e| ServicesError::InvalidConfig(e.to_string()))?;
        self.exporter
            .validate()
            .map_err(|e| ServicesError::InvalidConfig(e.to_string()))?;
        Ok(())
    }
}
