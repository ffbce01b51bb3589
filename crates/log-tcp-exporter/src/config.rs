//! Exporter configuration.

use std::collections::HashMap;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

pub const DEFAULT_PORT: u16 = 12201;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("exporter config requires a non-empty 'endpoint'")]
    EmptyEndpoint,
    #[error("error parsing {0:?} port number")]
    InvalidPort(String),
    #[error("connection-pool-size can not be less than 1 (actual value is {0})")]
    InvalidPoolSize(usize),
    #[error("queue-size can not be less than 1 (actual value is {0})")]
    InvalidQueueSize(usize),
    #[error("successive-send-error-freeze-time is not parseable: {0}")]
    InvalidFreezeTime(humantime::DurationError),
}

/// Filter plus field mapping for arbitrary traces logging.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AtlFilter {
    #[serde(rename = "service-names")]
    pub service_names: Vec<String>,
    pub tags: HashMap<String, String>,
    /// Output GELF field name → ordered list of source tokens.
    pub mapping: HashMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AtlConfig {
    #[serde(rename = "span-filters")]
    pub span_filters: Vec<AtlFilter>,
    #[serde(rename = "trace-filters")]
    pub trace_filters: Vec<AtlFilter>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Remote log-ingest endpoint, `host[:port]`; the port defaults to 12201.
    pub endpoint: String,
    #[serde(rename = "arbitrary-traces-logging")]
    pub arbitrary_traces_logging: AtlConfig,
    #[serde(rename = "connection-pool-size")]
    pub connection_pool_size: usize,
    #[serde(rename = "queue-size")]
    pub queue_size: usize,
    #[serde(rename = "max-message-send-retry-count")]
    pub max_message_send_retry_count: u32,
    #[serde(rename = "max-successive-send-error-count")]
    pub max_successive_send_error_count: u32,
    /// Duration string such as `"1m"` or `"10s"`.
    #[serde(rename = "successive-send-error-freeze-time")]
    pub successive_send_error_freeze_time: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            endpoint: format!("0.0.0.0:{DEFAULT_PORT}"),
            arbitrary_traces_logging: AtlConfig::default(),
            connection_pool_size: 1,
            queue_size: 1024,
            max_message_send_retry_count: 1,
            max_successive_send_error_count: 5,
            successive_send_error_freeze_time: "1m".to_string(),
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.endpoint.trim_matches([' ', '/']).is_empty() {
            return Err(ConfigError::EmptyEndpoint);
        }
        self.parse_endpoint()?;
        if self.connection_pool_size < 1 {
            return Err(ConfigError::InvalidPoolSize(self.connection_pool_size));
        }
        if self.queue_size < 1 {
            return Err(ConfigError::InvalidQueueSize(self.queue_size));
        }
        self.freeze_time()?;
        Ok(())
    }

    /// Splits the endpoint into address and port, defaulting the port.
    pub fn parse_endpoint(&self) -> Result<(String, u16), ConfigError> {
        let trimmed = self.endpoint.trim_matches([' ', '/']);
        match trimmed.split_once(':') {
            None => Ok((trimmed.to_string(), DEFAULT_PORT)),
            Some((address, port)) => port
                .parse::<u16>()
                .map(|port| (address.to_string(), port))
                .map_err(|_| ConfigError::InvalidPort(port.to_string())),
        }
    }

    pub fn freeze_time(&self) -> Result<Duration, ConfigError> {
        humantime::parse_duration(&self.successive_send_error_freeze_time)
            .map_err(ConfigError::InvalidFreezeTime)
    }
}
