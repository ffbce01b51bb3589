//! Receiver configuration.

use serde::Deserialize;
use thiserror::Error;

pub const DEFAULT_ENDPOINT: &str = "0.0.0.0:8080";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("receiver config requires a non-empty 'endpoint'")]
    EmptyEndpoint,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Bind address for the envelope endpoint, `host:port`.
    pub endpoint: String,
    /// Query parameters of the event request URL copied to span attributes
    /// as `http.qparam.<name>` with their value.
    #[serde(rename = "http-query-param-values-to-attrs")]
    pub http_query_param_values_to_attrs: Vec<String>,
    /// Query parameters projected as `http.qparam.<name>` = `"true"`/`"false"`
    /// depending on presence.
    #[serde(rename = "http-query-param-existence-to-attrs")]
    pub http_query_param_existence_to_attrs: Vec<String>,
    /// Empty: the event's own level is used. Non-empty: the maximum of the
    /// event level and all breadcrumb levels wins.
    #[serde(rename = "level-evaluation-strategy")]
    pub level_evaluation_strategy: String,
    /// Context entries flattened onto root spans as `contexts.<entry>[.<k>]`.
    #[serde(rename = "context-span-attributes-list")]
    pub context_span_attributes_list: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            http_query_param_values_to_attrs: Vec::new(),
            http_query_param_existence_to_attrs: Vec::new(),
            level_evaluation_strategy: String::new(),
            context_span_attributes_list: Vec::new(),
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.endpoint.is_empty() {
            return Err(ConfigError::EmptyEndpoint);
        }
        Ok(())
    }
}
