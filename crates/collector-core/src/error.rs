//! Errors raised while starting or stopping the services.

#[derive(Debug, thiserror::Error)]
pub enum ServicesError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to start receiver: {0}")]
    ReceiverStart(String),

    #[error("Failed to start log exporter: {0}")]
    ExporterStart(String),

    #[error("Services not running")]
    NotRunning,
}
