//! Consumer traits through which the pipeline hands batches downstream.

use async_trait::async_trait;
use thiserror::Error;

use crate::metric::Metrics;
use crate::trace::Traces;

/// Failure reported by a downstream consumer. Permanent errors indicate the
/// payload will never be accepted; transient errors may succeed on retry.
#[derive(Debug, Error)]
pub enum ConsumerError {
    #[error("permanent consumer failure: {0}")]
    Permanent(String),
    #[error("transient consumer failure: {0}")]
    Transient(String),
}

impl ConsumerError {
    pub fn is_permanent(&self) -> bool {
        matches!(self, ConsumerError::Permanent(_))
    }
}

/// Sink for trace batches.
#[async_trait]
pub trait TracesConsumer: Send + Sync {
    async fn consume_traces(&self, traces: Traces) -> Result<(), ConsumerError>;
}

/// Sink for metric batches.
#[async_trait]
pub trait MetricsConsumer: Send + Sync {
    async fn consume_metrics(&self, metrics: Metrics) -> Result<(), ConsumerError>;
}
