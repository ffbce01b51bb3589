//! Internal data model shared by the frontend telemetry components.
//!
//! The receiver synthesises [`trace::Traces`] batches, the metrics connector
//! derives [`metric::Metrics`] from them, and both hand their output to the
//! host through the [`consumer`] traits. The model is deliberately small:
//! it carries exactly what the downstream components read, nothing more.

pub mod consumer;
pub mod metric;
pub mod time;
pub mod trace;
pub mod value;

pub use consumer::{ConsumerError, MetricsConsumer, TracesConsumer};
pub use metric::{
    AggregationTemporality, HistogramDataPoint, Metric, MetricData, Metrics, NumberDataPoint,
    ResourceMetrics, ScopeMetrics,
};
pub use trace::{
    InstrumentationScope, Resource, ResourceSpans, ScopeSpans, Span, SpanId, SpanKind, StatusCode,
    TraceId, Traces,
};
pub use value::{AttributeMap, Value};
