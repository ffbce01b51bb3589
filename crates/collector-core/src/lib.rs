//! Lifecycle wiring for the frontend telemetry components.
//!
//! The generic pipeline host stays external; this crate offers the minimal
//! glue for embedding: it validates configuration, starts the exporter and
//! the receiver, fans trace batches out to the metrics connector and the
//! log exporter, and hands back a handle for status checks and shutdown.

pub mod config;
pub mod error;
pub mod services;

pub use config::ServicesConfig;
pub use error::ServicesError;
pub use services::{CollectorServices, FanoutTracesConsumer, ServiceStatus, ServicesHandle};
