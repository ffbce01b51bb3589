//! Connector that turns sentry trace batches into metric streams: a session
//! counter, an event counter with configurable labels, and a multi-label
//! histogram over transaction measurements.

pub mod config;
pub mod connector;
pub mod histogram;

pub use config::Config;
pub use connector::SentryMetricsConnector;
pub use histogram::CustomHistogram;
