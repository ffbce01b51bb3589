//! Traces-to-logs exporter: projects selected spans into GELF-style JSON
//! records and delivers them to a remote TCP endpoint through a pool of
//! persistent connections with bounded retry and freeze-on-storm backoff.

pub mod config;
pub mod exporter;
pub mod gelf;
pub mod marshal;
pub mod sender;

pub use config::{AtlConfig, AtlFilter, Config};
pub use exporter::{ExporterError, LogTcpExporter};
pub use gelf::{EncodeError, GelfMessage};
pub use sender::{Endpoint, EnqueueError, GraylogSender, SenderError, Transport};
