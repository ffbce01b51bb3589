//! Receiver for browser error and performance telemetry posted in the
//! newline-delimited envelope format.
//!
//! An envelope arrives as one HTTP POST body: a header line followed by
//! item header/payload line pairs. The receiver decodes the first useful
//! item (`transaction`, `event` or `session`), synthesises a trace batch
//! with a uniform attribute shape and hands it to the downstream traces
//! consumer. Everything downstream (metrics derivation, log shipping) keys
//! off the attributes written here.

pub mod config;
pub mod envelope_parser;
pub mod models;
pub mod receiver;
pub mod trace_builder;
pub mod url_sanitizer;

pub use config::Config;
pub use envelope_parser::{parse_envelope, ParseError};
pub use models::EnvelopeType;
pub use receiver::{ReceiverError, SentryReceiver};
