//! Trace → GELF projection and filter evaluation.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use thiserror::Error;
use tracing::{debug, error, warn};

use telemetry_model::time::{datetime_from_nanos, unix_secs_from_nanos};
use telemetry_model::{ConsumerError, Resource, Span, StatusCode, Traces, TracesConsumer};

use crate::config::{AtlFilter, Config, ConfigError};
use crate::gelf::GelfMessage;
use crate::marshal::marshal_traces;
use crate::sender::{Endpoint, GraylogSender, SenderError, SenderOptions, Transport};

#[derive(Debug, Error)]
pub enum ExporterError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Sender(#[from] SenderError),
}

/// Traces consumer that ships selected span content to the remote TCP
/// endpoint. Delivery is best effort: enqueue failures are logged and never
/// propagate into the trace pipeline.
pub struct LogTcpExporter {
    config: Arc<Config>,
    sender: GraylogSender,
    trace_filter_enabled: bool,
    span_filter_enabled: bool,
}

impl LogTcpExporter {
    /// Validates the config, connects the sender pool and returns the
    /// running exporter.
    pub fn start(config: Config) -> Result<LogTcpExporter, ExporterError> {
        config.validate()?;
        let (address, port) = config.parse_endpoint()?;
        let sender = GraylogSender::new(
            Endpoint {
                transport: Transport::Tcp,
                address,
                port,
            },
            SenderOptions {
                connection_pool_size: config.connection_pool_size,
                queue_size: config.queue_size,
                max_message_send_retry_count: config.max_message_send_retry_count,
                max_successive_send_error_count: config.max_successive_send_error_count,
                successive_send_error_freeze_time: config.freeze_time()?,
            },
        )?;
        Ok(LogTcpExporter {
            trace_filter_enabled: !config.arbitrary_traces_logging.trace_filters.is_empty(),
            span_filter_enabled: !config.arbitrary_traces_logging.span_filters.is_empty(),
            config: Arc::new(config),
            sender,
        })
    }

    pub fn stop(&self) {
        self.sender.stop();
    }

    fn enqueue(&self, message: GelfMessage) {
        if let Err(err) = self.sender.enqueue(message) {
            warn!("message has not been put to the graylog queue: {err}");
        }
    }
}

#[async_trait]
impl TracesConsumer for LogTcpExporter {
    async fn consume_traces(&self, traces: Traces) -> Result<(), ConsumerError> {
        let is_sentry = is_sentry_trace(&traces);
        debug!(
            "push traces: is_sentry={is_sentry}, trace_filter_enabled={}, span_filter_enabled={}",
            self.trace_filter_enabled, self.span_filter_enabled
        );

        if self.trace_filter_enabled {
            if let Some(message) = build_trace_filter_message(
                &traces,
                &self.config.arbitrary_traces_logging.trace_filters,
            ) {
                self.enqueue(message);
            }
        }

        if !(is_sentry || self.span_filter_enabled) {
            return Ok(());
        }

        for span in traces.iter_spans() {
            if is_sentry && span.name == "Event" {
                for message in build_sentry_messages(span) {
                    self.enqueue(message);
                }
            }
            if self.span_filter_enabled {
                if let Some(message) = build_span_filter_message(
                    span,
                    &self.config.arbitrary_traces_logging.span_filters,
                ) {
                    self.enqueue(message);
                }
            }
        }

        Ok(())
    }
}

/// A batch is a sentry trace when its first resource is marked
/// `trace.source.type = "sentry"` by the receiver.
pub(crate) fn is_sentry_trace(traces: &Traces) -> bool {
    traces
        .resource_spans
        .first()
        .and_then(|rs| rs.resource.attributes.get("trace.source.type"))
        .map(|v| v.as_string() == "sentry")
        .unwrap_or(false)
}

fn get_first(values: &[&str]) -> String {
    values
        .iter()
        .find(|v| !v.is_empty())
        .map(|v| v.to_string())
        .unwrap_or_default()
}

fn get_first_i64(values: &[i64]) -> i64 {
    values.iter().copied().find(|v| *v != 0).unwrap_or(0)
}

/// Syslog-style level for a sentry severity label. Unknown labels map to
/// error so they stay visible.
fn graylog_level(level: &str) -> u32 {
    match level.to_lowercase().as_str() {
        "fatal" => 0,
        "error" => 3,
        "warning" => 4,
        "log" => 5,
        "info" => 6,
        "debug" => 7,
        other => {
            error!("unknown logging level {other:?} is received, graylog level 3 is used");
            3
        }
    }
}

/// Projects an "Event" span into GELF records: the main record plus, for
/// error-level events, one record per breadcrumb.
pub(crate) fn build_sentry_messages(span: &Span) -> Vec<GelfMessage> {
    let span_id = span.attribute_string("contexts.trace.span_id");
    let trace_id = span.attribute_string("contexts.trace.trace_id");
    let level = span.attribute_string("level");
    let level_num = if level.is_empty() {
        0
    } else {
        graylog_level(&level)
    };
    let sdk = span.attribute_string("sdk");
    let full_message = span.attribute_string("exception.values");

    let mut message = span.attribute_string("message");
    if message.is_empty() {
        message = span.attribute_string("context.error");
    }
    if message.is_empty() {
        message = full_message.clone();
    }
    if message.is_empty() {
        message = "empty_message".to_string();
    }

    let timestamp = span
        .attribute("timestamp")
        .and_then(|v| v.as_double())
        .unwrap_or_default() as i64;
    let event_id = span.attribute_string("event_id");
    let mut version = span.attribute_string("version");
    if version.is_empty() {
        version = "empty_version".to_string();
    }
    let name = span.attribute_string("name");
    let platform = span.attribute_string("platform");
    let user_id = span.attribute_string("user_id");
    let transaction = span.attribute_string("tags.transaction");
    let category = span.attribute_string("category");
    let url = span.attribute_string("url");
    let browser = span.attribute_string("browser");

    let time = Utc
        .timestamp_opt(timestamp, 0)
        .single()
        .map(|t| t.to_rfc3339())
        .unwrap_or_default();

    let base_extra = |category_value: String| {
        HashMap::from([
            ("span_id".to_string(), span_id.clone()),
            ("trace_id".to_string(), trace_id.clone()),
            ("component".to_string(), "frontend".to_string()),
            ("facility".to_string(), "open-telemetry-collector".to_string()),
            ("sdk".to_string(), sdk.clone()),
            ("stacktrace".to_string(), full_message.clone()),
            ("event_id".to_string(), event_id.clone()),
            ("name".to_string(), name.clone()),
            ("platform".to_string(), platform.clone()),
            ("time".to_string(), time.clone()),
            ("user_id".to_string(), user_id.clone()),
            ("transaction".to_string(), transaction.clone()),
            ("category".to_string(), category_value),
            ("url".to_string(), url.clone()),
            ("browser".to_string(), browser.clone()),
        ])
    };

    let mut messages = vec![GelfMessage {
        version: version.clone(),
        host: "user_browser".to_string(),
        short_message: message.clone(),
        full_message: full_message.clone(),
        timestamp,
        level: level_num,
        extra: base_extra(category.clone()),
    }];

    if level_num == 3 {
        let breadcrumbs = span
            .attribute("breadcrumbs")
            .and_then(|v| v.as_slice().map(|s| s.to_vec()))
            .unwrap_or_default();
        for breadcrumb in &breadcrumbs {
            let Some(map) = breadcrumb.as_map() else {
                error!("breadcrumb is not a map");
                continue;
            };
            let get_str = |key: &str| {
                map.get(key)
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string()
            };
            let breadcrumb_level = get_str("level");
            let breadcrumb_timestamp = map
                .get("timestamp")
                .and_then(|v| v.as_double())
                .unwrap_or_default() as i64;
            let breadcrumb_category = get_str("category");
            let breadcrumb_message = get_str("message");
            let breadcrumb_status = get_str("status");

            let mut extra = base_extra(get_first(&[&breadcrumb_category, &category]));
            if !breadcrumb_status.is_empty() {
                extra.insert("status".to_string(), breadcrumb_status);
            }

            messages.push(GelfMessage {
                version: version.clone(),
                host: "user_browser".to_string(),
                short_message: get_first(&[&breadcrumb_message, &message]),
                full_message: full_message.clone(),
                timestamp: get_first_i64(&[breadcrumb_timestamp, timestamp]),
                level: graylog_level(&get_first(&[&breadcrumb_level, &level])),
                extra,
            });
        }
    }

    messages
}

fn span_matches_filter(span: &Span, filter: &AtlFilter) -> bool {
    if !filter.service_names.is_empty() {
        let Some(service_name) = span.attribute("service.name") else {
            return false;
        };
        if !filter.service_names.contains(&service_name.as_string()) {
            return false;
        }
    }

    filter.tags.iter().all(|(key, expected)| {
        span.attribute(key)
            .map(|v| v.as_string() == *expected)
            .unwrap_or(false)
    })
}

fn resource_matches_filter(resource: &Resource, filter: &AtlFilter) -> bool {
    if !filter.service_names.is_empty() {
        return false;
    }

    filter.tags.iter().all(|(key, expected)| {
        resource
            .attributes
            .get(key)
            .map(|v| v.as_string() == *expected)
            .unwrap_or(false)
    })
}

fn trace_matches_filter(traces: &Traces, filter: &AtlFilter) -> bool {
    for resource_spans in &traces.resource_spans {
        if resource_matches_filter(&resource_spans.resource, filter) {
            return true;
        }
        for scope_spans in &resource_spans.scope_spans {
            for span in &scope_spans.spans {
                if span_matches_filter(span, filter) {
                    return true;
                }
            }
        }
    }
    false
}

/// Aggregated GELF record for a whole batch matching a trace filter.
pub(crate) fn build_trace_filter_message(
    traces: &Traces,
    trace_filters: &[AtlFilter],
) -> Option<GelfMessage> {
    let matched = trace_filters
        .iter()
        .position(|filter| trace_matches_filter(traces, filter));
    let Some(filter_index) = matched else {
        debug!("arbitrary logging: trace is filtered out");
        return None;
    };
    debug!("arbitrary logging: trace filter #{filter_index} matched");

    let trace_id = traces
        .iter_spans()
        .next()
        .map(|span| span.trace_id.to_string())
        .unwrap_or_default();

    let mut max_end_nano: u64 = 0;
    let mut level: u32 = 6;
    for span in traces.iter_spans() {
        max_end_nano = max_end_nano.max(span.end_unix_nano);
        if level == 6 && span.status == StatusCode::Error {
            level = 3;
        }
    }
    let timestamp = if max_end_nano == 0 {
        Utc::now().timestamp()
    } else {
        unix_secs_from_nanos(max_end_nano)
    };

    Some(GelfMessage {
        version: String::new(),
        host: "open-telemetry-collector".to_string(),
        short_message: marshal_traces(traces),
        full_message: String::new(),
        timestamp,
        level,
        extra: HashMap::from([("trace_id".to_string(), trace_id)]),
    })
}

/// Evaluates a matching span filter's field mapping into a GELF record.
/// Returns nothing when no filter matches or the mapped message is empty.
pub(crate) fn build_span_filter_message(
    span: &Span,
    span_filters: &[AtlFilter],
) -> Option<GelfMessage> {
    let matched = span_filters
        .iter()
        .position(|filter| span_matches_filter(span, filter));
    let Some(filter_index) = matched else {
        debug!("arbitrary logging: span is filtered out");
        return None;
    };
    let mapping = &span_filters[filter_index].mapping;

    let mut extra = HashMap::new();
    let mut message = String::new();
    let mut host = "open-telemetry-collector".to_string();
    let mut timestamp: i64 = 0;
    for (gelf_field, span_fields) in mapping {
        match gelf_field.as_str() {
            "__message__" => message = string_from_span_fields(span, span_fields),
            "__host__" => host = string_from_span_fields(span, span_fields),
            "__timestamp__" => timestamp = time_from_span_fields(span, span_fields),
            _ => {
                extra.insert(
                    gelf_field.clone(),
                    string_from_span_fields(span, span_fields),
                );
            }
        }
    }

    if timestamp == 0 {
        timestamp = unix_secs_from_nanos(span.end_unix_nano);
    }

    let level = if span.status == StatusCode::Error { 3 } else { 6 };

    if message.is_empty() {
        debug!(
            "arbitrary logging: span (trace_id={}, span_id={}) is filtered out because message is empty",
            span.trace_id, span.span_id
        );
        return None;
    }

    Some(GelfMessage {
        version: String::new(),
        host,
        short_message: message,
        full_message: String::new(),
        timestamp,
        level,
        extra,
    })
}

/// Resolves an ordered token list against a span. Reserved tokens read span
/// fields, anything else is an attribute name. Resolved values join with a
/// newline; if every value is empty the result is empty.
fn string_from_span_fields(span: &Span, span_fields: &[String]) -> String {
    let mut resolved = Vec::with_capacity(span_fields.len());
    let mut empty = true;
    for span_field in span_fields {
        let value = match span_field.as_str() {
            "__spanId__" => span.span_id.to_string(),
            "__traceId__" => span.trace_id.to_string(),
            "__name__" => span.name.clone(),
            "__end_timestamp__" => datetime_from_nanos(span.end_unix_nano).to_string(),
            "__start_timestamp__" => datetime_from_nanos(span.start_unix_nano).to_string(),
            "__kind__" => span.kind.as_str().to_string(),
            "__parentSpanId__" => span.parent_span_id.to_string(),
            attribute => span.attribute_string(attribute),
        };
        if !value.is_empty() {
            empty = false;
        }
        resolved.push(value);
    }
    if empty {
        return String::new();
    }
    resolved.join("\n")
}

/// Only the first token is consulted for `__timestamp__`.
fn time_from_span_fields(span: &Span, span_fields: &[String]) -> i64 {
    match span_fields.first().map(String::as_str) {
        Some("__startTime__") => unix_secs_from_nanos(span.start_unix_nano),
        Some("__endTime__") => unix_secs_from_nanos(span.end_unix_nano),
        _ => 0,
    }
}
