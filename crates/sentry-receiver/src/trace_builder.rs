//! Event → trace synthesis.
//!
//! Every envelope becomes one trace batch with a single resource and scope.
//! Root spans carry a uniform attribute shape (`sentry.envelop.type.int`,
//! `measurements`, `breadcrumbs`, ...) that the metrics connector and the
//! log exporter read back downstream, so attribute keys written here are
//! part of the pipeline contract.

use serde_json::Value as JsonValue;
use tracing::{debug, error};
use url::Url;

use telemetry_model::time::unix_nanos_from_secs_f64;
use telemetry_model::{
    AttributeMap, Resource, ResourceSpans, ScopeSpans, Span, SpanId, SpanKind, StatusCode, TraceId,
    Traces, Value,
};

use crate::config::Config;
use crate::models::{
    json_value_to_string, Breadcrumb, EnvelopeParseResult, EnvelopeType, Event, EventSpan,
};
use crate::url_sanitizer::sanitize_url;

/// Browser resource-timing marks reported as fractional floats; these stay
/// doubles even when their fractional part is nearly zero.
const TIMESTAMP_SPAN_DATA_ATTRIBUTES: [&str; 10] = [
    "http.request.redirect_start",
    "http.request.fetch_start",
    "http.request.domain_lookup_start",
    "http.request.domain_lookup_end",
    "http.request.connect_start",
    "http.request.secure_connection_start",
    "http.request.connection_end",
    "http.request.request_start",
    "http.request.response_start",
    "http.request.response_end",
];

/// The parts of the originating HTTP request the builder reads.
#[derive(Debug, Clone, Default)]
pub struct RequestMeta {
    /// Request URL path; its first segment is the service-name fallback.
    pub path: String,
    /// `x-service-id` header.
    pub service_id: Option<String>,
    /// `x-service-name` header.
    pub service_name: Option<String>,
}

impl RequestMeta {
    /// `x-service-id` header if present, else the first path segment.
    pub fn resolved_service_name(&self) -> String {
        if let Some(id) = &self.service_id {
            if !id.is_empty() {
                return id.clone();
            }
        }
        self.path
            .trim_matches(['/', ' '])
            .split('/')
            .next()
            .unwrap_or_default()
            .to_string()
    }
}

/// Builds one trace batch from a parsed envelope.
pub fn build_traces(config: &Config, envelope: &EnvelopeParseResult, request: &RequestMeta) -> Traces {
    let mut scope_spans = ScopeSpans::default();
    if envelope.envelope_type == EnvelopeType::Session {
        append_session_spans(&mut scope_spans, envelope, request);
    } else {
        append_event_spans(config, &mut scope_spans, envelope, request);
    }

    let mut resource = Resource::default();
    resource.attributes.insert(
        "telemetry.sdk.name".into(),
        Value::Str(envelope.header.sdk.name.clone()),
    );
    resource.attributes.insert(
        "service.name".into(),
        Value::Str(request.resolved_service_name()),
    );
    resource
        .attributes
        .insert("trace.source.type".into(), Value::Str("sentry".into()));

    Traces {
        resource_spans: vec![ResourceSpans {
            resource,
            scope_spans: vec![scope_spans],
        }],
    }
}

fn append_event_spans(
    config: &Config,
    scope_spans: &mut ScopeSpans,
    envelope: &EnvelopeParseResult,
    request: &RequestMeta,
) {
    for event in &envelope.events {
        let mut root = Span {
            trace_id: TraceId::from_hex(&event.contexts.trace.trace_id),
            kind: SpanKind::Client,
            ..Span::default()
        };
        let transaction_path = sanitize_url(&event.transaction);

        if envelope.envelope_type == EnvelopeType::Transaction {
            root.name = format!("{} {}", transaction_path, event.contexts.trace.op);
            root.span_id = SpanId::from_hex(&event.contexts.trace.span_id);
            root.start_unix_nano = unix_nanos_from_secs_f64(event.start_timestamp);
            root.end_unix_nano = unix_nanos_from_secs_f64(event.timestamp);
        } else {
            root.name = "Event".to_string();
            root.end_unix_nano = unix_nanos_from_secs_f64(event.timestamp);
            root.start_unix_nano = root.end_unix_nano;
            let event_id_prefix = event.event_id.get(0..16).unwrap_or(&event.event_id);
            root.span_id = SpanId::from_hex(event_id_prefix);
            root.parent_span_id = SpanId::from_hex(&event.contexts.trace.span_id);

            let level = evaluate_level(config, event);
            if !level.is_empty() {
                root.attributes.insert("level".into(), Value::Str(level.clone()));
            }
            if level == "error" || level == "fatal" {
                root.status = StatusCode::Error;
            }

            let sdk = format!("{}@{}", event.sdk.name, event.sdk.version);
            if sdk != "@" {
                root.attributes.insert("sdk".into(), Value::Str(sdk));
            }
            if !event.message.is_empty() {
                root.attributes
                    .insert("message".into(), Value::Str(event.message.0.clone()));
            }
            if !event.exception.values.is_empty() {
                if let Ok(rendered) = serde_json::to_string(&event.exception.values) {
                    root.attributes
                        .insert("exception.values".into(), Value::Str(rendered));
                }
            }
            if event.contexts.error.has_content() {
                if let Ok(rendered) = serde_json::to_string(&event.contexts.error) {
                    root.attributes
                        .insert("context.error".into(), Value::Str(rendered));
                }
            }
            if event.timestamp != 0.0 {
                root.attributes
                    .insert("timestamp".into(), Value::Double(event.timestamp));
            }
            if !event.event_id.is_empty() {
                root.attributes
                    .insert("event_id".into(), Value::Str(event.event_id.clone()));
            }
            if !event.release.is_empty() {
                root.attributes
                    .insert("version".into(), Value::Str(event.release.clone()));
            }
            if !event.platform.is_empty() {
                root.attributes
                    .insert("platform".into(), Value::Str(event.platform.clone()));
            }
            if !event.user.id.is_empty() {
                root.attributes
                    .insert("user_id".into(), Value::Str(event.user.id.clone()));
            }
            if let Some(JsonValue::String(transaction)) = event.tags.get("transaction") {
                if !transaction.is_empty() {
                    root.attributes
                        .insert("tags.transaction".into(), Value::Str(transaction.clone()));
                }
            }
            let category = if event.logger.is_empty() {
                "frontend-event"
            } else {
                &event.logger
            };
            root.attributes
                .insert("category".into(), Value::Str(category.to_string()));
            if let Some(user_agent) = event.request.headers.get("User-Agent") {
                if !user_agent.is_empty() {
                    root.attributes
                        .insert("browser".into(), Value::Str(user_agent.clone()));
                }
            }
        }

        root.attributes.insert(
            "sentry.envelop.type.int".into(),
            Value::Int(envelope.envelope_type.as_i64()),
        );
        let name = request.resolved_service_name();
        if !name.is_empty() {
            root.attributes.insert("name".into(), Value::Str(name));
        }
        if let Some(service_name) = request.service_name.as_deref() {
            if !service_name.is_empty() {
                root.attributes
                    .insert("service.name".into(), Value::Str(service_name.to_string()));
            }
        }
        if !event.contexts.trace.span_id.is_empty() {
            root.attributes.insert(
                "contexts.trace.span_id".into(),
                Value::Str(event.contexts.trace.span_id.clone()),
            );
        }
        if !event.contexts.trace.trace_id.is_empty() {
            root.attributes.insert(
                "contexts.trace.trace_id".into(),
                Value::Str(event.contexts.trace.trace_id.clone()),
            );
        }
        if !event.transaction.is_empty() {
            root.attributes
                .insert("transaction".into(), Value::Str(event.transaction.clone()));
            root.attributes
                .insert("transaction_path".into(), Value::Str(transaction_path));
        }
        if !event.contexts.trace.op.is_empty() {
            root.attributes.insert(
                "operation".into(),
                Value::Str(event.contexts.trace.op.clone()),
            );
        }
        if !event.request.url.is_empty() {
            root.attributes
                .insert("url".into(), Value::Str(event.request.url.clone()));
        }
        if !event.dist.is_empty() {
            root.attributes
                .insert("dist".into(), Value::Str(event.dist.clone()));
        }
        if !event.environment.is_empty() {
            root.attributes
                .insert("environment".into(), Value::Str(event.environment.clone()));
        }

        let mut measurements = AttributeMap::new();
        for (name, measurement) in &event.measurements {
            let mut entry = AttributeMap::new();
            entry.insert("value".into(), Value::Double(measurement.value));
            entry.insert("unit".into(), Value::Str(measurement.unit.clone()));
            measurements.insert(name.clone(), Value::Map(entry));
        }
        root.attributes
            .insert("measurements".into(), Value::Map(measurements));

        for (key, value) in &event.tags {
            root.attributes.insert(
                format!("tags.{key}"),
                Value::Str(json_value_to_string(value)),
            );
        }

        if !event.request.url.is_empty() {
            match Url::parse(&event.request.url) {
                Err(err) => {
                    error!("error parsing request url {}: {err}", event.request.url);
                }
                Ok(parsed) => {
                    for qparam in &config.http_query_param_values_to_attrs {
                        let qvalue = query_value(&parsed, qparam);
                        debug!("value qparam {qparam} resolved to {qvalue:?}");
                        root.attributes
                            .insert(format!("http.qparam.{qparam}"), Value::Str(qvalue));
                    }
                    for qparam in &config.http_query_param_existence_to_attrs {
                        let exists = !query_value(&parsed, qparam).is_empty();
                        root.attributes.insert(
                            format!("http.qparam.{qparam}"),
                            Value::Str(exists.to_string()),
                        );
                    }
                    root.attributes.insert(
                        "url_path".into(),
                        Value::Str(sanitize_url(parsed.path())),
                    );
                }
            }
        }

        for context_param in &config.context_span_attributes_list {
            match event.contexts.as_map.get(context_param) {
                Some(JsonValue::String(s)) => {
                    root.attributes
                        .insert(format!("contexts.{context_param}"), Value::Str(s.clone()));
                }
                Some(JsonValue::Object(map)) => {
                    for (key, value) in map {
                        root.attributes.insert(
                            format!("contexts.{context_param}.{key}"),
                            Value::Str(json_value_to_string(value)),
                        );
                    }
                }
                _ => {}
            }
        }

        let breadcrumbs: Vec<Value> = event
            .breadcrumbs
            .iter()
            .map(|breadcrumb| Value::Map(project_breadcrumb(breadcrumb)))
            .collect();
        root.attributes
            .insert("breadcrumbs".into(), Value::Slice(breadcrumbs));

        root.attributes
            .insert("enduser.id".into(), Value::Str(event.user.id.clone()));

        scope_spans.spans.push(root);

        for event_span in &event.spans {
            scope_spans.spans.push(build_child_span(event_span));
        }
    }
}

fn query_value(url: &Url, name: &str) -> String {
    url.query_pairs()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
        .unwrap_or_default()
}

fn project_breadcrumb(breadcrumb: &Breadcrumb) -> AttributeMap {
    let mut map = AttributeMap::new();
    if breadcrumb.breadcrumb_type == "http" {
        map.insert("level".into(), Value::Str(breadcrumb.level.clone()));
        map.insert("timestamp".into(), Value::Double(breadcrumb.timestamp));
        map.insert("category".into(), Value::Str(breadcrumb.category.clone()));
        let method = breadcrumb
            .data
            .get("method")
            .map(json_value_to_string)
            .unwrap_or_default();
        let url = breadcrumb
            .data
            .get("url")
            .map(json_value_to_string)
            .unwrap_or_default();
        map.insert("message".into(), Value::Str(format!("{method} {url}")));
        let status = breadcrumb
            .data
            .get("status_code")
            .map(json_value_to_string)
            .unwrap_or_default();
        map.insert("status".into(), Value::Str(status));
    } else if breadcrumb.category == "navigation" {
        map.insert("timestamp".into(), Value::Double(breadcrumb.timestamp));
        map.insert("category".into(), Value::Str("navigation".into()));
        let from = breadcrumb
            .data
            .get("from")
            .map(json_value_to_string)
            .unwrap_or_default();
        let to = breadcrumb
            .data
            .get("to")
            .map(json_value_to_string)
            .unwrap_or_default();
        map.insert(
            "message".into(),
            Value::Str(format!("Browser navigation from: {from} to: {to}")),
        );
    } else if breadcrumb.category == "console" {
        map.insert("level".into(), Value::Str(breadcrumb.level.clone()));
        map.insert("timestamp".into(), Value::Double(breadcrumb.timestamp));
        map.insert("category".into(), Value::Str("console".into()));
        map.insert("message".into(), Value::Str(breadcrumb.message.0.clone()));
    } else {
        map.insert("category".into(), Value::Str("console".into()));
        map.insert("message".into(), Value::Str(breadcrumb.message.0.clone()));
    }
    map
}

fn build_child_span(event_span: &EventSpan) -> Span {
    let mut span = Span {
        trace_id: TraceId::from_hex(&event_span.trace_id),
        span_id: SpanId::from_hex(&event_span.span_id),
        parent_span_id: SpanId::from_hex(&event_span.parent_span_id),
        name: event_span.op.clone(),
        kind: SpanKind::Client,
        start_unix_nano: unix_nanos_from_secs_f64(event_span.start_timestamp),
        end_unix_nano: unix_nanos_from_secs_f64(event_span.timestamp),
        ..Span::default()
    };

    span.status = match event_span.data.get("http.response.status_code") {
        Some(value) => {
            let code = json_value_to_string(value);
            match code.parse::<i64>() {
                Ok(status) if status < 400 => StatusCode::Ok,
                Ok(_) => StatusCode::Error,
                Err(_) => StatusCode::Unset,
            }
        }
        None => StatusCode::Unset,
    };

    if let Some(url_value) = event_span.data.get("url") {
        span.attributes.insert(
            "url_path".into(),
            Value::Str(sanitize_url(&json_value_to_string(url_value))),
        );
    }

    for (key, value) in &event_span.data {
        if TIMESTAMP_SPAN_DATA_ATTRIBUTES.contains(&key.as_str()) {
            if let Some(number) = value.as_f64() {
                span.attributes.insert(key.clone(), Value::Double(number));
                continue;
            }
        }
        let attr = match value {
            JsonValue::Number(_) => {
                let number = value.as_f64().unwrap_or_default();
                let frac = number.fract().abs();
                const EPSILON: f64 = 1e-9;
                if frac < EPSILON || frac > 1.0 - EPSILON {
                    Value::Int(number.round() as i64)
                } else {
                    Value::Double(number)
                }
            }
            JsonValue::String(s) => Value::Str(s.clone()),
            other => Value::Str(json_value_to_string(other)),
        };
        span.attributes.insert(key.clone(), attr);
    }

    for (key, value) in &event_span.tags {
        span.attributes.insert(
            format!("tags.{key}"),
            Value::Str(json_value_to_string(value)),
        );
    }

    if !event_span.origin.is_empty() {
        span.attributes
            .insert("origin".into(), Value::Str(event_span.origin.clone()));
    }
    if !event_span.description.is_empty() {
        span.attributes
            .insert("description".into(), Value::Str(event_span.description.clone()));
    }

    span
}

fn append_session_spans(
    scope_spans: &mut ScopeSpans,
    envelope: &EnvelopeParseResult,
    request: &RequestMeta,
) {
    for session in &envelope.session_events {
        debug!("received session event sid={}", session.sid);
        let dehyphenated = session.sid.replace('-', "");
        let mut span = Span {
            trace_id: TraceId::from_hex(&dehyphenated),
            span_id: SpanId::from_hex(dehyphenated.get(0..16).unwrap_or(&dehyphenated)),
            name: format!("Session {}", session.sid),
            kind: SpanKind::Client,
            ..Span::default()
        };
        match chrono::DateTime::parse_from_rfc3339(&session.timestamp) {
            Ok(timestamp) => {
                span.start_unix_nano = timestamp.timestamp_nanos_opt().unwrap_or(0).max(0) as u64;
            }
            Err(err) => {
                error!(
                    "error parsing timestamp {} for session event: {err}",
                    session.timestamp
                );
            }
        }

        span.attributes.insert(
            "sentry.envelop.type.int".into(),
            Value::Int(EnvelopeType::Session.as_i64()),
        );
        let name = request.resolved_service_name();
        if !name.is_empty() {
            span.attributes.insert("name".into(), Value::Str(name));
        }
        if let Some(service_name) = request.service_name.as_deref() {
            if !service_name.is_empty() {
                span.attributes
                    .insert("service.name".into(), Value::Str(service_name.to_string()));
            }
        }
        span.attributes
            .insert("session.status".into(), Value::Str(session.status.clone()));
        span.attributes
            .insert("sentry.envelop.type".into(), Value::Str("session".into()));
        scope_spans.spans.push(span);
    }
}

fn level_rating(level: &str) -> i32 {
    match level {
        "fatal" => 6,
        "error" => 5,
        "warning" => 4,
        "log" => 3,
        "info" => 2,
        "debug" => 1,
        _ => 0,
    }
}

fn rating_level(rating: i32) -> &'static str {
    match rating {
        6 => "fatal",
        5 => "error",
        4 => "warning",
        3 => "log",
        2 => "info",
        1 => "debug",
        _ => "",
    }
}

/// With no strategy configured the event's own level wins; otherwise the
/// maximum of the event level and every breadcrumb level.
fn evaluate_level(config: &Config, event: &Event) -> String {
    if config.level_evaluation_strategy.is_empty() {
        return event.level.clone();
    }
    let mut max_rating = level_rating(&event.level);
    for breadcrumb in &event.breadcrumbs {
        max_rating = max_rating.max(level_rating(&breadcrumb.level));
    }
    rating_level(max_rating).to_string()
}
