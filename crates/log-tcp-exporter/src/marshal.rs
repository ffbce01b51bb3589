//! Human-readable multi-line rendering of a trace batch, used as the body
//! of trace-level arbitrary log messages.

use std::fmt::Write;

use telemetry_model::time::datetime_from_nanos;
use telemetry_model::{AttributeMap, Traces, Value};

#[derive(Default)]
struct DataBuffer {
    buf: String,
}

impl DataBuffer {
    fn log_entry(&mut self, line: &str) {
        self.buf.push_str(line);
        self.buf.push('\n');
    }

    fn log_attr(&mut self, attr: &str, value: &str) {
        let _ = writeln!(self.buf, "    {attr:<15}: {value}");
    }

    fn log_attributes(&mut self, header: &str, map: &AttributeMap) {
        if map.is_empty() {
            return;
        }
        self.log_entry(&format!("{header}:"));
        for (key, value) in map {
            let _ = writeln!(self.buf, "     -> {key}: {}", value_to_string(value));
        }
    }
}

fn value_to_string(value: &Value) -> String {
    let type_name = match value {
        Value::Str(_) => "Str",
        Value::Int(_) => "Int",
        Value::Double(_) => "Double",
        Value::Bool(_) => "Bool",
        Value::Bytes(_) => "Bytes",
        Value::Map(_) => "Map",
        Value::Slice(_) => "Slice",
    };
    format!("{type_name}({})", value.as_string())
}

/// Renders the Resource → Scope → Span tree with indented attributes.
pub fn marshal_traces(traces: &Traces) -> String {
    let mut buf = DataBuffer::default();
    for (i, resource_spans) in traces.resource_spans.iter().enumerate() {
        buf.log_entry(&format!("ResourceSpans #{i}"));
        buf.log_attributes("Resource attributes", &resource_spans.resource.attributes);
        for (j, scope_spans) in resource_spans.scope_spans.iter().enumerate() {
            buf.log_entry(&format!("ScopeSpans #{j}"));
            buf.log_entry(&format!(
                "InstrumentationScope {} {}",
                scope_spans.scope.name, scope_spans.scope.version
            ));
            buf.log_attributes(
                "InstrumentationScope attributes",
                &scope_spans.scope.attributes,
            );
            for (k, span) in scope_spans.spans.iter().enumerate() {
                buf.log_entry(&format!("Span #{k}"));
                buf.log_attr("Trace ID", &span.trace_id.to_string());
                buf.log_attr("Parent ID", &span.parent_span_id.to_string());
                buf.log_attr("ID", &span.span_id.to_string());
                buf.log_attr("Name", &span.name);
                buf.log_attr("Kind", span.kind.as_str());
                buf.log_attr(
                    "Start time",
                    &datetime_from_nanos(span.start_unix_nano).to_string(),
                );
                buf.log_attr(
                    "End time",
                    &datetime_from_nanos(span.end_unix_nano).to_string(),
                );
                buf.log_attr("Status code", span.status.as_str());
                buf.log_attr("Status message", &span.status_message);
                buf.log_attributes("Attributes", &span.attributes);
            }
        }
    }
    buf.buf
}

#[cfg(test)]
mod tests {
    use super::*;
    use telemetry_model::{
        Resource, ResourceSpans, ScopeSpans, Span, SpanId, SpanKind, StatusCode, TraceId,
    };

    #[test]
    fn test_marshal_renders_span_tree() {
        let mut span = Span {
            trace_id: TraceId::from_hex("abcdef0123456789ffff000000000000"),
            span_id: SpanId::from_hex("1111111111111111"),
            name: "Event".into(),
            kind: SpanKind::Client,
            status: StatusCode::Error,
            ..Span::default()
        };
        span.attributes
            .insert("level".into(), Value::Str("error".into()));

        let mut resource = Resource::default();
        resource
            .attributes
            .insert("service.name".into(), Value::Str("shop-ui".into()));

        let traces = Traces {
            resource_spans: vec![ResourceSpans {
                resource,
                scope_spans: vec![ScopeSpans {
                    scope: Default::default(),
                    spans: vec![span],
                }],
            }],
        };

        let rendered = marshal_traces(&traces);
        assert!(rendered.contains("ResourceSpans #0"));
        assert!(rendered.contains("Resource attributes:"));
        assert!(rendered.contains("-> service.name: Str(shop-ui)"));
        assert!(rendered.contains("Span #0"));
        assert!(rendered.contains("abcdef0123456789ffff000000000000"));
        assert!(rendered.contains("Status code     : Error"));
        assert!(rendered.contains("-> level: Str(error)"));
    }

    #[test]
    fn test_empty_attribute_maps_are_omitted() {
        let traces = Traces {
            resource_spans: vec![ResourceSpans::default()],
        };
        let rendered = marshal_traces(&traces);
        assert!(!rendered.contains("Resource attributes:"));
    }
}
