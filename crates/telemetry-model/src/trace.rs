//! Trace containers: resource → scope → span tree.

use std::fmt;

use data_encoding::HEXLOWER_PERMISSIVE;
use tracing::error;

use crate::value::AttributeMap;

/// 16-byte trace identifier. An unparseable hex string yields the zero id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TraceId(pub [u8; 16]);

/// 8-byte span identifier. An unparseable hex string yields the zero id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SpanId(pub [u8; 8]);

impl TraceId {
    pub fn from_hex(s: &str) -> TraceId {
        match decode_fixed::<16>(s) {
            Some(bytes) => TraceId(bytes),
            None => {
                error!("can not decode {s:?} to a 16 byte trace id");
                TraceId::default()
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0 == [0; 16]
    }
}

impl SpanId {
    pub fn from_hex(s: &str) -> SpanId {
        match decode_fixed::<8>(s) {
            Some(bytes) => SpanId(bytes),
            None => {
                error!("can not decode {s:?} to an 8 byte span id");
                SpanId::default()
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0 == [0; 8]
    }
}

fn decode_fixed<const N: usize>(s: &str) -> Option<[u8; N]> {
    let decoded = HEXLOWER_PERMISSIVE.decode(s.as_bytes()).ok()?;
    decoded.try_into().ok()
}

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&data_encoding::HEXLOWER.encode(&self.0))
    }
}

impl fmt::Display for SpanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&data_encoding::HEXLOWER.encode(&self.0))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SpanKind {
    #[default]
    Unspecified,
    Internal,
    Server,
    Client,
    Producer,
    Consumer,
}

impl SpanKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SpanKind::Unspecified => "Unspecified",
            SpanKind::Internal => "Internal",
            SpanKind::Server => "Server",
            SpanKind::Client => "Client",
            SpanKind::Producer => "Producer",
            SpanKind::Consumer => "Consumer",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatusCode {
    #[default]
    Unset,
    Ok,
    Error,
}

impl StatusCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusCode::Unset => "Unset",
            StatusCode::Ok => "Ok",
            StatusCode::Error => "Error",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Span {
    pub trace_id: TraceId,
    pub span_id: SpanId,
    pub parent_span_id: SpanId,
    pub name: String,
    pub kind: SpanKind,
    /// Unix epoch nanoseconds.
    pub start_unix_nano: u64,
    /// Unix epoch nanoseconds.
    pub end_unix_nano: u64,
    pub status: StatusCode,
    pub status_message: String,
    pub attributes: AttributeMap,
}

impl Span {
    pub fn attribute(&self, key: &str) -> Option<&crate::value::Value> {
        self.attributes.get(key)
    }

    /// String form of an attribute, or empty when absent.
    pub fn attribute_string(&self, key: &str) -> String {
        self.attributes
            .get(key)
            .map(|v| v.as_string())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default)]
pub struct InstrumentationScope {
    pub name: String,
    pub version: String,
    pub attributes: AttributeMap,
}

#[derive(Debug, Clone, Default)]
pub struct Resource {
    pub attributes: AttributeMap,
}

#[derive(Debug, Clone, Default)]
pub struct ScopeSpans {
    pub scope: InstrumentationScope,
    pub spans: Vec<Span>,
}

#[derive(Debug, Clone, Default)]
pub struct ResourceSpans {
    pub resource: Resource,
    pub scope_spans: Vec<ScopeSpans>,
}

/// A batch of trace data as handed between pipeline components.
#[derive(Debug, Clone, Default)]
pub struct Traces {
    pub resource_spans: Vec<ResourceSpans>,
}

impl Traces {
    pub fn new() -> Traces {
        Traces::default()
    }

    pub fn span_count(&self) -> usize {
        self.resource_spans
            .iter()
            .flat_map(|rs| rs.scope_spans.iter())
            .map(|ss| ss.spans.len())
            .sum()
    }

    pub fn iter_spans(&self) -> impl Iterator<Item = &Span> {
        self.resource_spans
            .iter()
            .flat_map(|rs| rs.scope_spans.iter())
            .flat_map(|ss| ss.spans.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trace_id_round_trip() {
        let id = TraceId::from_hex("abcdef0123456789ffff000000000000");
        assert!(!id.is_empty());
        assert_eq!(id.to_string(), "abcdef0123456789ffff000000000000");
    }

    #[test]
    fn test_span_id_round_trip() {
        let id = SpanId::from_hex("1111111111111111");
        assert_eq!(id.to_string(), "1111111111111111");
    }

    #[test]
    fn test_wrong_length_yields_zero_id() {
        assert!(TraceId::from_hex("abcd").is_empty());
        assert!(SpanId::from_hex("abcdef0123456789ffff").is_empty());
        assert!(SpanId::from_hex("not-hex-at-all!!").is_empty());
    }

    #[test]
    fn test_span_count() {
        let mut traces = Traces::new();
        traces.resource_spans.push(ResourceSpans {
            resource: Resource::default(),
            scope_spans: vec![ScopeSpans {
                scope: InstrumentationScope::default(),
                spans: vec![Span::default(), Span::default()],
            }],
        });
        assert_eq!(traces.span_count(), 2);
        assert_eq!(traces.iter_spans().count(), 2);
    }
}
