//! Typed model of the envelope wire format.
//!
//! Envelope payloads come from browser SDKs and are only loosely schema'd,
//! so every field is optional and free-text fields tolerate any JSON value.

use std::collections::BTreeMap;
use std::fmt;

use serde::de::{Deserializer, Error as DeError};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Numeric envelope type tag carried on every synthesised root span as the
/// `sentry.envelop.type.int` attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnvelopeType {
    #[default]
    Unknown,
    Transaction,
    Event,
    Session,
}

impl EnvelopeType {
    pub fn as_i64(self) -> i64 {
        match self {
            EnvelopeType::Unknown => 0,
            EnvelopeType::Transaction => 1,
            EnvelopeType::Event => 2,
            EnvelopeType::Session => 3,
        }
    }
}

/// Free-text field that tolerates any JSON value. Strings pass through,
/// everything else keeps its compact JSON rendering.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LenientString(pub String);

impl LenientString {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LenientString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for LenientString {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = JsonValue::deserialize(deserializer)?;
        Ok(LenientString(json_value_to_string(&value)))
    }
}

/// String form of an arbitrary JSON value: bare strings, rendered scalars,
/// compact JSON for compound values, empty for null.
pub fn json_value_to_string(value: &JsonValue) -> String {
    match value {
        JsonValue::Null => String::new(),
        JsonValue::String(s) => s.clone(),
        JsonValue::Bool(b) => b.to_string(),
        JsonValue::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct SdkInfo {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: String,
}

/// First line of the envelope document.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EnvelopeHeader {
    #[serde(default)]
    pub event_id: String,
    #[serde(default)]
    pub sdk: SdkInfo,
}

/// Header line preceding each item payload.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ItemHeader {
    #[serde(default, rename = "type")]
    pub item_type: String,
    #[serde(default)]
    pub length: u64,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct Measurement {
    #[serde(default)]
    pub value: f64,
    #[serde(default)]
    pub unit: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Breadcrumb {
    #[serde(default, rename = "type")]
    pub breadcrumb_type: String,
    #[serde(default)]
    pub level: String,
    #[serde(default)]
    pub message: LenientString,
    #[serde(default)]
    pub data: BTreeMap<String, JsonValue>,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub timestamp: f64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventRequest {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventUser {
    #[serde(default)]
    pub id: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct StacktraceFrame {
    #[serde(default)]
    pub filename: String,
    #[serde(default)]
    pub function: String,
    #[serde(default)]
    pub in_app: bool,
    #[serde(default)]
    pub lineno: i64,
    #[serde(default)]
    pub colno: i64,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Stacktrace {
    #[serde(default)]
    pub frames: Vec<StacktraceFrame>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ExceptionMechanism {
    #[serde(default, rename = "type")]
    pub mechanism_type: String,
    #[serde(default)]
    pub handled: bool,
    #[serde(default)]
    pub synthetic: bool,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ExceptionValue {
    #[serde(default, rename = "type")]
    pub exception_type: String,
    #[serde(default)]
    pub value: LenientString,
    #[serde(default)]
    pub stacktrace: Stacktrace,
    #[serde(default)]
    pub mechanism: ExceptionMechanism,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct EventException {
    #[serde(default)]
    pub values: Vec<ExceptionValue>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct TraceContext {
    #[serde(default)]
    pub op: String,
    #[serde(default)]
    pub span_id: String,
    #[serde(default)]
    pub trace_id: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ContextErrorConfig {
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default, rename = "baseURL")]
    pub base_url: String,
    #[serde(default)]
    pub method: String,
    #[serde(default)]
    pub url: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SentryXhr {
    #[serde(default)]
    pub method: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub request_headers: LenientString,
    #[serde(default)]
    pub status_code: i64,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ContextErrorRequest {
    #[serde(default, rename = "__sentry_xhr_v3__")]
    pub sentry_xhr_v3: SentryXhr,
    #[serde(default, rename = "setRequestHeader")]
    pub set_request_header: String,
    #[serde(default, rename = "__sentry_xhr_span_id__")]
    pub sentry_xhr_span_id: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ContextErrorResponse {
    #[serde(default)]
    pub data: LenientString,
    #[serde(default)]
    pub status: i64,
    #[serde(default, rename = "statusText")]
    pub status_text: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

/// Error context attached by HTTP client instrumentation (axios style).
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ContextError {
    #[serde(default)]
    pub config: ContextErrorConfig,
    #[serde(default)]
    pub request: ContextErrorRequest,
    #[serde(default)]
    pub response: ContextErrorResponse,
    #[serde(default, rename = "isAxiosError")]
    pub is_axios_error: bool,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub stack: String,
    #[serde(default)]
    pub status: i64,
}

impl ContextError {
    /// The error context is considered present only when it carries text.
    pub fn has_content(&self) -> bool {
        !self.message.is_empty() || !self.name.is_empty() || !self.stack.is_empty()
    }
}

/// Event contexts: the `trace` and `Error` entries are decoded into typed
/// form, and the raw map is retained for the configurable context-attribute
/// projection.
#[derive(Debug, Clone, Default)]
pub struct EventContexts {
    pub trace: TraceContext,
    pub error: ContextError,
    pub as_map: BTreeMap<String, JsonValue>,
}

impl<'de> Deserialize<'de> for EventContexts {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw: BTreeMap<String, JsonValue> = BTreeMap::deserialize(deserializer)?;
        let trace = raw
            .get("trace")
            .cloned()
            .map(serde_json::from_value)
            .transpose()
            .map_err(DeError::custom)?
            .unwrap_or_default();
        let error = raw
            .get("Error")
            .or_else(|| raw.get("error"))
            .cloned()
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default();
        Ok(EventContexts {
            trace,
            error,
            as_map: raw,
        })
    }
}

/// Child span reported inside a transaction payload.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventSpan {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub span_id: String,
    #[serde(default)]
    pub parent_span_id: String,
    #[serde(default)]
    pub origin: String,
    #[serde(default)]
    pub op: String,
    #[serde(default)]
    pub tags: BTreeMap<String, JsonValue>,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub data: BTreeMap<String, JsonValue>,
    #[serde(default)]
    pub trace_id: String,
    #[serde(default)]
    pub timestamp: f64,
    #[serde(default)]
    pub start_timestamp: f64,
}

/// Unified record for `transaction` and `event` items.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Event {
    #[serde(default)]
    pub message: LenientString,
    #[serde(default)]
    pub level: String,
    #[serde(default)]
    pub event_id: String,
    #[serde(default)]
    pub platform: String,
    #[serde(default)]
    pub dist: String,
    #[serde(default)]
    pub timestamp: f64,
    #[serde(default)]
    pub start_timestamp: f64,
    #[serde(default)]
    pub environment: String,
    #[serde(default)]
    pub release: String,
    #[serde(default)]
    pub transaction: String,
    #[serde(default)]
    pub measurements: BTreeMap<String, Measurement>,
    #[serde(default)]
    pub breadcrumbs: Vec<Breadcrumb>,
    #[serde(default)]
    pub user: EventUser,
    #[serde(default)]
    pub contexts: EventContexts,
    #[serde(default)]
    pub tags: BTreeMap<String, JsonValue>,
    #[serde(default)]
    pub spans: Vec<EventSpan>,
    #[serde(default)]
    pub request: EventRequest,
    #[serde(default)]
    pub sdk: SdkInfo,
    #[serde(default)]
    pub exception: EventException,
    #[serde(default)]
    pub logger: String,
}

/// Record for `session` items.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SessionEvent {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub sid: String,
    #[serde(default)]
    pub timestamp: String,
}

/// Outcome of parsing one envelope body.
#[derive(Debug, Clone, Default)]
pub struct EnvelopeParseResult {
    pub type_header: ItemHeader,
    pub header: EnvelopeHeader,
    pub events: Vec<Event>,
    pub session_events: Vec<SessionEvent>,
    pub envelope_type: EnvelopeType,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lenient_string_accepts_non_strings() {
        let s: LenientString = serde_json::from_str("\"plain\"").unwrap();
        assert_eq!(s.as_str(), "plain");
        let s: LenientString = serde_json::from_str("42").unwrap();
        assert_eq!(s.as_str(), "42");
        let s: LenientString = serde_json::from_str(r#"{"nested":true}"#).unwrap();
        assert_eq!(s.as_str(), r#"{"nested":true}"#);
        let s: LenientString = serde_json::from_str("null").unwrap();
        assert!(s.is_empty());
    }

    #[test]
    fn test_event_contexts_keeps_raw_map() {
        let json = r#"{
            "trace": {"op": "pageload", "span_id": "1111111111111111", "trace_id": "abcd"},
            "browser": {"name": "Firefox", "version": "121"},
            "note": "checkout flow"
        }"#;
        let contexts: EventContexts = serde_json::from_str(json).unwrap();
        assert_eq!(contexts.trace.op, "pageload");
        assert!(contexts.as_map.contains_key("browser"));
        assert!(contexts.as_map.contains_key("note"));
    }

    #[test]
    fn test_context_error_case_insensitive_key() {
        let json = r#"{"Error": {"message": "boom", "isAxiosError": true}}"#;
        let contexts: EventContexts = serde_json::from_str(json).unwrap();
        assert!(contexts.error.has_content());
        assert!(contexts.error.is_axios_error);

        let json = r#"{"error": {"name": "TypeError"}}"#;
        let contexts: EventContexts = serde_json::from_str(json).unwrap();
        assert!(contexts.error.has_content());
    }

    #[test]
    fn test_event_tolerates_minimal_payload() {
        let event: Event = serde_json::from_str("{}").unwrap();
        assert!(event.event_id.is_empty());
        assert_eq!(event.timestamp, 0.0);
        assert!(event.spans.is_empty());
    }

    #[test]
    fn test_envelope_type_ints() {
        assert_eq!(EnvelopeType::Transaction.as_i64(), 1);
        assert_eq!(EnvelopeType::Event.as_i64(), 2);
        assert_eq!(EnvelopeType::Session.as_i64(), 3);
    }
}
