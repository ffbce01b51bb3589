//! Line-oriented envelope decoding.

use thiserror::Error;
use tracing::{debug, info};

use crate::models::{
    EnvelopeHeader, EnvelopeParseResult, EnvelopeType, Event, ItemHeader, SessionEvent,
};

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("unexpected number of lines in the envelope: {0}. Must be 3 or greater")]
    TooFewLines(usize),
    #[error("unparseable envelope header: {0}")]
    Header(serde_json::Error),
    #[error("unparseable item header: {0}")]
    ItemHeader(serde_json::Error),
    #[error("unparseable {item_type} payload: {source}")]
    Payload {
        item_type: String,
        source: serde_json::Error,
    },
    #[error("no useful payload in the envelope")]
    NoUsefulPayload,
}

/// Decodes an envelope body into its first useful item.
///
/// The document is one envelope header line followed by item header/payload
/// line pairs. Scanning stops at the first pair whose header type is
/// `transaction`, `event` or `session`; other item types are skipped.
pub fn parse_envelope(body: &str) -> Result<EnvelopeParseResult, ParseError> {
    debug!("start parsing envelope of {} bytes", body.len());
    let lines: Vec<&str> = body.split('\n').collect();
    if lines.len() < 3 {
        return Err(ParseError::TooFewLines(lines.len()));
    }

    let header: EnvelopeHeader = serde_json::from_str(lines[0]).map_err(ParseError::Header)?;

    let mut type_header = ItemHeader::default();
    let mut envelope_type = EnvelopeType::Unknown;
    let mut events: Vec<Event> = Vec::new();
    let mut session_events: Vec<SessionEvent> = Vec::new();

    let mut i = 1;
    while i + 1 < lines.len() {
        let header_line = lines[i];
        let payload_line = lines[i + 1];
        i += 2;
        if header_line.len() < 2 || payload_line.len() < 2 {
            continue;
        }

        type_header = serde_json::from_str(header_line).map_err(ParseError::ItemHeader)?;
        envelope_type = match type_header.item_type.as_str() {
            "transaction" => EnvelopeType::Transaction,
            "event" => EnvelopeType::Event,
            "session" => EnvelopeType::Session,
            other => {
                info!("received {other:?} item header, skipping this item");
                continue;
            }
        };

        if envelope_type == EnvelopeType::Session {
            let session: SessionEvent =
                serde_json::from_str(payload_line).map_err(|source| ParseError::Payload {
                    item_type: type_header.item_type.clone(),
                    source,
                })?;
            session_events.push(session);
        } else {
            let event: Event =
                serde_json::from_str(payload_line).map_err(|source| ParseError::Payload {
                    item_type: type_header.item_type.clone(),
                    source,
                })?;
            events.push(event);
        }
        break;
    }

    if events.is_empty() && session_events.is_empty() {
        return Err(ParseError::NoUsefulPayload);
    }

    Ok(EnvelopeParseResult {
        type_header,
        header,
        events,
        session_events,
        envelope_type,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const TRANSACTION_ENVELOPE: &str = concat!(
        r#"{"event_id":"aa11bb22cc33dd44ee55ff6677889900","sdk":{"name":"sentry.javascript.browser","version":"7.5.0"}}"#,
        "\n",
        r#"{"type":"transaction"}"#,
        "\n",
        r#"{"transaction":"/checkout","timestamp":1000.25,"start_timestamp":1000.0}"#,
    );

    #[test]
    fn test_too_few_lines() {
        assert!(matches!(
            parse_envelope("{}\n{}"),
            Err(ParseError::TooFewLines(2))
        ));
        assert!(matches!(parse_envelope(""), Err(ParseError::TooFewLines(1))));
    }

    #[test]
    fn test_transaction_envelope() {
        let result = parse_envelope(TRANSACTION_ENVELOPE).unwrap();
        assert_eq!(result.envelope_type, EnvelopeType::Transaction);
        assert_eq!(result.header.event_id, "aa11bb22cc33dd44ee55ff6677889900");
        assert_eq!(result.header.sdk.name, "sentry.javascript.browser");
        assert_eq!(result.events.len(), 1);
        assert_eq!(result.events[0].transaction, "/checkout");
        assert!(result.session_events.is_empty());
    }

    #[test]
    fn test_session_envelope() {
        let body = concat!(
            r#"{"event_id":"00000000000000000000000000000000"}"#,
            "\n",
            r#"{"type":"session"}"#,
            "\n",
            r#"{"status":"exited","sid":"aaaabbbbccccddddeeeeffff00001111","timestamp":"2024-01-01T00:00:00Z"}"#,
        );
        let result = parse_envelope(body).unwrap();
        assert_eq!(result.envelope_type, EnvelopeType::Session);
        assert_eq!(result.session_events.len(), 1);
        assert_eq!(result.session_events[0].status, "exited");
        assert!(result.events.is_empty());
    }

    #[test]
    fn test_first_useful_item_wins() {
        let body = concat!(
            r#"{"event_id":"00000000000000000000000000000000"}"#,
            "\n",
            r#"{"type":"client_report"}"#,
            "\n",
            r#"{"discarded_events":[]}"#,
            "\n",
            r#"{"type":"event"}"#,
            "\n",
            r#"{"message":"first","level":"error"}"#,
            "\n",
            r#"{"type":"event"}"#,
            "\n",
            r#"{"message":"second"}"#,
        );
        let result = parse_envelope(body).unwrap();
        assert_eq!(result.envelope_type, EnvelopeType::Event);
        assert_eq!(result.events.len(), 1);
        assert_eq!(result.events[0].message.as_str(), "first");
    }

    #[test]
    fn test_only_unknown_items() {
        let body = concat!(
            r#"{"event_id":"00000000000000000000000000000000"}"#,
            "\n",
            r#"{"type":"attachment"}"#,
            "\n",
            r#"{"some":"payload"}"#,
        );
        assert!(matches!(
            parse_envelope(body),
            Err(ParseError::NoUsefulPayload)
        ));
    }

    #[test]
    fn test_short_pairs_are_skipped() {
        let body = concat!(
            r#"{"event_id":"00000000000000000000000000000000"}"#,
            "\n",
            "\n",
            "\n",
            r#"{"type":"event"}"#,
            "\n",
            r#"{"message":"found"}"#,
        );
        // Pair (1,2) is blank and skipped; the scan lands on (3,4).
        let result = parse_envelope(body).unwrap();
        assert_eq!(result.events.len(), 1);
        assert_eq!(result.events[0].message.as_str(), "found");
    }

    #[test]
    fn test_bad_envelope_header() {
        let body = "not json\n{\"type\":\"event\"}\n{\"message\":\"x\"}";
        assert!(matches!(parse_envelope(body), Err(ParseError::Header(_))));
    }

    #[test]
    fn test_bad_payload() {
        let body = concat!(
            r#"{"event_id":"00000000000000000000000000000000"}"#,
            "\n",
            r#"{"type":"event"}"#,
            "\n",
            "not json here",
        );
        assert!(matches!(
            parse_envelope(body),
            Err(ParseError::Payload { .. })
        ));
    }
}
