//! Path sanitisation: identifier-like segments are replaced with fixed
//! placeholders so transaction names and URL attributes stay low-cardinality.

use url::Url;

const UUID_REPLACER: &str = "_UUID_";
const NUMBER_REPLACER: &str = "_NUMBER_";
const ID_REPLACER: &str = "_ID_";
const ID_DIGIT_QUANTITY: usize = 4;
const FSM_SCORE_LIMIT: i32 = 8;

/// Sanitises a path or absolute URL. For `http(s)://` inputs only the path
/// is rewritten; scheme and host pass through. Unparseable absolute URLs
/// collapse to `NON_PARSABLE_URL`.
pub fn sanitize_url(url_str: &str) -> String {
    if url_str.starts_with("http://") || url_str.starts_with("https://") {
        let parsed = match Url::parse(url_str) {
            Ok(parsed) => parsed,
            Err(_) => return "NON_PARSABLE_URL".to_string(),
        };
        let host = parsed.host_str().unwrap_or_default();
        let authority = match parsed.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        };
        return format!(
            "{}://{}{}",
            parsed.scheme(),
            authority,
            remove_ids_from_uri(parsed.path())
        );
    }
    remove_ids_from_uri(url_str)
}

/// Replaces identifier-like `/`-separated segments. Rule order is load
/// bearing: UUID shadows number shadows digit-count shadows the FSM.
pub fn remove_ids_from_uri(uri: &str) -> String {
    uri.split('/')
        .map(|segment| {
            if is_uuid(segment) {
                UUID_REPLACER
            } else if is_number(segment) {
                NUMBER_REPLACER
            } else if is_id(segment, ID_DIGIT_QUANTITY) {
                ID_REPLACER
            } else if is_id_fsm(segment, FSM_SCORE_LIMIT) {
                ID_REPLACER
            } else {
                segment
            }
        })
        .collect::<Vec<&str>>()
        .join("/")
}

fn is_uuid(s: &str) -> bool {
    let b = s.as_bytes();
    b.len() == 36 && b[8] == b'-' && b[13] == b'-' && b[18] == b'-' && b[23] == b'-'
}

fn is_number(s: &str) -> bool {
    let s = s.strip_prefix(['-', '+']).unwrap_or(s);
    !s.is_empty() && s.bytes().all(|c| c.is_ascii_digit())
}

fn is_id(s: &str, digit_quantity: usize) -> bool {
    s.chars().filter(|c| c.is_ascii_digit()).count() >= digit_quantity
}

#[derive(Clone, Copy, PartialEq)]
enum CharClass {
    Start,
    LowerCase,
    UpperCase,
    Digit,
    Delimiter,
    Other,
}

/// Scoring state machine that flags mixed-class tokens as identifiers.
/// Class transitions accrue points; pure alphabetic words score low and a
/// token with no digits or symbols gets a flat penalty at the end.
fn is_id_fsm(s: &str, limit: i32) -> bool {
    use CharClass::*;

    let mut state = Start;
    let mut counter: i32 = 0;
    let mut digits_and_other_counter = 0;
    for c in s.chars() {
        if c.is_ascii_lowercase() {
            if state == LowerCase {
                continue;
            }
            if state == UpperCase {
                counter += 1;
            } else if state == Digit || state == Other {
                counter += 2;
            }
            state = LowerCase;
        } else if c.is_ascii_uppercase() {
            if state == LowerCase {
                counter += 1;
            } else if state == Digit || state == Other {
                counter += 2;
            }
            state = UpperCase;
        } else if c.is_ascii_digit() {
            digits_and_other_counter += 1;
            match state {
                UpperCase | LowerCase | Delimiter => counter += 1,
                Digit => {
                    counter += 2;
                    continue;
                }
                Start => counter += 5,
                Other => counter += 3,
            }
            state = Digit;
        } else if c == '-' || c == '_' || c == '.' {
            if state == LowerCase || state == UpperCase {
                state = Delimiter;
                continue;
            }
            match state {
                Digit => counter += 1,
                Start | Other => counter += 3,
                Delimiter => counter += 2,
                _ => {}
            }
            state = Delimiter;
        } else {
            counter += 3;
            digits_and_other_counter += 1;
            state = Other;
        }
    }

    if state == Other || state == Delimiter {
        counter += 1;
    }
    if digits_and_other_counter == 0 {
        counter -= 5;
    }
    let size = s.len();
    if size >= 16 && size % 4 == 0 {
        counter += 1;
    }
    counter >= limit
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uuid_and_number_segments() {
        assert_eq!(
            sanitize_url("/api/v1/users/550e8400-e29b-41d4-a716-446655440000/orders/12345"),
            "/api/v1/users/_UUID_/orders/_NUMBER_"
        );
    }

    #[test]
    fn test_signed_numbers() {
        assert_eq!(remove_ids_from_uri("/a/-42/b/+7"), "/a/_NUMBER_/b/_NUMBER_");
    }

    #[test]
    fn test_digit_count_rule() {
        assert_eq!(remove_ids_from_uri("/doc/ab1c2d3e4f"), "/doc/_ID_");
        // One digit: too few for the digit-count rule, too plain for the FSM.
        assert_eq!(remove_ids_from_uri("/doc/ab1cdef"), "/doc/ab1cdef");
    }

    #[test]
    fn test_fsm_flags_opaque_tokens() {
        // 32 hex chars with mixed letter/digit runs.
        assert!(is_id_fsm("a1b2c3d4e5f6a7b8a1b2c3d4e5f6a7b8", FSM_SCORE_LIMIT));
        assert!(is_id_fsm("dGhpcyBpcyBhIHRlc3Q3", FSM_SCORE_LIMIT));
    }

    #[test]
    fn test_fsm_keeps_ordinary_words() {
        assert!(!is_id_fsm("users", FSM_SCORE_LIMIT));
        assert!(!is_id_fsm("order-items", FSM_SCORE_LIMIT));
        assert!(!is_id_fsm("CamelCaseWord", FSM_SCORE_LIMIT));
        assert_eq!(remove_ids_from_uri("/api/v1/users"), "/api/v1/users");
    }

    #[test]
    fn test_absolute_url_keeps_scheme_and_host() {
        assert_eq!(
            sanitize_url("https://shop.example.com:8443/orders/12345"),
            "https://shop.example.com:8443/orders/_NUMBER_"
        );
    }

    #[test]
    fn test_non_parsable_absolute_url() {
        assert_eq!(sanitize_url("http://["), "NON_PARSABLE_URL");
    }

    #[test]
    fn test_sanitizer_is_idempotent() {
        let inputs = [
            "/api/v1/users/550e8400-e29b-41d4-a716-446655440000/orders/12345",
            "/doc/ab1c2d3e4f",
            "https://example.com/session/a1b2c3d4e5f6a7b8a1b2c3d4e5f6a7b8",
            "/plain/path/with/words",
        ];
        for input in inputs {
            let once = sanitize_url(input);
            assert_eq!(sanitize_url(&once), once, "not idempotent for {input}");
        }
    }
}
