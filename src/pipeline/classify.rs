//! Failure classification: map transport failures and HTTP error responses
//! onto the [`ClientError`] taxonomy and decide whether to retry.
//!
//! Everything here is a pure function of its inputs so the same
//! `(status, body)` always yields the same verdict.

use crate::error::{ClientError, ErrorDetails, ErrorKind};
use crate::pipeline::transport::TransportError;
use serde_json::Value;
use std::time::Duration;

/// HTTP statuses worth another attempt: rate limiting and transient
/// server/gateway failures.
pub const RETRYABLE_STATUSES: &[u16] = &[429, 500, 502, 503, 504];

/// A classified failure plus the classifier's opinion on retrying it.
///
/// `retryable` ignores the retry budget; the retry controller applies that.
#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    pub error: ClientError,
    pub retryable: bool,
}

impl Verdict {
    pub fn fatal(error: ClientError) -> Self {
        Self { error, retryable: false }
    }
}

// ── Transport failures ───────────────────────────────────────────────────

/// Whether a transport failure is network-related and thus worth retrying.
///
/// Unknown failures are not retried.
pub fn is_retryable_failure(failure: &TransportError) -> bool {
    matches!(
        failure,
        TransportError::Connect(_) | TransportError::Dns(_) | TransportError::Timeout | TransportError::Io(_)
    )
}

/// Turn a transport failure into a taxonomy error tagged with the request URL.
pub fn classify_transport(failure: &TransportError, url: &str, timeout: Duration) -> Verdict {
    let (kind, message) = match failure {
        TransportError::Timeout => (
            ErrorKind::Timeout,
            format!("Request timed out after {}s", format_secs(timeout)),
        ),
        TransportError::Connect(_) | TransportError::Dns(_) | TransportError::Io(_) => {
            (ErrorKind::Network, format!("Network error: {failure}"))
        }
        TransportError::Closed => (ErrorKind::Network, "Client is closed".to_string()),
        TransportError::Decode(_) | TransportError::Other(_) => {
            (ErrorKind::Conversion, format!("Unexpected error: {failure}"))
        }
    };
    Verdict {
        error: ClientError::new(kind, message).with_detail("url", url),
        retryable: is_retryable_failure(failure),
    }
}

/// `30` for whole seconds, `0.5` otherwise.
fn format_secs(d: Duration) -> String {
    if d.subsec_nanos() == 0 {
        d.as_secs().to_string()
    } else {
        format!("{}", d.as_secs_f64())
    }
}

// ── HTTP error responses ─────────────────────────────────────────────────

/// Message and details extracted from an error body.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorPayload {
    pub message: String,
    pub details: ErrorDetails,
    /// `true` when the body held a well-formed `error` object.
    pub from_envelope: bool,
}

/// Extract `error.message` / `error.details`, falling back to the raw text.
pub fn parse_error_body(status: u16, body: &str) -> ErrorPayload {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    match parsed.as_ref().and_then(|v| v.get("error")) {
        Some(Value::Object(error)) => ErrorPayload {
            message: error
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| format!("HTTP {status}")),
            details: details_from(error.get("details")),
            from_envelope: true,
        },
        _ => ErrorPayload {
            message: format!("HTTP {status}: {body}"),
            details: ErrorDetails::new(),
            from_envelope: false,
        },
    }
}

/// Server details are kept verbatim; non-object values are wrapped.
pub(crate) fn details_from(value: Option<&Value>) -> ErrorDetails {
    match value {
        None | Some(Value::Null) => ErrorDetails::new(),
        Some(Value::Object(map)) => map.clone(),
        Some(other) => {
            let mut wrapped = ErrorDetails::new();
            wrapped.insert("value".to_string(), other.clone());
            wrapped
        }
    }
}

/// Map an HTTP error response to a taxonomy error and retry verdict.
///
/// | status | kind | retry |
/// |---|---|---|
/// | 400 | InvalidInput | no |
/// | 408 | Timeout | no |
/// | 413 | InvalidInput ("File too large") | no |
/// | 415 | InvalidInput ("Unsupported format") | no |
/// | 429, 500, 502–504 | Conversion ("Server error") | yes |
/// | other | Conversion ("Server error") | no |
///
/// When the body carries no usable `error` object the fallback text
/// `HTTP {status}: {body}` is used as-is, without a prefix.
pub fn classify_status(status: u16, body: &str) -> Verdict {
    let ErrorPayload {
        message,
        details,
        from_envelope,
    } = parse_error_body(status, body);

    let (kind, prefix) = match status {
        400 => (ErrorKind::InvalidInput, None),
        408 => (ErrorKind::Timeout, None),
        413 => (ErrorKind::InvalidInput, Some("File too large".to_string())),
        415 => (ErrorKind::InvalidInput, Some("Unsupported format".to_string())),
        _ => (ErrorKind::Conversion, Some(format!("Server error ({status})"))),
    };
    let message = match prefix {
        Some(prefix) if from_envelope => format!("{prefix}: {message}"),
        _ => message,
    };

    Verdict {
        error: ClientError::with_details(kind, message, details),
        retryable: RETRYABLE_STATUSES.contains(&status),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn envelope(message: &str, details: Value) -> String {
        json!({"error": {"message": message, "details": details}}).to_string()
    }

    #[test]
    fn status_table() {
        let cases: &[(u16, ErrorKind, &str, bool)] = &[
            (400, ErrorKind::InvalidInput, "bad", false),
            (408, ErrorKind::Timeout, "bad", false),
            (413, ErrorKind::InvalidInput, "File too large: bad", false),
            (415, ErrorKind::InvalidInput, "Unsupported format: bad", false),
            (429, ErrorKind::Conversion, "Server error (429): bad", true),
            (500, ErrorKind::Conversion, "Server error (500): bad", true),
            (502, ErrorKind::Conversion, "Server error (502): bad", true),
            (503, ErrorKind::Conversion, "Server error (503): bad", true),
            (504, ErrorKind::Conversion, "Server error (504): bad", true),
            (401, ErrorKind::Conversion, "Server error (401): bad", false),
            (404, ErrorKind::Conversion, "Server error (404): bad", false),
            (501, ErrorKind::Conversion, "Server error (501): bad", false),
        ];
        for &(status, kind, message, retry) in cases {
            let v = classify_status(status, &envelope("bad", json!({})));
            assert_eq!(v.error.kind(), kind, "status {status}");
            assert_eq!(v.error.message(), message, "status {status}");
            assert_eq!(v.retryable, retry, "status {status}");
        }
    }

    #[test]
    fn classification_is_idempotent() {
        let body = envelope("overloaded", json!({"queue": 12}));
        assert_eq!(classify_status(503, &body), classify_status(503, &body));
    }

    #[test]
    fn details_are_preserved_verbatim() {
        let details = json!({"field": "content", "issue": "missing", "nested": {"a": [1, 2]}});
        let v = classify_status(400, &envelope("Invalid request format", details.clone()));
        assert_eq!(Value::Object(v.error.details().clone()), details);
    }

    #[test]
    fn non_json_body_falls_back_to_raw_text() {
        let v = classify_status(502, "<html>Bad Gateway</html>");
        assert_eq!(v.error.kind(), ErrorKind::Conversion);
        assert_eq!(v.error.message(), "HTTP 502: <html>Bad Gateway</html>");
        assert!(v.error.details().is_empty());
        assert!(v.retryable);
    }

    #[test]
    fn malformed_error_key_falls_back() {
        let v = classify_status(400, r#"{"error": "just a string"}"#);
        assert_eq!(v.error.message(), r#"HTTP 400: {"error": "just a string"}"#);
        assert_eq!(v.error.kind(), ErrorKind::InvalidInput);

        let v = classify_status(500, r#"{"detail": "no error key"}"#);
        assert!(v.error.message().starts_with("HTTP 500: "));
    }

    #[test]
    fn missing_message_defaults_to_status() {
        let v = classify_status(413, r#"{"error": {"details": {"limit": 10}}}"#);
        assert_eq!(v.error.message(), "File too large: HTTP 413");
        assert_eq!(v.error.details()["limit"], json!(10));
    }

    #[test]
    fn non_object_details_are_wrapped() {
        let v = classify_status(400, &envelope("x", json!(["a", "b"])));
        assert_eq!(v.error.details()["value"], json!(["a", "b"]));
    }

    #[test]
    fn transport_retry_decisions() {
        assert!(is_retryable_failure(&TransportError::Connect("refused".into())));
        assert!(is_retryable_failure(&TransportError::Dns("nxdomain".into())));
        assert!(is_retryable_failure(&TransportError::Timeout));
        assert!(is_retryable_failure(&TransportError::Io("reset".into())));
        assert!(!is_retryable_failure(&TransportError::Decode("bad gzip".into())));
        assert!(!is_retryable_failure(&TransportError::Other("?".into())));
        assert!(!is_retryable_failure(&TransportError::Closed));

        let url = "http://h/convert";
        let t = Duration::from_secs(1);
        assert!(classify_transport(&TransportError::Connect("refused".into()), url, t).retryable);
        assert!(!classify_transport(&TransportError::Decode("bad gzip".into()), url, t).retryable);
    }

    #[test]
    fn transport_kinds_and_url_detail() {
        let url = "http://h/convert";
        let v = classify_transport(&TransportError::Timeout, url, Duration::from_secs(30));
        assert_eq!(v.error.kind(), ErrorKind::Timeout);
        assert_eq!(v.error.message(), "Request timed out after 30s");
        assert_eq!(v.error.details()["url"], json!(url));

        let v = classify_transport(&TransportError::Connect("refused".into()), url, Duration::from_secs(1));
        assert_eq!(v.error.kind(), ErrorKind::Network);
        assert!(v.error.message().starts_with("Network error: "));

        let v = classify_transport(&TransportError::Decode("x".into()), url, Duration::from_secs(1));
        assert_eq!(v.error.kind(), ErrorKind::Conversion);
        assert!(!v.retryable);
    }

    #[test]
    fn fractional_timeouts_render_precisely() {
        let v = classify_transport(&TransportError::Timeout, "u", Duration::from_millis(500));
        assert_eq!(v.error.message(), "Request timed out after 0.5s");
    }
}
