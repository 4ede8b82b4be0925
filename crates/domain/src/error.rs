//! Shared error taxonomy used across all ModelPort crates.
//!
//! The variant set is closed: callers distinguish failures by kind. The
//! one-line summary stays short; the error value carries the full request
//! and response context for logging.

use serde::{Deserialize, Serialize};

/// HTTP protocol versions a transport pool may negotiate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HttpProtocol {
    Http1,
    Http2,
}

/// A single schema violation: the offending path and what went wrong.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaViolation {
    /// Dotted path to the offending field (e.g. `"age"`, `"tags[2]"`).
    pub path: String,
    pub message: String,
}

impl SchemaViolation {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Shared error type for every ModelPort operation.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    /// Network, TLS, or name-resolution failure.
    #[error("transport: {0}")]
    Transport(String),

    /// Malformed response where well-formed JSON or SSE was expected.
    #[error("protocol: {0}")]
    Protocol(String),

    /// A non-2xx response from the vendor API.
    #[error("API error {status}: {reason}")]
    ApiRequest {
        status: u16,
        reason: String,
        request_body: Option<String>,
        response_body: Option<String>,
    },

    /// Invalid model spec, message, schema, or option bag.
    #[error("validation: {0}")]
    Validation(String),

    /// A generated object failed schema validation.
    #[error("schema validation failed: {}", summarize_violations(.0))]
    SchemaValidation(Vec<SchemaViolation>),

    /// Missing or rejected credentials.
    #[error("auth: {0}")]
    Auth(String),

    #[error("cancelled")]
    Cancelled,

    #[error("timeout: {0}")]
    Timeout(String),

    /// Request body too large for an HTTP/2-enabled connection pool.
    #[error("request body of {size} bytes exceeds the 65535-byte HTTP/2 margin; use an HTTP/1-only pool for large bodies")]
    Http2BodyTooLarge {
        size: usize,
        protocols: Vec<HttpProtocol>,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Protocol(format!("JSON: {e}"))
    }
}

impl Error {
    /// Build an [`Error::ApiRequest`] from a non-2xx response, extracting a
    /// human-readable reason from the first matching vendor error field and
    /// falling back to a per-status default.
    pub fn api_request(
        status: u16,
        request_body: Option<String>,
        response_body: Option<String>,
    ) -> Self {
        let reason = response_body
            .as_deref()
            .and_then(extract_api_reason)
            .unwrap_or_else(|| default_status_reason(status));
        Error::ApiRequest {
            status,
            reason,
            request_body,
            response_body,
        }
    }

    /// Whether the automatic retry policy may re-dispatch after this error.
    /// Transport failures and 5xx responses are retriable; 4xx never is.
    pub fn is_retriable(&self) -> bool {
        match self {
            Error::Transport(_) => true,
            Error::ApiRequest { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// HTTP status carried by this error, when it came from a response.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::ApiRequest { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Extract a reason from a vendor error body. Checked in order:
/// `error.message`, `error` (string), `message`, `detail`, `details`,
/// `error_description`.
fn extract_api_reason(body: &str) -> Option<String> {
    let v: serde_json::Value = serde_json::from_str(body).ok()?;

    if let Some(msg) = v
        .get("error")
        .and_then(|e| e.get("message"))
        .and_then(|m| m.as_str())
    {
        return Some(msg.to_string());
    }
    if let Some(msg) = v.get("error").and_then(|e| e.as_str()) {
        return Some(msg.to_string());
    }
    for key in ["message", "detail", "details", "error_description"] {
        if let Some(msg) = v.get(key).and_then(|m| m.as_str()) {
            return Some(msg.to_string());
        }
    }
    None
}

fn default_status_reason(status: u16) -> String {
    match status {
        400 => "Bad Request - the request was malformed or invalid".into(),
        401 => "Unauthorized - check your API credentials".into(),
        403 => "Forbidden - the credentials lack access to this resource".into(),
        404 => "Not Found - unknown endpoint or model".into(),
        429 => "Rate Limited - too many requests, slow down".into(),
        500..=599 => "Server Error - the provider failed to process the request".into(),
        other => format!("HTTP Error {other}"),
    }
}

fn summarize_violations(violations: &[SchemaViolation]) -> String {
    let mut parts: Vec<String> = violations
        .iter()
        .take(3)
        .map(|v| format!("{}: {}", v.path, v.message))
        .collect();
    if violations.len() > 3 {
        parts.push(format!("(+{} more)", violations.len() - 3));
    }
    parts.join("; ")
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reason_from_nested_error_message() {
        let body = r#"{"error":{"message":"model overloaded","type":"overloaded_error"}}"#;
        let err = Error::api_request(529, None, Some(body.into()));
        match err {
            Error::ApiRequest { reason, .. } => assert_eq!(reason, "model overloaded"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn reason_from_error_string() {
        let body = r#"{"error":"invalid key"}"#;
        let err = Error::api_request(401, None, Some(body.into()));
        match err {
            Error::ApiRequest { reason, .. } => assert_eq!(reason, "invalid key"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn reason_field_order() {
        // `error.message` wins over a top-level `message`.
        let body = r#"{"message":"outer","error":{"message":"inner"}}"#;
        let err = Error::api_request(400, None, Some(body.into()));
        match err {
            Error::ApiRequest { reason, .. } => assert_eq!(reason, "inner"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn reason_from_detail() {
        let body = r#"{"detail":"quota exceeded"}"#;
        let err = Error::api_request(429, None, Some(body.into()));
        match err {
            Error::ApiRequest { reason, .. } => assert_eq!(reason, "quota exceeded"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn fallback_per_status() {
        for (status, needle) in [
            (400, "Bad Request"),
            (401, "Unauthorized"),
            (403, "Forbidden"),
            (404, "Not Found"),
            (429, "Rate Limited"),
            (503, "Server Error"),
        ] {
            let err = Error::api_request(status, None, Some("not json".into()));
            match err {
                Error::ApiRequest { reason, .. } => {
                    assert!(reason.contains(needle), "{status}: {reason}")
                }
                other => panic!("unexpected: {other:?}"),
            }
        }
    }

    #[test]
    fn fallback_unknown_status() {
        let err = Error::api_request(418, None, None);
        match err {
            Error::ApiRequest { reason, .. } => assert_eq!(reason, "HTTP Error 418"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn retriable_classification() {
        assert!(Error::Transport("connection reset".into()).is_retriable());
        assert!(Error::api_request(500, None, None).is_retriable());
        assert!(Error::api_request(503, None, None).is_retriable());
        assert!(!Error::api_request(400, None, None).is_retriable());
        assert!(!Error::api_request(429, None, None).is_retriable());
        assert!(!Error::Cancelled.is_retriable());
        assert!(!Error::Validation("bad".into()).is_retriable());
    }

    #[test]
    fn summary_stays_short() {
        let err = Error::api_request(500, Some("x".repeat(10_000)), Some("not json".into()));
        assert!(err.to_string().len() <= 120);
    }

    #[test]
    fn json_errors_map_to_protocol() {
        let e = serde_json::from_str::<serde_json::Value>("{nope").unwrap_err();
        assert!(matches!(Error::from(e), Error::Protocol(_)));
    }
}
