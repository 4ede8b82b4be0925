//! Sensitive-value redaction for recorded transcripts.
//!
//! Header values and URL query parameters whose names match the sensitive
//! set are replaced with `[REDACTED:<name>]` at record time; originals
//! never reach disk. Query placeholders end up percent-encoded by URL
//! serialization.

use mp_domain::error::{Error, Result};
use std::collections::BTreeMap;

/// Header/query names whose values are secrets.
pub const SENSITIVE_NAMES: &[&str] = &["authorization", "x-api-key", "api_key", "key", "token"];

pub fn is_sensitive(name: &str) -> bool {
    SENSITIVE_NAMES
        .iter()
        .any(|candidate| name.eq_ignore_ascii_case(candidate))
}

/// The value stored in place of a secret.
pub fn placeholder(name: &str) -> String {
    format!("[REDACTED:{name}]")
}

/// Replace every sensitive header value in place.
pub fn sanitize_headers(headers: &mut BTreeMap<String, String>) {
    for (name, value) in headers.iter_mut() {
        if is_sensitive(name) {
            *value = placeholder(name);
        }
    }
}

/// Rewrite a URL, replacing the values of sensitive query parameters.
/// Non-sensitive parameters are preserved (re-encoded by serialization).
pub fn redact_url(url: &str) -> Result<String> {
    let mut parsed = url::Url::parse(url)
        .map_err(|e| Error::Validation(format!("cannot redact malformed URL {url:?}: {e}")))?;
    if parsed.query().is_none() {
        return Ok(url.to_string());
    }
    let pairs: Vec<(String, String)> = parsed
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    if !pairs.iter().any(|(k, _)| is_sensitive(k)) {
        return Ok(url.to_string());
    }
    parsed.query_pairs_mut().clear();
    for (name, value) in pairs {
        let value = if is_sensitive(&name) {
            placeholder(&name)
        } else {
            value
        };
        parsed.query_pairs_mut().append_pair(&name, &value);
    }
    Ok(parsed.to_string())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
