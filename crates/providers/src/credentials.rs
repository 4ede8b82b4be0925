//! API key resolution.
//!
//! Lookup order: explicit `provider_options["api_key"]`, then the OS
//! keychain (service `"modelport"`, account = provider id), then the env
//! vars the catalog declares for the provider, in order. Anything else is
//! an auth error.

use mp_catalog::ProviderInfo;
use mp_domain::error::{Error, Result};
use serde_json::Value;

/// Keychain service name under which ModelPort keys are stored.
pub const KEYRING_SERVICE: &str = "modelport";

/// Resolve the API key for a provider.
pub fn resolve_api_key(
    info: &ProviderInfo,
    provider_options: &serde_json::Map<String, Value>,
) -> Result<String> {
    // 1. Explicit option wins.
    if let Some(key) = provider_options.get("api_key").and_then(|v| v.as_str()) {
        if !key.is_empty() {
            return Ok(key.to_string());
        }
    }

    // 2. OS keychain. Headless systems without a keychain daemon fall
    //    through to env vars.
    match resolve_from_keychain(KEYRING_SERVICE, &info.id) {
        Ok(secret) => return Ok(secret),
        Err(e) => {
            tracing::debug!(
                provider = %info.id,
                error = %e,
                "keychain lookup failed, falling through to env"
            );
        }
    }

    // 3. Catalog-declared env vars, in order.
    for var in &info.env {
        if let Ok(val) = std::env::var(var) {
            if !val.is_empty() {
                return Ok(val);
            }
        }
    }

    Err(Error::Auth(format!(
        "no API key for provider {:?}: pass provider_options.api_key, store one under \
         keychain service {KEYRING_SERVICE:?}, or set {}",
        info.id,
        if info.env.is_empty() {
            "an API key env var".to_string()
        } else {
            info.env.join(" or ")
        }
    )))
}

/// Try to read a secret from the OS keychain.
///
/// Uses the `keyring` crate which wraps platform-native credential stores
/// (macOS Keychain, Windows Credential Manager, Linux Secret Service).
pub fn resolve_from_keychain(service: &str, account: &str) -> Result<String> {
    let entry = keyring::Entry::new(service, account)
        .map_err(|e| Error::Auth(format!("keyring entry creation failed: {e}")))?;
    entry
        .get_password()
        .map_err(|e| Error::Auth(format!("keyring get_password failed: {e}")))
}

/// Mask substrings that look like API keys or bearer tokens in an error
/// message, so raw secrets never reach logs.
pub fn mask_secrets(msg: &str) -> String {
    let mut result = msg.to_string();
    for word in msg.split(|c: char| c.is_whitespace() || c == '\'' || c == '"' || c == ',') {
        let trimmed = word.trim();
        if trimmed.len() >= 20
            && trimmed
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            let masked = format!("{}...{}", &trimmed[..4], &trimmed[trimmed.len() - 4..]);
            result = result.replace(trimmed, &masked);
        }
    }
    result
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;

    fn provider_with_env(env: &[&str]) -> ProviderInfo {
        ProviderInfo {
            id: "testprov".into(),
            name: "Test".into(),
            base_url: "https://api.test.dev".into(),
            env: env.iter().map(|s| s.to_string()).collect(),
            doc: None,
            compat: None,
        }
    }

    #[test]
    fn explicit_option_wins() {
        let mut opts = serde_json::Map::new();
        opts.insert("api_key".into(), Value::String("sk-explicit".into()));
        std::env::set_var("MP_CRED_TEST_WINS", "sk-env");
        let key = resolve_api_key(&provider_with_env(&["MP_CRED_TEST_WINS"]), &opts).unwrap();
        assert_eq!(key, "sk-explicit");
        std::env::remove_var("MP_CRED_TEST_WINS");
    }

    #[test]
    fn env_vars_checked_in_order() {
        std::env::remove_var("MP_CRED_TEST_FIRST");
        std::env::set_var("MP_CRED_TEST_SECOND", "sk-second");
        let key = resolve_api_key(
            &provider_with_env(&["MP_CRED_TEST_FIRST", "MP_CRED_TEST_SECOND"]),
            &serde_json::Map::new(),
        )
        .unwrap();
        assert_eq!(key, "sk-second");
        std::env::remove_var("MP_CRED_TEST_SECOND");
    }

    #[test]
    fn missing_everywhere_is_auth_error() {
        let err = resolve_api_key(
            &provider_with_env(&["MP_CRED_TEST_UNSET_9431"]),
            &serde_json::Map::new(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::Auth(_)));
        assert!(err.to_string().contains("MP_CRED_TEST_UNSET_9431"));
    }

    #[test]
    fn empty_explicit_option_ignored() {
        let mut opts = serde_json::Map::new();
        opts.insert("api_key".into(), Value::String(String::new()));
        std::env::set_var("MP_CRED_TEST_EMPTY", "sk-env");
        let key = resolve_api_key(&provider_with_env(&["MP_CRED_TEST_EMPTY"]), &opts).unwrap();
        assert_eq!(key, "sk-env");
        std::env::remove_var("MP_CRED_TEST_EMPTY");
    }

    #[test]
    fn mask_secrets_hides_long_tokens() {
        let msg = "request failed with key sk-ant-REDACTED attached";
        let masked = mask_secrets(msg);
        assert!(!masked.contains("AbCdEfGhIjKlMnOpQrStUvWx"));
        assert!(masked.contains("..."));
    }

    #[test]
    fn mask_secrets_leaves_short_words() {
        let msg = "connection refused to api.test.dev:443";
        assert_eq!(mask_secrets(msg), msg);
    }
}
