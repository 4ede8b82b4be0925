//! Shared helpers for provider codecs.

use serde_json::Value;

/// Copy the opaque `provider_options` escape hatch into the request body,
/// minus the keys the pipeline itself consumes.
pub(crate) fn merge_provider_options(
    body: &mut Value,
    provider_options: &serde_json::Map<String, Value>,
) {
    for (key, value) in provider_options {
        if key == "api_key" || key == "reasoning_effort" {
            continue;
        }
        body[key.as_str()] = value.clone();
    }
}

/// Render a tool result payload the way vendors expect it: strings as-is,
/// everything else as compact JSON.
pub(crate) fn stringify_output(output: &Value) -> String {
    match output {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn provider_options_merged_except_consumed_keys() {
        let mut body = json!({"model": "m"});
        let mut opts = serde_json::Map::new();
        opts.insert("api_key".into(), json!("sk-secret"));
        opts.insert("reasoning_effort".into(), json!("high"));
        opts.insert("service_tier".into(), json!("flex"));
        merge_provider_options(&mut body, &opts);
        assert!(body.get("api_key").is_none());
        assert!(body.get("reasoning_effort").is_none());
        assert_eq!(body["service_tier"], "flex");
    }

    #[test]
    fn outputs_stringified() {
        assert_eq!(stringify_output(&json!("plain")), "plain");
        assert_eq!(stringify_output(&json!({"c": 21})), "{\"c\":21}");
    }
}
