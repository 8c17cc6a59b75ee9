//! Metadata sanitization for audit events.
//!
//! Key material, proofs and large payloads never reach the audit trail.

use serde_json::{Map, Value};

/// Keys whose values are replaced with `[REDACTED]`.
const SENSITIVE_KEYS: &[&str] = &[
    "secret",
    "private",
    "session_key",
    "ticket_key",
    "sessionkey",
    "ticketkey",
    "signature",
    "proof",
    "authenticator",
    "password",
    "token",
];

/// Maximum length for string values before truncation.
const MAX_STRING_LENGTH: usize = 256;

/// Keys whose values are truncated if too long.
const TRUNCATABLE_KEYS: &[&str] = &["payload", "data", "body", "encrypted", "ciphertext", "public_key"];

/// Sanitize event metadata.
///
/// Sensitive keys are redacted (matched case-insensitively as substrings),
/// long values under payload-like keys are truncated, and nested objects and
/// arrays are processed recursively.
pub fn sanitize_metadata(metadata: &Map<String, Value>) -> Map<String, Value> {
    sanitize_map(metadata)
}

fn sanitize_map(map: &Map<String, Value>) -> Map<String, Value> {
    let mut sanitized = Map::new();
    for (key, val) in map {
        let key_lower = key.to_lowercase();

        if SENSITIVE_KEYS.iter().any(|&s| key_lower.contains(s)) {
            sanitized.insert(key.clone(), Value::String("[REDACTED]".to_string()));
            continue;
        }

        let truncatable = TRUNCATABLE_KEYS.iter().any(|&s| key_lower.contains(s));
        sanitized.insert(key.clone(), sanitize_value(val, truncatable));
    }
    sanitized
}

fn sanitize_value(value: &Value, truncatable: bool) -> Value {
    match value {
        Value::Object(map) => Value::Object(sanitize_map(map)),
        Value::Array(arr) => Value::Array(
            arr.iter()
                .map(|v| sanitize_value(v, truncatable))
                .collect(),
        ),
        Value::String(s) if truncatable && s.len() > MAX_STRING_LENGTH => {
            Value::String(format!("[TRUNCATED - {} bytes]", s.len()))
        }
        _ => value.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(m) => m,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_key_material_redacted() {
        let sanitized = sanitize_metadata(&map(json!({
            "identity_id": "client1",
            "session_key": "c2VjcmV0",
            "encryptedSessionKey": "AAAA",
            "signature": "abcd"
        })));
        assert_eq!(sanitized["identity_id"], "client1");
        assert_eq!(sanitized["session_key"], "[REDACTED]");
        assert_eq!(sanitized["encryptedSessionKey"], "[REDACTED]");
        assert_eq!(sanitized["signature"], "[REDACTED]");
    }

    #[test]
    fn test_nested_proof_redacted() {
        let sanitized = sanitize_metadata(&map(json!({
            "request": { "service_id": "iot1", "authenticator": "mac" }
        })));
        assert_eq!(sanitized["request"]["service_id"], "iot1");
        assert_eq!(sanitized["request"]["authenticator"], "[REDACTED]");
    }

    #[test]
    fn test_large_payload_truncated() {
        let sanitized = sanitize_metadata(&map(json!({
            "payload": "x".repeat(1000),
            "request_type": "read"
        })));
        assert_eq!(sanitized["payload"], "[TRUNCATED - 1000 bytes]");
        assert_eq!(sanitized["request_type"], "read");
    }

    #[test]
    fn test_small_payload_kept() {
        let sanitized = sanitize_metadata(&map(json!({ "payload": "status?" })));
        assert_eq!(sanitized["payload"], "status?");
    }

    #[test]
    fn test_arrays_processed() {
        let sanitized = sanitize_metadata(&map(json!({
            "devices": [{"id": "d1", "private_key": "k"}]
        })));
        assert_eq!(sanitized["devices"][0]["id"], "d1");
        assert_eq!(sanitized["devices"][0]["private_key"], "[REDACTED]");
    }

    #[test]
    fn test_case_insensitive() {
        let sanitized = sanitize_metadata(&map(json!({ "SESSION_KEY": "k", "Proof": "p" })));
        assert_eq!(sanitized["SESSION_KEY"], "[REDACTED]");
        assert_eq!(sanitized["Proof"], "[REDACTED]");
    }
}
