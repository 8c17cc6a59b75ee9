//! JSON wire encoding.
//!
//! Binary fields travel as standard base64 strings. Messages are bounded in
//! size before they are parsed.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{TicketChainError, ValidationErrorKind};

/// Maximum encoded message size (64 KiB).
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 65_536;

/// Encode a payload as JSON.
pub fn encode<T: Serialize>(payload: &T) -> Result<String, TicketChainError> {
    Ok(serde_json::to_string(payload)?)
}

/// Decode a JSON payload, rejecting messages over `max_size` bytes.
pub fn decode<T: DeserializeOwned>(message: &str, max_size: usize) -> Result<T, TicketChainError> {
    if message.len() > max_size {
        return Err(TicketChainError::validation(
            ValidationErrorKind::PayloadTooLarge {
                size: message.len(),
                max: max_size,
            },
        ));
    }
    Ok(serde_json::from_str(message)?)
}

/// `#[serde(with = "base64_bytes")]` for `Vec<u8>`.
pub mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

/// `#[serde(with = "base64_opt")]` for `Option<Vec<u8>>`.
pub mod base64_opt {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error> {
        match bytes {
            Some(bytes) => serializer.serialize_some(&STANDARD.encode(bytes)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Vec<u8>>, D::Error> {
        match Option::<String>::deserialize(deserializer)? {
            Some(encoded) => STANDARD
                .decode(encoded.as_bytes())
                .map(Some)
                .map_err(serde::de::Error::custom),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Blob {
        #[serde(with = "base64_bytes")]
        data: Vec<u8>,
        #[serde(default, with = "base64_opt", skip_serializing_if = "Option::is_none")]
        extra: Option<Vec<u8>>,
    }

    #[test]
    fn test_binary_fields_are_base64() {
        let blob = Blob {
            data: vec![0, 1, 2, 255],
            extra: None,
        };
        let json = encode(&blob).unwrap();
        assert_eq!(json, r#"{"data":"AAEC/w=="}"#);
        assert_eq!(decode::<Blob>(&json, DEFAULT_MAX_MESSAGE_SIZE).unwrap(), blob);
    }

    #[test]
    fn test_optional_binary_field() {
        let blob: Blob = decode(r#"{"data":"","extra":"aGk="}"#, 1024).unwrap();
        assert_eq!(blob.extra.as_deref(), Some(&b"hi"[..]));
    }

    #[test]
    fn test_invalid_base64_rejected() {
        assert!(decode::<Blob>(r#"{"data":"***"}"#, 1024).is_err());
    }

    #[test]
    fn test_oversized_message_rejected() {
        let json = format!(r#"{{"data":"{}"}}"#, "A".repeat(100));
        assert!(matches!(
            decode::<Blob>(&json, 64),
            Err(TicketChainError::Validation {
                kind: ValidationErrorKind::PayloadTooLarge { .. }
            })
        ));
    }
}
