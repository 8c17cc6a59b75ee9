//! Access request validation: request types, payload size, client timestamps.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{TicketChainError, ValidationErrorKind};

/// Maximum request payload size in bytes.
pub const MAX_PAYLOAD_SIZE: usize = 10 * 1024;

/// Operation a client wants to perform on a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestType {
    Read,
    Write,
    Execute,
    Delete,
}

impl RequestType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
            Self::Execute => "execute",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for RequestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestType {
    type Err = TicketChainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        validate_request_type(s)
    }
}

/// Parse a request type. Matching is exact; `READ` is rejected.
pub fn validate_request_type(value: &str) -> Result<RequestType, TicketChainError> {
    match value {
        "read" => Ok(RequestType::Read),
        "write" => Ok(RequestType::Write),
        "execute" => Ok(RequestType::Execute),
        "delete" => Ok(RequestType::Delete),
        other => Err(TicketChainError::validation(
            ValidationErrorKind::InvalidRequestType {
                value: other.to_string(),
            },
        )),
    }
}

/// Reject payloads larger than [`MAX_PAYLOAD_SIZE`].
pub fn validate_payload_size(payload: &[u8]) -> Result<(), TicketChainError> {
    if payload.len() > MAX_PAYLOAD_SIZE {
        return Err(TicketChainError::validation(
            ValidationErrorKind::PayloadTooLarge {
                size: payload.len(),
                max: MAX_PAYLOAD_SIZE,
            },
        ));
    }
    Ok(())
}

/// Reject client timestamps too far ahead of transaction time.
///
/// Past timestamps are accepted; staleness is a protocol question (ticket
/// lifetimes, authenticator age), not an input-shape one.
pub fn validate_timestamp(timestamp: u64, now: u64, max_skew_seconds: u64) -> Result<u64, TicketChainError> {
    if timestamp == 0 {
        return Err(TicketChainError::validation(
            ValidationErrorKind::InvalidTimestamp {
                reason: "timestamp must be non-zero".to_string(),
            },
        ));
    }
    if timestamp > now.saturating_add(max_skew_seconds) {
        return Err(TicketChainError::validation(
            ValidationErrorKind::InvalidTimestamp {
                reason: format!(
                    "timestamp {} is more than {}s ahead of {}",
                    timestamp, max_skew_seconds, now
                ),
            },
        ));
    }
    Ok(timestamp)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_types() {
        assert_eq!(validate_request_type("read").unwrap(), RequestType::Read);
        assert_eq!(validate_request_type("write").unwrap(), RequestType::Write);
        assert_eq!(
            validate_request_type("execute").unwrap(),
            RequestType::Execute
        );
        assert_eq!(validate_request_type("delete").unwrap(), RequestType::Delete);
    }

    #[test]
    fn test_unknown_request_types() {
        assert!(validate_request_type("READ").is_err());
        assert!(validate_request_type("admin").is_err());
        assert!(validate_request_type("").is_err());
        assert!("sudo".parse::<RequestType>().is_err());
    }

    #[test]
    fn test_request_type_serde() {
        let json = serde_json::to_string(&RequestType::Execute).unwrap();
        assert_eq!(json, "\"execute\"");
        let parsed: RequestType = serde_json::from_str("\"delete\"").unwrap();
        assert_eq!(parsed, RequestType::Delete);
    }

    #[test]
    fn test_payload_size() {
        assert!(validate_payload_size(&[]).is_ok());
        assert!(validate_payload_size(&vec![0u8; MAX_PAYLOAD_SIZE]).is_ok());
        assert!(matches!(
            validate_payload_size(&vec![0u8; MAX_PAYLOAD_SIZE + 1]),
            Err(TicketChainError::Validation {
                kind: ValidationErrorKind::PayloadTooLarge { size: 10241, max: 10240 }
            })
        ));
    }

    #[test]
    fn test_timestamp_skew() {
        assert!(validate_timestamp(1000, 1000, 300).is_ok());
        assert!(validate_timestamp(1300, 1000, 300).is_ok());
        assert!(validate_timestamp(1, 1000, 300).is_ok());
        assert!(validate_timestamp(1301, 1000, 300).is_err());
        assert!(validate_timestamp(0, 1000, 300).is_err());
    }
}
