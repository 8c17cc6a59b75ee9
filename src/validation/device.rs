//! Device status vocabulary.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{TicketChainError, ValidationErrorKind};

/// Availability of a registered device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceStatus {
    /// Registered and free to accept a session.
    Active,
    /// Switched off by its operator.
    Inactive,
    /// Serving an open session.
    Busy,
    /// Taken out of service by an administrator.
    Suspended,
}

impl DeviceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
            Self::Busy => "busy",
            Self::Suspended => "suspended",
        }
    }

    /// Whether a new session may be opened against the device.
    pub fn is_available(&self) -> bool {
        matches!(self, Self::Active)
    }
}

impl fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeviceStatus {
    type Err = TicketChainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        validate_device_status(s)
    }
}

/// Parse a device status.
pub fn validate_device_status(value: &str) -> Result<DeviceStatus, TicketChainError> {
    match value {
        "active" => Ok(DeviceStatus::Active),
        "inactive" => Ok(DeviceStatus::Inactive),
        "busy" => Ok(DeviceStatus::Busy),
        "suspended" => Ok(DeviceStatus::Suspended),
        other => Err(TicketChainError::validation(
            ValidationErrorKind::InvalidDeviceStatus {
                value: other.to_string(),
            },
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_statuses() {
        for s in ["active", "inactive", "busy", "suspended"] {
            assert_eq!(validate_device_status(s).unwrap().as_str(), s);
        }
    }

    #[test]
    fn test_unknown_status() {
        assert!(matches!(
            "online".parse::<DeviceStatus>(),
            Err(TicketChainError::Validation {
                kind: ValidationErrorKind::InvalidDeviceStatus { .. }
            })
        ));
    }

    #[test]
    fn test_availability() {
        assert!(DeviceStatus::Active.is_available());
        assert!(!DeviceStatus::Busy.is_available());
        assert!(!DeviceStatus::Inactive.is_available());
        assert!(!DeviceStatus::Suspended.is_available());
    }
}
