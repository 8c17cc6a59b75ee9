//! Audit event types.
//!
//! Defines the structure of security audit events.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Kind of security-relevant transition being recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditEventType {
    DeviceRegistered,
    DeviceAuthenticated,
    DeviceRevoked,
    AuthenticationFailed,
    ServiceTicketIssued,
    ServiceTicketExpired,
    AccessGranted,
    AccessDenied,
    SessionCreated,
    SessionTerminated,
    RateLimitExceeded,
    ValidationFailed,
    SignatureInvalid,
    TimestampInvalid,
}

impl AuditEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DeviceRegistered => "DEVICE_REGISTERED",
            Self::DeviceAuthenticated => "DEVICE_AUTHENTICATED",
            Self::DeviceRevoked => "DEVICE_REVOKED",
            Self::AuthenticationFailed => "AUTHENTICATION_FAILED",
            Self::ServiceTicketIssued => "SERVICE_TICKET_ISSUED",
            Self::ServiceTicketExpired => "SERVICE_TICKET_EXPIRED",
            Self::AccessGranted => "ACCESS_GRANTED",
            Self::AccessDenied => "ACCESS_DENIED",
            Self::SessionCreated => "SESSION_CREATED",
            Self::SessionTerminated => "SESSION_TERMINATED",
            Self::RateLimitExceeded => "RATE_LIMIT_EXCEEDED",
            Self::ValidationFailed => "VALIDATION_FAILED",
            Self::SignatureInvalid => "SIGNATURE_INVALID",
            Self::TimestampInvalid => "TIMESTAMP_INVALID",
        }
    }
}

/// Event severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Info,
    Warning,
    Error,
    Critical,
}

/// Outcome of the audited operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status")]
pub enum AuditResult {
    #[serde(rename = "success")]
    Success,
    #[serde(rename = "failure")]
    Failure {
        error_code: String,
        error_message: String,
    },
}

impl AuditResult {
    pub fn failure(error_code: impl Into<String>, error_message: impl Into<String>) -> Self {
        Self::Failure {
            error_code: error_code.into(),
            error_message: error_message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    pub fn error_code(&self) -> Option<&str> {
        match self {
            Self::Success => None,
            Self::Failure { error_code, .. } => Some(error_code),
        }
    }
}

/// A single audit event. Immutable once emitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Deterministic inside a transaction, random otherwise.
    pub event_id: String,
    pub event_type: AuditEventType,
    /// RFC 3339 timestamp.
    pub timestamp: String,
    pub severity: Severity,
    #[serde(flatten)]
    pub result: AuditResult,
    pub actor_id: String,
    pub resource_type: String,
    pub resource_id: String,
    pub action: String,
    pub description: String,
    /// Emitting component (AS, TGS, ISV, RATE_LIMITER).
    pub component: String,
    /// Sanitized free-form context.
    pub metadata: Map<String, Value>,
}

impl AuditEvent {
    /// Start an event; the logger stamps id, timestamp and component.
    pub fn new(
        event_type: AuditEventType,
        severity: Severity,
        result: AuditResult,
        description: impl Into<String>,
    ) -> Self {
        Self {
            event_id: String::new(),
            event_type,
            timestamp: String::new(),
            severity,
            result,
            actor_id: String::new(),
            resource_type: String::new(),
            resource_id: String::new(),
            action: String::new(),
            description: description.into(),
            component: String::new(),
            metadata: Map::new(),
        }
    }

    pub fn actor(mut self, actor_id: impl Into<String>) -> Self {
        self.actor_id = actor_id.into();
        self
    }

    pub fn resource(mut self, resource_type: impl Into<String>, resource_id: impl Into<String>) -> Self {
        self.resource_type = resource_type.into();
        self.resource_id = resource_id.into();
        self
    }

    pub fn action(mut self, action: impl Into<String>) -> Self {
        self.action = action.into();
        self
    }

    pub fn meta(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }
}
