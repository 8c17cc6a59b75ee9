//! Server-to-client payloads.

use serde::{Deserialize, Serialize};

use super::wire::base64_bytes;
use crate::engine::{AuthChallenge, ServiceTicketIssue, TgtIssue};
use crate::error::TicketChainError;

/// Replace error detail with a generic message for the given code.
///
/// Clients learn the code, never which internal check failed.
fn sanitize_error_message(code: &str) -> String {
    match code {
        "NOT_FOUND" => "Resource not found",
        "FORGED" | "INVALID_TICKET" => "Verification failed",
        "EXPIRED" => "Credential expired",
        "DENIED" => "Access denied",
        "NO_SESSION" => "No such session",
        "RATE_LIMITED" => "Too many requests",
        "BANNED" => "Temporarily banned",
        "INVALID" => "Invalid request parameters",
        _ => "An error occurred",
    }
    .to_string()
}

/// A freshly issued challenge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthChallengeResponse {
    pub identity_id: String,
    pub nonce: String,
    pub expires_at: u64,
}

impl From<AuthChallenge> for AuthChallengeResponse {
    fn from(challenge: AuthChallenge) -> Self {
        Self {
            identity_id: challenge.identity_id,
            nonce: challenge.nonce,
            expires_at: challenge.expires_at,
        }
    }
}

/// A sealed TGT and its sealed session key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TgtResponse {
    pub identity_id: String,
    #[serde(rename = "encryptedTGT", with = "base64_bytes")]
    pub encrypted_tgt: Vec<u8>,
    #[serde(with = "base64_bytes")]
    pub encrypted_session_key: Vec<u8>,
    pub issued_at: u64,
    pub expires_at: u64,
}

impl From<TgtIssue> for TgtResponse {
    fn from(issue: TgtIssue) -> Self {
        Self {
            identity_id: issue.identity_id,
            encrypted_tgt: issue.encrypted_tgt,
            encrypted_session_key: issue.encrypted_session_key,
            issued_at: issue.issued_at,
            expires_at: issue.expires_at,
        }
    }
}

/// A sealed service ticket and its sealed ticket key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceTicketResponse {
    pub identity_id: String,
    pub service_id: String,
    #[serde(with = "base64_bytes")]
    pub encrypted_service_ticket: Vec<u8>,
    #[serde(with = "base64_bytes")]
    pub encrypted_ticket_key: Vec<u8>,
    pub issued_at: u64,
    pub expires_at: u64,
}

impl From<ServiceTicketIssue> for ServiceTicketResponse {
    fn from(issue: ServiceTicketIssue) -> Self {
        Self {
            identity_id: issue.identity_id,
            service_id: issue.service_id,
            encrypted_service_ticket: issue.encrypted_service_ticket,
            encrypted_ticket_key: issue.encrypted_ticket_key,
            issued_at: issue.issued_at,
            expires_at: issue.expires_at,
        }
    }
}

/// Access decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessStatus {
    Granted,
    Denied,
}

/// Outcome of an access request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessResponse {
    pub identity_id: String,
    pub device_id: String,
    pub status: AccessStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<u64>,
    /// Sequence number of the request recorded with the grant, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_sequence: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl AccessResponse {
    pub fn granted(
        identity_id: impl Into<String>,
        device_id: impl Into<String>,
        session_id: impl Into<String>,
        expires_at: u64,
    ) -> Self {
        Self {
            identity_id: identity_id.into(),
            device_id: device_id.into(),
            status: AccessStatus::Granted,
            session_id: Some(session_id.into()),
            expires_at: Some(expires_at),
            request_sequence: None,
            error_code: None,
            message: None,
        }
    }

    /// A denial carrying the error's code and a sanitized message.
    pub fn denied(
        identity_id: impl Into<String>,
        device_id: impl Into<String>,
        error: &TicketChainError,
    ) -> Self {
        let code = error.code();
        Self {
            identity_id: identity_id.into(),
            device_id: device_id.into(),
            status: AccessStatus::Denied,
            session_id: None,
            expires_at: None,
            request_sequence: None,
            error_code: Some(code.to_string()),
            message: Some(sanitize_error_message(code)),
        }
    }

    pub fn with_request_sequence(mut self, sequence: u64) -> Self {
        self.request_sequence = Some(sequence);
        self
    }

    pub fn is_granted(&self) -> bool {
        self.status == AccessStatus::Granted
    }
}
