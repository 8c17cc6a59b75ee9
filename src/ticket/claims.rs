//! Ticket contents.
//!
//! Claims only ever travel sealed; the ledger keeps fingerprints, never the
//! plaintext.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::crypto::seal::purpose;
use crate::crypto::SymmetricKey;

/// Common view over ticket claims.
pub trait TicketClaims: Serialize + DeserializeOwned {
    /// AEAD purpose label the claims are sealed under.
    const PURPOSE: &'static str;

    fn identity_id(&self) -> &str;
    fn issued_at(&self) -> u64;
    fn lifetime_seconds(&self) -> u64;

    fn expires_at(&self) -> u64 {
        self.issued_at().saturating_add(self.lifetime_seconds())
    }

    /// The validity window is closed at `issued_at + lifetime`.
    fn is_valid_at(&self, now: u64) -> bool {
        now < self.expires_at()
    }
}

/// Ticket granting ticket, sealed to the TGS.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TgtClaims {
    pub identity_id: String,
    pub session_key: SymmetricKey,
    pub issued_at: u64,
    pub lifetime_seconds: u64,
}

impl TicketClaims for TgtClaims {
    const PURPOSE: &'static str = purpose::TGT;

    fn identity_id(&self) -> &str {
        &self.identity_id
    }

    fn issued_at(&self) -> u64 {
        self.issued_at
    }

    fn lifetime_seconds(&self) -> u64 {
        self.lifetime_seconds
    }
}

/// Service ticket, sealed to one service validator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceTicketClaims {
    pub identity_id: String,
    pub service_id: String,
    pub ticket_key: SymmetricKey,
    pub issued_at: u64,
    pub lifetime_seconds: u64,
}

impl TicketClaims for ServiceTicketClaims {
    const PURPOSE: &'static str = purpose::SERVICE_TICKET;

    fn identity_id(&self) -> &str {
        &self.identity_id
    }

    fn issued_at(&self) -> u64 {
        self.issued_at
    }

    fn lifetime_seconds(&self) -> u64 {
        self.lifetime_seconds
    }
}

/// Ledger record kept in place of an issued ticket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuanceRecord {
    pub identity_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_id: Option<String>,
    pub issued_at: u64,
    pub expires_at: u64,
    /// Hex SHA-256 of the sealed ticket.
    pub fingerprint: String,
}
