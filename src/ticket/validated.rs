//! Proof that a service ticket passed validation.

use crate::crypto::SymmetricKey;

use super::claims::{ServiceTicketClaims, TicketClaims};

/// A service ticket that opened under this validator's key, is inside its
/// lifetime and is scoped to this service.
///
/// Only the service validator can construct one, so a session can never be
/// opened without a prior successful validation.
#[derive(Debug, Clone)]
pub struct ValidatedTicket {
    claims: ServiceTicketClaims,
}

impl ValidatedTicket {
    pub(crate) fn new(claims: ServiceTicketClaims) -> Self {
        Self { claims }
    }

    pub fn identity_id(&self) -> &str {
        &self.claims.identity_id
    }

    pub fn service_id(&self) -> &str {
        &self.claims.service_id
    }

    pub fn ticket_key(&self) -> &SymmetricKey {
        &self.claims.ticket_key
    }

    pub fn issued_at(&self) -> u64 {
        self.claims.issued_at
    }

    pub fn expires_at(&self) -> u64 {
        self.claims.expires_at()
    }
}
