//! Issuer and verifier roles.
//!
//! Each server holds its own keypair. Issuers seal claims to the next hop's
//! public key; verifiers open claims addressed to them.

use ring::digest;

use crate::crypto::{seal, Deriver, KeyPair, PublicKey};
use crate::error::{ProtocolErrorKind, TicketChainError, TicketChainResult};

use super::claims::TicketClaims;

/// A server that issues tickets of one kind.
pub trait TicketIssuer {
    type Claims: TicketClaims;

    fn deriver(&self) -> &Deriver;

    /// Seal claims to `recipient`. Identical inputs give identical bytes.
    fn seal_ticket(&self, claims: &Self::Claims, recipient: &PublicKey) -> TicketChainResult<Vec<u8>> {
        let plaintext = serde_json::to_vec(claims)?;
        seal::seal_deterministic(
            self.deriver(),
            recipient,
            <Self::Claims as TicketClaims>::PURPOSE,
            &plaintext,
        )
    }
}

/// A server that accepts tickets of one kind.
pub trait TicketVerifier {
    type Claims: TicketClaims;

    fn keypair(&self) -> &KeyPair;

    /// Open a sealed ticket.
    ///
    /// Every failure, cryptographic or structural, is reported as
    /// `InvalidTicket`.
    fn open_ticket(&self, sealed: &[u8]) -> TicketChainResult<Self::Claims> {
        let plaintext = seal::open(
            self.keypair(),
            <Self::Claims as TicketClaims>::PURPOSE,
            sealed,
        )
        .map_err(|_| TicketChainError::protocol(ProtocolErrorKind::InvalidTicket))?;
        serde_json::from_slice(&plaintext)
            .map_err(|_| TicketChainError::protocol(ProtocolErrorKind::InvalidTicket))
    }
}

/// Hex SHA-256 of a sealed ticket, stored in issuance records.
pub fn fingerprint(sealed: &[u8]) -> String {
    hex::encode(digest::digest(&digest::SHA256, sealed))
}
