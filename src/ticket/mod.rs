//! Ticket model.
//!
//! Claims carried by TGTs and service tickets, the issuer/verifier roles the
//! three servers play, and the validated-ticket proof the ISV hands to
//! session opening.

mod claims;
mod roles;
mod validated;

pub use claims::{IssuanceRecord, ServiceTicketClaims, TgtClaims, TicketClaims};
pub use roles::{fingerprint, TicketIssuer, TicketVerifier};
pub use validated::ValidatedTicket;
