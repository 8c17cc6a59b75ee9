//! Public key PEM validation.
//!
//! Structural checks run before the key is parsed so oversized or obviously
//! wrong input never reaches the DER decoder.

use crate::error::{TicketChainError, ValidationErrorKind};

/// Minimum accepted PEM length.
pub const MIN_PEM_LENGTH: usize = 100;

/// Maximum accepted PEM length.
pub const MAX_PEM_LENGTH: usize = 4096;

const PEM_BEGIN: &str = "-----BEGIN PUBLIC KEY-----";
const PEM_END: &str = "-----END PUBLIC KEY-----";

/// Validate the envelope of a SubjectPublicKeyInfo PEM.
///
/// Rules:
/// - Must be 100-4096 characters
/// - Must contain the `PUBLIC KEY` begin and end markers, in order
pub fn validate_public_key_pem(pem: &str) -> Result<&str, TicketChainError> {
    let invalid = |reason: &str| {
        TicketChainError::validation(ValidationErrorKind::InvalidPublicKey {
            reason: reason.to_string(),
        })
    };

    if pem.len() < MIN_PEM_LENGTH {
        return Err(invalid("PEM is too short"));
    }
    if pem.len() > MAX_PEM_LENGTH {
        return Err(invalid("PEM is too long"));
    }

    let begin = pem.find(PEM_BEGIN).ok_or_else(|| invalid("missing BEGIN PUBLIC KEY marker"))?;
    let end = pem.find(PEM_END).ok_or_else(|| invalid("missing END PUBLIC KEY marker"))?;
    if end < begin {
        return Err(invalid("PEM markers out of order"));
    }

    Ok(pem)
}
