//! Identifier validation.
//!
//! Identity, device and service ids become part of ledger keys, so they are
//! restricted to a small alphabet that can never contain the key separators
//! used by range queries.

use crate::error::{TicketChainError, ValidationErrorKind};

/// Minimum identifier length.
pub const MIN_ID_LENGTH: usize = 3;

/// Maximum identifier length.
pub const MAX_ID_LENGTH: usize = 64;

/// Validate an identifier.
///
/// Rules:
/// - Must be 3-64 characters
/// - May only contain ASCII letters, digits, underscores, and hyphens
///
/// # Arguments
///
/// * `field` - Name of the field, used in the error message
/// * `value` - The identifier to validate
///
/// # Returns
///
/// The validated identifier if valid.
pub fn validate_identifier<'a>(field: &str, value: &'a str) -> Result<&'a str, TicketChainError> {
    let invalid = |reason: String| {
        TicketChainError::validation(ValidationErrorKind::InvalidIdentifier {
            field: field.to_string(),
            reason,
        })
    };

    if value.len() < MIN_ID_LENGTH {
        return Err(invalid(format!(
            "length must be at least {} characters",
            MIN_ID_LENGTH
        )));
    }

    if value.len() > MAX_ID_LENGTH {
        return Err(invalid(format!(
            "length must not exceed {} characters",
            MAX_ID_LENGTH
        )));
    }

    if let Some(c) = value
        .chars()
        .find(|c| !c.is_ascii_alphanumeric() && *c != '_' && *c != '-')
    {
        return Err(invalid(format!(
            "contains invalid character '{}'. Only letters, digits, underscores, and hyphens are allowed",
            c.escape_debug()
        )));
    }

    Ok(value)
}
