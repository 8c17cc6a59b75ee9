//! State key layout.
//!
//! Timestamps and counters are zero-padded so lexical order matches numeric
//! order in range scans.

pub const IDENTITY_PREFIX: &str = "IDENTITY_";
pub const CHALLENGE_PREFIX: &str = "CHALLENGE_";
pub const VERIFIED_PREFIX: &str = "VERIFIED_";
pub const TGT_PREFIX: &str = "TGT_";
pub const TICKET_PREFIX: &str = "TICKET_";
pub const AUTHENTICATOR_PREFIX: &str = "AUTHN_";
pub const SESSION_PREFIX: &str = "SESSION_";
pub const DEVICE_PREFIX: &str = "DEVICE_";
pub const REQUEST_PREFIX: &str = "REQUEST_";

pub fn identity_key(id: &str) -> String {
    format!("{}{}", IDENTITY_PREFIX, id)
}

pub fn challenge_key(id: &str) -> String {
    format!("{}{}", CHALLENGE_PREFIX, id)
}

pub fn verified_key(id: &str) -> String {
    format!("{}{}", VERIFIED_PREFIX, id)
}

pub fn tgt_record_key(id: &str, issued_at: u64) -> String {
    format!("{}{}_{:020}", TGT_PREFIX, id, issued_at)
}

pub fn ticket_record_key(id: &str, service_id: &str, issued_at: u64) -> String {
    format!("{}{}_{}_{:020}", TICKET_PREFIX, id, service_id, issued_at)
}

pub fn authenticator_key(id: &str, service_id: &str, timestamp: u64) -> String {
    format!(
        "{}{}_{}_{:020}",
        AUTHENTICATOR_PREFIX, id, service_id, timestamp
    )
}

/// Session ids are derived with the `SESSION` prefix already applied.
pub fn session_key(session_id: &str) -> String {
    session_id.to_string()
}

pub fn device_key(id: &str) -> String {
    format!("{}{}", DEVICE_PREFIX, id)
}

pub fn request_key(session_id: &str, sequence: u64) -> String {
    format!("{}{}_{:010}", REQUEST_PREFIX, session_id, sequence)
}

/// `[start, end)` covering every key that begins with `prefix`.
///
/// Identifiers are restricted to `[A-Za-z0-9_-]`, all of which sort below `~`.
pub fn prefix_range(prefix: &str) -> (String, String) {
    (prefix.to_string(), format!("{}~", prefix))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_formats() {
        assert_eq!(identity_key("client1"), "IDENTITY_client1");
        assert_eq!(challenge_key("client1"), "CHALLENGE_client1");
        assert_eq!(
            tgt_record_key("client1", 42),
            "TGT_client1_00000000000000000042"
        );
        assert_eq!(
            ticket_record_key("client1", "iot1", 7),
            "TICKET_client1_iot1_00000000000000000007"
        );
    }

    #[test]
    fn test_padding_preserves_order() {
        assert!(tgt_record_key("c", 9) < tgt_record_key("c", 10));
        assert!(request_key("SESSION_x", 2) < request_key("SESSION_x", 11));
    }

    #[test]
    fn test_prefix_range_bounds_identifiers() {
        let (start, end) = prefix_range(IDENTITY_PREFIX);
        for id in ["a", "Z-9", "zzz_zzz"] {
            let key = identity_key(id);
            assert!(key >= start && key < end);
        }
        assert!(challenge_key("a") < start || challenge_key("a") >= end);
    }
}
