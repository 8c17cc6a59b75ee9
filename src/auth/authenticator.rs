//! TGS authenticators: HMAC-SHA256 proofs bound to a TGT session key.
//!
//! A client proves it holds the session key from its TGT by MACing
//! `{identity}:{service}:{timestamp}`. The validator checks freshness and the
//! MAC; replay tracking lives in ledger state so every replica agrees.

use std::time::Duration;

use ring::hmac;

use crate::crypto::SymmetricKey;
use crate::error::{ProtocolErrorKind, TicketChainError, TicketChainResult};

const TIMESTAMP_LEN: usize = 8;
const MAC_LEN: usize = 32;

/// A freshly-timestamped proof of session key possession.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Authenticator {
    pub timestamp: u64,
    pub mac: [u8; MAC_LEN],
}

impl Authenticator {
    /// The message that is MACed.
    ///
    /// Format: `{identity_id}:{service_id}:{timestamp}`
    pub fn signing_message(identity_id: &str, service_id: &str, timestamp: u64) -> String {
        format!("{}:{}:{}", identity_id, service_id, timestamp)
    }

    /// Build an authenticator for a service ticket request.
    pub fn create(
        session_key: &SymmetricKey,
        identity_id: &str,
        service_id: &str,
        timestamp: u64,
    ) -> Self {
        let key = hmac::Key::new(hmac::HMAC_SHA256, session_key.as_bytes());
        let message = Self::signing_message(identity_id, service_id, timestamp);
        let tag = hmac::sign(&key, message.as_bytes());
        let mut mac = [0u8; MAC_LEN];
        mac.copy_from_slice(tag.as_ref());
        Self { timestamp, mac }
    }

    /// Wire encoding: big-endian timestamp followed by the MAC.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(TIMESTAMP_LEN + MAC_LEN);
        out.extend_from_slice(&self.timestamp.to_be_bytes());
        out.extend_from_slice(&self.mac);
        out
    }

    /// Parse the wire encoding. Malformed input is reported as forged.
    pub fn from_bytes(bytes: &[u8]) -> TicketChainResult<Self> {
        if bytes.len() != TIMESTAMP_LEN + MAC_LEN {
            return Err(TicketChainError::protocol(ProtocolErrorKind::Forged));
        }
        let mut ts = [0u8; TIMESTAMP_LEN];
        ts.copy_from_slice(&bytes[..TIMESTAMP_LEN]);
        let mut mac = [0u8; MAC_LEN];
        mac.copy_from_slice(&bytes[TIMESTAMP_LEN..]);
        Ok(Self {
            timestamp: u64::from_be_bytes(ts),
            mac,
        })
    }
}

/// Checks authenticator freshness and MAC.
#[derive(Debug, Clone)]
pub struct AuthenticatorValidator {
    max_age: Duration,
    max_skew: Duration,
}

impl AuthenticatorValidator {
    pub fn new(max_age_seconds: u64, max_skew_seconds: u64) -> Self {
        Self {
            max_age: Duration::from_secs(max_age_seconds),
            max_skew: Duration::from_secs(max_skew_seconds),
        }
    }

    /// How long a seen authenticator must be remembered to block replays.
    pub fn replay_window(&self) -> Duration {
        self.max_age + self.max_skew
    }

    /// Validate an authenticator at transaction time `now`.
    ///
    /// Checks:
    /// 1. Timestamp is not older than the maximum age
    /// 2. Timestamp is not further in the future than the allowed skew
    /// 3. MAC is valid under the session key
    pub fn validate(
        &self,
        session_key: &SymmetricKey,
        identity_id: &str,
        service_id: &str,
        authenticator: &Authenticator,
        now: u64,
    ) -> TicketChainResult<()> {
        let age = now.saturating_sub(authenticator.timestamp);
        if age > self.max_age.as_secs() {
            return Err(TicketChainError::protocol(ProtocolErrorKind::Expired {
                what: "authenticator".to_string(),
            }));
        }

        // Clock skew protection
        if authenticator.timestamp > now.saturating_add(self.max_skew.as_secs()) {
            return Err(TicketChainError::protocol(ProtocolErrorKind::Invalid {
                reason: "authenticator timestamp is in the future".to_string(),
            }));
        }

        let key = hmac::Key::new(hmac::HMAC_SHA256, session_key.as_bytes());
        let message =
            Authenticator::signing_message(identity_id, service_id, authenticator.timestamp);
        hmac::verify(&key, message.as_bytes(), &authenticator.mac)
            .map_err(|_| TicketChainError::protocol(ProtocolErrorKind::Forged))
    }
}
