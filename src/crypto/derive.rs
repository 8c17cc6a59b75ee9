//! Deterministic derivation of nonces, keys and identifiers.
//!
//! Every replica executing the same transaction must produce byte-identical
//! output, so nothing here touches an entropy source. Values are HMAC-SHA256
//! over length-prefixed fields, keyed with a secret shared by all replicas.

use std::fmt;

use base64::{engine::general_purpose::STANDARD, Engine};
use ring::hmac;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Length of derived symmetric keys in bytes.
pub const SYMMETRIC_KEY_LEN: usize = 32;

/// Length of the hex identifier suffix produced by [`Deriver::derive_id`].
const ID_SUFFIX_BYTES: usize = 16;

/// A 256-bit symmetric key (TGT session key, service ticket key).
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SymmetricKey([u8; SYMMETRIC_KEY_LEN]);

impl SymmetricKey {
    /// Wrap raw key bytes.
    pub fn from_bytes(bytes: [u8; SYMMETRIC_KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// Parse from a slice, rejecting the wrong length.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let arr: [u8; SYMMETRIC_KEY_LEN] = bytes.try_into().ok()?;
        Some(Self(arr))
    }

    /// Raw key bytes.
    pub fn as_bytes(&self) -> &[u8; SYMMETRIC_KEY_LEN] {
        &self.0
    }
}

impl PartialEq for SymmetricKey {
    fn eq(&self, other: &Self) -> bool {
        self.0.ct_eq(&other.0).into()
    }
}

impl Eq for SymmetricKey {}

impl fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SymmetricKey([REDACTED])")
    }
}

impl Serialize for SymmetricKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(self.0))
    }
}

impl<'de> Deserialize<'de> for SymmetricKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        let bytes = STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)?;
        Self::from_slice(&bytes)
            .ok_or_else(|| serde::de::Error::custom("symmetric key must be 32 bytes"))
    }
}

/// Keyed derivation function shared by all replicas.
///
/// Two replicas configured with the same secret derive the same values for
/// the same `(identity, timestamp, purpose)` triple.
pub struct Deriver {
    key: hmac::Key,
}

impl Deriver {
    /// Create a deriver keyed with the replica-shared secret.
    pub fn new(secret: &[u8]) -> Self {
        Self {
            key: hmac::Key::new(hmac::HMAC_SHA256, secret),
        }
    }

    /// Derive 32 bytes for a labelled, ordered list of fields.
    ///
    /// Each field is length-prefixed so `("a1", "23")` and `("a", "123")`
    /// never collide.
    pub fn derive_bytes(&self, label: &str, fields: &[&[u8]]) -> [u8; 32] {
        let mut ctx = hmac::Context::with_key(&self.key);
        absorb(&mut ctx, label.as_bytes());
        for field in fields {
            absorb(&mut ctx, field);
        }
        let tag = ctx.sign();
        let mut out = [0u8; 32];
        out.copy_from_slice(tag.as_ref());
        out
    }

    /// Derive the challenge nonce for an identity at a transaction timestamp.
    ///
    /// Returned base64-encoded; clients hash and sign the encoded string.
    pub fn derive_nonce(&self, identity_id: &str, tx_timestamp: u64) -> String {
        let bytes = self.derive_bytes(
            "nonce",
            &[identity_id.as_bytes(), &tx_timestamp.to_be_bytes()],
        );
        STANDARD.encode(bytes)
    }

    /// Derive a symmetric key bound to an identity, timestamp and purpose.
    pub fn derive_session_key(
        &self,
        identity_id: &str,
        tx_timestamp: u64,
        purpose: &str,
    ) -> SymmetricKey {
        SymmetricKey(self.derive_bytes(
            "session-key",
            &[
                identity_id.as_bytes(),
                &tx_timestamp.to_be_bytes(),
                purpose.as_bytes(),
            ],
        ))
    }

    /// Derive a prefixed identifier, e.g. `SESSION_3f2a...`.
    pub fn derive_id(&self, prefix: &str, identity_id: &str, tx_timestamp: u64) -> String {
        let bytes = self.derive_bytes(
            "id",
            &[
                prefix.as_bytes(),
                identity_id.as_bytes(),
                &tx_timestamp.to_be_bytes(),
            ],
        );
        format!("{}_{}", prefix, hex::encode(&bytes[..ID_SUFFIX_BYTES]))
    }
}

impl Default for Deriver {
    fn default() -> Self {
        Self::new(&[])
    }
}

impl fmt::Debug for Deriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Deriver").finish_non_exhaustive()
    }
}

fn absorb(ctx: &mut hmac::Context, field: &[u8]) {
    ctx.update(&(field.len() as u32).to_be_bytes());
    ctx.update(field);
}
