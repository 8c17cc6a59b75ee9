//! Sealed boxes to a public key, and symmetric envelopes under a derived key.
//!
//! Public-key format: `version || ephemeral_x25519_pub (32) || ciphertext+tag`.
//! The AEAD key is HKDF-SHA256 over the X25519 shared secret, salted with
//! both public keys; each box has its own key, so the nonce is fixed.
//!
//! Symmetric format: `version || nonce (12) || ciphertext+tag`, the nonce being
//! a keyed digest of the plaintext so replicas produce identical bytes.

use ring::aead::{self, Aad, LessSafeKey, Nonce, UnboundKey, CHACHA20_POLY1305, NONCE_LEN};
use ring::rand::{SecureRandom, SystemRandom};
use ring::{digest, hkdf, hmac};
use x25519_dalek::{PublicKey as X25519Public, StaticSecret};
use zeroize::Zeroizing;

use super::derive::{Deriver, SymmetricKey};
use super::keys::{KeyPair, PublicKey};
use crate::error::{CryptoErrorKind, TicketChainError, TicketChainResult};

const SEAL_VERSION: u8 = 1;
const HKDF_INFO: &[u8] = b"ticketchain-seal-v1";
const EPHEMERAL_LEN: usize = 32;
const TAG_LEN: usize = 16;

/// Purpose labels bound into the AEAD associated data.
///
/// A box sealed for one purpose never opens under another.
pub mod purpose {
    pub const TGT: &str = "tgt";
    pub const SESSION_KEY: &str = "session-key";
    pub const SERVICE_TICKET: &str = "service-ticket";
    pub const TICKET_KEY: &str = "ticket-key";
    pub const CHALLENGE_PROOF: &str = "challenge-proof";
    pub const ACCESS_PAYLOAD: &str = "access-payload";
}

/// Seal `plaintext` to `recipient` with a fresh random ephemeral key.
///
/// Client side only; transactions use [`seal_deterministic`].
pub fn seal_random(
    recipient: &PublicKey,
    purpose: &str,
    plaintext: &[u8],
) -> TicketChainResult<Vec<u8>> {
    let mut seed = Zeroizing::new([0u8; 32]);
    SystemRandom::new()
        .fill(&mut seed[..])
        .map_err(|_| TicketChainError::crypto(CryptoErrorKind::RandomnessUnavailable))?;
    seal_with_ephemeral(StaticSecret::from(*seed), recipient, purpose, plaintext)
}

/// Seal `plaintext` to `recipient` with an ephemeral key derived from the
/// recipient, the purpose and the plaintext itself.
pub fn seal_deterministic(
    deriver: &Deriver,
    recipient: &PublicKey,
    purpose: &str,
    plaintext: &[u8],
) -> TicketChainResult<Vec<u8>> {
    let plaintext_digest = digest::digest(&digest::SHA256, plaintext);
    let seed = Zeroizing::new(deriver.derive_bytes(
        "seal-ephemeral",
        &[
            purpose.as_bytes(),
            recipient.as_bytes(),
            plaintext_digest.as_ref(),
        ],
    ));
    seal_with_ephemeral(StaticSecret::from(*seed), recipient, purpose, plaintext)
}

/// Open a box sealed to `recipient`'s public key.
pub fn open(recipient: &KeyPair, purpose: &str, sealed: &[u8]) -> TicketChainResult<Vec<u8>> {
    if sealed.len() < 1 + EPHEMERAL_LEN + TAG_LEN || sealed[0] != SEAL_VERSION {
        return Err(decryption_failed());
    }
    let mut ephemeral = [0u8; EPHEMERAL_LEN];
    ephemeral.copy_from_slice(&sealed[1..1 + EPHEMERAL_LEN]);
    let ephemeral_public = X25519Public::from(ephemeral);

    let secret = recipient.x25519_secret();
    let recipient_public = recipient.public_key().x25519();
    let shared = secret.diffie_hellman(&ephemeral_public);
    if !shared.was_contributory() {
        return Err(decryption_failed());
    }

    let key = box_key(
        shared.as_bytes(),
        ephemeral_public.as_bytes(),
        recipient_public.as_bytes(),
    )?;
    let mut in_out = sealed[1 + EPHEMERAL_LEN..].to_vec();
    let plaintext = key
        .open_in_place(zero_nonce(), Aad::from(purpose.as_bytes()), &mut in_out)
        .map_err(|_| decryption_failed())?;
    Ok(plaintext.to_vec())
}

/// Encrypt under a symmetric key with a synthetic (plaintext-derived) nonce.
pub fn seal_symmetric(
    key: &SymmetricKey,
    purpose: &str,
    plaintext: &[u8],
) -> TicketChainResult<Vec<u8>> {
    let nonce_key = hmac::Key::new(hmac::HMAC_SHA256, key.as_bytes());
    let mut ctx = hmac::Context::with_key(&nonce_key);
    ctx.update(purpose.as_bytes());
    ctx.update(&[0]);
    ctx.update(plaintext);
    let tag = ctx.sign();
    let mut nonce_bytes = [0u8; NONCE_LEN];
    nonce_bytes.copy_from_slice(&tag.as_ref()[..NONCE_LEN]);

    let sealing_key = symmetric_aead_key(key)?;
    let mut in_out = plaintext.to_vec();
    sealing_key
        .seal_in_place_append_tag(
            Nonce::assume_unique_for_key(nonce_bytes),
            Aad::from(purpose.as_bytes()),
            &mut in_out,
        )
        .map_err(|_| TicketChainError::crypto(CryptoErrorKind::EncryptionFailed))?;

    let mut out = Vec::with_capacity(1 + NONCE_LEN + in_out.len());
    out.push(SEAL_VERSION);
    out.extend_from_slice(&nonce_bytes);
    out.extend_from_slice(&in_out);
    Ok(out)
}

/// Decrypt a [`seal_symmetric`] envelope.
pub fn open_symmetric(
    key: &SymmetricKey,
    purpose: &str,
    sealed: &[u8],
) -> TicketChainResult<Vec<u8>> {
    if sealed.len() < 1 + NONCE_LEN + TAG_LEN || sealed[0] != SEAL_VERSION {
        return Err(decryption_failed());
    }
    let mut nonce_bytes = [0u8; NONCE_LEN];
    nonce_bytes.copy_from_slice(&sealed[1..1 + NONCE_LEN]);

    let opening_key = symmetric_aead_key(key)?;
    let mut in_out = sealed[1 + NONCE_LEN..].to_vec();
    let plaintext = opening_key
        .open_in_place(
            Nonce::assume_unique_for_key(nonce_bytes),
            Aad::from(purpose.as_bytes()),
            &mut in_out,
        )
        .map_err(|_| decryption_failed())?;
    Ok(plaintext.to_vec())
}

fn seal_with_ephemeral(
    ephemeral: StaticSecret,
    recipient: &PublicKey,
    purpose: &str,
    plaintext: &[u8],
) -> TicketChainResult<Vec<u8>> {
    let ephemeral_public = X25519Public::from(&ephemeral);
    let recipient_public = recipient.x25519();
    let shared = ephemeral.diffie_hellman(&recipient_public);
    if !shared.was_contributory() {
        return Err(TicketChainError::crypto(CryptoErrorKind::EncryptionFailed));
    }

    let key = box_key(
        shared.as_bytes(),
        ephemeral_public.as_bytes(),
        recipient_public.as_bytes(),
    )?;
    let mut in_out = plaintext.to_vec();
    key.seal_in_place_append_tag(zero_nonce(), Aad::from(purpose.as_bytes()), &mut in_out)
        .map_err(|_| TicketChainError::crypto(CryptoErrorKind::EncryptionFailed))?;

    let mut out = Vec::with_capacity(1 + EPHEMERAL_LEN + in_out.len());
    out.push(SEAL_VERSION);
    out.extend_from_slice(ephemeral_public.as_bytes());
    out.extend_from_slice(&in_out);
    Ok(out)
}

fn box_key(
    shared: &[u8; 32],
    ephemeral_public: &[u8; 32],
    recipient_public: &[u8; 32],
) -> TicketChainResult<LessSafeKey> {
    let mut salt_bytes = [0u8; 64];
    salt_bytes[..32].copy_from_slice(ephemeral_public);
    salt_bytes[32..].copy_from_slice(recipient_public);

    let salt = hkdf::Salt::new(hkdf::HKDF_SHA256, &salt_bytes);
    let prk = salt.extract(shared);
    let info = [HKDF_INFO];
    let okm = prk
        .expand(&info, &CHACHA20_POLY1305)
        .map_err(|_| TicketChainError::crypto(CryptoErrorKind::DerivationFailed))?;
    Ok(LessSafeKey::new(UnboundKey::from(okm)))
}

fn symmetric_aead_key(key: &SymmetricKey) -> TicketChainResult<LessSafeKey> {
    let unbound = UnboundKey::new(&aead::CHACHA20_POLY1305, key.as_bytes())
        .map_err(|_| TicketChainError::crypto(CryptoErrorKind::DerivationFailed))?;
    Ok(LessSafeKey::new(unbound))
}

fn zero_nonce() -> Nonce {
    Nonce::assume_unique_for_key([0u8; NONCE_LEN])
}

fn decryption_failed() -> TicketChainError {
    TicketChainError::crypto(CryptoErrorKind::DecryptionFailed)
}
