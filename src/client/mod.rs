//! Client-side helpers.
//!
//! Build the proofs and requests a client sends, and unwrap the keys it
//! receives. Everything here runs outside replicated execution, so sealing
//! uses fresh randomness.

use crate::auth::Authenticator;
use crate::crypto::{challenge_digest, seal, KeyPair, PublicKey, SymmetricKey};
use crate::engine::ServiceValidator;
use crate::error::{CryptoErrorKind, TicketChainError, TicketChainResult};
use crate::protocol::{
    AccessRequest, AuthChallengeResponse, AuthRequest, ProofMode, ServiceTicketRequest,
    ServiceTicketResponse, TgtResponse,
};
use crate::validation::{DeviceStatus, RequestType};

/// Sign `sha256(nonce)`.
pub fn sign_challenge(keypair: &KeyPair, nonce: &str) -> Vec<u8> {
    keypair.sign(&challenge_digest(nonce))
}

/// Seal the nonce to the AS for encryption-mode verification.
pub fn seal_challenge_proof(as_public_key: &PublicKey, nonce: &str) -> TicketChainResult<Vec<u8>> {
    seal::seal_random(as_public_key, seal::purpose::CHALLENGE_PROOF, nonce.as_bytes())
}

/// Recover the TGT session key sealed to this client.
pub fn open_session_key(keypair: &KeyPair, encrypted_session_key: &[u8]) -> TicketChainResult<SymmetricKey> {
    let bytes = seal::open(keypair, seal::purpose::SESSION_KEY, encrypted_session_key)?;
    to_key(&bytes)
}

/// Serialized authenticator for a service ticket request.
pub fn build_authenticator(
    session_key: &SymmetricKey,
    identity_id: &str,
    service_id: &str,
    timestamp: u64,
) -> Vec<u8> {
    Authenticator::create(session_key, identity_id, service_id, timestamp).to_bytes()
}

/// Recover the service ticket key sealed under the TGT session key.
pub fn open_ticket_key(session_key: &SymmetricKey, encrypted_ticket_key: &[u8]) -> TicketChainResult<SymmetricKey> {
    let bytes = seal::open_symmetric(session_key, seal::purpose::TICKET_KEY, encrypted_ticket_key)?;
    to_key(&bytes)
}

/// Seal a request body under the ticket key.
pub fn seal_access_payload(ticket_key: &SymmetricKey, payload: &[u8]) -> TicketChainResult<Vec<u8>> {
    seal::seal_symmetric(ticket_key, seal::purpose::ACCESS_PAYLOAD, payload)
}

/// Device-side signature authorizing a status change.
pub fn sign_device_status(
    keypair: &KeyPair,
    device_id: &str,
    status: DeviceStatus,
    last_seen: u64,
) -> Vec<u8> {
    let message = ServiceValidator::device_status_message(device_id, status, last_seen);
    keypair.sign(message.as_bytes())
}

fn to_key(bytes: &[u8]) -> TicketChainResult<SymmetricKey> {
    SymmetricKey::from_slice(bytes)
        .ok_or_else(|| TicketChainError::crypto(CryptoErrorKind::DecryptionFailed))
}

/// A TGT the client holds, with its unwrapped session key.
#[derive(Debug, Clone)]
pub struct TgtCredential {
    pub encrypted_tgt: Vec<u8>,
    pub session_key: SymmetricKey,
    pub expires_at: u64,
}

/// A service ticket the client holds, with its unwrapped ticket key.
#[derive(Debug, Clone)]
pub struct ServiceCredential {
    pub service_id: String,
    pub encrypted_service_ticket: Vec<u8>,
    pub ticket_key: SymmetricKey,
    pub expires_at: u64,
}

/// One client identity and its keypair.
#[derive(Debug)]
pub struct Client {
    identity_id: String,
    keypair: KeyPair,
}

impl Client {
    pub fn new(identity_id: impl Into<String>, keypair: KeyPair) -> Self {
        Self {
            identity_id: identity_id.into(),
            keypair,
        }
    }

    pub fn identity_id(&self) -> &str {
        &self.identity_id
    }

    pub fn public_key(&self) -> PublicKey {
        self.keypair.public_key()
    }

    /// Answer a challenge with a signature.
    pub fn answer_challenge(&self, challenge: &AuthChallengeResponse) -> AuthRequest {
        AuthRequest {
            identity_id: self.identity_id.clone(),
            mode: ProofMode::Signature,
            signature_or_ciphertext: sign_challenge(&self.keypair, &challenge.nonce),
        }
    }

    /// Answer a challenge by sealing the nonce to the AS.
    pub fn answer_challenge_encrypted(
        &self,
        challenge: &AuthChallengeResponse,
        as_public_key: &PublicKey,
    ) -> TicketChainResult<AuthRequest> {
        Ok(AuthRequest {
            identity_id: self.identity_id.clone(),
            mode: ProofMode::Encryption,
            signature_or_ciphertext: seal_challenge_proof(as_public_key, &challenge.nonce)?,
        })
    }

    pub fn accept_tgt(&self, response: &TgtResponse) -> TicketChainResult<TgtCredential> {
        Ok(TgtCredential {
            encrypted_tgt: response.encrypted_tgt.clone(),
            session_key: open_session_key(&self.keypair, &response.encrypted_session_key)?,
            expires_at: response.expires_at,
        })
    }

    pub fn service_ticket_request(
        &self,
        tgt: &TgtCredential,
        service_id: &str,
        timestamp: u64,
    ) -> ServiceTicketRequest {
        ServiceTicketRequest {
            encrypted_tgt: tgt.encrypted_tgt.clone(),
            identity_id: self.identity_id.clone(),
            service_id: service_id.to_string(),
            authenticator: build_authenticator(
                &tgt.session_key,
                &self.identity_id,
                service_id,
                timestamp,
            ),
        }
    }

    pub fn accept_service_ticket(
        &self,
        tgt: &TgtCredential,
        response: &ServiceTicketResponse,
    ) -> TicketChainResult<ServiceCredential> {
        Ok(ServiceCredential {
            service_id: response.service_id.clone(),
            encrypted_service_ticket: response.encrypted_service_ticket.clone(),
            ticket_key: open_ticket_key(&tgt.session_key, &response.encrypted_ticket_key)?,
            expires_at: response.expires_at,
        })
    }

    pub fn access_request(
        &self,
        ticket: &ServiceCredential,
        device_id: &str,
        request_type: RequestType,
        timestamp: u64,
        payload: Option<&[u8]>,
    ) -> TicketChainResult<AccessRequest> {
        let payload = payload
            .map(|p| seal_access_payload(&ticket.ticket_key, p))
            .transpose()?;
        Ok(AccessRequest {
            encrypted_service_ticket: ticket.encrypted_service_ticket.clone(),
            identity_id: self.identity_id.clone(),
            target_id: device_id.to_string(),
            request_type: request_type.as_str().to_string(),
            timestamp,
            payload,
        })
    }
}
