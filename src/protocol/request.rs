//! Client-to-server payloads.

use serde::{Deserialize, Serialize};

use super::wire::{base64_bytes, base64_opt};
use crate::engine::ChallengeProof;

/// How a challenge proof was produced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProofMode {
    #[default]
    Signature,
    Encryption,
}

/// Answer to an authentication challenge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthRequest {
    pub identity_id: String,
    /// Absent means a signature.
    #[serde(default)]
    pub mode: ProofMode,
    #[serde(with = "base64_bytes", alias = "proof")]
    pub signature_or_ciphertext: Vec<u8>,
}

impl AuthRequest {
    pub fn proof(&self) -> ChallengeProof {
        match self.mode {
            ProofMode::Signature => ChallengeProof::Signature(self.signature_or_ciphertext.clone()),
            ProofMode::Encryption => ChallengeProof::Encrypted(self.signature_or_ciphertext.clone()),
        }
    }
}

/// TGT plus authenticator, asking for a service ticket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceTicketRequest {
    #[serde(rename = "encryptedTGT", with = "base64_bytes")]
    pub encrypted_tgt: Vec<u8>,
    pub identity_id: String,
    pub service_id: String,
    #[serde(with = "base64_bytes")]
    pub authenticator: Vec<u8>,
}

/// Service ticket plus the device and operation being requested.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessRequest {
    #[serde(with = "base64_bytes")]
    pub encrypted_service_ticket: Vec<u8>,
    pub identity_id: String,
    /// Device the session is opened on.
    #[serde(alias = "deviceId", alias = "deviceID")]
    pub target_id: String,
    pub request_type: String,
    /// Client clock, Unix seconds.
    pub timestamp: u64,
    /// Request body sealed under the ticket key.
    #[serde(
        default,
        with = "base64_opt",
        alias = "encryptedData",
        skip_serializing_if = "Option::is_none"
    )]
    pub payload: Option<Vec<u8>>,
}
