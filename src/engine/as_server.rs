//! Authentication server.
//!
//! Registers identities, runs the challenge/response exchange and issues
//! TGTs sealed to the TGS.
//!
//! Per identity: `Registered -> ChallengeIssued -> Verified -> Registered`
//! (the last step on TGT issuance). Revocation freezes the identity until it
//! is reinstated.

use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use tracing::{debug, info, warn};

use crate::crypto::{challenge_digest, seal, Deriver, KeyPair, PublicKey};
use crate::error::{ProtocolErrorKind, TicketChainError, TicketChainResult, ValidationErrorKind};
use crate::ledger::keys::{
    challenge_key, identity_key, prefix_range, tgt_record_key, verified_key, IDENTITY_PREFIX,
};
use crate::ledger::{TxContext, TxContextExt};
use crate::ticket::{fingerprint, IssuanceRecord, TgtClaims, TicketClaims, TicketIssuer};
use crate::validation::{validate_identifier, validate_public_key_pem};

use super::{stamp, EngineContext};

/// Service name the TGT session key is derived for.
const TGS_PURPOSE: &str = "TGS";

/// What kind of principal an identity is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentityKind {
    Client,
    Device,
}

impl IdentityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Client => "client",
            Self::Device => "device",
        }
    }
}

/// A registered principal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub id: String,
    pub kind: IdentityKind,
    /// SubjectPublicKeyInfo PEM.
    pub public_key: String,
    pub registered_at: u64,
    pub valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revoked_at: Option<u64>,
}

/// A live challenge. At most one per identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthChallenge {
    pub identity_id: String,
    pub nonce: String,
    pub created_at: u64,
    pub expires_at: u64,
}

/// Written by a successful verification, consumed by TGT issuance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationMarker {
    pub identity_id: String,
    pub verified_at: u64,
    pub expires_at: u64,
    pub mode: String,
}

/// Proof of key possession answering a challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChallengeProof {
    /// Ed25519 signature over `sha256(nonce)`.
    Signature(Vec<u8>),
    /// The nonce sealed to the AS public key.
    Encrypted(Vec<u8>),
}

impl ChallengeProof {
    pub fn mode(&self) -> &'static str {
        match self {
            Self::Signature(_) => "signature",
            Self::Encrypted(_) => "encryption",
        }
    }
}

/// Output of TGT issuance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TgtIssue {
    pub identity_id: String,
    /// TGT sealed to the TGS.
    pub encrypted_tgt: Vec<u8>,
    /// TGT session key sealed to the client.
    pub encrypted_session_key: Vec<u8>,
    pub issued_at: u64,
    pub expires_at: u64,
}

/// Read-only view of the AS identity directory.
///
/// Used for auxiliary lookups by other components; ticket validation never
/// depends on it.
pub trait AsQuery: Send + Sync {
    fn check_validity(&self, ctx: &dyn TxContext, identity_id: &str) -> TicketChainResult<bool>;

    fn get_identity(&self, ctx: &dyn TxContext, identity_id: &str) -> TicketChainResult<Identity>;
}

/// The authentication server.
pub struct AuthServer {
    keypair: KeyPair,
    tgs_public_key: PublicKey,
    engine: EngineContext,
    allow_encrypted_proofs: bool,
}

impl AuthServer {
    pub fn new(keypair: KeyPair, tgs_public_key: PublicKey, engine: EngineContext) -> Self {
        let audit = engine.audit.for_component("AS");
        Self {
            keypair,
            tgs_public_key,
            engine: EngineContext { audit, ..engine },
            allow_encrypted_proofs: true,
        }
    }

    /// Accept or refuse legacy encryption-mode proofs.
    pub fn with_encrypted_proofs(mut self, allow: bool) -> Self {
        self.allow_encrypted_proofs = allow;
        self
    }

    pub fn public_key(&self) -> PublicKey {
        self.keypair.public_key()
    }

    /// Register a new identity.
    pub fn register(
        &self,
        ctx: &mut dyn TxContext,
        identity_id: &str,
        kind: IdentityKind,
        public_key_pem: &str,
    ) -> TicketChainResult<Identity> {
        let result = self.register_inner(ctx, identity_id, kind, public_key_pem);
        self.engine.audit.log_registration(
            stamp(ctx),
            identity_id,
            kind.as_str(),
            result.as_ref().map(|_| ()),
        );
        match &result {
            Ok(_) => info!(identity = %identity_id, kind = kind.as_str(), "Identity registered"),
            Err(e) => warn!(identity = %identity_id, error = %e, "Registration rejected"),
        }
        result
    }

    fn register_inner(
        &self,
        ctx: &mut dyn TxContext,
        identity_id: &str,
        kind: IdentityKind,
        public_key_pem: &str,
    ) -> TicketChainResult<Identity> {
        validate_identifier("identityId", identity_id)?;
        self.engine.rate_limiter.allow_request(identity_id)?;
        validate_public_key_pem(public_key_pem)?;
        PublicKey::from_pem(public_key_pem).map_err(|e| {
            TicketChainError::validation(ValidationErrorKind::InvalidPublicKey {
                reason: e.to_string(),
            })
        })?;

        let key = identity_key(identity_id);
        if ctx.get_state(&key)?.is_some() {
            return Err(TicketChainError::protocol(ProtocolErrorKind::AlreadyExists {
                id: identity_id.to_string(),
            }));
        }

        let identity = Identity {
            id: identity_id.to_string(),
            kind,
            public_key: public_key_pem.to_string(),
            registered_at: ctx.tx_timestamp(),
            valid: true,
            revoked_at: None,
        };
        ctx.put_json(&key, &identity)?;
        Ok(identity)
    }

    /// Whether an identity may currently authenticate.
    pub fn check_validity(&self, ctx: &dyn TxContext, identity_id: &str) -> TicketChainResult<bool> {
        Ok(self.get_identity(ctx, identity_id)?.valid)
    }

    pub fn get_identity(&self, ctx: &dyn TxContext, identity_id: &str) -> TicketChainResult<Identity> {
        ctx.get_json::<Identity>(&identity_key(identity_id))?
            .ok_or_else(|| not_found(identity_id))
    }

    /// Every registered identity, in id order.
    pub fn list_identities(&self, ctx: &dyn TxContext) -> TicketChainResult<Vec<Identity>> {
        let (start, end) = prefix_range(IDENTITY_PREFIX);
        Ok(ctx
            .range_json::<Identity>(&start, &end)?
            .into_iter()
            .map(|(_, identity)| identity)
            .collect())
    }

    /// Issue a challenge, replacing any earlier one.
    pub fn initiate_challenge(
        &self,
        ctx: &mut dyn TxContext,
        identity_id: &str,
    ) -> TicketChainResult<AuthChallenge> {
        let result = self.initiate_challenge_inner(ctx, identity_id);
        match &result {
            Ok(challenge) => {
                debug!(identity = %identity_id, expires_at = challenge.expires_at, "Challenge issued")
            }
            Err(e) => {
                warn!(identity = %identity_id, error = %e, "Challenge refused");
                self.engine.audit.log_authentication(
                    stamp(ctx),
                    identity_id,
                    "challenge",
                    Err(e),
                );
            }
        }
        result
    }

    fn initiate_challenge_inner(
        &self,
        ctx: &mut dyn TxContext,
        identity_id: &str,
    ) -> TicketChainResult<AuthChallenge> {
        validate_identifier("identityId", identity_id)?;
        self.engine.rate_limiter.allow_request(identity_id)?;
        self.require_valid(ctx, identity_id)?;

        let now = ctx.tx_timestamp();
        let challenge = AuthChallenge {
            identity_id: identity_id.to_string(),
            nonce: self.engine.deriver.derive_nonce(identity_id, now),
            created_at: now,
            expires_at: now.saturating_add(self.engine.tickets.challenge_ttl_seconds),
        };
        ctx.put_json(&challenge_key(identity_id), &challenge)?;
        Ok(challenge)
    }

    /// Check a proof against the live challenge.
    ///
    /// Success consumes the challenge. An expired challenge is removed. Any
    /// other failure leaves the challenge in place and charges a rate-limit
    /// violation when the proof itself was bad.
    pub fn verify_identity(
        &self,
        ctx: &mut dyn TxContext,
        identity_id: &str,
        proof: &ChallengeProof,
    ) -> TicketChainResult<VerificationMarker> {
        let result = self.verify_identity_inner(ctx, identity_id, proof);
        self.engine.audit.log_authentication(
            stamp(ctx),
            identity_id,
            proof.mode(),
            result.as_ref().map(|_| ()),
        );
        match &result {
            Ok(_) => info!(identity = %identity_id, mode = proof.mode(), "Identity verified"),
            Err(e) => {
                if matches!(e.protocol_kind(), Some(ProtocolErrorKind::Forged)) {
                    self.engine.rate_limiter.record_violation(identity_id);
                }
                warn!(identity = %identity_id, mode = proof.mode(), error = %e, "Verification failed");
            }
        }
        result
    }

    fn verify_identity_inner(
        &self,
        ctx: &mut dyn TxContext,
        identity_id: &str,
        proof: &ChallengeProof,
    ) -> TicketChainResult<VerificationMarker> {
        validate_identifier("identityId", identity_id)?;
        self.engine.rate_limiter.allow_request(identity_id)?;
        let identity = self.require_valid(ctx, identity_id)?;

        let key = challenge_key(identity_id);
        let challenge = ctx.get_json::<AuthChallenge>(&key)?.ok_or_else(|| {
            TicketChainError::protocol(ProtocolErrorKind::NoChallenge {
                id: identity_id.to_string(),
            })
        })?;

        let now = ctx.tx_timestamp();
        if now >= challenge.expires_at {
            ctx.del_state(&key)?;
            return Err(TicketChainError::protocol(ProtocolErrorKind::Expired {
                what: "challenge".to_string(),
            }));
        }

        match proof {
            ChallengeProof::Signature(signature) => {
                let public_key = PublicKey::from_pem(&identity.public_key).map_err(|_| forged())?;
                public_key
                    .verify(&challenge_digest(&challenge.nonce), signature)
                    .map_err(|_| forged())?;
            }
            ChallengeProof::Encrypted(sealed) => {
                if !self.allow_encrypted_proofs {
                    return Err(TicketChainError::protocol(ProtocolErrorKind::Denied {
                        reason: "encryption-mode proofs are disabled".to_string(),
                    }));
                }
                let opened = seal::open(&self.keypair, seal::purpose::CHALLENGE_PROOF, sealed)
                    .map_err(|_| forged())?;
                if !bool::from(opened.as_slice().ct_eq(challenge.nonce.as_bytes())) {
                    return Err(forged());
                }
            }
        }

        ctx.del_state(&key)?;
        let marker = VerificationMarker {
            identity_id: identity_id.to_string(),
            verified_at: now,
            expires_at: now.saturating_add(self.engine.tickets.verification_ttl_seconds),
            mode: proof.mode().to_string(),
        };
        ctx.put_json(&verified_key(identity_id), &marker)?;
        Ok(marker)
    }

    /// Issue a TGT to a freshly verified identity.
    pub fn issue_tgt(&self, ctx: &mut dyn TxContext, identity_id: &str) -> TicketChainResult<TgtIssue> {
        let result = self.issue_tgt_inner(ctx, identity_id);
        self.engine.audit.log_ticket_issuance(
            stamp(ctx),
            identity_id,
            "TGT",
            TGS_PURPOSE,
            result.as_ref().map(|_| ()),
        );
        match &result {
            Ok(issue) => info!(identity = %identity_id, expires_at = issue.expires_at, "TGT issued"),
            Err(e) => warn!(identity = %identity_id, error = %e, "TGT refused"),
        }
        result
    }

    fn issue_tgt_inner(&self, ctx: &mut dyn TxContext, identity_id: &str) -> TicketChainResult<TgtIssue> {
        validate_identifier("identityId", identity_id)?;
        self.engine.rate_limiter.allow_request(identity_id)?;
        let identity = self.require_valid(ctx, identity_id)?;

        let now = ctx.tx_timestamp();
        let marker_key = verified_key(identity_id);
        let marker = ctx
            .get_json::<VerificationMarker>(&marker_key)?
            .ok_or_else(|| denied("identity has not completed verification"))?;
        ctx.del_state(&marker_key)?;
        if now >= marker.expires_at {
            return Err(denied("verification has expired"));
        }

        let session_key = self
            .engine
            .deriver
            .derive_session_key(identity_id, now, TGS_PURPOSE);
        let claims = TgtClaims {
            identity_id: identity_id.to_string(),
            session_key,
            issued_at: now,
            lifetime_seconds: self.engine.tickets.tgt_lifetime_seconds,
        };
        let encrypted_tgt = self.seal_ticket(&claims, &self.tgs_public_key)?;

        let client_key = PublicKey::from_pem(&identity.public_key)?;
        let encrypted_session_key = seal::seal_deterministic(
            &self.engine.deriver,
            &client_key,
            seal::purpose::SESSION_KEY,
            claims.session_key.as_bytes(),
        )?;

        let record = IssuanceRecord {
            identity_id: identity_id.to_string(),
            service_id: None,
            issued_at: now,
            expires_at: claims.expires_at(),
            fingerprint: fingerprint(&encrypted_tgt),
        };
        ctx.put_json(&tgt_record_key(identity_id, now), &record)?;

        Ok(TgtIssue {
            identity_id: identity_id.to_string(),
            encrypted_tgt,
            encrypted_session_key,
            issued_at: now,
            expires_at: claims.expires_at(),
        })
    }

    /// Clear the valid flag. Pending challenges and verifications are dropped.
    pub fn revoke(&self, ctx: &mut dyn TxContext, identity_id: &str) -> TicketChainResult<Identity> {
        let result = self.set_validity(ctx, identity_id, false);
        self.engine.audit.log_revocation(
            stamp(ctx),
            identity_id,
            true,
            result.as_ref().map(|_| ()),
        );
        match &result {
            Ok(_) => info!(identity = %identity_id, "Identity revoked"),
            Err(e) => warn!(identity = %identity_id, error = %e, "Revocation refused"),
        }
        result
    }

    /// Set the valid flag again.
    pub fn reinstate(&self, ctx: &mut dyn TxContext, identity_id: &str) -> TicketChainResult<Identity> {
        let result = self.set_validity(ctx, identity_id, true);
        self.engine.audit.log_revocation(
            stamp(ctx),
            identity_id,
            false,
            result.as_ref().map(|_| ()),
        );
        match &result {
            Ok(_) => info!(identity = %identity_id, "Identity reinstated"),
            Err(e) => warn!(identity = %identity_id, error = %e, "Reinstatement refused"),
        }
        result
    }

    fn set_validity(
        &self,
        ctx: &mut dyn TxContext,
        identity_id: &str,
        valid: bool,
    ) -> TicketChainResult<Identity> {
        let mut identity = self.get_identity(ctx, identity_id)?;
        identity.valid = valid;
        identity.revoked_at = if valid { None } else { Some(ctx.tx_timestamp()) };
        ctx.put_json(&identity_key(identity_id), &identity)?;
        if !valid {
            ctx.del_state(&challenge_key(identity_id))?;
            ctx.del_state(&verified_key(identity_id))?;
        }
        Ok(identity)
    }

    fn require_valid(&self, ctx: &dyn TxContext, identity_id: &str) -> TicketChainResult<Identity> {
        let identity = self.get_identity(ctx, identity_id)?;
        if !identity.valid {
            return Err(TicketChainError::protocol(ProtocolErrorKind::Invalid {
                reason: format!("identity {} is revoked", identity_id),
            }));
        }
        Ok(identity)
    }
}

impl TicketIssuer for AuthServer {
    type Claims = TgtClaims;

    fn deriver(&self) -> &Deriver {
        &self.engine.deriver
    }
}

impl AsQuery for AuthServer {
    fn check_validity(&self, ctx: &dyn TxContext, identity_id: &str) -> TicketChainResult<bool> {
        AuthServer::check_validity(self, ctx, identity_id)
    }

    fn get_identity(&self, ctx: &dyn TxContext, identity_id: &str) -> TicketChainResult<Identity> {
        AuthServer::get_identity(self, ctx, identity_id)
    }
}

impl std::fmt::Debug for AuthServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthServer")
            .field("public_key", &self.keypair.public_key())
            .field("allow_encrypted_proofs", &self.allow_encrypted_proofs)
            .finish_non_exhaustive()
    }
}

fn not_found(identity_id: &str) -> TicketChainError {
    TicketChainError::protocol(ProtocolErrorKind::NotFound {
        resource: "identity".to_string(),
        id: identity_id.to_string(),
    })
}

fn forged() -> TicketChainError {
    TicketChainError::protocol(ProtocolErrorKind::Forged)
}

fn denied(reason: &str) -> TicketChainError {
    TicketChainError::protocol(ProtocolErrorKind::Denied {
        reason: reason.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::audit::{AuditEventType, AuditLogger, MemoryAuditSink, Severity};
    use crate::auth::{RateLimitPolicy, RateLimiter};
    use crate::config::TicketConfig;
    use crate::ledger::MemoryLedger;

    const T0: u64 = 1_700_000_000;

    struct Fixture {
        ledger: MemoryLedger,
        server: AuthServer,
        sink: Arc<MemoryAuditSink>,
        limiter: Arc<RateLimiter>,
        client: KeyPair,
        tgs: KeyPair,
    }

    fn fixture() -> Fixture {
        let deriver = Arc::new(Deriver::new(b"replica-secret"));
        let sink = Arc::new(MemoryAuditSink::new());
        let audit = AuditLogger::new("TEST", sink.clone(), Arc::clone(&deriver));
        let limiter = Arc::new(RateLimiter::new(RateLimitPolicy::default()));
        let engine = EngineContext::new(deriver, Arc::clone(&limiter), audit, TicketConfig::default());
        let tgs = KeyPair::from_seed(&[2u8; 32]);
        Fixture {
            ledger: MemoryLedger::new(),
            server: AuthServer::new(KeyPair::from_seed(&[1u8; 32]), tgs.public_key(), engine),
            sink,
            limiter,
            client: KeyPair::from_seed(&[7u8; 32]),
            tgs,
        }
    }

    fn register(f: &Fixture, id: &str) {
        let pem = f.client.public_key().to_pem();
        f.ledger
            .transact(T0, |ctx| f.server.register(ctx, id, IdentityKind::Client, &pem))
            .unwrap();
    }

    fn challenge(f: &Fixture, id: &str, at: u64) -> AuthChallenge {
        f.ledger
            .transact(at, |ctx| f.server.initiate_challenge(ctx, id))
            .unwrap()
    }

    fn sign(f: &Fixture, challenge: &AuthChallenge) -> ChallengeProof {
        ChallengeProof::Signature(f.client.sign(&challenge_digest(&challenge.nonce)))
    }

    #[test]
    fn test_register_rejects_duplicates() {
        let f = fixture();
        register(&f, "client1");
        let pem = f.client.public_key().to_pem();
        let err = f
            .ledger
            .transact(T0 + 1, |ctx| {
                f.server.register(ctx, "client1", IdentityKind::Client, &pem)
            })
            .unwrap_err();
        assert!(matches!(
            err.protocol_kind(),
            Some(ProtocolErrorKind::AlreadyExists { .. })
        ));
        assert_eq!(f.sink.count(AuditEventType::DeviceRegistered), 1);
        assert_eq!(f.sink.count(AuditEventType::ValidationFailed), 1);
    }

    #[test]
    fn test_register_rejects_bad_input() {
        let f = fixture();
        let pem = f.client.public_key().to_pem();
        assert!(f
            .ledger
            .transact(T0, |ctx| f.server.register(ctx, "c!", IdentityKind::Client, &pem))
            .is_err());
        assert!(f
            .ledger
            .transact(T0, |ctx| {
                f.server
                    .register(ctx, "client1", IdentityKind::Client, "not a key")
            })
            .is_err());
        assert!(f.ledger.is_empty());
    }

    #[test]
    fn test_check_validity_unknown_identity() {
        let f = fixture();
        let err = f
            .ledger
            .transact(T0, |ctx| f.server.check_validity(ctx, "ghost"))
            .unwrap_err();
        assert_eq!(err.code(), "NOT_FOUND");
    }

    #[test]
    fn test_challenge_is_deterministic_and_replaced() {
        let f = fixture();
        register(&f, "client1");
        let first = challenge(&f, "client1", T0 + 10);
        let again = challenge(&f, "client1", T0 + 10);
        assert_eq!(first, again);
        assert_eq!(first.expires_at, T0 + 310);

        let later = challenge(&f, "client1", T0 + 20);
        assert_ne!(first.nonce, later.nonce);
        let stored: AuthChallenge =
            serde_json::from_slice(&f.ledger.get(&challenge_key("client1")).unwrap()).unwrap();
        assert_eq!(stored, later);
    }

    #[test]
    fn test_signature_verification_is_single_use() {
        let f = fixture();
        register(&f, "client1");
        let c = challenge(&f, "client1", T0 + 10);
        let proof = sign(&f, &c);

        f.ledger
            .transact(T0 + 11, |ctx| f.server.verify_identity(ctx, "client1", &proof))
            .unwrap();
        assert!(f.ledger.contains(&verified_key("client1")));
        assert!(!f.ledger.contains(&challenge_key("client1")));

        let err = f
            .ledger
            .transact(T0 + 12, |ctx| f.server.verify_identity(ctx, "client1", &proof))
            .unwrap_err();
        assert!(matches!(
            err.protocol_kind(),
            Some(ProtocolErrorKind::NoChallenge { .. })
        ));
    }

    #[test]
    fn test_forged_signature_keeps_challenge() {
        let f = fixture();
        register(&f, "client1");
        let c = challenge(&f, "client1", T0 + 10);
        let other = KeyPair::from_seed(&[9u8; 32]);
        let proof = ChallengeProof::Signature(other.sign(&challenge_digest(&c.nonce)));

        let err = f
            .ledger
            .transact(T0 + 11, |ctx| f.server.verify_identity(ctx, "client1", &proof))
            .unwrap_err();
        assert_eq!(err.protocol_kind(), Some(&ProtocolErrorKind::Forged));
        assert!(f.ledger.contains(&challenge_key("client1")));
        assert_eq!(f.limiter.stats("client1").unwrap().violation_count, 1);
        assert_eq!(f.sink.count(AuditEventType::SignatureInvalid), 1);
    }

    #[test]
    fn test_expired_challenge_is_removed() {
        let f = fixture();
        register(&f, "client1");
        let c = challenge(&f, "client1", T0 + 10);
        let proof = sign(&f, &c);

        let err = f
            .ledger
            .transact(c.expires_at, |ctx| f.server.verify_identity(ctx, "client1", &proof))
            .unwrap_err();
        assert!(matches!(
            err.protocol_kind(),
            Some(ProtocolErrorKind::Expired { .. })
        ));
        assert!(!f.ledger.contains(&challenge_key("client1")));
    }

    #[test]
    fn test_encrypted_proof() {
        let f = fixture();
        register(&f, "client1");
        let c = challenge(&f, "client1", T0 + 10);
        let sealed = seal::seal_random(
            &f.server.public_key(),
            seal::purpose::CHALLENGE_PROOF,
            c.nonce.as_bytes(),
        )
        .unwrap();

        let marker = f
            .ledger
            .transact(T0 + 11, |ctx| {
                f.server
                    .verify_identity(ctx, "client1", &ChallengeProof::Encrypted(sealed.clone()))
            })
            .unwrap();
        assert_eq!(marker.mode, "encryption");
    }

    #[test]
    fn test_encrypted_proof_can_be_disabled() {
        let mut f = fixture();
        f.server = f.server.with_encrypted_proofs(false);
        register(&f, "client1");
        let c = challenge(&f, "client1", T0 + 10);
        let sealed = seal::seal_random(
            &f.server.public_key(),
            seal::purpose::CHALLENGE_PROOF,
            c.nonce.as_bytes(),
        )
        .unwrap();

        let err = f
            .ledger
            .transact(T0 + 11, |ctx| {
                f.server
                    .verify_identity(ctx, "client1", &ChallengeProof::Encrypted(sealed.clone()))
            })
            .unwrap_err();
        assert_eq!(err.code(), "DENIED");
        assert!(f.ledger.contains(&challenge_key("client1")));
    }

    #[test]
    fn test_wrong_nonce_encrypted_is_forged() {
        let f = fixture();
        register(&f, "client1");
        challenge(&f, "client1", T0 + 10);
        let sealed = seal::seal_random(
            &f.server.public_key(),
            seal::purpose::CHALLENGE_PROOF,
            b"some other nonce",
        )
        .unwrap();

        let err = f
            .ledger
            .transact(T0 + 11, |ctx| {
                f.server
                    .verify_identity(ctx, "client1", &ChallengeProof::Encrypted(sealed.clone()))
            })
            .unwrap_err();
        assert_eq!(err.protocol_kind(), Some(&ProtocolErrorKind::Forged));
    }

    #[test]
    fn test_issue_tgt_requires_verification() {
        let f = fixture();
        register(&f, "client1");
        let err = f
            .ledger
            .transact(T0 + 1, |ctx| f.server.issue_tgt(ctx, "client1"))
            .unwrap_err();
        assert_eq!(err.code(), "DENIED");
    }

    #[test]
    fn test_issue_tgt_consumes_marker() {
        let f = fixture();
        register(&f, "client1");
        let c = challenge(&f, "client1", T0 + 10);
        let proof = sign(&f, &c);
        f.ledger
            .transact(T0 + 11, |ctx| f.server.verify_identity(ctx, "client1", &proof))
            .unwrap();

        let issue = f
            .ledger
            .transact(T0 + 12, |ctx| f.server.issue_tgt(ctx, "client1"))
            .unwrap();
        assert_eq!(issue.expires_at, T0 + 12 + 3600);
        assert!(!f.ledger.contains(&verified_key("client1")));
        assert!(f.ledger.contains(&tgt_record_key("client1", T0 + 12)));

        let plaintext = seal::open(&f.tgs, seal::purpose::TGT, &issue.encrypted_tgt).unwrap();
        let claims: TgtClaims = serde_json::from_slice(&plaintext).unwrap();
        assert_eq!(claims.identity_id, "client1");

        let session_key =
            seal::open(&f.client, seal::purpose::SESSION_KEY, &issue.encrypted_session_key)
                .unwrap();
        assert_eq!(session_key.as_slice(), claims.session_key.as_bytes());

        assert!(f
            .ledger
            .transact(T0 + 13, |ctx| f.server.issue_tgt(ctx, "client1"))
            .is_err());
    }

    #[test]
    fn test_revocation_blocks_tgt() {
        let f = fixture();
        register(&f, "client1");
        let c = challenge(&f, "client1", T0 + 10);
        let proof = sign(&f, &c);
        f.ledger
            .transact(T0 + 11, |ctx| f.server.verify_identity(ctx, "client1", &proof))
            .unwrap();
        f.ledger
            .transact(T0 + 12, |ctx| f.server.revoke(ctx, "client1"))
            .unwrap();

        let err = f
            .ledger
            .transact(T0 + 13, |ctx| f.server.issue_tgt(ctx, "client1"))
            .unwrap_err();
        assert!(matches!(
            err.protocol_kind(),
            Some(ProtocolErrorKind::Invalid { .. })
        ));
        assert!(!f
            .ledger
            .transact(T0 + 13, |ctx| f.server.check_validity(ctx, "client1"))
            .unwrap());

        f.ledger
            .transact(T0 + 14, |ctx| f.server.reinstate(ctx, "client1"))
            .unwrap();
        assert!(f
            .ledger
            .transact(T0 + 15, |ctx| f.server.check_validity(ctx, "client1"))
            .unwrap());
    }

    #[test]
    fn test_revoking_unknown_identity_is_audited() {
        let f = fixture();
        let err = f
            .ledger
            .transact(T0, |ctx| f.server.revoke(ctx, "ghost"))
            .unwrap_err();
        assert_eq!(err.code(), "NOT_FOUND");
        assert!(f
            .ledger
            .transact(T0, |ctx| f.server.reinstate(ctx, "ghost"))
            .is_err());

        let events = f.sink.events();
        assert_eq!(events.len(), 2);
        assert!(events
            .iter()
            .all(|e| e.event_type == AuditEventType::DeviceRevoked
                && e.severity == Severity::Warning
                && !e.result.is_success()));
    }

    #[test]
    fn test_list_identities() {
        let f = fixture();
        register(&f, "client2");
        register(&f, "client1");
        let ids: Vec<String> = f
            .ledger
            .transact(T0, |ctx| f.server.list_identities(ctx))
            .unwrap()
            .into_iter()
            .map(|i| i.id)
            .collect();
        assert_eq!(ids, vec!["client1", "client2"]);
    }
}
