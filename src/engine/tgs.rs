//! Ticket granting server.
//!
//! Exchanges a TGT plus a fresh authenticator for a service ticket sealed to
//! the target service. The TGS never consults the AS: a TGT that opens under
//! the TGS key and passes the structural checks is trusted.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::auth::{Authenticator, AuthenticatorValidator};
use crate::crypto::{seal, Deriver, KeyPair, PublicKey};
use crate::error::{ProtocolErrorKind, TicketChainError, TicketChainResult};
use crate::ledger::keys::{authenticator_key, prefix_range, ticket_record_key, AUTHENTICATOR_PREFIX};
use crate::ledger::{TxContext, TxContextExt};
use crate::ticket::{
    fingerprint, IssuanceRecord, ServiceTicketClaims, TgtClaims, TicketClaims, TicketIssuer,
    TicketVerifier,
};
use crate::validation::validate_identifier;

use super::{stamp, EngineContext};

/// Output of service ticket issuance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceTicketIssue {
    pub identity_id: String,
    pub service_id: String,
    /// Service ticket sealed to the service.
    pub encrypted_service_ticket: Vec<u8>,
    /// Ticket key sealed under the TGT session key.
    pub encrypted_ticket_key: Vec<u8>,
    pub issued_at: u64,
    pub expires_at: u64,
}

/// Replay cache entry for a spent authenticator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SeenAuthenticator {
    identity_id: String,
    service_id: String,
    timestamp: u64,
    expires_at: u64,
}

/// The ticket granting server.
pub struct TicketGrantingServer {
    keypair: KeyPair,
    services: HashMap<String, PublicKey>,
    validator: AuthenticatorValidator,
    engine: EngineContext,
}

impl TicketGrantingServer {
    pub fn new(keypair: KeyPair, engine: EngineContext) -> Self {
        let audit = engine.audit.for_component("TGS");
        let validator = AuthenticatorValidator::new(
            engine.tickets.authenticator_max_age_seconds,
            engine.tickets.max_clock_skew_seconds,
        );
        Self {
            keypair,
            services: HashMap::new(),
            validator,
            engine: EngineContext { audit, ..engine },
        }
    }

    pub fn public_key(&self) -> PublicKey {
        self.keypair.public_key()
    }

    /// Make a service known so tickets can be sealed to it.
    pub fn register_service(
        &mut self,
        service_id: &str,
        public_key: PublicKey,
    ) -> TicketChainResult<()> {
        validate_identifier("serviceId", service_id)?;
        debug!(service = %service_id, "Service registered with TGS");
        self.services.insert(service_id.to_string(), public_key);
        Ok(())
    }

    /// Builder form of [`register_service`](Self::register_service).
    pub fn with_service(mut self, service_id: &str, public_key: PublicKey) -> TicketChainResult<Self> {
        self.register_service(service_id, public_key)?;
        Ok(self)
    }

    pub fn has_service(&self, service_id: &str) -> bool {
        self.services.contains_key(service_id)
    }

    /// Exchange a TGT for a service ticket.
    pub fn issue_service_ticket(
        &self,
        ctx: &mut dyn TxContext,
        encrypted_tgt: &[u8],
        identity_id: &str,
        service_id: &str,
        authenticator: &[u8],
    ) -> TicketChainResult<ServiceTicketIssue> {
        let result =
            self.issue_service_ticket_inner(ctx, encrypted_tgt, identity_id, service_id, authenticator);
        self.engine.audit.log_ticket_issuance(
            stamp(ctx),
            identity_id,
            "SERVICE_TICKET",
            service_id,
            result.as_ref().map(|_| ()),
        );
        match &result {
            Ok(issue) => info!(
                identity = %identity_id,
                service = %service_id,
                expires_at = issue.expires_at,
                "Service ticket issued"
            ),
            Err(e) => {
                if matches!(e.protocol_kind(), Some(ProtocolErrorKind::Forged)) {
                    self.engine.rate_limiter.record_violation(identity_id);
                }
                warn!(identity = %identity_id, service = %service_id, error = %e, "Service ticket refused");
            }
        }
        result
    }

    fn issue_service_ticket_inner(
        &self,
        ctx: &mut dyn TxContext,
        encrypted_tgt: &[u8],
        identity_id: &str,
        service_id: &str,
        authenticator: &[u8],
    ) -> TicketChainResult<ServiceTicketIssue> {
        validate_identifier("identityId", identity_id)?;
        validate_identifier("serviceId", service_id)?;
        self.engine.rate_limiter.allow_request(identity_id)?;

        let service_key = self.services.get(service_id).ok_or_else(|| {
            TicketChainError::protocol(ProtocolErrorKind::NotFound {
                resource: "service".to_string(),
                id: service_id.to_string(),
            })
        })?;

        let tgt: TgtClaims = self.open_ticket(encrypted_tgt)?;
        if tgt.identity_id != identity_id {
            return Err(TicketChainError::protocol(ProtocolErrorKind::Forged));
        }

        let now = ctx.tx_timestamp();
        if !tgt.is_valid_at(now) {
            return Err(TicketChainError::protocol(ProtocolErrorKind::Expired {
                what: "TGT".to_string(),
            }));
        }

        let authenticator = Authenticator::from_bytes(authenticator)?;
        self.validator
            .validate(&tgt.session_key, identity_id, service_id, &authenticator, now)?;

        let replay_key = authenticator_key(identity_id, service_id, authenticator.timestamp);
        if ctx.get_state(&replay_key)?.is_some() {
            return Err(TicketChainError::protocol(ProtocolErrorKind::Forged));
        }
        let seen = SeenAuthenticator {
            identity_id: identity_id.to_string(),
            service_id: service_id.to_string(),
            timestamp: authenticator.timestamp,
            expires_at: authenticator
                .timestamp
                .saturating_add(self.validator.replay_window().as_secs()),
        };

        let ticket_key = self
            .engine
            .deriver
            .derive_session_key(identity_id, now, service_id);
        let claims = ServiceTicketClaims {
            identity_id: identity_id.to_string(),
            service_id: service_id.to_string(),
            ticket_key,
            issued_at: now,
            lifetime_seconds: self.engine.tickets.service_ticket_lifetime_seconds,
        };
        let encrypted_service_ticket = self.seal_ticket(&claims, service_key)?;
        let encrypted_ticket_key = seal::seal_symmetric(
            &tgt.session_key,
            seal::purpose::TICKET_KEY,
            claims.ticket_key.as_bytes(),
        )?;

        ctx.put_json(&replay_key, &seen)?;
        let record = IssuanceRecord {
            identity_id: identity_id.to_string(),
            service_id: Some(service_id.to_string()),
            issued_at: now,
            expires_at: claims.expires_at(),
            fingerprint: fingerprint(&encrypted_service_ticket),
        };
        ctx.put_json(&ticket_record_key(identity_id, service_id, now), &record)?;

        Ok(ServiceTicketIssue {
            identity_id: identity_id.to_string(),
            service_id: service_id.to_string(),
            encrypted_service_ticket,
            encrypted_ticket_key,
            issued_at: now,
            expires_at: claims.expires_at(),
        })
    }

    /// Drop replay cache entries that can no longer be replayed.
    ///
    /// Returns how many entries were removed.
    pub fn purge_authenticator_cache(&self, ctx: &mut dyn TxContext) -> TicketChainResult<usize> {
        let now = ctx.tx_timestamp();
        let (start, end) = prefix_range(AUTHENTICATOR_PREFIX);
        let expired: Vec<String> = ctx
            .range_json::<SeenAuthenticator>(&start, &end)?
            .into_iter()
            .filter(|(_, seen)| seen.expires_at <= now)
            .map(|(key, _)| key)
            .collect();

        for key in &expired {
            ctx.del_state(key)?;
        }
        info!(removed = expired.len(), "Authenticator cache purged");
        Ok(expired.len())
    }
}

impl TicketIssuer for TicketGrantingServer {
    type Claims = ServiceTicketClaims;

    fn deriver(&self) -> &Deriver {
        &self.engine.deriver
    }
}

impl TicketVerifier for TicketGrantingServer {
    type Claims = TgtClaims;

    fn keypair(&self) -> &KeyPair {
        &self.keypair
    }
}

impl std::fmt::Debug for TicketGrantingServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut services: Vec<&String> = self.services.keys().collect();
        services.sort();
        f.debug_struct("TicketGrantingServer")
            .field("public_key", &self.keypair.public_key())
            .field("services", &services)
            .finish_non_exhaustive()
    }
}
