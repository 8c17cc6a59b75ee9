//! End-to-end tests for the ticket protocol.
//!
//! Each test drives the AS, TGS and ISV through a shared in-memory ledger
//! the way a client would, using the client helpers to build requests.

use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use ticketchain::audit::{AuditEventType, AuditLogger, MemoryAuditSink};
use ticketchain::auth::{RateLimitPolicy, RateLimiter};
use ticketchain::client::{sign_device_status, Client, ServiceCredential, TgtCredential};
use ticketchain::config::{Settings, TicketConfig};
use ticketchain::crypto::{Deriver, KeyPair};
use ticketchain::engine::{
    AsQuery, AuthServer, ChallengeProof, EngineContext, IdentityKind, ServiceValidator,
    TicketGrantingServer,
};
use ticketchain::error::{ProtocolErrorKind, TicketChainError};
use ticketchain::ledger::MemoryLedger;
use ticketchain::node::{bootstrap_keys, Node};
use ticketchain::protocol::{
    wire, AccessStatus, AuthChallengeResponse, ServiceTicketResponse, TgtResponse,
};
use ticketchain::validation::{DeviceStatus, RequestType};

const T0: u64 = 1_700_000_000;
const SERVICE: &str = "iot1";
const CLIENT: &str = "client1";
const DEVICE: &str = "thermo1";

/// One node's engines over one ledger.
struct Harness {
    ledger: MemoryLedger,
    auth: Arc<AuthServer>,
    tgs: TicketGrantingServer,
    isv: ServiceValidator,
    limiter: Arc<RateLimiter>,
    sink: Arc<MemoryAuditSink>,
}

impl Harness {
    fn new() -> Self {
        Self::with_policy(RateLimitPolicy::default())
    }

    fn with_policy(policy: RateLimitPolicy) -> Self {
        let deriver = Arc::new(Deriver::new(b"shared-replica-secret"));
        let sink = Arc::new(MemoryAuditSink::new());
        let audit = AuditLogger::new("TEST", sink.clone(), Arc::clone(&deriver));
        let limiter =
            Arc::new(RateLimiter::new(policy).with_audit(audit.for_component("RATE_LIMITER")));
        let engine = EngineContext::new(deriver, Arc::clone(&limiter), audit, TicketConfig::default());

        let tgs_keys = KeyPair::from_seed(&[2u8; 32]);
        let isv_keys = KeyPair::from_seed(&[3u8; 32]);

        let auth = Arc::new(AuthServer::new(
            KeyPair::from_seed(&[1u8; 32]),
            tgs_keys.public_key(),
            engine.clone(),
        ));
        let tgs = TicketGrantingServer::new(tgs_keys, engine.clone())
            .with_service(SERVICE, isv_keys.public_key())
            .unwrap();
        let directory: Arc<dyn AsQuery> = auth.clone();
        let isv = ServiceValidator::new(SERVICE, isv_keys, engine)
            .unwrap()
            .with_identity_directory(directory);

        Self {
            ledger: MemoryLedger::new(),
            auth,
            tgs,
            isv,
            limiter,
            sink,
        }
    }

    /// Register the standard client and device at `T0`.
    fn enroll(&self, client: &Client, device: &KeyPair) {
        let client_pem = client.public_key().to_pem();
        let device_pem = device.public_key().to_pem();
        self.ledger
            .transact(T0, |ctx| {
                self.auth
                    .register(ctx, client.identity_id(), IdentityKind::Client, &client_pem)?;
                self.isv.register_device(
                    ctx,
                    DEVICE,
                    &device_pem,
                    &[RequestType::Read, RequestType::Write],
                )
            })
            .unwrap();
    }

    fn challenge(&self, client: &Client, at: u64) -> AuthChallengeResponse {
        self.ledger
            .transact(at, |ctx| self.auth.initiate_challenge(ctx, client.identity_id()))
            .unwrap()
            .into()
    }

    fn login(&self, client: &Client, at: u64) -> TgtCredential {
        let challenge = self.challenge(client, at);
        let request = client.answer_challenge(&challenge);
        self.ledger
            .transact(at, |ctx| {
                self.auth
                    .verify_identity(ctx, &request.identity_id, &request.proof())
            })
            .unwrap();
        let issue = self
            .ledger
            .transact(at, |ctx| self.auth.issue_tgt(ctx, client.identity_id()))
            .unwrap();

        // Through the wire encoding, as a remote client would see it.
        let encoded = wire::encode(&TgtResponse::from(issue)).unwrap();
        let response: TgtResponse = wire::decode(&encoded, wire::DEFAULT_MAX_MESSAGE_SIZE).unwrap();
        client.accept_tgt(&response).unwrap()
    }

    fn request_ticket(
        &self,
        client: &Client,
        tgt: &TgtCredential,
        at: u64,
    ) -> Result<ServiceCredential, TicketChainError> {
        let request = client.service_ticket_request(tgt, SERVICE, at);
        let issue = self.ledger.transact(at, |ctx| {
            self.tgs.issue_service_ticket(
                ctx,
                &request.encrypted_tgt,
                &request.identity_id,
                &request.service_id,
                &request.authenticator,
            )
        })?;
        client.accept_service_ticket(tgt, &ServiceTicketResponse::from(issue))
    }
}

fn client() -> Client {
    Client::new(CLIENT, KeyPair::from_seed(&[7u8; 32]))
}

fn device_keys() -> KeyPair {
    KeyPair::from_seed(&[9u8; 32])
}

fn protocol_kind(err: &TicketChainError) -> ProtocolErrorKind {
    err.protocol_kind().cloned().unwrap_or_else(|| panic!("not a protocol error: {err}"))
}

#[test]
fn test_full_flow_grants_access() {
    let h = Harness::new();
    let client = client();
    h.enroll(&client, &device_keys());

    let tgt = h.login(&client, T0 + 1);
    assert_eq!(tgt.expires_at, T0 + 1 + 3600);

    let ticket = h.request_ticket(&client, &tgt, T0 + 2).unwrap();
    assert_eq!(ticket.service_id, SERVICE);

    let request = client
        .access_request(&ticket, DEVICE, RequestType::Read, T0 + 3, Some(&b"GET /temperature"[..]))
        .unwrap();
    let response = h
        .ledger
        .transact(T0 + 3, |ctx| h.isv.process_access_request(ctx, &request))
        .unwrap();
    assert!(response.is_granted(), "{response:?}");
    assert_eq!(response.request_sequence, Some(1));
    let session_id = response.session_id.clone().unwrap();

    let available = h
        .ledger
        .transact(T0 + 3, |ctx| h.isv.check_device_availability(&*ctx, DEVICE))
        .unwrap();
    assert!(!available);

    let receipt = h
        .ledger
        .transact(T0 + 4, |ctx| h.isv.process_request(ctx, &session_id, b"GET /humidity"))
        .unwrap();
    assert_eq!(receipt.sequence, 2);

    h.ledger
        .transact(T0 + 5, |ctx| h.isv.close_session(ctx, &session_id))
        .unwrap();
    let err = h
        .ledger
        .transact(T0 + 5, |ctx| h.isv.close_session(ctx, &session_id))
        .unwrap_err();
    assert!(matches!(protocol_kind(&err), ProtocolErrorKind::NoSession { .. }));
    let available = h
        .ledger
        .transact(T0 + 5, |ctx| h.isv.check_device_availability(&*ctx, DEVICE))
        .unwrap();
    assert!(available);

    assert_eq!(h.sink.count(AuditEventType::SessionCreated), 1);
    assert_eq!(h.sink.count(AuditEventType::SessionTerminated), 1);
}

#[test]
fn test_forged_proof_keeps_challenge() {
    let h = Harness::new();
    let client = client();
    h.enroll(&client, &device_keys());

    let challenge = h.challenge(&client, T0 + 1);
    let impostor = Client::new(CLIENT, KeyPair::from_seed(&[8u8; 32]));
    let forged = impostor.answer_challenge(&challenge);

    let err = h
        .ledger
        .transact(T0 + 1, |ctx| h.auth.verify_identity(ctx, CLIENT, &forged.proof()))
        .unwrap_err();
    assert_eq!(protocol_kind(&err), ProtocolErrorKind::Forged);
    assert_eq!(h.limiter.stats(CLIENT).unwrap().violation_count, 1);

    let genuine = client.answer_challenge(&challenge);
    h.ledger
        .transact(T0 + 2, |ctx| h.auth.verify_identity(ctx, CLIENT, &genuine.proof()))
        .unwrap();
}

#[test]
fn test_challenge_is_single_use() {
    let h = Harness::new();
    let client = client();
    h.enroll(&client, &device_keys());

    let challenge = h.challenge(&client, T0 + 1);
    let proof = client.answer_challenge(&challenge).proof();
    h.ledger
        .transact(T0 + 1, |ctx| h.auth.verify_identity(ctx, CLIENT, &proof))
        .unwrap();

    let err = h
        .ledger
        .transact(T0 + 2, |ctx| h.auth.verify_identity(ctx, CLIENT, &proof))
        .unwrap_err();
    assert!(matches!(protocol_kind(&err), ProtocolErrorKind::NoChallenge { .. }));
}

#[test]
fn test_encrypted_proof_mode() {
    let h = Harness::new();
    let client = client();
    h.enroll(&client, &device_keys());

    let challenge = h.challenge(&client, T0 + 1);
    let request = client
        .answer_challenge_encrypted(&challenge, &h.auth.public_key())
        .unwrap();
    let marker = h
        .ledger
        .transact(T0 + 1, |ctx| h.auth.verify_identity(ctx, CLIENT, &request.proof()))
        .unwrap();
    assert_eq!(marker.mode, "encryption");
}

#[test]
fn test_expired_challenge_is_removed() {
    let h = Harness::new();
    let client = client();
    h.enroll(&client, &device_keys());

    let challenge = h.challenge(&client, T0 + 1);
    let proof = client.answer_challenge(&challenge).proof();
    let late = challenge.expires_at;

    let err = h
        .ledger
        .transact(late, |ctx| h.auth.verify_identity(ctx, CLIENT, &proof))
        .unwrap_err();
    assert!(matches!(protocol_kind(&err), ProtocolErrorKind::Expired { .. }));

    let err = h
        .ledger
        .transact(late + 1, |ctx| h.auth.verify_identity(ctx, CLIENT, &proof))
        .unwrap_err();
    assert!(matches!(protocol_kind(&err), ProtocolErrorKind::NoChallenge { .. }));
}

#[test]
fn test_tgt_requires_verification() {
    let h = Harness::new();
    let client = client();
    h.enroll(&client, &device_keys());

    let err = h
        .ledger
        .transact(T0 + 1, |ctx| h.auth.issue_tgt(ctx, CLIENT))
        .unwrap_err();
    assert!(matches!(protocol_kind(&err), ProtocolErrorKind::Denied { .. }));
}

#[test]
fn test_revocation_blocks_new_and_existing_credentials() {
    let h = Harness::new();
    let client = client();
    h.enroll(&client, &device_keys());
    let tgt = h.login(&client, T0 + 1);
    let ticket = h.request_ticket(&client, &tgt, T0 + 2).unwrap();

    // Verified but not yet issued when the revocation lands.
    let challenge = h.challenge(&client, T0 + 3);
    let proof = client.answer_challenge(&challenge).proof();
    h.ledger
        .transact(T0 + 3, |ctx| h.auth.verify_identity(ctx, CLIENT, &proof))
        .unwrap();
    h.ledger
        .transact(T0 + 3, |ctx| h.auth.revoke(ctx, CLIENT))
        .unwrap();

    let err = h
        .ledger
        .transact(T0 + 4, |ctx| h.auth.issue_tgt(ctx, CLIENT))
        .unwrap_err();
    assert!(matches!(protocol_kind(&err), ProtocolErrorKind::Invalid { .. }));

    let err = h
        .ledger
        .transact(T0 + 4, |ctx| h.auth.initiate_challenge(ctx, CLIENT))
        .unwrap_err();
    assert_eq!(err.code(), "INVALID");

    let request = client
        .access_request(&ticket, DEVICE, RequestType::Read, T0 + 4, None)
        .unwrap();
    let response = h
        .ledger
        .transact(T0 + 4, |ctx| h.isv.process_access_request(ctx, &request))
        .unwrap();
    assert_eq!(response.status, AccessStatus::Denied);
    assert_eq!(response.error_code.as_deref(), Some("DENIED"));

    h.ledger
        .transact(T0 + 5, |ctx| h.auth.reinstate(ctx, CLIENT))
        .unwrap();
    h.login(&client, T0 + 6);
}

#[test]
fn test_ticket_is_scoped_to_its_service() {
    let h = Harness::new();
    let client = client();
    h.enroll(&client, &device_keys());
    let tgt = h.login(&client, T0 + 1);
    let ticket = h.request_ticket(&client, &tgt, T0 + 2).unwrap();

    // Same key, different service name.
    let engine = EngineContext::new(
        Arc::new(Deriver::new(b"shared-replica-secret")),
        Arc::new(RateLimiter::new(RateLimitPolicy::default())),
        AuditLogger::null("TEST"),
        TicketConfig::default(),
    );
    let other = ServiceValidator::new("iot2", KeyPair::from_seed(&[3u8; 32]), engine).unwrap();
    let err = h
        .ledger
        .transact(T0 + 3, |ctx| {
            other.validate_service_ticket(&*ctx, &ticket.encrypted_service_ticket)
        })
        .unwrap_err();
    assert_eq!(protocol_kind(&err), ProtocolErrorKind::InvalidTicket);

    let request = client.service_ticket_request(&tgt, "iot9", T0 + 3);
    let err = h
        .ledger
        .transact(T0 + 3, |ctx| {
            h.tgs.issue_service_ticket(
                ctx,
                &request.encrypted_tgt,
                CLIENT,
                "iot9",
                &request.authenticator,
            )
        })
        .unwrap_err();
    assert!(matches!(protocol_kind(&err), ProtocolErrorKind::NotFound { .. }));
}

#[test]
fn test_authenticator_replay_is_refused() {
    let h = Harness::new();
    let client = client();
    h.enroll(&client, &device_keys());
    let tgt = h.login(&client, T0 + 1);

    let request = client.service_ticket_request(&tgt, SERVICE, T0 + 2);
    let issue = |at: u64| {
        h.ledger.transact(at, |ctx| {
            h.tgs.issue_service_ticket(
                ctx,
                &request.encrypted_tgt,
                &request.identity_id,
                &request.service_id,
                &request.authenticator,
            )
        })
    };
    issue(T0 + 2).unwrap();
    let err = issue(T0 + 3).unwrap_err();
    assert_eq!(protocol_kind(&err), ProtocolErrorKind::Forged);

    // Past the replay window the entry can be purged.
    let purged = h
        .ledger
        .transact(T0 + 2 + 601, |ctx| h.tgs.purge_authenticator_cache(ctx))
        .unwrap();
    assert_eq!(purged, 1);
}

#[test]
fn test_tgt_bound_to_identity() {
    let h = Harness::new();
    let client = client();
    h.enroll(&client, &device_keys());
    let tgt = h.login(&client, T0 + 1);

    let request = client.service_ticket_request(&tgt, SERVICE, T0 + 2);
    let err = h
        .ledger
        .transact(T0 + 2, |ctx| {
            h.tgs.issue_service_ticket(
                ctx,
                &request.encrypted_tgt,
                "mallory",
                SERVICE,
                &request.authenticator,
            )
        })
        .unwrap_err();
    assert_eq!(protocol_kind(&err), ProtocolErrorKind::Forged);

    let err = h
        .ledger
        .transact(T0 + 2, |ctx| {
            h.tgs
                .issue_service_ticket(ctx, b"not a ticket", CLIENT, SERVICE, &request.authenticator)
        })
        .unwrap_err();
    assert_eq!(protocol_kind(&err), ProtocolErrorKind::InvalidTicket);
}

#[test]
fn test_expired_credentials() {
    let h = Harness::new();
    let client = client();
    h.enroll(&client, &device_keys());
    let tgt = h.login(&client, T0 + 1);
    let ticket = h.request_ticket(&client, &tgt, T0 + 2).unwrap();

    let late = tgt.expires_at;
    let err = h.request_ticket(&client, &tgt, late).unwrap_err();
    assert_eq!(
        protocol_kind(&err),
        ProtocolErrorKind::Expired {
            what: "TGT".to_string()
        }
    );

    let late = ticket.expires_at;
    let request = client
        .access_request(&ticket, DEVICE, RequestType::Read, late, None)
        .unwrap();
    let response = h
        .ledger
        .transact(late, |ctx| h.isv.process_access_request(ctx, &request))
        .unwrap();
    assert!(!response.is_granted());
    assert_eq!(response.error_code.as_deref(), Some("EXPIRED"));
    // One from the TGS for the TGT, one from the ISV.
    assert_eq!(h.sink.count(AuditEventType::ServiceTicketExpired), 2);
}

#[test]
fn test_busy_and_suspended_devices_refuse_sessions() {
    let h = Harness::new();
    let client = client();
    let device = device_keys();
    h.enroll(&client, &device);
    let tgt = h.login(&client, T0 + 1);
    let ticket = h.request_ticket(&client, &tgt, T0 + 2).unwrap();

    let access = |at: u64, request_type: RequestType| {
        let request = client
            .access_request(&ticket, DEVICE, request_type, at, None)
            .unwrap();
        h.ledger
            .transact(at, |ctx| h.isv.process_access_request(ctx, &request))
            .unwrap()
    };

    assert!(access(T0 + 3, RequestType::Read).is_granted());
    let second = access(T0 + 4, RequestType::Write);
    assert_eq!(second.error_code.as_deref(), Some("DENIED"));

    let session = h
        .ledger
        .transact(T0 + 5, |ctx| h.isv.active_sessions(&*ctx, CLIENT))
        .unwrap()
        .remove(0);
    h.ledger
        .transact(T0 + 5, |ctx| h.isv.close_session(ctx, &session.session_id))
        .unwrap();

    // Unsupported operation on a free device.
    let response = access(T0 + 6, RequestType::Execute);
    assert_eq!(response.error_code.as_deref(), Some("DENIED"));

    let last_seen = h
        .ledger
        .transact(T0 + 7, |ctx| h.isv.list_devices(&*ctx))
        .unwrap()[0]
        .last_seen;
    let signature = sign_device_status(&device, DEVICE, DeviceStatus::Suspended, last_seen);
    h.ledger
        .transact(T0 + 7, |ctx| {
            h.isv
                .update_device_status(ctx, DEVICE, DeviceStatus::Suspended, &signature)
        })
        .unwrap();
    assert_eq!(access(T0 + 8, RequestType::Read).error_code.as_deref(), Some("DENIED"));

    // The signature covered the old last_seen and cannot be reused.
    let err = h
        .ledger
        .transact(T0 + 9, |ctx| {
            h.isv
                .update_device_status(ctx, DEVICE, DeviceStatus::Suspended, &signature)
        })
        .unwrap_err();
    assert_eq!(protocol_kind(&err), ProtocolErrorKind::Forged);
}

#[test]
fn test_access_request_identity_must_match_ticket() {
    let h = Harness::new();
    let client = client();
    h.enroll(&client, &device_keys());
    let tgt = h.login(&client, T0 + 1);
    let ticket = h.request_ticket(&client, &tgt, T0 + 2).unwrap();

    let mut request = client
        .access_request(&ticket, DEVICE, RequestType::Read, T0 + 3, None)
        .unwrap();
    request.identity_id = "mallory".to_string();
    let response = h
        .ledger
        .transact(T0 + 3, |ctx| h.isv.process_access_request(ctx, &request))
        .unwrap();
    assert_eq!(response.error_code.as_deref(), Some("FORGED"));
    assert_eq!(h.limiter.stats("mallory").unwrap().violation_count, 1);

    let mut request = client
        .access_request(&ticket, DEVICE, RequestType::Read, T0 + 3, None)
        .unwrap();
    request.request_type = "sudo".to_string();
    let response = h
        .ledger
        .transact(T0 + 3, |ctx| h.isv.process_access_request(ctx, &request))
        .unwrap();
    assert_eq!(response.error_code.as_deref(), Some("INVALID"));
}

#[test]
fn test_rate_limit_escalates_to_ban() {
    let h = Harness::with_policy(RateLimitPolicy {
        max_requests: 2,
        window: Duration::from_secs(60),
        violation_threshold: 2,
        ban_duration: Duration::from_secs(300),
        idle_eviction: Duration::from_secs(3600),
    });
    let client = client();
    h.enroll(&client, &device_keys());

    // Registration used one request from the window.
    h.challenge(&client, T0 + 1);
    let err = h
        .ledger
        .transact(T0 + 2, |ctx| h.auth.initiate_challenge(ctx, CLIENT))
        .unwrap_err();
    assert!(matches!(protocol_kind(&err), ProtocolErrorKind::RateLimited { .. }));

    let err = h
        .ledger
        .transact(T0 + 3, |ctx| h.auth.initiate_challenge(ctx, CLIENT))
        .unwrap_err();
    assert!(matches!(protocol_kind(&err), ProtocolErrorKind::Banned { .. }));
    assert!(h.limiter.is_banned(CLIENT));
    assert_eq!(h.sink.count(AuditEventType::RateLimitExceeded), 1);

    h.limiter.unban(CLIENT);
    h.challenge(&client, T0 + 4);
}

#[test]
fn test_replicas_reach_identical_state() {
    let run = || {
        let h = Harness::new();
        let client = client();
        h.enroll(&client, &device_keys());
        let tgt = h.login(&client, T0 + 1);
        let ticket = h.request_ticket(&client, &tgt, T0 + 2).unwrap();
        let request = client
            .access_request(&ticket, DEVICE, RequestType::Write, T0 + 3, Some(&b"SET 21.5"[..]))
            .unwrap();
        let response = h
            .ledger
            .transact(T0 + 3, |ctx| h.isv.process_access_request(ctx, &request))
            .unwrap();
        assert!(response.is_granted());
        (h.ledger.snapshot(), tgt.encrypted_tgt, ticket.encrypted_service_ticket)
    };

    let (state_a, tgt_a, ticket_a) = run();
    let (state_b, tgt_b, ticket_b) = run();
    assert_eq!(tgt_a, tgt_b);
    assert_eq!(ticket_a, ticket_b);
    assert_eq!(state_a, state_b);
}

#[test]
fn test_encrypted_proofs_can_be_disabled() {
    let deriver = Arc::new(Deriver::new(b"shared-replica-secret"));
    let engine = EngineContext::new(
        Arc::clone(&deriver),
        Arc::new(RateLimiter::new(RateLimitPolicy::default())),
        AuditLogger::null("TEST"),
        TicketConfig::default(),
    );
    let auth = AuthServer::new(
        KeyPair::from_seed(&[1u8; 32]),
        KeyPair::from_seed(&[2u8; 32]).public_key(),
        engine,
    )
    .with_encrypted_proofs(false);
    let ledger = MemoryLedger::new();
    let client = client();
    let pem = client.public_key().to_pem();

    ledger
        .transact(T0, |ctx| auth.register(ctx, CLIENT, IdentityKind::Client, &pem))
        .unwrap();
    let challenge: AuthChallengeResponse = ledger
        .transact(T0 + 1, |ctx| auth.initiate_challenge(ctx, CLIENT))
        .unwrap()
        .into();
    let request = client
        .answer_challenge_encrypted(&challenge, &auth.public_key())
        .unwrap();
    let err = ledger
        .transact(T0 + 1, |ctx| auth.verify_identity(ctx, CLIENT, &request.proof()))
        .unwrap_err();
    assert!(matches!(protocol_kind(&err), ProtocolErrorKind::Denied { .. }));

    let signed = ChallengeProof::Signature(client.answer_challenge(&challenge).signature_or_ciphertext);
    ledger
        .transact(T0 + 1, |ctx| auth.verify_identity(ctx, CLIENT, &signed))
        .unwrap();
}

#[test]
fn test_node_from_bootstrapped_keys() {
    let dir = TempDir::new().unwrap();
    let mut settings = Settings::default();
    settings.keys.dir = dir.path().join("keys");
    settings.audit.log_path = dir.path().join("audit.log");

    bootstrap_keys(&settings).unwrap();
    let node = Node::from_settings(&settings).unwrap();
    let ledger = MemoryLedger::new();
    let client = client();
    let pem = client.public_key().to_pem();

    ledger
        .transact(T0, |ctx| {
            node.auth_server
                .register(ctx, CLIENT, IdentityKind::Client, &pem)
        })
        .unwrap();
    let challenge: AuthChallengeResponse = ledger
        .transact(T0 + 1, |ctx| node.auth_server.initiate_challenge(ctx, CLIENT))
        .unwrap()
        .into();
    let proof = client.answer_challenge(&challenge).proof();
    ledger
        .transact(T0 + 1, |ctx| node.auth_server.verify_identity(ctx, CLIENT, &proof))
        .unwrap();
    ledger
        .transact(T0 + 1, |ctx| node.auth_server.issue_tgt(ctx, CLIENT))
        .unwrap();

    let log = std::fs::read_to_string(&settings.audit.log_path).unwrap();
    assert!(log.lines().count() >= 3);
    assert!(log.contains("client1"));
}
