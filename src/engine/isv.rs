//! Service validator.
//!
//! Validates service tickets addressed to one service, keeps the device
//! registry for that service and mediates sessions between clients and
//! devices.
//!
//! Per session: `Open -> Active* -> Closed`. A closed session is deleted and
//! its id is never reopened.

use std::sync::Arc;

use ring::digest;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::audit::{AuditEvent, AuditEventType, AuditResult, Severity};
use crate::crypto::{seal, KeyPair, PublicKey};
use crate::error::{ProtocolErrorKind, TicketChainError, TicketChainResult, ValidationErrorKind};
use crate::ledger::keys::{
    device_key, prefix_range, request_key, session_key, DEVICE_PREFIX, SESSION_PREFIX,
};
use crate::ledger::{TxContext, TxContextExt};
use crate::protocol::{AccessRequest, AccessResponse};
use crate::ticket::{ServiceTicketClaims, TicketClaims, TicketVerifier, ValidatedTicket};
use crate::validation::{
    validate_identifier, validate_payload_size, validate_public_key_pem, validate_request_type,
    validate_timestamp, DeviceStatus, RequestType,
};

use super::as_server::AsQuery;
use super::{stamp, EngineContext};

/// A device registered with this validator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    pub device_id: String,
    pub public_key: String,
    pub status: DeviceStatus,
    pub capabilities: Vec<RequestType>,
    pub registered_at: u64,
    pub last_seen: u64,
    /// Session currently holding the device busy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub held_by: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    /// Opened, no request processed yet.
    Open,
    /// At least one request processed.
    Active,
}

/// An authenticated client-device session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub session_id: String,
    pub identity_id: String,
    pub service_id: String,
    pub device_id: String,
    pub request_type: RequestType,
    pub opened_at: u64,
    pub expires_at: u64,
    pub status: SessionStatus,
    pub request_count: u64,
    pub last_activity: u64,
}

/// Ledger record of one processed request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestReceipt {
    pub session_id: String,
    pub sequence: u64,
    pub request_type: RequestType,
    pub received_at: u64,
    pub payload_size: usize,
    /// Hex SHA-256 of the payload.
    pub payload_digest: String,
}

/// The service validator for one service id.
pub struct ServiceValidator {
    service_id: String,
    keypair: KeyPair,
    engine: EngineContext,
    directory: Option<Arc<dyn AsQuery>>,
}

impl ServiceValidator {
    pub fn new(
        service_id: impl Into<String>,
        keypair: KeyPair,
        engine: EngineContext,
    ) -> TicketChainResult<Self> {
        let service_id = service_id.into();
        validate_identifier("serviceId", &service_id)?;
        let audit = engine.audit.for_component("ISV");
        Ok(Self {
            service_id,
            keypair,
            engine: EngineContext { audit, ..engine },
            directory: None,
        })
    }

    /// Refuse sessions for identities the AS reports as revoked.
    pub fn with_identity_directory(mut self, directory: Arc<dyn AsQuery>) -> Self {
        self.directory = Some(directory);
        self
    }

    pub fn service_id(&self) -> &str {
        &self.service_id
    }

    pub fn public_key(&self) -> PublicKey {
        self.keypair.public_key()
    }

    /// Message a device signs to change its status.
    ///
    /// Format: `{device_id}:{status}:{last_seen}`. Binding `last_seen` makes
    /// every signature single-use, since each update advances it.
    pub fn device_status_message(device_id: &str, status: DeviceStatus, last_seen: u64) -> String {
        format!("{}:{}:{}", device_id, status, last_seen)
    }

    /// Open a service ticket and check its window and scope.
    pub fn validate_service_ticket(
        &self,
        ctx: &dyn TxContext,
        encrypted_service_ticket: &[u8],
    ) -> TicketChainResult<ValidatedTicket> {
        let now = ctx.tx_timestamp();
        let result = self.open_ticket(encrypted_service_ticket).and_then(|claims| {
            if claims.service_id != self.service_id {
                return Err(TicketChainError::protocol(ProtocolErrorKind::InvalidTicket));
            }
            if !claims.is_valid_at(now) {
                return Err(TicketChainError::protocol(ProtocolErrorKind::Expired {
                    what: "service ticket".to_string(),
                }));
            }
            Ok(ValidatedTicket::new(claims))
        });

        match &result {
            Ok(ticket) => debug!(
                identity = %ticket.identity_id(),
                service = %self.service_id,
                "Service ticket validated"
            ),
            Err(e) => self.audit_ticket_rejection(ctx, e),
        }
        result
    }

    fn audit_ticket_rejection(&self, ctx: &dyn TxContext, error: &TicketChainError) {
        warn!(service = %self.service_id, error = %error, "Service ticket rejected");
        let event_type = if matches!(error.protocol_kind(), Some(ProtocolErrorKind::Expired { .. })) {
            AuditEventType::ServiceTicketExpired
        } else {
            AuditEventType::ValidationFailed
        };
        self.engine.audit.log_event(
            stamp(ctx),
            event_type,
            Severity::Warning,
            AuditResult::failure(error.code(), error.to_string()),
            format!("Service ticket for {} rejected", self.service_id),
        );
    }

    /// Open a session on a device for a validated ticket.
    pub fn open_session(
        &self,
        ctx: &mut dyn TxContext,
        ticket: &ValidatedTicket,
        device_id: &str,
        request_type: RequestType,
    ) -> TicketChainResult<Session> {
        self.open_session_charged(ctx, ticket, device_id, request_type, true)
    }

    fn open_session_charged(
        &self,
        ctx: &mut dyn TxContext,
        ticket: &ValidatedTicket,
        device_id: &str,
        request_type: RequestType,
        charge: bool,
    ) -> TicketChainResult<Session> {
        let result = self.open_session_inner(ctx, ticket, device_id, request_type, charge);
        let identity_id = ticket.identity_id();
        self.engine.audit.log_access_attempt(
            stamp(ctx),
            identity_id,
            device_id,
            request_type.as_str(),
            result.as_ref().map(|s| s.session_id.as_str()),
        );
        match &result {
            Ok(session) => {
                self.engine
                    .audit
                    .log_session_event(stamp(ctx), &session.session_id, identity_id, true);
                info!(
                    session = %session.session_id,
                    identity = %identity_id,
                    device = %device_id,
                    request_type = %request_type,
                    "Session opened"
                );
            }
            Err(e) => warn!(identity = %identity_id, device = %device_id, error = %e, "Access denied"),
        }
        result
    }

    fn open_session_inner(
        &self,
        ctx: &mut dyn TxContext,
        ticket: &ValidatedTicket,
        device_id: &str,
        request_type: RequestType,
        charge: bool,
    ) -> TicketChainResult<Session> {
        validate_identifier("deviceId", device_id)?;
        let identity_id = ticket.identity_id();
        if charge {
            self.engine.rate_limiter.allow_request(identity_id)?;
        }

        // The ticket may have been validated in an earlier transaction.
        let now = ctx.tx_timestamp();
        if now >= ticket.expires_at() {
            let err = TicketChainError::protocol(ProtocolErrorKind::Expired {
                what: "service ticket".to_string(),
            });
            self.audit_ticket_rejection(&*ctx, &err);
            return Err(err);
        }

        if let Some(directory) = &self.directory {
            match directory.check_validity(&*ctx, identity_id) {
                Ok(true) => {}
                Ok(false) => return Err(denied(format!("identity {} is revoked", identity_id))),
                Err(e) if e.protocol_kind().is_some() => {
                    return Err(denied(format!("identity {} is unknown", identity_id)))
                }
                Err(e) => return Err(e),
            }
        }

        let mut device = ctx
            .get_json::<Device>(&device_key(device_id))?
            .ok_or_else(|| denied(format!("device {} is not registered", device_id)))?;
        if device.status == DeviceStatus::Busy {
            device = self.release_lapsed_hold(ctx, device)?;
        }
        if !device.status.is_available() {
            return Err(denied(format!("device {} is {}", device_id, device.status)));
        }
        if !device.capabilities.contains(&request_type) {
            return Err(denied(format!(
                "device {} does not support {}",
                device_id, request_type
            )));
        }

        let session_id = self.engine.deriver.derive_id(
            "SESSION",
            &format!("{}:{}", identity_id, device_id),
            now,
        );
        let key = session_key(&session_id);
        if ctx.get_state(&key)?.is_some() {
            return Err(TicketChainError::protocol(ProtocolErrorKind::AlreadyExists {
                id: session_id,
            }));
        }

        let session = Session {
            session_id,
            identity_id: identity_id.to_string(),
            service_id: ticket.service_id().to_string(),
            device_id: device_id.to_string(),
            request_type,
            opened_at: now,
            expires_at: now
                .saturating_add(self.engine.tickets.session_lifetime_seconds)
                .min(ticket.expires_at()),
            status: SessionStatus::Open,
            request_count: 0,
            last_activity: now,
        };
        ctx.put_json(&key, &session)?;

        device.status = DeviceStatus::Busy;
        device.last_seen = now;
        device.held_by = Some(session.session_id.clone());
        ctx.put_json(&device_key(device_id), &device)?;

        Ok(session)
    }

    /// End the session holding a busy device if it has expired unclosed.
    fn release_lapsed_hold(&self, ctx: &mut dyn TxContext, device: Device) -> TicketChainResult<Device> {
        let holder = match device.held_by.clone() {
            Some(holder) => holder,
            None => return Ok(device),
        };
        let now = ctx.tx_timestamp();
        let key = device_key(&device.device_id);
        match ctx.get_json::<Session>(&session_key(&holder))? {
            Some(session) if now < session.expires_at => Ok(device),
            Some(session) => {
                debug!(
                    session = %session.session_id,
                    device = %device.device_id,
                    "Releasing device held by expired session"
                );
                self.end_session(ctx, &session)?;
                Ok(ctx.get_json::<Device>(&key)?.unwrap_or(device))
            }
            None => {
                let mut device = device;
                device.status = DeviceStatus::Active;
                device.held_by = None;
                device.last_seen = now;
                ctx.put_json(&key, &device)?;
                Ok(device)
            }
        }
    }

    /// Record a request made within a session.
    pub fn process_request(
        &self,
        ctx: &mut dyn TxContext,
        session_id: &str,
        payload: &[u8],
    ) -> TicketChainResult<RequestReceipt> {
        let result = self.process_request_inner(ctx, session_id, payload);
        if let Err(e) = &result {
            warn!(session = %session_id, error = %e, "Request refused");
            self.engine
                .audit
                .log_session_error(stamp(ctx), session_id, "REQUEST", e);
        }
        result
    }

    fn process_request_inner(
        &self,
        ctx: &mut dyn TxContext,
        session_id: &str,
        payload: &[u8],
    ) -> TicketChainResult<RequestReceipt> {
        validate_payload_size(payload)?;
        let now = ctx.tx_timestamp();
        let mut session = self.load_session(ctx, session_id)?;

        if now >= session.expires_at {
            self.end_session(ctx, &session)?;
            return Err(TicketChainError::protocol(ProtocolErrorKind::Expired {
                what: "session".to_string(),
            }));
        }
        self.engine.rate_limiter.allow_request(&session.identity_id)?;
        self.record_request(ctx, &mut session, payload)
    }

    /// Write the receipt and advance the session. No checks.
    fn record_request(
        &self,
        ctx: &mut dyn TxContext,
        session: &mut Session,
        payload: &[u8],
    ) -> TicketChainResult<RequestReceipt> {
        let now = ctx.tx_timestamp();
        let sequence = session.request_count + 1;
        let receipt = RequestReceipt {
            session_id: session.session_id.clone(),
            sequence,
            request_type: session.request_type,
            received_at: now,
            payload_size: payload.len(),
            payload_digest: hex::encode(digest::digest(&digest::SHA256, payload)),
        };
        ctx.put_json(&request_key(&session.session_id, sequence), &receipt)?;

        session.request_count = sequence;
        session.status = SessionStatus::Active;
        session.last_activity = now;
        ctx.put_json(&session_key(&session.session_id), &*session)?;

        debug!(session = %session.session_id, sequence, size = payload.len(), "Request recorded");
        Ok(receipt)
    }

    /// Close a session and free its device.
    pub fn close_session(&self, ctx: &mut dyn TxContext, session_id: &str) -> TicketChainResult<()> {
        let result = match self.load_session(ctx, session_id) {
            Ok(session) => self.end_session(ctx, &session).map(|_| session),
            Err(e) => Err(e),
        };
        match &result {
            Ok(session) => {
                info!(session = %session_id, identity = %session.identity_id, "Session closed")
            }
            Err(e) => {
                warn!(session = %session_id, error = %e, "Close refused");
                self.engine
                    .audit
                    .log_session_error(stamp(ctx), session_id, "CLOSE", e);
            }
        }
        result.map(|_| ())
    }

    fn load_session(&self, ctx: &dyn TxContext, session_id: &str) -> TicketChainResult<Session> {
        ctx.get_json::<Session>(&session_key(session_id))?
            .filter(|s| s.service_id == self.service_id)
            .ok_or_else(|| {
                TicketChainError::protocol(ProtocolErrorKind::NoSession {
                    id: session_id.to_string(),
                })
            })
    }

    fn end_session(&self, ctx: &mut dyn TxContext, session: &Session) -> TicketChainResult<()> {
        ctx.del_state(&session_key(&session.session_id))?;

        let key = device_key(&session.device_id);
        if let Some(mut device) = ctx.get_json::<Device>(&key)? {
            let held_here = device
                .held_by
                .as_deref()
                .map_or(true, |holder| holder == session.session_id);
            if held_here && (device.status == DeviceStatus::Busy || device.held_by.is_some()) {
                if device.status == DeviceStatus::Busy {
                    device.status = DeviceStatus::Active;
                }
                device.held_by = None;
                device.last_seen = ctx.tx_timestamp();
                ctx.put_json(&key, &device)?;
            }
        }

        self.engine.audit.log_session_event(
            stamp(ctx),
            &session.session_id,
            &session.identity_id,
            false,
        );
        Ok(())
    }

    /// Unexpired sessions held by an identity.
    pub fn active_sessions(&self, ctx: &dyn TxContext, identity_id: &str) -> TicketChainResult<Vec<Session>> {
        let now = ctx.tx_timestamp();
        let (start, end) = prefix_range(SESSION_PREFIX);
        Ok(ctx
            .range_json::<Session>(&start, &end)?
            .into_iter()
            .map(|(_, session)| session)
            .filter(|s| {
                s.identity_id == identity_id && s.service_id == self.service_id && now < s.expires_at
            })
            .collect())
    }

    /// Register a device with its public key and supported operations.
    pub fn register_device(
        &self,
        ctx: &mut dyn TxContext,
        device_id: &str,
        public_key_pem: &str,
        capabilities: &[RequestType],
    ) -> TicketChainResult<Device> {
        let result = self.register_device_inner(ctx, device_id, public_key_pem, capabilities);
        self.engine.audit.log_registration(
            stamp(ctx),
            device_id,
            "device",
            result.as_ref().map(|_| ()),
        );
        match &result {
            Ok(_) => info!(device = %device_id, "Device registered"),
            Err(e) => warn!(device = %device_id, error = %e, "Device registration rejected"),
        }
        result
    }

    fn register_device_inner(
        &self,
        ctx: &mut dyn TxContext,
        device_id: &str,
        public_key_pem: &str,
        capabilities: &[RequestType],
    ) -> TicketChainResult<Device> {
        validate_identifier("deviceId", device_id)?;
        validate_public_key_pem(public_key_pem)?;
        PublicKey::from_pem(public_key_pem).map_err(|e| {
            TicketChainError::validation(ValidationErrorKind::InvalidPublicKey {
                reason: e.to_string(),
            })
        })?;

        let key = device_key(device_id);
        if ctx.get_state(&key)?.is_some() {
            return Err(TicketChainError::protocol(ProtocolErrorKind::AlreadyExists {
                id: device_id.to_string(),
            }));
        }

        let mut capabilities = capabilities.to_vec();
        capabilities.sort_by_key(|c| c.as_str());
        capabilities.dedup();

        let now = ctx.tx_timestamp();
        let device = Device {
            device_id: device_id.to_string(),
            public_key: public_key_pem.to_string(),
            status: DeviceStatus::Active,
            capabilities,
            registered_at: now,
            last_seen: now,
            held_by: None,
        };
        ctx.put_json(&key, &device)?;
        Ok(device)
    }

    /// Apply a status change signed by the device.
    pub fn update_device_status(
        &self,
        ctx: &mut dyn TxContext,
        device_id: &str,
        status: DeviceStatus,
        signature: &[u8],
    ) -> TicketChainResult<Device> {
        let key = device_key(device_id);
        let mut device = ctx.get_json::<Device>(&key)?.ok_or_else(|| {
            TicketChainError::protocol(ProtocolErrorKind::NotFound {
                resource: "device".to_string(),
                id: device_id.to_string(),
            })
        })?;

        let message = Self::device_status_message(device_id, status, device.last_seen);
        let verified = PublicKey::from_pem(&device.public_key)
            .and_then(|pk| pk.verify(message.as_bytes(), signature));
        if verified.is_err() {
            let err = TicketChainError::protocol(ProtocolErrorKind::Forged);
            self.engine
                .audit
                .log_validation_error(stamp(ctx), device_id, "DEVICE_STATUS", &err);
            warn!(device = %device_id, "Device status update with bad signature");
            return Err(err);
        }

        let previous = device.status;
        device.status = status;
        device.last_seen = ctx.tx_timestamp();
        ctx.put_json(&key, &device)?;

        self.engine.audit.emit(
            stamp(ctx),
            AuditEvent::new(
                AuditEventType::DeviceAuthenticated,
                Severity::Info,
                AuditResult::Success,
                format!("{} reported status {}", device_id, status),
            )
            .actor(device_id)
            .resource("DEVICE", device_id)
            .action("STATUS")
            .meta("previous", previous.as_str()),
        );
        info!(device = %device_id, from = %previous, to = %status, "Device status updated");
        Ok(device)
    }

    /// Whether a device can accept a new session.
    pub fn check_device_availability(&self, ctx: &dyn TxContext, device_id: &str) -> TicketChainResult<bool> {
        let device = ctx.get_json::<Device>(&device_key(device_id))?.ok_or_else(|| {
            TicketChainError::protocol(ProtocolErrorKind::NotFound {
                resource: "device".to_string(),
                id: device_id.to_string(),
            })
        })?;
        Ok(device.status.is_available())
    }

    /// Every registered device, in id order.
    pub fn list_devices(&self, ctx: &dyn TxContext) -> TicketChainResult<Vec<Device>> {
        let (start, end) = prefix_range(DEVICE_PREFIX);
        Ok(ctx
            .range_json::<Device>(&start, &end)?
            .into_iter()
            .map(|(_, device)| device)
            .collect())
    }

    /// Validate, authorize and open a session in one call.
    ///
    /// Every check runs before the session is opened, and the identity is
    /// charged against the rate limiter once. Refusals come back as a denied
    /// [`AccessResponse`]; only ledger and encoding failures are returned as
    /// errors.
    pub fn process_access_request(
        &self,
        ctx: &mut dyn TxContext,
        request: &AccessRequest,
    ) -> TicketChainResult<AccessResponse> {
        match self.process_access_request_inner(ctx, request) {
            Ok(response) => Ok(response),
            Err(e) if is_refusal(&e) => Ok(AccessResponse::denied(
                &request.identity_id,
                &request.target_id,
                &e,
            )),
            Err(e) => Err(e),
        }
    }

    fn process_access_request_inner(
        &self,
        ctx: &mut dyn TxContext,
        request: &AccessRequest,
    ) -> TicketChainResult<AccessResponse> {
        let ticket = self.validate_service_ticket(&*ctx, &request.encrypted_service_ticket)?;
        let (request_type, payload) = match self.admit_access_request(ctx, request, &ticket) {
            Ok(admitted) => admitted,
            Err(e) => {
                if matches!(e.protocol_kind(), Some(ProtocolErrorKind::Forged)) {
                    self.engine.rate_limiter.record_violation(&request.identity_id);
                }
                self.engine.audit.log_access_attempt(
                    stamp(ctx),
                    &request.identity_id,
                    &request.target_id,
                    &request.request_type,
                    Err(&e),
                );
                return Err(e);
            }
        };

        let mut session =
            self.open_session_charged(ctx, &ticket, &request.target_id, request_type, false)?;
        let mut response = AccessResponse::granted(
            &request.identity_id,
            &request.target_id,
            &session.session_id,
            session.expires_at,
        );
        if let Some(payload) = payload {
            match self.record_request(ctx, &mut session, &payload) {
                Ok(receipt) => response = response.with_request_sequence(receipt.sequence),
                Err(e) => {
                    self.end_session(ctx, &session)?;
                    return Err(e);
                }
            }
        }
        Ok(response)
    }

    /// Checks that must pass before any state is written.
    fn admit_access_request(
        &self,
        ctx: &dyn TxContext,
        request: &AccessRequest,
        ticket: &ValidatedTicket,
    ) -> TicketChainResult<(RequestType, Option<Vec<u8>>)> {
        if ticket.identity_id() != request.identity_id {
            return Err(TicketChainError::protocol(ProtocolErrorKind::Forged));
        }

        validate_timestamp(
            request.timestamp,
            ctx.tx_timestamp(),
            self.engine.tickets.max_clock_skew_seconds,
        )?;
        let request_type = validate_request_type(&request.request_type)?;

        let payload = match &request.payload {
            Some(sealed) => {
                let payload = seal::open_symmetric(ticket.ticket_key(), seal::purpose::ACCESS_PAYLOAD, sealed)
                    .map_err(|_| TicketChainError::protocol(ProtocolErrorKind::Forged))?;
                validate_payload_size(&payload)?;
                Some(payload)
            }
            None => None,
        };

        self.engine.rate_limiter.allow_request(&request.identity_id)?;
        Ok((request_type, payload))
    }
}

impl TicketVerifier for ServiceValidator {
    type Claims = ServiceTicketClaims;

    fn keypair(&self) -> &KeyPair {
        &self.keypair
    }
}

impl std::fmt::Debug for ServiceValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceValidator")
            .field("service_id", &self.service_id)
            .field("public_key", &self.keypair.public_key())
            .field("directory", &self.directory.is_some())
            .finish_non_exhaustive()
    }
}

fn denied(reason: String) -> TicketChainError {
    TicketChainError::protocol(ProtocolErrorKind::Denied { reason })
}

fn is_refusal(error: &TicketChainError) -> bool {
    matches!(
        error,
        TicketChainError::Protocol { .. } | TicketChainError::Validation { .. }
    )
}
