//! Audit logger and sinks.
//!
//! The logger stamps and sanitizes events; sinks persist them. The file sink
//! writes JSON lines (one JSON object per line).

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, SecondsFormat, Utc};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::crypto::Deriver;
use crate::error::TicketChainError;

use super::entry::{AuditEvent, AuditEventType, AuditResult, Severity};
use super::sanitize::sanitize_metadata;

/// Destination for emitted audit events.
pub trait AuditSink: Send + Sync {
    fn record(&self, event: &AuditEvent) -> Result<(), TicketChainError>;
}

/// Where an event is being emitted from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventStamp {
    /// Inside a replicated transaction: id and time derive from the
    /// transaction timestamp.
    Transaction { timestamp: u64 },
    /// Outside the replicated path (rate limiter): local clock, random id.
    Local,
}

/// Writes audit events to a file in JSON lines format.
pub struct JsonLinesAuditSink {
    file: Mutex<File>,
    path: PathBuf,
}

impl JsonLinesAuditSink {
    /// Open (append) the audit file, creating its directory if needed.
    pub fn new(path: &Path) -> Result<Self, TicketChainError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                debug!(path = %parent.display(), "Creating audit log directory");
                std::fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;

        debug!(path = %path.display(), "Audit sink initialized");

        Ok(Self {
            file: Mutex::new(file),
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AuditSink for JsonLinesAuditSink {
    fn record(&self, event: &AuditEvent) -> Result<(), TicketChainError> {
        let json = serde_json::to_string(event)?;

        let mut file = self.file.lock().unwrap_or_else(|e| e.into_inner());
        writeln!(file, "{}", json)?;

        if let Err(e) = file.sync_data() {
            warn!(error = %e, "Failed to sync audit log");
        }

        Ok(())
    }
}

/// Discards every event.
#[derive(Debug, Default)]
pub struct NullAuditSink;

impl AuditSink for NullAuditSink {
    fn record(&self, _event: &AuditEvent) -> Result<(), TicketChainError> {
        Ok(())
    }
}

/// Keeps events in memory; used by tests and embedders that forward events.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    events: Mutex<Vec<AuditEvent>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn count(&self, event_type: AuditEventType) -> usize {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|e| e.event_type == event_type)
            .count()
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, event: &AuditEvent) -> Result<(), TicketChainError> {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(event.clone());
        Ok(())
    }
}

/// Structured audit logger for one component.
#[derive(Clone)]
pub struct AuditLogger {
    component: String,
    sink: Arc<dyn AuditSink>,
    deriver: Arc<Deriver>,
}

impl AuditLogger {
    pub fn new(component: impl Into<String>, sink: Arc<dyn AuditSink>, deriver: Arc<Deriver>) -> Self {
        Self {
            component: component.into(),
            sink,
            deriver,
        }
    }

    /// A logger that drops everything.
    pub fn null(component: impl Into<String>) -> Self {
        Self::new(component, Arc::new(NullAuditSink), Arc::new(Deriver::default()))
    }

    /// Same sink and deriver, different component name.
    pub fn for_component(&self, component: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            sink: Arc::clone(&self.sink),
            deriver: Arc::clone(&self.deriver),
        }
    }

    pub fn component(&self) -> &str {
        &self.component
    }

    /// Emit a bare event and return it.
    pub fn log_event(
        &self,
        stamp: EventStamp,
        event_type: AuditEventType,
        severity: Severity,
        result: AuditResult,
        description: impl Into<String>,
    ) -> AuditEvent {
        self.emit(stamp, AuditEvent::new(event_type, severity, result, description))
    }

    /// Stamp, sanitize and deliver a prepared event.
    ///
    /// Sink failures are logged and never fail the audited operation.
    pub fn emit(&self, stamp: EventStamp, mut event: AuditEvent) -> AuditEvent {
        event.component = self.component.clone();
        event.metadata = sanitize_metadata(&event.metadata);

        match stamp {
            EventStamp::Transaction { timestamp } => {
                event.timestamp = format_timestamp(timestamp);
                let digest = self.deriver.derive_bytes(
                    "audit-event",
                    &[
                        self.component.as_bytes(),
                        event.event_type.as_str().as_bytes(),
                        event.actor_id.as_bytes(),
                        event.resource_id.as_bytes(),
                        event.description.as_bytes(),
                        &timestamp.to_be_bytes(),
                    ],
                );
                event.event_id = format!("EVT_{}", hex::encode(&digest[..16]));
            }
            EventStamp::Local => {
                event.timestamp = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
                event.event_id = format!("EVT_{}", Uuid::new_v4().simple());
            }
        }

        if let Err(e) = self.sink.record(&event) {
            warn!(error = %e, event_id = %event.event_id, "Failed to record audit event");
        } else {
            debug!(
                event_id = %event.event_id,
                event_type = event.event_type.as_str(),
                component = %event.component,
                "Audit event recorded"
            );
        }

        event
    }

    /// Identity or device registration outcome.
    pub fn log_registration(
        &self,
        stamp: EventStamp,
        identity_id: &str,
        kind: &str,
        outcome: Result<(), &TicketChainError>,
    ) -> AuditEvent {
        let (event_type, severity, result, description) = match outcome {
            Ok(()) => (
                AuditEventType::DeviceRegistered,
                Severity::Info,
                AuditResult::Success,
                format!("{} {} registered", kind, identity_id),
            ),
            Err(e) => (
                AuditEventType::ValidationFailed,
                Severity::Warning,
                failure_of(e),
                format!("Registration of {} rejected", identity_id),
            ),
        };
        self.emit(
            stamp,
            AuditEvent::new(event_type, severity, result, description)
                .actor(identity_id)
                .resource("IDENTITY", identity_id)
                .action("REGISTER")
                .meta("kind", kind),
        )
    }

    /// Challenge/response verification outcome.
    pub fn log_authentication(
        &self,
        stamp: EventStamp,
        identity_id: &str,
        mode: &str,
        outcome: Result<(), &TicketChainError>,
    ) -> AuditEvent {
        let (event_type, severity, result, description) = match outcome {
            Ok(()) => (
                AuditEventType::DeviceAuthenticated,
                Severity::Info,
                AuditResult::Success,
                format!("{} proved possession of its key", identity_id),
            ),
            Err(e) => {
                let event_type = match e.protocol_kind() {
                    Some(crate::error::ProtocolErrorKind::Forged) => AuditEventType::SignatureInvalid,
                    Some(crate::error::ProtocolErrorKind::Expired { .. }) => {
                        AuditEventType::TimestampInvalid
                    }
                    _ => AuditEventType::AuthenticationFailed,
                };
                (
                    event_type,
                    Severity::Warning,
                    failure_of(e),
                    format!("Authentication of {} failed", identity_id),
                )
            }
        };
        self.emit(
            stamp,
            AuditEvent::new(event_type, severity, result, description)
                .actor(identity_id)
                .resource("CHALLENGE", identity_id)
                .action("VERIFY")
                .meta("mode", mode),
        )
    }

    /// TGT or service ticket issuance outcome.
    pub fn log_ticket_issuance(
        &self,
        stamp: EventStamp,
        identity_id: &str,
        ticket_type: &str,
        service_id: &str,
        outcome: Result<(), &TicketChainError>,
    ) -> AuditEvent {
        let (event_type, severity, result, description) = match outcome {
            Ok(()) => (
                AuditEventType::ServiceTicketIssued,
                Severity::Info,
                AuditResult::Success,
                format!("{} issued to {} for {}", ticket_type, identity_id, service_id),
            ),
            Err(e) => {
                let event_type = match e.protocol_kind() {
                    Some(crate::error::ProtocolErrorKind::Expired { .. }) => {
                        AuditEventType::ServiceTicketExpired
                    }
                    Some(crate::error::ProtocolErrorKind::Forged) => AuditEventType::SignatureInvalid,
                    _ => AuditEventType::AuthenticationFailed,
                };
                (
                    event_type,
                    Severity::Warning,
                    failure_of(e),
                    format!("{} request from {} rejected", ticket_type, identity_id),
                )
            }
        };
        self.emit(
            stamp,
            AuditEvent::new(event_type, severity, result, description)
                .actor(identity_id)
                .resource(ticket_type, service_id)
                .action("ISSUE"),
        )
    }

    /// Access decision for a target device/resource.
    pub fn log_access_attempt(
        &self,
        stamp: EventStamp,
        identity_id: &str,
        target_id: &str,
        request_type: &str,
        outcome: Result<&str, &TicketChainError>,
    ) -> AuditEvent {
        let event = match outcome {
            Ok(session_id) => AuditEvent::new(
                AuditEventType::AccessGranted,
                Severity::Info,
                AuditResult::Success,
                format!("{} granted {} access to {}", identity_id, request_type, target_id),
            )
            .meta("session_id", session_id),
            Err(e) => AuditEvent::new(
                AuditEventType::AccessDenied,
                Severity::Warning,
                failure_of(e),
                format!("{} denied {} access to {}: {}", identity_id, request_type, target_id, e),
            ),
        };
        self.emit(
            stamp,
            event
                .actor(identity_id)
                .resource("DEVICE", target_id)
                .action(request_type),
        )
    }

    /// Rate limiter ban. Always emitted from outside a transaction.
    pub fn log_rate_limit_exceeded(&self, identity_id: &str, violations: u32, ban_secs: u64) -> AuditEvent {
        self.emit(
            EventStamp::Local,
            AuditEvent::new(
                AuditEventType::RateLimitExceeded,
                Severity::Warning,
                AuditResult::failure("BANNED", "Rate limit violations exceeded threshold"),
                format!("{} banned for {}s after {} violations", identity_id, ban_secs, violations),
            )
            .actor(identity_id)
            .resource("RATE_LIMIT", identity_id)
            .action("BAN")
            .meta("violations", violations)
            .meta("ban_seconds", ban_secs),
        )
    }

    /// Rejected input.
    pub fn log_validation_error(
        &self,
        stamp: EventStamp,
        actor_id: &str,
        action: &str,
        error: &TicketChainError,
    ) -> AuditEvent {
        self.emit(
            stamp,
            AuditEvent::new(
                AuditEventType::ValidationFailed,
                Severity::Warning,
                failure_of(error),
                format!("Rejected {} input from {}", action, actor_id),
            )
            .actor(actor_id)
            .action(action),
        )
    }

    /// Identity revoked or reinstated, or the attempt refused.
    pub fn log_revocation(
        &self,
        stamp: EventStamp,
        identity_id: &str,
        revoked: bool,
        outcome: Result<(), &TicketChainError>,
    ) -> AuditEvent {
        let action = if revoked { "REVOKE" } else { "REINSTATE" };
        let (severity, result, description) = match outcome {
            Ok(()) if revoked => (Severity::Warning, AuditResult::Success, format!("{} revoked", identity_id)),
            Ok(()) => (Severity::Info, AuditResult::Success, format!("{} reinstated", identity_id)),
            Err(e) => (
                Severity::Warning,
                failure_of(e),
                format!("{} of {} refused", action.to_lowercase(), identity_id),
            ),
        };
        self.emit(
            stamp,
            AuditEvent::new(AuditEventType::DeviceRevoked, severity, result, description)
                .actor(identity_id)
                .resource("IDENTITY", identity_id)
                .action(action)
                .meta("valid", !revoked),
        )
    }

    /// Session opened or terminated.
    pub fn log_session_event(
        &self,
        stamp: EventStamp,
        session_id: &str,
        identity_id: &str,
        opened: bool,
    ) -> AuditEvent {
        let (event_type, action) = if opened {
            (AuditEventType::SessionCreated, "OPEN")
        } else {
            (AuditEventType::SessionTerminated, "CLOSE")
        };
        self.emit(
            stamp,
            AuditEvent::new(
                event_type,
                Severity::Info,
                AuditResult::Success,
                format!("Session {} {}", session_id, action.to_lowercase()),
            )
            .actor(identity_id)
            .resource("SESSION", session_id)
            .action(action),
        )
    }

    /// Request or close on a session refused.
    pub fn log_session_error(
        &self,
        stamp: EventStamp,
        session_id: &str,
        action: &str,
        error: &TicketChainError,
    ) -> AuditEvent {
        self.emit(
            stamp,
            AuditEvent::new(
                AuditEventType::AccessDenied,
                Severity::Warning,
                failure_of(error),
                format!("Session {} {} refused: {}", session_id, action.to_lowercase(), error),
            )
            .resource("SESSION", session_id)
            .action(action),
        )
    }
}

impl std::fmt::Debug for AuditLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditLogger")
            .field("component", &self.component)
            .finish_non_exhaustive()
    }
}

fn failure_of(error: &TicketChainError) -> AuditResult {
    AuditResult::failure(error.code(), error.to_string())
}

fn format_timestamp(unix_seconds: u64) -> String {
    i64::try_from(unix_seconds)
        .ok()
        .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Secs, true))
        .unwrap_or_else(|| unix_seconds.to_string())
}
