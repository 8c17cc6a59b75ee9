//! Protocol engines.
//!
//! The AS, TGS and ISV each run every operation against a caller-supplied
//! [`TxContext`](crate::ledger::TxContext). They hold no mutable state of
//! their own; the rate limiter is shared process-local state and the
//! ledger serializes transactions.

mod as_server;
mod isv;
mod tgs;

use std::sync::Arc;

use crate::audit::{AuditLogger, EventStamp};
use crate::auth::{RateLimitPolicy, RateLimiter};
use crate::config::{Settings, TicketConfig};
use crate::crypto::Deriver;
use crate::ledger::TxContext;

pub use as_server::{
    AsQuery, AuthChallenge, AuthServer, ChallengeProof, Identity, IdentityKind, TgtIssue,
    VerificationMarker,
};
pub use isv::{Device, RequestReceipt, ServiceValidator, Session, SessionStatus};
pub use tgs::{ServiceTicketIssue, TicketGrantingServer};

/// Collaborators shared by all three engines.
#[derive(Clone)]
pub struct EngineContext {
    pub deriver: Arc<Deriver>,
    pub rate_limiter: Arc<RateLimiter>,
    pub audit: AuditLogger,
    pub tickets: TicketConfig,
}

impl EngineContext {
    pub fn new(
        deriver: Arc<Deriver>,
        rate_limiter: Arc<RateLimiter>,
        audit: AuditLogger,
        tickets: TicketConfig,
    ) -> Self {
        Self {
            deriver,
            rate_limiter,
            audit,
            tickets,
        }
    }

    /// Build from settings with a fresh rate limiter and the given audit sink.
    pub fn from_settings(settings: &Settings, deriver: Arc<Deriver>, audit: AuditLogger) -> Self {
        let rate_limiter = RateLimiter::new(RateLimitPolicy::from(&settings.rate_limit))
            .with_audit(audit.for_component("RATE_LIMITER"));
        Self::new(
            deriver,
            Arc::new(rate_limiter),
            audit,
            settings.tickets.clone(),
        )
    }
}

fn stamp(ctx: &dyn TxContext) -> EventStamp {
    EventStamp::Transaction {
        timestamp: ctx.tx_timestamp(),
    }
}
