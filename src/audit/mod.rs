//! Audit logging module.
//!
//! Every security-relevant transition in the AS, TGS, ISV and rate limiter
//! produces an [`AuditEvent`].
//!
//! ## Features
//!
//! - Deterministic event ids for events emitted inside a transaction
//! - Metadata sanitization (key material and proofs redacted)
//! - Pluggable sinks: JSON lines file, in-memory, null

mod entry;
mod logger;
mod sanitize;

pub use entry::{AuditEvent, AuditEventType, AuditResult, Severity};
pub use logger::{
    AuditLogger, AuditSink, EventStamp, JsonLinesAuditSink, MemoryAuditSink, NullAuditSink,
};
pub use sanitize::sanitize_metadata;
