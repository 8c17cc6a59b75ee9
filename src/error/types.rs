//! Error types for the ticket protocol.

use thiserror::Error;

/// Main error type for the protocol engines and their collaborators.
#[derive(Error, Debug)]
pub enum TicketChainError {
    /// Configuration-related errors.
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Ledger (state store) errors.
    #[error("Ledger error: {message}")]
    Ledger { message: String },

    /// Cryptographic failures. Engines map these to uniform protocol errors
    /// before they reach a caller.
    #[error("Crypto error: {kind}")]
    Crypto { kind: CryptoErrorKind },

    /// Protocol state machine errors.
    #[error("Protocol error: {kind}")]
    Protocol { kind: ProtocolErrorKind },

    /// Input validation errors.
    #[error("Validation error: {kind}")]
    Validation { kind: ValidationErrorKind },

    /// I/O errors.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Protocol error kinds.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolErrorKind {
    #[error("{resource} not found: {id}")]
    NotFound { resource: String, id: String },

    #[error("Already exists: {id}")]
    AlreadyExists { id: String },

    #[error("Invalid: {reason}")]
    Invalid { reason: String },

    #[error("Invalid ticket")]
    InvalidTicket,

    #[error("{what} expired")]
    Expired { what: String },

    #[error("Verification failed")]
    Forged,

    #[error("No active challenge for {id}")]
    NoChallenge { id: String },

    #[error("No session: {id}")]
    NoSession { id: String },

    #[error("Access denied: {reason}")]
    Denied { reason: String },

    #[error("Rate limit exceeded: {count}/{limit} requests in current window")]
    RateLimited { count: u32, limit: u32 },

    #[error("Temporarily banned: {remaining_secs}s remaining")]
    Banned { remaining_secs: u64 },
}

impl ProtocolErrorKind {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "NOT_FOUND",
            Self::AlreadyExists { .. } => "ALREADY_EXISTS",
            Self::Invalid { .. } => "INVALID",
            Self::InvalidTicket => "INVALID_TICKET",
            Self::Expired { .. } => "EXPIRED",
            Self::Forged => "FORGED",
            Self::NoChallenge { .. } => "NO_CHALLENGE",
            Self::NoSession { .. } => "NO_SESSION",
            Self::Denied { .. } => "DENIED",
            Self::RateLimited { .. } => "RATE_LIMITED",
            Self::Banned { .. } => "BANNED",
        }
    }
}

/// Validation error kinds.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationErrorKind {
    #[error("Invalid {field}: {reason}")]
    InvalidIdentifier { field: String, reason: String },

    #[error("Invalid public key: {reason}")]
    InvalidPublicKey { reason: String },

    #[error("Invalid request type: {value}")]
    InvalidRequestType { value: String },

    #[error("Invalid device status: {value}")]
    InvalidDeviceStatus { value: String },

    #[error("Payload too large: {size} bytes exceeds maximum of {max} bytes")]
    PayloadTooLarge { size: usize, max: usize },

    #[error("Invalid timestamp: {reason}")]
    InvalidTimestamp { reason: String },
}

/// Cryptographic error kinds.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoErrorKind {
    #[error("Malformed key material: {message}")]
    MalformedKey { message: String },

    #[error("Invalid signature")]
    InvalidSignature,

    #[error("Decryption failed")]
    DecryptionFailed,

    #[error("Encryption failed")]
    EncryptionFailed,

    #[error("Key derivation failed")]
    DerivationFailed,

    #[error("Failed to read key file: {message}")]
    KeyFile { message: String },

    #[error("Entropy source unavailable")]
    RandomnessUnavailable,
}

impl TicketChainError {
    /// Shorthand for a protocol error.
    pub fn protocol(kind: ProtocolErrorKind) -> Self {
        Self::Protocol { kind }
    }

    /// Shorthand for a validation error.
    pub fn validation(kind: ValidationErrorKind) -> Self {
        Self::Validation { kind }
    }

    /// Shorthand for a crypto error.
    pub fn crypto(kind: CryptoErrorKind) -> Self {
        Self::Crypto { kind }
    }

    /// The protocol kind, if this is a protocol error.
    pub fn protocol_kind(&self) -> Option<&ProtocolErrorKind> {
        match self {
            Self::Protocol { kind } => Some(kind),
            _ => None,
        }
    }

    /// Stable machine-readable code for responses and audit records.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Config { .. } => "CONFIG_ERROR",
            Self::Ledger { .. } => "LEDGER_ERROR",
            Self::Crypto { .. } => "CRYPTO_ERROR",
            Self::Protocol { kind } => kind.code(),
            Self::Validation { .. } => "INVALID",
            Self::Io(_) => "IO_ERROR",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }
}

/// Result type alias for protocol operations.
pub type TicketChainResult<T> = Result<T, TicketChainError>;
