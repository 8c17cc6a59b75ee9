//! Error types for the ticket protocol.
//!
//! Provides a unified error handling system using thiserror.

mod types;

pub use types::*;
