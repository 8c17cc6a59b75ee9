//! Request admission and proof checking.
//!
//! Handles per-identity rate limiting and TGS authenticator validation.

mod authenticator;
mod rate_limit;

pub use authenticator::{Authenticator, AuthenticatorValidator};
pub use rate_limit::{
    CleanupHandle, RateLimitPolicy, RateLimitStats, RateLimitSummary, RateLimiter,
};
