//! Wire payloads.
//!
//! JSON messages exchanged between clients and the three servers, with
//! binary fields as base64:
//! ```text
//! {"identityId":"client1","mode":"signature","proof":"<base64>"}
//! ```

mod request;
mod response;
pub mod wire;

pub use request::{AccessRequest, AuthRequest, ProofMode, ServiceTicketRequest};
pub use response::{
    AccessResponse, AccessStatus, AuthChallengeResponse, ServiceTicketResponse, TgtResponse,
};
