//! Input validation module.
//!
//! Provides validators for identifiers, public key PEMs, request types,
//! payload sizes, client timestamps and device statuses.

mod device;
mod identifier;
mod public_key;
mod request;

pub use device::{validate_device_status, DeviceStatus};
pub use identifier::{validate_identifier, MAX_ID_LENGTH, MIN_ID_LENGTH};
pub use public_key::{validate_public_key_pem, MAX_PEM_LENGTH, MIN_PEM_LENGTH};
pub use request::{
    validate_payload_size, validate_request_type, validate_timestamp, RequestType,
    MAX_PAYLOAD_SIZE,
};
