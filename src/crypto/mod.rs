//! Cryptographic building blocks.
//!
//! - `derive`: replica-deterministic nonces, keys and identifiers
//! - `keys`: Ed25519 keypairs, PEM encoding and the on-disk key store
//! - `seal`: sealed boxes to a public key and symmetric envelopes

mod derive;
mod keys;
pub mod seal;

pub use derive::{Deriver, SymmetricKey, SYMMETRIC_KEY_LEN};
pub use keys::{challenge_digest, read_secret_file, write_secret_file, KeyPair, KeyStore, PublicKey};
