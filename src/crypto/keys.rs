//! Ed25519 key material, PEM encoding and on-disk key storage.
//!
//! Public keys travel as PEM SubjectPublicKeyInfo, private keys as PEM
//! PKCS#8. The same keys are used for sealing through their X25519 form.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use base64::{engine::general_purpose::STANDARD, Engine};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use ring::rand::{SecureRandom, SystemRandom};
use tracing::{debug, info};
use zeroize::Zeroizing;

use crate::error::{CryptoErrorKind, TicketChainError, TicketChainResult};

/// DER prefix of an Ed25519 SubjectPublicKeyInfo (RFC 8410).
const SPKI_ED25519_PREFIX: [u8; 12] = [
    0x30, 0x2a, // SEQUENCE, 42 bytes
    0x30, 0x05, // SEQUENCE, 5 bytes (algorithm identifier)
    0x06, 0x03, 0x2b, 0x65, 0x70, // OID 1.3.101.112 (Ed25519)
    0x03, 0x21, 0x00, // BIT STRING, 33 bytes, no unused bits
];

/// DER prefix of an Ed25519 PKCS#8 v1 private key.
const PKCS8_ED25519_PREFIX: [u8; 16] = [
    0x30, 0x2e, // SEQUENCE, 46 bytes
    0x02, 0x01, 0x00, // INTEGER version 0
    0x30, 0x05, // SEQUENCE, 5 bytes (algorithm identifier)
    0x06, 0x03, 0x2b, 0x65, 0x70, // OID 1.3.101.112 (Ed25519)
    0x04, 0x22, // OCTET STRING, 34 bytes
    0x04, 0x20, // OCTET STRING, 32 bytes (the seed)
];

const PUBLIC_KEY_LABEL: &str = "PUBLIC KEY";
const PRIVATE_KEY_LABEL: &str = "PRIVATE KEY";

/// A verifying public key of a client, device or service role.
#[derive(Clone, PartialEq, Eq)]
pub struct PublicKey {
    key: VerifyingKey,
}

impl PublicKey {
    /// Parse a PEM-encoded SubjectPublicKeyInfo.
    pub fn from_pem(pem: &str) -> TicketChainResult<Self> {
        let der = decode_pem(pem, PUBLIC_KEY_LABEL)?;
        let raw = der
            .strip_prefix(&SPKI_ED25519_PREFIX[..])
            .ok_or_else(|| malformed("not an Ed25519 SubjectPublicKeyInfo"))?;
        let bytes: [u8; 32] = raw
            .try_into()
            .map_err(|_| malformed("unexpected public key length"))?;
        Self::from_bytes(&bytes)
    }

    /// Build from raw 32-byte key material.
    pub fn from_bytes(bytes: &[u8; 32]) -> TicketChainResult<Self> {
        let key = VerifyingKey::from_bytes(bytes).map_err(|_| malformed("invalid curve point"))?;
        if key.is_weak() {
            return Err(malformed("weak public key"));
        }
        Ok(Self { key })
    }

    /// Encode as PEM SubjectPublicKeyInfo.
    pub fn to_pem(&self) -> String {
        let mut der = SPKI_ED25519_PREFIX.to_vec();
        der.extend_from_slice(self.key.as_bytes());
        encode_pem(PUBLIC_KEY_LABEL, &der)
    }

    /// Raw key bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        self.key.as_bytes()
    }

    /// Verify an Ed25519 signature over `message`.
    pub fn verify(&self, message: &[u8], signature: &[u8]) -> TicketChainResult<()> {
        let signature = Signature::from_slice(signature)
            .map_err(|_| TicketChainError::crypto(CryptoErrorKind::InvalidSignature))?;
        self.key
            .verify(message, &signature)
            .map_err(|_| TicketChainError::crypto(CryptoErrorKind::InvalidSignature))
    }

    /// The birationally equivalent X25519 public key used for sealing.
    pub(crate) fn x25519(&self) -> x25519_dalek::PublicKey {
        x25519_dalek::PublicKey::from(self.key.to_montgomery().to_bytes())
    }
}

impl std::fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PublicKey({})", hex::encode(&self.key.as_bytes()[..8]))
    }
}

/// A signing keypair. Key material is zeroized on drop.
pub struct KeyPair {
    signing: SigningKey,
}

impl KeyPair {
    /// Generate a fresh keypair from the system entropy source.
    ///
    /// Only for bootstrap and client-side use, never inside a transaction.
    pub fn generate() -> TicketChainResult<Self> {
        let mut seed = Zeroizing::new([0u8; 32]);
        SystemRandom::new()
            .fill(&mut seed[..])
            .map_err(|_| TicketChainError::crypto(CryptoErrorKind::RandomnessUnavailable))?;
        Ok(Self::from_seed(&seed))
    }

    /// Build from a 32-byte seed.
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self {
            signing: SigningKey::from_bytes(seed),
        }
    }

    /// Parse a PEM-encoded PKCS#8 private key.
    pub fn from_pkcs8_pem(pem: &str) -> TicketChainResult<Self> {
        let der = Zeroizing::new(decode_pem(pem, PRIVATE_KEY_LABEL)?);
        let raw = der
            .strip_prefix(&PKCS8_ED25519_PREFIX[..])
            .ok_or_else(|| malformed("not an Ed25519 PKCS#8 key"))?;
        let seed: Zeroizing<[u8; 32]> = Zeroizing::new(
            raw.try_into()
                .map_err(|_| malformed("unexpected private key length"))?,
        );
        Ok(Self::from_seed(&seed))
    }

    /// Encode as PEM PKCS#8.
    pub fn to_pkcs8_pem(&self) -> Zeroizing<String> {
        let mut der = Zeroizing::new(PKCS8_ED25519_PREFIX.to_vec());
        der.extend_from_slice(self.signing.as_bytes());
        Zeroizing::new(encode_pem(PRIVATE_KEY_LABEL, &der))
    }

    /// The matching public key.
    pub fn public_key(&self) -> PublicKey {
        PublicKey {
            key: self.signing.verifying_key(),
        }
    }

    /// Sign `message`, returning the 64-byte signature.
    pub fn sign(&self, message: &[u8]) -> Vec<u8> {
        self.signing.sign(message).to_bytes().to_vec()
    }

    /// The X25519 secret matching [`PublicKey::x25519`].
    pub(crate) fn x25519_secret(&self) -> x25519_dalek::StaticSecret {
        x25519_dalek::StaticSecret::from(self.signing.to_scalar_bytes())
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("public", &self.public_key())
            .finish_non_exhaustive()
    }
}

/// Directory of role keypairs (`<name>.key.pem`, `<name>.pub.pem`).
#[derive(Debug, Clone)]
pub struct KeyStore {
    dir: PathBuf,
}

impl KeyStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn private_key_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.key.pem", name))
    }

    pub fn public_key_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.pub.pem", name))
    }

    /// Load a role's private key, refusing group/world readable files.
    pub fn load_keypair(&self, name: &str) -> TicketChainResult<KeyPair> {
        let pem = read_secret_file(&self.private_key_path(name))?;
        let text = std::str::from_utf8(&pem).map_err(|_| malformed("key file is not UTF-8"))?;
        KeyPair::from_pkcs8_pem(text)
    }

    /// Load a role's public key.
    pub fn load_public_key(&self, name: &str) -> TicketChainResult<PublicKey> {
        let path = self.public_key_path(name);
        let pem = std::fs::read_to_string(&path).map_err(|e| key_file_error(&path, e))?;
        PublicKey::from_pem(&pem)
    }

    /// Load the role keypair, generating and persisting it if absent.
    ///
    /// Returns the keypair and whether it was newly created.
    pub fn ensure_keypair(&self, name: &str) -> TicketChainResult<(KeyPair, bool)> {
        if self.private_key_path(name).exists() {
            return Ok((self.load_keypair(name)?, false));
        }

        let keypair = KeyPair::generate()?;
        self.store_keypair(name, &keypair)?;
        info!(role = %name, dir = %self.dir.display(), "Generated role keypair");
        Ok((keypair, true))
    }

    /// Write a keypair, the private half with mode 0600.
    pub fn store_keypair(&self, name: &str, keypair: &KeyPair) -> TicketChainResult<()> {
        if !self.dir.exists() {
            debug!(path = %self.dir.display(), "Creating key directory");
            std::fs::create_dir_all(&self.dir)?;
        }
        write_secret_file(&self.private_key_path(name), keypair.to_pkcs8_pem().as_bytes())?;
        std::fs::write(self.public_key_path(name), keypair.public_key().to_pem())?;
        Ok(())
    }
}

/// Read a secret file after checking it is only accessible by its owner.
pub fn read_secret_file(path: &Path) -> TicketChainResult<Zeroizing<Vec<u8>>> {
    let metadata = std::fs::metadata(path).map_err(|e| key_file_error(path, e))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = metadata.permissions().mode();
        if mode & 0o077 != 0 {
            return Err(TicketChainError::crypto(CryptoErrorKind::KeyFile {
                message: format!(
                    "{} has insecure permissions {:04o}, expected 0600 or 0400",
                    path.display(),
                    mode & 0o777
                ),
            }));
        }
    }
    #[cfg(not(unix))]
    let _ = metadata;

    std::fs::read(path)
        .map(Zeroizing::new)
        .map_err(|e| key_file_error(path, e))
}

/// Create (or truncate) a file readable only by its owner and write `contents`.
pub fn write_secret_file(path: &Path, contents: &[u8]) -> TicketChainResult<()> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path)?;
    file.write_all(contents)?;
    file.sync_all()?;
    Ok(())
}

/// The message a client signs to answer a challenge: `sha256(nonce)`.
pub fn challenge_digest(nonce: &str) -> [u8; 32] {
    let digest = ring::digest::digest(&ring::digest::SHA256, nonce.as_bytes());
    let mut out = [0u8; 32];
    out.copy_from_slice(digest.as_ref());
    out
}

fn decode_pem(pem: &str, label: &str) -> TicketChainResult<Vec<u8>> {
    let begin = format!("-----BEGIN {}-----", label);
    let end = format!("-----END {}-----", label);

    let start = pem
        .find(&begin)
        .ok_or_else(|| malformed("missing PEM header"))?
        + begin.len();
    let stop = pem[start..]
        .find(&end)
        .ok_or_else(|| malformed("missing PEM footer"))?
        + start;

    let body: String = pem[start..stop]
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();
    STANDARD
        .decode(body.as_bytes())
        .map_err(|_| malformed("invalid base64 in PEM body"))
}

fn encode_pem(label: &str, der: &[u8]) -> String {
    let body = STANDARD.encode(der);
    let mut pem = format!("-----BEGIN {}-----\n", label);
    for chunk in body.as_bytes().chunks(64) {
        // base64 output is ASCII
        pem.push_str(&String::from_utf8_lossy(chunk));
        pem.push('\n');
    }
    pem.push_str(&format!("-----END {}-----\n", label));
    pem
}

fn malformed(message: &str) -> TicketChainError {
    TicketChainError::crypto(CryptoErrorKind::MalformedKey {
        message: message.to_string(),
    })
}

fn key_file_error(path: &Path, e: std::io::Error) -> TicketChainError {
    TicketChainError::crypto(CryptoErrorKind::KeyFile {
        message: format!("{}: {}", path.display(), e),
    })
}
