//! Process-level wiring.
//!
//! Loads role keys and the derivation secret from the key store, opens the
//! audit sink and builds the three engines around one shared rate limiter.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use ring::rand::{SecureRandom, SystemRandom};
use tracing::{debug, info};
use zeroize::Zeroizing;

use crate::audit::{AuditLogger, JsonLinesAuditSink, NullAuditSink};
use crate::auth::{CleanupHandle, RateLimiter};
use crate::config::Settings;
use crate::crypto::{read_secret_file, write_secret_file, Deriver, KeyStore};
use crate::engine::{AsQuery, AuthServer, EngineContext, ServiceValidator, TicketGrantingServer};
use crate::error::{CryptoErrorKind, TicketChainError, TicketChainResult};

pub const AS_ROLE: &str = "as";
pub const TGS_ROLE: &str = "tgs";
pub const ISV_ROLE: &str = "isv";

const DERIVATION_SECRET_FILE: &str = "derivation.secret";
const DERIVATION_SECRET_LEN: usize = 32;

/// What [`bootstrap_keys`] found or created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapReport {
    /// `(role, newly_created)` for each role keypair.
    pub roles: Vec<(String, bool)>,
    pub secret_path: PathBuf,
    pub secret_created: bool,
}

/// Path of the replica-shared derivation secret.
pub fn derivation_secret_path(settings: &Settings) -> PathBuf {
    settings
        .keys
        .derivation_secret_path
        .clone()
        .unwrap_or_else(|| settings.keys.dir.join(DERIVATION_SECRET_FILE))
}

/// Generate any missing role keypairs and the derivation secret.
///
/// Existing material is loaded, which also checks its permissions.
pub fn bootstrap_keys(settings: &Settings) -> TicketChainResult<BootstrapReport> {
    let store = KeyStore::new(&settings.keys.dir);
    let mut roles = Vec::new();
    for role in [AS_ROLE, TGS_ROLE, ISV_ROLE] {
        let (_, created) = store.ensure_keypair(role)?;
        roles.push((role.to_string(), created));
    }

    let secret_path = derivation_secret_path(settings);
    let secret_created = if secret_path.exists() {
        read_secret_file(&secret_path)?;
        false
    } else {
        let mut secret = Zeroizing::new([0u8; DERIVATION_SECRET_LEN]);
        SystemRandom::new()
            .fill(&mut secret[..])
            .map_err(|_| TicketChainError::crypto(CryptoErrorKind::RandomnessUnavailable))?;
        if let Some(parent) = secret_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        write_secret_file(&secret_path, &secret[..])?;
        info!(path = %secret_path.display(), "Generated derivation secret");
        true
    };

    Ok(BootstrapReport {
        roles,
        secret_path,
        secret_created,
    })
}

/// The three servers of one node.
pub struct Node {
    pub auth_server: Arc<AuthServer>,
    pub tgs: TicketGrantingServer,
    pub isv: ServiceValidator,
    pub rate_limiter: Arc<RateLimiter>,
    cleanup_interval: Duration,
}

impl Node {
    /// Build all engines from existing key material.
    pub fn from_settings(settings: &Settings) -> TicketChainResult<Self> {
        let store = KeyStore::new(&settings.keys.dir);
        let secret = read_secret_file(&derivation_secret_path(settings))?;
        let deriver = Arc::new(Deriver::new(&secret));

        let audit = if settings.audit.enabled {
            let sink = JsonLinesAuditSink::new(&settings.audit.log_path)?;
            AuditLogger::new("NODE", Arc::new(sink), Arc::clone(&deriver))
        } else {
            debug!("Audit logging disabled");
            AuditLogger::new("NODE", Arc::new(NullAuditSink), Arc::clone(&deriver))
        };

        let engine = EngineContext::from_settings(settings, deriver, audit);
        let rate_limiter = Arc::clone(&engine.rate_limiter);

        let isv_keypair = store.load_keypair(ISV_ROLE)?;
        let isv_public = isv_keypair.public_key();
        let tgs_keypair = store.load_keypair(TGS_ROLE)?;
        let tgs_public = tgs_keypair.public_key();

        let auth_server = Arc::new(
            AuthServer::new(store.load_keypair(AS_ROLE)?, tgs_public, engine.clone())
                .with_encrypted_proofs(settings.security.allow_encrypted_proofs),
        );
        let tgs = TicketGrantingServer::new(tgs_keypair, engine.clone())
            .with_service(&settings.isv.service_id, isv_public)?;
        let directory: Arc<dyn AsQuery> = auth_server.clone();
        let isv = ServiceValidator::new(settings.isv.service_id.clone(), isv_keypair, engine)?
            .with_identity_directory(directory);

        info!(service = %settings.isv.service_id, "Node initialized");
        Ok(Self {
            auth_server,
            tgs,
            isv,
            rate_limiter,
            cleanup_interval: Duration::from_secs(settings.rate_limit.cleanup_interval_seconds),
        })
    }

    /// Start the rate limiter sweep on the current tokio runtime.
    pub fn start_maintenance(&self) -> CleanupHandle {
        self.rate_limiter.start_cleanup_task(self.cleanup_interval)
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("auth_server", &self.auth_server)
            .field("tgs", &self.tgs)
            .field("isv", &self.isv)
            .field("rate_limiter", &self.rate_limiter)
            .finish()
    }
}
