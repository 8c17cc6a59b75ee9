//! Configuration settings for the ticket services.

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::TicketChainError;

/// Main configuration structure.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub tickets: TicketConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub audit: AuditConfig,
    #[serde(default)]
    pub keys: KeysConfig,
    #[serde(default)]
    pub security: SecurityConfig,
    #[serde(default)]
    pub isv: IsvConfig,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log format ("pretty" or "json").
    #[serde(default = "default_log_format")]
    pub format: String,
}

/// Lifetimes of challenges, tickets and sessions.
#[derive(Debug, Clone, Deserialize)]
pub struct TicketConfig {
    /// Seconds an authentication challenge stays live.
    #[serde(default = "default_challenge_ttl")]
    pub challenge_ttl_seconds: u64,
    /// Seconds a successful verification may be redeemed for a TGT.
    #[serde(default = "default_challenge_ttl")]
    pub verification_ttl_seconds: u64,
    /// TGT lifetime in seconds.
    #[serde(default = "default_ticket_lifetime")]
    pub tgt_lifetime_seconds: u64,
    /// Service ticket lifetime in seconds.
    #[serde(default = "default_ticket_lifetime")]
    pub service_ticket_lifetime_seconds: u64,
    /// Session lifetime in seconds.
    #[serde(default = "default_ticket_lifetime")]
    pub session_lifetime_seconds: u64,
    /// Maximum age of a TGS authenticator.
    #[serde(default = "default_authenticator_max_age")]
    pub authenticator_max_age_seconds: u64,
    /// Tolerated clock skew for timestamps from the future.
    #[serde(default = "default_clock_skew")]
    pub max_clock_skew_seconds: u64,
}

/// Rate limiter configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    /// Requests allowed per identity per window.
    #[serde(default = "default_requests_per_window")]
    pub requests_per_window: u32,
    /// Window length in seconds.
    #[serde(default = "default_window")]
    pub window_seconds: u64,
    /// Violations that trigger a ban.
    #[serde(default = "default_violation_threshold")]
    pub violation_threshold: u32,
    /// Ban duration in seconds.
    #[serde(default = "default_ban_duration")]
    pub ban_duration_seconds: u64,
    /// How often the background sweep runs.
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_seconds: u64,
    /// Counters idle longer than this are evicted by the sweep.
    #[serde(default = "default_idle_eviction")]
    pub idle_eviction_seconds: u64,
}

/// Audit logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AuditConfig {
    /// Whether audit logging is enabled.
    #[serde(default = "default_audit_enabled")]
    pub enabled: bool,
    /// Path to the audit log file (JSON lines).
    #[serde(default = "default_audit_log_path")]
    pub log_path: PathBuf,
}

/// Key storage configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct KeysConfig {
    /// Directory holding `<role>.key.pem` and `<role>.pub.pem`.
    #[serde(default = "default_key_dir")]
    pub dir: PathBuf,
    /// Replica-shared secret for deterministic derivation.
    pub derivation_secret_path: Option<PathBuf>,
}

/// Security switches.
#[derive(Debug, Clone, Deserialize)]
pub struct SecurityConfig {
    /// Accept legacy encryption-mode challenge proofs.
    #[serde(default = "default_allow_encrypted_proofs")]
    pub allow_encrypted_proofs: bool,
}

/// Service validator configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct IsvConfig {
    /// Service identifier this validator accepts tickets for.
    #[serde(default = "default_service_id")]
    pub service_id: String,
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_challenge_ttl() -> u64 {
    300
}

fn default_ticket_lifetime() -> u64 {
    3600
}

fn default_authenticator_max_age() -> u64 {
    300
}

fn default_clock_skew() -> u64 {
    300
}

fn default_requests_per_window() -> u32 {
    60
}

fn default_window() -> u64 {
    60
}

fn default_violation_threshold() -> u32 {
    3
}

fn default_ban_duration() -> u64 {
    300
}

fn default_cleanup_interval() -> u64 {
    600
}

fn default_idle_eviction() -> u64 {
    3600
}

fn default_audit_enabled() -> bool {
    true
}

fn default_audit_log_path() -> PathBuf {
    PathBuf::from("/var/log/ticketchain/audit.log")
}

fn default_key_dir() -> PathBuf {
    PathBuf::from("/etc/ticketchain/keys")
}

fn default_allow_encrypted_proofs() -> bool {
    true
}

fn default_service_id() -> String {
    "iot1".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Default for TicketConfig {
    fn default() -> Self {
        Self {
            challenge_ttl_seconds: default_challenge_ttl(),
            verification_ttl_seconds: default_challenge_ttl(),
            tgt_lifetime_seconds: default_ticket_lifetime(),
            service_ticket_lifetime_seconds: default_ticket_lifetime(),
            session_lifetime_seconds: default_ticket_lifetime(),
            authenticator_max_age_seconds: default_authenticator_max_age(),
            max_clock_skew_seconds: default_clock_skew(),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_window: default_requests_per_window(),
            window_seconds: default_window(),
            violation_threshold: default_violation_threshold(),
            ban_duration_seconds: default_ban_duration(),
            cleanup_interval_seconds: default_cleanup_interval(),
            idle_eviction_seconds: default_idle_eviction(),
        }
    }
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: default_audit_enabled(),
            log_path: default_audit_log_path(),
        }
    }
}

impl Default for KeysConfig {
    fn default() -> Self {
        Self {
            dir: default_key_dir(),
            derivation_secret_path: None,
        }
    }
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            allow_encrypted_proofs: default_allow_encrypted_proofs(),
        }
    }
}

impl Default for IsvConfig {
    fn default() -> Self {
        Self {
            service_id: default_service_id(),
        }
    }
}

impl Settings {
    /// Load settings from a TOML configuration file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, TicketChainError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| TicketChainError::Config {
            message: format!("Failed to read config file '{}': {}", path.display(), e),
        })?;

        Self::from_toml(&content).map_err(|e| TicketChainError::Config {
            message: format!("Invalid config file '{}': {}", path.display(), e),
        })
    }

    /// Parse and validate settings from TOML text.
    pub fn from_toml(content: &str) -> Result<Self, TicketChainError> {
        let settings: Settings = toml::from_str(content).map_err(|e| TicketChainError::Config {
            message: e.to_string(),
        })?;

        settings.validate()?;

        Ok(settings)
    }

    /// Validate the settings.
    fn validate(&self) -> Result<(), TicketChainError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(TicketChainError::Config {
                message: format!(
                    "Invalid log level '{}'. Valid levels: {:?}",
                    self.logging.level, valid_levels
                ),
            });
        }

        let valid_formats = ["pretty", "json"];
        if !valid_formats.contains(&self.logging.format.to_lowercase().as_str()) {
            return Err(TicketChainError::Config {
                message: format!(
                    "Invalid log format '{}'. Valid formats: {:?}",
                    self.logging.format, valid_formats
                ),
            });
        }

        let lifetimes = [
            ("challenge_ttl_seconds", self.tickets.challenge_ttl_seconds),
            ("tgt_lifetime_seconds", self.tickets.tgt_lifetime_seconds),
            (
                "service_ticket_lifetime_seconds",
                self.tickets.service_ticket_lifetime_seconds,
            ),
            ("session_lifetime_seconds", self.tickets.session_lifetime_seconds),
            ("window_seconds", self.rate_limit.window_seconds),
            ("cleanup_interval_seconds", self.rate_limit.cleanup_interval_seconds),
        ];
        for (name, value) in lifetimes {
            if value == 0 {
                return Err(TicketChainError::Config {
                    message: format!("'{}' must be greater than zero", name),
                });
            }
        }

        if self.rate_limit.violation_threshold == 0 || self.rate_limit.requests_per_window == 0 {
            return Err(TicketChainError::Config {
                message: "Rate limit thresholds must be at least 1".to_string(),
            });
        }

        crate::validation::validate_identifier("service_id", &self.isv.service_id)?;

        Ok(())
    }
}
