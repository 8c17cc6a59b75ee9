//! Per-identity rate limiting with escalating bans.
//!
//! Each identity gets a fixed window (default one minute) that starts at its
//! first request after the previous window elapsed. A request over the limit
//! counts as a violation; reaching the violation threshold bans the identity
//! for a configurable duration. Violations persist across windows and bans
//! until an operator calls [`RateLimiter::unban`] or [`RateLimiter::reset`],
//! or the sweep evicts the idle counter.
//!
//! This state is process-local and best-effort: replicas do not need to agree.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::audit::AuditLogger;
use crate::config::RateLimitConfig;
use crate::error::{ProtocolErrorKind, TicketChainError, TicketChainResult};

/// Limits applied by a [`RateLimiter`].
#[derive(Debug, Clone)]
pub struct RateLimitPolicy {
    pub max_requests: u32,
    pub window: Duration,
    pub violation_threshold: u32,
    pub ban_duration: Duration,
    pub idle_eviction: Duration,
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self::from(&RateLimitConfig::default())
    }
}

impl From<&RateLimitConfig> for RateLimitPolicy {
    fn from(config: &RateLimitConfig) -> Self {
        Self {
            max_requests: config.requests_per_window,
            window: Duration::from_secs(config.window_seconds),
            violation_threshold: config.violation_threshold,
            ban_duration: Duration::from_secs(config.ban_duration_seconds),
            idle_eviction: Duration::from_secs(config.idle_eviction_seconds),
        }
    }
}

#[derive(Debug, Clone)]
struct RateLimitCounter {
    window_start: Instant,
    count: u32,
    violation_count: u32,
    ban_until: Option<Instant>,
}

impl RateLimitCounter {
    fn new(now: Instant) -> Self {
        Self {
            window_start: now,
            count: 0,
            violation_count: 0,
            ban_until: None,
        }
    }
}

/// Point-in-time view of one identity's counter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RateLimitStats {
    pub identity_id: String,
    pub request_count: u32,
    pub violation_count: u32,
    pub banned: bool,
    pub ban_remaining_secs: Option<u64>,
    pub limit: u32,
}

/// Aggregate view over all tracked identities.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RateLimitSummary {
    pub tracked_identities: usize,
    pub banned_identities: usize,
    pub identities_with_violations: usize,
}

/// Shared, thread-safe rate limiter.
///
/// Constructed once and handed to every engine as `Arc<RateLimiter>`.
pub struct RateLimiter {
    counters: RwLock<HashMap<String, RateLimitCounter>>,
    policy: RateLimitPolicy,
    audit: Option<AuditLogger>,
}

impl RateLimiter {
    pub fn new(policy: RateLimitPolicy) -> Self {
        Self {
            counters: RwLock::new(HashMap::new()),
            policy,
            audit: None,
        }
    }

    /// Emit `RATE_LIMIT_EXCEEDED` audit events through `audit` when banning.
    pub fn with_audit(mut self, audit: AuditLogger) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn policy(&self) -> &RateLimitPolicy {
        &self.policy
    }

    /// Admit or reject a request from `identity_id`.
    pub fn allow_request(&self, identity_id: &str) -> TicketChainResult<()> {
        self.allow_request_at(identity_id, Instant::now())
    }

    /// [`allow_request`](Self::allow_request) against an explicit clock.
    pub fn allow_request_at(&self, identity_id: &str, now: Instant) -> TicketChainResult<()> {
        let mut counters = self.counters.write().unwrap_or_else(|e| e.into_inner());
        let counter = counters
            .entry(identity_id.to_string())
            .or_insert_with(|| RateLimitCounter::new(now));

        if let Some(until) = counter.ban_until {
            if now < until {
                return Err(banned(until - now));
            }
            counter.ban_until = None;
        }

        if now.saturating_duration_since(counter.window_start) >= self.policy.window {
            counter.window_start = now;
            counter.count = 0;
        }

        if counter.count >= self.policy.max_requests {
            counter.violation_count += 1;
            let count = counter.count;
            let violations = counter.violation_count;

            if violations >= self.policy.violation_threshold {
                counter.ban_until = Some(now + self.policy.ban_duration);
                drop(counters);
                self.on_ban(identity_id, violations);
                return Err(banned(self.policy.ban_duration));
            }

            debug!(identity = %identity_id, count, violations, "Rate limit exceeded");
            return Err(TicketChainError::protocol(ProtocolErrorKind::RateLimited {
                count,
                limit: self.policy.max_requests,
            }));
        }

        counter.count += 1;
        Ok(())
    }

    /// Charge a violation without a request, e.g. for a forged proof.
    pub fn record_violation(&self, identity_id: &str) {
        self.record_violation_at(identity_id, Instant::now())
    }

    /// [`record_violation`](Self::record_violation) against an explicit clock.
    pub fn record_violation_at(&self, identity_id: &str, now: Instant) {
        let mut counters = self.counters.write().unwrap_or_else(|e| e.into_inner());
        let counter = counters
            .entry(identity_id.to_string())
            .or_insert_with(|| RateLimitCounter::new(now));
        counter.violation_count += 1;
        let violations = counter.violation_count;

        let already_banned = counter.ban_until.is_some_and(|until| now < until);
        if violations >= self.policy.violation_threshold && !already_banned {
            counter.ban_until = Some(now + self.policy.ban_duration);
            drop(counters);
            self.on_ban(identity_id, violations);
        }
    }

    /// Lift a ban and clear violations and the current window.
    pub fn unban(&self, identity_id: &str) {
        let mut counters = self.counters.write().unwrap_or_else(|e| e.into_inner());
        if let Some(counter) = counters.get_mut(identity_id) {
            counter.ban_until = None;
            counter.violation_count = 0;
            counter.count = 0;
            info!(identity = %identity_id, "Identity unbanned");
        }
    }

    /// Forget everything about an identity.
    pub fn reset(&self, identity_id: &str) {
        let mut counters = self.counters.write().unwrap_or_else(|e| e.into_inner());
        if counters.remove(identity_id).is_some() {
            info!(identity = %identity_id, "Rate limit state reset");
        }
    }

    pub fn is_banned(&self, identity_id: &str) -> bool {
        let now = Instant::now();
        self.counters
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(identity_id)
            .and_then(|c| c.ban_until)
            .is_some_and(|until| now < until)
    }

    pub fn stats(&self, identity_id: &str) -> Option<RateLimitStats> {
        self.stats_at(identity_id, Instant::now())
    }

    pub fn stats_at(&self, identity_id: &str, now: Instant) -> Option<RateLimitStats> {
        let counters = self.counters.read().unwrap_or_else(|e| e.into_inner());
        counters.get(identity_id).map(|c| {
            let remaining = c
                .ban_until
                .filter(|until| now < *until)
                .map(|until| until.duration_since(now).as_secs());
            RateLimitStats {
                identity_id: identity_id.to_string(),
                request_count: c.count,
                violation_count: c.violation_count,
                banned: remaining.is_some(),
                ban_remaining_secs: remaining,
                limit: self.policy.max_requests,
            }
        })
    }

    pub fn summary(&self) -> RateLimitSummary {
        let now = Instant::now();
        let counters = self.counters.read().unwrap_or_else(|e| e.into_inner());
        RateLimitSummary {
            tracked_identities: counters.len(),
            banned_identities: counters
                .values()
                .filter(|c| c.ban_until.is_some_and(|until| now < until))
                .count(),
            identities_with_violations: counters.values().filter(|c| c.violation_count > 0).count(),
        }
    }

    pub fn tracked_identities(&self) -> usize {
        self.counters.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Drop expired bans and evict idle counters.
    pub fn cleanup(&self) {
        self.cleanup_at(Instant::now())
    }

    /// [`cleanup`](Self::cleanup) against an explicit clock.
    pub fn cleanup_at(&self, now: Instant) {
        let mut counters = self.counters.write().unwrap_or_else(|e| e.into_inner());
        let before = counters.len();

        counters.retain(|_, counter| {
            if counter.ban_until.is_some_and(|until| now >= until) {
                counter.ban_until = None;
            }
            counter.ban_until.is_some()
                || now.saturating_duration_since(counter.window_start) < self.policy.idle_eviction
        });

        let evicted = before - counters.len();
        if evicted > 0 {
            debug!(evicted, remaining = counters.len(), "Rate limiter sweep evicted idle counters");
        }
    }

    /// Start the periodic sweep on the current tokio runtime.
    ///
    /// The task stops when [`CleanupHandle::shutdown`] is called or the handle
    /// is dropped.
    pub fn start_cleanup_task(self: &Arc<Self>, interval: Duration) -> CleanupHandle {
        let limiter = Arc::clone(self);
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(async move {
            let mut interval_timer = tokio::time::interval(interval);
            // The first tick completes immediately.
            interval_timer.tick().await;
            loop {
                tokio::select! {
                    _ = interval_timer.tick() => limiter.cleanup(),
                    _ = shutdown_rx.changed() => break,
                }
            }
            debug!("Rate limiter sweep stopped");
        });

        CleanupHandle {
            shutdown_tx,
            task: Some(task),
        }
    }

    fn on_ban(&self, identity_id: &str, violations: u32) {
        let ban_secs = self.policy.ban_duration.as_secs();
        warn!(identity = %identity_id, violations, ban_secs, "Identity banned for repeated rate limit violations");
        if let Some(audit) = &self.audit {
            audit.log_rate_limit_exceeded(identity_id, violations, ban_secs);
        }
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("policy", &self.policy)
            .field("tracked", &self.tracked_identities())
            .finish()
    }
}

/// Owns the background sweep of a [`RateLimiter`].
pub struct CleanupHandle {
    shutdown_tx: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl CleanupHandle {
    /// Signal the sweep to stop and wait for it to exit.
    pub async fn shutdown(mut self) {
        let _ = self.shutdown_tx.send(true);
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "Rate limiter sweep ended abnormally");
            }
        }
    }
}

impl Drop for CleanupHandle {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(true);
    }
}

fn banned(remaining: Duration) -> TicketChainError {
    // Round up so a caller never sees "0s remaining" while still banned.
    let secs = remaining.as_secs() + u64::from(remaining.subsec_nanos() > 0);
    TicketChainError::protocol(ProtocolErrorKind::Banned {
        remaining_secs: secs,
    })
}
