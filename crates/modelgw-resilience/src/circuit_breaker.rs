//! Circuit breaker pattern implementation.
//!
//! One breaker per provider isolates the platform from a failing upstream:
//! traffic is cut after repeated failures, a single probe tests recovery
//! after a cooldown, and a recovering provider is watched more sensitively
//! before full trust is restored.
//!
//! The breaker only gates eligibility. It never retries anything itself;
//! failover belongs to the router.

use modelgw_core::ProviderId;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum CircuitState {
    /// All calls permitted
    Closed = 0,
    /// Calls short-circuited until the cooldown elapses
    Open = 1,
    /// Exactly one probe call permitted
    HalfOpen = 2,
    /// Full traffic, but failures are tracked more sensitively
    Recovering = 3,
}

impl From<u8> for CircuitState {
    fn from(value: u8) -> Self {
        match value {
            1 => Self::Open,
            2 => Self::HalfOpen,
            3 => Self::Recovering,
            _ => Self::Closed,
        }
    }
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::Open => write!(f, "open"),
            Self::HalfOpen => write!(f, "half_open"),
            Self::Recovering => write!(f, "recovering"),
        }
    }
}

/// Circuit breaker configuration
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures in CLOSED before the circuit opens
    pub failure_threshold: u32,
    /// Base wait before a probe is permitted after opening
    pub cooldown: Duration,
    /// Cooldown multiplier applied on each failed probe
    pub cooldown_multiplier: f64,
    /// Upper bound on the backed-off cooldown
    pub max_cooldown: Duration,
    /// Consecutive successes in RECOVERING before the circuit closes
    pub recovery_window: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown: Duration::from_secs(30),
            cooldown_multiplier: 2.0,
            max_cooldown: Duration::from_secs(300),
            recovery_window: 10,
        }
    }
}

fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Circuit breaker for a single provider.
///
/// State is kept in atomics for lock-free reads on the routing hot path;
/// transitions take a short write lock so concurrent outcome recordings
/// cannot interleave a transition.
pub struct CircuitBreaker {
    /// Provider identifier
    provider: ProviderId,
    /// Configuration
    config: CircuitBreakerConfig,
    /// Current state
    state: AtomicU8,
    /// Consecutive failure count (CLOSED)
    consecutive_failures: AtomicU32,
    /// Consecutive success count (RECOVERING)
    consecutive_successes: AtomicU32,
    /// When the circuit last opened (milliseconds since epoch)
    opened_at: AtomicU64,
    /// Current cooldown length in milliseconds, grows on failed probes
    cooldown_ms: AtomicU64,
    /// Whether the half-open probe slot is taken
    probe_claimed: AtomicBool,
    /// Lock for state transitions
    transition_lock: RwLock<()>,
}

impl CircuitBreaker {
    /// Create a new circuit breaker
    #[must_use]
    pub fn new(provider: ProviderId, config: CircuitBreakerConfig) -> Self {
        let cooldown_ms = config.cooldown.as_millis() as u64;
        Self {
            provider,
            config,
            state: AtomicU8::new(CircuitState::Closed as u8),
            consecutive_failures: AtomicU32::new(0),
            consecutive_successes: AtomicU32::new(0),
            opened_at: AtomicU64::new(0),
            cooldown_ms: AtomicU64::new(cooldown_ms),
            probe_claimed: AtomicBool::new(false),
            transition_lock: RwLock::new(()),
        }
    }

    /// The provider this breaker guards
    #[must_use]
    pub fn provider(&self) -> &ProviderId {
        &self.provider
    }

    /// Get the current state
    #[must_use]
    pub fn state(&self) -> CircuitState {
        CircuitState::from(self.state.load(Ordering::Acquire))
    }

    /// Whether a call to this provider could proceed right now.
    ///
    /// Pure read: claims nothing, transitions nothing. The router uses this
    /// for candidate filtering; the probe slot is only claimed by
    /// [`try_acquire`](Self::try_acquire) for the candidate actually chosen.
    #[must_use]
    pub fn is_available(&self) -> bool {
        match self.state() {
            CircuitState::Closed | CircuitState::Recovering => true,
            CircuitState::Open => self.cooldown_elapsed(),
            CircuitState::HalfOpen => !self.probe_claimed.load(Ordering::Acquire),
        }
    }

    /// Claim permission for one call.
    ///
    /// In CLOSED and RECOVERING this always succeeds. In OPEN it succeeds
    /// only once the cooldown has elapsed, moving the circuit to HALF_OPEN
    /// and handing the caller the single probe slot. In HALF_OPEN it
    /// succeeds only if the probe slot is free.
    ///
    /// Callers that acquire MUST report the call via
    /// [`record_outcome`](Self::record_outcome).
    #[must_use]
    pub fn try_acquire(&self) -> bool {
        match self.state() {
            CircuitState::Closed | CircuitState::Recovering => true,
            CircuitState::Open => {
                if !self.cooldown_elapsed() {
                    return false;
                }
                self.transition_to_half_open();
                self.claim_probe()
            }
            CircuitState::HalfOpen => self.claim_probe(),
        }
    }

    /// Give back an acquired permission without recording an outcome.
    ///
    /// For the case where the holder decided not to invoke after all (rate
    /// limit denied, adapter missing). Frees the half-open probe slot so a
    /// later call can still probe; a no-op in every other state.
    pub fn release(&self) {
        if self.state() == CircuitState::HalfOpen {
            self.probe_claimed.store(false, Ordering::Release);
        }
    }

    /// Record the outcome of a permitted call.
    pub fn record_outcome(&self, success: bool) {
        if success {
            self.record_success();
        } else {
            self.record_failure();
        }
    }

    /// Time until this provider is worth retrying.
    ///
    /// Zero when calls are currently permitted. While a probe is in flight
    /// the full cooldown is returned as a conservative hint.
    #[must_use]
    pub fn time_until_retry(&self) -> Duration {
        match self.state() {
            CircuitState::Closed | CircuitState::Recovering => Duration::ZERO,
            CircuitState::Open => self.remaining_cooldown(),
            CircuitState::HalfOpen => {
                if self.probe_claimed.load(Ordering::Acquire) {
                    Duration::from_millis(self.cooldown_ms.load(Ordering::Acquire))
                } else {
                    Duration::ZERO
                }
            }
        }
    }

    /// Reset to CLOSED (manual intervention / admin surface)
    pub fn reset(&self) {
        self.transition_to_closed();
    }

    /// Force the circuit open (manual intervention or tests)
    pub fn force_open(&self) {
        self.transition_to_open(false);
    }

    /// Current health snapshot
    #[must_use]
    pub fn health(&self) -> ProviderHealth {
        ProviderHealth {
            provider: self.provider.clone(),
            state: self.state(),
            consecutive_failures: self.consecutive_failures.load(Ordering::Relaxed),
            consecutive_successes: self.consecutive_successes.load(Ordering::Relaxed),
            time_until_retry: self.time_until_retry(),
        }
    }

    fn claim_probe(&self) -> bool {
        self.probe_claimed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn cooldown_elapsed(&self) -> bool {
        self.remaining_cooldown().is_zero()
    }

    fn remaining_cooldown(&self) -> Duration {
        let opened_at = self.opened_at.load(Ordering::Acquire);
        if opened_at == 0 {
            return Duration::ZERO;
        }
        let cooldown = self.cooldown_ms.load(Ordering::Acquire);
        let elapsed = now_millis().saturating_sub(opened_at);
        Duration::from_millis(cooldown.saturating_sub(elapsed))
    }

    fn record_success(&self) {
        match self.state() {
            CircuitState::Closed => {
                self.consecutive_failures.store(0, Ordering::Relaxed);
            }
            CircuitState::HalfOpen => {
                debug!(provider = %self.provider, "Probe succeeded");
                self.transition_to_recovering();
            }
            CircuitState::Recovering => {
                let successes = self.consecutive_successes.fetch_add(1, Ordering::Relaxed) + 1;
                if successes >= self.config.recovery_window {
                    self.transition_to_closed();
                }
            }
            CircuitState::Open => {}
        }
    }

    fn record_failure(&self) {
        match self.state() {
            CircuitState::Closed => {
                let failures = self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;
                if failures >= self.config.failure_threshold {
                    debug!(
                        provider = %self.provider,
                        failures,
                        threshold = self.config.failure_threshold,
                        "Failure threshold reached"
                    );
                    self.transition_to_open(false);
                }
            }
            CircuitState::HalfOpen => {
                debug!(provider = %self.provider, "Probe failed, reopening");
                self.transition_to_open(true);
            }
            CircuitState::Recovering => {
                debug!(provider = %self.provider, "Failure during recovery, reopening");
                self.transition_to_open(false);
            }
            CircuitState::Open => {}
        }
    }

    fn transition_to_open(&self, backoff: bool) {
        let _guard = self.transition_lock.write();

        if backoff {
            let current = self.cooldown_ms.load(Ordering::Acquire);
            let max = self.config.max_cooldown.as_millis() as u64;
            let next = ((current as f64 * self.config.cooldown_multiplier) as u64).min(max);
            self.cooldown_ms.store(next, Ordering::Release);
        }

        let prev = self.state.swap(CircuitState::Open as u8, Ordering::Release);
        self.opened_at.store(now_millis(), Ordering::Release);
        self.probe_claimed.store(false, Ordering::Release);
        self.consecutive_successes.store(0, Ordering::Relaxed);

        if prev != CircuitState::Open as u8 {
            warn!(
                provider = %self.provider,
                cooldown_ms = self.cooldown_ms.load(Ordering::Acquire),
                "Circuit breaker opened"
            );
        }
    }

    fn transition_to_half_open(&self) {
        let _guard = self.transition_lock.write();

        // Another task may have won the race
        if self.state.load(Ordering::Acquire) != CircuitState::Open as u8 {
            return;
        }
        if !self.cooldown_elapsed() {
            return;
        }

        self.state
            .store(CircuitState::HalfOpen as u8, Ordering::Release);
        self.probe_claimed.store(false, Ordering::Release);

        info!(provider = %self.provider, "Circuit breaker half-open, probing");
    }

    fn transition_to_recovering(&self) {
        let _guard = self.transition_lock.write();

        self.state
            .store(CircuitState::Recovering as u8, Ordering::Release);
        self.consecutive_successes.store(0, Ordering::Relaxed);
        self.consecutive_failures.store(0, Ordering::Relaxed);
        self.probe_claimed.store(false, Ordering::Release);

        info!(provider = %self.provider, "Circuit breaker recovering");
    }

    fn transition_to_closed(&self) {
        let _guard = self.transition_lock.write();

        self.state
            .store(CircuitState::Closed as u8, Ordering::Release);
        self.consecutive_failures.store(0, Ordering::Relaxed);
        self.consecutive_successes.store(0, Ordering::Relaxed);
        self.opened_at.store(0, Ordering::Release);
        self.probe_claimed.store(false, Ordering::Release);
        self.cooldown_ms
            .store(self.config.cooldown.as_millis() as u64, Ordering::Release);

        info!(provider = %self.provider, "Circuit breaker closed");
    }
}

/// Point-in-time health of one provider, for the admin surface.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ProviderHealth {
    /// The provider
    pub provider: ProviderId,
    /// Breaker state
    pub state: CircuitState,
    /// Consecutive failures observed
    pub consecutive_failures: u32,
    /// Consecutive successes observed (recovery progress)
    pub consecutive_successes: u32,
    /// Time until a call is worth attempting
    pub time_until_retry: Duration,
}

/// One circuit breaker per provider, created lazily on first use.
pub struct CircuitBreakerSet {
    breakers: DashMap<ProviderId, Arc<CircuitBreaker>>,
    config: CircuitBreakerConfig,
}

impl CircuitBreakerSet {
    /// Create a breaker set with the given per-breaker configuration
    #[must_use]
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            breakers: DashMap::new(),
            config,
        }
    }

    /// Get (or lazily create) the breaker for a provider
    #[must_use]
    pub fn breaker(&self, provider: &ProviderId) -> Arc<CircuitBreaker> {
        self.breakers
            .entry(provider.clone())
            .or_insert_with(|| {
                Arc::new(CircuitBreaker::new(provider.clone(), self.config.clone()))
            })
            .clone()
    }

    /// Whether a provider could serve a call right now.
    ///
    /// Providers never seen before are closed, hence available.
    #[must_use]
    pub fn is_available(&self, provider: &ProviderId) -> bool {
        self.breakers
            .get(provider)
            .map_or(true, |b| b.is_available())
    }

    /// Record a call outcome for a provider
    pub fn record_outcome(&self, provider: &ProviderId, success: bool) {
        self.breaker(provider).record_outcome(success);
    }

    /// Time until the provider is worth retrying
    #[must_use]
    pub fn time_until_retry(&self, provider: &ProviderId) -> Duration {
        self.breakers
            .get(provider)
            .map_or(Duration::ZERO, |b| b.time_until_retry())
    }

    /// Health snapshot across all known providers
    #[must_use]
    pub fn states(&self) -> Vec<ProviderHealth> {
        let mut out: Vec<ProviderHealth> =
            self.breakers.iter().map(|e| e.value().health()).collect();
        out.sort_by(|a, b| a.provider.cmp(&b.provider));
        out
    }
}
