//! Token-bucket rate limiting per (caller, provider) pair.
//!
//! Tokens refill continuously at the bucket's rate, capped at capacity. An
//! acquire never blocks; a denial carries the wait until enough tokens
//! accrue and the caller decides whether to wait, re-route, or reject.
//! Buckets are created lazily and evicted after an idle period to bound
//! memory.

use dashmap::DashMap;
use modelgw_core::{CallerId, ProviderId};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::debug;

/// Refill parameters for one bucket
#[derive(Debug, Clone, Copy)]
pub struct BucketParams {
    /// Maximum tokens the bucket can hold
    pub capacity: f64,
    /// Tokens added per second
    pub refill_rate: f64,
}

impl Default for BucketParams {
    fn default() -> Self {
        Self {
            capacity: 10_000.0,
            refill_rate: 1_000.0,
        }
    }
}

/// Rate limiter configuration
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Parameters applied to buckets with no provider override
    pub default_bucket: BucketParams,
    /// Per-provider overrides
    pub provider_overrides: HashMap<ProviderId, BucketParams>,
    /// Idle period after which a bucket is eligible for eviction
    pub idle_timeout: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            default_bucket: BucketParams::default(),
            provider_overrides: HashMap::new(),
            idle_timeout: Duration::from_secs(600),
        }
    }
}

/// Outcome of an acquire attempt
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Decision {
    /// Tokens were deducted; the call may proceed
    Allowed,
    /// Insufficient tokens
    Denied {
        /// Wait until enough tokens will have accrued
        retry_after: Duration,
    },
}

impl Decision {
    /// Whether the decision permits the call
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }
}

#[derive(Debug)]
struct Bucket {
    capacity: f64,
    refill_rate: f64,
    tokens: f64,
    last_refill: Instant,
    last_used: Instant,
}

impl Bucket {
    fn new(params: BucketParams, now: Instant) -> Self {
        Self {
            capacity: params.capacity,
            refill_rate: params.refill_rate,
            tokens: params.capacity,
            last_refill: now,
            last_used: now,
        }
    }

    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_rate).min(self.capacity);
        self.last_refill = now;
    }

    fn try_take(&mut self, amount: f64, now: Instant) -> Decision {
        self.refill(now);
        self.last_used = now;

        if self.tokens >= amount {
            self.tokens -= amount;
            Decision::Allowed
        } else {
            let deficit = amount - self.tokens;
            let retry_after = if self.refill_rate > 0.0 {
                Duration::from_secs_f64(deficit / self.refill_rate)
            } else {
                Duration::MAX
            };
            Decision::Denied { retry_after }
        }
    }

    fn peek(&mut self, amount: f64, now: Instant) -> bool {
        self.refill(now);
        self.tokens >= amount
    }
}

/// Read-only view of one bucket, for the admin surface.
#[derive(Debug, Clone, serde::Serialize)]
pub struct BucketOccupancy {
    /// Caller side of the key
    pub caller: CallerId,
    /// Provider side of the key
    pub provider: ProviderId,
    /// Tokens currently available
    pub available_tokens: f64,
    /// Bucket capacity
    pub capacity: f64,
}

/// Per-(caller, provider) token-bucket admission gate.
pub struct RateLimiter {
    buckets: DashMap<(CallerId, ProviderId), Mutex<Bucket>>,
    config: RateLimitConfig,
}

impl RateLimiter {
    /// Create a rate limiter
    #[must_use]
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            buckets: DashMap::new(),
            config,
        }
    }

    /// Create with default configuration
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(RateLimitConfig::default())
    }

    fn params_for(&self, provider: &ProviderId) -> BucketParams {
        self.config
            .provider_overrides
            .get(provider)
            .copied()
            .unwrap_or(self.config.default_bucket)
    }

    /// Attempt to deduct `estimated_tokens` from the pair's bucket.
    #[must_use]
    pub fn try_acquire(
        &self,
        caller: &CallerId,
        provider: &ProviderId,
        estimated_tokens: u32,
    ) -> Decision {
        self.try_acquire_at(caller, provider, estimated_tokens, Instant::now())
    }

    /// Deterministic variant of [`try_acquire`](Self::try_acquire) taking an
    /// explicit clock reading.
    #[must_use]
    pub fn try_acquire_at(
        &self,
        caller: &CallerId,
        provider: &ProviderId,
        estimated_tokens: u32,
        now: Instant,
    ) -> Decision {
        let params = self.params_for(provider);
        let entry = self
            .buckets
            .entry((caller.clone(), provider.clone()))
            .or_insert_with(|| Mutex::new(Bucket::new(params, now)));

        let decision = entry.lock().try_take(f64::from(estimated_tokens), now);
        if let Decision::Denied { retry_after } = decision {
            debug!(
                caller = %caller,
                provider = %provider,
                tokens = estimated_tokens,
                retry_after_ms = retry_after.as_millis(),
                "Rate limit denied"
            );
        }
        decision
    }

    /// Non-consuming check used during candidate filtering.
    ///
    /// The actual deduction happens via `try_acquire` only once a candidate
    /// is chosen, so tokens are never spent on candidates that are skipped.
    #[must_use]
    pub fn would_allow(
        &self,
        caller: &CallerId,
        provider: &ProviderId,
        estimated_tokens: u32,
    ) -> bool {
        self.would_allow_at(caller, provider, estimated_tokens, Instant::now())
    }

    /// Deterministic variant of [`would_allow`](Self::would_allow).
    #[must_use]
    pub fn would_allow_at(
        &self,
        caller: &CallerId,
        provider: &ProviderId,
        estimated_tokens: u32,
        now: Instant,
    ) -> bool {
        match self.buckets.get(&(caller.clone(), provider.clone())) {
            // A pair never seen starts with a full bucket
            None => f64::from(estimated_tokens) <= self.params_for(provider).capacity,
            Some(entry) => entry.lock().peek(f64::from(estimated_tokens), now),
        }
    }

    /// Evict buckets idle longer than the configured timeout.
    ///
    /// Returns the number of buckets removed.
    pub fn sweep_idle(&self) -> usize {
        self.sweep_idle_at(Instant::now())
    }

    /// Deterministic variant of [`sweep_idle`](Self::sweep_idle).
    pub fn sweep_idle_at(&self, now: Instant) -> usize {
        let idle_timeout = self.config.idle_timeout;
        let before = self.buckets.len();
        self.buckets.retain(|_, bucket| {
            now.saturating_duration_since(bucket.lock().last_used) < idle_timeout
        });
        let removed = before - self.buckets.len();
        if removed > 0 {
            debug!(removed, "Evicted idle rate-limit buckets");
        }
        removed
    }

    /// Number of live buckets
    #[must_use]
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    /// Whether no buckets exist
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Occupancy snapshot across all live buckets, for the admin surface.
    #[must_use]
    pub fn occupancy(&self) -> Vec<BucketOccupancy> {
        let now = Instant::now();
        let mut out: Vec<BucketOccupancy> = self
            .buckets
            .iter()
            .map(|entry| {
                let (caller, provider) = entry.key().clone();
                let mut bucket = entry.value().lock();
                bucket.refill(now);
                BucketOccupancy {
                    caller,
                    provider,
                    available_tokens: bucket.tokens,
                    capacity: bucket.capacity,
                }
            })
            .collect();
        out.sort_by(|a, b| (&a.caller, &a.provider).cmp(&(&b.caller, &b.provider)));
        out
    }
}
