//! # Model Gateway Resilience
//!
//! Resilience primitives for the Model Gateway:
//! - Per-provider circuit breaker for failure isolation
//! - Per-(caller, provider) token-bucket rate limiter for admission gating
//!
//! Both are sharded per key rather than guarded by one global lock; the
//! router reads them on every candidate selection.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod circuit_breaker;
pub mod rate_limiter;

// Re-export main types
pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerSet, CircuitState, ProviderHealth,
};
pub use rate_limiter::{BucketOccupancy, BucketParams, Decision, RateLimitConfig, RateLimiter};
