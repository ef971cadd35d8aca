//! Error types for the gateway.
//!
//! The taxonomy distinguishes caller-side problems (validation, permanent
//! provider rejections), per-request transient outcomes (provider errors the
//! router fails over on), and system-level backpressure (queue rejection,
//! candidate exhaustion). Breaker and limiter denials are handled internally
//! by routing around them; only exhaustion of all candidates surfaces here.

use crate::adapter::ProviderError;
use crate::descriptor::CapabilitySet;
use crate::types::{ProviderId, RequestId};
use std::time::Duration;
use thiserror::Error;

/// Result alias used throughout the gateway
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Errors surfaced to the gateway's caller.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// No catalog entry matches the required capabilities. Fatal, not retried.
    #[error("no model serves the required capabilities [{required}]")]
    CapabilityUnavailable {
        /// The capability set nothing could serve
        required: CapabilitySet,
    },

    /// Every candidate was excluded by circuit breaker or rate limiter.
    /// Fatal for this request, transient for the system.
    #[error("all {candidates} candidate provider(s) unavailable, retry after {retry_after:?}")]
    AllProvidersUnavailable {
        /// Number of candidates that were considered
        candidates: usize,
        /// Earliest time at which a candidate may become available again
        retry_after: Option<Duration>,
    },

    /// A transient provider failure that survived router failover.
    #[error("provider {provider} failed after {attempts} attempt(s): {source}")]
    ProviderTransient {
        /// Last provider attempted
        provider: ProviderId,
        /// Total invocation attempts made
        attempts: u32,
        /// The underlying provider error
        #[source]
        source: ProviderError,
    },

    /// A permanent provider rejection, surfaced immediately without failover.
    #[error("provider {provider} rejected the request: {source}")]
    ProviderPermanent {
        /// Provider that rejected the request
        provider: ProviderId,
        /// The underlying provider error
        #[source]
        source: ProviderError,
    },

    /// The admission queue is full. Backpressure, surfaced immediately.
    #[error("request queue rejected the request: {reason}")]
    QueueRejected {
        /// Why admission was refused
        reason: String,
    },

    /// The request's deadline passed before it could be served.
    #[error("request {request_id} expired before service")]
    RequestExpired {
        /// The expired request
        request_id: RequestId,
    },

    /// The request failed validation at the gateway boundary.
    #[error("validation failed: {message}")]
    Validation {
        /// Human-readable description
        message: String,
        /// Offending field, when known
        field: Option<String>,
    },

    /// Internal invariant violation. Should not happen.
    #[error("internal gateway error: {message}")]
    Internal {
        /// Description of the failure
        message: String,
    },
}

impl GatewayError {
    /// Create a validation error
    #[must_use]
    pub fn validation(message: impl Into<String>, field: Option<String>) -> Self {
        Self::Validation {
            message: message.into(),
            field,
        }
    }

    /// Create an internal error
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Create a queue-rejected error
    #[must_use]
    pub fn queue_rejected(reason: impl Into<String>) -> Self {
        Self::QueueRejected {
            reason: reason.into(),
        }
    }

    /// Create a request-expired error
    #[must_use]
    pub fn expired(request_id: RequestId) -> Self {
        Self::RequestExpired { request_id }
    }

    /// Whether the caller may reasonably retry the same request later.
    ///
    /// `RequestExpired` is deliberately not retryable: the caller set the
    /// deadline and only the caller knows whether a fresh one makes sense.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::AllProvidersUnavailable { .. }
            | Self::ProviderTransient { .. }
            | Self::QueueRejected { .. } => true,
            Self::CapabilityUnavailable { .. }
            | Self::ProviderPermanent { .. }
            | Self::RequestExpired { .. }
            | Self::Validation { .. }
            | Self::Internal { .. } => false,
        }
    }
}

impl From<ProviderError> for GatewayError {
    fn from(err: ProviderError) -> Self {
        let provider = err.provider.clone();
        if err.kind.is_transient() {
            Self::ProviderTransient {
                provider,
                attempts: 1,
                source: err,
            }
        } else {
            Self::ProviderPermanent {
                provider,
                source: err,
            }
        }
    }
}
