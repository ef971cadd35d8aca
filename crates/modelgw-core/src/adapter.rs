//! The provider adapter contract.
//!
//! Concrete provider SDKs live outside the gateway; they plug in by
//! implementing [`ProviderAdapter`]. The gateway only needs to know whether a
//! failure is transient (eligible for circuit-breaker accounting and router
//! failover) or permanent (a caller-side problem, surfaced immediately).

use crate::descriptor::ModelDescriptor;
use crate::request::RequestPayload;
use crate::result::TokenUsage;
use crate::types::ProviderId;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Classifies provider failures for the resilience machinery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderErrorKind {
    /// The call exceeded its timeout
    Timeout,
    /// The connection was reset or dropped mid-call
    ConnectionReset,
    /// The provider returned a 5xx-class failure
    ServiceUnavailable,
    /// The provider is shedding load
    Overloaded,
    /// Authentication or authorization failed
    AuthFailed,
    /// The request was malformed for this provider
    MalformedRequest,
    /// The request was rejected by the provider's content policy
    ContentPolicy,
}

impl ProviderErrorKind {
    /// Transient failures feed circuit-breaker accounting and are eligible
    /// for router failover. Permanent failures indicate a caller-side
    /// problem, not provider health.
    #[must_use]
    pub fn is_transient(self) -> bool {
        match self {
            Self::Timeout | Self::ConnectionReset | Self::ServiceUnavailable | Self::Overloaded => {
                true
            }
            Self::AuthFailed | Self::MalformedRequest | Self::ContentPolicy => false,
        }
    }
}

impl fmt::Display for ProviderErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => write!(f, "timeout"),
            Self::ConnectionReset => write!(f, "connection_reset"),
            Self::ServiceUnavailable => write!(f, "service_unavailable"),
            Self::Overloaded => write!(f, "overloaded"),
            Self::AuthFailed => write!(f, "auth_failed"),
            Self::MalformedRequest => write!(f, "malformed_request"),
            Self::ContentPolicy => write!(f, "content_policy"),
        }
    }
}

/// An error returned by a provider adapter.
#[derive(Debug, Clone, Error)]
#[error("{kind}: {message}")]
pub struct ProviderError {
    /// Provider that produced the error
    pub provider: ProviderId,
    /// Failure classification
    pub kind: ProviderErrorKind,
    /// Provider-supplied detail
    pub message: String,
}

impl ProviderError {
    /// Create a provider error
    #[must_use]
    pub fn new(provider: ProviderId, kind: ProviderErrorKind, message: impl Into<String>) -> Self {
        Self {
            provider,
            kind,
            message: message.into(),
        }
    }

    /// Whether this error counts against provider health
    #[must_use]
    pub fn is_transient(&self) -> bool {
        self.kind.is_transient()
    }
}

/// A successful adapter invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdapterResponse {
    /// Model output
    pub output: String,
    /// Tokens consumed by the call
    pub usage: TokenUsage,
}

/// Uniform contract the router invokes to perform inference.
///
/// Implementations are external collaborators. They own their own transport
/// concerns (connection pooling, wire format, per-call timeout enforcement);
/// the `timeout` argument is the budget the gateway grants the call.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// The provider this adapter speaks for.
    fn provider_id(&self) -> &ProviderId;

    /// Perform one inference call against `model`.
    ///
    /// # Errors
    /// Returns a [`ProviderError`] classified as transient or permanent.
    async fn invoke(
        &self,
        model: &ModelDescriptor,
        payload: &RequestPayload,
        timeout: Duration,
    ) -> Result<AdapterResponse, ProviderError>;
}
