//! Result types for the gateway.

use crate::types::{ModelId, RequestId};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Token counts for one inference call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Tokens consumed by the input
    pub input_tokens: u32,
    /// Tokens produced as output
    pub output_tokens: u32,
}

impl TokenUsage {
    /// Total tokens for the call
    #[must_use]
    pub fn total(&self) -> u32 {
        self.input_tokens + self.output_tokens
    }
}

/// The outcome of one served request.
///
/// Produced exactly once per request (or an error outcome) and handed back
/// to the caller; the gateway retains nothing beyond what the semantic cache
/// stores.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceResult {
    /// The request this result answers
    pub request_id: RequestId,
    /// Model that produced the output
    pub model_id: ModelId,
    /// Model output
    pub output: String,
    /// Tokens consumed
    pub usage: TokenUsage,
    /// Cost in USD, computed from the descriptor's rates
    pub cost: f64,
    /// Wall-clock latency of the serving call
    pub latency: Duration,
    /// Whether the result came from the semantic cache
    pub cache_hit: bool,
}

impl InferenceResult {
    /// A copy of this result re-keyed to a different request, marked as a
    /// cache hit. Used when a cached entry answers a new request.
    #[must_use]
    pub fn as_cache_hit(&self, request_id: RequestId) -> Self {
        Self {
            request_id,
            model_id: self.model_id.clone(),
            output: self.output.clone(),
            usage: self.usage,
            cost: 0.0,
            latency: Duration::ZERO,
            cache_hit: true,
        }
    }
}
