//! The router: candidate filtering, ranking, and failover execution.

use crate::adapters::AdapterSet;
use chrono::Utc;
use modelgw_core::{
    GatewayError, GatewayResult, InferenceRequest, InferenceResult, ModelDescriptor,
    ProviderError,
};
use modelgw_registry::ModelRegistry;
use modelgw_resilience::{CircuitBreakerSet, RateLimiter};
use std::cmp::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Router configuration
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Additional candidates tried after the first transient failure.
    /// Failover is bounded; the router never retries indefinitely.
    pub max_failover_candidates: u32,
    /// Invoke timeout applied when a request carries no latency ceiling
    pub default_invoke_timeout: Duration,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            max_failover_candidates: 2,
            default_invoke_timeout: Duration::from_secs(30),
        }
    }
}

/// Selects and invokes (provider, model) candidates for requests.
pub struct Router {
    registry: Arc<ModelRegistry>,
    breakers: Arc<CircuitBreakerSet>,
    limiter: Arc<RateLimiter>,
    adapters: Arc<AdapterSet>,
    config: RouterConfig,
}

impl Router {
    /// Create a router over the given component handles
    #[must_use]
    pub fn new(
        registry: Arc<ModelRegistry>,
        breakers: Arc<CircuitBreakerSet>,
        limiter: Arc<RateLimiter>,
        adapters: Arc<AdapterSet>,
        config: RouterConfig,
    ) -> Self {
        Self {
            registry,
            breakers,
            limiter,
            adapters,
            config,
        }
    }

    /// Rank every candidate eligible to serve `request`.
    ///
    /// Filters by capability, enabled flag, context window, and the
    /// request's cost ceiling, then drops providers whose breaker is
    /// unavailable and (caller, provider) pairs the rate limiter would deny.
    /// The survivors are ranked by ascending estimated cost, then latency
    /// class, then provider id, then model id, so selection is a pure
    /// function of component state.
    ///
    /// # Errors
    /// `CapabilityUnavailable` when nothing in the catalog serves the
    /// required capabilities at all; `AllProvidersUnavailable` when
    /// candidates exist but every one is excluded.
    pub fn rank_candidates(
        &self,
        request: &InferenceRequest,
    ) -> GatewayResult<Vec<Arc<ModelDescriptor>>> {
        let serving = self.registry.serving(&request.required_capabilities);
        if serving.is_empty() {
            return Err(GatewayError::CapabilityUnavailable {
                required: request.required_capabilities.clone(),
            });
        }

        let estimated_tokens = request.estimated_tokens();
        let feasible: Vec<Arc<ModelDescriptor>> = serving
            .iter()
            .filter(|m| m.fits_context(estimated_tokens))
            .filter(|m| {
                request
                    .max_cost
                    .map_or(true, |ceiling| m.cost.estimate(estimated_tokens) <= ceiling)
            })
            .cloned()
            .collect();

        let mut eligible: Vec<Arc<ModelDescriptor>> = feasible
            .iter()
            .filter(|m| self.breakers.is_available(&m.provider))
            .filter(|m| {
                self.limiter
                    .would_allow(&request.caller, &m.provider, estimated_tokens)
            })
            .cloned()
            .collect();

        if eligible.is_empty() {
            let retry_after = feasible
                .iter()
                .map(|m| self.breakers.time_until_retry(&m.provider))
                .filter(|d| !d.is_zero())
                .min();
            return Err(GatewayError::AllProvidersUnavailable {
                candidates: serving.len(),
                retry_after,
            });
        }

        eligible.sort_by(|a, b| {
            let cost_a = a.cost.estimate(estimated_tokens);
            let cost_b = b.cost.estimate(estimated_tokens);
            cost_a
                .partial_cmp(&cost_b)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.latency_class.cmp(&b.latency_class))
                .then_with(|| a.provider.cmp(&b.provider))
                .then_with(|| a.id.cmp(&b.id))
        });

        Ok(eligible)
    }

    /// Select the model that would serve `request` right now.
    ///
    /// Consumes nothing: no tokens are spent and no probe is claimed.
    ///
    /// # Errors
    /// See [`rank_candidates`](Self::rank_candidates).
    pub fn route(&self, request: &InferenceRequest) -> GatewayResult<Arc<ModelDescriptor>> {
        let ranked = self.rank_candidates(request)?;
        // Non-empty by construction
        ranked
            .into_iter()
            .next()
            .ok_or_else(|| GatewayError::internal("ranked candidate list was empty"))
    }

    /// Serve `request` end to end: walk the ranked candidates with bounded
    /// failover, invoking at most `1 + max_failover_candidates` of them.
    ///
    /// Per candidate: the breaker permission and the rate-limit tokens are
    /// acquired (consuming) only at this point, the adapter is invoked under
    /// a timeout, and the outcome is recorded against exactly that
    /// provider's breaker. Transient errors move on to the next candidate;
    /// permanent errors surface immediately without touching breaker health.
    ///
    /// # Errors
    /// The taxonomy of [`GatewayError`]; see the crate docs.
    pub async fn execute(&self, request: &InferenceRequest) -> GatewayResult<InferenceResult> {
        let ranked = self.rank_candidates(request)?;
        let estimated_tokens = request.estimated_tokens();
        let max_attempts = self.config.max_failover_candidates as usize + 1;

        let mut attempts = 0u32;
        let mut last_transient: Option<ProviderError> = None;

        for descriptor in &ranked {
            if attempts as usize >= max_attempts {
                break;
            }
            if request.expired_at(Utc::now()) {
                return Err(GatewayError::expired(request.id.clone()));
            }

            let provider = &descriptor.provider;
            let breaker = self.breakers.breaker(provider);
            if !breaker.try_acquire() {
                debug!(provider = %provider, "Breaker refused candidate, skipping");
                continue;
            }

            if !self
                .limiter
                .try_acquire(&request.caller, provider, estimated_tokens)
                .is_allowed()
            {
                breaker.release();
                debug!(provider = %provider, "Rate limit refused candidate, skipping");
                continue;
            }

            let Some(adapter) = self.adapters.get(provider) else {
                breaker.release();
                warn!(provider = %provider, "No adapter registered for catalog provider");
                continue;
            };

            let timeout = self.invoke_timeout(request);
            attempts += 1;
            let started = Instant::now();

            debug!(
                request = %request.id,
                model = %descriptor.id,
                provider = %provider,
                attempt = attempts,
                "Invoking provider"
            );

            match adapter.invoke(descriptor, &request.payload, timeout).await {
                Ok(response) => {
                    breaker.record_outcome(true);
                    let latency = started.elapsed();
                    let cost = descriptor
                        .cost
                        .cost(response.usage.input_tokens, response.usage.output_tokens);
                    return Ok(InferenceResult {
                        request_id: request.id.clone(),
                        model_id: descriptor.id.clone(),
                        output: response.output,
                        usage: response.usage,
                        cost,
                        latency,
                        cache_hit: false,
                    });
                }
                Err(error) if error.is_transient() => {
                    breaker.record_outcome(false);
                    warn!(
                        request = %request.id,
                        provider = %provider,
                        error = %error,
                        "Transient provider failure, failing over"
                    );
                    last_transient = Some(error);
                }
                Err(error) => {
                    // Caller-side problem; says nothing about provider health
                    breaker.release();
                    return Err(GatewayError::ProviderPermanent {
                        provider: provider.clone(),
                        source: error,
                    });
                }
            }
        }

        match last_transient {
            Some(source) => Err(GatewayError::ProviderTransient {
                provider: source.provider.clone(),
                attempts,
                source,
            }),
            None => Err(GatewayError::AllProvidersUnavailable {
                candidates: ranked.len(),
                retry_after: ranked
                    .iter()
                    .map(|m| self.breakers.time_until_retry(&m.provider))
                    .filter(|d| !d.is_zero())
                    .min(),
            }),
        }
    }

    fn invoke_timeout(&self, request: &InferenceRequest) -> Duration {
        let mut timeout = request
            .max_latency
            .unwrap_or(self.config.default_invoke_timeout);

        if let Some(deadline) = request.deadline {
            let remaining = (deadline - Utc::now())
                .to_std()
                .unwrap_or(Duration::ZERO);
            timeout = timeout.min(remaining);
        }
        timeout
    }
}
