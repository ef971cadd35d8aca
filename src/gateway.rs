//! Gateway assembly and orchestration.
//!
//! One logical operation is exposed to the caller-facing boundary:
//! [`Gateway::infer`]. Control flow per request: semantic-cache lookup (may
//! short-circuit) → queue admission → worker pool → router execution →
//! outcome recorded back into breaker, limiter, and cache.

use chrono::Utc;
use modelgw_cache::{Lookup, SemanticCache, SemanticCacheConfig};
use modelgw_config::{ConfigError, GatewayConfig};
use modelgw_core::{
    CallerId, GatewayError, GatewayResult, InferenceRequest, InferenceResult, ModelDescriptor,
    Priority, ProviderId,
};
use modelgw_queue::{QueueConfig, QueueItem, RequestQueue};
use modelgw_registry::{ModelRegistry, RegistryError};
use modelgw_resilience::{
    BucketOccupancy, BucketParams, CircuitBreakerConfig, CircuitBreakerSet, CircuitState,
    ProviderHealth, RateLimitConfig, RateLimiter,
};
use modelgw_routing::{AdapterSet, Router, RouterConfig};
use modelgw_telemetry::{Metrics, MetricsError};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::sync::{oneshot, watch, Mutex, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Install the global tracing subscriber from the gateway configuration.
///
/// Thin glue over [`modelgw_telemetry::init_logging`]; `RUST_LOG` still wins
/// over the configured level.
///
/// # Errors
/// Returns a [`modelgw_telemetry::LoggingError`] for an invalid filter or a
/// subscriber that is already installed.
pub fn init_logging_from(
    config: &GatewayConfig,
) -> Result<(), modelgw_telemetry::LoggingError> {
    let logging = modelgw_telemetry::LoggingConfig::new()
        .with_level(config.logging.level.clone())
        .with_json(config.logging.json);
    modelgw_telemetry::init_logging(&logging)
}

/// Errors assembling a gateway from configuration.
#[derive(Debug, Error)]
pub enum BuildError {
    /// Configuration could not be converted
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The catalog was rejected by the registry
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Metric registration failed
    #[error("metrics registration failed: {0}")]
    Metrics(#[from] MetricsError),
}

/// One queued unit of work: the request plus its reply channel.
struct Job {
    request: InferenceRequest,
    reply: oneshot::Sender<GatewayResult<InferenceResult>>,
}

impl QueueItem for Job {
    fn caller(&self) -> &CallerId {
        &self.request.caller
    }

    fn priority(&self) -> Priority {
        self.request.priority
    }

    fn deadline(&self) -> Option<chrono::DateTime<Utc>> {
        self.request.deadline
    }

    fn on_enqueued(&mut self, at: chrono::DateTime<Utc>) {
        self.request.enqueued_at = Some(at);
    }
}

/// Everything the worker tasks share with the public handle.
struct Shared {
    registry: Arc<ModelRegistry>,
    breakers: Arc<CircuitBreakerSet>,
    limiter: Arc<RateLimiter>,
    cache: Arc<SemanticCache>,
    queue: RequestQueue<Job>,
    router: Router,
    metrics: Arc<Metrics>,
    work_ready: Notify,
}

impl Shared {
    /// Complete every queue-expired job with a `RequestExpired` outcome.
    fn deliver_expired(&self) {
        for job in self.queue.take_expired() {
            self.metrics.record_expired();
            self.metrics.record_outcome("expired");
            let request_id = job.request.id.clone();
            debug!(request = %request_id, "Reporting queue-expired request");
            let _ = job.reply.send(Err(GatewayError::expired(request_id)));
        }
    }

    async fn serve(&self, job: Job) {
        let request = job.request;
        let started = Instant::now();

        let mut outcome = self.router.execute(&request).await;

        // A result that arrives after the deadline is discarded; the caller
        // asked not to pay for it.
        if outcome.is_ok() && request.expired_at(Utc::now()) {
            self.metrics.record_expired();
            outcome = Err(GatewayError::expired(request.id.clone()));
        }

        if let Ok(ref result) = outcome {
            self.cache.store(&request, result).await;
        }

        self.metrics.record_outcome(outcome_label(&outcome));
        self.metrics.observe_latency(started.elapsed());
        let _ = job.reply.send(outcome);
    }
}

fn outcome_label(outcome: &GatewayResult<InferenceResult>) -> &'static str {
    match outcome {
        Ok(_) => "success",
        Err(GatewayError::CapabilityUnavailable { .. }) => "capability_unavailable",
        Err(GatewayError::AllProvidersUnavailable { .. }) => "all_providers_unavailable",
        Err(GatewayError::ProviderTransient { .. }) => "provider_transient",
        Err(GatewayError::ProviderPermanent { .. }) => "provider_permanent",
        Err(GatewayError::QueueRejected { .. }) => "queue_rejected",
        Err(GatewayError::RequestExpired { .. }) => "expired",
        Err(GatewayError::Validation { .. }) => "validation",
        Err(GatewayError::Internal { .. }) => "internal",
    }
}

/// Aggregated introspection snapshot, for the admin surface.
#[derive(Debug, Clone, serde::Serialize)]
pub struct GatewayStatus {
    /// Semantic cache counters
    pub cache: modelgw_cache::CacheStats,
    /// Per-provider circuit state
    pub circuits: Vec<ProviderHealth>,
    /// Per-(caller, provider) rate-limit occupancy
    pub rate_limits: Vec<BucketOccupancy>,
    /// Requests currently queued
    pub queue_depth: usize,
}

/// The assembled gateway.
///
/// Cheap to share behind an `Arc`. Dropping the last handle aborts nothing;
/// call [`shutdown`](Self::shutdown) for an orderly stop.
pub struct Gateway {
    shared: Arc<Shared>,
    shutdown_tx: watch::Sender<bool>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl Gateway {
    /// Assemble a gateway from configuration and start its worker pool.
    ///
    /// Must be called within a tokio runtime. `adapters` supplies one
    /// [`modelgw_core::ProviderAdapter`] per provider named in the catalog;
    /// `embedder` is the external embedding collaborator for the semantic
    /// cache.
    ///
    /// # Errors
    /// Returns [`BuildError`] for malformed configuration.
    pub fn start(
        config: &GatewayConfig,
        adapters: Arc<AdapterSet>,
        embedder: Arc<dyn modelgw_cache::Embedder>,
    ) -> Result<Self, BuildError> {
        let registry = Arc::new(ModelRegistry::new(config.descriptors()?)?);
        let breakers = Arc::new(CircuitBreakerSet::new(breaker_config(config)));
        let limiter = Arc::new(RateLimiter::new(rate_limit_config(config)?));
        let cache = Arc::new(SemanticCache::new(cache_config(config), embedder));
        let queue = RequestQueue::new(queue_config(config)?);
        let metrics = Arc::new(Metrics::with_defaults()?);

        let router = Router::new(
            Arc::clone(&registry),
            Arc::clone(&breakers),
            Arc::clone(&limiter),
            adapters,
            RouterConfig {
                max_failover_candidates: config.router.max_failover_candidates,
                default_invoke_timeout: config.router.default_invoke_timeout,
            },
        );

        let shared = Arc::new(Shared {
            registry,
            breakers,
            limiter,
            cache,
            queue,
            router,
            metrics,
            work_ready: Notify::new(),
        });

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut workers = Vec::with_capacity(config.workers.count + 1);

        for worker_id in 0..config.workers.count {
            workers.push(tokio::spawn(worker_loop(
                worker_id,
                Arc::clone(&shared),
                shutdown_rx.clone(),
            )));
        }
        workers.push(tokio::spawn(sweeper_loop(
            Arc::clone(&shared),
            config.workers.sweep_interval,
            shutdown_rx,
        )));

        info!(
            workers = config.workers.count,
            models = shared.registry.len(),
            "Model gateway started"
        );

        Ok(Self {
            shared,
            shutdown_tx,
            workers: Mutex::new(workers),
        })
    }

    /// Serve one inference request.
    ///
    /// Fast path: a semantic-cache hit short-circuits before admission.
    /// Otherwise the request is queued, a worker routes and invokes a
    /// provider with bounded failover, and the result (or a classified
    /// error) comes back through the reply channel.
    ///
    /// # Errors
    /// The full [`GatewayError`] taxonomy.
    pub async fn infer(&self, request: InferenceRequest) -> GatewayResult<InferenceResult> {
        let started = Instant::now();
        request.validate()?;

        if request.expired_at(Utc::now()) {
            self.shared.metrics.record_expired();
            self.shared.metrics.record_outcome("expired");
            return Err(GatewayError::expired(request.id));
        }

        match self.shared.cache.lookup(&request).await {
            Lookup::Hit { result, similarity } => {
                self.shared.metrics.record_cache(true);
                self.shared.metrics.record_outcome("cache_hit");
                self.shared.metrics.observe_latency(started.elapsed());
                debug!(request = %request.id, similarity, "Served from semantic cache");
                return Ok(result.as_cache_hit(request.id));
            }
            Lookup::Miss => {
                self.shared.metrics.record_cache(false);
            }
        }

        let (reply, receiver) = oneshot::channel();
        let request_id = request.id.clone();
        if let Err(rejection) = self.shared.queue.enqueue(Job { request, reply }) {
            self.shared.metrics.record_queue_rejection();
            self.shared.metrics.record_outcome("queue_rejected");
            warn!(request = %request_id, "Queue rejected request");
            return Err(GatewayError::queue_rejected(rejection.to_string()));
        }
        self.shared.metrics.set_queue_depth(self.shared.queue.len());
        self.shared.work_ready.notify_one();

        match receiver.await {
            Ok(outcome) => outcome,
            Err(_) => Err(GatewayError::internal(
                "worker dropped the reply channel",
            )),
        }
    }

    /// Stop the worker pool after in-flight jobs finish.
    pub async fn shutdown(&self) {
        if self.shutdown_tx.send(true).is_err() {
            return;
        }
        self.shared.work_ready.notify_waiters();

        let mut workers = self.workers.lock().await;
        for handle in workers.drain(..) {
            let _ = handle.await;
        }
        info!("Model gateway stopped");
    }

    // --- administrative surface -------------------------------------------

    /// Semantic cache counters
    #[must_use]
    pub fn cache_stats(&self) -> modelgw_cache::CacheStats {
        self.shared.cache.stats()
    }

    /// Per-provider circuit state
    #[must_use]
    pub fn circuit_states(&self) -> Vec<ProviderHealth> {
        self.shared.breakers.states()
    }

    /// Per-(caller, provider) rate-limit occupancy
    #[must_use]
    pub fn rate_occupancy(&self) -> Vec<BucketOccupancy> {
        self.shared.limiter.occupancy()
    }

    /// Requests currently queued
    #[must_use]
    pub fn queue_depth(&self) -> usize {
        self.shared.queue.len()
    }

    /// Everything above in one snapshot
    #[must_use]
    pub fn status(&self) -> GatewayStatus {
        GatewayStatus {
            cache: self.cache_stats(),
            circuits: self.circuit_states(),
            rate_limits: self.rate_occupancy(),
            queue_depth: self.queue_depth(),
        }
    }

    /// Drop every cached entry
    pub fn clear_cache(&self) {
        self.shared.cache.clear();
    }

    /// Atomically replace the model catalog.
    ///
    /// # Errors
    /// Returns [`RegistryError`] and keeps the current catalog when the
    /// replacement is malformed.
    pub fn reload_registry(
        &self,
        descriptors: Vec<ModelDescriptor>,
    ) -> Result<(), RegistryError> {
        self.shared.registry.reload(descriptors)
    }

    /// The metrics handle, for scrape endpoints
    #[must_use]
    pub fn metrics(&self) -> Arc<Metrics> {
        Arc::clone(&self.shared.metrics)
    }
}

async fn worker_loop(worker_id: usize, shared: Arc<Shared>, mut shutdown: watch::Receiver<bool>) {
    debug!(worker_id, "Worker started");
    loop {
        if *shutdown.borrow() {
            break;
        }

        shared.deliver_expired();

        match shared.queue.dequeue() {
            Some(job) => {
                shared.metrics.set_queue_depth(shared.queue.len());
                shared.serve(job).await;
            }
            None => {
                tokio::select! {
                    () = shared.work_ready.notified() => {}
                    _ = shutdown.changed() => {}
                }
            }
        }
    }
    debug!(worker_id, "Worker stopped");
}

/// Periodic housekeeping: cache TTLs, idle buckets, queue deadlines, and the
/// circuit-transition metric.
async fn sweeper_loop(
    shared: Arc<Shared>,
    interval: std::time::Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let mut known_open: HashMap<ProviderId, CircuitState> = HashMap::new();

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = shutdown.changed() => break,
        }
        if *shutdown.borrow() {
            break;
        }

        shared.cache.sweep();
        shared.limiter.sweep_idle();
        shared.queue.sweep_expired();
        shared.deliver_expired();
        shared.metrics.set_queue_depth(shared.queue.len());

        for health in shared.breakers.states() {
            let previous = known_open.insert(health.provider.clone(), health.state);
            if health.state == CircuitState::Open && previous != Some(CircuitState::Open) {
                shared
                    .metrics
                    .record_circuit_opened(health.provider.as_str());
            }
        }
    }
}

// --- config conversions ---------------------------------------------------

fn breaker_config(config: &GatewayConfig) -> CircuitBreakerConfig {
    let section = &config.circuit_breaker;
    CircuitBreakerConfig {
        failure_threshold: section.failure_threshold,
        cooldown: section.cooldown,
        cooldown_multiplier: section.cooldown_multiplier,
        max_cooldown: section.max_cooldown,
        recovery_window: section.recovery_window,
    }
}

fn rate_limit_config(config: &GatewayConfig) -> Result<RateLimitConfig, ConfigError> {
    let section = &config.rate_limit;
    let mut provider_overrides = HashMap::new();
    for (provider, bucket) in &section.provider_overrides {
        provider_overrides.insert(
            ProviderId::new(provider.clone())?,
            BucketParams {
                capacity: bucket.capacity,
                refill_rate: bucket.refill_per_sec,
            },
        );
    }
    Ok(RateLimitConfig {
        default_bucket: BucketParams {
            capacity: section.capacity,
            refill_rate: section.refill_per_sec,
        },
        provider_overrides,
        idle_timeout: section.idle_timeout,
    })
}

fn cache_config(config: &GatewayConfig) -> SemanticCacheConfig {
    let section = &config.cache;
    SemanticCacheConfig {
        similarity_threshold: section.similarity_threshold,
        max_entries: section.max_entries,
        ttl_volatile: section.ttl_volatile,
        ttl_stable: section.ttl_stable,
        default_volatility: section.default_volatility,
    }
}

fn queue_config(config: &GatewayConfig) -> Result<QueueConfig, ConfigError> {
    let section = &config.queue;
    let mut caller_weights = HashMap::new();
    for (caller, weight) in &section.caller_weights {
        caller_weights.insert(CallerId::new(caller.clone())?, *weight);
    }
    Ok(QueueConfig {
        max_depth: section.max_depth,
        caller_weights,
    })
}
