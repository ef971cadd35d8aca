//! Prometheus metrics.

use prometheus::{
    Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
};
use std::time::Duration;

/// Error type surfaced by metric registration
pub type MetricsError = prometheus::Error;

/// Metrics configuration
#[derive(Debug, Clone)]
pub struct MetricsConfig {
    /// Metric namespace prefix
    pub namespace: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            namespace: "modelgw".to_string(),
        }
    }
}

/// Gateway metrics, registered against one Prometheus registry.
pub struct Metrics {
    registry: Registry,
    requests_total: IntCounterVec,
    request_latency_seconds: Histogram,
    cache_hits: IntCounter,
    cache_misses: IntCounter,
    circuit_opened_total: IntCounterVec,
    queue_depth: IntGauge,
    queue_rejections: IntCounter,
    requests_expired: IntCounter,
}

impl Metrics {
    /// Create and register all gateway metrics.
    ///
    /// # Errors
    /// Returns a [`prometheus::Error`] on registration conflicts.
    pub fn new(config: &MetricsConfig) -> Result<Self, prometheus::Error> {
        let registry = Registry::new();
        let ns = &config.namespace;

        let requests_total = IntCounterVec::new(
            Opts::new("requests_total", "Requests by final outcome").namespace(ns.clone()),
            &["outcome"],
        )?;
        let request_latency_seconds = Histogram::with_opts(
            HistogramOpts::new("request_latency_seconds", "End-to-end request latency")
                .namespace(ns.clone())
                .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
        )?;
        let cache_hits = IntCounter::with_opts(
            Opts::new("cache_hits_total", "Semantic cache hits").namespace(ns.clone()),
        )?;
        let cache_misses = IntCounter::with_opts(
            Opts::new("cache_misses_total", "Semantic cache misses").namespace(ns.clone()),
        )?;
        let circuit_opened_total = IntCounterVec::new(
            Opts::new("circuit_opened_total", "Circuit breaker open transitions")
                .namespace(ns.clone()),
            &["provider"],
        )?;
        let queue_depth = IntGauge::with_opts(
            Opts::new("queue_depth", "Requests currently queued").namespace(ns.clone()),
        )?;
        let queue_rejections = IntCounter::with_opts(
            Opts::new("queue_rejections_total", "Requests refused by backpressure")
                .namespace(ns.clone()),
        )?;
        let requests_expired = IntCounter::with_opts(
            Opts::new("requests_expired_total", "Requests whose deadline passed unserved")
                .namespace(ns.clone()),
        )?;

        registry.register(Box::new(requests_total.clone()))?;
        registry.register(Box::new(request_latency_seconds.clone()))?;
        registry.register(Box::new(cache_hits.clone()))?;
        registry.register(Box::new(cache_misses.clone()))?;
        registry.register(Box::new(circuit_opened_total.clone()))?;
        registry.register(Box::new(queue_depth.clone()))?;
        registry.register(Box::new(queue_rejections.clone()))?;
        registry.register(Box::new(requests_expired.clone()))?;

        Ok(Self {
            registry,
            requests_total,
            request_latency_seconds,
            cache_hits,
            cache_misses,
            circuit_opened_total,
            queue_depth,
            queue_rejections,
            requests_expired,
        })
    }

    /// Create with the default namespace.
    ///
    /// # Errors
    /// Returns a [`prometheus::Error`] on registration conflicts.
    pub fn with_defaults() -> Result<Self, prometheus::Error> {
        Self::new(&MetricsConfig::default())
    }

    /// Count a finished request by outcome label
    pub fn record_outcome(&self, outcome: &str) {
        self.requests_total.with_label_values(&[outcome]).inc();
    }

    /// Observe end-to-end latency
    pub fn observe_latency(&self, latency: Duration) {
        self.request_latency_seconds.observe(latency.as_secs_f64());
    }

    /// Count a cache lookup
    pub fn record_cache(&self, hit: bool) {
        if hit {
            self.cache_hits.inc();
        } else {
            self.cache_misses.inc();
        }
    }

    /// Count a circuit-open transition for a provider
    pub fn record_circuit_opened(&self, provider: &str) {
        self.circuit_opened_total
            .with_label_values(&[provider])
            .inc();
    }

    /// Update the queue-depth gauge
    pub fn set_queue_depth(&self, depth: usize) {
        self.queue_depth.set(depth as i64);
    }

    /// Count a backpressure rejection
    pub fn record_queue_rejection(&self) {
        self.queue_rejections.inc();
    }

    /// Count an expired request
    pub fn record_expired(&self) {
        self.requests_expired.inc();
    }

    /// The underlying registry, for scrape endpoints
    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}
