//! # Model Gateway
//!
//! Capability-aware gateway between agent callers and multiple external
//! model providers.
//!
//! The gateway decides which (provider, model) pair serves each inference
//! request, protects the platform from provider failures and cost overruns,
//! and avoids redundant provider calls via semantic caching:
//!
//! - **Registry**: atomically reloadable model catalog
//! - **Circuit breaker**: per-provider failure isolation
//! - **Rate limiter**: per-(caller, provider) token buckets
//! - **Semantic cache**: embedding-similarity response reuse
//! - **Request queue**: bounded admission with weighted round-robin fairness
//! - **Router**: deterministic candidate ranking with bounded failover
//!
//! ## Usage
//!
//! ```no_run
//! use model_gateway::{Gateway, GatewayConfig};
//! use model_gateway::{AdapterSet, Embedder};
//! use std::sync::Arc;
//!
//! # async fn run(adapters: Arc<AdapterSet>, embedder: Arc<dyn Embedder>) {
//! let config = GatewayConfig::default();
//! let gateway = Gateway::start(&config, adapters, embedder).expect("start");
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod gateway;

// The public surface of the gateway, re-exported from the member crates.
pub use gateway::{init_logging_from, BuildError, Gateway, GatewayStatus};
pub use modelgw_cache::{CacheStats, Embedder, EmbedderError, Lookup};
pub use modelgw_config::{load_config, CatalogWatcher, ConfigError, GatewayConfig};
pub use modelgw_core::{
    AdapterResponse, Capability, CapabilitySet, CallerId, ChatMessage, CostRate, GatewayError,
    GatewayResult, InferenceRequest, InferenceResult, LatencyClass, ModelDescriptor, ModelId,
    Priority, ProviderAdapter, ProviderError, ProviderErrorKind, ProviderId, RequestId,
    RequestPayload, TokenUsage, VolatilityClass,
};
pub use modelgw_registry::{ModelRegistry, RegistryError};
pub use modelgw_resilience::{BucketOccupancy, CircuitState, ProviderHealth};
pub use modelgw_routing::AdapterSet;
pub use modelgw_telemetry::{init_logging, LoggingConfig, Metrics};
