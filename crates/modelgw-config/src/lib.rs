//! # Model Gateway Configuration
//!
//! Typed configuration for the gateway: the model catalog plus tuning
//! sections for every component. Files load from YAML, TOML, or JSON by
//! extension; a handful of environment variables override the highest-churn
//! knobs; the catalog file can be watched for hot reload.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod watch;

// Re-export main types
pub use config::{
    load_config, load_config_str, CacheSection, CatalogEntry, CircuitBreakerSection,
    ConfigError, ConfigFormat, GatewayConfig, LoggingSection, QueueSection,
    RateLimitOverride, RateLimitSection, RouterSection, WorkerSection,
};
pub use watch::CatalogWatcher;
