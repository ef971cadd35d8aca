//! # Model Gateway Telemetry
//!
//! Observability for the Model Gateway:
//! - Structured logging via `tracing`
//! - Prometheus metrics for request outcomes, cache behavior, circuit
//!   transitions, and queue pressure

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod logging;
pub mod metrics;

// Re-export main types
pub use logging::{init_logging, LoggingConfig, LoggingError};
pub use metrics::{Metrics, MetricsConfig, MetricsError};
